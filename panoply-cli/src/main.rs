use clap::{Parser, Subcommand};
use colored::Colorize;
use panoply_core::{LoggingConfig, PanoplyConfig};
use std::process::ExitCode;

mod commands;

use commands::{
    cmd_endpoint, cmd_fields, cmd_record, cmd_resources, cmd_send, ConnectionArgs, SendArgs,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "panoply")]
#[command(version = VERSION)]
#[command(about = "Panoply - data source SDK toolbox")]
#[command(long_about = r#"
Tools for developing Panoply data source plugins.

Use 'panoply endpoint' to check which queue your credentials resolve to,
'panoply send' to push JSON lines through the uplink, and 'panoply record',
'panoply resources' or 'panoply fields' to preview what a plugin would emit.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Print the queue endpoint derived from the API credentials")]
    Endpoint {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    #[command(about = "Send JSON lines from a file or stdin to a table")]
    Send(SendArgs),

    #[command(about = "Wrap JSON data into a record group")]
    Record {
        #[arg(help = "Resource id the records belong to")]
        resource: String,

        #[arg(help = "JSON object or array of objects")]
        data: String,
    },

    #[command(about = "Convert resource descriptors to UI options")]
    Resources {
        #[arg(help = "JSON file holding an array of resources")]
        file: std::path::PathBuf,
    },

    #[command(about = "Convert field descriptors to UI options")]
    Fields {
        #[arg(help = "JSON file holding an array of fields")]
        file: std::path::PathBuf,
    },

    #[command(about = "Show version information")]
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.verbose) {
        eprintln!("{}: {}", "Warning".yellow().bold(), e);
    }

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let mut logging = PanoplyConfig::load()
        .map(|c| c.logging)
        .unwrap_or_else(|_| LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        });
    if verbose {
        logging.level = "debug".to_string();
    }

    panoply_core::init_logging(&logging)?;
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Endpoint { connection } => cmd_endpoint(&connection),
        Commands::Send(args) => cmd_send(args).await,
        Commands::Record { resource, data } => cmd_record(&resource, &data),
        Commands::Resources { file } => cmd_resources(&file).await,
        Commands::Fields { file } => cmd_fields(&file).await,
        Commands::Version => {
            println!("panoply {} ({})", VERSION, panoply_core::SDK_IDENTIFIER);
            Ok(())
        }
    }
}
