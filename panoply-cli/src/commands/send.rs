use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use panoply_core::{Credentials, EventEmitter, EventPayload, PanoplyConfig, Uplink, UplinkConfig};
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    #[arg(long, env = "PANOPLY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "PANOPLY_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    #[arg(long, help = "Override the queue URL derived from the credentials")]
    pub endpoint: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[arg(short, long, help = "Destination table name")]
    pub table: String,

    #[arg(short, long, help = "JSON lines file, stdin when omitted")]
    pub input: Option<PathBuf>,

    #[arg(long, help = "Flush interval in milliseconds")]
    pub flush_interval_ms: Option<u64>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl ConnectionArgs {
    /// Credentials and uplink settings from config files, overridden by flags.
    pub fn resolve(&self, config: &PanoplyConfig) -> Result<(Credentials, UplinkConfig)> {
        let mut credentials = config.credentials.clone();
        if let Some(key) = &self.api_key {
            credentials.api_key = Some(key.clone());
        }
        if let Some(secret) = &self.api_secret {
            credentials.api_secret = Some(secret.clone());
        }

        let credentials = credentials
            .to_credentials()
            .context("API credentials are required (--api-key/--api-secret)")?;

        let mut uplink = config.uplink.to_uplink_config();
        if let Some(endpoint) = &self.endpoint {
            uplink = uplink.with_endpoint(endpoint.clone());
        }

        Ok((credentials, uplink))
    }
}

pub fn cmd_endpoint(connection: &ConnectionArgs) -> Result<()> {
    let config = PanoplyConfig::load()?;
    let (credentials, uplink) = connection.resolve(&config)?;

    let url = uplink
        .endpoint
        .unwrap_or_else(|| credentials.endpoint_url());

    println!("{}", "Panoply Endpoint".cyan().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!("  {:<10} {}", "Account:".bold(), credentials.account());
    println!("  {:<10} {}", "Region:".bold(), credentials.region());
    println!("  {:<10} {}", "URL:".bold(), url.green());

    Ok(())
}

#[derive(Debug, Default)]
pub struct SendReport {
    pub queued: usize,
    pub skipped: usize,
    pub delivered: usize,
    pub failed_batches: usize,
}

/// Queues each non-blank JSON line of `input` under `table`.
///
/// Lines that do not hold a JSON object are skipped with a warning.
pub fn queue_lines(uplink: &Uplink, table: &str, input: &str) -> SendReport {
    let mut report = SendReport::default();

    for (number, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let queued = serde_json::from_str(line)
            .map_err(anyhow::Error::from)
            .and_then(|value| uplink.write(table, value).map_err(anyhow::Error::from));
        match queued {
            Ok(()) => report.queued += 1,
            Err(e) => {
                eprintln!("  {} line {}: {}", "!".yellow(), number + 1, e);
                report.skipped += 1;
            }
        }
    }

    report
}

/// Writes the lines and waits for the final flush, counting deliveries.
pub async fn send_all(
    credentials: Credentials,
    config: UplinkConfig,
    table: &str,
    input: &str,
) -> Result<SendReport> {
    let emitter = Arc::new(EventEmitter::new());
    let delivered = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let on_flush = delivered.clone();
    emitter.on("flush", move |_, payload| {
        if let EventPayload::Flush { request, .. } = payload {
            on_flush.fetch_add(request.records, Ordering::Relaxed);
        }
    });
    let on_error = failed.clone();
    emitter.on("error", move |_, payload| {
        if let EventPayload::Error { error_code, message, .. } = payload {
            eprintln!("  {} [{}] {}", "✗".red(), error_code, message);
        }
        on_error.fetch_add(1, Ordering::Relaxed);
    });

    let uplink = Uplink::with_emitter(credentials, config, emitter)?;
    debug!(endpoint = %uplink.endpoint(), table, "Sending records");

    let mut report = queue_lines(&uplink, table, input);
    uplink.close().await?;

    report.delivered = delivered.load(Ordering::Relaxed);
    report.failed_batches = failed.load(Ordering::Relaxed);
    Ok(report)
}

pub async fn cmd_send(args: SendArgs) -> Result<()> {
    let config = PanoplyConfig::load()?;
    let (credentials, mut uplink) = args.connection.resolve(&config)?;
    if let Some(ms) = args.flush_interval_ms {
        uplink = uplink.with_flush_interval(Duration::from_millis(ms));
    }

    let input = match &args.input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    println!(
        "{} {} {}",
        "→".blue(),
        "Sending to table".cyan(),
        args.table.yellow()
    );

    let report = send_all(credentials, uplink, &args.table, &input).await?;

    println!(
        "  Queued: {}, skipped: {}, delivered: {}",
        report.queued, report.skipped, report.delivered
    );

    if report.failed_batches > 0 {
        anyhow::bail!("{} batch(es) failed to send", report.failed_batches);
    }

    println!("{} {}", "✓".green().bold(), "All records delivered".green());
    Ok(())
}
