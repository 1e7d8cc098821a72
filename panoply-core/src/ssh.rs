//! Scoped SSH port forwarding for sources that reach their database through a bastion.
//!
//! The forwarding itself is done by an external SSH library behind
//! [`TunnelConnector`]; this module validates the UI settings object and
//! makes sure a started forwarder is stopped exactly once.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{PanoplyError, PanoplyResult};

pub const DEFAULT_SSH_PORT: u16 = 22;

const REQUIRED_KEYS: [&str; 4] = ["active", "host", "username", "privateKey"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SshTunnelSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub private_key: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl SshTunnelSettings {
    /// Parses the tunnel object sent by the UI.
    pub fn from_value(value: &Value) -> PanoplyResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| PanoplyError::incorrect_param("SSH tunnel should be `dict` object"))?;

        for key in REQUIRED_KEYS {
            if !object.get(key).map(is_truthy).unwrap_or(false) {
                return Err(PanoplyError::incorrect_param(format!(
                    "SSH tunnel object should contain `{}` property",
                    key
                )));
            }
        }

        if object.get("active") != Some(&Value::Bool(true)) {
            return Err(PanoplyError::incorrect_param(
                "To use SSH tunnel connection, property `active` should be `True`",
            ));
        }

        let port = match object.get("port") {
            None | Some(Value::Null) => DEFAULT_SSH_PORT,
            Some(port) => parse_port(port)?,
        };

        Ok(Self {
            host: string_field(object, "host"),
            port,
            username: string_field(object, "username"),
            private_key: string_field(object, "privateKey"),
            password: object
                .get("password")
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn string_field(object: &serde_json::Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn parse_port(value: &Value) -> PanoplyResult<u16> {
    let port = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| PanoplyError::incorrect_param("Port should be instance of `int`"))?;

    validate_port(port)
}

pub fn validate_port(port: i64) -> PanoplyResult<u16> {
    u16::try_from(port)
        .map_err(|_| PanoplyError::incorrect_param("Port should be in range [0: 65535]"))
}

/// The address the tunnel forwards to, as seen from the SSH server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteAddress {
    pub host: String,
    pub port: u16,
}

/// A port forwarder created by an SSH library.
pub trait Forwarder: Send {
    fn start(&mut self) -> PanoplyResult<()>;

    fn stop(&mut self) -> PanoplyResult<()>;

    /// Local port the forwarded connection is reachable on, once started.
    fn local_port(&self) -> Option<u16>;
}

pub trait TunnelConnector {
    fn connect(
        &self,
        settings: &SshTunnelSettings,
        remote: &RemoteAddress,
    ) -> PanoplyResult<Box<dyn Forwarder>>;
}

/// An SSH tunnel held for the lifetime of a database connection.
///
/// The forwarder is stopped on [`SshTunnel::close`] or on drop, whichever
/// comes first.
pub struct SshTunnel {
    remote: RemoteAddress,
    settings: SshTunnelSettings,
    server: Option<Box<dyn Forwarder>>,
}

impl SshTunnel {
    /// With `platform_ssh` set the platform provides the tunnel and no
    /// forwarder is created.
    pub fn open(
        host: &str,
        port: i64,
        tunnel: &Value,
        platform_ssh: bool,
        connector: &dyn TunnelConnector,
    ) -> PanoplyResult<Self> {
        let remote = RemoteAddress {
            host: host.to_string(),
            port: validate_port(port)?,
        };
        let settings = SshTunnelSettings::from_value(tunnel)?;

        let server = if platform_ssh {
            debug!(host = %settings.host, "Using platform SSH tunnel");
            None
        } else {
            let mut forwarder = connector.connect(&settings, &remote)?;
            forwarder.start()?;
            info!(
                ssh_host = %settings.host,
                remote_host = %remote.host,
                remote_port = remote.port,
                local_port = ?forwarder.local_port(),
                "SSH tunnel started"
            );
            Some(forwarder)
        };

        Ok(Self {
            remote,
            settings,
            server,
        })
    }

    pub fn server(&self) -> Option<&dyn Forwarder> {
        self.server.as_deref()
    }

    pub fn local_port(&self) -> Option<u16> {
        self.server.as_ref().and_then(|s| s.local_port())
    }

    pub fn remote(&self) -> &RemoteAddress {
        &self.remote
    }

    pub fn settings(&self) -> &SshTunnelSettings {
        &self.settings
    }

    /// Stops the forwarder. Later calls do nothing.
    pub fn close(&mut self) -> PanoplyResult<()> {
        match self.server.take() {
            Some(mut server) => {
                info!(ssh_host = %self.settings.host, "Stopping SSH tunnel");
                server.stop()
            }
            None => Ok(()),
        }
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to stop SSH tunnel: {}", e);
        }
    }
}

impl fmt::Display for SshTunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SSH tunnel to {}, for user {}",
            self.settings.host, self.settings.username
        )
    }
}

impl fmt::Debug for SshTunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTunnel")
            .field("remote", &self.remote)
            .field("settings", &self.settings.host)
            .field("active", &self.server.is_some())
            .finish()
    }
}
