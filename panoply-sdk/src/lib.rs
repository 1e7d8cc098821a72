//! Plugin-facing SDK for Panoply data sources.
//!
//! Re-exports the core building blocks and adds the [`Collector`] runner
//! and a few declarative macros.

pub mod collector;
#[cfg(feature = "macros")]
pub mod macros;
mod prelude;

pub use prelude::*;

pub use panoply_core::error::{retry_async_with_config, PanoplyError, PanoplyResult, RetryConfig};

pub use panoply_core::{
    convert_to_ui_format, init_logging, is_unauthorized, list_fields, list_resources,
    register_error_code, to_record, to_record_value, wrap_errors, wrap_errors_async, Credentials,
    DataSource, DataSourceContext, DynEmitter, Emitter, Event, EventEmitter, EventPayload, Field,
    FieldOption, Forwarder, NormalizedError, OutboundRecord, PanoplyConfig, Phase, RecordGroup,
    RefreshCallback, RemoteAddress, Resource, ResourceOption, SharedSource, SourceConfig,
    SourceRef, SshTunnel, SshTunnelSettings, TokenGuard, TokenGuardConfig, TunnelConnector,
    UiDescriptor, Uplink, UplinkConfig,
};

pub mod version {
    pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
    pub use panoply_core::uplink::SDK_IDENTIFIER;

    /// Whether a plugin built against `core_version` can run on this SDK.
    pub fn is_compatible(core_version: &str) -> bool {
        let parse = |v: &str| -> Vec<u32> { v.split('.').filter_map(|s| s.parse().ok()).collect() };
        let ours = parse(SDK_VERSION);
        let theirs = parse(core_version);

        if ours.len() < 2 || theirs.len() < 2 {
            return false;
        }

        // 0.x releases break on minor bumps
        if ours[0] == 0 {
            theirs[0] == 0 && theirs[1] == ours[1]
        } else {
            theirs[0] == ours[0]
        }
    }
}

pub mod helpers {
    use panoply_core::{OutboundRecord, PanoplyResult, RecordGroup, Uplink};

    /// Queues every record of `group` under its resource id. Returns the count.
    pub fn write_group(uplink: &Uplink, group: &RecordGroup) -> PanoplyResult<usize> {
        for row in &group.data {
            let record = OutboundRecord {
                table: group.metadata.resource_id.clone(),
                payload: row.clone(),
            };
            uplink.write_record(&record)?;
        }
        Ok(group.data.len())
    }

    /// Reads `sshTunnel` and `platformSSH` from a source config.
    ///
    /// Returns `None` when the source has no active tunnel.
    pub fn tunnel_settings(
        source: &panoply_core::SourceConfig,
    ) -> Option<(&serde_json::Value, bool)> {
        let tunnel = source.get("sshTunnel")?;
        let active = tunnel
            .get("active")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if !active {
            return None;
        }

        let platform_ssh = source
            .get("platformSSH")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true);
        Some((tunnel, platform_ssh))
    }
}
