#![allow(clippy::needless_borrows_for_generic_args, clippy::manual_range_contains)]

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod logging;
pub mod normalize;
pub mod records;
pub mod resources;
pub mod source;
pub mod ssh;
pub mod uplink;

pub use auth::{
    is_unauthorized, RefreshCallback, TokenCallback, TokenGuard, TokenGuardConfig,
    DEFAULT_ACCESS_KEY, DEFAULT_REFRESH_KEY,
};
pub use config::{
    get_config_dir, AuthSettings, CredentialsConfig, LoggingConfig, PanoplyConfig, UplinkSettings,
};
pub use credentials::Credentials;
pub use error::{retry_async_with_config, PanoplyError, PanoplyResult, RetryConfig};
pub use events::{
    DynEmitter, Emitter, Event, EventEmitter, EventHandler, EventPayload, SubscriptionId, WILDCARD,
};
pub use logging::init_logging;
pub use normalize::{
    normalize, register_error_code, wrap_errors, wrap_errors_async, NormalizedError, Phase,
    SourceRef, ERROR_CODES,
};
pub use records::{iso_timestamp, to_record, to_record_value, Metadata, Record, RecordGroup};
pub use resources::{
    convert_to_ui_format, list_fields, list_resources, Field, FieldOption, Resource,
    ResourceOption, UiDescriptor,
};
pub use source::{DataSource, DataSourceContext, Logger, SharedSource, SourceConfig};
pub use ssh::{Forwarder, RemoteAddress, SshTunnel, SshTunnelSettings, TunnelConnector};
pub use uplink::{
    InboundResponse, OutboundRecord, OutboundRequest, Uplink, UplinkConfig, SDK_IDENTIFIER,
};
