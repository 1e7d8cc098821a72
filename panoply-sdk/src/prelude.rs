pub use async_trait::async_trait;
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use serde_json::{json, Value as JsonValue};
pub use std::sync::Arc;
pub use tokio::sync::RwLock;
pub use tracing::{debug, error, info, trace, warn};

pub use crate::collector::{run_collection, CollectionSummary, Collector};
pub use panoply_core::{
    DataSource, DataSourceContext, EventPayload, PanoplyError, PanoplyResult, Phase, RecordGroup,
    Resource, SourceConfig,
};
