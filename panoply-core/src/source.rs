//! Source configuration and the context handed to plugin data sources.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::{PanoplyError, PanoplyResult};
use crate::events::{DynEmitter, EventEmitter, EventPayload};

/// Persisted connection and auth state of one source.
///
/// Owned by the embedding runtime; the SDK reads the `type`, `id` and
/// `database` fields and rewrites token fields on refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceConfig(Map<String, Value>);

impl SourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> PanoplyResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(PanoplyError::wrong_type_or_value(
                "Source config should be an object",
            )),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`; absent, null and non-string values are `None`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn source_type(&self) -> Option<String> {
        self.get_str("type").map(str::to_string)
    }

    pub fn id(&self) -> Option<i64> {
        match self.0.get("id")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn database(&self) -> Option<String> {
        match self.0.get("database")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for SourceConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Shared handle to a [`SourceConfig`] that the token guard updates in place.
#[derive(Debug, Clone, Default)]
pub struct SharedSource(Arc<RwLock<SourceConfig>>);

impl SharedSource {
    pub fn new(config: SourceConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub fn snapshot(&self) -> SourceConfig {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        let config = self.0.read().unwrap_or_else(|e| e.into_inner());
        config.get_str(key).map(str::to_string)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let mut config = self.0.write().unwrap_or_else(|e| e.into_inner());
        config.set(key, value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut config = self.0.write().unwrap_or_else(|e| e.into_inner());
        config.remove(key)
    }
}

impl From<SourceConfig> for SharedSource {
    fn from(config: SourceConfig) -> Self {
        Self::new(config)
    }
}

pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

/// What a running data source holds: its config, an emitter and an optional logger.
#[derive(Clone)]
pub struct DataSourceContext {
    source: SharedSource,
    emitter: DynEmitter,
    logger: Option<Logger>,
}

impl DataSourceContext {
    pub fn new(source: impl Into<SharedSource>) -> Self {
        Self {
            source: source.into(),
            emitter: Arc::new(EventEmitter::new()),
            logger: None,
        }
    }

    pub fn with_emitter(mut self, emitter: DynEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    /// Routes [`DataSource::log`] to `logger` instead of tracing.
    pub fn with_logger<F>(mut self, logger: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.logger = Some(Arc::new(logger));
        self
    }

    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    pub fn emitter(&self) -> &DynEmitter {
        &self.emitter
    }
}

impl std::fmt::Debug for DataSourceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceContext")
            .field("source", &self.source)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Implemented by plugin data sources.
pub trait DataSource: Send + Sync {
    fn context(&self) -> &DataSourceContext;

    fn source(&self) -> &SharedSource {
        self.context().source()
    }

    fn emitter(&self) -> &DynEmitter {
        self.context().emitter()
    }

    fn log(&self, message: &str) {
        match &self.context().logger {
            Some(logger) => logger(message),
            None => info!(source = ?self.source().get_str("type"), "{}", message),
        }
    }

    fn progress(&self, loaded: u64, total: u64, message: &str) {
        self.emitter().emit(&EventPayload::Progress {
            loaded,
            total,
            message: message.to_string(),
        });
    }

    fn report_state(&self, state: Value) {
        self.emitter().emit(&EventPayload::SourceState(state));
    }

    /// Resolves a token refresh callback registered by name.
    ///
    /// `None` means this source has no callback called `name`.
    fn invoke_callback(&self, _name: &str, _access_token: &str) -> Option<anyhow::Result<()>> {
        None
    }
}

impl DataSource for DataSourceContext {
    fn context(&self) -> &DataSourceContext {
        self
    }
}
