use chrono::Utc;
use std::any::{type_name, TypeId};
use std::future::Future;
use tracing::warn;

use super::registry;
use super::types::{is_known_code, NormalizedError, Phase, NORMALIZATION_FAILURE, UNCLASSIFIED};
use crate::error::PanoplyError;
use crate::source::{DataSource, SourceConfig};

/// Where the source fields of a normalized error come from.
#[derive(Clone, Copy)]
pub enum SourceRef<'a> {
    DataSource(&'a dyn DataSource),
    Config(&'a SourceConfig),
    None,
}

impl<'a> SourceRef<'a> {
    pub fn data_source(source: &'a dyn DataSource) -> Self {
        SourceRef::DataSource(source)
    }

    fn fields(&self) -> (Option<String>, Option<i64>, Option<String>) {
        match self {
            SourceRef::DataSource(source) => {
                let config = source.source().snapshot();
                (config.source_type(), config.id(), config.database())
            }
            SourceRef::Config(config) => (config.source_type(), config.id(), config.database()),
            SourceRef::None => (None, None, None),
        }
    }
}

impl<'a> From<&'a SourceConfig> for SourceRef<'a> {
    fn from(config: &'a SourceConfig) -> Self {
        SourceRef::Config(config)
    }
}

impl<'a> From<&'a dyn DataSource> for SourceRef<'a> {
    fn from(source: &'a dyn DataSource) -> Self {
        SourceRef::DataSource(source)
    }
}

/// Maps any error leaving a plugin entry point onto a [`NormalizedError`].
///
/// An error that already is a `NormalizedError` keeps its content and only
/// takes the new phase.
///
/// `exception_cls` is the registered type name when the error is registered.
/// Otherwise it is the static type of `err`, except that an `anyhow::Error`
/// whose root cause is an SDK, io, JSON or HTTP error reports that type.
/// Other errors behind `anyhow` report `anyhow::Error`.
pub fn normalize<E>(phase: Phase, source: SourceRef<'_>, err: E) -> NormalizedError
where
    E: Into<anyhow::Error> + 'static,
{
    let err: anyhow::Error = err.into();

    let err = match err.downcast::<NormalizedError>() {
        Ok(mut normalized) => {
            normalized.phase = phase;
            return normalized;
        }
        Err(err) => err,
    };

    let (code, exception_cls) = match registry::lookup(TypeId::of::<E>(), &err) {
        Some((code, name)) => (code, name),
        None => (
            UNCLASSIFIED,
            root_type_name(&err).unwrap_or_else(type_name::<E>),
        ),
    };
    let code = if is_known_code(code) {
        code
    } else {
        warn!(code, exception_cls, "Registered error code is not in the code table");
        NORMALIZATION_FAILURE
    };

    let retryable = err
        .downcast_ref::<PanoplyError>()
        .map(PanoplyError::is_retryable)
        .unwrap_or(true);

    let (source_type, source_id, database_id) = source.fields();

    NormalizedError {
        message: err.to_string(),
        code,
        exception_cls: exception_cls.to_string(),
        phase,
        source_type,
        source_id,
        database_id,
        retryable,
        created_at: Utc::now(),
    }
}

fn root_type_name(err: &anyhow::Error) -> Option<&'static str> {
    let root = err.root_cause();
    if root.is::<PanoplyError>() {
        Some(type_name::<PanoplyError>())
    } else if root.is::<std::io::Error>() {
        Some(type_name::<std::io::Error>())
    } else if root.is::<serde_json::Error>() {
        Some(type_name::<serde_json::Error>())
    } else if root.is::<reqwest::Error>() {
        Some(type_name::<reqwest::Error>())
    } else {
        None
    }
}

/// Runs a configuration or collection step, normalizing its error.
pub fn wrap_errors<T, E, F>(phase: Phase, source: SourceRef<'_>, f: F) -> Result<T, NormalizedError>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<anyhow::Error> + 'static,
{
    f().map_err(|e| normalize(phase, source, e))
}

pub async fn wrap_errors_async<T, E, Fut>(
    phase: Phase,
    source: SourceRef<'_>,
    fut: Fut,
) -> Result<T, NormalizedError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error> + 'static,
{
    fut.await.map_err(|e| normalize(phase, source, e))
}
