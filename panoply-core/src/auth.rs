//! Token-guarded calls.
//!
//! [`TokenGuard::call`] runs a data-fetching operation and, when it fails
//! with an error the caller marks as "needs refresh", exchanges the refresh
//! token for a new access token and runs the operation exactly once more.
//!
//! Two retry layers are involved and they are independent: the refresh
//! request itself is retried with backoff on transient transport errors,
//! while the guarded operation is retried at most once after a successful
//! refresh.
//!
//! There is no locking across concurrent calls sharing one source; two
//! calls failing at the same time will both refresh.

use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{retry_async_with_config, PanoplyError, PanoplyResult, RetryConfig};
use crate::events::EventPayload;
use crate::source::DataSource;

pub const DEFAULT_ACCESS_KEY: &str = "access_token";
pub const DEFAULT_REFRESH_KEY: &str = "refresh_token";
pub const DEFAULT_REFRESH_ATTEMPTS: u32 = 3;
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

pub type TokenCallback = Arc<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>;

/// Invoked with the new access token after a refresh.
#[derive(Clone)]
pub enum RefreshCallback {
    Func(TokenCallback),
    /// Resolved through [`DataSource::invoke_callback`].
    Method(String),
}

impl RefreshCallback {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        RefreshCallback::Func(Arc::new(f))
    }

    pub fn method(name: impl Into<String>) -> Self {
        RefreshCallback::Method(name.into())
    }

    fn label(&self) -> &str {
        match self {
            RefreshCallback::Func(_) => "<fn>",
            RefreshCallback::Method(name) => name,
        }
    }
}

impl fmt::Debug for RefreshCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefreshCallback({})", self.label())
    }
}

#[derive(Debug, Clone)]
pub struct TokenGuardConfig {
    pub refresh_url: String,
    /// Static form fields sent along with the refresh token.
    pub refresh_params: Map<String, Value>,
    pub access_key: String,
    pub refresh_key: String,
    pub callback: Option<RefreshCallback>,
    pub retry: RetryConfig,
    pub timeout: Duration,
}

impl TokenGuardConfig {
    pub fn new(refresh_url: impl Into<String>) -> Self {
        Self {
            refresh_url: refresh_url.into(),
            refresh_params: Map::new(),
            access_key: DEFAULT_ACCESS_KEY.to_string(),
            refresh_key: DEFAULT_REFRESH_KEY.to_string(),
            callback: None,
            retry: RetryConfig::for_token_refresh(DEFAULT_REFRESH_ATTEMPTS),
            timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.refresh_params.insert(key.into(), value.into());
        self
    }

    pub fn with_keys(mut self, access_key: impl Into<String>, refresh_key: impl Into<String>) -> Self {
        self.access_key = access_key.into();
        self.refresh_key = refresh_key.into();
        self
    }

    pub fn with_callback(mut self, callback: RefreshCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

pub struct TokenGuard {
    config: TokenGuardConfig,
    client: reqwest::Client,
}

impl TokenGuard {
    pub fn new(config: TokenGuardConfig) -> PanoplyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PanoplyError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &TokenGuardConfig {
        &self.config
    }

    /// Runs `op`, refreshing the access token and retrying once when
    /// `needs_refresh` accepts its error.
    ///
    /// Errors `needs_refresh` rejects are returned untouched. A failed
    /// refresh yields a non-retryable [`PanoplyError::TokenValidation`] and
    /// leaves the access token cleared.
    pub async fn call<T, E, F, Fut, P>(
        &self,
        target: &dyn DataSource,
        needs_refresh: P,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: From<PanoplyError> + fmt::Debug + fmt::Display,
    {
        let original = match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !needs_refresh(&e) => return Err(e),
            Err(e) => e,
        };

        info!(error = %original, "Access token rejected, refreshing");

        if let Err(refresh_err) = self.refresh(target).await {
            error!(
                error = ?original,
                refresh_error = %refresh_err,
                "Token refresh failed, re-authentication required"
            );
            return Err(PanoplyError::TokenValidation {
                message: refresh_err.to_string(),
                original_error: original.to_string(),
            }
            .into());
        }

        op().await
    }

    /// Exchanges the stored refresh token for a new access token and stores it.
    pub async fn refresh(&self, target: &dyn DataSource) -> PanoplyResult<String> {
        let source = target.source();
        source.remove(&self.config.access_key);

        let refresh_token = source
            .get_str(&self.config.refresh_key)
            .ok_or_else(|| PanoplyError::MissingToken(self.config.refresh_key.clone()))?;

        let form = self.refresh_form(&refresh_token);
        let access_token =
            retry_async_with_config(|| self.request_token(&form), &self.config.retry).await?;

        source.set(self.config.access_key.clone(), access_token.clone());
        target.emitter().emit(&EventPayload::SourceChange {
            field: self.config.access_key.clone(),
            value: Value::String(access_token.clone()),
        });
        debug!(field = %self.config.access_key, "Stored refreshed access token");

        if let Some(callback) = &self.config.callback {
            run_callback(callback, target, &access_token)?;
        }

        Ok(access_token)
    }

    /// Refresh token merged with the static refresh parameters.
    pub fn refresh_form(&self, refresh_token: &str) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = self
            .config
            .refresh_params
            .iter()
            .filter(|(key, _)| **key != self.config.refresh_key)
            .map(|(key, value)| (key.clone(), form_value(value)))
            .collect();
        form.push((self.config.refresh_key.clone(), refresh_token.to_string()));
        form
    }

    async fn request_token(&self, form: &[(String, String)]) -> PanoplyResult<String> {
        let response = self
            .client
            .post(&self.config.refresh_url)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PanoplyError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PanoplyError::ResponseParse(e.to_string()))?;

        body.get(&self.config.access_key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PanoplyError::ResponseParse(format!(
                    "Refresh response has no string field '{}'",
                    self.config.access_key
                ))
            })
    }
}

fn run_callback(
    callback: &RefreshCallback,
    target: &dyn DataSource,
    access_token: &str,
) -> PanoplyResult<()> {
    let result = match callback {
        RefreshCallback::Func(f) => f(access_token),
        RefreshCallback::Method(name) => match target.invoke_callback(name, access_token) {
            Some(result) => result,
            None => Err(anyhow::anyhow!("data source has no callback named '{}'", name)),
        },
    };

    result.map_err(|e| PanoplyError::CallbackFailed {
        callback: callback.label().to_string(),
        message: e.to_string(),
    })
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `needs_refresh` predicate for an HTTP 401 reported as a [`PanoplyError`].
pub fn is_unauthorized(err: &PanoplyError) -> bool {
    matches!(err, PanoplyError::HttpStatus { status: 401, .. })
}
