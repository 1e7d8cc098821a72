//! Buffered uplink to the collection queue.
//!
//! [`Uplink::write`] serializes a record and hands it to a background task
//! without waiting on the network. The task batches records into a single
//! form-encoded `SendMessage` request whenever the buffer grows past
//! `max_batch_bytes` or the flush interval elapses.
//!
//! A batch whose request fails is reported through the `error` event and
//! dropped; there is no retry or dead-letter path.

mod batch;
mod wire;
mod worker;

pub use batch::{Batch, OutboundRecord, TABLE_FIELD};
pub use wire::{encode_send_message, InboundResponse, OutboundRequest, FORM_CONTENT_TYPE, SDK_IDENTIFIER};

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::credentials::Credentials;
use crate::error::{PanoplyError, PanoplyResult};
use crate::events::{DynEmitter, EventEmitter};

use worker::{run_flush_loop, BatchSender};

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1024 * 250;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct UplinkConfig {
    pub flush_interval: Duration,
    pub max_batch_bytes: usize,
    pub request_timeout: Duration,
    /// Replaces the queue URL derived from the credentials.
    pub endpoint: Option<String>,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            endpoint: None,
        }
    }
}

impl UplinkConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }
}

pub struct Uplink {
    tx: mpsc::UnboundedSender<String>,
    pending: Arc<AtomicUsize>,
    endpoint: String,
    emitter: DynEmitter,
    worker: JoinHandle<()>,
}

impl Uplink {
    /// Starts an uplink with its own event emitter.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(credentials: Credentials, config: UplinkConfig) -> PanoplyResult<Self> {
        Self::with_emitter(credentials, config, Arc::new(EventEmitter::new()))
    }

    pub fn with_emitter(
        credentials: Credentials,
        config: UplinkConfig,
        emitter: DynEmitter,
    ) -> PanoplyResult<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| PanoplyError::RuntimeUnavailable(e.to_string()))?;

        if config.max_batch_bytes == 0 {
            return Err(PanoplyError::InvalidConfigValue {
                key: "uplink.max_batch_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if config.flush_interval.is_zero() {
            return Err(PanoplyError::InvalidConfigValue {
                key: "uplink.flush_interval_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| credentials.endpoint_url());

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PanoplyError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let sender = BatchSender {
            client,
            url: endpoint.clone(),
            credentials,
            emitter: emitter.clone(),
        };
        let worker = handle.spawn(run_flush_loop(
            rx,
            pending.clone(),
            sender,
            config.flush_interval,
            config.max_batch_bytes,
        ));

        info!(
            endpoint = %endpoint,
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            max_batch_bytes = config.max_batch_bytes,
            "Uplink started"
        );

        Ok(Self {
            tx,
            pending,
            endpoint,
            emitter,
            worker,
        })
    }

    /// Queues one record for `table`. Never waits on the network.
    pub fn write(&self, table: &str, data: Value) -> PanoplyResult<()> {
        let record = OutboundRecord::new(table, data)?;
        self.write_record(&record)
    }

    pub fn write_record(&self, record: &OutboundRecord) -> PanoplyResult<()> {
        let line = record.encode()?;

        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(line).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(PanoplyError::UplinkClosed);
        }

        Ok(())
    }

    /// Records written but not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn emitter(&self) -> &DynEmitter {
        &self.emitter
    }

    /// Stops accepting records and waits until the remaining buffer is sent.
    ///
    /// Dropping the uplink also flushes, but without waiting.
    pub async fn close(self) -> PanoplyResult<()> {
        let Uplink { tx, worker, .. } = self;
        drop(tx);

        debug!("Waiting for uplink worker to drain");
        worker
            .await
            .map_err(|e| PanoplyError::Internal(format!("Uplink worker failed: {}", e)))
    }
}

impl std::fmt::Debug for Uplink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uplink")
            .field("endpoint", &self.endpoint)
            .field("pending", &self.pending())
            .finish()
    }
}
