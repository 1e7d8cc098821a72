use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::batch::{Batch, FlushState};
use super::wire::{InboundResponse, OutboundRequest};
use crate::credentials::Credentials;
use crate::error::PanoplyError;
use crate::events::{DynEmitter, EventPayload};

/// Posts batches to the queue endpoint and reports each outcome as an event.
pub(crate) struct BatchSender {
    pub client: reqwest::Client,
    pub url: String,
    pub credentials: Credentials,
    pub emitter: DynEmitter,
}

impl BatchSender {
    /// Sends one batch. Failures are reported through the `error` event and
    /// the batch is dropped.
    pub async fn send(&self, batch: Batch) -> bool {
        let request =
            OutboundRequest::send_message(&self.url, &self.credentials, &batch.body, batch.records);

        debug!(
            batch_id = %request.batch_id,
            records = request.records,
            bytes = request.body.len(),
            "Flushing uplink batch"
        );
        self.emitter.emit(&EventPayload::Send {
            request: request.clone(),
        });

        match self.post(&request).await {
            Ok(response) => {
                self.emitter.emit(&EventPayload::Flush { request, response });
                true
            }
            Err(e) => {
                warn!(
                    batch_id = %request.batch_id,
                    records = request.records,
                    "Dropping uplink batch: {}",
                    e
                );
                self.emitter.emit(&EventPayload::Error {
                    error_code: e.error_code().to_string(),
                    message: e.to_string(),
                    request: Some(request),
                });
                false
            }
        }
    }

    async fn post(&self, request: &OutboundRequest) -> Result<InboundResponse, PanoplyError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body.clone()).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(PanoplyError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(InboundResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Drains the record channel until every sender is gone.
///
/// Each receive waits at most one flush interval; the flush triggers are
/// evaluated after every attempt. Remaining records are sent once the
/// channel closes.
pub(crate) async fn run_flush_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    pending: Arc<AtomicUsize>,
    sender: BatchSender,
    flush_interval: Duration,
    max_batch_bytes: usize,
) {
    let mut state = FlushState::new(max_batch_bytes, flush_interval, Instant::now());
    let mut flushed: u64 = 0;

    loop {
        match tokio::time::timeout(flush_interval, rx.recv()).await {
            Ok(Some(line)) => {
                pending.fetch_sub(1, Ordering::AcqRel);
                state.push(&line);
            }
            Ok(None) => {
                if let Some(batch) = state.take() {
                    sender.send(batch).await;
                    flushed += 1;
                }
                break;
            }
            Err(_) => {}
        }

        if let Some(batch) = state.poll(Instant::now()) {
            sender.send(batch).await;
            flushed += 1;
        }
    }

    info!(batches = flushed, "Uplink worker stopped");
}
