use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{PanoplyError, PanoplyResult};

pub const TABLE_FIELD: &str = "__table";

/// A single record headed for the queue endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRecord {
    pub table: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl OutboundRecord {
    pub fn new(table: impl Into<String>, data: serde_json::Value) -> PanoplyResult<Self> {
        match data {
            serde_json::Value::Object(payload) => Ok(Self {
                table: table.into(),
                payload,
            }),
            other => Err(PanoplyError::wrong_type_or_value(format!(
                "Outbound record must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// JSON with the destination folded in under `__table`, percent-encoded.
    pub fn encode(&self) -> PanoplyResult<String> {
        let mut payload = self.payload.clone();
        payload.insert(
            TABLE_FIELD.to_string(),
            serde_json::Value::String(self.table.clone()),
        );
        let json = serde_json::to_string(&payload)?;
        Ok(urlencoding::encode(&json).into_owned())
    }
}

pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// An accumulated body ready to be sent as one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub body: String,
    pub records: usize,
}

/// Accumulation buffer plus the size/time flush triggers.
#[derive(Debug)]
pub(crate) struct FlushState {
    body: String,
    records: usize,
    last_flush: Instant,
    max_bytes: usize,
    interval: Duration,
}

impl FlushState {
    pub fn new(max_bytes: usize, interval: Duration, now: Instant) -> Self {
        Self {
            body: String::new(),
            records: 0,
            last_flush: now,
            max_bytes,
            interval,
        }
    }

    pub fn push(&mut self, line: &str) {
        self.body.push_str(line);
        self.body.push('\n');
        self.records += 1;
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Evaluated after every dequeue attempt.
    ///
    /// An empty buffer only resets the timer. The size trigger is checked
    /// before the time trigger.
    pub fn poll(&mut self, now: Instant) -> Option<Batch> {
        if self.body.is_empty() {
            self.last_flush = now;
            return None;
        }

        let elapsed = now.saturating_duration_since(self.last_flush);
        if self.body.len() > self.max_bytes || elapsed > self.interval {
            self.last_flush = now;
            return self.take();
        }

        None
    }

    /// Drains whatever is buffered, regardless of triggers.
    pub fn take(&mut self) -> Option<Batch> {
        if self.body.is_empty() {
            return None;
        }
        let records = std::mem::take(&mut self.records);
        Some(Batch {
            body: std::mem::take(&mut self.body),
            records,
        })
    }

    #[cfg(test)]
    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_encoding_includes_table() {
        let record = OutboundRecord::new("users", json!({"id": 1})).unwrap();
        let encoded = record.encode().unwrap();

        assert!(!encoded.contains('{'));
        let decoded = urlencoding::decode(&encoded).unwrap();
        let value: serde_json::Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["__table"], "users");
    }

    #[test]
    fn test_record_must_be_object() {
        let err = OutboundRecord::new("users", json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_empty_buffer_only_resets_timer() {
        let start = Instant::now();
        let mut state = FlushState::new(100, Duration::from_millis(10), start);

        let later = start + Duration::from_secs(5);
        assert!(state.poll(later).is_none());
        assert_eq!(state.last_flush(), later);

        let again = later + Duration::from_secs(5);
        assert!(state.poll(again).is_none());
        assert_eq!(state.last_flush(), again);
    }

    #[test]
    fn test_time_trigger() {
        let start = Instant::now();
        let mut state = FlushState::new(1_000, Duration::from_secs(2), start);
        state.push("a");

        assert!(state.poll(start + Duration::from_secs(1)).is_none());

        let batch = state.poll(start + Duration::from_secs(3)).unwrap();
        assert_eq!(batch.body, "a\n");
        assert_eq!(batch.records, 1);
        assert!(state.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_trigger_follows_runtime_clock() {
        let mut state = FlushState::new(1_000, Duration::from_secs(2), Instant::now());
        state.push("a");
        assert!(state.poll(Instant::now()).is_none());

        tokio::time::advance(Duration::from_secs(3)).await;

        let batch = state.poll(Instant::now()).unwrap();
        assert_eq!(batch.records, 1);
    }

    #[test]
    fn test_size_trigger_fires_before_interval() {
        let start = Instant::now();
        let mut state = FlushState::new(8, Duration::from_secs(60), start);
        state.push("0123");
        assert!(state.poll(start).is_none());

        state.push("4567");
        let batch = state.poll(start).unwrap();
        assert_eq!(batch.records, 2);
        assert_eq!(batch.body.len(), 10);
    }

    #[test]
    fn test_take_drains_buffer() {
        let mut state = FlushState::new(8, Duration::from_secs(60), Instant::now());
        assert!(state.take().is_none());

        state.push("x");
        state.push("y");
        assert_eq!(state.len(), 4);
        let batch = state.take().unwrap();
        assert_eq!(batch.body, "x\ny\n");
        assert!(state.take().is_none());
    }
}
