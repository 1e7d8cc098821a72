use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credentials::Credentials;

/// `<package name>-<version>`, sent with every batch.
pub const SDK_IDENTIFIER: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A batch request as handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub batch_id: Uuid,
    pub url: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub records: usize,
    pub created_at: DateTime<Utc>,
}

impl OutboundRequest {
    pub fn send_message(url: &str, credentials: &Credentials, message_body: &str, records: usize) -> Self {
        let body = encode_send_message(credentials, message_body);
        let headers = vec![
            ("Content-Length".to_string(), body.len().to_string()),
            ("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()),
        ];

        Self {
            batch_id: Uuid::new_v4(),
            url: url.to_string(),
            body,
            headers,
            records,
            created_at: Utc::now(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundResponse {
    pub status: u16,
    pub body: String,
}

/// Form body for the queue's `SendMessage` action.
///
/// `message_body` holds already percent-encoded lines and is passed through
/// as is; attribute values are encoded here.
pub fn encode_send_message(credentials: &Credentials, message_body: &str) -> String {
    let attributes = [
        ("key", credentials.api_key()),
        ("secret", credentials.api_secret()),
        ("sdk", SDK_IDENTIFIER),
    ];

    let mut fields = vec![
        "Action=SendMessage".to_string(),
        format!("MessageBody={}", message_body),
    ];

    for (index, (name, value)) in attributes.iter().enumerate() {
        let n = index + 1;
        fields.push(format!("MessageAttribute.{}.Name={}", n, name));
        fields.push(format!("MessageAttribute.{}.Value.DataType=String", n));
        fields.push(format!(
            "MessageAttribute.{}.Value.StringValue={}",
            n,
            urlencoding::encode(value)
        ));
    }

    fields.join("&")
}
