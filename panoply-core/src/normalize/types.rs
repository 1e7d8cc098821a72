use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const UNCLASSIFIED: u16 = 501;
pub const NORMALIZATION_FAILURE: u16 = 506;

/// Codes a normalized error may carry, with their descriptions.
pub const ERROR_CODES: &[(u16, &str)] = &[
    (400, "Bad request"),
    (401, "Unauthorized"),
    (403, "Permissions error"),
    (404, "Resource is not found"),
    (408, "Timeout"),
    (422, "Parsing error"),
    (429, "Rate limit"),
    (500, "Internal exception"),
    (UNCLASSIFIED, "Unclassified error"),
    (NORMALIZATION_FAILURE, "SDK error in processing an error"),
];

pub fn is_known_code(code: u16) -> bool {
    ERROR_CODES.iter().any(|(known, _)| *known == code)
}

pub fn code_description(code: u16) -> Option<&'static str> {
    ERROR_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, description)| *description)
}

/// Plugin lifecycle stage an error crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Config,
    Collect,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Config => "config",
            Phase::Collect => "collect",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin error mapped onto the fixed code table, ready for upstream reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub message: String,
    pub code: u16,
    pub exception_cls: String,
    pub phase: Phase,
    pub source_type: Option<String>,
    pub source_id: Option<i64>,
    pub database_id: Option<String>,
    pub retryable: bool,
    pub created_at: DateTime<Utc>,
}

impl NormalizedError {
    pub fn description(&self) -> Option<&'static str> {
        code_description(self.code)
    }
}

impl fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for NormalizedError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table() {
        assert!(is_known_code(404));
        assert!(!is_known_code(418));
        assert_eq!(code_description(429), Some("Rate limit"));
        assert_eq!(code_description(UNCLASSIFIED), Some("Unclassified error"));
        assert_eq!(ERROR_CODES.len(), 10);
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(serde_json::to_string(&Phase::Collect).unwrap(), "\"collect\"");
        assert_eq!(Phase::Config.to_string(), "config");
    }
}
