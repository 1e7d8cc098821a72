//! Record groups: extracted rows sharing one resource id and one timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PanoplyError, PanoplyResult};

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub resource_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordGroup {
    pub data: Vec<Record>,
    pub metadata: Metadata,
}

/// Wraps `data` (an object or an array of objects) into a [`RecordGroup`].
pub fn to_record(resource: &str, data: Value) -> PanoplyResult<RecordGroup> {
    validate_resource(resource)?;
    let data = normalize_data(data)?;

    Ok(RecordGroup {
        data,
        metadata: Metadata {
            resource_id: resource.to_string(),
            timestamp: iso_timestamp(Utc::now()),
        },
    })
}

/// Same as [`to_record`] for a resource name that arrives as untyped JSON.
pub fn to_record_value(resource: &Value, data: Value) -> PanoplyResult<RecordGroup> {
    match resource {
        Value::String(resource) => to_record(resource, data),
        _ => Err(PanoplyError::wrong_type_or_value(
            "`resource` must be of a type string",
        )),
    }
}

fn validate_resource(resource: &str) -> PanoplyResult<()> {
    if resource.trim().is_empty() {
        return Err(PanoplyError::wrong_type_or_value(
            "`resource` must be a non empty string",
        ));
    }
    Ok(())
}

fn normalize_data(data: Value) -> PanoplyResult<Vec<Record>> {
    match data {
        Value::Object(record) => Ok(vec![record]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                _ => Err(PanoplyError::wrong_type_or_value(
                    "Objects inside returned list should be of type dict.",
                )),
            })
            .collect(),
        _ => Err(PanoplyError::wrong_type_or_value(
            "The data returned should be of the type list or dict.",
        )),
    }
}

/// ISO-8601 UTC with millisecond precision and a trailing `Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_single_object_becomes_one_element() {
        let group = to_record("customers", json!({"a": 1})).unwrap();

        assert_eq!(group.data.len(), 1);
        assert_eq!(Value::Object(group.data[0].clone()), json!({"a": 1}));
        assert_eq!(group.metadata.resource_id, "customers");
        assert!(group.metadata.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_list_of_objects() {
        let group = to_record("orders", json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(group.data.len(), 2);

        let group = to_record("orders", json!([])).unwrap();
        assert!(group.data.is_empty());
    }

    #[test]
    fn test_empty_resource_fails() {
        let err = to_record("", json!({})).unwrap_err();
        assert!(err.to_string().contains("non empty string"));

        assert!(to_record("   ", json!({})).is_err());
    }

    #[test]
    fn test_non_string_resource_fails() {
        let err = to_record_value(&json!(5), json!({})).unwrap_err();
        assert!(err.to_string().contains("must be of a type string"));
    }

    #[test]
    fn test_wrong_data_type_fails() {
        let err = to_record("x", json!("not-a-dict-or-list")).unwrap_err();
        assert!(err.to_string().contains("list or dict"));

        let err = to_record("x", json!([{"ok": true}, 3])).unwrap_err();
        assert!(err.to_string().contains("should be of type dict"));
    }

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(iso_timestamp(at), "2024-03-01T12:30:05.042Z");
    }
}
