use panoply_core::normalize::{registered_code, NORMALIZATION_FAILURE, UNCLASSIFIED};
use panoply_core::{
    register_error_code, to_record, wrap_errors, wrap_errors_async, DataSource, DataSourceContext,
    NormalizedError, PanoplyError, Phase, RecordGroup, SourceConfig, SourceRef,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
#[error("table {0} does not exist")]
struct MissingTable(String);

#[derive(Debug, thiserror::Error)]
#[error("slow down")]
struct Throttled;

#[derive(Debug, thiserror::Error)]
#[error("odd code")]
struct OddCode;

fn register_codes() {
    register_error_code::<MissingTable>(404);
    register_error_code::<Throttled>(429);
    register_error_code::<OddCode>(499);
}

struct WarehouseSource {
    ctx: DataSourceContext,
}

impl DataSource for WarehouseSource {
    fn context(&self) -> &DataSourceContext {
        &self.ctx
    }
}

impl WarehouseSource {
    fn new() -> Self {
        let config = SourceConfig::from_value(json!({
            "type": "warehouse",
            "id": 1234,
            "database": "analytics"
        }))
        .unwrap();
        Self {
            ctx: DataSourceContext::new(config),
        }
    }

    fn definition(&self) -> Result<Vec<String>, NormalizedError> {
        wrap_errors(Phase::Config, SourceRef::data_source(self), || {
            Err::<Vec<String>, _>(MissingTable("orders".to_string()))
        })
    }

    async fn read(&self, page: u32) -> Result<RecordGroup, NormalizedError> {
        wrap_errors_async(Phase::Collect, SourceRef::data_source(self), async move {
            match page {
                0 => to_record("orders", json!([{"id": 1}, {"id": 2}])).map_err(anyhow::Error::new),
                1 => Err(anyhow::Error::new(Throttled)),
                _ => Err(anyhow::Error::new(PanoplyError::TokenValidation {
                    message: "refresh failed".to_string(),
                    original_error: "401".to_string(),
                })),
            }
        })
        .await
    }
}

#[test]
fn test_registered_error_in_config_phase() {
    register_codes();
    let source = WarehouseSource::new();

    let err = source.definition().unwrap_err();

    assert_eq!(err.code, 404);
    assert_eq!(err.message, "table orders does not exist");
    assert_eq!(err.phase, Phase::Config);
    assert_eq!(err.source_type.as_deref(), Some("warehouse"));
    assert_eq!(err.source_id, Some(1234));
    assert_eq!(err.database_id.as_deref(), Some("analytics"));
    assert!(err.exception_cls.ends_with("MissingTable"));
    assert!(err.retryable);
}

#[tokio::test]
async fn test_collect_phase_outcomes() {
    register_codes();
    let source = WarehouseSource::new();

    let group = source.read(0).await.unwrap();
    assert_eq!(group.data.len(), 2);
    assert_eq!(group.metadata.resource_id, "orders");

    let throttled = source.read(1).await.unwrap_err();
    assert_eq!(throttled.code, 429);
    assert_eq!(throttled.phase, Phase::Collect);

    let auth = source.read(2).await.unwrap_err();
    assert_eq!(auth.code, UNCLASSIFIED);
    assert!(!auth.retryable);
}

#[test]
fn test_code_outside_table() {
    register_codes();
    assert_eq!(registered_code::<OddCode>(), Some(499));

    let config = SourceConfig::from_value(json!({"type": "x", "id": 1, "database": "d"})).unwrap();
    let err = wrap_errors(Phase::Collect, (&config).into(), || Err::<(), _>(OddCode)).unwrap_err();

    assert_eq!(err.code, NORMALIZATION_FAILURE);
}

#[tokio::test]
async fn test_outer_wrapper_sets_phase() {
    let source = WarehouseSource::new();
    let err = wrap_errors_async(Phase::Collect, SourceRef::data_source(&source), async {
        source.definition()
    })
    .await
    .unwrap_err();

    assert_eq!(err.phase, Phase::Collect);
    assert_eq!(err.message, "table orders does not exist");
}

#[test]
fn test_normalized_error_serializes() {
    let config = SourceConfig::from_value(json!({"type": "x"})).unwrap();
    let err = wrap_errors(Phase::Config, (&config).into(), || {
        Err::<(), _>(anyhow::anyhow!("boom"))
    })
    .unwrap_err();

    let value = serde_json::to_value(&err).unwrap();
    assert_eq!(value["code"], 501);
    assert_eq!(value["phase"], "config");
    assert_eq!(value["message"], "boom");
    assert!(value["source_id"].is_null());
    assert!(value["created_at"].is_string());
}
