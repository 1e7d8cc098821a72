//! Driving a data source through one collection run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use panoply_core::normalize::{wrap_errors, wrap_errors_async, NormalizedError, Phase, SourceRef};
use panoply_core::{DataSource, RecordGroup, Resource, Uplink};

use crate::helpers::write_group;

/// A data source that can describe and read its resources.
#[async_trait]
pub trait Collector: DataSource {
    /// Resources this source can extract.
    async fn definition(&self) -> anyhow::Result<Vec<Resource>>;

    /// Next page of `resource`, or `None` once it is exhausted.
    async fn read(&self, resource: &Resource) -> anyhow::Result<Option<RecordGroup>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub resources: usize,
    pub pages: usize,
    pub records: usize,
}

/// Reads every selected resource and streams the records into `uplink`.
///
/// An empty `selected` list means every available resource. The definition
/// runs in the config phase, reads and writes in the collect phase.
pub async fn run_collection<C: Collector>(
    collector: &C,
    uplink: &Uplink,
    selected: &[String],
) -> Result<CollectionSummary, NormalizedError> {
    let resources = wrap_errors_async(
        Phase::Config,
        SourceRef::data_source(collector),
        collector.definition(),
    )
    .await?;

    let targets: Vec<&Resource> = resources
        .iter()
        .filter(|r| r.available.unwrap_or(true))
        .filter(|r| selected.is_empty() || selected.iter().any(|id| *id == r.id))
        .collect();

    let total = targets.len() as u64;
    let mut summary = CollectionSummary::default();

    for (index, resource) in targets.into_iter().enumerate() {
        collector.progress(index as u64, total, &format!("Collecting {}", resource.title));
        debug!(resource = %resource.id, "Reading resource");

        loop {
            let page = wrap_errors_async(
                Phase::Collect,
                SourceRef::data_source(collector),
                collector.read(resource),
            )
            .await?;

            let Some(group) = page else {
                break;
            };

            let written = wrap_errors(Phase::Collect, SourceRef::data_source(collector), || {
                write_group(uplink, &group)
            })?;
            summary.pages += 1;
            summary.records += written;
        }

        summary.resources += 1;
    }

    collector.progress(total, total, "Collection finished");
    info!(
        resources = summary.resources,
        pages = summary.pages,
        records = summary.records,
        "Collection run finished"
    );

    Ok(summary)
}
