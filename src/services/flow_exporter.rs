//! Registry → file tree export
//!
//! Walks buckets, flows and versions, downloads the latest snapshot of each
//! flow and writes it through the [`FlowStore`]. A failing flow is logged,
//! counted and skipped; listing failures abort the whole run.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::common::sanitize_flow_name;
use crate::errors::{FlowResult, RegistryError};
use crate::model::Flow;
use crate::services::flow_store::FlowStore;
use crate::services::registry_client::RegistryApi;
use crate::services::version_resolver;

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Create a backup generation once the export run finishes
    pub backup_after_export: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowFailure {
    pub bucket_id: String,
    pub flow_id: String,
    pub flow_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportSummary {
    pub total_buckets: usize,
    pub total_flows: usize,
    pub exported: usize,
    pub failed: usize,
    pub files: Vec<PathBuf>,
    /// Files written more than once in this run, by flows sharing a name
    pub overwritten: Vec<PathBuf>,
    pub failures: Vec<FlowFailure>,
    pub backup: Option<PathBuf>,
}

impl ExportSummary {
    /// Overall outcome of an export-all run.
    ///
    /// An empty Registry is a success. Flows found but none exported is a
    /// failure, and so is any per-flow failure, even though the flows that
    /// did export stay written.
    pub fn is_success(&self) -> bool {
        if self.total_buckets == 0 {
            return true;
        }
        if self.total_flows > 0 && self.exported == 0 {
            return false;
        }
        self.failed == 0
    }
}

pub struct FlowExporter<'a, R: RegistryApi + ?Sized> {
    registry: &'a R,
    store: &'a FlowStore,
    options: ExportOptions,
}

impl<'a, R: RegistryApi + ?Sized> FlowExporter<'a, R> {
    pub fn new(registry: &'a R, store: &'a FlowStore) -> Self {
        Self {
            registry,
            store,
            options: ExportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// Export the latest version of one flow
    pub async fn export_flow(&self, bucket_id: &str, flow_id: &str) -> FlowResult<PathBuf> {
        let flow = self.registry.get_flow(bucket_id, flow_id).await?;
        self.export_one(bucket_id, &flow).await
    }

    async fn export_one(&self, bucket_id: &str, flow: &Flow) -> FlowResult<PathBuf> {
        let versions = self.registry.list_versions(bucket_id, &flow.id).await?;
        let latest = version_resolver::latest(&flow.id, &versions)?;
        info!(
            "Exporting flow '{}' {}",
            flow.name,
            version_resolver::format_version(&latest)
        );

        let snapshot = self
            .registry
            .get_version_snapshot(bucket_id, &flow.id, latest.version)
            .await?;
        if !matches!(snapshot, Value::Object(_)) {
            return Err(RegistryError::malformed(
                format!("snapshot {}/{} v{}", bucket_id, flow.id, latest.version),
                "snapshot is not a JSON object",
            )
            .into());
        }

        let name = if sanitize_flow_name(&flow.name).is_empty() {
            warn!(
                "Flow name '{}' has no file-safe characters, using its id",
                flow.name
            );
            flow.id.as_str()
        } else {
            flow.name.as_str()
        };
        let path = self.store.write(name, &snapshot)?;
        info!("Exported '{}' to {}", flow.name, path.display());
        Ok(path)
    }

    /// Export the latest version of every flow in every bucket
    pub async fn export_all_flows(&self) -> FlowResult<ExportSummary> {
        let mut summary = ExportSummary::default();

        let buckets = self.registry.list_buckets().await?;
        summary.total_buckets = buckets.len();
        if buckets.is_empty() {
            info!("No buckets found in the Registry, nothing to export");
            return Ok(summary);
        }

        for bucket in &buckets {
            let flows = self.registry.list_flows(&bucket.id).await?;
            if flows.is_empty() {
                info!("Bucket '{}' has no flows", bucket.name);
                continue;
            }
            debug!("Bucket '{}' has {} flows", bucket.name, flows.len());
            summary.total_flows += flows.len();

            for flow in &flows {
                match self.export_one(&bucket.id, flow).await {
                    Ok(path) => {
                        summary.exported += 1;
                        if summary.files.contains(&path) {
                            warn!(
                                "Flow '{}' ({}) in bucket '{}' overwrote {} written earlier in this run",
                                flow.name,
                                flow.id,
                                bucket.name,
                                path.display()
                            );
                            summary.overwritten.push(path);
                        } else {
                            summary.files.push(path);
                        }
                    }
                    Err(err) => {
                        error!(
                            "Failed to export flow '{}' ({}) in bucket '{}': {}",
                            flow.name, flow.id, bucket.name, err
                        );
                        summary.failed += 1;
                        summary.failures.push(FlowFailure {
                            bucket_id: bucket.id.clone(),
                            flow_id: flow.id.clone(),
                            flow_name: flow.name.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        if self.options.backup_after_export && summary.exported > 0 {
            summary.backup = self.store.create_backup()?;
        }

        info!(
            "Export finished: {} buckets, {} flows, {} exported, {} failed",
            summary.total_buckets, summary.total_flows, summary.exported, summary.failed
        );
        Ok(summary)
    }
}
