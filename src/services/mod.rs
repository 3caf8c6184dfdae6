pub mod flow_exporter;
pub mod flow_importer;
pub mod flow_store;
pub mod http;
pub mod nifi_client;
pub mod readiness;
pub mod registry_client;
pub mod version_resolver;

pub use flow_exporter::{ExportOptions, ExportSummary, FlowExporter};
pub use flow_importer::{FlowImporter, ImportMethod, ImportResult, ImportSettings, ImportState};
pub use flow_store::FlowStore;
pub use nifi_client::{ComponentKind, NifiApi, NifiClient};
pub use registry_client::{RegistryApi, RegistryClient};
