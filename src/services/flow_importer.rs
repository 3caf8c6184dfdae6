//! Flow document → live NiFi import
//!
//! An import first tries to upload the whole document in one call. When the
//! target NiFi does not support that, the flow is rebuilt component by
//! component: processors first (recording old → new ids in an [`IdMapping`]),
//! then connections rewired through the mapping, then labels, and finally
//! the resulting process group is counted and compared against the source.
//!
//! Only readiness, authentication and process group creation are fatal.
//! Individual components that fail are logged, recorded in the
//! [`ImportResult`] and skipped. Nothing is rolled back.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::errors::{FlowError, FlowResult, RegistryError};
use crate::flow::{FlowDocument, Position, VersionedConnection, VersionedLabel, VersionedProcessor};
use crate::services::nifi_client::{ComponentKind, NifiApi};
use crate::services::readiness::{retry_while, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportState {
    Start,
    Authenticated,
    RootResolved,
    DirectUploadAttempted,
    ProcessGroupCreated,
    ProcessorsCreated,
    ConnectionsCreated,
    LabelsCreated,
    Verified,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMethod {
    Direct,
    Componentwise,
}

impl fmt::Display for ImportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMethod::Direct => write!(f, "direct"),
            ImportMethod::Componentwise => write!(f, "componentwise"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// `None` for an unsecured instance
    pub credentials: Option<Credentials>,
    /// Pause between processor and connection creation while NiFi indexes
    /// the new processors
    pub settle_delay: Duration,
    pub service_readiness: RetryPolicy,
    pub auth_readiness: RetryPolicy,
    pub attempt_direct_upload: bool,
    /// Upper bound of the random offset given to new process groups
    pub position_jitter: f64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            credentials: None,
            settle_delay: Duration::from_secs(2),
            service_readiness: RetryPolicy::new(60, Duration::from_secs(5)),
            auth_readiness: RetryPolicy::new(20, Duration::from_secs(5)),
            attempt_direct_upload: true,
            position_jitter: 500.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub flow_name: String,
    pub method: ImportMethod,
    pub process_group_id: String,
    pub created_processor_count: usize,
    pub created_connection_count: usize,
    pub created_label_count: usize,
    pub unmapped_processors: Vec<String>,
    pub skipped_connections: Vec<String>,
    pub warnings: Vec<String>,
    pub final_state: ImportState,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportBatchSummary {
    pub total: usize,
    pub imported: usize,
    pub failed: usize,
    pub results: Vec<ImportResult>,
    pub failures: Vec<(PathBuf, String)>,
}

impl ImportBatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Old processor id → new processor id, for one import attempt
#[derive(Debug, Default)]
pub struct IdMapping {
    ids: HashMap<String, String>,
}

impl IdMapping {
    pub fn insert(&mut self, old_id: &str, new_id: &str) {
        self.ids.insert(old_id.to_string(), new_id.to_string());
    }

    pub fn resolve(&self, old_id: &str) -> Option<&str> {
        self.ids.get(old_id).map(String::as_str)
    }

    pub fn is_target(&self, new_id: &str) -> bool {
        self.ids.values().any(|id| id == new_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

type IdExtractor = fn(&Value) -> Option<String>;

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn top_level_id(response: &Value) -> Option<String> {
    non_empty(response.get("id"))
}

fn component_id(response: &Value) -> Option<String> {
    non_empty(response.get("component").and_then(|c| c.get("id")))
}

fn revision_component_id(response: &Value) -> Option<String> {
    non_empty(response.get("revision").and_then(|r| r.get("componentId")))
}

fn process_group_flow_id(response: &Value) -> Option<String> {
    non_empty(response.get("processGroupFlow").and_then(|p| p.get("id")))
}

/// Response shapes a created component's id is found in, tried in order
const ID_EXTRACTORS: &[IdExtractor] = &[top_level_id, component_id, revision_component_id];

const ROOT_ID_EXTRACTORS: &[IdExtractor] = &[process_group_flow_id, top_level_id, component_id];

fn first_id(extractors: &[IdExtractor], response: &Value) -> Option<String> {
    extractors.iter().find_map(|extract| extract(response))
}

/// Id of a created component, whatever shape the response has
pub fn extract_id(response: &Value) -> Option<String> {
    first_id(ID_EXTRACTORS, response)
}

fn jittered_position(max_offset: f64) -> Position {
    if max_offset <= 0.0 {
        return Position::default();
    }
    let mut rng = rand::rng();
    Position {
        x: rng.random_range(0.0..max_offset),
        y: rng.random_range(0.0..max_offset),
    }
}

fn processor_component(processor: &VersionedProcessor) -> Value {
    let mut config = Map::new();
    config.insert("properties".to_string(), json!(processor.properties));
    config.insert(
        "autoTerminatedRelationships".to_string(),
        json!(processor.auto_terminated_relationships),
    );
    for (key, value) in [
        ("schedulingPeriod", &processor.scheduling_period),
        ("schedulingStrategy", &processor.scheduling_strategy),
        ("comments", &processor.comments),
    ] {
        if let Some(value) = value {
            config.insert(key.to_string(), json!(value));
        }
    }

    json!({
        "name": processor.name,
        "type": processor.processor_type,
        "bundle": processor.bundle,
        "position": processor.position,
        "config": config,
    })
}

fn connection_component(
    connection: &VersionedConnection,
    group_id: &str,
    source_id: &str,
    destination_id: &str,
) -> Value {
    json!({
        "name": connection.name.clone().unwrap_or_default(),
        "source": { "id": source_id, "groupId": group_id, "type": "PROCESSOR" },
        "destination": { "id": destination_id, "groupId": group_id, "type": "PROCESSOR" },
        "selectedRelationships": connection.selected_relationships,
    })
}

fn label_component(label: &VersionedLabel) -> Value {
    json!({
        "label": label.label,
        "position": label.position,
        "width": label.width,
        "height": label.height,
        "style": label.style,
    })
}

fn classify_auth_error(err: RegistryError) -> FlowError {
    match err {
        RegistryError::RequestFailed { status, body } if matches!(status, 400 | 401 | 403) => {
            FlowError::AuthenticationFailed {
                retryable: false,
                reason: format!("invalid credentials (status {}): {}", status, body),
            }
        }
        err => FlowError::AuthenticationFailed {
            retryable: err.is_transient(),
            reason: err.to_string(),
        },
    }
}

/// State of one import attempt; the id mapping dies with it
struct ImportSession {
    flow_name: String,
    state: ImportState,
    mapping: IdMapping,
}

impl ImportSession {
    fn new(flow_name: &str) -> Self {
        Self {
            flow_name: flow_name.to_string(),
            state: ImportState::Start,
            mapping: IdMapping::default(),
        }
    }

    fn transition(&mut self, next: ImportState) {
        debug!("[{}] {:?} -> {:?}", self.flow_name, self.state, next);
        self.state = next;
    }
}

pub struct FlowImporter<'a, N: NifiApi + ?Sized> {
    nifi: &'a N,
    settings: ImportSettings,
}

impl<'a, N: NifiApi + ?Sized> FlowImporter<'a, N> {
    pub fn new(nifi: &'a N, settings: ImportSettings) -> Self {
        Self { nifi, settings }
    }

    /// Import a flow file into `target` (a process group id, or the root
    /// group when `None` or `"root"`)
    pub async fn import_flow(&self, path: &Path, target: Option<&str>) -> FlowResult<ImportResult> {
        let document = FlowDocument::from_path(path)?;
        self.import_document(&document, target).await
    }

    pub async fn import_document(
        &self,
        document: &FlowDocument,
        target: Option<&str>,
    ) -> FlowResult<ImportResult> {
        let mut session = ImportSession::new(&document.name);
        match self.run(&mut session, document, target).await {
            Ok(result) => Ok(result),
            Err(err) => {
                session.transition(ImportState::Failed);
                error!("Import of '{}' failed: {}", document.name, err);
                Err(err)
            }
        }
    }

    /// Import several flow files, continuing past failures
    pub async fn import_flows(
        &self,
        paths: &[PathBuf],
        target: Option<&str>,
    ) -> ImportBatchSummary {
        let mut summary = ImportBatchSummary {
            total: paths.len(),
            ..Default::default()
        };
        for path in paths {
            match self.import_flow(path, target).await {
                Ok(result) => {
                    summary.imported += 1;
                    summary.results.push(result);
                }
                Err(err) => {
                    summary.failed += 1;
                    summary.failures.push((path.clone(), err.to_string()));
                }
            }
        }
        summary
    }

    async fn run(
        &self,
        session: &mut ImportSession,
        document: &FlowDocument,
        target: Option<&str>,
    ) -> FlowResult<ImportResult> {
        self.authenticate().await?;
        session.transition(ImportState::Authenticated);

        let parent_id = self.resolve_target(target).await?;
        session.transition(ImportState::RootResolved);

        if self.settings.attempt_direct_upload {
            let direct = self.try_direct_upload(&parent_id, document).await;
            session.transition(ImportState::DirectUploadAttempted);
            if let Some(group_id) = direct {
                session.transition(ImportState::Done);
                info!(
                    "Imported '{}' by direct upload into process group {}",
                    document.name, group_id
                );
                let contents = &document.contents;
                return Ok(ImportResult {
                    flow_name: document.name.clone(),
                    method: ImportMethod::Direct,
                    process_group_id: group_id,
                    created_processor_count: contents.processors.len(),
                    created_connection_count: contents.connections.len(),
                    created_label_count: contents.labels.len(),
                    unmapped_processors: Vec::new(),
                    skipped_connections: Vec::new(),
                    warnings: Vec::new(),
                    final_state: session.state,
                });
            }
        }

        let group_id = self.create_process_group(&parent_id, &document.name).await?;
        session.transition(ImportState::ProcessGroupCreated);

        let mut result = ImportResult {
            flow_name: document.name.clone(),
            method: ImportMethod::Componentwise,
            process_group_id: group_id.clone(),
            created_processor_count: 0,
            created_connection_count: 0,
            created_label_count: 0,
            unmapped_processors: Vec::new(),
            skipped_connections: Vec::new(),
            warnings: Vec::new(),
            final_state: session.state,
        };

        self.create_processors(session, document, &group_id, &mut result)
            .await;
        session.transition(ImportState::ProcessorsCreated);

        if !document.contents.connections.is_empty() && !self.settings.settle_delay.is_zero() {
            debug!(
                "Waiting {:?} for new processors to settle",
                self.settings.settle_delay
            );
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        self.create_connections(session, document, &group_id, &mut result)
            .await;
        session.transition(ImportState::ConnectionsCreated);

        self.create_labels(document, &group_id, &mut result).await;
        session.transition(ImportState::LabelsCreated);

        self.verify(session, document, &group_id, &mut result).await;
        session.transition(ImportState::Verified);

        session.transition(ImportState::Done);
        result.final_state = session.state;
        info!(
            "Imported '{}' component-wise into {}: {}/{} processors, {}/{} connections, {}/{} labels",
            document.name,
            group_id,
            result.created_processor_count,
            document.contents.processors.len(),
            result.created_connection_count,
            document.contents.connections.len(),
            result.created_label_count,
            document.contents.labels.len()
        );
        Ok(result)
    }

    async fn authenticate(&self) -> FlowResult<()> {
        let nifi = self.nifi;

        retry_while(
            "NiFi service",
            self.settings.service_readiness,
            RegistryError::is_transient,
            move || async move {
                match nifi.probe().await {
                    Ok(status) => {
                        let starting = RegistryError::RequestFailed {
                            status,
                            body: "service starting".to_string(),
                        };
                        if starting.is_transient() {
                            Err(starting)
                        } else {
                            Ok(())
                        }
                    }
                    Err(err) => Err(err),
                }
            },
        )
        .await?;

        let Some(credentials) = &self.settings.credentials else {
            debug!("No credentials configured, assuming an unsecured instance");
            return Ok(());
        };
        let username = credentials.username.as_str();
        let password = credentials.password.as_str();

        retry_while(
            "NiFi authentication",
            self.settings.auth_readiness,
            FlowError::is_retryable,
            move || async move {
                nifi.authenticate(username, password)
                    .await
                    .map_err(classify_auth_error)
            },
        )
        .await
    }

    async fn resolve_target(&self, target: Option<&str>) -> FlowResult<String> {
        match target {
            Some(id) if !id.is_empty() && id != "root" => Ok(id.to_string()),
            _ => {
                let response = self.nifi.root_process_group().await?;
                let root_id = first_id(ROOT_ID_EXTRACTORS, &response).ok_or_else(|| {
                    RegistryError::malformed("root process group", "no process group id")
                })?;
                debug!("Root process group is {}", root_id);
                Ok(root_id)
            }
        }
    }

    async fn try_direct_upload(&self, parent_id: &str, document: &FlowDocument) -> Option<String> {
        let position = jittered_position(self.settings.position_jitter);
        match self
            .nifi
            .upload_process_group(parent_id, &document.name, position, &document.raw)
            .await
        {
            Ok(response) => {
                let id = extract_id(&response);
                if id.is_none() {
                    warn!("Direct upload answered without a process group id, rebuilding component-wise");
                }
                id
            }
            Err(err) => {
                info!("Direct upload unavailable ({}), rebuilding component-wise", err);
                None
            }
        }
    }

    async fn create_process_group(&self, parent_id: &str, name: &str) -> FlowResult<String> {
        let position = jittered_position(self.settings.position_jitter);
        let response = self
            .nifi
            .create_process_group(parent_id, name, position)
            .await
            .map_err(|e| FlowError::ProcessGroupCreationFailed(e.to_string()))?;
        let group_id = extract_id(&response).ok_or_else(|| {
            FlowError::ProcessGroupCreationFailed(format!(
                "no id in response for process group '{}'",
                name
            ))
        })?;
        info!("Created process group '{}' ({})", name, group_id);
        Ok(group_id)
    }

    /// Fallback for APIs that do not echo the new id: find an unmapped
    /// processor with the same name in the group
    async fn lookup_processor_by_name(
        &self,
        group_id: &str,
        name: &str,
        mapping: &IdMapping,
    ) -> Option<String> {
        let processors = match self
            .nifi
            .list_components(group_id, ComponentKind::Processor)
            .await
        {
            Ok(processors) => processors,
            Err(err) => {
                warn!("Could not list processors of {}: {}", group_id, err);
                return None;
            }
        };

        processors.iter().find_map(|item| {
            let item_name = item
                .get("component")
                .and_then(|c| c.get("name"))
                .or_else(|| item.get("name"))
                .and_then(Value::as_str)?;
            let id = extract_id(item)?;
            (item_name == name && !mapping.is_target(&id)).then_some(id)
        })
    }

    async fn create_processors(
        &self,
        session: &mut ImportSession,
        document: &FlowDocument,
        group_id: &str,
        result: &mut ImportResult,
    ) {
        for processor in &document.contents.processors {
            let response = match self
                .nifi
                .create_component(group_id, ComponentKind::Processor, processor_component(processor))
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err = FlowError::ComponentCreationFailed {
                        kind: ComponentKind::Processor.to_string(),
                        name: processor.name.clone(),
                        reason: err.to_string(),
                    };
                    error!("{}", err);
                    result.unmapped_processors.push(processor.identifier.clone());
                    continue;
                }
            };
            result.created_processor_count += 1;

            let new_id = match extract_id(&response) {
                Some(id) => Some(id),
                None => {
                    debug!(
                        "No id in creation response for '{}', looking it up by name",
                        processor.name
                    );
                    self.lookup_processor_by_name(group_id, &processor.name, &session.mapping)
                        .await
                }
            };

            match new_id {
                Some(new_id) => {
                    debug!("Mapped processor {} -> {}", processor.identifier, new_id);
                    session.mapping.insert(&processor.identifier, &new_id);
                }
                None => {
                    warn!(
                        "Processor '{}' ({}) was created but its new id is unknown; its connections will be skipped",
                        processor.name, processor.identifier
                    );
                    result.unmapped_processors.push(processor.identifier.clone());
                }
            }
        }
    }

    async fn create_connections(
        &self,
        session: &ImportSession,
        document: &FlowDocument,
        group_id: &str,
        result: &mut ImportResult,
    ) {
        for connection in &document.contents.connections {
            let source = session.mapping.resolve(&connection.source.id);
            let destination = session.mapping.resolve(&connection.destination.id);
            let (Some(source_id), Some(destination_id)) = (source, destination) else {
                error!(
                    "Skipping connection {}: endpoint processor was not mapped",
                    connection.describe()
                );
                result.skipped_connections.push(connection.describe());
                continue;
            };

            let component = connection_component(connection, group_id, source_id, destination_id);
            match self
                .nifi
                .create_component(group_id, ComponentKind::Connection, component)
                .await
            {
                Ok(_) => result.created_connection_count += 1,
                Err(err) => {
                    let err = FlowError::ComponentCreationFailed {
                        kind: ComponentKind::Connection.to_string(),
                        name: connection.describe(),
                        reason: err.to_string(),
                    };
                    error!("{}", err);
                    result.skipped_connections.push(connection.describe());
                }
            }
        }
    }

    async fn create_labels(&self, document: &FlowDocument, group_id: &str, result: &mut ImportResult) {
        for label in &document.contents.labels {
            match self
                .nifi
                .create_component(group_id, ComponentKind::Label, label_component(label))
                .await
            {
                Ok(_) => result.created_label_count += 1,
                Err(err) => {
                    let err = FlowError::ComponentCreationFailed {
                        kind: ComponentKind::Label.to_string(),
                        name: label.label.clone(),
                        reason: err.to_string(),
                    };
                    error!("{}", err);
                }
            }
        }
    }

    async fn verify(
        &self,
        session: &ImportSession,
        document: &FlowDocument,
        group_id: &str,
        result: &mut ImportResult,
    ) {
        let contents = &document.contents;
        let expectations = [
            (ComponentKind::Processor, contents.processors.len()),
            (ComponentKind::Connection, contents.connections.len()),
            (ComponentKind::Label, contents.labels.len()),
        ];

        for (kind, expected) in expectations {
            let actual = match self.nifi.list_components(group_id, kind).await {
                Ok(items) => items.len(),
                Err(err) => {
                    let warning = format!("Could not verify {}: {}", kind.collection(), err);
                    warn!("{}", warning);
                    result.warnings.push(warning);
                    continue;
                }
            };

            if actual != expected {
                let mismatch = FlowError::VerificationMismatch {
                    kind: kind.collection().to_string(),
                    expected,
                    actual,
                };
                warn!("{}", mismatch);
                result.warnings.push(mismatch.to_string());
            }
            if kind == ComponentKind::Processor && actual != session.mapping.len() {
                let mismatch = FlowError::VerificationMismatch {
                    kind: "mapped processors".to_string(),
                    expected: session.mapping.len(),
                    actual,
                };
                warn!("{}", mismatch);
                result.warnings.push(mismatch.to_string());
            }
        }
    }
}
