//! In-memory stand-ins for the Registry and NiFi REST surfaces

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use flowsync::errors::{RegistryError, RegistryResult};
use flowsync::flow::Position;
use flowsync::model::{Bucket, Flow, VersionMeta};
use flowsync::services::flow_importer::Credentials;
use flowsync::services::readiness::RetryPolicy;
use flowsync::services::{ComponentKind, ImportSettings, NifiApi, RegistryApi};

pub fn bucket(id: &str, name: &str) -> Bucket {
    Bucket {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
    }
}

pub fn flow(bucket_id: &str, id: &str, name: &str) -> Flow {
    Flow {
        id: id.to_string(),
        name: name.to_string(),
        bucket_id: bucket_id.to_string(),
        description: None,
        version_count: None,
    }
}

/// A small snapshot: two processors joined by one connection, one label
pub fn sample_snapshot(tag: &str) -> Value {
    json!({
        "snapshotMetadata": { "comments": tag },
        "flowContents": {
            "identifier": "root",
            "name": tag,
            "processors": [
                {
                    "identifier": "old-generate",
                    "name": "GenerateFlowFile",
                    "type": "org.apache.nifi.processors.standard.GenerateFlowFile",
                    "bundle": {"group": "org.apache.nifi", "artifact": "nifi-standard-nar", "version": "1.23.2"},
                    "position": {"x": 0.0, "y": 0.0},
                    "properties": {"File Size": "1KB"},
                    "schedulingPeriod": "10 sec",
                    "schedulingStrategy": "TIMER_DRIVEN",
                    "autoTerminatedRelationships": []
                },
                {
                    "identifier": "old-log",
                    "name": "LogAttribute",
                    "type": "org.apache.nifi.processors.standard.LogAttribute",
                    "bundle": {"group": "org.apache.nifi", "artifact": "nifi-standard-nar", "version": "1.23.2"},
                    "position": {"x": 0.0, "y": 200.0},
                    "properties": {},
                    "autoTerminatedRelationships": ["success"]
                }
            ],
            "connections": [
                {
                    "source": {"id": "old-generate", "name": "GenerateFlowFile"},
                    "destination": {"id": "old-log", "name": "LogAttribute"},
                    "selectedRelationships": ["success"]
                }
            ],
            "labels": [
                {"label": "Demo", "position": {"x": -50.0, "y": -50.0}, "width": 200.0, "height": 40.0, "style": {}}
            ]
        }
    })
}

#[derive(Default)]
pub struct FakeRegistry {
    pub buckets: Vec<Bucket>,
    pub flows: HashMap<String, Vec<Flow>>,
    pub versions: HashMap<String, Vec<VersionMeta>>,
    pub snapshots: HashMap<(String, i64), Value>,
    pub unavailable: bool,
    pub snapshot_requests: Mutex<Vec<(String, i64)>>,
}

impl FakeRegistry {
    pub fn add_flow(&mut self, flow: Flow, versions: &[i64], snapshot: Value) {
        let latest = versions.iter().copied().max();
        self.versions.insert(
            flow.id.clone(),
            versions.iter().map(|v| VersionMeta::new(*v)).collect(),
        );
        if let Some(latest) = latest {
            self.snapshots.insert((flow.id.clone(), latest), snapshot);
        }
        self.flows
            .entry(flow.bucket_id.clone())
            .or_default()
            .push(flow);
    }
}

fn not_found(what: &str) -> RegistryError {
    RegistryError::RequestFailed {
        status: 404,
        body: format!("{} not found", what),
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn list_buckets(&self) -> RegistryResult<Vec<Bucket>> {
        if self.unavailable {
            return Err(RegistryError::Unavailable("connection refused".to_string()));
        }
        Ok(self.buckets.clone())
    }

    async fn list_flows(&self, bucket_id: &str) -> RegistryResult<Vec<Flow>> {
        Ok(self.flows.get(bucket_id).cloned().unwrap_or_default())
    }

    async fn get_flow(&self, bucket_id: &str, flow_id: &str) -> RegistryResult<Flow> {
        self.flows
            .get(bucket_id)
            .and_then(|flows| flows.iter().find(|f| f.id == flow_id))
            .cloned()
            .ok_or_else(|| not_found(flow_id))
    }

    async fn list_versions(
        &self,
        _bucket_id: &str,
        flow_id: &str,
    ) -> RegistryResult<Vec<VersionMeta>> {
        Ok(self.versions.get(flow_id).cloned().unwrap_or_default())
    }

    async fn get_version_snapshot(
        &self,
        _bucket_id: &str,
        flow_id: &str,
        version: i64,
    ) -> RegistryResult<Value> {
        self.snapshot_requests
            .lock()
            .unwrap()
            .push((flow_id.to_string(), version));
        self.snapshots
            .get(&(flow_id.to_string(), version))
            .cloned()
            .ok_or_else(|| not_found(flow_id))
    }

    async fn create_bucket(&self, name: &str, _description: Option<&str>) -> RegistryResult<Bucket> {
        Ok(bucket("new-bucket", name))
    }
}

#[derive(Default)]
pub struct NifiState {
    next_id: u32,
    pub groups: Vec<(String, String)>,
    pub components: HashMap<(String, ComponentKind), Vec<Value>>,
    pub auth_calls: u32,
    pub probe_calls: u32,
    pub token: bool,
}

#[derive(Default)]
pub struct FakeNifi {
    pub upload_supported: bool,
    /// Omit ids from creation responses, forcing the name lookup
    pub hide_ids: bool,
    pub failing_processors: HashSet<String>,
    pub reject_credentials: bool,
    pub fail_group_creation: bool,
    pub failing_connections: bool,
    pub failing_labels: bool,
    /// Statuses answered by successive probes before a plain 200
    pub probe_statuses: Mutex<Vec<u16>>,
    pub election_rounds: Mutex<u32>,
    pub state: Mutex<NifiState>,
}

impl FakeNifi {
    pub fn componentwise() -> Self {
        Self::default()
    }

    pub fn count(&self, group_id: &str, kind: ComponentKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .components
            .get(&(group_id.to_string(), kind))
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn new_id(state: &mut NifiState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }

    fn processor_exists(state: &NifiState, group_id: &str, id: &str) -> bool {
        state
            .components
            .get(&(group_id.to_string(), ComponentKind::Processor))
            .is_some_and(|items| items.iter().any(|item| item["id"] == id))
    }
}

#[async_trait]
impl NifiApi for FakeNifi {
    async fn probe(&self) -> RegistryResult<u16> {
        self.state.lock().unwrap().probe_calls += 1;
        let mut statuses = self.probe_statuses.lock().unwrap();
        if statuses.is_empty() {
            Ok(200)
        } else {
            Ok(statuses.remove(0))
        }
    }

    async fn authenticate(&self, _username: &str, _password: &str) -> RegistryResult<()> {
        let mut state = self.state.lock().unwrap();
        state.auth_calls += 1;
        if self.reject_credentials {
            return Err(RegistryError::RequestFailed {
                status: 401,
                body: "The supplied username and password are not valid.".to_string(),
            });
        }
        let mut rounds = self.election_rounds.lock().unwrap();
        if *rounds > 0 {
            *rounds -= 1;
            return Err(RegistryError::RequestFailed {
                status: 409,
                body: "Cluster is still in the process of voting on the appropriate Data Flow."
                    .to_string(),
            });
        }
        state.token = true;
        Ok(())
    }

    async fn root_process_group(&self) -> RegistryResult<Value> {
        Ok(json!({ "processGroupFlow": { "id": "root-pg" } }))
    }

    async fn upload_process_group(
        &self,
        _parent_id: &str,
        name: &str,
        _position: Position,
        _document: &Value,
    ) -> RegistryResult<Value> {
        if !self.upload_supported {
            return Err(RegistryError::RequestFailed {
                status: 405,
                body: "Method Not Allowed".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        let id = Self::new_id(&mut state, "pg");
        state.groups.push((id.clone(), name.to_string()));
        Ok(json!({ "id": id, "component": { "id": id, "name": name } }))
    }

    async fn create_process_group(
        &self,
        _parent_id: &str,
        name: &str,
        _position: Position,
    ) -> RegistryResult<Value> {
        if self.fail_group_creation {
            return Err(RegistryError::RequestFailed {
                status: 403,
                body: "insufficient permissions".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        let id = Self::new_id(&mut state, "pg");
        state.groups.push((id.clone(), name.to_string()));
        Ok(json!({ "id": id, "component": { "id": id, "name": name } }))
    }

    async fn create_component(
        &self,
        group_id: &str,
        kind: ComponentKind,
        component: Value,
    ) -> RegistryResult<Value> {
        let mut state = self.state.lock().unwrap();

        if kind == ComponentKind::Processor {
            let name = component["name"].as_str().unwrap_or_default();
            if self.failing_processors.contains(name) {
                return Err(RegistryError::RequestFailed {
                    status: 400,
                    body: format!("Unable to create processor {}", name),
                });
            }
        }
        if kind == ComponentKind::Connection && self.failing_connections {
            return Err(RegistryError::RequestFailed {
                status: 409,
                body: "Relationship 'success' is already in use".to_string(),
            });
        }
        if kind == ComponentKind::Label && self.failing_labels {
            return Err(RegistryError::RequestFailed {
                status: 500,
                body: "Unable to create label".to_string(),
            });
        }
        if kind == ComponentKind::Connection {
            for end in ["source", "destination"] {
                let id = component[end]["id"].as_str().unwrap_or_default();
                if !Self::processor_exists(&state, group_id, id) {
                    return Err(RegistryError::RequestFailed {
                        status: 404,
                        body: format!("Unable to find component with id '{}'", id),
                    });
                }
            }
        }

        let id = Self::new_id(&mut state, kind.collection());
        let mut stored = component.clone();
        stored["id"] = json!(id);
        let entity = json!({ "id": id, "component": stored });
        state
            .components
            .entry((group_id.to_string(), kind))
            .or_default()
            .push(entity.clone());

        if self.hide_ids {
            Ok(json!({ "revision": { "version": 1 }, "component": { "name": component["name"] } }))
        } else {
            Ok(entity)
        }
    }

    async fn list_components(
        &self,
        group_id: &str,
        kind: ComponentKind,
    ) -> RegistryResult<Vec<Value>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .components
            .get(&(group_id.to_string(), kind))
            .cloned()
            .unwrap_or_default())
    }
}

pub fn test_settings() -> ImportSettings {
    ImportSettings {
        credentials: Some(Credentials {
            username: "admin".to_string(),
            password: "admin-password".to_string(),
        }),
        settle_delay: Duration::ZERO,
        service_readiness: RetryPolicy::once(),
        auth_readiness: RetryPolicy::new(5, Duration::ZERO),
        attempt_direct_upload: true,
        position_jitter: 0.0,
    }
}
