//! NiFi instance REST client used by the importer

use std::fmt;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{RegistryError, RegistryResult};
use crate::flow::Position;
use crate::services::http::{HttpClient, HttpSettings};

const API_ROOT: &str = "/nifi-api";

/// Canvas components created one by one during component-wise import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Processor,
    Connection,
    Label,
}

impl ComponentKind {
    /// Path segment and response key of the component collection
    pub fn collection(&self) -> &'static str {
        match self {
            ComponentKind::Processor => "processors",
            ComponentKind::Connection => "connections",
            ComponentKind::Label => "labels",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Processor => "processor",
            ComponentKind::Connection => "connection",
            ComponentKind::Label => "label",
        };
        write!(f, "{}", name)
    }
}

/// Operations the importer needs from a NiFi instance
#[async_trait]
pub trait NifiApi: Send + Sync {
    /// Status of an unauthenticated endpoint; any answer means the web tier is up
    async fn probe(&self) -> RegistryResult<u16>;
    /// Exchange credentials for a bearer token and use it from now on
    async fn authenticate(&self, username: &str, password: &str) -> RegistryResult<()>;
    async fn root_process_group(&self) -> RegistryResult<Value>;
    async fn upload_process_group(
        &self,
        parent_id: &str,
        name: &str,
        position: Position,
        document: &Value,
    ) -> RegistryResult<Value>;
    async fn create_process_group(
        &self,
        parent_id: &str,
        name: &str,
        position: Position,
    ) -> RegistryResult<Value>;
    async fn create_component(
        &self,
        group_id: &str,
        kind: ComponentKind,
        component: Value,
    ) -> RegistryResult<Value>;
    async fn list_components(&self, group_id: &str, kind: ComponentKind)
        -> RegistryResult<Vec<Value>>;
}

pub struct NifiClient {
    http: HttpClient,
    client_id: String,
}

impl NifiClient {
    pub fn new(settings: HttpSettings) -> RegistryResult<Self> {
        Ok(Self {
            http: HttpClient::new(settings)?,
            client_id: Uuid::new_v4().to_string(),
        })
    }

    fn envelope(&self, component: Value) -> Value {
        json!({
            "revision": { "clientId": self.client_id, "version": 0 },
            "disconnectedNodeAcknowledged": false,
            "component": component,
        })
    }
}

#[async_trait]
impl NifiApi for NifiClient {
    async fn probe(&self) -> RegistryResult<u16> {
        self.http
            .probe(&format!("{}/access/config", API_ROOT))
            .await
    }

    async fn authenticate(&self, username: &str, password: &str) -> RegistryResult<()> {
        let path = format!("{}/access/token", API_ROOT);
        let token = self
            .http
            .post_form_text(&path, &[("username", username), ("password", password)])
            .await?;
        let token = token.trim();
        if token.is_empty() {
            return Err(RegistryError::malformed(path, "empty token"));
        }
        self.http.set_token(Some(token.to_string())).await;
        debug!("Obtained access token for {}", username);
        Ok(())
    }

    async fn root_process_group(&self) -> RegistryResult<Value> {
        self.http
            .get_json(&format!("{}/flow/process-groups/root", API_ROOT))
            .await
    }

    async fn upload_process_group(
        &self,
        parent_id: &str,
        name: &str,
        position: Position,
        document: &Value,
    ) -> RegistryResult<Value> {
        let path = format!("{}/process-groups/{}/process-groups/upload", API_ROOT, parent_id);
        let bytes = serde_json::to_vec(document)
            .map_err(|e| RegistryError::InvalidConfiguration(e.to_string()))?;
        let file = Part::bytes(bytes)
            .file_name(format!("{}.json", name))
            .mime_str("application/json")
            .map_err(|e| RegistryError::InvalidConfiguration(e.to_string()))?;
        let form = Form::new()
            .text("groupName", name.to_string())
            .text("positionX", position.x.to_string())
            .text("positionY", position.y.to_string())
            .text("clientId", self.client_id.clone())
            .text("disconnectedNodeAcknowledged", "false")
            .part("file", file);
        self.http.post_multipart(&path, form).await
    }

    async fn create_process_group(
        &self,
        parent_id: &str,
        name: &str,
        position: Position,
    ) -> RegistryResult<Value> {
        let path = format!("{}/process-groups/{}/process-groups", API_ROOT, parent_id);
        let body = self.envelope(json!({ "name": name, "position": position }));
        self.http.post_json(&path, &body).await
    }

    async fn create_component(
        &self,
        group_id: &str,
        kind: ComponentKind,
        component: Value,
    ) -> RegistryResult<Value> {
        let path = format!(
            "{}/process-groups/{}/{}",
            API_ROOT,
            group_id,
            kind.collection()
        );
        let body = self.envelope(component);
        self.http.post_json(&path, &body).await
    }

    async fn list_components(
        &self,
        group_id: &str,
        kind: ComponentKind,
    ) -> RegistryResult<Vec<Value>> {
        let path = format!(
            "{}/process-groups/{}/{}",
            API_ROOT,
            group_id,
            kind.collection()
        );
        let response: Value = self.http.get_json(&path).await?;
        match response.get(kind.collection()) {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(RegistryError::malformed(
                path,
                format!("missing '{}' array", kind.collection()),
            )),
        }
    }
}
