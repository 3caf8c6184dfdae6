//! Versioned flow documents: the exported JSON form of one flow version
//!
//! A [`FlowDocument`] keeps the raw JSON (needed verbatim for direct upload)
//! alongside the typed processor, connection and label lists used for
//! component-wise reconstruction.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FlowError, FlowResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub artifact: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedProcessor {
    pub identifier: String,
    pub name: String,
    #[serde(rename = "type")]
    pub processor_type: String,
    #[serde(default)]
    pub bundle: Bundle,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub properties: IndexMap<String, Option<String>>,
    #[serde(default)]
    pub scheduling_period: Option<String>,
    #[serde(default)]
    pub scheduling_strategy: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub auto_terminated_relationships: Vec<String>,
}

/// One end of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectableRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedConnection {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub source: ConnectableRef,
    pub destination: ConnectableRef,
    #[serde(default)]
    pub selected_relationships: Vec<String>,
}

impl VersionedConnection {
    /// Human readable description for logs
    pub fn describe(&self) -> String {
        format!(
            "{} -> {} [{}]",
            self.source.name.as_deref().unwrap_or(&self.source.id),
            self.destination
                .name
                .as_deref()
                .unwrap_or(&self.destination.id),
            self.selected_relationships.join(",")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedLabel {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub style: IndexMap<String, String>,
}

/// The flow-contents subtree of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowContents {
    #[serde(default)]
    pub processors: Vec<VersionedProcessor>,
    #[serde(default)]
    pub connections: Vec<VersionedConnection>,
    #[serde(default)]
    pub labels: Vec<VersionedLabel>,
}

impl FlowContents {
    /// Every connection endpoint must name a processor in the same contents
    pub fn validate(&self) -> FlowResult<()> {
        let ids: HashSet<&str> = self
            .processors
            .iter()
            .map(|p| p.identifier.as_str())
            .collect();

        for connection in &self.connections {
            for endpoint in [&connection.source, &connection.destination] {
                if !ids.contains(endpoint.id.as_str()) {
                    return Err(FlowError::InvalidFlowDocument(format!(
                        "connection {} references unknown processor {}",
                        connection.describe(),
                        endpoint.id
                    )));
                }
            }
        }
        Ok(())
    }
}

type ContentsLocator = fn(&Value) -> Option<&Value>;

fn snapshot_contents(doc: &Value) -> Option<&Value> {
    doc.get("flowContents")
}

fn wrapped_snapshot_contents(doc: &Value) -> Option<&Value> {
    doc.get("versionedFlowSnapshot")?.get("flowContents")
}

fn bare_contents(doc: &Value) -> Option<&Value> {
    doc.get("processors").map(|_| doc)
}

/// Places a flow-contents subtree is found, tried in order
const CONTENTS_LOCATORS: &[ContentsLocator] = &[
    snapshot_contents,
    wrapped_snapshot_contents,
    bare_contents,
];

#[derive(Debug, Clone)]
pub struct FlowDocument {
    pub name: String,
    pub raw: Value,
    pub contents: FlowContents,
}

impl FlowDocument {
    /// Parse and validate a document, naming it `name`
    pub fn parse(name: &str, content: &str) -> FlowResult<Self> {
        let raw: Value = serde_json::from_str(content)
            .map_err(|e| FlowError::InvalidFlowDocument(format!("{}: {}", name, e)))?;
        if !raw.is_object() {
            return Err(FlowError::InvalidFlowDocument(format!(
                "{}: top-level value is not a JSON object",
                name
            )));
        }

        let contents = match CONTENTS_LOCATORS.iter().find_map(|locate| locate(&raw)) {
            Some(subtree) => FlowContents::deserialize(subtree)
                .map_err(|e| FlowError::InvalidFlowDocument(format!("{}: {}", name, e)))?,
            None => FlowContents::default(),
        };
        contents.validate()?;

        Ok(Self {
            name: name.to_string(),
            raw,
            contents,
        })
    }

    /// Read a document from disk; the file stem becomes its name
    pub fn from_path(path: &Path) -> FlowResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("imported_flow");
        Self::parse(name, &content)
    }

    pub fn processor(&self, identifier: &str) -> Option<&VersionedProcessor> {
        self.contents
            .processors
            .iter()
            .find(|p| p.identifier == identifier)
    }
}
