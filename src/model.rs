//! Registry-side entities as returned by the NiFi Registry REST API

use serde::{Deserialize, Serialize};

/// Registry container grouping related flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    #[serde(alias = "identifier")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A named, versioned flow definition stored in a bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    #[serde(alias = "identifier")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "bucketIdentifier")]
    pub bucket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_count: Option<i64>,
}

/// Metadata of one flow version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMeta {
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl VersionMeta {
    pub fn new(version: i64) -> Self {
        Self {
            version,
            comments: None,
            timestamp: None,
            author: None,
        }
    }
}
