//! Latest-version selection and version metadata formatting

use chrono::{DateTime, Utc};

use crate::errors::{FlowError, FlowResult};
use crate::model::VersionMeta;

/// The version with the highest number, whatever order the API returned
pub fn latest(flow_id: &str, versions: &[VersionMeta]) -> FlowResult<VersionMeta> {
    versions
        .iter()
        .max_by_key(|meta| meta.version)
        .cloned()
        .ok_or_else(|| FlowError::NoVersionsFound(flow_id.to_string()))
}

/// Versions in ascending numeric order
pub fn sorted(versions: &[VersionMeta]) -> Vec<VersionMeta> {
    let mut sorted = versions.to_vec();
    sorted.sort_by_key(|meta| meta.version);
    sorted
}

/// One-line description for listings and audit output
pub fn format_version(meta: &VersionMeta) -> String {
    let mut line = format!("v{}", meta.version);

    if let Some(when) = meta.timestamp.and_then(DateTime::<Utc>::from_timestamp_millis) {
        line.push_str(&format!(" ({})", when.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if let Some(author) = meta.author.as_deref().filter(|a| !a.is_empty()) {
        line.push_str(&format!(" by {}", author));
    }
    if let Some(comments) = meta.comments.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        line.push_str(&format!(" - {}", comments));
    }
    line
}
