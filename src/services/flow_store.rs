//! Filesystem store of exported flow documents and their backup generations
//!
//! Layout:
//!
//! ```text
//! <flows_dir>/<safe_name>.json
//! <backups_dir>/<YYYYmmdd_HHMMSS>/<safe_name>.json
//! ```
//!
//! A second generation within the same second gets a `_<n>` suffix.
//! Generations are ordered by parsed timestamp, then suffix; other
//! directories under `<backups_dir>` are ignored.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::common::{sanitize_flow_name, write_string_to_file};
use crate::errors::FlowResult;

const GENERATION_FORMAT: &str = "%Y%m%d_%H%M%S";
const STAMP_LEN: usize = "YYYYmmdd_HHMMSS".len();

#[derive(Debug, Clone)]
pub struct FlowStore {
    flows_dir: PathBuf,
    backups_dir: PathBuf,
}

impl FlowStore {
    pub fn new(flows_dir: impl Into<PathBuf>, backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            flows_dir: flows_dir.into(),
            backups_dir: backups_dir.into(),
        }
    }

    pub fn flows_dir(&self) -> &Path {
        &self.flows_dir
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Path a flow with this display name is written to
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.flows_dir
            .join(format!("{}.json", sanitize_flow_name(name)))
    }

    /// Write a flow document pretty-printed, replacing any previous export
    pub fn write(&self, name: &str, json: &Value) -> FlowResult<PathBuf> {
        let path = self.path_for(name);
        let mut content = serde_json::to_string_pretty(json)?;
        content.push('\n');
        write_string_to_file(&path, &content)?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Flow files in the primary directory, sorted by name
    pub fn list_flow_files(&self) -> FlowResult<Vec<PathBuf>> {
        json_files(&self.flows_dir)
    }

    /// Backup generation directories, oldest first
    pub fn list_generations(&self) -> FlowResult<Vec<PathBuf>> {
        if !self.backups_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut generations = Vec::new();
        for entry in std::fs::read_dir(&self.backups_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            match path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(generation_key)
            {
                Some(key) => generations.push((key, path)),
                None => debug!("Ignoring {}: not a backup generation", path.display()),
            }
        }
        generations.sort();
        Ok(generations.into_iter().map(|(_, path)| path).collect())
    }

    /// Copy every flow file into a new timestamped generation
    pub fn create_backup(&self) -> FlowResult<Option<PathBuf>> {
        let files = self.list_flow_files()?;
        if files.is_empty() {
            warn!("No flow files in {} to back up", self.flows_dir.display());
            return Ok(None);
        }

        let generation = self.next_generation_dir();
        std::fs::create_dir_all(&generation)?;
        for file in &files {
            if let Some(file_name) = file.file_name() {
                std::fs::copy(file, generation.join(file_name))?;
            }
        }
        info!(
            "Backed up {} flow files to {}",
            files.len(),
            generation.display()
        );
        Ok(Some(generation))
    }

    fn next_generation_dir(&self) -> PathBuf {
        let stamp = Utc::now().format(GENERATION_FORMAT).to_string();
        let mut candidate = self.backups_dir.join(&stamp);
        let mut suffix = 1;
        while candidate.exists() {
            candidate = self.backups_dir.join(format!("{}_{}", stamp, suffix));
            suffix += 1;
        }
        candidate
    }

    /// Files of the newest generation, or of the flows directory when no
    /// backup exists yet
    pub fn read_latest_backup_set(&self) -> FlowResult<Vec<PathBuf>> {
        match self.list_generations()?.last() {
            Some(newest) => {
                debug!("Using backup generation {}", newest.display());
                json_files(newest)
            }
            None => {
                debug!(
                    "No backup generations, using {}",
                    self.flows_dir.display()
                );
                self.list_flow_files()
            }
        }
    }

    /// Union of all generations; on a file name collision the later
    /// generation wins
    pub fn read_all_backup_sets(&self) -> FlowResult<Vec<PathBuf>> {
        let mut merged: BTreeMap<OsString, PathBuf> = BTreeMap::new();
        for generation in self.list_generations()? {
            for file in json_files(&generation)? {
                if let Some(file_name) = file.file_name() {
                    merged.insert(file_name.to_os_string(), file);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    /// Copy files into the flows directory, returning how many were copied
    pub fn restore(&self, files: &[PathBuf]) -> FlowResult<usize> {
        std::fs::create_dir_all(&self.flows_dir)?;
        let mut restored = 0;
        for file in files {
            let Some(file_name) = file.file_name() else {
                continue;
            };
            let target = self.flows_dir.join(file_name);
            if target != *file {
                std::fs::copy(file, &target)?;
            }
            restored += 1;
        }
        info!(
            "Restored {} flow files into {}",
            restored,
            self.flows_dir.display()
        );
        Ok(restored)
    }
}

/// Order of a generation directory named `<stamp>` or `<stamp>_<n>`, where
/// `n` counts generations created within the same second
fn generation_key(name: &str) -> Option<(NaiveDateTime, u32)> {
    let (stamp, suffix) = match name.get(STAMP_LEN..) {
        None | Some("") => (name, 0),
        Some(rest) => (&name[..STAMP_LEN], rest.strip_prefix('_')?.parse().ok()?),
    };
    let created = NaiveDateTime::parse_from_str(stamp, GENERATION_FORMAT).ok()?;
    Some((created, suffix))
}

fn json_files(dir: &Path) -> FlowResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
