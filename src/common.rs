use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use std::fs::File;
use std::io::Write;
use std::path::Path;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s").expect("valid regex"));
static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("valid regex"));

pub fn create_path_if_not_exists(path: &Path) -> std::io::Result<()> {
    // only the directory part of the path
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if !parent.as_os_str().is_empty() && !parent.exists() {
        info!("Creating path: {:?}", parent);
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn write_string_to_file(path: &Path, content: &str) -> std::io::Result<()> {
    create_path_if_not_exists(path)?;
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// File-name-safe form of a flow display name.
///
/// Whitespace becomes `_`, then anything outside `[A-Za-z0-9_-]` is dropped.
/// Case is preserved.
pub fn sanitize_flow_name(name: &str) -> String {
    let underscored = WHITESPACE.replace_all(name, "_");
    UNSAFE_CHARS.replace_all(&underscored, "").into_owned()
}
