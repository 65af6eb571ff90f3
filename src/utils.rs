// src/utils.rs - Filesystem and subprocess helpers shared by the pipeline stages
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;

/// Resolve an executable the way a shell would: paths containing a
/// separator must exist, bare names are searched on `PATH`.
pub fn resolve_executable(program: &Path) -> Option<PathBuf> {
    if program.as_os_str().is_empty() {
        return None;
    }
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }
    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Run a program to completion with captured output. Does not inspect the
/// exit status.
pub async fn run_command(program: &Path, args: &[&std::ffi::OsStr]) -> std::io::Result<Output> {
    tracing::debug!("Executing: {} {:?}", program.display(), args);
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
}

/// Last `max_lines` lines of a process stream, for error messages
pub fn tail_lines(bytes: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Pretty JSON written through a temp file and renamed into place
pub async fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await
}

/// Lowercase file extension
pub fn get_file_extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Image extensions an uploaded reference image may carry
pub const UPLOAD_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Lowercase extension of an accepted reference image, `None` otherwise
pub fn supported_image_extension(path: &str) -> Option<String> {
    get_file_extension(path).filter(|ext| UPLOAD_EXTENSIONS.contains(&ext.as_str()))
}
