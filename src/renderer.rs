// src/renderer.rs
//! Hands a render job to the external 3D renderer.
//!
//! The renderer runs headless as a child process. Everything it needs is
//! written to a temporary JSON descriptor whose path is passed after `--`:
//!
//! ```text
//! <binary> --background [--python <scene script>] -- <descriptor.json>
//! ```
//!
//! When no renderer is installed the invoker writes a marked placeholder
//! file instead so the rest of the pipeline can still run.

use crate::config::RendererConfig;
use crate::models::{AssetBundle, Script};
use crate::utils::{resolve_executable, run_command, tail_lines};
use serde::Serialize;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bumped whenever the descriptor layout changes
pub const DESCRIPTOR_VERSION: u32 = 1;

const OUTPUT_FILE: &str = "animation.mp4";
const PLACEHOLDER_FILE: &str = "animation_placeholder.mp4";
const STDERR_TAIL_LINES: usize = 20;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("renderer is not configured or not installed")]
    NotConfigured,
    #[error("failed to start renderer: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("renderer exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("renderer reported success but produced no artifact at {0}")]
    MissingOutput(PathBuf),
    #[error("failed to write render descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
    #[error("render I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct RenderDescriptor<'a> {
    version: u32,
    job_dir: &'a Path,
    script: &'a Script,
    assets: &'a AssetBundle,
    output_file: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    pub output_path: PathBuf,
    pub placeholder: bool,
}

pub struct RendererInvoker {
    binary: Option<PathBuf>,
    scene_script: Option<PathBuf>,
}

impl RendererInvoker {
    pub fn new(config: &RendererConfig) -> Self {
        let binary = config.binary.as_deref().and_then(|configured| {
            let resolved = resolve_executable(configured);
            if resolved.is_none() {
                tracing::warn!("Renderer not found at {}, animations will be placeholders", configured.display());
            }
            resolved
        });
        Self {
            binary,
            scene_script: config.scene_script.clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    /// Render the animation for one job into `<job_dir>/animation.mp4`.
    /// Waits for the renderer to exit; there is no time limit.
    pub async fn render(&self, job_dir: &Path, script: &Script, assets: &AssetBundle) -> Result<RenderOutcome, RenderError> {
        let Some(binary) = &self.binary else {
            return write_placeholder(job_dir).await;
        };

        let output_file = job_dir.join(OUTPUT_FILE);
        // A stale artifact from an earlier attempt must not count as success
        if tokio::fs::try_exists(&output_file).await? {
            tokio::fs::remove_file(&output_file).await?;
        }

        let descriptor = RenderDescriptor {
            version: DESCRIPTOR_VERSION,
            job_dir,
            script,
            assets,
            output_file: &output_file,
        };
        let mut descriptor_file = tempfile::Builder::new()
            .prefix("render_")
            .suffix(".json")
            .tempfile_in(job_dir)?;
        serde_json::to_writer_pretty(descriptor_file.as_file_mut(), &descriptor)?;
        descriptor_file.as_file_mut().flush()?;

        let mut args: Vec<&OsStr> = vec![OsStr::new("--background")];
        if let Some(scene_script) = &self.scene_script {
            args.push(OsStr::new("--python"));
            args.push(scene_script.as_os_str());
        }
        args.push(OsStr::new("--"));
        args.push(descriptor_file.path().as_os_str());

        tracing::info!("🎞️ Starting renderer for {}", job_dir.display());
        let output = run_command(binary, &args).await.map_err(RenderError::Spawn)?;

        if !output.status.success() {
            // Keep the descriptor around for debugging the failed render
            let kept = descriptor_file.into_temp_path().keep().ok();
            if let Some(path) = kept {
                tracing::error!("Renderer failed, descriptor kept at {}", path.display());
            }
            return Err(RenderError::Failed {
                code: output.status.code(),
                stderr: tail_lines(&output.stderr, STDERR_TAIL_LINES),
            });
        }

        if !tokio::fs::try_exists(&output_file).await? {
            return Err(RenderError::MissingOutput(output_file));
        }

        descriptor_file.close()?;
        tracing::info!("✅ Animation rendered to {}", output_file.display());
        Ok(RenderOutcome {
            output_path: output_file,
            placeholder: false,
        })
    }

    /// First non-empty line of `<binary> --version`
    pub async fn get_version(&self) -> Result<String, RenderError> {
        let binary = self.binary.as_ref().ok_or(RenderError::NotConfigured)?;
        let output = run_command(binary, &[OsStr::new("--version")])
            .await
            .map_err(RenderError::Spawn)?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                code: output.status.code(),
                stderr: tail_lines(&output.stderr, STDERR_TAIL_LINES),
            });
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RenderError::Failed {
                code: output.status.code(),
                stderr: "renderer printed no version".to_string(),
            })
    }
}

async fn write_placeholder(job_dir: &Path) -> Result<RenderOutcome, RenderError> {
    tracing::warn!("Renderer unavailable, writing placeholder animation");
    let output_path = job_dir.join(PLACEHOLDER_FILE);
    tokio::fs::write(&output_path, b"PLACEHOLDER ANIMATION: renderer not available\n").await?;
    Ok(RenderOutcome {
        output_path,
        placeholder: true,
    })
}
