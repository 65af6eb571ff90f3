// src/audio.rs - Mux the narration track onto the rendered animation with FFmpeg
use crate::models::ArtifactRecord;
use crate::utils::{resolve_executable, run_command, tail_lines};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("failed to start ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("ffmpeg exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("mux I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxOutcome {
    pub path: PathBuf,
    pub placeholder: bool,
}

pub struct AudioMuxer {
    ffmpeg: Option<PathBuf>,
}

impl AudioMuxer {
    pub fn new(ffmpeg: &Path) -> Self {
        let ffmpeg = resolve_executable(ffmpeg);
        if ffmpeg.is_none() {
            tracing::warn!("FFmpeg not found, final videos will be copies of the animation");
        }
        Self { ffmpeg }
    }

    /// Combine `video` and `audio` into `output`.
    ///
    /// Placeholder inputs cannot be muxed, so the video is copied through and
    /// the result is tagged as a placeholder. The same happens without FFmpeg.
    pub async fn mux(&self, video: &ArtifactRecord, audio: &ArtifactRecord, output: &Path) -> Result<MuxOutcome, MuxError> {
        let ffmpeg = match &self.ffmpeg {
            Some(ffmpeg) if !video.placeholder && !audio.placeholder => ffmpeg,
            _ => {
                tracing::info!("Copying animation to {} without muxing", output.display());
                tokio::fs::copy(&video.path, output).await?;
                return Ok(MuxOutcome {
                    path: output.to_path_buf(),
                    placeholder: true,
                });
            }
        };

        let args: [&OsStr; 11] = [
            OsStr::new("-i"),
            video.path.as_os_str(),
            OsStr::new("-i"),
            audio.path.as_os_str(),
            OsStr::new("-c:v"),
            OsStr::new("copy"),
            OsStr::new("-c:a"),
            OsStr::new("aac"),
            OsStr::new("-shortest"),
            OsStr::new("-y"),
            output.as_os_str(),
        ];
        let result = run_command(ffmpeg, &args).await.map_err(MuxError::Spawn)?;

        if !result.status.success() {
            return Err(MuxError::Failed {
                code: result.status.code(),
                stderr: tail_lines(&result.stderr, 20),
            });
        }

        tracing::info!("🔊 Muxed narration into {}", output.display());
        Ok(MuxOutcome {
            path: output.to_path_buf(),
            placeholder: false,
        })
    }
}
