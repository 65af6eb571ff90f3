// src/clients/voice_client.rs
//! Narration audio from a text-to-speech endpoint.
//!
//! Voice-over is optional for a video: when the service is not configured or
//! cannot be reached, a silent track of the script's length is written
//! instead and tagged as a placeholder.

use super::{GenerationResult, ServiceClient, ServiceError};
use crate::models::Script;
use serde_json::json;
use std::path::{Path, PathBuf};

const PLACEHOLDER_FILE: &str = "narration_placeholder.wav";
const SILENCE_SAMPLE_RATE: u32 = 8_000;
/// Longest silent track written, whatever the script claims
const MAX_PLACEHOLDER_SECS: u32 = 600;

pub struct VoiceClient {
    service: Option<ServiceClient>,
}

impl VoiceClient {
    pub fn new(service: Option<ServiceClient>) -> Self {
        Self { service }
    }

    pub fn degraded() -> Self {
        Self { service: None }
    }

    pub async fn synthesize(&self, script: &Script, audio_dir: &Path) -> Result<GenerationResult<PathBuf>, ServiceError> {
        tokio::fs::create_dir_all(audio_dir)
            .await
            .map_err(|e| ServiceError::io(audio_dir, e))?;

        let Some(service) = &self.service else {
            tracing::warn!("Voice service not configured, writing silent narration");
            return write_placeholder(script, audio_dir).await;
        };

        let text = script.narration_text();
        tracing::info!("🎙️ Synthesizing narration ({} chars)", text.len());

        let audio = match service.call(&json!({ "inputs": text })).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                tracing::warn!("Voice service returned no audio, writing silent narration");
                return write_placeholder(script, audio_dir).await;
            }
            Err(e) => {
                tracing::warn!("Voice synthesis failed ({}), writing silent narration", e);
                return write_placeholder(script, audio_dir).await;
            }
        };

        let path = audio_dir.join(format!("narration.{}", audio_extension(&audio)));
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| ServiceError::io(&path, e))?;
        Ok(GenerationResult::generated(path))
    }
}

fn audio_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"RIFF") {
        "wav"
    } else if bytes.starts_with(b"fLaC") {
        "flac"
    } else if bytes.starts_with(b"OggS") {
        "ogg"
    } else {
        "mp3"
    }
}

async fn write_placeholder(script: &Script, audio_dir: &Path) -> Result<GenerationResult<PathBuf>, ServiceError> {
    let path = audio_dir.join(PLACEHOLDER_FILE);
    // `as` saturates, NaN becomes 0
    let seconds = (script.total_duration().ceil() as u32).clamp(1, MAX_PLACEHOLDER_SECS);
    tokio::fs::write(&path, silent_wav(seconds))
        .await
        .map_err(|e| ServiceError::io(&path, e))?;
    Ok(GenerationResult::placeholder(path))
}

/// 8-bit mono PCM WAV of silence
fn silent_wav(seconds: u32) -> Vec<u8> {
    let data_len = SILENCE_SAMPLE_RATE.saturating_mul(seconds.min(MAX_PLACEHOLDER_SECS));
    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&SILENCE_SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&SILENCE_SAMPLE_RATE.to_le_bytes()); // byte rate
    wav.extend_from_slice(&1u16.to_le_bytes()); // block align
    wav.extend_from_slice(&8u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    // unsigned 8-bit silence is the midpoint
    wav.resize(44 + data_len as usize, 0x80);
    wav
}
