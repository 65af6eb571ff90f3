// src/models/script.rs
use serde::{Deserialize, Serialize};

/// Duration given to every scene of a fallback script, in seconds
pub const DEFAULT_SCENE_DURATION: f64 = 5.0;

/// Maximum number of scenes a fallback script is split into
pub const MAX_FALLBACK_SCENES: usize = 5;

const MAX_TITLE_CHARS: usize = 80;

lazy_static::lazy_static! {
    static ref SENTENCE_BOUNDARY: regex::Regex = regex::Regex::new(r"[.!?]+").unwrap();
}

fn default_camera() -> String {
    "static".to_string()
}

fn default_effects() -> String {
    "none".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub description: String,
    /// Seconds, always > 0
    pub duration: f64,
    #[serde(default = "default_camera")]
    pub camera: String,
    #[serde(default = "default_effects")]
    pub effects: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    pub scenes: Vec<Scene>,
}

impl Script {
    pub fn total_duration(&self) -> f64 {
        self.scenes.iter().map(|scene| scene.duration).sum()
    }

    /// Check the fields a model response must carry to be usable
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("script has no title".to_string());
        }
        if self.scenes.is_empty() {
            return Err("script has no scenes".to_string());
        }
        for (index, scene) in self.scenes.iter().enumerate() {
            if scene.description.trim().is_empty() {
                return Err(format!("scene {} has no description", index));
            }
            if !scene.duration.is_finite() || scene.duration <= 0.0 {
                return Err(format!("scene {} has invalid duration {}", index, scene.duration));
            }
        }
        Ok(())
    }

    /// Deterministic script built from the prompt alone: one scene per
    /// sentence-like chunk, capped at [`MAX_FALLBACK_SCENES`].
    pub fn fallback(prompt: &str) -> Self {
        let mut chunks: Vec<String> = SENTENCE_BOUNDARY
            .split(prompt)
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .take(MAX_FALLBACK_SCENES)
            .map(str::to_string)
            .collect();

        if chunks.is_empty() {
            let whole = prompt.trim();
            chunks.push(if whole.is_empty() { "Untitled scene".to_string() } else { whole.to_string() });
        }

        let scenes = chunks
            .into_iter()
            .map(|chunk| Scene {
                description: chunk.clone(),
                duration: DEFAULT_SCENE_DURATION,
                camera: default_camera(),
                effects: default_effects(),
                narration: Some(chunk),
            })
            .collect();

        Self {
            title: truncate_title(prompt),
            prompt: prompt.to_string(),
            scenes,
        }
    }

    /// Text for the voice-over: scene narrations, or descriptions when none is given
    pub fn narration_text(&self) -> String {
        let lines: Vec<&str> = self
            .scenes
            .iter()
            .map(|scene| scene.narration.as_deref().unwrap_or(&scene.description).trim())
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            self.title.clone()
        } else {
            lines.join(" ")
        }
    }
}

fn truncate_title(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.chars().count() <= MAX_TITLE_CHARS {
        return trimmed.to_string();
    }
    let mut title: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    title.push_str("...");
    title
}
