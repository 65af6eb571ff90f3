// src/models/assets.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Files produced by the asset stage. Written to `assets.json` as the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBundle {
    #[serde(default)]
    pub images: Vec<PathBuf>,
    #[serde(default)]
    pub audio: Vec<PathBuf>,
    #[serde(default)]
    pub models: Vec<PathBuf>,
    /// Uploaded reference image the job was created with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<PathBuf>,
    #[serde(default)]
    pub placeholder: bool,
}
