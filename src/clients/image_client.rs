// src/clients/image_client.rs
//! One still image per scene from a text-to-image endpoint.

use super::{ServiceClient, ServiceError};
use crate::models::{AssetBundle, Scene, Script};
use base64::prelude::*;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

const SERVICE: &str = "image";

pub struct ImageClient {
    service: Option<ServiceClient>,
}

impl ImageClient {
    pub fn new(service: Option<ServiceClient>) -> Self {
        Self { service }
    }

    pub fn degraded() -> Self {
        Self { service: None }
    }

    /// Generate an image for every scene into `images_dir`.
    ///
    /// Scenes are independent: a failed scene is logged and skipped. The
    /// call only fails when no scene produced an image.
    pub async fn generate_for_scenes(&self, script: &Script, images_dir: &Path) -> Result<AssetBundle, ServiceError> {
        tokio::fs::create_dir_all(images_dir)
            .await
            .map_err(|e| ServiceError::io(images_dir, e))?;

        let Some(service) = &self.service else {
            tracing::warn!("Image service not configured, writing SVG placeholders");
            return write_placeholders(script, images_dir).await;
        };

        let mut bundle = AssetBundle::default();
        let mut last_error = None;

        for (index, scene) in script.scenes.iter().enumerate() {
            match self.generate_one(service, script, scene, index, images_dir).await {
                Ok(path) => {
                    tracing::info!("🖼️ Generated image for scene {}: {}", index, path.display());
                    bundle.images.push(path);
                }
                Err(e) => {
                    tracing::warn!(scene = index, "Skipping scene image: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if bundle.images.is_empty() => Err(e),
            _ => Ok(bundle),
        }
    }

    async fn generate_one(
        &self,
        service: &ServiceClient,
        script: &Script,
        scene: &Scene,
        index: usize,
        images_dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        let request = json!({ "inputs": scene_prompt(scene) });
        tracing::debug!(scene = index, title = %script.title, "Requesting scene image");
        let body = service.call(&request).await?;
        let bytes = decode_image(body)?;

        let path = images_dir.join(format!("{}.{}", index, image_extension(&bytes)));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ServiceError::io(&path, e))?;
        Ok(path)
    }
}

fn scene_prompt(scene: &Scene) -> String {
    let mut prompt = scene.description.clone();
    if scene.camera != "static" {
        prompt.push_str(&format!(", {} shot", scene.camera));
    }
    if scene.effects != "none" {
        prompt.push_str(&format!(", {}", scene.effects));
    }
    prompt.push_str(", cinematic lighting, highly detailed");
    prompt
}

/// Image bytes from either a raw binary body or a JSON body carrying the
/// image as base64 (`inlineData.data` or a top-level `image` field)
fn decode_image(body: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
    let Ok(value) = serde_json::from_slice::<Value>(&body) else {
        if body.is_empty() {
            return Err(ServiceError::InvalidResponse {
                service: SERVICE,
                reason: "empty image body".to_string(),
            });
        }
        return Ok(body);
    };

    let encoded = value["candidates"][0]["content"]["parts"]
        .as_array()
        .and_then(|parts| parts.iter().find_map(|part| part["inlineData"]["data"].as_str()))
        .or_else(|| value["image"].as_str());

    match encoded {
        Some(data) => BASE64_STANDARD.decode(data).map_err(|e| ServiceError::InvalidResponse {
            service: SERVICE,
            reason: format!("Failed to decode base64 image: {}", e),
        }),
        None => Err(ServiceError::InvalidResponse {
            service: SERVICE,
            reason: "No image data found in response".to_string(),
        }),
    }
}

fn image_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpg"
    } else if bytes.starts_with(b"GIF8") {
        "gif"
    } else {
        "png"
    }
}

async fn write_placeholders(script: &Script, images_dir: &Path) -> Result<AssetBundle, ServiceError> {
    let mut bundle = AssetBundle {
        placeholder: true,
        ..AssetBundle::default()
    };
    for (index, scene) in script.scenes.iter().enumerate() {
        let path = images_dir.join(format!("{}.svg", index));
        tokio::fs::write(&path, placeholder_svg(index, &scene.description))
            .await
            .map_err(|e| ServiceError::io(&path, e))?;
        bundle.images.push(path);
    }
    Ok(bundle)
}

fn placeholder_svg(index: usize, description: &str) -> String {
    let caption: String = description
        .chars()
        .take(80)
        .map(|c| match c {
            '<' | '>' | '&' | '"' => ' ',
            other => other,
        })
        .collect();
    format!(
        r##"<svg width="1920" height="1080" xmlns="http://www.w3.org/2000/svg">
    <rect width="100%" height="100%" fill="#496d89"/>
    <text x="960" y="500" font-size="48" fill="white" text-anchor="middle">PLACEHOLDER</text>
    <text x="960" y="580" font-size="36" fill="white" text-anchor="middle">Scene {}: {}</text>
</svg>"##,
        index, caption
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{Endpoint, RetryPolicy, TransportError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    /// Fails every request whose prompt mentions "broken"
    struct PickyEndpoint {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Endpoint for PickyEndpoint {
        async fn post(&self, body: &Value) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if body["inputs"].as_str().unwrap_or_default().contains("broken") {
                Err(TransportError::Rejected { status: 422, body: "bad prompt".into() })
            } else {
                Ok(PNG_MAGIC.to_vec())
            }
        }
    }

    fn client() -> (ImageClient, Arc<PickyEndpoint>) {
        let endpoint = Arc::new(PickyEndpoint { calls: AtomicUsize::new(0) });
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let service = ServiceClient::new("image", endpoint.clone(), policy);
        (ImageClient::new(Some(service)), endpoint)
    }

    #[tokio::test]
    async fn test_failed_scene_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (client, endpoint) = client();
        let script = Script::fallback("A lake. A broken bridge. A forest.");

        let bundle = client.generate_for_scenes(&script, dir.path()).await.unwrap();
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 3);
        assert_eq!(bundle.images.len(), 2);
        assert!(!bundle.placeholder);
        assert!(bundle.images.iter().all(|p| p.extension().unwrap() == "png" && p.exists()));
    }

    #[tokio::test]
    async fn test_every_scene_failing_fails_the_call() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = client();
        let script = Script::fallback("A broken lake. A broken bridge.");
        let result = client.generate_for_scenes(&script, dir.path()).await;
        assert!(matches!(result, Err(ServiceError::Permanent { .. })));
    }

    #[tokio::test]
    async fn test_degraded_mode_writes_svg_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let script = Script::fallback("Sun <rises>. Moon sets.");
        let bundle = ImageClient::degraded().generate_for_scenes(&script, dir.path()).await.unwrap();
        assert!(bundle.placeholder);
        assert_eq!(bundle.images.len(), 2);
        let svg = std::fs::read_to_string(&bundle.images[0]).unwrap();
        assert!(svg.contains("PLACEHOLDER"));
        assert!(!svg.contains("<rises>"));
    }

    #[test]
    fn test_decode_inline_base64_image() {
        let encoded = BASE64_STANDARD.encode(PNG_MAGIC);
        let body = serde_json::to_vec(&json!({
            "candidates": [{ "content": { "parts": [{ "text": "here" }, { "inlineData": { "data": encoded } }] } }]
        }))
        .unwrap();
        assert_eq!(decode_image(body).unwrap(), PNG_MAGIC.to_vec());
        assert!(decode_image(br#"{"error": "nope"}"#.to_vec()).is_err());
        assert!(decode_image(Vec::new()).is_err());
    }
}
