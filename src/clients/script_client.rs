// src/clients/script_client.rs
//! Turns a user prompt into a structured [`Script`] via a text-generation endpoint.

use super::{GenerationResult, ServiceClient, ServiceError};
use crate::models::Script;
use serde_json::{json, Value};

pub struct ScriptClient {
    service: Option<ServiceClient>,
}

impl ScriptClient {
    pub fn new(service: Option<ServiceClient>) -> Self {
        Self { service }
    }

    /// Client that never calls out and always returns the fallback script
    pub fn degraded() -> Self {
        Self { service: None }
    }

    pub async fn generate(&self, prompt: &str) -> Result<GenerationResult<Script>, ServiceError> {
        let Some(service) = &self.service else {
            tracing::warn!("Script service not configured, using prompt-based script");
            return Ok(GenerationResult::placeholder(Script::fallback(prompt)));
        };

        let request = json!({
            "inputs": build_instruction(prompt),
            "parameters": {
                "max_new_tokens": 1024,
                "temperature": 0.7,
                "return_full_text": false
            }
        });

        let body = service.call(&request).await?;
        let text = extract_generated_text(&body);
        tracing::debug!("Script model returned {} chars", text.len());

        Ok(GenerationResult::generated(parse_script(prompt, &text)))
    }
}

fn build_instruction(prompt: &str) -> String {
    format!(
        "You are a video script writer. Write a short animated video script for the idea below.\n\
         Reply with JSON only, shaped as:\n\
         {{\"title\": string, \"scenes\": [{{\"description\": string, \"duration\": seconds, \
         \"camera\": string, \"effects\": string, \"narration\": string}}]}}\n\n\
         Idea: {}",
        prompt.trim()
    )
}

/// Pull the generated text out of the response body. Accepts
/// `[{"generated_text": ..}]`, `{"generated_text": ..}` or plain text.
fn extract_generated_text(body: &[u8]) -> String {
    let raw = String::from_utf8_lossy(body);
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Array(items)) => items
            .first()
            .and_then(|item| item.get("generated_text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| raw.into_owned()),
        Ok(Value::Object(map)) => map
            .get("generated_text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| raw.into_owned()),
        Ok(Value::String(text)) => text,
        _ => raw.into_owned(),
    }
}

/// Decode the JSON object embedded in `text`, or fall back to a script
/// derived from the prompt when there is none or it lacks required fields.
pub fn parse_script(prompt: &str, text: &str) -> Script {
    let candidate = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            tracing::warn!("No JSON object in script response, using fallback");
            return Script::fallback(prompt);
        }
    };

    match serde_json::from_str::<Script>(candidate) {
        Ok(mut script) => match script.validate() {
            Ok(()) => {
                script.prompt = prompt.to_string();
                script
            }
            Err(reason) => {
                tracing::warn!("Script response incomplete ({}), using fallback", reason);
                Script::fallback(prompt)
            }
        },
        Err(e) => {
            tracing::warn!("Failed to decode script response: {}, using fallback", e);
            Script::fallback(prompt)
        }
    }
}
