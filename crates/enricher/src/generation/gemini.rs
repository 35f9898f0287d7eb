//! Description generation through the Gemini `generateContent` endpoint.
//!
//! The generated image is sent inline alongside the text prompt so the
//! description matches what the image actually shows.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use super::error::GenerationError;
use super::prompt::description_prompt;
use super::vertex::VertexClient;
use super::{DescriptionGenerator, GeneratedImage};
use crate::catalog::Attributes;

const SERVICE: &str = "description generation";

const MAX_OUTPUT_TOKENS: u32 = 8192;
const TEMPERATURE: f32 = 0.2;
const TOP_P: f32 = 0.95;

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HARASSMENT",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

pub struct GeminiClient {
    vertex: Arc<VertexClient>,
    model: String,
}

impl GeminiClient {
    pub fn new(vertex: Arc<VertexClient>, model: impl Into<String>) -> Self {
        Self {
            vertex,
            model: model.into(),
        }
    }

    fn request_body(prompt: &str, image: &GeneratedImage) -> serde_json::Value {
        let safety_settings: Vec<_> = SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({ "category": category, "threshold": "OFF" }))
            .collect();

        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt },
                    {
                        "inlineData": {
                            "mimeType": image.mime_type,
                            "data": STANDARD.encode(&image.bytes)
                        }
                    }
                ]
            }],
            "generationConfig": {
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
                "temperature": TEMPERATURE,
                "topP": TOP_P
            },
            "safetySettings": safety_settings
        })
    }
}

impl DescriptionGenerator for GeminiClient {
    fn generate_description(
        &self,
        attributes: &Attributes,
        image: &GeneratedImage,
    ) -> Result<String, GenerationError> {
        let prompt = description_prompt(attributes);
        let url = self.vertex.model_url(&self.model, "generateContent");
        let response: GenerateContentResponse =
            self.vertex
                .post_json(SERVICE, &url, &Self::request_body(&prompt, image))?;
        parse_description(response)
    }
}

fn parse_description(response: GenerateContentResponse) -> Result<String, GenerationError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::InvalidResponse {
            service: SERVICE,
            reason: format!("prompt blocked: {}", reason),
        });
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(GenerationError::Empty {
            service: SERVICE,
            what: "candidates",
        })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let text = text.trim();

    if text.is_empty() {
        return Err(match candidate.finish_reason.as_deref() {
            Some(reason) if reason != "STOP" => GenerationError::InvalidResponse {
                service: SERVICE,
                reason: format!("generation stopped: {}", reason),
            },
            _ => GenerationError::Empty {
                service: SERVICE,
                what: "description text",
            },
        });
    }

    Ok(text.to_string())
}
