//! Image generation through the Imagen `predict` endpoint.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use super::error::GenerationError;
use super::prompt::image_prompt;
use super::vertex::VertexClient;
use super::{GeneratedImage, ImageGenerator};
use crate::catalog::Attributes;

const SERVICE: &str = "image generation";

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    rai_filtered_reason: Option<String>,
}

pub struct ImagenClient {
    vertex: Arc<VertexClient>,
    model: String,
}

impl ImagenClient {
    pub fn new(vertex: Arc<VertexClient>, model: impl Into<String>) -> Self {
        Self {
            vertex,
            model: model.into(),
        }
    }

    fn request_body(prompt: &str) -> serde_json::Value {
        json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": "1:1",
                "language": "en",
                "safetyFilterLevel": "block_some",
                "personGeneration": "allow_adult"
            }
        })
    }
}

impl ImageGenerator for ImagenClient {
    fn generate_image(&self, attributes: &Attributes) -> Result<GeneratedImage, GenerationError> {
        let prompt = image_prompt(attributes);
        let url = self.vertex.model_url(&self.model, "predict");
        let response: PredictResponse =
            self.vertex
                .post_json(SERVICE, &url, &Self::request_body(&prompt))?;
        parse_prediction(response)
    }
}

fn parse_prediction(response: PredictResponse) -> Result<GeneratedImage, GenerationError> {
    let prediction = response
        .predictions
        .into_iter()
        .next()
        .ok_or(GenerationError::Empty {
            service: SERVICE,
            what: "predictions",
        })?;

    let Some(encoded) = prediction.bytes_base64_encoded.filter(|b| !b.is_empty()) else {
        return Err(match prediction.rai_filtered_reason {
            Some(reason) => GenerationError::InvalidResponse {
                service: SERVICE,
                reason: format!("image filtered: {}", reason),
            },
            None => GenerationError::Empty {
                service: SERVICE,
                what: "image bytes",
            },
        });
    };

    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| GenerationError::InvalidResponse {
            service: SERVICE,
            reason: format!("bad base64 payload: {}", e),
        })?;
    if bytes.is_empty() {
        return Err(GenerationError::Empty {
            service: SERVICE,
            what: "image bytes",
        });
    }

    Ok(GeneratedImage {
        bytes,
        mime_type: prediction
            .mime_type
            .unwrap_or_else(|| "image/png".to_string()),
    })
}
