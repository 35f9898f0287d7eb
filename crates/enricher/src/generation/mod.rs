//! Generation Clients: image generation from product attributes and
//! description generation from attributes plus the generated image.

pub mod error;
pub mod gemini;
pub mod imagen;
pub mod prompt;
pub mod rate_limit;
pub mod vertex;

pub use error::GenerationError;
pub use gemini::GeminiClient;
pub use imagen::ImagenClient;
pub use rate_limit::RateLimiter;
pub use vertex::VertexClient;

use crate::catalog::Attributes;

/// A generated image as returned by the image service.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/png".to_string(),
        }
    }

    /// File extension matching the MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

pub trait ImageGenerator: Send + Sync {
    fn generate_image(&self, attributes: &Attributes) -> Result<GeneratedImage, GenerationError>;
}

pub trait DescriptionGenerator: Send + Sync {
    fn generate_description(
        &self,
        attributes: &Attributes,
        image: &GeneratedImage,
    ) -> Result<String, GenerationError>;
}
