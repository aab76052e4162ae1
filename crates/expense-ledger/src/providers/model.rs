//! Generative model trait behind extraction and advice

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;

/// An inline binary attachment for multimodal prompts.
#[derive(Debug, Clone)]
pub struct MediaPart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl MediaPart {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// Stream of generated text chunks.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Trait for text generation against a hosted model
///
/// Implementations:
/// - `GeminiClient`: Google Generative Language API (API-key auth)
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Generate a single completion. `media` attaches an inline image for
    /// vision-capable models, ordered after the prompt text.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        media: Option<MediaPart>,
    ) -> Result<String>;

    /// Generate a streamed completion, yielding text chunks as they arrive.
    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TextStream>;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
