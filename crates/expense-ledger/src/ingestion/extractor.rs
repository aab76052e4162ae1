//! Receipt detail extraction through generative models
//!
//! Routes a receipt file to the right model, prompts for a strict JSON
//! shape, and parses the reply. PDFs try the embedded-image vision path
//! first and fall back to text extraction; a failed image read is terminal
//! for every other image type.

use std::path::Path;
use std::sync::Arc;

use lopdf::{Dictionary, Object};
use tracing::warn;

use crate::config::GeminiConfig;
use crate::error::{Error, Result};
use crate::ingestion::strategy::ExtractionStrategy;
use crate::providers::{GenerativeModel, MediaPart};
use crate::types::ReceiptPayload;

const NO_VALID_DETAILS: &str = "Failed to get valid details from the model.";

/// Extracts structured expense details from receipt files
pub struct ReceiptExtractor {
    model: Arc<dyn GenerativeModel>,
    vision_model: String,
    text_model: String,
}

impl ReceiptExtractor {
    pub fn new(model: Arc<dyn GenerativeModel>, config: &GeminiConfig) -> Self {
        Self {
            model,
            vision_model: config.vision_model.clone(),
            text_model: config.text_model.clone(),
        }
    }

    /// Extract expense details from the receipt at `path`.
    pub async fn extract(&self, path: &Path, user_id: &str) -> Result<ReceiptPayload> {
        let prompt = receipt_prompt(user_id);

        match ExtractionStrategy::from_path(path) {
            ExtractionStrategy::Image => {
                let media = image_media(path).await?;
                self.generate_and_parse(&self.vision_model, &prompt, Some(media))
                    .await
            }
            ExtractionStrategy::Pdf => {
                let data = tokio::fs::read(path).await.map_err(|e| {
                    Error::extraction(format!("Failed to extract text from PDF: {}", e))
                })?;
                // Parsing the whole document is blocking work; the bytes ride
                // along so the text fallback can reuse them.
                let (data, embedded) = tokio::task::spawn_blocking(move || {
                    let embedded = first_embedded_image(&data);
                    (data, embedded)
                })
                .await
                .map_err(|e| Error::extraction(format!("Task join error: {}", e)))?;
                match embedded {
                    Ok(media) => {
                        self.generate_and_parse(&self.vision_model, &prompt, Some(media))
                            .await
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e,
                              "vision processing failed, attempting to process as text");
                        let text = tokio::task::spawn_blocking(move || pdf_text(&data))
                            .await
                            .map_err(|e| {
                                Error::extraction(format!("Task join error: {}", e))
                            })??;
                        let prompt = format!("{}\n{}", prompt, text);
                        self.generate_and_parse(&self.text_model, &prompt, None).await
                    }
                }
            }
            ExtractionStrategy::Text => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::extraction(format!("Failed to read text file: {}", e))
                })?;
                let prompt = format!("{}\n{}", prompt, text);
                self.generate_and_parse(&self.text_model, &prompt, None).await
            }
        }
    }

    /// Run one model call and parse the reply. Model failures and malformed
    /// replies both surface as the same terminal extraction error, with the
    /// underlying cause kept on the warn channel.
    async fn generate_and_parse(
        &self,
        model: &str,
        prompt: &str,
        media: Option<MediaPart>,
    ) -> Result<ReceiptPayload> {
        let raw = match self.model.generate(model, prompt, media).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(model, error = %e, "content generation failed");
                return Err(Error::extraction(NO_VALID_DETAILS));
            }
        };
        ReceiptPayload::parse(&raw).map_err(|e| {
            warn!(model, error = %e, "model reply was not valid receipt JSON");
            Error::extraction(NO_VALID_DETAILS)
        })
    }
}

/// The extraction prompt. The reply must be a bare JSON object with a
/// single `expenses` key.
fn receipt_prompt(user_id: &str) -> String {
    format!(
        r#"Analyze the following receipt and extract the expense details.
Provide the output in a clean JSON format. Do not include the markdown "```json" wrapper.
The user ID is "{user_id}".
Use the current date and time if the creation date is not found in the receipt.

The JSON object should have a single key "expenses" with the following structure:
{{
    "expenses": {{
        "title": "string",
        "category": "string (e.g., Food, Travel, Office Supplies)",
        "amount": "float",
        "description": "string",
    }}
}}"#
    )
}

async fn image_media(path: &Path) -> Result<MediaPart> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| Error::extraction(format!("Failed to process image file: {}", e)))?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok(MediaPart::new(mime.essence_str(), data))
}

/// Find the first JPEG-encoded image object in the document. Scanned
/// receipts are typically a single full-page DCTDecode stream.
fn first_embedded_image(data: &[u8]) -> Result<MediaPart> {
    let doc = lopdf::Document::load_mem(data)
        .map_err(|e| Error::extraction(format!("Could not extract image from PDF: {}", e)))?;

    for object in doc.objects.values() {
        let Object::Stream(stream) = object else {
            continue;
        };
        if !is_image_stream(&stream.dict) {
            continue;
        }
        if is_dct_encoded(&stream.dict) && !stream.content.is_empty() {
            return Ok(MediaPart::new("image/jpeg", stream.content.clone()));
        }
    }

    Err(Error::extraction("Could not extract image from PDF."))
}

fn is_image_stream(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype").and_then(Object::as_name), Ok(b"Image"))
}

fn is_dct_encoded(dict: &Dictionary) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => name.as_slice() == b"DCTDecode",
        Ok(Object::Array(filters)) => filters
            .iter()
            .any(|f| matches!(f, Object::Name(n) if n.as_slice() == b"DCTDecode")),
        _ => false,
    }
}

/// Extract PDF text on a dedicated thread with a timeout; pdf-extract can
/// hang on problematic fonts.
fn pdf_text(data: &[u8]) -> Result<String> {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    let data_vec = data.to_vec();
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let result = pdf_extract::extract_text_from_mem(&data_vec);
        let _ = tx.send(result);
    });

    let text = match rx.recv_timeout(Duration::from_secs(60)) {
        Ok(Ok(text)) => {
            let _ = handle.join();
            text
        }
        Ok(Err(e)) => {
            let _ = handle.join();
            return Err(Error::extraction(format!(
                "Failed to extract text from PDF: {}",
                e
            )));
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            // The worker cannot be killed; leave it behind.
            return Err(Error::extraction(
                "Failed to extract text from PDF: extraction timed out",
            ));
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            return Err(Error::extraction(
                "Failed to extract text from PDF: extraction thread crashed",
            ));
        }
    };

    if text.trim().is_empty() {
        return Err(Error::extraction("PDF contains no extractable text."));
    }
    Ok(text)
}
