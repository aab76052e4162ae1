//! Gemini client for the Google Generative Language API
//!
//! Talks to the public `generativelanguage` endpoint with API-key auth.
//! Covers one-shot text, inline-image vision, and SSE streaming.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures_util::{future, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;
use crate::error::{Error, Result};
use crate::providers::model::{GenerativeModel, MediaPart, TextStream};

/// Gemini client over the REST surface
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a client from configuration. Fails when no API key is set.
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_owned();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the API endpoint URL for a model action
    fn endpoint(&self, model: &str, action: &str) -> String {
        format!(
            "{}/{}:{}?key={}",
            self.base_url, model, action, self.api_key
        )
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "topP")]
    top_p: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 2048,
            top_p: 0.95,
        }
    }
}

// Safety-blocked prompts come back with no candidates at all, and the
// final SSE event carries a content without parts; both default to empty.
#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

fn build_request(prompt: &str, media: Option<MediaPart>) -> GenerateRequest {
    let mut parts = vec![Part {
        text: Some(prompt.to_string()),
        inline_data: None,
    }];
    if let Some(media) = media {
        parts.push(Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: media.mime_type,
                data: base64::engine::general_purpose::STANDARD.encode(&media.data),
            }),
        });
    }

    GenerateRequest {
        contents: vec![Content {
            role: "user".to_string(),
            parts,
        }],
        generation_config: GenerationConfig::default(),
    }
}

/// Decode and parse every complete line buffered so far. Transport reads can
/// split an event mid-line (even mid-codepoint), so bytes after the last
/// newline stay in `buf` until the next read completes them.
fn drain_complete_lines(buf: &mut Vec<u8>) -> String {
    let Some(end) = buf.iter().rposition(|&b| b == b'\n') else {
        return String::new();
    };
    let complete: Vec<u8> = buf.drain(..=end).collect();
    collect_sse_text(&String::from_utf8_lossy(&complete))
}

/// Pull the text out of every `data:` line in an SSE chunk.
fn collect_sse_text(chunk: &str) -> String {
    let mut output = String::new();
    for line in chunk.lines() {
        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };
        if let Ok(event) = serde_json::from_str::<GenerateResponse>(payload) {
            if let Some(part) = event
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content.parts.into_iter().next())
            {
                output.push_str(&part.text);
            }
        }
    }
    output
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        media: Option<MediaPart>,
    ) -> Result<String> {
        let request = build_request(prompt, media);

        let response = self
            .client
            .post(self.endpoint(model, "generateContent"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::model(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::model(format!(
                "Gemini generation failed ({}): {}",
                status, body
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::model(format!("Failed to parse Gemini response: {}", e)))?;

        generated
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| Error::model("No text in Gemini response"))
    }

    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TextStream> {
        let request = build_request(prompt, None);
        let url = format!(
            "{}&alt=sse",
            self.endpoint(model, "streamGenerateContent")
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::model(format!("Gemini stream request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::model(format!(
                "Gemini stream failed ({}): {}",
                status, body
            )));
        }

        let stream = response.bytes_stream().scan(Vec::new(), |buf, chunk| {
            let item = chunk
                .map_err(|e| Error::model(format!("Stream error: {}", e)))
                .map(|bytes| {
                    buf.extend_from_slice(&bytes);
                    drain_complete_lines(buf)
                });
            future::ready(Some(item))
        });

        Ok(stream.boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models?key={}", self.base_url, self.api_key);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GeminiConfig {
        GeminiConfig {
            api_key: Some("test-key".to_string()),
            ..GeminiConfig::default()
        }
    }

    #[test]
    fn endpoint_includes_model_action_and_key() {
        let client = GeminiClient::new(&test_config()).unwrap();
        let url = client.endpoint("models/gemini-1.5-flash-latest", "generateContent");
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent?key=test-key"
        );
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = GeminiConfig::default();
        assert!(GeminiClient::new(&config).is_err());
    }

    #[test]
    fn vision_request_carries_prompt_then_inline_data() {
        let media = MediaPart::new("image/png", vec![1, 2, 3]);
        let request = build_request("describe this", Some(media));
        let value = serde_json::to_value(&request).unwrap();

        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "describe this");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(
            parts[1]["inlineData"]["data"],
            base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3])
        );
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn text_request_has_single_part() {
        let request = build_request("hello", None);
        let value = serde_json::to_value(&request).unwrap();
        let parts = value["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert!(parts[0].get("inlineData").is_none());
    }

    #[test]
    fn sse_chunks_accumulate_text() {
        let chunk = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Track \"}]}}]}\n",
            "\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"spending.\"}]}}]}\n",
        );
        assert_eq!(collect_sse_text(chunk), "Track spending.");
    }

    #[test]
    fn sse_finish_event_and_noise_are_skipped() {
        let chunk = concat!(
            ": keep-alive\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\"},\"finishReason\":\"STOP\"}]}\n",
            "data: not json\n",
        );
        assert_eq!(collect_sse_text(chunk), "");
    }

    #[test]
    fn sse_event_split_across_reads_is_reassembled() {
        let event =
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello world\"}]}}]}\n\n";
        let (first, second) = event.as_bytes().split_at(40);

        let mut buf = Vec::new();
        buf.extend_from_slice(first);
        let mut output = drain_complete_lines(&mut buf);
        buf.extend_from_slice(second);
        output.push_str(&drain_complete_lines(&mut buf));

        assert_eq!(output, "Hello world");
        assert!(buf.is_empty());
    }

    #[test]
    fn multibyte_character_split_across_reads_survives() {
        let event =
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"café\"}]}}]}\n\n";
        // `mid` lands between the two bytes of the 'é'.
        let mid = event.find('é').unwrap() + 1;
        let (first, second) = event.as_bytes().split_at(mid);

        let mut buf = Vec::new();
        buf.extend_from_slice(first);
        let mut output = drain_complete_lines(&mut buf);
        buf.extend_from_slice(second);
        output.push_str(&drain_complete_lines(&mut buf));

        assert_eq!(output, "café");
    }
}
