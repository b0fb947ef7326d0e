//! Gemini adapter: analysis, prompt-driven editing, translation, and
//! long-running video generation.
//!
//! One client covers the four Gemini-backed capabilities. Analysis uses
//! structured JSON output with strict decoding; editing uses the image
//! model and treats a response without an inline image part as a content
//! refusal; video uses the predict-long-running operation API.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use async_trait::async_trait;
use revive_models::{
    AnalysisResult, ImageAsset, JobHandle, VideoJob, VideoJobStatus, VideoProviderId,
};

use crate::adapter::{ImageAnalyzer, ImageEditor, Translator, VideoGenerator};
use crate::error::{ProviderError, ProviderResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const ANALYSIS_MODEL: &str = "gemini-2.5-flash";
const EDIT_MODEL: &str = "gemini-2.5-flash-image";
const TRANSLATE_MODEL: &str = "gemini-2.5-flash-lite";
const VIDEO_MODEL: &str = "veo-3.1-generate";

/// Per-request wall-clock bound; image generation can run for minutes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        // Builder failure means the TLS backend cannot initialize,
        // which `Client::new()` panics on as well.
        .unwrap_or_default()
}

/// Gemini API client.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    client: Client,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn image(asset: &ImageAsset) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: asset.mime_type().to_string(),
                data: BASE64.encode(asset.bytes()),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "inlineData", default)]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
struct ResponseInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct VideoStartRequest {
    instances: Vec<VideoInstance>,
}

#[derive(Debug, Serialize)]
struct VideoInstance {
    prompt: String,
    image: InlineData,
}

#[derive(Debug, Deserialize)]
struct OperationStart {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    #[serde(rename = "generateVideoResponse", default)]
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
struct GenerateVideoResponse {
    #[serde(rename = "generatedSamples", default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: GeneratedVideo,
}

#[derive(Debug, Deserialize)]
struct GeneratedVideo {
    uri: String,
}

// ============================================================================
// Client
// ============================================================================

impl GeminiClient {
    /// Create a client from an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: http_client(),
        }
    }

    /// Override the API base URL (used by adapter tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        )
    }

    async fn call_generate(&self, model: &str, request: &GeminiRequest) -> ProviderResult<GeminiResponse> {
        let response = self
            .client
            .post(self.generate_url(model))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_text));
        }

        response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| ProviderError::validation(format!("Failed to parse Gemini response: {}", e)))
    }

    /// Extract the first text part of a response.
    fn first_text(response: &GeminiResponse) -> ProviderResult<&str> {
        response
            .candidates
            .first()
            .and_then(|c| c.content.parts.iter().find_map(|p| p.text.as_deref()))
            .ok_or_else(|| ProviderError::validation("No text content in Gemini response"))
    }

    /// Extract the first inline image part of a response.
    ///
    /// Absence of an image part is the provider's refusal signal: the
    /// model responds with an explanation text instead of the edit.
    fn first_image(response: &GeminiResponse) -> ProviderResult<ImageAsset> {
        let inline = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.iter().find_map(|p| p.inline_data.as_ref()));

        match inline {
            Some(data) => {
                let bytes = BASE64
                    .decode(&data.data)
                    .map_err(|e| ProviderError::validation(format!("Invalid image payload: {}", e)))?;
                Ok(ImageAsset::new(bytes, data.mime_type.clone()))
            }
            None => {
                let explanation = Self::first_text(response).unwrap_or("no detail provided");
                Err(ProviderError::refusal(format!(
                    "Model returned no image: {}",
                    explanation
                )))
            }
        }
    }
}

/// Map an HTTP error status onto the normalized taxonomy.
fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
        ProviderError::validation(format!("Gemini API returned {}: {}", status, body))
    } else {
        // 429 and 5xx are availability problems, eligible for fallback.
        ProviderError::transport(format!("Gemini API returned {}: {}", status, body))
    }
}

/// Strip markdown code fences the model sometimes wraps JSON in.
fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_prefix("```").unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn analysis_prompt(language: &str, hint: Option<&str>) -> String {
    let mut prompt = format!(
        r#"You are a photo restoration expert. Analyze the attached old photograph.

Return ONLY a single JSON object with this exact schema (every field is required):
{{
  "contains_minors": false,
  "needs_perspective_correction": false,
  "has_many_subjects": false,
  "is_monochrome": false,
  "is_very_old": false,
  "has_eye_color_potential": false,
  "subject_count": 0,
  "lighting": {{
    "direction": "...",
    "quality": "...",
    "type": "...",
    "shadow_strength": "...",
    "description": "..."
  }},
  "restoration_instruction": "...",
  "animation_instruction": "...",
  "suggested_name": "..."
}}

Write restoration_instruction and animation_instruction in {language}.
- restoration_instruction: a complete edit prompt to restore and colorize this photo, covering damage repair, color palette consistent with the era, and the lighting you observed.
- animation_instruction: a short prompt for a subtle, respectful animation of the restored photo.
- suggested_name: a short kebab-case file name for the result."#
    );

    if let Some(hint) = hint {
        prompt.push_str("\n\nStyle reference to consider:\n");
        prompt.push_str(hint);
    }

    prompt
}

// ============================================================================
// Capability impls
// ============================================================================

#[async_trait]
impl ImageAnalyzer for GeminiClient {
    async fn analyze<'a>(
        &self,
        image: &ImageAsset,
        language: &str,
        hint: Option<&'a str>,
    ) -> ProviderResult<AnalysisResult> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part::text(analysis_prompt(language, hint)), Part::image(image)],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json".to_string(),
            }),
        };

        let response = self.call_generate(ANALYSIS_MODEL, &request).await?;
        let text = Self::first_text(&response)?;

        let result: AnalysisResult = serde_json::from_str(strip_fences(text))
            .map_err(|e| ProviderError::validation(format!("Incomplete analysis document: {}", e)))?;

        debug!(
            subjects = result.subject_count,
            monochrome = result.is_monochrome,
            very_old = result.is_very_old,
            "Analysis complete"
        );
        Ok(result)
    }
}

#[async_trait]
impl ImageEditor for GeminiClient {
    fn id(&self) -> &'static str {
        "gemini-edit"
    }

    async fn edit<'a>(
        &self,
        image: &ImageAsset,
        instruction: &str,
        reference: Option<&'a ImageAsset>,
    ) -> ProviderResult<ImageAsset> {
        let mut parts = vec![Part::text(instruction), Part::image(image)];
        if let Some(reference) = reference {
            parts.push(Part::image(reference));
        }

        let request = GeminiRequest {
            contents: vec![Content { parts }],
            generation_config: None,
        };

        info!(model = EDIT_MODEL, "Requesting image edit");
        let response = self.call_generate(EDIT_MODEL, &request).await?;
        Self::first_image(&response)
    }
}

#[async_trait]
impl Translator for GeminiClient {
    async fn translate(&self, text: &str, target_language: &str) -> ProviderResult<String> {
        let prompt = format!(
            "Translate the following text into {}. Return only the translation, nothing else.\n\n{}",
            target_language, text
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part::text(prompt)],
            }],
            generation_config: None,
        };

        let response = self.call_generate(TRANSLATE_MODEL, &request).await?;
        Ok(Self::first_text(&response)?.trim().to_string())
    }
}

#[async_trait]
impl VideoGenerator for GeminiClient {
    fn id(&self) -> &'static str {
        "gemini-video"
    }

    async fn start(&self, prompt: &str, image: &ImageAsset) -> ProviderResult<JobHandle> {
        let url = format!(
            "{}/models/{}:predictLongRunning?key={}",
            self.base_url, VIDEO_MODEL, self.api_key
        );

        let request = VideoStartRequest {
            instances: vec![VideoInstance {
                prompt: prompt.to_string(),
                image: InlineData {
                    mime_type: image.mime_type().to_string(),
                    data: BASE64.encode(image.bytes()),
                },
            }],
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_text));
        }

        let operation: OperationStart = response
            .json()
            .await
            .map_err(|e| ProviderError::validation(format!("Failed to parse operation: {}", e)))?;

        info!(operation = %operation.name, "Started video generation");
        Ok(JobHandle::new(operation.name))
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<VideoJob> {
        let url = format!("{}/{}?key={}", self.base_url, handle.as_str(), self.api_key);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_text));
        }

        let operation: Operation = response
            .json()
            .await
            .map_err(|e| ProviderError::validation(format!("Failed to parse operation: {}", e)))?;

        let mut job = VideoJob::started(handle.clone(), VideoProviderId::Primary);

        if !operation.done {
            job.observe(VideoJobStatus::Processing);
            return Ok(job);
        }

        if let Some(error) = operation.error {
            warn!(operation = %handle, "Video generation failed: {}", error.message);
            job.observe(VideoJobStatus::Processing);
            job.fail(error.message);
            return Ok(job);
        }

        let uri = operation
            .response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .map(|s| s.video.uri)
            .ok_or_else(|| ProviderError::validation("Operation done but no video in response"))?;

        job.observe(VideoJobStatus::Processing);
        job.succeed(uri);
        Ok(job)
    }
}

// ============================================================================
// Tests
// ============================================================================
