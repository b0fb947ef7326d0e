//! Replicate adapter: structural restoration, fallback editing, and the
//! alternate video model.
//!
//! Replicate exposes everything as predictions: create returns an id and
//! a status, get returns the current document. The coercion from the
//! prediction's loosely-shaped `output` field (a bare URL or a list of
//! URLs) to an `ImageAsset` happens once here, at the boundary.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use async_trait::async_trait;
use revive_models::{ImageAsset, JobHandle, VideoJob, VideoJobStatus, VideoProviderId};

use crate::adapter::{ImageEditor, VideoGenerator};
use crate::error::{ProviderError, ProviderResult};

const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// Interval between prediction polls while an image edit is in flight.
const EDIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Bound on edit polling; image models finish in well under this.
const EDIT_POLL_MAX_ATTEMPTS: u32 = 90;

/// Per-request wall-clock bound for the REST calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
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

/// Which model a client instance talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Blind structural restoration, ignores the instruction text
    StructuralRestore,
    /// Prompt-driven editing, used as the restoration fallback
    PromptEdit,
    /// Image-to-video generation
    Video,
}

impl Role {
    fn model(&self) -> &'static str {
        match self {
            Role::StructuralRestore => "flux-kontext-apps/restore-image",
            Role::PromptEdit => "black-forest-labs/flux-kontext-max",
            Role::Video => "kwaivgi/kling-v2.1",
        }
    }

    fn id(&self) -> &'static str {
        match self {
            Role::StructuralRestore => "replicate-restore",
            Role::PromptEdit => "replicate-edit",
            Role::Video => "replicate-video",
        }
    }
}

/// Replicate API client, bound to one model role.
pub struct ReplicateClient {
    api_token: String,
    base_url: String,
    role: Role,
    client: Client,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct PredictionRequest {
    input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<PredictionOutput>,
    #[serde(default)]
    error: Option<String>,
}

/// Replicate returns either a single URL or a list depending on model.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictionOutput {
    One(String),
    Many(Vec<String>),
}

impl PredictionOutput {
    fn first_url(&self) -> Option<&str> {
        match self {
            Self::One(url) => Some(url.as_str()),
            Self::Many(urls) => urls.first().map(String::as_str),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

impl ReplicateClient {
    /// Structural restorer: blind restoration, no prompt.
    pub fn structural_restorer(api_token: impl Into<String>) -> Self {
        Self::with_role(api_token, Role::StructuralRestore)
    }

    /// Prompt-driven editor used as the restoration fallback.
    pub fn prompt_editor(api_token: impl Into<String>) -> Self {
        Self::with_role(api_token, Role::PromptEdit)
    }

    /// Image-to-video generator (the alternate video provider).
    pub fn video_generator(api_token: impl Into<String>) -> Self {
        Self::with_role(api_token, Role::Video)
    }

    fn with_role(api_token: impl Into<String>, role: Role) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            role,
            client: http_client(),
        }
    }

    /// Override the API base URL (used by adapter tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn data_uri(image: &ImageAsset) -> String {
        format!("data:{};base64,{}", image.mime_type(), BASE64.encode(image.bytes()))
    }

    async fn create_prediction(&self, input: serde_json::Value) -> ProviderResult<Prediction> {
        let url = format!("{}/models/{}/predictions", self.base_url, self.role.model());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&PredictionRequest { input })
            .send()
            .await?;

        self.decode_prediction(response).await
    }

    async fn get_prediction(&self, id: &str) -> ProviderResult<Prediction> {
        let url = format!("{}/predictions/{}", self.base_url, id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        self.decode_prediction(response).await
    }

    async fn decode_prediction(&self, response: reqwest::Response) -> ProviderResult<Prediction> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_text));
        }

        response
            .json::<Prediction>()
            .await
            .map_err(|e| ProviderError::validation(format!("Failed to parse prediction: {}", e)))
    }

    /// Drive one image prediction to a terminal state.
    async fn run_to_completion(&self, input: serde_json::Value) -> ProviderResult<Prediction> {
        let mut prediction = self.create_prediction(input).await?;

        let mut attempts = 0u32;
        while !is_terminal_status(&prediction.status) {
            attempts += 1;
            if attempts > EDIT_POLL_MAX_ATTEMPTS {
                return Err(ProviderError::timeout(format!(
                    "Prediction {} still {} after {} polls",
                    prediction.id, prediction.status, EDIT_POLL_MAX_ATTEMPTS
                )));
            }
            tokio::time::sleep(EDIT_POLL_INTERVAL).await;
            prediction = self.get_prediction(&prediction.id).await?;
        }

        Ok(prediction)
    }

    /// Download a prediction's output image.
    async fn fetch_output(&self, prediction: &Prediction) -> ProviderResult<ImageAsset> {
        let url = prediction
            .output
            .as_ref()
            .and_then(PredictionOutput::first_url)
            .ok_or_else(|| ProviderError::validation("Prediction succeeded but has no output"))?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::transport(format!(
                "Failed to download output: {}",
                response.status()
            )));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?;

        Ok(ImageAsset::new(bytes, mime_type))
    }
}

fn is_terminal_status(status: &str) -> bool {
    matches!(status, "succeeded" | "failed" | "canceled")
}

/// Map a failed prediction onto the taxonomy.
///
/// Content-safety rejections surface as failed predictions whose error
/// text names the flagging, not as a distinct status.
fn classify_failure(error: Option<&str>) -> ProviderError {
    let message = error.unwrap_or("prediction failed without detail");
    let lower = message.to_lowercase();
    if lower.contains("nsfw") || lower.contains("sensitive") || lower.contains("flagged") {
        ProviderError::refusal(message.to_string())
    } else {
        ProviderError::transport(message.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
        ProviderError::validation(format!("Replicate API returned {}: {}", status, body))
    } else {
        ProviderError::transport(format!("Replicate API returned {}: {}", status, body))
    }
}

fn map_video_status(status: &str) -> VideoJobStatus {
    match status {
        "starting" => VideoJobStatus::Pending,
        "processing" => VideoJobStatus::Processing,
        "succeeded" => VideoJobStatus::Succeeded,
        "canceled" => VideoJobStatus::Canceled,
        // "failed" and anything unrecognized
        _ => VideoJobStatus::Failed,
    }
}

// ============================================================================
// Capability impls
// ============================================================================

#[async_trait]
impl ImageEditor for ReplicateClient {
    fn id(&self) -> &'static str {
        self.role.id()
    }

    async fn edit<'a>(
        &self,
        image: &ImageAsset,
        instruction: &str,
        _reference: Option<&'a ImageAsset>,
    ) -> ProviderResult<ImageAsset> {
        let input = match self.role {
            // The restore model is blind: it never sees the instruction.
            Role::StructuralRestore => json!({
                "input_image": Self::data_uri(image),
            }),
            _ => json!({
                "input_image": Self::data_uri(image),
                "prompt": instruction,
            }),
        };

        info!(model = self.role.model(), "Running image prediction");
        let prediction = self.run_to_completion(input).await?;

        match prediction.status.as_str() {
            "succeeded" => self.fetch_output(&prediction).await,
            _ => {
                warn!(
                    prediction = %prediction.id,
                    status = %prediction.status,
                    "Image prediction did not succeed"
                );
                Err(classify_failure(prediction.error.as_deref()))
            }
        }
    }
}

#[async_trait]
impl VideoGenerator for ReplicateClient {
    fn id(&self) -> &'static str {
        self.role.id()
    }

    async fn start(&self, prompt: &str, image: &ImageAsset) -> ProviderResult<JobHandle> {
        let input = json!({
            "start_image": Self::data_uri(image),
            "prompt": prompt,
        });

        let prediction = self.create_prediction(input).await?;
        info!(prediction = %prediction.id, "Started video prediction");
        Ok(JobHandle::new(prediction.id))
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<VideoJob> {
        let prediction = self.get_prediction(handle.as_str()).await?;
        let status = map_video_status(&prediction.status);
        debug!(prediction = %handle, status = %status, "Polled video prediction");

        let mut job = VideoJob::started(handle.clone(), VideoProviderId::Alternate);
        match status {
            VideoJobStatus::Pending => {}
            VideoJobStatus::Processing => {
                job.observe(VideoJobStatus::Processing);
            }
            VideoJobStatus::Succeeded => {
                let uri = prediction
                    .output
                    .as_ref()
                    .and_then(PredictionOutput::first_url)
                    .ok_or_else(|| {
                        ProviderError::validation("Prediction succeeded but has no output")
                    })?;
                job.succeed(uri);
            }
            VideoJobStatus::Canceled => {
                job.observe(VideoJobStatus::Canceled);
            }
            _ => {
                job.fail(
                    prediction
                        .error
                        .unwrap_or_else(|| "prediction failed without detail".to_string()),
                );
            }
        }
        Ok(job)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_image() -> ImageAsset {
        ImageAsset::new(vec![0x89u8, 0x50, 0x4E, 0x47], "image/png")
    }

    #[tokio::test]
    async fn test_edit_success_downloads_output() {
        let server = MockServer::start().await;
        let output_url = format!("{}/files/out.png", server.uri());
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "pred-1",
                "status": "succeeded",
                "output": [output_url]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/out.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(b"restored".to_vec()),
            )
            .mount(&server)
            .await;

        let client = ReplicateClient::structural_restorer("token").with_base_url(server.uri());
        let asset = client.edit(&test_image(), "", None).await.unwrap();
        assert_eq!(asset.bytes().as_ref(), b"restored");
        assert_eq!(asset.mime_type(), "image/png");
    }

    #[tokio::test]
    async fn test_edit_nsfw_failure_is_refusal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "pred-2",
                "status": "failed",
                "error": "Image flagged as NSFW content"
            })))
            .mount(&server)
            .await;

        let client = ReplicateClient::prompt_editor("token").with_base_url(server.uri());
        let err = client.edit(&test_image(), "colorize", None).await.unwrap_err();
        assert!(err.is_refusal());
    }

    #[tokio::test]
    async fn test_edit_generic_failure_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "pred-3",
                "status": "failed",
                "error": "CUDA out of memory"
            })))
            .mount(&server)
            .await;

        let client = ReplicateClient::prompt_editor("token").with_base_url(server.uri());
        let err = client.edit(&test_image(), "colorize", None).await.unwrap_err();
        assert!(err.is_fallback_eligible());
    }

    #[tokio::test]
    async fn test_video_start_and_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "pred-v1",
                "status": "starting"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/predictions/pred-v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pred-v1",
                "status": "succeeded",
                "output": "https://cdn.example/video.mp4"
            })))
            .mount(&server)
            .await;

        let client = ReplicateClient::video_generator("token").with_base_url(server.uri());
        let handle = client.start("animate", &test_image()).await.unwrap();
        assert_eq!(handle.as_str(), "pred-v1");

        let job = client.poll(&handle).await.unwrap();
        assert_eq!(job.status, VideoJobStatus::Succeeded);
        assert_eq!(job.output_ref.as_deref(), Some("https://cdn.example/video.mp4"));
    }

    #[test]
    fn test_video_status_mapping() {
        assert_eq!(map_video_status("starting"), VideoJobStatus::Pending);
        assert_eq!(map_video_status("processing"), VideoJobStatus::Processing);
        assert_eq!(map_video_status("succeeded"), VideoJobStatus::Succeeded);
        assert_eq!(map_video_status("failed"), VideoJobStatus::Failed);
        assert_eq!(map_video_status("canceled"), VideoJobStatus::Canceled);
        assert_eq!(map_video_status("???"), VideoJobStatus::Failed);
    }

    #[test]
    fn test_output_coercion() {
        let one: PredictionOutput = serde_json::from_str(r#""https://a/x.png""#).unwrap();
        assert_eq!(one.first_url(), Some("https://a/x.png"));
        let many: PredictionOutput = serde_json::from_str(r#"["https://a/y.png"]"#).unwrap();
        assert_eq!(many.first_url(), Some("https://a/y.png"));
    }
}
