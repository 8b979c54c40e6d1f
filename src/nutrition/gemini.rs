//! Gemini implementation of [`NutritionEstimator`].
//!
//! An estimate is one upload through the Files API (only when an image is
//! supplied) followed by one `generateContent` call constrained to the
//! meal analysis response schema.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::schema::{meal_analysis_schema, ANALYSIS_PROMPT};
use super::{parse_analysis, EstimationError, ImageUpload, MealAnalysis, NutritionEstimator};
use crate::config::{ConfigError, GeminiConfig};

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl GeminiClient {
    pub fn new(cfg: &GeminiConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&cfg.api_key).map_err(|e| ConfigError::Invalid {
            name: "GEMINI_API_KEY",
            value: "<redacted>".into(),
            reason: e.to_string(),
        })?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "ESTIMATOR_TIMEOUT_SECS",
                value: cfg.timeout_secs.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            model: cfg.model.clone(),
            base_url: cfg.base_url.clone(),
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    #[cfg(test)]
    fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn upload_image(&self, image: ImageUpload) -> Result<UploadedFile, EstimationError> {
        let display_name = Uuid::new_v4().to_string();
        let start_url = format!("{}/upload/v1beta/files", self.base_url);
        let start_body = StartUpload {
            file: FileMetadata { display_name: &display_name },
        };
        let size = image.body.len().to_string();

        let started = self
            .send(|| {
                self.client
                    .post(&start_url)
                    .header("X-Goog-Upload-Protocol", "resumable")
                    .header("X-Goog-Upload-Command", "start")
                    .header("X-Goog-Upload-Header-Content-Length", &size)
                    .header("X-Goog-Upload-Header-Content-Type", &image.content_type)
                    .json(&start_body)
            })
            .await
            .map_err(|f| EstimationError::Upload(f.into_message()))?;

        let session_url = started
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| EstimationError::Upload("provider did not return an upload URL".into()))?;

        let finished = self
            .send(|| {
                self.client
                    .post(&session_url)
                    .header("X-Goog-Upload-Offset", "0")
                    .header("X-Goog-Upload-Command", "upload, finalize")
                    .header(reqwest::header::CONTENT_TYPE, &image.content_type)
                    .body(image.body.clone())
            })
            .await
            .map_err(|f| EstimationError::Upload(f.into_message()))?;

        let uploaded: UploadResponse = finished
            .json()
            .await
            .map_err(|e| EstimationError::Upload(format!("unreadable upload response: {e}")))?;
        debug!(file = %uploaded.file.uri, display_name = %display_name, "image uploaded");
        Ok(uploaded.file)
    }

    async fn generate(&self, parts: Vec<RequestPart>) -> Result<String, EstimationError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateContentRequest {
            contents: vec![RequestContent { role: "user", parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: meal_analysis_schema(),
            },
        };

        let response = self
            .send(|| self.client.post(&url).json(&request))
            .await
            .map_err(|f| match f {
                Failure::Transport(m) => EstimationError::Transport(m),
                Failure::Status(m) => EstimationError::Provider(m),
            })?;

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| EstimationError::Malformed(format!("unreadable provider envelope: {e}")))?;
        body.into_text()
    }

    /// Sends a request, retrying transient statuses up to `max_retries` times.
    async fn send<F>(&self, build: F) -> Result<reqwest::Response, Failure>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let response = build()
                .send()
                .await
                .map_err(|e| Failure::Transport(format!("HTTP request failed: {e}")))?;
            let status = response.status();
            debug!(status = %status, attempt, "provider response received");

            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                attempt += 1;
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }
            return Err(Failure::Status(describe_error(status, &body)));
        }
    }
}

#[async_trait]
impl NutritionEstimator for GeminiClient {
    #[instrument(skip(self, image, text), fields(model = %self.model, has_image = image.is_some(), has_text = text.is_some()))]
    async fn estimate(
        &self,
        image: Option<ImageUpload>,
        text: Option<&str>,
    ) -> Result<MealAnalysis, EstimationError> {
        let mut parts = Vec::with_capacity(3);
        if let Some(image) = image {
            let file = self.upload_image(image).await?;
            parts.push(RequestPart::File {
                file_data: FileData {
                    mime_type: file.mime_type,
                    file_uri: file.uri,
                },
            });
        }
        if let Some(text) = text {
            parts.push(RequestPart::Text { text: text.to_string() });
        }
        parts.push(RequestPart::Text {
            text: ANALYSIS_PROMPT.to_string(),
        });

        let raw = self.generate(parts).await?;
        let analysis = parse_analysis(&raw)?;
        info!(dishes = analysis.dishes.len(), calories = analysis.meal_summary.total_calories, "meal analyzed");
        Ok(analysis)
    }
}

enum Failure {
    Transport(String),
    Status(String),
}

impl Failure {
    fn into_message(self) -> String {
        match self {
            Failure::Transport(m) | Failure::Status(m) => m,
        }
    }
}

fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503)
}

fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => format!(
            "Gemini API error ({}): {}",
            api_err.error.status.unwrap_or_else(|| status.to_string()),
            api_err.error.message
        ),
        Err(_) => format!("API returned {status}: {body}"),
    }
}

// ---- wire types ----

#[derive(Serialize)]
struct StartUpload<'a> {
    file: FileMetadata<'a>,
}

#[derive(Serialize)]
struct FileMetadata<'a> {
    display_name: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    uri: String,
    mime_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    status: Option<String>,
}

impl GenerateContentResponse {
    /// Joins the text parts of the first candidate.
    fn into_text(self) -> Result<String, EstimationError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(EstimationError::EmptyResponse(format!("prompt blocked: {reason}")));
        }
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| EstimationError::EmptyResponse("no candidates".into()))?;
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".into());
            return Err(EstimationError::EmptyResponse(format!(
                "candidate has no text (finish reason {reason})"
            )));
        }
        Ok(text)
    }
}
