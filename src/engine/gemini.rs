//! Gemini `generateContent` REST client.

use super::{AnalysisFailure, GenerationFailure, ImageService, RemoteError, TransformRequest};
use crate::model::SessionConfig;
use crate::payload::{ImageFormat, ImagePayload};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const ANALYSIS_PROMPT: &str = "Analyze this image in detail. Describe the era, the clothing, the style, and any interesting anomalies. Keep it concise but insightful.";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    fn text(s: impl Into<String>) -> Self {
        Self {
            text: Some(s.into()),
            inline_data: None,
        }
    }

    fn image(image: &ImagePayload) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type().to_string(),
                data: image.to_base64(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Instruction first, then the image.
pub(crate) fn transform_body(request: &TransformRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                Part::text(request.instruction.clone()),
                Part::image(&request.image),
            ],
        }],
    }
}

/// Image first, then the analysis prompt.
pub(crate) fn describe_body(image: &ImagePayload) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part::image(image), Part::text(ANALYSIS_PROMPT)],
        }],
    }
}

/// First part of the first candidate that carries image data.
pub(crate) fn extract_image(resp: &GenerateContentResponse) -> Result<ImagePayload, RemoteError> {
    let inline = resp
        .first_parts()
        .iter()
        .filter_map(|p| p.inline_data.as_ref())
        .find(|d| !d.data.trim().is_empty())
        .ok_or(RemoteError::NoData("image"))?;
    let format = ImageFormat::from_mime(&inline.mime_type).unwrap_or(ImageFormat::Png);
    Ok(ImagePayload::from_base64(format, &inline.data)?)
}

pub(crate) fn extract_text(resp: &GenerateContentResponse) -> Result<String, RemoteError> {
    let text: String = resp
        .first_parts()
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    if text.is_empty() {
        return Err(RemoteError::NoData("text"));
    }
    Ok(text.to_string())
}

pub(crate) fn api_error(status: u16, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    RemoteError::Api { status, message }
}

pub struct GeminiClient {
    pub http: reqwest::Client,
    base_url: String,
    api_key: String,
    image_model: String,
    analysis_model: String,
}

impl GeminiClient {
    pub fn new(cfg: &SessionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            image_model: cfg.image_model.clone(),
            analysis_model: cfg.analysis_model.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    async fn generate(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, RemoteError> {
        let started = Instant::now();
        let resp = self
            .http
            .post(self.endpoint(model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        tracing::debug!(model, %status, elapsed_ms = started.elapsed().as_millis() as u64, "generateContent");
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &text));
        }
        Ok(resp.json::<GenerateContentResponse>().await?)
    }
}

#[async_trait]
impl ImageService for GeminiClient {
    async fn transform(&self, request: TransformRequest) -> Result<ImagePayload, GenerationFailure> {
        let body = transform_body(&request);
        let resp = self
            .generate(&self.image_model, &body)
            .await
            .map_err(GenerationFailure)?;
        extract_image(&resp).map_err(GenerationFailure)
    }

    async fn describe(&self, image: &ImagePayload) -> Result<String, AnalysisFailure> {
        let body = describe_body(image);
        let resp = self
            .generate(&self.analysis_model, &body)
            .await
            .map_err(AnalysisFailure)?;
        extract_text(&resp).map_err(AnalysisFailure)
    }
}
