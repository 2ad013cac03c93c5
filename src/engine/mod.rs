//! Remote image service seam.
//!
//! The orchestrator only sees [`ImageService`]; [`gemini::GeminiClient`] is the
//! production implementation.

pub mod gemini;

use crate::payload::{ImagePayload, PayloadError};
use async_trait::async_trait;

/// Pairs an image with the instruction to apply to it. Consumed by one call.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub image: ImagePayload,
    pub instruction: String,
}

/// Failure modes shared by both remote calls.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("response contained no {0}")]
    NoData(&'static str),
    #[error("response image is malformed: {0}")]
    Payload(#[from] PayloadError),
}

impl RemoteError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteError::Http(e) if e.is_timeout())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("image generation failed: {0}")]
pub struct GenerationFailure(#[source] pub RemoteError);

#[derive(Debug, thiserror::Error)]
#[error("image analysis failed: {0}")]
pub struct AnalysisFailure(#[source] pub RemoteError);

/// Stateless, single-shot image operations. No retry happens here.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Apply `request.instruction` to `request.image` and return a new image.
    async fn transform(&self, request: TransformRequest) -> Result<ImagePayload, GenerationFailure>;

    /// Describe an image in natural language.
    async fn describe(&self, image: &ImagePayload) -> Result<String, AnalysisFailure>;
}
