//! Deterministic `ImageService` used by orchestrator tests.

use crate::engine::{AnalysisFailure, GenerationFailure, ImageService, RemoteError, TransformRequest};
use crate::payload::{ImageFormat, ImagePayload};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub(crate) fn img(tag: &str) -> ImagePayload {
    ImagePayload::new(ImageFormat::Png, tag.as_bytes().to_vec()).unwrap()
}

#[derive(Default)]
pub(crate) struct FakeService {
    pub transforms: AtomicUsize,
    pub describes: AtomicUsize,
    pub instructions: Mutex<Vec<String>>,
    /// Scripted transform outcomes; `None` fails. An empty script fails too.
    pub transform_script: Mutex<VecDeque<Option<ImagePayload>>>,
    /// Scripted describe outcomes; an empty script returns a text naming the image.
    pub describe_script: Mutex<VecDeque<Option<String>>>,
    /// When set, describe waits for a notification before answering.
    pub describe_gate: Option<Arc<Notify>>,
}

impl FakeService {
    pub fn with_transforms(outcomes: impl IntoIterator<Item = Option<ImagePayload>>) -> Self {
        Self {
            transform_script: Mutex::new(outcomes.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.describe_gate = Some(gate);
        self
    }

    pub fn push_describe(&self, outcome: Option<&str>) {
        self.describe_script
            .lock()
            .unwrap()
            .push_back(outcome.map(str::to_string));
    }

    pub fn transform_calls(&self) -> usize {
        self.transforms.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> usize {
        self.describes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageService for FakeService {
    async fn transform(&self, request: TransformRequest) -> Result<ImagePayload, GenerationFailure> {
        self.transforms.fetch_add(1, Ordering::SeqCst);
        self.instructions.lock().unwrap().push(request.instruction);
        let next = self.transform_script.lock().unwrap().pop_front().flatten();
        next.ok_or_else(|| GenerationFailure(RemoteError::NoData("image")))
    }

    async fn describe(&self, image: &ImagePayload) -> Result<String, AnalysisFailure> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.describe_gate {
            gate.notified().await;
        }
        let scripted = self.describe_script.lock().unwrap().pop_front();
        match scripted {
            Some(Some(text)) => Ok(text),
            Some(None) => Err(AnalysisFailure(RemoteError::NoData("text"))),
            None => Ok(format!(
                "description of {}",
                String::from_utf8_lossy(image.bytes())
            )),
        }
    }
}
