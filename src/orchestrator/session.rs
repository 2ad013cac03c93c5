//! Async orchestrator over the flow state machine.
//!
//! The flow lock is only held while transitioning; it is released before every
//! remote call so overlapping requests observe the in-flight markers.

use super::flow::{AnalysisStart, Applied, Flow, FlowError};
use crate::engine::ImageService;
use crate::eras::Era;
use crate::model::{AnalysisResult, FlowEvent, InfoEvent, Step};
use crate::payload::ImagePayload;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

pub const GENERATION_FAILED_NOTICE: &str =
    "Time travel failed! The wormhole was unstable. Please try again.";
pub const EDIT_FAILED_NOTICE: &str = "Edit failed. Please try again.";
pub const ANALYSIS_FALLBACK: &str = "Analysis failed.";

/// Point-in-time copy of the flow for presentation layers.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub captured: Option<ImagePayload>,
    pub result: Option<ImagePayload>,
    pub era: Option<&'static Era>,
    pub edits: Vec<String>,
    pub analysis: Option<AnalysisResult>,
}

pub struct Session {
    flow: Mutex<Flow>,
    service: Arc<dyn ImageService>,
    event_tx: Option<UnboundedSender<FlowEvent>>,
}

impl Session {
    pub fn new(service: Arc<dyn ImageService>, event_tx: Option<UnboundedSender<FlowEvent>>) -> Self {
        Self {
            flow: Mutex::new(Flow::new()),
            service,
            event_tx,
        }
    }

    fn emit(&self, ev: FlowEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn emit_step(&self, step: Step) {
        self.emit(FlowEvent::StepChanged { step });
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let flow = self.flow.lock().await;
        SessionSnapshot {
            captured: flow.captured_image().cloned(),
            result: flow.result_image().cloned(),
            era: flow.era(),
            edits: flow.result().map(|s| s.edits.clone()).unwrap_or_default(),
            analysis: flow.analysis(),
        }
    }

    pub async fn submit_capture(&self, image: ImagePayload) -> Result<(), FlowError> {
        let info = InfoEvent::Captured {
            mime: image.mime_type(),
            bytes: image.len(),
        };
        let mut flow = self.flow.lock().await;
        flow.submit_capture(image)?;
        tracing::info!("{}", info.to_message());
        self.emit(FlowEvent::Info(info));
        self.emit_step(Step::EraSelection);
        Ok(())
    }

    pub async fn retake(&self) -> Result<(), FlowError> {
        let mut flow = self.flow.lock().await;
        flow.retake()?;
        self.emit_step(Step::Capture);
        Ok(())
    }

    /// Generate the era transformation of the stored capture.
    ///
    /// Without a capture this does nothing. Returns the step the flow ends in.
    pub async fn select_era(&self, era: &'static Era) -> Result<Step, FlowError> {
        let mut flow = self.flow.lock().await;
        let Some(generation) = flow.begin_generation(era)? else {
            tracing::debug!(era = era.id, "era selected without a capture");
            return Ok(Step::Capture);
        };
        self.emit_step(Step::Processing);
        self.emit(FlowEvent::Info(InfoEvent::Traveling { era: era.name }));
        drop(flow);
        tracing::info!(era = era.id, "generation started");

        let outcome = self.service.transform(generation.request).await;
        if let Err(e) = &outcome {
            tracing::warn!(era = era.id, timeout = e.0.is_timeout(), "{e}");
        }

        let mut flow = self.flow.lock().await;
        let applied = flow.finish_generation(generation.ticket, outcome);
        // Events go out under the guard so they stay ordered with a concurrent reset.
        match applied {
            Applied::Succeeded => {
                if let Some((original, result)) =
                    flow.captured_image().cloned().zip(flow.result_image().cloned())
                {
                    self.emit(FlowEvent::ResultReady {
                        era,
                        original,
                        result,
                    });
                }
                self.emit_step(Step::Result);
            }
            Applied::Failed => {
                self.emit(FlowEvent::GenerationFailed {
                    message: GENERATION_FAILED_NOTICE.into(),
                });
                self.emit_step(Step::EraSelection);
            }
            Applied::Stale => tracing::debug!(era = era.id, "generation result discarded"),
        }
        Ok(flow.step())
    }

    /// Apply a free-text edit to the current result.
    pub async fn edit(&self, instruction: &str) -> Result<Applied, FlowError> {
        let mut flow = self.flow.lock().await;
        let edit = flow.begin_edit(instruction)?;
        let instruction = edit.request.instruction.clone();
        self.emit(FlowEvent::EditStarted);
        drop(flow);
        tracing::info!(instruction = %instruction, "edit started");

        let outcome = self.service.transform(edit.request).await;
        if let Err(e) = &outcome {
            tracing::warn!(timeout = e.0.is_timeout(), "{e}");
        }
        let new_image = outcome.as_ref().ok().cloned();

        let mut flow = self.flow.lock().await;
        let applied = flow.finish_edit(edit.ticket, outcome);
        match (applied, new_image) {
            (Applied::Succeeded, Some(image)) => {
                self.emit(FlowEvent::EditApplied { image, instruction })
            }
            (Applied::Failed, _) => self.emit(FlowEvent::EditFailed {
                message: EDIT_FAILED_NOTICE.into(),
            }),
            _ => tracing::debug!("edit result discarded"),
        }
        Ok(applied)
    }

    /// Analysis for the current result image, issuing at most one remote call per image.
    pub async fn request_analysis(&self) -> Result<AnalysisResult, FlowError> {
        let mut flow = self.flow.lock().await;
        let (image, payload) = match flow.begin_analysis()? {
            AnalysisStart::Cached(result) => {
                self.emit(FlowEvent::AnalysisReady {
                    analysis: result.clone(),
                });
                return Ok(result);
            }
            AnalysisStart::Pending => return Ok(AnalysisResult::loading()),
            AnalysisStart::Start { image, payload } => (image, payload),
        };
        self.emit(FlowEvent::AnalysisStarted);
        drop(flow);

        let result = match self.service.describe(&payload).await {
            Ok(text) => AnalysisResult::ready(text),
            Err(e) => {
                tracing::warn!(timeout = e.0.is_timeout(), "{e}");
                AnalysisResult::ready(ANALYSIS_FALLBACK)
            }
        };

        let mut flow = self.flow.lock().await;
        let applied = flow.finish_analysis(image, result.clone());
        if applied == Applied::Succeeded {
            self.emit(FlowEvent::AnalysisReady {
                analysis: result.clone(),
            });
        } else {
            tracing::debug!("analysis for a replaced image discarded");
        }
        Ok(result)
    }

    /// Clear everything and go back to capture.
    pub async fn reset(&self) {
        let mut flow = self.flow.lock().await;
        flow.reset();
        tracing::info!("session reset");
        self.emit_step(Step::Capture);
    }
}
