//! Synchronous flow state machine.
//!
//! Remote calls are split into a `begin_*` half that transitions and hands
//! back the request to send, and a `finish_*` half that applies the outcome.
//! Completions carry the ticket or image id they were issued for; anything that
//! no longer matches the current state is discarded.

use crate::engine::TransformRequest;
use crate::eras::Era;
use crate::model::{AnalysisResult, Step};
use crate::payload::ImagePayload;

/// Identity of a stored result image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(u64);

/// Identity of an outstanding transform request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("cannot {op} while in {step:?}")]
    InvalidTransition { op: &'static str, step: Step },
    #[error("a request is already in progress")]
    Busy,
    #[error("edit instruction is empty")]
    EmptyInstruction,
}

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub id: ImageId,
    pub image: ImagePayload,
}

#[derive(Debug, Clone)]
pub struct PendingEdit {
    pub ticket: Ticket,
    pub instruction: String,
}

/// Analysis cache for the current result image.
#[derive(Debug, Clone, Default)]
pub enum AnalysisSlot {
    #[default]
    Empty,
    InFlight {
        image: ImageId,
    },
    Ready {
        image: ImageId,
        result: AnalysisResult,
    },
}

#[derive(Debug, Clone)]
pub struct ResultStage {
    pub original: ImagePayload,
    pub era: &'static Era,
    pub current: StoredImage,
    pub edits: Vec<String>,
    pub edit: Option<PendingEdit>,
    pub analysis: AnalysisSlot,
}

#[derive(Debug, Clone, Default)]
pub enum FlowState {
    #[default]
    Capturing,
    SelectingEra {
        captured: ImagePayload,
    },
    Processing {
        captured: ImagePayload,
        era: &'static Era,
        ticket: Ticket,
    },
    ShowingResult(Box<ResultStage>),
}

impl FlowState {
    pub fn step(&self) -> Step {
        match self {
            FlowState::Capturing => Step::Capture,
            FlowState::SelectingEra { .. } => Step::EraSelection,
            FlowState::Processing { .. } => Step::Processing,
            FlowState::ShowingResult(_) => Step::Result,
        }
    }
}

/// Generation to send after [`Flow::begin_generation`].
#[derive(Debug)]
pub struct Generation {
    pub ticket: Ticket,
    pub request: TransformRequest,
}

/// Edit to send after [`Flow::begin_edit`].
#[derive(Debug)]
pub struct Edit {
    pub ticket: Ticket,
    pub request: TransformRequest,
}

/// Outcome of [`Flow::begin_analysis`].
#[derive(Debug)]
pub enum AnalysisStart {
    Cached(AnalysisResult),
    /// Another call for this image is still outstanding.
    Pending,
    Start { image: ImageId, payload: ImagePayload },
}

/// How a completion was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Succeeded,
    Failed,
    Stale,
}

#[derive(Debug, Default)]
pub struct Flow {
    state: FlowState,
    next_id: u64,
}

impl Flow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> Step {
        self.state.step()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn invalid(&self, op: &'static str) -> FlowError {
        FlowError::InvalidTransition {
            op,
            step: self.step(),
        }
    }

    pub fn captured_image(&self) -> Option<&ImagePayload> {
        match &self.state {
            FlowState::Capturing => None,
            FlowState::SelectingEra { captured } | FlowState::Processing { captured, .. } => {
                Some(captured)
            }
            FlowState::ShowingResult(stage) => Some(&stage.original),
        }
    }

    pub fn result(&self) -> Option<&ResultStage> {
        match &self.state {
            FlowState::ShowingResult(stage) => Some(stage),
            _ => None,
        }
    }

    pub fn result_image(&self) -> Option<&ImagePayload> {
        self.result().map(|s| &s.current.image)
    }

    pub fn era(&self) -> Option<&'static Era> {
        match &self.state {
            FlowState::Processing { era, .. } => Some(*era),
            FlowState::ShowingResult(stage) => Some(stage.era),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<AnalysisResult> {
        match &self.result()?.analysis {
            AnalysisSlot::Empty => None,
            AnalysisSlot::InFlight { .. } => Some(AnalysisResult::loading()),
            AnalysisSlot::Ready { result, .. } => Some(result.clone()),
        }
    }

    #[cfg(test)]
    pub fn is_editing(&self) -> bool {
        self.result().is_some_and(|s| s.edit.is_some())
    }

    /// Store a capture and move on to era selection.
    pub fn submit_capture(&mut self, image: ImagePayload) -> Result<(), FlowError> {
        match self.state {
            FlowState::Capturing | FlowState::SelectingEra { .. } => {
                self.state = FlowState::SelectingEra { captured: image };
                Ok(())
            }
            _ => Err(self.invalid("submit a capture")),
        }
    }

    /// Back from era selection to the camera, dropping the capture.
    pub fn retake(&mut self) -> Result<(), FlowError> {
        match self.state {
            FlowState::Capturing | FlowState::SelectingEra { .. } => {
                self.state = FlowState::Capturing;
                Ok(())
            }
            _ => Err(self.invalid("retake")),
        }
    }

    /// Enter processing for `era`. Returns `Ok(None)` when nothing is captured.
    pub fn begin_generation(&mut self, era: &'static Era) -> Result<Option<Generation>, FlowError> {
        match &self.state {
            FlowState::Capturing => Ok(None),
            FlowState::SelectingEra { captured } => {
                let captured = captured.clone();
                let ticket = Ticket(self.next());
                let request = TransformRequest {
                    image: captured.clone(),
                    instruction: era.prompt.to_string(),
                };
                self.state = FlowState::Processing {
                    captured,
                    era,
                    ticket,
                };
                Ok(Some(Generation { ticket, request }))
            }
            FlowState::Processing { .. } => Err(FlowError::Busy),
            FlowState::ShowingResult(_) => Err(self.invalid("select an era")),
        }
    }

    pub fn finish_generation<E>(
        &mut self,
        ticket: Ticket,
        outcome: Result<ImagePayload, E>,
    ) -> Applied {
        let FlowState::Processing {
            ticket: pending, ..
        } = &self.state
        else {
            return Applied::Stale;
        };
        if *pending != ticket {
            return Applied::Stale;
        }
        let FlowState::Processing { captured, era, .. } = std::mem::take(&mut self.state) else {
            return Applied::Stale;
        };
        match outcome {
            Ok(image) => {
                let id = ImageId(self.next());
                self.state = FlowState::ShowingResult(Box::new(ResultStage {
                    original: captured,
                    era,
                    current: StoredImage { id, image },
                    edits: Vec::new(),
                    edit: None,
                    analysis: AnalysisSlot::Empty,
                }));
                Applied::Succeeded
            }
            Err(_) => {
                self.state = FlowState::SelectingEra { captured };
                Applied::Failed
            }
        }
    }

    /// Mark the result busy and hand back the edit request.
    pub fn begin_edit(&mut self, instruction: &str) -> Result<Edit, FlowError> {
        let instruction = instruction.trim();
        if self.result().is_none() {
            return Err(self.invalid("edit"));
        }
        if instruction.is_empty() {
            return Err(FlowError::EmptyInstruction);
        }
        let ticket = Ticket(self.next());
        let FlowState::ShowingResult(stage) = &mut self.state else {
            return Err(FlowError::InvalidTransition {
                op: "edit",
                step: Step::Result,
            });
        };
        if stage.edit.is_some() {
            return Err(FlowError::Busy);
        }
        stage.edit = Some(PendingEdit {
            ticket,
            instruction: instruction.to_string(),
        });
        Ok(Edit {
            ticket,
            request: TransformRequest {
                image: stage.current.image.clone(),
                instruction: instruction.to_string(),
            },
        })
    }

    /// Apply an edit outcome. Failure leaves the prior image untouched.
    pub fn finish_edit<E>(&mut self, ticket: Ticket, outcome: Result<ImagePayload, E>) -> Applied {
        let FlowState::ShowingResult(stage) = &mut self.state else {
            return Applied::Stale;
        };
        if !stage.edit.as_ref().is_some_and(|p| p.ticket == ticket) {
            return Applied::Stale;
        }
        let Some(pending) = stage.edit.take() else {
            return Applied::Stale;
        };
        match outcome {
            Ok(image) => {
                self.next_id += 1;
                stage.current = StoredImage {
                    id: ImageId(self.next_id),
                    image,
                };
                stage.edits.push(pending.instruction);
                stage.analysis = AnalysisSlot::Empty;
                Applied::Succeeded
            }
            Err(_) => Applied::Failed,
        }
    }

    /// Cached analysis, an in-flight marker, or the describe call to make.
    pub fn begin_analysis(&mut self) -> Result<AnalysisStart, FlowError> {
        let step = self.step();
        let FlowState::ShowingResult(stage) = &mut self.state else {
            return Err(FlowError::InvalidTransition {
                op: "analyze",
                step,
            });
        };
        let current = stage.current.id;
        match &stage.analysis {
            AnalysisSlot::Ready { image, result } if *image == current => {
                return Ok(AnalysisStart::Cached(result.clone()));
            }
            AnalysisSlot::InFlight { image } if *image == current => {
                return Ok(AnalysisStart::Pending);
            }
            _ => {}
        }
        stage.analysis = AnalysisSlot::InFlight { image: current };
        Ok(AnalysisStart::Start {
            image: current,
            payload: stage.current.image.clone(),
        })
    }

    /// Store an analysis for `image` if it is still the current result.
    pub fn finish_analysis(&mut self, image: ImageId, result: AnalysisResult) -> Applied {
        let FlowState::ShowingResult(stage) = &mut self.state else {
            return Applied::Stale;
        };
        let pending = matches!(stage.analysis, AnalysisSlot::InFlight { image: p } if p == image);
        if !pending || stage.current.id != image {
            return Applied::Stale;
        }
        stage.analysis = AnalysisSlot::Ready { image, result };
        Applied::Succeeded
    }

    /// Back to capture from anywhere; outstanding completions become stale.
    pub fn reset(&mut self) {
        self.state = FlowState::Capturing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eras;
    use crate::payload::ImageFormat;

    fn img(tag: &str) -> ImagePayload {
        ImagePayload::new(ImageFormat::Png, tag.as_bytes().to_vec()).unwrap()
    }

    fn victorian() -> &'static Era {
        eras::find("victorian").unwrap()
    }

    fn at_result() -> Flow {
        let mut flow = Flow::new();
        flow.submit_capture(img("img1")).unwrap();
        let generation = flow.begin_generation(victorian()).unwrap().unwrap();
        assert_eq!(
            flow.finish_generation::<()>(generation.ticket, Ok(img("img2"))),
            Applied::Succeeded
        );
        flow
    }

    #[test]
    fn capture_moves_to_era_selection() {
        let mut flow = Flow::new();
        assert_eq!(flow.step(), Step::Capture);
        flow.submit_capture(img("img1")).unwrap();
        assert_eq!(flow.step(), Step::EraSelection);
        assert_eq!(flow.captured_image(), Some(&img("img1")));
    }

    #[test]
    fn era_without_capture_is_a_noop() {
        let mut flow = Flow::new();
        assert!(flow.begin_generation(victorian()).unwrap().is_none());
        assert_eq!(flow.step(), Step::Capture);
    }

    #[test]
    fn generation_request_uses_era_prompt() {
        let mut flow = Flow::new();
        flow.submit_capture(img("img1")).unwrap();
        let generation = flow.begin_generation(victorian()).unwrap().unwrap();
        assert_eq!(flow.step(), Step::Processing);
        assert!(generation
            .request
            .instruction
            .starts_with("Transform this person into a Victorian aristocrat"));
        assert_eq!(generation.request.image, img("img1"));
    }

    #[test]
    fn reselecting_while_processing_is_busy() {
        let mut flow = Flow::new();
        flow.submit_capture(img("img1")).unwrap();
        flow.begin_generation(victorian()).unwrap();
        let other = eras::find("egypt").unwrap();
        assert_eq!(flow.begin_generation(other).unwrap_err(), FlowError::Busy);
        assert_eq!(flow.era().map(|e| e.id), Some("victorian"));
    }

    #[test]
    fn generation_success_shows_result() {
        let flow = at_result();
        assert_eq!(flow.step(), Step::Result);
        assert_eq!(flow.result_image(), Some(&img("img2")));
        assert_eq!(flow.captured_image(), Some(&img("img1")));
        assert_eq!(flow.era().map(|e| e.name), Some("Victorian London"));
    }

    #[test]
    fn generation_failure_keeps_capture() {
        let mut flow = Flow::new();
        flow.submit_capture(img("img1")).unwrap();
        let generation = flow.begin_generation(victorian()).unwrap().unwrap();
        assert_eq!(
            flow.finish_generation(generation.ticket, Err("boom")),
            Applied::Failed
        );
        assert_eq!(flow.step(), Step::EraSelection);
        assert_eq!(flow.captured_image(), Some(&img("img1")));
        assert!(flow.begin_generation(victorian()).unwrap().is_some());
    }

    #[test]
    fn completion_after_reset_is_stale() {
        let mut flow = Flow::new();
        flow.submit_capture(img("img1")).unwrap();
        let generation = flow.begin_generation(victorian()).unwrap().unwrap();
        flow.reset();
        assert_eq!(
            flow.finish_generation::<()>(generation.ticket, Ok(img("img2"))),
            Applied::Stale
        );
        assert_eq!(flow.step(), Step::Capture);
    }

    #[test]
    fn old_ticket_does_not_complete_new_generation() {
        let mut flow = Flow::new();
        flow.submit_capture(img("img1")).unwrap();
        let first = flow.begin_generation(victorian()).unwrap().unwrap();
        flow.reset();
        flow.submit_capture(img("img1b")).unwrap();
        let second = flow.begin_generation(victorian()).unwrap().unwrap();
        assert_eq!(
            flow.finish_generation::<()>(first.ticket, Ok(img("old"))),
            Applied::Stale
        );
        assert_eq!(flow.step(), Step::Processing);
        assert_eq!(
            flow.finish_generation::<()>(second.ticket, Ok(img("new"))),
            Applied::Succeeded
        );
        assert_eq!(flow.result_image(), Some(&img("new")));
    }

    #[test]
    fn edit_requires_instruction_and_single_flight() {
        let mut flow = at_result();
        assert_eq!(flow.begin_edit("   ").unwrap_err(), FlowError::EmptyInstruction);
        let edit = flow.begin_edit(" add a hat ").unwrap();
        assert_eq!(edit.request.instruction, "add a hat");
        assert_eq!(edit.request.image, img("img2"));
        assert!(flow.is_editing());
        assert_eq!(flow.begin_edit("make it night").unwrap_err(), FlowError::Busy);
    }

    #[test]
    fn edit_outside_result_is_invalid() {
        let mut flow = Flow::new();
        assert!(matches!(
            flow.begin_edit("add a hat"),
            Err(FlowError::InvalidTransition { step: Step::Capture, .. })
        ));
    }

    #[test]
    fn edit_success_replaces_image_and_drops_analysis() {
        let mut flow = at_result();
        let AnalysisStart::Start { image, .. } = flow.begin_analysis().unwrap() else {
            panic!("expected a fresh analysis");
        };
        flow.finish_analysis(image, AnalysisResult::ready("a portrait"));
        assert!(matches!(flow.begin_analysis().unwrap(), AnalysisStart::Cached(_)));

        let edit = flow.begin_edit("add a hat").unwrap();
        assert_eq!(flow.finish_edit::<()>(edit.ticket, Ok(img("img3"))), Applied::Succeeded);
        assert_eq!(flow.result_image(), Some(&img("img3")));
        assert!(flow.analysis().is_none());
        assert!(!flow.is_editing());
        assert_eq!(flow.result().unwrap().edits, vec!["add a hat".to_string()]);
        assert!(matches!(flow.begin_analysis().unwrap(), AnalysisStart::Start { .. }));
    }

    #[test]
    fn edit_failure_keeps_prior_image() {
        let mut flow = at_result();
        let edit = flow.begin_edit("add a hat").unwrap();
        assert_eq!(flow.finish_edit(edit.ticket, Err("boom")), Applied::Failed);
        assert_eq!(flow.step(), Step::Result);
        assert_eq!(flow.result_image(), Some(&img("img2")));
        assert!(!flow.is_editing());
        assert!(flow.result().unwrap().edits.is_empty());
    }

    #[test]
    fn analysis_is_single_flight() {
        let mut flow = at_result();
        assert!(matches!(flow.begin_analysis().unwrap(), AnalysisStart::Start { .. }));
        assert!(matches!(flow.begin_analysis().unwrap(), AnalysisStart::Pending));
        assert_eq!(flow.analysis(), Some(AnalysisResult::loading()));
    }

    #[test]
    fn analysis_for_replaced_image_is_stale() {
        let mut flow = at_result();
        let AnalysisStart::Start { image: old, .. } = flow.begin_analysis().unwrap() else {
            panic!("expected a fresh analysis");
        };
        let edit = flow.begin_edit("add a hat").unwrap();
        flow.finish_edit::<()>(edit.ticket, Ok(img("img3")));
        assert_eq!(
            flow.finish_analysis(old, AnalysisResult::ready("img2 text")),
            Applied::Stale
        );
        assert!(flow.analysis().is_none());
    }

    #[test]
    fn reset_clears_everything_from_any_state() {
        let mut flow = at_result();
        flow.reset();
        assert_eq!(flow.step(), Step::Capture);
        assert!(flow.captured_image().is_none());
        assert!(flow.result_image().is_none());
        assert!(flow.era().is_none());
        assert!(flow.analysis().is_none());

        let mut flow = Flow::new();
        flow.submit_capture(img("img1")).unwrap();
        flow.begin_generation(victorian()).unwrap();
        flow.reset();
        assert_eq!(flow.step(), Step::Capture);
        assert!(flow.captured_image().is_none());
    }

    #[test]
    fn retake_drops_capture() {
        let mut flow = Flow::new();
        flow.submit_capture(img("img1")).unwrap();
        flow.retake().unwrap();
        assert_eq!(flow.step(), Step::Capture);
        assert!(flow.captured_image().is_none());
        assert!(at_result().retake().is_err());
    }
}
