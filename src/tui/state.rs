use crate::eras::{self, Era};
use crate::model::{AnalysisResult, FlowEvent, ImageSummary, InfoEvent, Step};
use std::path::PathBuf;

/// Tabs of the result screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultTab {
    #[default]
    View,
    Edit,
    Analyze,
}

impl ResultTab {
    pub const ALL: [ResultTab; 3] = [ResultTab::View, ResultTab::Edit, ResultTab::Analyze];

    pub fn title(self) -> &'static str {
        match self {
            ResultTab::View => "View",
            ResultTab::Edit => "Edit",
            ResultTab::Analyze => "Analyze",
        }
    }

    pub fn index(self) -> usize {
        match self {
            ResultTab::View => 0,
            ResultTab::Edit => 1,
            ResultTab::Analyze => 2,
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Which text field, if any, currently receives key presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFocus {
    #[default]
    None,
    CapturePath,
    EditPrompt,
}

/// Mirror of the session built from flow events; owned by the UI thread only.
#[derive(Debug, Default)]
pub struct UiState {
    pub step: Option<Step>,
    pub tab: ResultTab,
    pub focus: InputFocus,
    pub show_help: bool,
    pub info: String,
    /// Notice shown on the capture screen when the camera cannot be used.
    pub capture_notice: Option<String>,
    pub capture_input: String,
    pub captured: Option<ImageSummary>,
    pub era_cursor: usize,
    pub traveling_to: Option<&'static str>,
    pub era: Option<&'static Era>,
    pub original: Option<ImageSummary>,
    pub result: Option<ImageSummary>,
    pub edits: Vec<String>,
    pub edit_input: String,
    pub editing: bool,
    pub analysis: Option<AnalysisResult>,
    pub last_saved_path: Option<PathBuf>,
    pub tick: usize,
}

impl UiState {
    pub fn current_step(&self) -> Step {
        self.step.unwrap_or(Step::Capture)
    }

    pub fn selected_era(&self) -> Option<&'static Era> {
        eras::by_index(self.era_cursor)
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let len = eras::ERAS.len() as isize;
        let next = (self.era_cursor as isize + delta).rem_euclid(len);
        self.era_cursor = next as usize;
    }

    fn clear_result(&mut self) {
        self.tab = ResultTab::View;
        self.era = None;
        self.original = None;
        self.result = None;
        self.edits.clear();
        self.edit_input.clear();
        self.editing = false;
        self.analysis = None;
    }
}

pub fn apply_event(state: &mut UiState, ev: FlowEvent) {
    match ev {
        FlowEvent::StepChanged { step } => {
            state.step = Some(step);
            state.focus = InputFocus::None;
            match step {
                Step::Capture => {
                    state.clear_result();
                    state.captured = None;
                    state.capture_input.clear();
                    state.traveling_to = None;
                }
                Step::EraSelection => {
                    state.capture_notice = None;
                    state.traveling_to = None;
                }
                Step::Processing => {}
                Step::Result => state.traveling_to = None,
            }
        }
        FlowEvent::GenerationFailed { message } => state.info = message,
        FlowEvent::ResultReady {
            era,
            original,
            result,
        } => {
            state.clear_result();
            state.era = Some(era);
            state.original = Some(ImageSummary::of(&original));
            state.result = Some(ImageSummary::of(&result));
            state.info = format!("Transport complete! Welcome to {}.", era.name);
        }
        FlowEvent::EditStarted => state.editing = true,
        FlowEvent::EditApplied { image, instruction } => {
            state.editing = false;
            state.result = Some(ImageSummary::of(&image));
            state.edits.push(instruction);
            state.edit_input.clear();
            state.tab = ResultTab::View;
            state.analysis = None;
            state.info = "Edit applied".into();
        }
        FlowEvent::EditFailed { message } => {
            state.editing = false;
            state.info = message;
        }
        FlowEvent::AnalysisStarted => state.analysis = Some(AnalysisResult::loading()),
        FlowEvent::AnalysisReady { analysis } => state.analysis = Some(analysis),
        FlowEvent::Info(info) => {
            match &info {
                InfoEvent::Traveling { era } => state.traveling_to = Some(*era),
                InfoEvent::Captured { mime, bytes } => {
                    state.captured = Some(ImageSummary {
                        mime: mime.to_string(),
                        bytes: *bytes,
                        width: None,
                        height: None,
                    });
                }
                InfoEvent::Saved { path } => state.last_saved_path = Some(path.clone()),
                InfoEvent::CaptureUnavailable(_) => {
                    state.capture_notice = Some(info.to_message());
                }
                InfoEvent::Message(_) => {}
            }
            state.info = info.to_message();
        }
    }
}
