use crate::eras::Era;
use crate::payload::ImagePayload;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub base_url: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub session_id: String,
    pub image_model: String,
    pub analysis_model: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
    pub camera_command: Option<String>,
    pub output_dir: Option<std::path::PathBuf>,
}

/// Coarse step of the capture → era → processing → result flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Capture,
    EraSelection,
    Processing,
    Result,
}

impl Step {
    pub fn label(self) -> &'static str {
        match self {
            Step::Capture => "1. Snap",
            Step::EraSelection => "2. Select Time",
            Step::Processing => "Processing",
            Step::Result => "3. Experience",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub text: String,
    pub is_loading: bool,
}

impl AnalysisResult {
    pub fn loading() -> Self {
        Self {
            text: String::new(),
            is_loading: true,
        }
    }

    pub fn ready(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_loading: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FlowEvent {
    StepChanged {
        step: Step,
    },
    /// Initial generation failed; the capture is kept for a retry.
    GenerationFailed {
        message: String,
    },
    /// Initial generation succeeded.
    ResultReady {
        era: &'static Era,
        original: ImagePayload,
        result: ImagePayload,
    },
    EditStarted,
    EditApplied {
        image: ImagePayload,
        instruction: String,
    },
    EditFailed {
        message: String,
    },
    AnalysisStarted,
    AnalysisReady {
        analysis: AnalysisResult,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the orchestrator and consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    Message(String),
    Traveling { era: &'static str },
    Captured { mime: &'static str, bytes: usize },
    Saved { path: std::path::PathBuf },
    CaptureUnavailable(String),
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Traveling { era } => format!("Traveling to {era}..."),
            InfoEvent::Captured { mime, bytes } => {
                format!("Captured {mime} image ({})", human_bytes(*bytes))
            }
            InfoEvent::Saved { path } => format!("Saved: {}", path.display()),
            InfoEvent::CaptureUnavailable(reason) => {
                format!("Camera unavailable ({reason}). Upload a file instead.")
            }
        }
    }
}

pub fn human_bytes(n: usize) -> String {
    const KIB: f64 = 1024.0;
    let n = n as f64;
    if n < KIB {
        format!("{n:.0} B")
    } else if n < KIB * KIB {
        format!("{:.1} KiB", n / KIB)
    } else {
        format!("{:.1} MiB", n / (KIB * KIB))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub mime: String,
    pub bytes: usize,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl ImageSummary {
    pub fn of(image: &ImagePayload) -> Self {
        let dims = image.dimensions();
        Self {
            mime: image.mime_type().to_string(),
            bytes: image.len(),
            width: dims.map(|d| d.0),
            height: dims.map(|d| d.1),
        }
    }

    pub fn describe(&self) -> String {
        match (self.width, self.height) {
            (Some(w), Some(h)) => format!("{} {w}x{h} ({})", self.mime, human_bytes(self.bytes)),
            _ => format!("{} ({})", self.mime, human_bytes(self.bytes)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub timestamp_utc: String,
    pub session_id: String,
    pub era_id: String,
    pub era_name: String,
    pub original: ImageSummary,
    pub result: ImageSummary,
    #[serde(default)]
    pub edits: Vec<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub saved_path: Option<std::path::PathBuf>,
    pub config: SessionConfig,
}
