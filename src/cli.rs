use crate::capture::{self, CameraCommand};
use crate::engine::gemini::GeminiClient;
use crate::eras;
use crate::model::{FlowEvent, SessionConfig, Step};
use crate::orchestrator::session::{Session, GENERATION_FAILED_NOTICE};
use crate::orchestrator::{self, flow::Applied};
use anyhow::{Context, Result};
use clap::Parser;
use rand::RngCore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "chronosnap",
    version,
    about = "Send your portrait through time with a generative image model"
)]
pub struct Cli {
    /// Base URL of the Gemini API
    #[arg(long, default_value = "https://generativelanguage.googleapis.com")]
    pub base_url: String,

    /// API key (falls back to the API_KEY environment variable)
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model used for era transformations and edits
    #[arg(long, default_value = "gemini-2.5-flash-image")]
    pub image_model: String,

    /// Model used for image analysis
    #[arg(long, default_value = "gemini-3-pro-preview")]
    pub analysis_model: String,

    /// HTTP timeout for each remote call
    #[arg(long, default_value = "120s")]
    pub timeout: humantime::Duration,

    /// Command that writes one camera frame to stdout
    /// (e.g. "ffmpeg -loglevel quiet -f v4l2 -i /dev/video0 -frames:v 1 -f image2pipe -vcodec png -")
    #[arg(long, env = "CHRONOSNAP_CAMERA")]
    pub camera_command: Option<String>,

    /// Directory for saved results (default: <pictures>/chronosnap)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Print the era catalog and exit
    #[arg(long)]
    pub list_eras: bool,

    /// Print a JSON report and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print a text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except the JSON report and errors
    #[arg(long)]
    pub silent: bool,

    /// Portrait to upload (text/JSON mode)
    #[arg(long, conflicts_with = "camera")]
    pub image: Option<PathBuf>,

    /// Capture the portrait with --camera-command (text/JSON mode)
    #[arg(long)]
    pub camera: bool,

    /// Era id to travel to, see --list-eras (text/JSON mode)
    #[arg(long)]
    pub era: Option<String>,

    /// Free-text edit applied to the result; repeat for several edits
    #[arg(long = "edit")]
    pub edits: Vec<String>,

    /// Analyze the final image
    #[arg(long)]
    pub analyze: bool,

    /// Where to write the final image
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Also write the JSON report to this file
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Write logs to this file (the TUI never logs to the terminal)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn is_interactive(&self) -> bool {
        !(self.json || self.text || self.silent || self.list_eras)
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.list_eras {
        for line in eras::catalog_lines() {
            println!("{line}");
        }
        return Ok(());
    }

    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    if args.is_interactive() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_text(args).await;
        }
    }

    run_text(args).await
}

/// Generate a random session ID used in saved file names.
fn gen_session_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{:016x}", u64::from_le_bytes(b))
}

fn resolve_api_key(args: &Cli) -> Result<String> {
    args.api_key
        .clone()
        .or_else(|| std::env::var("API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
        .context("no API key: set GEMINI_API_KEY or pass --api-key")
}

/// Build a `SessionConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<SessionConfig> {
    Ok(SessionConfig {
        base_url: args.base_url.clone(),
        api_key: resolve_api_key(args)?,
        session_id: gen_session_id(),
        image_model: args.image_model.clone(),
        analysis_model: args.analysis_model.clone(),
        request_timeout: Duration::from(args.timeout),
        user_agent: format!("chronosnap/{}", env!("CARGO_PKG_VERSION")),
        camera_command: args.camera_command.clone(),
        output_dir: args.output_dir.clone(),
    })
}

pub fn build_session(
    cfg: &SessionConfig,
    event_tx: Option<mpsc::UnboundedSender<FlowEvent>>,
) -> Result<Session> {
    let client = GeminiClient::new(cfg)?;
    Ok(Session::new(Arc::new(client), event_tx))
}

fn render_event(ev: &FlowEvent) -> Option<String> {
    match ev {
        FlowEvent::StepChanged { step } => Some(format!("== {} ==", step.label())),
        FlowEvent::GenerationFailed { message } | FlowEvent::EditFailed { message } => {
            Some(message.clone())
        }
        FlowEvent::EditStarted => Some("Rewriting the timeline...".into()),
        FlowEvent::ResultReady { result, .. } => Some(format!(
            "Arrived ({})",
            crate::model::ImageSummary::of(result).describe()
        )),
        FlowEvent::EditApplied { image, .. } => Some(format!(
            "Edit applied ({})",
            crate::model::ImageSummary::of(image).describe()
        )),
        FlowEvent::AnalysisStarted => Some("Scanning the particles...".into()),
        FlowEvent::AnalysisReady { .. } => None,
        FlowEvent::Info(info) => Some(info.to_message()),
    }
}

/// Run the whole flow from flags: capture, era, edits, analysis, save, report.
async fn run_text(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    let era_id = args
        .era
        .as_deref()
        .context("--era is required outside the TUI (see --list-eras)")?;
    let era = eras::find(era_id).with_context(|| {
        let ids: Vec<_> = eras::ERAS.iter().map(|e| e.id).collect();
        format!("unknown era {era_id:?}; choose one of {}", ids.join(", "))
    })?;

    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<FlowEvent>();
    let progress = {
        let out_tx = out_tx.clone();
        let silent = args.silent;
        tokio::spawn(async move {
            while let Some(ev) = evt_rx.recv().await {
                if silent {
                    continue;
                }
                if let Some(line) = render_event(&ev) {
                    let _ = out_tx.send(OutputLine::Stderr(line));
                }
            }
        })
    };

    let session = build_session(&cfg, Some(evt_tx))?;
    let outcome = tokio::select! {
        res = drive_session(&args, &cfg, &session, era) => res,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    };
    // Closing the session closes the event channel.
    let snapshot = session.snapshot().await;
    drop(session);
    let _ = progress.await;

    let saved = match outcome {
        Ok(saved) => saved,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };

    let report = orchestrator::build_report(&cfg, &snapshot, Some(saved))?;
    if let Some(p) = args.export_json.as_deref() {
        crate::storage::export_json(p, &report)?;
    }
    if args.json {
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&report)?));
    } else {
        for line in crate::text_summary::build_text_summary(&report).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

async fn drive_session(
    args: &Cli,
    cfg: &SessionConfig,
    session: &Session,
    era: &'static eras::Era,
) -> Result<PathBuf> {
    let image = match (&args.image, args.camera) {
        (Some(path), _) => capture::from_file(path)
            .await
            .with_context(|| format!("read portrait {}", path.display()))?,
        (None, true) => {
            let cmd = cfg
                .camera_command
                .as_deref()
                .and_then(CameraCommand::parse)
                .context("--camera needs --camera-command")?;
            capture::capture_camera(&cmd).await?
        }
        (None, false) => anyhow::bail!("pass --image PATH or --camera"),
    };
    session.submit_capture(image).await?;

    if session.select_era(era).await? != Step::Result {
        anyhow::bail!(GENERATION_FAILED_NOTICE);
    }

    for edit in &args.edits {
        // A failed edit keeps the previous image; later edits build on it.
        if session.edit(edit).await? == Applied::Failed {
            tracing::warn!(edit = %edit, "edit failed, keeping previous image");
        }
    }

    if args.analyze {
        session.request_analysis().await?;
    }

    let snapshot = session.snapshot().await;
    orchestrator::save_result(cfg, &snapshot, args.output.as_deref()).await
}
