//! Session controller.
//!
//! Turns UI commands into orchestrator calls. Remote work runs as tasks so the
//! command loop stays responsive; the flow itself rejects overlapping requests.

use super::post_process;
use super::session::Session;
use crate::capture::{self, CameraCommand, CaptureError};
use crate::eras::Era;
use crate::model::{FlowEvent, InfoEvent, SessionConfig};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;

/// Commands emitted by UI layers to drive the session.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    CaptureFile(PathBuf),
    CaptureCamera,
    SelectEra(&'static Era),
    Retake,
    Edit(String),
    Analyze,
    Save,
    Reset,
    Quit,
}

fn info(event_tx: &UnboundedSender<FlowEvent>, ev: InfoEvent) {
    let _ = event_tx.send(FlowEvent::Info(ev));
}

fn report_capture_error(event_tx: &UnboundedSender<FlowEvent>, e: CaptureError) {
    tracing::warn!("{e}");
    let ev = match e {
        CaptureError::CaptureUnavailable(reason) => InfoEvent::CaptureUnavailable(reason),
        other => InfoEvent::Message(format!("Capture failed: {other}")),
    };
    info(event_tx, ev);
}

/// Run commands against `session` until `Quit` or the command channel closes.
pub(crate) async fn run_controller(
    cfg: &SessionConfig,
    session: Arc<Session>,
    event_tx: UnboundedSender<FlowEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let camera = cfg.camera_command.as_deref().and_then(CameraCommand::parse);
    let mut tasks: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    UiCommand::CaptureFile(path) => {
                        let session = session.clone();
                        let tx = event_tx.clone();
                        tasks.spawn(async move {
                            match capture::from_file(&path).await {
                                Ok(image) => {
                                    if let Err(e) = session.submit_capture(image).await {
                                        info(&tx, InfoEvent::Message(e.to_string()));
                                    }
                                }
                                Err(e) => report_capture_error(&tx, e),
                            }
                        });
                    }
                    UiCommand::CaptureCamera => {
                        let Some(cmd) = camera.clone() else {
                            info(&event_tx, InfoEvent::CaptureUnavailable(
                                "no --camera-command configured".into(),
                            ));
                            continue;
                        };
                        let session = session.clone();
                        let tx = event_tx.clone();
                        tasks.spawn(async move {
                            match capture::capture_camera(&cmd).await {
                                Ok(image) => {
                                    if let Err(e) = session.submit_capture(image).await {
                                        info(&tx, InfoEvent::Message(e.to_string()));
                                    }
                                }
                                Err(e) => report_capture_error(&tx, e),
                            }
                        });
                    }
                    UiCommand::SelectEra(era) => {
                        let session = session.clone();
                        let tx = event_tx.clone();
                        tasks.spawn(async move {
                            if let Err(e) = session.select_era(era).await {
                                info(&tx, InfoEvent::Message(e.to_string()));
                            }
                        });
                    }
                    UiCommand::Retake => {
                        if let Err(e) = session.retake().await {
                            info(&event_tx, InfoEvent::Message(e.to_string()));
                        }
                    }
                    UiCommand::Edit(instruction) => {
                        let session = session.clone();
                        let tx = event_tx.clone();
                        tasks.spawn(async move {
                            if let Err(e) = session.edit(&instruction).await {
                                info(&tx, InfoEvent::Message(e.to_string()));
                            }
                        });
                    }
                    UiCommand::Analyze => {
                        let session = session.clone();
                        let tx = event_tx.clone();
                        tasks.spawn(async move {
                            // Answers for the current image arrive as events.
                            if let Err(e) = session.request_analysis().await {
                                info(&tx, InfoEvent::Message(e.to_string()));
                            }
                        });
                    }
                    UiCommand::Save => {
                        let snapshot = session.snapshot().await;
                        match post_process::save_result(cfg, &snapshot, None).await {
                            Ok(path) => info(&event_tx, InfoEvent::Saved { path }),
                            Err(e) => info(&event_tx, InfoEvent::Message(format!("Save failed: {e:#}"))),
                        }
                    }
                    UiCommand::Reset => session.reset().await,
                    UiCommand::Quit => break,
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    if !e.is_cancelled() {
                        info(&event_tx, InfoEvent::Message(format!("Task failed: {e}")));
                    }
                }
            }
        }
    }

    // In-flight remote calls cannot be cancelled upstream; their results are simply dropped.
    tasks.abort_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eras;
    use crate::model::Step;
    use crate::orchestrator::testing::{img, FakeService};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn cfg(dir: &std::path::Path) -> SessionConfig {
        SessionConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: String::new(),
            session_id: "test".into(),
            image_model: "image".into(),
            analysis_model: "analysis".into(),
            request_timeout: Duration::from_secs(1),
            user_agent: "test".into(),
            camera_command: None,
            output_dir: Some(dir.to_path_buf()),
        }
    }

    async fn next_step(rx: &mut mpsc::UnboundedReceiver<FlowEvent>, want: Step) {
        while let Some(ev) = rx.recv().await {
            if let FlowEvent::StepChanged { step } = ev {
                if step == want {
                    return;
                }
            }
        }
        panic!("event stream ended before {want:?}");
    }

    #[tokio::test]
    async fn drives_capture_to_saved_result() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("me.png");
        std::fs::write(&upload, "data:image/png;base64,aGVsbG8=").unwrap();

        let fake = Arc::new(FakeService::with_transforms([Some(img("img2"))]));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(fake.clone(), Some(event_tx.clone())));
        let cfg = cfg(dir.path());
        let controller = tokio::spawn({
            let session = session.clone();
            async move { run_controller(&cfg, session, event_tx, cmd_rx).await }
        });

        cmd_tx.send(UiCommand::CaptureFile(upload)).unwrap();
        next_step(&mut event_rx, Step::EraSelection).await;
        cmd_tx
            .send(UiCommand::SelectEra(eras::find("egypt").unwrap()))
            .unwrap();
        next_step(&mut event_rx, Step::Result).await;

        cmd_tx.send(UiCommand::Save).unwrap();
        let saved = loop {
            match event_rx.recv().await {
                Some(FlowEvent::Info(InfoEvent::Saved { path })) => break path,
                Some(_) => continue,
                None => panic!("no save event"),
            }
        };
        assert_eq!(std::fs::read(&saved).unwrap(), b"img2");

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();
        assert_eq!(fake.transform_calls(), 1);
    }

    #[tokio::test]
    async fn camera_without_command_reports_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeService::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(fake, Some(event_tx.clone())));
        let cfg = cfg(dir.path());
        let controller =
            tokio::spawn(async move { run_controller(&cfg, session, event_tx, cmd_rx).await });

        cmd_tx.send(UiCommand::CaptureCamera).unwrap();
        match event_rx.recv().await {
            Some(FlowEvent::Info(InfoEvent::CaptureUnavailable(_))) => {}
            other => panic!("unexpected {other:?}"),
        }
        drop(cmd_tx);
        controller.await.unwrap().unwrap();
    }
}
