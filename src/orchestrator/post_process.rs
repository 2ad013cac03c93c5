//! Post-result processing: saving the generated image and building reports.

use super::session::SessionSnapshot;
use crate::model::{ImageSummary, SessionConfig, SessionReport};
use crate::storage;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Write the current result image to `explicit`, or to a generated name in
/// the configured (or default) output directory.
pub(crate) async fn save_result(
    cfg: &SessionConfig,
    snapshot: &SessionSnapshot,
    explicit: Option<&Path>,
) -> Result<PathBuf> {
    let image = snapshot
        .result
        .as_ref()
        .context("no generated image to save yet")?;
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let dir = match cfg.output_dir.clone() {
                Some(d) => d,
                None => storage::default_output_dir()?,
            };
            let era = snapshot.era.map(|e| e.id).unwrap_or("result");
            dir.join(storage::result_file_name(era, &cfg.session_id, image.format()))
        }
    };
    storage::save_image(&path, image).await?;
    tracing::info!(path = %path.display(), "result saved");
    Ok(path)
}

/// Build the JSON report for a finished session.
pub(crate) fn build_report(
    cfg: &SessionConfig,
    snapshot: &SessionSnapshot,
    saved_path: Option<PathBuf>,
) -> Result<SessionReport> {
    let original = snapshot.captured.as_ref().context("session has no capture")?;
    let result = snapshot.result.as_ref().context("session has no result")?;
    let era = snapshot.era.context("session has no era")?;
    Ok(SessionReport {
        timestamp_utc: storage::now_rfc3339(),
        session_id: cfg.session_id.clone(),
        era_id: era.id.to_string(),
        era_name: era.name.to_string(),
        original: ImageSummary::of(original),
        result: ImageSummary::of(result),
        edits: snapshot.edits.clone(),
        analysis: snapshot
            .analysis
            .as_ref()
            .filter(|a| !a.is_loading)
            .map(|a| a.text.clone()),
        saved_path,
        config: cfg.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eras;
    use crate::model::AnalysisResult;
    use crate::orchestrator::testing::img;
    use std::time::Duration;

    fn cfg(dir: Option<&Path>) -> SessionConfig {
        SessionConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: "k".into(),
            session_id: "abcdef0123".into(),
            image_model: "image".into(),
            analysis_model: "analysis".into(),
            request_timeout: Duration::from_secs(5),
            user_agent: "test".into(),
            camera_command: None,
            output_dir: dir.map(Path::to_path_buf),
        }
    }

    fn finished() -> SessionSnapshot {
        SessionSnapshot {
            captured: Some(img("img1")),
            result: Some(img("img3")),
            era: eras::find("wildwest"),
            edits: vec!["add a hat".into()],
            analysis: Some(AnalysisResult::ready("A dusty sheriff.")),
        }
    }

    #[tokio::test]
    async fn saves_into_output_dir_with_era_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_result(&cfg(Some(dir.path())), &finished(), None)
            .await
            .unwrap();
        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("chronosnap-wildwest-"), "{name}");
        assert!(name.ends_with(".png"), "{name}");
        assert_eq!(std::fs::read(&path).unwrap(), b"img3");
    }

    #[tokio::test]
    async fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out.png");
        let path = save_result(&cfg(None), &finished(), Some(&target))
            .await
            .unwrap();
        assert_eq!(path, target);
        assert!(target.exists());
    }

    #[tokio::test]
    async fn nothing_to_save_before_result() {
        let mut snap = finished();
        snap.result = None;
        assert!(save_result(&cfg(None), &snap, None).await.is_err());
    }

    #[test]
    fn report_carries_edits_and_analysis() {
        let report = build_report(&cfg(None), &finished(), None).unwrap();
        assert_eq!(report.era_id, "wildwest");
        assert_eq!(report.era_name, "Wild West");
        assert_eq!(report.edits, vec!["add a hat".to_string()]);
        assert_eq!(report.analysis.as_deref(), Some("A dusty sheriff."));
        assert_eq!(report.result.bytes, 4);
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("\"api_key\""));
    }

    #[test]
    fn loading_analysis_is_left_out() {
        let mut snap = finished();
        snap.analysis = Some(AnalysisResult::loading());
        let report = build_report(&cfg(None), &snap, None).unwrap();
        assert!(report.analysis.is_none());
    }
}
