use crate::model::SessionReport;
use crate::payload::{ImageFormat, ImagePayload};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// `<pictures>/chronosnap`, falling back to the home directory.
pub fn default_output_dir() -> Result<PathBuf> {
    let base = dirs::picture_dir()
        .or_else(dirs::home_dir)
        .context("no pictures or home directory")?;
    Ok(base.join("chronosnap"))
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

pub fn result_file_name(era_id: &str, session_id: &str, format: ImageFormat) -> String {
    let stamp = now_rfc3339().replace(':', "-").replace('T', "_");
    let stamp = stamp.split('.').next().unwrap_or(&stamp).trim_end_matches('Z');
    format!(
        "chronosnap-{}-{}-{}.{}",
        era_id,
        stamp,
        &session_id[..8.min(session_id.len())],
        format.extension()
    )
}

pub async fn save_image(path: &Path, image: &ImagePayload) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }
    tokio::fs::write(path, image.bytes())
        .await
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn export_json(path: &Path, report: &SessionReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
