//! Capture sources: uploaded files and a one-shot camera command.
//!
//! The camera is an external program that writes a single encoded frame to
//! stdout (for example an `ffmpeg` grab from `/dev/video0`). The spawned child
//! is the device handle: it is reaped after a capture and killed if the stream
//! is dropped before that.

use crate::payload::{ImageFormat, ImagePayload, PayloadError};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// JPEG quality for camera frames (0.9 on a 0..1 scale).
pub const CAMERA_JPEG_QUALITY: u8 = 90;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("frame could not be decoded: {0}")]
    Frame(#[from] image::ImageError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Read an uploaded file verbatim.
///
/// A text file holding a data URL is parsed as one. Otherwise the format is
/// sniffed from the bytes, then the extension; anything else gets the jpeg tag.
pub async fn from_file(path: &Path) -> Result<ImagePayload, CaptureError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| CaptureError::Read {
            path: path.display().to_string(),
            source,
        })?;
    if data.starts_with(b"data:") {
        let text = String::from_utf8_lossy(&data);
        return Ok(ImagePayload::from_data_url(&text)?);
    }
    let format = detect_format(&data, path);
    Ok(ImagePayload::new(format, data)?)
}

fn detect_format(data: &[u8], path: &Path) -> ImageFormat {
    let sniffed = image::guess_format(data).ok().and_then(|f| match f {
        image::ImageFormat::Png => Some(ImageFormat::Png),
        image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
        image::ImageFormat::WebP => Some(ImageFormat::Webp),
        _ => None,
    });
    sniffed
        .or_else(|| {
            path.extension()
                .and_then(|e| e.to_str())
                .and_then(ImageFormat::from_tag)
        })
        .unwrap_or(ImageFormat::FALLBACK)
}

/// Mirror a raw camera frame and re-encode it as JPEG.
///
/// Frames are flipped horizontally so the capture matches the selfie preview.
pub fn encode_camera_frame(frame: &[u8]) -> Result<ImagePayload, CaptureError> {
    let decoded = image::load_from_memory(frame)?;
    let rgb = decoded.fliph().to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, CAMERA_JPEG_QUALITY).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(ImagePayload::new(ImageFormat::Jpeg, out)?)
}

/// Command line of the external camera grabber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraCommand {
    program: String,
    args: Vec<String>,
}

impl CameraCommand {
    /// Split on whitespace; quoting is not supported.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

/// An open camera. Dropping it releases the device.
pub struct CameraStream {
    child: Child,
}

impl CameraStream {
    pub fn open(cmd: &CameraCommand) -> Result<Self, CaptureError> {
        let child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::CaptureUnavailable(format!("{}: {e}", cmd.program)))?;
        tracing::debug!(program = %cmd.program, pid = child.id(), "camera opened");
        Ok(Self { child })
    }

    #[cfg(test)]
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Grab the frame and release the device.
    pub async fn capture(self) -> Result<ImagePayload, CaptureError> {
        let output = self
            .child
            .wait_with_output()
            .await
            .map_err(|e| CaptureError::CaptureUnavailable(e.to_string()))?;
        tracing::debug!(status = %output.status, bytes = output.stdout.len(), "camera released");
        if !output.status.success() {
            return Err(CaptureError::CaptureUnavailable(format!(
                "camera command exited with {}",
                output.status
            )));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::CaptureUnavailable(
                "camera produced no frame".into(),
            ));
        }
        encode_camera_frame(&output.stdout)
    }
}

/// Open the camera, take one frame, release it.
pub async fn capture_camera(cmd: &CameraCommand) -> Result<ImagePayload, CaptureError> {
    CameraStream::open(cmd)?.capture().await
}
