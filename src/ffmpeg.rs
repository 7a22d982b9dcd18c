//! ffmpeg/ffprobe wrappers.
//!
//! Every audio and video operation in the pipeline goes through these
//! functions: measuring durations, joining audio, fitting images to the
//! output resolution and muxing the final slideshow.

use crate::error::{PosterError, Result};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Filter that scales to cover the frame and center-crops the overflow.
    pub fn cover_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
            w = self.width,
            h = self.height
        )
    }

    /// Orientation keyword used by stock photo search.
    pub fn orientation(&self) -> &'static str {
        if self.width > self.height {
            "landscape"
        } else if self.width < self.height {
            "portrait"
        } else {
            "square"
        }
    }
}

/// Encoder parameters for the final video.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub resolution: Resolution,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
}

/// Run an external tool, mapping spawn failures to tool errors.
async fn run(tool: &str, command: &mut Command) -> Result<Output> {
    let result = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match result {
        Ok(output) => Ok(output),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PosterError::ToolNotFound(tool.to_string()))
        }
        Err(e) => Err(PosterError::ToolFailed(format!("{} execution failed: {}", tool, e))),
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Queries the duration of a media file using ffprobe with JSON output.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let output = run(
        "ffprobe",
        Command::new("ffprobe")
            .arg("-v").arg("quiet")
            .arg("-print_format").arg("json")
            .arg("-show_format")
            .arg(path),
    )
    .await?;

    if !output.status.success() {
        return Err(PosterError::ToolFailed(format!(
            "ffprobe returned error for {}",
            path.display()
        )));
    }

    let json_str = String::from_utf8_lossy(&output.stdout);
    parse_probe_duration(&json_str).ok_or_else(|| {
        PosterError::ToolFailed(format!("Could not determine duration of {}", path.display()))
    })
}

fn parse_probe_duration(json_str: &str) -> Option<f64> {
    let parsed: serde_json::Value = serde_json::from_str(json_str).ok()?;
    parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Quote a path for an ffmpeg concat list.
fn concat_entry(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file '{}'", absolute.display().to_string().replace('\'', "'\\''"))
}

/// Build a concat demuxer list for a sequence of files played back to back.
pub fn audio_concat_list(parts: &[PathBuf]) -> String {
    let mut list = String::new();
    for part in parts {
        list.push_str(&concat_entry(part));
        list.push('\n');
    }
    list
}

/// Build a concat demuxer list showing each image for its duration.
///
/// The demuxer ignores the duration of the final entry, so the last image is
/// listed a second time.
pub fn slideshow_concat_list(frames: &[(PathBuf, f64)]) -> String {
    let mut list = String::new();
    for (path, duration) in frames {
        list.push_str(&concat_entry(path));
        list.push('\n');
        list.push_str(&format!("duration {:.3}\n", duration));
    }
    if let Some((last, _)) = frames.last() {
        list.push_str(&concat_entry(last));
        list.push('\n');
    }
    list
}

/// Join audio files in order into one PCM WAV file.
#[instrument(skip(parts), fields(parts = parts.len(), dest = %dest.display()))]
pub async fn concat_audio(parts: &[PathBuf], dest: &Path) -> Result<()> {
    if parts.is_empty() {
        return Err(PosterError::InvalidInput("No audio parts to concatenate".into()));
    }

    let list_path = dest.with_extension("concat.txt");
    tokio::fs::write(&list_path, audio_concat_list(parts)).await?;

    let output = run(
        "ffmpeg",
        Command::new("ffmpeg")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg("-f").arg("concat")
            .arg("-safe").arg("0")
            .arg("-i").arg(&list_path)
            .arg("-c:a").arg("pcm_s16le")
            .arg(dest),
    )
    .await?;

    if !output.status.success() {
        return Err(PosterError::ToolFailed(format!(
            "ffmpeg audio concat failed: {}",
            stderr_of(&output)
        )));
    }

    debug!("Combined {} audio parts", parts.len());
    Ok(())
}

/// Scale and center-crop an image to the target resolution, writing a JPEG.
pub async fn fit_image(source: &Path, dest: &Path, resolution: Resolution) -> Result<()> {
    let output = run(
        "ffmpeg",
        Command::new("ffmpeg")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg("-i").arg(source)
            .arg("-vf").arg(resolution.cover_filter())
            .arg("-frames:v").arg("1")
            .arg("-q:v").arg("2")
            .arg(dest),
    )
    .await?;

    if !output.status.success() {
        return Err(PosterError::ToolFailed(format!(
            "ffmpeg could not fit {}: {}",
            source.display(),
            stderr_of(&output)
        )));
    }

    Ok(())
}

/// Encode a slideshow concat list together with an audio track.
///
/// Output is cut at `duration` seconds so audio beyond the last image is
/// dropped.
#[instrument(skip(list_path, audio, options), fields(dest = %dest.display()))]
pub async fn encode_slideshow(
    list_path: &Path,
    audio: &Path,
    dest: &Path,
    duration: f64,
    options: &EncodeOptions,
) -> Result<()> {
    let filter = format!(
        "{},fps={},format=yuv420p",
        options.resolution.cover_filter(),
        options.fps
    );

    let output = run(
        "ffmpeg",
        Command::new("ffmpeg")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg("-f").arg("concat")
            .arg("-safe").arg("0")
            .arg("-i").arg(list_path)
            .arg("-i").arg(audio)
            .arg("-map").arg("0:v:0")
            .arg("-map").arg("1:a:0")
            .arg("-vf").arg(filter)
            .arg("-c:v").arg(&options.video_codec)
            .arg("-c:a").arg(&options.audio_codec)
            .arg("-t").arg(format!("{:.3}", duration))
            .arg("-movflags").arg("+faststart")
            .arg(dest),
    )
    .await?;

    if !output.status.success() {
        return Err(PosterError::ToolFailed(format!(
            "ffmpeg encode failed: {}",
            stderr_of(&output)
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_duration() {
        let json = r#"{"format": {"filename": "a.mp3", "duration": "2.351000"}}"#;
        assert_eq!(parse_probe_duration(json), Some(2.351));
        assert_eq!(parse_probe_duration(r#"{"format": {}}"#), None);
        assert_eq!(parse_probe_duration("garbage"), None);
    }

    #[test]
    fn test_slideshow_list_repeats_last_frame() {
        let frames = vec![
            (PathBuf::from("/tmp/a.jpg"), 1.5),
            (PathBuf::from("/tmp/b.jpg"), 2.25),
        ];
        let list = slideshow_concat_list(&frames);
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(
            lines,
            vec![
                "file '/tmp/a.jpg'",
                "duration 1.500",
                "file '/tmp/b.jpg'",
                "duration 2.250",
                "file '/tmp/b.jpg'",
            ]
        );
    }

    #[test]
    fn test_concat_entry_escapes_quotes() {
        let list = audio_concat_list(&[PathBuf::from("/tmp/it's.mp3")]);
        assert_eq!(list, "file '/tmp/it'\\''s.mp3'\n");
    }

    #[test]
    fn test_resolution_helpers() {
        let square = Resolution::new(1280, 1280);
        assert_eq!(square.orientation(), "square");
        assert_eq!(Resolution::new(1920, 1080).orientation(), "landscape");
        assert_eq!(
            square.cover_filter(),
            "scale=1280:1280:force_original_aspect_ratio=increase,crop=1280:1280"
        );
    }
}
