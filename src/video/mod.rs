//! Video composition: images timed against narration.

use crate::config::VideoSettings;
use crate::error::{PosterError, Result};
use crate::ffmpeg::{self, EncodeOptions, Resolution};
use crate::media::MediaAsset;
use crate::speech::SynthesizedAudio;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// The finished video on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedVideo {
    pub path: PathBuf,
    /// Number of image/duration pairs in the video.
    pub segments: usize,
    /// Length in seconds.
    pub duration: f64,
}

/// Images paired positionally with segment durations.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionPlan {
    pub frames: Vec<(PathBuf, f64)>,
}

impl CompositionPlan {
    /// Pair image `i` with duration `i`, truncating to the shorter sequence.
    pub fn new(assets: &[MediaAsset], durations: &[f64]) -> Result<Self> {
        if assets.is_empty() {
            return Err(PosterError::Composition("No images to compose".to_string()));
        }
        if durations.is_empty() {
            return Err(PosterError::Composition("No audio segments to compose".to_string()));
        }
        if assets.len() != durations.len() {
            warn!(
                "{} images for {} segments, using {}",
                assets.len(),
                durations.len(),
                assets.len().min(durations.len())
            );
        }

        let frames = assets
            .iter()
            .zip(durations)
            .map(|(asset, duration)| (asset.path.clone(), *duration))
            .collect();

        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.frames.iter().map(|(_, d)| d).sum()
    }
}

/// Stage contract: mux images and narration into one video file.
#[async_trait]
pub trait VideoComposer: Send + Sync {
    async fn create_video(
        &self,
        assets: &[MediaAsset],
        audio: &SynthesizedAudio,
        output_path: &Path,
    ) -> Result<ComposedVideo>;
}

/// Composer that drives ffmpeg's concat demuxer.
pub struct FfmpegComposer {
    options: EncodeOptions,
}

impl FfmpegComposer {
    pub fn new(settings: &VideoSettings) -> Self {
        Self {
            options: EncodeOptions {
                resolution: Resolution::new(settings.width, settings.height),
                fps: settings.fps,
                video_codec: settings.video_codec.clone(),
                audio_codec: settings.audio_codec.clone(),
            },
        }
    }
}

#[async_trait]
impl VideoComposer for FfmpegComposer {
    #[instrument(skip(self, assets, audio), fields(output = %output_path.display()))]
    async fn create_video(
        &self,
        assets: &[MediaAsset],
        audio: &SynthesizedAudio,
        output_path: &Path,
    ) -> Result<ComposedVideo> {
        let plan = CompositionPlan::new(assets, &audio.durations())?;
        info!("Composing {} segments ({:.1}s)", plan.len(), plan.total_duration());

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let work_dir = tempfile::tempdir()?;
        let list_path = work_dir.path().join("frames.txt");
        tokio::fs::write(&list_path, ffmpeg::slideshow_concat_list(&plan.frames)).await?;

        ffmpeg::encode_slideshow(
            &list_path,
            &audio.combined_path,
            output_path,
            plan.total_duration(),
            &self.options,
        )
        .await
        .map_err(|e| PosterError::Composition(e.to_string()))?;

        info!("Video written to {}", output_path.display());
        Ok(ComposedVideo {
            path: output_path.to_path_buf(),
            segments: plan.len(),
            duration: plan.total_duration(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImageStrategy, TopicConfig};
    use crate::media::templated_prompts;
    use crate::speech::split_sentences;

    fn assets(n: usize) -> Vec<MediaAsset> {
        (0..n)
            .map(|i| MediaAsset {
                path: PathBuf::from(format!("image_{}.jpg", i)),
                strategy: ImageStrategy::StockPhotos,
                origin: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_three_shots_two_sentences_yield_two_segments() {
        let topic = TopicConfig::from_toml_str(
            r#"
[content_idea]
role = "r"
task = "t"

[story_writer]
role = "r"

[image_generation]
shot_templates = [
  { name = "a", template = "{subject} front" },
  { name = "b", template = "{subject} side" },
  { name = "c", template = "{subject} rear" },
]
"#,
            "test",
        )
        .unwrap();

        let shots = templated_prompts(&topic.image, "Miata");
        assert_eq!(shots.len(), 3);

        let sentences = split_sentences("The Miata arrived in 1989. It changed everything.");
        assert_eq!(sentences.len(), 2);

        let durations = vec![2.4, 1.9];
        let plan = CompositionPlan::new(&assets(shots.len()), &durations).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.frames[1], (PathBuf::from("image_1.jpg"), 1.9));
        assert!((plan.total_duration() - 4.3).abs() < 1e-9);
    }

    #[test]
    fn test_fewer_images_than_segments_truncates_durations() {
        let plan = CompositionPlan::new(&assets(2), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(plan.len(), 2);
        assert!((plan.total_duration() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(matches!(
            CompositionPlan::new(&[], &[1.0]),
            Err(PosterError::Composition(_))
        ));
        assert!(matches!(
            CompositionPlan::new(&assets(1), &[]),
            Err(PosterError::Composition(_))
        ));
    }
}
