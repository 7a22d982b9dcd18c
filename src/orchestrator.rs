//! Pipeline orchestrator for PosterBot.
//!
//! Runs idea, script, speech, media, composition and distribution in order,
//! once per iteration. A failing stage ends only its own iteration.

use crate::config::{Platform, Settings, TopicConfig};
use crate::context::PipelineContext;
use crate::distribution::{ChannelDistributor, DistributionResult, Distributor, VideoMetadata};
use crate::error::{PosterError, Result};
use crate::generation::{IdeaGenerator, OpenAIIdeaGenerator, OpenAIScriptWriter, ScriptWriter};
use crate::media::{MediaCollector, MediaRequest, StrategyCollector};
use crate::speech::{OpenAISynthesizer, SpeechSynthesizer};
use crate::video::{ComposedVideo, FfmpegComposer, VideoComposer};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Maximum characters of the subject kept in file names.
const SAFE_NAME_MAX_CHARS: usize = 50;

/// Pipeline stage, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idea,
    Script,
    Speech,
    Media,
    Composition,
    Distribution,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Idea => write!(f, "idea generation"),
            Stage::Script => write!(f, "script writing"),
            Stage::Speech => write!(f, "speech synthesis"),
            Stage::Media => write!(f, "media collection"),
            Stage::Composition => write!(f, "video composition"),
            Stage::Distribution => write!(f, "distribution"),
        }
    }
}

/// What a successful iteration produced.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: usize,
    pub subject: String,
    pub concept: String,
    pub video: ComposedVideo,
    pub distribution: DistributionResult,
}

/// Result of one iteration.
#[derive(Debug, Clone)]
pub enum IterationOutcome {
    Completed(IterationReport),
    Failed {
        iteration: usize,
        stage: Stage,
        reason: String,
    },
}

impl IterationOutcome {
    pub fn iteration(&self) -> usize {
        match self {
            IterationOutcome::Completed(report) => report.iteration,
            IterationOutcome::Failed { iteration, .. } => *iteration,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, IterationOutcome::Completed(_))
    }
}

struct StageFailure {
    stage: Stage,
    error: PosterError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure> {
        self.map_err(|error| StageFailure { stage, error })
    }
}

/// Replace characters unsafe in file names and cap the length.
pub fn safe_name(subject: &str) -> String {
    subject
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(SAFE_NAME_MAX_CHARS)
        .collect()
}

/// Where one run writes its files.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    run_id: String,
}

impl OutputLayout {
    pub fn new(root: PathBuf, run_id: impl Into<String>) -> Self {
        Self {
            root,
            run_id: run_id.into(),
        }
    }

    /// Layout with a fresh timestamped run id.
    pub fn for_new_run(root: PathBuf) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let run_id = format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8]);
        Self::new(root, run_id)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn iteration_dir(&self, iteration: usize) -> PathBuf {
        self.root
            .join("runs")
            .join(&self.run_id)
            .join(format!("iteration_{:03}", iteration))
    }

    pub fn audio_dir(&self, iteration: usize) -> PathBuf {
        self.iteration_dir(iteration).join("audio")
    }

    pub fn images_dir(&self, iteration: usize) -> PathBuf {
        self.iteration_dir(iteration).join("images")
    }

    pub fn video_path(&self, iteration: usize, subject: &str) -> PathBuf {
        self.root.join("videos").join(format!(
            "{}_{:03}_{}.mp4",
            self.run_id,
            iteration,
            safe_name(subject)
        ))
    }
}

/// The six stage implementations an orchestrator drives.
pub struct Stages {
    pub ideas: Arc<dyn IdeaGenerator>,
    pub scripts: Arc<dyn ScriptWriter>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub media: Arc<dyn MediaCollector>,
    pub composer: Arc<dyn VideoComposer>,
    pub distributor: Arc<dyn Distributor>,
}

/// The main orchestrator for the PosterBot pipeline.
pub struct Orchestrator {
    stages: Stages,
    context: Arc<PipelineContext>,
    layout: OutputLayout,
}

impl Orchestrator {
    /// Create an orchestrator with the production stages.
    pub fn new(settings: &Settings) -> Result<Self> {
        let context = Arc::new(PipelineContext::new(settings));

        let stages = Stages {
            ideas: Arc::new(OpenAIIdeaGenerator::new()?),
            scripts: Arc::new(OpenAIScriptWriter::new()?),
            speech: Arc::new(OpenAISynthesizer::new(&settings.speech)?),
            media: Arc::new(StrategyCollector::from_settings(settings, &context)?),
            composer: Arc::new(FfmpegComposer::new(&settings.video)),
            distributor: Arc::new(ChannelDistributor::from_settings(settings)),
        };

        let layout = OutputLayout::for_new_run(settings.output_dir());
        Ok(Self::with_components(stages, context, layout))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(stages: Stages, context: Arc<PipelineContext>, layout: OutputLayout) -> Self {
        Self {
            stages,
            context,
            layout,
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Run `iterations` isolated iterations of the pipeline.
    ///
    /// Always attempts every iteration and releases the context afterwards.
    #[instrument(skip(self, topic), fields(topic = %topic.name, run_id = %self.layout.run_id()))]
    pub async fn run(&self, topic: &TopicConfig, iterations: usize, platform: Platform) -> Vec<IterationOutcome> {
        info!("Starting run: {} iterations, distributing to {}", iterations, platform);
        let mut outcomes = Vec::with_capacity(iterations);

        for iteration in 1..=iterations {
            info!("Iteration {}/{}", iteration, iterations);

            let outcome = match self.run_iteration(topic, iteration, platform).await {
                Ok(report) => {
                    info!(
                        "Iteration {} complete: {} ({})",
                        iteration,
                        report.video.path.display(),
                        report.distribution
                    );
                    IterationOutcome::Completed(report)
                }
                Err(failure) => {
                    error!(
                        "Iteration {} failed during {}: {}",
                        iteration, failure.stage, failure.error
                    );
                    IterationOutcome::Failed {
                        iteration,
                        stage: failure.stage,
                        reason: failure.error.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        self.context.shutdown().await;

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!("Run complete: {}/{} videos created", succeeded, iterations);
        outcomes
    }

    async fn run_iteration(
        &self,
        topic: &TopicConfig,
        iteration: usize,
        platform: Platform,
    ) -> std::result::Result<IterationReport, StageFailure> {
        let concept = self.stages.ideas.generate_idea(topic).await.at(Stage::Idea)?;
        info!("Subject: {}", concept.subject);
        info!("Concept: {}", concept.hook);

        let script = self
            .stages
            .scripts
            .write_script(&concept, topic)
            .await
            .at(Stage::Script)?;
        info!("Script has {} words", script.word_count());

        let audio = self
            .stages
            .speech
            .generate_audio(&script, &self.layout.audio_dir(iteration))
            .await
            .at(Stage::Speech)?;

        let images_dir = self.layout.images_dir(iteration);
        let request = MediaRequest {
            subject: &concept.subject,
            script: &script,
            count: audio.segments.len(),
            topic,
            output_dir: &images_dir,
        };
        let assets = self.stages.media.collect_media(&request).await.at(Stage::Media)?;

        let video_path = self.layout.video_path(iteration, &concept.subject);
        let video = self
            .stages
            .composer
            .create_video(&assets, &audio, &video_path)
            .await
            .at(Stage::Composition)?;

        let metadata = VideoMetadata {
            subject: concept.subject.clone(),
            concept: concept.hook.clone(),
            caption: topic.caption(&concept.subject, &concept.hook),
        };
        let distribution = self.distribute(&video, platform, &metadata).await;

        Ok(IterationReport {
            iteration,
            subject: concept.subject,
            concept: concept.hook,
            video,
            distribution,
        })
    }

    /// Distribution failures leave the composed video in place.
    async fn distribute(
        &self,
        video: &ComposedVideo,
        platform: Platform,
        metadata: &VideoMetadata,
    ) -> DistributionResult {
        match self.stages.distributor.distribute(video, platform, metadata).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{} failed, video kept at {}: {}", Stage::Distribution, video.path.display(), e);
                DistributionResult::failed(platform, &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiffusionSettings, ImageStrategy};
    use crate::distribution::DeliveryStatus;
    use crate::generation::{Concept, Script};
    use crate::media::{ImageModelRuntime, MediaAsset};
    use crate::speech::{SynthesizedAudio, TimedSegment, Voice};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubIdeas;

    #[async_trait]
    impl IdeaGenerator for StubIdeas {
        async fn generate_idea(&self, _topic: &TopicConfig) -> Result<Concept> {
            Ok(Concept {
                subject: "1991 Honda NSX (NA1)".to_string(),
                hook: "Senna tuned the chassis.".to_string(),
            })
        }
    }

    /// Fails on the listed call numbers (1-based).
    struct StubScripts {
        calls: AtomicUsize,
        fail_on: Vec<usize>,
    }

    #[async_trait]
    impl ScriptWriter for StubScripts {
        async fn write_script(&self, _concept: &Concept, _topic: &TopicConfig) -> Result<Script> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                return Err(PosterError::Service("rate limited".to_string()));
            }
            Ok(Script::new("It weighed almost nothing. It cornered like a go-kart."))
        }
    }

    struct StubSpeech;

    #[async_trait]
    impl SpeechSynthesizer for StubSpeech {
        async fn generate_audio(&self, script: &Script, output_dir: &Path) -> Result<SynthesizedAudio> {
            let segments = crate::speech::split_sentences(&script.text)
                .into_iter()
                .enumerate()
                .map(|(i, text)| TimedSegment {
                    text,
                    duration: 1.5,
                    audio_path: output_dir.join(format!("audio_{}.mp3", i)),
                })
                .collect();
            Ok(SynthesizedAudio {
                segments,
                combined_path: output_dir.join("combined.wav"),
                voice: Voice::Nova,
            })
        }
    }

    struct StubMedia {
        images: usize,
    }

    #[async_trait]
    impl MediaCollector for StubMedia {
        async fn collect_media(&self, request: &MediaRequest<'_>) -> Result<Vec<MediaAsset>> {
            if self.images == 0 {
                return Err(PosterError::MediaCollection("nothing found".to_string()));
            }
            Ok((0..self.images)
                .map(|i| MediaAsset {
                    path: request.output_dir.join(format!("image_{}.jpg", i)),
                    strategy: ImageStrategy::StockPhotos,
                    origin: String::new(),
                })
                .collect())
        }
    }

    struct StubComposer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VideoComposer for StubComposer {
        async fn create_video(
            &self,
            assets: &[MediaAsset],
            audio: &SynthesizedAudio,
            output_path: &Path,
        ) -> Result<ComposedVideo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let plan = crate::video::CompositionPlan::new(assets, &audio.durations())?;
            Ok(ComposedVideo {
                path: output_path.to_path_buf(),
                segments: plan.len(),
                duration: plan.total_duration(),
            })
        }
    }

    struct StubDistributor {
        fail: bool,
    }

    #[async_trait]
    impl Distributor for StubDistributor {
        async fn distribute(
            &self,
            _video: &ComposedVideo,
            platform: Platform,
            _metadata: &VideoMetadata,
        ) -> Result<DistributionResult> {
            if self.fail {
                return Err(PosterError::Distribution("SMTP auth rejected".to_string()));
            }
            Ok(DistributionResult {
                platform,
                status: DeliveryStatus::Delivered { id: None },
            })
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        composer: Arc<StubComposer>,
        runtime: Arc<ImageModelRuntime>,
        _dir: tempfile::TempDir,
    }

    fn harness(fail_scripts_on: Vec<usize>, images: usize, distribution_fails: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let composer = Arc::new(StubComposer { calls: AtomicUsize::new(0) });
        let runtime = Arc::new(ImageModelRuntime::new(
            DiffusionSettings::default(),
            dir.path().join("models"),
        ));

        let stages = Stages {
            ideas: Arc::new(StubIdeas),
            scripts: Arc::new(StubScripts {
                calls: AtomicUsize::new(0),
                fail_on: fail_scripts_on,
            }),
            speech: Arc::new(StubSpeech),
            media: Arc::new(StubMedia { images }),
            composer: composer.clone(),
            distributor: Arc::new(StubDistributor { fail: distribution_fails }),
        };

        let orchestrator = Orchestrator::with_components(
            stages,
            Arc::new(PipelineContext::with_image_model(runtime.clone())),
            OutputLayout::new(dir.path().to_path_buf(), "test_run"),
        );

        Harness {
            orchestrator,
            composer,
            runtime,
            _dir: dir,
        }
    }

    fn topic() -> TopicConfig {
        TopicConfig::load("cars", Path::new("/nonexistent")).unwrap()
    }

    #[tokio::test]
    async fn test_failed_iteration_does_not_stop_batch() {
        let h = harness(vec![2], 10, false);
        let outcomes = h.orchestrator.run(&topic(), 3, Platform::Email).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert!(outcomes[2].is_success());
        let failures: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();
        assert_eq!(failures.len(), 1);
        match failures[0] {
            IterationOutcome::Failed { iteration, stage, reason } => {
                assert_eq!(*iteration, 2);
                assert_eq!(*stage, Stage::Script);
                assert!(reason.contains("rate limited"));
            }
            IterationOutcome::Completed(_) => unreachable!(),
        }
        assert_eq!(h.composer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_extra_images_truncated_to_segments() {
        let h = harness(vec![], 10, false);
        let outcomes = h.orchestrator.run(&topic(), 1, Platform::Email).await;

        let IterationOutcome::Completed(report) = &outcomes[0] else {
            panic!("iteration failed: {:?}", outcomes[0]);
        };
        assert_eq!(report.video.segments, 2);
        assert!((report.video.duration - 3.0).abs() < 1e-9);
        assert_eq!(
            report.video.path,
            h.orchestrator.layout().video_path(1, "1991 Honda NSX (NA1)")
        );
    }

    #[tokio::test]
    async fn test_no_images_never_reaches_composition() {
        let h = harness(vec![], 0, false);
        let outcomes = h.orchestrator.run(&topic(), 2, Platform::Email).await;

        assert!(outcomes.iter().all(|o| matches!(
            o,
            IterationOutcome::Failed { stage: Stage::Media, .. }
        )));
        assert_eq!(h.composer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_distribution_failure_keeps_iteration_successful() {
        let h = harness(vec![], 3, true);
        let outcomes = h.orchestrator.run(&topic(), 1, Platform::Email).await;

        let IterationOutcome::Completed(report) = &outcomes[0] else {
            panic!("iteration failed: {:?}", outcomes[0]);
        };
        assert!(!report.distribution.is_success());
        assert_eq!(report.distribution.platform, Platform::Email);
    }

    #[tokio::test]
    async fn test_run_shuts_down_context() {
        let h = harness(vec![], 3, false);
        let weights = h.runtime.weights_path(crate::media::DiffusionVariant::Schnell).unwrap();
        std::fs::create_dir_all(weights.parent().unwrap()).unwrap();
        std::fs::write(&weights, b"w").unwrap();
        h.runtime
            .ensure_loaded(crate::media::DiffusionVariant::Schnell)
            .await
            .unwrap();

        h.orchestrator.run(&topic(), 1, Platform::None).await;
        assert!(!h.runtime.is_loaded().await);
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("1994-2001 Acura Integra (DC2)"), "1994-2001 Acura Integra _DC2_");
        assert_eq!(safe_name(&"x".repeat(80)).len(), 50);
    }

    #[test]
    fn test_layout_paths() {
        let layout = OutputLayout::new(PathBuf::from("/out"), "run1");
        assert_eq!(
            layout.audio_dir(7),
            PathBuf::from("/out/runs/run1/iteration_007/audio")
        );
        assert_eq!(
            layout.video_path(2, "Mazda: Miata"),
            PathBuf::from("/out/videos/run1_002_Mazda_ Miata.mp4")
        );
    }
}
