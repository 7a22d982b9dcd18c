//! Image collection with a strategy fallback chain.
//!
//! A topic picks a primary [`ImageStrategy`]; the collector walks that
//! strategy's fallback chain and returns the first non-empty result. Each
//! source fits its images to the output resolution before returning them.

mod diffusion;
mod prompts;
mod query;
mod stock;
mod web;

pub use diffusion::{DiffusionSource, DiffusionVariant, ImageModelRuntime};
pub use prompts::{plan_image_prompts, render_shot, templated_prompts, OpenAIScenePrompter, ScenePrompter};
pub use query::{keyword_query, query_variants, simplify_query};
pub use stock::StockPhotoSource;
pub use web::WebSearchSource;

use crate::config::{ImageStrategy, Settings, TopicConfig};
use crate::context::PipelineContext;
use crate::error::{PosterError, Result};
use crate::ffmpeg::{self, Resolution};
use crate::generation::Script;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One image ready for composition.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub path: PathBuf,
    /// Strategy that produced the image.
    pub strategy: ImageStrategy,
    /// Prompt, query or URL the image came from.
    pub origin: String,
}

/// Everything a source needs to obtain images for one iteration.
#[derive(Debug, Clone, Copy)]
pub struct MediaRequest<'a> {
    pub subject: &'a str,
    pub script: &'a Script,
    /// Number of narrated segments to cover.
    pub count: usize,
    pub topic: &'a TopicConfig,
    pub output_dir: &'a Path,
}

/// A single way of obtaining images.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Collect images into `request.output_dir`.
    ///
    /// May return fewer than `request.count` images.
    async fn collect(&self, request: &MediaRequest<'_>) -> Result<Vec<MediaAsset>>;
}

/// Stage contract: obtain the images for one iteration.
#[async_trait]
pub trait MediaCollector: Send + Sync {
    async fn collect_media(&self, request: &MediaRequest<'_>) -> Result<Vec<MediaAsset>>;
}

/// Collector dispatching over registered sources by strategy.
pub struct StrategyCollector {
    default_strategy: ImageStrategy,
    sources: HashMap<ImageStrategy, Arc<dyn ImageSource>>,
}

impl StrategyCollector {
    /// Collector with no sources registered.
    pub fn new(default_strategy: ImageStrategy) -> Self {
        Self {
            default_strategy,
            sources: HashMap::new(),
        }
    }

    /// Register the source for a strategy.
    pub fn with_source(mut self, strategy: ImageStrategy, source: Arc<dyn ImageSource>) -> Self {
        self.sources.insert(strategy, source);
        self
    }

    /// Build the production collector.
    ///
    /// Stock photos are only registered when an API key is configured, so a
    /// missing key moves the chain straight to web search.
    pub fn from_settings(settings: &Settings, context: &PipelineContext) -> Result<Self> {
        let resolution = Resolution::new(settings.video.width, settings.video.height);
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let mut collector = Self::new(settings.media.default_strategy).with_source(
            ImageStrategy::WebSearch,
            Arc::new(WebSearchSource::new(http.clone(), &settings.media, resolution)),
        );

        match &settings.media.pexels_api_key {
            Some(key) if !key.is_empty() => {
                collector = collector.with_source(
                    ImageStrategy::StockPhotos,
                    Arc::new(StockPhotoSource::new(http, key.clone(), resolution)),
                );
            }
            _ => debug!("No Pexels API key, stock photos disabled"),
        }

        let prompter: Arc<dyn ScenePrompter> = Arc::new(OpenAIScenePrompter::new()?);
        for variant in [DiffusionVariant::Schnell, DiffusionVariant::Dev] {
            collector = collector.with_source(
                variant.strategy(),
                Arc::new(DiffusionSource::new(
                    variant,
                    context.image_model(),
                    prompter.clone(),
                    resolution,
                )),
            );
        }

        Ok(collector)
    }
}

#[async_trait]
impl MediaCollector for StrategyCollector {
    #[instrument(skip(self, request), fields(subject = %request.subject, count = request.count))]
    async fn collect_media(&self, request: &MediaRequest<'_>) -> Result<Vec<MediaAsset>> {
        tokio::fs::create_dir_all(request.output_dir).await?;

        let chain = request.topic.image_strategy(self.default_strategy).fallback_chain();
        for strategy in &chain {
            let Some(source) = self.sources.get(strategy) else {
                debug!("No source registered for {}, skipping", strategy);
                continue;
            };

            match source.collect(request).await {
                Ok(assets) if !assets.is_empty() => {
                    info!("Collected {} images via {}", assets.len(), strategy);
                    return Ok(assets);
                }
                Ok(_) => warn!("{} returned no images", strategy),
                Err(e) => warn!("{} failed: {}", strategy, e),
            }
        }

        let tried: Vec<String> = chain.iter().map(|s| s.to_string()).collect();
        Err(PosterError::MediaCollection(format!(
            "No images collected for '{}' (tried {})",
            request.subject,
            tried.join(", ")
        )))
    }
}

/// Download an image and fit it to the output resolution as `image_<index>.jpg`.
pub(crate) async fn download_and_fit(
    http: &reqwest::Client,
    url: &str,
    output_dir: &Path,
    index: usize,
    resolution: Resolution,
) -> Result<PathBuf> {
    let response = http
        .get(url)
        .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
        .send()
        .await?
        .error_for_status()?;
    let bytes = response.bytes().await?;

    let raw_path = output_dir.join(format!("download_{}", index));
    tokio::fs::write(&raw_path, &bytes).await?;

    let dest = output_dir.join(format!("image_{}.jpg", index));
    let fitted = ffmpeg::fit_image(&raw_path, &dest, resolution).await;
    let _ = tokio::fs::remove_file(&raw_path).await;
    fitted?;

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageSource for FailingSource {
        async fn collect(&self, _request: &MediaRequest<'_>) -> Result<Vec<MediaAsset>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PosterError::Service("quota exceeded".to_string()))
        }
    }

    struct FixedSource {
        strategy: ImageStrategy,
        images: usize,
    }

    #[async_trait]
    impl ImageSource for FixedSource {
        async fn collect(&self, request: &MediaRequest<'_>) -> Result<Vec<MediaAsset>> {
            Ok((0..self.images)
                .map(|i| MediaAsset {
                    path: request.output_dir.join(format!("image_{}.jpg", i)),
                    strategy: self.strategy,
                    origin: request.subject.to_string(),
                })
                .collect())
        }
    }

    fn topic() -> TopicConfig {
        TopicConfig::load("cars", Path::new("/nonexistent")).unwrap()
    }

    #[tokio::test]
    async fn test_fallback_source_used_when_primary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let topic = topic();
        let script = Script::new("One. Two.");
        let primary = Arc::new(FailingSource { calls: AtomicUsize::new(0) });

        let collector = StrategyCollector::new(ImageStrategy::StockPhotos)
            .with_source(ImageStrategy::StockPhotos, primary.clone())
            .with_source(
                ImageStrategy::WebSearch,
                Arc::new(FixedSource { strategy: ImageStrategy::WebSearch, images: 2 }),
            );

        let request = MediaRequest {
            subject: "Honda NSX",
            script: &script,
            count: 2,
            topic: &topic,
            output_dir: dir.path(),
        };
        let assets = collector.collect_media(&request).await.unwrap();

        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(assets.len(), 2);
        assert!(assets.iter().all(|a| a.strategy == ImageStrategy::WebSearch));
    }

    #[tokio::test]
    async fn test_no_images_is_collection_error() {
        let dir = tempfile::tempdir().unwrap();
        let topic = topic();
        let script = Script::new("One.");

        let collector = StrategyCollector::new(ImageStrategy::StockPhotos)
            .with_source(
                ImageStrategy::StockPhotos,
                Arc::new(FixedSource { strategy: ImageStrategy::StockPhotos, images: 0 }),
            )
            .with_source(
                ImageStrategy::WebSearch,
                Arc::new(FailingSource { calls: AtomicUsize::new(0) }),
            );

        let request = MediaRequest {
            subject: "Honda NSX",
            script: &script,
            count: 1,
            topic: &topic,
            output_dir: dir.path(),
        };
        let err = collector.collect_media(&request).await.unwrap_err();
        assert!(matches!(err, PosterError::MediaCollection(_)));
    }

    #[tokio::test]
    async fn test_unregistered_strategies_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut topic = topic();
        topic.image.strategy = Some(ImageStrategy::FluxDev);
        let script = Script::new("One.");

        let collector = StrategyCollector::new(ImageStrategy::StockPhotos).with_source(
            ImageStrategy::WebSearch,
            Arc::new(FixedSource { strategy: ImageStrategy::WebSearch, images: 3 }),
        );

        let request = MediaRequest {
            subject: "Honda NSX",
            script: &script,
            count: 1,
            topic: &topic,
            output_dir: dir.path(),
        };
        let assets = collector.collect_media(&request).await.unwrap();
        assert_eq!(assets.len(), 3);
    }
}
