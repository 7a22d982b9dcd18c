//! Run command - generate and distribute videos for a topic.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{ImageStrategy, Platform, Settings, TopicConfig};
use crate::orchestrator::Orchestrator;
use anyhow::{bail, Result};
use tracing::info;

/// Pick the channel: `--no-distribute` wins, then `--distribute-to`, then the topic default.
fn resolve_platform(topic: &TopicConfig, requested: Option<Platform>, no_distribute: bool) -> Platform {
    if no_distribute {
        return Platform::None;
    }
    requested.unwrap_or(topic.distribution.default_platform)
}

/// Run the pipeline `count` times for a topic.
///
/// Configuration problems abort before the first iteration. Once iterations
/// start, failures are reported in the summary and the command still succeeds.
pub async fn run_pipeline(
    topic_name: &str,
    count: usize,
    distribute_to: Option<Platform>,
    no_distribute: bool,
    strategy: Option<ImageStrategy>,
    settings: Settings,
) -> Result<()> {
    if count == 0 {
        bail!("--count must be at least 1");
    }

    let mut topic = TopicConfig::load(topic_name, &settings.topics_dir())?;
    if let Some(strategy) = strategy {
        topic.image.strategy = Some(strategy);
    }
    let platform = resolve_platform(&topic, distribute_to, no_distribute);

    preflight::check(Operation::Run { platform }, &settings)?;

    Output::header(&format!("PosterBot: {}", topic.name));
    Output::kv("Topic source", &topic.source);
    Output::kv(
        "Image strategy",
        &topic.image_strategy(settings.media.default_strategy).to_string(),
    );
    Output::kv("Distribution", &platform.to_string());
    Output::kv("Videos", &count.to_string());
    println!();

    let orchestrator = Orchestrator::new(&settings)?;
    info!("Run id {}", orchestrator.layout().run_id());

    let outcomes = orchestrator.run(&topic, count, platform).await;
    Output::run_summary(&outcomes);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn cars() -> TopicConfig {
        TopicConfig::load("cars", Path::new("/nonexistent")).unwrap()
    }

    #[test]
    fn test_no_distribute_overrides_everything() {
        let topic = cars();
        assert_eq!(resolve_platform(&topic, Some(Platform::TikTok), true), Platform::None);
        assert_eq!(resolve_platform(&topic, None, true), Platform::None);
    }

    #[test]
    fn test_cli_platform_overrides_topic_default() {
        let topic = cars();
        assert_eq!(resolve_platform(&topic, Some(Platform::TikTok), false), Platform::TikTok);
        assert_eq!(
            resolve_platform(&topic, None, false),
            topic.distribution.default_platform
        );
    }

    #[tokio::test]
    async fn test_zero_count_rejected() {
        let result = run_pipeline("cars", 0, None, true, None, Settings::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_topic_fails_before_any_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.general.topics_dir = dir.path().display().to_string();

        let err = run_pipeline("no_such_topic", 1, None, true, None, settings)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
