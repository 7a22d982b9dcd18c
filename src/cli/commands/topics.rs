//! Topics and validate commands.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{available_topics, builtin_topics, Settings, TopicConfig};
use anyhow::Result;

/// List the bundled topics and any found in the topics directory.
pub fn run_topics(settings: &Settings) -> Result<()> {
    let topics_dir = settings.topics_dir();
    let names = available_topics(&topics_dir);

    Output::header("Available Topics");
    for name in &names {
        let on_disk = topics_dir.join(format!("{}.toml", name)).is_file();
        let bundled = builtin_topics().iter().any(|(n, _)| n == name);
        let origin = match (on_disk, bundled) {
            (true, true) => "file, overrides built-in",
            (true, false) => "file",
            _ => "built-in",
        };
        Output::list_item(&format!("{} ({})", name, origin));
    }

    println!();
    Output::info(&format!("Topics directory: {}", topics_dir.display()));
    Ok(())
}

/// Load and validate a topic, then print what it configures.
pub fn run_validate(topic_name: &str, settings: &Settings) -> Result<()> {
    preflight::check(Operation::Validate, settings)?;
    let topic = TopicConfig::load(topic_name, &settings.topics_dir())?;

    Output::header(&format!("Topic: {}", topic.name));
    if !topic.description.is_empty() {
        Output::kv("Description", &topic.description);
    }
    Output::kv("Source", &topic.source);
    let strategy = match topic.image.strategy {
        Some(strategy) => strategy.to_string(),
        None => format!("{} (default)", settings.media.default_strategy),
    };
    Output::kv("Image strategy", &strategy);
    Output::kv("Prompt mode", topic.image.plan.mode_name());
    Output::kv("Shot templates", &topic.shot_count().to_string());
    Output::kv("Idea model", &topic.idea.model);
    Output::kv("Story model", &topic.story.model);
    Output::kv("Default platform", &topic.distribution.default_platform.to_string());

    println!();
    Output::success("Topic configuration is valid.");
    Ok(())
}
