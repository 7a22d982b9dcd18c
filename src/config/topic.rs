//! Topic configurations.
//!
//! A topic bundles the prompt text, model parameters and image strategy for one
//! content type. Topics are TOML documents; a handful ship with the binary and
//! any file in the topics directory overrides or extends them.
//!
//! Loading validates everything up front so a pipeline never starts with a
//! half-usable topic.

use super::settings::{ImageStrategy, Platform};
use crate::error::{PosterError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Topics compiled into the binary.
const BUILTIN_TOPICS: &[(&str, &str)] = &[
    ("cars", include_str!("../../topics/cars.toml")),
    ("alien_stories", include_str!("../../topics/alien_stories.toml")),
];

const DEFAULT_BASE_STYLE: &str = "photorealistic, high quality";
const DEFAULT_CAPTION: &str = "Check out this video!";

/// A validated topic configuration.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    pub name: String,
    pub description: String,
    /// Where the topic was loaded from (file path or `builtin:<name>`).
    pub source: String,
    pub idea: IdeaSection,
    pub story: StorySection,
    pub image: ImageSection,
    pub distribution: DistributionDefaults,
}

/// Prompt and model parameters for idea generation.
#[derive(Debug, Clone)]
pub struct IdeaSection {
    pub role: String,
    pub task: String,
    pub output_characteristics: Option<String>,
    /// Worked examples, already rendered to text.
    pub examples: Vec<String>,
    pub model: String,
    pub temperature: f32,
    /// JSON key the model emits the subject under.
    pub subject_key: String,
    /// JSON key the model emits the hook/concept under.
    pub concept_key: String,
}

/// Script structure, either a list of beats or free text.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScriptStructure {
    Steps(Vec<String>),
    Text(String),
}

/// Prompt and model parameters for script writing.
#[derive(Debug, Clone)]
pub struct StorySection {
    pub role: String,
    pub structure: Option<ScriptStructure>,
    pub instructions: Option<String>,
    pub output_characteristics: Option<String>,
    pub tone: Option<String>,
    /// Word ceiling communicated to the model; not enforced on the response.
    pub max_words: Option<u32>,
    pub examples: Vec<String>,
    pub model: String,
    pub temperature: f32,
    pub duration_seconds: u32,
}

/// One shot template with a `{subject}` placeholder.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ShotTemplate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub template: String,
}

/// How image prompts are produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePlan {
    /// Render every shot template in order.
    Templated { shots: Vec<ShotTemplate> },
    /// Let a language model derive prompts from the script; fall back to the shots.
    AiGenerated {
        instructions: String,
        fallback: Vec<ShotTemplate>,
    },
}

impl ImagePlan {
    pub fn mode_name(&self) -> &'static str {
        match self {
            ImagePlan::Templated { .. } => "templated",
            ImagePlan::AiGenerated { .. } => "ai_generated",
        }
    }

    /// Shot templates available to this plan (fallback list in AI mode).
    pub fn shots(&self) -> &[ShotTemplate] {
        match self {
            ImagePlan::Templated { shots } => shots,
            ImagePlan::AiGenerated { fallback, .. } => fallback,
        }
    }
}

/// Image generation block.
#[derive(Debug, Clone)]
pub struct ImageSection {
    /// Topic-level strategy; `None` means use the global default.
    pub strategy: Option<ImageStrategy>,
    pub base_style: String,
    pub plan: ImagePlan,
    /// Domain keyword appended to stock and web search queries.
    pub search_keyword: Option<String>,
}

/// Distribution defaults for a topic.
#[derive(Debug, Clone)]
pub struct DistributionDefaults {
    pub default_platform: Platform,
    /// Caption template with `{subject}` and `{concept}` placeholders.
    pub caption_template: String,
}

// ============================================================================
// Raw (unvalidated) document
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawTopic {
    name: Option<String>,
    description: Option<String>,
    content_idea: Option<RawIdea>,
    story_writer: Option<RawStory>,
    image_generation: Option<RawImage>,
    distribution: Option<RawDistribution>,
}

#[derive(Debug, Deserialize)]
struct RawIdea {
    role: Option<String>,
    task: Option<String>,
    output_characteristics: Option<String>,
    #[serde(default)]
    examples: Vec<toml::Value>,
    model: Option<String>,
    temperature: Option<f32>,
    subject_key: Option<String>,
    concept_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStory {
    role: Option<String>,
    structure: Option<ScriptStructure>,
    instructions: Option<String>,
    output_characteristics: Option<String>,
    tone: Option<String>,
    max_words: Option<u32>,
    #[serde(default)]
    examples: Vec<toml::Value>,
    model: Option<String>,
    temperature: Option<f32>,
    duration_seconds: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawImage {
    mode: Option<String>,
    strategy: Option<String>,
    base_style: Option<String>,
    ai_prompt_instructions: Option<String>,
    #[serde(default)]
    shot_templates: Vec<ShotTemplate>,
    search_keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDistribution {
    default_platform: Option<String>,
    caption_template: Option<String>,
}

fn config_err(source: &str, msg: impl std::fmt::Display) -> PosterError {
    PosterError::Config(format!("{} (in {})", msg, source))
}

fn required(value: Option<String>, section: &str, field: &str, source: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(config_err(
            source,
            format!("{} section must have a non-empty '{}'", section, field),
        )),
    }
}

fn render_examples(examples: Vec<toml::Value>) -> Vec<String> {
    examples
        .into_iter()
        .map(|example| match example {
            toml::Value::String(s) => s,
            other => serde_json::to_string(&other).unwrap_or_else(|_| other.to_string()),
        })
        .collect()
}

fn check_temperature(value: f32, section: &str, source: &str) -> Result<f32> {
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(config_err(
            source,
            format!("{}.temperature must be between 0.0 and 2.0, got {}", section, value),
        ))
    }
}

fn check_shots(shots: &[ShotTemplate], source: &str) -> Result<()> {
    for (i, shot) in shots.iter().enumerate() {
        if shot.template.trim().is_empty() {
            return Err(config_err(
                source,
                format!("shot_templates[{}] has an empty 'template'", i),
            ));
        }
    }
    Ok(())
}

impl TopicConfig {
    /// Load a topic by name or path.
    ///
    /// Resolution order: an existing file path, `<topics_dir>/<name>.toml`,
    /// `<topics_dir>/<name>`, then the built-in topics.
    pub fn load(name_or_path: &str, topics_dir: &Path) -> Result<Self> {
        let direct = PathBuf::from(name_or_path);
        let candidates = [
            direct.clone(),
            topics_dir.join(format!("{}.toml", name_or_path)),
            topics_dir.join(name_or_path),
        ];

        for candidate in candidates.iter() {
            if candidate.is_file() {
                return Self::from_file(candidate);
            }
        }

        if let Some((name, content)) = BUILTIN_TOPICS.iter().find(|(n, _)| *n == name_or_path) {
            return Self::from_toml_str(content, &format!("builtin:{}", name));
        }

        Err(PosterError::Config(format!(
            "Topic configuration not found: {} (looked in {} and built-ins: {})",
            name_or_path,
            topics_dir.display(),
            BUILTIN_TOPICS
                .iter()
                .map(|(n, _)| *n)
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Load and validate a topic file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse and validate a topic document.
    pub fn from_toml_str(content: &str, source: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Err(config_err(source, "empty topic configuration"));
        }

        let raw: RawTopic =
            toml::from_str(content).map_err(|e| config_err(source, format!("invalid TOML: {}", e)))?;

        Self::validate(raw, source)
    }

    fn validate(raw: RawTopic, source: &str) -> Result<Self> {
        let missing = |section: &str| {
            config_err(source, format!("Missing required section '{}'", section))
        };

        let idea_raw = raw.content_idea.ok_or_else(|| missing("content_idea"))?;
        let story_raw = raw.story_writer.ok_or_else(|| missing("story_writer"))?;
        let image_raw = raw.image_generation.ok_or_else(|| missing("image_generation"))?;

        let subject_key = idea_raw.subject_key.unwrap_or_else(|| "subject".to_string());
        if subject_key.trim().is_empty() {
            return Err(config_err(source, "content_idea.subject_key must not be empty"));
        }

        let idea = IdeaSection {
            role: required(idea_raw.role, "content_idea", "role", source)?,
            task: required(idea_raw.task, "content_idea", "task", source)?,
            output_characteristics: idea_raw.output_characteristics,
            examples: render_examples(idea_raw.examples),
            model: idea_raw.model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            temperature: check_temperature(
                idea_raw.temperature.unwrap_or(2.0),
                "content_idea",
                source,
            )?,
            subject_key,
            concept_key: idea_raw.concept_key.unwrap_or_else(|| "concept".to_string()),
        };

        let story = StorySection {
            role: required(story_raw.role, "story_writer", "role", source)?,
            structure: story_raw.structure,
            instructions: story_raw.instructions,
            output_characteristics: story_raw.output_characteristics,
            tone: story_raw.tone,
            max_words: story_raw.max_words,
            examples: render_examples(story_raw.examples),
            model: story_raw.model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            temperature: check_temperature(
                story_raw.temperature.unwrap_or(1.9),
                "story_writer",
                source,
            )?,
            duration_seconds: story_raw.duration_seconds.unwrap_or(60),
        };

        check_shots(&image_raw.shot_templates, source)?;
        let mode = image_raw.mode.unwrap_or_else(|| "templated".to_string());
        let plan = match mode.as_str() {
            "templated" => {
                if image_raw.shot_templates.is_empty() {
                    return Err(config_err(
                        source,
                        "image_generation in 'templated' mode needs a non-empty 'shot_templates' list",
                    ));
                }
                ImagePlan::Templated {
                    shots: image_raw.shot_templates,
                }
            }
            "ai_generated" => {
                let instructions = image_raw
                    .ai_prompt_instructions
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| {
                        config_err(
                            source,
                            "image_generation in 'ai_generated' mode needs 'ai_prompt_instructions'",
                        )
                    })?;
                if image_raw.shot_templates.is_empty() {
                    return Err(config_err(
                        source,
                        "image_generation in 'ai_generated' mode needs fallback 'shot_templates'",
                    ));
                }
                ImagePlan::AiGenerated {
                    instructions,
                    fallback: image_raw.shot_templates,
                }
            }
            other => {
                return Err(config_err(
                    source,
                    format!("Unknown image_generation.mode '{}'", other),
                ))
            }
        };

        let strategy = image_raw
            .strategy
            .map(|s| s.parse::<ImageStrategy>())
            .transpose()
            .map_err(|e| config_err(source, e))?;

        let image = ImageSection {
            strategy,
            base_style: image_raw
                .base_style
                .unwrap_or_else(|| DEFAULT_BASE_STYLE.to_string()),
            plan,
            search_keyword: image_raw.search_keyword.filter(|s| !s.trim().is_empty()),
        };

        let distribution = match raw.distribution {
            Some(d) => DistributionDefaults {
                default_platform: d
                    .default_platform
                    .map(|p| p.parse::<Platform>())
                    .transpose()
                    .map_err(|e| config_err(source, e))?
                    .unwrap_or_default(),
                caption_template: d
                    .caption_template
                    .unwrap_or_else(|| DEFAULT_CAPTION.to_string()),
            },
            None => DistributionDefaults {
                default_platform: Platform::default(),
                caption_template: DEFAULT_CAPTION.to_string(),
            },
        };

        Ok(Self {
            name: raw.name.unwrap_or_else(|| "unknown".to_string()),
            description: raw.description.unwrap_or_default(),
            source: source.to_string(),
            idea,
            story,
            image,
            distribution,
        })
    }

    /// Strategy for this topic, falling back to the global default.
    pub fn image_strategy(&self, default: ImageStrategy) -> ImageStrategy {
        self.image.strategy.unwrap_or(default)
    }

    /// Number of shot templates declared by the topic.
    pub fn shot_count(&self) -> usize {
        self.image.plan.shots().len()
    }

    /// Render the distribution caption for a concept.
    pub fn caption(&self, subject: &str, concept: &str) -> String {
        self.distribution
            .caption_template
            .replace("{subject}", subject)
            .replace("{concept}", concept)
    }
}

/// Names of all topics available from the topics directory and the built-ins.
pub fn available_topics(topics_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = BUILTIN_TOPICS.iter().map(|(n, _)| n.to_string()).collect();

    if let Ok(entries) = std::fs::read_dir(topics_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
    }

    names.sort();
    names.dedup();
    names
}

/// Built-in topic documents, for `init` to write out.
pub fn builtin_topics() -> &'static [(&'static str, &'static str)] {
    BUILTIN_TOPICS
}
