//! Configuration module for PosterBot.
//!
//! Handles application settings, topic configurations and prompt construction.

pub mod prompts;
mod settings;
mod topic;

pub use settings::{
    DiffusionSettings, EmailSettings, GeneralSettings, ImageStrategy, MediaSettings, Platform,
    Settings, SpeechSettings, TikTokSettings, VideoSettings,
};
pub use topic::{
    available_topics, builtin_topics, DistributionDefaults, IdeaSection, ImagePlan, ImageSection,
    ScriptStructure, ShotTemplate, StorySection, TopicConfig,
};
