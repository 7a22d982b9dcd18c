//! PosterBot - Topic-driven short video generator
//!
//! Turns a declarative topic configuration into narrated slideshow videos and
//! hands each one to a distribution channel.
//!
//! # Overview
//!
//! Every iteration of a run goes through the same stages:
//! - pick a subject and hook with a language model
//! - write a narration script for it
//! - synthesize one audio segment per sentence
//! - collect one image per segment (local diffusion, stock photos or web search)
//! - mux images and narration into a video
//! - send the video by email or to TikTok
//!
//! # Architecture
//!
//! - `config` - Application settings and topic configurations
//! - `generation` - Idea and script generation
//! - `speech` - Sentence splitting and text-to-speech
//! - `media` - Image collection strategies with fallback
//! - `video` - Video composition
//! - `distribution` - Delivery channels
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use posterbot::config::{Platform, Settings, TopicConfig};
//! use posterbot::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let topic = TopicConfig::load("cars", &settings.topics_dir())?;
//!     let orchestrator = Orchestrator::new(&settings)?;
//!
//!     for outcome in orchestrator.run(&topic, 2, Platform::None).await {
//!         println!("iteration {}: {}", outcome.iteration(), outcome.is_success());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod distribution;
pub mod error;
pub mod ffmpeg;
pub mod generation;
pub mod media;
pub mod openai;
pub mod orchestrator;
pub mod speech;
pub mod video;

pub use error::{PosterError, Result};
