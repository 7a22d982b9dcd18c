//! Local diffusion model image generation.
//!
//! Weights are fetched on first use and the loaded model is held by
//! [`ImageModelRuntime`], which lives in the process-wide pipeline context
//! and is reused across iterations until released.

use super::{plan_image_prompts, ImageSource, MediaAsset, MediaRequest, ScenePrompter};
use crate::config::{DiffusionSettings, ImageStrategy};
use crate::error::{PosterError, Result};
use crate::ffmpeg::{self, Resolution};
use async_trait::async_trait;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Speed/quality variant of the local model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffusionVariant {
    /// Few steps, fast.
    Schnell,
    /// Many steps, higher quality.
    Dev,
}

impl DiffusionVariant {
    pub fn strategy(self) -> ImageStrategy {
        match self {
            DiffusionVariant::Schnell => ImageStrategy::FluxSchnell,
            DiffusionVariant::Dev => ImageStrategy::FluxDev,
        }
    }

    pub fn from_strategy(strategy: ImageStrategy) -> Option<Self> {
        match strategy {
            ImageStrategy::FluxSchnell => Some(DiffusionVariant::Schnell),
            ImageStrategy::FluxDev => Some(DiffusionVariant::Dev),
            ImageStrategy::StockPhotos | ImageStrategy::WebSearch => None,
        }
    }
}

impl std::fmt::Display for DiffusionVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffusionVariant::Schnell => write!(f, "schnell"),
            DiffusionVariant::Dev => write!(f, "dev"),
        }
    }
}

/// A variant whose weights are on disk and ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    pub variant: DiffusionVariant,
    pub weights: PathBuf,
    pub steps: u32,
}

/// Lazily initialised local image model, shared across iterations.
pub struct ImageModelRuntime {
    settings: DiffusionSettings,
    models_dir: PathBuf,
    http: reqwest::Client,
    loaded: Mutex<Option<LoadedModel>>,
}

impl ImageModelRuntime {
    pub fn new(settings: DiffusionSettings, models_dir: PathBuf) -> Self {
        Self {
            settings,
            models_dir,
            http: reqwest::Client::new(),
            loaded: Mutex::new(None),
        }
    }

    /// Weight URL for a variant with the quantization substituted.
    pub fn weights_url(&self, variant: DiffusionVariant) -> String {
        let template = match variant {
            DiffusionVariant::Schnell => &self.settings.schnell_url,
            DiffusionVariant::Dev => &self.settings.dev_url,
        };
        template.replace("{quantization}", &self.settings.quantization)
    }

    /// Local file the weights for a variant are stored in.
    pub fn weights_path(&self, variant: DiffusionVariant) -> Result<PathBuf> {
        let url = url::Url::parse(&self.weights_url(variant))
            .map_err(|e| PosterError::Config(format!("Invalid weights URL: {}", e)))?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| PosterError::Config(format!("Weights URL has no file name: {}", url)))?;
        Ok(self.models_dir.join(file_name))
    }

    fn steps(&self, variant: DiffusionVariant) -> u32 {
        match variant {
            DiffusionVariant::Schnell => self.settings.schnell_steps,
            DiffusionVariant::Dev => self.settings.dev_steps,
        }
    }

    /// Make `variant` ready, fetching weights on first use.
    ///
    /// Switching variants replaces the loaded model.
    pub async fn ensure_loaded(&self, variant: DiffusionVariant) -> Result<LoadedModel> {
        let mut loaded = self.loaded.lock().await;
        if let Some(model) = loaded.as_ref().filter(|m| m.variant == variant) {
            return Ok(model.clone());
        }

        let weights = self.weights_path(variant)?;
        if !weights.exists() {
            self.download_weights(variant, &weights).await?;
        }

        let model = LoadedModel {
            variant,
            weights,
            steps: self.steps(variant),
        };
        info!("Loaded {} model from {}", variant, model.weights.display());
        *loaded = Some(model.clone());
        Ok(model)
    }

    /// Whether a model is currently loaded.
    pub async fn is_loaded(&self) -> bool {
        self.loaded.lock().await.is_some()
    }

    /// Drop the loaded model.
    pub async fn release(&self) {
        if let Some(model) = self.loaded.lock().await.take() {
            info!("Released {} model", model.variant);
        }
    }

    async fn download_weights(&self, variant: DiffusionVariant, dest: &Path) -> Result<()> {
        let url = self.weights_url(variant);
        info!("Downloading {} weights from {}", variant, url);
        tokio::fs::create_dir_all(&self.models_dir).await?;

        let response = self.http.get(&url).send().await?.error_for_status()?;
        let total_size = response.content_length().unwrap_or(0);

        let pb = ProgressBar::new(total_size);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} Weights  [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }

        let partial = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            pb.inc(chunk.len() as u64);
        }
        file.flush().await?;
        pb.finish_and_clear();

        tokio::fs::rename(&partial, dest).await?;
        Ok(())
    }

    /// Render one prompt to `dest`.
    #[instrument(skip(self, prompt), fields(dest = %dest.display()))]
    pub async fn generate(
        &self,
        variant: DiffusionVariant,
        prompt: &str,
        dest: &Path,
        resolution: Resolution,
    ) -> Result<()> {
        let model = self.ensure_loaded(variant).await?;

        let output = Command::new(&self.settings.command)
            .arg("--diffusion-model").arg(&model.weights)
            .arg("-p").arg(prompt)
            .arg("-o").arg(dest)
            .arg("-W").arg(resolution.width.to_string())
            .arg("-H").arg(resolution.height.to_string())
            .arg("--steps").arg(model.steps.to_string())
            .arg("--cfg-scale").arg("1.0")
            .arg("--sampling-method").arg("euler")
            .args(&self.settings.extra_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PosterError::ToolNotFound(self.settings.command.clone())
                } else {
                    PosterError::ToolFailed(format!("Failed to run {}: {}", self.settings.command, e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PosterError::ToolFailed(format!(
                "{} failed: {}",
                self.settings.command,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Image source rendering prompts with the local model.
pub struct DiffusionSource {
    variant: DiffusionVariant,
    runtime: Arc<ImageModelRuntime>,
    prompter: Arc<dyn ScenePrompter>,
    resolution: Resolution,
}

impl DiffusionSource {
    pub fn new(
        variant: DiffusionVariant,
        runtime: Arc<ImageModelRuntime>,
        prompter: Arc<dyn ScenePrompter>,
        resolution: Resolution,
    ) -> Self {
        Self {
            variant,
            runtime,
            prompter,
            resolution,
        }
    }
}

#[async_trait]
impl ImageSource for DiffusionSource {
    #[instrument(skip(self, request), fields(variant = %self.variant, subject = %request.subject))]
    async fn collect(&self, request: &MediaRequest<'_>) -> Result<Vec<MediaAsset>> {
        let prompts = plan_image_prompts(
            self.prompter.as_ref(),
            request.topic,
            request.subject,
            request.script,
            request.count,
        )
        .await;

        // Fail the whole source if the model cannot be made ready.
        self.runtime.ensure_loaded(self.variant).await?;

        let mut assets = Vec::with_capacity(prompts.len());
        for (i, prompt) in prompts.into_iter().enumerate() {
            let raw = request.output_dir.join(format!("render_{}.png", i));
            let dest = request.output_dir.join(format!("image_{}.jpg", assets.len()));
            debug!("Rendering image {}: {}", i, prompt);

            let rendered = match self.runtime.generate(self.variant, &prompt, &raw, self.resolution).await {
                Ok(()) => ffmpeg::fit_image(&raw, &dest, self.resolution).await,
                Err(e) => Err(e),
            };

            match rendered {
                Ok(()) => assets.push(MediaAsset {
                    path: dest,
                    strategy: self.variant.strategy(),
                    origin: prompt,
                }),
                Err(e) => warn!("Image {} failed: {}", i, e),
            }
        }

        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(dir: &Path) -> ImageModelRuntime {
        ImageModelRuntime::new(DiffusionSettings::default(), dir.to_path_buf())
    }

    #[test]
    fn test_weights_location() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = runtime(dir.path());
        assert!(runtime
            .weights_url(DiffusionVariant::Schnell)
            .ends_with("flux1-schnell-q8_0.gguf"));
        assert_eq!(
            runtime.weights_path(DiffusionVariant::Dev).unwrap(),
            dir.path().join("flux1-dev-q8_0.gguf")
        );
    }

    #[tokio::test]
    async fn test_ensure_loaded_reuses_existing_weights_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = runtime(dir.path());
        let weights = runtime.weights_path(DiffusionVariant::Schnell).unwrap();
        std::fs::write(&weights, b"weights").unwrap();

        assert!(!runtime.is_loaded().await);
        let model = runtime.ensure_loaded(DiffusionVariant::Schnell).await.unwrap();
        assert_eq!(model.weights, weights);
        assert_eq!(model.steps, 4);
        assert!(runtime.is_loaded().await);

        let again = runtime.ensure_loaded(DiffusionVariant::Schnell).await.unwrap();
        assert_eq!(again, model);

        runtime.release().await;
        assert!(!runtime.is_loaded().await);
    }

    #[test]
    fn test_variant_strategy_mapping() {
        for variant in [DiffusionVariant::Schnell, DiffusionVariant::Dev] {
            assert_eq!(DiffusionVariant::from_strategy(variant.strategy()), Some(variant));
        }
        assert_eq!(DiffusionVariant::from_strategy(ImageStrategy::WebSearch), None);
    }
}
