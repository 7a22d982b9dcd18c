//! Process-scoped state shared by every pipeline iteration.

use crate::config::Settings;
use crate::media::ImageModelRuntime;
use std::sync::Arc;
use tracing::debug;

/// Resources initialised on first use and reused across iterations.
///
/// Nothing in here carries data between iterations; it only saves repeated
/// setup. [`PipelineContext::shutdown`] releases everything explicitly.
pub struct PipelineContext {
    image_model: Arc<ImageModelRuntime>,
}

impl PipelineContext {
    pub fn new(settings: &Settings) -> Self {
        Self::with_image_model(Arc::new(ImageModelRuntime::new(
            settings.diffusion.clone(),
            settings.models_dir(),
        )))
    }

    pub fn with_image_model(image_model: Arc<ImageModelRuntime>) -> Self {
        Self { image_model }
    }

    /// The local image model runtime. Not loaded until first used.
    pub fn image_model(&self) -> Arc<ImageModelRuntime> {
        self.image_model.clone()
    }

    /// Release held resources.
    pub async fn shutdown(&self) {
        debug!("Shutting down pipeline context");
        self.image_model.release().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffusionSettings;
    use crate::media::DiffusionVariant;

    #[tokio::test]
    async fn test_shutdown_releases_model() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(ImageModelRuntime::new(
            DiffusionSettings::default(),
            dir.path().to_path_buf(),
        ));
        let weights = runtime.weights_path(DiffusionVariant::Dev).unwrap();
        std::fs::write(&weights, b"weights").unwrap();

        let context = PipelineContext::with_image_model(runtime.clone());
        context.image_model().ensure_loaded(DiffusionVariant::Dev).await.unwrap();
        assert!(runtime.is_loaded().await);

        context.shutdown().await;
        assert!(!runtime.is_loaded().await);
    }
}
