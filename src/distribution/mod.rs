//! Delivery of finished videos to a single channel.

mod email;
mod tiktok;

pub use email::EmailChannel;
pub use tiktok::{
    authorization_url, exchange_code, plan_chunks, ChunkPlan, StoredTokens, TikTokChannel,
    TokenStore,
};

use crate::config::{Platform, Settings};
use crate::error::{PosterError, Result};
use crate::video::ComposedVideo;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Descriptive text that travels with a video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub subject: String,
    pub concept: String,
    /// Post caption rendered from the topic template.
    pub caption: String,
}

impl VideoMetadata {
    pub fn email_subject(&self) -> String {
        format!("PosterBot Video: {}", self.concept)
    }

    pub fn email_body(&self) -> String {
        format!(
            "Video about: {}\n\nConcept: {}\n\nGenerated by PosterBot",
            self.subject, self.concept
        )
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Delivered, with the channel's identifier when it returns one.
    Delivered { id: Option<String> },
    /// Distribution was turned off.
    Skipped,
    /// Delivery failed; the video is still on disk.
    Failed { reason: String },
}

/// Channel plus status for one distribution call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionResult {
    pub platform: Platform,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

impl DistributionResult {
    pub fn skipped() -> Self {
        Self {
            platform: Platform::None,
            status: DeliveryStatus::Skipped,
        }
    }

    pub fn failed(platform: Platform, error: &PosterError) -> Self {
        Self {
            platform,
            status: DeliveryStatus::Failed {
                reason: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.status, DeliveryStatus::Failed { .. })
    }
}

impl std::fmt::Display for DistributionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.status {
            DeliveryStatus::Delivered { id: Some(id) } => {
                write!(f, "delivered via {} ({})", self.platform, id)
            }
            DeliveryStatus::Delivered { id: None } => write!(f, "delivered via {}", self.platform),
            DeliveryStatus::Skipped => write!(f, "skipped"),
            DeliveryStatus::Failed { reason } => {
                write!(f, "{} delivery failed: {}", self.platform, reason)
            }
        }
    }
}

/// One concrete delivery target.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Deliver the video, returning the channel's identifier if any.
    async fn deliver(&self, video: &ComposedVideo, metadata: &VideoMetadata) -> Result<Option<String>>;
}

/// Stage contract: send a video to the selected platform.
#[async_trait]
pub trait Distributor: Send + Sync {
    async fn distribute(
        &self,
        video: &ComposedVideo,
        platform: Platform,
        metadata: &VideoMetadata,
    ) -> Result<DistributionResult>;
}

/// Distributor holding one optional channel per platform.
#[derive(Default)]
pub struct ChannelDistributor {
    email: Option<Arc<dyn Channel>>,
    tiktok: Option<Arc<dyn Channel>>,
}

impl ChannelDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, channel: Arc<dyn Channel>) -> Self {
        self.email = Some(channel);
        self
    }

    pub fn with_tiktok(mut self, channel: Arc<dyn Channel>) -> Self {
        self.tiktok = Some(channel);
        self
    }

    /// Build channels for whatever is configured.
    ///
    /// Unconfigured or invalid channels are left disabled and fail at delivery
    /// time, so a run that never distributes does not need valid credentials.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut distributor = Self::new();

        if settings.email.is_configured() {
            match EmailChannel::new(&settings.email) {
                Ok(channel) => distributor = distributor.with_email(Arc::new(channel)),
                Err(e) => warn!("Email channel disabled: {}", e),
            }
        } else {
            debug!("Email credentials incomplete, email channel disabled");
        }

        if settings.tiktok.client_key.is_some() && settings.tiktok.client_secret.is_some() {
            let store = TokenStore::new(settings.tiktok_token_path());
            match TikTokChannel::new(&settings.tiktok, store) {
                Ok(channel) => distributor = distributor.with_tiktok(Arc::new(channel)),
                Err(e) => warn!("TikTok channel disabled: {}", e),
            }
        } else {
            debug!("TikTok client credentials missing, TikTok channel disabled");
        }

        distributor
    }

    fn channel(&self, platform: Platform) -> Option<&Arc<dyn Channel>> {
        match platform {
            Platform::None => None,
            Platform::Email => self.email.as_ref(),
            Platform::TikTok => self.tiktok.as_ref(),
        }
    }
}

#[async_trait]
impl Distributor for ChannelDistributor {
    #[instrument(skip(self, video, metadata), fields(platform = %platform, video = %video.path.display()))]
    async fn distribute(
        &self,
        video: &ComposedVideo,
        platform: Platform,
        metadata: &VideoMetadata,
    ) -> Result<DistributionResult> {
        if platform == Platform::None {
            info!("Distribution skipped");
            return Ok(DistributionResult::skipped());
        }

        let channel = self.channel(platform).ok_or_else(|| {
            PosterError::Distribution(format!("{} channel is not configured", platform))
        })?;

        if !video.path.exists() {
            return Err(PosterError::Distribution(format!(
                "Video file not found: {}",
                video.path.display()
            )));
        }

        let id = channel.deliver(video, metadata).await.map_err(|e| match e {
            PosterError::Distribution(_) => e,
            other => PosterError::Distribution(other.to_string()),
        })?;

        info!("Delivered via {}", platform);
        Ok(DistributionResult {
            platform,
            status: DeliveryStatus::Delivered { id },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Channel for CountingChannel {
        async fn deliver(&self, _video: &ComposedVideo, _metadata: &VideoMetadata) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some("post-1".to_string()))
        }
    }

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            subject: "Honda NSX".to_string(),
            concept: "Senna tuned the chassis.".to_string(),
            caption: "Honda NSX".to_string(),
        }
    }

    fn video(path: PathBuf) -> ComposedVideo {
        ComposedVideo {
            path,
            segments: 2,
            duration: 4.0,
        }
    }

    #[tokio::test]
    async fn test_none_platform_skips_without_io() {
        let channel = Arc::new(CountingChannel { calls: AtomicUsize::new(0) });
        let distributor = ChannelDistributor::new()
            .with_email(channel.clone())
            .with_tiktok(channel.clone());

        // The file does not exist; skipping must not even look at it.
        let missing = video(PathBuf::from("/nonexistent/video.mp4"));
        let result = distributor
            .distribute(&missing, Platform::None, &metadata())
            .await
            .unwrap();

        assert_eq!(result.status, DeliveryStatus::Skipped);
        assert_eq!(channel.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_to_selected_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"mp4").unwrap();

        let email = Arc::new(CountingChannel { calls: AtomicUsize::new(0) });
        let tiktok = Arc::new(CountingChannel { calls: AtomicUsize::new(0) });
        let distributor = ChannelDistributor::new()
            .with_email(email.clone())
            .with_tiktok(tiktok.clone());

        let result = distributor
            .distribute(&video(path), Platform::TikTok, &metadata())
            .await
            .unwrap();

        assert_eq!(result.platform, Platform::TikTok);
        assert_eq!(
            result.status,
            DeliveryStatus::Delivered { id: Some("post-1".to_string()) }
        );
        assert_eq!(tiktok.calls.load(Ordering::SeqCst), 1);
        assert_eq!(email.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_channel_is_distribution_error() {
        let distributor = ChannelDistributor::new();
        let err = distributor
            .distribute(&video(PathBuf::from("v.mp4")), Platform::Email, &metadata())
            .await
            .unwrap_err();
        assert!(matches!(err, PosterError::Distribution(_)));

        let failed = DistributionResult::failed(Platform::Email, &err);
        assert!(!failed.is_success());
    }

    #[tokio::test]
    async fn test_malformed_email_address_disables_channel_only() {
        let mut settings = Settings::default();
        settings.email.sender = Some("bot@example.com".to_string());
        settings.email.receiver = Some("not an address".to_string());
        settings.email.app_password = Some("abcd efgh".to_string());

        let distributor = ChannelDistributor::from_settings(&settings);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"mp4").unwrap();

        let skipped = distributor
            .distribute(&video(path.clone()), Platform::None, &metadata())
            .await
            .unwrap();
        assert_eq!(skipped.status, DeliveryStatus::Skipped);

        let err = distributor
            .distribute(&video(path), Platform::Email, &metadata())
            .await
            .unwrap_err();
        assert!(matches!(err, PosterError::Distribution(_)));
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_email_text() {
        let meta = metadata();
        assert_eq!(meta.email_subject(), "PosterBot Video: Senna tuned the chassis.");
        assert!(meta.email_body().starts_with("Video about: Honda NSX"));
    }
}
