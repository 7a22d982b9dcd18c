//! Configuration settings for PosterBot.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub speech: SpeechSettings,
    pub video: VideoSettings,
    pub media: MediaSettings,
    pub diffusion: DiffusionSettings,
    pub email: EmailSettings,
    pub tiktok: TikTokSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for generated audio, images and videos.
    pub output_dir: String,
    /// Directory for the rotating log file.
    pub logs_dir: String,
    /// Directory for persistent state (tokens, model weights).
    pub data_dir: String,
    /// Directory searched for topic configuration files.
    pub topics_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            output_dir: "./output".to_string(),
            logs_dir: "./logs".to_string(),
            data_dir: "~/.posterbot".to_string(),
            topics_dir: "./topics".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Speech model id.
    pub model: String,
    /// Voice name, or "random" to pick one per run.
    pub voice: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            model: "tts-1".to_string(),
            voice: "random".to_string(),
        }
    }
}

/// Output video encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 1280,
            fps: 1,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
        }
    }
}

/// Strategy used to obtain images.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
pub enum ImageStrategy {
    /// Local diffusion model, fast variant.
    #[serde(rename = "flux-schnell")]
    FluxSchnell,
    /// Local diffusion model, quality variant.
    #[serde(rename = "flux-dev")]
    FluxDev,
    /// Stock-photo search (Pexels).
    #[default]
    #[serde(rename = "pexels")]
    StockPhotos,
    /// Web image search (DuckDuckGo).
    #[serde(rename = "duckduckgo")]
    WebSearch,
}

impl ImageStrategy {
    /// The ordered list of strategies tried when this one is selected.
    ///
    /// AI generation falls back to stock photos, stock photos fall back to web search.
    pub fn fallback_chain(self) -> Vec<ImageStrategy> {
        match self {
            ImageStrategy::FluxSchnell => vec![
                ImageStrategy::FluxSchnell,
                ImageStrategy::StockPhotos,
                ImageStrategy::WebSearch,
            ],
            ImageStrategy::FluxDev => vec![
                ImageStrategy::FluxDev,
                ImageStrategy::StockPhotos,
                ImageStrategy::WebSearch,
            ],
            ImageStrategy::StockPhotos => vec![ImageStrategy::StockPhotos, ImageStrategy::WebSearch],
            ImageStrategy::WebSearch => vec![ImageStrategy::WebSearch],
        }
    }

    /// Whether this strategy renders images with the local model.
    pub fn is_ai(self) -> bool {
        matches!(self, ImageStrategy::FluxSchnell | ImageStrategy::FluxDev)
    }
}

impl std::str::FromStr for ImageStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flux-schnell" | "flux" => Ok(ImageStrategy::FluxSchnell),
            "flux-dev" => Ok(ImageStrategy::FluxDev),
            "pexels" | "stock" => Ok(ImageStrategy::StockPhotos),
            "duckduckgo" | "web" => Ok(ImageStrategy::WebSearch),
            _ => Err(format!("Unknown image strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for ImageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageStrategy::FluxSchnell => write!(f, "flux-schnell"),
            ImageStrategy::FluxDev => write!(f, "flux-dev"),
            ImageStrategy::StockPhotos => write!(f, "pexels"),
            ImageStrategy::WebSearch => write!(f, "duckduckgo"),
        }
    }
}

/// Distribution channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Skip distribution.
    None,
    /// Email with the video attached.
    #[default]
    Email,
    /// TikTok content posting API.
    TikTok,
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Platform::None),
            "email" => Ok(Platform::Email),
            "tiktok" => Ok(Platform::TikTok),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::None => write!(f, "none"),
            Platform::Email => write!(f, "email"),
            Platform::TikTok => write!(f, "tiktok"),
        }
    }
}

/// Image collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    /// Strategy used when a topic does not pick one.
    pub default_strategy: ImageStrategy,
    /// Pexels API key.
    pub pexels_api_key: Option<String>,
    /// Pause between successful web searches.
    pub search_delay_seconds: u64,
    /// Consecutive web search failures before giving up.
    pub max_search_retries: u32,
    /// Base delay for exponential backoff on web search failures.
    pub backoff_base_seconds: u64,
    /// Results requested per web search query.
    pub results_per_query: usize,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            default_strategy: ImageStrategy::StockPhotos,
            pexels_api_key: None,
            search_delay_seconds: 3,
            max_search_retries: 3,
            backoff_base_seconds: 5,
            results_per_query: 15,
        }
    }
}

/// Local diffusion model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffusionSettings {
    /// Diffusion CLI executable (stable-diffusion.cpp compatible).
    pub command: String,
    /// Where downloaded weights are kept.
    pub models_dir: String,
    /// Quantization level substituted into the weight URLs.
    pub quantization: String,
    /// Weight URL for the fast variant.
    pub schnell_url: String,
    /// Weight URL for the quality variant.
    pub dev_url: String,
    pub schnell_steps: u32,
    pub dev_steps: u32,
    /// Extra arguments passed verbatim to the CLI.
    pub extra_args: Vec<String>,
}

impl Default for DiffusionSettings {
    fn default() -> Self {
        Self {
            command: "sd".to_string(),
            models_dir: "~/.posterbot/models".to_string(),
            quantization: "q8_0".to_string(),
            schnell_url: "https://huggingface.co/city96/FLUX.1-schnell-gguf/resolve/main/flux1-schnell-{quantization}.gguf".to_string(),
            dev_url: "https://huggingface.co/city96/FLUX.1-dev-gguf/resolve/main/flux1-dev-{quantization}.gguf".to_string(),
            schnell_steps: 4,
            dev_steps: 28,
            extra_args: Vec::new(),
        }
    }
}

/// Email distribution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    /// Application password for the sender account.
    pub app_password: Option<String>,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            sender: None,
            receiver: None,
            app_password: None,
        }
    }
}

impl EmailSettings {
    /// Whether sender, receiver and password are all present.
    pub fn is_configured(&self) -> bool {
        [&self.sender, &self.receiver, &self.app_password]
            .iter()
            .all(|v| v.as_ref().is_some_and(|s| !s.is_empty()))
    }
}

/// TikTok distribution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TikTokSettings {
    pub client_key: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    /// Where the access/refresh token pair is persisted.
    pub token_path: String,
    /// Restrict posts to self-only visibility.
    pub sandbox: bool,
    pub chunk_size_bytes: u64,
    pub status_poll_seconds: u64,
    pub status_poll_attempts: u32,
}

impl Default for TikTokSettings {
    fn default() -> Self {
        Self {
            client_key: None,
            client_secret: None,
            redirect_uri: None,
            token_path: "~/.posterbot/tiktok_tokens.json".to_string(),
            sandbox: true,
            chunk_size_bytes: 10 * 1024 * 1024,
            status_poll_seconds: 5,
            status_poll_attempts: 24,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    ///
    /// Environment overrides are applied on top of the file contents.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Overlay values from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("PEXELS_API_KEY") {
            self.media.pexels_api_key = Some(v);
        }
        if let Some(v) = get("IMAGE_SOURCE") {
            match v.parse() {
                Ok(strategy) => self.media.default_strategy = strategy,
                Err(e) => warn!("Ignoring IMAGE_SOURCE: {}", e),
            }
        }
        if let Some(v) = get("DEFAULT_VOICE") {
            self.speech.voice = v;
        }
        if let Some(v) = get("EMAIL_SENDER") {
            self.email.sender = Some(v);
        }
        if let Some(v) = get("EMAIL_RECEIVER") {
            self.email.receiver = Some(v);
        }
        if let Some(v) = get("EMAIL_APP_PASSWORD") {
            self.email.app_password = Some(v);
        }
        if let Some(v) = get("TIKTOK_CLIENT_KEY") {
            self.tiktok.client_key = Some(v);
        }
        if let Some(v) = get("TIKTOK_CLIENT_SECRET") {
            self.tiktok.client_secret = Some(v);
        }
        if let Some(v) = get("TIKTOK_REDIRECT_URI") {
            self.tiktok.redirect_uri = Some(v);
        }

        for (key, slot) in [
            ("VIDEO_WIDTH", &mut self.video.width),
            ("VIDEO_HEIGHT", &mut self.video.height),
            ("VIDEO_FPS", &mut self.video.fps),
        ] {
            if let Some(v) = get(key) {
                match v.parse::<u32>() {
                    Ok(n) if n > 0 => *slot = n,
                    _ => warn!("Ignoring {}={}: expected a positive integer", key, v),
                }
            }
        }
    }

    /// Save settings to a specific path.
    ///
    /// Secrets are never written; they come from the environment or a
    /// hand-edited file.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&self.without_secrets())
            .map_err(|e| crate::error::PosterError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// A copy with API keys and passwords cleared.
    pub fn without_secrets(&self) -> Self {
        let mut copy = self.clone();
        copy.media.pexels_api_key = None;
        copy.email.app_password = None;
        copy.tiktok.client_secret = None;
        copy
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("posterbot")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    pub fn output_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.output_dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.logs_dir)
    }

    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    pub fn topics_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.topics_dir)
    }

    pub fn models_dir(&self) -> PathBuf {
        Self::expand_path(&self.diffusion.models_dir)
    }

    pub fn tiktok_token_path(&self) -> PathBuf {
        Self::expand_path(&self.tiktok.token_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.video.width, 1280);
        assert_eq!(settings.video.height, 1280);
        assert_eq!(settings.video.fps, 1);
        assert_eq!(settings.speech.voice, "random");
        assert_eq!(settings.media.default_strategy, ImageStrategy::StockPhotos);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PEXELS_API_KEY", "px"),
            ("VIDEO_WIDTH", "1080"),
            ("VIDEO_FPS", "zero"),
            ("IMAGE_SOURCE", "duckduckgo"),
            ("EMAIL_SENDER", "a@example.com"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.media.pexels_api_key.as_deref(), Some("px"));
        assert_eq!(settings.video.width, 1080);
        assert_eq!(settings.video.fps, 1);
        assert_eq!(settings.media.default_strategy, ImageStrategy::WebSearch);
        assert_eq!(settings.email.sender.as_deref(), Some("a@example.com"));
        assert!(!settings.email.is_configured());
    }

    #[test]
    fn test_strategy_fallback_chain() {
        assert_eq!(
            ImageStrategy::FluxDev.fallback_chain(),
            vec![ImageStrategy::FluxDev, ImageStrategy::StockPhotos, ImageStrategy::WebSearch]
        );
        assert_eq!(ImageStrategy::WebSearch.fallback_chain(), vec![ImageStrategy::WebSearch]);
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("TikTok".parse::<Platform>().unwrap(), Platform::TikTok);
        assert_eq!("none".parse::<Platform>().unwrap(), Platform::None);
        assert!("instagram".parse::<Platform>().is_err());
    }

    #[test]
    fn test_settings_roundtrip_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        assert!(text.contains("default_strategy = \"pexels\""));
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed.diffusion.schnell_steps, 4);
    }

    #[test]
    fn test_saved_file_never_contains_env_secrets() {
        let env: HashMap<&str, &str> = [
            ("EMAIL_SENDER", "bot@example.com"),
            ("EMAIL_APP_PASSWORD", "hunter2-secret"),
            ("PEXELS_API_KEY", "px-secret"),
            ("TIKTOK_CLIENT_KEY", "ck"),
            ("TIKTOK_CLIENT_SECRET", "tiktok-secret"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_env(|k| env.get(k).map(|v| v.to_string()));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        settings.save_to(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();

        for secret in ["hunter2-secret", "px-secret", "tiktok-secret"] {
            assert!(!written.contains(secret), "{} was written", secret);
        }
        assert!(written.contains("bot@example.com"));

        // The in-memory settings keep their secrets.
        assert_eq!(settings.email.app_password.as_deref(), Some("hunter2-secret"));
    }
}
