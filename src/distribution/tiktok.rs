//! TikTok content posting: OAuth tokens, chunked upload, status polling.

use super::{Channel, VideoMetadata};
use crate::config::TikTokSettings;
use crate::error::{PosterError, Result};
use crate::video::ComposedVideo;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const AUTHORIZE_URL: &str = "https://www.tiktok.com/v2/auth/authorize/";
const TOKEN_URL: &str = "https://open.tiktokapis.com/v2/oauth/token/";
const INIT_URL: &str = "https://open.tiktokapis.com/v2/post/publish/video/init/";
const STATUS_URL: &str = "https://open.tiktokapis.com/v2/post/publish/status/fetch/";
const SCOPES: &str = "user.info.basic,video.publish";

/// Access tokens are refreshed this close to expiry.
const REFRESH_SKEW_SECONDS: i64 = 60;

const MIN_CHUNK_BYTES: u64 = 5 * 1024 * 1024;
const MAX_CHUNK_BYTES: u64 = 64 * 1024 * 1024;

// ============================================================================
// Tokens
// ============================================================================

/// Token pair persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub refresh_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub open_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl StoredTokens {
    /// Whether the access token is expired or about to be.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(REFRESH_SKEW_SECONDS) >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_expires_in: Option<i64>,
    #[serde(default)]
    open_id: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_tokens(self, now: DateTime<Utc>) -> StoredTokens {
        StoredTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now + ChronoDuration::seconds(self.expires_in),
            refresh_expires_at: self
                .refresh_expires_in
                .map(|s| now + ChronoDuration::seconds(s)),
            open_id: self.open_id,
            scope: self.scope,
        }
    }
}

/// Parse the token endpoint body, which is either flat or wrapped in `data`.
fn parse_token_response(body: &str, now: DateTime<Utc>) -> Result<StoredTokens> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    let payload = if value.get("access_token").is_some() {
        value
    } else if let Some(data) = value.get("data").filter(|d| d.get("access_token").is_some()) {
        data.clone()
    } else {
        let error = value["error"].as_str().unwrap_or("unknown_error");
        let description = value["error_description"].as_str().unwrap_or("");
        return Err(PosterError::Distribution(format!(
            "TikTok token request failed: {} {}",
            error, description
        )));
    };

    let response: TokenResponse = serde_json::from_value(payload)?;
    Ok(response.into_tokens(now))
}

/// JSON file holding the current token pair.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredTokens>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, tokens: &StoredTokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(tokens)?)?;
        Ok(())
    }
}

// ============================================================================
// OAuth bootstrap
// ============================================================================

/// Authorization page URL the user opens to grant access.
pub fn authorization_url(client_key: &str, redirect_uri: &str, state: &str) -> Result<String> {
    let url = url::Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_key", client_key),
            ("scope", SCOPES),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("state", state),
        ],
    )
    .map_err(|e| PosterError::Config(format!("Invalid authorization URL: {}", e)))?;
    Ok(url.to_string())
}

/// Exchange an authorization code for a token pair.
pub async fn exchange_code(
    http: &reqwest::Client,
    settings: &TikTokSettings,
    code: &str,
) -> Result<StoredTokens> {
    let (client_key, client_secret) = client_credentials(settings)?;
    let redirect_uri = settings
        .redirect_uri
        .as_deref()
        .ok_or_else(|| PosterError::Config("tiktok.redirect_uri is not set".to_string()))?;

    let body = http
        .post(TOKEN_URL)
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .form(&[
            ("client_key", client_key),
            ("client_secret", client_secret),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await?
        .text()
        .await?;

    parse_token_response(&body, Utc::now())
}

fn client_credentials(settings: &TikTokSettings) -> Result<(&str, &str)> {
    let key = settings
        .client_key
        .as_deref()
        .ok_or_else(|| PosterError::Config("tiktok.client_key is not set".to_string()))?;
    let secret = settings
        .client_secret
        .as_deref()
        .ok_or_else(|| PosterError::Config("tiktok.client_secret is not set".to_string()))?;
    Ok((key, secret))
}

// ============================================================================
// Upload protocol
// ============================================================================

/// How a video is split for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub video_size: u64,
    pub chunk_size: u64,
    pub total_chunk_count: u64,
}

impl ChunkPlan {
    /// Inclusive byte ranges for each chunk. The last chunk takes the remainder.
    pub fn ranges(&self) -> Vec<(u64, u64)> {
        (0..self.total_chunk_count)
            .map(|i| {
                let start = i * self.chunk_size;
                let end = if i + 1 == self.total_chunk_count {
                    self.video_size - 1
                } else {
                    start + self.chunk_size - 1
                };
                (start, end)
            })
            .collect()
    }
}

/// Split a video into upload chunks.
///
/// Small videos go up whole. Otherwise the chunk size is clamped to the
/// accepted range and the chunk count rounds down, so the final chunk
/// carries the remainder.
pub fn plan_chunks(video_size: u64, preferred_chunk: u64) -> ChunkPlan {
    let chunk_size = preferred_chunk.clamp(MIN_CHUNK_BYTES, MAX_CHUNK_BYTES);
    if video_size <= chunk_size {
        return ChunkPlan {
            video_size,
            chunk_size: video_size,
            total_chunk_count: 1,
        };
    }
    ChunkPlan {
        video_size,
        chunk_size,
        total_chunk_count: video_size / chunk_size,
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    data: Option<T>,
    error: ApiError,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self, step: &str) -> Result<T> {
        if self.error.code != "ok" {
            return Err(PosterError::Distribution(format!(
                "TikTok {} failed: {} {}",
                step, self.error.code, self.error.message
            )));
        }
        self.data
            .ok_or_else(|| PosterError::Distribution(format!("TikTok {} returned no data", step)))
    }
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: String,
    #[serde(default)]
    fail_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct InitRequest<'a> {
    post_info: PostInfo<'a>,
    source_info: SourceInfo,
}

#[derive(Debug, Serialize)]
struct PostInfo<'a> {
    title: &'a str,
    privacy_level: &'static str,
    disable_duet: bool,
    disable_comment: bool,
    disable_stitch: bool,
}

#[derive(Debug, Serialize)]
struct SourceInfo {
    source: &'static str,
    video_size: u64,
    chunk_size: u64,
    total_chunk_count: u64,
}

/// Publishing state reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PublishState {
    Pending,
    Done,
    Failed(String),
}

fn publish_state(data: &StatusData) -> PublishState {
    match data.status.as_str() {
        "PUBLISH_COMPLETE" | "SEND_TO_USER_INBOX" => PublishState::Done,
        "FAILED" => PublishState::Failed(
            data.fail_reason.clone().unwrap_or_else(|| "unknown".to_string()),
        ),
        _ => PublishState::Pending,
    }
}

/// TikTok channel with transparent token refresh.
pub struct TikTokChannel {
    http: reqwest::Client,
    client_key: String,
    client_secret: String,
    store: TokenStore,
    tokens: Mutex<Option<StoredTokens>>,
    token_url: String,
    sandbox: bool,
    chunk_size: u64,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl TikTokChannel {
    pub fn new(settings: &TikTokSettings, store: TokenStore) -> Result<Self> {
        let (client_key, client_secret) = client_credentials(settings)?;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()?,
            client_key: client_key.to_string(),
            client_secret: client_secret.to_string(),
            store,
            tokens: Mutex::new(None),
            token_url: TOKEN_URL.to_string(),
            sandbox: settings.sandbox,
            chunk_size: settings.chunk_size_bytes,
            poll_interval: Duration::from_secs(settings.status_poll_seconds),
            poll_attempts: settings.status_poll_attempts,
        })
    }

    /// Use a different OAuth token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    fn privacy_level(&self) -> &'static str {
        if self.sandbox {
            "SELF_ONLY"
        } else {
            "PUBLIC_TO_EVERYONE"
        }
    }

    /// A valid access token, refreshing and persisting it when needed.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.tokens.lock().await;
        if cached.is_none() {
            *cached = self.store.load()?;
        }

        let tokens = cached.as_ref().ok_or_else(|| {
            PosterError::Distribution(format!(
                "No TikTok tokens at {}; run `posterbot tiktok-auth` first",
                self.store.path().display()
            ))
        })?;

        if !tokens.needs_refresh(Utc::now()) {
            return Ok(tokens.access_token.clone());
        }

        info!("Refreshing TikTok access token");
        let refreshed = self.refresh(&tokens.refresh_token).await?;
        self.store.save(&refreshed)?;
        let access = refreshed.access_token.clone();
        *cached = Some(refreshed);
        Ok(access)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredTokens> {
        let body = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .form(&[
                ("client_key", self.client_key.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?
            .text()
            .await?;

        parse_token_response(&body, Utc::now())
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        body: &B,
        step: &str,
    ) -> Result<T> {
        let envelope: ApiEnvelope<T> = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        envelope.into_data(step)
    }

    async fn upload_chunks(&self, upload_url: &str, bytes: &[u8], plan: &ChunkPlan) -> Result<()> {
        let ranges = plan.ranges();
        let total = ranges.len();
        for (i, (start, end)) in ranges.into_iter().enumerate() {
            let chunk = bytes[start as usize..=end as usize].to_vec();
            debug!("Uploading chunk {}/{} ({} bytes)", i + 1, total, chunk.len());

            let response = self
                .http
                .put(upload_url)
                .header(reqwest::header::CONTENT_TYPE, "video/mp4")
                .header(
                    reqwest::header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, plan.video_size),
                )
                .body(chunk)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(PosterError::Distribution(format!(
                    "Chunk {} upload returned HTTP {}",
                    i + 1,
                    status
                )));
            }
        }
        Ok(())
    }

    async fn wait_for_publish(&self, token: &str, publish_id: &str) -> Result<()> {
        let body = serde_json::json!({ "publish_id": publish_id });
        for attempt in 1..=self.poll_attempts {
            let data: StatusData = self.post_json(STATUS_URL, token, &body, "status fetch").await?;
            match publish_state(&data) {
                PublishState::Done => return Ok(()),
                PublishState::Failed(reason) => {
                    return Err(PosterError::Distribution(format!(
                        "TikTok rejected the post: {}",
                        reason
                    )))
                }
                PublishState::Pending => {
                    debug!("Publish status {} (attempt {})", data.status, attempt);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        warn!("Publish {} still processing after {} checks", publish_id, self.poll_attempts);
        Err(PosterError::Distribution(format!(
            "Timed out waiting for publish {}",
            publish_id
        )))
    }
}

#[async_trait]
impl Channel for TikTokChannel {
    #[instrument(skip(self, video, metadata), fields(video = %video.path.display()))]
    async fn deliver(&self, video: &ComposedVideo, metadata: &VideoMetadata) -> Result<Option<String>> {
        let token = self.access_token().await?;
        let bytes = tokio::fs::read(&video.path).await?;
        if bytes.is_empty() {
            return Err(PosterError::Distribution("Video file is empty".to_string()));
        }

        let plan = plan_chunks(bytes.len() as u64, self.chunk_size);
        let request = InitRequest {
            post_info: PostInfo {
                title: &metadata.caption,
                privacy_level: self.privacy_level(),
                disable_duet: false,
                disable_comment: false,
                disable_stitch: false,
            },
            source_info: SourceInfo {
                source: "FILE_UPLOAD",
                video_size: plan.video_size,
                chunk_size: plan.chunk_size,
                total_chunk_count: plan.total_chunk_count,
            },
        };

        let init: InitData = self.post_json(INIT_URL, &token, &request, "upload init").await?;
        info!(
            "Uploading {} bytes in {} chunks (publish {})",
            plan.video_size, plan.total_chunk_count, init.publish_id
        );

        self.upload_chunks(&init.upload_url, &bytes, &plan).await?;
        self.wait_for_publish(&token, &init.publish_id).await?;

        info!("TikTok publish {} complete", init.publish_id);
        Ok(Some(init.publish_id))
    }
}
