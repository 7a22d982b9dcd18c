//! DuckDuckGo image search, the last-resort source.
//!
//! The endpoint rate-limits aggressively, so searches are spaced out and
//! failures back off exponentially.

use super::{download_and_fit, query_variants, ImageSource, MediaAsset, MediaRequest};
use crate::config::{ImageStrategy, MediaSettings};
use crate::error::{PosterError, Result};
use crate::ffmpeg::Resolution;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SEARCH_PAGE_URL: &str = "https://duckduckgo.com/";
const IMAGE_API_URL: &str = "https://duckduckgo.com/i.js";

static VQD_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"vqd=["']?([\d-]+)["']?"#).expect("Invalid regex"));

#[derive(Debug, Deserialize)]
struct ImageResults {
    #[serde(default)]
    results: Vec<ImageResult>,
}

#[derive(Debug, Deserialize)]
struct ImageResult {
    image: String,
}

/// Web image search with backoff.
pub struct WebSearchSource {
    http: reqwest::Client,
    resolution: Resolution,
    search_delay: Duration,
    backoff_base: Duration,
    max_retries: u32,
    results_per_query: usize,
}

impl WebSearchSource {
    pub fn new(http: reqwest::Client, settings: &MediaSettings, resolution: Resolution) -> Self {
        Self {
            http,
            resolution,
            search_delay: Duration::from_secs(settings.search_delay_seconds),
            backoff_base: Duration::from_secs(settings.backoff_base_seconds),
            max_retries: settings.max_search_retries,
            results_per_query: settings.results_per_query,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let page = self
            .http
            .get(SEARCH_PAGE_URL)
            .query(&[("q", query), ("iax", "images"), ("ia", "images")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let vqd = extract_vqd(&page).ok_or_else(|| {
            PosterError::Service("Image search token not found (rate limited?)".to_string())
        })?;

        let results: ImageResults = self
            .http
            .get(IMAGE_API_URL)
            .header(reqwest::header::REFERER, SEARCH_PAGE_URL)
            .query(&[
                ("l", "us-en"),
                ("o", "json"),
                ("q", query),
                ("vqd", vqd.as_str()),
                ("f", ",,,,,"),
                ("p", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(results
            .results
            .into_iter()
            .take(self.results_per_query)
            .map(|r| r.image)
            .collect())
    }
}

fn extract_vqd(page: &str) -> Option<String> {
    VQD_TOKEN
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Delay before the next search after `retry` consecutive failures.
pub(crate) fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(retry))
}

#[async_trait]
impl ImageSource for WebSearchSource {
    #[instrument(skip(self, request), fields(subject = %request.subject))]
    async fn collect(&self, request: &MediaRequest<'_>) -> Result<Vec<MediaAsset>> {
        let mut assets = Vec::with_capacity(request.count);
        let mut failures = 0u32;

        for query in query_variants(request.subject, request.topic.image.search_keyword.as_deref()) {
            if assets.len() >= request.count {
                break;
            }
            info!("Searching the web for: {}", query);

            match self.search(&query).await {
                Ok(urls) => {
                    failures = 0;
                    for url in urls {
                        if assets.len() >= request.count {
                            break;
                        }
                        match download_and_fit(
                            &self.http,
                            &url,
                            request.output_dir,
                            assets.len(),
                            self.resolution,
                        )
                        .await
                        {
                            Ok(path) => assets.push(MediaAsset {
                                path,
                                strategy: ImageStrategy::WebSearch,
                                origin: url,
                            }),
                            Err(e) => debug!("Skipping {}: {}", url, e),
                        }
                    }
                    if assets.len() < request.count {
                        tokio::time::sleep(self.search_delay).await;
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!("Image search failed ({}/{}): {}", failures, self.max_retries, e);
                    if failures >= self.max_retries {
                        warn!("Giving up on web search after {} failures", failures);
                        break;
                    }
                    let wait = backoff_delay(self.backoff_base, failures);
                    debug!("Backing off for {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }

        Ok(assets)
    }
}
