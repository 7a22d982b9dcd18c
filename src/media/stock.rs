//! Pexels stock photo source.

use super::{download_and_fit, keyword_query, ImageSource, MediaAsset, MediaRequest};
use crate::config::ImageStrategy;
use crate::error::{PosterError, Result};
use crate::ffmpeg::Resolution;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

const SEARCH_URL: &str = "https://api.pexels.com/v1/search";

/// Pexels caps `per_page` at 80.
const MAX_PER_PAGE: usize = 80;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    src: PhotoSources,
}

#[derive(Debug, Deserialize)]
struct PhotoSources {
    large: String,
}

/// Stock photo search against the Pexels API.
pub struct StockPhotoSource {
    http: reqwest::Client,
    api_key: String,
    resolution: Resolution,
}

impl StockPhotoSource {
    pub fn new(http: reqwest::Client, api_key: String, resolution: Resolution) -> Self {
        Self {
            http,
            api_key,
            resolution,
        }
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<String>> {
        let per_page = per_page(count).to_string();
        let response = self
            .http
            .get(SEARCH_URL)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", per_page.as_str()),
                ("orientation", self.resolution.orientation()),
            ])
            .send()
            .await
            .map_err(|e| PosterError::Service(format!("Pexels request failed: {}", e)))?;

        if let Some(remaining) = response
            .headers()
            .get("X-Ratelimit-Remaining")
            .and_then(|v| v.to_str().ok())
        {
            debug!("Pexels quota remaining this hour: {}", remaining);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(PosterError::Service(format!("Pexels returned HTTP {}", status)));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| PosterError::Service(format!("Invalid Pexels response: {}", e)))?;

        Ok(body.photos.into_iter().map(|p| p.src.large).collect())
    }
}

fn per_page(count: usize) -> usize {
    (count.max(1) * 3).min(MAX_PER_PAGE)
}

#[async_trait]
impl ImageSource for StockPhotoSource {
    #[instrument(skip(self, request), fields(subject = %request.subject))]
    async fn collect(&self, request: &MediaRequest<'_>) -> Result<Vec<MediaAsset>> {
        let query = keyword_query(request.subject, request.topic.image.search_keyword.as_deref());
        info!("Searching Pexels for: {}", query);

        let urls = self.search(&query, request.count).await?;
        info!("Pexels returned {} photos", urls.len());

        let mut assets = Vec::with_capacity(request.count);
        for url in urls {
            if assets.len() >= request.count {
                break;
            }
            match download_and_fit(&self.http, &url, request.output_dir, assets.len(), self.resolution)
                .await
            {
                Ok(path) => assets.push(MediaAsset {
                    path,
                    strategy: ImageStrategy::StockPhotos,
                    origin: url,
                }),
                Err(e) => warn!("Skipping {}: {}", url, e),
            }
        }

        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_page_bounds() {
        assert_eq!(per_page(0), 3);
        assert_eq!(per_page(10), 30);
        assert_eq!(per_page(40), 80);
    }

    #[test]
    fn test_search_response_shape() {
        let json = r#"{"page": 1, "photos": [{"id": 1, "src": {"large": "https://images.pexels.com/1.jpg", "small": "x"}}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.photos[0].src.large, "https://images.pexels.com/1.jpg");
        let empty: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.photos.is_empty());
    }
}
