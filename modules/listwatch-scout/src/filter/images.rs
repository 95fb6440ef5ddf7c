use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

/// Checks whether a URL serves an image.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    /// `Ok(true)` when the URL answers with a success status and an `image/*`
    /// content type. Transport failures are errors; callers count them as invalid.
    async fn probe(&self, url: &str) -> Result<bool>;
}

/// HEAD-request probe.
pub struct HttpImageProbe {
    http: reqwest::Client,
}

impl HttpImageProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ImageProbe for HttpImageProbe {
    async fn probe(&self, url: &str) -> Result<bool> {
        let resp = self.http.head(url).send().await?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let is_image = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"));
        Ok(is_image)
    }
}

/// Outcome of probing every image on one listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCheck {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

impl ImageCheck {
    pub fn has_valid_images(&self) -> bool {
        !self.valid.is_empty()
    }

    pub fn checked(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }
}

/// Most image requests open at once for a single listing.
pub const MAX_CONCURRENT_IMAGE_CHECKS: usize = 4;

/// Check `urls` at most [`MAX_CONCURRENT_IMAGE_CHECKS`] at a time, keeping their
/// order in the result.
pub async fn check_images(probe: &dyn ImageProbe, urls: &[String]) -> ImageCheck {
    let results: Vec<Result<bool>> = stream::iter(urls)
        .map(|url| probe.probe(url))
        .buffered(MAX_CONCURRENT_IMAGE_CHECKS)
        .collect()
        .await;

    let mut check = ImageCheck::default();
    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok(true) => check.valid.push(url.clone()),
            Ok(false) => check.invalid.push(url.clone()),
            Err(e) => {
                debug!(url = url.as_str(), error = %e, "Image probe failed");
                check.invalid.push(url.clone());
            }
        }
    }
    check
}
