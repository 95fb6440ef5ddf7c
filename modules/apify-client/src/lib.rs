pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{
    CraigslistPost, CraigslistScraperInput, ProxyConfiguration, SearchResultPost,
    SearchResultsScraperInput, StartUrl,
};

use std::time::Duration;

use serde::Serialize;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for ivanvs/craigslist-scraper.
pub const CRAIGSLIST_SCRAPER: &str = "ivanvs~craigslist-scraper";

/// Actor ID for easyapi/craigslist-search-results-scraper.
pub const SEARCH_RESULTS_SCRAPER: &str = "easyapi~craigslist-search-results-scraper";

/// Concurrency requested from the craigslist-scraper actor. Kept low to stay
/// inside the account's compute limits.
const CRAIGSLIST_MAX_CONCURRENCY: u32 = 2;

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Build a client whose HTTP requests give up after `timeout`.
    pub fn with_timeout(token: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    /// Run an actor synchronously and return its dataset items as raw JSON.
    ///
    /// The body must be a JSON array; anything else is a `Parse` error. Items
    /// are returned untyped so callers can validate them one by one.
    pub async fn run_sync_dataset_items<I: Serialize>(
        &self,
        actor_id: &str,
        input: &I,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!(
            "{}/acts/{}/run-sync-get-dataset-items",
            self.base_url, actor_id
        );
        tracing::debug!(actor_id, "Starting synchronous Apify run");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        parse_dataset_items(&body)
    }

    /// Scrape craigslist search pages through ivanvs/craigslist-scraper.
    pub async fn scrape_craigslist(&self, search_urls: &[String]) -> Result<Vec<serde_json::Value>> {
        tracing::info!(urls = search_urls.len(), "Starting craigslist scrape");

        let input = CraigslistScraperInput {
            max_concurrency: CRAIGSLIST_MAX_CONCURRENCY,
            pagination_enabled: true,
            proxy_configuration: ProxyConfiguration::default(),
            urls: search_urls
                .iter()
                .map(|url| StartUrl { url: url.clone() })
                .collect(),
        };

        let items = self
            .run_sync_dataset_items(CRAIGSLIST_SCRAPER, &input)
            .await?;
        tracing::info!(count = items.len(), "Fetched craigslist posts");
        Ok(items)
    }

    /// Scrape craigslist search results with image metadata through
    /// easyapi/craigslist-search-results-scraper.
    pub async fn scrape_search_results(
        &self,
        search_urls: &[String],
        max_items: u32,
    ) -> Result<Vec<serde_json::Value>> {
        tracing::info!(urls = search_urls.len(), max_items, "Starting search results scrape");

        let input = SearchResultsScraperInput {
            search_urls: search_urls.to_vec(),
            max_items,
            proxy_configuration: ProxyConfiguration::default(),
        };

        let items = self
            .run_sync_dataset_items(SEARCH_RESULTS_SCRAPER, &input)
            .await?;
        tracing::info!(count = items.len(), "Fetched search result posts");
        Ok(items)
    }
}

fn parse_dataset_items(body: &str) -> Result<Vec<serde_json::Value>> {
    match serde_json::from_str::<serde_json::Value>(body)? {
        serde_json::Value::Array(items) => Ok(items),
        other => Err(ApifyError::Parse(format!(
            "expected a JSON array of dataset items, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
