//! Listing source adapters.
//!
//! Each adapter turns a [`SourceQuery`] into one call against an external
//! scraping backend and normalizes whatever comes back into canonical
//! [`Listing`]s. Raw items that miss a required field are dropped here and
//! never reach the filter.

pub mod craigslist;
pub mod search_results;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use apify_client::ApifyError;
use listwatch_common::{Alert, Category, Listing};

pub use craigslist::CraigslistSource;
pub use search_results::SearchResultsSource;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    pub cities: Vec<String>,
    pub category: Category,
    pub keywords: Vec<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub limit: u32,
}

impl SourceQuery {
    pub fn new(cities: Vec<String>, category: Category) -> Self {
        Self {
            cities,
            category,
            keywords: Vec::new(),
            min_price: None,
            max_price: None,
            limit: 100,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_price_range(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// The query an alert's check should run.
    pub fn for_alert(alert: &Alert, limit: u32) -> Self {
        Self::new(alert.city_codes(), alert.category)
            .with_keywords(alert.search_terms())
            .with_price_range(alert.min_price, alert.max_price)
            .with_limit(limit)
    }

    pub fn ensure_cities(&self) -> Result<(), SourceError> {
        if self.cities.is_empty() {
            return Err(SourceError::InvalidQuery("no cities provided".to_string()));
        }
        Ok(())
    }

    /// One search page URL per city.
    pub fn search_urls(&self) -> Result<Vec<String>, SourceError> {
        self.ensure_cities()?;
        self.cities
            .iter()
            .map(|city| self.search_url(city))
            .collect()
    }

    fn search_url(&self, city: &str) -> Result<String, SourceError> {
        if city.is_empty() || !city.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(SourceError::InvalidQuery(format!("invalid city code: {city:?}")));
        }

        let base = format!(
            "https://{city}.craigslist.org/search/{}",
            self.category.search_code()
        );
        let mut url = url::Url::parse(&base)
            .map_err(|e| SourceError::InvalidQuery(format!("bad search url {base}: {e}")))?;

        {
            let mut params = url.query_pairs_mut();
            if !self.keywords.is_empty() {
                params.append_pair("query", &self.keywords.join(" "));
            }
            if let Some(min) = self.min_price {
                params.append_pair("min_price", &min.to_string());
            }
            if let Some(max) = self.max_price {
                params.append_pair("max_price", &max.to_string());
            }
        }
        // An empty serializer still leaves a dangling `?`.
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url.to_string())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure kinds a source can report. Decided once, at the adapter boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Bad or missing credential. Never retried, never a fallback trigger.
    #[error("source authentication failed: {0}")]
    Auth(String),

    /// Rate limit or plan quota hit. Retryable.
    #[error("source quota exceeded: {0}")]
    QuotaExceeded(String),

    /// 5xx, network failure, or timeout.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Malformed response, non-array payload, or a rejected request.
    #[error("source protocol error: {0}")]
    Protocol(String),

    /// The query itself cannot be sent (e.g. no cities).
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::QuotaExceeded(_))
    }

    /// Fatal errors abort the scrape without trying another source.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Auth(_) | SourceError::InvalidQuery(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Auth(_) => "auth",
            SourceError::QuotaExceeded(_) => "quota_exceeded",
            SourceError::Unavailable(_) => "unavailable",
            SourceError::Protocol(_) => "protocol",
            SourceError::InvalidQuery(_) => "invalid_query",
        }
    }
}

impl From<ApifyError> for SourceError {
    fn from(err: ApifyError) -> Self {
        match err {
            ApifyError::Api { status, message } => match status {
                401 | 403 => SourceError::Auth(format!("status {status}: {message}")),
                402 | 429 => SourceError::QuotaExceeded(format!("status {status}: {message}")),
                500..=599 => SourceError::Unavailable(format!("status {status}: {message}")),
                _ => SourceError::Protocol(format!("status {status}: {message}")),
            },
            ApifyError::Network(msg) => SourceError::Unavailable(msg),
            ApifyError::Timeout(msg) => SourceError::Unavailable(format!("timed out: {msg}")),
            ApifyError::Parse(msg) => SourceError::Protocol(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// ListingSource trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCapabilities {
    /// Populates `Listing::images` with full image URLs.
    pub images: bool,
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<Listing>, SourceError>;

    fn name(&self) -> &str;

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::default()
    }
}

// ---------------------------------------------------------------------------
// Shared adapter plumbing
// ---------------------------------------------------------------------------

/// Run one backend call under a deadline; an elapsed deadline is `Unavailable`.
pub(crate) async fn with_deadline<T, F>(
    source: &str,
    timeout: Duration,
    call: F,
) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, ApifyError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(SourceError::from),
        Err(_) => Err(SourceError::Unavailable(format!(
            "{source} did not respond within {}s",
            timeout.as_secs()
        ))),
    }
}

/// Deserialize raw items into `R`, drop the ones that fail, convert the rest.
pub(crate) fn normalize<R, F>(
    source: &str,
    items: Vec<serde_json::Value>,
    limit: u32,
    convert: F,
) -> Vec<Listing>
where
    R: DeserializeOwned,
    F: Fn(R) -> Listing,
{
    let total = items.len();
    let listings: Vec<Listing> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<R>(item).ok())
        .map(convert)
        .collect();

    let dropped = total - listings.len();
    if dropped > 0 {
        debug!(source, dropped, total, "Dropped items missing required fields");
    }

    listings.into_iter().take(limit as usize).collect()
}

/// Treat empty optional strings as absent.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> SourceQuery {
        SourceQuery::new(vec!["sfbay".to_string()], Category::Software)
    }

    #[test]
    fn search_url_without_filters_has_no_query_string() {
        let urls = query().search_urls().unwrap();
        assert_eq!(urls, vec!["https://sfbay.craigslist.org/search/sof"]);
    }

    #[test]
    fn search_url_encodes_keywords_and_prices() {
        let urls = query()
            .with_keywords(vec!["macbook".to_string(), "pro".to_string()])
            .with_price_range(Some(100), Some(900))
            .search_urls()
            .unwrap();
        assert_eq!(
            urls[0],
            "https://sfbay.craigslist.org/search/sof?query=macbook+pro&min_price=100&max_price=900"
        );
    }

    #[test]
    fn price_filters_work_without_keywords() {
        let urls = query().with_price_range(None, Some(50)).search_urls().unwrap();
        assert_eq!(urls[0], "https://sfbay.craigslist.org/search/sof?max_price=50");
    }

    #[test]
    fn one_url_per_city() {
        let q = SourceQuery::new(
            vec!["sfbay".to_string(), "newyork".to_string()],
            Category::CarsTrucks,
        );
        let urls = q.search_urls().unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls[1].starts_with("https://newyork.craigslist.org/search/cta"));
    }

    #[test]
    fn empty_cities_is_invalid_query() {
        let q = SourceQuery::new(vec![], Category::Software);
        assert!(matches!(q.search_urls(), Err(SourceError::InvalidQuery(_))));
    }

    #[test]
    fn city_codes_cannot_inject_hosts() {
        let q = SourceQuery::new(vec!["evil.com/x".to_string()], Category::Software);
        assert!(matches!(q.search_urls(), Err(SourceError::InvalidQuery(_))));
    }

    #[test]
    fn apify_statuses_map_to_kinds() {
        let api = |status| ApifyError::Api {
            status,
            message: String::new(),
        };
        assert!(matches!(SourceError::from(api(401)), SourceError::Auth(_)));
        assert!(matches!(SourceError::from(api(402)), SourceError::QuotaExceeded(_)));
        assert!(matches!(SourceError::from(api(429)), SourceError::QuotaExceeded(_)));
        assert!(matches!(SourceError::from(api(503)), SourceError::Unavailable(_)));
        assert!(matches!(SourceError::from(api(400)), SourceError::Protocol(_)));
        assert!(matches!(
            SourceError::from(ApifyError::Parse("not an array".into())),
            SourceError::Protocol(_)
        ));
        assert!(matches!(
            SourceError::from(ApifyError::Timeout("30s".into())),
            SourceError::Unavailable(_)
        ));
    }

    #[test]
    fn only_quota_is_retryable() {
        assert!(SourceError::QuotaExceeded(String::new()).is_retryable());
        assert!(!SourceError::Unavailable(String::new()).is_retryable());
        assert!(!SourceError::Auth(String::new()).is_retryable());
        assert!(SourceError::Auth(String::new()).is_fatal());
        assert!(!SourceError::Protocol(String::new()).is_fatal());
    }

    #[tokio::test]
    async fn deadline_elapsed_is_unavailable() {
        let result: Result<(), SourceError> = with_deadline(
            "slow",
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), ApifyError>(())
            },
        )
        .await;
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }
}
