//! Source selection with retry and fallback.
//!
//! Sources are tried in preference order. A source that comes back empty or
//! fails with a non-fatal error hands the same query to the next one;
//! `QuotaExceeded` is retried on the same source first. Auth failures and
//! invalid queries stop the scrape immediately.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use listwatch_common::{Category, Listing};

use crate::sources::{ListingSource, SourceError, SourceQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per source, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Which sources to try first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourcePreference {
    /// Image-capable sources first.
    #[default]
    Images,
    /// Sources without image support (the steadier backends) first.
    Reliable,
}

/// A scrape that failed on every source it was allowed to try.
#[derive(Debug, Clone, Error)]
#[error("Scraping failed for {} - {category}: {error}", .cities.join(", "))]
pub struct ScrapeError {
    pub cities: Vec<String>,
    pub category: Category,
    pub error: SourceError,
}

impl ScrapeError {
    fn new(query: &SourceQuery, error: SourceError) -> Self {
        Self {
            cities: query.cities.clone(),
            category: query.category,
            error,
        }
    }

    pub fn kind(&self) -> &SourceError {
        &self.error
    }
}

pub struct ScrapeOrchestrator {
    sources: Vec<Arc<dyn ListingSource>>,
    retry: RetryPolicy,
}

impl ScrapeOrchestrator {
    pub fn new(sources: Vec<Arc<dyn ListingSource>>) -> Self {
        Self {
            sources,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            ..retry
        };
        self
    }

    pub async fn scrape(&self, query: &SourceQuery) -> Result<Vec<Listing>, ScrapeError> {
        self.scrape_with(query, SourcePreference::default()).await
    }

    pub async fn scrape_with(
        &self,
        query: &SourceQuery,
        preference: SourcePreference,
    ) -> Result<Vec<Listing>, ScrapeError> {
        query
            .ensure_cities()
            .map_err(|e| ScrapeError::new(query, e))?;

        let ordered = self.ordered(preference);
        let Some((last, primaries)) = ordered.split_last() else {
            return Err(ScrapeError::new(
                query,
                SourceError::Unavailable("no listing sources configured".to_string()),
            ));
        };

        for source in primaries {
            match self.fetch_with_retry(source.as_ref(), query).await {
                Ok(listings) if !listings.is_empty() => return Ok(listings),
                Ok(_) => {
                    info!(source = source.name(), "No listings, trying next source");
                }
                Err(e) if e.is_fatal() => return Err(ScrapeError::new(query, e)),
                Err(e) => {
                    warn!(source = source.name(), kind = e.kind(), error = %e, "Source failed, trying next source");
                }
            }
        }

        self.fetch_with_retry(last.as_ref(), query)
            .await
            .map_err(|e| ScrapeError::new(query, e))
    }

    fn ordered(&self, preference: SourcePreference) -> Vec<Arc<dyn ListingSource>> {
        let mut ordered = self.sources.clone();
        // Stable, so configured order breaks ties.
        match preference {
            SourcePreference::Images => ordered.sort_by_key(|s| !s.capabilities().images),
            SourcePreference::Reliable => ordered.sort_by_key(|s| s.capabilities().images),
        }
        ordered
    }

    async fn fetch_with_retry(
        &self,
        source: &dyn ListingSource,
        query: &SourceQuery,
    ) -> Result<Vec<Listing>, SourceError> {
        let mut attempt = 1;
        loop {
            match source.fetch(query).await {
                Ok(listings) => {
                    info!(source = source.name(), attempt, count = listings.len(), "Fetched listings");
                    return Ok(listings);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    warn!(
                        source = source.name(),
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Retryable source error, backing off"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
