//! One ingestion cycle over every due alert.
//!
//! Alerts are processed in fixed-size batches. Each alert in a batch runs
//! concurrently and the batch is allowed to settle completely before the
//! next one starts. A failing alert is recorded on the alert itself and
//! never aborts its siblings.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use listwatch_common::{Alert, AlertStatusUpdate, Config};

use crate::filter::{ContentFilter, FilterOptions};
use crate::orchestrator::ScrapeOrchestrator;
use crate::sources::SourceQuery;
use crate::store::AlertStore;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub staleness: Duration,
    pub max_listings: u32,
    /// Per-alert deadline covering scrape, filter and persist.
    pub alert_timeout: Option<Duration>,
    pub dedup_window: Option<Duration>,
    pub validate_images: bool,
    pub filter_batch_size: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_secs(2),
            staleness: Duration::from_secs(3600),
            max_listings: 100,
            alert_timeout: None,
            dedup_window: Some(Duration::from_secs(24 * 3600)),
            validate_images: false,
            filter_batch_size: 10,
        }
    }
}

impl BatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            batch_delay: config.batch_delay,
            staleness: config.staleness,
            max_listings: config.max_listings_per_alert,
            alert_timeout: config.alert_timeout,
            dedup_window: config.dedup_window,
            validate_images: config.validate_images,
            filter_batch_size: config.filter_batch_size,
        }
    }

    /// Filter options for one alert. AI scoring and title heuristics are
    /// reserved for alerts on the advanced filter.
    pub fn filter_options(&self, alert: &Alert) -> FilterOptions {
        FilterOptions {
            use_ai: alert.use_advanced_filter,
            dedup_window: self
                .dedup_window
                .map(|w| chrono::Duration::from_std(w).unwrap_or(chrono::Duration::MAX)),
            validate_images: self.validate_images,
            use_heuristics: alert.use_advanced_filter,
            batch_size: self.filter_batch_size,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(TypedBuilder)]
pub struct BatchProcessor {
    store: Arc<dyn AlertStore>,
    orchestrator: Arc<ScrapeOrchestrator>,
    filter: Arc<ContentFilter>,
    #[builder(default)]
    settings: BatchSettings,
}

impl BatchProcessor {
    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Run every due alert once. Fails only if the due alerts can't be loaded.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let alerts = self.store.due_alerts(self.settings.staleness).await?;
        let mut summary = CycleSummary::default();

        if alerts.is_empty() {
            info!("No alerts due");
            return Ok(summary);
        }

        let batch_size = self.settings.batch_size.max(1);
        let batch_count = alerts.len().div_ceil(batch_size);
        info!(alerts = alerts.len(), batches = batch_count, "Starting cycle");

        for (index, batch) in alerts.chunks(batch_size).enumerate() {
            let outcomes = join_all(batch.iter().map(|alert| self.process_alert(alert))).await;

            for (alert, outcome) in batch.iter().zip(outcomes) {
                summary.processed += 1;
                match outcome {
                    Ok(()) => summary.succeeded += 1,
                    Err(e) => {
                        summary.failed += 1;
                        summary.errors.push(format!("{}: {e}", alert.name));
                    }
                }
            }

            if index + 1 < batch_count && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Cycle complete"
        );
        Ok(summary)
    }

    /// Check one alert and record the outcome on it.
    pub async fn process_alert(&self, alert: &Alert) -> Result<()> {
        let outcome = match self.settings.alert_timeout {
            Some(limit) => tokio::time::timeout(limit, self.check_alert(alert))
                .await
                .unwrap_or_else(|_| Err(anyhow!("alert check timed out after {}s", limit.as_secs()))),
            None => self.check_alert(alert).await,
        };

        let now = Utc::now();
        let status = match &outcome {
            Ok(inserted) => {
                info!(alert_id = %alert.id, inserted, "Alert checked");
                AlertStatusUpdate::succeeded(now)
            }
            Err(e) => {
                warn!(alert_id = %alert.id, error = %e, "Alert check failed");
                AlertStatusUpdate::failed(alert, now, format!("{e:#}"))
            }
        };
        self.record_status(alert.id, &status).await;

        outcome.map(|_| ())
    }

    async fn check_alert(&self, alert: &Alert) -> Result<usize> {
        alert.validate()?;

        let query = SourceQuery::for_alert(alert, self.settings.max_listings);
        let listings = self.orchestrator.scrape(&query).await?;
        let scraped = listings.len();

        let options = self.settings.filter_options(alert);
        let accepted = self.filter.filter_many(listings, &options).await;
        info!(alert_id = %alert.id, scraped, accepted = accepted.len(), "Filtered alert listings");

        self.store.upsert_matches(alert.id, &accepted).await
    }

    async fn record_status(&self, alert_id: Uuid, status: &AlertStatusUpdate) {
        if let Err(e) = self.store.update_alert_status(alert_id, status).await {
            error!(alert_id = %alert_id, error = %e, "Failed to record alert status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceError;
    use crate::testing::{alert, listing, MockImageProbe, MockSource, MockStore};
    use crate::orchestrator::RetryPolicy;

    fn settings() -> BatchSettings {
        BatchSettings {
            batch_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn processor(store: Arc<MockStore>, source: Arc<MockSource>) -> BatchProcessor {
        let orchestrator = ScrapeOrchestrator::new(vec![source]).with_retry(RetryPolicy {
            max_attempts: 1,
            delay: Duration::ZERO,
        });
        BatchProcessor::builder()
            .store(store)
            .orchestrator(Arc::new(orchestrator))
            .filter(Arc::new(ContentFilter::new(Arc::new(MockImageProbe::new()))))
            .settings(settings())
            .build()
    }

    #[tokio::test]
    async fn successful_check_stores_matches_and_resets_errors() {
        let mut a = alert("sfbay");
        a.error_count = 3;
        a.last_error = Some("previous failure".into());
        let store = Arc::new(MockStore::new().with_alert(a.clone()));
        let source = Arc::new(MockSource::new("craigslist").then_ok(vec![listing("1", "Desk")]));

        let summary = processor(store.clone(), source).run_cycle().await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(store.match_count(a.id), 1);
        let status = store.last_status(a.id).unwrap();
        assert_eq!(status.error_count, 0);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn failed_check_increments_error_count_and_records_message() {
        let mut a = alert("sfbay");
        a.error_count = 1;
        let store = Arc::new(MockStore::new().with_alert(a.clone()));
        let source = Arc::new(
            MockSource::new("craigslist").then_err(SourceError::Auth("status 401".into())),
        );

        let summary = processor(store.clone(), source).run_cycle().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors.len(), 1);
        let status = store.last_status(a.id).unwrap();
        assert_eq!(status.error_count, 2);
        assert!(status.last_error.unwrap().contains("Scraping failed for sfbay"));
    }

    #[tokio::test]
    async fn invalid_alert_fails_without_scraping() {
        let mut a = alert("sfbay");
        a.min_price = Some(500);
        a.max_price = Some(100);
        let store = Arc::new(MockStore::new().with_alert(a.clone()));
        let source = Arc::new(MockSource::new("craigslist"));

        let summary = processor(store.clone(), source.clone()).run_cycle().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(source.calls(), 0);
        assert_eq!(store.last_status(a.id).unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn store_failure_on_due_alerts_aborts_cycle() {
        let store = Arc::new(MockStore::new().failing_due_alerts());
        let source = Arc::new(MockSource::new("craigslist"));
        assert!(processor(store, source).run_cycle().await.is_err());
    }

    #[tokio::test]
    async fn status_write_failure_does_not_change_outcome() {
        let a = alert("sfbay");
        let store = Arc::new(MockStore::new().with_alert(a.clone()).failing_status_updates());
        let source = Arc::new(MockSource::new("craigslist").then_ok(vec![listing("1", "Desk")]));

        let summary = processor(store.clone(), source).run_cycle().await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(store.match_count(a.id), 1);
    }

    #[tokio::test]
    async fn alert_timeout_counts_as_failure() {
        let a = alert("sfbay");
        let store = Arc::new(MockStore::new().with_alert(a.clone()));
        let source = Arc::new(MockSource::new("craigslist").with_delay(Duration::from_secs(5)));
        let processor = BatchProcessor::builder()
            .store(store.clone())
            .orchestrator(Arc::new(ScrapeOrchestrator::new(vec![source])))
            .filter(Arc::new(ContentFilter::new(Arc::new(MockImageProbe::new()))))
            .settings(BatchSettings {
                alert_timeout: Some(Duration::from_millis(20)),
                ..settings()
            })
            .build();

        let summary = processor.run_cycle().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert!(store.last_status(a.id).unwrap().last_error.unwrap().contains("timed out"));
    }

    #[test]
    fn advanced_filter_enables_ai_and_heuristics() {
        let mut a = alert("sfbay");
        let basic = settings().filter_options(&a);
        assert!(!basic.use_ai && !basic.use_heuristics);
        assert_eq!(basic.dedup_window, Some(chrono::Duration::hours(24)));

        a.use_advanced_filter = true;
        let advanced = settings().filter_options(&a);
        assert!(advanced.use_ai && advanced.use_heuristics);
    }

    #[test]
    fn oversized_dedup_window_still_dedups() {
        let s = BatchSettings {
            dedup_window: Some(Duration::MAX),
            ..settings()
        };
        assert_eq!(
            s.filter_options(&alert("sfbay")).dedup_window,
            Some(chrono::Duration::MAX)
        );
    }
}
