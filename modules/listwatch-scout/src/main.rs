use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use apify_client::ApifyClient;
use listwatch_common::Config;
use listwatch_scout::filter::{HttpImageProbe, OpenAiClassifier};
use listwatch_scout::sources::{CraigslistSource, ListingSource, SearchResultsSource};
use listwatch_scout::{
    AlertStore, BatchProcessor, BatchSettings, ContentFilter, PgAlertStore, RetryPolicy,
    ScrapeOrchestrator,
};

const IMAGE_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("listwatch=info".parse()?))
        .init();

    info!("Listwatch scout starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store: Arc<dyn AlertStore> = Arc::new(PgAlertStore::new(pool));

    // Both actors share one token and HTTP client.
    let apify = Arc::new(ApifyClient::with_timeout(
        config.apify_api_token.clone(),
        config.source_timeout,
    )?);
    let sources: Vec<Arc<dyn ListingSource>> = vec![
        Arc::new(SearchResultsSource::new(apify.clone(), config.source_timeout)),
        Arc::new(CraigslistSource::new(apify, config.source_timeout)),
    ];
    let orchestrator = ScrapeOrchestrator::new(sources).with_retry(RetryPolicy {
        max_attempts: config.retry_attempts,
        delay: config.retry_delay,
    });

    let mut filter = ContentFilter::new(Arc::new(HttpImageProbe::new(IMAGE_PROBE_TIMEOUT)?));
    match &config.openai_api_key {
        Some(key) => {
            let ai = OpenAi::new(key.clone(), config.classifier_model.clone())
                .with_timeout(CLASSIFIER_TIMEOUT)?;
            filter = filter.with_classifier(Arc::new(OpenAiClassifier::new(ai)));
        }
        None => warn!("OPENAI_API_KEY not set, relevance checks disabled"),
    }

    let processor = BatchProcessor::builder()
        .store(store)
        .orchestrator(Arc::new(orchestrator))
        .filter(Arc::new(filter))
        .settings(BatchSettings::from_config(&config))
        .build();

    let summary = processor.run_cycle().await?;
    for error in &summary.errors {
        warn!(error = error.as_str(), "Alert failed");
    }
    info!(
        processed = summary.processed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Listwatch scout finished"
    );

    Ok(())
}
