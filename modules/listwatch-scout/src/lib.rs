pub mod batch;
pub mod filter;
pub mod orchestrator;
pub mod sources;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use batch::{BatchProcessor, BatchSettings, CycleSummary};
pub use filter::{ContentFilter, FilterOptions, FilterVerdict, RejectReason};
pub use orchestrator::{RetryPolicy, ScrapeError, ScrapeOrchestrator, SourcePreference};
pub use sources::{ListingSource, SourceError, SourceQuery};
pub use store::{AlertStore, PgAlertStore};
