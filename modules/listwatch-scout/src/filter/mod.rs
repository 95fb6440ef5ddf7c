//! Content filter: decides which scraped listings are worth storing.
//!
//! Every criterion runs independently and contributes its own
//! [`RejectReason`]; a listing is accepted only when none fire. The
//! blacklist, dedup and heuristic checks are synchronous. The classifier
//! and image probes are the only outbound calls and run concurrently per
//! listing, with fan-out bounded by [`FilterOptions::batch_size`].

pub mod blacklist;
pub mod dedup;
pub mod heuristics;
pub mod images;
pub mod relevance;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tracing::{debug, info};

use listwatch_common::Listing;

pub use blacklist::Blacklist;
pub use dedup::{DedupCache, Fingerprint};
pub use heuristics::SpamSignal;
pub use images::{HttpImageProbe, ImageCheck, ImageProbe};
pub use relevance::{OpenAiClassifier, RelevanceClassifier, RELEVANCE_THRESHOLD};

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOptions {
    /// Ask the relevance classifier. Ignored when no classifier is configured.
    pub use_ai: bool,
    /// `None` disables duplicate detection.
    pub dedup_window: Option<Duration>,
    pub validate_images: bool,
    /// Title spam heuristics.
    pub use_heuristics: bool,
    pub batch_size: usize,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            use_ai: false,
            dedup_window: None,
            validate_images: false,
            use_heuristics: false,
            batch_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    Blacklisted(Vec<String>),
    Duplicate,
    LowRelevance(f64),
    NoValidImages { checked: usize },
    Spam(SpamSignal),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Blacklisted(phrases) => {
                write!(f, "Contains blacklisted phrases: {}", phrases.join(", "))
            }
            RejectReason::Duplicate => f.write_str("Duplicate listing detected"),
            RejectReason::LowRelevance(score) => {
                write!(f, "Failed AI validation check (score {score:.2})")
            }
            RejectReason::NoValidImages { checked } => {
                write!(f, "No valid images found ({checked} checked)")
            }
            RejectReason::Spam(signal) => write!(f, "Spam heuristic: {signal}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterVerdict {
    pub accepted: bool,
    pub reasons: Vec<RejectReason>,
    /// Set when the classifier was consulted.
    pub ai_score: Option<f64>,
    /// Set when the listing's images were probed.
    pub images: Option<ImageCheck>,
}

pub struct ContentFilter {
    blacklist: Blacklist,
    dedup: DedupCache,
    classifier: Option<Arc<dyn RelevanceClassifier>>,
    image_probe: Arc<dyn ImageProbe>,
}

impl ContentFilter {
    pub fn new(image_probe: Arc<dyn ImageProbe>) -> Self {
        Self {
            blacklist: Blacklist::default(),
            dedup: DedupCache::new(),
            classifier: None,
            image_probe,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn RelevanceClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_blacklist(mut self, blacklist: Blacklist) -> Self {
        self.blacklist = blacklist;
        self
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn dedup_cache(&self) -> &DedupCache {
        &self.dedup
    }

    pub async fn evaluate(&self, listing: &Listing, options: &FilterOptions) -> FilterVerdict {
        self.evaluate_at(listing, options, Utc::now()).await
    }

    /// [`Self::evaluate`] with an explicit clock for the dedup window.
    pub async fn evaluate_at(
        &self,
        listing: &Listing,
        options: &FilterOptions,
        now: DateTime<Utc>,
    ) -> FilterVerdict {
        let mut reasons = Vec::new();

        let phrases = self
            .blacklist
            .matches(&listing.title, listing.description.as_deref());
        if !phrases.is_empty() {
            reasons.push(RejectReason::Blacklisted(phrases));
        }

        // Records the fingerprint even if another criterion rejects the listing.
        if let Some(window) = options.dedup_window {
            if self
                .dedup
                .check_and_record(Fingerprint::of(listing), now, window)
            {
                reasons.push(RejectReason::Duplicate);
            }
        }

        if options.use_heuristics {
            reasons.extend(
                heuristics::check_title(&listing.title)
                    .into_iter()
                    .map(RejectReason::Spam),
            );
        }

        let relevance = async {
            match (&self.classifier, options.use_ai) {
                (Some(classifier), true) => {
                    Some(relevance::score_listing(classifier.as_ref(), listing).await)
                }
                _ => None,
            }
        };
        let images = async {
            if options.validate_images && !listing.images.is_empty() {
                Some(images::check_images(self.image_probe.as_ref(), &listing.images).await)
            } else {
                None
            }
        };
        let (ai_score, images) = tokio::join!(relevance, images);

        if let Some(score) = ai_score {
            if score < RELEVANCE_THRESHOLD {
                reasons.push(RejectReason::LowRelevance(score));
            }
        }
        if let Some(check) = &images {
            if !check.has_valid_images() {
                reasons.push(RejectReason::NoValidImages {
                    checked: check.checked(),
                });
            }
        }

        if !reasons.is_empty() {
            debug!(
                listing_id = listing.id.as_str(),
                reasons = %reasons.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "),
                "Listing rejected"
            );
        }

        FilterVerdict {
            accepted: reasons.is_empty(),
            reasons,
            ai_score,
            images,
        }
    }

    /// Evaluate `listings` in groups of `options.batch_size` and keep the accepted ones.
    pub async fn filter_many(&self, listings: Vec<Listing>, options: &FilterOptions) -> Vec<Listing> {
        let total = listings.len();
        let batch_size = options.batch_size.max(1);
        let mut accepted = Vec::with_capacity(total);

        for chunk in listings.chunks(batch_size) {
            let now = Utc::now();
            let verdicts = join_all(
                chunk
                    .iter()
                    .map(|listing| self.evaluate_at(listing, options, now)),
            )
            .await;

            accepted.extend(
                chunk
                    .iter()
                    .zip(verdicts)
                    .filter(|(_, verdict)| verdict.accepted)
                    .map(|(listing, _)| listing.clone()),
            );
        }

        info!(total, accepted = accepted.len(), "Filtered listings");
        accepted
    }
}
