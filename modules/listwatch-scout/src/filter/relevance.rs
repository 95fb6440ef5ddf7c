use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use ai_client::{leading_number, truncate_to_char_boundary, OpenAi};
use listwatch_common::Listing;

/// Scores below this reject the listing.
pub const RELEVANCE_THRESHOLD: f64 = 0.4;

const MAX_DESCRIPTION_BYTES: usize = 2000;

const SYSTEM_PROMPT: &str = "You are a content filter that rates Craigslist listings. \
Respond only with a number between 0 (spam/scam) and 1 (legitimate).";

/// External judge of whether a listing looks legitimate.
///
/// Implementations return the model's raw reply; parsing happens in
/// [`score_listing`] so every classifier gets the same fail-open treatment.
#[async_trait]
pub trait RelevanceClassifier: Send + Sync {
    async fn classify(&self, listing: &Listing) -> Result<String>;
}

pub struct OpenAiClassifier {
    ai: OpenAi,
}

impl OpenAiClassifier {
    pub fn new(ai: OpenAi) -> Self {
        Self {
            ai: ai.with_max_tokens(4).with_temperature(0.1),
        }
    }
}

#[async_trait]
impl RelevanceClassifier for OpenAiClassifier {
    async fn classify(&self, listing: &Listing) -> Result<String> {
        self.ai
            .chat_completion(SYSTEM_PROMPT, build_prompt(listing))
            .await
    }
}

pub(crate) fn build_prompt(listing: &Listing) -> String {
    let description = listing
        .description
        .as_deref()
        .map(|d| truncate_to_char_boundary(d, MAX_DESCRIPTION_BYTES))
        .unwrap_or("No description");

    format!(
        "Analyze this Craigslist listing for potential spam, scams, or inappropriate content:\n\
         Title: {}\n\
         Price: {}\n\
         Description: {}\n\n\
         Rate this listing from 0 (definitely spam/scam) to 1 (definitely legitimate) based on:\n\
         1. Presence of common scam patterns\n\
         2. Unrealistic pricing\n\
         3. Suspicious contact methods\n\
         4. Inappropriate content\n\
         5. Overall legitimacy\n\n\
         Return only a number between 0 and 1.",
        listing.title,
        listing.price.as_deref().unwrap_or("Not specified"),
        description,
    )
}

/// Parse a classifier reply into a score in [0, 1]. Anything unparseable is 1.
pub fn parse_score(reply: &str) -> f64 {
    leading_number(reply).map(|n| n.clamp(0.0, 1.0)).unwrap_or(1.0)
}

/// Ask the classifier about one listing. Errors and garbage fail open.
pub async fn score_listing(classifier: &dyn RelevanceClassifier, listing: &Listing) -> f64 {
    match classifier.classify(listing).await {
        Ok(reply) => parse_score(&reply),
        Err(e) => {
            warn!(listing_id = listing.id.as_str(), error = %e, "Relevance check failed, accepting listing");
            1.0
        }
    }
}
