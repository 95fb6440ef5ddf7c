use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use listwatch_common::Listing;

/// Duplicate-detection key: lowercase title, raw price, lowercase location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(listing: &Listing) -> Self {
        Self(format!(
            "{}|{}|{}",
            listing.title.to_lowercase(),
            listing.price.as_deref().unwrap_or_default(),
            listing.location.to_lowercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Fingerprints seen recently, with the times they were accepted.
///
/// Shared by every evaluation on a [`super::ContentFilter`]; the whole
/// sweep-check-record sequence runs under one lock.
#[derive(Debug, Default)]
pub struct DedupCache {
    entries: Mutex<HashMap<Fingerprint, Vec<DateTime<Utc>>>>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `fingerprint` was already seen within `window`.
    /// Otherwise records `now` against it and returns `false`.
    pub fn check_and_record(
        &self,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
        window: Duration,
    ) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        entries.retain(|_, seen| {
            seen.retain(|ts| now.signed_duration_since(*ts) < window);
            !seen.is_empty()
        });

        match entries.get_mut(&fingerprint) {
            Some(_) => true,
            None => {
                entries.insert(fingerprint, vec![now]);
                false
            }
        }
    }

    /// Number of live fingerprints (as of the last sweep).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
