// Test mocks for the ingestion pipeline.
//
// One mock per trait seam:
// - MockSource (ListingSource): scripted responses, per-city overrides, call log
// - MockStore (AlertStore): in-memory alerts and matches keyed by (alert_id, listing_id)
// - FixedClassifier (RelevanceClassifier): canned replies
// - MockImageProbe (ImageProbe): URL allow/deny lists
//
// Plus fixture builders for listings and alerts.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use listwatch_common::{Alert, AlertStatusUpdate, Category, Listing};

use crate::filter::{ImageProbe, RelevanceClassifier};
use crate::sources::{ListingSource, SourceCapabilities, SourceError, SourceQuery};
use crate::store::AlertStore;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A valid listing in SF priced at $100, no description, no images.
pub fn listing(id: &str, title: &str) -> Listing {
    Listing {
        id: id.to_string(),
        title: title.to_string(),
        description: None,
        url: format!("https://sfbay.craigslist.org/sfc/sys/d/{id}.html"),
        price: Some("$100".to_string()),
        datetime: "2024-03-01T10:00:00Z".to_string(),
        location: "SF".to_string(),
        category: Category::Software,
        images: Vec::new(),
    }
}

/// An active, never-checked software alert for `city` with keyword "macbook".
pub fn alert(city: &str) -> Alert {
    Alert {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        name: format!("macbook in {city}"),
        cities: vec![city.to_string()],
        category: Category::Software,
        keywords: vec!["macbook".to_string()],
        min_price: None,
        max_price: None,
        is_active: true,
        use_advanced_filter: false,
        last_check_at: None,
        error_count: 0,
        last_error: None,
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Scripted listing source.
///
/// Each call pops the next scripted response. Once the script is exhausted,
/// a query touching a city registered with `.on_city()` gets that city's
/// response, and anything else gets an empty result.
pub struct MockSource {
    name: String,
    images: bool,
    delay: Option<Duration>,
    script: Mutex<VecDeque<Result<Vec<Listing>, SourceError>>>,
    by_city: HashMap<String, Result<Vec<Listing>, SourceError>>,
    queries: Mutex<Vec<SourceQuery>>,
}

impl MockSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            images: false,
            delay: None,
            script: Mutex::new(VecDeque::new()),
            by_city: HashMap::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_images(mut self) -> Self {
        self.images = true;
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn then_ok(self, listings: Vec<Listing>) -> Self {
        self.script.lock().unwrap().push_back(Ok(listings));
        self
    }

    pub fn then_err(self, error: SourceError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn on_city(mut self, city: &str, response: Result<Vec<Listing>, SourceError>) -> Self {
        self.by_city.insert(city.to_string(), response);
        self
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<SourceQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingSource for MockSource {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<Listing>, SourceError> {
        self.queries.lock().unwrap().push(query.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(scripted) = self.script.lock().unwrap().pop_front() {
            return scripted;
        }

        query
            .cities
            .iter()
            .find_map(|city| self.by_city.get(city).cloned())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            images: self.images,
        }
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// In-memory alert store. Matches are unique per `(alert_id, listing_id)`.
pub struct MockStore {
    alerts: Mutex<Vec<Alert>>,
    matches: Mutex<HashMap<(Uuid, String), Listing>>,
    statuses: Mutex<Vec<(Uuid, AlertStatusUpdate)>>,
    fail_due_alerts: bool,
    fail_status_updates: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            matches: Mutex::new(HashMap::new()),
            statuses: Mutex::new(Vec::new()),
            fail_due_alerts: false,
            fail_status_updates: false,
        }
    }

    pub fn with_alert(self, alert: Alert) -> Self {
        self.alerts.lock().unwrap().push(alert);
        self
    }

    pub fn failing_due_alerts(mut self) -> Self {
        self.fail_due_alerts = true;
        self
    }

    pub fn failing_status_updates(mut self) -> Self {
        self.fail_status_updates = true;
        self
    }

    pub fn alert(&self, id: Uuid) -> Option<Alert> {
        self.alerts.lock().unwrap().iter().find(|a| a.id == id).cloned()
    }

    pub fn match_count(&self, alert_id: Uuid) -> usize {
        self.matches
            .lock()
            .unwrap()
            .keys()
            .filter(|(id, _)| *id == alert_id)
            .count()
    }

    pub fn matched_ids(&self, alert_id: Uuid) -> HashSet<String> {
        self.matches
            .lock()
            .unwrap()
            .keys()
            .filter(|(id, _)| *id == alert_id)
            .map(|(_, listing_id)| listing_id.clone())
            .collect()
    }

    pub fn last_status(&self, alert_id: Uuid) -> Option<AlertStatusUpdate> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| *id == alert_id)
            .map(|(_, status)| status.clone())
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for MockStore {
    async fn due_alerts(&self, staleness: Duration) -> Result<Vec<Alert>> {
        if self.fail_due_alerts {
            bail!("MockStore: due_alerts unavailable");
        }
        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(staleness)?;
        let mut due: Vec<Alert> = self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.is_active && a.last_check_at.map_or(true, |at| at < cutoff))
            .cloned()
            .collect();
        // None sorts before Some, so never-checked alerts come first.
        due.sort_by_key(|a| a.last_check_at);
        Ok(due)
    }

    async fn upsert_matches(&self, alert_id: Uuid, listings: &[Listing]) -> Result<usize> {
        let mut matches = self.matches.lock().unwrap();
        let mut inserted = 0;
        for listing in listings {
            let key = (alert_id, listing.id.clone());
            if !matches.contains_key(&key) {
                matches.insert(key, listing.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn update_alert_status(&self, alert_id: Uuid, status: &AlertStatusUpdate) -> Result<()> {
        if self.fail_status_updates {
            bail!("MockStore: status updates unavailable");
        }
        if let Some(alert) = self.alerts.lock().unwrap().iter_mut().find(|a| a.id == alert_id) {
            alert.last_check_at = Some(status.last_check_at);
            alert.error_count = status.error_count;
            alert.last_error = status.last_error.clone();
        }
        self.statuses
            .lock()
            .unwrap()
            .push((alert_id, status.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FixedClassifier
// ---------------------------------------------------------------------------

/// Replies with the same text for every listing, unless a title override matches.
pub struct FixedClassifier {
    reply: Option<String>,
    by_title: HashMap<String, String>,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            by_title: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call errors.
    pub fn failing() -> Self {
        Self {
            reply: None,
            by_title: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on_title(mut self, title: &str, reply: &str) -> Self {
        self.by_title.insert(title.to_string(), reply.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelevanceClassifier for FixedClassifier {
    async fn classify(&self, listing: &Listing) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reply) = self.by_title.get(&listing.title) {
            return Ok(reply.clone());
        }
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => bail!("FixedClassifier: classifier unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// MockImageProbe
// ---------------------------------------------------------------------------

/// URLs registered with `.image()` validate, `.not_image()` don't, and
/// anything else fails like an unreachable host.
pub struct MockImageProbe {
    images: HashSet<String>,
    not_images: HashSet<String>,
    delay: Option<Duration>,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockImageProbe {
    pub fn new() -> Self {
        Self {
            images: HashSet::new(),
            not_images: HashSet::new(),
            delay: None,
            probes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn image(mut self, url: &str) -> Self {
        self.images.insert(url.to_string());
        self
    }

    pub fn not_image(mut self, url: &str) -> Self {
        self.not_images.insert(url.to_string());
        self
    }

    /// Hold each request open for `delay` so overlapping requests are observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were open at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockImageProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageProbe for MockImageProbe {
    async fn probe(&self, url: &str) -> Result<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let open = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(open, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.images.contains(url) {
            Ok(true)
        } else if self.not_images.contains(url) {
            Ok(false)
        } else {
            bail!("MockImageProbe: no response registered for {url}")
        }
    }
}
