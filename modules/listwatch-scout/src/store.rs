//! Persistence seam for alerts and matches.
//!
//! Expected Postgres tables:
//!
//! ```sql
//! alerts  (id uuid PK, user_id uuid, name text, cities text[], category text,
//!          keywords text[], min_price bigint, max_price bigint,
//!          is_active bool, use_advanced_filter bool,
//!          last_check_at timestamptz, error_count int, last_error text)
//! matches (alert_id uuid, listing_id text, title text, description text,
//!          url text, price text, posted_at text, location text,
//!          category text, images text[], created_at timestamptz,
//!          UNIQUE (alert_id, listing_id))
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use listwatch_common::{Alert, AlertStatusUpdate, Category, Listing, ListwatchError};

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Active alerts never checked or last checked more than `staleness` ago,
    /// never-checked first, then oldest check first.
    async fn due_alerts(&self, staleness: Duration) -> Result<Vec<Alert>>;

    /// Insert matches for `alert_id`, ignoring listings already stored for it.
    /// Returns the number of new rows.
    async fn upsert_matches(&self, alert_id: Uuid, listings: &[Listing]) -> Result<usize>;

    async fn update_alert_status(&self, alert_id: Uuid, status: &AlertStatusUpdate) -> Result<()>;
}

#[derive(Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw `alerts` row. Every column a user-facing edit can leave NULL is
/// optional here so one bad row cannot fail the whole query.
#[derive(Debug, Default, sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    user_id: Uuid,
    name: Option<String>,
    cities: Option<Vec<String>>,
    category: Option<String>,
    keywords: Option<Vec<String>>,
    min_price: Option<i64>,
    max_price: Option<i64>,
    is_active: Option<bool>,
    use_advanced_filter: Option<bool>,
    last_check_at: Option<DateTime<Utc>>,
    error_count: Option<i32>,
    last_error: Option<String>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = ListwatchError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let category: Category = row
            .category
            .as_deref()
            .ok_or_else(|| ListwatchError::Validation(format!("alert {} has no category", row.id)))?
            .parse()?;
        Ok(Alert {
            id: row.id,
            user_id: row.user_id,
            name: row.name.unwrap_or_default(),
            cities: row.cities.unwrap_or_default(),
            category,
            keywords: row.keywords.unwrap_or_default(),
            min_price: row.min_price,
            max_price: row.max_price,
            is_active: row.is_active.unwrap_or(false),
            use_advanced_filter: row.use_advanced_filter.unwrap_or(false),
            last_check_at: row.last_check_at,
            error_count: row.error_count.unwrap_or(0),
            last_error: row.last_error,
        })
    }
}

/// Split loaded rows into usable alerts and failure statuses for the rows
/// that could not be read, so those surface on the alert instead of vanishing.
fn partition_rows(
    rows: Vec<AlertRow>,
    now: DateTime<Utc>,
) -> (Vec<Alert>, Vec<(Uuid, AlertStatusUpdate)>) {
    let mut alerts = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();
    for row in rows {
        let id = row.id;
        let previous_errors = row.error_count.unwrap_or(0);
        match Alert::try_from(row) {
            Ok(alert) => alerts.push(alert),
            Err(e) => {
                warn!(alert_id = %id, error = %e, "Alert row is unreadable");
                rejected.push((id, AlertStatusUpdate::failed_after(previous_errors, now, e.to_string())));
            }
        }
    }
    (alerts, rejected)
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn due_alerts(&self, staleness: Duration) -> Result<Vec<Alert>> {
        let now = Utc::now();
        let cutoff = chrono::Duration::from_std(staleness)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT id, user_id, name, cities, category, keywords, min_price, max_price,
                    is_active, use_advanced_filter, last_check_at, error_count, last_error
             FROM alerts
             WHERE is_active = true
               AND (last_check_at IS NULL OR last_check_at < $1)
             ORDER BY last_check_at ASC NULLS FIRST",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .context("failed to load due alerts")?;

        let (alerts, rejected) = partition_rows(rows, now);
        for (alert_id, status) in &rejected {
            if let Err(e) = self.update_alert_status(*alert_id, status).await {
                error!(alert_id = %alert_id, error = %e, "Failed to record unreadable alert");
            }
        }
        Ok(alerts)
    }

    async fn upsert_matches(&self, alert_id: Uuid, listings: &[Listing]) -> Result<usize> {
        if listings.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for listing in listings {
            let result = sqlx::query(
                "INSERT INTO matches
                    (alert_id, listing_id, title, description, url, price, posted_at,
                     location, category, images, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
                 ON CONFLICT (alert_id, listing_id) DO NOTHING",
            )
            .bind(alert_id)
            .bind(&listing.id)
            .bind(&listing.title)
            .bind(&listing.description)
            .bind(&listing.url)
            .bind(&listing.price)
            .bind(&listing.datetime)
            .bind(&listing.location)
            .bind(listing.category.key())
            .bind(&listing.images)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to store match {} for alert {alert_id}", listing.id))?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        Ok(inserted as usize)
    }

    async fn update_alert_status(&self, alert_id: Uuid, status: &AlertStatusUpdate) -> Result<()> {
        sqlx::query(
            "UPDATE alerts
             SET last_check_at = $2, error_count = $3, last_error = $4
             WHERE id = $1",
        )
        .bind(alert_id)
        .bind(status.last_check_at)
        .bind(status.error_count)
        .bind(&status.last_error)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update status of alert {alert_id}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(category: Option<&str>) -> AlertRow {
        AlertRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: Some("desk".into()),
            cities: Some(vec!["sfbay".into()]),
            category: category.map(str::to_string),
            keywords: Some(vec!["desk".into()]),
            is_active: Some(true),
            use_advanced_filter: Some(false),
            error_count: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn null_columns_fall_back_to_empty_values() {
        let mut r = row(Some("furniture"));
        r.name = None;
        r.keywords = None;
        r.use_advanced_filter = None;
        r.error_count = None;

        let alert = Alert::try_from(r).unwrap();
        assert_eq!(alert.name, "");
        assert!(alert.keywords.is_empty());
        assert!(!alert.use_advanced_filter);
        assert_eq!(alert.error_count, 0);
        assert_eq!(alert.category, Category::Furniture);
    }

    #[test]
    fn unknown_category_is_recorded_as_a_failure() {
        let now = Utc::now();
        let good = row(Some("furniture"));
        let bad = row(Some("spaceships"));
        let bad_id = bad.id;

        let (alerts, rejected) = partition_rows(vec![good, bad], now);

        assert_eq!(alerts.len(), 1);
        assert_eq!(rejected.len(), 1);
        let (id, status) = &rejected[0];
        assert_eq!(*id, bad_id);
        assert_eq!(status.last_check_at, now);
        assert_eq!(status.error_count, 3);
        assert!(status.last_error.as_deref().unwrap().contains("unknown category: spaceships"));
    }

    #[test]
    fn missing_category_is_recorded_as_a_failure() {
        let (alerts, rejected) = partition_rows(vec![row(None)], Utc::now());
        assert!(alerts.is_empty());
        assert!(rejected[0].1.last_error.as_deref().unwrap().contains("has no category"));
    }

    #[test]
    fn null_cities_load_and_then_fail_validation() {
        let mut r = row(Some("furniture"));
        r.cities = None;
        let (alerts, rejected) = partition_rows(vec![r], Utc::now());
        assert!(rejected.is_empty());
        assert!(alerts[0].validate().is_err());
    }
}
