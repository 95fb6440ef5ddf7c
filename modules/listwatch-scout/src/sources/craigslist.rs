use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use apify_client::{ApifyClient, CraigslistPost};
use listwatch_common::{Category, Listing};

use super::{non_empty, normalize, with_deadline, ListingSource, SourceError, SourceQuery};

/// Adapter over the ivanvs/craigslist-scraper actor.
///
/// The more reliable of the two backends. It reports the post body and any
/// picture URLs it found, but image coverage is spotty.
pub struct CraigslistSource {
    client: Arc<ApifyClient>,
    timeout: Duration,
}

impl CraigslistSource {
    pub fn new(client: Arc<ApifyClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn to_listing(post: CraigslistPost, category: Category) -> Listing {
        Listing {
            id: post.id,
            title: post.title,
            description: non_empty(post.post),
            url: post.url,
            price: non_empty(post.price),
            datetime: post.datetime,
            location: post.location,
            category,
            images: post.pics.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ListingSource for CraigslistSource {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<Listing>, SourceError> {
        let urls = query.search_urls()?;
        if !self.client.has_token() {
            return Err(SourceError::Auth("APIFY_API_TOKEN is required".to_string()));
        }

        let items = with_deadline(self.name(), self.timeout, self.client.scrape_craigslist(&urls)).await?;

        let category = query.category;
        let listings = normalize(self.name(), items, query.limit, |post: CraigslistPost| {
            Self::to_listing(post, category)
        });
        info!(source = self.name(), cities = ?query.cities, count = listings.len(), "Normalized listings");
        Ok(listings)
    }

    fn name(&self) -> &str {
        "craigslist"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn posts_missing_required_fields_are_dropped() {
        let items = vec![
            json!({
                "id": "1", "url": "https://sfbay.craigslist.org/1.html", "title": "Desk",
                "datetime": "2024-03-01T10:00:00Z", "location": "Oakland",
                "price": "$40", "post": "Solid oak", "pics": ["https://images.craigslist.org/1.jpg"]
            }),
            json!({ "id": "2", "url": "https://sfbay.craigslist.org/2.html", "title": "Chair" }),
            json!("not an object"),
        ];

        let listings = normalize("craigslist", items, 100, |p: CraigslistPost| {
            CraigslistSource::to_listing(p, Category::Furniture)
        });

        assert_eq!(listings.len(), 1);
        let desk = &listings[0];
        assert_eq!(desk.id, "1");
        assert_eq!(desk.description.as_deref(), Some("Solid oak"));
        assert_eq!(desk.price.as_deref(), Some("$40"));
        assert_eq!(desk.images.len(), 1);
        assert_eq!(desk.category, Category::Furniture);
    }

    #[test]
    fn output_is_capped_at_limit() {
        let items = (0..5)
            .map(|i| {
                json!({
                    "id": i.to_string(), "url": format!("https://sfbay.craigslist.org/{i}.html"),
                    "title": "Bike", "datetime": "2024-03-01", "location": "SF"
                })
            })
            .collect();
        let listings = normalize("craigslist", items, 3, |p: CraigslistPost| {
            CraigslistSource::to_listing(p, Category::Bikes)
        });
        assert_eq!(listings.len(), 3);
        assert_eq!(listings[0].id, "0");
    }

    #[tokio::test]
    async fn missing_token_fails_fast_with_auth() {
        let source = CraigslistSource::new(
            Arc::new(ApifyClient::new(String::new())),
            Duration::from_secs(1),
        );
        let query = SourceQuery::new(vec!["sfbay".to_string()], Category::Bikes);
        assert!(matches!(source.fetch(&query).await, Err(SourceError::Auth(_))));
    }

    #[tokio::test]
    async fn empty_cities_fail_before_any_call() {
        let source = CraigslistSource::new(
            Arc::new(ApifyClient::new("token".to_string())),
            Duration::from_secs(1),
        );
        let query = SourceQuery::new(vec![], Category::Bikes);
        assert!(matches!(source.fetch(&query).await, Err(SourceError::InvalidQuery(_))));
    }
}
