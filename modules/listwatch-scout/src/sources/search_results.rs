use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use apify_client::{ApifyClient, SearchResultPost};
use listwatch_common::{Category, Listing};

use super::{
    non_empty, normalize, with_deadline, ListingSource, SourceCapabilities, SourceError,
    SourceQuery,
};

/// Adapter over the easyapi/craigslist-search-results-scraper actor.
///
/// Returns full image URLs and thumbnails, but fails or comes back empty more
/// often than [`super::CraigslistSource`].
pub struct SearchResultsSource {
    client: Arc<ApifyClient>,
    timeout: Duration,
}

impl SearchResultsSource {
    pub fn new(client: Arc<ApifyClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn to_listing(post: SearchResultPost, category: Category) -> Listing {
        let mut images: Vec<String> = post
            .image_urls
            .unwrap_or_default()
            .into_iter()
            .filter(|u| !u.trim().is_empty())
            .collect();
        if images.is_empty() {
            if let Some(thumb) = non_empty(post.thumbnail_url) {
                images.push(thumb);
            }
        }

        Listing {
            id: post.post_id,
            title: post.title,
            description: non_empty(post.description),
            url: post.post_url,
            price: non_empty(post.price),
            datetime: post.posted_time,
            location: post.location,
            category,
            images,
        }
    }
}

#[async_trait]
impl ListingSource for SearchResultsSource {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<Listing>, SourceError> {
        let urls = query.search_urls()?;
        if !self.client.has_token() {
            return Err(SourceError::Auth("APIFY_API_TOKEN is required".to_string()));
        }

        let items = with_deadline(
            self.name(),
            self.timeout,
            self.client.scrape_search_results(&urls, query.limit),
        )
        .await?;

        let category = query.category;
        let listings = normalize(self.name(), items, query.limit, |post: SearchResultPost| {
            Self::to_listing(post, category)
        });
        info!(source = self.name(), cities = ?query.cities, count = listings.len(), "Normalized listings");
        Ok(listings)
    }

    fn name(&self) -> &str {
        "search_results"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities { images: true }
    }
}
