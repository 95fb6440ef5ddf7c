use serde::{Deserialize, Serialize};

// --- Shared input pieces ---

/// Proxy settings accepted by every Apify actor.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyConfiguration {
    #[serde(rename = "useApifyProxy")]
    pub use_apify_proxy: bool,
}

impl Default for ProxyConfiguration {
    fn default() -> Self {
        Self {
            use_apify_proxy: true,
        }
    }
}

/// A start URL entry for actor input.
#[derive(Debug, Clone, Serialize)]
pub struct StartUrl {
    pub url: String,
}

// --- ivanvs/craigslist-scraper ---

/// Input for the ivanvs/craigslist-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct CraigslistScraperInput {
    #[serde(rename = "maxConcurrency")]
    pub max_concurrency: u32,
    #[serde(rename = "paginationEnabled")]
    pub pagination_enabled: bool,
    #[serde(rename = "proxyConfiguration")]
    pub proxy_configuration: ProxyConfiguration,
    pub urls: Vec<StartUrl>,
}

/// A single post from the craigslist-scraper dataset.
///
/// Required fields are plain `String`s so that an item missing any of them
/// fails to deserialize and can be dropped by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CraigslistPost {
    pub id: String,
    pub url: String,
    pub title: String,
    pub datetime: String,
    pub location: String,
    pub price: Option<String>,
    pub post: Option<String>,
    pub pics: Option<Vec<String>>,
}

// --- easyapi/craigslist-search-results-scraper ---

/// Input for the easyapi/craigslist-search-results-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultsScraperInput {
    #[serde(rename = "searchUrls")]
    pub search_urls: Vec<String>,
    #[serde(rename = "maxItems")]
    pub max_items: u32,
    #[serde(rename = "proxyConfiguration")]
    pub proxy_configuration: ProxyConfiguration,
}

/// A single search-result post, with image metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResultPost {
    #[serde(rename = "postId")]
    pub post_id: String,
    pub title: String,
    #[serde(rename = "postUrl")]
    pub post_url: String,
    #[serde(rename = "postedTime")]
    pub posted_time: String,
    pub location: String,
    pub price: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "thumbnailUrl")]
    pub thumbnail_url: Option<String>,
    #[serde(rename = "imageUrls")]
    pub image_urls: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn craigslist_input_uses_actor_field_names() {
        let input = CraigslistScraperInput {
            max_concurrency: 2,
            pagination_enabled: true,
            proxy_configuration: ProxyConfiguration::default(),
            urls: vec![StartUrl {
                url: "https://sfbay.craigslist.org/search/sof".to_string(),
            }],
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["maxConcurrency"], 2);
        assert_eq!(json["proxyConfiguration"]["useApifyProxy"], true);
        assert_eq!(json["urls"][0]["url"], "https://sfbay.craigslist.org/search/sof");
    }

    #[test]
    fn craigslist_post_without_location_is_rejected() {
        let raw = serde_json::json!({
            "id": "7712",
            "url": "https://sfbay.craigslist.org/sof/d/7712.html",
            "title": "Rust engineer",
            "datetime": "2024-03-01T10:00:00Z"
        });
        assert!(serde_json::from_value::<CraigslistPost>(raw).is_err());
    }

    #[test]
    fn craigslist_post_with_non_string_id_is_rejected() {
        let raw = serde_json::json!({
            "id": 7712,
            "url": "https://sfbay.craigslist.org/sof/d/7712.html",
            "title": "Rust engineer",
            "datetime": "2024-03-01T10:00:00Z",
            "location": "SF"
        });
        assert!(serde_json::from_value::<CraigslistPost>(raw).is_err());
    }

    #[test]
    fn search_result_post_optional_fields_default_to_none() {
        let raw = serde_json::json!({
            "postId": "p1",
            "title": "MacBook Pro 2019",
            "postUrl": "https://sfbay.craigslist.org/sfc/sys/d/p1.html",
            "postedTime": "2024-03-01 10:00",
            "location": "SF"
        });
        let post: SearchResultPost = serde_json::from_value(raw).unwrap();
        assert_eq!(post.post_id, "p1");
        assert!(post.image_urls.is_none());
        assert!(post.thumbnail_url.is_none());
    }
}
