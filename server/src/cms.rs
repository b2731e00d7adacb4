use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const PAGE_SIZE: usize = 100;
pub const PAGE_DELAY: Duration = Duration::from_millis(200);
// Guards against an upstream that never sends a short page.
pub const MAX_PAGES: usize = 200;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsItem {
    pub id: String,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub field_data: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsCollection {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub slug: String,
}

impl CmsCollection {
    fn match_name(&self) -> String {
        let name = if self.display_name.trim().is_empty() {
            &self.slug
        } else {
            &self.display_name
        };
        name.to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionIds {
    pub hotels: Option<String>,
    pub regions: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CmsError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: StatusCode,
        url: String,
        body: String,
    },
}

#[derive(Clone)]
pub struct CmsClient {
    http: reqwest::Client,
    base_url: String,
    site_id: String,
    token: Arc<String>,
    page_delay: Duration,
}

#[derive(Deserialize)]
struct CollectionsResponse {
    #[serde(default)]
    collections: Vec<CmsCollection>,
}

#[derive(Deserialize)]
struct ItemsPage {
    #[serde(default)]
    items: Vec<CmsItem>,
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct Pagination {
    total: Option<usize>,
}

impl CmsClient {
    pub fn new(base_url: &str, site_id: &str, token: &str) -> Result<Self, CmsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            site_id: site_id.to_string(),
            token: Arc::new(token.to_string()),
            page_delay: PAGE_DELAY,
        })
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub async fn list_collections(&self) -> Result<Vec<CmsCollection>, CmsError> {
        let url = format!("{}/sites/{}/collections", self.base_url, self.site_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token.as_str())
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CmsError::UnexpectedStatus { status, url, body });
        }

        let body: CollectionsResponse = response.json().await?;
        Ok(body.collections)
    }

    // A failing page ends the walk; items gathered before it are kept.
    pub async fn fetch_all_items(&self, collection_id: &str) -> Vec<CmsItem> {
        let mut items: Vec<CmsItem> = Vec::new();

        for page in 0..MAX_PAGES {
            if page > 0 {
                tokio::time::sleep(self.page_delay).await;
            }

            let offset = page * PAGE_SIZE;
            let (batch, total) = match self.fetch_page(collection_id, offset).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(
                        target: "cms",
                        collection = collection_id,
                        offset,
                        error = %err,
                        msg = "page fetch failed; keeping items gathered so far"
                    );
                    break;
                }
            };

            let received = batch.len();
            items.extend(batch);
            debug!(target: "cms", collection = collection_id, offset, received, msg = "page fetched");

            let exhausted = total.is_some_and(|total| items.len() >= total);
            if received < PAGE_SIZE || exhausted {
                break;
            }
            if page + 1 == MAX_PAGES {
                warn!(
                    target: "cms",
                    collection = collection_id,
                    max_pages = MAX_PAGES,
                    msg = "page limit reached; collection truncated"
                );
            }
        }

        info!(
            target: "cms",
            collection = collection_id,
            count = items.len(),
            msg = "collection fetched"
        );
        items
    }

    async fn fetch_page(
        &self,
        collection_id: &str,
        offset: usize,
    ) -> Result<(Vec<CmsItem>, Option<usize>), CmsError> {
        let url = format!(
            "{}/collections/{}/items?limit={}&offset={}",
            self.base_url, collection_id, PAGE_SIZE, offset
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token.as_str())
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CmsError::UnexpectedStatus { status, url, body });
        }

        let page: ItemsPage = response.json().await?;
        let total = page.pagination.and_then(|p| p.total);
        Ok((page.items, total))
    }
}

// The first matching collection wins each role. Blank display names fall back to the slug.
pub fn discover_collections(collections: &[CmsCollection]) -> CollectionIds {
    let mut ids = CollectionIds::default();
    for collection in collections {
        let name = collection.match_name();
        if ids.hotels.is_none() && name.contains("hotel") && !name.contains("type") {
            ids.hotels = Some(collection.id.clone());
        }
        if ids.regions.is_none() && (name.contains("region") || name.contains("location")) {
            ids.regions = Some(collection.id.clone());
        }
    }
    ids
}
