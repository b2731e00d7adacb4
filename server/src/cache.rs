use crate::cms::{discover_collections, CmsClient, CmsError, CmsItem};
use crate::normalize::{visible_hotels, HotelRecord, RegionIndex};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const STALE_AFTER_SECS: i64 = 30 * 60;

#[derive(Debug, Default)]
pub struct CacheSnapshot {
    pub hotels: Vec<CmsItem>,
    pub regions: Vec<CmsItem>,
    pub last_fetch: Option<DateTime<Utc>>,
    pub visible: Vec<HotelRecord>,
    pub generation: u64,
}

impl CacheSnapshot {
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match self.last_fetch {
            Some(fetched) => now.signed_duration_since(fetched).num_seconds() > STALE_AFTER_SECS,
            None => true,
        }
    }

    pub fn find_hotel(&self, slug: &str) -> Option<&HotelRecord> {
        self.visible.iter().find(|hotel| hotel.slug == slug)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed { hotels: usize, regions: usize },
    Coalesced,
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to list CMS collections: {0}")]
    Cms(#[from] CmsError),
    #[error("no {0} collection found in the CMS")]
    MissingCollection(&'static str),
}

pub struct CacheStore {
    cms: Option<CmsClient>,
    current: RwLock<Arc<CacheSnapshot>>,
    refresh_guard: Mutex<()>,
}

impl CacheStore {
    pub fn new(cms: Option<CmsClient>) -> Self {
        Self {
            cms,
            current: RwLock::new(Arc::new(CacheSnapshot::default())),
            refresh_guard: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.snapshot().is_stale_at(Utc::now())
    }

    pub fn has_source(&self) -> bool {
        self.cms.is_some()
    }

    // Concurrent callers share a single upstream fetch. On error the previous
    // snapshot stays in place.
    pub async fn refresh(&self) -> Result<RefreshOutcome, CacheError> {
        let Some(cms) = &self.cms else {
            info!(target: "cache", msg = "CMS credentials not configured; refresh skipped");
            return Ok(RefreshOutcome::Skipped);
        };

        let observed = self.snapshot().generation;
        let _guard = self.refresh_guard.lock().await;
        if self.snapshot().generation != observed {
            debug!(target: "cache", msg = "refresh already completed by a concurrent caller");
            return Ok(RefreshOutcome::Coalesced);
        }

        match self.fetch_and_install(cms).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(
                    target: "cache",
                    error = %err,
                    msg = "cache refresh failed; keeping previous snapshot"
                );
                Err(err)
            }
        }
    }

    async fn fetch_and_install(&self, cms: &CmsClient) -> Result<RefreshOutcome, CacheError> {
        let collections = cms.list_collections().await?;
        let ids = discover_collections(&collections);
        let hotels_id = ids.hotels.ok_or(CacheError::MissingCollection("hotels"))?;

        let hotels = cms.fetch_all_items(&hotels_id).await;
        let regions = match ids.regions {
            Some(regions_id) => cms.fetch_all_items(&regions_id).await,
            None => {
                warn!(target: "cache", msg = "no region collection found; regions left empty");
                Vec::new()
            }
        };

        let snapshot = self.install(hotels, regions);
        info!(
            target: "cache",
            hotels = snapshot.hotels.len(),
            visible = snapshot.visible.len(),
            regions = snapshot.regions.len(),
            generation = snapshot.generation,
            msg = "cache refreshed"
        );
        Ok(RefreshOutcome::Refreshed {
            hotels: snapshot.hotels.len(),
            regions: snapshot.regions.len(),
        })
    }

    pub fn install(&self, hotels: Vec<CmsItem>, regions: Vec<CmsItem>) -> Arc<CacheSnapshot> {
        self.install_at(hotels, regions, Utc::now())
    }

    pub(crate) fn install_at(
        &self,
        hotels: Vec<CmsItem>,
        regions: Vec<CmsItem>,
        fetched_at: DateTime<Utc>,
    ) -> Arc<CacheSnapshot> {
        let visible = visible_hotels(&hotels, &RegionIndex::from_items(&regions));
        let mut current = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let snapshot = Arc::new(CacheSnapshot {
            hotels,
            regions,
            last_fetch: Some(fetched_at),
            visible,
            generation: current.generation + 1,
        });
        *current = Arc::clone(&snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::item;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn collections_body() -> serde_json::Value {
        json!({"collections": [
            {"id": "col-types", "displayName": "Hotel Types"},
            {"id": "col-hotels", "displayName": "Hotels"},
            {"id": "col-regions", "displayName": "Regions"}
        ]})
    }

    async fn mount_items(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/collections/col-hotels/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [
                {"id": "h1", "fieldData": {"name": "Memmo Alfama", "slug": "memmo-alfama", "region": "r1"}},
                {"id": "h2", "isArchived": true, "fieldData": {"name": "Old Inn", "slug": "old-inn"}}
            ]})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/collections/col-regions/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [
                {"id": "r1", "fieldData": {"name": "Lisbon"}}
            ]})))
            .mount(server)
            .await;
    }

    fn store_for(server: &MockServer) -> CacheStore {
        let cms = CmsClient::new(&server.uri(), "site-1", "wf-token")
            .expect("client should construct")
            .with_page_delay(Duration::ZERO);
        CacheStore::new(Some(cms))
    }

    #[test]
    fn empty_snapshot_is_stale() {
        assert!(CacheSnapshot::default().is_stale_at(Utc::now()));
    }

    #[test]
    fn snapshot_goes_stale_after_thirty_minutes() {
        let store = CacheStore::new(None);
        let snapshot = store.install(vec![item("h1", json!({"name": "A"}))], Vec::new());
        let fetched = snapshot.last_fetch.expect("install stamps the fetch time");

        assert!(!snapshot.is_stale_at(fetched + ChronoDuration::minutes(29)));
        assert!(!snapshot.is_stale_at(fetched + ChronoDuration::minutes(30)));
        assert!(snapshot.is_stale_at(fetched + ChronoDuration::minutes(31)));
    }

    #[test]
    fn install_replaces_wholesale_and_bumps_generation() {
        let store = CacheStore::new(None);
        store.install(
            vec![item("h1", json!({"name": "A", "slug": "a"})), item("h2", json!({"name": "B", "slug": "b"}))],
            Vec::new(),
        );
        let held = store.snapshot();
        store.install(vec![item("h3", json!({"name": "C", "slug": "c"}))], Vec::new());

        let current = store.snapshot();
        assert_eq!(current.generation, 2);
        assert_eq!(current.visible.len(), 1);
        assert!(current.find_hotel("a").is_none());
        assert!(current.find_hotel("c").is_some());
        // Readers holding the old snapshot are unaffected by the swap.
        assert_eq!(held.visible.len(), 2);
    }

    #[test]
    fn backdated_install_is_stale() {
        let store = CacheStore::new(None);
        store.install_at(
            vec![item("h1", json!({"name": "A", "slug": "a"}))],
            Vec::new(),
            Utc::now() - ChronoDuration::minutes(45),
        );
        assert!(store.is_stale());
        assert!(store.snapshot().find_hotel("a").is_some());
    }

    #[tokio::test]
    async fn source_presence_follows_cms_client() {
        let server = MockServer::start().await;
        assert!(!CacheStore::new(None).has_source());
        assert!(store_for(&server).has_source());
    }

    #[tokio::test]
    async fn refresh_without_credentials_is_skipped() {
        let store = CacheStore::new(None);
        let outcome = store.refresh().await.expect("skip is not an error");
        assert_eq!(outcome, RefreshOutcome::Skipped);
        assert!(store.snapshot().last_fetch.is_none());
    }

    #[tokio::test]
    async fn refresh_loads_collections_and_resolves_regions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sites/site-1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(collections_body()))
            .mount(&server)
            .await;
        mount_items(&server).await;

        let store = store_for(&server);
        let outcome = store.refresh().await.expect("refresh should succeed");

        assert_eq!(outcome, RefreshOutcome::Refreshed { hotels: 2, regions: 1 });
        let snapshot = store.snapshot();
        assert!(!store.is_stale());
        assert_eq!(snapshot.visible.len(), 1, "archived hotel is hidden");
        let alfama = snapshot.find_hotel("memmo-alfama").expect("hotel present");
        assert_eq!(alfama.region, "Lisbon");
    }

    #[tokio::test]
    async fn failed_refresh_leaves_previous_snapshot_intact() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sites/site-1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(collections_body()))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sites/site-1/collections"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;
        mount_items(&server).await;

        let store = store_for(&server);
        store.refresh().await.expect("first refresh succeeds");
        let before = store.snapshot();

        let err = store.refresh().await.unwrap_err();
        assert!(matches!(err, CacheError::Cms(_)));

        let after = store.snapshot();
        assert_eq!(after.generation, before.generation);
        assert_eq!(after.last_fetch, before.last_fetch);
        assert_eq!(after.hotels.len(), before.hotels.len());
        assert_eq!(after.regions.len(), before.regions.len());
    }

    #[tokio::test]
    async fn missing_hotel_collection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sites/site-1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "collections": [{"id": "col-blog", "displayName": "Blog"}]
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let err = store.refresh().await.unwrap_err();
        assert!(matches!(err, CacheError::MissingCollection("hotels")));
        assert!(store.snapshot().last_fetch.is_none());
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_upstream_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sites/site-1/collections"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(collections_body())
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_items(&server).await;

        let store = store_for(&server);
        let (first, second) = tokio::join!(store.refresh(), store.refresh());

        let outcomes = [first.expect("first"), second.expect("second")];
        assert!(outcomes.contains(&RefreshOutcome::Coalesced));
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, RefreshOutcome::Refreshed { .. })));
        assert_eq!(store.snapshot().generation, 1);
    }
}
