//! Full connect / sync / browse / disconnect cycle against a scripted
//! stand-in of the Lightroom and identity endpoints.

use async_trait::async_trait;
use bridge_desktop::{FsObjectStore, InMemoryCache, SqliteEntityStore};
use bridge_traits::entity::EntityStore;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_auth::AuthError;
use core_runtime::config::{ProviderSettings, SyncEngineConfig};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, SyncEvent};
use core_service::{PhotoSyncService, ServiceDependencies, ServiceError};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const API: &str = "https://lr.adobe.io/v2/";
const TOKEN_URL: &str = "https://ims-na1.adobelogin.com/ims/token/v3";

/// Routes requests by URL and records every one it serves.
#[derive(Default)]
struct FakeLightroom {
    requests: Mutex<Vec<(HttpMethod, String)>>,
    catalog_unavailable: AtomicBool,
}

impl FakeLightroom {
    fn count(&self, predicate: impl Fn(&HttpMethod, &str) -> bool) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(method, url)| predicate(method, url))
            .count()
    }

    fn route(&self, request: &HttpRequest) -> (u16, Bytes) {
        if request.url == TOKEN_URL {
            let body = json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3600,
                "account": { "id": "acct-42" }
            });
            return (200, Bytes::from(body.to_string()));
        }
        if request.url == format!("{}/revoke", TOKEN_URL) {
            return (200, Bytes::new());
        }

        let authorized = request.headers.get("Authorization").map(String::as_str)
            == Some("Bearer at-1");
        if !authorized {
            return (401, Bytes::from_static(b"unauthorized"));
        }

        let Some(path) = request.url.strip_prefix(API) else {
            return (404, Bytes::new());
        };
        let (path, query) = path.split_once('?').unwrap_or((path, ""));
        let segments: Vec<&str> = path.split('/').collect();

        let body = match segments.as_slice() {
            ["account"] => json!({ "id": "acct-42", "email": "diver@example.com" }),
            ["catalog"] if self.catalog_unavailable.load(Ordering::SeqCst) => {
                return (404, Bytes::from_static(b"no catalog"));
            }
            ["catalog"] => json!({ "id": "cat-1", "name": "Main" }),
            ["catalogs", "cat-1", "albums"] => json!({
                "resources": [
                    { "id": "alb-1", "name": "Reef Trip", "asset_count": 3 },
                    { "id": "alb-2", "name": "Kelp Forest", "asset_count": 0 }
                ]
            }),
            ["catalogs", "cat-1", "albums", "alb-1", "assets"] if query.contains("after=p2") => {
                json!({
                    "resources": [
                        { "id": "a3", "filename": "IMG_0003.CR3", "captureDate": "2024-05-03T09:00:00" }
                    ]
                })
            }
            ["catalogs", "cat-1", "albums", "alb-1", "assets"] => json!({
                "resources": [
                    { "id": "a1", "filename": "IMG_0001.CR3", "captureDate": "2024-05-01T09:00:00" },
                    { "id": "a2", "filename": "IMG_0002.CR3", "captureDate": "2024-05-02T09:00:00" }
                ],
                "links": { "next": { "after": "p2" } }
            }),
            ["catalogs", "cat-1", "assets", id, "metadata"] => json!({
                "exif": {
                    "make": "OM System",
                    "model": "OM-1",
                    "iso": 400,
                    "gps": { "latitude": -16.5, "longitude": 145.8 }
                },
                "xmp": { "keywords": ["reef", id], "caption": "Coral garden" }
            }),
            ["catalogs", "cat-1", "assets", id, "renditions", size] => {
                json!({ "href": format!("/v2/blobs/{}/{}", id, size) })
            }
            ["blobs", id, size] => {
                return (200, Bytes::from(format!("jpeg:{}:{}", id, size)));
            }
            _ => return (404, Bytes::new()),
        };
        (200, Bytes::from(body.to_string()))
    }
}

#[async_trait]
impl HttpClient for FakeLightroom {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((request.method, request.url.clone()));
        let (status, body) = self.route(&request);
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body,
        })
    }
}

async fn service() -> (PhotoSyncService, Arc<FakeLightroom>, Arc<SqliteEntityStore>) {
    let root = std::env::temp_dir().join(format!("core-service-test-{}", uuid::Uuid::new_v4()));
    let config = SyncEngineConfig::builder()
        .provider(ProviderSettings::lightroom(
            "client-1",
            Some("secret".to_string()),
            "https://localhost:8000/callback",
        ))
        .object_store_dir(&root)
        .object_base_url("http://objects.test")
        .build()
        .unwrap();

    let http = Arc::new(FakeLightroom::default());
    let store = Arc::new(SqliteEntityStore::in_memory().await.unwrap());
    let deps = ServiceDependencies::new(
        http.clone(),
        store.clone(),
        Arc::new(FsObjectStore::new(&root, "http://objects.test")),
        Arc::new(InMemoryCache::new(1024)),
    );
    let service = PhotoSyncService::new(&config, deps, EventBus::new(64)).unwrap();
    (service, http, store)
}

#[tokio::test]
async fn test_reef_trip_lifecycle() {
    let (service, http, _) = service().await;
    let mut events = service.subscribe();

    // Nothing cached yet.
    let status = service.auth_status().await.unwrap();
    assert!(!status.connected);

    // Authorization round trip.
    let request = service.initiate_auth().await.unwrap();
    assert!(request.auth_url.contains("code_challenge_method=S256"));
    assert!(request.auth_url.contains(&format!("state={}", request.state)));

    let status = service
        .handle_callback("code-1", &request.state)
        .await
        .unwrap();
    assert!(status.connected);
    assert_eq!(status.account_id.as_deref(), Some("acct-42"));

    // A state is redeemable once.
    let replay = service.handle_callback("code-1", &request.state).await;
    assert!(matches!(
        replay,
        Err(ServiceError::Auth(AuthError::InvalidState))
    ));

    let status = service.auth_status().await.unwrap();
    assert!(status.connected);
    assert_eq!(status.account_id.as_deref(), Some("acct-42"));

    // Remote browsing.
    let remote = service.list_remote_albums().await.unwrap();
    assert_eq!(remote.catalog_id, "cat-1");
    let names: Vec<&str> = remote.albums.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Reef Trip", "Kelp Forest"]);

    // First sync ingests every asset across both pages.
    let report = service.sync_album("alb-1", "Reef Trip").await.unwrap();
    assert!(report.is_success(), "{:?}", report.error_message);
    assert_eq!(report.total_assets, 3);
    assert_eq!(report.new_assets, 3);
    assert_eq!(report.skipped_assets, 0);
    assert_eq!(report.errors, 0);

    // Second sync finds nothing new and downloads nothing.
    let downloads_before = http.count(|_, url| url.contains("/blobs/"));
    let report = service.sync_album("alb-1", "Reef Trip").await.unwrap();
    assert_eq!(report.new_assets, 0);
    assert_eq!(report.skipped_assets, 3);
    assert_eq!(http.count(|_, url| url.contains("/blobs/")), downloads_before);

    // Local reads.
    let albums = service.list_synced_albums().await.unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].id, "alb-1");
    assert_eq!(albums[0].name, "Reef Trip");
    assert_eq!(albums[0].photo_count, 3);

    let assets = service.list_album_assets("alb-1").await.unwrap();
    let ids: Vec<&str> = assets.iter().map(|a| a.asset.lightroom_id.as_str()).collect();
    assert_eq!(ids, vec!["a3", "a2", "a1"]);
    for asset in &assets {
        assert_eq!(
            asset.thumbnail_url,
            format!("http://objects.test/thumbnails/{}.jpg", asset.asset.lightroom_id)
        );
        assert_eq!(asset.asset.camera.make, "OM System");
        assert_eq!(asset.asset.latitude, Some(-16.5));
    }

    // Identification image is fetched and stored on demand.
    let details = service.get_asset_details("a1").await.unwrap().unwrap();
    assert_eq!(details.image_key, "identification/a1_2048.jpg");
    assert_eq!(details.image_size, "jpeg:a1:2048".len() as u64);
    assert_eq!(
        details.image_url,
        "http://objects.test/identification/a1_2048.jpg"
    );
    let rendered = serde_json::to_value(&details).unwrap();
    assert_eq!(rendered["lightroom_id"], "a1");
    assert!(rendered.get("image_data").is_none());

    assert!(service.get_asset_details("missing").await.unwrap().is_none());

    // Disconnect revokes and forgets the credentials.
    service.disconnect().await.unwrap();
    assert!(http.count(|method, url| *method == HttpMethod::Post && url.ends_with("/revoke")) >= 1);
    assert!(!service.auth_status().await.unwrap().connected);

    let after = service.sync_album("alb-1", "Reef Trip").await;
    assert!(matches!(after, Err(ServiceError::AuthenticationRequired)));

    // Synced data survives the disconnect.
    assert_eq!(service.list_album_assets("alb-1").await.unwrap().len(), 3);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen
        .iter()
        .any(|e| matches!(e, CoreEvent::Auth(AuthEvent::AuthorizationStarted { .. }))));
    assert!(seen.iter().any(|e| matches!(
        e,
        CoreEvent::Auth(AuthEvent::Connected { account_id: Some(id), .. }) if id == "acct-42"
    )));
    let completions: Vec<(u64, u64)> = seen
        .iter()
        .filter_map(|e| match e {
            CoreEvent::Sync(SyncEvent::Completed {
                new_assets,
                skipped_assets,
                ..
            }) => Some((*new_assets, *skipped_assets)),
            _ => None,
        })
        .collect();
    assert_eq!(completions, vec![(3, 0), (0, 3)]);
    assert!(seen
        .iter()
        .any(|e| matches!(e, CoreEvent::Auth(AuthEvent::Disconnected { .. }))));
}

#[tokio::test]
async fn test_operations_require_connection() {
    let (service, http, _) = service().await;

    assert!(matches!(
        service.list_remote_albums().await,
        Err(ServiceError::AuthenticationRequired)
    ));
    assert!(matches!(
        service.get_asset_details("a1").await,
        Err(ServiceError::AuthenticationRequired)
    ));
    assert!(service.list_synced_albums().await.unwrap().is_empty());
    assert_eq!(http.count(|_, url| url.starts_with(API)), 0);
}

#[tokio::test]
async fn test_unknown_state_is_rejected() {
    let (service, http, _) = service().await;

    let result = service.handle_callback("code-1", "never-issued").await;
    match result {
        Err(error) => assert!(error.is_authentication_required()),
        Ok(status) => panic!("unexpected status {:?}", status),
    }
    assert_eq!(http.count(|_, url| url == TOKEN_URL), 0);
}

#[tokio::test]
async fn test_catalog_failure_is_logged_as_failed_sync() {
    let (service, http, store) = service().await;
    let request = service.initiate_auth().await.unwrap();
    service
        .handle_callback("code-1", &request.state)
        .await
        .unwrap();
    http.catalog_unavailable.store(true, Ordering::SeqCst);
    let mut events = service.subscribe();

    let report = service.sync_album("alb-1", "Reef Trip").await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.total_assets, 0);
    assert!(report.error_message.as_deref().unwrap().contains("404"));

    let logs = store.list_nodes("SyncLog", &[], None, None).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].attributes["album_id"], "alb-1");
    assert!(logs[0].attributes["error_message"]
        .as_str()
        .unwrap()
        .contains("404"));

    assert!(matches!(
        events.try_recv(),
        Ok(CoreEvent::Sync(SyncEvent::Failed { album_id, .. })) if album_id == "alb-1"
    ));
    assert_eq!(http.count(|_, url| url.contains("/albums/")), 0);
}
