//! Integration tests for the portal backend.
//!
//! Each test spins up the full router against a temp SQLite database plus
//! in-process mock servers standing in for the hosting provider and the blob
//! store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::deploy::{DeployService, HostingClient};
use crate::storage::BlobStore;
use crate::{create_router, AppState};

// ==================== MOCK HOSTING PROVIDER ====================

#[derive(Default)]
struct MockHosting {
    /// (id, name) pairs.
    projects: Mutex<Vec<(String, String)>>,
    /// (id, url) of the most recent deployment.
    last_deployment: Mutex<Option<(String, String)>>,
    /// State reported by the deployment listing; BUILDING when unset.
    latest_state: Mutex<String>,
    /// Files array of the most recent deployment request.
    last_files: Mutex<Option<Value>>,
    fail_deployments: AtomicBool,
    project_creates: AtomicUsize,
    deploy_counter: AtomicUsize,
}

async fn mock_create_project(
    State(hosting): State<Arc<MockHosting>>,
    Json(body): Json<Value>,
) -> Response {
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let mut projects = hosting.projects.lock().unwrap();
    if projects.iter().any(|(_, n)| n == &name) {
        return (StatusCode::CONFLICT, Json(json!({ "error": "name taken" }))).into_response();
    }
    let id = format!("prj_{}", projects.len() + 1);
    hosting.project_creates.fetch_add(1, Ordering::SeqCst);
    projects.push((id.clone(), name.clone()));
    Json(json!({ "id": id, "name": name })).into_response()
}

async fn mock_list_projects(State(hosting): State<Arc<MockHosting>>) -> Json<Value> {
    let projects: Vec<Value> = hosting
        .projects
        .lock()
        .unwrap()
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    Json(json!({ "projects": projects }))
}

async fn mock_get_project(
    State(hosting): State<Arc<MockHosting>>,
    Path(id): Path<String>,
) -> Response {
    let projects = hosting.projects.lock().unwrap();
    match projects.iter().find(|(pid, _)| pid == &id) {
        Some((pid, name)) => Json(json!({ "id": pid, "name": name })).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn mock_rename_project(
    State(hosting): State<Arc<MockHosting>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let mut projects = hosting.projects.lock().unwrap();
    if let Some(entry) = projects.iter_mut().find(|(pid, _)| pid == &id) {
        entry.1 = name;
    }
    Json(json!({}))
}

async fn mock_set_env(Path(_id): Path<String>) -> Json<Value> {
    Json(json!({}))
}

async fn mock_create_deployment(
    State(hosting): State<Arc<MockHosting>>,
    Json(body): Json<Value>,
) -> Response {
    if hosting.fail_deployments.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "build backlog").into_response();
    }
    let n = hosting.deploy_counter.fetch_add(1, Ordering::SeqCst) + 1;
    let id = format!("dep_{}", n);
    // Bare host, no scheme; the backend is expected to normalize it
    let url = format!("deploy-{}.hosting.test", n);
    *hosting.last_deployment.lock().unwrap() = Some((id.clone(), url.clone()));
    *hosting.last_files.lock().unwrap() = Some(body["files"].clone());
    Json(json!({ "id": id, "url": url, "state": "QUEUED" })).into_response()
}

async fn mock_list_deployments(State(hosting): State<Arc<MockHosting>>) -> Json<Value> {
    let last = hosting.last_deployment.lock().unwrap().clone();
    match last {
        Some((id, url)) => {
            let state = hosting.latest_state.lock().unwrap().clone();
            let state = if state.is_empty() {
                "BUILDING".to_string()
            } else {
                state
            };
            Json(json!({
                "deployments": [{ "id": id, "url": url, "state": state }]
            }))
        }
        None => Json(json!({ "deployments": [] })),
    }
}

async fn spawn_mock_hosting() -> (String, Arc<MockHosting>) {
    let hosting = Arc::new(MockHosting::default());
    let app = Router::new()
        .route(
            "/v1/projects",
            post(mock_create_project).get(mock_list_projects),
        )
        .route(
            "/v1/projects/{id}",
            get(mock_get_project).patch(mock_rename_project),
        )
        .route("/v1/projects/{id}/env", post(mock_set_env))
        .route(
            "/v1/deployments",
            post(mock_create_deployment).get(mock_list_deployments),
        )
        .with_state(hosting.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), hosting)
}

// ==================== MOCK BLOB STORE ====================

async fn mock_blob_put(
    State(base): State<String>,
    Path((site, file)): Path<(String, String)>,
) -> Json<Value> {
    Json(json!({ "url": format!("{}/o/{}/{}", base, site, file) }))
}

async fn mock_blob_delete(Path((_site, _file)): Path<(String, String)>) -> StatusCode {
    StatusCode::OK
}

async fn spawn_mock_blob() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{}", addr);

    let app = Router::new()
        .route(
            "/o/{site}/{file}",
            put(mock_blob_put).delete(mock_blob_delete),
        )
        .with_state(base.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

// ==================== TEST FIXTURE ====================

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    blob_url: String,
    hosting: Arc<MockHosting>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_key(Some("test-api-key".to_string())).await
    }

    async fn with_key(key: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let templates_dir = temp_dir.path().join("templates");
        std::fs::create_dir_all(&templates_dir).expect("Failed to create templates dir");

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Repository::new(pool);

        let (hosting_url, hosting) = spawn_mock_hosting().await;
        let blob_url = spawn_mock_blob().await;

        let config = Config {
            admin_api_key: key.clone(),
            db_path,
            templates_dir: templates_dir.clone(),
            hosting_api_url: hosting_url.clone(),
            hosting_api_token: "host-token".to_string(),
            blob_store_url: blob_url.clone(),
            blob_store_token: "blob-token".to_string(),
            upload_token_secret: "test-secret".to_string(),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
        };

        let storage = BlobStore::new(
            &config.blob_store_url,
            &config.blob_store_token,
            &config.upload_token_secret,
        );
        let hosting_client = HostingClient::new(&config.hosting_api_url, &config.hosting_api_token);
        let deploy = DeployService::new(repo.clone(), hosting_client, templates_dir);

        let state = AppState {
            repo: Arc::new(repo),
            storage: Arc::new(storage),
            deploy: Arc::new(deploy),
            config: Arc::new(config),
        };

        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = key {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            blob_url,
            hosting,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create a template row and a site wired to it, ready to deploy.
    async fn create_collectible_site(&self, name: &str, slug: &str) -> Value {
        let template_resp = self
            .client
            .post(self.url("/api/templates"))
            .json(&json!({ "name": "collectible-campaign" }))
            .send()
            .await
            .unwrap();
        assert_eq!(template_resp.status(), 201);
        let template: Value = template_resp.json().await.unwrap();

        let site_resp = self
            .client
            .post(self.url("/api/sites"))
            .json(&json!({
                "name": name,
                "displayName": name,
                "slug": slug,
                "templateId": template["id"]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(site_resp.status(), 201);
        site_resp.json().await.unwrap()
    }

    async fn get_site(&self, site_id: &str) -> Value {
        let resp = self
            .client
            .get(self.url(&format!("/api/sites/{}", site_id)))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }
}

// ==================== HEALTH AND AUTH ====================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_key() {
    let fixture = TestFixture::new().await;

    // Bare client without the default x-api-key header
    let client = Client::new();
    let resp = client
        .get(fixture.url("/api/sites"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["details"]["code"], "UNAUTHORIZED");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_auth_invalid_key() {
    let fixture = TestFixture::new().await;

    let client = Client::new();
    let resp = client
        .get(fixture.url("/api/sites"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_auth_bearer_token_accepted() {
    let fixture = TestFixture::new().await;

    let client = Client::new();
    let resp = client
        .get(fixture.url("/api/sites"))
        .header("authorization", "Bearer test-api-key")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_auth_disabled_without_configured_key() {
    let fixture = TestFixture::with_key(None).await;

    let resp = fixture
        .client
        .get(fixture.url("/api/sites"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

// ==================== SITES ====================

#[tokio::test]
async fn test_site_crud() {
    let fixture = TestFixture::new().await;

    // Create
    let create_resp = fixture
        .client
        .post(fixture.url("/api/sites"))
        .json(&json!({
            "name": "tour",
            "displayName": "Tour 2026",
            "slug": "tour-2026"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(create_resp.status(), 201);
    let site: Value = create_resp.json().await.unwrap();
    let site_id = site["id"].as_str().unwrap();
    assert_eq!(site["status"], "draft");
    assert_eq!(site["deploymentStatus"], "idle");

    // Get
    let get_body = fixture.get_site(site_id).await;
    assert_eq!(get_body["slug"], "tour-2026");

    // Update
    let update_resp = fixture
        .client
        .patch(fixture.url(&format!("/api/sites/{}", site_id)))
        .json(&json!({ "displayName": "World Tour 2026", "status": "published" }))
        .send()
        .await
        .unwrap();
    assert_eq!(update_resp.status(), 200);
    let updated: Value = update_resp.json().await.unwrap();
    assert_eq!(updated["displayName"], "World Tour 2026");
    assert_eq!(updated["status"], "published");

    // List
    let list_resp = fixture
        .client
        .get(fixture.url("/api/sites"))
        .send()
        .await
        .unwrap();
    assert_eq!(list_resp.status(), 200);
    let list: Value = list_resp.json().await.unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);

    // Delete
    let delete_resp = fixture
        .client
        .delete(fixture.url(&format!("/api/sites/{}", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(delete_resp.status(), 200);

    let get_deleted = fixture
        .client
        .get(fixture.url(&format!("/api/sites/{}", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(get_deleted.status(), 404);
}

#[tokio::test]
async fn test_slug_conflict() {
    let fixture = TestFixture::new().await;

    let first = fixture
        .client
        .post(fixture.url("/api/sites"))
        .json(&json!({ "name": "a", "displayName": "A", "slug": "tour" }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 201);

    let second = fixture
        .client
        .post(fixture.url("/api/sites"))
        .json(&json!({ "name": "b", "displayName": "B", "slug": "tour" }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 409);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["details"]["code"], "CONFLICT");
    assert!(body["error"].as_str().unwrap().contains("tour"));
}

#[tokio::test]
async fn test_slug_charset_validation() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/sites"))
        .json(&json!({ "name": "a", "displayName": "A", "slug": "Tour 2026!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["details"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_patch_enforces_slug_charset() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    let resp = fixture
        .client
        .patch(fixture.url(&format!("/api/sites/{}", site_id)))
        .json(&json!({ "slug": "Bad Slug!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["details"]["code"], "VALIDATION_ERROR");

    // Original slug survives the rejected patch
    let after = fixture.get_site(site_id).await;
    assert_eq!(after["slug"], "tour");
}

#[tokio::test]
async fn test_patch_rejects_unknown_template() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();
    let template_id = site["templateId"].as_str().unwrap().to_string();

    let resp = fixture
        .client
        .patch(fixture.url(&format!("/api/sites/{}", site_id)))
        .json(&json!({ "templateId": "no-such-template" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["details"]["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("no-such-template"));

    let after = fixture.get_site(site_id).await;
    assert_eq!(after["templateId"], template_id);
}

// ==================== CONTENT ====================

#[tokio::test]
async fn test_content_crud_grouped_and_ordered() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    // Create out of order within the hero section
    for (order, title) in [(2, "Second"), (1, "First")] {
        let resp = fixture
            .client
            .post(fixture.url(&format!("/api/sites/{}/content", site_id)))
            .json(&json!({
                "section": "hero",
                "order": order,
                "body": { "contentType": "hero", "title": title }
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }
    let desc_resp = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/content", site_id)))
        .json(&json!({
            "section": "description",
            "order": 0,
            "body": { "contentType": "text", "text": "On sale now" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(desc_resp.status(), 201);
    let desc: Value = desc_resp.json().await.unwrap();

    // Grouped listing, each section ascending by order
    let list_resp = fixture
        .client
        .get(fixture.url(&format!("/api/sites/{}/content", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(list_resp.status(), 200);
    let grouped: Value = list_resp.json().await.unwrap();
    let hero = grouped["hero"].as_array().unwrap();
    assert_eq!(hero.len(), 2);
    assert_eq!(hero[0]["body"]["title"], "First");
    assert_eq!(hero[1]["body"]["title"], "Second");
    assert_eq!(grouped["description"].as_array().unwrap().len(), 1);

    // Update
    let item_id = desc["id"].as_str().unwrap();
    let update_resp = fixture
        .client
        .patch(fixture.url(&format!("/api/content/{}", item_id)))
        .json(&json!({ "visible": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(update_resp.status(), 200);
    let updated: Value = update_resp.json().await.unwrap();
    assert_eq!(updated["visible"], false);

    // Delete
    let delete_resp = fixture
        .client
        .delete(fixture.url(&format!("/api/content/{}", item_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(delete_resp.status(), 200);
}

#[tokio::test]
async fn test_content_unknown_type_rejected() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/content", site_id)))
        .json(&json!({
            "section": "hero",
            "body": { "contentType": "marquee", "text": "hi" }
        }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_content_requires_existing_site() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/sites/no-such-site/content"))
        .json(&json!({
            "section": "hero",
            "body": { "contentType": "text", "text": "hi" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ==================== CARD MANIFESTS ====================

#[tokio::test]
async fn test_card_crud_and_validation() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    // Dimension validation
    let invalid = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/cards", site_id)))
        .json(&json!({
            "manifest": { "widthMm": 0, "heightMm": 88, "frontImageUrl": "https://x/front.png" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);

    // Create
    let create_resp = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/cards", site_id)))
        .json(&json!({
            "manifest": {
                "widthMm": 63.0,
                "heightMm": 88.0,
                "frontImageUrl": "https://x/front.png",
                "foil": true
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(create_resp.status(), 201);
    let card: Value = create_resp.json().await.unwrap();
    let card_id = card["id"].as_str().unwrap();
    assert_eq!(card["active"], true);
    assert_eq!(card["manifest"]["foil"], true);

    // Deactivate
    let update_resp = fixture
        .client
        .patch(fixture.url(&format!("/api/cards/{}", card_id)))
        .json(&json!({ "active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(update_resp.status(), 200);
    let updated: Value = update_resp.json().await.unwrap();
    assert_eq!(updated["active"], false);

    // List and delete
    let list_resp = fixture
        .client
        .get(fixture.url(&format!("/api/sites/{}/cards", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(list_resp.status(), 200);
    assert_eq!(
        list_resp.json::<Value>().await.unwrap().as_array().unwrap().len(),
        1
    );

    let delete_resp = fixture
        .client
        .delete(fixture.url(&format!("/api/cards/{}", card_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(delete_resp.status(), 200);
}

// ==================== ASSETS ====================

#[tokio::test]
async fn test_asset_upload_and_delete() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    let bytes = b"fake png bytes".to_vec();
    let part = reqwest::multipart::Part::bytes(bytes.clone())
        .file_name("cover.png")
        .mime_str("image/png")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("file", part);

    let upload_resp = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/assets/upload", site_id)))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(upload_resp.status(), 201);
    let asset: Value = upload_resp.json().await.unwrap();
    assert_eq!(asset["kind"], "image");
    assert_eq!(asset["size"], bytes.len() as i64);
    assert_eq!(
        asset["url"],
        format!("{}/o/{}/cover.png", fixture.blob_url, site_id)
    );

    // Listed under the site
    let list_resp = fixture
        .client
        .get(fixture.url(&format!("/api/sites/{}/assets", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(
        list_resp.json::<Value>().await.unwrap().as_array().unwrap().len(),
        1
    );

    // Delete removes the row (and the blob, against the mock store)
    let asset_id = asset["id"].as_str().unwrap();
    let delete_resp = fixture
        .client
        .delete(fixture.url(&format!("/api/assets/{}", asset_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(delete_resp.status(), 200);

    let get_resp = fixture
        .client
        .get(fixture.url(&format!("/api/assets/{}", asset_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(get_resp.status(), 404);
}

#[tokio::test]
async fn test_direct_upload_token_flow() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    let token_resp = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/assets/upload-token", site_id)))
        .json(&json!({ "filename": "art.png" }))
        .send()
        .await
        .unwrap();
    assert_eq!(token_resp.status(), 200);
    let grant: Value = token_resp.json().await.unwrap();
    let token = grant["token"].as_str().unwrap();
    assert!(grant["uploadUrl"].as_str().unwrap().contains(site_id));

    // First completion creates the asset, size known only now
    let object_url = format!("{}/o/{}/art.png", fixture.blob_url, site_id);
    let complete_resp = fixture
        .client
        .post(fixture.url("/api/assets/upload-complete"))
        .json(&json!({
            "token": token,
            "url": object_url,
            "contentType": "image/png",
            "size": 1234
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(complete_resp.status(), 201);
    let asset: Value = complete_resp.json().await.unwrap();
    assert_eq!(asset["siteId"], *site_id);
    assert_eq!(asset["size"], 1234);

    // Replaying the callback updates in place instead of duplicating
    let replay_resp = fixture
        .client
        .post(fixture.url("/api/assets/upload-complete"))
        .json(&json!({ "token": token, "url": object_url, "size": 4321 }))
        .send()
        .await
        .unwrap();
    assert_eq!(replay_resp.status(), 200);
    let replayed: Value = replay_resp.json().await.unwrap();
    assert_eq!(replayed["id"], asset["id"]);
    assert_eq!(replayed["size"], 4321);
}

#[tokio::test]
async fn test_upload_complete_rejects_forged_token() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/assets/upload-complete"))
        .json(&json!({ "token": "bm90.dmFsaWQ", "url": "https://x/o/a/b.png" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status() == 400 || resp.status() == 401);
}

#[tokio::test]
async fn test_upload_complete_scoped_to_granted_object() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    let first_grant: Value = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/assets/upload-token", site_id)))
        .json(&json!({ "filename": "a.png" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first_token = first_grant["token"].as_str().unwrap();
    let first_url = format!("{}/o/{}/a.png", fixture.blob_url, site_id);
    let create_resp = fixture
        .client
        .post(fixture.url("/api/assets/upload-complete"))
        .json(&json!({ "token": first_token, "url": first_url, "size": 100 }))
        .send()
        .await
        .unwrap();
    assert_eq!(create_resp.status(), 201);
    let asset: Value = create_resp.json().await.unwrap();

    // A token granted for a different filename must not touch this row
    let other_grant: Value = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/assets/upload-token", site_id)))
        .json(&json!({ "filename": "b.png" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let other_token = other_grant["token"].as_str().unwrap();
    let forged_resp = fixture
        .client
        .post(fixture.url("/api/assets/upload-complete"))
        .json(&json!({ "token": other_token, "url": first_url, "size": 9999 }))
        .send()
        .await
        .unwrap();
    assert_eq!(forged_resp.status(), 400);

    let unchanged = fixture
        .client
        .get(fixture.url(&format!("/api/assets/{}", asset["id"].as_str().unwrap())))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(unchanged["size"], 100);
}

// ==================== DEPLOYMENT ====================

#[tokio::test]
async fn test_deploy_creates_project_and_deployment() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/deploy", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let deployed: Value = resp.json().await.unwrap();
    assert_eq!(deployed["deploymentStatus"], "building");
    assert_eq!(deployed["hostingProjectId"], "prj_1");
    assert_eq!(deployed["hostingDeploymentId"], "dep_1");
    // Bare host from the provider comes back normalized
    assert_eq!(deployed["deploymentUrl"], "https://deploy-1.hosting.test");
    assert!(deployed["lastDeployedAt"].is_string());
}

#[tokio::test]
async fn test_redeploy_reuses_remote_project() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    for _ in 0..2 {
        let resp = fixture
            .client
            .post(fixture.url(&format!("/api/sites/{}/deploy", site_id)))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);
    }

    assert_eq!(fixture.hosting.project_creates.load(Ordering::SeqCst), 1);
    let site = fixture.get_site(site_id).await;
    assert_eq!(site["hostingProjectId"], "prj_1");
    assert_eq!(site["hostingDeploymentId"], "dep_2");
}

#[tokio::test]
async fn test_deploy_adopts_existing_remote_project() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    // A project with the site's name already exists remotely
    fixture
        .hosting
        .projects
        .lock()
        .unwrap()
        .push(("prj_seeded".to_string(), "tour".to_string()));

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/deploy", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let site = fixture.get_site(site_id).await;
    assert_eq!(site["hostingProjectId"], "prj_seeded");
    assert_eq!(fixture.hosting.projects.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_deploy_without_template_leaves_status_untouched() {
    let fixture = TestFixture::new().await;

    let create_resp = fixture
        .client
        .post(fixture.url("/api/sites"))
        .json(&json!({ "name": "bare", "displayName": "Bare", "slug": "bare" }))
        .send()
        .await
        .unwrap();
    let site: Value = create_resp.json().await.unwrap();
    let site_id = site["id"].as_str().unwrap();

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/deploy", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("no template"));

    // Generation failed before any bookkeeping write
    let site = fixture.get_site(site_id).await;
    assert_eq!(site["deploymentStatus"], "idle");
    assert!(site.get("hostingProjectId").is_none());
    assert!(fixture.hosting.projects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_deploy_failure_persists_error_status() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    fixture.hosting.fail_deployments.store(true, Ordering::SeqCst);

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/deploy", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["details"]["code"], "UPSTREAM_ERROR");

    let site = fixture.get_site(site_id).await;
    assert_eq!(site["deploymentStatus"], "error");
}

#[tokio::test]
async fn test_generated_page_keeps_user_markup_in_string_literals() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/content", site_id)))
        .json(&json!({
            "section": "hero",
            "body": { "contentType": "hero", "title": "<script>alert(1)</script>" }
        }))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/deploy", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    // Inspect the files the provider actually received
    let files = fixture.hosting.last_files.lock().unwrap().clone().unwrap();
    let page = files
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["file"] == "app/page.tsx")
        .expect("page.tsx missing from deployment");
    let data = page["data"].as_str().unwrap();
    assert!(data.contains(r#"<h1>{"<script>alert(1)</script>"}</h1>"#));
    assert!(!data.contains("<h1><script>"));
    assert_eq!(page["encoding"], "utf-8");
}

#[tokio::test]
async fn test_deployment_status_reconciliation() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/deploy", site_id)))
        .send()
        .await
        .unwrap();

    *fixture.hosting.latest_state.lock().unwrap() = "READY".to_string();

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/sites/{}/deployment", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let site: Value = resp.json().await.unwrap();
    assert_eq!(site["deploymentStatus"], "ready");
    assert!(site["deploymentUrl"]
        .as_str()
        .unwrap()
        .starts_with("https://"));
}

#[tokio::test]
async fn test_deployment_status_for_undeployed_site() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/sites/{}/deployment", site_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("never been deployed"));
}

// ==================== WEBHOOKS ====================

#[tokio::test]
async fn test_webhook_resolves_site_by_deployment_id() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/deploy", site_id)))
        .send()
        .await
        .unwrap();
    let deployment_id = fixture.get_site(site_id).await["hostingDeploymentId"]
        .as_str()
        .unwrap()
        .to_string();

    // The provider sends webhooks without credentials
    let client = Client::new();
    let resp = client
        .post(fixture.url("/api/webhooks/deployment"))
        .json(&json!({
            "type": "deployment.ready",
            "payload": {
                "deployment": { "id": deployment_id, "url": "final.hosting.test" }
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["received"], true);

    let site = fixture.get_site(site_id).await;
    assert_eq!(site["deploymentStatus"], "ready");
    assert_eq!(site["deploymentUrl"], "https://final.hosting.test");
}

#[tokio::test]
async fn test_webhook_falls_back_to_project_id() {
    let fixture = TestFixture::new().await;
    let site = fixture.create_collectible_site("tour", "tour").await;
    let site_id = site["id"].as_str().unwrap();

    fixture
        .client
        .post(fixture.url(&format!("/api/sites/{}/deploy", site_id)))
        .send()
        .await
        .unwrap();
    let project_id = fixture.get_site(site_id).await["hostingProjectId"]
        .as_str()
        .unwrap()
        .to_string();

    let client = Client::new();
    let resp = client
        .post(fixture.url("/api/webhooks/deployment"))
        .json(&json!({
            "type": "deployment.failed",
            "payload": { "project": { "id": project_id } }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let site = fixture.get_site(site_id).await;
    assert_eq!(site["deploymentStatus"], "error");
}

#[tokio::test]
async fn test_webhook_for_unknown_site_still_acknowledged() {
    let fixture = TestFixture::new().await;

    let client = Client::new();
    let resp = client
        .post(fixture.url("/api/webhooks/deployment"))
        .json(&json!({
            "type": "deployment.ready",
            "payload": { "deployment": { "id": "dep_unknown" } }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["received"], true);
}

// ==================== POINTS ====================

#[tokio::test]
async fn test_point_rules_and_ledger() {
    let fixture = TestFixture::new().await;

    // Create rule
    let rule_resp = fixture
        .client
        .post(fixture.url("/api/points/rules"))
        .json(&json!({ "name": "Check-in bonus", "points": 50, "source": "event_checkin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(rule_resp.status(), 201);
    let rule: Value = rule_resp.json().await.unwrap();
    let rule_id = rule["id"].as_str().unwrap();

    // Update rule
    let update_resp = fixture
        .client
        .patch(fixture.url(&format!("/api/points/rules/{}", rule_id)))
        .json(&json!({ "points": 75 }))
        .send()
        .await
        .unwrap();
    assert_eq!(update_resp.status(), 200);
    assert_eq!(update_resp.json::<Value>().await.unwrap()["points"], 75);

    // Append transactions for two users
    for (user, delta) in [("fan-1", 75), ("fan-2", 20)] {
        let tx_resp = fixture
            .client
            .post(fixture.url("/api/points/transactions"))
            .json(&json!({
                "userId": user,
                "delta": delta,
                "txType": "earn",
                "source": "event_checkin"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(tx_resp.status(), 201);
    }

    // Filtered listing
    let list_resp = fixture
        .client
        .get(fixture.url("/api/points/transactions?userId=fan-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(list_resp.status(), 200);
    let transactions: Value = list_resp.json().await.unwrap();
    let transactions = transactions.as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["delta"], 75);

    // Unfiltered listing sees both
    let all_resp = fixture
        .client
        .get(fixture.url("/api/points/transactions"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        all_resp.json::<Value>().await.unwrap().as_array().unwrap().len(),
        2
    );
}

// ==================== EVENTS AND CHECK-INS ====================

#[tokio::test]
async fn test_event_window_validation() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/events"))
        .json(&json!({
            "name": "Backwards",
            "startsAt": "2026-09-01T20:00:00Z",
            "endsAt": "2026-09-01T18:00:00Z"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_checkin_geofenced_event() {
    let fixture = TestFixture::new().await;

    // Check-ins award points via the matching rule
    fixture
        .client
        .post(fixture.url("/api/points/rules"))
        .json(&json!({ "name": "Check-in bonus", "points": 50, "source": "event_checkin" }))
        .send()
        .await
        .unwrap();

    let starts = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let ends = (Utc::now() + Duration::hours(1)).to_rfc3339();
    let event_resp = fixture
        .client
        .post(fixture.url("/api/events"))
        .json(&json!({
            "name": "Release party",
            "startsAt": starts,
            "endsAt": ends,
            "geofence": {
                "shape": "circle",
                "center": { "lat": 40.7128, "lng": -74.0060 },
                "radiusM": 500.0
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(event_resp.status(), 201);
    let event: Value = event_resp.json().await.unwrap();
    let event_id = event["id"].as_str().unwrap();

    // No coordinates
    let missing = fixture
        .client
        .post(fixture.url(&format!("/api/events/{}/checkin", event_id)))
        .json(&json!({ "userId": "fan-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 400);

    // Outside the fence
    let outside = fixture
        .client
        .post(fixture.url(&format!("/api/events/{}/checkin", event_id)))
        .json(&json!({ "userId": "fan-1", "lat": 40.8000, "lng": -74.0060 }))
        .send()
        .await
        .unwrap();
    assert_eq!(outside.status(), 400);
    let outside_body: Value = outside.json().await.unwrap();
    assert!(outside_body["error"].as_str().unwrap().contains("outside"));

    // Inside the fence
    let inside = fixture
        .client
        .post(fixture.url(&format!("/api/events/{}/checkin", event_id)))
        .json(&json!({ "userId": "fan-1", "lat": 40.7130, "lng": -74.0055 }))
        .send()
        .await
        .unwrap();
    assert_eq!(inside.status(), 201);
    let checkin: Value = inside.json().await.unwrap();
    assert_eq!(checkin["pointsAwarded"], 50);

    // The ledger picked up the award
    let ledger_resp = fixture
        .client
        .get(fixture.url("/api/points/transactions?userId=fan-1"))
        .send()
        .await
        .unwrap();
    let ledger: Value = ledger_resp.json().await.unwrap();
    let entries = ledger.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["delta"], 50);
    assert_eq!(entries[0]["source"], "event_checkin");
    assert_eq!(entries[0]["metadata"]["eventId"], *event_id);

    // Check-in listing
    let checkins_resp = fixture
        .client
        .get(fixture.url(&format!("/api/events/{}/checkins", event_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(
        checkins_resp.json::<Value>().await.unwrap().as_array().unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_checkin_outside_time_window() {
    let fixture = TestFixture::new().await;

    let starts = (Utc::now() - Duration::hours(3)).to_rfc3339();
    let ends = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let event_resp = fixture
        .client
        .post(fixture.url("/api/events"))
        .json(&json!({ "name": "Over", "startsAt": starts, "endsAt": ends }))
        .send()
        .await
        .unwrap();
    let event: Value = event_resp.json().await.unwrap();
    let event_id = event["id"].as_str().unwrap();

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/events/{}/checkin", event_id)))
        .json(&json!({ "userId": "fan-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Event is not active");
}

#[tokio::test]
async fn test_checkin_without_geofence_needs_no_location() {
    let fixture = TestFixture::new().await;

    let starts = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let ends = (Utc::now() + Duration::hours(1)).to_rfc3339();
    let event_resp = fixture
        .client
        .post(fixture.url("/api/events"))
        .json(&json!({ "name": "Open doors", "startsAt": starts, "endsAt": ends }))
        .send()
        .await
        .unwrap();
    let event: Value = event_resp.json().await.unwrap();
    let event_id = event["id"].as_str().unwrap();

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/events/{}/checkin", event_id)))
        .json(&json!({ "userId": "fan-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    // No matching rule exists, so nothing is awarded
    let checkin: Value = resp.json().await.unwrap();
    assert_eq!(checkin["pointsAwarded"], 0);
}

// ==================== TEMPLATES ====================

#[tokio::test]
async fn test_template_crud_and_name_conflict() {
    let fixture = TestFixture::new().await;

    let create_resp = fixture
        .client
        .post(fixture.url("/api/templates"))
        .json(&json!({ "name": "collectible-campaign", "description": "Card drop" }))
        .send()
        .await
        .unwrap();
    assert_eq!(create_resp.status(), 201);
    let template: Value = create_resp.json().await.unwrap();
    let template_id = template["id"].as_str().unwrap();

    let dup_resp = fixture
        .client
        .post(fixture.url("/api/templates"))
        .json(&json!({ "name": "collectible-campaign" }))
        .send()
        .await
        .unwrap();
    assert_eq!(dup_resp.status(), 409);

    let update_resp = fixture
        .client
        .patch(fixture.url(&format!("/api/templates/{}", template_id)))
        .json(&json!({ "description": "Updated" }))
        .send()
        .await
        .unwrap();
    assert_eq!(update_resp.status(), 200);

    let delete_resp = fixture
        .client
        .delete(fixture.url(&format!("/api/templates/{}", template_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(delete_resp.status(), 200);
}

#[tokio::test]
async fn test_site_creation_rejects_missing_template() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/sites"))
        .json(&json!({
            "name": "tour",
            "displayName": "Tour",
            "slug": "tour",
            "templateId": "no-such-template"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
