//! API integration tests
//!
//! The router tests run in-process against a lazily connected pool and only
//! exercise paths that are rejected before any query is issued. The tests
//! marked `#[ignore]` need a running server with a bootstrap administrator.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use musicat_server::{
    api,
    config::AppConfig,
    models::{enums::UserRole, user::UserClaims},
    repository::Repository,
    services::Services,
    AppState,
};

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn test_app() -> (Router, AppConfig) {
    let config = AppConfig::default();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .expect("lazy pool");
    let services = Services::new(Repository::new(pool), &config);
    let state = AppState {
        config: Arc::new(config.clone()),
        services: Arc::new(services),
    };
    (api::router(state), config)
}

fn token_for(config: &AppConfig, role: UserRole) -> String {
    let now = Utc::now().timestamp();
    UserClaims {
        sub: "tester".to_string(),
        user_id: 1,
        role,
        exp: now + 3600,
        iat: now,
    }
    .create_token(&config.auth.jwt_secret)
    .expect("token")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn test_health_check_in_process() {
    let (app, _) = test_app();

    let response = app
        .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_works_require_token() {
    let (app, _) = test_app();

    let response = app
        .oneshot(Request::get("/api/v1/works").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], 2);
}

#[tokio::test]
async fn test_bad_token_rejected() {
    let (app, _) = test_app();

    let response = app
        .oneshot(
            Request::get("/api/v1/works/1")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_rejected() {
    let (app, mut config) = test_app();
    config.auth.jwt_secret = "some-other-secret".to_string();
    let token = token_for(&config, UserRole::Admin);

    let response = app
        .oneshot(
            Request::get("/api/v1/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_authority_vocabulary() {
    let (app, config) = test_app();
    let token = token_for(&config, UserRole::Cataloger);

    let response = app
        .oneshot(
            Request::get("/api/v1/authorities/composers")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_management_requires_admin() {
    let (app, config) = test_app();
    let token = token_for(&config, UserRole::Cataloger);

    let response = app
        .oneshot(
            Request::get("/api/v1/users")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_purge_requires_admin() {
    let (app, config) = test_app();
    let token = token_for(&config, UserRole::Cataloger);

    let response = app
        .oneshot(
            Request::post("/api/v1/admin/purge")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let (app, _) = test_app();

    let response = app
        .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"]["/works/{id}/marc"].is_object());
}

// ---------------------------------------------------------------------------
// Live server tests
// ---------------------------------------------------------------------------

/// Helper to get an authenticated client
async fn get_auth_token(client: &Client) -> String {
    let password = std::env::var("MUSICAT_ADMIN_PASSWORD").unwrap_or_else(|_| "admin-password".to_string());
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "login": "admin",
            "password": password
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "login": "admin",
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

async fn fetch_work(client: &Client, token: &str, id: i64) -> Value {
    client
        .get(format!("{}/works/{}", BASE_URL, id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to fetch work")
        .json()
        .await
        .expect("work body")
}

fn links_of(work: &Value, kind: &str) -> Vec<Value> {
    work["links"]
        .as_array()
        .expect("links")
        .iter()
        .filter(|l| l["kind"] == kind)
        .cloned()
        .collect()
}

fn collection_json(title: &str) -> Value {
    json!({
        "record_type": "printed",
        "bibliographic_level": "collection",
        "title": { "title": title },
        "composer": { "authority": { "heading": "Händel, Georg Friedrich", "qualifier": "1685-1759" } },
        "languages": ["zxx"],
        "links": [ { "kind": "constituent", "title": "Sonata in G minor", "related_parts": "No. 2" } ]
    })
}

fn part_json(title: &str, host_id: i64) -> Value {
    json!({
        "record_type": "printed",
        "bibliographic_level": "part",
        "title": { "title": title, "part_number": "No. 1" },
        "composer": { "authority": { "heading": "Händel, Georg Friedrich", "qualifier": "1685-1759" } },
        "links": [ { "kind": "host", "target_id": host_id } ]
    })
}

async fn create_work(client: &Client, token: &str, body: &Value) -> Value {
    let response = client
        .post(format!("{}/works", BASE_URL))
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .expect("Failed to create work");
    assert_eq!(response.status(), 201);
    response.json().await.expect("work body")
}

#[tokio::test]
#[ignore]
async fn test_collection_and_part_lifecycle() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let collection = create_work(&client, &token, &collection_json("Six sonatas for violin")).await;
    let collection_id = collection["id"].as_i64().expect("collection id");
    assert!(collection["control_number"].as_str().unwrap().starts_with("PR"));

    let part = create_work(&client, &token, &part_json("Sonata in A major", collection_id)).await;
    let part_id = part["id"].as_i64().expect("part id");
    let part_cn = part["control_number"].as_str().expect("control number").to_string();

    // The collection now carries a linked 774 for the part
    let collection = fetch_work(&client, &token, collection_id).await;
    assert!(links_of(&collection, "constituent")
        .iter()
        .any(|l| l["target_id"].as_i64() == Some(part_id)));

    // MARC text carries the 773 host entry
    let text = client
        .get(format!("{}/works/{}/marc?format=text", BASE_URL, part_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to fetch MARC")
        .text()
        .await
        .expect("MARC text");
    assert!(text.contains("=773  0\\"));

    // Retitling the part refreshes the snapshot held by the collection
    let response = client
        .put(format!("{}/works/{}", BASE_URL, part_id))
        .bearer_auth(&token)
        .json(&part_json("Sonata in A major, HWV 361", collection_id))
        .send()
        .await
        .expect("Failed to update part");
    assert_eq!(response.status(), 200);
    let collection = fetch_work(&client, &token, collection_id).await;
    let entry = links_of(&collection, "constituent")
        .into_iter()
        .find(|l| l["target_id"].as_i64() == Some(part_id))
        .expect("linked 774");
    assert_eq!(entry["title"], "Sonata in A major, HWV 361");
    assert_eq!(entry["control_number"], part_cn.as_str());

    // Soft delete: the public catalog hides the part, the 774 becomes textual with $w kept
    let response = client
        .delete(format!("{}/works/{}", BASE_URL, part_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to delete part");
    assert_eq!(response.status(), 204);

    let response = client
        .get(format!("{}/public/works/{}", BASE_URL, part_id))
        .send()
        .await
        .expect("Failed to fetch public work");
    assert_eq!(response.status(), 404);

    let collection = fetch_work(&client, &token, collection_id).await;
    let constituents = links_of(&collection, "constituent");
    assert!(constituents.iter().all(|l| l["target_id"].as_i64() != Some(part_id)));
    assert!(constituents
        .iter()
        .any(|l| l["target_id"].is_null() && l["control_number"] == part_cn.as_str()));

    // Restore links the entry again
    let response = client
        .post(format!("{}/works/{}/restore", BASE_URL, part_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to restore part");
    assert_eq!(response.status(), 200);
    let collection = fetch_work(&client, &token, collection_id).await;
    let linked: Vec<Value> = links_of(&collection, "constituent")
        .into_iter()
        .filter(|l| l["target_id"].as_i64() == Some(part_id))
        .collect();
    assert_eq!(linked.len(), 1);

    // Moving the part to another collection removes the old 774 mirror
    let other = create_work(&client, &token, &collection_json("Twelve sonatas")).await;
    let other_id = other["id"].as_i64().expect("collection id");
    let response = client
        .put(format!("{}/works/{}", BASE_URL, part_id))
        .bearer_auth(&token)
        .json(&part_json("Sonata in A major, HWV 361", other_id))
        .send()
        .await
        .expect("Failed to move part");
    assert_eq!(response.status(), 200);

    let collection = fetch_work(&client, &token, collection_id).await;
    assert!(collection["links"]
        .as_array()
        .expect("links")
        .iter()
        .all(|l| l["target_id"].as_i64() != Some(part_id)));
    let other = fetch_work(&client, &token, other_id).await;
    assert!(links_of(&other, "constituent")
        .iter()
        .any(|l| l["target_id"].as_i64() == Some(part_id)));
}

#[tokio::test]
#[ignore]
async fn test_relevelling_collection_with_attached_part_is_refused() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let collection = create_work(&client, &token, &collection_json("Trio sonatas")).await;
    let collection_id = collection["id"].as_i64().expect("collection id");
    create_work(&client, &token, &part_json("Trio sonata in B flat", collection_id)).await;

    let response = client
        .put(format!("{}/works/{}", BASE_URL, collection_id))
        .bearer_auth(&token)
        .json(&json!({
            "record_type": "printed",
            "bibliographic_level": "independent",
            "title": { "title": "Trio sonatas" },
            "composer": { "authority": { "heading": "Händel, Georg Friedrich", "qualifier": "1685-1759" } }
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.expect("error body");
    assert!(body["fields"].as_array().expect("fields").iter().any(|f| f["field"] == "774"));
}

#[tokio::test]
#[ignore]
async fn test_purge_spares_restored_work_files() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let work = create_work(
        &client,
        &token,
        &json!({
            "record_type": "manuscript",
            "bibliographic_level": "independent",
            "title": { "title": "Lamentationes" },
            "composer": { "authority": { "heading": "Zelenka, Jan Dismas", "qualifier": "1679-1745" } }
        }),
    )
    .await;
    let work_id = work["id"].as_i64().expect("work id");

    let file = reqwest::multipart::Part::bytes(b"%PDF-1.4 lamentationes".to_vec())
        .file_name("lamentationes.pdf")
        .mime_str("application/pdf")
        .expect("mime");
    let response = client
        .post(format!("{}/works/{}/scans", BASE_URL, work_id))
        .bearer_auth(&token)
        .multipart(reqwest::multipart::Form::new().part("file", file))
        .send()
        .await
        .expect("Failed to upload scan");
    assert_eq!(response.status(), 201);
    let scan: Value = response.json().await.expect("scan body");
    let scan_id = scan["id"].as_i64().expect("scan id");

    for action in ["delete", "restore"] {
        let request = match action {
            "delete" => client.delete(format!("{}/works/{}", BASE_URL, work_id)),
            _ => client.post(format!("{}/works/{}/restore", BASE_URL, work_id)),
        };
        let response = request.bearer_auth(&token).send().await.expect("lifecycle request");
        assert!(response.status().is_success());
    }

    let response = client
        .post(format!("{}/admin/purge?older_than_days=0", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to purge");
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/scans/{}/file", BASE_URL, scan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to download scan");
    assert_eq!(response.status(), 200);

    // Once deleted again, the same purge removes the work
    let response = client
        .delete(format!("{}/works/{}", BASE_URL, work_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to delete work");
    assert_eq!(response.status(), 204);
    let report: Value = client
        .post(format!("{}/admin/purge?older_than_days=0", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to purge")
        .json()
        .await
        .expect("purge report");
    assert!(report["purged"].as_u64().unwrap_or(0) >= 1);
    assert!(report["files_removed"].as_u64().unwrap_or(0) >= 1);

    let response = client
        .get(format!("{}/works/{}", BASE_URL, work_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to fetch work");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
#[ignore]
async fn test_invalid_record_reports_fields() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .post(format!("{}/works", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "record_type": "manuscript",
            "bibliographic_level": "independent",
            "title": { "title": "Missa brevis" },
            "identifiers": [ { "kind": "isbn", "value": "0-9752298-0-X" } ]
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.expect("error body");
    assert_eq!(body["code"], 7);
    assert!(body["fields"].as_array().expect("fields").iter().any(|f| f["field"] == "100"));
}
