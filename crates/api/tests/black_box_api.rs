use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use stockline_api::app::services::AppServices;
use stockline_core::{Money, VariantId};
use stockline_infra::{AppConfig, InMemoryOrderStore, OrderStore};
use stockline_orders::Variant;

struct TestServer {
    base_url: String,
    store: Arc<InMemoryOrderStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(AppConfig::default()).await
    }

    async fn spawn_with(config: AppConfig) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let store = Arc::new(InMemoryOrderStore::new());
        let services = Arc::new(AppServices::new(store.clone(), &config));
        let app = stockline_api::app::build_app(&config, services).expect("routes resolve");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, store, handle }
    }

    async fn seed(&self, product: &str, quantity: i64) -> VariantId {
        let v = Variant::new(product, "Default", Money::from_minor(1000), quantity);
        let id = v.id;
        self.store.upsert_variant(v).await;
        id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Lines are `(variant, quantity, price in cents)`; the body carries decimal amounts.
fn order_body(lines: &[(VariantId, i64, i64)]) -> serde_json::Value {
    let total: i64 = lines.iter().map(|(_, q, p)| q * p).sum();
    json!({
        "items": lines
            .iter()
            .map(|(id, q, p)| json!({ "variant_id": id.to_string(), "quantity": q, "price": *p as f64 / 100.0 }))
            .collect::<Vec<_>>(),
        "total": total as f64 / 100.0,
    })
}

#[tokio::test]
async fn health_is_unversioned() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_then_fetch_round_trip() {
    let srv = TestServer::spawn().await;
    let shirt = srv.seed("Cotton Shirt", 10).await;
    let socks = srv.seed("Wool Socks", 10).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/v1/orders"))
        .json(&order_body(&[(shirt, 2, 1000), (socks, 1, 500)]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["status"], "Accepted");
    assert_eq!(created["total"], 25.0);
    assert_eq!(created["items"].as_array().unwrap().len(), 2);
    let id = created["id"].as_str().unwrap().to_string();

    let res = client
        .get(srv.url(&format!("/api/v1/orders/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let order: serde_json::Value = res.json().await.unwrap();
    assert_eq!(order["id"], id);
    assert_eq!(order["total"], 25.0);
    assert_eq!(order["items"][0]["quantity"], 2);
    assert_eq!(order["items"][0]["price"], 10.0);
    assert_eq!(order["items"][0]["product_name"], "Cotton Shirt");
    assert_eq!(order["items"][1]["variant_id"], socks.to_string());

    assert_eq!(srv.store.remaining(shirt).await.unwrap(), Some(8));
}

#[tokio::test]
async fn decimal_amounts_are_accepted_and_echoed() {
    let srv = TestServer::spawn().await;
    let variant = srv.seed("Cotton Shirt", 10).await;

    let res = reqwest::Client::new()
        .post(srv.url("/api/v1/orders"))
        .json(&json!({
            "items": [{ "variant_id": variant.to_string(), "quantity": 2, "price": 12.5 }],
            "total": 25.0,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["total"], 25.0);
    assert_eq!(created["items"][0]["price"], 12.5);
}

#[tokio::test]
async fn insufficient_inventory_is_a_conflict_listing_short_variants() {
    let srv = TestServer::spawn().await;
    let scarce = srv.seed("Scarce", 1).await;

    let res = reqwest::Client::new()
        .post(srv.url("/api/v1/orders"))
        .json(&order_body(&[(scarce, 2, 100)]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_inventory");
    assert_eq!(body["variants"][0]["variant_id"], scarce.to_string());
    assert_eq!(body["variants"][0]["remaining"], 1);
}

#[tokio::test]
async fn invalid_requests_are_rejected_with_field_errors() {
    let srv = TestServer::spawn().await;
    let variant = srv.seed("Shirt", 10).await;
    let client = reqwest::Client::new();

    // Total does not match the items.
    let res = client
        .post(srv.url("/api/v1/orders"))
        .json(&json!({
            "items": [{ "variant_id": variant.to_string(), "quantity": 2, "price": 100 }],
            "total": 150,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["fields"][0]["field"], "total");

    // Malformed variant id.
    let res = client
        .post(srv.url("/api/v1/orders"))
        .json(&json!({
            "items": [{ "variant_id": "nope", "quantity": 1, "price": 100 }],
            "total": 100,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["fields"][0]["field"], "items[0].variant_id");

    // Sub-cent amounts.
    let res = client
        .post(srv.url("/api/v1/orders"))
        .json(&json!({
            "items": [{ "variant_id": variant.to_string(), "quantity": 1, "price": 9.999 }],
            "total": 9.999,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["fields"][0]["field"], "items[0].price");

    // Not JSON at all.
    let res = client
        .post(srv.url("/api/v1/orders"))
        .header("content-type", "application/json")
        .body("{")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(srv.store.remaining(variant).await.unwrap(), Some(10));
}

#[tokio::test]
async fn unknown_order_and_bad_id() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url(&format!("/api/v1/orders/{}", uuid::Uuid::now_v7())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(srv.url("/api/v1/orders/123")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unaccepted_version_is_not_found() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/api/v2/orders")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unsupported_version");
}

#[tokio::test]
async fn newer_accepted_version_falls_back_to_existing_handlers() {
    let config = AppConfig {
        accepted_versions: vec!["v1".to_string(), "v2".to_string()],
        ..AppConfig::default()
    };
    let srv = TestServer::spawn_with(config).await;
    let variant = srv.seed("Shirt", 5).await;

    let res = reqwest::Client::new()
        .post(srv.url("/api/v2/orders"))
        .json(&order_body(&[(variant, 1, 100)]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn listing_paginates_and_filters_by_product_name() {
    let srv = TestServer::spawn().await;
    let shirt = srv.seed("Linen Shirt", 100).await;
    let socks = srv.seed("Wool Socks", 100).await;
    let client = reqwest::Client::new();

    for i in 0..15 {
        let variant = if i % 5 == 0 { socks } else { shirt };
        let res = client
            .post(srv.url("/api/v1/orders"))
            .json(&order_body(&[(variant, 1, 100)]))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let page1: serde_json::Value = client
        .get(srv.url("/api/v1/orders?page=1&limit=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page1["orders"].as_array().unwrap().len(), 10);
    assert_eq!(page1["metadata"]["total"], 15);
    assert_eq!(page1["metadata"]["next"], 2);
    assert!(page1["metadata"].get("prev").is_none());

    let page2: serde_json::Value = client
        .get(srv.url("/api/v1/orders?page=2&limit=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page2["orders"].as_array().unwrap().len(), 5);
    assert_eq!(page2["metadata"]["prev"], 1);
    assert!(page2["metadata"].get("next").is_none());

    let socks_only: serde_json::Value = client
        .get(srv.url("/api/v1/orders?search=socks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(socks_only["metadata"]["total"], 3);

    let none: serde_json::Value = client
        .get(srv.url("/api/v1/orders?search=trousers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(none["orders"].as_array().unwrap().is_empty());
    assert!(none.get("metadata").is_none());
}

#[tokio::test]
async fn concurrent_requests_never_oversell() {
    let srv = Arc::new(TestServer::spawn().await);
    let variant = srv.seed("Limited Edition", 5).await;
    let client = reqwest::Client::new();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let client = client.clone();
        let url = srv.url("/api/v1/orders");
        let body = order_body(&[(variant, 1, 100)]);
        handles.push(tokio::spawn(async move {
            client.post(url).json(&body).send().await.unwrap().status()
        }));
    }

    let mut created = 0;
    for h in handles {
        match h.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 5);
    assert_eq!(srv.store.remaining(variant).await.unwrap(), Some(0));
}
