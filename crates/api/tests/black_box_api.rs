use reqwest::StatusCode;
use serde_json::{Value, json};

use stockledger_api::config::AppConfig;
use stockledger_core::{ProductId, UserId};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = stockledger_api::app::build_app(&AppConfig::default())
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
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

struct Actor {
    client: reqwest::Client,
    user_id: String,
}

impl Actor {
    fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            user_id: UserId::new().to_string(),
        }
    }

    async fn register(&self, server: &TestServer, product: &str, body: Value) -> reqwest::Response {
        self.client
            .post(server.url(&format!("/products/{product}/balance")))
            .header("x-user-id", &self.user_id)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn movement(&self, server: &TestServer, body: Value) -> reqwest::Response {
        self.client
            .post(server.url("/movements"))
            .header("x-user-id", &self.user_id)
            .header("x-user-name", "Dana")
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, server: &TestServer, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(server.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn documented_scenario_end_to_end() {
    let server = TestServer::spawn().await;
    let actor = Actor::new();
    let product = ProductId::new().to_string();

    let res = actor
        .register(&server, &product, json!({ "initialStock": 20, "minimumStock": 10, "maximumStock": 100, "name": "Widget" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = actor
        .movement(&server, json!({ "productId": product, "type": "in", "quantity": 50, "reason": "purchase" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["newStock"], 70);
    assert_eq!(body["movement"]["previousStock"], 20);
    assert_eq!(body["movement"]["type"], "in");

    let res = actor
        .movement(&server, json!({ "productId": product, "type": "out", "quantity": "25", "reason": "sale" }))
        .await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["newStock"], 45);
    assert_eq!(body["totalSold"], 25);

    let res = actor
        .movement(&server, json!({ "productId": product, "type": "out", "quantity": 1000 }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["available"], 45);
    assert_eq!(body["requested"], 1000);

    let res = actor
        .movement(&server, json!({ "productId": product, "type": "adjustment", "quantity": 10, "reason": "count_adjustment" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let (status, balance) = actor.get(&server, &format!("/products/{product}/balance")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["currentStock"], 10);
    assert_eq!(balance["totalSold"], 25);
    assert_eq!(balance["status"], "low_stock");

    let (_, listing) = actor.get(&server, &format!("/products/{product}/movements")).await;
    assert_eq!(listing["pagination"]["total"], 3);
    let movements = listing["movements"].as_array().unwrap();
    assert_eq!(movements[0]["type"], "adjustment");
    assert_eq!(movements[0]["previousStock"], 45);
    assert_eq!(movements[0]["productName"], "Widget");
    assert_eq!(movements[0]["userName"], "Dana");
    assert_eq!(movements[2]["type"], "in");

    let (status, report) = actor.get(&server, &format!("/products/{product}/audit")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["consistent"], true);
    assert_eq!(report["movementCount"], 3);
}

#[tokio::test]
async fn mutations_require_a_user_header() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = ProductId::new().to_string();

    let res = client
        .post(server.url("/movements"))
        .json(&json!({ "productId": product, "type": "in", "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let res = client
        .post(server.url(&format!("/products/{product}/balance")))
        .header("x-user-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Reads stay open.
    let res = client.get(server.url("/movements")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn rejections_carry_typed_codes() {
    let server = TestServer::spawn().await;
    let actor = Actor::new();
    let product = ProductId::new().to_string();

    let res = actor.register(&server, &product, json!({})).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = actor.register(&server, &product, json!({})).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "duplicate_product");

    let cases = [
        (json!({ "productId": product, "type": "sideways", "quantity": 1 }), StatusCode::BAD_REQUEST, "invalid_movement_type"),
        (json!({ "productId": product, "type": "in", "quantity": 0 }), StatusCode::BAD_REQUEST, "invalid_quantity"),
        (json!({ "productId": product, "type": "in", "quantity": 2.5 }), StatusCode::BAD_REQUEST, "invalid_quantity"),
        (json!({ "productId": product, "type": "in" }), StatusCode::BAD_REQUEST, "validation_error"),
        (json!({ "productId": "abc", "type": "in", "quantity": 1 }), StatusCode::BAD_REQUEST, "invalid_id"),
        (json!({ "productId": ProductId::new().to_string(), "type": "in", "quantity": 1 }), StatusCode::NOT_FOUND, "product_not_found"),
    ];
    for (body, status, code) in cases {
        let res = actor.movement(&server, body).await;
        assert_eq!(res.status(), status);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], code);
    }

    let (status, body) = actor.get(&server, "/products/not-an-id/balance").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    // Nothing above reached the ledger.
    let (_, listing) = actor.get(&server, &format!("/products/{product}/movements")).await;
    assert_eq!(listing["pagination"]["total"], 0);
}

#[tokio::test]
async fn pagination_is_stable_under_concurrent_writes() {
    let server = TestServer::spawn().await;
    let actor = Actor::new();
    let product = ProductId::new().to_string();
    actor.register(&server, &product, json!({ "initialStock": 0 })).await;

    for _ in 0..5 {
        let res = actor
            .movement(&server, json!({ "productId": product, "type": "in", "quantity": 1 }))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let (_, first) = actor
        .get(&server, &format!("/movements?productId={product}&limit=2"))
        .await;
    assert_eq!(first["pagination"]["pages"], 3);
    assert_eq!(first["movements"].as_array().unwrap().len(), 2);
    let as_of = first["asOf"].as_u64().unwrap();

    // A write after the first page must not shift later pages.
    actor
        .movement(&server, json!({ "productId": product, "type": "in", "quantity": 1 }))
        .await;

    let (_, last) = actor
        .get(&server, &format!("/movements?productId={product}&limit=2&page=3&asOf={as_of}"))
        .await;
    assert_eq!(last["pagination"]["total"], 5);
    let movements = last["movements"].as_array().unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0]["previousStock"], 0);

    let (_, fresh) = actor.get(&server, &format!("/movements?productId={product}")).await;
    assert_eq!(fresh["pagination"]["total"], 6);

    let (status, count) = actor.get(&server, "/movements/count?since=2000-01-01").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(count["count"], 6);

    let (status, body) = actor.get(&server, "/movements/count").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn thresholds_update_and_alerts_follow_stock() {
    let server = TestServer::spawn().await;
    let actor = Actor::new();
    let product = ProductId::new().to_string();
    actor.register(&server, &product, json!({ "initialStock": 30 })).await;

    let res = actor
        .client
        .put(server.url(&format!("/products/{product}/thresholds")))
        .header("x-user-id", &actor.user_id)
        .json(&json!({ "minimumStock": 5, "maximumStock": 20 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "overstocked");
    assert_eq!(body["currentStock"], 30);

    actor
        .movement(&server, json!({ "productId": product, "type": "out", "quantity": 30 }))
        .await;

    // The monitor runs off the commit path; poll until it has caught up.
    for _ in 0..100 {
        let (_, body) = actor.get(&server, "/alerts").await;
        let out_of_stock = body["alerts"].as_array().unwrap().iter().any(|a| {
            a["productId"] == product.as_str() && a["status"] == "out_of_stock"
        });
        if out_of_stock {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("out-of-stock alert was not raised");
}
