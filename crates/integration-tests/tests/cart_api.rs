//! Integration tests for the cart API.
//!
//! These tests require a running `PostgreSQL` database, the API server, and
//! matching webhook secrets in the environment.
//!
//! Run with: cargo test -p orchard-integration-tests -- --ignored

#![allow(clippy::unwrap_used)]

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use orchard_integration_tests::{
    CUSTOMER_ID_HEADER, admin_token, base_url, now_unix, sign_webhook, webhook_secret,
};

async fn create_test_customer(client: &Client) -> String {
    let external_id = format!("user_{}", Uuid::new_v4().simple());
    let payload = json!({
        "type": "user.created",
        "data": {
            "id": external_id,
            "email": format!("{external_id}@example.com"),
            "name": "Test Customer",
        }
    })
    .to_string();

    let signature = sign_webhook(
        payload.as_bytes(),
        now_unix(),
        &webhook_secret("IDENTITY_WEBHOOK_SECRET"),
    );
    let resp = client
        .post(format!("{}/identity/webhook", base_url()))
        .header("identity-signature", signature)
        .body(payload)
        .send()
        .await
        .expect("Failed to deliver identity event");
    assert_eq!(resp.status(), StatusCode::OK);

    external_id
}

async fn create_test_product(client: &Client, stock: i32) -> i64 {
    let resp = client
        .post(format!("{}/products", base_url()))
        .bearer_auth(admin_token())
        .json(&json!({
            "name": format!("Test Mug {}", Uuid::new_v4().simple()),
            "price": "9.50",
            "stock": stock,
            "category": "mugs",
        }))
        .send()
        .await
        .expect("Failed to create product");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = resp.json().await.expect("Failed to read product");
    body["id"].as_i64().expect("product id")
}

#[tokio::test]
#[ignore = "Requires running api server and database"]
async fn test_cart_requires_auth() {
    let client = Client::new();

    let resp = client
        .get(format!("{}/cart", base_url()))
        .send()
        .await
        .expect("Failed to get cart");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running api server and database"]
async fn test_cart_lifecycle() {
    let client = Client::new();
    let external_id = create_test_customer(&client).await;
    let product_id = create_test_product(&client, 10).await;

    let cart_url = format!("{}/cart", base_url());

    // Lazily created, empty
    let resp = client
        .get(&cart_url)
        .header(CUSTOMER_ID_HEADER, &external_id)
        .send()
        .await
        .expect("Failed to get cart");
    assert_eq!(resp.status(), StatusCode::OK);
    let cart: Value = resp.json().await.expect("Failed to read cart");
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);

    // Add twice: quantities merge per product
    for _ in 0..2 {
        let resp = client
            .post(format!("{cart_url}/items"))
            .header(CUSTOMER_ID_HEADER, &external_id)
            .json(&json!({"product_id": product_id, "quantity": 2}))
            .send()
            .await
            .expect("Failed to add item");
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = client
        .get(&cart_url)
        .header(CUSTOMER_ID_HEADER, &external_id)
        .send()
        .await
        .expect("Failed to get cart");
    let cart: Value = resp.json().await.expect("Failed to read cart");
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart["items"][0]["quantity"], 4);
    assert_eq!(cart["subtotal"].as_str(), Some("38.00"));

    // Set an absolute quantity
    let resp = client
        .put(format!("{cart_url}/items/{product_id}"))
        .header(CUSTOMER_ID_HEADER, &external_id)
        .json(&json!({"quantity": 1}))
        .send()
        .await
        .expect("Failed to set quantity");
    assert_eq!(resp.status(), StatusCode::OK);
    let cart: Value = resp.json().await.expect("Failed to read cart");
    assert_eq!(cart["items"][0]["quantity"], 1);

    // Remove the line
    let resp = client
        .delete(format!("{cart_url}/items/{product_id}"))
        .header(CUSTOMER_ID_HEADER, &external_id)
        .send()
        .await
        .expect("Failed to remove item");
    assert_eq!(resp.status(), StatusCode::OK);
    let cart: Value = resp.json().await.expect("Failed to read cart");
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);

    // Clearing an already-empty cart is fine
    let resp = client
        .delete(&cart_url)
        .header(CUSTOMER_ID_HEADER, &external_id)
        .send()
        .await
        .expect("Failed to clear cart");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
#[ignore = "Requires running api server and database"]
async fn test_add_item_over_stock_rejected() {
    let client = Client::new();
    let external_id = create_test_customer(&client).await;
    let product_id = create_test_product(&client, 2).await;

    let resp = client
        .post(format!("{}/cart/items", base_url()))
        .header(CUSTOMER_ID_HEADER, &external_id)
        .json(&json!({"product_id": product_id, "quantity": 3}))
        .send()
        .await
        .expect("Failed to add item");

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running api server and database"]
async fn test_update_missing_line_is_404() {
    let client = Client::new();
    let external_id = create_test_customer(&client).await;
    let product_id = create_test_product(&client, 5).await;

    let resp = client
        .put(format!("{}/cart/items/{product_id}", base_url()))
        .header(CUSTOMER_ID_HEADER, &external_id)
        .json(&json!({"quantity": 1}))
        .send()
        .await
        .expect("Failed to set quantity");

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
