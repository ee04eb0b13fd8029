mod harness;

use std::sync::Arc;

use chitin_config::UnknownProductPolicy;
use harness::config::{ConfigBuilder, TOKEN};
use harness::server::{TestServer, event};
use serde_json::{Value, json};

const PATH: &str = "/webhooks/billing";

async fn start() -> TestServer {
    TestServer::start(ConfigBuilder::new().build()).await.unwrap()
}

#[tokio::test]
async fn initial_purchase_grants_tokens() {
    let server = start().await;

    let resp = server
        .deliver(PATH, &event("evt_100", "INITIAL_PURCHASE", "user_a", Some("weekly")))
        .await;
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "processed");

    let record = server.entitlement("user_a").await.unwrap();
    assert_eq!(record.token_balance, 200);
    assert!(record.subscription_active);
    assert_eq!(record.subscription_product_id.as_deref(), Some("weekly"));

    let marker = server.marker("evt_100").await.unwrap();
    assert!(marker.is_completed());
    assert_eq!(marker.app_user_id, "user_a");
}

#[tokio::test]
async fn flat_payload_is_accepted() {
    let server = start().await;

    let payload = json!({
        "id": "evt_flat",
        "type": "RENEWAL",
        "app_user_id": "user_flat",
        "product_id": "yearly"
    });
    let resp = server.deliver(PATH, &payload).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(server.entitlement("user_flat").await.unwrap().token_balance, 4000);
}

#[tokio::test]
async fn renewal_then_cancellation() {
    let server = start().await;

    server
        .deliver(PATH, &event("evt_1", "INITIAL_PURCHASE", "user_b", Some("yearly")))
        .await;
    server.deliver(PATH, &event("evt_2", "RENEWAL", "user_b", Some("yearly"))).await;
    assert_eq!(server.entitlement("user_b").await.unwrap().token_balance, 8000);

    let resp = server.deliver(PATH, &event("evt_3", "CANCELLATION", "user_b", None)).await;
    assert_eq!(resp.status(), 200);

    let record = server.entitlement("user_b").await.unwrap();
    assert_eq!(record.token_balance, 0);
    assert!(!record.subscription_active);
    assert_eq!(record.last_event_type.as_deref(), Some("CANCELLATION"));
}

#[tokio::test]
async fn replayed_delivery_is_already_processed() {
    let server = start().await;
    let payload = event("evt_dup", "RENEWAL", "user_c", Some("weekly"));

    for attempt in 0..5 {
        let resp = server.deliver(PATH, &payload).await;
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        let expected = if attempt == 0 { "processed" } else { "already_processed" };
        assert_eq!(body["status"], expected);
    }

    assert_eq!(server.entitlement("user_c").await.unwrap().token_balance, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_grant_once() {
    let server = Arc::new(start().await);
    let payload = event("evt_race", "INITIAL_PURCHASE", "user_d", Some("yearly"));

    let mut handles = Vec::new();
    for _ in 0..12 {
        let server = Arc::clone(&server);
        let payload = payload.clone();
        handles.push(tokio::spawn(async move { server.deliver(PATH, &payload).await.status() }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 200);
    }

    assert_eq!(server.entitlement("user_d").await.unwrap().token_balance, 4000);
    assert!(server.marker("evt_race").await.unwrap().is_completed());
}

#[tokio::test]
async fn transfer_and_unknown_types_are_acknowledged() {
    let server = start().await;

    for (event_id, kind) in [("evt_t", "TRANSFER"), ("evt_b", "BILLING_ISSUE")] {
        let resp = server.deliver(PATH, &event(event_id, kind, "user_e", Some("weekly"))).await;
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "acknowledged");
        assert!(server.marker(event_id).await.unwrap().is_completed());
    }

    assert!(server.entitlement("user_e").await.is_none());
}

#[tokio::test]
async fn missing_identifiers_are_rejected() {
    let server = start().await;

    let no_user = json!({ "event": { "id": "evt_nu", "type": "RENEWAL", "product_id": "weekly" } });
    let resp = server.deliver(PATH, &no_user).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["message"], "missing app_user_id");
    assert!(server.marker("evt_nu").await.is_none());

    let no_id = json!({ "event": { "type": "RENEWAL", "app_user_id": "user_f", "product_id": "weekly" } });
    let resp = server.deliver(PATH, &no_id).await;
    assert_eq!(resp.status(), 400);
    assert!(server.entitlement("user_f").await.is_none());
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let server = start().await;
    let payload = event("evt_auth", "INITIAL_PURCHASE", "user_g", Some("weekly"));

    let missing = server.client().post(server.url(PATH)).json(&payload).send().await.unwrap();
    assert_eq!(missing.status(), 401);

    let wrong = server
        .client()
        .post(server.url(PATH))
        .bearer_auth("not-the-token")
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let lowercase = server
        .client()
        .post(server.url(PATH))
        .header("authorization", format!("bearer {TOKEN}"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(lowercase.status(), 401);

    let body: Value = lowercase.json().await.unwrap();
    assert_eq!(body["error"]["message"], "unauthorized");

    assert!(server.entitlement("user_g").await.is_none());
    assert!(server.marker("evt_auth").await.is_none());
}

#[tokio::test]
async fn unset_token_is_a_server_error() {
    let server = TestServer::start(ConfigBuilder::new().without_token().build())
        .await
        .unwrap();

    let resp = server
        .deliver(PATH, &event("evt_cfg", "INITIAL_PURCHASE", "user_h", Some("weekly")))
        .await;
    assert_eq!(resp.status(), 500);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "configuration_error");
    assert!(server.marker("evt_cfg").await.is_none());
}

#[tokio::test]
async fn configured_products_and_policy() {
    let config = ConfigBuilder::new()
        .with_products(&[("monthly", 900)])
        .with_unknown_product_policy(UnknownProductPolicy::Ignore)
        .with_webhook_path("/hooks/billing")
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .deliver("/hooks/billing", &event("evt_m", "INITIAL_PURCHASE", "user_i", Some("monthly")))
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(server.entitlement("user_i").await.unwrap().token_balance, 900);

    let resp = server
        .deliver("/hooks/billing", &event("evt_w", "INITIAL_PURCHASE", "user_j", Some("weekly")))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "acknowledged");
    assert!(server.entitlement("user_j").await.is_none());

    let resp = server.deliver(PATH, &event("evt_x", "RENEWAL", "user_i", Some("monthly"))).await;
    assert_eq!(resp.status(), 404);
}
