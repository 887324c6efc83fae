//! Purchase quoting, settlement, and invoice integration tests.

mod common;

use axum::http::StatusCode;
use common::{starter_confirmation, TestHarness};
use serde_json::json;
use vox_billing_core::UserId;

// ============================================================================
// Catalog and quotes
// ============================================================================

#[tokio::test]
async fn list_packages_returns_the_catalog() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/purchases/packages").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let packages = body.as_array().unwrap();
    assert_eq!(packages.len(), 3);
    assert_eq!(packages[0]["id"], "starter");
    assert_eq!(packages[0]["credits"], 10000);
    assert_eq!(packages[0]["price_cents"], 1000);
}

#[tokio::test]
async fn quote_german_consumer_adds_vat() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/purchases/quote")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({ "package_id": "starter", "country": "DE" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["package_id"], "starter");
    assert_eq!(body["credits"], 10000);
    assert_eq!(body["amount_cents"], 1000);
    assert_eq!(body["vat_amount_cents"], 190);
    assert_eq!(body["total_amount_cents"], 1190);
    assert_eq!(body["currency"], "usd");
}

#[tokio::test]
async fn quote_business_buyer_reverse_charges() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/purchases/quote")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({
            "package_id": "starter",
            "country": "DE",
            "is_business": true,
            "vat_number": "DE123456789"
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["vat_amount_cents"], 0);
    assert_eq!(body["total_amount_cents"], 1000);
}

#[tokio::test]
async fn quote_outside_the_eu_has_no_vat() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/purchases/quote")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({ "package_id": "pro", "country": "US" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["amount_cents"], 2000);
    assert_eq!(body["vat_amount_cents"], 0);
    assert_eq!(body["total_amount_cents"], 2000);
}

#[tokio::test]
async fn quote_unknown_package_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/purchases/quote")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({ "package_id": "mega", "country": "DE" }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "unknown_package");
}

#[tokio::test]
async fn quote_rejects_lowercase_country() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/purchases/quote")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({ "package_id": "starter", "country": "de" }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_request");
}

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn confirm_purchase_mints_credits_and_invoice() {
    let harness = TestHarness::new();
    harness.create_account().await;
    harness
        .payments
        .insert(starter_confirmation("pi_germany", harness.test_user_id));

    let response = harness
        .server
        .post("/v1/purchases/confirm")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({
            "package_id": "starter",
            "payment_intent_id": "pi_germany"
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits"], 10000);
    assert_eq!(body["balance_credits"], 11000);
    assert_eq!(body["replayed"], false);
    assert_eq!(body["invoice"]["vat_amount_cents"], 190);
    assert_eq!(body["invoice"]["total_amount_cents"], 1190);
    assert_eq!(body["invoice"]["status"], "paid");
    assert_eq!(body["invoice"]["country"], "DE");
    assert!(body["invoice"]["number"]
        .as_str()
        .unwrap()
        .starts_with("INV-"));

    // The purchase landed in the ledger
    let response = harness
        .server
        .get("/v1/credits/transactions")
        .add_header("x-user-id", harness.user_header())
        .await;
    let list: serde_json::Value = response.json();
    let purchases: Vec<_> = list["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|t| t["transaction_type"] == "purchase")
        .collect();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0]["amount_credits"], 10000);

    // Exactly one invoice exists
    let response = harness
        .server
        .get("/v1/invoices")
        .add_header("x-user-id", harness.user_header())
        .await;
    let invoices: serde_json::Value = response.json();
    assert_eq!(invoices["invoices"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn confirm_purchase_replays_instead_of_double_minting() {
    let harness = TestHarness::new();
    harness.create_account().await;
    harness
        .payments
        .insert(starter_confirmation("pi_replay", harness.test_user_id));

    let payload = json!({
        "package_id": "starter",
        "payment_intent_id": "pi_replay"
    });

    let first = harness
        .server
        .post("/v1/purchases/confirm")
        .add_header("x-user-id", harness.user_header())
        .json(&payload)
        .await;
    first.assert_status_ok();
    let first: serde_json::Value = first.json();

    let second = harness
        .server
        .post("/v1/purchases/confirm")
        .add_header("x-user-id", harness.user_header())
        .json(&payload)
        .await;
    second.assert_status_ok();
    let second: serde_json::Value = second.json();

    assert_eq!(second["replayed"], true);
    assert_eq!(second["transaction_id"], first["transaction_id"]);
    assert_eq!(second["invoice"]["id"], first["invoice"]["id"]);
    assert_eq!(second["balance_credits"], 11000);

    // Still one invoice, one purchase entry
    let response = harness
        .server
        .get("/v1/invoices")
        .add_header("x-user-id", harness.user_header())
        .await;
    let invoices: serde_json::Value = response.json();
    assert_eq!(invoices["invoices"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn confirm_with_uncaptured_payment_fails() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let mut confirmation = starter_confirmation("pi_pending", harness.test_user_id);
    confirmation.status = "requires_payment_method".to_string();
    harness.payments.insert(confirmation);

    let response = harness
        .server
        .post("/v1/purchases/confirm")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({
            "package_id": "starter",
            "payment_intent_id": "pi_pending"
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "payment_not_completed");

    // Nothing was minted
    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("x-user-id", harness.user_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance_credits"], 1000);
}

#[tokio::test]
async fn confirm_with_foreign_intent_fails() {
    let harness = TestHarness::new();
    harness.create_account().await;

    // The intent was created for a different buyer
    harness
        .payments
        .insert(starter_confirmation("pi_stolen", UserId::generate()));

    let response = harness
        .server
        .post("/v1/purchases/confirm")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({
            "package_id": "starter",
            "payment_intent_id": "pi_stolen"
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "payment_verification_failed");
}

#[tokio::test]
async fn confirm_with_wrong_package_fails() {
    let harness = TestHarness::new();
    harness.create_account().await;
    harness
        .payments
        .insert(starter_confirmation("pi_swap", harness.test_user_id));

    // Intent metadata says starter, the claim says pro
    let response = harness
        .server
        .post("/v1/purchases/confirm")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({
            "package_id": "pro",
            "payment_intent_id": "pi_swap"
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "payment_verification_failed");
}

#[tokio::test]
async fn confirm_unknown_intent_is_a_gateway_error() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .server
        .post("/v1/purchases/confirm")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({
            "package_id": "starter",
            "payment_intent_id": "pi_never_created"
        }))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "payment_provider_error");
}

#[tokio::test]
async fn confirm_without_account_fails() {
    let harness = TestHarness::new();
    harness
        .payments
        .insert(starter_confirmation("pi_orphan", harness.test_user_id));

    let response = harness
        .server
        .post("/v1/purchases/confirm")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({
            "package_id": "starter",
            "payment_intent_id": "pi_orphan"
        }))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn create_intent_without_stripe_fails() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .server
        .post("/v1/purchases/intent")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({ "package_id": "starter", "country": "DE" }))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "payment_provider_error");
}

// ============================================================================
// Invoices
// ============================================================================

#[tokio::test]
async fn invoices_start_empty() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .server
        .get("/v1/invoices")
        .add_header("x-user-id", harness.user_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["invoices"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn get_invoice_by_id() {
    let harness = TestHarness::new();
    harness.create_account().await;
    harness
        .payments
        .insert(starter_confirmation("pi_lookup", harness.test_user_id));

    let confirm = harness
        .server
        .post("/v1/purchases/confirm")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({
            "package_id": "starter",
            "payment_intent_id": "pi_lookup"
        }))
        .await;
    let confirm: serde_json::Value = confirm.json();
    let invoice_id = confirm["invoice"]["id"].as_str().unwrap().to_string();

    let response = harness
        .server
        .get(&format!("/v1/invoices/{invoice_id}"))
        .add_header("x-user-id", harness.user_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["id"], invoice_id);
    assert_eq!(body["payment_intent_id"], "pi_lookup");
}

#[tokio::test]
async fn other_user_cannot_read_an_invoice() {
    let harness = TestHarness::new();
    harness.create_account().await;
    harness
        .payments
        .insert(starter_confirmation("pi_private", harness.test_user_id));

    let confirm = harness
        .server
        .post("/v1/purchases/confirm")
        .add_header("x-user-id", harness.user_header())
        .json(&json!({
            "package_id": "starter",
            "payment_intent_id": "pi_private"
        }))
        .await;
    let confirm: serde_json::Value = confirm.json();
    let invoice_id = confirm["invoice"]["id"].as_str().unwrap().to_string();

    harness
        .server
        .get(&format!("/v1/invoices/{invoice_id}"))
        .add_header("x-user-id", TestHarness::other_user_header())
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn get_invoice_with_malformed_id_fails() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .server
        .get("/v1/invoices/not-a-ulid")
        .add_header("x-user-id", harness.user_header())
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_id");
}
