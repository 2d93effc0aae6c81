use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Utc;
use escrow_engine::{
    db_types::{Amount, Fraction, PaymentStatus, Settlement, SettlementKind, VendorTier},
    events::EventProducers,
    traits::{AppendOutcome, CreatedOrder},
    ConfigApi,
    EscrowError,
    OrderFlowApi,
    SettlementApi,
};
use rust_decimal::Decimal;
use serde_json::json;

use super::{
    helpers::{delete_request, get_request, post_raw_json, post_request},
    mocks::*,
};
use crate::routes::{
    AssignEscrowAddressRoute,
    CreateOrderRoute,
    DeleteOrderRoute,
    ListOrdersRoute,
    OrderEventsRoute,
    OrderStatusRoute,
    RecordDepositRoute,
    SettleOrderRoute,
};

#[actix_web::test]
async fn status_of_paid_order() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}/status");
    let (status, body) = get_request(&path, configure_paid_order).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"awaiting_shipment""#), "{body}");
    assert!(body.contains(r#""payment":"completed""#), "{body}");
    assert!(body.contains(r#""escrow_address_pending":false"#), "{body}");
}

#[actix_web::test]
async fn status_of_unknown_order() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}/status");
    let (status, body) = get_request(&path, configure_unknown_order).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains(r#""error":"#), "{body}");
    assert!(body.contains(ORDER_ID), "{body}");
}

#[actix_web::test]
async fn malformed_order_id() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/api/orders/not-a-uuid/status", configure_unknown_order).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Could not read request path"), "{body}");
}

#[actix_web::test]
async fn malformed_json_body_gets_a_json_error() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_raw_json("/api/orders", r#"{"package_id": "#, configure_unknown_order).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_str(&body).expect("Error body is not JSON");
    let message = error["error"].as_str().unwrap_or_default();
    assert!(message.starts_with("Could not read request body"), "{body}");
}

#[actix_web::test]
async fn order_statuses_are_listed() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/api/orders", configure_listed_orders).await;
    assert_eq!(status, StatusCode::OK);
    let reports: Vec<serde_json::Value> = serde_json::from_str(&body).expect("Invalid JSON");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["transaction_id"], json!(ORDER_ID));
    assert_eq!(reports[0]["status"], json!("awaiting_shipment"));
}

#[actix_web::test]
async fn order_listing_pages_after_a_cursor_and_caps_the_limit() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders?after={ORDER_ID}&limit=5000");
    let (status, body) = get_request(&path, configure_next_order_page).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

#[actix_web::test]
async fn order_listing_with_a_malformed_cursor_is_bad_request() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/api/orders?after=nope", configure_unknown_order).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains(r#""error":"#), "{body}");
}

#[actix_web::test]
async fn events_for_paid_order() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}/events");
    let (status, body) = get_request(&path, configure_paid_order).await;
    assert_eq!(status, StatusCode::OK);
    let events: Vec<serde_json::Value> = serde_json::from_str(&body).expect("Invalid JSON");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["status"], json!({"stream": "payment", "status": "completed"}));
}

#[actix_web::test]
async fn create_order_with_zero_amount_is_rejected() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/api/orders", &new_order_body("0"), configure_unknown_order).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Required amount must be positive"), "{body}");
}

#[actix_web::test]
async fn create_order() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/api/orders", &new_order_body("100"), configure_new_order).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.contains(ORDER_ID), "{body}");
    assert!(body.contains(r#""escrow_address":null"#), "{body}");
}

#[actix_web::test]
async fn create_order_ignores_a_client_supplied_timestamp() {
    let _ = env_logger::try_init().ok();
    let mut body = new_order_body("100");
    body["created_at"] = json!("2001-01-01T00:00:00Z");
    let (status, body) = post_request("/api/orders", &body, configure_new_order).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!body.contains("2001-01-01"), "{body}");
}

#[actix_web::test]
async fn record_deposit_within_tolerance() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}/deposits");
    let body = json!({"amount": "97", "source": "chain-watcher"});
    let (status, body) = post_request(&path, &body, configure_new_order).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""outcome":"appended""#), "{body}");
    assert!(body.contains(r#""status":"completed""#), "{body}");
}

#[actix_web::test]
async fn deposit_with_invalid_amount_is_bad_request() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}/deposits");
    let body = json!({"amount": "lots"});
    let (status, _) = post_request(&path, &body, configure_new_order).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn reassigning_escrow_address_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}/escrow_address");
    let body = json!({"address": "0x0000000000000000000000000000000000000bad"});
    let (status, body) = post_request(&path, &body, configure_paid_order).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("already has escrow address"), "{body}");
}

#[actix_web::test]
async fn deleting_disputed_order_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}");
    let (status, body) = delete_request(&path, configure_disputed_order).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("open dispute"), "{body}");
}

#[actix_web::test]
async fn settling_unshipped_order_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}/settle");
    let (status, body) = post_request(&path, &json!({}), configure_paid_order).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("cannot be settled"), "{body}");
}

#[actix_web::test]
async fn settling_twice_returns_the_stored_settlement() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}/settle");
    let (status, body) = post_request(&path, &json!({}), configure_settled_order).await;
    assert_eq!(status, StatusCode::OK);
    let settlement: Settlement = serde_json::from_str(&body).expect("Invalid settlement JSON");
    assert_eq!(settlement.payout, Amount::from(98i64));
    assert_eq!(settlement.commission, Amount::from(2i64));
    assert_eq!(settlement.tier, Some(VendorTier::Gold));
}

fn new_order_body(amount: &str) -> serde_json::Value {
    json!({
        "package_id": "5d0e4c3b-2a19-4f87-b6e5-d4c3b2a19f87",
        "store_id": STORE_ID,
        "buyer_id": BUYER_ID,
        "required_amount": amount,
        "currency": "USDC",
        "chain_id": 1
    })
}

fn register(cfg: &mut ServiceConfig, db: MockEscrowStore) {
    let config = ConfigApi::new(db.clone());
    let producers = EventProducers::default();
    let orders_api = OrderFlowApi::new(db.clone(), config.clone(), producers.clone());
    let settlement_api = SettlementApi::new(db, config, producers);
    cfg.service(
        web::scope("/api")
            .service(CreateOrderRoute::<MockEscrowStore>::new())
            .service(ListOrdersRoute::<MockEscrowStore>::new())
            .service(OrderStatusRoute::<MockEscrowStore>::new())
            .service(OrderEventsRoute::<MockEscrowStore>::new())
            .service(AssignEscrowAddressRoute::<MockEscrowStore>::new())
            .service(RecordDepositRoute::<MockEscrowStore>::new())
            .service(SettleOrderRoute::<MockEscrowStore>::new())
            .service(DeleteOrderRoute::<MockEscrowStore>::new()),
    )
    .app_data(web::Data::new(orders_api))
    .app_data(web::Data::new(settlement_api));
}

fn configure_paid_order(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(paid_order_store));
}

fn configure_listed_orders(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(listed_orders_store));
}

fn configure_next_order_page(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(next_order_page_store));
}

fn configure_unknown_order(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(unknown_order_store));
}

fn configure_new_order(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(new_order_store));
}

fn configure_disputed_order(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(disputed_order_store));
}

fn configure_settled_order(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(settled_order_store));
}

fn paid_order_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_fetch_transaction().returning(|_| Ok(Some(transaction())));
    store.expect_fetch_evm_transaction().returning(|_| Ok(Some(evm_transaction())));
    store.expect_fetch_status_events().returning(|_| Ok(paid_order_events()));
    store.expect_fetch_open_dispute_for_transaction().returning(|_| Ok(None));
    store.expect_fetch_settlement().returning(|_| Ok(None));
    store.expect_assign_escrow_address().returning(|id, _, _| {
        Err(EscrowError::InvalidTransition(format!(
            "Order {id} already has escrow address {}",
            evm_transaction().escrow_address.unwrap_or_default()
        )))
    });
    store
}

fn listed_orders_store() -> MockEscrowStore {
    let mut store = paid_order_store();
    store
        .expect_fetch_transaction_ids()
        .withf(|after, limit| after.is_none() && *limit == 100)
        .returning(|_, _| Ok(vec![order_id()]));
    store
}

/// Only a page after the known order, at most a hundred long, is ever asked for.
fn next_order_page_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store
        .expect_fetch_transaction_ids()
        .withf(|after, limit| *after == Some(order_id()) && *limit == 100)
        .returning(|_, _| Ok(Vec::new()));
    store
}

fn unknown_order_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_fetch_transaction().returning(|_| Ok(None));
    store
}

fn new_order_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_insert_order().returning(|order| {
        let mut evm = evm_transaction();
        evm.escrow_address = None;
        evm.required_amount = order.required_amount;
        Ok(CreatedOrder {
            transaction: transaction(),
            evm_transaction: evm,
            initial_event: payment_event(1, PaymentStatus::Pending, order.created_at),
        })
    });
    store.expect_fetch_transaction().returning(|_| Ok(Some(transaction())));
    store.expect_fetch_evm_transaction().returning(|_| Ok(Some(evm_transaction())));
    store.expect_append_status_event().returning(|event, _| {
        let mut recorded = payment_event(2, PaymentStatus::Completed, Utc::now());
        recorded.status = event.status;
        recorded.amount = event.amount;
        recorded.source = event.source;
        Ok(AppendOutcome::appended(recorded))
    });
    store
}

fn disputed_order_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_fetch_transaction().returning(|_| Ok(Some(transaction())));
    store.expect_fetch_evm_transaction().returning(|_| Ok(Some(evm_transaction())));
    store.expect_fetch_status_events().returning(|_| Ok(paid_order_events()));
    store.expect_fetch_open_dispute_for_transaction().returning(|_| Ok(Some(open_dispute())));
    store
}

fn settled_order_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_fetch_settlement().returning(|_| {
        Ok(Some(Settlement {
            transaction_id: order_id(),
            kind: SettlementKind::Commission,
            amount: Amount::from(100i64),
            payout: Amount::from(98i64),
            commission: Amount::from(2i64),
            refund: Amount::ZERO,
            tier: Some(VendorTier::Gold),
            commission_rate: Some(Fraction::new(Decimal::new(2, 2)).unwrap()),
            resolver_rate: None,
            refund_ratio: None,
            created_at: Utc::now(),
        }))
    });
    store
}
