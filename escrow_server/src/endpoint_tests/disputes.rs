use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Utc;
use escrow_engine::{
    db_types::{DisputeStatus, EventStatus, PaymentStatus},
    events::EventProducers,
    traits::ResolvedDispute,
    DisputeApi,
    EscrowError,
};
use rust_decimal::Decimal;
use serde_json::json;

use super::{
    helpers::{get_request, post_request},
    mocks::*,
};
use crate::routes::{
    AddClaimRoute,
    DisputeDetailsRoute,
    ListDisputesRoute,
    OpenDisputeRoute,
    ResolveDisputeRoute,
    StartReviewRoute,
};

const RESOLVER_ID: &str = "e9f8a7b6-c5d4-4e3f-a2b1-0c9d8e7f6a5b";

#[actix_web::test]
async fn refund_ratio_above_one_is_bad_request() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/disputes/{DISPUTE_ID}/resolve");
    let body = json!({"resolver": RESOLVER_ID, "refund_ratio": "1.5"});
    let (status, body) = post_request(&path, &body, configure_untouched).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Refund ratio"), "{body}");
}

#[actix_web::test]
async fn full_refund_resolution() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/disputes/{DISPUTE_ID}/resolve");
    let body = json!({"resolver": RESOLVER_ID, "refund_ratio": "1"});
    let (status, body) = post_request(&path, &body, configure_resolvable).await;
    assert_eq!(status, StatusCode::OK);
    let resolved: ResolvedDispute = serde_json::from_str(&body).expect("Invalid JSON");
    assert_eq!(resolved.dispute.status, DisputeStatus::Resolved);
    assert_eq!(resolved.event.status, EventStatus::Payment(PaymentStatus::Refunded));
    assert_eq!(resolved.dispute.resolver_id, Some(RESOLVER_ID.parse().unwrap()));
}

#[actix_web::test]
async fn second_resolution_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/disputes/{DISPUTE_ID}/resolve");
    let body = json!({"resolver": RESOLVER_ID, "refund_ratio": "0.5"});
    let (status, body) = post_request(&path, &body, configure_already_resolved).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("already resolved"), "{body}");
}

#[actix_web::test]
async fn unknown_dispute() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/disputes/{DISPUTE_ID}");
    let (status, body) = get_request(&path, configure_untouched).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains(DISPUTE_ID), "{body}");
}

#[actix_web::test]
async fn empty_claim_is_bad_request() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/disputes/{DISPUTE_ID}/claims");
    let body = json!({"author": BUYER_ID, "role": "buyer", "body": "   "});
    let (status, body) = post_request(&path, &body, configure_untouched).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("cannot be empty"), "{body}");
}

#[actix_web::test]
async fn claim_with_unknown_role_is_bad_request() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/disputes/{DISPUTE_ID}/claims");
    let body = json!({"author": BUYER_ID, "role": "bystander", "body": "I saw everything"});
    let (status, _) = post_request(&path, &body, configure_untouched).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn open_dispute_on_deleted_order_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}/disputes");
    let body = json!({"filed_by": BUYER_ID, "reason": "Never arrived"});
    let (status, body) = post_request(&path, &body, configure_deleted_order).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("has been deleted"), "{body}");
}

#[actix_web::test]
async fn open_dispute() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/orders/{ORDER_ID}/disputes");
    let body = json!({"filed_by": BUYER_ID, "reason": "Item never arrived"});
    let (status, body) = post_request(&path, &body, configure_resolvable).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.contains(r#""status":"open""#), "{body}");
    assert!(body.contains(DISPUTE_ID), "{body}");
}

#[actix_web::test]
async fn start_review() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/disputes/{DISPUTE_ID}/review");
    let body = json!({"resolver": RESOLVER_ID});
    let (status, body) = post_request(&path, &body, configure_resolvable).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"under_review""#), "{body}");
}

#[actix_web::test]
async fn recent_disputes_are_listed() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/api/disputes", configure_listed_disputes).await;
    assert_eq!(status, StatusCode::OK);
    let disputes: Vec<serde_json::Value> = serde_json::from_str(&body).expect("Invalid JSON");
    assert_eq!(disputes.len(), 1);
    assert_eq!(disputes[0]["id"], json!(DISPUTE_ID));
    assert_eq!(disputes[0]["status"], json!("open"));
}

#[actix_web::test]
async fn dispute_listing_never_exceeds_fifty() {
    let _ = env_logger::try_init().ok();
    let (status, _) = get_request("/api/disputes?limit=1000", configure_listed_disputes).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn negative_dispute_listing_limit_is_bad_request() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/api/disputes?limit=-3", configure_untouched).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains(r#""error":"#), "{body}");
}

fn register(cfg: &mut ServiceConfig, db: MockEscrowStore) {
    let api = DisputeApi::new(db, EventProducers::default());
    cfg.service(
        web::scope("/api")
            .service(OpenDisputeRoute::<MockEscrowStore>::new())
            .service(ListDisputesRoute::<MockEscrowStore>::new())
            .service(DisputeDetailsRoute::<MockEscrowStore>::new())
            .service(AddClaimRoute::<MockEscrowStore>::new())
            .service(StartReviewRoute::<MockEscrowStore>::new())
            .service(ResolveDisputeRoute::<MockEscrowStore>::new()),
    )
    .app_data(web::Data::new(api));
}

fn configure_untouched(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(untouched_store));
}

fn configure_listed_disputes(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(listed_disputes_store));
}

fn configure_resolvable(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(resolvable_store));
}

fn configure_already_resolved(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(already_resolved_store));
}

fn configure_deleted_order(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(deleted_order_store));
}

/// Nothing is stored, and no write should ever reach the backend.
fn untouched_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_fetch_dispute().returning(|_| Ok(None));
    store.expect_insert_claim().never();
    store.expect_resolve_dispute().never();
    store
}

fn listed_disputes_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_fetch_recent_disputes().withf(|limit| *limit == 50).returning(|_| Ok(vec![super::mocks::open_dispute()]));
    store
}

fn resolvable_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_fetch_transaction().returning(|_| Ok(Some(transaction())));
    store.expect_insert_dispute().returning(|new_dispute, at| {
        let mut dispute = super::mocks::open_dispute();
        dispute.filed_by = new_dispute.filed_by;
        dispute.reason = new_dispute.reason;
        dispute.created_at = at;
        dispute.updated_at = at;
        Ok(dispute)
    });
    store.expect_start_review().returning(|_, resolver, at| {
        let mut dispute = super::mocks::open_dispute();
        dispute.status = DisputeStatus::UnderReview;
        dispute.resolver_id = Some(*resolver);
        dispute.updated_at = at;
        Ok(dispute)
    });
    store.expect_resolve_dispute().returning(|_, resolver, ratio, at| {
        let mut dispute = super::mocks::open_dispute();
        dispute.status = DisputeStatus::Resolved;
        dispute.resolver_id = Some(*resolver);
        dispute.refund_ratio = Some(ratio);
        dispute.updated_at = at;
        dispute.resolved_at = Some(at);
        let status = if ratio.value() == Decimal::ONE {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::Resolved
        };
        Ok(ResolvedDispute { dispute, event: payment_event(3, status, Utc::now()) })
    });
    store
}

fn already_resolved_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store
        .expect_resolve_dispute()
        .returning(|id, _, _, _| Err(EscrowError::InvalidTransition(format!("Dispute {id} is already resolved"))));
    store
}

fn deleted_order_store() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_fetch_transaction().returning(|_| {
        let mut tx = transaction();
        tx.deleted_at = Some(Utc::now());
        Ok(Some(tx))
    });
    store.expect_insert_dispute().never();
    store
}
