use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Utc;
use escrow_engine::{
    db_types::{Amount, Deposit, DepositHistory, VendorTier},
    StoreApi,
};
use serde_json::json;

use super::{
    helpers::{get_request, put_request},
    mocks::*,
};
use crate::{
    data_objects::StoreDeposits,
    routes::{SetVendorTierRoute, StoreDepositsRoute},
};

#[actix_web::test]
async fn set_vendor_tier() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/stores/{STORE_ID}/tier");
    let (status, body) = put_request(&path, &json!({"tier": "gold"}), configure).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""success":true"#), "{body}");
    assert!(body.contains("gold"), "{body}");
}

#[actix_web::test]
async fn unknown_tier_is_bad_request() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/stores/{STORE_ID}/tier");
    let (status, _) = put_request(&path, &json!({"tier": "platinum"}), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn store_deposits() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/stores/{STORE_ID}/deposits");
    let (status, body) = get_request(&path, configure).await;
    assert_eq!(status, StatusCode::OK);
    let deposits: StoreDeposits = serde_json::from_str(&body).expect("Invalid JSON");
    assert_eq!(deposits.tier, VendorTier::Gold);
    assert_eq!(deposits.deposits.len(), 1);
    let total = Amount::checked_sum(deposits.history.iter().map(|h| h.amount));
    assert_eq!(Some(deposits.deposits[0].total), total);
}

#[actix_web::test]
async fn corrupt_tier_is_bad_request() {
    let _ = env_logger::try_init().ok();
    let path = format!("/api/stores/{STORE_ID}/deposits");
    let (status, body) = get_request(&path, configure_corrupt_tier).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("diamond"), "{body}");
}

fn register(cfg: &mut ServiceConfig, db: MockEscrowStore) {
    let api = StoreApi::new(db);
    cfg.service(
        web::scope("/api")
            .service(StoreDepositsRoute::<MockEscrowStore>::new())
            .service(SetVendorTierRoute::<MockEscrowStore>::new()),
    )
    .app_data(web::Data::new(api));
}

fn configure(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(store_with_deposits));
}

fn configure_corrupt_tier(cfg: &mut ServiceConfig) {
    register(cfg, with_clones(store_with_corrupt_tier));
}

fn store_with_deposits() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_set_vendor_tier().returning(|_, _| Ok(()));
    store.expect_fetch_vendor_tier().returning(|_| Ok(Some("gold".to_string())));
    store.expect_fetch_deposits_for_store().returning(|_| {
        Ok(vec![Deposit {
            store_id: store_id(),
            currency: "USDC".to_string(),
            total: Amount::from(147i64),
            updated_at: Utc::now(),
        }])
    });
    store.expect_fetch_deposit_history_for_store().returning(|_| {
        let entry = |id: i64, amount: i64| DepositHistory {
            id,
            store_id: store_id(),
            currency: "USDC".to_string(),
            amount: Amount::from(amount),
            transaction_id: Some(order_id()),
            memo: Some("settlement payout".to_string()),
            created_at: Utc::now(),
        };
        Ok(vec![entry(1, 98), entry(2, 49)])
    });
    store
}

fn store_with_corrupt_tier() -> MockEscrowStore {
    let mut store = MockEscrowStore::new();
    store.expect_fetch_vendor_tier().returning(|_| Ok(Some("diamond".to_string())));
    store
}
