#![allow(dead_code)]
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use escrow_engine::{
    db_types::{Amount, NewOrder, PackageId, StoreId, TransactionId, UserId},
    events::EventProducers,
    ConfigApi,
    DisputeApi,
    EscrowDatabase,
    OrderFlowApi,
    ReconcileOptions,
    ReconciliationApi,
    SettlementApi,
    SqliteDatabase,
    StoreApi,
};
use log::*;
use rust_decimal::Decimal;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub mod faulty_backend;

pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/escrow_test_{}.db", dir.display(), rand::random::<u64>())
}

/// Creates a fresh, migrated database in the temp directory.
pub async fn prepare_test_env() -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let url = random_db_path();
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    db.migrate().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}

pub async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    db.close().await;
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Could not drop test database {url}: {e}");
    }
}

/// Every engine API, wired to one database and one config cache.
pub struct Engine {
    pub db: SqliteDatabase,
    pub config: ConfigApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub disputes: DisputeApi<SqliteDatabase>,
    pub settlements: SettlementApi<SqliteDatabase>,
    pub reconciler: ReconciliationApi<SqliteDatabase>,
    pub stores: StoreApi<SqliteDatabase>,
}

impl Engine {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let db = prepare_test_env().await;
        let config = ConfigApi::new(db.clone());
        config.seed_defaults().await.expect("Error seeding config");
        Self {
            orders: OrderFlowApi::new(db.clone(), config.clone(), producers.clone()),
            disputes: DisputeApi::new(db.clone(), producers.clone()),
            settlements: SettlementApi::new(db.clone(), config.clone(), producers.clone()),
            reconciler: ReconciliationApi::new(db.clone(), config.clone(), producers, ReconcileOptions::default()),
            stores: StoreApi::new(db.clone()),
            config,
            db,
        }
    }

    pub async fn shutdown(self) {
        tear_down(self.db).await;
    }

    pub async fn order_for(&self, store: StoreId, amount: i64, at: DateTime<Utc>) -> TransactionId {
        let order = new_order(store, amount, at);
        self.orders.create_order(order).await.expect("Error creating order").id()
    }

    /// An order for a random store with its deposit already in escrow.
    pub async fn paid_order(&self, amount: i64, at: DateTime<Utc>) -> TransactionId {
        let id = self.order_for(StoreId::random(), amount, at).await;
        let outcome = self
            .orders
            .record_deposit_observed_at(&id, Amount::from(amount), "test", at + Duration::minutes(5))
            .await
            .expect("Error recording deposit");
        assert!(outcome.is_appended());
        id
    }
}

pub fn new_order(store: StoreId, amount: i64, at: DateTime<Utc>) -> NewOrder {
    NewOrder::new(PackageId::random(), store, UserId::random(), Amount::from(amount), "USDC", 1).with_created_at(at)
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn amount(s: &str) -> Amount {
    Amount::from_str(s).unwrap()
}
