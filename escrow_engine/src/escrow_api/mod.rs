//! # The escrow engine public API
//!
//! Every API is generic over the storage traits in [`crate::traits`]. Create one [`ConfigApi`] per process and clone
//! it into the APIs that need policy values, so they all share the same cache.
//!
//! * [`OrderFlowApi`] creates orders and records deposit, shipping and chain observations.
//! * [`DisputeApi`] runs the dispute state machine and writes the terminal payment event on resolution.
//! * [`SettlementApi`] splits the escrowed funds of finished orders and credits the vendor's deposit ledger.
//! * [`ReconciliationApi`] persists time-derived `stuck` transitions and reports escalations.
//! * [`StoreApi`] manages vendor tiers and exposes the deposit ledger.
//!
//! Hook events are published through the [`crate::events::EventProducers`] passed to each API.
pub mod config_api;
pub mod dispute_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod reconciliation_api;
pub mod settlement_api;
pub mod store_api;

pub use config_api::ConfigApi;
pub use dispute_api::DisputeApi;
pub use order_flow_api::OrderFlowApi;
pub use reconciliation_api::{ReconcileOptions, ReconciliationApi, RECONCILIATION_SOURCE};
pub use settlement_api::SettlementApi;
pub use store_api::StoreApi;
