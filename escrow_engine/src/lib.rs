//! Escrow Status Engine
//!
//! The engine tracks a crypto-escrow order from creation to settlement. Everything that happens to an order is
//! recorded as an immutable status event, and the order's cumulative status is always derived from that history, never
//! stored.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@traits`] and the SQLite backend). You should not need to access the database directly. The data
//!    types stored in the database are defined in [`mod@db_types`] and are public.
//! 2. Pure domain logic. [`mod@projector`] computes the cumulative status from the event log, and [`mod@settlement`]
//!    splits escrowed funds. Both are free of I/O.
//! 3. The public API ([`mod@escrow_api`]): order flow, disputes, settlement, reconciliation, vendor stores and
//!    the database-backed configuration.
//!
//! The engine also publishes events (order created, status changed, dispute opened or resolved, order settled, order
//! escalated) that outside collaborators can hook into. See [`mod@events`].
pub mod db_types;
pub mod escrow_api;
pub mod events;
pub mod policy;
pub mod projector;
pub mod settlement;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use escrow_api::{
    order_objects,
    ConfigApi,
    DisputeApi,
    OrderFlowApi,
    ReconcileOptions,
    ReconciliationApi,
    SettlementApi,
    StoreApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{ConfigStorage, DisputeManagement, EscrowBackend, EscrowDatabase, EscrowError, SettlementManagement};
