//! # Database backend contracts.
//!
//! The traits in this module define what a storage backend must provide for the escrow engine. The public APIs in
//! [`crate::escrow_api`] are generic over these traits, so backends can be swapped (or mocked) freely.
//!
//! * [`EscrowDatabase`] covers orders, the append-only status event log, vendor tiers and the deposit ledger.
//! * [`DisputeManagement`] stores disputes and claims, and performs the atomic resolve-and-append.
//! * [`SettlementManagement`] stores settlements and credits the vendor's deposit ledger.
//! * [`ConfigStorage`] persists the key/value configuration table.
mod config_storage;
mod data_objects;
mod dispute_management;
mod escrow_database;
mod settlement_management;

pub use config_storage::ConfigStorage;
pub use data_objects::{AppendGuard, AppendOutcome, CreatedOrder, IgnoreReason, NewSettlement, ResolvedDispute};
pub use dispute_management::DisputeManagement;
pub use escrow_database::{EscrowDatabase, EscrowError};
pub use settlement_management::SettlementManagement;

/// Everything a complete storage backend provides. Implemented automatically for any type with all four capabilities.
pub trait EscrowBackend: EscrowDatabase + DisputeManagement + SettlementManagement + ConfigStorage {}

impl<T> EscrowBackend for T where T: EscrowDatabase + DisputeManagement + SettlementManagement + ConfigStorage {}
