//! SQLite backend for the escrow engine.
//!
//! [`SqliteDatabase`] implements every backend trait. The free functions in [`db`] do the actual SQL work and can be
//! composed inside a single transaction.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
