//! # Escrow server
//! This crate hosts the HTTP front end for the escrow status engine. It is responsible for:
//! Accepting orders and the deposit, shipping and chain observations that feed each order's event log.
//! Exposing the cumulative status, dispute handling and settlement operations as a JSON API.
//! Running the reconciliation scheduler in the background, so that overdue orders are marked as stuck.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//! Business tunables (timeouts, tolerances, commission rates) live in the database-backed configuration table.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/orders/...`: Order creation, observations, status, events, disputes, settlement and deletion.
//! * `/api/disputes/...`: Dispute details, claims, review and resolution.
//! * `/api/stores/...`: Vendor tiers and deposit ledgers.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod reconciliation_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
