//! Certchain Server - certificate issuance anchored on a ledger
//!
//! This crate provides the REST API that hashes uploaded certificate files,
//! anchors their digests on a smart-contract ledger and keeps the local
//! record and audit trail of every certificate.

pub mod access;
pub mod artifact;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod ledger_admin;
pub mod lifecycle;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;

pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;
