//! Credlane transfer validation and disbursement engine
//!
//! Backend service for a lending platform: loan review and contract
//! lifecycle, staged disbursement transfers advanced by single-use
//! validation codes, a fee ledger and an append-only transfer audit trail.

pub mod accounts;
pub mod codes;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fees;
pub mod handlers;
pub mod loan;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod routes;
pub mod state;
pub mod transfer;
