//! FlipBot Library
//!
//! Position lifecycle and risk-management engine for short-expiry
//! UP/DOWN binary markets

pub mod config;
pub mod engine;
pub mod entry;
pub mod events;
pub mod exit;
pub mod ledger;
pub mod persistence;
pub mod resolution;
pub mod sizing;
pub mod types;
