//! AUTOSTAKE — Resilient reward compounding bot
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod secrets;
pub mod metrics;
pub mod engine;
pub mod bot;
pub mod dashboard;
