//! REBALANCER — Autonomous Portfolio Rebalancing Bot
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod exchange;
pub mod data;
pub mod engine;
pub mod storage;
