//! DRIP — Unattended Dollar-Cost-Averaging Order Agent
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod broker;
pub mod config;
pub mod engine;
pub mod scheduler;
pub mod store;
pub mod types;
