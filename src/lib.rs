//! TradeSense Challenge Ledger
//!
//! Settlement and risk evaluation for simulated prop-trading challenges,
//! served over an HTTP API.

pub mod application;
pub mod auth;
pub mod config;
pub mod domain;
pub mod persistence;
pub mod rate_limit;
pub mod task_runner;
