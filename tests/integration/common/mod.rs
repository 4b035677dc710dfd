//! Common utilities and helpers for integration tests

pub mod context;
pub mod fake_chain;
pub mod logging;
pub mod owners;
