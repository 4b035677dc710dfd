//! Relay service for Gnosis Safe: gasless Safe creation and multisig
//! transaction relaying, paid back by the Safe itself.
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod domain;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;
