//! Initialization routines for the relay
//!
//! # Submodules
//!
//! - `initialize_app_state`: repositories, chain access and the domain services
//! - `initialize_workers`: the job worker and the cron scheduler
mod initialize_app_state;
pub use initialize_app_state::*;

mod initialize_workers;
pub use initialize_workers::*;
