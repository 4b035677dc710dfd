//! # Repository Module
//!
//! Persistence of the relay's state. Every repository has an in-memory
//! implementation and a Redis one, selected at startup through
//! `REPOSITORY_STORAGE_TYPE` and wrapped in a `*RepositoryStorage` enum.

mod safe_deployment;
pub use safe_deployment::*;

mod legacy_funding;
pub use legacy_funding::*;

mod multisig_tx;
pub use multisig_tx::*;

mod token;
pub use token::*;

mod nonce_counter;
pub use nonce_counter::*;

// Redis base utilities for shared functionality
pub mod redis_base;
