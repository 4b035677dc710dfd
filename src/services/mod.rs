//! # Services Module
//!
//! Chain access and the relay's own accounts: the JSON-RPC provider, gas
//! prices, keys, nonce allocation, transaction sending and funding.

mod provider;
pub use provider::*;

mod gas;
pub use gas::*;

mod signer;
pub use signer::*;

mod nonce_lock;
pub use nonce_lock::*;

pub(crate) mod transaction;
pub use transaction::{SentTransaction, TransactionParams, TransactionSender};

mod funding;
pub use funding::*;
