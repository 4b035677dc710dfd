//! # Domain Module
//!
//! Safe specific logic on top of the chain and persistence services:
//! hashing and signature primitives, Safe creation, the funding and
//! deployment reconcilers and the multisig tx relay gate.
pub mod safe;

pub mod creation;
pub use creation::SafeCreationService;

pub mod reconciler;
pub use reconciler::{Create2Reconciler, LegacyReconciler, ReconcilerSettings};

pub mod relay;
pub use relay::RelayService;
