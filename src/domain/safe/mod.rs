//! Pure Safe primitives: hashes, signatures, address prediction and revert
//! decoding.
pub mod contracts;

mod tx_hash;
pub use tx_hash::*;

mod signatures;
pub use signatures::*;
#[cfg(test)]
pub(crate) use signatures::test_utils;

mod prediction;
pub use prediction::*;

mod legacy_creation;
pub use legacy_creation::*;

mod revert;
pub use revert::*;

mod reader;
pub use reader::*;
