//! Safe owner keys and their signatures.

use alloy::{
    primitives::{Bytes, B256},
    signers::{local::PrivateKeySigner, SignerSync},
};

pub fn owner(byte: u8) -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&B256::repeat_byte(byte)).unwrap()
}

/// `count` owners sorted by address, the order a Safe expects signatures in.
pub fn sorted_owners(count: u8) -> Vec<PrivateKeySigner> {
    let mut owners: Vec<PrivateKeySigner> = (1..=count).map(owner).collect();
    owners.sort_by_key(|o| o.address());
    owners
}

/// Packed 65 byte ECDSA signatures of `hash`, one per owner in the given order.
pub fn sign(owners: &[PrivateKeySigner], hash: B256) -> Bytes {
    owners
        .iter()
        .flat_map(|o| o.sign_hash_sync(&hash).unwrap().as_bytes())
        .collect::<Vec<u8>>()
        .into()
}
