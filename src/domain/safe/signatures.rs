//! Packed Safe signatures: `r(32) ‖ s(32) ‖ v(1)` per owner, concatenated
//! in ascending signer order.
use alloy::primitives::{Address, Bytes, Signature, B256, U256};

use crate::constants::SIGNATURE_LENGTH;
use crate::models::SignatureError;

/// How a Safe interprets a signature, selected by `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// `v = 0`, EIP-1271 contract signature, the owner is encoded in `r`.
    Contract,
    /// `v = 1`, hash approved on chain by the owner encoded in `r`.
    ApprovedHash,
    /// `v > 30`, `eth_sign` over the hash. The stored `v` carries +4, so
    /// recovery uses `v - 4`.
    EthSign,
    Ecdsa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeSignature {
    pub r: U256,
    pub s: U256,
    pub v: u8,
}

impl SafeSignature {
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LENGTH]) -> Self {
        Self {
            r: U256::from_be_slice(&bytes[..32]),
            s: U256::from_be_slice(&bytes[32..64]),
            v: bytes[64],
        }
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        bytes[32..64].copy_from_slice(&self.s.to_be_bytes::<32>());
        bytes[64] = self.v;
        bytes
    }

    pub fn kind(&self) -> SignatureKind {
        match self.v {
            0 => SignatureKind::Contract,
            1 => SignatureKind::ApprovedHash,
            v if v > 30 => SignatureKind::EthSign,
            _ => SignatureKind::Ecdsa,
        }
    }

    fn address_in_r(&self) -> Address {
        Address::from_word(B256::from(self.r))
    }

    /// Owner this signature speaks for over `hash`.
    ///
    /// Contract and approved hash signatures are not verified here, the Safe
    /// does that on chain.
    pub fn owner(&self, hash: B256) -> Result<Address, String> {
        match self.kind() {
            SignatureKind::Contract | SignatureKind::ApprovedHash => Ok(self.address_in_r()),
            SignatureKind::EthSign => {
                let signature = self.ecdsa(self.v - 4)?;
                signature
                    .recover_address_from_msg(hash.as_slice())
                    .map_err(|e| e.to_string())
            }
            SignatureKind::Ecdsa => {
                let signature = self.ecdsa(self.v)?;
                signature
                    .recover_address_from_prehash(&hash)
                    .map_err(|e| e.to_string())
            }
        }
    }

    fn ecdsa(&self, v: u8) -> Result<Signature, String> {
        let parity = match v {
            27 => false,
            28 => true,
            other => return Err(format!("unsupported v value {other}")),
        };
        if self.r.is_zero() || self.s.is_zero() {
            return Err("r and s must be non zero".to_string());
        }
        Ok(Signature::new(self.r, self.s, parity))
    }
}

/// Splits packed signatures. An empty input yields no signatures.
pub fn parse_signatures(packed: &[u8]) -> Result<Vec<SafeSignature>, SignatureError> {
    if packed.len() % SIGNATURE_LENGTH != 0 {
        return Err(SignatureError::MalformedSignatures(packed.len()));
    }
    Ok(packed
        .chunks_exact(SIGNATURE_LENGTH)
        .map(|chunk| {
            let mut bytes = [0u8; SIGNATURE_LENGTH];
            bytes.copy_from_slice(chunk);
            SafeSignature::from_bytes(&bytes)
        })
        .collect())
}

pub fn signatures_to_bytes(signatures: &[SafeSignature]) -> Bytes {
    signatures
        .iter()
        .flat_map(|signature| signature.to_bytes())
        .collect::<Vec<u8>>()
        .into()
}

/// Recovers the signers of `hash` in signature order.
///
/// Every signature is recovered first. Signer order is checked before
/// validity, so an unsorted set fails with `SignaturesNotSorted` even when
/// one of its signatures is also broken.
pub fn recover_signers(hash: B256, packed: &[u8]) -> Result<Vec<Address>, SignatureError> {
    let recovered: Vec<Result<Address, String>> = parse_signatures(packed)?
        .iter()
        .map(|signature| signature.owner(hash))
        .collect();

    let valid: Vec<Address> = recovered.iter().filter_map(|r| r.as_ref().ok()).copied().collect();
    if valid.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(SignatureError::SignaturesNotSorted);
    }

    recovered
        .into_iter()
        .enumerate()
        .map(|(index, result)| {
            result.map_err(|reason| SignatureError::InvalidSignature { index, reason })
        })
        .collect()
}

/// Verifies that `packed` carries at least `threshold` sorted, valid
/// signatures by `owners` over `hash`, and returns the signers.
pub fn check_signatures(
    hash: B256,
    packed: &[u8],
    owners: &[Address],
    threshold: usize,
) -> Result<Vec<Address>, SignatureError> {
    if packed.len() % SIGNATURE_LENGTH != 0 {
        return Err(SignatureError::MalformedSignatures(packed.len()));
    }
    let provided = packed.len() / SIGNATURE_LENGTH;
    if provided < threshold {
        return Err(SignatureError::SignaturesNotFound {
            required: threshold,
            provided,
        });
    }

    let signers = recover_signers(hash, packed)?;
    if let Some(stranger) = signers.iter().find(|signer| !owners.contains(signer)) {
        return Err(SignatureError::SignatureNotProvidedByOwner(*stranger));
    }
    Ok(signers)
}
