use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use super::{validate_owners_and_threshold, SafeRelayError};

/// A predicted CREATE2 Safe waiting to be funded, deployed and confirmed.
///
/// The address, salt and setup data never change after creation. Only the
/// reconciler touches the `tx_*` and `confirmed_block` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeDeploymentIntent {
    pub safe: Address,
    pub master_copy: Address,
    pub proxy_factory: Address,
    pub salt_nonce: U256,
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub to: Option<Address>,
    pub payment_token: Option<Address>,
    pub payment: U256,
    pub payment_receiver: Address,
    pub setup_data: Bytes,
    pub gas_estimated: u64,
    pub gas_price_estimated: u128,
    pub tx_hash: Option<B256>,
    pub tx_nonce: Option<u64>,
    pub tx_gas_price: Option<u128>,
    pub tx_submitted_at: Option<String>,
    /// Every deployment tx sent, replacements included, oldest first.
    #[serde(default)]
    pub submitted_tx_hashes: Vec<B256>,
    /// Block the Safe code was first seen at without a matching receipt.
    #[serde(default)]
    pub code_seen_block: Option<u64>,
    pub confirmed_block: Option<u64>,
    pub created_at: String,
}

impl SafeDeploymentIntent {
    pub fn is_submitted(&self) -> bool {
        self.tx_hash.is_some()
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_block.is_some()
    }

    /// Hashes of every deployment tx sent, the latest first. Any of them
    /// may be the one that got mined.
    pub fn deployment_tx_hashes(&self) -> Vec<B256> {
        let mut hashes: Vec<B256> = self.tx_hash.into_iter().collect();
        for hash in self.submitted_tx_hashes.iter().rev() {
            if !hashes.contains(hash) {
                hashes.push(*hash);
            }
        }
        hashes
    }

    /// Token the Safe pays its creation with; `None` means ether.
    pub fn payment_token(&self) -> Option<Address> {
        self.payment_token.filter(|token| !token.is_zero())
    }
}

/// Bookkeeping written when a deployment tx (or its replacement) is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSubmission {
    pub tx_hash: B256,
    pub nonce: u64,
    pub gas_price: u128,
    pub submitted_at: String,
}

/// Price quote for creating a Safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeCreationEstimate {
    pub gas: u64,
    pub gas_price: u128,
    pub payment: U256,
    pub payment_token: Address,
}

/// Request for a counterfactual CREATE2 Safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeCreation2Request {
    pub salt_nonce: U256,
    pub owners: Vec<Address>,
    pub threshold: u64,
    /// `None` or the zero address pays in ether.
    pub payment_token: Option<Address>,
    /// Delegate call run by `setup`, together with `to`.
    pub setup_data: Option<Bytes>,
    pub to: Option<Address>,
}

impl SafeCreation2Request {
    pub fn validate(&self) -> Result<(), SafeRelayError> {
        validate_owners_and_threshold(&self.owners, self.threshold)?;
        if self.setup_data.as_ref().is_some_and(|data| !data.is_empty())
            && self.to.is_none_or(|to| to.is_zero())
        {
            return Err(SafeRelayError::InvalidSetupData(
                "setup data requires a `to` address".into(),
            ));
        }
        Ok(())
    }

    pub fn payment_token(&self) -> Option<Address> {
        self.payment_token.filter(|token| !token.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SafeCreation2Request {
        SafeCreation2Request {
            salt_nonce: U256::from(17051863u64),
            owners: vec![Address::repeat_byte(1), Address::repeat_byte(2)],
            threshold: 2,
            payment_token: Some(Address::ZERO),
            setup_data: None,
            to: None,
        }
    }

    #[test]
    fn test_validate_request() {
        assert!(request().validate().is_ok());
        assert_eq!(request().payment_token(), None);

        let mut bad = request();
        bad.threshold = 3;
        assert!(matches!(
            bad.validate(),
            Err(SafeRelayError::InvalidThreshold { .. })
        ));

        let mut delegate = request();
        delegate.setup_data = Some(Bytes::from(vec![1u8]));
        assert!(delegate.validate().is_err());
        delegate.to = Some(Address::repeat_byte(9));
        assert!(delegate.validate().is_ok());
    }
}
