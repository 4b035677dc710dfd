//! Read-only calls against deployed Safes.
use std::sync::Arc;

use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes, U256},
    rpc::types::TransactionRequest,
    sol_types::SolCall,
};
use tracing::debug;

use super::contracts::IGnosisSafe;
use crate::models::{SafeInfo, SafeRelayError, SafeVersion};
use crate::services::{EvmProviderTrait, ProviderError};

/// Storage slot of the master copy in every Safe proxy.
const MASTER_COPY_SLOT: U256 = U256::ZERO;

pub struct SafeReader<P: EvmProviderTrait> {
    provider: Arc<P>,
    default_version: SafeVersion,
}

impl<P: EvmProviderTrait> SafeReader<P> {
    pub fn new(provider: Arc<P>, default_version: SafeVersion) -> Self {
        Self {
            provider,
            default_version,
        }
    }

    /// `eth_call` of `call` on `to` at the latest block, decoded.
    pub async fn call<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, ProviderError> {
        let request = TransactionRequest::default()
            .to(to)
            .input(Bytes::from(call.abi_encode()).into());
        let output = self.provider.call_contract(&request, BlockId::latest()).await?;
        C::abi_decode_returns(&output).map_err(|e| {
            ProviderError::Other(format!("cannot decode {} output: {e}", C::SIGNATURE))
        })
    }

    pub async fn threshold(&self, safe: Address) -> Result<u64, ProviderError> {
        let threshold = self.call(safe, IGnosisSafe::getThresholdCall {}).await?;
        Ok(threshold.saturating_to())
    }

    pub async fn nonce(&self, safe: Address) -> Result<U256, ProviderError> {
        self.call(safe, IGnosisSafe::nonceCall {}).await
    }

    pub async fn owners(&self, safe: Address) -> Result<Vec<Address>, ProviderError> {
        self.call(safe, IGnosisSafe::getOwnersCall {}).await
    }

    pub async fn master_copy(&self, safe: Address) -> Result<Address, ProviderError> {
        let word = self.provider.get_storage_at(safe, MASTER_COPY_SLOT).await?;
        Ok(Address::from_word(word))
    }

    /// Raw `VERSION()` string, `None` if the Safe does not expose it.
    pub async fn version_string(&self, safe: Address) -> Result<Option<String>, ProviderError> {
        match self.call(safe, IGnosisSafe::VERSIONCall {}).await {
            Ok(version) => Ok(Some(version)),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                debug!(safe = %safe, error = %e, "safe does not expose VERSION");
                Ok(None)
            }
        }
    }

    /// Hashing version of `safe`, the configured default when unknown.
    pub async fn version(&self, safe: Address) -> Result<SafeVersion, ProviderError> {
        Ok(self
            .version_string(safe)
            .await?
            .and_then(|version| version.parse().ok())
            .unwrap_or(self.default_version))
    }

    pub async fn is_contract(&self, address: Address) -> Result<bool, ProviderError> {
        Ok(!self.provider.get_code(address).await?.is_empty())
    }

    /// Current on-chain state of a deployed Safe.
    pub async fn safe_info(&self, safe: Address) -> Result<SafeInfo, SafeRelayError> {
        if !self.is_contract(safe).await? {
            return Err(SafeRelayError::SafeNotDeployed(safe));
        }
        let version = self
            .version_string(safe)
            .await?
            .unwrap_or_else(|| self.default_version.to_string());
        Ok(SafeInfo {
            address: safe,
            nonce: self.nonce(safe).await?,
            threshold: self.threshold(safe).await?,
            owners: self.owners(safe).await?,
            master_copy: self.master_copy(safe).await?,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockEvmProviderTrait;
    use alloy::primitives::B256;
    use alloy::sol_types::SolValue;

    fn selector(request: &TransactionRequest) -> [u8; 4] {
        let input = request.input.input().cloned().unwrap_or_default();
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&input[..4]);
        selector
    }

    fn deployed_safe_provider(version: Option<&'static str>) -> MockEvmProviderTrait {
        let mut provider = MockEvmProviderTrait::new();
        provider
            .expect_get_code()
            .returning(|_| Box::pin(async { Ok(Bytes::from(vec![0x60, 0x80])) }));
        provider.expect_get_storage_at().returning(|_, _| {
            Box::pin(async { Ok(B256::left_padding_from(&[0x11; 20])) })
        });
        provider.expect_call_contract().returning(move |request, _| {
            let selector = selector(request);
            Box::pin(async move {
                if selector == IGnosisSafe::nonceCall::SELECTOR {
                    Ok(Bytes::from(U256::from(4u64).abi_encode()))
                } else if selector == IGnosisSafe::getThresholdCall::SELECTOR {
                    Ok(Bytes::from(U256::from(2u64).abi_encode()))
                } else if selector == IGnosisSafe::getOwnersCall::SELECTOR {
                    Ok(Bytes::from(
                        vec![Address::repeat_byte(1), Address::repeat_byte(2)].abi_encode(),
                    ))
                } else {
                    match version {
                        Some(version) => Ok(Bytes::from(version.to_string().abi_encode())),
                        None => Err(ProviderError::ExecutionReverted {
                            message: "execution reverted".into(),
                            data: None,
                        }),
                    }
                }
            })
        });
        provider
    }

    #[tokio::test]
    async fn test_safe_info() {
        let reader = SafeReader::new(
            Arc::new(deployed_safe_provider(Some("1.3.0"))),
            SafeVersion::V1_1_1,
        );
        let info = reader.safe_info(Address::repeat_byte(9)).await.unwrap();
        assert_eq!(info.nonce, U256::from(4u64));
        assert_eq!(info.threshold, 2);
        assert_eq!(info.owners.len(), 2);
        assert_eq!(info.master_copy, Address::repeat_byte(0x11));
        assert_eq!(info.version, "1.3.0");
        assert_eq!(
            reader.version(Address::repeat_byte(9)).await.unwrap(),
            SafeVersion::V1_3_0
        );
    }

    #[tokio::test]
    async fn test_version_falls_back_to_default() {
        let reader = SafeReader::new(Arc::new(deployed_safe_provider(None)), SafeVersion::V1_1_1);
        assert_eq!(
            reader.version(Address::repeat_byte(9)).await.unwrap(),
            SafeVersion::V1_1_1
        );
        let info = reader.safe_info(Address::repeat_byte(9)).await.unwrap();
        assert_eq!(info.version, "1.1.1");
    }

    #[tokio::test]
    async fn test_safe_info_requires_code() {
        let mut provider = MockEvmProviderTrait::new();
        provider
            .expect_get_code()
            .returning(|_| Box::pin(async { Ok(Bytes::new()) }));
        let reader = SafeReader::new(Arc::new(provider), SafeVersion::V1_1_1);
        assert!(matches!(
            reader.safe_info(Address::repeat_byte(9)).await,
            Err(SafeRelayError::SafeNotDeployed(_))
        ));
    }
}
