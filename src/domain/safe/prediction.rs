//! Counterfactual Safe addresses. Nothing here touches the network.
use alloy::{
    primitives::{keccak256, Address, Bytes, B256, U256},
    sol_types::{SolCall, SolValue},
};

use super::contracts::IGnosisSafe;

/// Arguments of `GnosisSafe.setup`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetupParams {
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub to: Address,
    pub data: Bytes,
    pub fallback_handler: Address,
    pub payment_token: Address,
    pub payment: U256,
    pub payment_receiver: Address,
}

/// ABI call data of `setup`, the initializer the factory runs on the new proxy.
pub fn build_setup_data(params: &SetupParams) -> Bytes {
    IGnosisSafe::setupCall {
        _owners: params.owners.clone(),
        _threshold: U256::from(params.threshold),
        to: params.to,
        data: params.data.clone(),
        fallbackHandler: params.fallback_handler,
        paymentToken: params.payment_token,
        payment: params.payment,
        paymentReceiver: params.payment_receiver,
    }
    .abi_encode()
    .into()
}

/// Salt the factory derives for `createProxyWithNonce`.
pub fn create2_salt(initializer: &[u8], salt_nonce: U256) -> B256 {
    keccak256((keccak256(initializer), salt_nonce).abi_encode())
}

/// Proxy deployment code: the factory's creation code followed by the master copy.
pub fn proxy_init_code(proxy_creation_code: &[u8], master_copy: Address) -> Vec<u8> {
    let mut init_code = proxy_creation_code.to_vec();
    init_code.extend_from_slice(&master_copy.abi_encode());
    init_code
}

/// Address `createProxyWithNonce(master_copy, initializer, salt_nonce)` deploys to.
pub fn predict_safe_address(
    proxy_factory: Address,
    master_copy: Address,
    proxy_creation_code: &[u8],
    initializer: &[u8],
    salt_nonce: U256,
) -> Address {
    let salt = create2_salt(initializer, salt_nonce);
    let init_code_hash = keccak256(proxy_init_code(proxy_creation_code, master_copy));
    proxy_factory.create2(salt, init_code_hash)
}

/// Address of the contract created by `sender`'s transaction with `nonce`.
pub fn predict_legacy_address(sender: Address, nonce: u64) -> Address {
    sender.create(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, bytes};
    use proptest::prelude::*;

    const FACTORY: Address = address!("0x76E2cFc1F5Fa8F6a5b3fC4c8F4788F0116861F9B");
    const MASTER_COPY: Address = address!("0x34CfAC646f301356fAa8B21e94227e3583Fe3F5F");

    fn creation_code() -> Bytes {
        bytes!("608060405234801561001057600080fd5b5060405161016b38038061016b")
    }

    fn initializer() -> Bytes {
        build_setup_data(&SetupParams {
            owners: vec![Address::repeat_byte(0xa1), Address::repeat_byte(0xb2)],
            threshold: 2,
            payment: U256::from(1_000u64),
            payment_receiver: Address::repeat_byte(0xfe),
            ..Default::default()
        })
    }

    #[test]
    fn test_create2_matches_eip1014_vector() {
        // Example 1 of EIP-1014: zero deployer, zero salt, init code 0x00
        let address = Address::ZERO.create2(B256::ZERO, keccak256([0u8]));
        assert_eq!(
            address,
            address!("0x4D1A2e2bB4F88F0250f26Ffff098B0b30B26BF38")
        );
    }

    #[test]
    fn test_salt_layout() {
        let init = initializer();
        let mut preimage = keccak256(&init).to_vec();
        preimage.extend_from_slice(&U256::from(17051863u64).to_be_bytes::<32>());
        assert_eq!(
            create2_salt(&init, U256::from(17051863u64)),
            keccak256(preimage)
        );
    }

    #[test]
    fn test_init_code_appends_padded_master_copy() {
        let code = creation_code();
        let init_code = proxy_init_code(&code, MASTER_COPY);
        assert_eq!(init_code.len(), code.len() + 32);
        assert_eq!(&init_code[code.len()..code.len() + 12], &[0u8; 12]);
        assert_eq!(&init_code[code.len() + 12..], MASTER_COPY.as_slice());
    }

    #[test]
    fn test_setup_data_selector() {
        let data = initializer();
        assert_eq!(&data[..4], IGnosisSafe::setupCall::SELECTOR.as_slice());
        let decoded = IGnosisSafe::setupCall::abi_decode(&data).unwrap();
        assert_eq!(decoded._threshold, U256::from(2));
        assert_eq!(decoded._owners.len(), 2);
    }

    #[test]
    fn test_legacy_address() {
        // Deterministic deployment proxy deployer, first contract
        let deployer = address!("0x3fab184622dc19b6109349b94811493bf2a45362");
        assert_eq!(
            predict_legacy_address(deployer, 0),
            address!("0x4e59b44847b379578588920ca78fbf26c0b4956c")
        );
    }

    #[test]
    fn test_prediction_is_stable() {
        let first = predict_safe_address(
            FACTORY,
            MASTER_COPY,
            &creation_code(),
            &initializer(),
            U256::from(17051863u64),
        );
        let second = predict_safe_address(
            FACTORY,
            MASTER_COPY,
            &creation_code(),
            &initializer(),
            U256::from(17051863u64),
        );
        assert_eq!(first, second);
        assert_ne!(first, Address::ZERO);
    }

    proptest! {
        #[test]
        fn prop_prediction_deterministic_and_sensitive(
            factory in any::<[u8; 20]>(),
            master_copy in any::<[u8; 20]>(),
            initializer in proptest::collection::vec(any::<u8>(), 0..256),
            salt in any::<u64>(),
            flip in any::<u8>(),
        ) {
            let factory = Address::from(factory);
            let master_copy = Address::from(master_copy);
            let code = creation_code();
            let salt = U256::from(salt);
            let base = predict_safe_address(factory, master_copy, &code, &initializer, salt);

            prop_assert_eq!(base, predict_safe_address(factory, master_copy, &code, &initializer, salt));

            prop_assert_ne!(base, predict_safe_address(factory, master_copy, &code, &initializer, salt + U256::from(1)));

            let mut other_factory = factory.0 .0;
            other_factory[0] ^= flip | 1;
            prop_assert_ne!(base, predict_safe_address(Address::from(other_factory), master_copy, &code, &initializer, salt));

            let mut other_master = master_copy.0 .0;
            other_master[19] ^= flip | 1;
            prop_assert_ne!(base, predict_safe_address(factory, Address::from(other_master), &code, &initializer, salt));

            let mut other_init = initializer.clone();
            other_init.push(flip);
            prop_assert_ne!(base, predict_safe_address(factory, master_copy, &code, &other_init, salt));
        }
    }
}
