//! Safes deployed by a one-shot deployer account.
//!
//! The client picks `s`. The relay searches an `r` that makes `(v, r, s)` a
//! valid signature of the nonce 0 contract creation transaction, so the
//! recovered sender becomes an account nobody holds a key for. Funding that
//! account and broadcasting the pre-signed transaction deploys the Safe at
//! `CREATE(deployer, 0)`.
use alloy::{
    consensus::{SignableTransaction, TxLegacy},
    primitives::{uint, Address, Bytes, Signature, TxKind, U256},
    sol_types::{SolCall, SolValue},
};
use tracing::debug;

use super::contracts::IGnosisSafeV0;
use crate::constants::{
    CREATION_PAYMENT_GAS_OVERHEAD, LEGACY_CREATION_BASE_GAS, LEGACY_CREATION_DATA_GAS_PER_BYTE,
    LEGACY_CREATION_GAS_PER_OWNER, LEGACY_CREATION_SETUP_GAS, LEGACY_CREATION_TOKEN_GAS,
    LEGACY_DEPLOYER_MAX_ATTEMPTS, MAX_ADDRESS,
};
use crate::models::{LegacySafeCreation, SafeRelayError, Token};

/// Upper bound of a non malleable `s` (secp256k1 order / 2).
const SECP256K1N_HALF: U256 =
    uint!(0x7FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF5D576E7357A4501DDFE92F46681B20A0_U256);

#[derive(Debug, Clone)]
pub struct LegacyCreationParams<'a> {
    pub s: U256,
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub master_copy: Address,
    pub paying_proxy_code: &'a [u8],
    /// Receives the payment once deployed. Without a funder nothing is charged.
    pub funder: Option<Address>,
    pub payment_token: Option<&'a Token>,
    pub fixed_creation_cost: Option<U256>,
    pub gas_price: u128,
}

/// `setup(owners, threshold, 0x0, "")` of the pre 1.0.0 master copy.
pub fn build_legacy_setup_data(owners: &[Address], threshold: u64) -> Bytes {
    IGnosisSafeV0::setupCall {
        _owners: owners.to_vec(),
        _threshold: U256::from(threshold),
        to: Address::ZERO,
        data: Bytes::new(),
    }
    .abi_encode()
    .into()
}

pub fn calculate_legacy_creation_gas(owners: usize, setup_data_len: usize, token: bool) -> u64 {
    let token_gas = if token { LEGACY_CREATION_TOKEN_GAS } else { 0 };
    LEGACY_CREATION_BASE_GAS
        + LEGACY_CREATION_DATA_GAS_PER_BYTE * setup_data_len as u64
        + token_gas
        + LEGACY_CREATION_SETUP_GAS
        + owners as u64 * LEGACY_CREATION_GAS_PER_OWNER
}

/// Searches an `(v, r)` pair for `s` that recovers a usable sender of `tx`.
pub fn find_legacy_deployer(tx: &TxLegacy, s: U256) -> Result<(u8, U256, Address), SafeRelayError> {
    if s.is_zero() || s > SECP256K1N_HALF {
        return Err(SafeRelayError::InvalidLegacySignature);
    }
    let hash = tx.signature_hash();

    for attempt in 0..LEGACY_DEPLOYER_MAX_ATTEMPTS {
        // 31 bytes keep r below the curve order
        let r = U256::from_be_slice(&rand::random::<[u8; 31]>());
        if r.is_zero() {
            continue;
        }
        let odd = r.bit(0);
        let signature = Signature::new(r, s, odd);
        match signature.recover_address_from_prehash(&hash) {
            Ok(sender) if sender != Address::ZERO && sender != MAX_ADDRESS => {
                return Ok((27 + u8::from(odd), r, sender));
            }
            Ok(_) => {}
            Err(e) => debug!(attempt, error = %e, "no valid signature for random r"),
        }
    }
    Err(SafeRelayError::InvalidLegacySignature)
}

/// Builds the full legacy creation plan.
pub fn build_legacy_creation(
    params: LegacyCreationParams<'_>,
) -> Result<LegacySafeCreation, SafeRelayError> {
    if params.owners.is_empty() {
        return Err(SafeRelayError::InvalidOwners("owners cannot be empty".to_string()));
    }
    if params.threshold == 0 || params.threshold as usize > params.owners.len() {
        return Err(SafeRelayError::InvalidThreshold {
            threshold: params.threshold,
            owners: params.owners.len(),
        });
    }

    let setup_data = build_legacy_setup_data(&params.owners, params.threshold);
    let gas = calculate_legacy_creation_gas(
        params.owners.len(),
        setup_data.len(),
        params.payment_token.is_some(),
    );

    let payment = match (params.funder, params.fixed_creation_cost) {
        (None, _) => U256::ZERO,
        (Some(_), Some(fixed)) => fixed,
        (Some(_), None) => {
            let payment_ether = U256::from(gas + CREATION_PAYMENT_GAS_OVERHEAD)
                * U256::from(params.gas_price);
            match params.payment_token {
                Some(token) => token
                    .calculate_payment(payment_ether)
                    .ok_or(SafeRelayError::CannotGetTokenPrice(token.address))?,
                None => payment_ether,
            }
        }
    };
    let funder = params.funder.unwrap_or(Address::ZERO);
    let payment_token = params.payment_token.map(|token| token.address);

    let mut input = params.paying_proxy_code.to_vec();
    input.extend(
        (
            params.master_copy,
            setup_data,
            funder,
            payment_token.unwrap_or(Address::ZERO),
            payment,
        )
            .abi_encode_params(),
    );

    let tx = TxLegacy {
        chain_id: None,
        nonce: 0,
        gas_price: params.gas_price,
        gas_limit: gas,
        to: TxKind::Create,
        value: U256::ZERO,
        input: input.into(),
    };
    let (v, r, deployer) = find_legacy_deployer(&tx, params.s)?;

    let signed = tx.into_signed(Signature::new(r, params.s, v == 28));
    let mut raw = Vec::new();
    signed.rlp_encode(&mut raw);

    Ok(LegacySafeCreation {
        safe: deployer.create(0),
        deployer,
        master_copy: params.master_copy,
        funder: params.funder,
        owners: params.owners,
        threshold: params.threshold,
        payment,
        payment_token,
        gas,
        gas_price: params.gas_price,
        v,
        r,
        s: params.s,
        signed_tx: raw.into(),
        tx_hash: *signed.hash(),
        created_at: chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::create_test_token;
    use alloy::{
        consensus::{transaction::SignerRecoverable, Transaction as _, TxEnvelope},
        eips::eip2718::Decodable2718,
        primitives::bytes,
    };

    const GAS_PRICE: u128 = 20_000_000_000;

    fn owners() -> Vec<Address> {
        vec![Address::repeat_byte(0x11), Address::repeat_byte(0x22)]
    }

    fn params(code: &[u8]) -> LegacyCreationParams<'_> {
        LegacyCreationParams {
            s: U256::from(0x1234_5678_9abc_def0u64) << 128,
            owners: owners(),
            threshold: 2,
            master_copy: Address::repeat_byte(0x33),
            paying_proxy_code: code,
            funder: Some(Address::repeat_byte(0x44)),
            payment_token: None,
            fixed_creation_cost: None,
            gas_price: GAS_PRICE,
        }
    }

    #[test]
    fn test_build_legacy_creation() {
        let code = bytes!("6080604052");
        let creation = build_legacy_creation(params(&code)).unwrap();

        assert_eq!(creation.safe, creation.deployer.create(0));
        assert_ne!(creation.deployer, Address::ZERO);
        assert_eq!(creation.v, 27 + u8::from(creation.r.bit(0)));

        let expected_gas = calculate_legacy_creation_gas(
            2,
            build_legacy_setup_data(&owners(), 2).len(),
            false,
        );
        assert_eq!(creation.gas, expected_gas);
        assert_eq!(
            creation.payment,
            U256::from(expected_gas + 23_000) * U256::from(GAS_PRICE)
        );

        let envelope = TxEnvelope::decode_2718(&mut creation.signed_tx.as_ref()).unwrap();
        assert_eq!(envelope.recover_signer().unwrap(), creation.deployer);
        assert_eq!(*envelope.tx_hash(), creation.tx_hash);
        assert_eq!(envelope.nonce(), 0);
        assert!(envelope.kind().is_create());
        assert!(envelope.input().starts_with(&code));
    }

    #[test]
    fn test_each_plan_gets_a_fresh_deployer() {
        let code = bytes!("6080604052");
        let first = build_legacy_creation(params(&code)).unwrap();
        let second = build_legacy_creation(params(&code)).unwrap();
        assert_ne!(first.r, second.r);
        assert_ne!(first.deployer, second.deployer);
    }

    #[test]
    fn test_payment_in_token_and_fixed() {
        let code = bytes!("6080604052");
        let token = create_test_token(Address::repeat_byte(0x55), true);
        let mut with_token = params(&code);
        with_token.payment_token = Some(&token);
        let creation = build_legacy_creation(with_token).unwrap();
        assert_eq!(creation.payment_token, Some(token.address));
        assert!(creation.gas > build_legacy_creation(params(&code)).unwrap().gas);

        let mut fixed = params(&code);
        fixed.fixed_creation_cost = Some(U256::from(7u64));
        assert_eq!(build_legacy_creation(fixed).unwrap().payment, U256::from(7u64));

        let mut no_funder = params(&code);
        no_funder.funder = None;
        assert_eq!(build_legacy_creation(no_funder).unwrap().payment, U256::ZERO);
    }

    #[test]
    fn test_rejects_invalid_s() {
        let code = bytes!("6080604052");
        let mut zero = params(&code);
        zero.s = U256::ZERO;
        assert!(matches!(
            build_legacy_creation(zero),
            Err(SafeRelayError::InvalidLegacySignature)
        ));

        let mut high = params(&code);
        high.s = SECP256K1N_HALF + U256::from(1u64);
        assert!(matches!(
            build_legacy_creation(high),
            Err(SafeRelayError::InvalidLegacySignature)
        ));
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let code = bytes!("6080604052");
        let mut p = params(&code);
        p.threshold = 3;
        assert!(matches!(
            build_legacy_creation(p),
            Err(SafeRelayError::InvalidThreshold { threshold: 3, owners: 2 })
        ));
    }
}
