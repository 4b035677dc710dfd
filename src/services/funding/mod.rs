//! Ether transfers from the funder account.
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use tracing::info;

use crate::constants::ETHER_TRANSFER_GAS;
use crate::models::SafeRelayError;
use crate::services::{
    EvmProviderTrait, GasStationService, GasStationTrait, TransactionParams, TransactionSender,
};

pub struct FundingService<P: EvmProviderTrait> {
    sender: Arc<TransactionSender<P>>,
    gas_station: Arc<GasStationService<P>>,
    max_eth: U256,
}

impl<P: EvmProviderTrait> FundingService<P> {
    /// `max_eth` caps a single transfer, in wei.
    pub fn new(
        sender: Arc<TransactionSender<P>>,
        gas_station: Arc<GasStationService<P>>,
        max_eth: U256,
    ) -> Self {
        Self {
            sender,
            gas_station,
            max_eth,
        }
    }

    pub fn funder(&self) -> Address {
        self.sender.address()
    }

    /// Sends `value` wei to `to`, at `gas_price` or the standard network price.
    pub async fn send_eth_to(
        &self,
        to: Address,
        value: U256,
        gas_price: Option<u128>,
    ) -> Result<B256, SafeRelayError> {
        if value > self.max_eth {
            return Err(SafeRelayError::EtherLimitExceeded {
                value,
                limit: self.max_eth,
            });
        }

        let gas_price = match gas_price {
            Some(gas_price) => gas_price,
            None => self.gas_station.get_gas_prices().await?.standard,
        };

        let sent = self
            .sender
            .send(TransactionParams {
                to: TxKind::Call(to),
                value,
                input: Bytes::new(),
                gas_limit: ETHER_TRANSFER_GAS,
                gas_price,
            })
            .await?;

        info!(to = %to, value = %value, tx_hash = %sent.hash, "ether sent");
        Ok(sent.hash)
    }
}
