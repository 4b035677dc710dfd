use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// ERC-20 token registered with the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Price in ether of one whole token.
    pub fixed_eth_conversion: Option<f64>,
    /// Accepted as payment and gas token.
    pub gas: bool,
}

impl Token {
    /// Ether value of the smallest token unit, in wei.
    ///
    /// `None` when the token has no usable price.
    pub fn eth_value(&self) -> Option<f64> {
        let conversion = self.fixed_eth_conversion.filter(|c| *c > 0.0)?;
        Some(1e18 / 10f64.powi(i32::from(self.decimals)) * conversion)
    }

    /// Token units worth `eth` wei, rounded up.
    pub fn calculate_payment(&self, eth: U256) -> Option<U256> {
        let eth_value = self.eth_value()?;
        let eth = eth.saturating_to::<u128>() as f64;
        Some(U256::from((eth / eth_value).ceil() as u128))
    }

    /// Token denominated gas price equivalent to `gas_price` wei, scaled by `margin`.
    pub fn calculate_gas_price(&self, gas_price: u128, margin: f64) -> Option<u128> {
        let eth_value = self.eth_value()?;
        Some((gas_price as f64 / eth_value * margin).ceil() as u128)
    }
}
