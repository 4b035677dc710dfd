//! # Gas Price Module
//!
//! Gas price levels used to price relayed transactions, Safe creations and
//! funding transfers.
//!
//! ```text
//! GasStationService
//!   ├── Network - samples recent blocks, cached until the next refresh
//!   └── Fixed   - constant prices for development chains
//! ```
use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::models::GasPrices;
use crate::services::{EvmProviderTrait, ProviderError};

mod gas_station;
pub use gas_station::*;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GasStationError {
    #[error("No blocks with gas prices found in the sampled range")]
    NoBlocksFound,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl GasStationError {
    pub fn is_transient(&self) -> bool {
        match self {
            // A young chain fills up eventually
            GasStationError::NoBlocksFound => true,
            GasStationError::Provider(e) => e.is_transient(),
        }
    }
}

#[async_trait]
#[cfg_attr(test, automock)]
pub trait GasStationTrait: Send + Sync {
    /// Current gas price levels, from the cache when one is available.
    async fn get_gas_prices(&self) -> Result<GasPrices, GasStationError>;

    /// Recomputes the gas price levels and replaces the cached ones.
    async fn refresh(&self) -> Result<GasPrices, GasStationError>;
}

pub enum GasStationService<P: EvmProviderTrait> {
    Network(NetworkGasStation<P>),
    Fixed(FixedGasStation),
}

#[async_trait]
impl<P: EvmProviderTrait> GasStationTrait for GasStationService<P> {
    async fn get_gas_prices(&self) -> Result<GasPrices, GasStationError> {
        match self {
            GasStationService::Network(station) => station.get_gas_prices().await,
            GasStationService::Fixed(station) => station.get_gas_prices().await,
        }
    }

    async fn refresh(&self) -> Result<GasPrices, GasStationError> {
        match self {
            GasStationService::Network(station) => station.refresh().await,
            GasStationService::Fixed(station) => station.refresh().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockEvmProviderTrait;

    #[test]
    fn test_gas_station_error_is_transient() {
        assert!(GasStationError::NoBlocksFound.is_transient());
        assert!(GasStationError::Provider(ProviderError::Timeout).is_transient());
        assert!(!GasStationError::Provider(ProviderError::InvalidAddress("x".into())).is_transient());
    }

    #[tokio::test]
    async fn test_service_dispatches_to_fixed_station() {
        let service: GasStationService<MockEvmProviderTrait> =
            GasStationService::Fixed(FixedGasStation::new(Some(1)));
        let prices = service.refresh().await.unwrap();
        assert_eq!(prices.fast, 4 * crate::constants::GWEI);
    }
}
