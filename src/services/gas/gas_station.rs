//! Gas price oracle built from the gas prices paid in recent blocks.
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use itertools::Itertools;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{GasStationError, GasStationTrait};
use crate::constants::{GWEI, MOCK_GAS_PRICES_GWEI};
use crate::models::GasPrices;
use crate::services::EvmProviderTrait;

/// Blocks fetched concurrently while sampling.
const BLOCK_FETCH_CONCURRENCY: usize = 10;

/// Added to every level so API submissions get mined slightly faster.
const CONSTANT_GAS_INCREMENT: u128 = 1;

/// Linear interpolated percentile of an ascending slice, like numpy's default.
fn percentile(sorted: &[u128], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let low = sorted[lower] as f64;
    let high = sorted[upper] as f64;
    low + (high - low) * (rank - lower as f64)
}

/// Derives the gas price levels from a sample of paid gas prices.
///
/// Zero prices (miner transactions) are ignored.
pub fn calculate_gas_prices(samples: &[u128]) -> Result<GasPrices, GasStationError> {
    let sorted: Vec<u128> = samples.iter().copied().filter(|p| *p > 0).sorted().collect();
    let (Some(min), Some(max)) = (sorted.first(), sorted.last()) else {
        return Err(GasStationError::NoBlocksFound);
    };

    Ok(GasPrices {
        lowest: min + CONSTANT_GAS_INCREMENT,
        safe_low: percentile(&sorted, 30.0).ceil() as u128 + CONSTANT_GAS_INCREMENT,
        standard: percentile(&sorted, 50.0).ceil() as u128 + CONSTANT_GAS_INCREMENT,
        fast: percentile(&sorted, 75.0).ceil() as u128 + CONSTANT_GAS_INCREMENT,
        fastest: max + CONSTANT_GAS_INCREMENT,
    })
}

/// Samples the last `number_of_blocks` blocks of the chain.
pub struct NetworkGasStation<P: EvmProviderTrait> {
    provider: Arc<P>,
    number_of_blocks: u64,
    latest: RwLock<Option<GasPrices>>,
}

impl<P: EvmProviderTrait> NetworkGasStation<P> {
    pub fn new(provider: Arc<P>, number_of_blocks: u64) -> Self {
        Self {
            provider,
            number_of_blocks,
            latest: RwLock::new(None),
        }
    }

    async fn sample_gas_prices(&self) -> Result<Vec<u128>, GasStationError> {
        let current = self.provider.get_block_number().await?;
        let first = current.saturating_sub(self.number_of_blocks);

        let blocks: Vec<(u64, Option<Vec<u128>>)> = stream::iter(first..current)
            .map(|number| async move {
                self.provider
                    .get_block_gas_prices(number)
                    .await
                    .map(|prices| (number, prices))
            })
            .buffer_unordered(BLOCK_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        let mut samples = Vec::new();
        for (number, prices) in blocks {
            match prices {
                Some(prices) => samples.extend(prices),
                None => warn!(block_number = number, "cannot find block, a reorg happened"),
            }
        }
        debug!(
            from_block = first,
            to_block = current,
            samples = samples.len(),
            "sampled gas prices"
        );
        Ok(samples)
    }
}

#[async_trait]
impl<P: EvmProviderTrait> GasStationTrait for NetworkGasStation<P> {
    async fn get_gas_prices(&self) -> Result<GasPrices, GasStationError> {
        if let Some(prices) = *self.latest.read().await {
            return Ok(prices);
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<GasPrices, GasStationError> {
        let samples = self.sample_gas_prices().await?;
        let prices = calculate_gas_prices(&samples)?;
        *self.latest.write().await = Some(prices);
        info!(
            lowest = prices.lowest,
            safe_low = prices.safe_low,
            standard = prices.standard,
            fast = prices.fast,
            fastest = prices.fastest,
            "gas prices updated"
        );
        Ok(prices)
    }
}

/// Constant gas prices, for development chains and tests.
#[derive(Debug, Clone)]
pub struct FixedGasStation {
    prices: GasPrices,
}

impl FixedGasStation {
    /// `gas_price_gwei` sets the lowest level, each following level adds one gwei.
    /// Without it the levels are 1, 5, 10, 20 and 50 gwei.
    pub fn new(gas_price_gwei: Option<u128>) -> Self {
        let levels = match gas_price_gwei {
            Some(base) => [base, base + 1, base + 2, base + 3, base + 4],
            None => MOCK_GAS_PRICES_GWEI,
        };
        Self {
            prices: GasPrices {
                lowest: levels[0] * GWEI,
                safe_low: levels[1] * GWEI,
                standard: levels[2] * GWEI,
                fast: levels[3] * GWEI,
                fastest: levels[4] * GWEI,
            },
        }
    }
}

#[async_trait]
impl GasStationTrait for FixedGasStation {
    async fn get_gas_prices(&self) -> Result<GasPrices, GasStationError> {
        Ok(self.prices)
    }

    async fn refresh(&self) -> Result<GasPrices, GasStationError> {
        Ok(self.prices)
    }
}
