use serde::{Deserialize, Serialize};

/// Gas price levels in wei, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPrices {
    pub lowest: u128,
    pub safe_low: u128,
    pub standard: u128,
    pub fast: u128,
    pub fastest: u128,
}
