pub const GAS_TX_DATA_ZERO: u64 = 4; // Cost per zero byte in data
pub const GAS_TX_DATA_NONZERO: u64 = 16; // Cost per non-zero byte in data

/// Gas limit used for plain ether transfers from the funder.
pub const ETHER_TRANSFER_GAS: u64 = 22_000;

/// Overhead added to a creation gas estimate before converting it into a payment.
pub const CREATION_PAYMENT_GAS_OVERHEAD: u64 = 23_000;

/// Extra gas charged when a creation or a relayed tx is paid in an ERC-20 token.
pub const TOKEN_PAYMENT_EXTRA_GAS: u64 = 50_000;

/// Gas assumed for the token transfer performed by `setup` when paying in a token.
pub const TOKEN_SETUP_TRANSFER_GAS: u64 = 55_000;

/// Gas added on top of the `requiredTxGas` result.
pub const SAFE_TX_GAS_MARGIN: u64 = 10_000;

/// Calldata gas of one packed signature, as charged by `baseGas`.
pub const BASE_GAS_PER_SIGNATURE: u64 = 68 + 2 * 32 * 68;

/// Above this much calldata gas the memory expansion surcharge shrinks.
pub const BASE_GAS_LARGE_DATA_THRESHOLD: u64 = 65_536;

/// Intrinsic tx cost, refund transfer and bookkeeping covered by `baseGas`.
pub const BASE_GAS_TX_OVERHEAD: u64 = 32_000;

/// Gas price multiplier for replace-by-fee resubmissions (10% increase)
pub const MIN_BUMP_FACTOR: f64 = 1.1;

/// Number of recent blocks sampled by the gas station.
pub const DEFAULT_GAS_STATION_NUMBER_BLOCKS: u64 = 200;

/// Gas prices served by the fixed gas station, in gwei.
pub const MOCK_GAS_PRICES_GWEI: [u128; 5] = [1, 5, 10, 20, 50];

pub const GWEI: u128 = 1_000_000_000;

/// Wall clock age after which an unconfirmed legacy deploy tx hash is cleared.
pub const DEFAULT_LEGACY_DEPLOY_TIMEOUT_MINUTES: i64 = 10;

/// Wall clock age after which an unconfirmed CREATE2 deployment is replaced.
pub const DEFAULT_CREATE2_REPLACE_TIMEOUT_MINUTES: i64 = 30;

/// Intrinsic gas of the legacy paying proxy creation.
pub const LEGACY_CREATION_BASE_GAS: u64 = 60_580;

/// Calldata cost per byte at the time the legacy flow was priced.
pub const LEGACY_CREATION_DATA_GAS_PER_BYTE: u64 = 68;

/// Token transfer overhead of a legacy creation paid in a token.
pub const LEGACY_CREATION_TOKEN_GAS: u64 = 21_000;

/// Cost of running `setup` on the new proxy.
pub const LEGACY_CREATION_SETUP_GAS: u64 = 270_000;

/// Averaged storage cost per owner.
pub const LEGACY_CREATION_GAS_PER_OWNER: u64 = 18_020;
