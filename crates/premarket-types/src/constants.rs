//! System-wide constants for the Premarket exchange.

/// Fractional digits of the internal amount unit (points, value, collateral).
pub const AMOUNT_DECIMALS: u8 = 18;

/// `10^AMOUNT_DECIMALS`: one whole unit in the internal representation.
pub const AMOUNT_SCALE: u128 = 1_000_000_000_000_000_000;

/// Denominator for every rate (pledge, refund fee, settle fee): parts per million.
pub const RATE_SCALE: u32 = 1_000_000;

/// Minimum settlement window length (24 hours).
pub const MIN_SETTLE_DURATION_SECS: u64 = 24 * 60 * 60;

/// Upper bound for the settlement fee rate (10%).
pub const MAX_FEE_SETTLE_RATE: u32 = 100_000;

/// Upper bound for the cancellation refund fee rate (10%).
pub const MAX_FEE_REFUND_RATE: u32 = 100_000;

/// Lower bound for the pledge rate (1%).
pub const MIN_PLEDGE_RATE: u32 = 10_000;

/// Upper bound for the pledge rate (100%).
pub const MAX_PLEDGE_RATE: u32 = RATE_SCALE;

/// Default pledge rate: sellers lock collateral equal to the trade value.
pub const DEFAULT_PLEDGE_RATE: u32 = RATE_SCALE;

/// Default settlement fee rate (2.5%).
pub const DEFAULT_FEE_SETTLE_RATE: u32 = 25_000;

/// Default cancellation refund fee rate (0.5%).
pub const DEFAULT_FEE_REFUND_RATE: u32 = 5_000;

/// Precision of the native currency.
pub const NATIVE_DECIMALS: u8 = 18;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Premarket";
