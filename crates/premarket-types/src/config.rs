//! Configuration types for the exchange.
//!
//! [`FeeConfig`] holds the process-wide rates read by settlement arithmetic.
//! Bounds are enforced on every mutation via [`FeeConfig::validate`].

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FEE_REFUND_RATE, DEFAULT_FEE_SETTLE_RATE, DEFAULT_PLEDGE_RATE, MAX_FEE_REFUND_RATE,
    MAX_FEE_SETTLE_RATE, MAX_PLEDGE_RATE, MIN_PLEDGE_RATE,
};
use crate::{AccountId, AssetId, PremarketError, Result, math};

/// Fee and pledge parameters. Rates are parts per million.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Collateral required from sellers, relative to trade value.
    pub pledge_rate: u32,
    /// Fee withheld from cancellation refunds.
    pub fee_refund_rate: u32,
    /// Fee withheld on settlement.
    pub fee_settle_rate: u32,
    /// Recipient of every protocol fee.
    pub fee_wallet: AccountId,
}

impl FeeConfig {
    /// Default rates paying fees to `fee_wallet`.
    #[must_use]
    pub fn with_wallet(fee_wallet: AccountId) -> Self {
        Self {
            pledge_rate: DEFAULT_PLEDGE_RATE,
            fee_refund_rate: DEFAULT_FEE_REFUND_RATE,
            fee_settle_rate: DEFAULT_FEE_SETTLE_RATE,
            fee_wallet,
        }
    }

    /// Check every rate against its permitted range.
    pub fn validate(&self) -> Result<()> {
        if self.fee_settle_rate > MAX_FEE_SETTLE_RATE {
            return Err(PremarketError::InvalidConfig {
                reason: format!(
                    "fee_settle_rate {} exceeds {MAX_FEE_SETTLE_RATE}",
                    self.fee_settle_rate
                ),
            });
        }
        if self.fee_refund_rate > MAX_FEE_REFUND_RATE {
            return Err(PremarketError::InvalidConfig {
                reason: format!(
                    "fee_refund_rate {} exceeds {MAX_FEE_REFUND_RATE}",
                    self.fee_refund_rate
                ),
            });
        }
        if !(MIN_PLEDGE_RATE..=MAX_PLEDGE_RATE).contains(&self.pledge_rate) {
            return Err(PremarketError::InvalidConfig {
                reason: format!(
                    "pledge_rate {} outside [{MIN_PLEDGE_RATE}, {MAX_PLEDGE_RATE}]",
                    self.pledge_rate
                ),
            });
        }
        Ok(())
    }

    /// Collateral a seller locks for an offer worth `value`.
    pub fn collateral_for(&self, value: u128) -> Result<u128> {
        math::apply_rate(value, self.pledge_rate)
    }

    /// Parse and validate from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Bootstrap configuration for an exchange instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub fees: FeeConfig,
    /// Settlement assets accepted for new offers.
    #[serde(default)]
    pub accepted_assets: Vec<AssetId>,
}

impl ExchangeConfig {
    #[must_use]
    pub fn new(fees: FeeConfig) -> Self {
        Self {
            fees,
            accepted_assets: Vec::new(),
        }
    }

    /// Builder-style: accept an additional settlement asset.
    #[must_use]
    pub fn accept(mut self, asset: AssetId) -> Self {
        if !self.accepted_assets.contains(&asset) {
            self.accepted_assets.push(asset);
        }
        self
    }

    /// Parse and validate from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.fees.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RATE_SCALE;

    #[test]
    fn defaults_are_valid() {
        let cfg = FeeConfig::with_wallet(AccountId::new());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pledge_rate, RATE_SCALE);
    }

    #[test]
    fn full_pledge_collateral_equals_value() {
        let cfg = FeeConfig::with_wallet(AccountId::new());
        assert_eq!(cfg.collateral_for(100).unwrap(), 100);
    }

    #[test]
    fn bounds_enforced() {
        let base = FeeConfig::with_wallet(AccountId::new());

        let mut cfg = base.clone();
        cfg.fee_settle_rate = MAX_FEE_SETTLE_RATE + 1;
        assert!(matches!(cfg.validate(), Err(PremarketError::InvalidConfig { .. })));

        let mut cfg = base.clone();
        cfg.fee_refund_rate = MAX_FEE_REFUND_RATE + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.pledge_rate = MIN_PLEDGE_RATE - 1;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.pledge_rate = MAX_PLEDGE_RATE + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = base;
        cfg.pledge_rate = MIN_PLEDGE_RATE;
        cfg.fee_settle_rate = MAX_FEE_SETTLE_RATE;
        cfg.fee_refund_rate = MAX_FEE_REFUND_RATE;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn exchange_config_from_json() {
        let wallet = AccountId::new();
        let json = format!(
            r#"{{
                "fees": {{
                    "pledge_rate": 500000,
                    "fee_refund_rate": 5000,
                    "fee_settle_rate": 25000,
                    "fee_wallet": "{}"
                }},
                "accepted_assets": ["Native", {{"Contract": "0xusdc"}}]
            }}"#,
            wallet.0
        );
        let cfg = ExchangeConfig::from_json(&json).unwrap();
        assert_eq!(cfg.fees.fee_wallet, wallet);
        assert_eq!(cfg.fees.pledge_rate, 500_000);
        assert_eq!(cfg.accepted_assets.len(), 2);
    }

    #[test]
    fn out_of_range_json_rejected() {
        let json = format!(
            r#"{{"pledge_rate": 0, "fee_refund_rate": 0, "fee_settle_rate": 0, "fee_wallet": "{}"}}"#,
            AccountId::new().0
        );
        assert!(matches!(
            FeeConfig::from_json(&json),
            Err(PremarketError::InvalidConfig { .. })
        ));
        assert!(matches!(
            FeeConfig::from_json("not json"),
            Err(PremarketError::Serialization(_))
        ));
    }

    #[test]
    fn accept_deduplicates() {
        let cfg = ExchangeConfig::new(FeeConfig::with_wallet(AccountId::new()))
            .accept(AssetId::Native)
            .accept(AssetId::Native);
        assert_eq!(cfg.accepted_assets, vec![AssetId::Native]);
    }
}
