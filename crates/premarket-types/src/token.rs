//! Points token model and its phase machine.
//!
//! ```text
//!   ┌────────┐ toggle ┌──────────┐
//!   │ ACTIVE │◀──────▶│ INACTIVE │
//!   └───┬────┘        └────┬─────┘
//!       │ enter settle     │ enter settle
//!       ▼                  ▼
//!   ┌────────────────────────────┐  abort   ┌──────────┐
//!   │           SETTLE           ├─────────▶│ INACTIVE │
//!   └────────────────────────────┘          └──────────┘
//! ```
//!
//! Offers may be created and filled only while ACTIVE. Orders may be
//! settled or unwound only while SETTLE.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{AssetId, TokenId};

/// Lifecycle phase of a points token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStatus {
    Active,
    Inactive,
    Settle,
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Inactive => write!(f, "INACTIVE"),
            Self::Settle => write!(f, "SETTLE"),
        }
    }
}

/// A pre-launch points token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    /// Deliverable asset, known once the token enters SETTLE.
    pub custody_asset: Option<AssetId>,
    /// When the token entered SETTLE.
    pub settle_time: Option<DateTime<Utc>>,
    /// Length of the settlement window in seconds (≥ 24h).
    pub settle_duration_secs: u64,
    /// Deliverable units (18-digit) per one point. Zero until SETTLE.
    pub settle_rate: u128,
    pub status: TokenStatus,
}

/// Everything needed to settle an order against a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementTerms {
    pub asset: AssetId,
    pub rate: u128,
    pub settle_time: DateTime<Utc>,
}

impl Token {
    /// A freshly registered, ACTIVE token.
    #[must_use]
    pub fn new(id: TokenId, settle_duration_secs: u64) -> Self {
        Self {
            id,
            custody_asset: None,
            settle_time: None,
            settle_duration_secs,
            settle_rate: 0,
            status: TokenStatus::Active,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TokenStatus::Active
    }

    /// ACTIVE and INACTIVE are the only phases that may toggle or enter SETTLE.
    #[must_use]
    pub fn is_pre_settle(&self) -> bool {
        matches!(self.status, TokenStatus::Active | TokenStatus::Inactive)
    }

    /// Settlement terms, if the token is in SETTLE with all of them recorded.
    #[must_use]
    pub fn settlement_terms(&self) -> Option<SettlementTerms> {
        if self.status != TokenStatus::Settle || self.settle_rate == 0 {
            return None;
        }
        Some(SettlementTerms {
            asset: self.custody_asset.clone()?,
            rate: self.settle_rate,
            settle_time: self.settle_time?,
        })
    }

    /// End of the settlement window, after which unwinds are allowed.
    /// `None` only before the settle phase; a window too long to represent
    /// saturates to the latest representable instant.
    #[must_use]
    pub fn settle_deadline(&self) -> Option<DateTime<Utc>> {
        let start = self.settle_time?;
        let window = i64::try_from(self.settle_duration_secs)
            .ok()
            .and_then(Duration::try_seconds);
        Some(
            window
                .and_then(|w| start.checked_add_signed(w))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Token {
    /// A token already in SETTLE with the given deliverable asset and rate.
    pub fn dummy_settling(asset: AssetId, rate: u128, settle_time: DateTime<Utc>) -> Self {
        Self {
            id: TokenId::new(),
            custody_asset: Some(asset),
            settle_time: Some(settle_time),
            settle_duration_secs: crate::constants::MIN_SETTLE_DURATION_SECS,
            settle_rate: rate,
            status: TokenStatus::Settle,
        }
    }
}
