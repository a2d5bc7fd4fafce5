//! Offer model: a standing, escrowed buy or sell commitment for a token.
//!
//! A BUY offer escrows `value` up front; a SELL offer escrows `collateral`.
//! Whoever fills the offer escrows the opposite leg for the filled share.

use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetId, OfferId, Result, TokenId, math};

/// Which side the offer creator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OfferSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OfferSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an offer. FILLED and CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferStatus {
    Open,
    Filled,
    Cancelled,
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// An offer. `amount`, `value` and `collateral` are 18-digit internal units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub side: OfferSide,
    pub token_id: TokenId,
    pub settlement_asset: AssetId,
    /// Points offered.
    pub amount: u128,
    /// Price of the full `amount` in settlement-asset value.
    pub value: u128,
    /// `value * pledge_rate`, locked by the selling party.
    pub collateral: u128,
    pub filled_amount: u128,
    pub status: OfferStatus,
    pub creator: AccountId,
    /// Only a single fill of the entire amount is accepted.
    pub full_match_required: bool,
}

impl Offer {
    /// Points still available to fill.
    #[must_use]
    pub fn available(&self) -> u128 {
        self.amount.saturating_sub(self.filled_amount)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == OfferStatus::Open
    }

    /// The leg the creator escrows: value for BUY, collateral for SELL.
    #[must_use]
    pub fn creator_leg(&self) -> u128 {
        match self.side {
            OfferSide::Buy => self.value,
            OfferSide::Sell => self.collateral,
        }
    }

    /// The leg a filler escrows: collateral for BUY, value for SELL.
    #[must_use]
    pub fn filler_leg(&self) -> u128 {
        match self.side {
            OfferSide::Buy => self.collateral,
            OfferSide::Sell => self.value,
        }
    }

    /// Value attributable to `points` of this offer (floor).
    pub fn value_share(&self, points: u128) -> Result<u128> {
        math::share(self.value, points, self.amount)
    }

    /// Collateral attributable to `points` of this offer (floor).
    pub fn collateral_share(&self, points: u128) -> Result<u128> {
        math::share(self.collateral, points, self.amount)
    }

    /// `(seller, buyer)` of a fill by `filler`.
    #[must_use]
    pub fn parties_for(&self, filler: AccountId) -> (AccountId, AccountId) {
        match self.side {
            OfferSide::Buy => (filler, self.creator),
            OfferSide::Sell => (self.creator, filler),
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Offer {
    /// An OPEN offer with full collateral, settled in `asset`.
    pub fn dummy(side: OfferSide, asset: AssetId, amount: u128, value: u128) -> Self {
        Self {
            id: OfferId(1),
            side,
            token_id: TokenId::new(),
            settlement_asset: asset,
            amount,
            value,
            collateral: value,
            filled_amount: 0,
            status: OfferStatus::Open,
            creator: AccountId::new(),
            full_match_required: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legs_follow_side() {
        let mut offer = Offer::dummy(OfferSide::Buy, AssetId::Native, 100, 1_000);
        offer.collateral = 500;
        assert_eq!(offer.creator_leg(), 1_000);
        assert_eq!(offer.filler_leg(), 500);
        offer.side = OfferSide::Sell;
        assert_eq!(offer.creator_leg(), 500);
        assert_eq!(offer.filler_leg(), 1_000);
    }

    #[test]
    fn parties_follow_side() {
        let filler = AccountId::new();
        let mut offer = Offer::dummy(OfferSide::Buy, AssetId::Native, 100, 1_000);
        assert_eq!(offer.parties_for(filler), (filler, offer.creator));
        offer.side = OfferSide::Sell;
        assert_eq!(offer.parties_for(filler), (offer.creator, filler));
    }

    #[test]
    fn shares_are_pro_rata() {
        let offer = Offer::dummy(OfferSide::Sell, AssetId::Native, 100, 1_000);
        assert_eq!(offer.value_share(60).unwrap(), 600);
        assert_eq!(offer.collateral_share(40).unwrap(), 400);
    }

    #[test]
    fn available_tracks_fills() {
        let mut offer = Offer::dummy(OfferSide::Buy, AssetId::Native, 100, 1_000);
        offer.filled_amount = 60;
        assert_eq!(offer.available(), 40);
        assert!(offer.is_open());
    }
}
