//! Order model: one fill of an offer, settled or unwound independently.
//!
//! ```text
//!              settle filled / two-step   ┌───────────────┐
//!          ┌─────────────────────────────▶│ SETTLE_FILLED │
//!          │                              └───────────────┘
//!   ┌──────┴┐  unwind after deadline      ┌──────────────────┐
//!   │ OPEN  ├────────────────────────────▶│ SETTLE_CANCELLED │
//!   └──────┬┘                             └──────────────────┘
//!          │  operator force cancel       ┌───────────┐
//!          └─────────────────────────────▶│ CANCELLED │
//!                                         └───────────┘
//! ```
//!
//! Every transition leaves OPEN, so each order settles exactly once.

use serde::{Deserialize, Serialize};

use crate::{AccountId, AuditHash, OfferId, OrderId};

/// Lifecycle status of an order. Everything except OPEN is terminal.
///
/// Non-delivery unwind and operator force-cancel are distinct terminal
/// states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    SettleFilled,
    SettleCancelled,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Open
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::SettleFilled => write!(f, "SETTLE_FILLED"),
            Self::SettleCancelled => write!(f, "SETTLE_CANCELLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A binding match between an offer and a filling party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub offer_id: OfferId,
    /// Points matched by this fill.
    pub amount: u128,
    pub seller: AccountId,
    pub buyer: AccountId,
    pub status: OrderStatus,
    /// Evidence reference recorded by the two-step settlement path.
    pub audit_hash: Option<AuditHash>,
}

impl Order {
    #[must_use]
    pub fn new(
        id: OrderId,
        offer_id: OfferId,
        amount: u128,
        seller: AccountId,
        buyer: AccountId,
    ) -> Self {
        Self {
            id,
            offer_id,
            amount,
            seller,
            buyer,
            status: OrderStatus::Open,
            audit_hash: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}
