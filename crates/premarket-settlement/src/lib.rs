//! # premarket-settlement
//!
//! **Settlement plane**: the arithmetic that turns offers and orders into
//! value movements, and the ledger that owns orders.
//!
//! ## Architecture
//!
//! 1. **SettlementEngine**: pure fee / collateral / rescaling computations
//!    producing a [`TransferPlan`] per operation
//! 2. **TransferPlan**: ordered custodian movements, executed fail-fast
//! 3. **OrderLedger**: owns Order rows; validates and applies the four
//!    settlement paths (settle filled, unwind, force cancel, two-step)
//!
//! ## Rounding
//!
//! - Collecting from a party: **ceiling**
//! - Paying out of escrow: **floor**
//!
//! so the escrow pool for an asset never goes negative.

pub mod engine;
pub mod order_ledger;

pub use engine::{EscrowShares, Movement, Payout, RefundQuote, SettlementEngine, TransferPlan};
pub use order_ledger::{LedgerSavepoint, OrderLedger, SettlementContext};
