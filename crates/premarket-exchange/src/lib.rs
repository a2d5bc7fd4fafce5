//! # premarket-exchange
//!
//! **Exchange plane**: the public surface of the points exchange.
//!
//! ## Architecture
//!
//! 1. **TokenRegistry**: token rows and the ACTIVE / INACTIVE / SETTLE phase machine
//! 2. **OfferBook**: offer rows, escrow collection, fills into orders, cancellation
//! 3. **Exchange**: capability checks, the execution lock, all-or-nothing
//!    checkpoints, batches, native-value handling, configuration and queries
//!
//! Order settlement lives in `premarket-settlement`; value movement, roles
//! and time are injected through `premarket-custody`.
//!
//! ## Operation Flow
//!
//! ```text
//! createToken ─▶ createOffer ─▶ fulfill ─▶ enterSettlePhase ─▶ settleFilled
//!                     │                            │
//!                     └─▶ cancel                   └─▶ (deadline) settleCancelled
//! ```

pub mod exchange;
pub mod offer_book;
pub mod token_registry;

pub use exchange::Exchange;
pub use offer_book::{Booked, Funding, NewOffer, OfferBook};
pub use token_registry::TokenRegistry;
