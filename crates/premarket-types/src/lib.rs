//! # premarket-types
//!
//! Shared types, errors, and configuration for the **Premarket** points
//! exchange.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`TokenId`], [`OfferId`], [`OrderId`], [`AccountId`], [`AssetId`], [`AuditHash`]
//! - **Token model**: [`Token`], [`TokenStatus`]
//! - **Offer model**: [`Offer`], [`OfferSide`], [`OfferStatus`]
//! - **Order model**: [`Order`], [`OrderStatus`]
//! - **Configuration**: [`FeeConfig`], [`ExchangeConfig`]
//! - **Audit trail**: [`Event`], [`EventRecord`], [`EventLog`]
//! - **Fixed-point math**: [`math`] (rescaling, rates, shares)
//! - **Errors**: [`PremarketError`] with `PM_ERR_` prefix codes
//! - **Constants**: scales, bounds and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod math;
pub mod offer;
pub mod order;
pub mod token;

pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use offer::*;
pub use order::*;
pub use token::*;

// Constants and math helpers are accessed via their module path
// (`premarket_types::constants::FOO`, `premarket_types::math::mul_div`).
