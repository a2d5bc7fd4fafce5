//! Error types for the Premarket exchange.
//!
//! All errors use the `PM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by failure category:
//! - 1xx: Authorization (missing capability, wrong counterparty)
//! - 2xx: State (entity not in the required status or phase)
//! - 3xx: Input (bad amounts, unknown ids, batch shape, config bounds)
//! - 4xx: Insufficient escrow (over-fill, under-funded native calls)
//! - 5xx: Transfer (custodian reported failure)
//! - 9xx: Batch / internal
//!
//! Every error is fatal to the enclosing operation: the exchange rolls back
//! all tentative changes before returning it.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{AccountId, AssetId, OfferId, OfferStatus, OrderId, OrderStatus, TokenId, TokenStatus};

/// The five failure categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authorization,
    State,
    Input,
    InsufficientEscrow,
    Transfer,
    Internal,
}

/// Central error enum for all Premarket operations.
#[derive(Debug, Error)]
pub enum PremarketError {
    // =================================================================
    // Authorization Errors (1xx)
    // =================================================================
    /// The caller lacks a role granted by the authority collaborator.
    #[error("PM_ERR_100: Account {account} lacks the {role} capability")]
    MissingCapability { account: AccountId, role: &'static str },

    /// The caller is not the party an entity operation is reserved for.
    #[error("PM_ERR_101: Account {account} is not the {party} of {entity}")]
    NotCounterparty {
        account: AccountId,
        party: &'static str,
        entity: String,
    },

    // =================================================================
    // State Errors (2xx)
    // =================================================================
    /// The token is not in a phase that allows the operation.
    #[error("PM_ERR_200: Token {token} is {actual}, expected {expected}")]
    WrongTokenStatus {
        token: TokenId,
        expected: &'static str,
        actual: TokenStatus,
    },

    /// The offer is already filled or cancelled.
    #[error("PM_ERR_201: Offer {offer} is {actual}, not OPEN")]
    OfferNotOpen { offer: OfferId, actual: OfferStatus },

    /// The order already reached a terminal status.
    #[error("PM_ERR_202: Order {order} is {actual}, not OPEN")]
    OrderNotOpen { order: OrderId, actual: OrderStatus },

    /// The token is in Settle but lacks an asset, rate, or settle time.
    #[error("PM_ERR_203: Token {token} has no settlement terms")]
    SettlementTermsMissing { token: TokenId },

    /// Non-delivery unwind attempted before the settlement window closed.
    #[error("PM_ERR_204: Settlement window for {token} is open until {deadline}")]
    SettleWindowOpen {
        token: TokenId,
        deadline: DateTime<Utc>,
    },

    /// A guarded operation was entered while another one is executing.
    #[error("PM_ERR_205: Another operation is already in progress")]
    OperationInProgress,

    // =================================================================
    // Input Errors (3xx)
    // =================================================================
    #[error("PM_ERR_300: Token not found: {0}")]
    UnknownToken(TokenId),

    #[error("PM_ERR_301: Token already registered: {0}")]
    DuplicateToken(TokenId),

    #[error("PM_ERR_302: Offer not found: {0}")]
    UnknownOffer(OfferId),

    #[error("PM_ERR_303: Order not found: {0}")]
    UnknownOrder(OrderId),

    /// Zero or otherwise unusable amount, value, or rate.
    #[error("PM_ERR_304: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("PM_ERR_305: Settle duration {secs}s is below the {min}s minimum")]
    SettleDurationTooShort { secs: u64, min: u64 },

    #[error("PM_ERR_306: Asset is not accepted for settlement: {0}")]
    AssetNotAccepted(AssetId),

    /// The precision oracle has no entry for this asset.
    #[error("PM_ERR_307: Asset unknown to the custodian: {0}")]
    UnknownAsset(AssetId),

    #[error("PM_ERR_308: Batch inputs have mismatched lengths: {expected} vs {actual}")]
    BatchLengthMismatch { expected: usize, actual: usize },

    #[error("PM_ERR_309: Batch is empty")]
    EmptyBatch,

    /// A full-match offer may only be taken in one piece.
    #[error("PM_ERR_310: Offer {offer} requires a full match of {required}, got {requested}")]
    FullMatchRequired {
        offer: OfferId,
        required: u128,
        requested: u128,
    },

    /// A configuration value is outside its permitted range.
    #[error("PM_ERR_311: Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A fixed-point computation exceeded `u128`.
    #[error("PM_ERR_312: Arithmetic overflow in {context}")]
    ArithmeticOverflow { context: &'static str },

    /// Any other malformed argument.
    #[error("PM_ERR_313: Invalid input: {reason}")]
    InvalidInput { reason: String },

    // =================================================================
    // Insufficient Escrow Errors (4xx)
    // =================================================================
    /// The requested fill exceeds what is left on the offer.
    #[error("PM_ERR_400: Offer {offer} has {available} remaining, requested {requested}")]
    InsufficientRemaining {
        offer: OfferId,
        requested: u128,
        available: u128,
    },

    /// Native value attached to the call does not cover the requirement.
    #[error("PM_ERR_401: Attached value {attached} below required {required}")]
    InsufficientAttached { required: u128, attached: u128 },

    /// Cancellation with nothing left to refund.
    #[error("PM_ERR_402: Offer {offer} has no unfilled remainder")]
    NothingToRefund { offer: OfferId },

    // =================================================================
    // Transfer Errors (5xx)
    // =================================================================
    /// The custodian refused or failed a value movement.
    #[error("PM_ERR_500: Transfer of {amount} {asset} failed: {reason}")]
    TransferFailed {
        asset: AssetId,
        amount: u128,
        reason: String,
    },

    // =================================================================
    // Batch / Internal (9xx)
    // =================================================================
    /// One element of an atomic batch failed; the whole batch was discarded.
    #[error("PM_ERR_900: Batch item {index} failed: {source}")]
    BatchItemFailed {
        index: usize,
        #[source]
        source: Box<PremarketError>,
    },

    /// The audit hash chain does not verify.
    #[error("PM_ERR_901: Audit chain broken at sequence {sequence}")]
    AuditChainBroken { sequence: u64 },

    /// Serialization / deserialization error.
    #[error("PM_ERR_902: Serialization error: {0}")]
    Serialization(String),
}

impl PremarketError {
    /// Category of this error. Batch failures report their inner cause.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCapability { .. } | Self::NotCounterparty { .. } => {
                ErrorKind::Authorization
            }
            Self::WrongTokenStatus { .. }
            | Self::OfferNotOpen { .. }
            | Self::OrderNotOpen { .. }
            | Self::SettlementTermsMissing { .. }
            | Self::SettleWindowOpen { .. }
            | Self::OperationInProgress => ErrorKind::State,
            Self::UnknownToken(_)
            | Self::DuplicateToken(_)
            | Self::UnknownOffer(_)
            | Self::UnknownOrder(_)
            | Self::InvalidAmount { .. }
            | Self::SettleDurationTooShort { .. }
            | Self::AssetNotAccepted(_)
            | Self::UnknownAsset(_)
            | Self::BatchLengthMismatch { .. }
            | Self::EmptyBatch
            | Self::FullMatchRequired { .. }
            | Self::InvalidConfig { .. }
            | Self::ArithmeticOverflow { .. }
            | Self::InvalidInput { .. } => ErrorKind::Input,
            Self::InsufficientRemaining { .. }
            | Self::InsufficientAttached { .. }
            | Self::NothingToRefund { .. } => ErrorKind::InsufficientEscrow,
            Self::TransferFailed { .. } => ErrorKind::Transfer,
            Self::BatchItemFailed { source, .. } => source.kind(),
            Self::AuditChainBroken { .. } | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Wrap an error raised by element `index` of a batch.
    #[must_use]
    pub fn in_batch(self, index: usize) -> Self {
        Self::BatchItemFailed {
            index,
            source: Box::new(self),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, PremarketError>;

impl From<serde_json::Error> for PremarketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = PremarketError::UnknownOffer(OfferId(7));
        let msg = format!("{err}");
        assert!(msg.starts_with("PM_ERR_302"), "Got: {msg}");
        assert!(msg.contains("offer:7"));
    }

    #[test]
    fn insufficient_remaining_display() {
        let err = PremarketError::InsufficientRemaining {
            offer: OfferId(1),
            requested: 41,
            available: 40,
        };
        let msg = format!("{err}");
        assert!(msg.contains("PM_ERR_400"));
        assert!(msg.contains("41"));
        assert!(msg.contains("40"));
        assert_eq!(err.kind(), ErrorKind::InsufficientEscrow);
    }

    #[test]
    fn wrong_token_status_display() {
        let err = PremarketError::WrongTokenStatus {
            token: TokenId::new(),
            expected: "SETTLE",
            actual: TokenStatus::Active,
        };
        let msg = format!("{err}");
        assert!(msg.contains("PM_ERR_200"));
        assert!(msg.contains("ACTIVE"));
        assert!(msg.contains("SETTLE"));
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn batch_failure_reports_inner_kind() {
        let inner = PremarketError::OrderNotOpen {
            order: OrderId(2),
            actual: OrderStatus::SettleFilled,
        };
        let err = inner.in_batch(1);
        assert_eq!(err.kind(), ErrorKind::State);
        assert!(format!("{err}").contains("Batch item 1"));
    }

    #[test]
    fn kinds_cover_taxonomy() {
        assert_eq!(
            PremarketError::MissingCapability {
                account: AccountId::new(),
                role: "OPERATOR",
            }
            .kind(),
            ErrorKind::Authorization
        );
        assert_eq!(PremarketError::EmptyBatch.kind(), ErrorKind::Input);
        assert_eq!(
            PremarketError::TransferFailed {
                asset: AssetId::Native,
                amount: 1,
                reason: "blocked".into(),
            }
            .kind(),
            ErrorKind::Transfer
        );
    }

    #[test]
    fn all_errors_have_pm_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(PremarketError::OperationInProgress),
            Box::new(PremarketError::EmptyBatch),
            Box::new(PremarketError::NothingToRefund { offer: OfferId(3) }),
            Box::new(PremarketError::Serialization("test".into())),
            Box::new(PremarketError::ArithmeticOverflow { context: "test" }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("PM_ERR_"),
                "Error missing PM_ERR_ prefix: {msg}"
            );
        }
    }
}
