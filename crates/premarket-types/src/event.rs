//! Append-only audit trail.
//!
//! Every state transition appends one [`Event`]. Records are sequenced and
//! hash-chained: each digest commits to the previous digest, the sequence
//! number, and the JSON encoding of the event, so any edit to history is
//! detectable with [`EventLog::verify_chain`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    AccountId, AssetId, AuditHash, OfferId, OfferSide, OfferStatus, OrderId, PremarketError,
    Result, TokenId, TokenStatus,
};

/// A state transition, carrying the identifiers and resulting values.
///
/// Amounts in `*_units` fields are in the settlement (or deliverable)
/// asset's native precision; other amounts are 18-digit internal units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TokenCreated {
        token: TokenId,
        settle_duration_secs: u64,
    },
    SettlePhaseEntered {
        token: TokenId,
        asset: AssetId,
        settle_rate: u128,
        settle_time: DateTime<Utc>,
    },
    TokenActivationToggled {
        token: TokenId,
        status: TokenStatus,
    },
    SettlePhaseAborted {
        token: TokenId,
    },
    SettleDurationUpdated {
        token: TokenId,
        settle_duration_secs: u64,
    },
    OfferCreated {
        offer: OfferId,
        token: TokenId,
        side: OfferSide,
        creator: AccountId,
        asset: AssetId,
        amount: u128,
        value: u128,
        collateral: u128,
        escrowed_units: u128,
    },
    OfferFilled {
        offer: OfferId,
        order: OrderId,
        filler: AccountId,
        amount: u128,
        filled_amount: u128,
        status: OfferStatus,
        escrowed_units: u128,
    },
    OfferCancelled {
        offer: OfferId,
        refund_units: u128,
        fee_units: u128,
    },
    NativeExcessReturned {
        payer: AccountId,
        amount_units: u128,
    },
    OrderSettleFilled {
        order: OrderId,
        delivered_units: u128,
        delivery_fee_units: u128,
        released_units: u128,
        fee_units: u128,
    },
    OrderSettleCancelled {
        order: OrderId,
        refund_units: u128,
        fee_units: u128,
    },
    OrderForceCancelled {
        order: OrderId,
        buyer_refund_units: u128,
        seller_refund_units: u128,
    },
    OrderSettledTwoStep {
        order: OrderId,
        released_units: u128,
        fee_units: u128,
        audit_hash: AuditHash,
    },
    ConfigUpdated {
        fee_wallet: AccountId,
        fee_settle_rate: u32,
        fee_refund_rate: u32,
        pledge_rate: u32,
    },
    AcceptedAssetsUpdated {
        assets: Vec<AssetId>,
        accepted: bool,
    },
}

/// One sequenced, hash-chained audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// 1-based, strictly increasing.
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: Event,
    /// SHA-256 over the previous digest, sequence, and event JSON.
    pub digest: [u8; 32],
}

/// The audit log. Rolled back together with the entity tables when an
/// operation fails, so it only ever contains committed history.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its sequence number.
    pub fn append(&mut self, event: Event, recorded_at: DateTime<Utc>) -> Result<u64> {
        let sequence = self.records.len() as u64 + 1;
        let digest = Self::chain_digest(&self.last_digest(), sequence, &event)?;
        self.records.push(EventRecord {
            sequence,
            recorded_at,
            event,
            digest,
        });
        Ok(sequence)
    }

    /// Digest of the newest record, or zeroes for an empty log.
    #[must_use]
    pub fn last_digest(&self) -> [u8; 32] {
        self.records.last().map_or([0u8; 32], |r| r.digest)
    }

    #[must_use]
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn savepoint(&self) -> usize {
        self.records.len()
    }

    /// Drop every record appended after `savepoint`.
    pub fn rollback_to(&mut self, savepoint: usize) {
        self.records.truncate(savepoint);
    }

    /// Recompute every digest from genesis.
    pub fn verify_chain(&self) -> Result<()> {
        let mut prev = [0u8; 32];
        for (i, record) in self.records.iter().enumerate() {
            let expected_seq = i as u64 + 1;
            if record.sequence != expected_seq
                || Self::chain_digest(&prev, record.sequence, &record.event)? != record.digest
            {
                return Err(PremarketError::AuditChainBroken {
                    sequence: record.sequence,
                });
            }
            prev = record.digest;
        }
        Ok(())
    }

    fn chain_digest(prev: &[u8; 32], sequence: u64, event: &Event) -> Result<[u8; 32]> {
        let payload = serde_json::to_vec(event)?;
        let mut hasher = Sha256::new();
        hasher.update(b"premarket:event:v1:");
        hasher.update(prev);
        hasher.update(sequence.to_le_bytes());
        hasher.update(&payload);
        let hash = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&hash);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toggled() -> Event {
        Event::TokenActivationToggled {
            token: TokenId::new(),
            status: TokenStatus::Inactive,
        }
    }

    #[test]
    fn sequences_start_at_one_and_increase() {
        let mut log = EventLog::new();
        assert_eq!(log.append(toggled(), Utc::now()).unwrap(), 1);
        assert_eq!(log.append(toggled(), Utc::now()).unwrap(), 2);
        assert_eq!(log.len(), 2);
        assert!(log.verify_chain().is_ok());
    }

    #[test]
    fn rollback_truncates() {
        let mut log = EventLog::new();
        log.append(toggled(), Utc::now()).unwrap();
        let sp = log.savepoint();
        log.append(toggled(), Utc::now()).unwrap();
        log.rollback_to(sp);
        assert_eq!(log.len(), 1);
        assert_eq!(log.append(toggled(), Utc::now()).unwrap(), 2);
        assert!(log.verify_chain().is_ok());
    }

    #[test]
    fn tampering_breaks_chain() {
        let mut log = EventLog::new();
        log.append(toggled(), Utc::now()).unwrap();
        log.append(toggled(), Utc::now()).unwrap();
        log.records[0].event = Event::SettlePhaseAborted {
            token: TokenId::new(),
        };
        assert!(matches!(
            log.verify_chain(),
            Err(PremarketError::AuditChainBroken { sequence: 1 })
        ));
    }

    #[test]
    fn event_json_names_variant() {
        let json = serde_json::to_string(&Event::OfferCancelled {
            offer: OfferId(4),
            refund_units: 995,
            fee_units: 5,
        })
        .unwrap();
        assert!(json.starts_with(r#"{"OfferCancelled":"#), "{json}");
    }
}
