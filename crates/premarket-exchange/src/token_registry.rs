//! Token registry: owns every points token and its phase transitions.
//!
//! Capability checks happen in the exchange before any of these are called;
//! the registry enforces only phase and input rules.

use chrono::{DateTime, Utc};
use premarket_custody::JournaledTable;
use premarket_types::constants::MIN_SETTLE_DURATION_SECS;
use premarket_types::{AssetId, Event, PremarketError, Result, Token, TokenId, TokenStatus};

#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: JournaledTable<TokenId, Token>,
}

impl TokenRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(&id)
    }

    pub fn token(&self, id: TokenId) -> Result<&Token> {
        self.tokens.get(&id).ok_or(PremarketError::UnknownToken(id))
    }

    pub fn create(&mut self, id: TokenId, settle_duration_secs: u64) -> Result<Event> {
        if self.tokens.contains(&id) {
            return Err(PremarketError::DuplicateToken(id));
        }
        check_duration(settle_duration_secs)?;
        self.tokens.put(id, Token::new(id, settle_duration_secs));
        tracing::info!(token = %id, settle_duration_secs, "Token created");
        Ok(Event::TokenCreated {
            token: id,
            settle_duration_secs,
        })
    }

    /// Fix the deliverable asset and rate and start the settlement window.
    pub fn enter_settle_phase(
        &mut self,
        id: TokenId,
        asset: AssetId,
        settle_rate: u128,
        now: DateTime<Utc>,
    ) -> Result<Event> {
        let mut token = self.token(id)?.clone();
        if !token.is_pre_settle() {
            return Err(PremarketError::WrongTokenStatus {
                token: id,
                expected: "ACTIVE or INACTIVE",
                actual: token.status,
            });
        }
        if settle_rate == 0 {
            return Err(PremarketError::InvalidAmount {
                reason: "settle rate must be positive".into(),
            });
        }
        token.status = TokenStatus::Settle;
        token.settle_time = Some(now);
        token.custody_asset = Some(asset.clone());
        token.settle_rate = settle_rate;
        self.tokens.put(id, token);
        tracing::info!(
            token = %id,
            %asset,
            settle_rate,
            settle_time = %now,
            "Token entered settle phase"
        );
        Ok(Event::SettlePhaseEntered {
            token: id,
            asset,
            settle_rate,
            settle_time: now,
        })
    }

    /// Flip between ACTIVE and INACTIVE.
    pub fn toggle_activation(&mut self, id: TokenId) -> Result<Event> {
        let mut token = self.token(id)?.clone();
        token.status = match token.status {
            TokenStatus::Active => TokenStatus::Inactive,
            TokenStatus::Inactive => TokenStatus::Active,
            TokenStatus::Settle => {
                return Err(PremarketError::WrongTokenStatus {
                    token: id,
                    expected: "ACTIVE or INACTIVE",
                    actual: TokenStatus::Settle,
                });
            }
        };
        let status = token.status;
        self.tokens.put(id, token);
        tracing::info!(token = %id, %status, "Token activation toggled");
        Ok(Event::TokenActivationToggled { token: id, status })
    }

    /// Leave SETTLE for INACTIVE and forget the settlement terms.
    pub fn abort_settle_phase(&mut self, id: TokenId) -> Result<Event> {
        let mut token = self.token(id)?.clone();
        if token.status != TokenStatus::Settle {
            return Err(PremarketError::WrongTokenStatus {
                token: id,
                expected: "SETTLE",
                actual: token.status,
            });
        }
        token.status = TokenStatus::Inactive;
        token.settle_time = None;
        token.custody_asset = None;
        token.settle_rate = 0;
        self.tokens.put(id, token);
        tracing::info!(token = %id, "Settle phase aborted");
        Ok(Event::SettlePhaseAborted { token: id })
    }

    /// Allowed in every phase; a running window is re-measured from the
    /// recorded settle time.
    pub fn update_settle_duration(&mut self, id: TokenId, secs: u64) -> Result<Event> {
        check_duration(secs)?;
        let mut token = self.token(id)?.clone();
        token.settle_duration_secs = secs;
        self.tokens.put(id, token);
        tracing::info!(token = %id, settle_duration_secs = secs, "Settle duration updated");
        Ok(Event::SettleDurationUpdated {
            token: id,
            settle_duration_secs: secs,
        })
    }

    #[must_use]
    pub fn savepoint(&mut self) -> usize {
        self.tokens.savepoint()
    }

    pub fn rollback_to(&mut self, savepoint: usize) {
        self.tokens.rollback_to(savepoint);
    }

    pub fn release(&mut self, savepoint: usize) {
        self.tokens.release(savepoint);
    }
}

fn check_duration(secs: u64) -> Result<()> {
    if secs < MIN_SETTLE_DURATION_SECS {
        return Err(PremarketError::SettleDurationTooShort {
            secs,
            min: MIN_SETTLE_DURATION_SECS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = MIN_SETTLE_DURATION_SECS;

    fn registry_with_token() -> (TokenRegistry, TokenId) {
        let mut registry = TokenRegistry::new();
        let id = TokenId::new();
        registry.create(id, DAY).unwrap();
        (registry, id)
    }

    #[test]
    fn create_rejects_short_window_and_duplicates() {
        let mut registry = TokenRegistry::new();
        let id = TokenId::new();
        let err = registry.create(id, 23 * 3600).unwrap_err();
        assert!(matches!(err, PremarketError::SettleDurationTooShort { .. }));
        registry.create(id, DAY).unwrap();
        assert_eq!(registry.token(id).unwrap().status, TokenStatus::Active);
        assert!(matches!(
            registry.create(id, DAY),
            Err(PremarketError::DuplicateToken(_))
        ));
    }

    #[test]
    fn toggle_flips_until_settle() {
        let (mut registry, id) = registry_with_token();
        registry.toggle_activation(id).unwrap();
        assert_eq!(registry.token(id).unwrap().status, TokenStatus::Inactive);
        registry.toggle_activation(id).unwrap();
        assert_eq!(registry.token(id).unwrap().status, TokenStatus::Active);

        registry
            .enter_settle_phase(id, AssetId::Native, 1, Utc::now())
            .unwrap();
        assert!(matches!(
            registry.toggle_activation(id),
            Err(PremarketError::WrongTokenStatus { .. })
        ));
    }

    #[test]
    fn enter_settle_requires_positive_rate_and_pre_settle_phase() {
        let (mut registry, id) = registry_with_token();
        assert!(matches!(
            registry.enter_settle_phase(id, AssetId::Native, 0, Utc::now()),
            Err(PremarketError::InvalidAmount { .. })
        ));
        let now = Utc::now();
        registry
            .enter_settle_phase(id, AssetId::contract("0xpts"), 7, now)
            .unwrap();
        let token = registry.token(id).unwrap();
        assert_eq!(token.settle_time, Some(now));
        assert_eq!(token.settle_rate, 7);
        assert!(registry
            .enter_settle_phase(id, AssetId::Native, 1, now)
            .is_err());
    }

    #[test]
    fn abort_clears_terms() {
        let (mut registry, id) = registry_with_token();
        assert!(registry.abort_settle_phase(id).is_err());
        registry
            .enter_settle_phase(id, AssetId::Native, 3, Utc::now())
            .unwrap();
        registry.abort_settle_phase(id).unwrap();
        let token = registry.token(id).unwrap();
        assert_eq!(token.status, TokenStatus::Inactive);
        assert!(token.settle_time.is_none());
        assert!(token.custody_asset.is_none());
        assert_eq!(token.settle_rate, 0);
    }

    #[test]
    fn duration_update_in_any_phase() {
        let (mut registry, id) = registry_with_token();
        registry
            .enter_settle_phase(id, AssetId::Native, 3, Utc::now())
            .unwrap();
        registry.update_settle_duration(id, 2 * DAY).unwrap();
        assert_eq!(registry.token(id).unwrap().settle_duration_secs, 2 * DAY);
        assert!(registry.update_settle_duration(id, DAY - 1).is_err());
    }

    #[test]
    fn rollback_removes_created_token() {
        let mut registry = TokenRegistry::new();
        let sp = registry.savepoint();
        let id = TokenId::new();
        registry.create(id, DAY).unwrap();
        registry.rollback_to(sp);
        assert!(registry.get(id).is_none());
    }
}
