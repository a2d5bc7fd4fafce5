//! Custodian seam: asset precision and escrow value movement.
//!
//! The exchange holds value in escrow on behalf of offer creators and
//! fillers. Every movement goes through [`Custodian`], which may fail at
//! any call. Callers bracket a unit of work with [`Custodian::savepoint`]
//! and either [`Custodian::release`] it or [`Custodian::rollback_to`] it,
//! so a failure after some movements already succeeded leaves no trace.
//!
//! [`InMemoryCustodian`] is the reference implementation: per-(account,
//! asset) balances, per-owner allowances for pre-authorized movements, an
//! escrow pool per asset, and an undo journal.

use std::collections::{HashMap, HashSet};

use premarket_types::constants::NATIVE_DECIMALS;
use premarket_types::{AccountId, AssetId, PremarketError, Result};

/// Opaque marker returned by [`Custodian::savepoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(pub usize);

/// Value movement and precision oracle used by the exchange core.
///
/// Zero-amount movements must succeed without side effects.
pub trait Custodian {
    /// Native fractional digits of `asset`.
    fn decimals(&self, asset: &AssetId) -> Result<u8>;

    /// Pull `amount` of `asset` from `from` into escrow.
    fn deposit(&mut self, from: AccountId, asset: &AssetId, amount: u128) -> Result<()>;

    /// Release `amount` of `asset` from escrow to `to`.
    fn withdraw(&mut self, to: AccountId, asset: &AssetId, amount: u128) -> Result<()>;

    /// Move `amount` of `asset` directly between parties, drawing on an
    /// allowance `from` granted beforehand.
    fn transfer_from(
        &mut self,
        from: AccountId,
        to: AccountId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<()>;

    /// Mark the start of a unit of work.
    fn savepoint(&mut self) -> Savepoint;

    /// Undo every movement since `savepoint`.
    fn rollback_to(&mut self, savepoint: Savepoint);

    /// Keep every movement since `savepoint`.
    fn release(&mut self, savepoint: Savepoint);
}

#[derive(Debug)]
enum Undo {
    Balance {
        key: (AccountId, AssetId),
        previous: u128,
    },
    Allowance {
        key: (AccountId, AssetId),
        previous: u128,
    },
    Escrow {
        asset: AssetId,
        previous: u128,
    },
}

/// In-memory custodian with all-or-nothing savepoints.
#[derive(Debug)]
pub struct InMemoryCustodian {
    balances: HashMap<(AccountId, AssetId), u128>,
    allowances: HashMap<(AccountId, AssetId), u128>,
    escrow: HashMap<AssetId, u128>,
    decimals: HashMap<AssetId, u8>,
    /// Accounts whose movements are refused (frozen wallets, hostile tokens).
    blocked: HashSet<AccountId>,
    journal: Vec<Undo>,
    /// Units of work currently open. Writes outside any unit are not journaled.
    open: usize,
}

impl InMemoryCustodian {
    /// A custodian that knows only the native currency.
    #[must_use]
    pub fn new() -> Self {
        let mut decimals = HashMap::new();
        decimals.insert(AssetId::Native, NATIVE_DECIMALS);
        Self {
            balances: HashMap::new(),
            allowances: HashMap::new(),
            escrow: HashMap::new(),
            decimals,
            blocked: HashSet::new(),
            journal: Vec::new(),
            open: 0,
        }
    }

    /// Register an asset and its precision with the oracle.
    pub fn register_asset(&mut self, asset: AssetId, decimals: u8) {
        self.decimals.insert(asset, decimals);
    }

    /// Credit an account out of thin air (funding / faucet).
    pub fn mint(&mut self, account: AccountId, asset: &AssetId, amount: u128) {
        let key = (account, asset.clone());
        let current = self.balance(account, asset);
        self.set_balance(key, current.saturating_add(amount));
    }

    /// Let the custodian move up to `amount` of `owner`'s `asset`.
    pub fn approve(&mut self, owner: AccountId, asset: &AssetId, amount: u128) {
        self.set_allowance((owner, asset.clone()), amount);
    }

    /// Refuse every movement touching `account`.
    pub fn block(&mut self, account: AccountId) {
        self.blocked.insert(account);
    }

    pub fn unblock(&mut self, account: AccountId) {
        self.blocked.remove(&account);
    }

    #[must_use]
    pub fn balance(&self, account: AccountId, asset: &AssetId) -> u128 {
        self.balances
            .get(&(account, asset.clone()))
            .copied()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn allowance(&self, owner: AccountId, asset: &AssetId) -> u128 {
        self.allowances
            .get(&(owner, asset.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Total held in escrow for `asset`.
    #[must_use]
    pub fn escrow_balance(&self, asset: &AssetId) -> u128 {
        self.escrow.get(asset).copied().unwrap_or_default()
    }

    fn refuse(asset: &AssetId, amount: u128, reason: impl Into<String>) -> PremarketError {
        let reason = reason.into();
        tracing::debug!(%asset, amount, %reason, "Custodian refused movement");
        PremarketError::TransferFailed {
            asset: asset.clone(),
            amount,
            reason,
        }
    }

    fn check_not_blocked(&self, account: AccountId, asset: &AssetId, amount: u128) -> Result<()> {
        if self.blocked.contains(&account) {
            return Err(Self::refuse(asset, amount, format!("account {account} is blocked")));
        }
        Ok(())
    }

    /// Number of undo entries held; zero whenever no unit is open.
    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    fn remember(&mut self, undo: Undo) {
        if self.open > 0 {
            self.journal.push(undo);
        }
    }

    fn set_balance(&mut self, key: (AccountId, AssetId), value: u128) {
        let previous = self.balances.insert(key.clone(), value).unwrap_or_default();
        self.remember(Undo::Balance { key, previous });
    }

    fn set_allowance(&mut self, key: (AccountId, AssetId), value: u128) {
        let previous = self.allowances.insert(key.clone(), value).unwrap_or_default();
        self.remember(Undo::Allowance { key, previous });
    }

    fn set_escrow(&mut self, asset: AssetId, value: u128) {
        let previous = self.escrow.insert(asset.clone(), value).unwrap_or_default();
        self.remember(Undo::Escrow { asset, previous });
    }

    fn close_unit(&mut self) {
        self.open = self.open.saturating_sub(1);
        if self.open == 0 {
            self.journal.clear();
        }
    }

    fn debit(&mut self, account: AccountId, asset: &AssetId, amount: u128) -> Result<()> {
        let current = self.balance(account, asset);
        let next = current.checked_sub(amount).ok_or_else(|| {
            Self::refuse(
                asset,
                amount,
                format!("account {account} holds only {current}"),
            )
        })?;
        self.set_balance((account, asset.clone()), next);
        Ok(())
    }

    fn credit(&mut self, account: AccountId, asset: &AssetId, amount: u128) -> Result<()> {
        let next = self
            .balance(account, asset)
            .checked_add(amount)
            .ok_or_else(|| Self::refuse(asset, amount, "balance overflow"))?;
        self.set_balance((account, asset.clone()), next);
        Ok(())
    }
}

impl Default for InMemoryCustodian {
    fn default() -> Self {
        Self::new()
    }
}

impl Custodian for InMemoryCustodian {
    fn decimals(&self, asset: &AssetId) -> Result<u8> {
        self.decimals
            .get(asset)
            .copied()
            .ok_or_else(|| PremarketError::UnknownAsset(asset.clone()))
    }

    fn deposit(&mut self, from: AccountId, asset: &AssetId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.check_not_blocked(from, asset, amount)?;
        self.debit(from, asset, amount)?;
        let pool = self
            .escrow_balance(asset)
            .checked_add(amount)
            .ok_or_else(|| Self::refuse(asset, amount, "escrow overflow"))?;
        self.set_escrow(asset.clone(), pool);
        Ok(())
    }

    fn withdraw(&mut self, to: AccountId, asset: &AssetId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.check_not_blocked(to, asset, amount)?;
        let pool = self
            .escrow_balance(asset)
            .checked_sub(amount)
            .ok_or_else(|| Self::refuse(asset, amount, "escrow underfunded"))?;
        self.set_escrow(asset.clone(), pool);
        self.credit(to, asset, amount)
    }

    fn transfer_from(
        &mut self,
        from: AccountId,
        to: AccountId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.check_not_blocked(from, asset, amount)?;
        self.check_not_blocked(to, asset, amount)?;
        let allowed = self.allowance(from, asset);
        let remaining = allowed.checked_sub(amount).ok_or_else(|| {
            Self::refuse(
                asset,
                amount,
                format!("account {from} authorized only {allowed}"),
            )
        })?;
        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount)?;
        self.set_allowance((from, asset.clone()), remaining);
        Ok(())
    }

    fn savepoint(&mut self) -> Savepoint {
        self.open += 1;
        Savepoint(self.journal.len())
    }

    fn rollback_to(&mut self, savepoint: Savepoint) {
        while self.journal.len() > savepoint.0 {
            let Some(undo) = self.journal.pop() else {
                break;
            };
            match undo {
                Undo::Balance { key, previous } => {
                    self.balances.insert(key, previous);
                }
                Undo::Allowance { key, previous } => {
                    self.allowances.insert(key, previous);
                }
                Undo::Escrow { asset, previous } => {
                    self.escrow.insert(asset, previous);
                }
            }
        }
        self.close_unit();
    }

    fn release(&mut self, _savepoint: Savepoint) {
        // Inner units keep their entries for the enclosing rollback.
        self.close_unit();
    }
}
