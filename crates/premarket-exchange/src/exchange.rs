//! The exchange facade.
//!
//! Every public mutating call is one all-or-nothing unit:
//!
//! ```text
//! ExecutionLock::try_enter ──▶ checkpoint(tokens, offers, orders, log,
//!                                         custodian, fees, accepted)
//!        │
//!        ▼
//!   capability + state checks ──▶ custodian movements ──▶ table writes ──▶ events
//!        │                                                                 │
//!        └──────────── Err: rollback everything ◀──────────────────────────┤
//!                                                   Ok: release checkpoint ◀┘
//! ```
//!
//! Batch calls take the lock once and run the unguarded single-item
//! bodies in order. The first failing item aborts the whole batch and is
//! reported as [`PremarketError::BatchItemFailed`] with its index.

use chrono::{DateTime, Utc};
use premarket_custody::{
    Authority, Clock, Custodian, ExecutionLock, JournaledTable, Role, Savepoint,
};
use premarket_settlement::{LedgerSavepoint, OrderLedger, SettlementContext};
use premarket_types::constants::AMOUNT_DECIMALS;
use premarket_types::math;
use premarket_types::{
    AccountId, AssetId, AuditHash, Event, EventLog, EventRecord, ExchangeConfig, FeeConfig, Offer,
    OfferId, OfferSide, OfferStatus, Order, OrderId, OrderStatus, PremarketError, Result, Token,
    TokenId,
};
use rust_decimal::Decimal;

use crate::offer_book::{BookSavepoint, Booked, Funding, NewOffer, OfferBook};
use crate::token_registry::TokenRegistry;

/// Rollback point spanning every table, the log and the custodian.
struct Checkpoint {
    tokens: usize,
    offers: BookSavepoint,
    orders: LedgerSavepoint,
    accepted: usize,
    events: usize,
    custodian: Savepoint,
    fees: FeeConfig,
}

/// Pre-launch points exchange over a custodian `C`.
pub struct Exchange<C> {
    custodian: C,
    authority: Box<dyn Authority>,
    clock: Box<dyn Clock>,
    lock: ExecutionLock,
    fees: FeeConfig,
    accepted: JournaledTable<AssetId, bool>,
    tokens: TokenRegistry,
    offers: OfferBook,
    orders: OrderLedger,
    events: EventLog,
}

impl<C: Custodian> Exchange<C> {
    /// Build an exchange from a validated configuration.
    pub fn new(
        config: ExchangeConfig,
        custodian: C,
        authority: impl Authority + 'static,
        clock: impl Clock + 'static,
    ) -> Result<Self> {
        config.fees.validate()?;
        let mut accepted = JournaledTable::new();
        for asset in config.accepted_assets {
            accepted.put(asset, true);
        }
        tracing::info!(
            fee_wallet = %config.fees.fee_wallet,
            pledge = %math::rate_percent(config.fees.pledge_rate),
            accepted = accepted.len(),
            "Exchange initialized"
        );
        Ok(Self {
            custodian,
            authority: Box::new(authority),
            clock: Box::new(clock),
            lock: ExecutionLock::new(),
            fees: config.fees,
            accepted,
            tokens: TokenRegistry::new(),
            offers: OfferBook::new(),
            orders: OrderLedger::new(),
            events: EventLog::new(),
        })
    }

    // =================================================================
    // Token administration (operator)
    // =================================================================

    pub fn create_token(
        &mut self,
        caller: AccountId,
        id: TokenId,
        settle_duration_secs: u64,
    ) -> Result<()> {
        self.atomic("create_token", |ex| {
            ex.authority.require(caller, Role::Operator)?;
            let event = ex.tokens.create(id, settle_duration_secs)?;
            ex.record(event)
        })
    }

    pub fn enter_settle_phase(
        &mut self,
        caller: AccountId,
        id: TokenId,
        asset: AssetId,
        settle_rate: u128,
    ) -> Result<()> {
        self.atomic("enter_settle_phase", |ex| {
            ex.authority.require(caller, Role::Operator)?;
            ex.custodian.decimals(&asset)?;
            let now = ex.clock.now();
            let event = ex.tokens.enter_settle_phase(id, asset, settle_rate, now)?;
            ex.record(event)
        })
    }

    pub fn toggle_activation(&mut self, caller: AccountId, id: TokenId) -> Result<()> {
        self.atomic("toggle_activation", |ex| {
            ex.authority.require(caller, Role::Operator)?;
            let event = ex.tokens.toggle_activation(id)?;
            ex.record(event)
        })
    }

    pub fn abort_settle_phase(&mut self, caller: AccountId, id: TokenId) -> Result<()> {
        self.atomic("abort_settle_phase", |ex| {
            ex.authority.require(caller, Role::Operator)?;
            let event = ex.tokens.abort_settle_phase(id)?;
            ex.record(event)
        })
    }

    pub fn update_settle_duration(
        &mut self,
        caller: AccountId,
        id: TokenId,
        secs: u64,
    ) -> Result<()> {
        self.atomic("update_settle_duration", |ex| {
            ex.authority.require(caller, Role::Operator)?;
            let event = ex.tokens.update_settle_duration(id, secs)?;
            ex.record(event)
        })
    }

    // =================================================================
    // Market
    // =================================================================

    /// Create an offer, pulling the creator's leg through the custodian.
    pub fn create_offer(&mut self, creator: AccountId, request: NewOffer) -> Result<OfferId> {
        self.atomic("create_offer", |ex| {
            ex.create_offer_unguarded(creator, request, Funding::Pull)
                .map(|(id, _)| id)
        })
    }

    /// Create a native-asset offer paid with `attached` units; any excess
    /// is returned to the creator.
    pub fn create_offer_native(
        &mut self,
        creator: AccountId,
        request: NewOffer,
        attached: u128,
    ) -> Result<OfferId> {
        self.atomic("create_offer_native", |ex| {
            require_native_asset(&request.settlement_asset)?;
            ex.custodian.deposit(creator, &AssetId::Native, attached)?;
            let (id, required) = ex.create_offer_unguarded(creator, request, Funding::Prepaid)?;
            ex.return_native_excess(creator, attached, required)?;
            Ok(id)
        })
    }

    pub fn create_offers(
        &mut self,
        creator: AccountId,
        requests: Vec<NewOffer>,
    ) -> Result<Vec<OfferId>> {
        if requests.is_empty() {
            return Err(PremarketError::EmptyBatch);
        }
        self.atomic("create_offers", |ex| {
            requests
                .into_iter()
                .enumerate()
                .map(|(i, request)| {
                    ex.create_offer_unguarded(creator, request, Funding::Pull)
                        .map(|(id, _)| id)
                        .map_err(|e| e.in_batch(i))
                })
                .collect()
        })
    }

    /// Native batch create: one attachment covers every offer; the
    /// aggregate excess is returned once.
    pub fn create_offers_native(
        &mut self,
        creator: AccountId,
        requests: Vec<NewOffer>,
        attached: u128,
    ) -> Result<Vec<OfferId>> {
        if requests.is_empty() {
            return Err(PremarketError::EmptyBatch);
        }
        self.atomic("create_offers_native", |ex| {
            ex.custodian.deposit(creator, &AssetId::Native, attached)?;
            let mut required: u128 = 0;
            let mut ids = Vec::with_capacity(requests.len());
            for (i, request) in requests.into_iter().enumerate() {
                let (id, units) = require_native_asset(&request.settlement_asset)
                    .and_then(|()| ex.create_offer_unguarded(creator, request, Funding::Prepaid))
                    .map_err(|e| e.in_batch(i))?;
                required = required
                    .checked_add(units)
                    .ok_or(PremarketError::ArithmeticOverflow {
                        context: "native batch requirement",
                    })?;
                ids.push(id);
            }
            ex.return_native_excess(creator, attached, required)?;
            Ok(ids)
        })
    }

    /// Fill `amount` points of an offer, pulling the filler's leg.
    pub fn fulfill(&mut self, filler: AccountId, offer: OfferId, amount: u128) -> Result<OrderId> {
        self.atomic("fulfill", |ex| {
            ex.fulfill_unguarded(filler, offer, amount, Funding::Pull)
                .map(|(id, _)| id)
        })
    }

    pub fn fulfill_native(
        &mut self,
        filler: AccountId,
        offer: OfferId,
        amount: u128,
        attached: u128,
    ) -> Result<OrderId> {
        self.atomic("fulfill_native", |ex| {
            ex.require_native_offer(offer)?;
            ex.custodian.deposit(filler, &AssetId::Native, attached)?;
            let (id, required) = ex.fulfill_unguarded(filler, offer, amount, Funding::Prepaid)?;
            ex.return_native_excess(filler, attached, required)?;
            Ok(id)
        })
    }

    pub fn fulfill_batch(
        &mut self,
        filler: AccountId,
        offers: &[OfferId],
        amounts: &[u128],
    ) -> Result<Vec<OrderId>> {
        check_batch(offers.len(), amounts.len())?;
        self.atomic("fulfill_batch", |ex| {
            offers
                .iter()
                .zip(amounts)
                .enumerate()
                .map(|(i, (&offer, &amount))| {
                    ex.fulfill_unguarded(filler, offer, amount, Funding::Pull)
                        .map(|(id, _)| id)
                        .map_err(|e| e.in_batch(i))
                })
                .collect()
        })
    }

    /// Native batch fill: the requirement is summed over all items and the
    /// aggregate excess is returned once.
    pub fn fulfill_batch_native(
        &mut self,
        filler: AccountId,
        offers: &[OfferId],
        amounts: &[u128],
        attached: u128,
    ) -> Result<Vec<OrderId>> {
        check_batch(offers.len(), amounts.len())?;
        self.atomic("fulfill_batch_native", |ex| {
            ex.custodian.deposit(filler, &AssetId::Native, attached)?;
            let mut required: u128 = 0;
            let mut ids = Vec::with_capacity(offers.len());
            for (i, (&offer, &amount)) in offers.iter().zip(amounts).enumerate() {
                let (id, units) = ex
                    .require_native_offer(offer)
                    .and_then(|()| ex.fulfill_unguarded(filler, offer, amount, Funding::Prepaid))
                    .map_err(|e| e.in_batch(i))?;
                required = required
                    .checked_add(units)
                    .ok_or(PremarketError::ArithmeticOverflow {
                        context: "native batch requirement",
                    })?;
                ids.push(id);
            }
            ex.return_native_excess(filler, attached, required)?;
            Ok(ids)
        })
    }

    /// Creator cancels the unfilled remainder of an offer.
    pub fn cancel_offer(&mut self, caller: AccountId, offer: OfferId) -> Result<()> {
        self.atomic("cancel_offer", |ex| ex.cancel_unguarded(caller, offer))
    }

    pub fn cancel_offers(&mut self, caller: AccountId, offers: &[OfferId]) -> Result<()> {
        if offers.is_empty() {
            return Err(PremarketError::EmptyBatch);
        }
        self.atomic("cancel_offers", |ex| {
            for (i, &offer) in offers.iter().enumerate() {
                ex.cancel_unguarded(caller, offer)
                    .map_err(|e| e.in_batch(i))?;
            }
            Ok(())
        })
    }

    // =================================================================
    // Settlement
    // =================================================================

    /// Seller delivers and collects; see [`OrderLedger::settle_filled`].
    pub fn settle_filled(&mut self, caller: AccountId, order: OrderId) -> Result<()> {
        self.atomic("settle_filled", |ex| {
            ex.settle_with(order, |ledger, ctx| ledger.settle_filled(order, caller, ctx))
        })
    }

    /// Buyer (or operator) unwinds an undelivered order after the window.
    pub fn settle_cancelled(&mut self, caller: AccountId, order: OrderId) -> Result<()> {
        self.atomic("settle_cancelled", |ex| {
            ex.settle_with(order, |ledger, ctx| ledger.settle_cancelled(order, caller, ctx))
        })
    }

    pub fn force_cancel_order(&mut self, caller: AccountId, order: OrderId) -> Result<()> {
        self.atomic("force_cancel_order", |ex| {
            ex.settle_with(order, |ledger, ctx| ledger.force_cancel(order, caller, ctx))
        })
    }

    /// Operator-attested settlement referencing off-exchange delivery.
    pub fn settle_two_steps(
        &mut self,
        caller: AccountId,
        order: OrderId,
        audit_hash: AuditHash,
    ) -> Result<()> {
        self.atomic("settle_two_steps", |ex| {
            ex.settle_with(order, |ledger, ctx| {
                ledger.settle_two_step(order, audit_hash, caller, ctx)
            })
        })
    }

    pub fn settle_two_steps_batch(
        &mut self,
        caller: AccountId,
        orders: &[OrderId],
        hashes: &[AuditHash],
    ) -> Result<()> {
        check_batch(orders.len(), hashes.len())?;
        self.atomic("settle_two_steps_batch", |ex| {
            for (i, (&order, &hash)) in orders.iter().zip(hashes).enumerate() {
                ex.settle_with(order, |ledger, ctx| {
                    ledger.settle_two_step(order, hash, caller, ctx)
                })
                .map_err(|e| e.in_batch(i))?;
            }
            Ok(())
        })
    }

    // =================================================================
    // Configuration (admin)
    // =================================================================

    /// Replace the fee configuration. Bounds are checked before anything
    /// changes.
    pub fn update_config(&mut self, caller: AccountId, fees: FeeConfig) -> Result<()> {
        self.atomic("update_config", |ex| {
            ex.authority.require(caller, Role::Admin)?;
            fees.validate()?;
            tracing::info!(
                fee_wallet = %fees.fee_wallet,
                settle_fee = %math::rate_percent(fees.fee_settle_rate),
                refund_fee = %math::rate_percent(fees.fee_refund_rate),
                pledge = %math::rate_percent(fees.pledge_rate),
                "Fee configuration updated"
            );
            let event = Event::ConfigUpdated {
                fee_wallet: fees.fee_wallet,
                fee_settle_rate: fees.fee_settle_rate,
                fee_refund_rate: fees.fee_refund_rate,
                pledge_rate: fees.pledge_rate,
            };
            ex.fees = fees;
            ex.record(event)
        })
    }

    /// Add or remove settlement assets from the allow-list.
    pub fn set_accepted_assets(
        &mut self,
        caller: AccountId,
        assets: &[AssetId],
        accepted: bool,
    ) -> Result<()> {
        self.atomic("set_accepted_assets", |ex| {
            ex.authority.require(caller, Role::Admin)?;
            for asset in assets {
                ex.accepted.put(asset.clone(), accepted);
            }
            tracing::info!(count = assets.len(), accepted, "Accepted assets updated");
            ex.record(Event::AcceptedAssetsUpdated {
                assets: assets.to_vec(),
                accepted,
            })
        })
    }

    // =================================================================
    // Queries
    // =================================================================

    pub fn token(&self, id: TokenId) -> Result<&Token> {
        self.tokens.token(id)
    }

    pub fn offer(&self, id: OfferId) -> Result<&Offer> {
        self.offers.offer(id)
    }

    pub fn order(&self, id: OrderId) -> Result<&Order> {
        self.orders.order(id)
    }

    pub fn offer_amount(&self, id: OfferId) -> Result<u128> {
        Ok(self.offer(id)?.amount)
    }

    /// Points still open for fulfillment.
    pub fn offer_available(&self, id: OfferId) -> Result<u128> {
        Ok(self.offer(id)?.available())
    }

    pub fn offer_value(&self, id: OfferId) -> Result<u128> {
        Ok(self.offer(id)?.value)
    }

    pub fn offer_asset(&self, id: OfferId) -> Result<AssetId> {
        Ok(self.offer(id)?.settlement_asset.clone())
    }

    pub fn offer_side(&self, id: OfferId) -> Result<OfferSide> {
        Ok(self.offer(id)?.side)
    }

    pub fn offer_status(&self, id: OfferId) -> Result<OfferStatus> {
        Ok(self.offer(id)?.status)
    }

    pub fn order_status(&self, id: OrderId) -> Result<OrderStatus> {
        Ok(self.order(id)?.status)
    }

    /// Orders filled against `offer`, oldest first.
    #[must_use]
    pub fn orders_for_offer(&self, offer: OfferId) -> Vec<&Order> {
        self.orders.orders_for_offer(offer)
    }

    /// Price of one point in settlement-asset terms, as a decimal.
    pub fn offer_unit_price(&self, id: OfferId) -> Result<Decimal> {
        let offer = self.offer(id)?;
        let value = math::to_display_decimal(offer.value, AMOUNT_DECIMALS)?;
        let amount = math::to_display_decimal(offer.amount, AMOUNT_DECIMALS)?;
        value
            .checked_div(amount)
            .map(|price| price.normalize())
            .ok_or(PremarketError::ArithmeticOverflow {
                context: "offer unit price",
            })
    }

    #[must_use]
    pub fn fee_config(&self) -> &FeeConfig {
        &self.fees
    }

    #[must_use]
    pub fn is_accepted(&self, asset: &AssetId) -> bool {
        self.accepted.get(asset).copied().unwrap_or(false)
    }

    /// The current configuration, accepted assets sorted.
    #[must_use]
    pub fn config(&self) -> ExchangeConfig {
        let mut accepted_assets: Vec<AssetId> = self
            .accepted
            .iter()
            .filter(|(_, on)| **on)
            .map(|(asset, _)| asset.clone())
            .collect();
        accepted_assets.sort();
        ExchangeConfig {
            fees: self.fees.clone(),
            accepted_assets,
        }
    }

    #[must_use]
    pub fn last_offer_id(&self) -> OfferId {
        self.offers.last_id()
    }

    #[must_use]
    pub fn last_order_id(&self) -> OrderId {
        self.orders.last_id()
    }

    /// Committed audit history, oldest first.
    #[must_use]
    pub fn events(&self) -> &[EventRecord] {
        self.events.records()
    }

    pub fn verify_audit_chain(&self) -> Result<()> {
        self.events.verify_chain()
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn custodian(&self) -> &C {
        &self.custodian
    }

    /// Direct custodian access for funding and inspection. Movements made
    /// here are outside any exchange operation.
    pub fn custodian_mut(&mut self) -> &mut C {
        &mut self.custodian
    }

    /// A handle on the in-operation guard, for custodians that need to
    /// observe it.
    #[must_use]
    pub fn execution_lock(&self) -> ExecutionLock {
        self.lock.clone()
    }

    // =================================================================
    // Unguarded bodies
    // =================================================================

    fn atomic<T>(
        &mut self,
        operation: &'static str,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.lock.try_enter()?;
        let checkpoint = self.checkpoint();
        match body(self) {
            Ok(value) => {
                self.release(checkpoint);
                tracing::debug!(operation, "Operation committed");
                Ok(value)
            }
            Err(err) => {
                self.rollback(checkpoint);
                tracing::warn!(operation, error = %err, "Operation rolled back");
                Err(err)
            }
        }
    }

    fn checkpoint(&mut self) -> Checkpoint {
        Checkpoint {
            tokens: self.tokens.savepoint(),
            offers: self.offers.savepoint(),
            orders: self.orders.savepoint(),
            accepted: self.accepted.savepoint(),
            events: self.events.savepoint(),
            custodian: self.custodian.savepoint(),
            fees: self.fees.clone(),
        }
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.tokens.rollback_to(checkpoint.tokens);
        self.offers.rollback_to(checkpoint.offers);
        self.orders.rollback_to(checkpoint.orders);
        self.accepted.rollback_to(checkpoint.accepted);
        self.events.rollback_to(checkpoint.events);
        self.custodian.rollback_to(checkpoint.custodian);
        self.fees = checkpoint.fees;
    }

    fn release(&mut self, checkpoint: Checkpoint) {
        self.tokens.release(checkpoint.tokens);
        self.offers.release(checkpoint.offers);
        self.orders.release(checkpoint.orders);
        self.accepted.release(checkpoint.accepted);
        self.custodian.release(checkpoint.custodian);
    }

    fn record(&mut self, event: Event) -> Result<()> {
        let now = self.clock.now();
        self.events.append(event, now)?;
        Ok(())
    }

    /// Returns the new id and the escrow required in asset units.
    fn create_offer_unguarded(
        &mut self,
        creator: AccountId,
        request: NewOffer,
        funding: Funding,
    ) -> Result<(OfferId, u128)> {
        if !self.is_accepted(&request.settlement_asset) {
            return Err(PremarketError::AssetNotAccepted(request.settlement_asset));
        }
        let token = self.tokens.token(request.token_id)?;
        let Booked {
            id,
            event,
            escrowed_units,
        } = self.offers.create(
            request,
            creator,
            token,
            &self.fees,
            &mut self.custodian,
            funding,
        )?;
        self.record(event)?;
        Ok((id, escrowed_units))
    }

    fn fulfill_unguarded(
        &mut self,
        filler: AccountId,
        offer: OfferId,
        amount: u128,
        funding: Funding,
    ) -> Result<(OrderId, u128)> {
        let token_id = self.offers.offer(offer)?.token_id;
        let token = self.tokens.token(token_id)?;
        let Booked {
            id,
            event,
            escrowed_units,
        } = self.offers.fulfill(
            offer,
            amount,
            filler,
            token,
            &mut self.orders,
            &mut self.custodian,
            funding,
        )?;
        self.record(event)?;
        Ok((id, escrowed_units))
    }

    fn cancel_unguarded(&mut self, caller: AccountId, offer: OfferId) -> Result<()> {
        let event = self
            .offers
            .cancel(offer, caller, &self.fees, &mut self.custodian)?;
        self.record(event)
    }

    fn settle_with<F>(&mut self, order: OrderId, transition: F) -> Result<()>
    where
        F: FnOnce(&mut OrderLedger, SettlementContext<'_>) -> Result<Event>,
    {
        let offer_id = self.orders.order(order)?.offer_id;
        let offer = self.offers.offer(offer_id)?;
        let token = self.tokens.token(offer.token_id)?;
        let ctx = SettlementContext {
            offer,
            token,
            fees: &self.fees,
            custodian: &mut self.custodian,
            authority: self.authority.as_ref(),
            now: self.clock.now(),
        };
        let event = transition(&mut self.orders, ctx)?;
        self.record(event)
    }

    fn require_native_offer(&self, offer: OfferId) -> Result<()> {
        require_native_asset(&self.offers.offer(offer)?.settlement_asset)
    }

    /// Refund whatever the attached native value exceeds `required` by.
    fn return_native_excess(
        &mut self,
        payer: AccountId,
        attached: u128,
        required: u128,
    ) -> Result<()> {
        let excess = attached
            .checked_sub(required)
            .ok_or(PremarketError::InsufficientAttached { required, attached })?;
        if excess > 0 {
            self.custodian.withdraw(payer, &AssetId::Native, excess)?;
            tracing::info!(payer = %payer, excess, "Native excess returned");
            self.record(Event::NativeExcessReturned {
                payer,
                amount_units: excess,
            })?;
        }
        Ok(())
    }
}

fn require_native_asset(asset: &AssetId) -> Result<()> {
    if asset.is_native() {
        Ok(())
    } else {
        Err(PremarketError::InvalidInput {
            reason: format!("native payment for an offer settled in {asset}"),
        })
    }
}

/// Parallel batch inputs must be non-empty and of equal length.
fn check_batch(expected: usize, actual: usize) -> Result<()> {
    if expected == 0 || actual == 0 {
        return Err(PremarketError::EmptyBatch);
    }
    if expected != actual {
        return Err(PremarketError::BatchLengthMismatch { expected, actual });
    }
    Ok(())
}
