//! Order table and the settlement transitions that close orders.
//!
//! Every transition requires the order to be OPEN and moves it to exactly
//! one terminal status, so a repeated call fails with
//! [`PremarketError::OrderNotOpen`] and never pays out twice.
//!
//! The ledger owns its table and id counter. The offer, token, fees and
//! collaborators an operation needs are lent in through a
//! [`SettlementContext`]; the ledger never reaches for them itself.

use chrono::{DateTime, Utc};
use premarket_custody::{Authority, Custodian, JournaledTable, Role};
use premarket_types::{
    AccountId, AuditHash, Event, FeeConfig, Offer, OfferId, Order, OrderId, OrderStatus,
    PremarketError, Result, SettlementTerms, Token, TokenStatus,
};

use crate::engine::SettlementEngine;

/// Everything a settlement transition borrows from the rest of the exchange.
pub struct SettlementContext<'a> {
    pub offer: &'a Offer,
    pub token: &'a Token,
    pub fees: &'a FeeConfig,
    pub custodian: &'a mut dyn Custodian,
    pub authority: &'a dyn Authority,
    pub now: DateTime<Utc>,
}

impl SettlementContext<'_> {
    fn settlement_decimals(&self) -> Result<u8> {
        self.custodian.decimals(&self.offer.settlement_asset)
    }

    fn require_terms(&self) -> Result<SettlementTerms> {
        if self.token.status != TokenStatus::Settle {
            return Err(PremarketError::WrongTokenStatus {
                token: self.token.id,
                expected: "SETTLE",
                actual: self.token.status,
            });
        }
        self.token
            .settlement_terms()
            .ok_or(PremarketError::SettlementTermsMissing {
                token: self.token.id,
            })
    }
}

/// Rollback point for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSavepoint {
    rows: usize,
    last_id: OrderId,
}

/// All orders ever created, keyed by id.
#[derive(Debug, Default)]
pub struct OrderLedger {
    orders: JournaledTable<OrderId, Order>,
    last_id: OrderId,
}

impl OrderLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Like [`get`](Self::get) but failing with `UnknownOrder`.
    pub fn order(&self, id: OrderId) -> Result<&Order> {
        self.orders.get(&id).ok_or(PremarketError::UnknownOrder(id))
    }

    /// Last id assigned, `order:0` before the first fill.
    #[must_use]
    pub fn last_id(&self) -> OrderId {
        self.last_id
    }

    /// Orders created against `offer`, in id order.
    #[must_use]
    pub fn orders_for_offer(&self, offer: OfferId) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self
            .orders
            .values()
            .filter(|o| o.offer_id == offer)
            .collect();
        orders.sort_by_key(|o| o.id);
        orders
    }

    /// Sum of order amounts against `offer`.
    #[must_use]
    pub fn filled_total(&self, offer: OfferId) -> u128 {
        self.orders
            .values()
            .filter(|o| o.offer_id == offer)
            .map(|o| o.amount)
            .sum()
    }

    /// Record a new OPEN order for a fill and return it.
    pub fn open(
        &mut self,
        offer: OfferId,
        amount: u128,
        seller: AccountId,
        buyer: AccountId,
    ) -> Order {
        let id = self.last_id.next();
        let order = Order::new(id, offer, amount, seller, buyer);
        self.orders.put(id, order.clone());
        self.last_id = id;
        order
    }

    #[must_use]
    pub fn savepoint(&mut self) -> LedgerSavepoint {
        LedgerSavepoint {
            rows: self.orders.savepoint(),
            last_id: self.last_id,
        }
    }

    pub fn rollback_to(&mut self, savepoint: LedgerSavepoint) {
        self.orders.rollback_to(savepoint.rows);
        self.last_id = savepoint.last_id;
    }

    pub fn release(&mut self, savepoint: LedgerSavepoint) {
        self.orders.release(savepoint.rows);
    }

    /// Seller delivers the points' worth of the deliverable asset and
    /// collects the escrow, less fees.
    pub fn settle_filled(
        &mut self,
        id: OrderId,
        caller: AccountId,
        ctx: SettlementContext<'_>,
    ) -> Result<Event> {
        let order = self.order(id)?.clone();
        if caller != order.seller {
            return Err(PremarketError::NotCounterparty {
                account: caller,
                party: "seller",
                entity: id.to_string(),
            });
        }
        Self::require_open(&order)?;
        let terms = ctx.require_terms()?;

        let settlement_decimals = ctx.settlement_decimals()?;
        let deliverable_decimals = ctx.custodian.decimals(&terms.asset)?;
        let payout = SettlementEngine::new(ctx.fees).settle_filled(
            &order,
            ctx.offer,
            &terms,
            settlement_decimals,
            deliverable_decimals,
        )?;
        tracing::debug!(order = %id, plan = ?payout.plan.movements(), "Settle filled plan");
        payout.plan.execute(ctx.custodian)?;

        self.close(order, OrderStatus::SettleFilled, None);
        tracing::info!(
            order = %id,
            delivered = payout.delivered,
            released = payout.released,
            fee = payout.fee,
            "Order settled by delivery"
        );
        Ok(Event::OrderSettleFilled {
            order: id,
            delivered_units: payout.delivered,
            delivery_fee_units: payout.delivery_fee,
            released_units: payout.released,
            fee_units: payout.fee,
        })
    }

    /// Unwind after the settlement window closed without delivery: the buyer
    /// receives the escrow less a double fee on collateral.
    pub fn settle_cancelled(
        &mut self,
        id: OrderId,
        caller: AccountId,
        ctx: SettlementContext<'_>,
    ) -> Result<Event> {
        let order = self.order(id)?.clone();
        ctx.require_terms()?;
        let deadline = ctx
            .token
            .settle_deadline()
            .ok_or(PremarketError::SettlementTermsMissing { token: ctx.token.id })?;
        if ctx.now <= deadline {
            return Err(PremarketError::SettleWindowOpen {
                token: ctx.token.id,
                deadline,
            });
        }
        Self::require_open(&order)?;
        if caller != order.buyer && !ctx.authority.has_role(caller, Role::Operator) {
            return Err(PremarketError::NotCounterparty {
                account: caller,
                party: "buyer",
                entity: id.to_string(),
            });
        }

        let decimals = ctx.settlement_decimals()?;
        let payout = SettlementEngine::new(ctx.fees).settle_cancelled(&order, ctx.offer, decimals)?;
        tracing::debug!(order = %id, plan = ?payout.plan.movements(), "Settle cancelled plan");
        payout.plan.execute(ctx.custodian)?;

        self.close(order, OrderStatus::SettleCancelled, None);
        tracing::info!(
            order = %id,
            refund = payout.released,
            fee = payout.fee,
            "Order unwound after settlement window"
        );
        Ok(Event::OrderSettleCancelled {
            order: id,
            refund_units: payout.released,
            fee_units: payout.fee,
        })
    }

    /// Operator unwind in any token phase, no fee.
    pub fn force_cancel(
        &mut self,
        id: OrderId,
        caller: AccountId,
        ctx: SettlementContext<'_>,
    ) -> Result<Event> {
        ctx.authority.require(caller, Role::Operator)?;
        let order = self.order(id)?.clone();
        Self::require_open(&order)?;

        let decimals = ctx.settlement_decimals()?;
        let (plan, shares) = SettlementEngine::force_cancel(&order, ctx.offer, decimals)?;
        plan.execute(ctx.custodian)?;

        self.close(order, OrderStatus::Cancelled, None);
        tracing::info!(
            order = %id,
            buyer_refund = shares.value,
            seller_refund = shares.collateral,
            "Order force cancelled"
        );
        Ok(Event::OrderForceCancelled {
            order: id,
            buyer_refund_units: shares.value,
            seller_refund_units: shares.collateral,
        })
    }

    /// Operator-attested settlement: delivery happened out of band and is
    /// referenced by `audit_hash`.
    pub fn settle_two_step(
        &mut self,
        id: OrderId,
        audit_hash: AuditHash,
        caller: AccountId,
        ctx: SettlementContext<'_>,
    ) -> Result<Event> {
        ctx.authority.require(caller, Role::Operator)?;
        let order = self.order(id)?.clone();
        Self::require_open(&order)?;
        ctx.require_terms()?;

        let decimals = ctx.settlement_decimals()?;
        let payout = SettlementEngine::new(ctx.fees).settle_two_step(&order, ctx.offer, decimals)?;
        payout.plan.execute(ctx.custodian)?;

        self.close(order, OrderStatus::SettleFilled, Some(audit_hash));
        tracing::info!(
            order = %id,
            audit = %audit_hash,
            released = payout.released,
            fee = payout.fee,
            "Order settled on attestation"
        );
        Ok(Event::OrderSettledTwoStep {
            order: id,
            released_units: payout.released,
            fee_units: payout.fee,
            audit_hash,
        })
    }

    fn require_open(order: &Order) -> Result<()> {
        if order.is_open() {
            Ok(())
        } else {
            Err(PremarketError::OrderNotOpen {
                order: order.id,
                actual: order.status,
            })
        }
    }

    fn close(&mut self, mut order: Order, status: OrderStatus, audit_hash: Option<AuditHash>) {
        order.status = status;
        if audit_hash.is_some() {
            order.audit_hash = audit_hash;
        }
        self.orders.put(order.id, order);
    }
}
