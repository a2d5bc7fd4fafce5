//! Settlement arithmetic and transfer plans.
//!
//! The engine never touches state. Each computation returns the amounts
//! involved plus a [`TransferPlan`]: the exact custodian movements that
//! realize them, in execution order. Callers execute the plan inside a
//! custodian savepoint; the first failing movement aborts the plan.

use premarket_custody::Custodian;
use premarket_types::constants::AMOUNT_SCALE;
use premarket_types::math::{self, Rounding};
use premarket_types::{
    AccountId, AssetId, FeeConfig, Offer, OfferSide, Order, PremarketError, Result,
    SettlementTerms,
};

/// One custodian movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Movement {
    /// Party → escrow.
    Collect {
        from: AccountId,
        asset: AssetId,
        amount: u128,
    },
    /// Escrow → party.
    Release {
        to: AccountId,
        asset: AssetId,
        amount: u128,
    },
    /// Party → party, on the sender's pre-authorization.
    Deliver {
        from: AccountId,
        to: AccountId,
        asset: AssetId,
        amount: u128,
    },
}

/// Ordered list of movements. Zero-amount movements are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    movements: Vec<Movement>,
}

impl TransferPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, from: AccountId, asset: &AssetId, amount: u128) {
        if amount > 0 {
            self.movements.push(Movement::Collect {
                from,
                asset: asset.clone(),
                amount,
            });
        }
    }

    pub fn release(&mut self, to: AccountId, asset: &AssetId, amount: u128) {
        if amount > 0 {
            self.movements.push(Movement::Release {
                to,
                asset: asset.clone(),
                amount,
            });
        }
    }

    pub fn deliver(&mut self, from: AccountId, to: AccountId, asset: &AssetId, amount: u128) {
        if amount > 0 {
            self.movements.push(Movement::Deliver {
                from,
                to,
                asset: asset.clone(),
                amount,
            });
        }
    }

    #[must_use]
    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    /// Sum released from escrow to `to` in `asset`.
    #[must_use]
    pub fn released_to(&self, to: AccountId, asset: &AssetId) -> u128 {
        self.movements
            .iter()
            .filter_map(|m| match m {
                Movement::Release {
                    to: t,
                    asset: a,
                    amount,
                } if *t == to && a == asset => Some(*amount),
                _ => None,
            })
            .sum()
    }

    /// Run every movement in order, stopping at the first failure.
    pub fn execute(&self, custodian: &mut dyn Custodian) -> Result<()> {
        for movement in &self.movements {
            match movement {
                Movement::Collect {
                    from,
                    asset,
                    amount,
                } => custodian.deposit(*from, asset, *amount)?,
                Movement::Release { to, asset, amount } => {
                    custodian.withdraw(*to, asset, *amount)?;
                }
                Movement::Deliver {
                    from,
                    to,
                    asset,
                    amount,
                } => custodian.transfer_from(*from, *to, asset, *amount)?,
            }
        }
        Ok(())
    }
}

/// The value and collateral backing one order, in settlement-asset units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowShares {
    pub value: u128,
    pub collateral: u128,
}

impl EscrowShares {
    pub fn total(&self) -> Result<u128> {
        self.value
            .checked_add(self.collateral)
            .ok_or(PremarketError::ArithmeticOverflow {
                context: "escrow shares",
            })
    }
}

/// Cancellation refund, in settlement-asset units. `net + fee == gross`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundQuote {
    pub gross: u128,
    pub fee: u128,
    pub net: u128,
}

/// Result of a settlement computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub plan: TransferPlan,
    /// Escrow released to the principal recipient.
    pub released: u128,
    /// Escrow released to the fee wallet.
    pub fee: u128,
    /// Deliverable asset moved seller → buyer (settle filled only).
    pub delivered: u128,
    /// Deliverable asset moved seller → fee wallet (settle filled only).
    pub delivery_fee: u128,
}

/// Fee, collateral and rescaling rules over a fee configuration.
#[derive(Debug, Clone, Copy)]
pub struct SettlementEngine<'a> {
    fees: &'a FeeConfig,
}

impl<'a> SettlementEngine<'a> {
    #[must_use]
    pub fn new(fees: &'a FeeConfig) -> Self {
        Self { fees }
    }

    /// Collateral for an offer worth `value` (18-digit units).
    pub fn offer_collateral(&self, value: u128) -> Result<u128> {
        self.fees.collateral_for(value)
    }

    /// What an offer creator escrows, in asset units (ceiling).
    pub fn creation_escrow(
        side: OfferSide,
        value: u128,
        collateral: u128,
        decimals: u8,
    ) -> Result<u128> {
        let leg = match side {
            OfferSide::Buy => value,
            OfferSide::Sell => collateral,
        };
        math::to_asset_units(leg, decimals, Rounding::Ceil)
    }

    /// What a filler of `points` escrows, in asset units (ceiling).
    pub fn fill_obligation(offer: &Offer, points: u128, decimals: u8) -> Result<u128> {
        let share = math::mul_div(offer.filler_leg(), points, offer.amount, Rounding::Ceil)?;
        math::to_asset_units(share, decimals, Rounding::Ceil)
    }

    /// Refund for the unfilled remainder of an offer (floor), less the refund fee.
    pub fn cancel_refund(&self, offer: &Offer, decimals: u8) -> Result<RefundQuote> {
        let remainder = offer.available();
        let leg = match offer.side {
            OfferSide::Buy => offer.value_share(remainder)?,
            OfferSide::Sell => offer.collateral_share(remainder)?,
        };
        let gross = math::to_asset_units(leg, decimals, Rounding::Floor)?;
        let fee = math::apply_rate(gross, self.fees.fee_refund_rate)?;
        Ok(RefundQuote {
            gross,
            fee,
            net: gross - fee,
        })
    }

    /// Escrow backing `order`, in settlement-asset units (floor).
    pub fn order_shares(offer: &Offer, order: &Order, decimals: u8) -> Result<EscrowShares> {
        Ok(EscrowShares {
            value: math::to_asset_units(
                offer.value_share(order.amount)?,
                decimals,
                Rounding::Floor,
            )?,
            collateral: math::to_asset_units(
                offer.collateral_share(order.amount)?,
                decimals,
                Rounding::Floor,
            )?,
        })
    }

    /// Seller delivers; escrow goes to the seller less the settle fee on value.
    pub fn settle_filled(
        &self,
        order: &Order,
        offer: &Offer,
        terms: &SettlementTerms,
        settlement_decimals: u8,
        deliverable_decimals: u8,
    ) -> Result<Payout> {
        let shares = Self::order_shares(offer, order, settlement_decimals)?;
        let deliverable = math::to_asset_units(
            math::mul_div(order.amount, terms.rate, AMOUNT_SCALE, Rounding::Floor)?,
            deliverable_decimals,
            Rounding::Floor,
        )?;
        let delivery_fee = math::apply_rate(deliverable, self.fees.fee_settle_rate)?;
        let delivered = deliverable - delivery_fee;
        let (released, fee) = self.release_less_value_fee(shares)?;

        let wallet = self.fees.fee_wallet;
        let mut plan = TransferPlan::new();
        plan.deliver(order.seller, wallet, &terms.asset, delivery_fee);
        plan.deliver(order.seller, order.buyer, &terms.asset, delivered);
        plan.release(order.seller, &offer.settlement_asset, released);
        plan.release(wallet, &offer.settlement_asset, fee);

        Ok(Payout {
            plan,
            released,
            fee,
            delivered,
            delivery_fee,
        })
    }

    /// Two-step path: escrow to the seller less the settle fee, no delivery leg.
    pub fn settle_two_step(&self, order: &Order, offer: &Offer, decimals: u8) -> Result<Payout> {
        let shares = Self::order_shares(offer, order, decimals)?;
        let (released, fee) = self.release_less_value_fee(shares)?;
        let mut plan = TransferPlan::new();
        plan.release(order.seller, &offer.settlement_asset, released);
        plan.release(self.fees.fee_wallet, &offer.settlement_asset, fee);
        Ok(Payout {
            plan,
            released,
            fee,
            delivered: 0,
            delivery_fee: 0,
        })
    }

    /// Non-delivery unwind: escrow to the buyer less a double fee on collateral.
    pub fn settle_cancelled(&self, order: &Order, offer: &Offer, decimals: u8) -> Result<Payout> {
        let shares = Self::order_shares(offer, order, decimals)?;
        let fee = math::apply_rate(shares.collateral, self.fees.fee_settle_rate)?
            .checked_mul(2)
            .ok_or(PremarketError::ArithmeticOverflow {
                context: "unwind fee",
            })?;
        let released = shares
            .total()?
            .checked_sub(fee)
            .ok_or(PremarketError::ArithmeticOverflow {
                context: "unwind payout",
            })?;
        let mut plan = TransferPlan::new();
        plan.release(order.buyer, &offer.settlement_asset, released);
        plan.release(self.fees.fee_wallet, &offer.settlement_asset, fee);
        Ok(Payout {
            plan,
            released,
            fee,
            delivered: 0,
            delivery_fee: 0,
        })
    }

    /// Operator unwind: buyer gets value back, seller gets collateral back, no fee.
    pub fn force_cancel(
        order: &Order,
        offer: &Offer,
        decimals: u8,
    ) -> Result<(TransferPlan, EscrowShares)> {
        let shares = Self::order_shares(offer, order, decimals)?;
        let mut plan = TransferPlan::new();
        plan.release(order.buyer, &offer.settlement_asset, shares.value);
        plan.release(order.seller, &offer.settlement_asset, shares.collateral);
        Ok((plan, shares))
    }

    fn release_less_value_fee(&self, shares: EscrowShares) -> Result<(u128, u128)> {
        let fee = math::apply_rate(shares.value, self.fees.fee_settle_rate)?;
        Ok((shares.total()? - fee, fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use premarket_custody::InMemoryCustodian;
    use premarket_types::constants::RATE_SCALE;
    use premarket_types::OrderId;

    const ONE: u128 = AMOUNT_SCALE;

    fn usdc() -> AssetId {
        AssetId::contract("0xusdc")
    }

    fn fees() -> FeeConfig {
        let mut f = FeeConfig::with_wallet(AccountId::new());
        f.fee_settle_rate = 25_000; // 2.5%
        f.fee_refund_rate = 5_000; // 0.5%
        f.pledge_rate = RATE_SCALE;
        f
    }

    fn order_for(offer: &Offer, amount: u128) -> Order {
        Order::new(OrderId(1), offer.id, amount, AccountId::new(), AccountId::new())
    }

    #[test]
    fn creation_escrow_rounds_up() {
        assert_eq!(
            SettlementEngine::creation_escrow(OfferSide::Buy, ONE, ONE / 2, 6).unwrap(),
            1_000_000
        );
        assert_eq!(
            SettlementEngine::creation_escrow(OfferSide::Sell, ONE, ONE / 2, 6).unwrap(),
            500_000
        );
        assert_eq!(
            SettlementEngine::creation_escrow(OfferSide::Buy, 1, 1, 6).unwrap(),
            1
        );
    }

    #[test]
    fn fill_obligation_uses_opposite_leg() {
        let mut offer = Offer::dummy(OfferSide::Buy, usdc(), 100, 1_000 * ONE);
        offer.collateral = 500 * ONE;
        // BUY offer: filler is the seller, owes collateral share.
        assert_eq!(
            SettlementEngine::fill_obligation(&offer, 60, 6).unwrap(),
            300_000_000
        );
        offer.side = OfferSide::Sell;
        // SELL offer: filler is the buyer, owes value share.
        assert_eq!(
            SettlementEngine::fill_obligation(&offer, 60, 6).unwrap(),
            600_000_000
        );
    }

    #[test]
    fn refund_plus_fee_equals_gross() {
        let f = fees();
        let engine = SettlementEngine::new(&f);
        let mut offer = Offer::dummy(OfferSide::Buy, usdc(), 100, 1_000 * ONE);
        offer.filled_amount = 30;
        let q = engine.cancel_refund(&offer, 6).unwrap();
        assert_eq!(q.gross, 700_000_000);
        assert_eq!(q.fee, 3_500_000);
        assert_eq!(q.net + q.fee, q.gross);
    }

    #[test]
    fn settle_filled_plan() {
        let f = fees();
        let engine = SettlementEngine::new(&f);
        let offer = Offer::dummy(OfferSide::Sell, usdc(), 100 * ONE, 1_000 * ONE);
        let order = order_for(&offer, 100 * ONE);
        let terms = SettlementTerms {
            asset: AssetId::contract("0xpts"),
            rate: 2 * ONE,
            settle_time: Utc::now(),
        };
        let payout = engine.settle_filled(&order, &offer, &terms, 6, 18).unwrap();

        assert_eq!(payout.delivery_fee, 5 * ONE); // 2.5% of 200
        assert_eq!(payout.delivered, 195 * ONE);
        assert_eq!(payout.fee, 25_000_000); // 2.5% of 1000 USDC
        assert_eq!(payout.released, 1_975_000_000);
        assert_eq!(payout.plan.released_to(order.seller, &usdc()), 1_975_000_000);
        assert_eq!(payout.plan.movements().len(), 4);
        assert!(matches!(payout.plan.movements()[0], Movement::Deliver { .. }));
    }

    #[test]
    fn unwind_charges_double_fee_on_collateral() {
        let f = fees();
        let engine = SettlementEngine::new(&f);
        let mut offer = Offer::dummy(OfferSide::Buy, usdc(), 10, 1_000 * ONE);
        offer.collateral = 400 * ONE;
        let order = order_for(&offer, 10);
        let payout = engine.settle_cancelled(&order, &offer, 6).unwrap();
        assert_eq!(payout.fee, 20_000_000); // 2 × 2.5% × 400
        assert_eq!(payout.released, 1_380_000_000);
        assert_eq!(payout.plan.released_to(order.buyer, &usdc()), 1_380_000_000);
    }

    #[test]
    fn force_cancel_refunds_both_legs_without_fee() {
        let offer = Offer::dummy(OfferSide::Sell, usdc(), 4, 1_000 * ONE);
        let order = order_for(&offer, 1);
        let (plan, shares) = SettlementEngine::force_cancel(&order, &offer, 6).unwrap();
        assert_eq!(shares.value, 250_000_000);
        assert_eq!(shares.collateral, 250_000_000);
        assert_eq!(plan.released_to(order.buyer, &usdc()), 250_000_000);
        assert_eq!(plan.released_to(order.seller, &usdc()), 250_000_000);
    }

    #[test]
    fn two_step_has_no_delivery_leg() {
        let f = fees();
        let engine = SettlementEngine::new(&f);
        let offer = Offer::dummy(OfferSide::Sell, usdc(), 1, 100 * ONE);
        let order = order_for(&offer, 1);
        let payout = engine.settle_two_step(&order, &offer, 6).unwrap();
        assert!(payout
            .plan
            .movements()
            .iter()
            .all(|m| matches!(m, Movement::Release { .. })));
        assert_eq!(payout.released + payout.fee, 200_000_000);
    }

    #[test]
    fn plan_execution_stops_at_first_failure() {
        let mut custodian = InMemoryCustodian::new();
        custodian.register_asset(usdc(), 6);
        let payer = AccountId::new();
        let blocked = AccountId::new();
        custodian.mint(payer, &usdc(), 100);
        custodian.block(blocked);

        let mut plan = TransferPlan::new();
        plan.collect(payer, &usdc(), 100);
        plan.release(blocked, &usdc(), 50);
        plan.release(payer, &usdc(), 50);

        let err = plan.execute(&mut custodian).unwrap_err();
        assert!(matches!(err, PremarketError::TransferFailed { .. }));
        // The collect ran, the blocked release did not, the last never started.
        assert_eq!(custodian.escrow_balance(&usdc()), 100);
        assert_eq!(custodian.balance(payer, &usdc()), 0);
    }

    #[test]
    fn zero_movements_are_dropped() {
        let mut plan = TransferPlan::new();
        plan.release(AccountId::new(), &usdc(), 0);
        plan.collect(AccountId::new(), &usdc(), 0);
        assert!(plan.movements().is_empty());
    }
}
