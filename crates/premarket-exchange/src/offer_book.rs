//! Offer book: offer creation, fulfillment into orders, and cancellation.
//!
//! ```text
//!   create ──▶ OPEN ──fill (partial)──▶ OPEN ──fill (rest)──▶ FILLED
//!                │
//!                └──cancel (creator, remainder > 0)──▶ CANCELLED
//! ```
//!
//! Escrow is collected with ceiling rounding and refunded with floor
//! rounding, so the exchange never pays out more than it holds.

use premarket_custody::{Custodian, JournaledTable};
use premarket_settlement::{OrderLedger, SettlementEngine, TransferPlan};
use premarket_types::{
    AccountId, AssetId, Event, FeeConfig, Offer, OfferId, OfferSide, OfferStatus, OrderId,
    PremarketError, Result, Token, TokenId, TokenStatus,
};

/// Where the escrow for a create or fill comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Funding {
    /// Pull from the party through the custodian.
    Pull,
    /// Already deposited by the caller (attached native value); only the
    /// required amount is reported back.
    Prepaid,
}

/// Parameters of a new offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOffer {
    pub side: OfferSide,
    pub token_id: TokenId,
    /// Points, 18-digit units.
    pub amount: u128,
    /// Price of the whole amount, 18-digit units.
    pub value: u128,
    pub settlement_asset: AssetId,
    pub full_match_required: bool,
}

/// Outcome of a create or fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booked<I> {
    pub id: I,
    pub event: Event,
    /// Escrow required from the party, in asset units.
    pub escrowed_units: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookSavepoint {
    rows: usize,
    last_id: OfferId,
}

#[derive(Debug, Default)]
pub struct OfferBook {
    offers: JournaledTable<OfferId, Offer>,
    last_id: OfferId,
}

impl OfferBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: OfferId) -> Option<&Offer> {
        self.offers.get(&id)
    }

    pub fn offer(&self, id: OfferId) -> Result<&Offer> {
        self.offers.get(&id).ok_or(PremarketError::UnknownOffer(id))
    }

    #[must_use]
    pub fn last_id(&self) -> OfferId {
        self.last_id
    }

    /// Validate, collect the creator's leg, and record an OPEN offer.
    pub fn create(
        &mut self,
        request: NewOffer,
        creator: AccountId,
        token: &Token,
        fees: &FeeConfig,
        custodian: &mut dyn Custodian,
        funding: Funding,
    ) -> Result<Booked<OfferId>> {
        require_active(token)?;
        if request.amount == 0 {
            return Err(PremarketError::InvalidAmount {
                reason: "offer amount must be positive".into(),
            });
        }
        if request.value == 0 {
            return Err(PremarketError::InvalidAmount {
                reason: "offer value must be positive".into(),
            });
        }

        let collateral = SettlementEngine::new(fees).offer_collateral(request.value)?;
        let decimals = custodian.decimals(&request.settlement_asset)?;
        let escrowed_units = SettlementEngine::creation_escrow(
            request.side,
            request.value,
            collateral,
            decimals,
        )?;
        if funding == Funding::Pull {
            custodian.deposit(creator, &request.settlement_asset, escrowed_units)?;
        }

        let id = self.last_id.next();
        let offer = Offer {
            id,
            side: request.side,
            token_id: request.token_id,
            settlement_asset: request.settlement_asset,
            amount: request.amount,
            value: request.value,
            collateral,
            filled_amount: 0,
            status: OfferStatus::Open,
            creator,
            full_match_required: request.full_match_required,
        };
        tracing::info!(
            offer = %id,
            token = %offer.token_id,
            side = %offer.side,
            creator = %creator,
            amount = offer.amount,
            value = offer.value,
            escrowed_units,
            "Offer created"
        );
        let event = Event::OfferCreated {
            offer: id,
            token: offer.token_id,
            side: offer.side,
            creator,
            asset: offer.settlement_asset.clone(),
            amount: offer.amount,
            value: offer.value,
            collateral,
            escrowed_units,
        };
        self.offers.put(id, offer);
        self.last_id = id;
        Ok(Booked {
            id,
            event,
            escrowed_units,
        })
    }

    /// Take `amount` points of an offer, collect the filler's leg, and open
    /// an order.
    #[allow(clippy::too_many_arguments)]
    pub fn fulfill(
        &mut self,
        id: OfferId,
        amount: u128,
        filler: AccountId,
        token: &Token,
        ledger: &mut OrderLedger,
        custodian: &mut dyn Custodian,
        funding: Funding,
    ) -> Result<Booked<OrderId>> {
        let mut offer = self.offer(id)?.clone();
        if !offer.is_open() {
            return Err(PremarketError::OfferNotOpen {
                offer: id,
                actual: offer.status,
            });
        }
        require_active(token)?;
        if amount == 0 {
            return Err(PremarketError::InvalidAmount {
                reason: "fill amount must be positive".into(),
            });
        }
        let available = offer.available();
        if amount > available {
            return Err(PremarketError::InsufficientRemaining {
                offer: id,
                requested: amount,
                available,
            });
        }
        if offer.full_match_required && amount != offer.amount {
            return Err(PremarketError::FullMatchRequired {
                offer: id,
                required: offer.amount,
                requested: amount,
            });
        }

        let decimals = custodian.decimals(&offer.settlement_asset)?;
        let escrowed_units = SettlementEngine::fill_obligation(&offer, amount, decimals)?;
        if funding == Funding::Pull {
            custodian.deposit(filler, &offer.settlement_asset, escrowed_units)?;
        }

        let (seller, buyer) = offer.parties_for(filler);
        let order = ledger.open(id, amount, seller, buyer);
        offer.filled_amount += amount;
        if offer.filled_amount == offer.amount {
            offer.status = OfferStatus::Filled;
        }
        tracing::info!(
            offer = %id,
            order = %order.id,
            filler = %filler,
            amount,
            filled = offer.filled_amount,
            status = %offer.status,
            "Offer filled"
        );
        let event = Event::OfferFilled {
            offer: id,
            order: order.id,
            filler,
            amount,
            filled_amount: offer.filled_amount,
            status: offer.status,
            escrowed_units,
        };
        self.offers.put(id, offer);
        Ok(Booked {
            id: order.id,
            event,
            escrowed_units,
        })
    }

    /// Creator withdraws the unfilled remainder, less the refund fee.
    pub fn cancel(
        &mut self,
        id: OfferId,
        caller: AccountId,
        fees: &FeeConfig,
        custodian: &mut dyn Custodian,
    ) -> Result<Event> {
        let mut offer = self.offer(id)?.clone();
        if caller != offer.creator {
            return Err(PremarketError::NotCounterparty {
                account: caller,
                party: "creator",
                entity: id.to_string(),
            });
        }
        if !offer.is_open() {
            return Err(PremarketError::OfferNotOpen {
                offer: id,
                actual: offer.status,
            });
        }
        if offer.available() == 0 {
            return Err(PremarketError::NothingToRefund { offer: id });
        }

        let decimals = custodian.decimals(&offer.settlement_asset)?;
        let quote = SettlementEngine::new(fees).cancel_refund(&offer, decimals)?;
        let mut plan = TransferPlan::new();
        plan.release(offer.creator, &offer.settlement_asset, quote.net);
        plan.release(fees.fee_wallet, &offer.settlement_asset, quote.fee);
        plan.execute(custodian)?;

        offer.status = OfferStatus::Cancelled;
        self.offers.put(id, offer);
        tracing::info!(offer = %id, refund = quote.net, fee = quote.fee, "Offer cancelled");
        Ok(Event::OfferCancelled {
            offer: id,
            refund_units: quote.net,
            fee_units: quote.fee,
        })
    }

    #[must_use]
    pub fn savepoint(&mut self) -> BookSavepoint {
        BookSavepoint {
            rows: self.offers.savepoint(),
            last_id: self.last_id,
        }
    }

    pub fn rollback_to(&mut self, savepoint: BookSavepoint) {
        self.offers.rollback_to(savepoint.rows);
        self.last_id = savepoint.last_id;
    }

    pub fn release(&mut self, savepoint: BookSavepoint) {
        self.offers.release(savepoint.rows);
    }
}

fn require_active(token: &Token) -> Result<()> {
    if token.status == TokenStatus::Active {
        Ok(())
    } else {
        Err(PremarketError::WrongTokenStatus {
            token: token.id,
            expected: "ACTIVE",
            actual: token.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use premarket_custody::InMemoryCustodian;
    use premarket_types::constants::{AMOUNT_SCALE, MIN_SETTLE_DURATION_SECS};

    const ONE: u128 = AMOUNT_SCALE;

    fn usdc() -> AssetId {
        AssetId::contract("0xusdc")
    }

    struct Market {
        book: OfferBook,
        ledger: OrderLedger,
        custodian: InMemoryCustodian,
        fees: FeeConfig,
        token: Token,
    }

    fn market() -> Market {
        let mut custodian = InMemoryCustodian::new();
        custodian.register_asset(usdc(), 6);
        Market {
            book: OfferBook::new(),
            ledger: OrderLedger::new(),
            custodian,
            fees: FeeConfig::with_wallet(AccountId::new()),
            token: Token::new(TokenId::new(), MIN_SETTLE_DURATION_SECS),
        }
    }

    fn request(side: OfferSide, token: TokenId, amount: u128, value: u128) -> NewOffer {
        NewOffer {
            side,
            token_id: token,
            amount,
            value,
            settlement_asset: usdc(),
            full_match_required: false,
        }
    }

    impl Market {
        fn create(&mut self, req: NewOffer, creator: AccountId) -> Result<Booked<OfferId>> {
            self.book.create(
                req,
                creator,
                &self.token,
                &self.fees,
                &mut self.custodian,
                Funding::Pull,
            )
        }

        fn fill(
            &mut self,
            id: OfferId,
            amount: u128,
            filler: AccountId,
        ) -> Result<Booked<OrderId>> {
            self.book.fulfill(
                id,
                amount,
                filler,
                &self.token,
                &mut self.ledger,
                &mut self.custodian,
                Funding::Pull,
            )
        }
    }

    #[test]
    fn buy_offer_escrows_value_rounded_up() {
        let mut m = market();
        let alice = AccountId::new();
        m.custodian.mint(alice, &usdc(), 10_000_000);
        let req = request(OfferSide::Buy, m.token.id, 100, ONE);
        let booked = m.create(req, alice).unwrap();
        assert_eq!(booked.id, OfferId(1));
        assert_eq!(booked.escrowed_units, 1_000_000);
        assert_eq!(m.custodian.balance(alice, &usdc()), 9_000_000);
        assert_eq!(m.book.offer(booked.id).unwrap().collateral, ONE);
    }

    #[test]
    fn zero_amount_or_value_rejected() {
        let mut m = market();
        let id = m.token.id;
        assert!(matches!(
            m.create(request(OfferSide::Buy, id, 0, ONE), AccountId::new()),
            Err(PremarketError::InvalidAmount { .. })
        ));
        assert!(matches!(
            m.create(request(OfferSide::Buy, id, 1, 0), AccountId::new()),
            Err(PremarketError::InvalidAmount { .. })
        ));
        assert_eq!(m.book.last_id(), OfferId(0));
    }

    #[test]
    fn inactive_token_blocks_create_and_fill() {
        let mut m = market();
        let alice = AccountId::new();
        m.custodian.mint(alice, &usdc(), 10_000_000);
        let booked = m
            .create(request(OfferSide::Sell, m.token.id, 10, ONE), alice)
            .unwrap();
        m.token.status = TokenStatus::Inactive;
        assert!(matches!(
            m.fill(booked.id, 1, AccountId::new()),
            Err(PremarketError::WrongTokenStatus { .. })
        ));
        assert!(m
            .create(request(OfferSide::Sell, m.token.id, 10, ONE), alice)
            .is_err());
    }

    #[test]
    fn partial_then_overfill() {
        let mut m = market();
        let (alice, bob) = (AccountId::new(), AccountId::new());
        m.custodian.mint(alice, &usdc(), 1_000_000_000);
        m.custodian.mint(bob, &usdc(), 1_000_000_000);
        let offer = m
            .create(request(OfferSide::Sell, m.token.id, 100, 100 * ONE), alice)
            .unwrap()
            .id;

        let first = m.fill(offer, 60, bob).unwrap();
        assert_eq!(first.escrowed_units, 60_000_000);
        let err = m.fill(offer, 41, bob).unwrap_err();
        assert!(matches!(
            err,
            PremarketError::InsufficientRemaining {
                requested: 41,
                available: 40,
                ..
            }
        ));
        m.fill(offer, 40, bob).unwrap();

        let o = m.book.offer(offer).unwrap();
        assert_eq!(o.status, OfferStatus::Filled);
        assert_eq!(m.ledger.filled_total(offer), o.filled_amount);
        let order = m.ledger.order(first.id).unwrap();
        assert_eq!((order.seller, order.buyer), (alice, bob));
        assert!(matches!(
            m.fill(offer, 1, bob),
            Err(PremarketError::OfferNotOpen { .. })
        ));
    }

    #[test]
    fn full_match_offers_take_one_fill() {
        let mut m = market();
        let (alice, bob) = (AccountId::new(), AccountId::new());
        m.custodian.mint(alice, &usdc(), 1_000_000_000);
        m.custodian.mint(bob, &usdc(), 1_000_000_000);
        let mut req = request(OfferSide::Buy, m.token.id, 100, 10 * ONE);
        req.full_match_required = true;
        let offer = m.create(req, alice).unwrap().id;
        assert!(matches!(
            m.fill(offer, 50, bob),
            Err(PremarketError::FullMatchRequired { .. })
        ));
        let booked = m.fill(offer, 100, bob).unwrap();
        let order = m.ledger.order(booked.id).unwrap();
        assert_eq!((order.seller, order.buyer), (bob, alice));
    }

    #[test]
    fn cancel_refunds_remainder_less_fee() {
        let mut m = market();
        let (alice, bob) = (AccountId::new(), AccountId::new());
        m.custodian.mint(alice, &usdc(), 1_000_000_000);
        m.custodian.mint(bob, &usdc(), 1_000_000_000);
        let offer = m
            .create(request(OfferSide::Buy, m.token.id, 100, 1_000 * ONE), alice)
            .unwrap()
            .id;
        m.fill(offer, 30, bob).unwrap();

        assert!(matches!(
            m.book.cancel(offer, bob, &m.fees, &mut m.custodian),
            Err(PremarketError::NotCounterparty { .. })
        ));
        let event = m.book.cancel(offer, alice, &m.fees, &mut m.custodian).unwrap();
        let Event::OfferCancelled {
            refund_units,
            fee_units,
            ..
        } = event
        else {
            panic!("unexpected event {event:?}");
        };
        assert_eq!(refund_units + fee_units, 700_000_000);
        assert_eq!(fee_units, 3_500_000);
        assert_eq!(m.custodian.balance(alice, &usdc()), refund_units);
        assert_eq!(m.custodian.balance(m.fees.fee_wallet, &usdc()), fee_units);
        assert_eq!(m.book.offer(offer).unwrap().status, OfferStatus::Cancelled);
        assert!(matches!(
            m.book.cancel(offer, alice, &m.fees, &mut m.custodian),
            Err(PremarketError::OfferNotOpen { .. })
        ));
    }

    #[test]
    fn prepaid_funding_skips_pull() {
        let mut m = market();
        let alice = AccountId::new();
        let booked = m
            .book
            .create(
                request(OfferSide::Buy, m.token.id, 1, 5 * ONE),
                alice,
                &m.token,
                &m.fees,
                &mut m.custodian,
                Funding::Prepaid,
            )
            .unwrap();
        assert_eq!(booked.escrowed_units, 5_000_000);
        assert_eq!(m.custodian.escrow_balance(&usdc()), 0);
    }

    #[test]
    fn failed_pull_records_nothing() {
        let mut m = market();
        let poor = AccountId::new();
        let err = m
            .create(request(OfferSide::Buy, m.token.id, 1, ONE), poor)
            .unwrap_err();
        assert!(matches!(err, PremarketError::TransferFailed { .. }));
        assert!(m.book.get(OfferId(1)).is_none());
        assert_eq!(m.book.last_id(), OfferId(0));
    }
}
