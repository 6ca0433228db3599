// 12.8: spot venue. the venue is external: placing an order moves tokens out of the bank into
// the account's open orders, fills and cancels are reported back, and settling returns the
// free balances to the bank.

use super::core::{check_health_post, Engine};
use super::results::EngineError;
use crate::events::{EventPayload, SpotFundsSettledEvent, SpotOrderEvent};
use crate::fixed::FixedPoint;
use crate::types::{AccountId, Side, SpotMarketId};

impl Engine {
    /// Reserve funds for a resting spot order: quote for bids, base for asks. May borrow.
    pub fn place_spot_order(
        &mut self,
        account_id: AccountId,
        market_index: SpotMarketId,
        side: Side,
        price: FixedPoint,
        amount: u64,
    ) -> Result<(), EngineError> {
        if !price.is_positive() {
            return Err(EngineError::InvalidAmount(price));
        }
        if amount == 0 {
            return Err(EngineError::InvalidAmount(FixedPoint::ZERO));
        }
        let market = self.spot_market(market_index)?.clone();
        let mut account = self.account(account_id)?.clone();
        let pre_health = self.pre_init_health(&account)?;
        let now = self.current_time;

        let token_index = match side {
            Side::Bid => market.quote_token_index,
            Side::Ask => market.base_token_index,
        };
        let mut bank = self.bank(token_index)?.clone();

        account.ensure_spot_open_orders(&market)?;
        let position = account.ensure_token_position(token_index)?;
        let withdrawn = bank.withdraw_with_fee(position, FixedPoint::from_u64(amount), now)?;
        if withdrawn.loan_amount.is_positive() {
            bank.check_net_borrows(bank.oracle_price(self.current_slot)?)?;
        }
        let open_orders = account.spot_open_orders_mut(market_index)?;
        match side {
            Side::Bid => open_orders.record_bid(price, amount)?,
            Side::Ask => open_orders.record_ask(price, amount),
        }

        let cache = self.health_cache_with(&account, &[&bank], &[])?;
        check_health_post(account_id, &cache, pre_health)?;

        tracing::debug!(account = ?account_id, market = ?market_index, side = %side, amount, "spot order placed");
        self.banks.insert(token_index, bank);
        self.accounts.insert(account_id, account);
        let (base_amount, quote_amount) = match side {
            Side::Bid => (0, amount),
            Side::Ask => (amount, 0),
        };
        self.emit_event(EventPayload::SpotOrderPlaced(SpotOrderEvent {
            market_index,
            account: account_id,
            side,
            base_amount,
            quote_amount,
        }));
        Ok(())
    }

    /// The venue matched part of a resting order. A bid gives up `quote_amount` of reserved
    /// quote for `base_amount` of base, an ask the other way round.
    pub fn fill_spot_order(
        &mut self,
        account_id: AccountId,
        market_index: SpotMarketId,
        side: Side,
        base_amount: u64,
        quote_amount: u64,
    ) -> Result<(), EngineError> {
        let mut account = self.account(account_id)?.clone();
        let open_orders = account.spot_open_orders_mut(market_index)?;
        let (reserved, given) = match side {
            Side::Bid => (open_orders.quote_reserved, quote_amount),
            Side::Ask => (open_orders.base_reserved, base_amount),
        };
        if given > reserved {
            return Err(EngineError::InvalidAmount(FixedPoint::from_u64(given)));
        }
        open_orders.record_fill(side, base_amount, quote_amount);
        self.accounts.insert(account_id, account);

        self.emit_event(EventPayload::SpotOrderFilled(SpotOrderEvent {
            market_index,
            account: account_id,
            side,
            base_amount,
            quote_amount,
        }));
        Ok(())
    }

    /// The venue cancelled all resting orders: reserved funds become free.
    pub fn cancel_spot_orders(&mut self, account_id: AccountId, market_index: SpotMarketId) -> Result<(), EngineError> {
        let mut account = self.account(account_id)?.clone();
        account.spot_open_orders_mut(market_index)?.cancel_all();
        self.accounts.insert(account_id, account);
        tracing::debug!(account = ?account_id, market = ?market_index, "spot orders cancelled");
        Ok(())
    }

    /// Deposit the free balances back into the banks. Returns (base, quote) moved.
    pub fn settle_funds(
        &mut self,
        account_id: AccountId,
        market_index: SpotMarketId,
    ) -> Result<(u64, u64), EngineError> {
        let market = self.spot_market(market_index)?.clone();
        let mut account = self.account(account_id)?.clone();
        let mut base_bank = self.bank(market.base_token_index)?.clone();
        let mut quote_bank = self.bank(market.quote_token_index)?.clone();
        let now = self.current_time;

        let (base_amount, quote_amount) = account.spot_open_orders_mut(market_index)?.take_free();
        if base_amount > 0 {
            let position = account.ensure_token_position(market.base_token_index)?;
            base_bank.deposit(position, FixedPoint::from_u64(base_amount), now)?;
        }
        if quote_amount > 0 {
            let position = account.ensure_token_position(market.quote_token_index)?;
            quote_bank.deposit(position, FixedPoint::from_u64(quote_amount), now)?;
        }

        self.banks.insert(market.base_token_index, base_bank);
        self.banks.insert(market.quote_token_index, quote_bank);
        self.accounts.insert(account_id, account);
        tracing::debug!(account = ?account_id, market = ?market_index, base_amount, quote_amount, "spot funds settled");
        self.emit_event(EventPayload::SpotFundsSettled(SpotFundsSettledEvent {
            market_index,
            account: account_id,
            base_amount,
            quote_amount,
        }));
        Ok((base_amount, quote_amount))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::health::HealthType;

    #[test]
    fn bid_reserves_quote_and_fill_settles_base() {
        let (mut engine, ids) = setup();
        let trader = engine.create_account();
        engine.deposit(trader, ids.usdc, fp("1000")).unwrap();

        engine.place_spot_order(trader, ids.spot, Side::Bid, fp("20"), 400).unwrap();
        assert_close(engine.token_balance(trader, ids.usdc).unwrap(), "600", "0.000001");
        let oo = engine.get_account(trader).unwrap().spot_open_orders(ids.spot).unwrap();
        assert_eq!(oo.quote_reserved, 400);

        engine.fill_spot_order(trader, ids.spot, Side::Bid, 20, 400).unwrap();
        assert_eq!(engine.settle_funds(trader, ids.spot).unwrap(), (20, 0));
        assert_eq!(engine.token_balance(trader, ids.sol).unwrap(), fp("20"));
    }

    #[test]
    fn fill_beyond_reservation_is_rejected() {
        let (mut engine, ids) = setup();
        let trader = engine.create_account();
        engine.deposit(trader, ids.sol, fp("10")).unwrap();
        engine.place_spot_order(trader, ids.spot, Side::Ask, fp("20"), 5).unwrap();
        let err = engine
            .fill_spot_order(trader, ids.spot, Side::Ask, 6, 120)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }

    #[test]
    fn cancelled_reservation_returns_to_the_bank() {
        let (mut engine, ids) = setup();
        let trader = engine.create_account();
        engine.deposit(trader, ids.usdc, fp("1000")).unwrap();
        engine.place_spot_order(trader, ids.spot, Side::Bid, fp("20"), 500).unwrap();
        let reserved_health = engine.health(trader, HealthType::Init).unwrap();

        engine.cancel_spot_orders(trader, ids.spot).unwrap();
        assert_eq!(engine.settle_funds(trader, ids.spot).unwrap(), (0, 500));
        assert_close(engine.token_balance(trader, ids.usdc).unwrap(), "1000", "0.000001");
        assert!(engine.health(trader, HealthType::Init).unwrap() >= reserved_health);
    }

    #[test]
    fn spot_bid_beyond_collateral_is_rejected() {
        let (mut engine, ids) = setup();
        let trader = engine.create_account();
        engine.deposit(trader, ids.sol, fp("1")).unwrap();
        // sol worth 16 at init weight cannot carry a 200 usdc borrow
        let err = engine
            .place_spot_order(trader, ids.spot, Side::Bid, fp("20"), 200)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientHealth { .. }));
        assert!(engine.get_account(trader).unwrap().spot_open_orders.is_empty());
    }
}
