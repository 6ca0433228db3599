// 12.7: funding. the market accumulators move on update; positions pick up the difference
// whenever they are touched or settled explicitly.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{EventPayload, FundingSettledEvent};
use crate::fixed::FixedPoint;
use crate::funding::{self, FundingUpdate};
use crate::types::{AccountId, MarketId};

impl Engine {
    /// Accrue funding since the last update, using the oracle as the index price.
    pub fn update_funding(&mut self, market_index: MarketId) -> Result<FundingUpdate, EngineError> {
        let state = self.perp_state(market_index)?;
        let index_price = self.perp_oracle_price(&state.market)?;
        let mut market = state.market.clone();
        let update = funding::update_funding(&mut market, &state.book, index_price, self.current_time)?;

        let state = self
            .perp_markets
            .get_mut(&market_index)
            .ok_or(EngineError::MarketNotFound(market_index))?;
        state.market = market;

        tracing::info!(
            market = %market_index,
            rate = %update.rate,
            long_funding = %update.long_funding,
            "funding updated"
        );
        self.emit_event(EventPayload::FundingUpdated(update.clone()));
        Ok(update)
    }

    /// Move a position's accrued funding into its quote balance. Positive when the account paid.
    pub fn settle_funding(&mut self, account_id: AccountId, market_index: MarketId) -> Result<FixedPoint, EngineError> {
        let market = &self.perp_state(market_index)?.market;
        let mut account = self.account(account_id)?.clone();
        let paid = account.perp_position_mut(market_index)?.settle_funding(market)?;
        self.accounts.insert(account_id, account);

        tracing::debug!(account = ?account_id, market = %market_index, paid = %paid, "funding settled");
        self.emit_event(EventPayload::FundingSettled(FundingSettledEvent {
            market_index,
            account: account_id,
            amount: paid,
        }));
        Ok(paid)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::orderbook::Order;
    use crate::types::Side;

    #[test]
    fn longs_pay_when_book_trades_above_index() {
        let (mut engine, ids) = setup();
        let long = engine.create_account();
        engine.deposit(long, ids.usdc, fp("100000")).unwrap();
        let short = engine.create_account();
        engine.deposit(short, ids.usdc, fp("100000")).unwrap();

        engine.place_perp_order(short, ids.perp, Order::limit(Side::Ask, 100, 10)).unwrap();
        engine.place_perp_order(long, ids.perp, Order::market(Side::Bid, 10)).unwrap();
        engine.consume_events(ids.perp, 10).unwrap();

        // book pressure: bids and asks well above the 100-lot oracle
        let mm = engine.create_account();
        engine.deposit(mm, ids.usdc, fp("1000000")).unwrap();
        engine.place_perp_order(mm, ids.perp, Order::limit(Side::Bid, 104, 200)).unwrap();
        engine.place_perp_order(mm, ids.perp, Order::limit(Side::Ask, 106, 200)).unwrap();

        engine.advance_time(3_600);
        let update = engine.update_funding(ids.perp).unwrap();
        assert!(update.rate.is_positive());
        assert!(update.funding_delta.is_positive());

        let paid_long = engine.settle_funding(long, ids.perp).unwrap();
        let paid_short = engine.settle_funding(short, ids.perp).unwrap();
        assert!(paid_long.is_positive());
        assert_eq!(paid_short, paid_long.try_neg().unwrap());
    }

    #[test]
    fn funding_needs_an_oracle() {
        let (mut engine, ids) = setup();
        engine.perp_markets.get_mut(&ids.perp).unwrap().market.oracle = None;
        assert_eq!(
            engine.update_funding(ids.perp),
            Err(EngineError::NoOraclePrice(ids.perp))
        );
    }
}
