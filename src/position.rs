// 4.0: positions. a token position is an indexed amount against a bank; a perp position counts
// base lots plus native quote and carries funding and settle-limit bookkeeping.
// 4.1 has the trade recording (increase/reduce/flip) logic, 4.3 the settle limit window.

use crate::bank::Bank;
use crate::fixed::{FixedPoint, MathError};
use crate::market::PerpMarket;
use crate::types::{MarketId, Side, SpotMarketId, TokenIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("no free {kind} slot (limit {limit})")]
    SlotsFull { kind: &'static str, limit: usize },

    #[error("no token position for token {0}")]
    TokenPositionMissing(TokenIndex),

    #[error("no perp position for market {0}")]
    PerpPositionMissing(MarketId),

    #[error("no open orders for spot market {0:?}")]
    SpotOpenOrdersMissing(SpotMarketId),

    #[error("position still in use: {0}")]
    InUse(&'static str),

    #[error(transparent)]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPosition {
    pub token_index: TokenIndex,
    /// Native amount divided by the bank's deposit index (positive) or borrow index (negative).
    pub indexed_position: FixedPoint,
    /// Spot markets and open orders currently relying on this position
    pub in_use_count: u16,
}

impl TokenPosition {
    pub fn new(token_index: TokenIndex) -> Self {
        Self {
            token_index,
            indexed_position: FixedPoint::ZERO,
            in_use_count: 0,
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use_count > 0
    }

    pub fn native(&self, bank: &Bank) -> Result<FixedPoint, MathError> {
        if self.indexed_position.is_negative() {
            self.indexed_position.try_mul(bank.borrow_index)
        } else {
            self.indexed_position.try_mul(bank.deposit_index)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpPosition {
    pub market_index: MarketId,
    pub base_position_lots: i64,
    pub quote_position_native: FixedPoint,

    /// Market funding accumulators at the last funding settlement
    pub long_settled_funding: FixedPoint,
    pub short_settled_funding: FixedPoint,

    /// Base lots resting on the book
    pub bids_base_lots: i64,
    pub asks_base_lots: i64,
    /// Matched as taker but not yet consumed from the event queue
    pub taker_base_lots: i64,
    pub taker_quote_lots: i64,

    /// Quote flow from trades and funding, for display
    pub quote_running_native: FixedPoint,
    /// Native quote per base lot
    pub avg_entry_price_per_base_lot: FixedPoint,
    pub realized_trade_pnl_native: FixedPoint,
    pub realized_pnl_for_position_native: FixedPoint,
    pub cumulative_fees_native: FixedPoint,

    pub settle_pnl_limit_window: u64,
    pub settle_pnl_limit_settled_in_current_window_native: i64,
    /// Re-granted each window from position size
    pub recurring_settle_pnl_allowance: i64,
    /// Granted once by realized trade pnl, used up by settlement
    pub oneshot_settle_pnl_allowance: i64,
}

impl PerpPosition {
    pub fn new(market: &PerpMarket) -> Self {
        Self {
            market_index: market.market_index,
            base_position_lots: 0,
            quote_position_native: FixedPoint::ZERO,
            long_settled_funding: market.long_funding,
            short_settled_funding: market.short_funding,
            bids_base_lots: 0,
            asks_base_lots: 0,
            taker_base_lots: 0,
            taker_quote_lots: 0,
            quote_running_native: FixedPoint::ZERO,
            avg_entry_price_per_base_lot: FixedPoint::ZERO,
            realized_trade_pnl_native: FixedPoint::ZERO,
            realized_pnl_for_position_native: FixedPoint::ZERO,
            cumulative_fees_native: FixedPoint::ZERO,
            settle_pnl_limit_window: 0,
            settle_pnl_limit_settled_in_current_window_native: 0,
            recurring_settle_pnl_allowance: 0,
            oneshot_settle_pnl_allowance: 0,
        }
    }

    pub fn has_open_orders(&self) -> bool {
        self.bids_base_lots != 0 || self.asks_base_lots != 0
    }

    pub fn has_open_taker_fills(&self) -> bool {
        self.taker_base_lots != 0 || self.taker_quote_lots != 0
    }

    /// Nothing left that could need this slot.
    pub fn is_closable(&self) -> bool {
        self.base_position_lots == 0
            && self.quote_position_native.is_zero()
            && !self.has_open_orders()
            && !self.has_open_taker_fills()
    }

    /// Base lots including taker fills still in the event queue.
    pub fn effective_base_position_lots(&self) -> i64 {
        self.base_position_lots + self.taker_base_lots
    }

    pub fn base_position_native(&self, market: &PerpMarket) -> Result<FixedPoint, MathError> {
        market.base_lots_to_native(self.base_position_lots)
    }

    pub fn unsettled_funding(&self, market: &PerpMarket) -> Result<FixedPoint, MathError> {
        let lots = FixedPoint::from_num(self.base_position_lots);
        if self.base_position_lots > 0 {
            market.long_funding.try_sub(self.long_settled_funding)?.try_mul(lots)
        } else if self.base_position_lots < 0 {
            market.short_funding.try_sub(self.short_settled_funding)?.try_mul(lots)
        } else {
            Ok(FixedPoint::ZERO)
        }
    }

    /// Moves accrued funding into the quote position. Returns the amount paid (negative = received).
    pub fn settle_funding(&mut self, market: &PerpMarket) -> Result<FixedPoint, MathError> {
        let funding = self.unsettled_funding(market)?;
        self.quote_position_native = self.quote_position_native.try_sub(funding)?;
        self.quote_running_native = self.quote_running_native.try_sub(funding)?;
        self.long_settled_funding = market.long_funding;
        self.short_settled_funding = market.short_funding;
        Ok(funding)
    }

    /// Mark-to-oracle value of the position, funding included.
    pub fn unsettled_pnl(&self, market: &PerpMarket, price: FixedPoint) -> Result<FixedPoint, MathError> {
        self.base_position_native(market)?
            .try_mul(price)?
            .try_add(self.quote_position_native)?
            .try_sub(self.unsettled_funding(market)?)
    }

    // 4.1: a fill. base_change in lots, quote_change in native quote (negative when buying).
    // funding is settled first so the old base size pays the old funding.
    pub fn record_trade(
        &mut self,
        market: &mut PerpMarket,
        base_change: i64,
        quote_change_native: FixedPoint,
    ) -> Result<(), MathError> {
        if base_change == 0 {
            return Ok(());
        }
        self.settle_funding(market)?;

        let old = self.base_position_lots;
        let new = old + base_change;
        // native quote per base lot, always positive for a sane fill
        let price_per_lot = quote_change_native
            .try_neg()?
            .try_div(FixedPoint::from_num(base_change))?;

        if old == 0 || old.signum() == base_change.signum() {
            self.increase_position(old, base_change, price_per_lot)?;
        } else if new == 0 || new.signum() == old.signum() {
            self.reduce_position(old, base_change.abs(), price_per_lot)?;
        } else {
            self.flip_position(old, new, price_per_lot)?;
        }

        market.open_interest += new.abs() - old.abs();
        self.base_position_lots = new;
        self.quote_position_native = self.quote_position_native.try_add(quote_change_native)?;
        self.quote_running_native = self.quote_running_native.try_add(quote_change_native)?;
        Ok(())
    }

    // 4.2: adds to the position. averages the entry price
    fn increase_position(&mut self, old: i64, base_change: i64, price_per_lot: FixedPoint) -> Result<(), MathError> {
        let new_abs = FixedPoint::from_num((old + base_change).abs());
        let weighted = self
            .avg_entry_price_per_base_lot
            .try_mul(FixedPoint::from_num(old.abs()))?
            .try_add(price_per_lot.try_mul(FixedPoint::from_num(base_change.abs()))?)?;
        self.avg_entry_price_per_base_lot = weighted.try_div(new_abs)?;
        if old == 0 {
            self.realized_pnl_for_position_native = FixedPoint::ZERO;
        }
        Ok(())
    }

    fn reduce_position(&mut self, old: i64, closed: i64, price_per_lot: FixedPoint) -> Result<(), MathError> {
        let direction = FixedPoint::from_num(old.signum());
        let pnl = price_per_lot
            .try_sub(self.avg_entry_price_per_base_lot)?
            .try_mul(FixedPoint::from_num(closed))?
            .try_mul(direction)?;
        self.realize_pnl(pnl)?;
        if closed == old.abs() {
            self.avg_entry_price_per_base_lot = FixedPoint::ZERO;
        }
        Ok(())
    }

    fn flip_position(&mut self, old: i64, new: i64, price_per_lot: FixedPoint) -> Result<(), MathError> {
        self.reduce_position(old, old.abs(), price_per_lot)?;
        self.avg_entry_price_per_base_lot = price_per_lot;
        self.realized_pnl_for_position_native = FixedPoint::ZERO;
        debug_assert!(new != 0);
        Ok(())
    }

    fn realize_pnl(&mut self, pnl: FixedPoint) -> Result<(), MathError> {
        self.realized_trade_pnl_native = self.realized_trade_pnl_native.try_add(pnl)?;
        self.realized_pnl_for_position_native = self.realized_pnl_for_position_native.try_add(pnl)?;
        // realized pnl may be settled right away, whatever the window says
        let allowance = pnl.try_abs()?.to_i64_ceil().unwrap_or(i64::MAX);
        self.oneshot_settle_pnl_allowance = self.oneshot_settle_pnl_allowance.saturating_add(allowance);
        Ok(())
    }

    /// Fee paid (positive) or rebate received (negative).
    pub fn record_trading_fee(&mut self, fee: FixedPoint) -> Result<(), MathError> {
        self.quote_position_native = self.quote_position_native.try_sub(fee)?;
        self.cumulative_fees_native = self.cumulative_fees_native.try_add(fee)?;
        Ok(())
    }

    pub fn add_taker_trade(&mut self, side: Side, base_lots: i64, quote_lots: i64) {
        match side {
            Side::Bid => {
                self.taker_base_lots += base_lots;
                self.taker_quote_lots -= quote_lots;
            }
            Side::Ask => {
                self.taker_base_lots -= base_lots;
                self.taker_quote_lots += quote_lots;
            }
        }
    }

    pub fn remove_taker_trade(&mut self, base_change: i64, quote_change_lots: i64) {
        self.taker_base_lots -= base_change;
        self.taker_quote_lots -= quote_change_lots;
    }

    pub fn add_order(&mut self, side: Side, base_lots: i64) {
        match side {
            Side::Bid => self.bids_base_lots += base_lots,
            Side::Ask => self.asks_base_lots += base_lots,
        }
    }

    pub fn remove_order(&mut self, side: Side, base_lots: i64) {
        match side {
            Side::Bid => self.bids_base_lots = (self.bids_base_lots - base_lots).max(0),
            Side::Ask => self.asks_base_lots = (self.asks_base_lots - base_lots).max(0),
        }
    }

    // 4.3: settle limit. each window re-grants an allowance proportional to position value
    // at the stable price. a negative limit factor turns the limit off.
    pub fn update_settle_limit(&mut self, market: &PerpMarket, now: u64) -> Result<(), MathError> {
        if market.settle_pnl_limit_window_size_ts == 0 {
            return Ok(());
        }
        let window = now / market.settle_pnl_limit_window_size_ts;
        if window == self.settle_pnl_limit_window {
            return Ok(());
        }
        self.settle_pnl_limit_window = window;
        self.settle_pnl_limit_settled_in_current_window_native = 0;

        let allowance = self
            .base_position_native(market)?
            .try_mul(market.stable_price())?
            .try_mul(market.settle_pnl_limit_factor)?
            .try_abs()?;
        self.recurring_settle_pnl_allowance = allowance.to_i64_floor().unwrap_or(i64::MAX);
        Ok(())
    }

    /// (min, max) pnl that may still be settled in the current window.
    pub fn available_settle_limit(&self, market: &PerpMarket) -> (i64, i64) {
        if market.settle_pnl_limit_factor.is_negative() {
            return (i64::MIN, i64::MAX);
        }
        let recurring = self.recurring_settle_pnl_allowance;
        let settled = self.settle_pnl_limit_settled_in_current_window_native;
        let oneshot = self.oneshot_settle_pnl_allowance;
        let min = recurring
            .saturating_neg()
            .saturating_sub(settled)
            .min(0)
            .saturating_sub(oneshot);
        let max = recurring.saturating_sub(settled).max(0).saturating_add(oneshot);
        (min, max)
    }

    pub fn apply_pnl_settle_limit(&self, market: &PerpMarket, pnl: FixedPoint) -> FixedPoint {
        let (min, max) = self.available_settle_limit(market);
        pnl.clamp(FixedPoint::from_num(min), FixedPoint::from_num(max))
    }

    /// Settlement of `settled` pnl out of (positive) or into (negative) this position.
    pub fn record_settle(&mut self, settled: FixedPoint) -> Result<(), MathError> {
        self.quote_position_native = self.quote_position_native.try_sub(settled)?;

        let mut used = settled.to_i64_round_to_zero().ok_or(MathError::Overflow)?;
        let from_oneshot = used.saturating_abs().min(self.oneshot_settle_pnl_allowance);
        self.oneshot_settle_pnl_allowance -= from_oneshot;
        used -= from_oneshot * used.signum();
        self.settle_pnl_limit_settled_in_current_window_native = self
            .settle_pnl_limit_settled_in_current_window_native
            .saturating_add(used);
        Ok(())
    }
}

/// Funds held on an external spot venue on behalf of the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotOpenOrders {
    pub market_index: SpotMarketId,
    pub base_token_index: TokenIndex,
    pub quote_token_index: TokenIndex,
    pub base_free: u64,
    /// Locked in resting asks
    pub base_reserved: u64,
    pub quote_free: u64,
    /// Locked in resting bids
    pub quote_reserved: u64,
    /// 1 / highest bid price placed since the last settle, zero if none
    pub highest_placed_bid_inv: FixedPoint,
    /// Lowest ask price placed since the last settle, zero if none
    pub lowest_placed_ask: FixedPoint,
}

impl SpotOpenOrders {
    pub fn new(market_index: SpotMarketId, base_token_index: TokenIndex, quote_token_index: TokenIndex) -> Self {
        Self {
            market_index,
            base_token_index,
            quote_token_index,
            base_free: 0,
            base_reserved: 0,
            quote_free: 0,
            quote_reserved: 0,
            highest_placed_bid_inv: FixedPoint::ZERO,
            lowest_placed_ask: FixedPoint::ZERO,
        }
    }

    pub fn has_reserved(&self) -> bool {
        self.base_reserved != 0 || self.quote_reserved != 0
    }

    pub fn is_empty(&self) -> bool {
        !self.has_reserved() && self.base_free == 0 && self.quote_free == 0
    }

    pub fn record_bid(&mut self, price: FixedPoint, quote_amount: u64) -> Result<(), MathError> {
        let inv = FixedPoint::ONE.try_div(price)?;
        if inv > self.highest_placed_bid_inv {
            self.highest_placed_bid_inv = inv;
        }
        self.quote_reserved += quote_amount;
        Ok(())
    }

    pub fn record_ask(&mut self, price: FixedPoint, base_amount: u64) {
        if self.lowest_placed_ask.is_zero() || price < self.lowest_placed_ask {
            self.lowest_placed_ask = price;
        }
        self.base_reserved += base_amount;
    }

    /// Venue matched part of a resting order: reserved funds of one token become free funds of the other.
    pub fn record_fill(&mut self, side: Side, base_amount: u64, quote_amount: u64) {
        match side {
            Side::Bid => {
                self.quote_reserved = self.quote_reserved.saturating_sub(quote_amount);
                self.base_free += base_amount;
            }
            Side::Ask => {
                self.base_reserved = self.base_reserved.saturating_sub(base_amount);
                self.quote_free += quote_amount;
            }
        }
    }

    /// Venue cancelled every resting order: all reserved funds come back as free funds.
    pub fn cancel_all(&mut self) {
        self.base_free += std::mem::take(&mut self.base_reserved);
        self.quote_free += std::mem::take(&mut self.quote_reserved);
    }

    /// Empties the free balances. Placed-price bounds reset once nothing is reserved.
    pub fn take_free(&mut self) -> (u64, u64) {
        let taken = (self.base_free, self.quote_free);
        self.base_free = 0;
        self.quote_free = 0;
        if self.base_reserved == 0 {
            self.lowest_placed_ask = FixedPoint::ZERO;
        }
        if self.quote_reserved == 0 {
            self.highest_placed_bid_inv = FixedPoint::ZERO;
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerpMarketConfig;
    use crate::types::Timestamp;

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    fn market() -> PerpMarket {
        PerpMarket::from_config(&PerpMarketConfig::btc_perp(), Timestamp(0)).unwrap()
    }

    #[test]
    fn unsettled_pnl_long_profit() {
        let mut m = market();
        let mut pos = PerpPosition::new(&m);
        // buy 10 lots (1000 native base) for 20000 native quote
        pos.record_trade(&mut m, 10, fp("-20000")).unwrap();
        assert_eq!(pos.avg_entry_price_per_base_lot, fp("2000"));
        // price 22 per native base: 1000 * 22 - 20000
        assert_eq!(pos.unsettled_pnl(&m, fp("22")).unwrap(), fp("2000"));
        assert_eq!(m.open_interest, 10);
    }

    #[test]
    fn unsettled_pnl_short_profit() {
        let mut m = market();
        let mut pos = PerpPosition::new(&m);
        pos.record_trade(&mut m, -10, fp("20000")).unwrap();
        assert_eq!(pos.unsettled_pnl(&m, fp("18")).unwrap(), fp("2000"));
    }

    #[test]
    fn increase_position_averaging() {
        let mut m = market();
        let mut pos = PerpPosition::new(&m);
        pos.record_trade(&mut m, 10, fp("-20000")).unwrap();
        pos.record_trade(&mut m, 10, fp("-22000")).unwrap();
        assert_eq!(pos.base_position_lots, 20);
        assert_eq!(pos.avg_entry_price_per_base_lot, fp("2100"));
    }

    #[test]
    fn reduce_position_realizes_pnl_and_grants_oneshot_allowance() {
        let mut m = market();
        let mut pos = PerpPosition::new(&m);
        pos.record_trade(&mut m, 20, fp("-40000")).unwrap();
        pos.record_trade(&mut m, -10, fp("22000")).unwrap();

        assert_eq!(pos.base_position_lots, 10);
        assert_eq!(pos.avg_entry_price_per_base_lot, fp("2000"));
        assert_eq!(pos.realized_trade_pnl_native, fp("2000"));
        assert_eq!(pos.oneshot_settle_pnl_allowance, 2000);
        assert_eq!(pos.quote_position_native, fp("-18000"));
    }

    #[test]
    fn flip_position_restarts_entry() {
        let mut m = market();
        let mut pos = PerpPosition::new(&m);
        pos.record_trade(&mut m, 10, fp("-20000")).unwrap();
        pos.record_trade(&mut m, -15, fp("27000")).unwrap();

        assert_eq!(pos.base_position_lots, -5);
        assert_eq!(pos.avg_entry_price_per_base_lot, fp("1800"));
        assert_eq!(pos.realized_trade_pnl_native, fp("-2000"));
        assert_eq!(m.open_interest, 5);
    }

    #[test]
    fn funding_is_settled_before_trade() {
        let mut m = market();
        let mut pos = PerpPosition::new(&m);
        pos.record_trade(&mut m, 10, fp("-20000")).unwrap();

        m.long_funding = fp("3");
        m.short_funding = fp("3");
        assert_eq!(pos.unsettled_funding(&m).unwrap(), fp("30"));
        assert_eq!(pos.unsettled_pnl(&m, fp("20")).unwrap(), fp("-30"));

        pos.record_trade(&mut m, 10, fp("-20000")).unwrap();
        assert_eq!(pos.unsettled_funding(&m).unwrap(), FixedPoint::ZERO);
        assert_eq!(pos.quote_position_native, fp("-40030"));
    }

    #[test]
    fn settle_limit_window_resets() {
        let mut m = market();
        m.stable_price_model.stable_price = fp("20");
        m.settle_pnl_limit_factor = fp("0.25");
        let mut pos = PerpPosition::new(&m);
        pos.record_trade(&mut m, 10, fp("-20000")).unwrap();

        // 1000 base * 20 * 0.25
        pos.update_settle_limit(&m, 86_400).unwrap();
        assert_eq!(pos.recurring_settle_pnl_allowance, 5000);
        assert_eq!(pos.available_settle_limit(&m), (-5000, 5000));

        pos.record_settle(fp("1500")).unwrap();
        assert_eq!(pos.available_settle_limit(&m), (-5000, 3500));

        // same window: nothing changes
        pos.update_settle_limit(&m, 86_400 + 100).unwrap();
        assert_eq!(pos.available_settle_limit(&m), (-5000, 3500));

        pos.update_settle_limit(&m, 2 * 86_400).unwrap();
        assert_eq!(pos.available_settle_limit(&m), (-5000, 5000));
    }

    #[test]
    fn oneshot_allowance_is_used_first() {
        let mut m = market();
        let mut pos = PerpPosition::new(&m);
        pos.oneshot_settle_pnl_allowance = 500;
        pos.recurring_settle_pnl_allowance = 1000;

        assert_eq!(pos.available_settle_limit(&m), (-1500, 1500));
        pos.record_settle(fp("700")).unwrap();
        assert_eq!(pos.oneshot_settle_pnl_allowance, 0);
        assert_eq!(pos.settle_pnl_limit_settled_in_current_window_native, 200);
        assert_eq!(pos.apply_pnl_settle_limit(&m, fp("5000")), fp("800"));

        m.settle_pnl_limit_factor = fp("-1");
        assert_eq!(pos.apply_pnl_settle_limit(&m, fp("5000")), fp("5000"));
    }

    #[test]
    fn taker_lots_count_toward_effective_position() {
        let m = market();
        let mut pos = PerpPosition::new(&m);
        pos.add_taker_trade(Side::Bid, 3, 600);
        assert_eq!(pos.effective_base_position_lots(), 3);
        assert_eq!(pos.taker_quote_lots, -600);
        pos.remove_taker_trade(3, -600);
        assert!(!pos.has_open_taker_fills());
        assert!(pos.is_closable());
    }

    #[test]
    fn spot_fill_moves_reserved_to_free() {
        let mut oo = SpotOpenOrders::new(SpotMarketId(0), TokenIndex(1), TokenIndex(0));
        oo.record_bid(fp("20"), 2000).unwrap();
        assert_eq!(oo.highest_placed_bid_inv, FixedPoint::ONE / fp("20"));
        oo.record_fill(Side::Bid, 50, 1000);
        assert_eq!((oo.base_free, oo.quote_reserved), (50, 1000));

        assert_eq!(oo.take_free(), (50, 0));
        // bid still resting, bound kept
        assert!(oo.highest_placed_bid_inv.is_positive());
    }
}
