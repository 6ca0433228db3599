// 5.0: funding. the book's impact mid against the oracle sets a daily rate; longs pay shorts when
// the book trades above the oracle and vice versa.
// 5.1 has the rate rule, 5.2 the accrual into the market's funding accumulators.

use crate::fixed::{FixedPoint, MathError};
use crate::market::PerpMarket;
use crate::orderbook::Orderbook;
use crate::types::{MarketId, Side, Timestamp};
use serde::{Deserialize, Serialize};

pub const FUNDING_PERIOD_SECS: u64 = 86_400;
const HOURS_PER_PERIOD: i64 = 24;
const PERIODS_PER_YEAR: i64 = 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingUpdate {
    pub market_index: MarketId,
    /// Per funding period (24h)
    pub rate: FixedPoint,
    pub hourly_rate: FixedPoint,
    /// Native quote added to both accumulators, per base lot
    pub funding_delta: FixedPoint,
    pub long_funding: FixedPoint,
    pub short_funding: FixedPoint,
    pub elapsed_secs: u64,
}

// 5.1: impact prices on both sides -> clamped premium. one side only saturates to that side's bound.
pub fn funding_rate_from_impact_prices(
    bid: Option<FixedPoint>,
    ask: Option<FixedPoint>,
    index_price: FixedPoint,
    min_funding: FixedPoint,
    max_funding: FixedPoint,
) -> Result<FixedPoint, MathError> {
    match (bid, ask) {
        (Some(bid), Some(ask)) => {
            let book_price = bid.try_add(ask)?.try_div(FixedPoint::from_num(2))?;
            let premium = book_price.try_div(index_price)?.try_sub(FixedPoint::ONE)?;
            Ok(premium.clamp(min_funding, max_funding))
        }
        (Some(_), None) => Ok(max_funding),
        (None, Some(_)) => Ok(min_funding),
        (None, None) => Ok(FixedPoint::ZERO),
    }
}

/// Impact price of one side in native units, pegged orders priced off `index_price`.
pub fn impact_price_native(
    book: &Orderbook,
    market: &PerpMarket,
    side: Side,
    index_price: FixedPoint,
    now: Timestamp,
) -> Result<Option<FixedPoint>, MathError> {
    let oracle_lots = market.native_price_to_lot(index_price)?;
    book.bookside(side)
        .impact_price(market.impact_quantity, now.as_secs(), Some(oracle_lots))
        .map(|lots| market.lot_to_native_price(lots))
        .transpose()
}

pub fn current_funding_rate(
    book: &Orderbook,
    market: &PerpMarket,
    index_price: FixedPoint,
    now: Timestamp,
) -> Result<FixedPoint, MathError> {
    let bid = impact_price_native(book, market, Side::Bid, index_price, now)?;
    let ask = impact_price_native(book, market, Side::Ask, index_price, now)?;
    funding_rate_from_impact_prices(bid, ask, index_price, market.min_funding, market.max_funding)
}

// 5.2: index * rate * base_lot_size * dt / period, native quote per base lot.
// both accumulators move together; the sign of a position decides who pays.
pub fn update_funding(
    market: &mut PerpMarket,
    book: &Orderbook,
    index_price: FixedPoint,
    now: Timestamp,
) -> Result<FundingUpdate, MathError> {
    let elapsed = now.seconds_since(market.funding_last_updated);
    let rate = current_funding_rate(book, market, index_price, now)?;

    let funding_delta = index_price
        .try_mul(rate)?
        .try_mul(FixedPoint::from_num(market.base_lot_size))?
        .try_mul(FixedPoint::from_u64(elapsed))?
        .try_div(FixedPoint::from_u64(FUNDING_PERIOD_SECS))?;

    market.long_funding = market.long_funding.try_add(funding_delta)?;
    market.short_funding = market.short_funding.try_add(funding_delta)?;
    market.funding_last_updated = now;

    Ok(FundingUpdate {
        market_index: market.market_index,
        rate,
        hourly_rate: hourly_funding_rate(rate)?,
        funding_delta,
        long_funding: market.long_funding,
        short_funding: market.short_funding,
        elapsed_secs: elapsed,
    })
}

pub fn hourly_funding_rate(rate: FixedPoint) -> Result<FixedPoint, MathError> {
    rate.try_div(FixedPoint::from_num(HOURS_PER_PERIOD))
}

pub fn annualized_funding_rate(rate: FixedPoint) -> Result<FixedPoint, MathError> {
    rate.try_mul(FixedPoint::from_num(PERIODS_PER_YEAR))
}
