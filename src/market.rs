// 3.0: markets. a perp market owns its book, event queue and funding accumulators.
// prices on the book are in lots; everything else is native units.

use crate::config::{to_fixed, ConfigError, PerpMarketConfig, SpotMarketConfig};
use crate::fixed::{FixedPoint, MathError};
use crate::oracle::{OracleConfig, OraclePrice, StablePriceModel};
use crate::orderbook::{EventQueue, Orderbook};
use crate::types::{MarketId, SpotMarketId, Timestamp, TokenIndex};
use serde::{Deserialize, Serialize};

/// Perp market parameters and accumulators (everything except the book itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpMarket {
    pub market_index: MarketId,
    pub name: String,
    pub settle_token_index: TokenIndex,
    pub base_decimals: u8,

    /// Native quote per quote lot
    pub quote_lot_size: i64,
    /// Native base per base lot
    pub base_lot_size: i64,

    pub maint_base_asset_weight: FixedPoint,
    pub init_base_asset_weight: FixedPoint,
    pub maint_base_liab_weight: FixedPoint,
    pub init_base_liab_weight: FixedPoint,
    pub maint_overall_asset_weight: FixedPoint,
    pub init_overall_asset_weight: FixedPoint,
    pub base_liquidation_fee: FixedPoint,

    pub maker_fee: FixedPoint,
    pub taker_fee: FixedPoint,

    pub min_funding: FixedPoint,
    pub max_funding: FixedPoint,
    pub impact_quantity: i64,
    /// Cumulative funding per base lot, native quote
    pub long_funding: FixedPoint,
    pub short_funding: FixedPoint,
    pub funding_last_updated: Timestamp,

    /// Order sequence number, part of every order key
    pub seq_num: u64,
    /// Sum of |base lots| over all positions
    pub open_interest: i64,
    pub fees_accrued: FixedPoint,
    pub fees_settled: FixedPoint,

    pub settle_fee_flat: FixedPoint,
    pub settle_fee_amount_threshold: FixedPoint,
    pub settle_fee_fraction_low_health: FixedPoint,
    pub settle_pnl_limit_factor: FixedPoint,
    pub settle_pnl_limit_window_size_ts: u64,

    pub oracle_config: OracleConfig,
    pub oracle: Option<OraclePrice>,
    pub stable_price_model: StablePriceModel,
}

impl PerpMarket {
    pub fn from_config(config: &PerpMarketConfig, now: Timestamp) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            market_index: MarketId(config.perp_market_index),
            name: config.name.clone(),
            settle_token_index: TokenIndex(config.settle_token_index),
            base_decimals: config.base_decimals,
            quote_lot_size: config.quote_lot_size,
            base_lot_size: config.base_lot_size,
            maint_base_asset_weight: to_fixed(config.maint_base_asset_weight)?,
            init_base_asset_weight: to_fixed(config.init_base_asset_weight)?,
            maint_base_liab_weight: to_fixed(config.maint_base_liab_weight)?,
            init_base_liab_weight: to_fixed(config.init_base_liab_weight)?,
            maint_overall_asset_weight: to_fixed(config.maint_overall_asset_weight)?,
            init_overall_asset_weight: to_fixed(config.init_overall_asset_weight)?,
            base_liquidation_fee: to_fixed(config.base_liquidation_fee)?,
            maker_fee: to_fixed(config.maker_fee)?,
            taker_fee: to_fixed(config.taker_fee)?,
            min_funding: to_fixed(config.min_funding)?,
            max_funding: to_fixed(config.max_funding)?,
            impact_quantity: config.impact_quantity,
            long_funding: FixedPoint::ZERO,
            short_funding: FixedPoint::ZERO,
            funding_last_updated: now,
            seq_num: 0,
            open_interest: 0,
            fees_accrued: FixedPoint::ZERO,
            fees_settled: FixedPoint::ZERO,
            settle_fee_flat: to_fixed(config.settle_fee_flat)?,
            settle_fee_amount_threshold: to_fixed(config.settle_fee_amount_threshold)?,
            settle_fee_fraction_low_health: to_fixed(config.settle_fee_fraction_low_health)?,
            settle_pnl_limit_factor: to_fixed(config.settle_pnl_limit_factor)?,
            settle_pnl_limit_window_size_ts: config.settle_pnl_limit_window_size_ts,
            oracle_config: config.oracle.to_runtime()?,
            oracle: None,
            stable_price_model: StablePriceModel::new(
                FixedPoint::ZERO,
                now,
                to_fixed(config.stable_growth_limit)?,
            ),
        })
    }

    /// Native price (quote native per base native) to lots, rounded down.
    pub fn native_price_to_lot(&self, price: FixedPoint) -> Result<i64, MathError> {
        price
            .try_mul(FixedPoint::from_num(self.base_lot_size))?
            .try_div(FixedPoint::from_num(self.quote_lot_size))?
            .to_i64_floor()
            .ok_or(MathError::Overflow)
    }

    pub fn lot_to_native_price(&self, price_lots: i64) -> Result<FixedPoint, MathError> {
        FixedPoint::from_num(price_lots)
            .try_mul(FixedPoint::from_num(self.quote_lot_size))?
            .try_div(FixedPoint::from_num(self.base_lot_size))
    }

    /// Quote native for `quote_lots`.
    pub fn quote_lots_to_native(&self, quote_lots: i64) -> Result<FixedPoint, MathError> {
        FixedPoint::from_num(quote_lots).try_mul(FixedPoint::from_num(self.quote_lot_size))
    }

    pub fn base_lots_to_native(&self, base_lots: i64) -> Result<FixedPoint, MathError> {
        FixedPoint::from_num(base_lots).try_mul(FixedPoint::from_num(self.base_lot_size))
    }

    pub fn oracle_price(&self) -> Option<FixedPoint> {
        self.oracle.map(|o| o.price)
    }

    pub fn stable_price(&self) -> FixedPoint {
        self.stable_price_model.stable_price
    }

    pub fn oracle_price_lots(&self) -> Result<Option<i64>, MathError> {
        self.oracle_price().map(|p| self.native_price_to_lot(p)).transpose()
    }

    /// Fee on `quote_native` at the taker rate.
    pub fn taker_fee_for(&self, quote_native: FixedPoint) -> Result<FixedPoint, MathError> {
        quote_native.try_abs()?.try_mul(self.taker_fee)
    }

    pub fn maker_fee_for(&self, quote_native: FixedPoint) -> Result<FixedPoint, MathError> {
        quote_native.try_abs()?.try_mul(self.maker_fee)
    }

    pub fn next_seq_num(&mut self) -> u64 {
        let seq = self.seq_num;
        self.seq_num += 1;
        seq
    }
}

/// Perp market with its book and event queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpMarketState {
    pub market: PerpMarket,
    pub book: Orderbook,
    pub event_queue: EventQueue,
}

impl PerpMarketState {
    pub fn new(config: &PerpMarketConfig, now: Timestamp) -> Result<Self, ConfigError> {
        Ok(Self {
            market: PerpMarket::from_config(config, now)?,
            book: Orderbook::new(config.book_capacity),
            event_queue: EventQueue::new(config.event_queue_capacity),
        })
    }
}

/// Spot market on an external venue. Only the token pair is tracked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotMarket {
    pub market_index: SpotMarketId,
    pub name: String,
    pub base_token_index: TokenIndex,
    pub quote_token_index: TokenIndex,
}

impl SpotMarket {
    pub fn from_config(config: &SpotMarketConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            market_index: SpotMarketId(config.spot_market_index),
            name: config.name.clone(),
            base_token_index: TokenIndex(config.base_token_index),
            quote_token_index: TokenIndex(config.quote_token_index),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    fn market() -> PerpMarket {
        PerpMarket::from_config(&PerpMarketConfig::btc_perp(), Timestamp(0)).unwrap()
    }

    #[test]
    fn lot_price_conversion() {
        // base lot 100, quote lot 10: one price lot is 0.1 native quote per native base
        let m = market();
        assert_eq!(m.native_price_to_lot(fp("25")).unwrap(), 250);
        assert_eq!(m.native_price_to_lot(fp("25.05")).unwrap(), 250);
        assert_eq!(m.lot_to_native_price(250).unwrap(), fp("25"));
    }

    #[test]
    fn fees_use_magnitude() {
        let m = market();
        assert_eq!(m.taker_fee_for(fp("-10000")).unwrap().to_ui_string(), "4");
        assert!(m.maker_fee_for(fp("10000")).unwrap().is_negative());
    }

    #[test]
    fn oracle_lots_absent_until_price_set() {
        let mut m = market();
        assert_eq!(m.oracle_price_lots().unwrap(), None);
        m.oracle = Some(OraclePrice::exact(fp("30"), crate::types::Slot(1)));
        assert_eq!(m.oracle_price_lots().unwrap(), Some(300));
    }

    #[test]
    fn seq_nums_increase() {
        let mut m = market();
        assert_eq!(m.next_seq_num(), 0);
        assert_eq!(m.next_seq_num(), 1);
    }
}
