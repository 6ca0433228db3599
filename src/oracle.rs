// 9.0: oracle input. the core never decodes provider wire formats; every feed arrives as
// price + confidence + last-updated slot. staleness and confidence gate new risk.
// 9.1: stable price. a slow-moving companion price used on the pessimistic side of init health.

use crate::fixed::{FixedPoint, MathError};
use crate::types::{Slot, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle is stale: last update slot {last_updated_slot:?}, now {now_slot:?}, max staleness {max_staleness_slots}")]
    Stale {
        last_updated_slot: Slot,
        now_slot: Slot,
        max_staleness_slots: i64,
    },

    #[error("oracle confidence too low: deviation {deviation} exceeds {limit}")]
    LowConfidence {
        deviation: FixedPoint,
        limit: FixedPoint,
    },

    #[error("oracle price must be positive, got {0}")]
    NonPositivePrice(FixedPoint),

    #[error("oracle math: {0}")]
    Math(#[from] MathError),
}

/// One observation from an upstream feed, in native quote per native base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OraclePrice {
    pub price: FixedPoint,
    /// Absolute confidence interval, same unit as `price`.
    pub deviation: FixedPoint,
    pub last_updated_slot: Slot,
}

impl OraclePrice {
    pub fn new(price: FixedPoint, deviation: FixedPoint, last_updated_slot: Slot) -> Self {
        Self {
            price,
            deviation,
            last_updated_slot,
        }
    }

    /// Price without a confidence band, e.g. a pegged stablecoin.
    pub fn exact(price: FixedPoint, last_updated_slot: Slot) -> Self {
        Self::new(price, FixedPoint::ZERO, last_updated_slot)
    }

    pub fn is_stale(&self, config: &OracleConfig, now_slot: Slot) -> bool {
        if config.max_staleness_slots < 0 {
            return false;
        }
        now_slot.0.saturating_sub(self.last_updated_slot.0) > config.max_staleness_slots as u64
    }

    /// Validate for use in risk-increasing actions.
    pub fn check_confidence_and_staleness(
        &self,
        config: &OracleConfig,
        now_slot: Slot,
    ) -> Result<FixedPoint, OracleError> {
        if !self.price.is_positive() {
            return Err(OracleError::NonPositivePrice(self.price));
        }
        if self.is_stale(config, now_slot) {
            return Err(OracleError::Stale {
                last_updated_slot: self.last_updated_slot,
                now_slot,
                max_staleness_slots: config.max_staleness_slots,
            });
        }
        let limit = config.conf_filter.try_mul(self.price)?;
        if self.deviation > limit {
            return Err(OracleError::LowConfidence {
                deviation: self.deviation,
                limit,
            });
        }
        Ok(self.price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Max deviation as a fraction of price, e.g. 0.1 = 10%.
    pub conf_filter: FixedPoint,
    /// Negative disables the staleness check.
    pub max_staleness_slots: i64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            conf_filter: FixedPoint::from_bits(FixedPoint::ONE.to_bits() / 10),
            max_staleness_slots: -1,
        }
    }
}

/// Follows the oracle at a bounded relative speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StablePriceModel {
    pub stable_price: FixedPoint,
    pub last_update: Timestamp,
    /// Max relative move per second.
    pub stable_growth_limit: FixedPoint,
}

impl StablePriceModel {
    pub fn new(price: FixedPoint, now: Timestamp, stable_growth_limit: FixedPoint) -> Self {
        Self {
            stable_price: price,
            last_update: now,
            stable_growth_limit,
        }
    }

    pub fn reset_to_price(&mut self, price: FixedPoint, now: Timestamp) {
        self.stable_price = price;
        self.last_update = now;
    }

    pub fn update(&mut self, oracle_price: FixedPoint, now: Timestamp) -> Result<(), MathError> {
        if self.stable_price.is_zero() {
            self.reset_to_price(oracle_price, now);
            return Ok(());
        }
        let dt = now.seconds_since(self.last_update);
        if dt == 0 {
            return Ok(());
        }
        let max_move = self
            .stable_growth_limit
            .try_mul(FixedPoint::from_u64(dt))?
            .min(FixedPoint::ONE);
        let step = self.stable_price.try_mul(max_move)?;
        let low = self.stable_price.try_sub(step)?;
        let high = self.stable_price.try_add(step)?;
        self.stable_price = oracle_price.clamp(low, high);
        self.last_update = now;
        Ok(())
    }
}

/// Anything that can hand the engine a price observation.
pub trait OracleSource {
    fn latest(&self) -> Option<OraclePrice>;
}

/// Replays a fixed sequence of observations. Used by the simulation.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle {
    observations: Vec<OraclePrice>,
    cursor: usize,
}

impl ScriptedOracle {
    pub fn new(observations: Vec<OraclePrice>) -> Self {
        Self {
            observations,
            cursor: 0,
        }
    }

    pub fn advance(&mut self) -> Option<OraclePrice> {
        if self.cursor + 1 < self.observations.len() {
            self.cursor += 1;
        }
        self.latest()
    }
}

impl OracleSource for ScriptedOracle {
    fn latest(&self) -> Option<OraclePrice> {
        self.observations.get(self.cursor).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    fn config(conf: &str, staleness: i64) -> OracleConfig {
        OracleConfig {
            conf_filter: fp(conf),
            max_staleness_slots: staleness,
        }
    }

    #[test]
    fn fresh_confident_price_passes() {
        let p = OraclePrice::new(fp("100"), fp("0.5"), Slot(10));
        assert_eq!(p.check_confidence_and_staleness(&config("0.01", 5), Slot(15)), Ok(fp("100")));
    }

    #[test]
    fn staleness_is_measured_in_slots() {
        let p = OraclePrice::exact(fp("100"), Slot(10));
        let cfg = config("0.01", 5);
        assert!(!p.is_stale(&cfg, Slot(15)));
        assert!(p.is_stale(&cfg, Slot(16)));
        assert!(matches!(
            p.check_confidence_and_staleness(&cfg, Slot(16)),
            Err(OracleError::Stale { .. })
        ));
    }

    #[test]
    fn negative_staleness_disables_check() {
        let p = OraclePrice::exact(fp("100"), Slot(0));
        assert!(!p.is_stale(&config("0.01", -1), Slot(1_000_000)));
    }

    #[test]
    fn wide_confidence_is_rejected() {
        let p = OraclePrice::new(fp("100"), fp("2"), Slot(1));
        let err = p.check_confidence_and_staleness(&config("0.01", -1), Slot(1));
        assert!(matches!(err, Err(OracleError::LowConfidence { .. })));
    }

    #[test]
    fn zero_price_is_rejected() {
        let p = OraclePrice::exact(FixedPoint::ZERO, Slot(1));
        assert!(matches!(
            p.check_confidence_and_staleness(&OracleConfig::default(), Slot(1)),
            Err(OracleError::NonPositivePrice(_))
        ));
    }

    #[test]
    fn stable_price_moves_at_bounded_speed() {
        let mut model = StablePriceModel::new(fp("100"), Timestamp(0), fp("0.0625"));
        model.update(fp("200"), Timestamp(2)).unwrap();
        // 2s * 6.25% = 12.5% max move
        assert_eq!(model.stable_price, fp("112.5"));
        model.update(fp("100.5"), Timestamp(20)).unwrap();
        assert_eq!(model.stable_price, fp("100.5"));
    }

    #[test]
    fn scripted_oracle_sticks_at_last_observation() {
        let mut oracle = ScriptedOracle::new(vec![
            OraclePrice::exact(fp("1"), Slot(1)),
            OraclePrice::exact(fp("2"), Slot(2)),
        ]);
        assert_eq!(oracle.latest().unwrap().price, fp("1"));
        assert_eq!(oracle.advance().unwrap().price, fp("2"));
        assert_eq!(oracle.advance().unwrap().price, fp("2"));
    }
}
