// 8.0: cross-margin health. one signed number per account: weighted assets minus weighted liabs
// over every token, spot reservation and perp position. rebuilt fresh for every instruction.
// Init gates new risk, Maint triggers liquidation, LiquidationEnd says when liquidation stops.

mod cache;
mod client;
mod retriever;

pub use cache::{new_health_cache, HealthCache, PerpInfo, SpotInfo, SpotReserved, TokenInfo};
pub use client::{spot_amount_given_for_health_zero, spot_amount_taken_for_health_zero};
pub use retriever::{AccountRetriever, ScanningRetriever};

use crate::bank::BankError;
use crate::fixed::{FixedPoint, MathError};
use crate::oracle::OracleError;
use crate::types::{MarketId, TokenIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HealthError {
    #[error("no bank for token {0}")]
    MissingBank(TokenIndex),

    #[error("no perp market {0}")]
    MissingPerpMarket(MarketId),

    #[error("perp market {0} has no oracle price")]
    MissingPerpOraclePrice(MarketId),

    #[error("token {0} not part of this health computation")]
    TokenNotInCache(TokenIndex),

    #[error("liability price must be positive to absorb remaining health")]
    NonPositiveLiabPrice,

    #[error(transparent)]
    Bank(#[from] BankError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthType {
    /// Stricter weights and pessimistic prices; must stay >= 0 after taking on risk.
    Init,
    /// Below zero the account can be liquidated.
    Maint,
    /// Init weights at oracle prices. Liquidation continues until this is >= 0.
    LiquidationEnd,
}

/// Oracle price plus the slow stable price. Init health takes the worse of the two.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prices {
    pub oracle: FixedPoint,
    pub stable: FixedPoint,
}

impl Prices {
    pub fn new(oracle: FixedPoint, stable: FixedPoint) -> Self {
        Self { oracle, stable }
    }

    pub fn new_single_price(price: FixedPoint) -> Self {
        Self::new(price, price)
    }

    pub fn liab(&self, health_type: HealthType) -> FixedPoint {
        match health_type {
            HealthType::Init if self.stable.is_positive() => self.oracle.max(self.stable),
            _ => self.oracle,
        }
    }

    pub fn asset(&self, health_type: HealthType) -> FixedPoint {
        match health_type {
            HealthType::Init if self.stable.is_positive() => self.oracle.min(self.stable),
            _ => self.oracle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    #[test]
    fn init_prices_are_pessimistic() {
        let prices = Prices::new(fp("10"), fp("12"));
        assert_eq!(prices.asset(HealthType::Init), fp("10"));
        assert_eq!(prices.liab(HealthType::Init), fp("12"));
        assert_eq!(prices.asset(HealthType::Maint), fp("10"));
        assert_eq!(prices.liab(HealthType::LiquidationEnd), fp("10"));
    }

    #[test]
    fn unset_stable_price_falls_back_to_oracle() {
        let prices = Prices::new(fp("10"), FixedPoint::ZERO);
        assert_eq!(prices.asset(HealthType::Init), fp("10"));
        assert_eq!(prices.liab(HealthType::Init), fp("10"));
    }
}
