// 7.0 config.rs: administrative settings. banks, perp markets, spot markets.
// everything here is human decimal (rust_decimal) so it reads well in json; runtime state
// converts it to FixedPoint exactly, through the decimal string.
// 7.1 validate() catches out-of-range values before anything is created.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::fixed::FixedPoint;
use crate::oracle::OracleConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid interest curve: {reason}")]
    InvalidInterestCurve { reason: String },

    #[error("invalid weights: {reason}")]
    InvalidWeights { reason: String },

    #[error("invalid market: {reason}")]
    InvalidMarket { reason: String },

    #[error("invalid fees: {reason}")]
    InvalidFees { reason: String },

    #[error("invalid window: {reason}")]
    InvalidWindow { reason: String },

    #[error("value {0} not representable as fixed point")]
    NotRepresentable(Decimal),
}

/// Exact Decimal -> FixedPoint, failing only if the value is out of range.
pub fn to_fixed(value: Decimal) -> Result<FixedPoint, ConfigError> {
    FixedPoint::try_from(value).map_err(|_| ConfigError::NotRepresentable(value))
}

fn in_unit_range(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

// Oracle gate settings shared by banks and perp markets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSettings {
    // Max confidence interval as a fraction of price
    pub conf_filter: Decimal,
    // Negative disables the staleness check
    pub max_staleness_slots: i64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            conf_filter: dec!(0.1),
            max_staleness_slots: -1,
        }
    }
}

impl OracleSettings {
    pub fn to_runtime(&self) -> Result<OracleConfig, ConfigError> {
        Ok(OracleConfig {
            conf_filter: to_fixed(self.conf_filter)?,
            max_staleness_slots: self.max_staleness_slots,
        })
    }
}

/** 7.2: utilization curve. three linear pieces: origin -> (util0, rate0) -> (util1, rate1) -> (1, max_rate) */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestCurveConfig {
    pub util0: Decimal,
    pub rate0: Decimal,
    pub util1: Decimal,
    pub rate1: Decimal,
    pub max_rate: Decimal,
}

impl Default for InterestCurveConfig {
    fn default() -> Self {
        Self {
            util0: dec!(0.7),
            rate0: dec!(0.1),
            util1: dec!(0.85),
            rate1: dec!(0.2),
            max_rate: dec!(2.0),
        }
    }
}

impl InterestCurveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let err = |reason: &str| ConfigError::InvalidInterestCurve {
            reason: reason.to_string(),
        };
        if !(self.util0 > Decimal::ZERO && self.util0 < self.util1 && self.util1 < Decimal::ONE) {
            return Err(err("need 0 < util0 < util1 < 1"));
        }
        if !(self.rate0 >= Decimal::ZERO && self.rate0 <= self.rate1 && self.rate1 <= self.max_rate) {
            return Err(err("need 0 <= rate0 <= rate1 <= max_rate"));
        }
        Ok(())
    }
}

/** 7.3: one bank (lending pool) per token */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub token_index: u16,
    // Mint decimals, display only
    pub decimals: u8,
    pub interest: InterestCurveConfig,
    // Charged once on the borrowed amount
    pub loan_origination_fee_rate: Decimal,
    pub maint_asset_weight: Decimal,
    pub init_asset_weight: Decimal,
    pub maint_liab_weight: Decimal,
    pub init_liab_weight: Decimal,
    pub liquidation_fee: Decimal,
    // Init weights scale once total deposits/borrows exceed this much quote value
    pub deposit_weight_scale_start_quote: Decimal,
    pub borrow_weight_scale_start_quote: Decimal,
    pub net_borrow_limit_window_size_ts: u64,
    // Quote value; negative disables the limit
    pub net_borrow_limit_per_window_quote: i64,
    pub oracle: OracleSettings,
    // Max relative stable-price move per second
    pub stable_growth_limit: Decimal,
}

impl TokenConfig {
    pub fn usdc() -> Self {
        Self {
            name: "USDC".to_string(),
            token_index: 0,
            decimals: 6,
            interest: InterestCurveConfig::default(),
            loan_origination_fee_rate: dec!(0.0005),
            maint_asset_weight: Decimal::ONE,
            init_asset_weight: Decimal::ONE,
            maint_liab_weight: Decimal::ONE,
            init_liab_weight: Decimal::ONE,
            liquidation_fee: Decimal::ZERO,
            deposit_weight_scale_start_quote: dec!(5000000000000),
            borrow_weight_scale_start_quote: dec!(5000000000000),
            net_borrow_limit_window_size_ts: 86_400,
            net_borrow_limit_per_window_quote: -1,
            oracle: OracleSettings::default(),
            stable_growth_limit: dec!(0.0003),
        }
    }

    pub fn sol() -> Self {
        Self {
            name: "SOL".to_string(),
            token_index: 1,
            decimals: 9,
            interest: InterestCurveConfig::default(),
            loan_origination_fee_rate: dec!(0.0005),
            maint_asset_weight: dec!(0.9),
            init_asset_weight: dec!(0.8),
            maint_liab_weight: dec!(1.1),
            init_liab_weight: dec!(1.2),
            liquidation_fee: dec!(0.05),
            deposit_weight_scale_start_quote: dec!(5000000000000),
            borrow_weight_scale_start_quote: dec!(5000000000000),
            net_borrow_limit_window_size_ts: 86_400,
            net_borrow_limit_per_window_quote: -1,
            oracle: OracleSettings::default(),
            stable_growth_limit: dec!(0.0003),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.interest.validate()?;
        let weights = |reason: &str| ConfigError::InvalidWeights {
            reason: format!("{}: {}", self.name, reason),
        };
        if !(in_unit_range(self.init_asset_weight)
            && self.init_asset_weight <= self.maint_asset_weight
            && self.maint_asset_weight <= Decimal::ONE)
        {
            return Err(weights("need 0 <= init_asset <= maint_asset <= 1"));
        }
        if !(self.maint_liab_weight >= Decimal::ONE && self.init_liab_weight >= self.maint_liab_weight) {
            return Err(weights("need 1 <= maint_liab <= init_liab"));
        }
        if !in_unit_range(self.liquidation_fee) || !in_unit_range(self.loan_origination_fee_rate) {
            return Err(ConfigError::InvalidFees {
                reason: format!("{}: fees must be in [0, 1]", self.name),
            });
        }
        if self.deposit_weight_scale_start_quote <= Decimal::ZERO
            || self.borrow_weight_scale_start_quote <= Decimal::ZERO
        {
            return Err(weights("weight scale thresholds must be positive"));
        }
        if self.net_borrow_limit_window_size_ts == 0 {
            return Err(ConfigError::InvalidWindow {
                reason: format!("{}: net borrow window must be non-zero", self.name),
            });
        }
        Ok(())
    }
}

/** 7.4: perp market. lot sizes, weights, fees, funding and settlement limits */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpMarketConfig {
    pub name: String,
    pub perp_market_index: u32,
    // Token the market settles pnl in
    pub settle_token_index: u16,
    pub base_decimals: u8,
    // Native quote per quote lot
    pub quote_lot_size: i64,
    // Native base per base lot
    pub base_lot_size: i64,
    pub maint_base_asset_weight: Decimal,
    pub init_base_asset_weight: Decimal,
    pub maint_base_liab_weight: Decimal,
    pub init_base_liab_weight: Decimal,
    // Weight on positive unsettled pnl
    pub maint_overall_asset_weight: Decimal,
    pub init_overall_asset_weight: Decimal,
    pub base_liquidation_fee: Decimal,
    // Negative maker fee is a rebate
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    // Funding bounds, per day
    pub min_funding: Decimal,
    pub max_funding: Decimal,
    // Base lots used for the book impact price
    pub impact_quantity: i64,
    pub settle_fee_flat: Decimal,
    pub settle_fee_amount_threshold: Decimal,
    pub settle_fee_fraction_low_health: Decimal,
    // Fraction of position value that may be settled per window
    pub settle_pnl_limit_factor: Decimal,
    pub settle_pnl_limit_window_size_ts: u64,
    // Node slots per book side
    pub book_capacity: u32,
    pub event_queue_capacity: usize,
    pub oracle: OracleSettings,
    pub stable_growth_limit: Decimal,
}

impl PerpMarketConfig {
    pub fn btc_perp() -> Self {
        Self {
            name: "BTC-PERP".to_string(),
            perp_market_index: 0,
            settle_token_index: 0,
            base_decimals: 6,
            quote_lot_size: 10,
            base_lot_size: 100,
            maint_base_asset_weight: dec!(0.95),
            init_base_asset_weight: dec!(0.9),
            maint_base_liab_weight: dec!(1.05),
            init_base_liab_weight: dec!(1.1),
            maint_overall_asset_weight: Decimal::ONE,
            init_overall_asset_weight: dec!(0.95),
            base_liquidation_fee: dec!(0.0125),
            maker_fee: dec!(-0.0001),
            taker_fee: dec!(0.0004),
            min_funding: dec!(-0.05),
            max_funding: dec!(0.05),
            impact_quantity: 100,
            settle_fee_flat: Decimal::ZERO,
            settle_fee_amount_threshold: Decimal::ZERO,
            settle_fee_fraction_low_health: Decimal::ZERO,
            settle_pnl_limit_factor: dec!(0.2),
            settle_pnl_limit_window_size_ts: 86_400,
            book_capacity: 1_024,
            event_queue_capacity: 512,
            oracle: OracleSettings::default(),
            stable_growth_limit: dec!(0.0003),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let market = |reason: &str| ConfigError::InvalidMarket {
            reason: format!("{}: {}", self.name, reason),
        };
        if self.quote_lot_size <= 0 || self.base_lot_size <= 0 {
            return Err(market("lot sizes must be positive"));
        }
        if self.impact_quantity <= 0 {
            return Err(market("impact quantity must be positive"));
        }
        if self.book_capacity < 8 || self.event_queue_capacity == 0 {
            return Err(market("book and event queue need room"));
        }
        if self.min_funding > self.max_funding {
            return Err(market("min_funding above max_funding"));
        }
        let weights = |reason: &str| ConfigError::InvalidWeights {
            reason: format!("{}: {}", self.name, reason),
        };
        if !(in_unit_range(self.init_base_asset_weight) && self.init_base_asset_weight <= self.maint_base_asset_weight)
        {
            return Err(weights("need 0 <= init_base_asset <= maint_base_asset <= 1"));
        }
        if !(self.maint_base_liab_weight >= Decimal::ONE && self.init_base_liab_weight >= self.maint_base_liab_weight)
        {
            return Err(weights("need 1 <= maint_base_liab <= init_base_liab"));
        }
        if !(in_unit_range(self.init_overall_asset_weight)
            && in_unit_range(self.maint_overall_asset_weight)
            && self.init_overall_asset_weight <= self.maint_overall_asset_weight)
        {
            return Err(weights("overall asset weights must be in [0, 1] with init <= maint"));
        }
        if self.taker_fee < Decimal::ZERO || self.taker_fee + self.maker_fee < Decimal::ZERO {
            return Err(ConfigError::InvalidFees {
                reason: format!("{}: maker rebate exceeds taker fee", self.name),
            });
        }
        if self.settle_pnl_limit_window_size_ts == 0 {
            return Err(ConfigError::InvalidWindow {
                reason: format!("{}: settle limit window must be non-zero", self.name),
            });
        }
        Ok(())
    }
}

/** 7.5: spot market. the venue itself is external; only the token pair matters here */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotMarketConfig {
    pub name: String,
    pub spot_market_index: u32,
    pub base_token_index: u16,
    pub quote_token_index: u16,
}

impl SpotMarketConfig {
    pub fn sol_usdc() -> Self {
        Self {
            name: "SOL/USDC".to_string(),
            spot_market_index: 0,
            base_token_index: 1,
            quote_token_index: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_token_index == self.quote_token_index {
            return Err(ConfigError::InvalidMarket {
                reason: format!("{}: base and quote token must differ", self.name),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert!(TokenConfig::usdc().validate().is_ok());
        assert!(TokenConfig::sol().validate().is_ok());
        assert!(PerpMarketConfig::btc_perp().validate().is_ok());
    }

    #[test]
    fn interest_curve_must_be_monotone() {
        let mut curve = InterestCurveConfig::default();
        curve.util1 = dec!(0.6);
        assert!(matches!(curve.validate(), Err(ConfigError::InvalidInterestCurve { .. })));

        let mut curve = InterestCurveConfig::default();
        curve.rate1 = dec!(3);
        assert!(curve.validate().is_err());
    }

    #[test]
    fn liab_weight_below_one_rejected() {
        let mut token = TokenConfig::sol();
        token.maint_liab_weight = dec!(0.9);
        assert!(matches!(token.validate(), Err(ConfigError::InvalidWeights { .. })));
    }

    #[test]
    fn zero_lot_size_rejected() {
        let mut market = PerpMarketConfig::btc_perp();
        market.base_lot_size = 0;
        assert!(matches!(market.validate(), Err(ConfigError::InvalidMarket { .. })));
    }

    #[test]
    fn rebate_cannot_exceed_taker_fee() {
        let mut market = PerpMarketConfig::btc_perp();
        market.maker_fee = dec!(-0.001);
        assert!(matches!(market.validate(), Err(ConfigError::InvalidFees { .. })));
    }

    #[test]
    fn decimal_converts_exactly() {
        let w = to_fixed(dec!(0.8)).unwrap();
        assert_eq!(w.to_ui_string(), "0.8");
        assert_eq!(to_fixed(dec!(-12.5)).unwrap(), FixedPoint::from_num(-25) / FixedPoint::from_num(2));
    }

    #[test]
    fn config_from_json() {
        let json = serde_json::to_string(&TokenConfig::sol()).unwrap();
        let back: TokenConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TokenConfig::sol());

        let curve: InterestCurveConfig = serde_json::from_str(
            r#"{"util0":"0.5","rate0":"0.05","util1":"0.8","rate1":"0.1","max_rate":"1.5"}"#,
        )
        .unwrap();
        assert!(curve.validate().is_ok());
        assert_eq!(curve.max_rate, dec!(1.5));
    }
}
