// 6.0: banks. one lending pool per token. balances are stored indexed so interest accrues by
// moving two indices instead of touching every account.
// 6.1: interest curve, 6.2: index accrual, 6.3: deposit/withdraw, 6.4: net borrow window,
// 6.5: weight scaling.

use crate::config::{to_fixed, ConfigError, InterestCurveConfig, TokenConfig};
use crate::fixed::{FixedPoint, MathError};
use crate::oracle::{OracleConfig, OracleError, OraclePrice, StablePriceModel};
use crate::position::TokenPosition;
use crate::types::{Slot, Timestamp, TokenIndex};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_YEAR: u64 = 31_536_000;
const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BankError {
    #[error("amount must be non-negative, got {0}")]
    InvalidAmount(FixedPoint),

    #[error("token {token}: net borrows of {net_borrows_quote} quote in window exceed limit {limit}")]
    BorrowLimitExceeded {
        token: TokenIndex,
        net_borrows_quote: FixedPoint,
        limit: i64,
    },

    #[error("token {0} has no oracle price")]
    MissingOraclePrice(TokenIndex),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

// 6.1: rates are annual. utilization is borrows / deposits in native units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterestCurve {
    pub util0: FixedPoint,
    pub rate0: FixedPoint,
    pub util1: FixedPoint,
    pub rate1: FixedPoint,
    pub max_rate: FixedPoint,
}

impl InterestCurve {
    pub fn from_config(config: &InterestCurveConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            util0: to_fixed(config.util0)?,
            rate0: to_fixed(config.rate0)?,
            util1: to_fixed(config.util1)?,
            rate1: to_fixed(config.rate1)?,
            max_rate: to_fixed(config.max_rate)?,
        })
    }

    /// (utilization, borrow rate) for the given native totals.
    pub fn borrow_rate(&self, deposits: FixedPoint, borrows: FixedPoint) -> Result<(FixedPoint, FixedPoint), MathError> {
        if deposits.is_zero() && borrows.is_zero() {
            return Ok((FixedPoint::ZERO, FixedPoint::ZERO));
        }
        if deposits <= borrows {
            return Ok((FixedPoint::ONE, self.max_rate));
        }
        let utilization = borrows.try_div(deposits)?;
        Ok((utilization, self.rate_at_utilization(utilization)?))
    }

    pub fn rate_at_utilization(&self, utilization: FixedPoint) -> Result<FixedPoint, MathError> {
        if utilization > self.util1 {
            let extra = utilization.try_sub(self.util1)?;
            let span = FixedPoint::ONE.try_sub(self.util1)?;
            let rise = self.max_rate.try_sub(self.rate1)?;
            self.rate1.try_add(extra.try_mul(rise)?.try_div(span)?)
        } else if utilization > self.util0 {
            let extra = utilization.try_sub(self.util0)?;
            let span = self.util1.try_sub(self.util0)?;
            let rise = self.rate1.try_sub(self.rate0)?;
            self.rate0.try_add(extra.try_mul(rise)?.try_div(span)?)
        } else {
            utilization.try_mul(self.rate0)?.try_div(self.util0)
        }
    }
}

/// Result of one index accrual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestUpdate {
    pub token_index: TokenIndex,
    pub utilization: FixedPoint,
    pub borrow_rate: FixedPoint,
    pub deposit_rate: FixedPoint,
    pub deposit_index: FixedPoint,
    pub borrow_index: FixedPoint,
    pub elapsed_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawResult {
    /// Native amount that had to be borrowed, fee included
    pub loan_amount: FixedPoint,
    pub loan_fee: FixedPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    pub token_index: TokenIndex,
    pub name: String,
    pub decimals: u8,

    pub deposit_index: FixedPoint,
    pub borrow_index: FixedPoint,
    pub indexed_deposits: FixedPoint,
    pub indexed_borrows: FixedPoint,
    pub index_last_updated: Timestamp,
    pub curve: InterestCurve,
    /// Utilization averaged over roughly the last day
    pub avg_utilization: FixedPoint,

    pub loan_origination_fee_rate: FixedPoint,
    pub collected_fees_native: FixedPoint,
    /// Sub-native remainders swept out of closed positions
    pub dust: FixedPoint,

    pub maint_asset_weight: FixedPoint,
    pub init_asset_weight: FixedPoint,
    pub maint_liab_weight: FixedPoint,
    pub init_liab_weight: FixedPoint,
    pub liquidation_fee: FixedPoint,
    pub deposit_weight_scale_start_quote: FixedPoint,
    pub borrow_weight_scale_start_quote: FixedPoint,

    pub net_borrow_limit_window_size_ts: u64,
    pub net_borrow_limit_per_window_quote: i64,
    pub last_net_borrows_window_start_ts: u64,
    /// Native; borrows add, repayments subtract
    pub net_borrows_in_window: i64,

    pub oracle_config: OracleConfig,
    pub oracle: Option<OraclePrice>,
    pub stable_price_model: StablePriceModel,
}

impl Bank {
    pub fn from_config(config: &TokenConfig, now: Timestamp) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            token_index: TokenIndex(config.token_index),
            name: config.name.clone(),
            decimals: config.decimals,
            deposit_index: FixedPoint::ONE,
            borrow_index: FixedPoint::ONE,
            indexed_deposits: FixedPoint::ZERO,
            indexed_borrows: FixedPoint::ZERO,
            index_last_updated: now,
            curve: InterestCurve::from_config(&config.interest)?,
            avg_utilization: FixedPoint::ZERO,
            loan_origination_fee_rate: to_fixed(config.loan_origination_fee_rate)?,
            collected_fees_native: FixedPoint::ZERO,
            dust: FixedPoint::ZERO,
            maint_asset_weight: to_fixed(config.maint_asset_weight)?,
            init_asset_weight: to_fixed(config.init_asset_weight)?,
            maint_liab_weight: to_fixed(config.maint_liab_weight)?,
            init_liab_weight: to_fixed(config.init_liab_weight)?,
            liquidation_fee: to_fixed(config.liquidation_fee)?,
            deposit_weight_scale_start_quote: to_fixed(config.deposit_weight_scale_start_quote)?,
            borrow_weight_scale_start_quote: to_fixed(config.borrow_weight_scale_start_quote)?,
            net_borrow_limit_window_size_ts: config.net_borrow_limit_window_size_ts,
            net_borrow_limit_per_window_quote: config.net_borrow_limit_per_window_quote,
            last_net_borrows_window_start_ts: now.as_secs()
                - now.as_secs() % config.net_borrow_limit_window_size_ts,
            net_borrows_in_window: 0,
            oracle_config: config.oracle.to_runtime()?,
            oracle: None,
            stable_price_model: StablePriceModel::new(
                FixedPoint::ZERO,
                now,
                to_fixed(config.stable_growth_limit)?,
            ),
        })
    }

    pub fn native_deposits(&self) -> Result<FixedPoint, MathError> {
        self.indexed_deposits.try_mul(self.deposit_index)
    }

    pub fn native_borrows(&self) -> Result<FixedPoint, MathError> {
        self.indexed_borrows.try_mul(self.borrow_index)
    }

    /// (utilization, borrow rate, deposit rate). Depositors earn exactly what borrowers pay.
    pub fn compute_rates(&self) -> Result<(FixedPoint, FixedPoint, FixedPoint), MathError> {
        let (utilization, borrow_rate) = self
            .curve
            .borrow_rate(self.native_deposits()?, self.native_borrows()?)?;
        let deposit_rate = utilization.try_mul(borrow_rate)?;
        Ok((utilization, borrow_rate, deposit_rate))
    }

    // 6.2: simple interest per update: index *= 1 + rate * dt / year
    pub fn update_index_and_rate(&mut self, now: Timestamp) -> Result<InterestUpdate, MathError> {
        let elapsed = now.seconds_since(self.index_last_updated);
        let (utilization, borrow_rate, deposit_rate) = self.compute_rates()?;

        if elapsed > 0 {
            let dt = FixedPoint::from_u64(elapsed);
            let year = FixedPoint::from_u64(SECONDS_PER_YEAR);
            let borrow_growth = borrow_rate.try_mul(dt)?.try_div(year)?;
            let deposit_growth = deposit_rate.try_mul(dt)?.try_div(year)?;
            self.borrow_index = self
                .borrow_index
                .try_mul(FixedPoint::ONE.try_add(borrow_growth)?)?;
            self.deposit_index = self
                .deposit_index
                .try_mul(FixedPoint::ONE.try_add(deposit_growth)?)?;

            let weight = FixedPoint::from_u64(elapsed.min(SECONDS_PER_DAY));
            let day = FixedPoint::from_u64(SECONDS_PER_DAY);
            let kept = self.avg_utilization.try_mul(day.try_sub(weight)?)?;
            self.avg_utilization = kept.try_add(utilization.try_mul(weight)?)?.try_div(day)?;
            self.index_last_updated = now;
        }

        Ok(InterestUpdate {
            token_index: self.token_index,
            utilization,
            borrow_rate,
            deposit_rate,
            deposit_index: self.deposit_index,
            borrow_index: self.borrow_index,
            elapsed_secs: elapsed,
        })
    }

    // 6.3: repay first, then deposit. credited amounts round down in the bank's favour.
    pub fn deposit(&mut self, position: &mut TokenPosition, amount: FixedPoint, now: Timestamp) -> Result<(), BankError> {
        if amount.is_negative() {
            return Err(BankError::InvalidAmount(amount));
        }
        let mut remaining = amount;

        if position.indexed_position.is_negative() {
            let native = position.native(self)?;
            let new_native = native.try_add(remaining)?;
            if new_native.is_negative() {
                let indexed_change = remaining.try_div(self.borrow_index)?;
                position.indexed_position = position.indexed_position.try_add(indexed_change)?;
                self.indexed_borrows = self.indexed_borrows.try_sub(indexed_change)?;
                self.update_net_borrows(-remaining.to_i64_floor().unwrap_or(i64::MAX), now);
                return Ok(());
            }
            // borrow fully repaid
            self.indexed_borrows = self.indexed_borrows.try_add(position.indexed_position)?;
            position.indexed_position = FixedPoint::ZERO;
            self.update_net_borrows(-native.try_abs()?.to_i64_floor().unwrap_or(i64::MAX), now);
            remaining = new_native;
        }

        if remaining.is_positive() {
            let indexed_change = remaining.try_div(self.deposit_index)?;
            position.indexed_position = position.indexed_position.try_add(indexed_change)?;
            self.indexed_deposits = self.indexed_deposits.try_add(indexed_change)?;
        }
        Ok(())
    }

    /// Withdraw, borrowing the shortfall with the loan origination fee.
    pub fn withdraw_with_fee(
        &mut self,
        position: &mut TokenPosition,
        amount: FixedPoint,
        now: Timestamp,
    ) -> Result<WithdrawResult, BankError> {
        self.withdraw_internal(position, amount, now, true)
    }

    /// Withdraw without charging the loan fee. Used by settlement and liquidation transfers.
    pub fn withdraw_without_fee(
        &mut self,
        position: &mut TokenPosition,
        amount: FixedPoint,
        now: Timestamp,
    ) -> Result<WithdrawResult, BankError> {
        self.withdraw_internal(position, amount, now, false)
    }

    fn withdraw_internal(
        &mut self,
        position: &mut TokenPosition,
        amount: FixedPoint,
        now: Timestamp,
        with_loan_fee: bool,
    ) -> Result<WithdrawResult, BankError> {
        if amount.is_negative() {
            return Err(BankError::InvalidAmount(amount));
        }
        let mut remaining = amount;

        if position.indexed_position.is_positive() {
            let native = position.native(self)?;
            let new_native = native.try_sub(remaining)?;
            if new_native >= FixedPoint::ONE {
                // one extra ulp so rounding never favours the account
                let indexed_change = remaining
                    .try_div(self.deposit_index)?
                    .try_add(FixedPoint::DELTA)?
                    .min(position.indexed_position);
                position.indexed_position = position.indexed_position.try_sub(indexed_change)?;
                self.indexed_deposits = self.indexed_deposits.try_sub(indexed_change)?;
                return Ok(WithdrawResult::default());
            }
            self.indexed_deposits = self.indexed_deposits.try_sub(position.indexed_position)?;
            position.indexed_position = FixedPoint::ZERO;
            if !new_native.is_negative() {
                self.dust = self.dust.try_add(new_native)?;
                return Ok(WithdrawResult::default());
            }
            remaining = new_native.try_neg()?;
        }

        if remaining.is_zero() {
            return Ok(WithdrawResult::default());
        }

        let loan_fee = if with_loan_fee {
            remaining.try_mul(self.loan_origination_fee_rate)?
        } else {
            FixedPoint::ZERO
        };
        let loan_amount = remaining.try_add(loan_fee)?;
        let indexed_change = loan_amount
            .try_div(self.borrow_index)?
            .try_add(FixedPoint::DELTA)?;
        position.indexed_position = position.indexed_position.try_sub(indexed_change)?;
        self.indexed_borrows = self.indexed_borrows.try_add(indexed_change)?;
        self.collected_fees_native = self.collected_fees_native.try_add(loan_fee)?;
        self.update_net_borrows(loan_amount.to_i64_ceil().unwrap_or(i64::MAX), now);

        Ok(WithdrawResult { loan_amount, loan_fee })
    }

    // 6.4: windows are aligned to multiples of their size and reset, not decay
    pub fn update_net_borrows(&mut self, change_native: i64, now: Timestamp) {
        let now = now.as_secs();
        let size = self.net_borrow_limit_window_size_ts;
        if size > 0 && now.saturating_sub(self.last_net_borrows_window_start_ts) >= size {
            self.last_net_borrows_window_start_ts = now - now % size;
            self.net_borrows_in_window = 0;
        }
        self.net_borrows_in_window = self.net_borrows_in_window.saturating_add(change_native);
    }

    pub fn check_net_borrows(&self, price: FixedPoint) -> Result<(), BankError> {
        if self.net_borrow_limit_per_window_quote < 0 || self.net_borrows_in_window <= 0 {
            return Ok(());
        }
        let net_borrows_quote = FixedPoint::from_num(self.net_borrows_in_window).try_mul(price)?;
        if net_borrows_quote > FixedPoint::from_num(self.net_borrow_limit_per_window_quote) {
            return Err(BankError::BorrowLimitExceeded {
                token: self.token_index,
                net_borrows_quote,
                limit: self.net_borrow_limit_per_window_quote,
            });
        }
        Ok(())
    }

    // 6.5: past the threshold the init asset weight shrinks and the init liab weight grows
    pub fn scaled_init_asset_weight(&self, price: FixedPoint) -> Result<FixedPoint, MathError> {
        let deposits_quote = self.native_deposits()?.try_mul(price)?;
        if deposits_quote <= self.deposit_weight_scale_start_quote {
            return Ok(self.init_asset_weight);
        }
        self.init_asset_weight
            .try_mul(self.deposit_weight_scale_start_quote)?
            .try_div(deposits_quote)
    }

    pub fn scaled_init_liab_weight(&self, price: FixedPoint) -> Result<FixedPoint, MathError> {
        let borrows_quote = self.native_borrows()?.try_mul(price)?;
        if borrows_quote <= self.borrow_weight_scale_start_quote {
            return Ok(self.init_liab_weight);
        }
        self.init_liab_weight
            .try_mul(borrows_quote)?
            .try_div(self.borrow_weight_scale_start_quote)
    }

    pub fn set_oracle_price(&mut self, oracle: OraclePrice, now: Timestamp) -> Result<(), MathError> {
        self.oracle = Some(oracle);
        self.stable_price_model.update(oracle.price, now)
    }

    /// Oracle price usable for risk-increasing actions.
    pub fn oracle_price(&self, now_slot: Slot) -> Result<FixedPoint, BankError> {
        let oracle = self
            .oracle
            .ok_or(BankError::MissingOraclePrice(self.token_index))?;
        Ok(oracle.check_confidence_and_staleness(&self.oracle_config, now_slot)?)
    }

    pub fn stable_price(&self) -> FixedPoint {
        self.stable_price_model.stable_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    fn assert_close(actual: FixedPoint, expected: &str, tolerance: &str) {
        let diff = (actual - fp(expected)).try_abs().unwrap();
        assert!(diff <= fp(tolerance), "{} vs {} (diff {})", actual, expected, diff);
    }

    fn bank(config: TokenConfig) -> Bank {
        Bank::from_config(&config, Timestamp(0)).unwrap()
    }

    #[test]
    fn curve_interpolates_above_util1() {
        let curve = InterestCurve::from_config(&InterestCurveConfig::default()).unwrap();
        // 0.2 + (0.9 - 0.85) / (1 - 0.85) * (2.0 - 0.2)
        let rate = curve.rate_at_utilization(fp("0.9")).unwrap();
        assert_close(rate, "0.8", "0.000000000001");
        assert!(rate > fp("0.2") && rate < fp("2"));
    }

    #[test]
    fn curve_segments() {
        let curve = InterestCurve::from_config(&InterestCurveConfig::default()).unwrap();
        assert_close(curve.rate_at_utilization(fp("0.35")).unwrap(), "0.05", "0.000000000001");
        assert_close(curve.rate_at_utilization(fp("0.775")).unwrap(), "0.15", "0.000000000001");
        assert_eq!(curve.rate_at_utilization(FixedPoint::ZERO).unwrap(), FixedPoint::ZERO);
    }

    #[test]
    fn borrow_rate_edges() {
        let curve = InterestCurve::from_config(&InterestCurveConfig::default()).unwrap();
        assert_eq!(
            curve.borrow_rate(FixedPoint::ZERO, FixedPoint::ZERO).unwrap(),
            (FixedPoint::ZERO, FixedPoint::ZERO)
        );
        let (util, rate) = curve.borrow_rate(fp("100"), fp("100")).unwrap();
        assert_eq!(util, FixedPoint::ONE);
        assert_eq!(rate, curve.max_rate);
        let (_, rate) = curve.borrow_rate(FixedPoint::ZERO, fp("1")).unwrap();
        assert_eq!(rate, curve.max_rate);
    }

    #[test]
    fn deposit_then_withdraw_into_borrow() {
        let mut b = bank(TokenConfig::usdc());
        let mut pos = TokenPosition::new(b.token_index);

        b.deposit(&mut pos, fp("100"), Timestamp(0)).unwrap();
        assert_eq!(pos.native(&b).unwrap(), fp("100"));

        let result = b.withdraw_with_fee(&mut pos, fp("150"), Timestamp(0)).unwrap();
        // 50 borrowed plus 0.05% origination fee
        assert_close(result.loan_fee, "0.025", "0.000000001");
        assert_close(pos.native(&b).unwrap(), "-50.025", "0.000000001");
        assert_eq!(b.indexed_deposits, FixedPoint::ZERO);
        assert_eq!(b.collected_fees_native, result.loan_fee);

        b.deposit(&mut pos, fp("60"), Timestamp(0)).unwrap();
        assert_eq!(b.indexed_borrows, FixedPoint::ZERO);
        assert_close(pos.native(&b).unwrap(), "9.975", "0.000000001");
    }

    #[test]
    fn small_remainder_goes_to_dust() {
        let mut b = bank(TokenConfig::usdc());
        let mut pos = TokenPosition::new(b.token_index);
        b.deposit(&mut pos, fp("10.5"), Timestamp(0)).unwrap();
        b.withdraw_without_fee(&mut pos, fp("10"), Timestamp(0)).unwrap();
        assert_eq!(pos.indexed_position, FixedPoint::ZERO);
        assert_eq!(b.dust, fp("0.5"));
    }

    #[test]
    fn negative_amount_rejected() {
        let mut b = bank(TokenConfig::usdc());
        let mut pos = TokenPosition::new(b.token_index);
        assert!(matches!(
            b.deposit(&mut pos, fp("-1"), Timestamp(0)),
            Err(BankError::InvalidAmount(_))
        ));
    }

    #[test]
    fn indices_accrue_with_utilization() {
        let mut b = bank(TokenConfig::usdc());
        let mut lender = TokenPosition::new(b.token_index);
        let mut borrower = TokenPosition::new(b.token_index);
        b.deposit(&mut lender, fp("1000"), Timestamp(0)).unwrap();
        b.withdraw_without_fee(&mut borrower, fp("900"), Timestamp(0)).unwrap();

        let update = b.update_index_and_rate(Timestamp(SECONDS_PER_YEAR)).unwrap();
        assert_close(update.utilization, "0.9", "0.000000001");
        assert_close(update.borrow_rate, "0.8", "0.000000001");
        assert_close(b.borrow_index, "1.8", "0.000000001");
        assert_close(b.deposit_index, "1.72", "0.000000001");
        // borrowers owe what lenders earn
        assert_close(
            b.native_deposits().unwrap() - fp("1000"),
            "720",
            "0.000001",
        );
        assert_close(b.native_borrows().unwrap() - fp("900"), "720", "0.000001");
    }

    #[test]
    fn indices_unchanged_without_borrows() {
        let mut b = bank(TokenConfig::usdc());
        let mut pos = TokenPosition::new(b.token_index);
        b.deposit(&mut pos, fp("1000"), Timestamp(0)).unwrap();
        b.update_index_and_rate(Timestamp(3600)).unwrap();
        assert_eq!(b.deposit_index, FixedPoint::ONE);
        assert_eq!(b.borrow_index, FixedPoint::ONE);
        assert_eq!(b.index_last_updated, Timestamp(3600));
    }

    #[test]
    fn net_borrow_window_limits_and_resets() {
        let mut config = TokenConfig::usdc();
        config.net_borrow_limit_per_window_quote = 1000;
        config.loan_origination_fee_rate = dec!(0);
        let mut b = bank(config);
        let mut pos = TokenPosition::new(b.token_index);

        b.withdraw_with_fee(&mut pos, fp("600"), Timestamp(10)).unwrap();
        assert!(b.check_net_borrows(FixedPoint::ONE).is_ok());

        b.withdraw_with_fee(&mut pos, fp("500"), Timestamp(20)).unwrap();
        assert!(matches!(
            b.check_net_borrows(FixedPoint::ONE),
            Err(BankError::BorrowLimitExceeded { limit: 1000, .. })
        ));

        // repayment counts against the window
        b.deposit(&mut pos, fp("200"), Timestamp(30)).unwrap();
        assert!(b.check_net_borrows(FixedPoint::ONE).is_ok());

        b.update_net_borrows(0, Timestamp(86_400 + 5));
        assert_eq!(b.net_borrows_in_window, 0);
        assert_eq!(b.last_net_borrows_window_start_ts, 86_400);
    }

    #[test]
    fn init_weights_scale_past_threshold() {
        let mut config = TokenConfig::sol();
        config.deposit_weight_scale_start_quote = dec!(1000);
        config.borrow_weight_scale_start_quote = dec!(1000);
        let mut b = bank(config);
        let mut lender = TokenPosition::new(b.token_index);
        let mut borrower = TokenPosition::new(b.token_index);
        b.deposit(&mut lender, fp("200"), Timestamp(0)).unwrap();
        b.withdraw_without_fee(&mut borrower, fp("100"), Timestamp(0)).unwrap();

        // under the threshold at price 5
        assert_eq!(b.scaled_init_asset_weight(fp("5")).unwrap(), b.init_asset_weight);
        // 200 * 10 = 2000 quote of deposits: weight halves
        assert_close(b.scaled_init_asset_weight(fp("10")).unwrap(), "0.4", "0.000000001");
        // 100 * 20 = 2000 quote of borrows: weight doubles
        assert_close(b.scaled_init_liab_weight(fp("20")).unwrap(), "2.4", "0.000000001");
    }

    #[test]
    fn oracle_required_for_price() {
        let mut b = bank(TokenConfig::sol());
        assert!(matches!(b.oracle_price(Slot(0)), Err(BankError::MissingOraclePrice(_))));
        b.set_oracle_price(OraclePrice::exact(fp("20"), Slot(1)), Timestamp(0)).unwrap();
        assert_eq!(b.oracle_price(Slot(1)).unwrap(), fp("20"));
    }
}
