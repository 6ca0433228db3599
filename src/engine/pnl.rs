// 12.9: pnl settlement between a winner and a loser of the same perp market, and the
// candidate scan that pairs them up.

use super::core::Engine;
use super::results::{EngineError, SettlePnlResult};
use crate::events::{EventPayload, PnlSettledEvent};
use crate::fixed::FixedPoint;
use crate::health::HealthType;
use crate::settlement::{
    compute_settle_fee, settle_candidates as rank_candidates, settlement_amount, SettleCandidate,
    SettleCandidateInput, SettleDirection,
};
use crate::types::{AccountId, MarketId};

impl Engine {
    /// Move realized perp pnl from loser `b` to winner `a` through the settle token bank.
    /// `settler` receives the settle fee, which comes out of a's share.
    pub fn settle_pnl(
        &mut self,
        settler_id: AccountId,
        a_id: AccountId,
        b_id: AccountId,
        market_index: MarketId,
    ) -> Result<SettlePnlResult, EngineError> {
        if a_id == b_id {
            return Err(EngineError::CannotSettleWithSelf);
        }
        let state = self.perp_state(market_index)?;
        let oracle_price = self.perp_oracle_price(&state.market)?;
        let market = state.market.clone();
        let settle_token = market.settle_token_index;
        let mut bank = self.bank(settle_token)?.clone();
        let mut a = self.account(a_id)?.clone();
        let mut b = self.account(b_id)?.clone();
        let mut settler = if settler_id == a_id || settler_id == b_id {
            None
        } else {
            Some(self.account(settler_id)?.clone())
        };
        let now = self.current_time;

        a.perp_position_mut(market_index)?.settle_funding(&market)?;
        b.perp_position_mut(market_index)?.settle_funding(&market)?;
        let a_pnl = a.perp_position(market_index)?.unsettled_pnl(&market, oracle_price)?;
        let b_pnl = b.perp_position(market_index)?.unsettled_pnl(&market, oracle_price)?;
        if !a_pnl.is_positive() || !b_pnl.is_negative() {
            return Err(EngineError::ProfitabilityMismatch { a_pnl, b_pnl });
        }

        let a_position = a.perp_position_mut(market_index)?;
        a_position.update_settle_limit(&market, now.as_secs())?;
        let a_settleable = a_position.apply_pnl_settle_limit(&market, a_pnl);
        let b_position = b.perp_position_mut(market_index)?;
        b_position.update_settle_limit(&market, now.as_secs())?;
        let b_settleable = b_position.apply_pnl_settle_limit(&market, b_pnl);
        if !a_settleable.is_positive() || !b_settleable.is_negative() {
            return Err(EngineError::ProfitabilityMismatch {
                a_pnl: a_settleable,
                b_pnl: b_settleable,
            });
        }

        let b_cache = self.health_cache_with(&b, &[], &[&market])?;
        if b_cache.perp_settle_health()?.is_negative() {
            return Err(EngineError::SettleHealthNegative(b_id));
        }
        let b_max_settle = b_cache.perp_max_settle(settle_token)?;

        let a_cache = self.health_cache_with(&a, &[], &[&market])?;
        let settlement = settlement_amount(a_settleable, b_settleable, b_max_settle)?;
        let fee = compute_settle_fee(
            &market,
            settlement,
            a_cache.health(HealthType::LiquidationEnd)?,
            a_cache.health(HealthType::Maint)?,
        )?;

        a.perp_position_mut(market_index)?.record_settle(settlement)?;
        b.perp_position_mut(market_index)?.record_settle(settlement.try_neg()?)?;

        bank.deposit(a.ensure_token_position(settle_token)?, settlement.try_sub(fee)?, now)?;
        bank.withdraw_without_fee(b.ensure_token_position(settle_token)?, settlement, now)?;
        if fee.is_positive() {
            let receiver = match settler.as_mut() {
                Some(settler) => settler,
                None if settler_id == a_id => &mut a,
                None => &mut b,
            };
            bank.deposit(receiver.ensure_token_position(settle_token)?, fee, now)?;
        }

        tracing::info!(
            market = %market_index,
            winner = ?a_id,
            loser = ?b_id,
            settlement = %settlement,
            fee = %fee,
            "pnl settled"
        );
        self.banks.insert(settle_token, bank);
        self.accounts.insert(a_id, a);
        self.accounts.insert(b_id, b);
        if let Some(settler) = settler {
            self.accounts.insert(settler_id, settler);
        }
        self.emit_event(EventPayload::PnlSettled(PnlSettledEvent {
            market_index,
            account_a: a_id,
            account_b: b_id,
            settler: settler_id,
            settlement,
            fee,
        }));
        Ok(SettlePnlResult { settlement, fee })
    }

    /// Up to `count` accounts worth settling in `direction`, best first. Read-only: funding and
    /// settle limit windows are brought up to date on copies.
    pub fn settle_candidates(
        &self,
        market_index: MarketId,
        direction: SettleDirection,
        count: usize,
    ) -> Result<Vec<SettleCandidate>, EngineError> {
        let market = &self.perp_state(market_index)?.market;
        let oracle_price = self.perp_oracle_price(market)?;
        let now = self.current_time.as_secs();

        let mut inputs = Vec::new();
        for (id, account) in &self.accounts {
            let Ok(position) = account.perp_position(market_index) else {
                continue;
            };
            let mut position = position.clone();
            position.settle_funding(market)?;
            position.update_settle_limit(market, now)?;
            let pnl = position.unsettled_pnl(market, oracle_price)?;
            let max_settle = if pnl.is_negative() {
                self.health_cache_with(account, &[], &[])?
                    .perp_max_settle(market.settle_token_index)?
            } else {
                FixedPoint::ZERO
            };
            inputs.push(SettleCandidateInput {
                account: *id,
                pnl,
                settle_limit: position.available_settle_limit(market),
                max_settle,
            });
        }
        Ok(rank_candidates(&inputs, direction, count))
    }
}
