// 12.5: token instructions. deposits never need a health check; withdrawals may borrow and
// must pass it.

use super::core::{check_health_post, Engine};
use super::results::EngineError;
use crate::bank::{InterestUpdate, WithdrawResult};
use crate::events::{EventPayload, TokenBalanceEvent, WithdrawEvent};
use crate::fixed::FixedPoint;
use crate::health::HealthType;
use crate::types::{AccountId, TokenIndex};

impl Engine {
    /// Credit `amount` native tokens. Repays a borrow first.
    pub fn deposit(
        &mut self,
        account_id: AccountId,
        token_index: TokenIndex,
        amount: FixedPoint,
    ) -> Result<FixedPoint, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(amount));
        }
        let mut bank = self.bank(token_index)?.clone();
        let mut account = self.account(account_id)?.clone();
        let now = self.current_time;

        let position = account.ensure_token_position(token_index)?;
        bank.deposit(position, amount, now)?;
        let balance = position.native(&bank)?;

        // a deposit can be what ends a liquidation
        let mut status_change = None;
        if account.being_liquidated {
            let cache = self.health_cache_with(&account, &[&bank], &[])?;
            if !cache.health(HealthType::LiquidationEnd)?.is_negative() {
                account.being_liquidated = false;
                status_change = Some(false);
            }
        }

        tracing::debug!(account = ?account_id, token = %token_index, amount = %amount, "deposit");
        self.banks.insert(token_index, bank);
        self.accounts.insert(account_id, account);
        self.emit_event(EventPayload::Deposit(TokenBalanceEvent {
            account: account_id,
            token_index,
            amount,
            balance,
        }));
        if let Some(being_liquidated) = status_change {
            self.emit_event(EventPayload::LiquidationStatusChanged {
                account: account_id,
                being_liquidated,
            });
        }
        Ok(balance)
    }

    /// Pay out `amount` native tokens. Anything beyond the deposit is borrowed, with the loan
    /// origination fee, and only when `allow_borrow` is set.
    pub fn withdraw(
        &mut self,
        account_id: AccountId,
        token_index: TokenIndex,
        amount: FixedPoint,
        allow_borrow: bool,
    ) -> Result<WithdrawResult, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(amount));
        }
        let mut bank = self.bank(token_index)?.clone();
        let mut account = self.account(account_id)?.clone();
        let pre_health = self.pre_init_health(&account)?;
        let now = self.current_time;

        let position = account.ensure_token_position(token_index)?;
        let available = position.native(&bank)?.max(FixedPoint::ZERO);
        if amount > available && !allow_borrow {
            return Err(EngineError::BorrowNotAllowed {
                token: token_index,
                available,
                requested: amount,
            });
        }

        let result = bank.withdraw_with_fee(position, amount, now)?;
        let balance = position.native(&bank)?;
        if result.loan_amount.is_positive() {
            bank.check_net_borrows(bank.oracle_price(self.current_slot)?)?;
        }
        account.deactivate_token_position(token_index);

        let cache = self.health_cache_with(&account, &[&bank], &[])?;
        check_health_post(account_id, &cache, pre_health)?;

        tracing::debug!(
            account = ?account_id,
            token = %token_index,
            amount = %amount,
            loan = %result.loan_amount,
            "withdraw"
        );
        self.banks.insert(token_index, bank);
        self.accounts.insert(account_id, account);
        self.emit_event(EventPayload::Withdraw(WithdrawEvent {
            account: account_id,
            token_index,
            amount,
            balance,
            loan_amount: result.loan_amount,
            loan_fee: result.loan_fee,
        }));
        Ok(result)
    }

    /// Accrue interest on a bank up to the current time and refresh its rates.
    pub fn update_index_and_rate(&mut self, token_index: TokenIndex) -> Result<InterestUpdate, EngineError> {
        let now = self.current_time;
        let bank = self
            .banks
            .get_mut(&token_index)
            .ok_or(EngineError::TokenNotFound(token_index))?;
        let mut updated = bank.clone();
        let update = updated.update_index_and_rate(now)?;
        *bank = updated;

        tracing::debug!(
            token = %token_index,
            utilization = %update.utilization,
            borrow_rate = %update.borrow_rate,
            "interest accrued"
        );
        self.emit_event(EventPayload::InterestAccrued(update.clone()));
        Ok(update)
    }

    /// Native balance of `token_index`, negative for borrows.
    pub fn token_balance(&self, account_id: AccountId, token_index: TokenIndex) -> Result<FixedPoint, EngineError> {
        let account = self.account(account_id)?;
        let bank = self.bank(token_index)?;
        match account.token_position(token_index) {
            Ok(position) => Ok(position.native(bank)?),
            Err(_) => Ok(FixedPoint::ZERO),
        }
    }
}
