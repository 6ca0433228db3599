// 12.10: token liquidation. the liquidator takes over part of a borrow and is paid in one of
// the liquidatee's deposits at oracle prices plus both tokens' liquidation fees. the transfer
// stops once liquidation-end health is back at zero.

use super::core::{check_health_post, Engine};
use super::results::{EngineError, LiquidationResult};
use crate::events::{EventPayload, TokenLiquidationEvent};
use crate::fixed::FixedPoint;
use crate::health::HealthType;
use crate::types::{AccountId, TokenIndex};

impl Engine {
    /// Liquidator `liqor_id` repays up to `max_liab_transfer` of the liquidatee's `liab_token`
    /// borrow and receives `asset_token` deposits in return.
    pub fn liquidate_token_with_token(
        &mut self,
        liqor_id: AccountId,
        liqee_id: AccountId,
        asset_token: TokenIndex,
        liab_token: TokenIndex,
        max_liab_transfer: FixedPoint,
    ) -> Result<LiquidationResult, EngineError> {
        if liqor_id == liqee_id {
            return Err(EngineError::CannotLiquidateSelf);
        }
        if asset_token == liab_token {
            return Err(EngineError::InvalidLiquidation("asset and liab token must differ"));
        }
        if !max_liab_transfer.is_positive() {
            return Err(EngineError::InvalidAmount(max_liab_transfer));
        }
        let mut asset_bank = self.bank(asset_token)?.clone();
        let mut liab_bank = self.bank(liab_token)?.clone();
        let mut liqor = self.account(liqor_id)?.clone();
        let mut liqee = self.account(liqee_id)?.clone();
        let now = self.current_time;

        let liqee_cache = self.health_cache_with(&liqee, &[], &[])?;
        let liq_end_health = liqee_cache.health(HealthType::LiquidationEnd)?;
        if !liqee.being_liquidated {
            if !liqee_cache.health(HealthType::Maint)?.is_negative() {
                return Err(EngineError::NotLiquidatable(liqee_id));
            }
            liqee.being_liquidated = true;
        } else if !liq_end_health.is_negative() {
            liqee.being_liquidated = false;
            self.accounts.insert(liqee_id, liqee);
            tracing::info!(account = ?liqee_id, "liquidation ended");
            self.emit_event(EventPayload::LiquidationStatusChanged {
                account: liqee_id,
                being_liquidated: false,
            });
            return Ok(LiquidationResult {
                asset_transfer: FixedPoint::ZERO,
                liab_transfer: FixedPoint::ZERO,
                liqee_health_after: liq_end_health,
                being_liquidated: false,
            });
        }

        let asset_native = liqee.token_position(asset_token)?.native(&asset_bank)?;
        let liab_native = liqee.token_position(liab_token)?.native(&liab_bank)?;
        if !asset_native.is_positive() {
            return Err(EngineError::InvalidLiquidation("asset position is not a deposit"));
        }
        if !liab_native.is_negative() {
            return Err(EngineError::InvalidLiquidation("liab position is not a borrow"));
        }

        let asset_info = liqee_cache.token_info(asset_token)?;
        let liab_info = liqee_cache.token_info(liab_token)?;
        let asset_price = asset_info.prices.oracle;
        let liab_price = liab_info.prices.oracle;

        // asset tokens paid per liab token taken over
        let fee_factor = FixedPoint::ONE
            .try_add(asset_bank.liquidation_fee)?
            .try_mul(FixedPoint::ONE.try_add(liab_bank.liquidation_fee)?)?;
        let liab_to_asset = liab_price.try_mul(fee_factor)?.try_div(asset_price)?;

        // liquidation-end health gained per liab token
        let health_per_liab = liab_price.try_mul(
            liab_info
                .liab_weight(HealthType::LiquidationEnd)
                .try_sub(asset_info.asset_weight(HealthType::LiquidationEnd).try_mul(fee_factor)?)?,
        )?;
        if !health_per_liab.is_positive() {
            return Err(EngineError::InvalidLiquidation("transfer would not improve health"));
        }

        let liab_for_zero_health = liq_end_health
            .try_neg()?
            .max(FixedPoint::ZERO)
            .try_div(health_per_liab)?;
        let liab_transfer = liab_for_zero_health
            .min(max_liab_transfer)
            .min(liab_native.try_neg()?)
            .min(asset_native.try_div(liab_to_asset)?);
        let asset_transfer = liab_transfer.try_mul(liab_to_asset)?.min(asset_native);

        liab_bank.deposit(liqee.token_position_mut(liab_token)?, liab_transfer, now)?;
        asset_bank.withdraw_without_fee(liqee.token_position_mut(asset_token)?, asset_transfer, now)?;

        let liqor_pre_health = self.pre_init_health(&liqor)?;
        liab_bank.withdraw_without_fee(liqor.ensure_token_position(liab_token)?, liab_transfer, now)?;
        asset_bank.deposit(liqor.ensure_token_position(asset_token)?, asset_transfer, now)?;
        liqee.deactivate_token_position(asset_token);
        liqee.deactivate_token_position(liab_token);

        let liqor_cache = self.health_cache_with(&liqor, &[&asset_bank, &liab_bank], &[])?;
        check_health_post(liqor_id, &liqor_cache, liqor_pre_health)?;

        let liqee_after = self
            .health_cache_with(&liqee, &[&asset_bank, &liab_bank], &[])?
            .health(HealthType::LiquidationEnd)?;
        let was_liquidated = self.account(liqee_id)?.being_liquidated;
        liqee.being_liquidated = liqee_after.is_negative();

        tracing::info!(
            liqor = ?liqor_id,
            liqee = ?liqee_id,
            asset = %asset_token,
            liab = %liab_token,
            asset_transfer = %asset_transfer,
            liab_transfer = %liab_transfer,
            health_after = %liqee_after,
            "token liquidation"
        );
        let being_liquidated = liqee.being_liquidated;
        self.banks.insert(asset_token, asset_bank);
        self.banks.insert(liab_token, liab_bank);
        self.accounts.insert(liqor_id, liqor);
        self.accounts.insert(liqee_id, liqee);
        self.emit_event(EventPayload::TokenLiquidation(TokenLiquidationEvent {
            liquidator: liqor_id,
            liquidatee: liqee_id,
            asset_token_index: asset_token,
            liab_token_index: liab_token,
            asset_transfer,
            liab_transfer,
            health_type: HealthType::LiquidationEnd,
            health_after: liqee_after,
        }));
        if was_liquidated != being_liquidated {
            self.emit_event(EventPayload::LiquidationStatusChanged {
                account: liqee_id,
                being_liquidated,
            });
        }

        Ok(LiquidationResult {
            asset_transfer,
            liab_transfer,
            liqee_health_after: liqee_after,
            being_liquidated,
        })
    }
}
