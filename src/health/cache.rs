// 8.2: the health cache. a snapshot of everything health needs from an account and its banks
// and markets, so different health types and hypothetical balance changes are cheap to evaluate.

use super::{spot_amount_taken_for_health_zero, AccountRetriever, HealthError, HealthType, Prices};
use crate::account::MarginAccount;
use crate::bank::Bank;
use crate::fixed::{FixedPoint, MathError};
use crate::market::PerpMarket;
use crate::position::{PerpPosition, SpotOpenOrders};
use crate::types::{MarketId, SpotMarketId, TokenIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token_index: TokenIndex,
    pub maint_asset_weight: FixedPoint,
    pub init_asset_weight: FixedPoint,
    pub init_scaled_asset_weight: FixedPoint,
    pub maint_liab_weight: FixedPoint,
    pub init_liab_weight: FixedPoint,
    pub init_scaled_liab_weight: FixedPoint,
    pub prices: Prices,
    /// Token balance plus free spot open-order funds, native
    pub balance_spot: FixedPoint,
}

impl TokenInfo {
    pub fn from_bank(bank: &Bank, oracle_price: FixedPoint, balance_native: FixedPoint) -> Result<Self, MathError> {
        let prices = Prices::new(oracle_price, bank.stable_price());
        Ok(Self {
            token_index: bank.token_index,
            maint_asset_weight: bank.maint_asset_weight,
            init_asset_weight: bank.init_asset_weight,
            init_scaled_asset_weight: bank.scaled_init_asset_weight(prices.asset(HealthType::Init))?,
            maint_liab_weight: bank.maint_liab_weight,
            init_liab_weight: bank.init_liab_weight,
            init_scaled_liab_weight: bank.scaled_init_liab_weight(prices.liab(HealthType::Init))?,
            prices,
            balance_spot: balance_native,
        })
    }

    pub fn asset_weight(&self, health_type: HealthType) -> FixedPoint {
        match health_type {
            HealthType::Init => self.init_scaled_asset_weight,
            HealthType::LiquidationEnd => self.init_asset_weight,
            HealthType::Maint => self.maint_asset_weight,
        }
    }

    pub fn liab_weight(&self, health_type: HealthType) -> FixedPoint {
        match health_type {
            HealthType::Init => self.init_scaled_liab_weight,
            HealthType::LiquidationEnd => self.init_liab_weight,
            HealthType::Maint => self.maint_liab_weight,
        }
    }

    pub fn asset_weighted_price(&self, health_type: HealthType) -> Result<FixedPoint, MathError> {
        self.asset_weight(health_type)
            .try_mul(self.prices.asset(health_type))
    }

    pub fn liab_weighted_price(&self, health_type: HealthType) -> Result<FixedPoint, MathError> {
        self.liab_weight(health_type).try_mul(self.prices.liab(health_type))
    }

    pub fn health_contribution(&self, health_type: HealthType, balance: FixedPoint) -> Result<FixedPoint, MathError> {
        if balance.is_negative() {
            balance.try_mul(self.liab_weighted_price(health_type)?)
        } else {
            balance.try_mul(self.asset_weighted_price(health_type)?)
        }
    }
}

/// Funds locked in resting spot orders, valued as if fully filled in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpotReserved {
    pub all_reserved_as_base: FixedPoint,
    pub all_reserved_as_quote: FixedPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotInfo {
    pub market_index: SpotMarketId,
    pub base_info_index: usize,
    pub quote_info_index: usize,
    pub reserved_base: FixedPoint,
    pub reserved_quote: FixedPoint,
    pub highest_placed_bid_inv: FixedPoint,
    pub lowest_placed_ask: FixedPoint,
}

impl SpotInfo {
    fn new(oo: &SpotOpenOrders, base_info_index: usize, quote_info_index: usize) -> Self {
        Self {
            market_index: oo.market_index,
            base_info_index,
            quote_info_index,
            reserved_base: FixedPoint::from_u64(oo.base_reserved),
            reserved_quote: FixedPoint::from_u64(oo.quote_reserved),
            highest_placed_bid_inv: oo.highest_placed_bid_inv,
            lowest_placed_ask: oo.lowest_placed_ask,
        }
    }

    // reserved quote converts to base at the better (for us, worse) of oracle and the highest
    // bid placed; reserved base to quote likewise against the lowest ask
    fn reserved(&self, health_type: HealthType, token_infos: &[TokenInfo]) -> Result<SpotReserved, MathError> {
        let base = &token_infos[self.base_info_index];
        let quote = &token_infos[self.quote_info_index];

        let quote_as_base_oracle = self
            .reserved_quote
            .try_mul(quote.prices.asset(health_type))?
            .try_div(base.prices.liab(health_type))?;
        let quote_as_base = if self.highest_placed_bid_inv.is_positive() {
            quote_as_base_oracle.min(self.reserved_quote.try_mul(self.highest_placed_bid_inv)?)
        } else {
            quote_as_base_oracle
        };

        let base_as_quote_oracle = self
            .reserved_base
            .try_mul(base.prices.asset(health_type))?
            .try_div(quote.prices.liab(health_type))?;
        let base_as_quote = if self.lowest_placed_ask.is_positive() {
            base_as_quote_oracle.min(self.reserved_base.try_mul(self.lowest_placed_ask)?)
        } else {
            base_as_quote_oracle
        };

        Ok(SpotReserved {
            all_reserved_as_base: self.reserved_base.try_add(quote_as_base)?,
            all_reserved_as_quote: self.reserved_quote.try_add(base_as_quote)?,
        })
    }

    // worst of "everything ends up as base" and "everything ends up as quote". the reserved
    // amount is assumed to land last on top of all other reservations for the same token,
    // so it is weighted at the smallest marginal health effect.
    fn health_contribution(
        &self,
        health_type: HealthType,
        token_infos: &[TokenInfo],
        token_balances: &[FixedPoint],
        token_max_reserved: &[FixedPoint],
        reserved: &SpotReserved,
    ) -> Result<FixedPoint, MathError> {
        if reserved.all_reserved_as_base.is_zero() || reserved.all_reserved_as_quote.is_zero() {
            return Ok(FixedPoint::ZERO);
        }
        let effect = |index: usize, market_reserved: FixedPoint| -> Result<FixedPoint, MathError> {
            let info = &token_infos[index];
            let max_balance = token_balances[index].try_add(token_max_reserved[index])?;
            let (asset_part, liab_part) = if max_balance >= market_reserved {
                (market_reserved, FixedPoint::ZERO)
            } else if max_balance.is_negative() {
                (FixedPoint::ZERO, market_reserved)
            } else {
                (max_balance, market_reserved.try_sub(max_balance)?)
            };
            asset_part
                .try_mul(info.asset_weighted_price(health_type)?)?
                .try_add(liab_part.try_mul(info.liab_weighted_price(health_type)?)?)
        };
        let health_base = effect(self.base_info_index, reserved.all_reserved_as_base)?;
        let health_quote = effect(self.quote_info_index, reserved.all_reserved_as_quote)?;
        Ok(health_base.min(health_quote))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpInfo {
    pub market_index: MarketId,
    pub settle_token_index: TokenIndex,
    pub maint_base_asset_weight: FixedPoint,
    pub init_base_asset_weight: FixedPoint,
    pub maint_base_liab_weight: FixedPoint,
    pub init_base_liab_weight: FixedPoint,
    pub maint_overall_asset_weight: FixedPoint,
    pub init_overall_asset_weight: FixedPoint,
    pub base_lot_size: i64,
    /// Includes unconsumed taker fills
    pub base_lots: i64,
    pub bids_base_lots: i64,
    pub asks_base_lots: i64,
    /// Quote position net of unsettled funding and unconsumed taker fills
    pub quote: FixedPoint,
    pub base_prices: Prices,
    /// Largest positive pnl settleable in the current window
    pub settle_limit: FixedPoint,
    pub has_open_orders: bool,
    pub has_open_fills: bool,
}

impl PerpInfo {
    pub fn new(position: &PerpPosition, market: &PerpMarket, oracle_price: FixedPoint) -> Result<Self, MathError> {
        let unsettled_funding = position.unsettled_funding(market)?;
        let taker_quote = market.quote_lots_to_native(position.taker_quote_lots)?;
        let quote = position
            .quote_position_native
            .try_sub(unsettled_funding)?
            .try_add(taker_quote)?;
        let (_, max_settle) = position.available_settle_limit(market);
        Ok(Self {
            market_index: market.market_index,
            settle_token_index: market.settle_token_index,
            maint_base_asset_weight: market.maint_base_asset_weight,
            init_base_asset_weight: market.init_base_asset_weight,
            maint_base_liab_weight: market.maint_base_liab_weight,
            init_base_liab_weight: market.init_base_liab_weight,
            maint_overall_asset_weight: market.maint_overall_asset_weight,
            init_overall_asset_weight: market.init_overall_asset_weight,
            base_lot_size: market.base_lot_size,
            base_lots: position.effective_base_position_lots(),
            bids_base_lots: position.bids_base_lots,
            asks_base_lots: position.asks_base_lots,
            quote,
            base_prices: Prices::new(oracle_price, market.stable_price()),
            settle_limit: FixedPoint::from_num(max_settle),
            has_open_orders: position.has_open_orders(),
            has_open_fills: position.has_open_taker_fills(),
        })
    }

    fn base_weight(&self, health_type: HealthType, is_liab: bool) -> FixedPoint {
        match (health_type, is_liab) {
            (HealthType::Init | HealthType::LiquidationEnd, true) => self.init_base_liab_weight,
            (HealthType::Init | HealthType::LiquidationEnd, false) => self.init_base_asset_weight,
            (HealthType::Maint, true) => self.maint_base_liab_weight,
            (HealthType::Maint, false) => self.maint_base_asset_weight,
        }
    }

    fn overall_asset_weight(&self, health_type: HealthType) -> FixedPoint {
        match health_type {
            HealthType::Init => self.init_overall_asset_weight,
            HealthType::Maint | HealthType::LiquidationEnd => self.maint_overall_asset_weight,
        }
    }

    // value of the position if all resting orders on one side executed at the oracle
    fn order_execution_case(
        &self,
        health_type: HealthType,
        orders_base_lots: i64,
        order_price: FixedPoint,
    ) -> Result<FixedPoint, MathError> {
        let net_base_native = FixedPoint::from_num(self.base_lots + orders_base_lots)
            .try_mul(FixedPoint::from_num(self.base_lot_size))?;
        let is_liab = net_base_native.is_negative();
        let base_price = if is_liab {
            self.base_prices.liab(health_type)
        } else {
            self.base_prices.asset(health_type)
        };
        let base_health = net_base_native
            .try_mul(self.base_weight(health_type, is_liab))?
            .try_mul(base_price)?;
        let orders_base_native = FixedPoint::from_num(orders_base_lots)
            .try_mul(FixedPoint::from_num(self.base_lot_size))?;
        let order_quote = orders_base_native.try_neg()?.try_mul(order_price)?;
        base_health.try_add(order_quote)
    }

    /// Quote plus the worse of "all bids fill" and "all asks fill".
    pub fn unweighted_health_unsettled_pnl(&self, health_type: HealthType) -> Result<FixedPoint, MathError> {
        let bids_case =
            self.order_execution_case(health_type, self.bids_base_lots, self.base_prices.liab(health_type))?;
        let asks_case =
            self.order_execution_case(health_type, -self.asks_base_lots, self.base_prices.asset(health_type))?;
        self.quote.try_add(bids_case.min(asks_case))
    }

    /// Positive pnl counts only up to the settle limit, then at the overall asset weight.
    pub fn health_contribution(&self, health_type: HealthType) -> Result<FixedPoint, MathError> {
        let unweighted = self.unweighted_health_unsettled_pnl(health_type)?;
        if !unweighted.is_positive() {
            return Ok(unweighted);
        }
        unweighted
            .min(self.settle_limit)
            .try_mul(self.overall_asset_weight(health_type))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCache {
    pub token_infos: Vec<TokenInfo>,
    pub spot_infos: Vec<SpotInfo>,
    pub perp_infos: Vec<PerpInfo>,
    pub being_liquidated: bool,
}

impl HealthCache {
    pub fn token_info_index(&self, token_index: TokenIndex) -> Result<usize, HealthError> {
        self.token_infos
            .iter()
            .position(|t| t.token_index == token_index)
            .ok_or(HealthError::TokenNotInCache(token_index))
    }

    pub fn token_info(&self, token_index: TokenIndex) -> Result<&TokenInfo, HealthError> {
        Ok(&self.token_infos[self.token_info_index(token_index)?])
    }

    pub fn perp_info(&self, market_index: MarketId) -> Option<&PerpInfo> {
        self.perp_infos.iter().find(|p| p.market_index == market_index)
    }

    /// Apply a hypothetical change to a token balance.
    pub fn adjust_token_balance(&mut self, token_index: TokenIndex, change: FixedPoint) -> Result<(), HealthError> {
        let index = self.token_info_index(token_index)?;
        let info = &mut self.token_infos[index];
        info.balance_spot = info.balance_spot.try_add(change)?;
        Ok(())
    }

    /// Token balances with each perp's weighted health folded into its settle token.
    pub fn effective_token_balances(&self, health_type: HealthType) -> Result<Vec<FixedPoint>, HealthError> {
        self.token_balances_with_perp(health_type, false)
    }

    fn token_balances_with_perp(
        &self,
        health_type: HealthType,
        ignore_negative_perp: bool,
    ) -> Result<Vec<FixedPoint>, HealthError> {
        let mut balances: Vec<FixedPoint> = self.token_infos.iter().map(|t| t.balance_spot).collect();
        for perp in &self.perp_infos {
            let contribution = perp.health_contribution(health_type)?;
            if ignore_negative_perp && !contribution.is_positive() {
                continue;
            }
            let index = self.token_info_index(perp.settle_token_index)?;
            balances[index] = balances[index].try_add(contribution)?;
        }
        Ok(balances)
    }

    fn spot_reservations(&self, health_type: HealthType) -> Result<(Vec<SpotReserved>, Vec<FixedPoint>), MathError> {
        let mut token_max_reserved = vec![FixedPoint::ZERO; self.token_infos.len()];
        let mut reservations = Vec::with_capacity(self.spot_infos.len());
        for info in &self.spot_infos {
            let reserved = info.reserved(health_type, &self.token_infos)?;
            token_max_reserved[info.base_info_index] =
                token_max_reserved[info.base_info_index].try_add(reserved.all_reserved_as_base)?;
            token_max_reserved[info.quote_info_index] =
                token_max_reserved[info.quote_info_index].try_add(reserved.all_reserved_as_quote)?;
            reservations.push(reserved);
        }
        Ok((reservations, token_max_reserved))
    }

    // every contribution, in token order then spot order
    fn health_sum(
        &self,
        health_type: HealthType,
        action: impl FnMut(FixedPoint) -> Result<(), MathError>,
    ) -> Result<(), HealthError> {
        let balances = self.effective_token_balances(health_type)?;
        self.health_sum_with(health_type, &balances, action)
    }

    fn health_sum_with(
        &self,
        health_type: HealthType,
        balances: &[FixedPoint],
        mut action: impl FnMut(FixedPoint) -> Result<(), MathError>,
    ) -> Result<(), HealthError> {
        for (info, balance) in self.token_infos.iter().zip(balances) {
            action(info.health_contribution(health_type, *balance)?)?;
        }
        let (reservations, token_max_reserved) = self.spot_reservations(health_type)?;
        for (info, reserved) in self.spot_infos.iter().zip(&reservations) {
            action(info.health_contribution(
                health_type,
                &self.token_infos,
                balances,
                &token_max_reserved,
                reserved,
            )?)?;
        }
        Ok(())
    }

    pub fn health(&self, health_type: HealthType) -> Result<FixedPoint, HealthError> {
        let mut health = FixedPoint::ZERO;
        self.health_sum(health_type, |contribution| {
            health = health.try_add(contribution)?;
            Ok(())
        })?;
        Ok(health)
    }

    /// (assets, liabs), both non-negative.
    pub fn health_assets_and_liabs(&self, health_type: HealthType) -> Result<(FixedPoint, FixedPoint), HealthError> {
        let mut assets = FixedPoint::ZERO;
        let mut liabs = FixedPoint::ZERO;
        self.health_sum(health_type, |contribution| {
            if contribution.is_negative() {
                liabs = liabs.try_sub(contribution)?;
            } else {
                assets = assets.try_add(contribution)?;
            }
            Ok(())
        })?;
        Ok((assets, liabs))
    }

    /// 100 * (assets - liabs) / liabs, MAX when there are no liabs.
    pub fn health_ratio(&self, health_type: HealthType) -> Result<FixedPoint, HealthError> {
        let (assets, liabs) = self.health_assets_and_liabs(health_type)?;
        if !liabs.is_positive() {
            return Ok(FixedPoint::MAX);
        }
        Ok(assets
            .try_sub(liabs)?
            .try_mul(FixedPoint::from_num(100))?
            .try_div(liabs)?)
    }

    /// Maint health with negative perp contributions left out.
    pub fn perp_settle_health(&self) -> Result<FixedPoint, HealthError> {
        let balances = self.token_balances_with_perp(HealthType::Maint, true)?;
        self.settle_health_with(&balances)
    }

    fn settle_health_with(&self, balances: &[FixedPoint]) -> Result<FixedPoint, HealthError> {
        let mut health = FixedPoint::ZERO;
        self.health_sum_with(HealthType::Maint, balances, |contribution| {
            health = health.try_add(contribution)?;
            Ok(())
        })?;
        Ok(health)
    }

    /// Most of `settle_token` this account can pay out in a pnl settlement.
    pub fn perp_max_settle(&self, settle_token_index: TokenIndex) -> Result<FixedPoint, HealthError> {
        let balances = self.token_balances_with_perp(HealthType::Maint, true)?;
        let health = self.settle_health_with(&balances)?;
        let index = self.token_info_index(settle_token_index)?;
        let info = &self.token_infos[index];
        spot_amount_taken_for_health_zero(
            health,
            balances[index],
            info.asset_weighted_price(HealthType::Maint)?,
            info.liab_weighted_price(HealthType::Maint)?,
        )
    }

    pub fn is_liquidatable(&self) -> Result<bool, HealthError> {
        let health_type = if self.being_liquidated {
            HealthType::LiquidationEnd
        } else {
            HealthType::Maint
        };
        Ok(self.health(health_type)?.is_negative())
    }

    pub fn has_perp_open_orders(&self) -> bool {
        self.perp_infos.iter().any(|p| p.has_open_orders)
    }
}

/// Snapshot the account. Every token the account touches, directly or as a perp settle token
/// or spot leg, gets a token info.
pub fn new_health_cache(account: &MarginAccount, retriever: &impl AccountRetriever) -> Result<HealthCache, HealthError> {
    let mut token_infos: Vec<TokenInfo> = Vec::new();
    let ensure_token = |token_index: TokenIndex,
                            balance: FixedPoint,
                            token_infos: &mut Vec<TokenInfo>|
     -> Result<usize, HealthError> {
        if let Some(index) = token_infos.iter().position(|t| t.token_index == token_index) {
            return Ok(index);
        }
        let (bank, price) = retriever.bank_and_oracle(token_index)?;
        token_infos.push(TokenInfo::from_bank(bank, price, balance)?);
        Ok(token_infos.len() - 1)
    };

    for position in &account.tokens {
        let (bank, _) = retriever.bank_and_oracle(position.token_index)?;
        let native = position.native(bank)?;
        ensure_token(position.token_index, native, &mut token_infos)?;
    }

    let mut spot_infos = Vec::with_capacity(account.spot_open_orders.len());
    for oo in &account.spot_open_orders {
        let base_index = ensure_token(oo.base_token_index, FixedPoint::ZERO, &mut token_infos)?;
        let quote_index = ensure_token(oo.quote_token_index, FixedPoint::ZERO, &mut token_infos)?;
        // free funds can be settled back at any time, so they count as plain balance
        token_infos[base_index].balance_spot = token_infos[base_index]
            .balance_spot
            .try_add(FixedPoint::from_u64(oo.base_free))?;
        token_infos[quote_index].balance_spot = token_infos[quote_index]
            .balance_spot
            .try_add(FixedPoint::from_u64(oo.quote_free))?;
        spot_infos.push(SpotInfo::new(oo, base_index, quote_index));
    }

    let mut perp_infos = Vec::with_capacity(account.perps.len());
    for position in &account.perps {
        let (market, price) = retriever.perp_market_and_oracle(position.market_index)?;
        ensure_token(market.settle_token_index, FixedPoint::ZERO, &mut token_infos)?;
        perp_infos.push(PerpInfo::new(position, market, price)?);
    }

    Ok(HealthCache {
        token_infos,
        spot_infos,
        perp_infos,
        being_liquidated: account.being_liquidated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountSlots;
    use crate::config::{PerpMarketConfig, SpotMarketConfig, TokenConfig};
    use crate::health::ScanningRetriever;
    use crate::market::SpotMarket;
    use crate::oracle::OraclePrice;
    use crate::types::{AccountId, Slot, Timestamp};

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    struct Fixture {
        usdc: Bank,
        sol: Bank,
        perp: PerpMarket,
    }

    impl Fixture {
        fn new() -> Self {
            let mut usdc = Bank::from_config(&TokenConfig::usdc(), Timestamp(0)).unwrap();
            usdc.set_oracle_price(OraclePrice::exact(FixedPoint::ONE, Slot(0)), Timestamp(0))
                .unwrap();
            let mut sol = Bank::from_config(&TokenConfig::sol(), Timestamp(0)).unwrap();
            sol.set_oracle_price(OraclePrice::exact(fp("20"), Slot(0)), Timestamp(0))
                .unwrap();
            let mut perp = PerpMarket::from_config(&PerpMarketConfig::btc_perp(), Timestamp(0)).unwrap();
            perp.oracle = Some(OraclePrice::exact(fp("20"), Slot(0)));
            perp.stable_price_model.reset_to_price(fp("20"), Timestamp(0));
            perp.settle_pnl_limit_factor = fp("-1");
            Self { usdc, sol, perp }
        }

        fn retriever(&self) -> ScanningRetriever<'_> {
            ScanningRetriever::new(vec![&self.usdc, &self.sol], vec![&self.perp], Slot(0))
        }

        fn deposit(&mut self, account: &mut MarginAccount, token: TokenIndex, amount: &str) {
            let bank = if token == self.usdc.token_index { &mut self.usdc } else { &mut self.sol };
            let position = account.ensure_token_position(token).unwrap();
            bank.deposit(position, fp(amount), Timestamp(0)).unwrap();
        }

        fn borrow(&mut self, account: &mut MarginAccount, token: TokenIndex, amount: &str) {
            let bank = if token == self.usdc.token_index { &mut self.usdc } else { &mut self.sol };
            let position = account.ensure_token_position(token).unwrap();
            bank.withdraw_without_fee(position, fp(amount), Timestamp(0)).unwrap();
        }
    }

    fn account() -> MarginAccount {
        MarginAccount::new(AccountId(1), AccountSlots::default(), Timestamp(0))
    }

    fn assert_close(actual: FixedPoint, expected: &str) {
        let diff = (actual - fp(expected)).try_abs().unwrap();
        assert!(diff < fp("0.000001"), "{} vs {}", actual, expected);
    }

    #[test]
    fn token_deposits_and_borrows() {
        let mut f = Fixture::new();
        let mut acc = account();
        f.deposit(&mut acc, TokenIndex(0), "100");
        f.borrow(&mut acc, TokenIndex(1), "2");

        let cache = new_health_cache(&acc, &f.retriever()).unwrap();
        // 100 - 2 * 20 * 1.1 and 100 - 2 * 20 * 1.2
        assert_close(cache.health(HealthType::Maint).unwrap(), "56");
        assert_close(cache.health(HealthType::Init).unwrap(), "52");
        assert!(!cache.is_liquidatable().unwrap());

        let (assets, liabs) = cache.health_assets_and_liabs(HealthType::Maint).unwrap();
        assert_close(assets, "100");
        assert_close(liabs, "44");
        // 100 * 56 / 44
        assert_close(cache.health_ratio(HealthType::Maint).unwrap(), "127.272727");
    }

    #[test]
    fn no_liabs_means_max_ratio() {
        let mut f = Fixture::new();
        let mut acc = account();
        f.deposit(&mut acc, TokenIndex(1), "1");
        let cache = new_health_cache(&acc, &f.retriever()).unwrap();
        assert_eq!(cache.health_ratio(HealthType::Init).unwrap(), FixedPoint::MAX);
    }

    #[test]
    fn adjust_token_balance_moves_health() {
        let mut f = Fixture::new();
        let mut acc = account();
        f.deposit(&mut acc, TokenIndex(0), "10");
        let mut cache = new_health_cache(&acc, &f.retriever()).unwrap();
        cache.adjust_token_balance(TokenIndex(1), fp("-1")).unwrap_err();
        cache.adjust_token_balance(TokenIndex(0), fp("-30")).unwrap();
        assert_close(cache.health(HealthType::Maint).unwrap(), "-20");
        assert!(cache.is_liquidatable().unwrap());
    }

    #[test]
    fn stale_oracle_fails_health() {
        let mut f = Fixture::new();
        let mut acc = account();
        f.deposit(&mut acc, TokenIndex(1), "1");
        f.sol.oracle_config.max_staleness_slots = 10;
        let retriever = ScanningRetriever::new(vec![&f.usdc, &f.sol], vec![&f.perp], Slot(11));
        assert!(matches!(
            new_health_cache(&acc, &retriever),
            Err(HealthError::Bank(_))
        ));
    }

    #[test]
    fn perp_long_uses_base_weights() {
        let mut f = Fixture::new();
        let mut acc = account();
        f.deposit(&mut acc, TokenIndex(0), "1000");
        let position = acc.ensure_perp_position(&f.perp).unwrap();
        // 10 lots = 1000 native base bought at 20
        position.record_trade(&mut f.perp, 10, fp("-20000")).unwrap();

        let cache = new_health_cache(&acc, &f.retriever()).unwrap();
        let perp = cache.perp_info(f.perp.market_index).unwrap();
        // -20000 + 1000 * 20 * 0.95
        assert_close(perp.unweighted_health_unsettled_pnl(HealthType::Maint).unwrap(), "-1000");
        assert_close(cache.health(HealthType::Maint).unwrap(), "0");
        // init: 0.9 weight
        assert_close(cache.health(HealthType::Init).unwrap(), "-1000");
    }

    #[test]
    fn resting_bids_count_as_filled() {
        let mut f = Fixture::new();
        let mut acc = account();
        f.deposit(&mut acc, TokenIndex(0), "1000");
        let position = acc.ensure_perp_position(&f.perp).unwrap();
        position.add_order(crate::types::Side::Bid, 10);

        let cache = new_health_cache(&acc, &f.retriever()).unwrap();
        // bids case: 1000 base at 0.95 * 20 minus 20000 paid = -1000
        assert_close(cache.health(HealthType::Maint).unwrap(), "0");
        assert!(cache.has_perp_open_orders());
    }

    #[test]
    fn positive_pnl_is_weighted_and_capped() {
        let mut f = Fixture::new();
        let mut acc = account();
        let position = acc.ensure_perp_position(&f.perp).unwrap();
        position.quote_position_native = fp("500");

        let cache = new_health_cache(&acc, &f.retriever()).unwrap();
        assert_close(cache.health(HealthType::Maint).unwrap(), "500");
        assert_close(cache.health(HealthType::Init).unwrap(), "475");

        // settle limit turned on with nothing granted: positive pnl no longer counts
        f.perp.settle_pnl_limit_factor = fp("0.2");
        let cache = new_health_cache(&acc, &f.retriever()).unwrap();
        assert_close(cache.health(HealthType::Maint).unwrap(), "0");
    }

    #[test]
    fn perp_settle_health_ignores_unsettled_losses() {
        let mut f = Fixture::new();
        let mut acc = account();
        f.deposit(&mut acc, TokenIndex(0), "100");
        let position = acc.ensure_perp_position(&f.perp).unwrap();
        position.quote_position_native = fp("-500");

        let cache = new_health_cache(&acc, &f.retriever()).unwrap();
        assert_close(cache.health(HealthType::Maint).unwrap(), "-400");
        assert_close(cache.perp_settle_health().unwrap(), "100");
        // the loser can still pay out its whole deposit
        assert_close(cache.perp_max_settle(TokenIndex(0)).unwrap(), "100");
    }

    #[test]
    fn perp_settle_health_counts_positive_pnl() {
        let mut f = Fixture::new();
        let mut acc = account();
        f.deposit(&mut acc, TokenIndex(0), "100");
        let position = acc.ensure_perp_position(&f.perp).unwrap();
        position.quote_position_native = fp("500");

        let cache = new_health_cache(&acc, &f.retriever()).unwrap();
        assert_close(cache.perp_settle_health().unwrap(), "600");
        // deposit plus pnl folded into the settle token balance
        assert_close(cache.perp_max_settle(TokenIndex(0)).unwrap(), "600");
    }

    #[test]
    fn spot_reservations_take_worst_case() {
        let mut f = Fixture::new();
        let mut acc = account();
        let market = SpotMarket::from_config(&SpotMarketConfig::sol_usdc()).unwrap();
        f.deposit(&mut acc, TokenIndex(0), "100");
        let oo = acc.ensure_spot_open_orders(&market).unwrap();
        // bid 100 usdc for sol at 25, above the oracle of 20
        oo.record_bid(fp("25"), 100).unwrap();
        f.usdc
            .withdraw_without_fee(acc.token_position_mut(TokenIndex(0)).unwrap(), fp("100"), Timestamp(0))
            .unwrap();

        let cache = new_health_cache(&acc, &f.retriever()).unwrap();
        // as quote: 100 usdc at weight 1; as base: 4 sol (100 / 25) at 0.9 * 20 = 72
        assert_close(cache.health(HealthType::Maint).unwrap(), "72");
    }
}
