// 8.1: lookups for the health cache. oracle prices are validated here, so a stale or unconfident
// price fails the whole computation instead of being read as zero.

use super::HealthError;
use crate::bank::Bank;
use crate::fixed::FixedPoint;
use crate::market::PerpMarket;
use crate::types::{MarketId, Slot, TokenIndex};

pub trait AccountRetriever {
    /// Bank and validated oracle price for a token.
    fn bank_and_oracle(&self, token_index: TokenIndex) -> Result<(&Bank, FixedPoint), HealthError>;

    fn perp_market_and_oracle(&self, market_index: MarketId) -> Result<(&PerpMarket, FixedPoint), HealthError>;
}

/// Linear scan over borrowed banks and markets. Accounts touch a handful of each.
#[derive(Debug, Clone)]
pub struct ScanningRetriever<'a> {
    pub banks: Vec<&'a Bank>,
    pub perp_markets: Vec<&'a PerpMarket>,
    pub now_slot: Slot,
}

impl<'a> ScanningRetriever<'a> {
    pub fn new(banks: Vec<&'a Bank>, perp_markets: Vec<&'a PerpMarket>, now_slot: Slot) -> Self {
        Self {
            banks,
            perp_markets,
            now_slot,
        }
    }

    /// Use `bank` in place of the stored bank for the same token.
    pub fn with_bank(mut self, bank: &'a Bank) -> Self {
        self.banks.retain(|b| b.token_index != bank.token_index);
        self.banks.push(bank);
        self
    }

    pub fn with_perp_market(mut self, market: &'a PerpMarket) -> Self {
        self.perp_markets.retain(|m| m.market_index != market.market_index);
        self.perp_markets.push(market);
        self
    }
}

impl AccountRetriever for ScanningRetriever<'_> {
    fn bank_and_oracle(&self, token_index: TokenIndex) -> Result<(&Bank, FixedPoint), HealthError> {
        let bank = self
            .banks
            .iter()
            .find(|b| b.token_index == token_index)
            .ok_or(HealthError::MissingBank(token_index))?;
        let price = bank.oracle_price(self.now_slot)?;
        Ok((bank, price))
    }

    fn perp_market_and_oracle(&self, market_index: MarketId) -> Result<(&PerpMarket, FixedPoint), HealthError> {
        let market = self
            .perp_markets
            .iter()
            .find(|m| m.market_index == market_index)
            .ok_or(HealthError::MissingPerpMarket(market_index))?;
        let oracle = market
            .oracle
            .ok_or(HealthError::MissingPerpOraclePrice(market_index))?;
        let price = oracle.check_confidence_and_staleness(&market.oracle_config, self.now_slot)?;
        Ok((market, price))
    }
}
