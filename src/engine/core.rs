// 12.0 engine/core.rs: main engine. holds banks, markets and accounts; instructions in the
// sibling files are `impl Engine` blocks that validate on copies and commit at the end.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::account::MarginAccount;
use crate::bank::Bank;
use crate::config::{PerpMarketConfig, SpotMarketConfig, TokenConfig};
use crate::events::{Event, EventId, EventPayload, OraclePriceSetEvent, OracleTarget};
use crate::fixed::FixedPoint;
use crate::health::{new_health_cache, HealthCache, HealthType, ScanningRetriever};
use crate::market::{PerpMarket, PerpMarketState, SpotMarket};
use crate::oracle::{OracleError, OraclePrice};
use crate::types::{AccountId, MarketId, Slot, SpotMarketId, Timestamp, TokenIndex};
use std::collections::HashMap;

/** 12.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) banks: HashMap<TokenIndex, Bank>,
    pub(super) perp_markets: HashMap<MarketId, PerpMarketState>,
    pub(super) spot_markets: HashMap<SpotMarketId, SpotMarket>,
    pub(super) accounts: HashMap<AccountId, MarginAccount>,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) next_account_id: u64,
    pub(super) current_time: Timestamp,
    pub(super) current_slot: Slot,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            banks: HashMap::new(),
            perp_markets: HashMap::new(),
            spot_markets: HashMap::new(),
            accounts: HashMap::new(),
            events: Vec::new(),
            next_event_id: 1,
            next_account_id: 1,
            current_time: Timestamp::from_secs(0),
            current_slot: Slot(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: u64) {
        self.current_time = Timestamp::from_secs(self.current_time.as_secs() + secs);
    }

    pub fn set_slot(&mut self, slot: Slot) {
        self.current_slot = slot;
    }

    pub fn slot(&self) -> Slot {
        self.current_slot
    }

    pub fn advance_slots(&mut self, slots: u64) {
        self.current_slot = Slot(self.current_slot.0 + slots);
    }

    // 12.2: setup instructions

    pub fn register_token(&mut self, config: &TokenConfig) -> Result<TokenIndex, EngineError> {
        let bank = Bank::from_config(config, self.current_time)?;
        let token_index = bank.token_index;
        if self.banks.contains_key(&token_index) {
            return Err(EngineError::AlreadyExists(format!("token {}", token_index)));
        }
        tracing::info!(token = %token_index, name = %bank.name, "token registered");
        let name = bank.name.clone();
        self.banks.insert(token_index, bank);
        self.emit_event(EventPayload::TokenRegistered { token_index, name });
        Ok(token_index)
    }

    pub fn create_perp_market(&mut self, config: &PerpMarketConfig) -> Result<MarketId, EngineError> {
        let state = PerpMarketState::new(config, self.current_time)?;
        let market_index = state.market.market_index;
        if self.perp_markets.contains_key(&market_index) {
            return Err(EngineError::AlreadyExists(format!("perp market {}", market_index)));
        }
        let settle_token = state.market.settle_token_index;
        if !self.banks.contains_key(&settle_token) {
            return Err(EngineError::TokenNotFound(settle_token));
        }
        let name = state.market.name.clone();
        tracing::info!(market = %market_index, name = %name, "perp market created");
        self.perp_markets.insert(market_index, state);
        self.emit_event(EventPayload::PerpMarketCreated { market_index, name });
        Ok(market_index)
    }

    pub fn create_spot_market(&mut self, config: &SpotMarketConfig) -> Result<SpotMarketId, EngineError> {
        let market = SpotMarket::from_config(config)?;
        let market_index = market.market_index;
        if self.spot_markets.contains_key(&market_index) {
            return Err(EngineError::AlreadyExists(format!("spot market {:?}", market_index)));
        }
        for token in [market.base_token_index, market.quote_token_index] {
            if !self.banks.contains_key(&token) {
                return Err(EngineError::TokenNotFound(token));
            }
        }
        let name = market.name.clone();
        tracing::info!(market = ?market_index, name = %name, "spot market created");
        self.spot_markets.insert(market_index, market);
        self.emit_event(EventPayload::SpotMarketCreated { market_index, name });
        Ok(market_index)
    }

    pub fn create_account(&mut self) -> AccountId {
        let id = AccountId(self.next_account_id);
        self.next_account_id += 1;
        let account = MarginAccount::new(id, self.config.account_slots, self.current_time);
        self.accounts.insert(id, account);
        tracing::debug!(account = ?id, "account created");
        self.emit_event(EventPayload::AccountCreated { account: id });
        id
    }

    /// New oracle observation stamped with the current slot. Also moves the stable price.
    pub fn set_oracle_price(
        &mut self,
        target: OracleTarget,
        price: FixedPoint,
        deviation: FixedPoint,
    ) -> Result<(), EngineError> {
        if !price.is_positive() {
            return Err(OracleError::NonPositivePrice(price).into());
        }
        let oracle = OraclePrice::new(price, deviation, self.current_slot);
        let now = self.current_time;
        let stable_price = match target {
            OracleTarget::Token(token_index) => {
                let bank = self
                    .banks
                    .get_mut(&token_index)
                    .ok_or(EngineError::TokenNotFound(token_index))?;
                let mut updated = bank.clone();
                updated.set_oracle_price(oracle, now)?;
                *bank = updated;
                bank.stable_price()
            }
            OracleTarget::PerpMarket(market_index) => {
                let state = self
                    .perp_markets
                    .get_mut(&market_index)
                    .ok_or(EngineError::MarketNotFound(market_index))?;
                let mut model = state.market.stable_price_model;
                model.update(price, now)?;
                state.market.stable_price_model = model;
                state.market.oracle = Some(oracle);
                model.stable_price
            }
        };
        tracing::debug!(oracle = ?target, price = %price, stable = %stable_price, "oracle price set");
        self.emit_event(EventPayload::OraclePriceSet(OraclePriceSetEvent {
            target,
            price,
            stable_price,
        }));
        Ok(())
    }

    // 12.3: lookups

    pub fn get_bank(&self, token_index: TokenIndex) -> Option<&Bank> {
        self.banks.get(&token_index)
    }

    pub fn get_perp_market(&self, market_index: MarketId) -> Option<&PerpMarketState> {
        self.perp_markets.get(&market_index)
    }

    pub fn get_spot_market(&self, market_index: SpotMarketId) -> Option<&SpotMarket> {
        self.spot_markets.get(&market_index)
    }

    pub fn get_account(&self, account_id: AccountId) -> Option<&MarginAccount> {
        self.accounts.get(&account_id)
    }

    pub fn accounts_iter(&self) -> impl Iterator<Item = (&AccountId, &MarginAccount)> {
        self.accounts.iter()
    }

    pub(super) fn bank(&self, token_index: TokenIndex) -> Result<&Bank, EngineError> {
        self.banks
            .get(&token_index)
            .ok_or(EngineError::TokenNotFound(token_index))
    }

    pub(super) fn perp_state(&self, market_index: MarketId) -> Result<&PerpMarketState, EngineError> {
        self.perp_markets
            .get(&market_index)
            .ok_or(EngineError::MarketNotFound(market_index))
    }

    pub(super) fn spot_market(&self, market_index: SpotMarketId) -> Result<&SpotMarket, EngineError> {
        self.spot_markets
            .get(&market_index)
            .ok_or(EngineError::SpotMarketNotFound(market_index))
    }

    pub(super) fn account(&self, account_id: AccountId) -> Result<&MarginAccount, EngineError> {
        self.accounts
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))
    }

    /// Validated oracle price of a perp market at the current slot.
    pub(super) fn perp_oracle_price(&self, market: &PerpMarket) -> Result<FixedPoint, EngineError> {
        let oracle = market
            .oracle
            .ok_or(EngineError::NoOraclePrice(market.market_index))?;
        Ok(oracle.check_confidence_and_staleness(&market.oracle_config, self.current_slot)?)
    }

    // 12.4: health. always rebuilt from current state, optionally with modified copies of
    // banks and markets standing in for the stored ones

    pub(super) fn retriever(&self) -> ScanningRetriever<'_> {
        ScanningRetriever::new(
            self.banks.values().collect(),
            self.perp_markets.values().map(|state| &state.market).collect(),
            self.current_slot,
        )
    }

    pub(super) fn health_cache_with(
        &self,
        account: &MarginAccount,
        banks: &[&Bank],
        markets: &[&PerpMarket],
    ) -> Result<HealthCache, EngineError> {
        let mut retriever = self.retriever();
        for bank in banks {
            retriever = retriever.with_bank(*bank);
        }
        for market in markets {
            retriever = retriever.with_perp_market(*market);
        }
        Ok(new_health_cache(account, &retriever)?)
    }

    pub fn health_cache(&self, account_id: AccountId) -> Result<HealthCache, EngineError> {
        let account = self.account(account_id)?;
        self.health_cache_with(account, &[], &[])
    }

    pub fn health(&self, account_id: AccountId, health_type: HealthType) -> Result<FixedPoint, EngineError> {
        Ok(self.health_cache(account_id)?.health(health_type)?)
    }

    /// Init health before an instruction, for `check_health_post`.
    pub(super) fn pre_init_health(&self, account: &MarginAccount) -> Result<FixedPoint, EngineError> {
        Ok(self
            .health_cache_with(account, &[], &[])?
            .health(HealthType::Init)?)
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        tracing::trace!(id = event.id.0, payload = ?event.payload, "event");

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}

/// New risk is allowed while init health stays non-negative, or if the instruction improved it.
pub(super) fn check_health_post(
    account: AccountId,
    cache: &HealthCache,
    pre_init_health: FixedPoint,
) -> Result<FixedPoint, EngineError> {
    let post = cache.health(HealthType::Init)?;
    if post.is_negative() && post <= pre_init_health {
        tracing::warn!(account = ?account, pre = %pre_init_health, post = %post, "rejected: init health");
        return Err(EngineError::InsufficientHealth {
            account,
            health_type: HealthType::Init,
            health: post,
        });
    }
    Ok(post)
}
