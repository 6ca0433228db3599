// shared engine fixture: usdc, sol, a btc perp settled in usdc and a sol/usdc spot market, all priced

use super::config::EngineConfig;
use super::core::Engine;
use crate::config::{PerpMarketConfig, SpotMarketConfig, TokenConfig};
use crate::events::OracleTarget;
use crate::fixed::FixedPoint;
use crate::types::{MarketId, SpotMarketId, Timestamp, TokenIndex};

pub struct Ids {
    pub usdc: TokenIndex,
    pub sol: TokenIndex,
    pub perp: MarketId,
    pub spot: SpotMarketId,
}

pub fn fp(s: &str) -> FixedPoint {
    s.parse().unwrap()
}

pub fn assert_close(actual: FixedPoint, expected: &str, tolerance: &str) {
    let diff = (actual - fp(expected)).try_abs().unwrap();
    assert!(diff <= fp(tolerance), "{} not within {} of {}", actual, tolerance, expected);
}

/// usdc at 1, sol at 20, btc perp at 10 per native base (100 price lots).
pub fn setup() -> (Engine, Ids) {
    let mut engine = Engine::new(EngineConfig::default());
    engine.set_time(Timestamp::from_secs(1_000_000));

    let usdc = engine.register_token(&TokenConfig::usdc()).unwrap();
    let sol = engine.register_token(&TokenConfig::sol()).unwrap();
    let perp = engine.create_perp_market(&PerpMarketConfig::btc_perp()).unwrap();
    let spot = engine.create_spot_market(&SpotMarketConfig::sol_usdc()).unwrap();

    let zero = FixedPoint::ZERO;
    engine.set_oracle_price(OracleTarget::Token(usdc), fp("1"), zero).unwrap();
    engine.set_oracle_price(OracleTarget::Token(sol), fp("20"), zero).unwrap();
    engine.set_oracle_price(OracleTarget::PerpMarket(perp), fp("10"), zero).unwrap();

    (engine, Ids { usdc, sol, perp, spot })
}

/// Moves the perp oracle and lets the stable price catch up fully.
pub fn move_perp_price(engine: &mut Engine, market: MarketId, price: &str) {
    engine
        .set_oracle_price(OracleTarget::PerpMarket(market), fp(price), FixedPoint::ZERO)
        .unwrap();
    let state = engine.perp_markets.get_mut(&market).unwrap();
    state.market.stable_price_model.reset_to_price(fp(price), engine.current_time);
}

pub fn move_token_price(engine: &mut Engine, token: TokenIndex, price: &str) {
    engine
        .set_oracle_price(OracleTarget::Token(token), fp(price), FixedPoint::ZERO)
        .unwrap();
    let now = engine.current_time;
    let bank = engine.banks.get_mut(&token).unwrap();
    bank.stable_price_model.reset_to_price(fp(price), now);
}
