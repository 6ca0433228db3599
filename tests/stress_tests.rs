//! Stress tests
//!
//! Larger deterministic scenarios: cascades of liquidations after a price drop, funding over
//! many periods, order expiry sweeps and repeated pnl settlement.

use margin_core::orderbook::Order;
use margin_core::*;

struct Ids {
    usdc: TokenIndex,
    sol: TokenIndex,
    perp: MarketId,
}

fn fp(s: &str) -> FixedPoint {
    s.parse().unwrap()
}

fn assert_close(actual: FixedPoint, expected: FixedPoint, tolerance: &str) {
    let diff = actual.try_sub(expected).unwrap().try_abs().unwrap();
    assert!(diff <= fp(tolerance), "{} not within {} of {}", actual, tolerance, expected);
}

fn setup() -> (Engine, Ids) {
    let mut engine = Engine::new(EngineConfig::default());
    engine.set_time(Timestamp::from_secs(1_000_000));
    let usdc = engine.register_token(&TokenConfig::usdc()).unwrap();
    let sol = engine.register_token(&TokenConfig::sol()).unwrap();
    let perp = engine.create_perp_market(&PerpMarketConfig::btc_perp()).unwrap();
    engine.set_oracle_price(OracleTarget::Token(usdc), fp("1"), FixedPoint::ZERO).unwrap();
    engine.set_oracle_price(OracleTarget::Token(sol), fp("20"), FixedPoint::ZERO).unwrap();
    engine.set_oracle_price(OracleTarget::PerpMarket(perp), fp("10"), FixedPoint::ZERO).unwrap();
    (engine, Ids { usdc, sol, perp })
}

fn funded(engine: &mut Engine, token: TokenIndex, amount: &str) -> AccountId {
    let id = engine.create_account();
    engine.deposit(id, token, fp(amount)).unwrap();
    id
}

fn total_balance(engine: &Engine, token: TokenIndex) -> FixedPoint {
    let accounts: Vec<AccountId> = engine.accounts_iter().map(|(id, _)| *id).collect();
    accounts
        .into_iter()
        .map(|id| engine.token_balance(id, token).unwrap())
        .fold(FixedPoint::ZERO, |sum, b| sum.try_add(b).unwrap())
}

mod cascade_tests {
    use super::*;

    #[test]
    fn liquidation_cascade_restores_every_account() {
        let (mut engine, ids) = setup();
        let _lender = funded(&mut engine, ids.usdc, "100000");
        let liqor = funded(&mut engine, ids.usdc, "100000");

        // 10 sol each; at 15 the maint cutoff is 135 and liquidation can fully recover below 142.8
        let borrows = ["100", "136", "138", "140", "142"];
        let borrowers: Vec<AccountId> = borrows
            .iter()
            .map(|amount| {
                let id = funded(&mut engine, ids.sol, "10");
                engine.withdraw(id, ids.usdc, fp(amount), true).unwrap();
                id
            })
            .collect();

        engine.set_oracle_price(OracleTarget::Token(ids.sol), fp("15"), FixedPoint::ZERO).unwrap();

        let mut liquidated = 0;
        for &liqee in &borrowers {
            let maint = engine.health(liqee, HealthType::Maint).unwrap();
            let result = engine.liquidate_token_with_token(liqor, liqee, ids.sol, ids.usdc, fp("1000000"));
            if !maint.is_negative() {
                assert_eq!(result, Err(EngineError::NotLiquidatable(liqee)));
                continue;
            }
            let result = result.unwrap();
            liquidated += 1;
            assert!(result.liab_transfer.is_positive());
            assert_close(result.liqee_health_after, FixedPoint::ZERO, "0.01");
            let sol_left = engine.token_balance(liqee, ids.sol).unwrap();
            assert!(sol_left.is_positive(), "liquidation should not strip all collateral");
        }
        assert_eq!(liquidated, 4);
        assert!(!engine.health(liqor, HealthType::Init).unwrap().is_negative());
    }

    #[test]
    fn collateral_exhausted_leaves_the_flag_set() {
        let (mut engine, ids) = setup();
        let _lender = funded(&mut engine, ids.usdc, "100000");
        let liqor = funded(&mut engine, ids.usdc, "100000");
        let liqee = funded(&mut engine, ids.sol, "10");
        engine.withdraw(liqee, ids.usdc, fp("150"), true).unwrap();

        engine.set_oracle_price(OracleTarget::Token(ids.sol), fp("12"), FixedPoint::ZERO).unwrap();
        let result = engine
            .liquidate_token_with_token(liqor, liqee, ids.sol, ids.usdc, fp("1000000"))
            .unwrap();

        // all 10 sol goes at 1.05 / 12 sol per usdc
        assert_close(result.asset_transfer, fp("10"), "0.0001");
        assert!(result.liqee_health_after.is_negative());
        assert!(result.being_liquidated);
        assert!(engine.get_account(liqee).unwrap().being_liquidated);

        // nothing left to pay with
        let err = engine
            .liquidate_token_with_token(liqor, liqee, ids.sol, ids.usdc, fp("1000000"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidLiquidation(_) | EngineError::Position(_)));
    }
}

mod funding_tests {
    use super::*;

    #[test]
    fn funding_is_zero_sum_over_many_periods() {
        let (mut engine, ids) = setup();
        let mm = funded(&mut engine, ids.usdc, "10000000");
        let longs: Vec<AccountId> = (0..3).map(|_| funded(&mut engine, ids.usdc, "100000")).collect();
        let shorts: Vec<AccountId> = (0..2).map(|_| funded(&mut engine, ids.usdc, "100000")).collect();

        // shorts of 15 and 30 lots, longs of 10 each... plus 15 from the market maker
        engine.place_perp_order(shorts[0], ids.perp, Order::limit(Side::Ask, 100, 15)).unwrap();
        engine.place_perp_order(shorts[1], ids.perp, Order::limit(Side::Ask, 100, 30)).unwrap();
        for &long in &longs {
            engine.place_perp_order(long, ids.perp, Order::market(Side::Bid, 10)).unwrap();
        }
        engine.place_perp_order(mm, ids.perp, Order::market(Side::Bid, 15)).unwrap();
        engine.consume_events(ids.perp, 64).unwrap();

        engine.place_perp_order(mm, ids.perp, Order::limit(Side::Bid, 97, 500)).unwrap();
        engine.place_perp_order(mm, ids.perp, Order::limit(Side::Ask, 99, 500)).unwrap();

        for _ in 0..24 {
            engine.advance_time(3_600);
            let update = engine.update_funding(ids.perp).unwrap();
            // book below the index: shorts pay longs
            assert!(update.rate.is_negative());
        }

        let mut total = FixedPoint::ZERO;
        for id in longs.iter().chain(shorts.iter()).chain(std::iter::once(&mm)) {
            let paid = engine.settle_funding(*id, ids.perp).unwrap();
            total = total.try_add(paid).unwrap();
            let position = engine.get_account(*id).unwrap().perp_position(ids.perp).unwrap();
            if position.base_position_lots > 0 {
                assert!(paid.is_negative(), "long {} should receive funding", id);
            } else {
                assert!(paid.is_positive(), "short {} should pay funding", id);
            }
        }
        assert_close(total, FixedPoint::ZERO, "0.000001");
    }

    #[test]
    fn funding_rate_is_clamped() {
        let (mut engine, ids) = setup();
        let mm = funded(&mut engine, ids.usdc, "10000000");
        // book at double the index
        engine.place_perp_order(mm, ids.perp, Order::limit(Side::Bid, 199, 500)).unwrap();
        engine.place_perp_order(mm, ids.perp, Order::limit(Side::Ask, 201, 500)).unwrap();
        engine.advance_time(3_600);
        let update = engine.update_funding(ids.perp).unwrap();
        let market = &engine.get_perp_market(ids.perp).unwrap().market;
        assert_eq!(update.rate, market.max_funding);
    }
}

mod expiry_tests {
    use super::*;

    #[test]
    fn expired_orders_are_swept_in_batches() {
        let (mut engine, ids) = setup();
        let maker = funded(&mut engine, ids.usdc, "1000000");
        for i in 0..12 {
            let order = Order::limit(Side::Bid, 90 - i, 5).with_time_in_force(30);
            engine.place_perp_order(maker, ids.perp, order).unwrap();
        }
        let keeper_order = Order::limit(Side::Bid, 80, 5);
        engine.place_perp_order(maker, ids.perp, keeper_order).unwrap();
        assert_eq!(engine.get_account(maker).unwrap().perp_orders(ids.perp).count(), 13);

        engine.advance_time(60);
        let mut swept = 0;
        loop {
            let pruned = engine.prune_expired_orders(ids.perp, 5).unwrap();
            if pruned == 0 {
                break;
            }
            assert!(pruned <= 5);
            swept += pruned;
        }
        assert_eq!(swept, 12);
        engine.consume_events(ids.perp, 64).unwrap();

        let account = engine.get_account(maker).unwrap();
        assert_eq!(account.perp_orders(ids.perp).count(), 1);
        assert_eq!(account.perp_position(ids.perp).unwrap().bids_base_lots, 5);
    }

    #[test]
    fn taker_skips_expired_liquidity() {
        let (mut engine, ids) = setup();
        let maker = funded(&mut engine, ids.usdc, "1000000");
        let taker = funded(&mut engine, ids.usdc, "1000000");
        engine
            .place_perp_order(maker, ids.perp, Order::limit(Side::Ask, 100, 10).with_time_in_force(10))
            .unwrap();
        engine.place_perp_order(maker, ids.perp, Order::limit(Side::Ask, 102, 10)).unwrap();

        engine.advance_time(20);
        let fill = engine.place_perp_order(taker, ids.perp, Order::market(Side::Bid, 5)).unwrap();
        assert_eq!(fill.matched_base_lots, 5);
        assert_eq!(fill.matched_quote_lots, 5 * 102);
    }
}

mod settlement_tests {
    use super::*;

    #[test]
    fn repeated_settlement_conserves_the_settle_token() {
        let (mut engine, ids) = setup();
        let short = funded(&mut engine, ids.usdc, "1000000");
        let longs: Vec<AccountId> = (0..3).map(|_| funded(&mut engine, ids.usdc, "100000")).collect();
        let keeper = engine.create_account();

        engine.place_perp_order(short, ids.perp, Order::limit(Side::Ask, 100, 30)).unwrap();
        for &long in &longs {
            engine.place_perp_order(long, ids.perp, Order::market(Side::Bid, 10)).unwrap();
        }
        engine.consume_events(ids.perp, 64).unwrap();
        engine.set_oracle_price(OracleTarget::PerpMarket(ids.perp), fp("11"), FixedPoint::ZERO).unwrap();

        let before = total_balance(&engine, ids.usdc);
        let mut settled = 0;
        loop {
            let winners = engine.settle_candidates(ids.perp, SettleDirection::MaxPositive, 1).unwrap();
            let losers = engine.settle_candidates(ids.perp, SettleDirection::MaxNegative, 1).unwrap();
            let (Some(winner), Some(loser)) = (winners.first(), losers.first()) else {
                break;
            };
            engine.settle_pnl(keeper, winner.account, loser.account, ids.perp).unwrap();
            settled += 1;
            assert!(settled <= 3, "every winner settles in one go");
        }
        assert_eq!(settled, 3);
        assert_close(total_balance(&engine, ids.usdc), before, "0.001");

        let market = &engine.get_perp_market(ids.perp).unwrap().market;
        for long in longs {
            let pnl = engine
                .get_account(long)
                .unwrap()
                .perp_position(ids.perp)
                .unwrap()
                .unsettled_pnl(market, fp("11"))
                .unwrap();
            assert_close(pnl, FixedPoint::ZERO, "0.001");
        }
    }
}
