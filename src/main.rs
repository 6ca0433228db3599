//! margin-sim: walks the engine through lending, perp trading, funding, pnl settlement and
//! token liquidation on one shared set of markets. `RUST_LOG=debug` shows every instruction.

use margin_core::config::to_fixed;
use margin_core::oracle::{OracleSource, ScriptedOracle};
use margin_core::orderbook::Order;
use margin_core::*;
use rust_decimal_macros::dec;
use std::error::Error;
use tracing_subscriber::EnvFilter;

type SimResult<T = ()> = Result<T, Box<dyn Error>>;

struct Markets {
    usdc: TokenIndex,
    sol: TokenIndex,
    perp: MarketId,
    spot: SpotMarketId,
}

fn main() -> SimResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    println!("margin-core simulation");
    println!("cross margin, two banks, one perp, one spot market\n");

    scenario_1_lending()?;
    scenario_2_perp_trading()?;
    scenario_3_funding()?;
    scenario_4_pnl_settlement()?;
    scenario_5_liquidation()?;
    scenario_6_spot_orders()?;

    println!("\nall scenarios completed");
    Ok(())
}

fn setup() -> SimResult<(Engine, Markets)> {
    let mut engine = Engine::new(EngineConfig::default());
    engine.set_time(Timestamp::from_secs(1_700_000_000));

    let usdc = engine.register_token(&TokenConfig::usdc())?;
    let sol = engine.register_token(&TokenConfig::sol())?;
    let perp = engine.create_perp_market(&PerpMarketConfig::btc_perp())?;
    let spot = engine.create_spot_market(&SpotMarketConfig::sol_usdc())?;

    engine.set_oracle_price(OracleTarget::Token(usdc), to_fixed(dec!(1))?, FixedPoint::ZERO)?;
    engine.set_oracle_price(OracleTarget::Token(sol), to_fixed(dec!(20))?, to_fixed(dec!(0.01))?)?;
    engine.set_oracle_price(OracleTarget::PerpMarket(perp), to_fixed(dec!(10))?, FixedPoint::ZERO)?;
    Ok((engine, Markets { usdc, sol, perp, spot }))
}

/// Deposits, a collateralized borrow and a month of interest.
fn scenario_1_lending() -> SimResult {
    println!("Scenario 1: Lending and Interest\n");
    let (mut engine, m) = setup()?;

    let lender = engine.create_account();
    let borrower = engine.create_account();
    engine.deposit(lender, m.usdc, to_fixed(dec!(10000))?)?;
    engine.deposit(borrower, m.sol, to_fixed(dec!(100))?)?;
    println!("  lender deposits 10,000 USDC, borrower deposits 100 SOL");

    let borrowed = engine.withdraw(borrower, m.usdc, to_fixed(dec!(7500))?, true)?;
    println!(
        "  borrower withdraws 7,500 USDC: loan {}, origination fee {}",
        borrowed.loan_amount, borrowed.loan_fee
    );

    engine.advance_time(30 * 86_400);
    let update = engine.update_index_and_rate(m.usdc)?;
    println!(
        "  after 30 days: utilization {}, borrow rate {}, deposit rate {}",
        update.utilization, update.borrow_rate, update.deposit_rate
    );
    println!(
        "  lender balance {}, borrower balance {}",
        engine.token_balance(lender, m.usdc)?,
        engine.token_balance(borrower, m.usdc)?
    );
    println!("  borrower init health {}\n", engine.health(borrower, HealthType::Init)?);
    Ok(())
}

/// Fixed and oracle-pegged quotes, a taker sweep, consumption and expiry.
fn scenario_2_perp_trading() -> SimResult {
    println!("Scenario 2: Perp Trading\n");
    let (mut engine, m) = setup()?;

    let maker = engine.create_account();
    let taker = engine.create_account();
    engine.deposit(maker, m.usdc, to_fixed(dec!(100000))?)?;
    engine.deposit(taker, m.usdc, to_fixed(dec!(100000))?)?;

    engine.place_perp_order(maker, m.perp, Order::limit(Side::Ask, 101, 20))?;
    engine.place_perp_order(maker, m.perp, Order::oracle_pegged(Side::Ask, 3, 20, None))?;
    engine.place_perp_order(maker, m.perp, Order::limit(Side::Bid, 99, 20).with_time_in_force(60))?;
    print_top_of_book(&engine, m.perp)?;

    let fill = engine.place_perp_order(taker, m.perp, Order::market(Side::Bid, 30))?;
    println!(
        "  taker buys {} lots for {} quote lots, taker fee {}",
        fill.matched_base_lots, fill.matched_quote_lots, fill.taker_fee
    );
    let consumed = engine.consume_events(m.perp, 16)?;
    println!("  consumed {} fills, maker fees {}", consumed.fills, consumed.maker_fees);

    engine.advance_time(120);
    let pruned = engine.prune_expired_orders(m.perp, 8)?;
    let outs = engine.consume_events(m.perp, 16)?.outs;
    println!("  two minutes later: {} expired bid pruned, {} slot freed", pruned, outs);
    print_top_of_book(&engine, m.perp)?;

    let position = engine
        .get_account(taker)
        .ok_or(EngineError::AccountNotFound(taker))?
        .perp_position(m.perp)?;
    println!(
        "  taker position {} lots, avg entry {} per lot\n",
        position.base_position_lots, position.avg_entry_price_per_base_lot
    );
    Ok(())
}

fn print_top_of_book(engine: &Engine, market_index: MarketId) -> SimResult {
    let state = engine
        .get_perp_market(market_index)
        .ok_or(EngineError::MarketNotFound(market_index))?;
    let now = engine.time().as_secs();
    let oracle_lots = state.market.oracle_price_lots()?;
    let bid = state.book.bookside(Side::Bid).best_price(now, oracle_lots);
    let ask = state.book.bookside(Side::Ask).best_price(now, oracle_lots);
    println!("  book: best bid {:?}, best ask {:?} (oracle {:?} lots)", bid, ask, oracle_lots);
    Ok(())
}

/// Book trading above the index makes longs pay shorts.
fn scenario_3_funding() -> SimResult {
    println!("Scenario 3: Funding\n");
    let (mut engine, m) = setup()?;

    let long = engine.create_account();
    let short = engine.create_account();
    let mm = engine.create_account();
    for account in [long, short, mm] {
        engine.deposit(account, m.usdc, to_fixed(dec!(100000))?)?;
    }
    engine.place_perp_order(short, m.perp, Order::limit(Side::Ask, 100, 50))?;
    engine.place_perp_order(long, m.perp, Order::market(Side::Bid, 50))?;
    engine.consume_events(m.perp, 16)?;

    engine.place_perp_order(mm, m.perp, Order::limit(Side::Bid, 102, 200))?;
    engine.place_perp_order(mm, m.perp, Order::limit(Side::Ask, 104, 200))?;

    for hour in 1..=3 {
        engine.advance_time(3_600);
        let update = engine.update_funding(m.perp)?;
        println!(
            "  hour {}: daily rate {}, hourly {}, long index {}",
            hour, update.rate, update.hourly_rate, update.long_funding
        );
    }
    let paid_long = engine.settle_funding(long, m.perp)?;
    let paid_short = engine.settle_funding(short, m.perp)?;
    println!("  long paid {}, short paid {}\n", paid_long, paid_short);
    Ok(())
}

/// Price move, candidate scan, then settlement within the window allowance.
fn scenario_4_pnl_settlement() -> SimResult {
    println!("Scenario 4: PnL Settlement\n");
    let (mut engine, m) = setup()?;

    let long = engine.create_account();
    let short = engine.create_account();
    let keeper = engine.create_account();
    engine.deposit(long, m.usdc, to_fixed(dec!(50000))?)?;
    engine.deposit(short, m.usdc, to_fixed(dec!(50000))?)?;
    engine.place_perp_order(short, m.perp, Order::limit(Side::Ask, 100, 10))?;
    engine.place_perp_order(long, m.perp, Order::market(Side::Bid, 10))?;
    engine.consume_events(m.perp, 16)?;

    engine.set_oracle_price(OracleTarget::PerpMarket(m.perp), to_fixed(dec!(11))?, FixedPoint::ZERO)?;
    println!("  perp oracle moves from 10 to 11");

    let winners = engine.settle_candidates(m.perp, SettleDirection::MaxPositive, 3)?;
    let losers = engine.settle_candidates(m.perp, SettleDirection::MaxNegative, 3)?;
    for candidate in winners.iter().chain(losers.iter()) {
        println!("  candidate {}: settleable {}", candidate.account, candidate.settleable);
    }

    if let (Some(winner), Some(loser)) = (winners.first(), losers.first()) {
        let result = engine.settle_pnl(keeper, winner.account, loser.account, m.perp)?;
        println!("  settled {} (fee {})", result.settlement, result.fee);
    }
    println!(
        "  balances: long {}, short {}\n",
        engine.token_balance(long, m.usdc)?,
        engine.token_balance(short, m.usdc)?
    );
    Ok(())
}

/// SOL collateral falls along a scripted feed until the borrow can be liquidated.
fn scenario_5_liquidation() -> SimResult {
    println!("Scenario 5: Token Liquidation\n");
    let (mut engine, m) = setup()?;

    let lender = engine.create_account();
    let liqee = engine.create_account();
    let liqor = engine.create_account();
    engine.deposit(lender, m.usdc, to_fixed(dec!(10000))?)?;
    engine.deposit(liqee, m.sol, to_fixed(dec!(10))?)?;
    engine.withdraw(liqee, m.usdc, to_fixed(dec!(150))?, true)?;
    engine.deposit(liqor, m.usdc, to_fixed(dec!(1000))?)?;

    let mut feed = ScriptedOracle::new(vec![
        OraclePrice::exact(to_fixed(dec!(20))?, Slot(1)),
        OraclePrice::exact(to_fixed(dec!(18))?, Slot(2)),
        OraclePrice::exact(to_fixed(dec!(16))?, Slot(3)),
    ]);
    for _ in 0..3 {
        let Some(observation) = feed.latest() else {
            break;
        };
        engine.advance_slots(1);
        engine.advance_time(1);
        engine.set_oracle_price(OracleTarget::Token(m.sol), observation.price, observation.deviation)?;
        let maint = engine.health(liqee, HealthType::Maint)?;
        println!("  sol at {}: liqee maint health {}", observation.price, maint);
        if maint.is_negative() {
            break;
        }
        feed.advance();
    }

    let result = engine.liquidate_token_with_token(liqor, liqee, m.sol, m.usdc, to_fixed(dec!(1000))?)?;
    println!(
        "  liqor takes {} USDC of borrow for {} SOL",
        result.liab_transfer, result.asset_transfer
    );
    println!(
        "  liqee liquidation-end health {}, still being liquidated: {}\n",
        result.liqee_health_after, result.being_liquidated
    );
    Ok(())
}

/// Reserve, fill and settle against the external spot venue.
fn scenario_6_spot_orders() -> SimResult {
    println!("Scenario 6: Spot Orders\n");
    let (mut engine, m) = setup()?;

    let trader = engine.create_account();
    engine.deposit(trader, m.usdc, to_fixed(dec!(1000))?)?;
    engine.place_spot_order(trader, m.spot, Side::Bid, to_fixed(dec!(20))?, 600)?;
    println!("  bid reserves 600 USDC, health {}", engine.health(trader, HealthType::Init)?);

    engine.fill_spot_order(trader, m.spot, Side::Bid, 15, 300)?;
    engine.cancel_spot_orders(trader, m.spot)?;
    let (base, quote) = engine.settle_funds(trader, m.spot)?;
    println!("  half filled then cancelled: settled {} SOL and {} USDC back", base, quote);
    println!(
        "  balances: {} SOL, {} USDC",
        engine.token_balance(trader, m.sol)?,
        engine.token_balance(trader, m.usdc)?
    );
    Ok(())
}
