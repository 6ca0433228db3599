// margin-core: cross-margin spot/perp exchange core.
// every instruction runs to completion on in-memory state and either commits fully or not at all.
// all risk math is I80F48-style fixed point; no floats, no I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs, fixed.rs: ids, side, time; 80.48 fixed point
//   2.x  orderbook/: crit-bit order trees, book sides, matching, event queue
//   3.x  market.rs: perp and spot markets, lot conversions
//   4.x  position.rs: token, perp and spot open-order positions
//   5.x  funding.rs: impact-price funding rate and accumulators
//   6.x  bank.rs: interest curve, indexes, borrows, net borrow window
//   7.x  config.rs: decimal configs and presets
//        account.rs: margin account slots
//   8.x  health/: cross-margin health cache
//   9.x  oracle.rs: validated prices, stable price model
//   10.x settlement.rs: settle-pnl candidates and fees
//   11.x events.rs: audit log
//   12.x engine/: instruction surface

// primitives
pub mod fixed;
pub mod types;

// state
pub mod account;
pub mod bank;
pub mod market;
pub mod oracle;
pub mod orderbook;
pub mod position;

// risk
pub mod funding;
pub mod health;
pub mod settlement;

// integration
pub mod config;
pub mod engine;
pub mod events;

// re exports for convenience
pub use account::{AccountSlots, MarginAccount, PerpOpenOrder};
pub use bank::{Bank, BankError, InterestCurve, InterestUpdate, WithdrawResult};
pub use config::{ConfigError, InterestCurveConfig, OracleSettings, PerpMarketConfig, SpotMarketConfig, TokenConfig};
pub use engine::*;
pub use events::*;
pub use fixed::{FixedPoint, MathError};
pub use funding::FundingUpdate;
pub use health::{HealthCache, HealthError, HealthType};
pub use market::{PerpMarket, PerpMarketState, SpotMarket};
pub use oracle::{OracleConfig, OracleError, OraclePrice, StablePriceModel};
pub use orderbook::{BookError, Order, OrderTreeType, PostOrderType, SelfTradeBehavior};
pub use position::{PerpPosition, PositionError, SpotOpenOrders, TokenPosition};
pub use settlement::{SettleCandidate, SettleDirection};
pub use types::*;
