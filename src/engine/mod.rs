// 12.0: instruction surface. one `Engine` owns every bank, market and account; each file below
// adds a group of instructions. instructions validate against copies of the state they touch
// and commit only once every check passed.

mod config;
mod core;
mod funding;
mod liquidation;
mod orders;
mod pnl;
mod results;
mod spot;
mod tokens;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{ConsumeResult, EngineError, LiquidationResult, PlaceOrderResult, SettlePnlResult};
