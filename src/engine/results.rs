// 12.0.2: result types and errors for engine instructions.

use crate::bank::BankError;
use crate::config::ConfigError;
use crate::fixed::{FixedPoint, MathError};
use crate::health::{HealthError, HealthType};
use crate::oracle::OracleError;
use crate::orderbook::BookError;
use crate::position::PositionError;
use crate::types::{AccountId, MarketId, Side, SpotMarketId, TokenIndex};

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOrderResult {
    /// Set when a remainder rests on the book
    pub order_id: Option<u128>,
    pub side: Side,
    pub matched_base_lots: i64,
    pub matched_quote_lots: i64,
    pub posted_base_lots: i64,
    pub taker_fee: FixedPoint,
    /// Events the order left in the queue (fills and outs)
    pub events_queued: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumeResult {
    pub fills: usize,
    pub outs: usize,
    pub maker_fees: FixedPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettlePnlResult {
    pub settlement: FixedPoint,
    pub fee: FixedPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationResult {
    pub asset_transfer: FixedPoint,
    pub liab_transfer: FixedPoint,
    pub liqee_health_after: FixedPoint,
    pub being_liquidated: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Perp market {0} not found")]
    MarketNotFound(MarketId),

    #[error("Spot market {0:?} not found")]
    SpotMarketNotFound(SpotMarketId),

    #[error("Token {0} not registered")]
    TokenNotFound(TokenIndex),

    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Perp market {0} has no oracle price")]
    NoOraclePrice(MarketId),

    #[error("Account {account:?} would end with {health_type:?} health {health}")]
    InsufficientHealth {
        account: AccountId,
        health_type: HealthType,
        health: FixedPoint,
    },

    #[error("Token {token}: withdrawing {requested} needs a borrow, only {available} available")]
    BorrowNotAllowed {
        token: TokenIndex,
        available: FixedPoint,
        requested: FixedPoint,
    },

    #[error("Invalid amount {0}")]
    InvalidAmount(FixedPoint),

    #[error("Pnl signs do not allow settlement: a {a_pnl}, b {b_pnl}")]
    ProfitabilityMismatch { a_pnl: FixedPoint, b_pnl: FixedPoint },

    #[error("Cannot settle pnl with self")]
    CannotSettleWithSelf,

    #[error("Account {0:?} settle health is negative")]
    SettleHealthNegative(AccountId),

    #[error("Account {0:?} is not liquidatable")]
    NotLiquidatable(AccountId),

    #[error("Cannot liquidate self")]
    CannotLiquidateSelf,

    #[error("Liquidation not possible: {0}")]
    InvalidLiquidation(&'static str),

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Book error: {0}")]
    Book(#[from] BookError),

    #[error("Bank error: {0}")]
    Bank(#[from] BankError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Health error: {0}")]
    Health(#[from] HealthError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),
}

// overflow and division by zero both mean the instruction's numbers left the representable range
impl From<MathError> for EngineError {
    fn from(_: MathError) -> Self {
        EngineError::ArithmeticOverflow
    }
}
