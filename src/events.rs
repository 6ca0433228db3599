// 11.0: audit log. every committed instruction leaves one or more events behind. the log is
// append-only and bounded; rejected instructions leave nothing.

use crate::bank::InterestUpdate;
use crate::fixed::FixedPoint;
use crate::funding::FundingUpdate;
use crate::health::HealthType;
use crate::orderbook::{FillEvent, OutEvent};
use crate::types::{AccountId, MarketId, Side, SpotMarketId, Timestamp, TokenIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Setup
    TokenRegistered { token_index: TokenIndex, name: String },
    PerpMarketCreated { market_index: MarketId, name: String },
    SpotMarketCreated { market_index: SpotMarketId, name: String },
    AccountCreated { account: AccountId },

    // Prices and interest
    OraclePriceSet(OraclePriceSetEvent),
    InterestAccrued(InterestUpdate),
    FundingUpdated(FundingUpdate),

    // Token balances
    Deposit(TokenBalanceEvent),
    Withdraw(WithdrawEvent),

    // Perp trading
    PerpOrderPlaced(PerpOrderPlacedEvent),
    PerpOrderCancelled(PerpOrderCancelledEvent),
    PerpFill(FillEvent),
    PerpOrderOut(OutEvent),
    ExpiredOrdersPruned { market_index: MarketId, count: usize },
    FundingSettled(FundingSettledEvent),

    // Spot venue
    SpotOrderPlaced(SpotOrderEvent),
    SpotOrderFilled(SpotOrderEvent),
    SpotFundsSettled(SpotFundsSettledEvent),

    // Settlement and liquidation
    PnlSettled(PnlSettledEvent),
    TokenLiquidation(TokenLiquidationEvent),
    LiquidationStatusChanged { account: AccountId, being_liquidated: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleTarget {
    Token(TokenIndex),
    PerpMarket(MarketId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OraclePriceSetEvent {
    pub target: OracleTarget,
    pub price: FixedPoint,
    pub stable_price: FixedPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalanceEvent {
    pub account: AccountId,
    pub token_index: TokenIndex,
    pub amount: FixedPoint,
    /// Native balance afterwards
    pub balance: FixedPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawEvent {
    pub account: AccountId,
    pub token_index: TokenIndex,
    pub amount: FixedPoint,
    pub balance: FixedPoint,
    pub loan_amount: FixedPoint,
    pub loan_fee: FixedPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpOrderPlacedEvent {
    pub market_index: MarketId,
    pub account: AccountId,
    pub side: Side,
    pub client_order_id: u64,
    /// Set when a remainder rests on the book
    pub order_id: Option<u128>,
    pub matched_base_lots: i64,
    pub matched_quote_lots: i64,
    pub posted_base_lots: i64,
    pub taker_fee: FixedPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpOrderCancelledEvent {
    pub market_index: MarketId,
    pub account: AccountId,
    pub order_id: u128,
    pub side: Side,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSettledEvent {
    pub market_index: MarketId,
    pub account: AccountId,
    /// Positive when the account paid
    pub amount: FixedPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotOrderEvent {
    pub market_index: SpotMarketId,
    pub account: AccountId,
    pub side: Side,
    pub base_amount: u64,
    pub quote_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotFundsSettledEvent {
    pub market_index: SpotMarketId,
    pub account: AccountId,
    pub base_amount: u64,
    pub quote_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlSettledEvent {
    pub market_index: MarketId,
    pub account_a: AccountId,
    pub account_b: AccountId,
    pub settler: AccountId,
    pub settlement: FixedPoint,
    pub fee: FixedPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLiquidationEvent {
    pub liquidator: AccountId,
    pub liquidatee: AccountId,
    pub asset_token_index: TokenIndex,
    pub liab_token_index: TokenIndex,
    pub asset_transfer: FixedPoint,
    pub liab_transfer: FixedPoint,
    /// Health of the liquidatee afterwards
    pub health_type: HealthType,
    pub health_after: FixedPoint,
}
