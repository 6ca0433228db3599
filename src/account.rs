//! Margin accounts.
//!
//! One account holds every token, perp and spot position of a user and is margined as a whole.
//! Positions live in bounded slot lists; the open-order slots tie resting book orders back to
//! the account so fills and cancels can find them.

use crate::fixed::FixedPoint;
use crate::market::{PerpMarket, SpotMarket};
use crate::orderbook::OrderTreeType;
use crate::position::{PerpPosition, PositionError, SpotOpenOrders, TokenPosition};
use crate::types::{AccountId, MarketId, Side, SpotMarketId, Timestamp, TokenIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSlots {
    pub tokens: usize,
    pub perps: usize,
    pub spot: usize,
    pub perp_open_orders: usize,
}

impl Default for AccountSlots {
    fn default() -> Self {
        Self {
            tokens: 8,
            perps: 4,
            spot: 4,
            perp_open_orders: 16,
        }
    }
}

/// A resting perp order as seen from the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpOpenOrder {
    pub market_index: MarketId,
    pub side: Side,
    pub tree: OrderTreeType,
    pub id: u128,
    pub client_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginAccount {
    pub id: AccountId,
    pub created_at: Timestamp,
    pub being_liquidated: bool,
    pub slots: AccountSlots,
    pub tokens: Vec<TokenPosition>,
    pub perps: Vec<PerpPosition>,
    pub spot_open_orders: Vec<SpotOpenOrders>,
    pub perp_open_orders: Vec<Option<PerpOpenOrder>>,
}

impl MarginAccount {
    pub fn new(id: AccountId, slots: AccountSlots, created_at: Timestamp) -> Self {
        Self {
            id,
            created_at,
            being_liquidated: false,
            slots,
            tokens: Vec::new(),
            perps: Vec::new(),
            spot_open_orders: Vec::new(),
            perp_open_orders: vec![None; slots.perp_open_orders],
        }
    }

    pub fn token_position(&self, token_index: TokenIndex) -> Result<&TokenPosition, PositionError> {
        self.tokens
            .iter()
            .find(|p| p.token_index == token_index)
            .ok_or(PositionError::TokenPositionMissing(token_index))
    }

    pub fn token_position_mut(&mut self, token_index: TokenIndex) -> Result<&mut TokenPosition, PositionError> {
        self.tokens
            .iter_mut()
            .find(|p| p.token_index == token_index)
            .ok_or(PositionError::TokenPositionMissing(token_index))
    }

    /// Indexed balance, zero when the account has no position in the token.
    pub fn indexed_token_balance(&self, token_index: TokenIndex) -> FixedPoint {
        self.token_position(token_index)
            .map(|p| p.indexed_position)
            .unwrap_or(FixedPoint::ZERO)
    }

    pub fn ensure_token_position(&mut self, token_index: TokenIndex) -> Result<&mut TokenPosition, PositionError> {
        let index = match self.tokens.iter().position(|p| p.token_index == token_index) {
            Some(index) => index,
            None => {
                if self.tokens.len() >= self.slots.tokens {
                    return Err(PositionError::SlotsFull {
                        kind: "token",
                        limit: self.slots.tokens,
                    });
                }
                self.tokens.push(TokenPosition::new(token_index));
                self.tokens.len() - 1
            }
        };
        Ok(&mut self.tokens[index])
    }

    /// Frees the slot once the balance is gone and nothing relies on it.
    pub fn deactivate_token_position(&mut self, token_index: TokenIndex) {
        self.tokens
            .retain(|p| p.token_index != token_index || !p.indexed_position.is_zero() || p.is_in_use());
    }

    pub fn perp_position(&self, market_index: MarketId) -> Result<&PerpPosition, PositionError> {
        self.perps
            .iter()
            .find(|p| p.market_index == market_index)
            .ok_or(PositionError::PerpPositionMissing(market_index))
    }

    pub fn perp_position_mut(&mut self, market_index: MarketId) -> Result<&mut PerpPosition, PositionError> {
        self.perps
            .iter_mut()
            .find(|p| p.market_index == market_index)
            .ok_or(PositionError::PerpPositionMissing(market_index))
    }

    pub fn ensure_perp_position(&mut self, market: &PerpMarket) -> Result<&mut PerpPosition, PositionError> {
        let index = match self.perps.iter().position(|p| p.market_index == market.market_index) {
            Some(index) => index,
            None => {
                if self.perps.len() >= self.slots.perps {
                    return Err(PositionError::SlotsFull {
                        kind: "perp",
                        limit: self.slots.perps,
                    });
                }
                self.perps.push(PerpPosition::new(market));
                self.perps.len() - 1
            }
        };
        Ok(&mut self.perps[index])
    }

    pub fn deactivate_perp_position(&mut self, market_index: MarketId) {
        self.perps
            .retain(|p| p.market_index != market_index || !p.is_closable());
    }

    pub fn spot_open_orders(&self, market_index: SpotMarketId) -> Result<&SpotOpenOrders, PositionError> {
        self.spot_open_orders
            .iter()
            .find(|oo| oo.market_index == market_index)
            .ok_or(PositionError::SpotOpenOrdersMissing(market_index))
    }

    pub fn spot_open_orders_mut(&mut self, market_index: SpotMarketId) -> Result<&mut SpotOpenOrders, PositionError> {
        self.spot_open_orders
            .iter_mut()
            .find(|oo| oo.market_index == market_index)
            .ok_or(PositionError::SpotOpenOrdersMissing(market_index))
    }

    /// Open orders for a spot market. Both token positions are kept alive while it exists.
    pub fn ensure_spot_open_orders(&mut self, market: &SpotMarket) -> Result<&mut SpotOpenOrders, PositionError> {
        if let Some(index) = self
            .spot_open_orders
            .iter()
            .position(|oo| oo.market_index == market.market_index)
        {
            return Ok(&mut self.spot_open_orders[index]);
        }
        if self.spot_open_orders.len() >= self.slots.spot {
            return Err(PositionError::SlotsFull {
                kind: "spot",
                limit: self.slots.spot,
            });
        }
        self.ensure_token_position(market.base_token_index)?.in_use_count += 1;
        self.ensure_token_position(market.quote_token_index)?.in_use_count += 1;
        self.spot_open_orders.push(SpotOpenOrders::new(
            market.market_index,
            market.base_token_index,
            market.quote_token_index,
        ));
        let last = self.spot_open_orders.len() - 1;
        Ok(&mut self.spot_open_orders[last])
    }

    pub fn close_spot_open_orders(&mut self, market_index: SpotMarketId) -> Result<(), PositionError> {
        let oo = self.spot_open_orders(market_index)?;
        if !oo.is_empty() {
            return Err(PositionError::InUse("spot open orders hold funds"));
        }
        let (base, quote) = (oo.base_token_index, oo.quote_token_index);
        self.spot_open_orders.retain(|oo| oo.market_index != market_index);
        for token in [base, quote] {
            let position = self.token_position_mut(token)?;
            position.in_use_count = position.in_use_count.saturating_sub(1);
        }
        Ok(())
    }

    pub fn free_perp_order_slot(&self) -> Option<u8> {
        self.perp_open_orders
            .iter()
            .position(Option::is_none)
            .and_then(|slot| u8::try_from(slot).ok())
    }

    pub fn add_perp_order(&mut self, slot: u8, order: PerpOpenOrder, base_lots: i64) -> Result<(), PositionError> {
        let entry = self
            .perp_open_orders
            .get_mut(slot as usize)
            .ok_or(PositionError::SlotsFull {
                kind: "perp open order",
                limit: self.slots.perp_open_orders,
            })?;
        *entry = Some(order);
        self.perp_position_mut(order.market_index)?
            .add_order(order.side, base_lots);
        Ok(())
    }

    /// Frees an open-order slot and releases `base_lots` of the order from the position.
    pub fn remove_perp_order(&mut self, slot: u8, base_lots: i64) -> Result<Option<PerpOpenOrder>, PositionError> {
        let Some(order) = self.perp_open_orders.get_mut(slot as usize).and_then(Option::take) else {
            return Ok(None);
        };
        self.perp_position_mut(order.market_index)?
            .remove_order(order.side, base_lots);
        Ok(Some(order))
    }

    pub fn perp_orders(&self, market_index: MarketId) -> impl Iterator<Item = (u8, PerpOpenOrder)> + '_ {
        self.perp_open_orders
            .iter()
            .enumerate()
            .filter_map(move |(slot, order)| match order {
                Some(order) if order.market_index == market_index => Some((slot as u8, *order)),
                _ => None,
            })
    }

    pub fn find_perp_order_by_id(&self, market_index: MarketId, id: u128) -> Option<(u8, PerpOpenOrder)> {
        self.perp_orders(market_index).find(|(_, order)| order.id == id)
    }

    pub fn find_perp_order_by_client_id(&self, market_index: MarketId, client_id: u64) -> Option<(u8, PerpOpenOrder)> {
        self.perp_orders(market_index)
            .find(|(_, order)| order.client_id == client_id)
    }
}
