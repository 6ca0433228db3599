//! Perp order placement, cancellation and event consumption.
//!
//! Placing an order only touches the taker: matched lots are parked as unconsumed taker fills
//! and the taker fee is charged right away. Makers are updated later, when the event queue is
//! consumed.

use super::core::{check_health_post, Engine};
use super::results::{ConsumeResult, EngineError, PlaceOrderResult};
use crate::account::PerpOpenOrder;
use crate::events::{EventPayload, PerpOrderCancelledEvent, PerpOrderPlacedEvent};
use crate::fixed::FixedPoint;
use crate::orderbook::{AnyEvent, BookError, FillEvent, MatchContext, Order, OutEvent};
use crate::types::{AccountId, MarketId, Side};

impl Engine {
    pub fn place_perp_order(
        &mut self,
        account_id: AccountId,
        market_index: MarketId,
        order: Order,
    ) -> Result<PlaceOrderResult, EngineError> {
        let state = self.perp_state(market_index)?;
        let oracle_price = self.perp_oracle_price(&state.market)?;
        let mut market = state.market.clone();
        let mut account = self.account(account_id)?.clone();
        let pre_health = self.pre_init_health(&account)?;
        let now = self.current_time.as_secs();

        account.ensure_perp_position(&market)?;
        let ctx = MatchContext {
            owner: account_id,
            owner_slot: account.free_perp_order_slot(),
            now,
            oracle_price_lots: Some(market.native_price_to_lot(oracle_price)?),
            seq_num: market.next_seq_num(),
            match_limit: self.config.match_limit,
            drop_expired_limit: self.config.drop_expired_limit,
            event_queue_free_slots: state.event_queue.free_slots(),
        };
        let plan = state.book.plan_order(&order, &ctx)?;

        let taker_quote_native = market.quote_lots_to_native(plan.fee_bearing_quote_lots())?;
        let taker_fee = market.taker_fee_for(taker_quote_native)?;
        let position = account.perp_position_mut(market_index)?;
        position.add_taker_trade(plan.side, plan.matched_base_lots, plan.matched_quote_lots);
        position.record_trading_fee(taker_fee)?;
        market.fees_accrued = market.fees_accrued.try_add(taker_fee)?;

        if let Some(post) = &plan.post {
            let open_order = PerpOpenOrder {
                market_index,
                side: plan.side,
                tree: post.tree,
                id: post.leaf.key,
                client_id: order.client_order_id,
            };
            account.add_perp_order(post.leaf.owner_slot, open_order, post.leaf.quantity)?;
        }

        let cache = self.health_cache_with(&account, &[], &[&market])?;
        check_health_post(account_id, &cache, pre_health)?;

        let state = self
            .perp_markets
            .get_mut(&market_index)
            .ok_or(EngineError::MarketNotFound(market_index))?;
        let order_id = state.book.apply_plan(&plan, &mut state.event_queue)?;
        state.market = market;
        self.accounts.insert(account_id, account);

        tracing::debug!(
            account = ?account_id,
            market = %market_index,
            side = %plan.side,
            matched = plan.matched_base_lots,
            posted = plan.posted_base_lots(),
            "perp order placed"
        );
        self.emit_event(EventPayload::PerpOrderPlaced(PerpOrderPlacedEvent {
            market_index,
            account: account_id,
            side: plan.side,
            client_order_id: order.client_order_id,
            order_id,
            matched_base_lots: plan.matched_base_lots,
            matched_quote_lots: plan.matched_quote_lots,
            posted_base_lots: plan.posted_base_lots(),
            taker_fee,
        }));

        Ok(PlaceOrderResult {
            order_id,
            side: plan.side,
            matched_base_lots: plan.matched_base_lots,
            matched_quote_lots: plan.matched_quote_lots,
            posted_base_lots: plan.posted_base_lots(),
            taker_fee,
            events_queued: plan.events.len(),
        })
    }

    /// Cancel a live resting order. Returns the base lots it still had.
    pub fn cancel_perp_order(
        &mut self,
        account_id: AccountId,
        market_index: MarketId,
        order_id: u128,
    ) -> Result<i64, EngineError> {
        let (slot, open_order) = self
            .account(account_id)?
            .find_perp_order_by_id(market_index, order_id)
            .ok_or(BookError::OrderNotFound(order_id))?;
        self.cancel_open_order(account_id, slot, open_order)
    }

    pub fn cancel_perp_order_by_client_id(
        &mut self,
        account_id: AccountId,
        market_index: MarketId,
        client_order_id: u64,
    ) -> Result<i64, EngineError> {
        let (slot, open_order) = self
            .account(account_id)?
            .find_perp_order_by_client_id(market_index, client_order_id)
            .ok_or(BookError::OrderNotFound(u128::from(client_order_id)))?;
        self.cancel_open_order(account_id, slot, open_order)
    }

    /// Cancel up to `limit` live orders, optionally on one side only. Orders that already left
    /// the book or expired are skipped. Returns how many were cancelled.
    pub fn cancel_all_perp_orders(
        &mut self,
        account_id: AccountId,
        market_index: MarketId,
        side: Option<Side>,
        limit: usize,
    ) -> Result<usize, EngineError> {
        self.perp_state(market_index)?;
        let orders: Vec<(u8, PerpOpenOrder)> = self
            .account(account_id)?
            .perp_orders(market_index)
            .filter(|(_, order)| side.map_or(true, |s| order.side == s))
            .collect();

        let mut cancelled = 0;
        for (slot, open_order) in orders {
            if cancelled >= limit {
                break;
            }
            match self.cancel_open_order(account_id, slot, open_order) {
                Ok(_) => cancelled += 1,
                Err(EngineError::Book(BookError::OrderNotFound(_) | BookError::AlreadyExpired { .. })) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(cancelled)
    }

    fn cancel_open_order(
        &mut self,
        account_id: AccountId,
        slot: u8,
        open_order: PerpOpenOrder,
    ) -> Result<i64, EngineError> {
        let market_index = open_order.market_index;
        let mut account = self.account(account_id)?.clone();
        let now = self.current_time.as_secs();

        let state = self.perp_state(market_index)?;
        let leaf = state
            .book
            .find_live_order(open_order.side, open_order.tree, open_order.id, now)?;
        if leaf.owner != account_id {
            return Err(BookError::OrderNotFound(open_order.id).into());
        }
        let quantity = leaf.quantity;
        account.remove_perp_order(slot, quantity)?;

        let state = self
            .perp_markets
            .get_mut(&market_index)
            .ok_or(EngineError::MarketNotFound(market_index))?;
        state
            .book
            .remove_order(open_order.side, open_order.tree, open_order.id)
            .ok_or(BookError::OrderNotFound(open_order.id))?;
        self.accounts.insert(account_id, account);

        tracing::debug!(account = ?account_id, market = %market_index, order_id = open_order.id, "perp order cancelled");
        self.emit_event(EventPayload::PerpOrderCancelled(PerpOrderCancelledEvent {
            market_index,
            account: account_id,
            order_id: open_order.id,
            side: open_order.side,
            quantity,
        }));
        Ok(quantity)
    }

    /// Apply up to `limit` queued fill and out events to the accounts involved, oldest first.
    /// An event is popped only once it has been applied.
    pub fn consume_events(&mut self, market_index: MarketId, limit: usize) -> Result<ConsumeResult, EngineError> {
        let mut result = ConsumeResult::default();
        for _ in 0..limit {
            let Some(event) = self.perp_state(market_index)?.event_queue.peek_front().copied() else {
                break;
            };
            match event {
                AnyEvent::Fill(fill) => {
                    let maker_fee = self.apply_fill(market_index, &fill)?;
                    result.fills += 1;
                    result.maker_fees = result.maker_fees.try_add(maker_fee)?;
                    self.emit_event(EventPayload::PerpFill(fill));
                }
                AnyEvent::Out(out) => {
                    self.apply_out(market_index, &out)?;
                    result.outs += 1;
                    self.emit_event(EventPayload::PerpOrderOut(out));
                }
            }
            if let Some(state) = self.perp_markets.get_mut(&market_index) {
                state.event_queue.pop_front();
            }
        }
        if result.fills + result.outs > 0 {
            tracing::debug!(market = %market_index, fills = result.fills, outs = result.outs, "events consumed");
        }
        Ok(result)
    }

    // maker and taker both trade at the maker's price; only the maker pays (or earns) a fee here
    fn apply_fill(&mut self, market_index: MarketId, fill: &FillEvent) -> Result<FixedPoint, EngineError> {
        let mut market = self.perp_state(market_index)?.market.clone();
        let now = self.current_time.as_secs();

        let quote_lots = fill
            .quantity
            .checked_mul(fill.price_lots)
            .ok_or(EngineError::ArithmeticOverflow)?;
        let quote_native = market.quote_lots_to_native(quote_lots)?;
        let maker_fee = if fill.is_self_trade() {
            FixedPoint::ZERO
        } else {
            market.maker_fee_for(quote_native)?
        };

        let maker_side = fill.maker_side();
        let mut maker = self.account(fill.maker)?.clone();
        let maker_position = maker.perp_position_mut(market_index)?;
        maker_position.record_trade(
            &mut market,
            maker_side.sign() * fill.quantity,
            signed_quote(maker_side, quote_native)?,
        )?;
        maker_position.record_trading_fee(maker_fee)?;
        market.fees_accrued = market.fees_accrued.try_add(maker_fee)?;

        let slot_matches = maker
            .perp_open_orders
            .get(fill.maker_slot as usize)
            .copied()
            .flatten()
            .is_some_and(|order| order.id == fill.maker_order_id);
        if fill.maker_out && slot_matches {
            maker.remove_perp_order(fill.maker_slot, fill.quantity)?;
        } else {
            maker
                .perp_position_mut(market_index)?
                .remove_order(maker_side, fill.quantity);
        }
        maker
            .perp_position_mut(market_index)?
            .update_settle_limit(&market, now)?;

        let mut taker = if fill.is_self_trade() {
            None
        } else {
            Some(self.account(fill.taker)?.clone())
        };
        let taker_account = taker.as_mut().unwrap_or(&mut maker);
        let taker_position = taker_account.perp_position_mut(market_index)?;
        let taker_base = fill.taker_side.sign() * fill.quantity;
        taker_position.remove_taker_trade(taker_base, -fill.taker_side.sign() * quote_lots);
        taker_position.record_trade(&mut market, taker_base, signed_quote(fill.taker_side, quote_native)?)?;
        taker_position.update_settle_limit(&market, now)?;

        let state = self
            .perp_markets
            .get_mut(&market_index)
            .ok_or(EngineError::MarketNotFound(market_index))?;
        state.market = market;
        self.accounts.insert(fill.maker, maker);
        if let Some(taker) = taker {
            self.accounts.insert(fill.taker, taker);
        }
        Ok(maker_fee)
    }

    // frees the open-order slot if it still refers to this order
    fn apply_out(&mut self, market_index: MarketId, out: &OutEvent) -> Result<(), EngineError> {
        let mut owner = self.account(out.owner)?.clone();
        let slot_matches = owner
            .perp_open_orders
            .get(out.owner_slot as usize)
            .copied()
            .flatten()
            .is_some_and(|order| order.id == out.order_id && order.market_index == market_index);
        if !slot_matches {
            return Ok(());
        }
        owner.remove_perp_order(out.owner_slot, out.quantity)?;
        self.accounts.insert(out.owner, owner);
        Ok(())
    }

    /// Sweep up to `limit` expired orders off the book. Their slots are freed when the
    /// resulting out events are consumed.
    pub fn prune_expired_orders(&mut self, market_index: MarketId, limit: usize) -> Result<usize, EngineError> {
        let now = self.current_time.as_secs();
        let state = self
            .perp_markets
            .get_mut(&market_index)
            .ok_or(EngineError::MarketNotFound(market_index))?;
        let count = state.book.prune_expired(now, limit, &mut state.event_queue);
        if count > 0 {
            tracing::debug!(market = %market_index, count, "expired orders pruned");
            self.emit_event(EventPayload::ExpiredOrdersPruned { market_index, count });
        }
        Ok(count)
    }
}

// buyers pay quote, sellers receive it
fn signed_quote(side: Side, quote_native: FixedPoint) -> Result<FixedPoint, EngineError> {
    Ok(match side {
        Side::Bid => quote_native.try_neg()?,
        Side::Ask => quote_native,
    })
}
