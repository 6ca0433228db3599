// 2.5: matching. an order is first planned against an immutable book: which makers it fills,
// which expired orders it sweeps, where (and whether) it rests. the caller checks health on the
// plan, then applies it. a plan that fails validation leaves the book untouched.

use serde::{Deserialize, Serialize};

use super::bookside::{BookSide, OrderState};
use super::nodes::{
    fixed_price_data, new_node_key, oracle_pegged_price_data, LeafNode, OrderTreeType, PostOrderType,
};
use super::queue::{AnyEvent, EventQueue, FillEvent, OutEvent};
use super::BookError;
use crate::types::{AccountId, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfTradeBehavior {
    /// Match against own orders as usual but without fees.
    DecrementTake,
    /// Cancel the resting own order and keep matching.
    CancelProvide,
    /// Fail the whole order.
    AbortTransaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderParams {
    /// Takes at any price, never rests.
    Market,
    /// Takes up to `price_lots`, never rests.
    ImmediateOrCancel { price_lots: i64 },
    Fixed {
        price_lots: i64,
        order_type: PostOrderType,
    },
    OraclePegged {
        price_offset_lots: i64,
        order_type: PostOrderType,
        peg_limit: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub side: Side,
    pub max_base_lots: i64,
    pub max_quote_lots: i64,
    pub client_order_id: u64,
    /// Seconds the resting part stays valid. None = good till cancelled.
    pub time_in_force: Option<u32>,
    pub self_trade_behavior: SelfTradeBehavior,
    pub params: OrderParams,
}

impl Order {
    fn new(side: Side, max_base_lots: i64, params: OrderParams) -> Self {
        Self {
            side,
            max_base_lots,
            max_quote_lots: i64::MAX,
            client_order_id: 0,
            time_in_force: None,
            self_trade_behavior: SelfTradeBehavior::DecrementTake,
            params,
        }
    }

    pub fn limit(side: Side, price_lots: i64, max_base_lots: i64) -> Self {
        Self::new(
            side,
            max_base_lots,
            OrderParams::Fixed {
                price_lots,
                order_type: PostOrderType::Limit,
            },
        )
    }

    pub fn post_only(side: Side, price_lots: i64, max_base_lots: i64) -> Self {
        Self::new(
            side,
            max_base_lots,
            OrderParams::Fixed {
                price_lots,
                order_type: PostOrderType::PostOnly,
            },
        )
    }

    pub fn market(side: Side, max_base_lots: i64) -> Self {
        Self::new(side, max_base_lots, OrderParams::Market)
    }

    pub fn immediate_or_cancel(side: Side, price_lots: i64, max_base_lots: i64) -> Self {
        Self::new(side, max_base_lots, OrderParams::ImmediateOrCancel { price_lots })
    }

    pub fn oracle_pegged(side: Side, price_offset_lots: i64, max_base_lots: i64, peg_limit: Option<i64>) -> Self {
        Self::new(
            side,
            max_base_lots,
            OrderParams::OraclePegged {
                price_offset_lots,
                order_type: PostOrderType::Limit,
                peg_limit,
            },
        )
    }

    pub fn with_order_type(mut self, order_type: PostOrderType) -> Self {
        match &mut self.params {
            OrderParams::Fixed { order_type: t, .. } | OrderParams::OraclePegged { order_type: t, .. } => {
                *t = order_type
            }
            _ => {}
        }
        self
    }

    pub fn with_max_quote_lots(mut self, max_quote_lots: i64) -> Self {
        self.max_quote_lots = max_quote_lots;
        self
    }

    pub fn with_client_order_id(mut self, client_order_id: u64) -> Self {
        self.client_order_id = client_order_id;
        self
    }

    pub fn with_time_in_force(mut self, seconds: u32) -> Self {
        self.time_in_force = Some(seconds);
        self
    }

    pub fn with_self_trade_behavior(mut self, behavior: SelfTradeBehavior) -> Self {
        self.self_trade_behavior = behavior;
        self
    }

    /// Tree the remainder rests in, if this kind of order rests at all.
    pub fn post_target(&self) -> Option<OrderTreeType> {
        match self.params {
            OrderParams::Fixed { .. } => Some(OrderTreeType::Fixed),
            OrderParams::OraclePegged { .. } => Some(OrderTreeType::OraclePegged),
            _ => None,
        }
    }

    pub fn post_order_type(&self) -> Option<PostOrderType> {
        match self.params {
            OrderParams::Fixed { order_type, .. } | OrderParams::OraclePegged { order_type, .. } => Some(order_type),
            _ => None,
        }
    }

    pub fn is_post_only(&self) -> bool {
        matches!(
            self.post_order_type(),
            Some(PostOrderType::PostOnly) | Some(PostOrderType::PostOnlySlide)
        )
    }

    fn peg_limit(&self) -> Option<i64> {
        match self.params {
            OrderParams::OraclePegged { peg_limit, .. } => peg_limit,
            _ => None,
        }
    }
}

/// Taker-side inputs that come from outside the book.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext {
    pub owner: AccountId,
    /// Free open-order slot on the owner's account, needed only if the order rests.
    pub owner_slot: Option<u8>,
    pub now: u64,
    pub oracle_price_lots: Option<i64>,
    /// Sequence number assigned to this order.
    pub seq_num: u64,
    pub match_limit: usize,
    pub drop_expired_limit: usize,
    pub event_queue_free_slots: usize,
}

/// Where the unmatched remainder goes.
#[derive(Debug, Clone, PartialEq)]
pub struct PostPlan {
    pub tree: OrderTreeType,
    pub leaf: LeafNode,
    /// Effective price at placement time.
    pub price_lots: i64,
    /// Own-side orders removed to make room: one expired order, then the worst orders until
    /// the new leaf fits.
    pub removals: Vec<(OrderTreeType, u128)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderPlan {
    pub side: Side,
    pub seq_num: u64,
    /// In queue order; sequence numbers are stamped on apply.
    pub events: Vec<AnyEvent>,
    pub opposing_changes: Vec<(OrderTreeType, u128, i64)>,
    pub opposing_deletes: Vec<(OrderTreeType, u128)>,
    /// Unsigned base lots taken from the book.
    pub matched_base_lots: i64,
    /// Unsigned quote lots paid or received for them.
    pub matched_quote_lots: i64,
    pub post: Option<PostPlan>,
}

impl OrderPlan {
    /// Base lots the taker gains (positive for bids).
    pub fn taker_base_lots(&self) -> i64 {
        self.side.sign() * self.matched_base_lots
    }

    /// Quote lots the taker gains (negative for bids).
    pub fn taker_quote_lots(&self) -> i64 {
        -self.side.sign() * self.matched_quote_lots
    }

    pub fn fills(&self) -> impl Iterator<Item = &FillEvent> {
        self.events.iter().filter_map(|e| match e {
            AnyEvent::Fill(fill) => Some(fill),
            AnyEvent::Out(_) => None,
        })
    }

    /// Quote lots matched against other accounts. Self trades pay no fees.
    pub fn fee_bearing_quote_lots(&self) -> i64 {
        self.fills()
            .filter(|f| !f.is_self_trade())
            .map(|f| f.quantity * f.price_lots)
            .sum()
    }

    pub fn posted_base_lots(&self) -> i64 {
        self.post.as_ref().map_or(0, |p| p.leaf.quantity)
    }

    pub fn order_id(&self) -> Option<u128> {
        self.post.as_ref().map(|p| p.leaf.key)
    }
}

// limit used for matching, price data to rest with, effective resting price
struct PricedOrder {
    match_limit: Option<i64>,
    price_data: u64,
    price_lots: i64,
    crosses_for_post_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orderbook {
    pub bids: BookSide,
    pub asks: BookSide,
}

impl Orderbook {
    pub fn new(capacity_per_side: u32) -> Self {
        Self {
            bids: BookSide::new(Side::Bid, capacity_per_side),
            asks: BookSide::new(Side::Ask, capacity_per_side),
        }
    }

    pub fn bookside(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    pub fn bookside_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn price_order(&self, order: &Order, now: u64, oracle_price_lots: Option<i64>) -> Result<PricedOrder, BookError> {
        let opposing_best = self.bookside(order.side.invert()).best_price(now, oracle_price_lots);
        let crosses = |price: i64| opposing_best.is_some_and(|best| order.side.is_price_within_limit(best, price));
        // one tick behind the opposing best
        let slide = |price: i64| match opposing_best {
            Some(best) if crosses(price) => best - order.side.sign(),
            _ => price,
        };

        match order.params {
            OrderParams::Market => {
                let limit = match order.side {
                    Side::Bid => i64::MAX,
                    Side::Ask => 1,
                };
                Ok(PricedOrder {
                    match_limit: Some(limit),
                    price_data: 0,
                    price_lots: limit,
                    crosses_for_post_only: false,
                })
            }
            OrderParams::ImmediateOrCancel { price_lots } => {
                fixed_price_data(price_lots)?;
                Ok(PricedOrder {
                    match_limit: Some(price_lots),
                    price_data: 0,
                    price_lots,
                    crosses_for_post_only: false,
                })
            }
            OrderParams::Fixed { price_lots, order_type } => {
                fixed_price_data(price_lots)?;
                let price_lots = match order_type {
                    PostOrderType::PostOnlySlide => slide(price_lots),
                    _ => price_lots,
                };
                Ok(PricedOrder {
                    match_limit: Some(price_lots),
                    price_data: fixed_price_data(price_lots)?,
                    price_lots,
                    crosses_for_post_only: crosses(price_lots),
                })
            }
            OrderParams::OraclePegged {
                price_offset_lots,
                order_type,
                peg_limit,
            } => {
                let oracle = oracle_price_lots.ok_or(BookError::MissingOraclePrice)?;
                let raw_price = oracle
                    .checked_add(price_offset_lots)
                    .ok_or(BookError::InvalidPrice(price_offset_lots))?;
                let price_lots = match order_type {
                    PostOrderType::PostOnlySlide => slide(raw_price),
                    _ => raw_price,
                };
                let offset = price_offset_lots - (raw_price - price_lots);
                // matching stops at the peg limit; a price below one lot cannot match
                let match_limit = match (peg_limit, order.side) {
                    _ if price_lots < 1 => None,
                    (Some(limit), Side::Bid) => Some(price_lots.min(limit)),
                    (Some(limit), Side::Ask) => Some(price_lots.max(limit)),
                    (None, _) => Some(price_lots),
                };
                Ok(PricedOrder {
                    match_limit,
                    price_data: oracle_pegged_price_data(offset),
                    price_lots,
                    crosses_for_post_only: crosses(price_lots),
                })
            }
        }
    }

    /// Work out everything `order` would do, without changing the book.
    pub fn plan_order(&self, order: &Order, ctx: &MatchContext) -> Result<OrderPlan, BookError> {
        if order.max_base_lots <= 0 {
            return Err(BookError::InvalidQuantity(order.max_base_lots));
        }
        if order.max_quote_lots <= 0 {
            return Err(BookError::InvalidQuantity(order.max_quote_lots));
        }

        let side = order.side;
        let priced = self.price_order(order, ctx.now, ctx.oracle_price_lots)?;
        let mut plan = OrderPlan {
            side,
            seq_num: ctx.seq_num,
            events: Vec::new(),
            opposing_changes: Vec::new(),
            opposing_deletes: Vec::new(),
            matched_base_lots: 0,
            matched_quote_lots: 0,
            post: None,
        };

        if order.post_order_type() == Some(PostOrderType::PostOnly) && priced.crosses_for_post_only {
            tracing::debug!(side = %side, price_lots = priced.price_lots, "post-only order would cross, dropped");
            return Ok(plan);
        }

        let mut remaining_base = order.max_base_lots;
        let mut remaining_quote = order.max_quote_lots;

        if let (Some(limit), false) = (priced.match_limit, order.is_post_only()) {
            let opposing = self.bookside(side.invert());
            let mut dropped_expired = 0usize;
            let mut processed = 0usize;

            for maker in opposing.iter_all_including_invalid(ctx.now, ctx.oracle_price_lots) {
                if remaining_base == 0 || remaining_quote == 0 || processed >= ctx.match_limit {
                    break;
                }
                match maker.state {
                    OrderState::Expired => {
                        if dropped_expired < ctx.drop_expired_limit {
                            dropped_expired += 1;
                            plan.events.push(out_event(side.invert(), maker.leaf, ctx.now));
                            plan.opposing_deletes.push((maker.tree, maker.leaf.key));
                        }
                        continue;
                    }
                    OrderState::PegInvalid => continue,
                    OrderState::Valid => {}
                }
                if !side.is_price_within_limit(maker.price_lots, limit) {
                    break;
                }

                if maker.leaf.owner == ctx.owner {
                    match order.self_trade_behavior {
                        SelfTradeBehavior::AbortTransaction => return Err(BookError::WouldSelfTrade),
                        SelfTradeBehavior::CancelProvide => {
                            plan.events.push(out_event(side.invert(), maker.leaf, ctx.now));
                            plan.opposing_deletes.push((maker.tree, maker.leaf.key));
                            processed += 1;
                            continue;
                        }
                        SelfTradeBehavior::DecrementTake => {}
                    }
                }

                let max_match_by_quote = remaining_quote / maker.price_lots;
                if max_match_by_quote == 0 {
                    break;
                }
                let match_base = remaining_base.min(maker.leaf.quantity).min(max_match_by_quote);
                let match_quote = match_base
                    .checked_mul(maker.price_lots)
                    .ok_or(BookError::InvalidQuantity(match_base))?;

                remaining_base -= match_base;
                remaining_quote -= match_quote;
                plan.matched_base_lots += match_base;
                plan.matched_quote_lots += match_quote;

                let maker_remaining = maker.leaf.quantity - match_base;
                let maker_out = maker_remaining == 0;
                if maker_out {
                    plan.opposing_deletes.push((maker.tree, maker.leaf.key));
                } else {
                    plan.opposing_changes.push((maker.tree, maker.leaf.key, maker_remaining));
                }
                plan.events.push(AnyEvent::Fill(FillEvent {
                    seq_num: 0,
                    timestamp: ctx.now,
                    taker_side: side,
                    maker_out,
                    maker_slot: maker.leaf.owner_slot,
                    maker: maker.leaf.owner,
                    maker_order_id: maker.leaf.key,
                    maker_client_order_id: maker.leaf.client_order_id,
                    maker_timestamp: maker.leaf.timestamp,
                    taker: ctx.owner,
                    taker_client_order_id: order.client_order_id,
                    price_lots: maker.price_lots,
                    quantity: match_base,
                }));
                processed += 1;
            }
        }

        if let (Some(tree), Some(order_type)) = (order.post_target(), order.post_order_type()) {
            let book_base = if priced.price_lots >= 1 {
                remaining_base.min(remaining_quote / priced.price_lots)
            } else {
                remaining_base
            };
            if book_base > 0 {
                plan.post = Some(self.plan_post(order, ctx, tree, order_type, &priced, book_base, &mut plan.events)?);
            }
        }

        if plan.events.len() > ctx.event_queue_free_slots {
            return Err(BookError::EventQueueFull {
                needed: plan.events.len(),
                free: ctx.event_queue_free_slots,
            });
        }
        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_post(
        &self,
        order: &Order,
        ctx: &MatchContext,
        tree: OrderTreeType,
        order_type: PostOrderType,
        priced: &PricedOrder,
        book_base: i64,
        events: &mut Vec<AnyEvent>,
    ) -> Result<PostPlan, BookError> {
        let owner_slot = ctx.owner_slot.ok_or(BookError::TooManyOpenOrders)?;
        let own = self.bookside(order.side);
        let mut removals = Vec::new();

        if let Some((expired_tree, expired)) = own.find_one_expired(ctx.now) {
            events.push(out_event(order.side, &expired, ctx.now));
            removals.push((expired_tree, expired.key));
        }
        if !own.has_room_after(tree, &removals) {
            // evict from a scratch copy so each pick sees the previous ones gone
            let mut scratch = own.clone();
            for &(removed_tree, key) in &removals {
                scratch.remove_by_key(removed_tree, key);
            }
            while !own.has_room_after(tree, &removals) {
                let full = BookError::BookFull {
                    capacity: own.nodes().capacity(),
                };
                let (worst_tree, worst, worst_price) = scratch.worst(ctx.oracle_price_lots).ok_or(full.clone())?;
                if let Some(worst_price) = worst_price {
                    if !order.side.is_price_better(priced.price_lots, worst_price) {
                        return Err(full);
                    }
                }
                scratch.remove_by_key(worst_tree, worst.key);
                events.push(out_event(order.side, &worst, ctx.now));
                removals.push((worst_tree, worst.key));
            }
        }

        let key = new_node_key(order.side, priced.price_data, ctx.seq_num);
        let leaf = LeafNode::new(
            ctx.owner,
            owner_slot,
            key,
            book_base,
            ctx.now,
            order_type,
            order.time_in_force,
            order.peg_limit(),
            order.client_order_id,
        );
        Ok(PostPlan {
            tree,
            leaf,
            price_lots: priced.price_lots,
            removals,
        })
    }

    /// Apply a plan produced by `plan_order` on this same book state.
    pub fn apply_plan(&mut self, plan: &OrderPlan, queue: &mut EventQueue) -> Result<Option<u128>, BookError> {
        if plan.events.len() > queue.free_slots() {
            return Err(BookError::EventQueueFull {
                needed: plan.events.len(),
                free: queue.free_slots(),
            });
        }
        // validate before touching anything
        let opposing = self.bookside(plan.side.invert());
        let opposing_keys = plan
            .opposing_changes
            .iter()
            .map(|&(tree, key, _)| (tree, key))
            .chain(plan.opposing_deletes.iter().copied());
        for (tree, key) in opposing_keys {
            opposing.find_by_key(tree, key).ok_or(BookError::OrderNotFound(key))?;
        }
        if let Some(post) = &plan.post {
            let own = self.bookside(plan.side);
            for &(tree, key) in &post.removals {
                own.find_by_key(tree, key).ok_or(BookError::OrderNotFound(key))?;
            }
            if !own.has_room_after(post.tree, &post.removals) {
                return Err(BookError::BookFull {
                    capacity: own.nodes().capacity(),
                });
            }
        }

        let opposing = self.bookside_mut(plan.side.invert());
        for &(tree, key, quantity) in &plan.opposing_changes {
            opposing.set_quantity(tree, key, quantity)?;
        }
        for &(tree, key) in &plan.opposing_deletes {
            opposing.remove_by_key(tree, key).ok_or(BookError::OrderNotFound(key))?;
        }
        for event in &plan.events {
            queue.push_back(*event)?;
        }

        let Some(post) = &plan.post else {
            return Ok(None);
        };
        let own = self.bookside_mut(plan.side);
        for &(tree, key) in &post.removals {
            own.remove_by_key(tree, key).ok_or(BookError::OrderNotFound(key))?;
        }
        own.insert_leaf(post.tree, &post.leaf)?;
        Ok(Some(post.leaf.key))
    }

    /// Plan and apply in one go, for callers with no external checks to run in between.
    pub fn new_order(&mut self, order: &Order, ctx: &MatchContext, queue: &mut EventQueue) -> Result<OrderPlan, BookError> {
        let plan = self.plan_order(order, ctx)?;
        self.apply_plan(&plan, queue)?;
        Ok(plan)
    }

    /// Resting order by id. Expired orders are reported as `AlreadyExpired`.
    pub fn find_live_order(
        &self,
        side: Side,
        tree: OrderTreeType,
        order_id: u128,
        now: u64,
    ) -> Result<&LeafNode, BookError> {
        let leaf = self
            .bookside(side)
            .find_by_key(tree, order_id)
            .ok_or(BookError::OrderNotFound(order_id))?;
        if leaf.is_expired(now) {
            return Err(BookError::AlreadyExpired {
                order_id,
                expiry: leaf.expiry(),
            });
        }
        Ok(leaf)
    }

    /// Remove a live order. Missing or expired orders leave the book unchanged.
    pub fn cancel_order(&mut self, side: Side, tree: OrderTreeType, order_id: u128, now: u64) -> Result<LeafNode, BookError> {
        self.find_live_order(side, tree, order_id, now)?;
        self.bookside_mut(side)
            .remove_by_key(tree, order_id)
            .ok_or(BookError::OrderNotFound(order_id))
    }

    /// Remove an order regardless of expiry.
    pub fn remove_order(&mut self, side: Side, tree: OrderTreeType, order_id: u128) -> Option<LeafNode> {
        self.bookside_mut(side).remove_by_key(tree, order_id)
    }

    /// Sweep up to `limit` expired orders from both sides, leaving an out event for each.
    /// Stops early when the queue fills up.
    pub fn prune_expired(&mut self, now: u64, limit: usize, queue: &mut EventQueue) -> usize {
        let mut removed = 0;
        for side in [Side::Bid, Side::Ask] {
            while removed < limit && !queue.is_full() {
                let Some((_, leaf)) = self.bookside_mut(side).remove_one_expired(now) else {
                    break;
                };
                // queue has room, checked above
                let _ = queue.push_back(out_event(side, &leaf, now));
                removed += 1;
            }
        }
        removed
    }
}

fn out_event(side: Side, leaf: &LeafNode, now: u64) -> AnyEvent {
    AnyEvent::Out(OutEvent {
        seq_num: 0,
        side,
        owner_slot: leaf.owner_slot,
        timestamp: now,
        owner: leaf.owner,
        order_id: leaf.key,
        quantity: leaf.quantity,
    })
}
