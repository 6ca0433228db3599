// 2.3: one side of a book. fixed and oracle-pegged trees share a slab; iteration merges them
// by effective price, ties going to the lower sequence number.

use serde::{Deserialize, Serialize};

use super::nodes::{fixed_price_lots, oracle_pegged_price_offset, LeafNode, NodeHandle, OrderTreeType};
use super::order_tree::{OrderTreeIter, OrderTreeNodes, OrderTreeRoot};
use super::BookError;
use crate::types::Side;

/// Why an order can or cannot trade right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Valid,
    /// Past `timestamp + time_in_force`. Removed lazily.
    Expired,
    /// Oracle-pegged and the derived price crossed `peg_limit` (or left the valid range).
    /// Stays in the tree and may become valid again.
    PegInvalid,
}

/// An order as seen through the merged iterator.
#[derive(Debug, Clone, Copy)]
pub struct BookSideOrder<'a> {
    pub handle: NodeHandle,
    pub tree: OrderTreeType,
    pub leaf: &'a LeafNode,
    pub price_lots: i64,
    pub state: OrderState,
}

impl BookSideOrder<'_> {
    pub fn is_valid(&self) -> bool {
        self.state == OrderState::Valid
    }

    // price in the high half, tree-independent sequence bits in the low half
    fn rank_key(&self) -> u128 {
        ((self.price_lots as u64 as u128) << 64) | (self.leaf.key as u64 as u128)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSide {
    side: Side,
    roots: [OrderTreeRoot; 2],
    nodes: OrderTreeNodes,
}

impl BookSide {
    pub fn new(side: Side, capacity: u32) -> Self {
        Self {
            side,
            roots: [OrderTreeRoot::default(); 2],
            nodes: OrderTreeNodes::new(capacity),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn root(&self, tree: OrderTreeType) -> &OrderTreeRoot {
        &self.roots[tree.index()]
    }

    pub fn nodes(&self) -> &OrderTreeNodes {
        &self.nodes
    }

    pub fn leaf_count(&self) -> u32 {
        self.roots[0].leaf_count + self.roots[1].leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    pub fn is_full(&self) -> bool {
        self.nodes.is_full()
    }

    /// Whether `tree` can take one more leaf once `removals` are gone. Removing a tree's last
    /// leaf frees one slot, any other leaf frees two (leaf and parent inner node).
    pub fn has_room_after(&self, tree: OrderTreeType, removals: &[(OrderTreeType, u128)]) -> bool {
        let mut leaves = [self.roots[0].leaf_count, self.roots[1].leaf_count];
        let mut free = self.nodes.free_slots();
        for (removed_tree, _) in removals {
            let count = &mut leaves[removed_tree.index()];
            free += match *count {
                0 => 0,
                1 => 1,
                _ => 2,
            };
            *count = count.saturating_sub(1);
        }
        let needed = if leaves[tree.index()] == 0 { 1 } else { 2 };
        free >= needed
    }

    pub fn insert_leaf(
        &mut self,
        tree: OrderTreeType,
        leaf: &LeafNode,
    ) -> Result<(NodeHandle, Option<LeafNode>), BookError> {
        let root = &mut self.roots[tree.index()];
        self.nodes.insert_leaf(root, leaf)
    }

    pub fn remove_by_key(&mut self, tree: OrderTreeType, key: u128) -> Option<LeafNode> {
        let root = &mut self.roots[tree.index()];
        self.nodes.remove_by_key(root, key)
    }

    pub fn find_by_key(&self, tree: OrderTreeType, key: u128) -> Option<&LeafNode> {
        let handle = self.nodes.find_by_key(self.root(tree), key)?;
        self.nodes.leaf(handle)
    }

    pub fn set_quantity(&mut self, tree: OrderTreeType, key: u128, quantity: i64) -> Result<(), BookError> {
        let handle = self
            .nodes
            .find_by_key(&self.roots[tree.index()], key)
            .ok_or(BookError::OrderNotFound(key))?;
        let leaf = self.nodes.leaf_mut(handle).ok_or(BookError::OrderNotFound(key))?;
        leaf.quantity = quantity;
        Ok(())
    }

    fn tree_iter(&self, tree: OrderTreeType) -> OrderTreeIter<'_> {
        // asks walk keys low to high, bids high to low
        self.nodes.iter(self.root(tree), self.side == Side::Ask)
    }

    /// Every order in priority order, including expired and peg-invalid ones.
    /// Without an oracle price the pegged tree is not walked.
    pub fn iter_all_including_invalid(&self, now: u64, oracle_price_lots: Option<i64>) -> BookSideIter<'_> {
        BookSideIter {
            side: self.side,
            now,
            oracle_price_lots,
            fixed: self.tree_iter(OrderTreeType::Fixed),
            pegged: oracle_price_lots.map(|_| self.tree_iter(OrderTreeType::OraclePegged)),
        }
    }

    pub fn iter_valid(&self, now: u64, oracle_price_lots: Option<i64>) -> impl Iterator<Item = BookSideOrder<'_>> {
        self.iter_all_including_invalid(now, oracle_price_lots)
            .filter(BookSideOrder::is_valid)
    }

    pub fn best(&self, now: u64, oracle_price_lots: Option<i64>) -> Option<BookSideOrder<'_>> {
        self.iter_valid(now, oracle_price_lots).next()
    }

    pub fn best_price(&self, now: u64, oracle_price_lots: Option<i64>) -> Option<i64> {
        self.best(now, oracle_price_lots).map(|o| o.price_lots)
    }

    /// Price of the level at which cumulative valid size first reaches `quantity`.
    pub fn impact_price(&self, quantity: i64, now: u64, oracle_price_lots: Option<i64>) -> Option<i64> {
        let mut sum: i64 = 0;
        for order in self.iter_valid(now, oracle_price_lots) {
            sum = sum.saturating_add(order.leaf.quantity);
            if sum >= quantity {
                return Some(order.price_lots);
            }
        }
        None
    }

    /// Aggregated (price_lots, quantity) for the best `levels` price levels.
    pub fn depth(&self, levels: usize, now: u64, oracle_price_lots: Option<i64>) -> Vec<(i64, i64)> {
        let mut out: Vec<(i64, i64)> = Vec::with_capacity(levels);
        for order in self.iter_valid(now, oracle_price_lots) {
            if let Some((price, qty)) = out.last_mut() {
                if *price == order.price_lots {
                    *qty += order.leaf.quantity;
                    continue;
                }
            }
            if out.len() == levels {
                break;
            }
            out.push((order.price_lots, order.leaf.quantity));
        }
        out
    }

    pub fn total_valid_quantity(&self, now: u64, oracle_price_lots: Option<i64>) -> i64 {
        self.iter_valid(now, oracle_price_lots)
            .map(|o| o.leaf.quantity)
            .fold(0i64, i64::saturating_add)
    }

    /// The least competitive order across both trees, without removing it.
    /// A pegged order whose price can't be derived counts as the worst.
    pub fn worst(&self, oracle_price_lots: Option<i64>) -> Option<(OrderTreeType, LeafNode, Option<i64>)> {
        let pick = |tree: OrderTreeType| {
            let root = self.root(tree);
            match self.side {
                Side::Bid => self.nodes.min_leaf(root),
                Side::Ask => self.nodes.max_leaf(root),
            }
            .map(|(_, leaf)| *leaf)
        };
        let fixed = pick(OrderTreeType::Fixed).map(|leaf| {
            let price = fixed_price_lots(leaf.price_data());
            (OrderTreeType::Fixed, leaf, Some(price))
        });
        let pegged = pick(OrderTreeType::OraclePegged).map(|leaf| {
            let price = oracle_price_lots
                .and_then(|oracle| oracle.checked_add(oracle_pegged_price_offset(leaf.price_data())));
            (OrderTreeType::OraclePegged, leaf, price)
        });
        match (fixed, pegged) {
            (Some(f), Some(p)) => match (f.2, p.2) {
                (Some(fp), Some(pp)) if self.side.is_price_better(pp, fp) => Some(f),
                (Some(_), Some(_)) => Some(p),
                (_, None) => Some(p),
                (None, _) => Some(f),
            },
            (f, p) => f.or(p),
        }
    }

    pub fn remove_worst(&mut self, oracle_price_lots: Option<i64>) -> Option<(LeafNode, Option<i64>)> {
        let (tree, leaf, price) = self.worst(oracle_price_lots)?;
        let removed = self.remove_by_key(tree, leaf.key)?;
        Some((removed, price))
    }

    /// The expired order with the earliest expiry across both trees.
    pub fn find_one_expired(&self, now: u64) -> Option<(OrderTreeType, LeafNode)> {
        [OrderTreeType::Fixed, OrderTreeType::OraclePegged]
            .into_iter()
            .filter_map(|tree| {
                let (handle, expiry) = self.nodes.find_earliest_expiry(self.root(tree))?;
                (now > expiry).then_some((tree, handle, expiry))
            })
            .min_by_key(|(_, _, expiry)| *expiry)
            .and_then(|(tree, handle, _)| self.nodes.leaf(handle).map(|leaf| (tree, *leaf)))
    }

    pub fn remove_one_expired(&mut self, now: u64) -> Option<(OrderTreeType, LeafNode)> {
        let (tree, leaf) = self.find_one_expired(now)?;
        self.remove_by_key(tree, leaf.key).map(|removed| (tree, removed))
    }
}

/// Merged walk over both trees of a side. Lazy, finite, and not restartable.
pub struct BookSideIter<'a> {
    side: Side,
    now: u64,
    oracle_price_lots: Option<i64>,
    fixed: OrderTreeIter<'a>,
    pegged: Option<OrderTreeIter<'a>>,
}

impl<'a> BookSideIter<'a> {
    fn fixed_order(&self, handle: NodeHandle, leaf: &'a LeafNode) -> BookSideOrder<'a> {
        let state = if leaf.is_expired(self.now) {
            OrderState::Expired
        } else {
            OrderState::Valid
        };
        BookSideOrder {
            handle,
            tree: OrderTreeType::Fixed,
            leaf,
            price_lots: fixed_price_lots(leaf.price_data()),
            state,
        }
    }

    fn pegged_order(&self, handle: NodeHandle, leaf: &'a LeafNode, oracle_price_lots: i64) -> BookSideOrder<'a> {
        let offset = oracle_pegged_price_offset(leaf.price_data());
        let (price_lots, in_range) = match oracle_price_lots.checked_add(offset) {
            Some(price) if price >= 1 => (price, true),
            Some(_) => (1, false),
            None => (i64::MAX, false),
        };
        let crossed_limit = match (leaf.peg_limit, self.side) {
            (Some(limit), Side::Bid) => price_lots > limit,
            (Some(limit), Side::Ask) => price_lots < limit,
            (None, _) => false,
        };
        let state = if leaf.is_expired(self.now) {
            OrderState::Expired
        } else if !in_range || crossed_limit {
            OrderState::PegInvalid
        } else {
            OrderState::Valid
        };
        BookSideOrder {
            handle,
            tree: OrderTreeType::OraclePegged,
            leaf,
            price_lots,
            state,
        }
    }
}

impl<'a> Iterator for BookSideIter<'a> {
    type Item = BookSideOrder<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let fixed_head = self.fixed.peek().map(|(h, leaf)| self.fixed_order(h, leaf));
        let pegged_head = match (self.pegged.as_ref(), self.oracle_price_lots) {
            (Some(iter), Some(oracle)) => iter.peek().map(|(h, leaf)| self.pegged_order(h, leaf, oracle)),
            _ => None,
        };

        let take_fixed = match (&fixed_head, &pegged_head) {
            (Some(f), Some(p)) => match self.side {
                Side::Bid => f.rank_key() >= p.rank_key(),
                Side::Ask => f.rank_key() <= p.rank_key(),
            },
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };

        if take_fixed {
            self.fixed.next();
            fixed_head
        } else {
            if let Some(iter) = self.pegged.as_mut() {
                iter.next();
            }
            pegged_head
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::nodes::{fixed_price_data, new_node_key, oracle_pegged_price_data, PostOrderType};
    use crate::types::AccountId;

    struct Builder {
        side: BookSide,
        seq: u64,
    }

    impl Builder {
        fn new(side: Side) -> Self {
            Self {
                side: BookSide::new(side, 128),
                seq: 0,
            }
        }

        fn fixed(&mut self, price: i64, qty: i64) -> u128 {
            self.fixed_tif(price, qty, 0, None)
        }

        fn fixed_tif(&mut self, price: i64, qty: i64, timestamp: u64, tif: Option<u32>) -> u128 {
            self.seq += 1;
            let key = new_node_key(self.side.side(), fixed_price_data(price).unwrap(), self.seq);
            let leaf = LeafNode::new(AccountId(1), 0, key, qty, timestamp, PostOrderType::Limit, tif, None, 0);
            self.side.insert_leaf(OrderTreeType::Fixed, &leaf).unwrap();
            key
        }

        fn pegged(&mut self, offset: i64, qty: i64, peg_limit: Option<i64>) -> u128 {
            self.seq += 1;
            let key = new_node_key(self.side.side(), oracle_pegged_price_data(offset), self.seq);
            let leaf = LeafNode::new(AccountId(2), 0, key, qty, 0, PostOrderType::Limit, None, peg_limit, 0);
            self.side.insert_leaf(OrderTreeType::OraclePegged, &leaf).unwrap();
            key
        }
    }

    fn prices(side: &BookSide, oracle: Option<i64>) -> Vec<(i64, OrderTreeType)> {
        side.iter_valid(0, oracle).map(|o| (o.price_lots, o.tree)).collect()
    }

    #[test]
    fn bids_merge_fixed_and_pegged_by_price() {
        let mut b = Builder::new(Side::Bid);
        b.fixed(100, 1);
        b.fixed(98, 1);
        b.pegged(-1, 1, None); // 99 at oracle 100
        b.pegged(2, 1, None); // 102
        assert_eq!(
            prices(&b.side, Some(100)),
            vec![
                (102, OrderTreeType::OraclePegged),
                (100, OrderTreeType::Fixed),
                (99, OrderTreeType::OraclePegged),
                (98, OrderTreeType::Fixed),
            ]
        );
    }

    #[test]
    fn equal_prices_go_to_the_earlier_order() {
        let mut b = Builder::new(Side::Ask);
        b.pegged(0, 1, None); // seq 1 at 50
        b.fixed(50, 1); // seq 2
        let order: Vec<_> = b.side.iter_valid(0, Some(50)).map(|o| o.tree).collect();
        assert_eq!(order, vec![OrderTreeType::OraclePegged, OrderTreeType::Fixed]);
    }

    #[test]
    fn pegged_orders_ignored_without_oracle() {
        let mut b = Builder::new(Side::Ask);
        b.fixed(10, 1);
        b.pegged(1, 1, None);
        assert_eq!(prices(&b.side, None), vec![(10, OrderTreeType::Fixed)]);
    }

    #[test]
    fn pegged_bid_goes_invalid_past_its_limit() {
        let mut b = Builder::new(Side::Bid);
        b.pegged(-5, 3, Some(100));
        assert_eq!(b.side.best_price(0, Some(105)), Some(100));
        assert_eq!(b.side.best_price(0, Some(106)), None);

        let all: Vec<_> = b.side.iter_all_including_invalid(0, Some(106)).collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state, OrderState::PegInvalid);
        assert_eq!(all[0].price_lots, 101);

        // still resting, valid again once the oracle comes back
        assert_eq!(b.side.best_price(0, Some(104)), Some(99));
    }

    #[test]
    fn pegged_ask_goes_invalid_below_its_limit() {
        let mut b = Builder::new(Side::Ask);
        b.pegged(5, 1, Some(100));
        assert_eq!(b.side.best_price(0, Some(95)), Some(100));
        assert_eq!(b.side.best_price(0, Some(94)), None);
    }

    #[test]
    fn pegged_price_below_one_lot_is_invalid() {
        let mut b = Builder::new(Side::Bid);
        b.pegged(-10, 1, None);
        assert_eq!(b.side.best_price(0, Some(10)), None);
        assert_eq!(b.side.best_price(0, Some(11)), Some(1));
    }

    #[test]
    fn expired_orders_are_flagged_not_removed() {
        let mut b = Builder::new(Side::Ask);
        b.fixed_tif(100, 1, 10, Some(5));
        b.fixed(101, 1);
        assert_eq!(b.side.best_price(15, None), Some(100));
        assert_eq!(b.side.best_price(16, None), Some(101));
        assert_eq!(b.side.leaf_count(), 2);

        let (tree, leaf) = b.side.remove_one_expired(16).unwrap();
        assert_eq!(tree, OrderTreeType::Fixed);
        assert_eq!(fixed_price_lots(leaf.price_data()), 100);
        assert!(b.side.remove_one_expired(16).is_none());
    }

    #[test]
    fn impact_price_crosses_inside_third_level() {
        let mut b = Builder::new(Side::Bid);
        b.fixed(100, 10);
        b.fixed(99, 10);
        b.fixed(98, 10);
        assert_eq!(b.side.impact_price(25, 0, None), Some(98));
        assert_eq!(b.side.impact_price(10, 0, None), Some(100));
        assert_eq!(b.side.impact_price(31, 0, None), None);
    }

    #[test]
    fn depth_aggregates_levels() {
        let mut b = Builder::new(Side::Ask);
        b.fixed(10, 1);
        b.fixed(10, 2);
        b.pegged(1, 4, None);
        b.fixed(12, 8);
        assert_eq!(b.side.depth(2, 0, Some(10)), vec![(10, 3), (11, 4)]);
        assert_eq!(b.side.total_valid_quantity(0, Some(10)), 15);
    }

    #[test]
    fn remove_worst_picks_across_trees() {
        let mut b = Builder::new(Side::Bid);
        b.fixed(100, 1);
        b.fixed(90, 1);
        b.pegged(-20, 1, None);
        let (leaf, price) = b.side.remove_worst(Some(100)).unwrap();
        assert_eq!(price, Some(80));
        assert_eq!(oracle_pegged_price_offset(leaf.price_data()), -20);
        let (_, price) = b.side.remove_worst(Some(100)).unwrap();
        assert_eq!(price, Some(90));
    }
}
