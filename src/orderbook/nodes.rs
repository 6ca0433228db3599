// 2.1: order tree nodes. one slab slot holds an inner node, a leaf (resting order) or a free-list link.
// keys are 128 bits: price data in the high half, sequence number in the low half.

use crate::types::{AccountId, Side};
use serde::{Deserialize, Serialize};

use super::BookError;

pub type NodeHandle = u32;

/// On-disk tag byte for each slab slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeTag {
    Uninitialized = 0,
    InnerNode = 1,
    LeafNode = 2,
    FreeNode = 3,
    LastFreeNode = 4,
}

/// Which of the two trees of a book side an order lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderTreeType {
    Fixed,
    OraclePegged,
}

impl OrderTreeType {
    pub fn index(self) -> usize {
        match self {
            OrderTreeType::Fixed => 0,
            OrderTreeType::OraclePegged => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostOrderType {
    Limit,
    /// Never takes. Dropped if it would cross.
    PostOnly,
    /// Never takes. Price is moved one tick behind the opposing best if it would cross.
    PostOnlySlide,
}

/// Price data for a fixed-price order: the price in lots, which must be >= 1.
pub fn fixed_price_data(price_lots: i64) -> Result<u64, BookError> {
    if price_lots < 1 {
        return Err(BookError::InvalidPrice(price_lots));
    }
    Ok(price_lots as u64)
}

pub fn fixed_price_lots(price_data: u64) -> i64 {
    price_data as i64
}

/// Price data for an oracle-pegged order. Shifting by 2^63 keeps negative offsets
/// sorted below positive ones under unsigned comparison.
pub fn oracle_pegged_price_data(price_offset_lots: i64) -> u64 {
    (price_offset_lots as u64).wrapping_add(1u64 << 63)
}

pub fn oracle_pegged_price_offset(price_data: u64) -> i64 {
    price_data.wrapping_sub(1u64 << 63) as i64
}

/// Bids store the inverted sequence number so that, walking keys high to low,
/// the earlier order at a price still comes first.
pub fn new_node_key(side: Side, price_data: u64, seq_num: u64) -> u128 {
    let upper = (price_data as u128) << 64;
    match side {
        Side::Bid => upper | (!seq_num as u128),
        Side::Ask => upper | (seq_num as u128),
    }
}

pub fn key_seq_num(side: Side, key: u128) -> u64 {
    let low = key as u64;
    match side {
        Side::Bid => !low,
        Side::Ask => low,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerNode {
    /// Number of leading key bits shared by everything below this node.
    pub prefix_len: u32,
    /// Any key from the subtree; only the first `prefix_len` bits matter.
    pub key: u128,
    pub children: [NodeHandle; 2],
    /// Earliest expiry in each child subtree, u64::MAX if none expire.
    pub child_earliest_expiry: [u64; 2],
}

impl InnerNode {
    pub fn new(prefix_len: u32, key: u128) -> Self {
        Self {
            prefix_len,
            key,
            children: [0; 2],
            child_earliest_expiry: [u64::MAX; 2],
        }
    }

    /// Child to follow for `search_key`, and the crit bit that picked it.
    pub fn walk_down(&self, search_key: u128) -> (NodeHandle, bool) {
        let crit_bit_mask = 1u128 << (127 - self.prefix_len);
        let crit_bit = (search_key & crit_bit_mask) != 0;
        (self.children[crit_bit as usize], crit_bit)
    }

    pub fn earliest_expiry(&self) -> u64 {
        self.child_earliest_expiry[0].min(self.child_earliest_expiry[1])
    }
}

/// A resting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafNode {
    pub owner: AccountId,
    /// Index into the owner's open-order slots.
    pub owner_slot: u8,
    pub order_type: PostOrderType,
    /// Seconds after `timestamp` the order stays valid. None = good till cancelled.
    pub time_in_force: Option<u32>,
    pub key: u128,
    /// Base lots.
    pub quantity: i64,
    pub client_order_id: u64,
    /// Seconds.
    pub timestamp: u64,
    /// Oracle-pegged only: worst price the order may trade at.
    pub peg_limit: Option<i64>,
}

impl LeafNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: AccountId,
        owner_slot: u8,
        key: u128,
        quantity: i64,
        timestamp: u64,
        order_type: PostOrderType,
        time_in_force: Option<u32>,
        peg_limit: Option<i64>,
        client_order_id: u64,
    ) -> Self {
        Self {
            owner,
            owner_slot,
            order_type,
            time_in_force,
            key,
            quantity,
            client_order_id,
            timestamp,
            peg_limit,
        }
    }

    pub fn price_data(&self) -> u64 {
        (self.key >> 64) as u64
    }

    /// Last second at which the order is still live.
    pub fn expiry(&self) -> u64 {
        match self.time_in_force {
            Some(tif) => self.timestamp.saturating_add(tif as u64),
            None => u64::MAX,
        }
    }

    /// Expired strictly after `timestamp + time_in_force`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expiry()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Uninitialized,
    Inner(InnerNode),
    Leaf(LeafNode),
    Free { next: Option<NodeHandle> },
}

impl Node {
    pub fn tag(&self) -> NodeTag {
        match self {
            Node::Uninitialized => NodeTag::Uninitialized,
            Node::Inner(_) => NodeTag::InnerNode,
            Node::Leaf(_) => NodeTag::LeafNode,
            Node::Free { next: Some(_) } => NodeTag::FreeNode,
            Node::Free { next: None } => NodeTag::LastFreeNode,
        }
    }

    pub fn key(&self) -> Option<u128> {
        match self {
            Node::Inner(inner) => Some(inner.key),
            Node::Leaf(leaf) => Some(leaf.key),
            _ => None,
        }
    }

    pub fn earliest_expiry(&self) -> u64 {
        match self {
            Node::Inner(inner) => inner.earliest_expiry(),
            Node::Leaf(leaf) => leaf.expiry(),
            _ => u64::MAX,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafNode> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn as_inner(&self) -> Option<&InnerNode> {
        match self {
            Node::Inner(inner) => Some(inner),
            _ => None,
        }
    }
}
