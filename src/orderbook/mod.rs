// 2.0: perp order book. two crit-bit trees per side (fixed price, oracle pegged) over one slab,
// merged into a single price-time ordered walk. matching plans first, then applies.

mod book;
mod bookside;
mod nodes;
mod order_tree;
mod queue;

pub use book::{MatchContext, Order, OrderParams, OrderPlan, Orderbook, PostPlan, SelfTradeBehavior};
pub use bookside::{BookSide, BookSideIter, BookSideOrder, OrderState};
pub use nodes::{
    fixed_price_data, fixed_price_lots, key_seq_num, new_node_key, oracle_pegged_price_data,
    oracle_pegged_price_offset, InnerNode, LeafNode, Node, NodeHandle, NodeTag, OrderTreeType,
    PostOrderType,
};
pub use order_tree::{OrderTreeIter, OrderTreeNodes, OrderTreeRoot};
pub use queue::{AnyEvent, EventQueue, FillEvent, OutEvent};

/// Expired orders a single taker may sweep out of the opposing side.
pub const DROP_EXPIRED_ORDER_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookError {
    #[error("book side full ({capacity} node slots)")]
    BookFull { capacity: u32 },

    #[error("invalid price: {0} lots")]
    InvalidPrice(i64),

    #[error("invalid quantity: {0} lots")]
    InvalidQuantity(i64),

    #[error("order {0:#x} not found")]
    OrderNotFound(u128),

    #[error("order {order_id:#x} expired at {expiry}")]
    AlreadyExpired { order_id: u128, expiry: u64 },

    #[error("event queue full: {needed} events needed, {free} free")]
    EventQueueFull { needed: usize, free: usize },

    #[error("order would self trade")]
    WouldSelfTrade,

    #[error("no free open-order slot")]
    TooManyOpenOrders,

    #[error("oracle price required for pegged orders")]
    MissingOraclePrice,

    #[error("order tree corrupted: {0}")]
    Corrupted(&'static str),
}
