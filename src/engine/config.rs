//! Engine configuration options.

use crate::account::AccountSlots;
use crate::orderbook::DROP_EXPIRED_ORDER_LIMIT;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of audit events to retain in memory.
    pub max_events: usize,
    /// Maker orders a single taker order may match against.
    pub match_limit: usize,
    /// Expired maker orders a single taker order may sweep out.
    pub drop_expired_limit: usize,
    /// Slot counts for new accounts.
    pub account_slots: AccountSlots,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            match_limit: 64,
            drop_expired_limit: DROP_EXPIRED_ORDER_LIMIT,
            account_slots: AccountSlots::default(),
        }
    }
}
