// 1.0: all the primitives live here. ids, sides, slots, timestamps.
// each is a newtype so the compiler catches an account id passed where a token index belongs.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Perp market index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpotMarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenIndex(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

/// Oracle slot height. Staleness is measured in slots, not seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Slot(pub u64);

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "perp#{}", self.0)
    }
}

impl fmt::Display for TokenIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token#{}", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct#{}", self.0)
    }
}

// Bid = buy base, Ask = sell base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn invert(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// +1 for bids, -1 for asks: the sign of the base change for the side's owner.
    pub fn sign(self) -> i64 {
        match self {
            Side::Bid => 1,
            Side::Ask => -1,
        }
    }

    /// Is `lhs` a strictly better price than `rhs` from this side's point of view?
    pub fn is_price_better(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Side::Bid => lhs > rhs,
            Side::Ask => lhs < rhs,
        }
    }

    /// Can an order with `limit` on this side trade against a resting `price`?
    pub fn is_price_within_limit(self, price: i64, limit: i64) -> bool {
        match self {
            Side::Bid => price <= limit,
            Side::Ask => price >= limit,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

// 1.1: unix seconds. the ledger only cares about whole seconds (funding, interest, expiry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn seconds_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.0 as i64, 0).single()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}s", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_price_comparisons() {
        assert!(Side::Bid.is_price_better(101, 100));
        assert!(Side::Ask.is_price_better(99, 100));
        assert!(!Side::Ask.is_price_better(100, 100));

        // a bid at 100 takes asks at or below 100
        assert!(Side::Bid.is_price_within_limit(100, 100));
        assert!(Side::Bid.is_price_within_limit(99, 100));
        assert!(!Side::Bid.is_price_within_limit(101, 100));
        assert!(Side::Ask.is_price_within_limit(101, 100));
    }

    #[test]
    fn side_invert_and_sign() {
        assert_eq!(Side::Bid.invert(), Side::Ask);
        assert_eq!(Side::Ask.sign(), -1);
    }

    #[test]
    fn timestamp_arithmetic() {
        let t0 = Timestamp::from_secs(1_000);
        let t1 = Timestamp::from_secs(1_600);
        assert_eq!(t1.seconds_since(t0), 600);
        assert_eq!(t0.seconds_since(t1), 0);
        assert_eq!(Timestamp::from_secs(0).to_string(), "1970-01-01 00:00:00");
    }
}
