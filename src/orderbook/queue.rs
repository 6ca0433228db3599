// 2.4: event queue. matching never touches maker accounts directly; it leaves fill and out events
// here and a keeper consumes them later. bounded, with a monotone sequence number.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::BookError;
use crate::types::{AccountId, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillEvent {
    pub seq_num: u64,
    pub timestamp: u64,
    pub taker_side: Side,
    /// Maker order fully consumed; its open-order slot can be freed.
    pub maker_out: bool,
    pub maker_slot: u8,
    pub maker: AccountId,
    pub maker_order_id: u128,
    pub maker_client_order_id: u64,
    pub maker_timestamp: u64,
    pub taker: AccountId,
    pub taker_client_order_id: u64,
    pub price_lots: i64,
    pub quantity: i64,
}

impl FillEvent {
    pub fn is_self_trade(&self) -> bool {
        self.maker == self.taker
    }

    pub fn maker_side(&self) -> Side {
        self.taker_side.invert()
    }
}

/// An order left the book without trading: expired, evicted, or cancelled by self-trade handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutEvent {
    pub seq_num: u64,
    pub side: Side,
    pub owner_slot: u8,
    pub timestamp: u64,
    pub owner: AccountId,
    pub order_id: u128,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnyEvent {
    Fill(FillEvent),
    Out(OutEvent),
}

impl AnyEvent {
    pub fn seq_num(&self) -> u64 {
        match self {
            AnyEvent::Fill(fill) => fill.seq_num,
            AnyEvent::Out(out) => out.seq_num,
        }
    }

    fn set_seq_num(&mut self, seq_num: u64) {
        match self {
            AnyEvent::Fill(fill) => fill.seq_num = seq_num,
            AnyEvent::Out(out) => out.seq_num = seq_num,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventQueue {
    events: VecDeque<AnyEvent>,
    capacity: usize,
    seq_num: u64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            seq_num: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.events.len())
    }

    /// Next sequence number to be handed out.
    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    /// Stamps the event with the next sequence number.
    pub fn push_back(&mut self, mut event: AnyEvent) -> Result<u64, BookError> {
        if self.is_full() {
            return Err(BookError::EventQueueFull { needed: 1, free: 0 });
        }
        let seq_num = self.seq_num;
        event.set_seq_num(seq_num);
        self.events.push_back(event);
        self.seq_num += 1;
        Ok(seq_num)
    }

    pub fn peek_front(&self) -> Option<&AnyEvent> {
        self.events.front()
    }

    pub fn pop_front(&mut self) -> Option<AnyEvent> {
        self.events.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnyEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(quantity: i64) -> AnyEvent {
        AnyEvent::Out(OutEvent {
            seq_num: 0,
            side: Side::Bid,
            owner_slot: 0,
            timestamp: 0,
            owner: AccountId(1),
            order_id: 7,
            quantity,
        })
    }

    #[test]
    fn sequence_numbers_keep_counting_after_pops() {
        let mut queue = EventQueue::new(2);
        assert_eq!(queue.push_back(out(1)), Ok(0));
        assert_eq!(queue.push_back(out(2)), Ok(1));
        assert_eq!(queue.push_back(out(3)), Err(BookError::EventQueueFull { needed: 1, free: 0 }));

        assert_eq!(queue.pop_front().map(|e| e.seq_num()), Some(0));
        assert_eq!(queue.push_back(out(3)), Ok(2));
        let seqs: Vec<u64> = queue.iter().map(AnyEvent::seq_num).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn free_slots_track_length() {
        let mut queue = EventQueue::new(3);
        queue.push_back(out(1)).unwrap();
        assert_eq!(queue.free_slots(), 2);
        assert!(!queue.is_full());
    }
}
