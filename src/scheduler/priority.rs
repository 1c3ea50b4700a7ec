//! Request ordering for the scheduling queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Order in which queued requests are handed to the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Arrival order.
    #[default]
    Fifo,
    /// Lower priority value first, ties broken by arrival order.
    Priority,
}

impl QueueOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::Priority => "priority",
        }
    }
}

impl FromStr for QueueOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "priority" => Ok(Self::Priority),
            other => Err(format!("unknown queue order: {other}")),
        }
    }
}

/// Item with its ordering key.
#[derive(Debug)]
struct OrderedItem<T> {
    rank: u8,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for OrderedItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.sequence == other.sequence
    }
}

impl<T> Eq for OrderedItem<T> {}

impl<T> PartialOrd for OrderedItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for OrderedItem<T> {
    // BinaryHeap is a max-heap: the smallest (rank, sequence) must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .rank
            .cmp(&self.rank)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue that degrades to FIFO when ordered by arrival.
pub struct PriorityQueue<T> {
    heap: BinaryHeap<OrderedItem<T>>,
    order: QueueOrder,
    next_sequence: u64,
}

impl<T> PriorityQueue<T> {
    pub fn new(order: QueueOrder) -> Self {
        Self {
            heap: BinaryHeap::new(),
            order,
            next_sequence: 0,
        }
    }

    pub fn push(&mut self, item: T, priority: u8) {
        let rank = match self.order {
            QueueOrder::Fifo => 0,
            QueueOrder::Priority => priority,
        };
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(OrderedItem { rank, sequence, item });
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|p| p.item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|p| &p.item)
    }

    /// Remove and return every item matching `pred`, in scheduling order.
    pub fn extract_if(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        if !self.heap.iter().any(|p| pred(&p.item)) {
            return Vec::new();
        }
        let mut all = std::mem::take(&mut self.heap).into_sorted_vec();
        // Sorted ascending by Ord, so the next item to schedule is last.
        all.reverse();
        let mut taken = Vec::new();
        for entry in all {
            if pred(&entry.item) {
                taken.push(entry.item);
            } else {
                self.heap.push(entry);
            }
        }
        taken
    }

    /// Remove everything, in scheduling order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut all = std::mem::take(&mut self.heap).into_sorted_vec();
        all.reverse();
        all.into_iter().map(|p| p.item).collect()
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new(QueueOrder::default())
    }
}
