use std::collections::{HashMap, VecDeque};

use log::debug;

/// Recently seen Interest nonces, bounded in size and age
#[derive(Debug)]
pub struct NonceTable {
    /// Nonce -> tick it was recorded
    seen: HashMap<u32, u64>,
    /// Recording order, oldest first. May hold nonces already removed.
    order: VecDeque<u32>,
    capacity: usize,
}

impl NonceTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Record a nonce. Returns false if it was already known, which means
    /// the Interest looped back to us.
    pub fn check_and_record(&mut self, nonce: u32, now: u64) -> bool {
        if self.seen.contains_key(&nonce) {
            return false;
        }
        while self.seen.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    if self.seen.remove(&oldest).is_some() {
                        debug!("Nonce table full, forgetting {:#010x}", oldest);
                    }
                }
                None => break,
            }
        }
        self.seen.insert(nonce, now);
        self.order.push_back(nonce);
        true
    }

    pub fn contains(&self, nonce: u32) -> bool {
        self.seen.contains_key(&nonce)
    }

    pub fn remove(&mut self, nonce: u32) -> bool {
        let removed = self.seen.remove(&nonce).is_some();
        if removed {
            self.order.retain(|n| *n != nonce);
        }
        removed
    }

    /// Forget nonces recorded more than `timeout` ticks ago
    pub fn expire(&mut self, now: u64, timeout: u64) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, recorded| now.saturating_sub(*recorded) <= timeout);
        let seen = &self.seen;
        self.order.retain(|n| seen.contains_key(n));
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
