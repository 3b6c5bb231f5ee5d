//! Advisory status cache.
//!
//! Holds views of tokens that reached a terminal state, since those can no
//! longer change. Bounded with oldest-first eviction so memory stays
//! predictable. Claims never consult it.

use std::collections::{HashMap, VecDeque};

use handoff_types::{TokenId, TokenView};

#[derive(Debug)]
pub struct StatusCache {
    views: HashMap<TokenId, TokenView>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<TokenId>,
    max_size: usize,
}

impl StatusCache {
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "StatusCache max_size must be > 0");
        Self {
            views: HashMap::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Remember `view` if it is terminal. Pending views are ignored.
    pub fn remember(&mut self, view: &TokenView) {
        if !view.status.is_terminal() || self.views.contains_key(&view.id) {
            return;
        }
        if self.views.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.views.remove(&oldest);
            }
        }
        self.views.insert(view.id, view.clone());
        self.order.push_back(view.id);
    }

    #[must_use]
    pub fn get(&self, token_id: &TokenId) -> Option<&TokenView> {
        self.views.get(token_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
