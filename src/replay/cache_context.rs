//! Prior-request cache index and cache-hit detection for one step.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::event::{Event, EventKind, PageId};
use super::token_key::TokenKey;

/// Where a token's KV entry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotRef {
    pub page_id: PageId,
    pub slot: usize,
}

/// Cache view derived for a single step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CacheContext {
    /// Index of the most recent `request_start` at or before the step (0 if none)
    pub request_start_index: usize,
    /// Tracked writes strictly before the request boundary, last write wins
    pub prior_cache: HashMap<TokenKey, SlotRef>,
    /// Keys written from the request boundary up to the step
    pub current_writes: HashSet<TokenKey>,
    /// Token of the most recent `token_step` at or before the step
    pub current_token_index: Option<usize>,
    /// Set only when the step's own event is a `token_step` served from `prior_cache`
    pub cache_hit: bool,
    pub cache_hit_token_index: Option<usize>,
    pub cache_hit_page_id: Option<PageId>,
}

impl CacheContext {
    /// Build the context for the last event of `prefix` (`events[0..=step]`).
    pub fn build(prefix: &[Event], tokens: &[String]) -> Self {
        let request_start_index = request_boundary(prefix);

        let mut prior_cache = HashMap::new();
        let mut current_writes = HashSet::new();
        for (index, event) in prefix.iter().enumerate() {
            let Some(write) = event.tracked_write() else {
                continue;
            };
            let Some(token_idx) = write.token_idx else {
                continue;
            };
            let key = TokenKey::lookup(tokens, token_idx);
            if index >= request_start_index {
                current_writes.insert(key);
            } else if let Some((page_id, slot)) = write.location() {
                prior_cache.insert(key, SlotRef { page_id, slot });
            }
        }

        let current_token_index = prefix.iter().rev().find_map(Event::token_step);

        let mut ctx = Self {
            request_start_index,
            prior_cache,
            current_writes,
            current_token_index,
            ..Self::default()
        };

        let hit_token = prefix
            .last()
            .and_then(Event::token_step)
            .filter(|&token_idx| token_idx < tokens.len());
        if let Some(token_idx) = hit_token {
            let key = TokenKey::lookup(tokens, token_idx);
            if !ctx.current_writes.contains(&key) {
                if let Some(slot) = ctx.prior_cache.get(&key) {
                    ctx.cache_hit = true;
                    ctx.cache_hit_token_index = Some(token_idx);
                    ctx.cache_hit_page_id = Some(slot.page_id);
                }
            }
        }

        ctx
    }

    /// Whether `tokens[token_idx]` has an entry left over from the prior request.
    pub fn is_cached(&self, tokens: &[String], token_idx: usize) -> bool {
        token_idx < tokens.len()
            && self
                .prior_cache
                .contains_key(&TokenKey::lookup(tokens, token_idx))
    }

    /// Whether the step's cache hit is for `token_idx`.
    pub fn is_hit(&self, token_idx: usize) -> bool {
        self.cache_hit && self.cache_hit_token_index == Some(token_idx)
    }
}

/// Index of the most recent `request_start`; earlier boundaries are flattened away.
pub fn request_boundary(prefix: &[Event]) -> usize {
    prefix
        .iter()
        .rposition(|event| matches!(event.kind, EventKind::RequestStart(_)))
        .unwrap_or(0)
}

/// Request id announced by the most recent `request_start`, or 0.
pub fn current_request_id(prefix: &[Event]) -> u64 {
    prefix
        .iter()
        .rev()
        .find_map(|event| match &event.kind {
            EventKind::RequestStart(start) => start.request_id,
            _ => None,
        })
        .unwrap_or(0)
}
