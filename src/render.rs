//! Plain-text views of a reconstructed snapshot.
//!
//! Rendering only reads the snapshot; nothing here feeds back into replay.

use std::fmt::Write;

use crate::config::DEFAULT_RECENT_EVENTS;
use crate::replay::{CopyRole, Event, EventKind, PageRecord, Snapshot};
use crate::trace::SimulationResult;

/// Steps after a copy-on-write during which its pages stay highlighted
pub const COPY_HIGHLIGHT_WINDOW: usize = 2;

const PLACEHOLDER_TOKEN: &str = "(generated token)";

/// Most placeholder rows shown past the end of the token list
const MAX_PLACEHOLDER_ROWS: usize = 64;

/// Everything a frame needs: the run, the snapshot for the step, and session inputs.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    pub result: &'a SimulationResult,
    pub snapshot: &'a Snapshot,
    /// Token positions inherited from the previous run's prompt
    pub prefix_token_indices: &'a [usize],
    pub recent_events: usize,
}

impl<'a> View<'a> {
    pub fn new(result: &'a SimulationResult, snapshot: &'a Snapshot) -> Self {
        Self {
            result,
            snapshot,
            prefix_token_indices: &[],
            recent_events: DEFAULT_RECENT_EVENTS,
        }
    }

    pub fn with_prefix(mut self, prefix_token_indices: &'a [usize]) -> Self {
        self.prefix_token_indices = prefix_token_indices;
        self
    }

    pub fn with_recent_events(mut self, recent_events: usize) -> Self {
        self.recent_events = recent_events;
        self
    }

    fn tokens(&self) -> &'a [String] {
        &self.result.tokens
    }

    fn current_event(&self) -> Option<&'a Event> {
        self.result.events.get(self.snapshot.step)
    }

    /// Rows in the token views: every known token, plus placeholders up to the current one.
    ///
    /// Placeholders are capped, so a far-off token index never expands into millions of rows.
    fn token_count(&self) -> usize {
        let known = self.tokens().len();
        let current = self
            .snapshot
            .cache
            .current_token_index
            .map_or(0, |idx| idx.saturating_add(1));
        current.min(known.saturating_add(MAX_PLACEHOLDER_ROWS)).max(known)
    }

    fn token_text(&self, idx: usize) -> &'a str {
        self.tokens()
            .get(idx)
            .map_or(PLACEHOLDER_TOKEN, String::as_str)
    }

    fn is_prefix(&self, idx: usize) -> bool {
        self.prefix_token_indices.contains(&idx)
    }

    /// Page grid: one line per page with status, occupancy bar and badges.
    pub fn pages(&self) -> String {
        let mut out = String::new();
        for page in self.snapshot.pages.pages() {
            let _ = writeln!(out, "{}", self.page_line(page));
        }
        if out.is_empty() {
            out.push_str("(no pages allocated)\n");
        }
        out
    }

    fn page_line(&self, page: &PageRecord) -> String {
        let mut line = format!("Page {}", page.id);
        if let Some(source) = page.copied_from {
            let _ = write!(line, " (copied from Page {source})");
        }

        let written = self
            .snapshot
            .just_written
            .filter(|slot| slot.page_id == page.id)
            .map(|slot| slot.slot);
        let bar: String = (0..page.capacity)
            .map(|slot| match written {
                Some(w) if w == slot => '*',
                _ if slot < page.used_slots => '#',
                _ => '.',
            })
            .collect();

        let _ = write!(
            line,
            "  [{bar}] {}/{} \u{2022} ref={}  {}",
            page.used_slots,
            page.capacity,
            page.ref_count,
            page.status().label()
        );

        match self.snapshot.copy_role(page.id, COPY_HIGHLIGHT_WINDOW) {
            Some(CopyRole::Source) => line.push_str("  cow-source"),
            Some(CopyRole::Target) => line.push_str("  cow-target"),
            None => {}
        }
        let cache = &self.snapshot.cache;
        if cache.cache_hit && cache.cache_hit_page_id == Some(page.id) {
            line.push_str("  [cache hit]");
        }
        line
    }

    /// Token list with past/current/prefix/cached/hit markers.
    pub fn tokens_list(&self) -> String {
        let cache = &self.snapshot.cache;
        let mut out = String::new();
        for idx in 0..self.token_count() {
            let marker = match cache.current_token_index {
                Some(current) if idx == current => '>',
                _ => ' ',
            };

            let mut tags = Vec::new();
            if cache.current_token_index.is_some_and(|current| idx < current) {
                tags.push("past");
            }
            let prefix = self.is_prefix(idx);
            if prefix {
                tags.push("prefix");
            }
            if !prefix && cache.is_cached(self.tokens(), idx) {
                tags.push("cached");
            }
            if cache.is_hit(idx) {
                tags.push("cache hit");
            }

            let _ = write!(out, "{marker}{idx:>4}  {}", self.token_text(idx));
            if !tags.is_empty() {
                let _ = write!(out, "  [{}]", tags.join(", "));
            }
            out.push('\n');
        }
        out
    }

    /// Token to `{page, slot}` mapping as of this step.
    pub fn page_table(&self) -> String {
        let mut out = String::new();
        if let Some(EventKind::PageFault(fault)) = self.current_event().map(|e| &e.kind) {
            let _ = writeln!(out, "fault: allocated Page {}", fault.page_id);
        }

        let cache = &self.snapshot.cache;
        for idx in 0..self.token_count() {
            let marker = if cache.current_token_index == Some(idx) { '>' } else { ' ' };
            let mapping = match self.snapshot.token_mapping.get(&idx) {
                Some(slot) => format!("Page {}, Slot {}", slot.page_id, slot.slot),
                None => "\u{2014}".to_string(),
            };
            let _ = write!(out, "{marker}Token {idx} \u{2192} {mapping}");
            if self.is_prefix(idx) {
                out.push_str("  [prefix]");
            }
            if cache.is_hit(idx) {
                out.push_str("  [cache hit]");
            }
            out.push('\n');
        }
        out
    }

    /// The last few events up to and including this step.
    pub fn events(&self) -> String {
        let end = (self.snapshot.step + 1).min(self.result.events.len());
        let start = end.saturating_sub(self.recent_events);
        let mut out = String::new();
        for (position, event) in self.result.events[start..end].iter().enumerate() {
            let id = event.event_id.unwrap_or((start + position) as u64);
            let details = serde_json::to_string(&event.details).unwrap_or_default();
            let _ = writeln!(out, "{:<14} #{id} {details}", event.event_type());
        }
        out
    }

    /// Narration for this step, plus a note when the step is a cache hit.
    pub fn narration(&self) -> String {
        let Some(event) = self.current_event() else {
            return "No events yet.\n".to_string();
        };

        let mut out = String::new();
        for line in event.narration.as_deref().unwrap_or("Event occurred.").lines() {
            let _ = writeln!(out, "{line}");
        }

        let cache = &self.snapshot.cache;
        if let Some(token_idx) = event.token_step() {
            let token = self.tokens().get(token_idx).map_or("", String::as_str);
            match cache.cache_hit_page_id.filter(|_| cache.cache_hit) {
                Some(page_id) => {
                    let _ = writeln!(out, "CACHE HIT: token \"{token}\" \u{2192} Page {page_id}");
                    let _ = writeln!(out, "KV reused from Page {page_id} (no recompute)");
                }
                None => {
                    let _ = writeln!(out, "NEW TOKEN: \"{token}\" (attention reads all cached KV)");
                }
            }
        }
        out
    }

    pub fn model_info(&self) -> String {
        let model = &self.result.model;
        let mut out = String::new();
        let _ = writeln!(out, "Layers: {}", model.layers);
        let _ = writeln!(out, "Heads: {}", model.heads);
        let _ = writeln!(out, "Hidden size: {}", model.hidden_size);
        let _ = writeln!(out, "Head dim: {}", model.head_dim);
        let _ = writeln!(out, "Page size: {}", self.snapshot.pages.capacity());
        out
    }

    /// Simulator-reported summary, shown verbatim.
    pub fn summary(&self) -> String {
        let summary = &self.result.summary;
        let mut out = String::new();
        let _ = writeln!(out, "Total events: {}", summary.total_events);
        let _ = writeln!(out, "Total requests: {}", summary.num_requests);
        let _ = writeln!(out, "Event breakdown:");
        for (event_type, count) in &summary.event_counts {
            let _ = writeln!(out, "  {event_type}: {count}");
        }
        out
    }

    /// All views for one step, separated by section headers.
    pub fn frame(&self) -> String {
        let max_step = self.result.events.len().saturating_sub(1);
        let mut out = format!(
            "== Step {} / {} (request {}) ==\n",
            self.snapshot.step, max_step, self.snapshot.current_request_id
        );
        let sections = [
            ("Narration", self.narration()),
            ("Pages", self.pages()),
            ("Tokens", self.tokens_list()),
            ("Page table", self.page_table()),
            ("Events", self.events()),
        ];
        for (title, body) in sections {
            let _ = write!(out, "\n-- {title} --\n{body}");
        }
        out
    }
}
