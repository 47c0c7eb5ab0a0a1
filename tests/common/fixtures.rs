//! Event and trace fixtures

use std::path::{Path, PathBuf};

use kvtrace::replay::event::{
    CopyOnWriteEvent, KvWriteEvent, Layer, PageFaultEvent, PageFreedEvent, PageId,
    PrefixReuseEvent, RequestStartEvent, TokenStepEvent,
};
use kvtrace::{Event, EventKind, SimulationResult};

pub fn request_start(request_id: u64) -> Event {
    Event::new(EventKind::RequestStart(RequestStartEvent {
        request_id: Some(request_id),
        prompt: None,
    }))
}

pub fn token_step(token_idx: usize) -> Event {
    Event::new(EventKind::TokenStep(TokenStepEvent { token_idx }))
}

pub fn page_fault(page_id: PageId) -> Event {
    Event::new(EventKind::PageFault(PageFaultEvent { page_id }))
}

/// Tracked (layer 0) write of `token_idx` into `page_id`/`slot`
pub fn kv_write(token_idx: usize, page_id: PageId, slot: usize) -> Event {
    kv_write_on_layer(token_idx, page_id, slot, 0)
}

pub fn kv_write_on_layer(token_idx: usize, page_id: PageId, slot: usize, layer: u64) -> Event {
    Event::new(EventKind::KvWrite(KvWriteEvent {
        page_id: Some(page_id),
        slot: Some(slot),
        token_idx: Some(token_idx),
        layer: Layer::Index(layer),
    }))
}

/// Tracked write that names its page but not the slot
pub fn kv_write_without_slot(token_idx: usize, page_id: PageId) -> Event {
    Event::new(EventKind::KvWrite(KvWriteEvent {
        page_id: Some(page_id),
        slot: None,
        token_idx: Some(token_idx),
        layer: Layer::Index(0),
    }))
}

pub fn copy_on_write(source_page_id: PageId, new_page_id: PageId) -> Event {
    Event::new(EventKind::CopyOnWrite(CopyOnWriteEvent {
        source_page_id,
        new_page_id,
    }))
}

pub fn page_freed(page_id: PageId) -> Event {
    Event::new(EventKind::PageFreed(PageFreedEvent { page_id }))
}

pub fn prefix_reuse(page_ids: &[PageId]) -> Event {
    Event::new(EventKind::PrefixReuse(PrefixReuseEvent {
        page_ids: page_ids.to_vec(),
        ..Default::default()
    }))
}

pub fn tokens(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Simulator response for "you are" followed by a second request re-reading it.
pub const TWO_REQUEST_TRACE: &str = r#"{
    "model": {"layers": 6, "heads": 12, "hidden_size": 768, "head_dim": 64, "page_size": 4},
    "tokens": ["you", "are"],
    "events": [
        {"event_id": 1, "event_type": "request_start", "request_id": 1,
         "details": {"request_id": 1, "prompt": "you are"}, "narration": "Request 1 begins"},
        {"event_id": 2, "event_type": "token_step", "details": {"token_idx": 0}},
        {"event_id": 3, "event_type": "page_fault", "details": {"page_id": 0}},
        {"event_id": 4, "event_type": "kv_write", "details": {"page_id": 0, "slot": 0, "token_idx": 0, "layer": 0}},
        {"event_id": 5, "event_type": "kv_write", "details": {"page_id": 0, "slot": 0, "token_idx": 0, "layer": 1}},
        {"event_id": 6, "event_type": "token_step", "details": {"token_idx": 1}},
        {"event_id": 7, "event_type": "kv_write", "details": {"page_id": 0, "slot": 1, "token_idx": 1, "layer": 0}},
        {"event_id": 8, "event_type": "request_end", "details": {"request_id": 1}},
        {"event_id": 9, "event_type": "request_start", "request_id": 2,
         "details": {"request_id": 2, "prompt": "you are"}},
        {"event_id": 10, "event_type": "prefix_reuse", "details": {"page_ids": [0], "num_pages": 1}},
        {"event_id": 11, "event_type": "token_step", "details": {"token_idx": 0},
         "narration": "Token 0 is already cached"}
    ],
    "summary": {"total_events": 11, "num_requests": 2,
                "event_counts": {"request_start": 2, "token_step": 3, "kv_write": 3}},
    "final_pages": [0],
    "page_states": [{"page_id": 0, "used_slots": 2, "total_slots": 4, "ref_count": 2, "is_freed": false}]
}"#;

pub fn two_request_trace() -> SimulationResult {
    SimulationResult::from_json_str(TWO_REQUEST_TRACE).expect("fixture trace should parse")
}

/// Write `json` to `dir/name` and return the path
pub fn write_trace(dir: &Path, name: &str, json: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, json).expect("Failed to write trace fixture");
    path
}
