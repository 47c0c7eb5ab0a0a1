use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Page identifier as assigned by the simulator's page pool.
pub type PageId = u64;

/// Field names checked, in order, for the page list of a `prefix_reuse` event.
pub const PREFIX_REUSE_PAGE_FIELDS: [&str; 4] =
    ["page_ids", "pages", "reused_pages", "prefix_pages"];

/// One entry of the simulator's event log.
///
/// Decoding never fails on a bad payload: an event whose details do not fit its type
/// becomes [`EventKind::Malformed`] and still occupies its position in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireEvent", into = "WireEvent")]
pub struct Event {
    pub event_id: Option<u64>,
    pub request_id: Option<u64>,
    pub timestamp: Option<f64>,
    pub narration: Option<String>,
    /// Raw payload as received, kept for raw-log display.
    pub details: Value,
    pub kind: EventKind,
}

/// Typed event payloads, tagged by `event_type` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    RequestStart(RequestStartEvent),
    RequestEnd(RequestEndEvent),
    TokenStep(TokenStepEvent),
    KvWrite(KvWriteEvent),
    PageFault(PageFaultEvent),
    CopyOnWrite(CopyOnWriteEvent),
    PageFreed(PageFreedEvent),
    PrefixReuse(PrefixReuseEvent),
    DecodeStart(DecodeStartEvent),
    DecodeEnd,
    /// Event type this crate does not know about (forward compatibility)
    Unknown { event_type: String },
    /// Known event type whose details are missing required fields
    Malformed { event_type: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestStartEvent {
    pub request_id: Option<u64>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestEndEvent {
    pub request_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenStepEvent {
    pub token_idx: usize,
}

/// A KV write. Every field is optional on the wire; each piece of accounting uses
/// only the fields it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvWriteEvent {
    pub page_id: Option<PageId>,
    pub slot: Option<usize>,
    /// Absent on some traces; such writes count for occupancy only.
    pub token_idx: Option<usize>,
    pub layer: Layer,
}

impl KvWriteEvent {
    /// `(page_id, slot)` when both are present.
    pub fn location(&self) -> Option<(PageId, usize)> {
        Some((self.page_id?, self.slot?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFaultEvent {
    pub page_id: PageId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOnWriteEvent {
    pub source_page_id: PageId,
    pub new_page_id: PageId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFreedEvent {
    pub page_id: PageId,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrefixReuseEvent {
    pub page_ids: Vec<PageId>,
    pub num_pages: Option<u64>,
    pub prefix_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodeStartEvent {
    pub num_pages: Option<u64>,
}

/// Attention layer a KV write belongs to.
///
/// Only one representative layer is tracked; every other layer is a replica of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layer {
    #[default]
    Unspecified,
    Index(u64),
    /// Present but not a non-negative integer
    Unrecognized,
}

impl Layer {
    /// Whether writes on this layer are counted for page and cache accounting.
    pub fn is_tracked(&self) -> bool {
        matches!(self, Layer::Unspecified | Layer::Index(0))
    }
}

impl Event {
    /// Build an event from a typed payload, synthesizing the wire `details`.
    pub fn new(kind: EventKind) -> Self {
        let details = kind.to_details();
        Self {
            event_id: None,
            request_id: None,
            timestamp: None,
            narration: None,
            details,
            kind,
        }
    }

    pub fn with_id(mut self, event_id: u64) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = Some(narration.into());
        self
    }

    pub fn event_type(&self) -> &str {
        self.kind.event_type()
    }

    /// The tracked-layer write carried by this event, if any.
    pub fn tracked_write(&self) -> Option<&KvWriteEvent> {
        match &self.kind {
            EventKind::KvWrite(write) if write.layer.is_tracked() => Some(write),
            _ => None,
        }
    }

    /// Token index of a `token_step` event.
    pub fn token_step(&self) -> Option<usize> {
        match &self.kind {
            EventKind::TokenStep(step) => Some(step.token_idx),
            _ => None,
        }
    }
}

impl EventKind {
    /// Wire name of this event's type.
    pub fn event_type(&self) -> &str {
        match self {
            EventKind::RequestStart(_) => "request_start",
            EventKind::RequestEnd(_) => "request_end",
            EventKind::TokenStep(_) => "token_step",
            EventKind::KvWrite(_) => "kv_write",
            EventKind::PageFault(_) => "page_fault",
            EventKind::CopyOnWrite(_) => "copy_on_write",
            EventKind::PageFreed(_) => "page_freed",
            EventKind::PrefixReuse(_) => "prefix_reuse",
            EventKind::DecodeStart(_) => "decode_start",
            EventKind::DecodeEnd => "decode_end",
            EventKind::Unknown { event_type } => event_type.as_str(),
            EventKind::Malformed { event_type, .. } => event_type.as_str(),
        }
    }

    /// Decode a payload for `event_type`.
    pub fn decode(event_type: &str, details: &Value) -> Self {
        let malformed = |field: &str| EventKind::Malformed {
            event_type: event_type.to_string(),
            reason: format!("missing or non-integer `{field}`"),
        };

        match event_type {
            "request_start" => EventKind::RequestStart(RequestStartEvent {
                request_id: uint_field(details, "request_id"),
                prompt: str_field(details, "prompt"),
            }),
            "request_end" => EventKind::RequestEnd(RequestEndEvent {
                request_id: uint_field(details, "request_id"),
            }),
            "token_step" => match index_field(details, "token_idx") {
                Some(token_idx) => EventKind::TokenStep(TokenStepEvent { token_idx }),
                None => malformed("token_idx"),
            },
            "kv_write" => EventKind::KvWrite(KvWriteEvent {
                page_id: uint_field(details, "page_id"),
                slot: index_field(details, "slot"),
                token_idx: index_field(details, "token_idx"),
                layer: layer_field(details),
            }),
            "page_fault" => match uint_field(details, "page_id") {
                Some(page_id) => EventKind::PageFault(PageFaultEvent { page_id }),
                None => malformed("page_id"),
            },
            "copy_on_write" => {
                let Some(source_page_id) = uint_field(details, "source_page_id") else {
                    return malformed("source_page_id");
                };
                let Some(new_page_id) = uint_field(details, "new_page_id") else {
                    return malformed("new_page_id");
                };
                EventKind::CopyOnWrite(CopyOnWriteEvent {
                    source_page_id,
                    new_page_id,
                })
            }
            "page_freed" => match uint_field(details, "page_id") {
                Some(page_id) => EventKind::PageFreed(PageFreedEvent { page_id }),
                None => malformed("page_id"),
            },
            "prefix_reuse" => EventKind::PrefixReuse(PrefixReuseEvent {
                page_ids: prefix_reuse_pages(details),
                num_pages: uint_field(details, "num_pages"),
                prefix_key: str_field(details, "prefix_key"),
            }),
            "decode_start" => EventKind::DecodeStart(DecodeStartEvent {
                num_pages: uint_field(details, "num_pages"),
            }),
            "decode_end" => EventKind::DecodeEnd,
            other => EventKind::Unknown {
                event_type: other.to_string(),
            },
        }
    }

    /// Wire `details` object for this payload.
    pub fn to_details(&self) -> Value {
        let mut map = Map::new();
        match self {
            EventKind::RequestStart(e) => {
                insert_opt(&mut map, "request_id", e.request_id);
                insert_opt(&mut map, "prompt", e.prompt.clone());
            }
            EventKind::RequestEnd(e) => insert_opt(&mut map, "request_id", e.request_id),
            EventKind::TokenStep(e) => {
                map.insert("token_idx".into(), json!(e.token_idx));
            }
            EventKind::KvWrite(e) => {
                insert_opt(&mut map, "page_id", e.page_id);
                insert_opt(&mut map, "slot", e.slot);
                insert_opt(&mut map, "token_idx", e.token_idx);
                if let Layer::Index(layer) = e.layer {
                    map.insert("layer".into(), json!(layer));
                }
            }
            EventKind::PageFault(e) => {
                map.insert("page_id".into(), json!(e.page_id));
            }
            EventKind::CopyOnWrite(e) => {
                map.insert("source_page_id".into(), json!(e.source_page_id));
                map.insert("new_page_id".into(), json!(e.new_page_id));
            }
            EventKind::PageFreed(e) => {
                map.insert("page_id".into(), json!(e.page_id));
            }
            EventKind::PrefixReuse(e) => {
                map.insert("page_ids".into(), json!(e.page_ids));
                insert_opt(&mut map, "num_pages", e.num_pages);
                insert_opt(&mut map, "prefix_key", e.prefix_key.clone());
            }
            EventKind::DecodeStart(e) => insert_opt(&mut map, "num_pages", e.num_pages),
            EventKind::DecodeEnd | EventKind::Unknown { .. } | EventKind::Malformed { .. } => {}
        }
        Value::Object(map)
    }

    /// Whether this event can change the page table.
    pub fn touches_pages(&self) -> bool {
        match self {
            EventKind::KvWrite(write) => write.layer.is_tracked(),
            EventKind::PageFault(_)
            | EventKind::CopyOnWrite(_)
            | EventKind::PageFreed(_)
            | EventKind::PrefixReuse(_) => true,
            _ => false,
        }
    }
}

fn insert_opt<T: Serialize>(map: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        map.insert(key.to_string(), json!(value));
    }
}

/// Interpret a JSON value as a non-negative integer. Integral floats are accepted.
fn as_uint(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    (f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}

fn uint_field(details: &Value, field: &str) -> Option<u64> {
    details.get(field).and_then(as_uint)
}

fn index_field(details: &Value, field: &str) -> Option<usize> {
    uint_field(details, field).and_then(|n| usize::try_from(n).ok())
}

fn str_field(details: &Value, field: &str) -> Option<String> {
    details.get(field).and_then(Value::as_str).map(str::to_string)
}

fn layer_field(details: &Value) -> Layer {
    let raw = ["layer", "layer_idx"]
        .into_iter()
        .filter_map(|field| details.get(field))
        .find(|value| !value.is_null());
    match raw {
        None => Layer::Unspecified,
        Some(value) => as_uint(value).map_or(Layer::Unrecognized, Layer::Index),
    }
}

fn prefix_reuse_pages(details: &Value) -> Vec<PageId> {
    PREFIX_REUSE_PAGE_FIELDS
        .iter()
        .find_map(|field| details.get(*field).and_then(Value::as_array))
        .map(|ids| ids.iter().filter_map(as_uint).collect())
        .unwrap_or_default()
}

/// Event as it appears in the simulator's JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEvent {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    event_id: Value,
    #[serde(default)]
    event_type: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    timestamp: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    request_id: Value,
    #[serde(default)]
    details: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    narration: Value,
}

impl From<WireEvent> for Event {
    fn from(wire: WireEvent) -> Self {
        let event_type = wire.event_type.as_str().unwrap_or_default();
        let kind = EventKind::decode(event_type, &wire.details);
        if let EventKind::Malformed { event_type, reason } = &kind {
            tracing::debug!(event_type = %event_type, reason = %reason, "Decoded malformed event");
        }
        Self {
            event_id: as_uint(&wire.event_id),
            request_id: as_uint(&wire.request_id),
            timestamp: wire.timestamp.as_f64(),
            narration: wire.narration.as_str().map(str::to_string),
            details: wire.details,
            kind,
        }
    }
}

impl From<Event> for WireEvent {
    fn from(event: Event) -> Self {
        Self {
            event_type: Value::String(event.event_type().to_string()),
            event_id: event.event_id.map_or(Value::Null, |id| json!(id)),
            timestamp: event.timestamp.map_or(Value::Null, |ts| json!(ts)),
            request_id: event.request_id.map_or(Value::Null, |id| json!(id)),
            narration: event.narration.map_or(Value::Null, Value::String),
            details: event.details,
        }
    }
}
