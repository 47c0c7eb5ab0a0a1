use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::cache_context::{current_request_id, CacheContext, SlotRef};
use super::event::{Event, EventKind, KvWriteEvent, PageId};
use super::page_table::{PageRecord, PageTable};

/// Full memory state after replaying `events[0..=step]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Step the snapshot was taken at, after clamping
    pub step: usize,
    pub pages: PageTable,
    pub cache: CacheContext,
    /// Latest tracked `{page, slot}` written for each token index
    pub token_mapping: BTreeMap<usize, SlotRef>,
    /// Tracked write performed by the event at `step`, if any
    pub just_written: Option<SlotRef>,
    pub last_copy_on_write: Option<CopyMarker>,
    pub current_request_id: u64,
}

/// Most recent copy-on-write seen in the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CopyMarker {
    pub source_page_id: PageId,
    pub new_page_id: PageId,
    pub step: usize,
}

impl Snapshot {
    fn empty(page_capacity: usize) -> Self {
        Self {
            step: 0,
            pages: PageTable::new(page_capacity),
            cache: CacheContext::default(),
            token_mapping: BTreeMap::new(),
            just_written: None,
            last_copy_on_write: None,
            current_request_id: 0,
        }
    }

    pub fn page(&self, id: PageId) -> Option<&PageRecord> {
        self.pages.get(id)
    }

    /// Whether `page_id` took part in a copy-on-write within `window` steps of this one.
    pub fn copy_role(&self, page_id: PageId, window: usize) -> Option<CopyRole> {
        let marker = self.last_copy_on_write?;
        if self.step - marker.step > window {
            return None;
        }
        if page_id == marker.source_page_id {
            Some(CopyRole::Source)
        } else if page_id == marker.new_page_id {
            Some(CopyRole::Target)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyRole {
    Source,
    Target,
}

/// Replay `events[0..=step]` and return the resulting state.
///
/// `step` is clamped to the last event; an empty log yields an empty snapshot at step 0.
/// Nothing after `step` is read.
pub fn reconstruct(
    events: &[Event],
    tokens: &[String],
    page_capacity: usize,
    step: usize,
) -> Snapshot {
    let Some(last) = events.len().checked_sub(1) else {
        return Snapshot::empty(page_capacity);
    };
    let step = step.min(last);
    let prefix = &events[..=step];

    let mut pages = PageTable::new(page_capacity);
    let mut token_mapping = BTreeMap::new();
    let mut last_copy_on_write = None;
    for (index, event) in prefix.iter().enumerate() {
        pages.apply(&event.kind);

        match &event.kind {
            EventKind::KvWrite(write) if write.layer.is_tracked() => {
                if let (Some(token_idx), Some((page_id, slot))) =
                    (write.token_idx, write.location())
                {
                    token_mapping.insert(token_idx, SlotRef { page_id, slot });
                }
            }
            EventKind::CopyOnWrite(cow) => {
                last_copy_on_write = Some(CopyMarker {
                    source_page_id: cow.source_page_id,
                    new_page_id: cow.new_page_id,
                    step: index,
                });
            }
            _ => {}
        }
    }

    let just_written = prefix[step]
        .tracked_write()
        .and_then(KvWriteEvent::location)
        .map(|(page_id, slot)| SlotRef { page_id, slot });

    Snapshot {
        step,
        pages,
        cache: CacheContext::build(prefix, tokens),
        token_mapping,
        just_written,
        last_copy_on_write,
        current_request_id: current_request_id(prefix),
    }
}

/// Replays one simulation run, remembering only the most recent step.
///
/// Playback usually walks forward one step at a time and re-renders several views
/// per step, so a single slot is enough.
#[derive(Debug)]
pub struct Reconstructor {
    events: Arc<[Event]>,
    tokens: Arc<[String]>,
    page_capacity: usize,
    memo: Option<Arc<Snapshot>>,
}

impl Reconstructor {
    pub fn new(
        events: impl Into<Arc<[Event]>>,
        tokens: impl Into<Arc<[String]>>,
        page_capacity: usize,
    ) -> Self {
        Self {
            events: events.into(),
            tokens: tokens.into(),
            page_capacity,
            memo: None,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn page_capacity(&self) -> usize {
        self.page_capacity
    }

    /// Number of addressable steps (one per event).
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Last valid step, or 0 for an empty run.
    pub fn max_step(&self) -> usize {
        self.events.len().saturating_sub(1)
    }

    /// Event at `step`, if the run has one.
    pub fn event(&self, step: usize) -> Option<&Event> {
        self.events.get(step)
    }

    /// Snapshot at `step` (clamped). Asking for the same step twice in a row returns
    /// the same shared snapshot.
    pub fn snapshot(&mut self, step: usize) -> Arc<Snapshot> {
        let step = step.min(self.max_step());
        if let Some(memo) = self.memo.as_ref().filter(|memo| memo.step == step) {
            return Arc::clone(memo);
        }

        let snapshot = Arc::new(reconstruct(
            &self.events,
            &self.tokens,
            self.page_capacity,
            step,
        ));
        tracing::trace!(step, pages = snapshot.pages.len(), "Reconstructed snapshot");
        self.memo = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Drop the memoized snapshot.
    pub fn invalidate(&mut self) {
        self.memo = None;
    }
}
