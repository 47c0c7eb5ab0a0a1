//! Page records and the page-lifecycle transition function.

use std::collections::BTreeMap;

use serde::Serialize;

use super::event::{CopyOnWriteEvent, EventKind, KvWriteEvent, PageId, PrefixReuseEvent};

/// One allocated unit of KV storage as seen at a point in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    pub id: PageId,
    /// Slot count, fixed at creation
    pub capacity: usize,
    /// High-water mark of written slots; never shrinks
    pub used_slots: usize,
    pub ref_count: u32,
    /// Terminal once set
    pub freed: bool,
    /// Source page when this page was born from a copy-on-write
    pub copied_from: Option<PageId>,
}

impl PageRecord {
    fn new(id: PageId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            used_slots: 0,
            ref_count: 1,
            freed: false,
            copied_from: None,
        }
    }

    /// Shared by more than one logical owner.
    pub fn is_shared(&self) -> bool {
        self.ref_count > 1
    }

    pub fn status(&self) -> PageStatus {
        if self.freed {
            PageStatus::Freed
        } else if self.is_shared() {
            PageStatus::Shared
        } else {
            PageStatus::Allocated
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Allocated,
    Shared,
    Freed,
}

impl PageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PageStatus::Allocated => "allocated",
            PageStatus::Shared => "shared",
            PageStatus::Freed => "freed",
        }
    }
}

/// Page table rebuilt by replaying events in log order.
///
/// Records are never removed; freed pages stay visible with `freed = true`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PageTable {
    capacity: usize,
    pages: BTreeMap<PageId, PageRecord>,
}

impl PageTable {
    /// Empty table whose pages hold `capacity` slots each.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pages: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, id: PageId) -> Option<&PageRecord> {
        self.pages.get(&id)
    }

    /// Pages in ascending id order.
    pub fn pages(&self) -> impl Iterator<Item = &PageRecord> {
        self.pages.values()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn into_pages(self) -> BTreeMap<PageId, PageRecord> {
        self.pages
    }

    /// Apply one event's effect. Events that do not touch pages are ignored.
    pub fn apply(&mut self, kind: &EventKind) {
        match kind {
            EventKind::PageFault(fault) => {
                self.ensure(fault.page_id);
            }
            EventKind::KvWrite(write) if write.layer.is_tracked() => self.record_write(write),
            EventKind::CopyOnWrite(cow) => self.copy_on_write(cow),
            EventKind::PageFreed(freed) => {
                if let Some(page) = self.pages.get_mut(&freed.page_id) {
                    page.freed = true;
                }
            }
            EventKind::PrefixReuse(reuse) => self.prefix_reuse(reuse),
            _ => {}
        }
    }

    fn ensure(&mut self, id: PageId) -> &mut PageRecord {
        let capacity = self.capacity;
        self.pages
            .entry(id)
            .or_insert_with(|| PageRecord::new(id, capacity))
    }

    /// A write without a page id is ignored; one without a slot only creates the page.
    fn record_write(&mut self, write: &KvWriteEvent) {
        let Some(page_id) = write.page_id else {
            return;
        };
        let page = self.ensure(page_id);
        let Some(slot) = write.slot else {
            return;
        };
        let high_water = slot.saturating_add(1);
        if high_water > page.capacity {
            tracing::debug!(
                page_id,
                slot,
                capacity = page.capacity,
                "KV write beyond page capacity; clamping occupancy"
            );
        }
        page.used_slots = page.used_slots.max(high_water.min(page.capacity));
    }

    fn copy_on_write(&mut self, cow: &CopyOnWriteEvent) {
        let source = self.ensure(cow.source_page_id);
        source.ref_count = 1;
        let used_slots = source.used_slots;

        if !self.pages.contains_key(&cow.new_page_id) {
            let mut copy = PageRecord::new(cow.new_page_id, self.capacity);
            copy.used_slots = used_slots;
            copy.copied_from = Some(cow.source_page_id);
            self.pages.insert(cow.new_page_id, copy);
        }
    }

    fn prefix_reuse(&mut self, reuse: &PrefixReuseEvent) {
        for &id in &reuse.page_ids {
            let page = self.ensure(id);
            page.ref_count = page.ref_count.saturating_add(1).max(2);
        }
    }
}
