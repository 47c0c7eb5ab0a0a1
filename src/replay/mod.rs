//! Event-log replay and page-table reconstruction.
//!
//! Given a simulator's ordered event log and its token list, rebuilds the paged KV
//! cache as it stood at any step: page occupancy, sharing, copy-on-write lineage,
//! freed pages, and whether the step's token was served from a prior request's cache.
//!
//! Every snapshot is a pure function of `events[0..=step]` and the tokens.

pub mod cache_context;
pub mod event;
pub mod page_table;
pub mod reconstructor;
pub mod token_key;

pub use cache_context::{CacheContext, SlotRef};
pub use event::{Event, EventKind, Layer, PageId};
pub use page_table::{PageRecord, PageStatus, PageTable};
pub use reconstructor::{reconstruct, CopyMarker, CopyRole, Reconstructor, Snapshot};
pub use token_key::TokenKey;
