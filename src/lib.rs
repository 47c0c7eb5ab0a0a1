pub mod client;
pub mod config;
pub mod render;
pub mod replay;
pub mod session;
pub mod trace;
pub mod util;

pub use client::{ClientError, SimulatorClient};
pub use config::Config;
pub use render::View;
pub use replay::{reconstruct, CacheContext, Event, EventKind, PageTable, Reconstructor, Snapshot};
pub use session::{Playback, SimulationHistory};
pub use trace::{SimulationResult, TraceError};
