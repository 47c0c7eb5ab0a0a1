//! Explicit viewer session state: run history, selection, and playback.
//!
//! Replay itself stays stateless apart from its one-step memo; everything that
//! depends on what the user picked lives here and is handed to rendering.

mod history;
mod playback;

pub use history::{common_prefix_len, LoadedSimulation, SimulationEntry, SimulationHistory};
pub use playback::{Playback, DEFAULT_PLAYBACK_INTERVAL};
