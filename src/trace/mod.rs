//! Simulator output: the result object consumed verbatim by replay and display.

mod result;

pub use result::{ModelConfig, PageState, SimulationResult, Summary, TraceError, DEFAULT_PAGE_SIZE};
