use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::replay::{Event, PageId, Reconstructor};

/// Page size used when the model configuration does not carry one.
pub const DEFAULT_PAGE_SIZE: usize = 16;

/// Error loading or saving a simulation trace
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Failed to read trace {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write trace {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid trace JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Model configuration reported by the simulator (read-only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub layers: u32,
    #[serde(default)]
    pub heads: u32,
    #[serde(default)]
    pub hidden_size: u32,
    #[serde(default)]
    pub head_dim: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
}

/// Summary computed by the simulator; displayed as-is, never recomputed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub total_events: u64,
    #[serde(default)]
    pub num_requests: u64,
    #[serde(default)]
    pub event_counts: BTreeMap<String, u64>,
}

/// Final state of a page as reported by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageState {
    pub page_id: PageId,
    pub used_slots: u64,
    pub total_slots: u64,
    pub ref_count: i64,
    pub is_freed: bool,
}

/// One simulation run as returned by `POST /simulate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default, deserialize_with = "lenient_tokens")]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub summary: Summary,
    #[serde(default)]
    pub final_pages: Vec<PageId>,
    #[serde(default)]
    pub page_states: Vec<PageState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_timeline: Option<Value>,
}

impl SimulationResult {
    pub fn from_json_str(json: &str) -> Result<Self, TraceError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a trace saved by `simulate --out` (or captured from the simulator API).
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let contents = fs::read_to_string(path).map_err(|source| TraceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let result = Self::from_json_str(&contents)?;
        tracing::debug!(
            path = %path.display(),
            events = result.events.len(),
            tokens = result.tokens.len(),
            "Loaded simulation trace"
        );
        Ok(result)
    }

    pub fn save(&self, path: &Path) -> Result<(), TraceError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| TraceError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Slots per page: the model's `page_size`, else `default`.
    pub fn page_capacity(&self, default: usize) -> usize {
        self.model.page_size.unwrap_or(default)
    }

    /// Replay engine over this run's events and tokens.
    pub fn reconstructor(&self, default_page_size: usize) -> Reconstructor {
        Reconstructor::new(
            self.events.clone(),
            self.tokens.clone(),
            self.page_capacity(default_page_size),
        )
    }
}

/// Token lists occasionally carry `null` or numbers; those become empty text.
fn lenient_tokens<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|value| match value {
            Value::String(text) => text,
            _ => String::new(),
        })
        .collect())
}
