use std::sync::Arc;

use crate::replay::Reconstructor;
use crate::trace::SimulationResult;

/// A prompt and the run the simulator produced for it.
#[derive(Debug, Clone)]
pub struct SimulationEntry {
    pub prompt: String,
    pub result: Arc<SimulationResult>,
}

/// A run chosen for viewing, with everything display needs to start at step 0.
#[derive(Debug)]
pub struct LoadedSimulation {
    pub index: usize,
    pub entry: SimulationEntry,
    /// Token positions shared with the previous run's prompt
    pub prefix_token_indices: Vec<usize>,
    pub reconstructor: Reconstructor,
}

/// Ordered history of simulation runs and which one is selected.
#[derive(Debug, Default)]
pub struct SimulationHistory {
    entries: Vec<SimulationEntry>,
    current: Option<usize>,
}

impl SimulationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SimulationEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&SimulationEntry> {
        self.current.and_then(|idx| self.entries.get(idx))
    }

    /// Append a run and select it.
    pub fn push(&mut self, prompt: impl Into<String>, result: SimulationResult) -> usize {
        self.entries.push(SimulationEntry {
            prompt: prompt.into(),
            result: Arc::new(result),
        });
        let idx = self.entries.len() - 1;
        self.current = Some(idx);
        idx
    }

    /// Remove a run, keeping the selection pointed at the same run where possible.
    ///
    /// Removing the selected run selects the first remaining one.
    pub fn remove(&mut self, idx: usize) -> Option<SimulationEntry> {
        if idx >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(idx);
        self.current = match self.current {
            _ if self.entries.is_empty() => None,
            Some(current) if current == idx => Some(0),
            Some(current) if current > idx => Some(current - 1),
            other => other,
        };
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
    }

    /// Select run `idx` and prepare it for replay. Out-of-range indices change nothing.
    pub fn select(&mut self, idx: usize, default_page_size: usize) -> Option<LoadedSimulation> {
        let entry = self.entries.get(idx)?.clone();
        self.current = Some(idx);

        let prefix_token_indices = self.prefix_token_indices(idx);
        tracing::debug!(
            index = idx,
            events = entry.result.events.len(),
            prefix = prefix_token_indices.len(),
            "Selected simulation"
        );
        let reconstructor = entry.result.reconstructor(default_page_size);
        Some(LoadedSimulation {
            index: idx,
            entry,
            prefix_token_indices,
            reconstructor,
        })
    }

    /// Positions `0..k` where run `idx` shares its first `k` tokens with run `idx - 1`.
    pub fn prefix_token_indices(&self, idx: usize) -> Vec<usize> {
        let (Some(prev), Some(curr)) = (
            idx.checked_sub(1).and_then(|p| self.entries.get(p)),
            self.entries.get(idx),
        ) else {
            return Vec::new();
        };
        (0..common_prefix_len(&prev.result.tokens, &curr.result.tokens)).collect()
    }
}

/// Length of the longest common prefix of two token lists.
pub fn common_prefix_len(a: &[String], b: &[String]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
