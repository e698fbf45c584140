//! Manager configuration.

/// Lower bound on stabilization passes when no explicit bound is set.
pub const DEFAULT_MIN_STABILIZATION_PASSES: usize = 16;

/// Maximum depth of a causal deletion chain.
pub const MAX_CASCADE_DEPTH: usize = 100;

/// Configuration for a [`ModelManager`](crate::ModelManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum number of recomputation passes per operation. `None` derives
    /// the bound from the live graph.
    pub max_stabilization_passes: Option<usize>,

    /// Maximum depth followed when collecting records owned through causal
    /// relations.
    pub max_cascade_depth: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_stabilization_passes: None,
            max_cascade_depth: MAX_CASCADE_DEPTH,
        }
    }
}

impl ManagerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit stabilization pass bound.
    pub fn with_max_stabilization_passes(mut self, passes: usize) -> Self {
        self.max_stabilization_passes = Some(passes);
        self
    }

    /// Set the causal deletion depth limit.
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    /// Pass bound for a graph holding `computed_entries` live computed
    /// `(record, field)` pairs.
    ///
    /// Each pass of an acyclic graph advances one step along a chain of
    /// distinct entries, so the derived bound is only reached by a cycle.
    pub fn stabilization_bound(&self, computed_entries: usize) -> usize {
        self.max_stabilization_passes
            .unwrap_or_else(|| DEFAULT_MIN_STABILIZATION_PASSES.max(computed_entries + 1))
    }
}
