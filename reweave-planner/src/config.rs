use serde::{Deserialize, Serialize};
use std::path::Path;

/// Planner tuning knobs.
///
/// All fields have working defaults; TOML files may set any subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Decomposition depth cap for the first pass; uncapped when absent
    /// (unless `depth_step_size` supplies a starting cap).
    pub initial_max_depth: Option<usize>,
    /// Enables iterative deepening: when a pass leaves the tree empty, the
    /// depth cap grows by this step and the pass is retried.
    pub depth_step_size: Option<usize>,
    /// 0..3; gates logging of iterations, refinements, and backtracks.
    pub verbose: u8,
    /// Reject actions that reproduce an ancestor's entry state.
    pub branch_cycle_check: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            initial_max_depth: None,
            depth_step_size: None,
            verbose: 0,
            branch_cycle_check: true,
        }
    }
}

impl PlannerConfig {
    pub fn with_initial_max_depth(mut self, depth: usize) -> Self {
        self.initial_max_depth = Some(depth);
        self
    }

    pub fn with_depth_step_size(mut self, step: usize) -> Self {
        self.depth_step_size = Some(step);
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn without_branch_cycle_check(mut self) -> Self {
        self.branch_cycle_check = false;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_toml_str(&text)?)
    }
}
