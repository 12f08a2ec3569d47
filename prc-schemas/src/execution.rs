use crate::template::ProcessTemplate;
use crate::tree::{ProgressTree, TimingTree};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionCounters {
    pub steps_completed: usize,
    pub total_steps: usize,
    pub completed_critical: usize,
    pub total_critical: usize,
}

/// Everything the engine needs to resume an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub template: ProcessTemplate,
    #[serde(default)]
    pub progress: ProgressTree,
    #[serde(default)]
    pub timing: TimingTree,
    #[serde(default)]
    pub counters: ExecutionCounters,
}

/// Body of a progress write. Always the full merged trees, never a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProgressUpdate {
    pub progress: ProgressTree,
    pub timing: TimingTree,
}
