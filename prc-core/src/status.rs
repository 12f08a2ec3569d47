//! Three-state status of a navigable unit.
//!
//! Data and approvals are separate gates: a unit whose data is complete but
//! whose approvals are missing never reads as completed.

use prc_schemas::template::StepKind;
use prc_schemas::tree::{Key, ProgressTree, StatusFlag};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in-progress",
            StepStatus::Completed => "completed",
        })
    }
}

/// Which approvals a unit needs before it counts as completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatePolicy {
    pub production_approval: bool,
    pub ctq_approval: bool,
    pub completion_flag: bool,
}

impl GatePolicy {
    pub const NONE: GatePolicy = GatePolicy {
        production_approval: false,
        ctq_approval: false,
        completion_flag: false,
    };

    pub fn for_kind(kind: StepKind, is_critical: bool, escalated: bool) -> Self {
        match kind {
            StepKind::RawMaterials => Self::NONE,
            StepKind::CatalystMixing => GatePolicy {
                production_approval: escalated,
                ..Self::NONE
            },
            StepKind::Sequence | StepKind::Inspection => GatePolicy {
                production_approval: true,
                ctq_approval: is_critical,
                completion_flag: true,
            },
        }
    }

    pub fn accepts(&self, flag: StatusFlag) -> bool {
        match flag {
            StatusFlag::ProductionApproved => self.production_approval,
            StatusFlag::CtqApproved | StatusFlag::PartialCtqApproved => self.ctq_approval,
            StatusFlag::StepCompleted => self.completion_flag,
        }
    }
}

/// The gate inputs read for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitGates {
    pub all_data_filled: bool,
    pub all_approvals_granted: bool,
    pub step_completed: bool,
}

impl UnitGates {
    pub fn read(
        progress: &ProgressTree,
        unit: &[Key],
        leaf_ids: &[Key],
        policy: GatePolicy,
    ) -> Self {
        let all_data_filled = all_data_filled(progress, unit, leaf_ids);
        let production = !policy.production_approval
            || progress.flag(unit, StatusFlag::ProductionApproved);
        let ctq = !policy.ctq_approval
            || progress.flag(unit, StatusFlag::CtqApproved)
            || progress.flag(unit, StatusFlag::PartialCtqApproved);
        let step_completed =
            !policy.completion_flag || progress.flag(unit, StatusFlag::StepCompleted);

        Self {
            all_data_filled,
            all_approvals_granted: production && ctq,
            step_completed,
        }
    }

    pub fn ready_for_completion(&self) -> bool {
        self.all_data_filled && self.all_approvals_granted
    }

    /// Status before first-pending promotion, which needs the whole timeline.
    pub fn status(&self) -> StepStatus {
        if self.ready_for_completion() && self.step_completed {
            StepStatus::Completed
        } else if self.ready_for_completion() {
            StepStatus::InProgress
        } else {
            StepStatus::Pending
        }
    }
}

/// Every expected leaf has captured data. A unit with nothing to capture is
/// never considered filled.
pub fn all_data_filled(progress: &ProgressTree, unit: &[Key], leaf_ids: &[Key]) -> bool {
    !leaf_ids.is_empty() && leaf_ids.iter().all(|key| progress.has_value(unit, key))
}
