//! Ordered, navigable execution steps derived from a template and its progress.
//!
//! Nothing here is persisted. Statuses are recomputed from the progress tree
//! every time the timeline is built.

use crate::capture::captured_conditions;
use crate::catalyst;
use crate::status::{GatePolicy, StepStatus, UnitGates};
use crate::timing::{self, TimingSummary};
use prc_schemas::{
    execution::ExecutionCounters,
    template::{
        CatalystMixingSpec, InspectionSpec, ProcessTemplate, RawMaterialsSpec, StepGroup,
        StepKind, StepPayload, SubStep, TemplateStep,
    },
    tree::{Key, ProgressTree, TimingTree},
};
use serde::Serialize;
use std::fmt;

/// Address of a navigable unit in the progress tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitRef {
    pub step_id: u32,
    pub group_id: Option<u32>,
}

impl UnitRef {
    pub fn step(step_id: u32) -> Self {
        Self {
            step_id,
            group_id: None,
        }
    }

    pub fn group(step_id: u32, group_id: u32) -> Self {
        Self {
            step_id,
            group_id: Some(group_id),
        }
    }

    pub fn path(&self) -> Vec<Key> {
        let mut path = vec![Key::Id(self.step_id)];
        if let Some(group_id) = self.group_id {
            path.push(Key::Id(group_id));
        }
        path
    }
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.group_id {
            Some(group_id) => write!(f, "{}/{}", self.step_id, group_id),
            None => write!(f, "{}", self.step_id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubStepEntry<'a> {
    pub sub_step: &'a SubStep,
    pub filled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupEntry<'a> {
    pub group: &'a StepGroup,
    pub sub_steps: Vec<SubStepEntry<'a>>,
    pub timing: TimingSummary,
}

impl GroupEntry<'_> {
    /// Where an operator resumes work on this group.
    pub fn first_unfilled(&self) -> Option<u32> {
        self.sub_steps
            .iter()
            .find(|entry| !entry.filled)
            .map(|entry| entry.sub_step.id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelinePayload<'a> {
    RawMaterials(&'a RawMaterialsSpec),
    CatalystMixing {
        spec: &'a CatalystMixingSpec,
        escalated: bool,
    },
    Sequence(GroupEntry<'a>),
    Inspection(&'a InspectionSpec),
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineStep<'a> {
    pub step_number: usize,
    pub unit: UnitRef,
    pub kind: StepKind,
    pub title: String,
    pub status: StepStatus,
    pub is_critical: bool,
    #[serde(skip)]
    pub gates: UnitGates,
    #[serde(skip)]
    pub policy: GatePolicy,
    pub payload: TimelinePayload<'a>,
}

impl<'a> TimelineStep<'a> {
    pub fn group(&self) -> Option<&GroupEntry<'a>> {
        match &self.payload {
            TimelinePayload::Sequence(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn data_filled(&self) -> bool {
        self.gates.all_data_filled
    }
}

fn kind_rank(kind: StepKind) -> u8 {
    match kind {
        StepKind::RawMaterials => 0,
        StepKind::CatalystMixing => 1,
        StepKind::Sequence | StepKind::Inspection => 2,
    }
}

/// Template steps in execution order: raw materials, catalyst mixing, then
/// the rest by their `sequence` field. Ties keep declared order.
pub fn ordered_steps(template: &ProcessTemplate) -> Vec<&TemplateStep> {
    let mut steps: Vec<&TemplateStep> = template.steps.iter().collect();
    steps.sort_by_key(|step| (kind_rank(step.kind()), step.sequence));
    steps
}

/// Ids of every leaf a unit has to capture.
pub fn leaf_ids(step: &TemplateStep, group: Option<&StepGroup>) -> Vec<Key> {
    match (&step.payload, group) {
        (StepPayload::RawMaterials(spec), _) => spec.lines.iter().map(|l| Key::Id(l.id)).collect(),
        (StepPayload::CatalystMixing(spec), _) => {
            spec.lines.iter().map(|l| Key::Id(l.id)).collect()
        }
        (StepPayload::Sequence(_), group) => group
            .map(|g| g.sub_steps.iter().map(|s| Key::Id(s.id)).collect())
            .unwrap_or_default(),
        (StepPayload::Inspection(spec), _) => {
            spec.parameters.iter().map(|p| Key::Id(p.id)).collect()
        }
    }
}

/// Whether the conditions captured for a catalyst step fall in a band that
/// asks for production sign-off.
pub fn catalyst_escalated(
    step_id: u32,
    spec: &CatalystMixingSpec,
    progress: &ProgressTree,
) -> bool {
    captured_conditions(progress, step_id)
        .and_then(|conditions| catalyst::find_band(&spec.bands, conditions))
        .is_some_and(|(_, band)| band.requires_approval)
}

pub fn build_timeline<'a>(
    template: &'a ProcessTemplate,
    progress: &ProgressTree,
    timing: &TimingTree,
) -> Vec<TimelineStep<'a>> {
    let mut steps = Vec::new();

    for step in ordered_steps(template) {
        match &step.payload {
            StepPayload::RawMaterials(spec) => {
                let unit = UnitRef::step(step.id);
                let policy = GatePolicy::for_kind(StepKind::RawMaterials, false, false);
                let gates = UnitGates::read(progress, &unit.path(), &leaf_ids(step, None), policy);
                let payload = TimelinePayload::RawMaterials(spec);
                steps.push(entry(step, unit, step.title.clone(), false, gates, policy, payload));
            }
            StepPayload::CatalystMixing(spec) => {
                let unit = UnitRef::step(step.id);
                let escalated = catalyst_escalated(step.id, spec, progress);
                let policy = GatePolicy::for_kind(StepKind::CatalystMixing, false, escalated);
                let gates = UnitGates::read(progress, &unit.path(), &leaf_ids(step, None), policy);
                steps.push(entry(
                    step,
                    unit,
                    step.title.clone(),
                    false,
                    gates,
                    policy,
                    TimelinePayload::CatalystMixing { spec, escalated },
                ));
            }
            StepPayload::Sequence(spec) => {
                for group in &spec.groups {
                    let unit = UnitRef::group(step.id, group.id);
                    let path = unit.path();
                    let critical = group.is_critical();
                    let policy = GatePolicy::for_kind(StepKind::Sequence, critical, false);
                    let leaves = leaf_ids(step, Some(group));
                    let gates = UnitGates::read(progress, &path, &leaves, policy);
                    let sub_steps = group
                        .sub_steps
                        .iter()
                        .map(|sub_step| SubStepEntry {
                            sub_step,
                            filled: progress.has_value(&path, &Key::Id(sub_step.id)),
                        })
                        .collect();
                    let timing = timing::summarize_unit(
                        timing,
                        &path,
                        group.sub_steps.iter().map(|s| s.id),
                        group.expected_duration_seconds,
                    );
                    let payload = TimelinePayload::Sequence(GroupEntry {
                        group,
                        sub_steps,
                        timing,
                    });
                    let title = group.name.clone();
                    steps.push(entry(step, unit, title, critical, gates, policy, payload));
                }
            }
            StepPayload::Inspection(spec) => {
                let unit = UnitRef::step(step.id);
                let critical = spec.parameters.iter().any(|p| p.is_critical);
                let policy = GatePolicy::for_kind(StepKind::Inspection, critical, false);
                let gates = UnitGates::read(progress, &unit.path(), &leaf_ids(step, None), policy);
                let payload = TimelinePayload::Inspection(spec);
                steps.push(entry(step, unit, step.title.clone(), critical, gates, policy, payload));
            }
        }
    }

    for (index, step) in steps.iter_mut().enumerate() {
        step.step_number = index + 1;
    }
    // Promotion only applies while nothing is completed.
    if !steps.iter().any(|s| s.status == StepStatus::Completed) {
        if let Some(current) = steps.iter_mut().find(|s| s.status == StepStatus::Pending) {
            current.status = StepStatus::InProgress;
        }
    }
    steps
}

fn entry<'a>(
    step: &TemplateStep,
    unit: UnitRef,
    title: String,
    is_critical: bool,
    gates: UnitGates,
    policy: GatePolicy,
    payload: TimelinePayload<'a>,
) -> TimelineStep<'a> {
    TimelineStep {
        step_number: 0,
        unit,
        kind: step.kind(),
        title,
        status: gates.status(),
        is_critical,
        gates,
        policy,
        payload,
    }
}

pub fn counters(steps: &[TimelineStep<'_>]) -> ExecutionCounters {
    let completed = |s: &&TimelineStep<'_>| s.status == StepStatus::Completed;
    ExecutionCounters {
        steps_completed: steps.iter().filter(completed).count(),
        total_steps: steps.len(),
        completed_critical: steps.iter().filter(|s| s.is_critical).filter(completed).count(),
        total_critical: steps.iter().filter(|s| s.is_critical).count(),
    }
}
