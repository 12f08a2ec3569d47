//! Operator-facing state machine over one execution.
//!
//! The controller owns an in-memory snapshot of the progress and timing
//! trees. Every mutation updates the snapshot first and then writes the full
//! trees to the store; a failed write leaves the snapshot in place and marks
//! the session dirty until `retry_save` succeeds.

pub mod builder;
pub mod session;

pub use builder::ControllerBuilder;
pub use session::{AckKey, Clock, SystemClock, View};

use crate::{
    capture::{self, Submission},
    catalyst::{self, CatalystEvaluation},
    error::{FieldError, FieldErrorKind, PrcError},
    logger::AuditLogger,
    merge,
    status::{GatePolicy, StepStatus, UnitGates},
    store::ExecutionStore,
    timeline::{self, GroupEntry, TimelineStep, UnitRef},
};
use chrono::{DateTime, Utc};
use prc_schemas::{
    environment::AmbientConditions,
    execution::{ExecutionCounters, ProgressUpdate},
    template::{ProcessTemplate, StepGroup, StepPayload, TemplateStep},
    tree::{Key, Node, ProgressTree, StatusFlag, TimingSpan, TimingTree, Tree, Value},
};
use serde::Serialize;
use session::Session;
use std::sync::Arc;

pub struct ExecutionController {
    execution_id: String,
    template: ProcessTemplate,
    progress: ProgressTree,
    timing: TimingTree,
    session: Session,
    store: Arc<dyn ExecutionStore>,
    clock: Arc<dyn Clock>,
    audit: Option<AuditLogger>,
}

/// Owned facts about one timeline entry, read before mutating the session.
#[derive(Debug, Clone, Copy)]
struct UnitInfo {
    unit: UnitRef,
    status: StepStatus,
    gates: UnitGates,
    policy: GatePolicy,
    first_unfilled: Option<u32>,
}

/// A failed save is reported before a failed audit row, which is then only
/// logged.
fn save_then_audit(
    saved: Result<(), PrcError>,
    audited: Result<(), PrcError>,
) -> Result<(), PrcError> {
    match (saved, audited) {
        (Err(saved), Err(audited)) => {
            tracing::error!(error = %audited, "audit row lost after a failed save");
            Err(saved)
        }
        (saved, audited) => saved.and(audited),
    }
}

fn not_ready_reason(gates: &UnitGates) -> String {
    if !gates.all_data_filled {
        "captured data is incomplete".to_string()
    } else if !gates.all_approvals_granted {
        "required approvals are missing".to_string()
    } else {
        "the step has not been marked complete".to_string()
    }
}

impl ExecutionController {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn template(&self) -> &ProcessTemplate {
        &self.template
    }

    pub fn progress(&self) -> &ProgressTree {
        &self.progress
    }

    pub fn timing(&self) -> &TimingTree {
        &self.timing
    }

    pub fn timeline(&self) -> Vec<TimelineStep<'_>> {
        timeline::build_timeline(&self.template, &self.progress, &self.timing)
    }

    pub fn counters(&self) -> ExecutionCounters {
        timeline::counters(&self.timeline())
    }

    pub fn view(&self) -> View {
        self.session.view
    }

    /// First step that is not completed yet; `None` once everything is done.
    pub fn cursor(&self) -> Option<usize> {
        self.session.cursor
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.session.started_at
    }

    /// Whether the snapshot holds changes the store has not accepted.
    pub fn is_dirty(&self) -> bool {
        self.session.dirty
    }

    pub fn is_acknowledged(&self, unit: UnitRef, entry: &Key) -> bool {
        self.session.acknowledgments.contains(&AckKey {
            unit,
            entry: entry.clone(),
        })
    }

    pub fn step(&self, step_number: usize) -> Result<TimelineStep<'_>, PrcError> {
        step_number
            .checked_sub(1)
            .and_then(|index| self.timeline().into_iter().nth(index))
            .ok_or(PrcError::UnknownStep(step_number))
    }

    fn unit_info(&self, step_number: usize) -> Result<UnitInfo, PrcError> {
        let step = self.step(step_number)?;
        Ok(UnitInfo {
            unit: step.unit,
            status: step.status,
            gates: step.gates,
            policy: step.policy,
            first_unfilled: step.group().and_then(GroupEntry::first_unfilled),
        })
    }

    fn template_unit(
        &self,
        unit: UnitRef,
    ) -> Result<(&TemplateStep, Option<&StepGroup>), PrcError> {
        let unknown = || PrcError::UnknownUnit(unit.to_string());
        let step = self.template.step(unit.step_id).ok_or_else(unknown)?;
        let group = match (unit.group_id, &step.payload) {
            (None, _) => None,
            (Some(group_id), StepPayload::Sequence(spec)) => {
                Some(spec.groups.iter().find(|g| g.id == group_id).ok_or_else(unknown)?)
            }
            (Some(_), _) => return Err(unknown()),
        };
        Ok((step, group))
    }

    pub(crate) fn next_open_step(&self) -> Option<usize> {
        self.timeline()
            .iter()
            .find(|step| step.status != StepStatus::Completed)
            .map(|step| step.step_number)
    }

    fn invalid(&self, action: &'static str) -> PrcError {
        PrcError::InvalidTransition {
            action,
            view: self.session.view.to_string(),
        }
    }

    /// Opens a unit from the list. Filled units go straight to preview; the
    /// rest open in detail at the first sub-step without data.
    pub fn select(&mut self, step_number: usize) -> Result<View, PrcError> {
        if self.session.view != View::List {
            return Err(self.invalid("select a step"));
        }
        let info = self.unit_info(step_number)?;

        self.session.view = if info.gates.all_data_filled {
            View::Preview { step_number }
        } else {
            self.session.started_at = Some(self.clock.now());
            View::Detail {
                step_number,
                sub_step: info.first_unfilled,
            }
        };
        tracing::info!(step_number, unit = %info.unit, view = %self.session.view, "selected step");
        Ok(self.session.view)
    }

    pub fn back(&mut self) -> Result<View, PrcError> {
        match self.session.view {
            View::List => return Err(self.invalid("go back")),
            View::Detail { step_number, .. } => {
                if self.session.started_at.take().is_some() {
                    tracing::debug!(step_number, "abandoned unsubmitted start time");
                }
                self.session.view = View::List;
            }
            View::Preview { step_number } => {
                let info = self.unit_info(step_number)?;
                self.session.started_at = Some(self.clock.now());
                self.session.view = View::Detail {
                    step_number,
                    sub_step: info.first_unfilled,
                };
            }
        }
        Ok(self.session.view)
    }

    /// Moves the detail view to another sub-step of the open group and
    /// restarts its clock.
    pub fn focus_sub_step(&mut self, sub_step_id: u32) -> Result<View, PrcError> {
        let View::Detail { step_number, .. } = self.session.view else {
            return Err(self.invalid("focus a sub-step"));
        };
        let info = self.unit_info(step_number)?;
        let (_, group) = self.template_unit(info.unit)?;
        if group.and_then(|g| g.sub_step(sub_step_id)).is_none() {
            return Err(PrcError::UnknownSubStep(sub_step_id));
        }

        self.session.view = View::Detail {
            step_number,
            sub_step: Some(sub_step_id),
        };
        self.session.started_at = Some(self.clock.now());
        Ok(self.session.view)
    }

    /// Lets an out-of-range entry of the open unit through on its next
    /// submission. Acknowledgments are never persisted.
    pub fn acknowledge(&mut self, entry: Key) -> Result<(), PrcError> {
        let View::Detail { step_number, .. } = self.session.view else {
            return Err(self.invalid("acknowledge an entry"));
        };
        let info = self.unit_info(step_number)?;
        let (step, group) = self.template_unit(info.unit)?;
        if !timeline::leaf_ids(step, group).contains(&entry) {
            return Err(PrcError::Validation {
                errors: vec![FieldError::new(entry.to_string(), FieldErrorKind::UnknownEntry)],
            });
        }

        tracing::info!(unit = %info.unit, entry = %entry, "acknowledged out-of-range entry");
        self.session.acknowledgments.insert(AckKey {
            unit: info.unit,
            entry,
        });
        Ok(())
    }

    /// Acceptable catalyst quantity for one line at the given conditions.
    pub fn evaluate_catalyst(
        &self,
        line_id: u32,
        conditions: AmbientConditions,
    ) -> Result<CatalystEvaluation, PrcError> {
        let spec = self
            .template
            .steps
            .iter()
            .find_map(|step| match &step.payload {
                StepPayload::CatalystMixing(spec) => Some(spec),
                _ => None,
            })
            .ok_or_else(|| PrcError::UnknownUnit("catalyst mixing".to_string()))?;
        let line = spec
            .lines
            .iter()
            .find(|line| line.id == line_id)
            .ok_or_else(|| PrcError::Validation {
                errors: vec![FieldError::new(
                    format!("line {}", line_id),
                    FieldErrorKind::UnknownEntry,
                )],
            })?;

        let quantity = capture::material_quantity(&self.template, &self.progress, line);
        Ok(catalyst::evaluate(&spec.bands, conditions, &line.material_code, quantity))
    }

    /// Validates and merges one submission into the open unit, then persists
    /// the full trees.
    pub async fn submit(&mut self, submission: Submission) -> Result<View, PrcError> {
        let View::Detail {
            step_number,
            sub_step: focused,
        } = self.session.view
        else {
            return Err(self.invalid("submit data"));
        };
        let info = self.unit_info(step_number)?;
        if info.status == StepStatus::Completed {
            return Err(PrcError::UnitLocked(step_number));
        }

        let (step, group) = self.template_unit(info.unit)?;
        let captured = capture::capture(&self.template, step, group, &submission, &self.progress)?;

        let unacknowledged: Vec<Key> = captured
            .deviations
            .iter()
            .filter(|entry| !self.is_acknowledged(info.unit, entry))
            .cloned()
            .collect();
        if !unacknowledged.is_empty() {
            tracing::warn!(
                unit = %info.unit,
                entries = ?unacknowledged,
                "submission needs acknowledgment"
            );
            return Err(PrcError::AcknowledgmentRequired {
                entries: unacknowledged,
            });
        }

        let now = self.clock.now();
        let span = TimingSpan {
            start_time: self.session.started_at.unwrap_or(now),
            end_time: now,
        };
        let (parent, key) = match captured.timing_key {
            Some(key) => (info.unit.path(), key),
            None => (Vec::new(), Key::Id(info.unit.step_id)),
        };
        let timing = match merge::merge_if_absent(&self.timing, &parent, key, Node::Leaf(span)) {
            Some(timing) => timing,
            None => {
                tracing::debug!(unit = %info.unit, "timing already recorded, keeping first span");
                self.timing.clone()
            }
        };

        self.progress = merge::merge(Some(&self.progress), &captured.fragment);
        self.timing = timing;
        self.session.started_at = None;
        tracing::info!(
            step_number,
            unit = %info.unit,
            kind = submission.label(),
            deviations = captured.deviations.len(),
            "merged submission"
        );

        let saved = self.persist().await;

        let info = self.unit_info(step_number)?;
        self.session.view = if info.gates.all_data_filled {
            View::Preview { step_number }
        } else {
            self.session.started_at = Some(now);
            View::Detail {
                step_number,
                sub_step: info.first_unfilled.or(focused),
            }
        };
        let audited = self.audit(Some(step_number), &info.unit.to_string(), "submit", &submission);
        save_then_audit(saved, audited)?;
        Ok(self.session.view)
    }

    /// Records one approval or completion flag on the unit in preview and
    /// persists it as its own write.
    pub async fn approve(&mut self, flag: StatusFlag) -> Result<(), PrcError> {
        let View::Preview { step_number } = self.session.view else {
            return Err(self.invalid("record an approval"));
        };
        let info = self.unit_info(step_number)?;
        if !info.policy.accepts(flag) {
            return Err(PrcError::GateNotApplicable { step_number, flag });
        }
        if info.status == StepStatus::Completed {
            return Err(PrcError::UnitLocked(step_number));
        }
        if flag == StatusFlag::StepCompleted && !info.gates.ready_for_completion() {
            return Err(PrcError::NotReady {
                step_number,
                reason: not_ready_reason(&info.gates),
            });
        }

        let fragment = Tree::singleton(
            &info.unit.path(),
            Key::Flag(flag),
            Node::Leaf(Value::Bool(true)),
        );
        self.progress = merge::merge(Some(&self.progress), &fragment);
        tracing::info!(step_number, unit = %info.unit, %flag, "recorded approval");

        let saved = self.persist().await;
        let audited = self.audit(Some(step_number), &info.unit.to_string(), "approve", &flag);
        save_then_audit(saved, audited)
    }

    /// Leaves a completed unit and moves the cursor to the next open one.
    pub fn advance(&mut self) -> Result<View, PrcError> {
        let View::Preview { step_number } = self.session.view else {
            return Err(self.invalid("advance"));
        };
        let info = self.unit_info(step_number)?;
        if info.status != StepStatus::Completed {
            return Err(PrcError::NotReady {
                step_number,
                reason: not_ready_reason(&info.gates),
            });
        }

        self.session.view = View::List;
        self.session.started_at = None;
        self.session.cursor = self.next_open_step();
        tracing::info!(step_number, cursor = ?self.session.cursor, "advanced");
        let cursor = self.session.cursor;
        self.audit(Some(step_number), &info.unit.to_string(), "advance", &cursor)?;
        Ok(self.session.view)
    }

    /// Writes the current snapshot again after a failed save.
    pub async fn retry_save(&mut self) -> Result<(), PrcError> {
        if !self.session.dirty {
            return Ok(());
        }
        self.persist().await?;
        let counters = self.counters();
        self.audit(None, "", "save_retried", &counters)
    }

    async fn persist(&mut self) -> Result<(), PrcError> {
        let update = ProgressUpdate {
            progress: self.progress.clone(),
            timing: self.timing.clone(),
        };
        match self.store.save_progress(&self.execution_id, &update).await {
            Ok(()) => {
                self.session.dirty = false;
                Ok(())
            }
            Err(source) => {
                self.session.dirty = true;
                tracing::error!(
                    execution_id = %self.execution_id,
                    error = %source,
                    "failed to persist progress"
                );
                Err(PrcError::Persistence {
                    execution_id: self.execution_id.clone(),
                    source,
                })
            }
        }
    }

    fn audit<D: Serialize>(
        &mut self,
        step_number: Option<usize>,
        unit: &str,
        action: &str,
        detail: &D,
    ) -> Result<(), PrcError> {
        if let Some(logger) = &mut self.audit {
            let at = self.clock.now();
            logger.log_action(at, &self.execution_id, step_number, unit, action, detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn store_failure() -> Result<(), PrcError> {
        Err(PrcError::Persistence {
            execution_id: "EX-1".to_string(),
            source: StoreError::Unavailable("disk full".to_string()),
        })
    }

    fn audit_failure() -> Result<(), PrcError> {
        Err(PrcError::LoggingError(anyhow::anyhow!("audit file is read-only")))
    }

    #[test]
    fn failed_save_outranks_failed_audit() {
        assert!(matches!(
            save_then_audit(store_failure(), audit_failure()),
            Err(PrcError::Persistence { .. })
        ));
        assert!(matches!(
            save_then_audit(store_failure(), Ok(())),
            Err(PrcError::Persistence { .. })
        ));
    }

    #[test]
    fn audit_failure_surfaces_after_a_good_save() {
        assert!(matches!(
            save_then_audit(Ok(()), audit_failure()),
            Err(PrcError::LoggingError(_))
        ));
        assert!(save_then_audit(Ok(()), Ok(())).is_ok());
    }
}
