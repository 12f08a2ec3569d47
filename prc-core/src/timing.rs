//! Duration compliance for step groups.
//!
//! Only recorded spans count, so idle time between sub-steps never shows up
//! in the total.

use prc_schemas::tree::{Key, TimingSpan, TimingTree};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingSummary {
    pub actual_duration_seconds: f64,
    pub expected_duration_seconds: f64,
    pub timing_exceeded: bool,
    pub spans_counted: usize,
}

impl TimingSummary {
    /// Seconds left before the budget is exceeded; negative once over.
    pub fn remaining_seconds(&self) -> f64 {
        self.expected_duration_seconds - self.actual_duration_seconds
    }
}

pub fn summarize<'a, I>(spans: I, expected_duration_seconds: f64) -> TimingSummary
where
    I: IntoIterator<Item = &'a TimingSpan>,
{
    let (actual, counted) = spans
        .into_iter()
        .fold((0.0, 0), |(total, n), span| (total + span.duration_seconds(), n + 1));

    TimingSummary {
        actual_duration_seconds: actual,
        expected_duration_seconds,
        timing_exceeded: actual > expected_duration_seconds,
        spans_counted: counted,
    }
}

/// Sums the spans recorded for the given sub-steps of one unit.
pub fn summarize_unit(
    timing: &TimingTree,
    unit: &[Key],
    sub_steps: impl IntoIterator<Item = u32>,
    expected_duration_seconds: f64,
) -> TimingSummary {
    let spans = sub_steps.into_iter().filter_map(|id| {
        let mut path = unit.to_vec();
        path.push(Key::Id(id));
        timing.leaf_at(&path)
    });
    summarize(spans, expected_duration_seconds)
}
