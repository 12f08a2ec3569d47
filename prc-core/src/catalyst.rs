//! Catalyst dosing against temperature/humidity bands.

use prc_schemas::{
    band::{CatalystBand, RatioRange},
    environment::AmbientConditions,
    material::MaterialCode,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CatalystClassification {
    Lesser,
    Accepted,
    Greater,
}

/// Acceptable catalyst quantity for one material line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CatalystRange {
    pub min: f64,
    pub max: f64,
}

impl CatalystRange {
    /// Bounds are inclusive.
    pub fn classify(&self, entered: f64) -> CatalystClassification {
        if entered < self.min {
            CatalystClassification::Lesser
        } else if entered > self.max {
            CatalystClassification::Greater
        } else {
            CatalystClassification::Accepted
        }
    }
}

/// Outcome of matching conditions against the band table.
///
/// `range` is `None` when no band contains the conditions; callers then show
/// the entry as unconstrained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalystEvaluation {
    pub band_index: Option<usize>,
    pub range: Option<CatalystRange>,
    pub blocks: bool,
    pub requires_approval: bool,
    /// The material code had no ratio of its own and the gelcoat ratio was used.
    pub ratio_fallback: bool,
}

impl CatalystEvaluation {
    pub fn unconstrained() -> Self {
        Self {
            band_index: None,
            range: None,
            blocks: false,
            requires_approval: false,
            ratio_fallback: false,
        }
    }

    /// `None` when there is no range to classify against.
    pub fn classify(&self, entered: f64) -> Option<CatalystClassification> {
        self.range.map(|range| range.classify(entered))
    }
}

/// First band, in declared order, containing both the temperature and the humidity.
pub fn find_band(
    bands: &[CatalystBand],
    conditions: AmbientConditions,
) -> Option<(usize, &CatalystBand)> {
    bands
        .iter()
        .enumerate()
        .find(|(_, band)| band.contains(conditions.temperature, conditions.humidity))
}

pub fn evaluate(
    bands: &[CatalystBand],
    conditions: AmbientConditions,
    code: &MaterialCode,
    material_quantity: f64,
) -> CatalystEvaluation {
    let Some((index, band)) = find_band(bands, conditions) else {
        tracing::debug!(
            temperature = conditions.temperature,
            humidity = conditions.humidity,
            "no catalyst band matches conditions"
        );
        return CatalystEvaluation::unconstrained();
    };

    let (ratio, ratio_fallback) = band.ratio_for(code);
    if ratio_fallback {
        tracing::warn!(%code, "no catalyst ratio for material code, using gelcoat ratio");
    }

    CatalystEvaluation {
        band_index: Some(index),
        range: Some(range_for(ratio, material_quantity)),
        blocks: band.blocks,
        requires_approval: band.requires_approval,
        ratio_fallback,
    }
}

fn range_for(ratio: RatioRange, material_quantity: f64) -> CatalystRange {
    CatalystRange {
        min: material_quantity * ratio.min,
        max: material_quantity * ratio.max,
    }
}
