use crate::material::MaterialCode;
use serde::{Deserialize, Serialize};

/// Catalyst-to-material ratio limits, as fractions of the material quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioRange {
    pub min: f64,
    pub max: f64,
}

/// A temperature/humidity window with the catalyst ratios allowed inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CatalystBand {
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub min_humidity: f64,
    pub max_humidity: f64,
    pub gelcoat: RatioRange,
    pub resin: RatioRange,
    pub topcoat: RatioRange,
    /// Mixing is not permitted at all inside this band.
    #[serde(default)]
    pub blocks: bool,
    /// Entries mixed inside this band need a production sign-off.
    #[serde(default)]
    pub requires_approval: bool,
}

impl CatalystBand {
    /// Inclusive on all four bounds.
    pub fn contains(&self, temperature: f64, humidity: f64) -> bool {
        temperature >= self.min_temperature
            && temperature <= self.max_temperature
            && humidity >= self.min_humidity
            && humidity <= self.max_humidity
    }

    /// Returns the ratio for `code` and whether the gelcoat fallback was used.
    pub fn ratio_for(&self, code: &MaterialCode) -> (RatioRange, bool) {
        match code {
            MaterialCode::Gelcoat => (self.gelcoat, false),
            MaterialCode::Resin => (self.resin, false),
            MaterialCode::Topcoat => (self.topcoat, false),
            MaterialCode::Other(_) => (self.gelcoat, true),
        }
    }
}
