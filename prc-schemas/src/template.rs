use crate::{band::CatalystBand, environment::Measurement, material::MaterialCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RawMaterialLine {
    pub id: u32,
    pub material_code: MaterialCode,
    pub name: String,
    pub planned_quantity: Measurement<f64>,
    #[serde(default)]
    pub requires_batch_number: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RawMaterialsSpec {
    pub lines: Vec<RawMaterialLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CatalystLine {
    pub id: u32,
    pub material_code: MaterialCode,
    pub name: String,
    /// Raw material line whose captured quantity the catalyst is dosed against.
    pub raw_material_line: Option<u32>,
    pub planned_quantity: Measurement<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CatalystMixingSpec {
    pub lines: Vec<CatalystLine>,
    /// Evaluated in declared order; the first containing band wins.
    pub bands: Vec<CatalystBand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubStepKind {
    Measurement,
    Check,
    Operation,
    Inspection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Range,
    Exact,
    OkNotOk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubStep {
    pub id: u32,
    pub name: String,
    pub kind: SubStepKind,
    pub target_type: TargetType,
    pub uom: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    #[serde(default)]
    pub allow_multiple_measurements: bool,
    pub max_measurement_count: Option<usize>,
    #[serde(default)]
    pub requires_responsible_person: bool,
    #[serde(default)]
    pub is_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StepGroup {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub expected_duration_seconds: f64,
    pub sub_steps: Vec<SubStep>,
}

impl StepGroup {
    pub fn is_critical(&self) -> bool {
        self.sub_steps.iter().any(|s| s.is_critical)
    }

    pub fn sub_step(&self, id: u32) -> Option<&SubStep> {
        self.sub_steps.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SequenceSpec {
    pub groups: Vec<StepGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionValueType {
    Numeric,
    Text,
    OkNotOk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InspectionParameter {
    pub id: u32,
    pub name: String,
    pub value_type: InspectionValueType,
    #[serde(default)]
    pub is_critical: bool,
    pub uom: Option<String>,
    /// Hard limits for numeric parameters.
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// When present, one value is captured per column instead of a single value.
    #[serde(default)]
    pub sub_columns: Vec<String>,
    #[serde(default)]
    pub reference_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InspectionSpec {
    pub parameters: Vec<InspectionParameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    RawMaterials,
    CatalystMixing,
    Sequence,
    Inspection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPayload {
    RawMaterials(RawMaterialsSpec),
    CatalystMixing(CatalystMixingSpec),
    Sequence(SequenceSpec),
    Inspection(InspectionSpec),
}

impl StepPayload {
    pub fn kind(&self) -> StepKind {
        match self {
            StepPayload::RawMaterials(_) => StepKind::RawMaterials,
            StepPayload::CatalystMixing(_) => StepKind::CatalystMixing,
            StepPayload::Sequence(_) => StepKind::Sequence,
            StepPayload::Inspection(_) => StepKind::Inspection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TemplateStep {
    pub id: u32,
    /// Ordering among the template's own steps.
    #[serde(default)]
    pub sequence: u32,
    pub title: String,
    #[serde(flatten)]
    pub payload: StepPayload,
}

impl TemplateStep {
    pub fn kind(&self) -> StepKind {
        self.payload.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessTemplate {
    pub template_id: String,
    pub name: String,
    pub revision: Option<String>,
    pub steps: Vec<TemplateStep>,
}

impl ProcessTemplate {
    pub fn step(&self, id: u32) -> Option<&TemplateStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The raw materials step, if the template declares one.
    pub fn raw_materials(&self) -> Option<(&TemplateStep, &RawMaterialsSpec)> {
        self.steps.iter().find_map(|step| match &step.payload {
            StepPayload::RawMaterials(spec) => Some((step, spec)),
            _ => None,
        })
    }
}
