//! Validation of operator submissions and the fragment shape each step kind
//! persists.

use crate::catalyst::{self, CatalystClassification};
use crate::error::{FieldError, FieldErrorKind, PrcError};
use prc_schemas::{
    environment::AmbientConditions,
    template::{
        CatalystLine, CatalystMixingSpec, InspectionParameter, InspectionSpec,
        InspectionValueType, ProcessTemplate, RawMaterialsSpec, StepGroup, StepPayload, SubStep,
        TargetType, TemplateStep,
    },
    tree::{Key, Node, ProgressTree, Tree, Value},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const QUANTITY: &str = "quantity";
pub const BATCH_NUMBER: &str = "batchNumber";
pub const VALUE: &str = "value";
pub const RESPONSIBLE_PERSON: &str = "responsiblePerson";
pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";

const EXACT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RawMaterialEntry {
    pub line_id: u32,
    pub quantity: Value,
    #[serde(default)]
    pub batch_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CatalystEntry {
    pub line_id: u32,
    pub catalyst_quantity: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ParameterEntry {
    pub parameter_id: u32,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub columns: BTreeMap<String, Value>,
}

/// One operator submission for the unit on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submission {
    RawMaterials {
        entries: Vec<RawMaterialEntry>,
    },
    CatalystMixing {
        conditions: AmbientConditions,
        entries: Vec<CatalystEntry>,
    },
    SubStep {
        sub_step_id: u32,
        value: Value,
        #[serde(default)]
        responsible_person: Option<String>,
    },
    Inspection {
        entries: Vec<ParameterEntry>,
    },
}

impl Submission {
    pub fn label(&self) -> &'static str {
        match self {
            Submission::RawMaterials { .. } => "raw_materials",
            Submission::CatalystMixing { .. } => "catalyst_mixing",
            Submission::SubStep { .. } => "sub_step",
            Submission::Inspection { .. } => "inspection",
        }
    }
}

/// A validated submission, ready to merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub fragment: ProgressTree,
    /// Timing key below the unit; `None` when timing is recorded per unit.
    pub timing_key: Option<Key>,
    /// Entries outside their target that need an acknowledgment to go through.
    pub deviations: Vec<Key>,
}

/// Conditions captured with a catalyst step, if both are present.
pub fn captured_conditions(progress: &ProgressTree, step_id: u32) -> Option<AmbientConditions> {
    let read = |name: &str| {
        progress
            .leaf_at(&[Key::Id(step_id), Key::field(name)])
            .and_then(Value::as_number)
    };
    Some(AmbientConditions {
        temperature: read(TEMPERATURE)?,
        humidity: read(HUMIDITY)?,
    })
}

/// The quantity a catalyst line is dosed against: the captured raw material
/// quantity when the line points at one, the planned quantity otherwise.
pub fn material_quantity(
    template: &ProcessTemplate,
    progress: &ProgressTree,
    line: &CatalystLine,
) -> f64 {
    let captured = line.raw_material_line.and_then(|raw_line| {
        let (raw_step, _) = template.raw_materials()?;
        let path = [Key::Id(raw_step.id), Key::Id(raw_line)];
        match progress.get(&path)? {
            Node::Leaf(value) => value.as_number(),
            Node::Branch(record) => record
                .get(&Key::field(QUANTITY))
                .and_then(|n| n.as_leaf())
                .and_then(Value::as_number),
        }
    });
    captured.unwrap_or(line.planned_quantity.value)
}

pub fn capture(
    template: &ProcessTemplate,
    step: &TemplateStep,
    group: Option<&StepGroup>,
    submission: &Submission,
    progress: &ProgressTree,
) -> Result<Capture, PrcError> {
    match (&step.payload, group, submission) {
        (StepPayload::RawMaterials(spec), _, Submission::RawMaterials { entries }) => {
            capture_raw_materials(step.id, spec, entries)
        }
        (
            StepPayload::CatalystMixing(spec),
            _,
            Submission::CatalystMixing {
                conditions,
                entries,
            },
        ) => capture_catalyst(template, step.id, spec, *conditions, entries, progress),
        (
            StepPayload::Sequence(_),
            Some(group),
            Submission::SubStep {
                sub_step_id,
                value,
                responsible_person,
            },
        ) => {
            let sub_step = group
                .sub_step(*sub_step_id)
                .ok_or(PrcError::UnknownSubStep(*sub_step_id))?;
            capture_sub_step(step.id, group.id, sub_step, value, responsible_person.as_deref())
        }
        (StepPayload::Inspection(spec), _, Submission::Inspection { entries }) => {
            capture_inspection(step.id, spec, entries)
        }
        _ => Err(PrcError::WrongSubmission(format!(
            "{} submission for a {:?} step",
            submission.label(),
            step.kind()
        ))),
    }
}

fn validation(errors: Vec<FieldError>) -> Result<(), PrcError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PrcError::Validation { errors })
    }
}

fn number_or_error(field: &str, value: &Value, errors: &mut Vec<FieldError>) -> Option<f64> {
    if value.is_blank() {
        errors.push(FieldError::new(field, FieldErrorKind::Missing));
        return None;
    }
    let number = value.as_number();
    if number.is_none() {
        errors.push(FieldError::new(field, FieldErrorKind::NotNumeric));
    }
    number
}

/// OK / NOT OK answers arrive as booleans or as text.
fn ok_not_ok(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Text(s) => {
            let answer = s.trim().to_ascii_lowercase().replace([' ', '-', '_'], "");
            match answer.as_str() {
                "ok" | "pass" | "yes" | "true" => Some(true),
                "notok" | "nok" | "fail" | "no" | "false" => Some(false),
                _ => None,
            }
        }
        _ => None,
    }
}

fn check_duplicate(seen: &mut HashSet<u32>, id: u32, field: &str, errors: &mut Vec<FieldError>) {
    if !seen.insert(id) {
        errors.push(FieldError::new(field, FieldErrorKind::Duplicate));
    }
}

fn capture_raw_materials(
    step_id: u32,
    spec: &RawMaterialsSpec,
    entries: &[RawMaterialEntry],
) -> Result<Capture, PrcError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut children = Vec::new();

    if entries.is_empty() {
        errors.push(FieldError::new("entries", FieldErrorKind::Missing));
    }
    for entry in entries {
        let field = format!("line {}", entry.line_id);
        check_duplicate(&mut seen, entry.line_id, &field, &mut errors);
        let Some(line) = spec.lines.iter().find(|l| l.id == entry.line_id) else {
            errors.push(FieldError::new(field, FieldErrorKind::UnknownEntry));
            continue;
        };
        let Some(quantity) = number_or_error(&field, &entry.quantity, &mut errors) else {
            continue;
        };
        if quantity < 0.0 {
            errors.push(FieldError::new(&field, FieldErrorKind::BelowMinimum { min: 0.0 }));
            continue;
        }

        let batch = entry
            .batch_number
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty());
        let node = match (line.requires_batch_number, batch) {
            (true, None) => {
                errors.push(FieldError::new(&field, FieldErrorKind::MissingBatchNumber));
                continue;
            }
            (_, Some(batch)) => Node::branch([
                (Key::field(QUANTITY), Node::Leaf(Value::Number(quantity))),
                (Key::field(BATCH_NUMBER), Node::Leaf(Value::Text(batch.to_string()))),
            ]),
            (false, None) => Node::Leaf(Value::Number(quantity)),
        };
        children.push((Key::Id(line.id), node));
    }
    validation(errors)?;

    Ok(Capture {
        fragment: Tree::singleton(&[], Key::Id(step_id), Node::branch(children)),
        timing_key: None,
        deviations: Vec::new(),
    })
}

fn capture_catalyst(
    template: &ProcessTemplate,
    step_id: u32,
    spec: &CatalystMixingSpec,
    conditions: AmbientConditions,
    entries: &[CatalystEntry],
    progress: &ProgressTree,
) -> Result<Capture, PrcError> {
    let mut errors = Vec::new();
    if !conditions.temperature.is_finite() {
        errors.push(FieldError::new(TEMPERATURE, FieldErrorKind::NotNumeric));
    }
    if !conditions.humidity.is_finite() {
        errors.push(FieldError::new(HUMIDITY, FieldErrorKind::NotNumeric));
    }
    if entries.is_empty() {
        errors.push(FieldError::new("entries", FieldErrorKind::Missing));
    }

    let mut seen = HashSet::new();
    let mut accepted = Vec::new();
    for entry in entries {
        let field = format!("line {}", entry.line_id);
        check_duplicate(&mut seen, entry.line_id, &field, &mut errors);
        let Some(line) = spec.lines.iter().find(|l| l.id == entry.line_id) else {
            errors.push(FieldError::new(field, FieldErrorKind::UnknownEntry));
            continue;
        };
        let Some(quantity) = number_or_error(&field, &entry.catalyst_quantity, &mut errors) else {
            continue;
        };
        if quantity < 0.0 {
            errors.push(FieldError::new(&field, FieldErrorKind::BelowMinimum { min: 0.0 }));
            continue;
        }
        accepted.push((line, quantity));
    }
    validation(errors)?;

    let mut deviations = Vec::new();
    let mut children = vec![
        (Key::field(TEMPERATURE), Node::Leaf(Value::Number(conditions.temperature))),
        (Key::field(HUMIDITY), Node::Leaf(Value::Number(conditions.humidity))),
    ];
    for (line, quantity) in accepted {
        let evaluation = catalyst::evaluate(
            &spec.bands,
            conditions,
            &line.material_code,
            material_quantity(template, progress, line),
        );
        if evaluation.blocks {
            return Err(PrcError::Blocked { line: line.id });
        }
        if matches!(
            evaluation.classify(quantity),
            Some(CatalystClassification::Lesser | CatalystClassification::Greater)
        ) {
            deviations.push(Key::Id(line.id));
        }
        children.push((Key::Id(line.id), Node::Leaf(Value::Number(quantity))));
    }

    Ok(Capture {
        fragment: Tree::singleton(&[], Key::Id(step_id), Node::branch(children)),
        timing_key: None,
        deviations,
    })
}

fn outside_target(sub_step: &SubStep, measured: f64) -> bool {
    match sub_step.target_type {
        TargetType::Range => {
            sub_step.min_value.is_some_and(|min| measured < min)
                || sub_step.max_value.is_some_and(|max| measured > max)
        }
        TargetType::Exact => sub_step
            .min_value
            .or(sub_step.max_value)
            .is_some_and(|target| (measured - target).abs() > EXACT_TOLERANCE),
        TargetType::OkNotOk => false,
    }
}

fn capture_sub_step(
    step_id: u32,
    group_id: u32,
    sub_step: &SubStep,
    value: &Value,
    responsible_person: Option<&str>,
) -> Result<Capture, PrcError> {
    let field = sub_step.name.as_str();
    let mut errors = Vec::new();
    let mut deviates = false;

    let captured = match sub_step.target_type {
        TargetType::OkNotOk => match ok_not_ok(value) {
            Some(ok) => {
                deviates = !ok;
                Some(Value::Bool(ok))
            }
            None if value.is_blank() => {
                errors.push(FieldError::new(field, FieldErrorKind::Missing));
                None
            }
            None => {
                errors.push(FieldError::new(field, FieldErrorKind::InvalidChoice));
                None
            }
        },
        TargetType::Range | TargetType::Exact => {
            let readings: Vec<&Value> = match value {
                Value::List(items) => items.iter().collect(),
                single => vec![single],
            };
            let limit = if sub_step.allow_multiple_measurements {
                sub_step.max_measurement_count
            } else {
                Some(1)
            };
            if let Some(max) = limit.filter(|max| readings.len() > *max) {
                errors.push(FieldError::new(field, FieldErrorKind::TooManyMeasurements { max }));
            }
            if readings.is_empty() {
                errors.push(FieldError::new(field, FieldErrorKind::Missing));
            }
            let numbers: Vec<f64> = readings
                .into_iter()
                .filter_map(|reading| number_or_error(field, reading, &mut errors))
                .collect();
            deviates = numbers.iter().any(|n| outside_target(sub_step, *n));
            match numbers.as_slice() {
                [single] if !sub_step.allow_multiple_measurements => Some(Value::Number(*single)),
                _ => Some(Value::List(numbers.into_iter().map(Value::Number).collect())),
            }
        }
    };

    let person = responsible_person.map(str::trim).filter(|p| !p.is_empty());
    if sub_step.requires_responsible_person && person.is_none() {
        errors.push(FieldError::new(field, FieldErrorKind::MissingResponsiblePerson));
    }
    validation(errors)?;

    let captured = captured.unwrap_or(Value::List(Vec::new()));
    let node = match person {
        Some(person) => Node::branch([
            (Key::field(VALUE), Node::Leaf(captured)),
            (Key::field(RESPONSIBLE_PERSON), Node::Leaf(Value::Text(person.to_string()))),
        ]),
        None => Node::Leaf(captured),
    };

    Ok(Capture {
        fragment: Tree::singleton(
            &[Key::Id(step_id), Key::Id(group_id)],
            Key::Id(sub_step.id),
            node,
        ),
        timing_key: Some(Key::Id(sub_step.id)),
        deviations: if deviates {
            vec![Key::Id(sub_step.id)]
        } else {
            Vec::new()
        },
    })
}

/// Validates one inspection value. Numeric limits are hard limits here.
fn inspection_value(
    parameter: &InspectionParameter,
    field: &str,
    value: &Value,
    errors: &mut Vec<FieldError>,
) -> Option<(Value, bool)> {
    match parameter.value_type {
        InspectionValueType::Numeric => {
            let number = number_or_error(field, value, errors)?;
            if let Some(min) = parameter.min_value.filter(|min| number < *min) {
                errors.push(FieldError::new(field, FieldErrorKind::BelowMinimum { min }));
                return None;
            }
            if let Some(max) = parameter.max_value.filter(|max| number > *max) {
                errors.push(FieldError::new(field, FieldErrorKind::AboveMaximum { max }));
                return None;
            }
            Some((Value::Number(number), false))
        }
        InspectionValueType::OkNotOk => match ok_not_ok(value) {
            Some(ok) => Some((Value::Bool(ok), !ok)),
            None => {
                let kind = if value.is_blank() {
                    FieldErrorKind::Missing
                } else {
                    FieldErrorKind::InvalidChoice
                };
                errors.push(FieldError::new(field, kind));
                None
            }
        },
        InspectionValueType::Text => {
            if value.is_blank() {
                errors.push(FieldError::new(field, FieldErrorKind::Missing));
                return None;
            }
            Some((value.clone(), false))
        }
    }
}

fn capture_inspection(
    step_id: u32,
    spec: &InspectionSpec,
    entries: &[ParameterEntry],
) -> Result<Capture, PrcError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut children = Vec::new();
    let mut deviations = Vec::new();

    if entries.is_empty() {
        errors.push(FieldError::new("entries", FieldErrorKind::Missing));
    }
    for entry in entries {
        let field = format!("parameter {}", entry.parameter_id);
        check_duplicate(&mut seen, entry.parameter_id, &field, &mut errors);
        let Some(parameter) = spec.parameters.iter().find(|p| p.id == entry.parameter_id) else {
            errors.push(FieldError::new(field, FieldErrorKind::UnknownEntry));
            continue;
        };

        if parameter.sub_columns.is_empty() {
            let Some(value) = entry.value.as_ref() else {
                errors.push(FieldError::new(&parameter.name, FieldErrorKind::Missing));
                continue;
            };
            let checked = inspection_value(parameter, &parameter.name, value, &mut errors);
            if let Some((value, deviates)) = checked {
                if deviates {
                    deviations.push(Key::Id(parameter.id));
                }
                children.push((Key::Id(parameter.id), Node::Leaf(value)));
            }
            continue;
        }

        let mut columns = Vec::new();
        let mut deviates = false;
        for column in &parameter.sub_columns {
            let column_field = format!("{} / {}", parameter.name, column);
            let Some(value) = entry.columns.get(column) else {
                errors.push(FieldError::new(column_field, FieldErrorKind::Missing));
                continue;
            };
            let checked = inspection_value(parameter, &column_field, value, &mut errors);
            if let Some((value, off)) = checked {
                deviates |= off;
                columns.push((Key::field(column), Node::Leaf(value)));
            }
        }
        for unknown in entry.columns.keys().filter(|c| !parameter.sub_columns.contains(c)) {
            errors.push(FieldError::new(
                format!("{} / {}", parameter.name, unknown),
                FieldErrorKind::UnknownEntry,
            ));
        }
        if deviates {
            deviations.push(Key::Id(parameter.id));
        }
        children.push((Key::Id(parameter.id), Node::branch(columns)));
    }
    validation(errors)?;

    Ok(Capture {
        fragment: Tree::singleton(&[], Key::Id(step_id), Node::branch(children)),
        timing_key: None,
        deviations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prc_schemas::{
        band::{CatalystBand, RatioRange},
        environment::Measurement,
        material::MaterialCode,
        template::{RawMaterialLine, SequenceSpec, SubStepKind},
    };

    fn sub_step(id: u32, target_type: TargetType) -> SubStep {
        SubStep {
            id,
            name: format!("sub-step {}", id),
            kind: SubStepKind::Measurement,
            target_type,
            uom: Some("mm".into()),
            min_value: Some(0.4),
            max_value: Some(0.6),
            allow_multiple_measurements: false,
            max_measurement_count: None,
            requires_responsible_person: false,
            is_critical: false,
        }
    }

    fn errors_of(result: Result<Capture, PrcError>) -> Vec<FieldErrorKind> {
        match result {
            Err(PrcError::Validation { errors }) => errors.into_iter().map(|e| e.kind).collect(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    fn catalyst_template(blocks: bool) -> ProcessTemplate {
        ProcessTemplate {
            template_id: "T".into(),
            name: "T".into(),
            revision: None,
            steps: vec![
                TemplateStep {
                    id: 1,
                    sequence: 0,
                    title: "Raw".into(),
                    payload: StepPayload::RawMaterials(RawMaterialsSpec {
                        lines: vec![RawMaterialLine {
                            id: 1,
                            material_code: MaterialCode::Gelcoat,
                            name: "Gelcoat".into(),
                            planned_quantity: Measurement { value: 12.0, unit: "kg".into() },
                            requires_batch_number: true,
                        }],
                    }),
                },
                TemplateStep {
                    id: 2,
                    sequence: 0,
                    title: "Catalyst".into(),
                    payload: StepPayload::CatalystMixing(CatalystMixingSpec {
                        lines: vec![CatalystLine {
                            id: 1,
                            material_code: MaterialCode::Gelcoat,
                            name: "MEKP".into(),
                            raw_material_line: Some(1),
                            planned_quantity: Measurement { value: 12.0, unit: "kg".into() },
                        }],
                        bands: vec![CatalystBand {
                            min_temperature: 20.0,
                            max_temperature: 30.0,
                            min_humidity: 40.0,
                            max_humidity: 60.0,
                            gelcoat: RatioRange { min: 0.01, max: 0.02 },
                            resin: RatioRange { min: 0.01, max: 0.02 },
                            topcoat: RatioRange { min: 0.01, max: 0.02 },
                            blocks,
                            requires_approval: false,
                        }],
                    }),
                },
            ],
        }
    }

    fn catalyst_submission(quantity: f64) -> Submission {
        Submission::CatalystMixing {
            conditions: AmbientConditions { temperature: 25.0, humidity: 50.0 },
            entries: vec![CatalystEntry { line_id: 1, catalyst_quantity: Value::Number(quantity) }],
        }
    }

    #[test]
    fn range_measurement_outside_target_is_a_deviation() {
        let range = sub_step(100, TargetType::Range);
        let result = capture_sub_step(10, 1, &range, &Value::Number(0.7), None).unwrap();
        assert_eq!(result.deviations, vec![Key::Id(100)]);
        assert_eq!(result.timing_key, Some(Key::Id(100)));
        assert_eq!(
            result.fragment.leaf_at(&[Key::Id(10), Key::Id(1), Key::Id(100)]),
            Some(&Value::Number(0.7))
        );
    }

    #[test]
    fn exact_target_compares_against_min_value() {
        let mut exact = sub_step(100, TargetType::Exact);
        exact.min_value = Some(5.0);
        let on_target = capture_sub_step(1, 1, &exact, &Value::Number(5.0), None).unwrap();
        assert!(on_target.deviations.is_empty());
        let off_target = capture_sub_step(1, 1, &exact, &Value::Number(5.1), None).unwrap();
        assert_eq!(off_target.deviations.len(), 1);
    }

    #[test]
    fn text_numbers_are_accepted_and_garbage_is_rejected() {
        let step = sub_step(100, TargetType::Range);
        assert!(capture_sub_step(1, 1, &step, &Value::Text(" 0.5 ".into()), None).is_ok());
        assert_eq!(
            errors_of(capture_sub_step(1, 1, &step, &Value::Text("abc".into()), None)),
            vec![FieldErrorKind::NotNumeric]
        );
        assert_eq!(
            errors_of(capture_sub_step(1, 1, &step, &Value::Text("".into()), None)),
            vec![FieldErrorKind::Missing]
        );
    }

    #[test]
    fn measurement_count_is_bounded() {
        let mut multi = sub_step(100, TargetType::Range);
        multi.allow_multiple_measurements = true;
        multi.max_measurement_count = Some(2);
        let three = Value::List(vec![0.5.into(), 0.5.into(), 0.5.into()]);
        assert_eq!(
            errors_of(capture_sub_step(1, 1, &multi, &three, None)),
            vec![FieldErrorKind::TooManyMeasurements { max: 2 }]
        );

        let single = sub_step(101, TargetType::Range);
        let two = Value::List(vec![0.5.into(), 0.5.into()]);
        assert_eq!(
            errors_of(capture_sub_step(1, 1, &single, &two, None)),
            vec![FieldErrorKind::TooManyMeasurements { max: 1 }]
        );
    }

    #[test]
    fn responsible_person_is_recorded_next_to_the_value() {
        let mut step = sub_step(100, TargetType::OkNotOk);
        step.requires_responsible_person = true;
        assert_eq!(
            errors_of(capture_sub_step(1, 1, &step, &Value::Text("ok".into()), Some(" "))),
            vec![FieldErrorKind::MissingResponsiblePerson]
        );

        let answer = Value::Text("NOT OK".into());
        let capture = capture_sub_step(1, 1, &step, &answer, Some("a.lee")).unwrap();
        let path = [Key::Id(1), Key::Id(1), Key::Id(100), Key::field(VALUE)];
        assert_eq!(capture.fragment.leaf_at(&path), Some(&Value::Bool(false)));
        assert_eq!(capture.deviations, vec![Key::Id(100)]);
    }

    #[test]
    fn raw_materials_require_batch_numbers_where_declared() {
        let template = catalyst_template(false);
        let step = &template.steps[0];
        let missing = Submission::RawMaterials {
            entries: vec![RawMaterialEntry {
                line_id: 1,
                quantity: Value::Number(12.5),
                batch_number: None,
            }],
        };
        assert_eq!(
            errors_of(capture(&template, step, None, &missing, &ProgressTree::new())),
            vec![FieldErrorKind::MissingBatchNumber]
        );

        let ok = Submission::RawMaterials {
            entries: vec![RawMaterialEntry {
                line_id: 1,
                quantity: Value::Number(12.5),
                batch_number: Some("B-778".into()),
            }],
        };
        let capture = capture(&template, step, None, &ok, &ProgressTree::new()).unwrap();
        assert_eq!(
            capture.fragment.leaf_at(&[Key::Id(1), Key::Id(1), Key::field(QUANTITY)]),
            Some(&Value::Number(12.5))
        );
    }

    #[test]
    fn catalyst_range_follows_captured_raw_quantity() {
        let template = catalyst_template(false);
        let progress = Tree::singleton(
            &[Key::Id(1)],
            Key::Id(1),
            Node::branch([(Key::field(QUANTITY), Node::Leaf(Value::Number(10.0)))]),
        );
        let line = match &template.steps[1].payload {
            StepPayload::CatalystMixing(spec) => &spec.lines[0],
            _ => unreachable!(),
        };
        assert_eq!(material_quantity(&template, &progress, line), 10.0);
        assert_eq!(material_quantity(&template, &ProgressTree::new(), line), 12.0);

        let low = catalyst_submission(0.05);
        let short = capture(&template, &template.steps[1], None, &low, &progress).unwrap();
        assert_eq!(short.deviations, vec![Key::Id(1)]);
        assert_eq!(captured_conditions(&short.fragment, 2).map(|c| c.humidity), Some(50.0));

        let inside = catalyst_submission(0.15);
        let accepted = capture(&template, &template.steps[1], None, &inside, &progress).unwrap();
        assert!(accepted.deviations.is_empty());
    }

    #[test]
    fn blocking_band_rejects_the_submission() {
        let template = catalyst_template(true);
        let submission = catalyst_submission(0.15);
        let progress = ProgressTree::new();
        let result = capture(&template, &template.steps[1], None, &submission, &progress);
        assert!(matches!(result, Err(PrcError::Blocked { line: 1 })));
    }

    #[test]
    fn inspection_limits_are_hard_and_columns_are_all_required() {
        let spec = InspectionSpec {
            parameters: vec![
                InspectionParameter {
                    id: 1,
                    name: "Barcol hardness".into(),
                    value_type: InspectionValueType::Numeric,
                    is_critical: true,
                    uom: None,
                    min_value: Some(35.0),
                    max_value: None,
                    sub_columns: vec![],
                    reference_files: vec![],
                },
                InspectionParameter {
                    id: 2,
                    name: "Visual".into(),
                    value_type: InspectionValueType::OkNotOk,
                    is_critical: false,
                    uom: None,
                    min_value: None,
                    max_value: None,
                    sub_columns: vec!["port".into(), "starboard".into()],
                    reference_files: vec![],
                },
            ],
        };
        let entries = vec![
            ParameterEntry {
                parameter_id: 1,
                value: Some(Value::Number(30.0)),
                columns: BTreeMap::new(),
            },
            ParameterEntry {
                parameter_id: 2,
                value: None,
                columns: [("port".to_string(), Value::Text("ok".into()))].into_iter().collect(),
            },
        ];
        assert_eq!(
            errors_of(capture_inspection(5, &spec, &entries)),
            vec![FieldErrorKind::BelowMinimum { min: 35.0 }, FieldErrorKind::Missing]
        );

        let entries = vec![
            ParameterEntry {
                parameter_id: 1,
                value: Some(Value::Number(40.0)),
                columns: BTreeMap::new(),
            },
            ParameterEntry {
                parameter_id: 2,
                value: None,
                columns: [
                    ("port".to_string(), Value::Text("ok".into())),
                    ("starboard".to_string(), Value::Bool(false)),
                ]
                .into_iter()
                .collect(),
            },
        ];
        let capture = capture_inspection(5, &spec, &entries).unwrap();
        assert_eq!(capture.deviations, vec![Key::Id(2)]);
        assert_eq!(
            capture.fragment.leaf_at(&[Key::Id(5), Key::Id(2), Key::field("starboard")]),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn mismatched_submission_is_rejected() {
        let template = catalyst_template(false);
        let submission = catalyst_submission(0.1);
        let progress = ProgressTree::new();
        let result = capture(&template, &template.steps[0], None, &submission, &progress);
        assert!(matches!(result, Err(PrcError::WrongSubmission(_))));

        let group = StepGroup {
            id: 1,
            name: "G".into(),
            description: String::new(),
            expected_duration_seconds: 60.0,
            sub_steps: vec![sub_step(100, TargetType::Range)],
        };
        let step = TemplateStep {
            id: 9,
            sequence: 1,
            title: "Seq".into(),
            payload: StepPayload::Sequence(SequenceSpec { groups: vec![group.clone()] }),
        };
        let submission = Submission::SubStep {
            sub_step_id: 999,
            value: Value::Number(0.5),
            responsible_person: None,
        };
        assert!(matches!(
            capture(&template, &step, Some(&group), &submission, &ProgressTree::new()),
            Err(PrcError::UnknownSubStep(999))
        ));
    }
}
