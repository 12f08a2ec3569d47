#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use prc_core::controller::{Clock, ControllerBuilder, ExecutionController};
use prc_core::store::MemoryStore;
use prc_schemas::{
    band::{CatalystBand, RatioRange},
    environment::Measurement,
    material::MaterialCode,
    template::{
        CatalystLine, CatalystMixingSpec, InspectionParameter, InspectionSpec,
        InspectionValueType, ProcessTemplate, RawMaterialLine, RawMaterialsSpec, SequenceSpec,
        StepGroup, StepPayload, SubStep, SubStepKind, TargetType, TemplateStep,
    },
};
use std::sync::{Arc, Mutex};

pub const EXECUTION: &str = "EX-HULL-0042";

/// A clock the test moves by hand.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, seconds: i64) {
        *self.now.lock().unwrap() += Duration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

fn sub_step(id: u32, name: &str, target_type: TargetType, is_critical: bool) -> SubStep {
    SubStep {
        id,
        name: name.to_string(),
        kind: SubStepKind::Measurement,
        target_type,
        uom: Some("mm".to_string()),
        min_value: Some(0.4),
        max_value: Some(0.6),
        allow_multiple_measurements: false,
        max_measurement_count: None,
        requires_responsible_person: false,
        is_critical,
    }
}

fn band(temperature: (f64, f64), requires_approval: bool, blocks: bool) -> CatalystBand {
    let ratio = RatioRange { min: 0.01, max: 0.02 };
    CatalystBand {
        min_temperature: temperature.0,
        max_temperature: temperature.1,
        min_humidity: 0.0,
        max_humidity: 80.0,
        gelcoat: ratio,
        resin: ratio,
        topcoat: ratio,
        blocks,
        requires_approval,
    }
}

/// Step numbers: 1 raw materials, 2 catalyst, 3 group 30/1 (critical),
/// 4 group 30/2, 5 inspection.
pub fn hull_template() -> ProcessTemplate {
    ProcessTemplate {
        template_id: "PRC-HULL-01".to_string(),
        name: "Hull lamination".to_string(),
        revision: Some("C".to_string()),
        steps: vec![
            TemplateStep {
                id: 30,
                sequence: 1,
                title: "Layup".to_string(),
                payload: StepPayload::Sequence(SequenceSpec {
                    groups: vec![
                        StepGroup {
                            id: 1,
                            name: "Gelcoat spray".to_string(),
                            description: String::new(),
                            expected_duration_seconds: 60.0,
                            sub_steps: vec![
                                sub_step(100, "Film thickness", TargetType::Range, true),
                                sub_step(101, "Coverage", TargetType::OkNotOk, false),
                            ],
                        },
                        StepGroup {
                            id: 2,
                            name: "Consolidation".to_string(),
                            description: String::new(),
                            expected_duration_seconds: 120.0,
                            sub_steps: vec![sub_step(200, "Roll out", TargetType::OkNotOk, false)],
                        },
                    ],
                }),
            },
            TemplateStep {
                id: 40,
                sequence: 2,
                title: "Final inspection".to_string(),
                payload: StepPayload::Inspection(InspectionSpec {
                    parameters: vec![InspectionParameter {
                        id: 1,
                        name: "Barcol hardness".to_string(),
                        value_type: InspectionValueType::Numeric,
                        is_critical: true,
                        uom: None,
                        min_value: Some(35.0),
                        max_value: None,
                        sub_columns: vec![],
                        reference_files: vec![],
                    }],
                }),
            },
            TemplateStep {
                id: 20,
                sequence: 0,
                title: "Catalyst mixing".to_string(),
                payload: StepPayload::CatalystMixing(CatalystMixingSpec {
                    lines: vec![CatalystLine {
                        id: 1,
                        material_code: MaterialCode::Gelcoat,
                        name: "MEKP".to_string(),
                        raw_material_line: Some(1),
                        planned_quantity: Measurement { value: 12.0, unit: "kg".to_string() },
                    }],
                    bands: vec![
                        band((10.0, 14.9), false, true),
                        band((15.0, 25.0), false, false),
                        band((25.1, 35.0), true, false),
                    ],
                }),
            },
            TemplateStep {
                id: 10,
                sequence: 0,
                title: "Raw materials".to_string(),
                payload: StepPayload::RawMaterials(RawMaterialsSpec {
                    lines: vec![
                        RawMaterialLine {
                            id: 1,
                            material_code: MaterialCode::Gelcoat,
                            name: "Gelcoat white".to_string(),
                            planned_quantity: Measurement { value: 12.0, unit: "kg".to_string() },
                            requires_batch_number: true,
                        },
                        RawMaterialLine {
                            id: 2,
                            material_code: MaterialCode::Resin,
                            name: "Polyester resin".to_string(),
                            planned_quantity: Measurement { value: 40.0, unit: "kg".to_string() },
                            requires_batch_number: false,
                        },
                    ],
                }),
            },
        ],
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.create_execution(EXECUTION, hull_template()).await.unwrap();
        Self {
            store,
            clock: Arc::new(ManualClock::new()),
        }
    }

    pub async fn open(&self) -> ExecutionController {
        ControllerBuilder::new()
            .with_store(self.store.clone())
            .with_clock(self.clock.clone())
            .open(EXECUTION)
            .await
            .unwrap()
    }
}
