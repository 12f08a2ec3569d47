use prc_schemas::tree::{Key, StatusFlag};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldErrorKind {
    Missing,
    NotNumeric,
    InvalidChoice,
    BelowMinimum { min: f64 },
    AboveMaximum { max: f64 },
    TooManyMeasurements { max: usize },
    MissingResponsiblePerson,
    MissingBatchNumber,
    UnknownEntry,
    Duplicate,
}

/// One rejected input field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: FieldErrorKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FieldErrorKind::Missing => write!(f, "{}: value is required", self.field),
            FieldErrorKind::NotNumeric => write!(f, "{}: value must be numeric", self.field),
            FieldErrorKind::InvalidChoice => {
                write!(f, "{}: value must be OK or NOT OK", self.field)
            }
            FieldErrorKind::BelowMinimum { min } => {
                write!(f, "{}: value is below the minimum of {}", self.field, min)
            }
            FieldErrorKind::AboveMaximum { max } => {
                write!(f, "{}: value is above the maximum of {}", self.field, max)
            }
            FieldErrorKind::TooManyMeasurements { max } => {
                write!(f, "{}: at most {} measurements are allowed", self.field, max)
            }
            FieldErrorKind::MissingResponsiblePerson => {
                write!(f, "{}: a responsible person is required", self.field)
            }
            FieldErrorKind::MissingBatchNumber => {
                write!(f, "{}: a batch number is required", self.field)
            }
            FieldErrorKind::UnknownEntry => write!(f, "{}: not part of this step", self.field),
            FieldErrorKind::Duplicate => write!(f, "{}: submitted more than once", self.field),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Execution '{0}' not found")]
    NotFound(String),

    #[error("Execution '{0}' already exists")]
    AlreadyExists(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error for file '{0}': {1}")]
    FileIO(String, #[source] std::io::Error),

    #[error("Failed to parse JSON from '{0}': {1}")]
    JsonParsing(String, #[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PrcError {
    #[error("Step number {0} does not exist in this execution")]
    UnknownStep(usize),

    #[error("Template step '{0}' is not part of the template")]
    UnknownUnit(String),

    #[error("Sub-step {0} is not part of the selected group")]
    UnknownSubStep(u32),

    #[error("Cannot {action} while {view}")]
    InvalidTransition { action: &'static str, view: String },

    #[error("Step {0} is already completed and cannot be changed")]
    UnitLocked(usize),

    #[error("Step {step_number} is not ready: {reason}")]
    NotReady { step_number: usize, reason: String },

    #[error("Flag '{flag}' does not apply to step {step_number}")]
    GateNotApplicable { step_number: usize, flag: StatusFlag },

    #[error("Submission does not match the selected step: {0}")]
    WrongSubmission(String),

    #[error("Validation failed: {}", join(.errors))]
    Validation { errors: Vec<FieldError> },

    #[error("Out-of-range entries need acknowledgment: {}", join(.entries))]
    AcknowledgmentRequired { entries: Vec<Key> },

    #[error("Catalyst line {line} is blocked at the current conditions")]
    Blocked { line: u32 },

    #[error("Failed to persist execution '{execution_id}': {source}")]
    Persistence {
        execution_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to load execution: {0}")]
    Load(#[source] StoreError),

    #[error("Controller is missing its {0}")]
    ConfigError(&'static str),

    #[error("I/O error for file '{0}': {1}")]
    FileIO(String, #[source] std::io::Error),

    #[error("An error occurred during audit logging: {0}")]
    LoggingError(#[from] anyhow::Error),
}

impl PrcError {
    /// Errors caused by operator input rather than by the engine or the store.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PrcError::Validation { .. }
                | PrcError::AcknowledgmentRequired { .. }
                | PrcError::Blocked { .. }
        )
    }
}
