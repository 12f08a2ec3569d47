use crate::timeline::UnitRef;
use chrono::{DateTime, Utc};
use prc_schemas::tree::Key;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What the operator is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    List,
    Detail {
        step_number: usize,
        sub_step: Option<u32>,
    },
    Preview {
        step_number: usize,
    },
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::List => write!(f, "on the step list"),
            View::Detail { step_number, .. } => write!(f, "editing step {}", step_number),
            View::Preview { step_number } => write!(f, "previewing step {}", step_number),
        }
    }
}

/// An operator's acknowledgment of one out-of-range entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckKey {
    pub unit: UnitRef,
    pub entry: Key,
}

/// State that lives only as long as the operator's session.
#[derive(Debug)]
pub(crate) struct Session {
    pub view: View,
    pub cursor: Option<usize>,
    pub started_at: Option<DateTime<Utc>>,
    pub acknowledgments: HashSet<AckKey>,
    pub dirty: bool,
}

impl Session {
    pub fn new(cursor: Option<usize>) -> Self {
        Self {
            view: View::List,
            cursor,
            started_at: None,
            acknowledgments: HashSet::new(),
            dirty: false,
        }
    }
}
