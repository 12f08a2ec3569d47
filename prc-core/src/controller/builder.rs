use super::{
    session::{Clock, Session, SystemClock},
    ExecutionController,
};
use crate::{error::PrcError, logger::AuditLogger, store::ExecutionStore};
use std::path::PathBuf;
use std::sync::Arc;

/// A fluent builder for opening an `ExecutionController`.
#[derive(Default)]
pub struct ControllerBuilder {
    store: Option<Arc<dyn ExecutionStore>>,
    clock: Option<Arc<dyn Clock>>,
    audit_path: Option<PathBuf>,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store the execution is loaded from and saved to.
    pub fn with_store(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Overrides the wall clock used for timing spans and audit rows.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Appends an audit row for every engine action to the given CSV file.
    pub fn with_audit_log_to_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_path = Some(path.into());
        self
    }

    /// Loads the execution and returns a controller positioned on the step list.
    ///
    /// # Errors
    ///
    /// Returns a `PrcError` if no store was provided, the audit log cannot be
    /// opened, or the store cannot load the execution.
    pub async fn open(self, execution_id: &str) -> Result<ExecutionController, PrcError> {
        let store = self.store.ok_or(PrcError::ConfigError("store"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let audit = match self.audit_path {
            Some(path) => Some(
                AuditLogger::new(&path)
                    .map_err(|e| PrcError::FileIO(path.display().to_string(), e))?,
            ),
            None => None,
        };

        let record = store.load(execution_id).await.map_err(PrcError::Load)?;
        tracing::info!(
            execution_id,
            template = %record.template.template_id,
            completed = record.counters.steps_completed,
            total = record.counters.total_steps,
            "opened execution"
        );

        let mut controller = ExecutionController {
            execution_id: record.execution_id,
            template: record.template,
            progress: record.progress,
            timing: record.timing,
            session: Session::new(None),
            store,
            clock,
            audit,
        };
        controller.session.cursor = controller.next_open_step();
        let counters = controller.counters();
        controller.audit(None, "", "open", &counters)?;
        Ok(controller)
    }
}
