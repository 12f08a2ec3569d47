use chrono::{DateTime, Utc};
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

#[derive(Debug, Serialize)]
struct AuditEntry<'a> {
    timestamp: DateTime<Utc>,
    execution_id: &'a str,
    step_number: Option<usize>,
    unit: &'a str,
    action: &'a str,
    detail_json: String,
}

/// Appends one CSV row per engine action to an audit trail.
pub struct AuditLogger {
    writer: Writer<fs::File>,
}

impl AuditLogger {
    /// Opens `path` for appending. The header row is written only when the
    /// file is new or empty.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, io::Error> {
        let path = path.as_ref();
        let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = WriterBuilder::new().has_headers(is_new).from_writer(file);
        Ok(Self { writer })
    }

    pub fn log_action<D: Serialize>(
        &mut self,
        at: DateTime<Utc>,
        execution_id: &str,
        step_number: Option<usize>,
        unit: &str,
        action: &str,
        detail: &D,
    ) -> Result<(), anyhow::Error> {
        let entry = AuditEntry {
            timestamp: at,
            execution_id,
            step_number,
            unit,
            action,
            detail_json: serde_json::to_string(detail)?,
        };

        self.writer.serialize(entry)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reopening_appends_without_a_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.csv");
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

        let mut logger = AuditLogger::new(&path).unwrap();
        logger
            .log_action(
                at,
                "EX-1",
                Some(1),
                "1",
                "submit",
                &serde_json::json!({ "kind": "raw_materials" }),
            )
            .unwrap();
        drop(logger);

        let mut logger = AuditLogger::new(&path).unwrap();
        logger
            .log_action(at, "EX-1", None, "", "save_retried", &serde_json::json!(null))
            .unwrap();
        drop(logger);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["timestamp", "execution_id", "step_number", "unit", "action", "detail_json"]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][4], "submit");
        assert_eq!(&rows[1][2], "");
        assert!(rows[0][5].contains("raw_materials"));
    }
}
