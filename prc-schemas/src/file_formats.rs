use crate::template::ProcessTemplate;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TemplateFile {
    pub schema_version: String,
    pub templates: Vec<ProcessTemplate>,
}
