use anyhow::{Context, Result};
use prc_schemas::{file_formats::TemplateFile, template::ProcessTemplate};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

/// Settings read from `prc.yaml`. Command-line flags override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub catalog_dir: PathBuf,
    pub store_dir: PathBuf,
    pub audit_log: Option<PathBuf>,
    /// Used as the responsible person when a submission does not name one.
    pub operator: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_dir: PathBuf::from("./data/catalog"),
            store_dir: PathBuf::from("./data/executions"),
            audit_log: None,
            operator: None,
        }
    }
}

impl AppConfig {
    /// Reads the config file if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML from {:?}", path))
    }
}

/// Every process template found in the catalog directory, by template id.
pub struct Catalog {
    pub templates: HashMap<String, ProcessTemplate>,
}

impl Catalog {
    pub fn load(base_path: &Path) -> Result<Self> {
        tracing::info!(path = %base_path.display(), "loading template catalog");
        let templates = load_yaml_files_into_map(
            base_path,
            |file: TemplateFile| file.templates,
            |item: &ProcessTemplate| item.template_id.clone(),
        )?;
        tracing::info!(templates = templates.len(), "catalog loaded");
        Ok(Self { templates })
    }

    pub fn get(&self, template_id: &str) -> Result<&ProcessTemplate> {
        self.templates
            .get(template_id)
            .with_context(|| format!("Template '{}' is not in the catalog", template_id))
    }
}

/// Loads all YAML files in a directory into a HashMap.
fn load_yaml_files_into_map<P, F, E, T, K>(
    dir_path: P,
    extract_vec: E,
    get_key: K,
) -> Result<HashMap<String, T>>
where
    P: AsRef<Path>,
    F: for<'de> serde::Deserialize<'de>,
    E: Fn(F) -> Vec<T>,
    K: Fn(&T) -> String,
{
    let mut map = HashMap::new();
    for entry in fs::read_dir(dir_path.as_ref())
        .with_context(|| format!("Failed to read directory: {:?}", dir_path.as_ref()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |s| s == "yaml" || s == "yml") {
            let content = fs::read_to_string(&path)?;
            let file_wrapper: F = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML from {:?}", path))?;

            for item in extract_vec(file_wrapper) {
                let key = get_key(&item);
                if map.insert(key.clone(), item).is_some() {
                    tracing::warn!(
                        %key,
                        path = %path.display(),
                        "duplicate catalog entry replaced"
                    );
                }
            }
        }
    }
    Ok(map)
}
