use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULTS: &str = include_str!("../../config/default.toml");
const PROJECT_FILE: &str = ".forester-complete.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub forester: ForesterConfig,
    pub completion: CompletionConfig,
    pub new_tree: NewTreeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForesterConfig {
    pub executable: String,
    pub config_file: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    pub show_id_in_label: bool,
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTreeConfig {
    pub dest: String,
    pub prefix: String,
    pub template: String,
    pub random: bool,
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config → project config.
    pub fn load(root: &Path) -> Result<Self> {
        let mut layers = Vec::new();

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "forester-complete") {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if let Some(layer) = read_layer(&config_path)? {
                layers.push(layer);
            }
        }

        if let Some(layer) = read_layer(&root.join(PROJECT_FILE))? {
            layers.push(layer);
        }

        Self::from_layers(&layers)
    }

    /// Merge TOML overrides over the embedded defaults, later layers winning
    /// field by field.
    pub fn from_layers(layers: &[String]) -> Result<Self> {
        let mut merged: toml::Table = toml::from_str(DEFAULTS)?;
        for layer in layers {
            let overlay: toml::Table = toml::from_str(layer)?;
            merge_tables(&mut merged, overlay);
        }

        let config: AppConfig = toml::Value::Table(merged).try_into()?;
        Ok(config)
    }
}

impl ForesterConfig {
    /// The forester config file argument, if one is configured.
    pub fn config_file(&self) -> Option<&str> {
        let trimmed = self.config_file.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl NewTreeConfig {
    pub fn template(&self) -> Option<&str> {
        let trimmed = self.template.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

fn read_layer(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    tracing::info!("config layer {}", path.display());
    Ok(Some(text))
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
