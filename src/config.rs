use crate::error::{ImportError, ImportResult};
use crate::planner::{ChunkPlanner, UrlTemplate, DEFAULT_URL_TEMPLATE};
use crate::rules::{RuleRegistry, TemporalFormats};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ROWS_PER_REQUEST_ENV: &str = "CSV_IMPORT_ROWS_PER_REQUEST";
pub const URL_TEMPLATE_ENV: &str = "CSV_IMPORT_URL_TEMPLATE";

/// Engine-wide settings, usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Rows imported per chunk request.
    pub rows_per_request: usize,
    pub url_template: String,
    /// Directory job file paths are resolved against.
    pub project_dir: PathBuf,
    pub temporal_formats: TemporalFormats,
    /// Extra regex rules, keyed by validation tag.
    pub regex_rules: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rows_per_request: 50,
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            project_dir: PathBuf::from("."),
            temporal_formats: TemporalFormats::default(),
            regex_rules: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Reads `path` when given, then applies environment overrides.
    pub async fn load(path: Option<&Path>) -> ImportResult<Self> {
        let mut config = match path {
            Some(path) => serde_json::from_str(&tokio::fs::read_to_string(path).await?)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> ImportResult<()> {
        if let Some(raw) = var(ROWS_PER_REQUEST_ENV) {
            self.rows_per_request = raw.trim().parse().map_err(|_| {
                ImportError::Config(format!("{ROWS_PER_REQUEST_ENV} is not a number: '{raw}'"))
            })?;
        }
        if let Some(template) = var(URL_TEMPLATE_ENV) {
            self.url_template = template;
        }
        Ok(())
    }

    pub fn planner(&self) -> ImportResult<ChunkPlanner> {
        ChunkPlanner::new(self.rows_per_request)
    }

    pub fn url_template(&self) -> ImportResult<UrlTemplate> {
        UrlTemplate::parse(&self.url_template)
    }

    pub fn rule_registry(&self) -> ImportResult<RuleRegistry> {
        let mut rules = RuleRegistry::with_formats(&self.temporal_formats);
        for (tag, pattern) in &self.regex_rules {
            rules
                .register_regex(tag.as_str(), pattern)
                .map_err(|e| ImportError::Config(format!("rule '{tag}': {e}")))?;
        }
        Ok(rules)
    }
}
