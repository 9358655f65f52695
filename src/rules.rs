//! Per-field format rules, dispatched by the descriptor's validation tag.

use crate::error::ErrorKind;
use crate::job::FieldDescriptor;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A format check for one validation tag.
pub trait FieldRule: Send + Sync {
    fn accepts(&self, value: &str) -> bool;
}

impl<F> FieldRule for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn accepts(&self, value: &str) -> bool {
        self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    Date,
    DateTime,
    Time,
}

/// Parses values with a chrono format string.
#[derive(Debug, Clone)]
pub struct TemporalRule {
    kind: TemporalKind,
    format: String,
}

impl TemporalRule {
    pub fn new(kind: TemporalKind, format: impl Into<String>) -> Self {
        Self {
            kind,
            format: format.into(),
        }
    }
}

impl FieldRule for TemporalRule {
    fn accepts(&self, value: &str) -> bool {
        let value = value.trim();
        match self.kind {
            TemporalKind::Date => NaiveDate::parse_from_str(value, &self.format).is_ok(),
            TemporalKind::DateTime => NaiveDateTime::parse_from_str(value, &self.format).is_ok(),
            TemporalKind::Time => NaiveTime::parse_from_str(value, &self.format).is_ok(),
        }
    }
}

/// Whole-value regular expression match.
#[derive(Debug, Clone)]
pub struct RegexRule(Regex);

impl RegexRule {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{pattern})$")).map(Self)
    }
}

impl FieldRule for RegexRule {
    fn accepts(&self, value: &str) -> bool {
        self.0.is_match(value)
    }
}

/// chrono format strings for the built-in temporal tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemporalFormats {
    pub date: String,
    pub datim: String,
    pub time: String,
}

impl Default for TemporalFormats {
    fn default() -> Self {
        Self {
            date: "%Y-%m-%d".into(),
            datim: "%Y-%m-%d %H:%M".into(),
            time: "%H:%M".into(),
        }
    }
}

/// Maps validation tags to rules. Tags without a registered rule are not checked.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, Arc<dyn FieldRule>>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.rules.keys().collect();
        tags.sort();
        f.debug_struct("RuleRegistry").field("tags", &tags).finish()
    }
}

impl RuleRegistry {
    /// Registry with the `date`, `datim` (alias `datetime`) and `time` rules.
    pub fn with_formats(formats: &TemporalFormats) -> Self {
        let mut registry = Self::default();
        registry.register("date", TemporalRule::new(TemporalKind::Date, &formats.date));
        let datim = TemporalRule::new(TemporalKind::DateTime, &formats.datim);
        registry.register("datim", datim.clone());
        registry.register("datetime", datim);
        registry.register("time", TemporalRule::new(TemporalKind::Time, &formats.time));
        registry
    }

    pub fn register(&mut self, tag: impl Into<String>, rule: impl FieldRule + 'static) {
        self.rules.insert(tag.into(), Arc::new(rule));
    }

    pub fn register_regex(
        &mut self,
        tag: impl Into<String>,
        pattern: &str,
    ) -> Result<(), regex::Error> {
        self.register(tag, RegexRule::new(pattern)?);
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.rules.contains_key(tag)
    }

    /// Format errors for one value.
    ///
    /// Empty values and skip-listed fields are never format-checked.
    pub fn validate(
        &self,
        value: &str,
        descriptor: &FieldDescriptor,
        skip_format: bool,
    ) -> Vec<ErrorKind> {
        if value.is_empty() || skip_format {
            return Vec::new();
        }
        let Some(tag) = descriptor.validation.as_deref() else {
            return Vec::new();
        };
        let Some(rule) = self.rules.get(tag) else {
            debug!(field = %descriptor.name, tag, "no rule registered for validation tag");
            return Vec::new();
        };
        if rule.accepts(value) {
            Vec::new()
        } else {
            vec![ErrorKind::InvalidFormat {
                value: value.to_string(),
                rule: tag.to_string(),
            }]
        }
    }
}
