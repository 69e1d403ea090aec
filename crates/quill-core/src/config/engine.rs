//! Engine configuration: defaults, TOML loading, environment overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::traits::{ConfigDefaults, ConfigValidation};
use crate::{QuillError, QuillResult};

/// Environment variable prefix for overrides (`QUILL_PAGE_SIZE`, ...).
pub const ENV_PREFIX: &str = "QUILL_";

/// Tunables for the cache store and mutation controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Records per page for new fingerprints
    pub page_size: u32,
    /// Capacity of the cache change broadcast channel
    pub event_capacity: usize,
    /// Schedule an authoritative refetch when a mutation settles
    pub refetch_on_settle: bool,
    /// Upper bound of pages re-read by a refetch
    pub max_refetch_pages: usize,
    /// Notification headline for failed submissions
    pub failure_title: String,
    /// Notification body for failed submissions
    pub failure_description: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            event_capacity: 256,
            refetch_on_settle: true,
            max_refetch_pages: 10,
            failure_title: "Something went wrong".to_string(),
            failure_description: "There was an error sending your message.".to_string(),
        }
    }
}

impl ConfigDefaults for EngineConfig {
    fn defaults() -> Self {
        Self::default()
    }
}

impl ConfigValidation for EngineConfig {
    fn validate(&self) -> QuillResult<()> {
        if self.page_size == 0 {
            return Err(QuillError::config("page_size", "must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(QuillError::config(
                "event_capacity",
                "must be greater than zero",
            ));
        }
        if self.max_refetch_pages == 0 {
            return Err(QuillError::config(
                "max_refetch_pages",
                "must be greater than zero",
            ));
        }
        if self.failure_title.trim().is_empty() {
            return Err(QuillError::config("failure_title", "must not be empty"));
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> QuillResult<Self> {
        toml::from_str(content).map_err(|e| QuillError::config("toml", e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load_from_file(path: &Path) -> QuillResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuillError::config(path.display().to_string(), format!("failed to read: {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> QuillResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "Config file absent, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply `QUILL_*` overrides from the process environment.
    pub fn merge_with_env(&mut self) -> QuillResult<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `QUILL_*` overrides from an explicit variable list.
    ///
    /// Unknown `QUILL_*` keys are ignored.
    pub fn merge_with_vars(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> QuillResult<()> {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            self.set_from_string(&field.to_lowercase(), &value)?;
        }
        Ok(())
    }

    /// Set a single field from its string form.
    pub fn set_from_string(&mut self, key: &str, value: &str) -> QuillResult<()> {
        match key {
            "page_size" => self.page_size = parse_field(key, value)?,
            "event_capacity" => self.event_capacity = parse_field(key, value)?,
            "refetch_on_settle" => self.refetch_on_settle = parse_field(key, value)?,
            "max_refetch_pages" => self.max_refetch_pages = parse_field(key, value)?,
            "failure_title" => self.failure_title = value.to_string(),
            "failure_description" => self.failure_description = value.to_string(),
            other => tracing::trace!(key = other, "Ignoring unknown config override"),
        }
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> QuillResult<String> {
        toml::to_string_pretty(self).map_err(|e| QuillError::internal(e.to_string()))
    }
}

fn parse_field<T>(key: &str, value: &str) -> QuillResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| QuillError::config(key, format!("invalid value '{value}': {e}")))
}
