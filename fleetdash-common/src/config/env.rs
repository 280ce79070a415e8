//! Environment variable parsing with type safety.
//!
//! Every variable is read as `FLEETDASH_<NAME>`. Bad values fall back to the
//! default and are recorded, so startup can report all problems at once.

use super::source::Sourced;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error, PartialEq)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    lookup: Lookup,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Parser over the process environment with the `FLEETDASH_` prefix.
    pub fn new() -> Self {
        Self {
            prefix: "FLEETDASH_",
            lookup: Box::new(|name| std::env::var(name).ok()),
            errors: Vec::new(),
        }
    }

    /// Parser over a fixed set of variables (full names, prefix included).
    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self {
            prefix: "FLEETDASH_",
            lookup: Box::new(move |name| vars.get(name).cloned()),
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn raw(&self, var_name: &str) -> Option<String> {
        (self.lookup)(var_name)
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match self.raw(&var_name) {
            Some(value) if !value.is_empty() => Sourced::from_env(value, var_name),
            _ => Sourced::default_value(default.to_string()),
        }
    }

    /// Get a u32 value with default and range validation.
    pub fn get_u32_range(&mut self, name: &str, default: u32, min: u32, max: u32) -> Sourced<u32> {
        let var_name = self.var_name(name);
        let Some(value) = self.raw(&var_name) else {
            return Sourced::default_value(default);
        };
        match value.trim().parse::<u32>() {
            Ok(n) if (min..=max).contains(&n) => Sourced::from_env(n, var_name),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name.clone(),
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                Sourced::from_env(default, var_name)
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "unsigned 32-bit integer".to_string(),
                    value,
                });
                Sourced::default_value(default)
            }
        }
    }

    /// Get a duration given in milliseconds, with range validation.
    pub fn get_duration_ms(
        &mut self,
        name: &str,
        default: Duration,
        min: Duration,
        max: Duration,
    ) -> Sourced<Duration> {
        let var_name = self.var_name(name);
        let Some(value) = self.raw(&var_name) else {
            return Sourced::default_value(default);
        };
        match value.trim().parse::<u64>() {
            Ok(ms) if (min..=max).contains(&Duration::from_millis(ms)) => {
                Sourced::from_env(Duration::from_millis(ms), var_name)
            }
            Ok(ms) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name.clone(),
                    value: ms.to_string(),
                    min: min.as_millis().to_string(),
                    max: max.as_millis().to_string(),
                });
                Sourced::from_env(default, var_name)
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "duration in milliseconds".to_string(),
                    value,
                });
                Sourced::default_value(default)
            }
        }
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        let Some(value) = self.raw(&var_name) else {
            return Sourced::default_value(default.to_string());
        };
        let lower = value.to_lowercase();
        match lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => {
                Sourced::from_env(lower, var_name)
            }
            _ => {
                self.errors.push(EnvError::InvalidLogLevel {
                    var: var_name.clone(),
                    value,
                });
                Sourced::from_env(default.to_string(), var_name)
            }
        }
    }

    /// Get a comma-separated list of strings.
    pub fn get_string_list(&mut self, name: &str, default: Vec<String>) -> Sourced<Vec<String>> {
        let var_name = self.var_name(name);
        match self.raw(&var_name) {
            Some(value) => {
                let items = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                Sourced::from_env(items, var_name)
            }
            None => Sourced::default_value(default),
        }
    }

    /// Get a path value with `~/` expansion.
    pub fn get_path(&mut self, name: &str, default: Option<&str>) -> Sourced<Option<PathBuf>> {
        let var_name = self.var_name(name);
        match self.raw(&var_name) {
            Some(value) if !value.is_empty() => Sourced::from_env(Some(expand_home(&value)), var_name),
            _ => Sourced::default_value(default.map(expand_home)),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(stripped) => dirs::home_dir()
            .map(|home| home.join(stripped))
            .unwrap_or_else(|| PathBuf::from(value)),
        None => PathBuf::from(value),
    }
}
