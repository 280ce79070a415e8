//! Source tracking for configuration values.

use serde::Serialize;

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// Process environment.
    Environment,
    /// Command-line flag.
    CommandLine,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Environment => write!(f, "env"),
            Self::CommandLine => write!(f, "cli"),
        }
    }
}

/// A configuration value paired with its origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Variable name when the value came from the environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            var: None,
        }
    }

    pub fn from_env(value: T, var: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            var: Some(var.into()),
        }
    }

    pub fn from_cli(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::CommandLine,
            var: None,
        }
    }

    /// Replace the value with a command-line override when one was given.
    #[must_use]
    pub fn or_cli(self, cli: Option<T>) -> Self {
        match cli {
            Some(value) => Self::from_cli(value),
            None => self,
        }
    }
}
