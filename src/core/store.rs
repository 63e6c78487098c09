//! Configuration store - the resolved environment of one pipeline run

use crate::core::config::VariableDefinition;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while resolving or reading configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more declared variables have no literal, secret or override value
    #[error("missing value for declared variable(s): {}", names.join(", "))]
    MissingValue { names: Vec<String> },

    /// A variable was referenced or overridden without being declared
    #[error("variable '{0}' is not declared in the pipeline environment")]
    UndeclaredVariable(String),

    /// A dotenv file could not be read
    #[error("failed to read env file {path}: {message}")]
    EnvFile { path: String, message: String },
}

/// Source of secret values (`${{ secrets.NAME }}` and `null` declarations)
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Secrets taken from the runner's own process environment
    pub fn from_process_env() -> Self {
        Self {
            values: std::env::vars().collect(),
        }
    }

    /// Secrets read from a dotenv file
    pub fn from_env_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let env_file_error = |e: dotenvy::Error| ConfigError::EnvFile {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let mut values = HashMap::new();
        for item in dotenvy::from_path_iter(path).map_err(env_file_error)? {
            let (key, value) = item.map_err(env_file_error)?;
            values.insert(key, value);
        }
        Ok(Self { values })
    }

    /// Add a single secret
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Layer another source on top of this one (the other source wins)
    pub fn layer(mut self, other: Secrets) -> Self {
        self.values.extend(other.values);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Immutable name -> value mapping shared by every step of one run
#[derive(Debug, Clone)]
pub struct ConfigurationStore {
    values: BTreeMap<String, String>,
    /// Values that came from secrets, longest first (for masking)
    secret_values: Vec<String>,
}

impl ConfigurationStore {
    /// Resolve every declaration into a store
    pub fn load(
        declarations: &BTreeMap<String, VariableDefinition>,
        secrets: &Secrets,
    ) -> Result<Self, ConfigError> {
        Self::load_with_overrides(declarations, secrets, &[])
    }

    /// Resolve declarations, letting `overrides` replace declared values
    pub fn load_with_overrides(
        declarations: &BTreeMap<String, VariableDefinition>,
        secrets: &Secrets,
        overrides: &[(String, String)],
    ) -> Result<Self, ConfigError> {
        if let Some((name, _)) = overrides.iter().find(|(k, _)| !declarations.contains_key(k)) {
            return Err(ConfigError::UndeclaredVariable(name.clone()));
        }

        let mut values = BTreeMap::new();
        let mut secret_values = Vec::new();
        let mut missing = Vec::new();

        for (name, definition) in declarations {
            let overridden = overrides
                .iter()
                .rev()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone());

            let resolved = overridden.or_else(|| match definition {
                VariableDefinition::Literal(value) => Some(value.clone()),
                VariableDefinition::Secret(secret) => secrets.get(secret).map(str::to_string),
                VariableDefinition::External => secrets.get(name).map(str::to_string),
            });

            let Some(value) = resolved else {
                missing.push(name.clone());
                continue;
            };

            // Whatever fills a secret slot is masked, overrides included
            if definition.is_sensitive() && !value.is_empty() {
                secret_values.push(value.clone());
            }
            values.insert(name.clone(), value);
        }

        if !missing.is_empty() {
            return Err(ConfigError::MissingValue { names: missing });
        }

        secret_values.retain(|v| !v.is_empty());
        secret_values.sort_by(|a, b| b.len().cmp(&a.len()));
        secret_values.dedup();

        Ok(Self {
            values,
            secret_values,
        })
    }

    /// Get a declared variable
    pub fn get(&self, name: &str) -> Result<&str, ConfigError> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UndeclaredVariable(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all variables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace every secret value in `text` with `***`
    pub fn mask(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for secret in &self.secret_values {
            masked = masked.replace(secret.as_str(), "***");
        }
        masked
    }

    /// Substitute `${{ env.NAME }}` references from the store
    pub fn substitute(&self, text: &str) -> Result<String, ConfigError> {
        let mut rendered = String::with_capacity(text.len());
        let mut last = 0;
        for caps in expression_regex().captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            rendered.push_str(&text[last..whole.start()]);
            if &caps[1] == "env" {
                rendered.push_str(self.get(&caps[2])?);
            } else {
                rendered.push_str(whole.as_str());
            }
            last = whole.end();
        }
        rendered.push_str(&text[last..]);
        Ok(rendered)
    }
}

fn expression_regex() -> &'static Regex {
    static EXPRESSION: OnceLock<Regex> = OnceLock::new();
    EXPRESSION.get_or_init(|| {
        Regex::new(r"\$\{\{\s*([a-z_]+)\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
            .expect("expression regex is valid")
    })
}

/// All `${{ scope.NAME }}` expressions in `text`, as (scope, name) pairs
pub fn expressions(text: &str) -> Vec<(String, String)> {
    expression_regex()
        .captures_iter(text)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// The secret name if `value` is exactly one `${{ secrets.NAME }}` expression
pub fn secret_reference(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let caps = expression_regex().captures(trimmed)?;
    let whole = caps.get(0)?;
    (whole.start() == 0 && whole.end() == trimmed.len() && &caps[1] == "secrets")
        .then(|| caps[2].to_string())
}
