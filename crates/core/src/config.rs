//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services.
//! Services never read process-wide environment variables during request handling, which
//! keeps behaviour consistent in multi-threaded runtimes and test harnesses.

use crate::constants::{MORPHOLOGY_CATALOGUE_FILENAME, SAMPLES_DIR_NAME};
use crate::{LabError, LabResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Deployment profile selected by `LAB_CONFIG`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl Environment {
    /// Default tracing level for this profile.
    pub fn default_log_level(self) -> &'static str {
        match self {
            Environment::Development => "debug",
            Environment::Testing | Environment::Production => "info",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        })
    }
}

impl FromStr for Environment {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "default" => Ok(Environment::Development),
            "testing" => Ok(Environment::Testing),
            "production" => Ok(Environment::Production),
            other => Err(LabError::InvalidInput(format!(
                "unknown LAB_CONFIG profile '{other}' (expected development, testing or production)"
            ))),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    lab_data_dir: PathBuf,
    environment: Environment,
}

impl CoreConfig {
    pub fn new(lab_data_dir: PathBuf, environment: Environment) -> LabResult<Self> {
        if lab_data_dir.as_os_str().is_empty() {
            return Err(LabError::InvalidInput(
                "lab_data_dir cannot be empty".into(),
            ));
        }

        Ok(Self {
            lab_data_dir,
            environment,
        })
    }

    pub fn lab_data_dir(&self) -> &Path {
        &self.lab_data_dir
    }

    pub fn samples_dir(&self) -> PathBuf {
        self.lab_data_dir.join(SAMPLES_DIR_NAME)
    }

    pub fn morphology_catalogue_path(&self) -> PathBuf {
        self.lab_data_dir.join(MORPHOLOGY_CATALOGUE_FILENAME)
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }
}

/// Parse the deployment profile from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`Environment::Development`].
pub fn environment_from_env_value(value: Option<String>) -> LabResult<Environment> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let parsed = value.map(|v| v.parse::<Environment>()).transpose()?;

    Ok(parsed.unwrap_or_default())
}
