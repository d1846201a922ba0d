//! Morphology catalogue entries and the findings attached to samples.

use chrono::{DateTime, Utc};
use lab_uuid::LabUuid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::LabError;

/// Cell line a morphology finding describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    #[default]
    Wbc,
    Rbc,
    Platelet,
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CellType::Wbc => "wbc",
            CellType::Rbc => "rbc",
            CellType::Platelet => "platelet",
        })
    }
}

impl FromStr for CellType {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wbc" => Ok(CellType::Wbc),
            "rbc" => Ok(CellType::Rbc),
            "platelet" | "plt" => Ok(CellType::Platelet),
            other => Err(LabError::InvalidInput(format!("unknown cell type '{other}'"))),
        }
    }
}

/// Grading option, mainly for red-cell findings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOption {
    Slight,
    Moderate,
    Marked,
}

impl ResultOption {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultOption::Slight => "slight",
            ResultOption::Moderate => "moderate",
            ResultOption::Marked => "marked",
        }
    }
}

impl fmt::Display for ResultOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultOption {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slight" => Ok(ResultOption::Slight),
            "moderate" => Ok(ResultOption::Moderate),
            "marked" => Ok(ResultOption::Marked),
            other => Err(LabError::InvalidInput(format!(
                "unknown result option '{other}'"
            ))),
        }
    }
}

/// One reportable qualitative finding in the catalogue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Morphology {
    pub id: LabUuid,
    pub cell_type: CellType,
    pub name: String,
    #[serde(default)]
    pub result_options: Vec<ResultOption>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A catalogue finding attached to a sample, with the technologist's optional note.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphologyFinding {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl MorphologyFinding {
    pub fn new(name: impl Into<String>, note: Option<String>) -> Self {
        Self {
            name: name.into(),
            note,
        }
    }
}
