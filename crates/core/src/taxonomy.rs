//! Classification taxonomy for nucleated cells seen on a blood smear.
//!
//! The canonical index of each category is part of the external contract: clients encode a
//! cell's classification as its index, and the index is also the sort key of the report table.
//! Indices are dense, zero-based and never reordered.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// A recognised nucleated-cell category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellClass {
    Unidentified = 0,
    Neutrophil = 1,
    Lymphocyte = 2,
    Monocyte = 3,
    Basophil = 4,
    Eosinophil = 5,
    ImmatureGranulocyte = 6,
    Blast = 7,
    Unclassified = 8,
    Nrbc = 9,
    SmudgeCell = 10,
}

/// Every category in canonical order; `ALL[i].index() == i`.
pub const ALL: [CellClass; 11] = [
    CellClass::Unidentified,
    CellClass::Neutrophil,
    CellClass::Lymphocyte,
    CellClass::Monocyte,
    CellClass::Basophil,
    CellClass::Eosinophil,
    CellClass::ImmatureGranulocyte,
    CellClass::Blast,
    CellClass::Unclassified,
    CellClass::Nrbc,
    CellClass::SmudgeCell,
];

/// Index of the nucleated red cell category, reported outside the percentage table.
pub const NRBC_INDEX: usize = CellClass::Nrbc as usize;

impl CellClass {
    pub fn index(self) -> usize {
        self as usize
    }

    /// Display name used as the report table key.
    pub fn name(self) -> &'static str {
        match self {
            CellClass::Unidentified => "unidentified",
            CellClass::Neutrophil => "neutrophils",
            CellClass::Lymphocyte => "lymphocytes",
            CellClass::Monocyte => "monocytes",
            CellClass::Basophil => "basophils",
            CellClass::Eosinophil => "eosinophils",
            CellClass::ImmatureGranulocyte => "immature_granulocytes",
            CellClass::Blast => "blasts",
            CellClass::Unclassified => "unclassified",
            CellClass::Nrbc => "nrbcs",
            CellClass::SmudgeCell => "smudge_cells",
        }
    }

    /// Must appear in every non-empty report, with zero count if not observed.
    pub fn always_report(self) -> bool {
        matches!(
            self,
            CellClass::Neutrophil
                | CellClass::Lymphocyte
                | CellClass::Monocyte
                | CellClass::Basophil
                | CellClass::Eosinophil
        )
    }

    /// Not counted toward the WBC total used as the percentage denominator.
    pub fn excluded_from_total(self) -> bool {
        matches!(
            self,
            CellClass::Unidentified | CellClass::Nrbc | CellClass::SmudgeCell
        )
    }

    /// Shown on the report when observed. Unidentified and smudge cells never are; NRBCs are,
    /// but under their own key.
    pub fn display_if_present(self) -> bool {
        !matches!(self, CellClass::Unidentified | CellClass::SmudgeCell)
    }
}

impl fmt::Display for CellClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Category names in canonical order.
pub fn categories() -> Vec<&'static str> {
    ALL.iter().map(|c| c.name()).collect()
}

/// Looks up a category by canonical index. `None` means the index is out of range.
pub fn category(index: usize) -> Option<CellClass> {
    ALL.get(index).copied()
}

/// Maps a display name back to its canonical index.
pub fn index_of(name: &str) -> Option<usize> {
    let name = name.trim();
    ALL.iter()
        .find(|c| c.name().eq_ignore_ascii_case(name))
        .map(|c| c.index())
}

pub fn excluded_indices() -> BTreeSet<usize> {
    ALL.iter()
        .filter(|c| c.excluded_from_total())
        .map(|c| c.index())
        .collect()
}

pub fn always_report_indices() -> BTreeSet<usize> {
    ALL.iter()
        .filter(|c| c.always_report())
        .map(|c| c.index())
        .collect()
}

pub fn is_excluded(index: usize) -> bool {
    category(index).is_some_and(CellClass::excluded_from_total)
}
