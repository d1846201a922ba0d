//! WBC differential computation.
//!
//! Converts per-category raw counts from a manual slide review into relative percentages and
//! absolute counts. The computation is a pure function of its input: no I/O, no shared state.
//!
//! Rounding reproduces historical reports exactly:
//! - the scale factor `100 / total` is rounded to 3 decimal places before use,
//! - relative values are rounded to a whole number,
//! - absolute values are rounded to 2 decimal places,
//!
//! and every rounding step resolves ties to the even neighbour.

use crate::taxonomy::{self, CellClass, NRBC_INDEX};
use crate::{LabError, LabResult};
use lab_types::WbcConcentration;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// One observed (category, count) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCount {
    /// Canonical taxonomy index.
    pub category: usize,
    pub count: u32,
}

impl RawCount {
    pub fn new(category: usize, count: u32) -> Self {
        Self { category, count }
    }
}

/// One row of the percentage table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellResult {
    /// Canonical taxonomy index; the table is ordered by this value.
    pub sequence: usize,
    /// Percentage of the counted white cells, rounded to a whole number.
    pub relative: f64,
    /// `wbc * relative / 100`, rounded to 2 decimal places.
    pub absolute: f64,
}

/// Nucleated red cells per 100 counted white cells.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NrbcResult {
    pub relative: f64,
    pub absolute: f64,
}

/// Percentage table keyed by category name, always in ascending `sequence` order.
///
/// Serializes as a JSON object whose keys follow table order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DifferentialTable(Vec<(String, CellResult)>);

impl DifferentialTable {
    fn from_unsorted(mut entries: Vec<(String, CellResult)>) -> Self {
        entries.sort_by_key(|(_, cell)| cell.sequence);
        Self(entries)
    }

    pub fn get(&self, name: &str) -> Option<&CellResult> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, cell)| cell)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellResult)> {
        self.0.iter().map(|(name, cell)| (name.as_str(), cell))
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of the relative column.
    pub fn relative_sum(&self) -> f64 {
        self.0.iter().map(|(_, cell)| cell.relative).sum()
    }
}

impl Serialize for DifferentialTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, cell) in &self.0 {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DifferentialTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = DifferentialTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of category name to differential cell result")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, cell)) = access.next_entry::<String, CellResult>()? {
                    entries.push((name, cell));
                }
                Ok(DifferentialTable::from_unsorted(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Computed differential.
///
/// `total == 0` with an empty table is the valid "no countable cells observed" outcome.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DifferentialReport {
    pub diff: DifferentialTable,
    /// Sum of counts in categories not excluded from the total; the percentage base.
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nrbcs: Option<NrbcResult>,
}

impl DifferentialReport {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn has_nrbc(&self) -> bool {
        self.nrbcs.is_some()
    }
}

/// Validated engine input: the analyser WBC concentration plus deduplicated raw counts.
#[derive(Clone, Debug, PartialEq)]
pub struct DifferentialInput {
    wbc: WbcConcentration,
    counts: Vec<RawCount>,
}

impl DifferentialInput {
    /// Validates the input before any computation.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `wbc` is not a finite positive number,
    /// - `CategoryOutOfRange` if a category index is not in the taxonomy,
    /// - `DuplicateCategory` if an index appears more than once.
    pub fn new(wbc: f64, counts: Vec<RawCount>) -> LabResult<Self> {
        let wbc = WbcConcentration::new(wbc)?;

        let mut seen = BTreeSet::new();
        for raw in &counts {
            if taxonomy::category(raw.category).is_none() {
                return Err(LabError::CategoryOutOfRange(raw.category));
            }
            if !seen.insert(raw.category) {
                return Err(LabError::DuplicateCategory(raw.category));
            }
        }

        Ok(Self { wbc, counts })
    }

    pub fn wbc(&self) -> f64 {
        self.wbc.value()
    }

    pub fn counts(&self) -> &[RawCount] {
        &self.counts
    }

    /// Runs the differential. Infallible: every failure mode was rejected by [`Self::new`].
    pub fn compute(&self) -> DifferentialReport {
        let mut total: u64 = 0;
        let mut nrbc_count = None;

        for raw in &self.counts {
            if !taxonomy::is_excluded(raw.category) {
                total += u64::from(raw.count);
            }
            if raw.category == NRBC_INDEX && raw.count > 0 {
                nrbc_count = Some(raw.count);
            }
        }

        if total == 0 {
            return DifferentialReport::empty();
        }

        let factor = scale_factor(total);
        let wbc = self.wbc.value();

        let mut observed: Vec<(CellClass, u32)> = self
            .counts
            .iter()
            .filter_map(|raw| taxonomy::category(raw.category).map(|class| (class, raw.count)))
            .filter(|(class, _)| !class.excluded_from_total())
            .collect();

        for index in taxonomy::always_report_indices() {
            if !self.counts.iter().any(|raw| raw.category == index) {
                if let Some(class) = taxonomy::category(index) {
                    observed.push((class, 0));
                }
            }
        }

        let entries = observed
            .into_iter()
            .map(|(class, count)| {
                let relative = relative_value(count, factor);
                let cell = CellResult {
                    sequence: class.index(),
                    relative,
                    absolute: absolute_value(wbc, relative),
                };
                (class.name().to_string(), cell)
            })
            .collect();

        let nrbcs = nrbc_count.map(|count| {
            let relative = relative_value(count, factor);
            NrbcResult {
                relative,
                absolute: absolute_value(wbc, relative),
            }
        });

        DifferentialReport {
            diff: DifferentialTable::from_unsorted(entries),
            total,
            nrbcs,
        }
    }
}

/// Computes a differential from the analyser WBC concentration and raw counts.
///
/// # Errors
///
/// See [`DifferentialInput::new`]. No partial report is ever produced.
pub fn compute_differential(wbc: f64, raw_counts: &[RawCount]) -> LabResult<DifferentialReport> {
    DifferentialInput::new(wbc, raw_counts.to_vec()).map(|input| input.compute())
}

/// Merges per-cell classifications into one `RawCount` per category, in canonical order.
///
/// # Errors
///
/// Returns `CategoryOutOfRange` for an index outside the taxonomy.
pub fn tally_cells<I>(classes: I) -> LabResult<Vec<RawCount>>
where
    I: IntoIterator<Item = usize>,
{
    let mut counts = [0u32; taxonomy::ALL.len()];
    for index in classes {
        let slot = counts
            .get_mut(index)
            .ok_or(LabError::CategoryOutOfRange(index))?;
        *slot = slot.saturating_add(1);
    }

    Ok(counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(category, &count)| RawCount { category, count })
        .collect())
}

/// `100 / total`, rounded to 3 decimal places.
pub fn scale_factor(total: u64) -> f64 {
    round_half_even(100.0 / total as f64, 3)
}

fn relative_value(count: u32, factor: f64) -> f64 {
    (f64::from(count) * factor).round_ties_even()
}

fn absolute_value(wbc: f64, relative: f64) -> f64 {
    round_half_even(wbc * relative / 100.0, 2)
}

/// Rounds the exact binary value of `value` to `places` decimals, ties to even.
/// Must not scale by `10^places` first: the product can land on a tie the input is not on.
fn round_half_even(value: f64, places: usize) -> f64 {
    format!("{value:.places$}").parse().unwrap_or(value)
}
