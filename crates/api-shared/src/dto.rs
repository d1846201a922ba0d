//! Request and response types for the hemogram APIs.
//!
//! Core records are converted into these flat wire types so the HTTP contract does not move
//! when storage records change. Computed reports are passed through as their core type and
//! documented as free-form objects.

use hemogram_core::taxonomy::{self, CellClass};
use hemogram_core::{
    CapturedCell, DifferentialReport, FinalizeOutcome, FinalizedDifferential, LabError,
    LabResult, Morphology, MorphologyFinding, OrderEvent, PathReview, PendingCounts, RawCount,
    SampleRecord,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

// ============================================================================
// TAXONOMY AND STATELESS DIFFERENTIAL
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaxonomyEntry {
    pub index: usize,
    pub name: String,
    pub always_report: bool,
    pub excluded_from_total: bool,
    pub display_if_present: bool,
}

impl From<CellClass> for TaxonomyEntry {
    fn from(class: CellClass) -> Self {
        Self {
            index: class.index(),
            name: class.name().to_string(),
            always_report: class.always_report(),
            excluded_from_total: class.excluded_from_total(),
            display_if_present: class.display_if_present(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaxonomyRes {
    pub categories: Vec<TaxonomyEntry>,
}

impl TaxonomyRes {
    pub fn current() -> Self {
        Self {
            categories: taxonomy::ALL.into_iter().map(TaxonomyEntry::from).collect(),
        }
    }
}

/// A category given either by canonical index or by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum CategoryRef {
    Index(usize),
    Name(String),
}

impl CategoryRef {
    /// Resolves to a canonical index. Range checks on indices are left to the engine.
    pub fn resolve(&self) -> LabResult<usize> {
        match self {
            CategoryRef::Index(index) => Ok(*index),
            CategoryRef::Name(name) => taxonomy::index_of(name)
                .ok_or_else(|| LabError::UnknownCategory(name.trim().to_string())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RawCountReq {
    pub category: CategoryRef,
    pub count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DifferentialReq {
    pub wbc: f64,
    pub counts: Vec<RawCountReq>,
}

impl DifferentialReq {
    pub fn raw_counts(&self) -> LabResult<Vec<RawCount>> {
        self.counts
            .iter()
            .map(|c| Ok(RawCount::new(c.category.resolve()?, c.count)))
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DifferentialRes {
    #[schema(value_type = Object)]
    pub report: DifferentialReport,
}

// ============================================================================
// SAMPLES
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterSampleReq {
    pub accession: String,
    pub wbc: f64,
    #[serde(default)]
    pub rbc: Option<f64>,
    #[serde(default)]
    pub hgb: Option<f64>,
    #[serde(default)]
    pub hct: Option<f64>,
    #[serde(default)]
    pub plt: Option<f64>,
    pub cell_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SampleSummary {
    pub id: String,
    pub accession: String,
    pub wbc: f64,
    pub cell_count: usize,
    pub finalized: bool,
    pub pathrv: bool,
    pub created_at: String,
}

impl From<&SampleRecord> for SampleSummary {
    fn from(sample: &SampleRecord) -> Self {
        Self {
            id: sample.id.to_string(),
            accession: sample.accession.clone(),
            wbc: sample.cbc.wbc.value(),
            cell_count: sample.cells.len(),
            finalized: sample.finalized,
            pathrv: sample.pathrv,
            created_at: sample.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListSamplesRes {
    pub samples: Vec<SampleSummary>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CbcDto {
    pub wbc: f64,
    pub rbc: Option<f64>,
    pub hgb: Option<f64>,
    pub hct: Option<f64>,
    pub plt: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CellDto {
    pub id: usize,
    pub category: String,
}

impl From<CapturedCell> for CellDto {
    fn from(cell: CapturedCell) -> Self {
        Self {
            id: cell.id,
            category: taxonomy::category(cell.category)
                .map(|class| class.name().to_string())
                .unwrap_or_else(|| cell.category.to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FindingDto {
    pub name: String,
    pub note: Option<String>,
}

impl From<&MorphologyFinding> for FindingDto {
    fn from(finding: &MorphologyFinding) -> Self {
        Self {
            name: finding.name.clone(),
            note: finding.note.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SampleDetail {
    pub id: String,
    pub accession: String,
    pub instrument: String,
    pub cbc: CbcDto,
    pub cells: Vec<CellDto>,
    pub findings: Vec<FindingDto>,
    pub finalized: bool,
    pub pathrv: bool,
    pub created_by: String,
    pub created_at: String,
    pub finalized_at: Option<String>,
    /// Stored report, present once the sample is finalized.
    #[schema(value_type = Object, nullable)]
    pub differential: Option<FinalizedDifferential>,
}

impl SampleDetail {
    pub fn new(sample: SampleRecord, differential: Option<FinalizedDifferential>) -> Self {
        Self {
            id: sample.id.to_string(),
            accession: sample.accession,
            instrument: sample.instrument.to_string(),
            cbc: CbcDto {
                wbc: sample.cbc.wbc.value(),
                rbc: sample.cbc.rbc,
                hgb: sample.cbc.hgb,
                hct: sample.cbc.hct,
                plt: sample.cbc.plt,
            },
            cells: sample.cells.into_iter().map(CellDto::from).collect(),
            findings: sample.findings.iter().map(FindingDto::from).collect(),
            finalized: sample.finalized,
            pathrv: sample.pathrv,
            created_by: sample.created_by,
            created_at: sample.created_at.to_rfc3339(),
            finalized_at: sample.finalized_at.map(|at| at.to_rfc3339()),
            differential,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassifyCellReq {
    /// Category name, e.g. `neutrophils`.
    pub category: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FindingReq {
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RemoveFindingReq {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FindingRes {
    pub name: String,
    /// `attached`, `already attached`, `removed` or `not attached`.
    pub status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FinalizeRes {
    pub sample_id: String,
    pub review_required: bool,
    #[schema(value_type = Object)]
    pub report: DifferentialReport,
    pub findings: Vec<FindingDto>,
    pub finalized_by: String,
    pub finalized_at: String,
}

impl From<FinalizeOutcome> for FinalizeRes {
    fn from(outcome: FinalizeOutcome) -> Self {
        Self {
            sample_id: outcome.sample.id.to_string(),
            review_required: outcome.sample.pathrv,
            findings: outcome
                .differential
                .findings
                .iter()
                .map(FindingDto::from)
                .collect(),
            finalized_by: outcome.differential.finalized_by,
            finalized_at: outcome.differential.finalized_at.to_rfc3339(),
            report: outcome.differential.report,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EventDto {
    pub event_type: String,
    pub user: String,
    pub at: String,
}

impl From<OrderEvent> for EventDto {
    fn from(event: OrderEvent) -> Self {
        Self {
            event_type: event.event_type.to_string(),
            user: event.user,
            at: event.at.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EventsRes {
    pub events: Vec<EventDto>,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// `pending` (default) or `all`; reviews also accept `completed`.
    pub status: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PendingRes {
    pub samples: usize,
    pub reviews: usize,
}

impl From<PendingCounts> for PendingRes {
    fn from(counts: PendingCounts) -> Self {
        Self {
            samples: counts.samples,
            reviews: counts.reviews,
        }
    }
}

// ============================================================================
// REVIEWS
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewDto {
    pub sample_id: String,
    pub status: String,
    pub review_for: Option<String>,
    pub review: Option<String>,
    pub requested_by: String,
    pub requested_at: String,
    pub completed_by: Option<String>,
    pub completed_at: Option<String>,
}

impl From<PathReview> for ReviewDto {
    fn from(review: PathReview) -> Self {
        Self {
            sample_id: review.sample_id.to_string(),
            status: review.status.to_string(),
            review_for: review.review_for,
            review: review.review,
            requested_by: review.requested_by,
            requested_at: review.requested_at.to_rfc3339(),
            completed_by: review.completed_by,
            completed_at: review.completed_at.map(|at| at.to_rfc3339()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListReviewsRes {
    pub reviews: Vec<ReviewDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CompleteReviewReq {
    pub review: String,
}

// ============================================================================
// MORPHOLOGY CATALOGUE
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MorphologyDto {
    pub id: String,
    pub cell_type: String,
    pub name: String,
    pub result_options: Vec<String>,
    pub created_by: String,
    pub created_at: String,
}

impl From<Morphology> for MorphologyDto {
    fn from(morphology: Morphology) -> Self {
        Self {
            id: morphology.id.to_string(),
            cell_type: morphology.cell_type.to_string(),
            name: morphology.name,
            result_options: morphology
                .result_options
                .iter()
                .map(|option| option.to_string())
                .collect(),
            created_by: morphology.created_by,
            created_at: morphology.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListMorphologiesRes {
    pub morphologies: Vec<MorphologyDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateMorphologyReq {
    /// `wbc`, `rbc` or `platelet`.
    pub cell_type: String,
    pub name: String,
    #[serde(default)]
    pub result_options: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_ref_accepts_index_or_name() {
        let req: DifferentialReq = serde_json::from_str(
            r#"{"wbc": 8.5, "counts": [{"category": 1, "count": 60}, {"category": "Lymphocytes", "count": 30}]}"#,
        )
        .unwrap();
        let counts = req.raw_counts().unwrap();
        assert_eq!(counts, vec![RawCount::new(1, 60), RawCount::new(2, 30)]);
    }

    #[test]
    fn unknown_category_name_is_rejected() {
        let reference = CategoryRef::Name("macrophages".into());
        assert!(matches!(
            reference.resolve(),
            Err(LabError::UnknownCategory(name)) if name == "macrophages"
        ));
    }

    #[test]
    fn taxonomy_lists_every_category_in_order() {
        let res = TaxonomyRes::current();
        assert_eq!(res.categories.len(), 11);
        assert_eq!(res.categories[9].name, "nrbcs");
        assert!(res.categories[9].excluded_from_total);
        assert!(res.categories[9].display_if_present);
        assert!(res.categories.windows(2).all(|w| w[0].index < w[1].index));
    }
}
