//! Sample records and the finalize-once workflow.
//!
//! A sample is registered from an analyser order, its captured cell images are classified by
//! a technologist, qualitative findings are attached, and finally the differential is
//! computed and frozen.
//!
//! ## Storage Layout
//!
//! ```text
//! samples/
//!   <s1>/
//!     <s2>/
//!       <uuid>/
//!         SAMPLE.yaml         # mutable sample record (cells, findings, events)
//!         DIFFERENTIAL.json   # finalized report, created exactly once
//!         REVIEW.yaml         # pathologist review, only when required
//! ```
//!
//! ## Finalize-once
//!
//! `DIFFERENTIAL.json` is opened with exclusive-create semantics. Whichever finalization
//! creates it wins; every later attempt, in this process or another, sees the file and fails
//! with [`LabError::AlreadyFinalized`]. Within one process all mutations are additionally
//! serialized by the service lock so read-modify-write of `SAMPLE.yaml` cannot interleave.

use crate::config::CoreConfig;
use crate::constants::{
    DIFFERENTIAL_FILENAME, MAX_CELLS_PER_SMEAR, MAX_NOTE_LEN, REVIEW_FILENAME, SAMPLE_FILENAME,
};
use crate::differential::{compute_differential, tally_cells, DifferentialReport, RawCount};
use crate::events::{OrderEvent, OrderEventType};
use crate::morphology::MorphologyFinding;
use crate::repositories::morphologies::MorphologyService;
use crate::repositories::reviews::ReviewService;
use crate::repositories::shared::{
    create_new_file, create_uuid_and_shard_dir, read_json, read_yaml, record_dirs, write_yaml,
};
use crate::review::{requires_review, PathReview, PATHOLOGIST_REVIEW_FINDING};
use crate::taxonomy::{self, CellClass};
use crate::{LabError, LabResult};
use chrono::{DateTime, Utc};
use lab_types::{NonEmptyText, WbcConcentration};
use lab_uuid::LabUuid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ============================================================================
// RECORD TYPES
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    #[default]
    Cellavision,
}

impl std::fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InstrumentType::Cellavision => "cellavision",
        })
    }
}

/// Complete blood count reported by the analyser.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompleteBloodCount {
    pub wbc: WbcConcentration,
    #[serde(default)]
    pub rbc: Option<f64>,
    #[serde(default)]
    pub hgb: Option<f64>,
    #[serde(default)]
    pub hct: Option<f64>,
    #[serde(default)]
    pub plt: Option<f64>,
}

impl CompleteBloodCount {
    pub fn with_wbc(wbc: WbcConcentration) -> Self {
        Self {
            wbc,
            rbc: None,
            hgb: None,
            hct: None,
            plt: None,
        }
    }
}

/// One captured cell image and its current classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedCell {
    pub id: usize,
    /// Canonical taxonomy index.
    pub category: usize,
}

/// Everything needed to register a sample.
#[derive(Clone, Debug, PartialEq)]
pub struct NewSample {
    pub accession: String,
    pub cbc: CompleteBloodCount,
    pub instrument: InstrumentType,
    pub cell_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub id: LabUuid,
    pub accession: String,
    pub cbc: CompleteBloodCount,
    pub instrument: InstrumentType,
    pub cells: Vec<CapturedCell>,
    #[serde(default)]
    pub findings: Vec<MorphologyFinding>,
    #[serde(default)]
    pub finalized: bool,
    /// Set at finalization when the smear needs pathologist review.
    #[serde(default)]
    pub pathrv: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub events: Vec<OrderEvent>,
}

impl SampleRecord {
    pub fn finding_names(&self) -> impl Iterator<Item = &str> {
        self.findings.iter().map(|f| f.name.as_str())
    }

    /// Number of cells per category index, without excluding anything.
    pub fn cell_tally(&self) -> LabResult<Vec<RawCount>> {
        tally_cells(self.cells.iter().map(|cell| cell.category))
    }
}

/// Frozen outcome of finalization, stored in `DIFFERENTIAL.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalizedDifferential {
    pub report: DifferentialReport,
    pub findings: Vec<MorphologyFinding>,
    pub finalized_by: String,
    pub finalized_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FinalizeOutcome {
    pub sample: SampleRecord,
    pub differential: FinalizedDifferential,
    /// The pending review created by this finalization, if one was required.
    pub review: Option<PathReview>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindingChange {
    Attached,
    AlreadyAttached,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SampleFilter {
    /// Not yet finalized.
    #[default]
    Pending,
    All,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub samples: usize,
    pub reviews: usize,
}

// ============================================================================
// SAMPLE SERVICE
// ============================================================================

/// Service for sample registration, classification and finalization.
///
/// Clones share the same lock, so a clone per request handler is fine.
#[derive(Clone, Debug)]
pub struct SampleService {
    cfg: Arc<CoreConfig>,
    lock: Arc<Mutex<()>>,
    morphologies: MorphologyService,
}

impl SampleService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            morphologies: MorphologyService::new(cfg.clone()),
            cfg,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Review service sharing this service's lock.
    pub fn reviews(&self) -> ReviewService {
        ReviewService::with_lock(self.cfg.clone(), self.lock.clone())
    }

    pub fn morphologies(&self) -> &MorphologyService {
        &self.morphologies
    }

    /// Registers a new sample with every captured cell unidentified.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the accession is blank or the cell count exceeds
    ///   [`MAX_CELLS_PER_SMEAR`],
    /// - storage errors if the record directory or file cannot be created.
    pub fn register(&self, new: NewSample, user: &str) -> LabResult<SampleRecord> {
        let accession = NonEmptyText::bounded(&new.accession, MAX_NOTE_LEN)?;
        if new.cell_count > MAX_CELLS_PER_SMEAR {
            return Err(LabError::InvalidInput(format!(
                "cell count {} exceeds the maximum of {MAX_CELLS_PER_SMEAR}",
                new.cell_count
            )));
        }

        let _guard = self.lock.lock().map_err(|_| LabError::LockPoisoned)?;
        let (id, dir) = create_uuid_and_shard_dir(&self.cfg.samples_dir(), LabUuid::new)?;

        let now = Utc::now();
        let sample = SampleRecord {
            id,
            accession: accession.into_inner(),
            cbc: new.cbc,
            instrument: new.instrument,
            cells: (0..new.cell_count)
                .map(|cell_id| CapturedCell {
                    id: cell_id,
                    category: CellClass::Unidentified.index(),
                })
                .collect(),
            findings: Vec::new(),
            finalized: false,
            pathrv: false,
            created_by: user.to_string(),
            created_at: now,
            finalized_at: None,
            events: vec![
                OrderEvent::new(OrderEventType::OrderCreated, user, now),
                OrderEvent::new(OrderEventType::SmearReceived, user, now),
            ],
        };

        if let Err(e) = write_yaml(&dir.join(SAMPLE_FILENAME), &sample) {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                tracing::warn!(
                    "failed to clean up sample directory {}: {}",
                    dir.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::info!(sample_id = %id, cells = new.cell_count, "sample registered");
        Ok(sample)
    }

    /// Loads a sample by its canonical id.
    pub fn get(&self, sample_id: &str) -> LabResult<SampleRecord> {
        let id = LabUuid::parse(sample_id)?;
        self.load(&id)
    }

    /// Stored finalized differential, or `None` if the sample is still open.
    pub fn differential(&self, sample_id: &str) -> LabResult<Option<FinalizedDifferential>> {
        let id = LabUuid::parse(sample_id)?;
        let path = self.sample_dir(&id).join(DIFFERENTIAL_FILENAME);
        if !path.is_file() {
            self.load(&id)?;
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Lists samples, oldest first. Unreadable records are logged and skipped.
    pub fn list(&self, filter: SampleFilter) -> Vec<SampleRecord> {
        let mut samples: Vec<SampleRecord> = record_dirs(&self.cfg.samples_dir())
            .into_iter()
            .filter_map(|(_, dir)| {
                let path = dir.join(SAMPLE_FILENAME);
                match read_yaml::<SampleRecord>(&path) {
                    Ok(sample) => Some(sample),
                    Err(e) => {
                        tracing::warn!("failed to read {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .filter(|sample| match filter {
                SampleFilter::Pending => !sample.finalized,
                SampleFilter::All => true,
            })
            .collect();
        samples.sort_by_key(|sample| sample.created_at);
        samples
    }

    /// Reclassifies one captured cell by category name.
    ///
    /// # Errors
    ///
    /// - `UnknownCategory` if `category` is not a taxonomy name,
    /// - `NotFound` if the sample or cell does not exist,
    /// - `AlreadyFinalized` once the differential is frozen.
    pub fn classify_cell(
        &self,
        sample_id: &str,
        cell_id: usize,
        category: &str,
    ) -> LabResult<CapturedCell> {
        let index = taxonomy::index_of(category)
            .ok_or_else(|| LabError::UnknownCategory(category.trim().to_string()))?;
        let id = LabUuid::parse(sample_id)?;

        let _guard = self.lock.lock().map_err(|_| LabError::LockPoisoned)?;
        let mut sample = self.load_mutable(&id)?;
        let cell = sample
            .cells
            .iter_mut()
            .find(|cell| cell.id == cell_id)
            .ok_or_else(|| LabError::NotFound {
                kind: "cell",
                id: cell_id.to_string(),
            })?;
        cell.category = index;
        let updated = *cell;

        self.save(&sample)?;
        tracing::debug!(sample_id = %id, cell_id, category = index, "cell classified");
        Ok(updated)
    }

    /// Attaches a catalogue finding with an optional note.
    ///
    /// The stored name is the catalogue's spelling. Re-attaching is not an error.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the finding is not in the catalogue or the sample does not exist,
    /// - `InvalidInput` if the note is too long,
    /// - `AlreadyFinalized` once the differential is frozen.
    pub fn add_finding(
        &self,
        sample_id: &str,
        name: &str,
        note: Option<&str>,
    ) -> LabResult<FindingChange> {
        let id = LabUuid::parse(sample_id)?;
        let note = note
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| NonEmptyText::bounded(text, MAX_NOTE_LEN))
            .transpose()?
            .map(NonEmptyText::into_inner);
        let morphology = self
            .morphologies
            .find(name)?
            .ok_or_else(|| LabError::NotFound {
                kind: "morphology",
                id: name.trim().to_string(),
            })?;

        let _guard = self.lock.lock().map_err(|_| LabError::LockPoisoned)?;
        let mut sample = self.load_mutable(&id)?;
        if sample.findings.iter().any(|f| f.name == morphology.name) {
            return Ok(FindingChange::AlreadyAttached);
        }

        sample
            .findings
            .push(MorphologyFinding::new(morphology.name, note));
        self.save(&sample)?;
        Ok(FindingChange::Attached)
    }

    /// Detaches a finding. Returns `false` if it was not attached.
    pub fn remove_finding(&self, sample_id: &str, name: &str) -> LabResult<bool> {
        let id = LabUuid::parse(sample_id)?;
        let wanted = name.trim().to_lowercase();

        let _guard = self.lock.lock().map_err(|_| LabError::LockPoisoned)?;
        let mut sample = self.load_mutable(&id)?;
        let before = sample.findings.len();
        sample.findings.retain(|f| f.name.to_lowercase() != wanted);
        if sample.findings.len() == before {
            return Ok(false);
        }

        self.save(&sample)?;
        Ok(true)
    }

    /// Computes and freezes the differential for a sample.
    ///
    /// Evaluates the review trigger once, from the findings attached at this moment. When
    /// review is required the sample is flagged and exactly one pending review is created,
    /// carrying the note attached to the trigger finding as its rationale.
    ///
    /// # Errors
    ///
    /// - `AlreadyFinalized` if the sample was finalized before (including by another process),
    /// - `ReviewConflict` if review is required but a review record already exists,
    /// - `NotFound` if the sample does not exist,
    /// - engine validation errors (e.g. an invalid stored WBC),
    /// - storage errors.
    pub fn finalize(&self, sample_id: &str, user: &str) -> LabResult<FinalizeOutcome> {
        self.finalize_with(sample_id, user, |sample| self.save(sample))
    }

    /// Finalization with the sample record write supplied by the caller.
    ///
    /// If anything fails after `DIFFERENTIAL.json` was created, the report blob and any review
    /// record written by this call are removed again, so the sample stays open and a retry can
    /// finalize it.
    fn finalize_with(
        &self,
        sample_id: &str,
        user: &str,
        persist: impl FnOnce(&SampleRecord) -> LabResult<()>,
    ) -> LabResult<FinalizeOutcome> {
        let id = LabUuid::parse(sample_id)?;

        let _guard = self.lock.lock().map_err(|_| LabError::LockPoisoned)?;
        let mut sample = self.load_mutable(&id)?;
        let dir = self.sample_dir(&id);
        let blob_path = dir.join(DIFFERENTIAL_FILENAME);
        let review_path = dir.join(REVIEW_FILENAME);

        if requires_review(sample.finding_names()) && review_path.exists() {
            tracing::warn!(sample_id = %id, "review record already present, finalization refused");
            return Err(LabError::ReviewConflict(id.to_string()));
        }

        let counts = sample.cell_tally()?;
        let report = compute_differential(sample.cbc.wbc.value(), &counts)?;

        let now = Utc::now();
        let differential = FinalizedDifferential {
            report,
            findings: sample.findings.clone(),
            finalized_by: user.to_string(),
            finalized_at: now,
        };
        let blob =
            serde_json::to_vec_pretty(&differential).map_err(LabError::Serialization)?;
        if !create_new_file(&blob_path, &blob)? {
            tracing::warn!(sample_id = %id, "rejected second finalization");
            return Err(LabError::AlreadyFinalized(id.to_string()));
        }

        let review = match commit_finalization(&mut sample, &review_path, user, now, persist) {
            Ok(review) => review,
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&blob_path) {
                    tracing::error!(
                        sample_id = %id,
                        "failed to roll back {}: {}",
                        blob_path.display(),
                        remove_err
                    );
                }
                tracing::error!(sample_id = %id, "finalization rolled back: {}", e);
                return Err(e);
            }
        };

        tracing::info!(
            sample_id = %id,
            total = differential.report.total,
            review_required = sample.pathrv,
            "differential finalized"
        );

        Ok(FinalizeOutcome {
            sample,
            differential,
            review,
        })
    }

    /// Order event log for a sample.
    pub fn events(&self, sample_id: &str) -> LabResult<Vec<OrderEvent>> {
        self.get(sample_id).map(|sample| sample.events)
    }

    /// Number of open samples and pending reviews.
    pub fn pending_counts(&self) -> PendingCounts {
        PendingCounts {
            samples: self.list(SampleFilter::Pending).len(),
            reviews: self.reviews().pending_count(),
        }
    }

    fn sample_dir(&self, id: &LabUuid) -> PathBuf {
        id.sharded_dir(&self.cfg.samples_dir())
    }

    fn load(&self, id: &LabUuid) -> LabResult<SampleRecord> {
        load_sample(&self.cfg, id)
    }

    fn load_mutable(&self, id: &LabUuid) -> LabResult<SampleRecord> {
        let sample = self.load(id)?;
        if sample.finalized || self.sample_dir(id).join(DIFFERENTIAL_FILENAME).exists() {
            return Err(LabError::AlreadyFinalized(id.to_string()));
        }
        Ok(sample)
    }

    fn save(&self, sample: &SampleRecord) -> LabResult<()> {
        save_sample(&self.cfg, sample)
    }
}

/// Marks `sample` finalized, creates the pending review when the trigger finding is attached
/// and writes the record through `persist`. A review file created here is removed again if
/// `persist` fails.
fn commit_finalization(
    sample: &mut SampleRecord,
    review_path: &Path,
    user: &str,
    now: DateTime<Utc>,
    persist: impl FnOnce(&SampleRecord) -> LabResult<()>,
) -> LabResult<Option<PathReview>> {
    sample.finalized = true;
    sample.finalized_at = Some(now);
    sample
        .events
        .push(OrderEvent::new(OrderEventType::SmearAnalyzed, user, now));

    let review = if requires_review(sample.finding_names()) {
        let rationale = sample
            .findings
            .iter()
            .find(|f| f.name == PATHOLOGIST_REVIEW_FINDING)
            .and_then(|f| f.note.as_deref());
        let review = PathReview::pending(sample.id, rationale, user, now);

        let yaml = serde_yaml::to_string(&review).map_err(LabError::YamlSerialization)?;
        if !create_new_file(review_path, yaml.as_bytes())? {
            return Err(LabError::ReviewConflict(sample.id.to_string()));
        }
        sample.pathrv = true;
        sample
            .events
            .push(OrderEvent::new(OrderEventType::PathReviewOrdered, user, now));
        tracing::info!(sample_id = %sample.id, "pathologist review requested");
        Some(review)
    } else {
        None
    };

    if let Err(e) = persist(sample) {
        if review.is_some() {
            if let Err(remove_err) = fs::remove_file(review_path) {
                tracing::error!(
                    "failed to roll back {}: {}",
                    review_path.display(),
                    remove_err
                );
            }
        }
        return Err(e);
    }

    Ok(review)
}

pub(crate) fn load_sample(cfg: &CoreConfig, id: &LabUuid) -> LabResult<SampleRecord> {
    let path = id.sharded_dir(&cfg.samples_dir()).join(SAMPLE_FILENAME);
    if !path.is_file() {
        return Err(LabError::NotFound {
            kind: "sample",
            id: id.to_string(),
        });
    }
    read_yaml(&path)
}

pub(crate) fn save_sample(cfg: &CoreConfig, sample: &SampleRecord) -> LabResult<()> {
    let path = sample.id.sharded_dir(&cfg.samples_dir()).join(SAMPLE_FILENAME);
    write_yaml(&path, sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::morphology::CellType;
    use crate::review::ReviewStatus;
    use std::io;
    use std::thread;
    use tempfile::TempDir;

    fn test_cfg(lab_data_dir: &Path) -> Arc<CoreConfig> {
        Arc::new(
            CoreConfig::new(lab_data_dir.to_path_buf(), Environment::Testing)
                .expect("CoreConfig::new should succeed"),
        )
    }

    fn new_sample(cell_count: usize) -> NewSample {
        NewSample {
            accession: "ORD-2024-0001".into(),
            cbc: CompleteBloodCount {
                wbc: WbcConcentration::new(8.5).unwrap(),
                rbc: Some(4.7),
                hgb: Some(13.9),
                hct: Some(41.0),
                plt: Some(250.0),
            },
            instrument: InstrumentType::Cellavision,
            cell_count,
        }
    }

    /// Registers a sample with 60 neutrophils, 30 lymphocytes and 10 monocytes.
    fn classified_sample(service: &SampleService) -> SampleRecord {
        let sample = service.register(new_sample(100), "tech").unwrap();
        let id = sample.id.to_string();
        for cell in 0..100 {
            let category = match cell {
                0..=59 => "neutrophils",
                60..=89 => "lymphocytes",
                _ => "monocytes",
            };
            service.classify_cell(&id, cell, category).unwrap();
        }
        sample
    }

    #[test]
    fn test_register_creates_unidentified_cells() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));

        let sample = service.register(new_sample(5), "tech").unwrap();
        assert_eq!(sample.cells.len(), 5);
        assert!(sample.cells.iter().all(|c| c.category == 0));
        assert!(!sample.finalized);

        let path = sample
            .id
            .sharded_dir(&temp_dir.path().join("samples"))
            .join(SAMPLE_FILENAME);
        assert!(path.is_file());

        let loaded = service.get(&sample.id.to_string()).unwrap();
        assert_eq!(loaded, sample);
        assert_eq!(
            loaded
                .events
                .iter()
                .map(|e| e.event_type)
                .collect::<Vec<_>>(),
            vec![OrderEventType::OrderCreated, OrderEventType::SmearReceived]
        );
    }

    #[test]
    fn test_register_rejects_blank_accession_and_creates_no_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));

        let mut new = new_sample(5);
        new.accession = "   ".into();
        let err = service.register(new, "tech").unwrap_err();
        assert!(matches!(err, LabError::InvalidInput(_)));
        assert!(!temp_dir.path().join("samples").exists());
    }

    #[test]
    fn test_register_rejects_too_many_cells() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));

        let err = service
            .register(new_sample(MAX_CELLS_PER_SMEAR + 1), "tech")
            .unwrap_err();
        assert!(matches!(err, LabError::InvalidInput(_)));
    }

    #[test]
    fn test_get_unknown_sample_is_not_found() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));

        let err = service.get(&LabUuid::new().to_string()).unwrap_err();
        assert!(matches!(err, LabError::NotFound { kind: "sample", .. }));

        let err = service.get("not-a-uuid").unwrap_err();
        assert!(matches!(err, LabError::InvalidInput(_)));
    }

    #[test]
    fn test_classify_cell_rejects_unknown_category_and_cell() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));
        let id = service.register(new_sample(3), "tech").unwrap().id.to_string();

        let err = service.classify_cell(&id, 0, "macrophages").unwrap_err();
        assert!(matches!(err, LabError::UnknownCategory(_)));

        let err = service.classify_cell(&id, 3, "neutrophils").unwrap_err();
        assert!(matches!(err, LabError::NotFound { kind: "cell", .. }));

        let cell = service.classify_cell(&id, 2, "Blasts").unwrap();
        assert_eq!(cell.category, 7);
    }

    #[test]
    fn test_findings_attach_idempotently_and_detach() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));
        let id = service.register(new_sample(3), "tech").unwrap().id.to_string();

        let change = service
            .add_finding(&id, "smear to be reviewed by pathologist", Some("blasts?"))
            .unwrap();
        assert_eq!(change, FindingChange::Attached);
        let change = service
            .add_finding(&id, PATHOLOGIST_REVIEW_FINDING, None)
            .unwrap();
        assert_eq!(change, FindingChange::AlreadyAttached);

        let sample = service.get(&id).unwrap();
        assert_eq!(sample.findings.len(), 1);
        assert_eq!(sample.findings[0].name, PATHOLOGIST_REVIEW_FINDING);
        assert_eq!(sample.findings[0].note.as_deref(), Some("blasts?"));

        assert!(service.remove_finding(&id, PATHOLOGIST_REVIEW_FINDING).unwrap());
        assert!(!service.remove_finding(&id, PATHOLOGIST_REVIEW_FINDING).unwrap());
        assert!(service.get(&id).unwrap().findings.is_empty());
    }

    #[test]
    fn test_add_finding_requires_catalogue_entry() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));
        let id = service.register(new_sample(3), "tech").unwrap().id.to_string();

        let err = service.add_finding(&id, "Auer rods", None).unwrap_err();
        assert!(matches!(err, LabError::NotFound { kind: "morphology", .. }));

        service
            .morphologies()
            .add(CellType::Wbc, "Auer rods", vec![], "lead")
            .unwrap();
        assert_eq!(
            service.add_finding(&id, "Auer rods", None).unwrap(),
            FindingChange::Attached
        );
    }

    #[test]
    fn test_finalize_computes_and_stores_report() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));
        let sample = classified_sample(&service);
        let id = sample.id.to_string();

        let outcome = service.finalize(&id, "tech").unwrap();
        assert!(outcome.review.is_none());
        assert!(outcome.sample.finalized);
        assert!(!outcome.sample.pathrv);

        let report = &outcome.differential.report;
        assert_eq!(report.total, 100);
        assert_eq!(report.diff.get("neutrophils").unwrap().relative, 60.0);
        assert_eq!(report.diff.get("lymphocytes").unwrap().absolute, 2.55);

        let stored = service.differential(&id).unwrap().unwrap();
        assert_eq!(stored, outcome.differential);
        assert_eq!(
            service.events(&id).unwrap().last().unwrap().event_type,
            OrderEventType::SmearAnalyzed
        );
    }

    #[test]
    fn test_finalize_with_trigger_creates_one_pending_review() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));
        let id = classified_sample(&service).id.to_string();
        service
            .add_finding(&id, PATHOLOGIST_REVIEW_FINDING, Some("Atypical lymphocytes"))
            .unwrap();

        let outcome = service.finalize(&id, "tech").unwrap();
        let review = outcome.review.unwrap();
        assert_eq!(review.status, ReviewStatus::Pending);
        assert_eq!(review.review_for.as_deref(), Some("Atypical lymphocytes"));
        assert!(outcome.sample.pathrv);
        assert_eq!(outcome.differential.findings.len(), 1);

        let reviews = service.reviews().list(Some(ReviewStatus::Pending));
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].sample_id.to_string(), id);

        let events: Vec<OrderEventType> = service
            .events(&id)
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert!(events.contains(&OrderEventType::PathReviewOrdered));
    }

    #[test]
    fn test_second_finalize_is_rejected_and_report_unchanged() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));
        let id = classified_sample(&service).id.to_string();

        let first = service.finalize(&id, "tech").unwrap();
        let err = service.finalize(&id, "other").unwrap_err();
        assert!(matches!(err, LabError::AlreadyFinalized(_)));

        let stored = service.differential(&id).unwrap().unwrap();
        assert_eq!(stored.finalized_by, "tech");
        assert_eq!(stored, first.differential);
    }

    #[test]
    fn test_finalize_rejected_when_report_blob_exists() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(temp_dir.path());
        let service = SampleService::new(cfg.clone());
        let sample = classified_sample(&service);

        let blob = sample
            .id
            .sharded_dir(&cfg.samples_dir())
            .join(DIFFERENTIAL_FILENAME);
        fs::write(&blob, "{}").unwrap();

        let err = service.finalize(&sample.id.to_string(), "tech").unwrap_err();
        assert!(matches!(err, LabError::AlreadyFinalized(_)));
        assert_eq!(fs::read_to_string(&blob).unwrap(), "{}");
    }

    #[test]
    fn test_failed_record_write_rolls_back_finalization() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(temp_dir.path());
        let service = SampleService::new(cfg.clone());
        let sample = classified_sample(&service);
        let id = sample.id.to_string();
        service
            .add_finding(&id, PATHOLOGIST_REVIEW_FINDING, Some("Blasts seen"))
            .unwrap();
        let dir = sample.id.sharded_dir(&cfg.samples_dir());

        let err = service
            .finalize_with(&id, "tech", |_| {
                Err(LabError::FileWrite(io::Error::other("disk full")))
            })
            .unwrap_err();
        assert!(matches!(err, LabError::FileWrite(_)));

        assert!(!dir.join(DIFFERENTIAL_FILENAME).exists());
        assert!(!dir.join(REVIEW_FILENAME).exists());
        let stored = service.get(&id).unwrap();
        assert!(!stored.finalized);
        assert!(!stored.pathrv);
        assert_eq!(service.list(SampleFilter::Pending).len(), 1);
        assert_eq!(service.reviews().pending_count(), 0);

        let outcome = service.finalize(&id, "tech").unwrap();
        assert!(outcome.sample.finalized);
        assert!(outcome.review.is_some());
        let events: Vec<OrderEventType> = service
            .events(&id)
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            events,
            vec![
                OrderEventType::OrderCreated,
                OrderEventType::SmearReceived,
                OrderEventType::SmearAnalyzed,
                OrderEventType::PathReviewOrdered,
            ]
        );
    }

    #[test]
    fn test_finalize_refused_when_review_record_already_exists() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(temp_dir.path());
        let service = SampleService::new(cfg.clone());
        let sample = classified_sample(&service);
        let id = sample.id.to_string();
        service
            .add_finding(&id, PATHOLOGIST_REVIEW_FINDING, None)
            .unwrap();
        let dir = sample.id.sharded_dir(&cfg.samples_dir());
        fs::write(dir.join(REVIEW_FILENAME), "stale").unwrap();

        let err = service.finalize(&id, "tech").unwrap_err();
        assert!(matches!(err, LabError::ReviewConflict(_)));
        assert!(!dir.join(DIFFERENTIAL_FILENAME).exists());
        assert_eq!(fs::read_to_string(dir.join(REVIEW_FILENAME)).unwrap(), "stale");
        assert!(!service.get(&id).unwrap().finalized);
    }

    #[test]
    fn test_mutations_after_finalize_are_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));
        let id = classified_sample(&service).id.to_string();
        service.finalize(&id, "tech").unwrap();

        assert!(matches!(
            service.classify_cell(&id, 0, "blasts"),
            Err(LabError::AlreadyFinalized(_))
        ));
        assert!(matches!(
            service.add_finding(&id, PATHOLOGIST_REVIEW_FINDING, None),
            Err(LabError::AlreadyFinalized(_))
        ));
        assert!(matches!(
            service.remove_finding(&id, PATHOLOGIST_REVIEW_FINDING),
            Err(LabError::AlreadyFinalized(_))
        ));
        assert!(service.reviews().list(None).is_empty());
    }

    #[test]
    fn test_concurrent_finalize_succeeds_exactly_once() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(temp_dir.path());
        let service = SampleService::new(cfg.clone());
        let id = classified_sample(&service).id.to_string();

        let handles: Vec<_> = (0..8)
            .map(|n| {
                // Separate services: separate locks, so only the exclusive create guards.
                let service = SampleService::new(cfg.clone());
                let id = id.clone();
                thread::spawn(move || service.finalize(&id, &format!("tech{n}")).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn test_finalize_with_no_classified_cells_gives_empty_report() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));
        let id = service.register(new_sample(4), "tech").unwrap().id.to_string();

        let outcome = service.finalize(&id, "tech").unwrap();
        assert_eq!(outcome.differential.report.total, 0);
        assert!(outcome.differential.report.diff.is_empty());
    }

    #[test]
    fn test_list_filters_pending_and_counts() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = SampleService::new(test_cfg(temp_dir.path()));
        let open = service.register(new_sample(2), "tech").unwrap();
        let done = classified_sample(&service);
        service
            .add_finding(&done.id.to_string(), PATHOLOGIST_REVIEW_FINDING, None)
            .unwrap();
        service.finalize(&done.id.to_string(), "tech").unwrap();

        let pending = service.list(SampleFilter::Pending);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, open.id);
        assert_eq!(service.list(SampleFilter::All).len(), 2);
        assert_eq!(
            service.pending_counts(),
            PendingCounts {
                samples: 1,
                reviews: 1
            }
        );
    }

    #[test]
    fn test_list_skips_unreadable_records() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(temp_dir.path());
        let service = SampleService::new(cfg.clone());
        service.register(new_sample(2), "tech").unwrap();

        let broken = LabUuid::new().sharded_dir(&cfg.samples_dir());
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(SAMPLE_FILENAME), "cells: [not valid").unwrap();

        assert_eq!(service.list(SampleFilter::All).len(), 1);
    }
}
