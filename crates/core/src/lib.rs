//! # Hemogram Core
//!
//! Core logic for the laboratory's manual white-cell differential workflow.
//!
//! This crate contains pure computation and file/folder management:
//! - The classification taxonomy and the WBC Differential Engine (pure, no I/O)
//! - The pathologist Review Trigger and review records
//! - Sample registration, cell classification and finalize-once storage under `LAB_DATA_DIR`
//! - The morphology catalogue, privileges and order events
//!
//! **No API concerns**: authentication and HTTP servers belong in `api-rest` or `api-shared`.

pub mod config;
pub mod constants;
pub mod differential;
pub mod error;
pub mod events;
pub mod morphology;
pub mod privilege;
pub mod repositories;
pub mod review;
pub mod taxonomy;

pub use config::{environment_from_env_value, CoreConfig, Environment};
pub use differential::{
    compute_differential, tally_cells, CellResult, DifferentialInput, DifferentialReport,
    DifferentialTable, NrbcResult, RawCount,
};
pub use error::{LabError, LabResult};
pub use events::{OrderEvent, OrderEventType};
pub use morphology::{CellType, Morphology, MorphologyFinding, ResultOption};
pub use privilege::{Privilege, Role};
pub use repositories::morphologies::MorphologyService;
pub use repositories::reviews::ReviewService;
pub use repositories::samples::{
    CapturedCell, CompleteBloodCount, FinalizeOutcome, FinalizedDifferential, FindingChange,
    InstrumentType, NewSample, PendingCounts, SampleFilter, SampleRecord, SampleService,
};
pub use review::{requires_review, PathReview, ReviewStatus, PATHOLOGIST_REVIEW_FINDING};
pub use taxonomy::CellClass;

pub use lab_types::{NonEmptyText, TextError, WbcConcentration};
pub use lab_uuid::LabUuid;
