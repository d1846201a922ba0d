//! Constants used throughout the hemogram core crate.

/// Directory name for sample records storage.
pub const SAMPLES_DIR_NAME: &str = "samples";

/// Default directory for lab data storage when no explicit directory is configured.
pub const DEFAULT_LAB_DATA_DIR: &str = "lab_data";

/// Filename for the mutable sample record.
pub const SAMPLE_FILENAME: &str = "SAMPLE.yaml";

/// Filename for the finalized differential report blob. Its existence marks finalization.
pub const DIFFERENTIAL_FILENAME: &str = "DIFFERENTIAL.json";

/// Filename for the pathologist review record.
pub const REVIEW_FILENAME: &str = "REVIEW.yaml";

/// Filename for the morphology catalogue at the data directory root.
pub const MORPHOLOGY_CATALOGUE_FILENAME: &str = "morphologies.yaml";

/// Upper bound on captured cells per smear.
pub const MAX_CELLS_PER_SMEAR: usize = 1_000;

/// Upper bound on free-text fields (notes, rationale, review comments).
pub const MAX_NOTE_LEN: usize = 2_000;
