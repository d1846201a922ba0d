//! Morphology catalogue repository.
//!
//! The catalogue is a single YAML document at `<lab_data_dir>/morphologies.yaml`. It is seeded
//! on first use with the pathologist review trigger, so that finding can always be attached.

use crate::config::CoreConfig;
use crate::constants::MAX_NOTE_LEN;
use crate::morphology::{CellType, Morphology, ResultOption};
use crate::repositories::shared::{read_yaml, write_yaml};
use crate::review::PATHOLOGIST_REVIEW_FINDING;
use crate::{LabError, LabResult};
use chrono::Utc;
use lab_types::NonEmptyText;
use lab_uuid::LabUuid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::{Arc, Mutex};

const SEED_AUTHOR: &str = "system";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalogue {
    #[serde(default)]
    morphologies: Vec<Morphology>,
}

/// Service for reading and extending the morphology catalogue.
#[derive(Clone, Debug)]
pub struct MorphologyService {
    cfg: Arc<CoreConfig>,
    lock: Arc<Mutex<()>>,
}

impl MorphologyService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// All catalogue entries, sorted by name (case-insensitive).
    pub fn list(&self) -> LabResult<Vec<Morphology>> {
        let _guard = self.lock.lock().map_err(|_| LabError::LockPoisoned)?;
        let mut entries = self.load_or_seed()?.morphologies;
        entries.sort_by_key(|m| m.name.to_lowercase());
        Ok(entries)
    }

    /// Case-insensitive lookup by name.
    pub fn find(&self, name: &str) -> LabResult<Option<Morphology>> {
        let _guard = self.lock.lock().map_err(|_| LabError::LockPoisoned)?;
        let wanted = name.trim().to_lowercase();
        Ok(self
            .load_or_seed()?
            .morphologies
            .into_iter()
            .find(|m| m.name.to_lowercase() == wanted))
    }

    /// Adds a catalogue entry.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `name` is blank or too long,
    /// - `DuplicateMorphology` if an entry with the same name (case-insensitive) exists,
    /// - storage errors if the catalogue cannot be read or written.
    pub fn add(
        &self,
        cell_type: CellType,
        name: &str,
        result_options: Vec<ResultOption>,
        created_by: &str,
    ) -> LabResult<Morphology> {
        let name = NonEmptyText::bounded(name, MAX_NOTE_LEN)?;

        let _guard = self.lock.lock().map_err(|_| LabError::LockPoisoned)?;
        let mut catalogue = self.load_or_seed()?;

        let wanted = name.as_str().to_lowercase();
        if catalogue
            .morphologies
            .iter()
            .any(|m| m.name.to_lowercase() == wanted)
        {
            return Err(LabError::DuplicateMorphology(name.into_inner()));
        }

        let morphology = Morphology {
            id: LabUuid::new(),
            cell_type,
            name: name.into_inner(),
            result_options,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        catalogue.morphologies.push(morphology.clone());
        write_yaml(&self.cfg.morphology_catalogue_path(), &catalogue)?;

        tracing::info!(
            morphology = %morphology.name,
            cell_type = %morphology.cell_type,
            "morphology added to catalogue"
        );
        Ok(morphology)
    }

    fn load_or_seed(&self) -> LabResult<Catalogue> {
        let path = self.cfg.morphology_catalogue_path();
        if path.is_file() {
            return read_yaml(&path);
        }

        let catalogue = Catalogue {
            morphologies: vec![Morphology {
                id: LabUuid::new(),
                cell_type: CellType::Wbc,
                name: PATHOLOGIST_REVIEW_FINDING.to_string(),
                result_options: Vec::new(),
                created_by: SEED_AUTHOR.to_string(),
                created_at: Utc::now(),
            }],
        };
        fs::create_dir_all(self.cfg.lab_data_dir()).map_err(LabError::StorageDirCreation)?;
        write_yaml(&path, &catalogue)?;
        tracing::debug!("seeded morphology catalogue at {}", path.display());
        Ok(catalogue)
    }
}
