use lab_types::TextError;
use lab_uuid::UuidError;

#[derive(Debug, thiserror::Error)]
pub enum LabError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("duplicate category index {0} in raw counts")]
    DuplicateCategory(usize),
    #[error("category index {0} is outside the taxonomy")]
    CategoryOutOfRange(usize),
    #[error("unknown cell category: {0}")]
    UnknownCategory(String),
    #[error("sample {0} is already finalized")]
    AlreadyFinalized(String),
    #[error("review for sample {0} is already completed")]
    AlreadyCompleted(String),
    #[error("review record for sample {0} already exists")]
    ReviewConflict(String),
    #[error("morphology '{0}' already exists")]
    DuplicateMorphology(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize JSON: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize JSON: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error("storage lock poisoned")]
    LockPoisoned,
}

impl LabError {
    /// True for failures caused by the caller's input or the record's state, as opposed to
    /// storage faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            LabError::StorageDirCreation(_)
                | LabError::FileWrite(_)
                | LabError::FileRead(_)
                | LabError::Serialization(_)
                | LabError::Deserialization(_)
                | LabError::YamlSerialization(_)
                | LabError::YamlDeserialization(_)
                | LabError::LockPoisoned
        )
    }
}

impl From<TextError> for LabError {
    fn from(err: TextError) -> Self {
        LabError::InvalidInput(err.to_string())
    }
}

impl From<UuidError> for LabError {
    fn from(err: UuidError) -> Self {
        LabError::InvalidInput(err.to_string())
    }
}

pub type LabResult<T> = std::result::Result<T, LabError>;
