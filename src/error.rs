use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("malformed record in {source_name}: {message}")]
    MalformedRecord {
        source_name: String,
        message: String,
    },

    #[error("invalid cross-reference {0}")]
    InvalidXref(String),

    #[error("dataset {label} is unreadable: {message}")]
    DatasetUnreadable { label: String, message: String },

    #[error("dataset {label} is structurally invalid: {message}")]
    DatasetInvalid { label: String, message: String },

    #[error("no warehouse build found in {0} (run `kira-pm warehouse build` first)")]
    MissingWarehouse(String),

    #[error("no id-mapping index found for build {0}")]
    MissingMappingIndex(String),

    #[error("corrupt artifact at {path}: {message}")]
    CorruptArtifact { path: String, message: String },

    #[error("missing config file {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid reference source specifier: {0}")]
    InvalidSource(String),

    #[error("invalid dataset input: {0}")]
    InvalidDatasetInput(String),

    #[error("invalid provenance label: {0}")]
    InvalidProvenanceLabel(String),

    #[error("invalid node kind: {0}")]
    InvalidNodeKind(String),

    #[error("invalid cross-reference type: {0}")]
    InvalidXrefKind(String),

    #[error("node already exists: {0}")]
    DuplicateNode(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("graph integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("store is locked by another merge run: {0}")]
    StoreLocked(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl KiraError {
    /// Errors that abort a whole run rather than one dataset or record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KiraError::MissingWarehouse(_)
                | KiraError::MissingMappingIndex(_)
                | KiraError::CorruptArtifact { .. }
                | KiraError::StoreLocked(_)
        )
    }

    pub fn is_dataset_abort(&self) -> bool {
        matches!(
            self,
            KiraError::DatasetUnreadable { .. }
                | KiraError::DatasetInvalid { .. }
                | KiraError::IntegrityViolation(_)
                | KiraError::NodeNotFound(_)
                | KiraError::DuplicateNode(_)
        )
    }

    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            KiraError::MalformedRecord { .. } | KiraError::InvalidXref(_)
        )
    }
}
