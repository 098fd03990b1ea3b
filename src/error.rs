use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid legacy gene id: {0}")]
    InvalidLegacyId(String),

    #[error("invalid stable gene id: {0}")]
    InvalidStableId(String),

    #[error("invalid evidence token: {0}")]
    InvalidEvidence(String),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("missing config file genedocs.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown stage action: {0}")]
    UnknownAction(String),

    #[error("unknown section: {0}")]
    UnknownSection(String),

    #[error("chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("input file not found: {0}")]
    InputNotFound(String),

    #[error("elasticsearch request failed: {0}")]
    ElasticHttp(String),

    #[error("elasticsearch returned status {status}: {message}")]
    ElasticStatus { status: u16, message: String },

    #[error("bulk request rejected {failed} of {total} actions")]
    BulkRejected { failed: usize, total: usize },

    #[error("failed to serialize record: {0}")]
    Serialize(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl PipelineError {
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        PipelineError::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Parse errors are skipped per line; everything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::Parse { .. }
                | PipelineError::InvalidLegacyId(_)
                | PipelineError::InvalidStableId(_)
                | PipelineError::InvalidEvidence(_)
        )
    }
}
