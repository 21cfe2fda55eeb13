//! Error types for the memory-forensics orchestration pipeline.

use std::path::PathBuf;

/// Errors that can escape the library surface. Per-plugin failures are
/// recovered and recorded in `PluginOutcome`/`PluginStatus`; only the
/// variants here actually abort a run.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("memory image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("failed to write report output: {0}")]
    OutputWriteFailure(#[from] std::io::Error),

    #[error("failed to serialize report: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
