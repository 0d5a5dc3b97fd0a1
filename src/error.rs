use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AlphaPickleError {
    #[error("ranking manifest not found: {0}")]
    #[diagnostic(help("batch mode expects ranking_debug.json inside the output directory"))]
    ManifestNotFound(PathBuf),

    #[error("invalid ranking manifest {path}: {reason}")]
    ManifestFormat { path: PathBuf, reason: String },

    #[error("no records found in results container {0}")]
    EmptyContainer(PathBuf),

    #[error("field `{field}` missing from {path}")]
    MissingField { path: PathBuf, field: String },

    #[error("field `{field}` in {path} is malformed: {reason}")]
    MalformedField {
        path: PathBuf,
        field: String,
        reason: String,
    },

    #[error("no residues found in structure file {0}")]
    NoResiduesFound(PathBuf),

    #[error("unrecognized PAE format in {0}")]
    #[diagnostic(help(
        "expected `predicted_aligned_error` or `residue1`/`residue2`/`distance` fields"
    ))]
    UnrecognizedPaeFormat(PathBuf),

    #[error("inconsistent dimensions: {0}")]
    InconsistentDimensions(String),

    #[error("failed to decode pickle stream: {0}")]
    PickleDecode(String),

    #[error("invalid model identifier: {0}")]
    InvalidModelId(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("plot rendering failed: {0}")]
    Plot(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("{failed} of {total} ranked models failed to process")]
    BatchFailed { failed: usize, total: usize },
}
