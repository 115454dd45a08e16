use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid sample accession: {0}")]
    InvalidSampleAccession(String),

    #[error("invalid series accession: {0}")]
    InvalidSeriesAccession(String),

    #[error("invalid run accession: {0}")]
    InvalidRunId(String),

    #[error("read count {count} for run {run} is outside 1..=3")]
    InvalidReadCount { run: String, count: u32 },

    #[error("repository link table `{table}` is empty; nothing to reconcile")]
    #[diagnostic(help("check that the study export contains public repository links"))]
    NoRepositoryData { table: String },

    #[error("no identifier column could be chosen among non-numeric columns: {}", columns.join(", "))]
    #[diagnostic(help("expected gene identifiers (e.g. ENSG...) or a gene/symbol column"))]
    UnresolvableIdentifier { columns: Vec<String> },

    #[error("study table not found: {0}")]
    MissingTable(String),

    #[error("table `{table}` has no column `{column}`")]
    MissingColumn { table: String, column: String },

    #[error("failed to parse table `{table}`: {message}")]
    TableParse { table: String, message: String },

    #[error("failed to parse matrix: {0}")]
    MatrixParse(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("GEO request failed: {0}")]
    GeoHttp(String),

    #[error("GEO returned status {status}: {message}")]
    GeoStatus { status: u16, message: String },

    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("upstream record could not be parsed: {0}")]
    UpstreamParse(String),

    #[error("disambiguation prompt failed: {0}")]
    Prompt(String),
}

impl KiraError {
    /// Failures worth retrying: rate limits, gateway errors, timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            KiraError::Transient(_) => true,
            KiraError::NcbiStatus { status, .. } | KiraError::GeoStatus { status, .. } => {
                crate::ncbi::is_retryable_status(*status)
            }
            _ => false,
        }
    }
}
