use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum OpsError {
    #[error("invalid workspace reference (expected namespace/name): {0}")]
    InvalidWorkspace(String),

    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    #[error("invalid job id: {0}")]
    InvalidJobId(String),

    #[error("invalid gs:// URI: {0}")]
    InvalidGcsUri(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    ConfigValue(String),

    #[error("no access token available: {0}")]
    #[diagnostic(help("set TERRA_OPS_TOKEN or run `gcloud auth login`"))]
    Auth(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("TDR request failed: {0}")]
    TdrHttp(String),

    #[error("TDR returned status {status}: {message}")]
    TdrStatus { status: u16, message: String },

    #[error("Firecloud request failed: {0}")]
    FirecloudHttp(String),

    #[error("Firecloud returned status {status}: {message}")]
    FirecloudStatus { status: u16, message: String },

    #[error("GCS request failed: {0}")]
    GcsHttp(String),

    #[error("GCS returned status {status}: {message}")]
    GcsStatus { status: u16, message: String },

    #[error("job {job_id} failed (status {status}): {message}")]
    JobFailed {
        job_id: String,
        status: u16,
        message: String,
    },

    #[error("unexpected response payload: {0}")]
    Payload(String),

    #[error("invalid TSV input: {0}")]
    Tsv(String),

    #[error("dataset has no table named {0}")]
    UnknownTable(String),

    #[error("{0} already exists in the destination")]
    AlreadyExists(String),

    #[error("billing profile required: {0}")]
    MissingProfile(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
