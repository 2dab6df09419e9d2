use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PrepError {
    #[error("invalid share link: {0}")]
    InvalidShareLink(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("download request failed: {0}")]
    Http(String),

    #[error("download host returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Google Drive request failed: {0}")]
    DriveHttp(String),

    #[error("Google Drive returned status {status}: {message}")]
    DriveStatus { status: u16, message: String },

    #[error("Google Drive download quota exceeded: {0}")]
    DriveQuota(String),

    #[error("Google Drive offered no download: {0}")]
    DriveUnavailable(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("failed to read mapping file at {0}")]
    MappingRead(PathBuf),

    #[error("malformed mapping file, line {line}: {content}")]
    MappingParse { line: usize, content: String },

    #[error("no mapping entry for extracted file: {0}")]
    MissingMapping(String),

    #[error("expected extracted directory is missing: {0}")]
    MissingExtractedDir(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Network,
    Filesystem,
    Archive,
    Mapping,
    Config,
}

impl PrepError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PrepError::Http(_)
            | PrepError::HttpStatus { .. }
            | PrepError::DriveHttp(_)
            | PrepError::DriveStatus { .. }
            | PrepError::DriveQuota(_)
            | PrepError::DriveUnavailable(_) => FailureKind::Network,
            PrepError::InvalidShareLink(_)
            | PrepError::ConfigRead(_)
            | PrepError::ConfigParse(_) => FailureKind::Config,
            PrepError::MappingRead(_)
            | PrepError::MappingParse { .. }
            | PrepError::MissingMapping(_) => FailureKind::Mapping,
            PrepError::Archive(_) => FailureKind::Archive,
            PrepError::Filesystem(_) | PrepError::MissingExtractedDir(_) => {
                FailureKind::Filesystem
            }
        }
    }
}
