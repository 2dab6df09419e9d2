use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PrepError;

pub const MARKET1501_URL: &str = "https://drive.google.com/file/d/0B8-rUzbwVRk0c054eEozWG9COHM/view?resourcekey=0-8nyl7K9_x37HlQm34MmrYQ";
pub const PA100K_URL: &str =
    "https://drive.google.com/drive/folders/1d_D0Yh7C262gr0ef9EqkvG_M3fqgAWa2?usp=sharing";
pub const PETA_URL: &str = "https://www.dropbox.com/s/52ylx522hwbdxz6/PETA.zip?dl=1";
pub const ANNOTATIONS_URL: &str =
    "https://drive.google.com/file/d/1LeP3i59wJG9QZNwwz4iIyiU9iTCB4yQv/view?usp=sharing";
pub const TEMPLATES_URL: &str =
    "https://drive.google.com/file/d/1dnciiDxOQcPCvhXCSMFlENAdn7Mfp-ow/view?usp=sharing";

/// The preparation steps, in the order the orchestrator runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStep {
    Market1501,
    Pa100k,
    Peta,
    Annotations,
    Templates,
}

impl DatasetStep {
    pub const ALL: [DatasetStep; 5] = [
        DatasetStep::Market1501,
        DatasetStep::Pa100k,
        DatasetStep::Peta,
        DatasetStep::Annotations,
        DatasetStep::Templates,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DatasetStep::Market1501 => "Market 1501 dataset",
            DatasetStep::Pa100k => "PA100k dataset",
            DatasetStep::Peta => "PETA dataset",
            DatasetStep::Annotations => "annotations",
            DatasetStep::Templates => "templates",
        }
    }
}

impl fmt::Display for DatasetStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetStep::Market1501 => write!(f, "market1501"),
            DatasetStep::Pa100k => write!(f, "pa100k"),
            DatasetStep::Peta => write!(f, "peta"),
            DatasetStep::Annotations => write!(f, "annotations"),
            DatasetStep::Templates => write!(f, "templates"),
        }
    }
}

/// A cloud-drive share reference. Files resolve to one local file, folders to
/// the files they contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShareLink {
    File { id: String },
    Folder { id: String },
}

impl ShareLink {
    pub fn id(&self) -> &str {
        match self {
            ShareLink::File { id } | ShareLink::Folder { id } => id,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, ShareLink::Folder { .. })
    }
}

impl fmt::Display for ShareLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareLink::File { id } => write!(f, "https://drive.google.com/file/d/{id}/view"),
            ShareLink::Folder { id } => write!(f, "https://drive.google.com/drive/folders/{id}"),
        }
    }
}

static FILE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/file/d/([A-Za-z0-9_-]+)").unwrap());
static FOLDER_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/folders/([A-Za-z0-9_-]+)").unwrap());
static ID_QUERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").unwrap());

impl FromStr for ShareLink {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_drive_host = trimmed.starts_with("https://drive.google.com/")
            || trimmed.starts_with("https://docs.google.com/");
        if !is_drive_host {
            return Err(PrepError::InvalidShareLink(value.to_string()));
        }
        if let Some(caps) = FOLDER_PATH_RE.captures(trimmed) {
            return Ok(ShareLink::Folder {
                id: caps[1].to_string(),
            });
        }
        if let Some(caps) = FILE_PATH_RE.captures(trimmed) {
            return Ok(ShareLink::File {
                id: caps[1].to_string(),
            });
        }
        if let Some(caps) = ID_QUERY_RE.captures(trimmed) {
            return Ok(ShareLink::File {
                id: caps[1].to_string(),
            });
        }
        Err(PrepError::InvalidShareLink(value.to_string()))
    }
}

/// Where each bundle is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sources {
    pub market1501: ShareLink,
    pub pa100k: ShareLink,
    pub peta: String,
    pub annotations: ShareLink,
    pub templates: ShareLink,
}

impl Sources {
    pub fn builtin() -> Result<Self, PrepError> {
        Ok(Self {
            market1501: MARKET1501_URL.parse()?,
            pa100k: PA100K_URL.parse()?,
            peta: PETA_URL.to_string(),
            annotations: ANNOTATIONS_URL.parse()?,
            templates: TEMPLATES_URL.parse()?,
        })
    }
}
