use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::PrepError;

pub const MARKET1501_DIR: &str = "Market1501";
pub const MARKET1501_EXTRACTED_DIR: &str = "Market-1501-v15.09.15";
pub const PA100K_DIR: &str = "PA100k";
pub const PA100K_ARCHIVE: &str = "data.zip";
pub const PETA_DIR: &str = "PETA";
pub const PETA_IMAGES_DIR: &str = "images";

/// On-disk layout of a prepared dataset root.
///
/// Submission templates live under `templates_dir`, which defaults to the
/// working directory rather than the dataset root.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: Utf8PathBuf,
    templates_dir: Utf8PathBuf,
}

impl DatasetLayout {
    pub fn new(root: Utf8PathBuf, templates_dir: Utf8PathBuf) -> Self {
        Self {
            root,
            templates_dir,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn templates_dir(&self) -> &Utf8Path {
        &self.templates_dir
    }

    pub fn market1501_dir(&self) -> Utf8PathBuf {
        self.root.join(MARKET1501_DIR)
    }

    pub fn market1501_extracted_dir(&self) -> Utf8PathBuf {
        self.root.join(MARKET1501_EXTRACTED_DIR)
    }

    pub fn market1501_archive(&self) -> Utf8PathBuf {
        self.root.join("market_1501.zip")
    }

    pub fn pa100k_dir(&self) -> Utf8PathBuf {
        self.root.join(PA100K_DIR)
    }

    pub fn pa100k_archive(&self) -> Utf8PathBuf {
        self.pa100k_dir().join(PA100K_ARCHIVE)
    }

    pub fn peta_dir(&self) -> Utf8PathBuf {
        self.root.join(PETA_DIR)
    }

    pub fn peta_archive(&self) -> Utf8PathBuf {
        self.peta_dir().join("peta.zip")
    }

    pub fn peta_images_dir(&self) -> Utf8PathBuf {
        self.peta_dir().join(PETA_IMAGES_DIR)
    }

    pub fn annotations_dir(&self) -> &Utf8Path {
        &self.root
    }

    pub fn annotations_archive(&self) -> Utf8PathBuf {
        self.root.join("development.zip")
    }

    pub fn templates_archive(&self) -> Utf8PathBuf {
        self.templates_dir.join("submission_templates.zip")
    }

    pub fn ensure_root(&self) -> Result<(), PrepError> {
        ensure_dir(&self.root)
    }
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), PrepError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| PrepError::Filesystem(format!("create {path}: {err}")))
}
