use std::path::Path;
use std::time::Instant;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::DEFAULT_PETA_MAPPING;
use crate::direct::{DirectClient, download_via_direct_link};
use crate::domain::{DatasetStep, ShareLink, Sources};
use crate::error::{FailureKind, PrepError};
use crate::fs_util::{self, ExtractSummary};
use crate::gdrive::CloudShareClient;
use crate::layout::{DatasetLayout, ensure_dir};
use crate::mapping::FileMapping;
use crate::progress::{ProgressEvent, ProgressSink, phase};

/// PETA images sit four components below `PETA/`: `<subset>/<archive>/<file>`
/// under the archive's top-level folder.
const PETA_FILE_DEPTH: usize = 4;

/// What the orchestrator does after a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failure; later steps are reported as not run.
    #[default]
    Abort,
    /// Attempt every step regardless of earlier failures.
    Continue,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepSummary {
    pub downloaded: Vec<String>,
    pub extracted: usize,
    pub extract_failures: usize,
    pub relocated: usize,
    pub left_in_place: usize,
}

impl StepSummary {
    fn record_extract(&mut self, summary: ExtractSummary) {
        self.extracted += summary.extracted;
        self.extract_failures += summary.failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    NotRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: DatasetStep,
    pub status: StepStatus,
    pub summary: Option<StepSummary>,
    pub failure: Option<StepFailure>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrepareReport {
    pub root: String,
    pub templates_dir: String,
    pub policy: FailurePolicy,
    pub started_at: String,
    pub finished_at: String,
    pub steps: Vec<StepOutcome>,
}

impl PrepareReport {
    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|outcome| outcome.status == StepStatus::Completed)
    }

    pub fn first_failure(&self) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|outcome| outcome.status == StepStatus::Failed)
    }

    pub fn outcome(&self, step: DatasetStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|outcome| outcome.step == step)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocateSummary {
    pub relocated: usize,
    pub left_in_place: usize,
}

pub struct Pipeline<D: DirectClient, C: CloudShareClient> {
    direct: D,
    cloud: C,
    layout: DatasetLayout,
    sources: Sources,
    mapping_path: Utf8PathBuf,
    policy: FailurePolicy,
}

impl<D: DirectClient, C: CloudShareClient> Pipeline<D, C> {
    pub fn new(direct: D, cloud: C, layout: DatasetLayout, sources: Sources) -> Self {
        Self {
            direct,
            cloud,
            layout,
            sources,
            mapping_path: Utf8PathBuf::from(DEFAULT_PETA_MAPPING),
            policy: FailurePolicy::Abort,
        }
    }

    pub fn with_mapping_path(mut self, mapping_path: Utf8PathBuf) -> Self {
        self.mapping_path = mapping_path;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// Creates the dataset root and runs every step in order.
    ///
    /// Only a root that cannot be created is returned as an error; step
    /// failures are recorded in the report and handled per the policy.
    pub fn prepare_datasets(&self, sink: &dyn ProgressSink) -> Result<PrepareReport, PrepError> {
        self.layout.ensure_root()?;
        let started_at = chrono::Utc::now().to_rfc3339();

        let mut steps = Vec::with_capacity(DatasetStep::ALL.len());
        let mut aborted = false;
        for step in DatasetStep::ALL {
            if aborted {
                steps.push(StepOutcome {
                    step,
                    status: StepStatus::NotRun,
                    summary: None,
                    failure: None,
                    elapsed_ms: 0,
                });
                continue;
            }

            let started = Instant::now();
            let outcome = match self.run_step(step, sink) {
                Ok(summary) => StepOutcome {
                    step,
                    status: StepStatus::Completed,
                    summary: Some(summary),
                    failure: None,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                },
                Err(err) => {
                    tracing::error!(%step, "step failed: {err}");
                    aborted = self.policy == FailurePolicy::Abort;
                    StepOutcome {
                        step,
                        status: StepStatus::Failed,
                        summary: None,
                        failure: Some(StepFailure {
                            kind: err.kind(),
                            message: err.to_string(),
                        }),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                }
            };
            steps.push(outcome);
        }

        Ok(PrepareReport {
            root: self.layout.root().to_string(),
            templates_dir: self.layout.templates_dir().to_string(),
            policy: self.policy,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            steps,
        })
    }

    pub fn run_step(
        &self,
        step: DatasetStep,
        sink: &dyn ProgressSink,
    ) -> Result<StepSummary, PrepError> {
        match step {
            DatasetStep::Market1501 => self.prepare_market(sink),
            DatasetStep::Pa100k => self.prepare_pa100k(sink),
            DatasetStep::Peta => self.prepare_peta(sink),
            DatasetStep::Annotations => self.prepare_annotations(sink),
            DatasetStep::Templates => self.prepare_templates(sink),
        }
    }

    pub fn prepare_market(&self, sink: &dyn ProgressSink) -> Result<StepSummary, PrepError> {
        let label = DatasetStep::Market1501.label();
        let archive = self.layout.market1501_archive();
        let mut summary = StepSummary::default();

        phase(sink, format!("Download {label}"));
        summary.downloaded =
            self.resolve_share(&self.sources.market1501, archive.as_std_path(), sink)?;

        phase(sink, format!("Extract {label}"));
        summary.record_extract(fs_util::extract_zip(
            archive.as_std_path(),
            self.layout.root().as_std_path(),
            sink,
        )?);

        let extracted = self.layout.market1501_extracted_dir();
        if !extracted.as_std_path().is_dir() {
            return Err(PrepError::MissingExtractedDir(extracted.into_std_path_buf()));
        }
        let target = self.layout.market1501_dir();
        fs_util::rename_dir_replacing(extracted.as_std_path(), target.as_std_path()).map_err(
            |err| PrepError::Filesystem(format!("rename {extracted} -> {target}: {err}")),
        )?;
        Ok(summary)
    }

    pub fn prepare_pa100k(&self, sink: &dyn ProgressSink) -> Result<StepSummary, PrepError> {
        let label = DatasetStep::Pa100k.label();
        let dir = self.layout.pa100k_dir();
        ensure_dir(&dir)?;
        let mut summary = StepSummary::default();

        phase(sink, format!("Download {label}"));
        summary.downloaded = self.resolve_share(&self.sources.pa100k, dir.as_std_path(), sink)?;

        phase(sink, format!("Extract {label}"));
        summary.record_extract(fs_util::extract_zip(
            self.layout.pa100k_archive().as_std_path(),
            dir.as_std_path(),
            sink,
        )?);
        Ok(summary)
    }

    pub fn prepare_peta(&self, sink: &dyn ProgressSink) -> Result<StepSummary, PrepError> {
        let label = DatasetStep::Peta.label();
        let dir = self.layout.peta_dir();
        ensure_dir(&dir)?;
        let mapping = FileMapping::load(self.mapping_path.as_std_path())?;
        let archive = self.layout.peta_archive();
        let mut summary = StepSummary::default();

        phase(sink, format!("Download {label}"));
        download_via_direct_link(&self.direct, &self.sources.peta, archive.as_std_path(), sink)?;
        summary.downloaded.push(archive.to_string());

        phase(sink, format!("Extract {label}"));
        summary.record_extract(fs_util::extract_zip(
            archive.as_std_path(),
            dir.as_std_path(),
            sink,
        )?);

        ensure_dir(&self.layout.peta_images_dir())?;
        let relocated = relocate_peta(
            self.layout.root().as_std_path(),
            dir.as_std_path(),
            &mapping,
            sink,
        )?;
        summary.relocated = relocated.relocated;
        summary.left_in_place = relocated.left_in_place;
        Ok(summary)
    }

    pub fn prepare_annotations(&self, sink: &dyn ProgressSink) -> Result<StepSummary, PrepError> {
        let label = DatasetStep::Annotations.label();
        let dir = self.layout.annotations_dir();
        ensure_dir(dir)?;
        let archive = self.layout.annotations_archive();
        let mut summary = StepSummary::default();

        phase(sink, format!("Download {label}"));
        summary.downloaded =
            self.resolve_share(&self.sources.annotations, archive.as_std_path(), sink)?;

        phase(sink, format!("Extract {label}"));
        summary.record_extract(fs_util::extract_zip(
            archive.as_std_path(),
            dir.as_std_path(),
            sink,
        )?);
        Ok(summary)
    }

    /// Templates go to the layout's templates directory, not the dataset
    /// root.
    pub fn prepare_templates(&self, sink: &dyn ProgressSink) -> Result<StepSummary, PrepError> {
        let label = DatasetStep::Templates.label();
        let dir = self.layout.templates_dir();
        ensure_dir(dir)?;
        let archive = self.layout.templates_archive();
        let mut summary = StepSummary::default();

        phase(sink, format!("Download {label}"));
        summary.downloaded =
            self.resolve_share(&self.sources.templates, archive.as_std_path(), sink)?;

        phase(sink, format!("Extract {label}"));
        summary.record_extract(fs_util::extract_zip(
            archive.as_std_path(),
            dir.as_std_path(),
            sink,
        )?);
        Ok(summary)
    }

    fn resolve_share(
        &self,
        link: &ShareLink,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<String>, PrepError> {
        tracing::info!(url = %link, destination = %destination.display(), "resolving share link");
        let files = self.cloud.resolve(link, destination, sink)?;
        Ok(files
            .iter()
            .map(|path| path.display().to_string())
            .collect())
    }
}

/// Moves every extracted PETA file to the location the mapping names for it.
///
/// Files are looked up by their path relative to `root`. `.txt` files stay
/// where they are and are never looked up. A file without a mapping entry
/// stops the relocation; files moved before it stay moved.
pub fn relocate_peta(
    root: &Path,
    peta_dir: &Path,
    mapping: &FileMapping,
    sink: &dyn ProgressSink,
) -> Result<RelocateSummary, PrepError> {
    let candidates = fs_util::files_at_depth(peta_dir, PETA_FILE_DEPTH)?;
    let total = candidates.len() as u64;
    let mut summary = RelocateSummary::default();

    for (index, file) in candidates.iter().enumerate() {
        if file.extension().is_some_and(|ext| ext == "txt") {
            tracing::debug!(file = %file.display(), "label file, left in place");
            summary.left_in_place += 1;
        } else {
            let key = relative_key(root, file)?;
            let destination = root.join(mapping.lookup(&key)?);
            fs_util::move_file(file, &destination)?;
            summary.relocated += 1;
        }
        sink.event(ProgressEvent::Relocate {
            done: index as u64 + 1,
            total,
        });
    }

    sink.event(ProgressEvent::Finished {
        message: format!("Relocated {} PETA files", summary.relocated),
        elapsed: None,
    });
    tracing::info!(
        relocated = summary.relocated,
        left_in_place = summary.left_in_place,
        "PETA relocation finished"
    );
    Ok(summary)
}

/// `root`-relative path with `/` separators, the form mapping keys use.
fn relative_key(root: &Path, file: &Path) -> Result<String, PrepError> {
    let relative = file.strip_prefix(root).map_err(|_| {
        PrepError::Filesystem(format!(
            "{} is not below {}",
            file.display(),
            root.display()
        ))
    })?;
    let parts = relative
        .components()
        .map(|part| {
            part.as_os_str().to_str().ok_or_else(|| {
                PrepError::Filesystem(format!("non UTF-8 path: {}", file.display()))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("/"))
}
