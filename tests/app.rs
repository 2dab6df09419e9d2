use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use camino::Utf8PathBuf;

use upar_datasets::app::{FailurePolicy, Pipeline, StepStatus};
use upar_datasets::direct::DirectClient;
use upar_datasets::domain::{DatasetStep, ShareLink, Sources};
use upar_datasets::error::{FailureKind, PrepError};
use upar_datasets::gdrive::CloudShareClient;
use upar_datasets::layout::DatasetLayout;
use upar_datasets::progress::{NoopProgress, ProgressSink};

const PETA_IMAGE: &str = "PETA/PETA dataset/3DPeS/archive/100_1_FRAME_26_RGB.bmp";
const PETA_LABEL: &str = "PETA/PETA dataset/3DPeS/archive/Label.txt";
const PETA_CUHK: &str = "PETA/PETA dataset/CUHK/archive/0001.png";

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[derive(Default)]
struct MockDirect {
    archive: Vec<u8>,
    calls: Mutex<usize>,
}

impl DirectClient for MockDirect {
    fn fetch(
        &self,
        _url: &str,
        destination: &Path,
        _sink: &dyn ProgressSink,
    ) -> Result<u64, PrepError> {
        *self.calls.lock().unwrap() += 1;
        fs::write(destination, &self.archive).unwrap();
        Ok(self.archive.len() as u64)
    }
}

#[derive(Default)]
struct MockCloud {
    files: HashMap<String, Vec<u8>>,
    folders: HashMap<String, Vec<(String, Vec<u8>)>>,
    failing: Vec<String>,
    parents_existed: Mutex<Vec<bool>>,
}

impl CloudShareClient for MockCloud {
    fn resolve(
        &self,
        link: &ShareLink,
        destination: &Path,
        _sink: &dyn ProgressSink,
    ) -> Result<Vec<PathBuf>, PrepError> {
        let parent_exists = destination.parent().map(Path::exists).unwrap_or(false);
        self.parents_existed.lock().unwrap().push(parent_exists);
        if self.failing.iter().any(|id| id == link.id()) {
            return Err(PrepError::DriveQuota(link.id().to_string()));
        }
        match link {
            ShareLink::File { id } => {
                fs::write(destination, &self.files[id]).unwrap();
                Ok(vec![destination.to_path_buf()])
            }
            ShareLink::Folder { id } => {
                fs::create_dir_all(destination).unwrap();
                let mut written = Vec::new();
                for (name, data) in &self.folders[id] {
                    let path = destination.join(name);
                    fs::write(&path, data).unwrap();
                    written.push(path);
                }
                Ok(written)
            }
        }
    }
}

fn test_sources() -> Sources {
    Sources {
        market1501: ShareLink::File {
            id: "market".to_string(),
        },
        pa100k: ShareLink::Folder {
            id: "pa100k".to_string(),
        },
        peta: "https://example.invalid/PETA.zip?dl=1".to_string(),
        annotations: ShareLink::File {
            id: "annotations".to_string(),
        },
        templates: ShareLink::File {
            id: "templates".to_string(),
        },
    }
}

fn market_archive() -> Vec<u8> {
    zip_bytes(&[
        (
            "Market-1501-v15.09.15/bounding_box_test/0001_c1s1_000151_01.jpg",
            "jpg",
        ),
        ("Market-1501-v15.09.15/readme.txt", "readme"),
    ])
}

fn peta_archive() -> Vec<u8> {
    zip_bytes(&[
        ("PETA dataset/3DPeS/archive/100_1_FRAME_26_RGB.bmp", "bmp"),
        ("PETA dataset/3DPeS/archive/Label.txt", "labels"),
        ("PETA dataset/CUHK/archive/0001.png", "png"),
    ])
}

fn mock_cloud() -> MockCloud {
    let mut cloud = MockCloud::default();
    cloud.files.insert("market".to_string(), market_archive());
    cloud.files.insert(
        "annotations".to_string(),
        zip_bytes(&[("annotations/phase1/train.csv", "path,attr")]),
    );
    cloud.files.insert(
        "templates".to_string(),
        zip_bytes(&[("submission_templates/phase1.csv", "template")]),
    );
    cloud.folders.insert(
        "pa100k".to_string(),
        vec![
            (
                "data.zip".to_string(),
                zip_bytes(&[("data/000001.jpg", "pa")]),
            ),
            ("annotation.mat".to_string(), b"mat".to_vec()),
        ],
    );
    cloud
}

struct Fixture {
    _temp: tempfile::TempDir,
    root: PathBuf,
    templates: PathBuf,
    mapping: PathBuf,
}

fn fixture(mapping: &str) -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("nested").join("data");
    let templates = temp.path().join("workdir");
    let mapping_path = temp.path().join("peta_file_mapping.txt");
    fs::write(&mapping_path, mapping).unwrap();
    Fixture {
        root,
        templates,
        mapping: mapping_path,
        _temp: temp,
    }
}

fn full_mapping() -> String {
    format!("{PETA_IMAGE},PETA/images/00001.bmp\n{PETA_CUHK},PETA/images/00002.png\n")
}

fn pipeline(
    fx: &Fixture,
    direct: MockDirect,
    cloud: MockCloud,
    policy: FailurePolicy,
) -> Pipeline<MockDirect, MockCloud> {
    let layout = DatasetLayout::new(
        Utf8PathBuf::from_path_buf(fx.root.clone()).unwrap(),
        Utf8PathBuf::from_path_buf(fx.templates.clone()).unwrap(),
    );
    Pipeline::new(direct, cloud, layout, test_sources())
        .with_mapping_path(Utf8PathBuf::from_path_buf(fx.mapping.clone()).unwrap())
        .with_policy(policy)
}

fn peta_direct() -> MockDirect {
    MockDirect {
        archive: peta_archive(),
        ..Default::default()
    }
}

#[test]
fn prepares_full_layout() {
    let fx = fixture(&full_mapping());
    let pipeline = pipeline(&fx, peta_direct(), mock_cloud(), FailurePolicy::Abort);

    let report = pipeline.prepare_datasets(&NoopProgress).unwrap();

    assert!(report.is_complete(), "{report:?}");
    let root = &fx.root;
    assert!(
        root.join("Market1501/bounding_box_test/0001_c1s1_000151_01.jpg")
            .is_file()
    );
    assert!(!root.join("Market-1501-v15.09.15").exists());
    assert!(root.join("PA100k/data/000001.jpg").is_file());
    assert!(root.join("PA100k/annotation.mat").is_file());
    assert_eq!(
        fs::read(root.join("PETA/images/00001.bmp")).unwrap(),
        b"bmp"
    );
    assert!(root.join("PETA/images/00002.png").is_file());
    assert!(!root.join(PETA_IMAGE).exists());
    assert!(root.join(PETA_LABEL).is_file());
    assert!(root.join("annotations/phase1/train.csv").is_file());
    assert!(fx.templates.join("submission_templates/phase1.csv").is_file());
    assert!(!root.join("submission_templates").exists());

    let peta = report.outcome(DatasetStep::Peta).unwrap();
    let summary = peta.summary.as_ref().unwrap();
    assert_eq!(summary.relocated, 2);
    assert_eq!(summary.left_in_place, 1);
}

#[test]
fn root_exists_before_first_download() {
    let fx = fixture(&full_mapping());
    assert!(!fx.root.exists());
    let layout = DatasetLayout::new(
        Utf8PathBuf::from_path_buf(fx.root.clone()).unwrap(),
        Utf8PathBuf::from_path_buf(fx.templates.clone()).unwrap(),
    );
    let direct = peta_direct();
    let cloud = mock_cloud();
    let pipeline = Pipeline::new(&direct, &cloud, layout, test_sources())
        .with_mapping_path(Utf8PathBuf::from_path_buf(fx.mapping.clone()).unwrap());

    pipeline.prepare_datasets(&NoopProgress).unwrap();

    // The market archive is the first download and lands directly in the root.
    let parents = cloud.parents_existed.lock().unwrap();
    assert_eq!(parents.first(), Some(&true));
}

#[test]
fn abort_policy_stops_after_first_failure() {
    let fx = fixture(&full_mapping());
    let mut cloud = mock_cloud();
    cloud.failing.push("market".to_string());
    let pipeline = pipeline(&fx, peta_direct(), cloud, FailurePolicy::Abort);

    let report = pipeline.prepare_datasets(&NoopProgress).unwrap();

    let statuses: Vec<StepStatus> = report.steps.iter().map(|step| step.status).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Failed,
            StepStatus::NotRun,
            StepStatus::NotRun,
            StepStatus::NotRun,
            StepStatus::NotRun,
        ]
    );
    let failure = report.first_failure().unwrap().failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Network);
    assert!(!fx.root.join("PA100k").exists());
}

#[test]
fn continue_policy_attempts_every_step() {
    let fx = fixture(&full_mapping());
    let mut cloud = mock_cloud();
    cloud.failing.push("market".to_string());
    let pipeline = pipeline(&fx, peta_direct(), cloud, FailurePolicy::Continue);

    let report = pipeline.prepare_datasets(&NoopProgress).unwrap();

    assert!(!report.is_complete());
    assert_eq!(
        report.outcome(DatasetStep::Market1501).unwrap().status,
        StepStatus::Failed
    );
    for step in [
        DatasetStep::Pa100k,
        DatasetStep::Peta,
        DatasetStep::Annotations,
        DatasetStep::Templates,
    ] {
        assert_eq!(report.outcome(step).unwrap().status, StepStatus::Completed);
    }
}

#[test]
fn missing_mapping_entry_fails_peta_step() {
    let fx = fixture(&format!("{PETA_IMAGE},PETA/images/00001.bmp\n"));
    let pipeline = pipeline(&fx, peta_direct(), mock_cloud(), FailurePolicy::Continue);

    let report = pipeline.prepare_datasets(&NoopProgress).unwrap();

    let peta = report.outcome(DatasetStep::Peta).unwrap();
    assert_eq!(peta.status, StepStatus::Failed);
    let failure = peta.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Mapping);
    assert!(failure.message.contains("CUHK/archive/0001.png"));
    // Sorted order moves 3DPeS before CUHK is looked up.
    assert!(fx.root.join("PETA/images/00001.bmp").is_file());
    assert!(fx.root.join(PETA_CUHK).is_file());
    assert_eq!(
        report.outcome(DatasetStep::Annotations).unwrap().status,
        StepStatus::Completed
    );
}

#[test]
fn rerun_replaces_market_directory() {
    let fx = fixture(&full_mapping());
    let pipeline = pipeline(&fx, peta_direct(), mock_cloud(), FailurePolicy::Abort);

    assert!(pipeline.prepare_datasets(&NoopProgress).unwrap().is_complete());
    fs::write(fx.root.join("Market1501/stale.txt"), "old").unwrap();
    let second = pipeline.prepare_datasets(&NoopProgress).unwrap();

    assert!(second.is_complete(), "{second:?}");
    assert!(fx.root.join("Market1501/readme.txt").is_file());
    assert!(!fx.root.join("Market1501/stale.txt").exists());
    assert!(!fx.root.join("Market-1501-v15.09.15").exists());
}

#[test]
fn direct_client_called_once_across_runs() {
    let fx = fixture(&full_mapping());
    let layout = DatasetLayout::new(
        Utf8PathBuf::from_path_buf(fx.root.clone()).unwrap(),
        Utf8PathBuf::from_path_buf(fx.templates.clone()).unwrap(),
    );
    let direct = peta_direct();
    let cloud = mock_cloud();
    let pipeline = Pipeline::new(&direct, &cloud, layout, test_sources())
        .with_mapping_path(Utf8PathBuf::from_path_buf(fx.mapping.clone()).unwrap());

    pipeline.run_step(DatasetStep::Peta, &NoopProgress).unwrap();
    pipeline.run_step(DatasetStep::Peta, &NoopProgress).unwrap();

    assert_eq!(*direct.calls.lock().unwrap(), 1);
}

#[test]
fn market_without_expected_folder_fails() {
    let fx = fixture(&full_mapping());
    let mut cloud = mock_cloud();
    cloud.files.insert(
        "market".to_string(),
        zip_bytes(&[("Market-1501/bounding_box_test/0001.jpg", "jpg")]),
    );
    let pipeline = pipeline(&fx, peta_direct(), cloud, FailurePolicy::Abort);
    fs::create_dir_all(&fx.root).unwrap();

    let err = pipeline
        .run_step(DatasetStep::Market1501, &NoopProgress)
        .unwrap_err();

    assert!(matches!(err, PrepError::MissingExtractedDir(_)));
    assert!(!fx.root.join("Market1501").exists());
}
