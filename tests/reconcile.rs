#![cfg(unix)]

mod common;

use std::fs;

use auto_fastq_symlink::config::ResolvedConfig;
use auto_fastq_symlink::discovery::{RunScanner, ScanOutcome};
use auto_fastq_symlink::domain::Project;
use auto_fastq_symlink::reconcile::{
    SYMLINKS_COMPLETE_MARKER, create_symlinks, determine_symlinks_to_create,
    find_existing_symlinks,
};
use auto_fastq_symlink::shutdown::Shutdown;
use auto_fastq_symlink::store::{RecordStore, SqliteStore};
use camino::Utf8PathBuf;

use common::{MISEQ_RUN, config_with_projects, miseq_samplesheet, temp_root, write_miseq_run};

const R1: &str = "Sample-1_S1_L001_R1_001.fastq.gz";
const R2: &str = "Sample-1_S1_L001_R2_001.fastq.gz";

fn store_scanned_runs(config: &ResolvedConfig, store: &mut SqliteStore) {
    store.store_projects(&config.projects).unwrap();
    for outcome in RunScanner::new(config) {
        if let ScanOutcome::Resolved(run) = outcome {
            store.store_run(&run).unwrap();
        }
    }
}

fn setup(project: Project, fastqs: &[&str]) -> (tempfile::TempDir, ResolvedConfig, Utf8PathBuf) {
    let (temp, root) = temp_root();
    let run_dir = write_miseq_run(
        &root.join("runs"),
        MISEQ_RUN,
        &miseq_samplesheet(&[("S1", "Sample_1", project.project_id.as_str())]),
        fastqs,
    );
    let mut project = project;
    project.fastq_symlinks_dir = root.join("links").join(&project.project_id);
    let config = config_with_projects(&root, vec![project]);
    (temp, config, run_dir.join("Data/Intensities/BaseCalls"))
}

#[test]
fn reconciliation_is_idempotent() {
    let (_temp, config, fastq_dir) = setup(Project::new("P1", ""), &[R1, R2]);
    let mut store = SqliteStore::open_in_memory().unwrap();
    store_scanned_runs(&config, &mut store);
    let shutdown = Shutdown::new();

    let candidates = determine_symlinks_to_create(&config, &store, None).unwrap();
    assert_eq!(candidates["P1"].len(), 2);
    let report = create_symlinks(&config, &mut store, &candidates, &shutdown);
    assert_eq!(report.total, 2);
    assert_eq!(report.per_project["P1"], 2);

    let link_dir = config.projects["P1"].run_symlinks_dir(MISEQ_RUN);
    assert_eq!(
        fs::read_link(link_dir.join(R1)).unwrap(),
        fastq_dir.join(R1).as_std_path()
    );
    let marker = fs::read_to_string(link_dir.join(SYMLINKS_COMPLETE_MARKER)).unwrap();
    let marker: serde_json::Value = serde_json::from_str(&marker).unwrap();
    assert_eq!(marker["num_symlinks_created"], 2);
    assert!(marker["timestamp"].is_string());

    let candidates = determine_symlinks_to_create(&config, &store, None).unwrap();
    assert!(candidates["P1"].is_empty());
    let report = create_symlinks(&config, &mut store, &candidates, &shutdown);
    assert_eq!(report.total, 0);
    assert_eq!(store.symlinks(None).unwrap().len(), 2);
}

#[test]
fn excluded_runs_and_libraries_are_not_linked() {
    let mut by_run = Project::new("P1", "");
    by_run.excluded_runs.insert(MISEQ_RUN.to_string());
    let (_temp, config, _) = setup(by_run, &[R1, R2]);
    let mut store = SqliteStore::open_in_memory().unwrap();
    store_scanned_runs(&config, &mut store);
    let candidates = determine_symlinks_to_create(&config, &store, None).unwrap();
    assert!(candidates["P1"].is_empty());

    let mut by_library = Project::new("P1", "");
    by_library.excluded_libraries.insert("Sample-1".to_string());
    let (_temp, config, _) = setup(by_library, &[R1, R2]);
    let mut store = SqliteStore::open_in_memory().unwrap();
    store_scanned_runs(&config, &mut store);
    let candidates = determine_symlinks_to_create(&config, &store, Some(MISEQ_RUN)).unwrap();
    assert!(candidates["P1"].is_empty());
}

#[test]
fn missing_reverse_read_links_forward_only() {
    let (_temp, config, _) = setup(Project::new("P1", ""), &[R1]);
    let mut store = SqliteStore::open_in_memory().unwrap();
    store_scanned_runs(&config, &mut store);

    let candidates = determine_symlinks_to_create(&config, &store, None).unwrap();
    assert_eq!(candidates["P1"].len(), 2);
    assert!(candidates["P1"][1].target.is_none());

    let report = create_symlinks(&config, &mut store, &candidates, &Shutdown::new());
    assert_eq!(report.total, 1);
    let link_dir = config.projects["P1"].run_symlinks_dir(MISEQ_RUN);
    let entries: Vec<_> = fs::read_dir(&link_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .filter(|name| name != SYMLINKS_COMPLETE_MARKER)
        .collect();
    assert_eq!(entries, vec![R1.to_string()]);
}

#[test]
fn existing_link_at_path_is_not_counted() {
    let (_temp, config, fastq_dir) = setup(Project::new("P1", ""), &[R1, R2]);
    let link_dir = config.projects["P1"].run_symlinks_dir(MISEQ_RUN);
    fs::create_dir_all(&link_dir).unwrap();
    std::os::unix::fs::symlink(fastq_dir.join(R1), link_dir.join(R1)).unwrap();

    let mut store = SqliteStore::open_in_memory().unwrap();
    store_scanned_runs(&config, &mut store);
    let candidates = determine_symlinks_to_create(&config, &store, None).unwrap();
    let report = create_symlinks(&config, &mut store, &candidates, &Shutdown::new());
    assert_eq!(report.total, 1);
    // The pre-existing link points at the right file, so it is recorded as well.
    assert_eq!(store.symlinks(None).unwrap().len(), 2);
}

#[test]
fn interrupted_before_any_project() {
    let (_temp, config, _) = setup(Project::new("P1", ""), &[R1, R2]);
    let mut store = SqliteStore::open_in_memory().unwrap();
    store_scanned_runs(&config, &mut store);
    let candidates = determine_symlinks_to_create(&config, &store, None).unwrap();

    let shutdown = Shutdown::new();
    shutdown.request();
    let report = create_symlinks(&config, &mut store, &candidates, &shutdown);
    assert_eq!(report.total, 0);
    assert!(store.symlinks(None).unwrap().is_empty());
}

fn relative_target(file: &str) -> String {
    format!("../../../runs/{MISEQ_RUN}/Data/Intensities/BaseCalls/{file}")
}

#[test]
fn existing_relative_link_at_path_is_recorded() {
    let (_temp, config, fastq_dir) = setup(Project::new("P1", ""), &[R1, R2]);
    let link_dir = config.projects["P1"].run_symlinks_dir(MISEQ_RUN);
    fs::create_dir_all(&link_dir).unwrap();
    std::os::unix::fs::symlink(relative_target(R1), link_dir.join(R1)).unwrap();

    let mut store = SqliteStore::open_in_memory().unwrap();
    store_scanned_runs(&config, &mut store);
    let candidates = determine_symlinks_to_create(&config, &store, None).unwrap();
    let report = create_symlinks(&config, &mut store, &candidates, &Shutdown::new());
    assert_eq!(report.total, 1);

    let targets: Vec<_> = store.symlinks(None).unwrap().into_iter().map(|s| s.target).collect();
    assert!(targets.contains(&fastq_dir.join(R1)));
    assert_eq!(targets.len(), 2);
    let candidates = determine_symlinks_to_create(&config, &store, None).unwrap();
    assert!(candidates["P1"].is_empty());
}

#[test]
fn finds_links_on_disk() {
    let (_temp, config, fastq_dir) = setup(Project::new("P1", ""), &[R1, R2]);
    let link_dir = config.projects["P1"].run_symlinks_dir(MISEQ_RUN);
    fs::create_dir_all(&link_dir).unwrap();
    std::os::unix::fs::symlink(fastq_dir.join(R1), link_dir.join("a_R1.fastq.gz")).unwrap();
    std::os::unix::fs::symlink(relative_target(R2), link_dir.join("relative_R2.fastq.gz")).unwrap();
    std::os::unix::fs::symlink(fastq_dir.join("gone.fastq.gz"), link_dir.join("z_R1.fastq.gz"))
        .unwrap();
    fs::write(link_dir.join(SYMLINKS_COMPLETE_MARKER), "{}").unwrap();

    let found = find_existing_symlinks(&config.projects);
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].path, link_dir.join("a_R1.fastq.gz"));
    assert_eq!(found[0].target, fastq_dir.join(R1));
    assert_eq!(found[0].library_id, "Sample-1");
    assert_eq!(found[0].sequencing_run_id, MISEQ_RUN);
    assert_eq!(found[1].path, link_dir.join("relative_R2.fastq.gz"));
    assert_eq!(found[1].target, fastq_dir.join(R2));
}
