mod common;

use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;
use auto_fastq_symlink::config::ConfigLoader;
use auto_fastq_symlink::error::SymlinkError;
use camino::Utf8PathBuf;

use common::temp_root;

const PROJECTS_HEADER: &str =
    "project_id,fastq_symlinks_dir,excluded_runs_list,excluded_libraries_list,simplify_symlink_filenames\n";

#[test]
fn resolve_config_file() {
    let (_temp, root) = temp_root();
    fs::write(root.join("excluded_libraries.txt"), "Sample-9\n\nSample-10\n").unwrap();
    fs::write(
        root.join("projects.csv"),
        format!("{PROJECTS_HEADER}P1,links/P1,,excluded_libraries.txt,t\n"),
    )
    .unwrap();
    fs::write(
        root.join("translation.csv"),
        "samplesheet_project_id,symlinking_project_id\nproj-x,P1\n",
    )
    .unwrap();
    fs::write(
        root.join("config.json"),
        r#"{
  "run_parent_dirs": ["runs", "/data/runs"],
  "projects_definition_file": "projects.csv",
  "project_id_translation_file": "translation.csv",
  "database_connection_uri": "sqlite:///state/afs.db",
  "scan_interval_seconds": 30,
  "fastq_extensions": [".fastq.gz"],
  "upload_complete_marker": "upload_complete.txt"
}"#,
    )
    .unwrap();

    let config = ConfigLoader::resolve(&root.join("config.json")).unwrap();
    assert_eq!(config.run_parent_dirs, vec![root.join("runs"), Utf8PathBuf::from("/data/runs")]);
    assert_eq!(config.database_path, root.join("state/afs.db"));
    assert_eq!(config.scan_interval, Duration::from_secs(30));
    assert_eq!(config.fastq_extensions, vec![".fastq.gz".to_string()]);
    assert_eq!(config.markers.upload_complete, "upload_complete.txt");
    assert_eq!(config.markers.qc_check_complete, "qc_check_complete.json");

    let p1 = &config.projects["P1"];
    assert!(p1.simplify_symlink_filenames);
    assert_eq!(p1.fastq_symlinks_dir, root.join("links/P1"));
    assert!(p1.excluded_runs.is_empty());
    assert_eq!(p1.excluded_libraries.len(), 2);
    assert_eq!(config.project_id_translation["proj-x"], "P1");
}

#[test]
fn unreadable_exclusion_list_is_fatal() {
    let (_temp, root) = temp_root();
    fs::write(
        root.join("projects.csv"),
        format!("{PROJECTS_HEADER}P1,links/P1,missing_runs.txt,,false\n"),
    )
    .unwrap();
    fs::write(
        root.join("config.json"),
        r#"{"run_parent_dirs": [], "projects_definition_file": "projects.csv", "database_path": "afs.db"}"#,
    )
    .unwrap();

    let err = ConfigLoader::resolve(&root.join("config.json")).unwrap_err();
    assert!(err.is_configuration_integrity());
    assert_matches!(
        err,
        SymlinkError::ExclusionList { ref project_id, kind: "runs", .. } if project_id == "P1"
    );
}

#[test]
fn broken_config_files() {
    let (_temp, root) = temp_root();
    let err = ConfigLoader::resolve(&root.join("absent.json")).unwrap_err();
    assert_matches!(err, SymlinkError::ConfigRead(_));

    fs::write(root.join("config.json"), "{ not json").unwrap();
    let err = ConfigLoader::resolve(&root.join("config.json")).unwrap_err();
    assert_matches!(err, SymlinkError::ConfigParse(_));
    assert!(!err.is_configuration_integrity());

    fs::write(
        root.join("config.json"),
        r#"{"run_parent_dirs": [], "projects_definition_file": "missing.csv", "database_path": "afs.db"}"#,
    )
    .unwrap();
    let err = ConfigLoader::resolve(&root.join("config.json")).unwrap_err();
    assert_matches!(err, SymlinkError::ProjectsDefinition { .. });
}
