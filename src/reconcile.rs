use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use regex::Regex;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{Project, Symlink};
use crate::error::SymlinkError;
use crate::fs_util;
use crate::shutdown::Shutdown;
use crate::store::RecordStore;

pub const SYMLINKS_COMPLETE_MARKER: &str = "symlinks_complete.json";

static READ_DESIGNATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(R[12])_").expect("static regex"));

/// `target` is `None` when the library has no file for that read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkCandidate {
    pub project_id: String,
    pub sequencing_run_id: String,
    pub library_id: String,
    pub target: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreationReport {
    pub per_project: BTreeMap<String, usize>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
struct SymlinksComplete {
    num_symlinks_created: usize,
    timestamp: String,
}

/// A library counts as linked once its project has a record for the R1 file.
pub fn determine_symlinks_to_create<S: RecordStore + ?Sized>(
    config: &ResolvedConfig,
    store: &S,
    run_id: Option<&str>,
) -> Result<BTreeMap<String, Vec<SymlinkCandidate>>, SymlinkError> {
    let existing: HashSet<(String, Utf8PathBuf)> = store
        .symlinks(run_id)?
        .into_iter()
        .map(|symlink| (symlink.project_id, fs_util::normalize_lexically(&symlink.target)))
        .collect();

    let mut candidates = BTreeMap::new();
    for (project_id, project) in &config.projects {
        let mut project_candidates = Vec::new();
        for library in store.libraries_by_project(project_id, run_id)? {
            if project.is_excluded(&library) {
                continue;
            }
            let linked = library.fastq_path_r1.as_ref().is_some_and(|r1| {
                existing.contains(&(project_id.clone(), fs_util::normalize_lexically(r1)))
            });
            if linked {
                continue;
            }
            for target in [library.fastq_path_r1, library.fastq_path_r2] {
                project_candidates.push(SymlinkCandidate {
                    project_id: project_id.clone(),
                    sequencing_run_id: library.sequencing_run_id.clone(),
                    library_id: library.library_id.clone(),
                    target,
                });
            }
        }
        candidates.insert(project_id.clone(), project_candidates);
    }
    Ok(candidates)
}

/// `Sample-1_S1_L001_R1_001.fastq.gz` -> `Sample-1_R1.fastq.gz` when simplifying.
pub fn symlink_filename(target: &Utf8Path, simplify: bool) -> String {
    let basename = target.file_name().unwrap_or_default();
    if !simplify {
        return basename.to_string();
    }
    let prefix = basename.split('_').next().unwrap_or_default();
    let read = READ_DESIGNATOR
        .captures(basename)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or_default();
    format!("{prefix}_{read}.fastq.gz")
}

pub fn create_symlinks<S: RecordStore + ?Sized>(
    config: &ResolvedConfig,
    store: &mut S,
    candidates: &BTreeMap<String, Vec<SymlinkCandidate>>,
    shutdown: &Shutdown,
) -> CreationReport {
    let mut report = CreationReport::default();
    for (project_id, project_candidates) in candidates {
        if shutdown.is_requested() {
            tracing::info!(event_type = "create_symlinks_interrupted", project_id = %project_id);
            break;
        }
        let Some(project) = config.projects.get(project_id) else {
            continue;
        };
        let created = create_project_symlinks(project, store, project_candidates);
        report.total += created;
        report.per_project.insert(project_id.clone(), created);
    }
    report
}

fn create_project_symlinks<S: RecordStore + ?Sized>(
    project: &Project,
    store: &mut S,
    candidates: &[SymlinkCandidate],
) -> usize {
    let mut created_per_dir: BTreeMap<Utf8PathBuf, usize> = BTreeMap::new();
    let mut created = 0;

    for candidate in candidates {
        let Some(target) = &candidate.target else {
            continue;
        };
        let parent = project.run_symlinks_dir(&candidate.sequencing_run_id);
        if let Err(err) = fs::create_dir_all(&parent) {
            tracing::error!(
                event_type = "create_symlink_dir_failed",
                project_id = %project.project_id,
                path = %parent,
                error = %err
            );
            continue;
        }
        let path = parent.join(symlink_filename(target, project.simplify_symlink_filenames));
        let record = Symlink {
            project_id: project.project_id.clone(),
            sequencing_run_id: candidate.sequencing_run_id.clone(),
            library_id: candidate.library_id.clone(),
            path: path.clone(),
            target: target.clone(),
        };

        let dir_count = created_per_dir.entry(parent.clone()).or_default();
        match fs_util::create_symlink(target, &path) {
            Ok(()) => {
                created += 1;
                *dir_count += 1;
                tracing::info!(
                    event_type = "symlink_created",
                    project_id = %project.project_id,
                    run_id = %candidate.sequencing_run_id,
                    library_id = %candidate.library_id,
                    symlink_path = %path,
                    symlink_target = %target
                );
                record_symlink(store, &record);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!(
                    event_type = "attempted_to_create_existing_symlink",
                    symlink_path = %path,
                    symlink_target = %target
                );
                if points_to(&path, target) {
                    record_symlink(store, &record);
                }
            }
            Err(err) => {
                tracing::error!(
                    event_type = "create_symlink_failed",
                    symlink_path = %path,
                    symlink_target = %target,
                    error = %err
                );
            }
        }

        let marker = SymlinksComplete {
            num_symlinks_created: *dir_count,
            timestamp: Local::now().to_rfc3339(),
        };
        if let Err(err) = fs_util::write_json_atomic(&parent.join(SYMLINKS_COMPLETE_MARKER), &marker) {
            tracing::warn!(
                event_type = "write_symlinks_complete_failed",
                path = %parent,
                error = %err
            );
        }
    }
    created
}

fn points_to(path: &Utf8Path, target: &Utf8Path) -> bool {
    fs_util::read_link_target(path)
        .is_ok_and(|existing| existing == fs_util::normalize_lexically(target))
}

fn record_symlink<S: RecordStore + ?Sized>(store: &mut S, symlink: &Symlink) {
    if let Err(err) = store.store_symlink(symlink) {
        tracing::error!(
            event_type = "store_symlink_failed",
            symlink_path = %symlink.path,
            error = %err
        );
    }
}

/// Dangling links are left out; their records are pruned instead.
pub fn find_existing_symlinks(projects: &BTreeMap<String, Project>) -> Vec<Symlink> {
    let mut found = Vec::new();
    for project in projects.values() {
        if !project.fastq_symlinks_dir.is_dir() {
            continue;
        }
        let run_dirs = match fs_util::subdirectory_names(&project.fastq_symlinks_dir) {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(
                    event_type = "find_symlinks_failed",
                    project_id = %project.project_id,
                    error = %err
                );
                continue;
            }
        };
        for run_id in run_dirs {
            let run_dir = project.run_symlinks_dir(&run_id);
            let Ok(entries) = run_dir.read_dir_utf8() else {
                continue;
            };
            let mut links: Vec<Symlink> = entries
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_symlink()))
                .filter_map(|entry| {
                    let path = entry.path().to_path_buf();
                    if !path.exists() {
                        tracing::debug!(event_type = "dangling_symlink_skipped", symlink_path = %path);
                        return None;
                    }
                    let target = fs_util::read_link_target(&path).ok()?;
                    Some(Symlink::new(project.project_id.clone(), run_id.clone(), path, target))
                })
                .collect();
            links.sort_by(|a, b| a.path.cmp(&b.path));
            found.extend(links);
        }
    }
    found
}
