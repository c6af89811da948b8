use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::Project;
use crate::error::SymlinkError;
use crate::fs_util;

pub const DEFAULT_SCAN_INTERVAL_SECONDS: f64 = 3600.0;
pub const DEFAULT_UPLOAD_COMPLETE_MARKER: &str = "upload_complete.json";
pub const DEFAULT_QC_CHECK_COMPLETE_MARKER: &str = "qc_check_complete.json";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub run_parent_dirs: Vec<Utf8PathBuf>,
    #[serde(default = "default_fastq_extensions")]
    pub fastq_extensions: Vec<String>,
    #[serde(default)]
    pub projects_definition_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub project_id_translation_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub database_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub database_connection_uri: Option<String>,
    #[serde(default)]
    pub scan_interval_seconds: Option<f64>,
    #[serde(default)]
    pub upload_complete_marker: Option<String>,
    #[serde(default)]
    pub qc_check_complete_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectDefinitionRow {
    project_id: String,
    fastq_symlinks_dir: String,
    #[serde(default)]
    excluded_runs_list: Option<String>,
    #[serde(default)]
    excluded_libraries_list: Option<String>,
    #[serde(default)]
    simplify_symlink_filenames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectIdTranslationRow {
    samplesheet_project_id: String,
    symlinking_project_id: String,
}

/// Marker files a run directory must contain before it is considered complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessMarkers {
    pub upload_complete: String,
    pub qc_check_complete: String,
}

impl Default for ReadinessMarkers {
    fn default() -> Self {
        Self {
            upload_complete: DEFAULT_UPLOAD_COMPLETE_MARKER.to_string(),
            qc_check_complete: DEFAULT_QC_CHECK_COMPLETE_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub run_parent_dirs: Vec<Utf8PathBuf>,
    pub fastq_extensions: Vec<String>,
    pub projects: BTreeMap<String, Project>,
    /// Samplesheet project tag -> configured project id.
    pub project_id_translation: BTreeMap<String, String>,
    pub database_path: Utf8PathBuf,
    pub scan_interval: Duration,
    pub markers: ReadinessMarkers,
}

impl ResolvedConfig {
    /// A config with no projects, for callers that assemble one in code.
    pub fn new(run_parent_dirs: Vec<Utf8PathBuf>, database_path: Utf8PathBuf) -> Self {
        Self {
            run_parent_dirs,
            fastq_extensions: default_fastq_extensions(),
            projects: BTreeMap::new(),
            project_id_translation: BTreeMap::new(),
            database_path,
            scan_interval: Duration::from_secs_f64(DEFAULT_SCAN_INTERVAL_SECONDS),
            markers: ReadinessMarkers::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: &Utf8Path) -> Result<ResolvedConfig, SymlinkError> {
        let content = fs::read_to_string(path)
            .map_err(|_| SymlinkError::ConfigRead(PathBuf::from(path.as_std_path())))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SymlinkError::ConfigParse(err.to_string()))?;

        let base_dir = path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        Self::resolve_config(config, &base_dir)
    }

    /// Load every file the config refers to. Relative paths are taken from `base_dir`.
    pub fn resolve_config(
        config: Config,
        base_dir: &Utf8Path,
    ) -> Result<ResolvedConfig, SymlinkError> {
        let run_parent_dirs = config
            .run_parent_dirs
            .iter()
            .map(|dir| resolve_path(base_dir, dir))
            .collect();

        let projects = match &config.projects_definition_file {
            Some(path) => {
                parse_projects_definition_file(&resolve_path(base_dir, path), base_dir)?
            }
            None => BTreeMap::new(),
        };

        let project_id_translation = match &config.project_id_translation_file {
            Some(path) => {
                parse_project_id_translation_file(&resolve_path(base_dir, path), &projects)?
            }
            None => BTreeMap::new(),
        };

        let database_path = resolve_database_path(&config, base_dir)?;

        let scan_interval_seconds = config
            .scan_interval_seconds
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .unwrap_or(DEFAULT_SCAN_INTERVAL_SECONDS);

        let defaults = ReadinessMarkers::default();
        let markers = ReadinessMarkers {
            upload_complete: config
                .upload_complete_marker
                .unwrap_or(defaults.upload_complete),
            qc_check_complete: config
                .qc_check_complete_marker
                .unwrap_or(defaults.qc_check_complete),
        };

        Ok(ResolvedConfig {
            run_parent_dirs,
            fastq_extensions: config.fastq_extensions,
            projects,
            project_id_translation,
            database_path,
            scan_interval: Duration::from_secs_f64(scan_interval_seconds),
            markers,
        })
    }
}

pub fn default_fastq_extensions() -> Vec<String> {
    vec![".fastq.gz".to_string(), ".fq.gz".to_string()]
}

fn resolve_path(base_dir: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn resolve_database_path(config: &Config, base_dir: &Utf8Path) -> Result<Utf8PathBuf, SymlinkError> {
    if let Some(path) = &config.database_path {
        return Ok(resolve_path(base_dir, path));
    }
    if let Some(uri) = &config.database_connection_uri {
        let path = uri.strip_prefix("sqlite:///").ok_or_else(|| {
            SymlinkError::ConfigInvalid(format!("unsupported database connection uri: {uri}"))
        })?;
        return Ok(resolve_path(base_dir, Utf8Path::new(path)));
    }

    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf()).ok())
        .map(|dir| dir.join("auto-fastq-symlink").join("auto_fastq_symlink.db"))
        .ok_or_else(|| {
            SymlinkError::ConfigInvalid("unable to resolve default database location".to_string())
        })
}

fn parse_projects_definition_file(
    path: &Utf8Path,
    base_dir: &Utf8Path,
) -> Result<BTreeMap<String, Project>, SymlinkError> {
    let definition_error = |message: String| SymlinkError::ProjectsDefinition {
        path: PathBuf::from(path.as_std_path()),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| definition_error(err.to_string()))?;

    let mut projects = BTreeMap::new();
    for row in reader.deserialize::<ProjectDefinitionRow>() {
        let row = row.map_err(|err| definition_error(err.to_string()))?;
        let mut project = Project::new(
            row.project_id.clone(),
            resolve_path(base_dir, Utf8Path::new(&row.fastq_symlinks_dir)),
        );
        project.simplify_symlink_filenames = row
            .simplify_symlink_filenames
            .as_deref()
            .map(parse_flag)
            .unwrap_or(false);
        project.excluded_runs = load_exclusions(
            &row.project_id,
            "runs",
            row.excluded_runs_list.as_deref(),
            base_dir,
        )?;
        project.excluded_libraries = load_exclusions(
            &row.project_id,
            "libraries",
            row.excluded_libraries_list.as_deref(),
            base_dir,
        )?;
        projects.insert(row.project_id, project);
    }

    Ok(projects)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "t")
}

fn load_exclusions(
    project_id: &str,
    kind: &'static str,
    list_path: Option<&str>,
    base_dir: &Utf8Path,
) -> Result<BTreeSet<String>, SymlinkError> {
    let Some(list_path) = list_path.filter(|value| !value.trim().is_empty()) else {
        return Ok(BTreeSet::new());
    };
    let path = resolve_path(base_dir, Utf8Path::new(list_path.trim()));
    match fs_util::read_list_file(&path) {
        Ok(items) => Ok(items.into_iter().collect()),
        Err(err) => {
            tracing::error!(
                event_type = "load_exclusion_list_failed",
                project_id,
                kind,
                path = %path,
                error = %err
            );
            Err(SymlinkError::ExclusionList {
                project_id: project_id.to_string(),
                kind,
                path: PathBuf::from(path.as_std_path()),
            })
        }
    }
}

fn parse_project_id_translation_file(
    path: &Utf8Path,
    projects: &BTreeMap<String, Project>,
) -> Result<BTreeMap<String, String>, SymlinkError> {
    let translation_error = |message: String| SymlinkError::ProjectIdTranslation {
        path: PathBuf::from(path.as_std_path()),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| translation_error(err.to_string()))?;

    let mut translation = BTreeMap::new();
    for row in reader.deserialize::<ProjectIdTranslationRow>() {
        let row = row.map_err(|err| translation_error(err.to_string()))?;
        if projects.contains_key(&row.symlinking_project_id) {
            translation.insert(row.samplesheet_project_id, row.symlinking_project_id);
        } else {
            tracing::debug!(
                event_type = "project_id_translation_ignored",
                samplesheet_project_id = %row.samplesheet_project_id,
                symlinking_project_id = %row.symlinking_project_id
            );
        }
    }
    Ok(translation)
}
