use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SymlinkError {
    #[error("invalid sequencing run id: {0}")]
    InvalidRunId(String),

    #[error("unknown instrument type: {0}")]
    UnknownInstrument(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("failed to load projects definition file {path}: {message}")]
    ProjectsDefinition { path: PathBuf, message: String },

    #[error("failed to load project id translation file {path}: {message}")]
    ProjectIdTranslation { path: PathBuf, message: String },

    #[error("failed to load excluded {kind} list {path} for project {project_id}")]
    #[diagnostic(help(
        "exclusion lists must be readable; refusing to continue with partial exclusion data"
    ))]
    ExclusionList {
        project_id: String,
        kind: &'static str,
        path: PathBuf,
    },

    #[error("invalid samplesheet {path}: {message}")]
    SamplesheetValidation { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("store error: {0}")]
    Store(String),
}

impl SymlinkError {
    /// Errors that must abort the process instead of skipping one unit of work.
    pub fn is_configuration_integrity(&self) -> bool {
        matches!(self, SymlinkError::ExclusionList { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exclusion_lists_are_fatal() {
        let fatal = SymlinkError::ExclusionList {
            project_id: "P1".to_string(),
            kind: "runs",
            path: PathBuf::from("/missing/excluded_runs.txt"),
        };
        assert!(fatal.is_configuration_integrity());
        assert!(!SymlinkError::ConfigParse("eof".to_string()).is_configuration_integrity());
        assert!(!SymlinkError::Store("locked".to_string()).is_configuration_integrity());
    }

    #[test]
    fn exclusion_list_message_names_project() {
        let err = SymlinkError::ExclusionList {
            project_id: "P1".to_string(),
            kind: "libraries",
            path: PathBuf::from("excluded.txt"),
        };
        let msg = err.to_string();
        assert!(msg.contains("libraries"));
        assert!(msg.contains("P1"));
    }
}
