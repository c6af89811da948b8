use std::fs;
use std::vec;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::config::{ReadinessMarkers, ResolvedConfig};
use crate::domain::{InstrumentType, Library, RunId};
use crate::layout;
use crate::libraries;
use crate::samplesheet::{self, Samplesheet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequencingRun {
    pub run_id: RunId,
    pub instrument_type: InstrumentType,
    pub run_directory: Utf8PathBuf,
    pub fastq_directory: Utf8PathBuf,
    pub samplesheet_path: Utf8PathBuf,
    pub samplesheet: Samplesheet,
    pub libraries: Vec<Library>,
}

/// Every gate a run directory has to pass before it is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub is_directory: bool,
    pub upload_complete: bool,
    pub qc_check_complete: bool,
    pub qc_check_passed: bool,
    pub instrument_identified: bool,
}

impl ReadinessReport {
    pub fn inspect(entry: &Utf8Path, markers: &ReadinessMarkers) -> Self {
        let is_directory = entry.is_dir();
        let file_name = entry.file_name().unwrap_or_default();
        let qc_marker = entry.join(&markers.qc_check_complete);
        let qc_check_complete = is_directory && qc_marker.is_file();
        Self {
            is_directory,
            upload_complete: is_directory && entry.join(&markers.upload_complete).is_file(),
            qc_check_complete,
            qc_check_passed: qc_check_complete && qc_check_passed(&qc_marker),
            instrument_identified: InstrumentType::detect(file_name).is_some(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.is_directory
            && self.upload_complete
            && self.qc_check_complete
            && self.qc_check_passed
            && self.instrument_identified
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    NotReady(ReadinessReport),
    InvalidSamplesheet { path: Utf8PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Resolved(SequencingRun),
    Skipped { run_id: String, reason: SkipReason },
}

#[derive(Debug, Deserialize)]
struct QcCheck {
    #[serde(default)]
    overall_pass_fail: Option<String>,
}

/// Content that cannot be read or parsed counts as a failed check.
pub fn qc_check_passed(marker: &Utf8Path) -> bool {
    let parsed = fs::read_to_string(marker)
        .map_err(|err| err.to_string())
        .and_then(|content| {
            serde_json::from_str::<QcCheck>(&content).map_err(|err| err.to_string())
        });
    match parsed {
        Ok(qc) => qc
            .overall_pass_fail
            .is_some_and(|value| value.trim().to_uppercase().starts_with("PASS")),
        Err(err) => {
            tracing::debug!(event_type = "qc_check_unreadable", path = %marker, error = %err);
            false
        }
    }
}

/// Lazy scan over every run parent directory, in name order.
pub struct RunScanner<'a> {
    config: &'a ResolvedConfig,
    parent_dirs: std::slice::Iter<'a, Utf8PathBuf>,
    pending: vec::IntoIter<Utf8PathBuf>,
}

impl<'a> RunScanner<'a> {
    pub fn new(config: &'a ResolvedConfig) -> Self {
        Self {
            config,
            parent_dirs: config.run_parent_dirs.iter(),
            pending: Vec::new().into_iter(),
        }
    }

    fn list_parent(parent: &Utf8Path) -> Vec<Utf8PathBuf> {
        if !parent.is_dir() {
            tracing::warn!(event_type = "run_parent_dir_not_found", run_parent_dir = %parent);
            return Vec::new();
        }
        let entries = match parent.read_dir_utf8() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    event_type = "run_parent_dir_unreadable",
                    run_parent_dir = %parent,
                    error = %err
                );
                return Vec::new();
            }
        };
        let mut paths: Vec<Utf8PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path().to_path_buf())
            .collect();
        paths.sort();
        paths
    }

    fn evaluate(&self, entry: &Utf8Path) -> Option<ScanOutcome> {
        let name = entry.file_name()?.to_string();
        let report = ReadinessReport::inspect(entry, &self.config.markers);
        if !report.is_ready() {
            tracing::debug!(
                event_type = "sequencing_run_not_ready",
                run_id = %name,
                is_directory = report.is_directory,
                upload_complete = report.upload_complete,
                qc_check_complete = report.qc_check_complete,
                qc_check_passed = report.qc_check_passed,
                instrument_identified = report.instrument_identified
            );
            return Some(ScanOutcome::Skipped {
                run_id: name,
                reason: SkipReason::NotReady(report),
            });
        }

        let run_id: RunId = name.parse().ok()?;
        let instrument = run_id.instrument_type();

        let samplesheet_paths = samplesheet::find_samplesheets(entry);
        let Some(fastq_directory) = layout::find_fastq_directory(entry, instrument) else {
            tracing::debug!(event_type = "fastq_directory_not_found", run_id = %run_id);
            return None;
        };

        let Some(samplesheet_path) = samplesheet::choose_samplesheet_to_parse(&samplesheet_paths)
        else {
            tracing::error!(event_type = "samplesheet_not_found", run_id = %run_id);
            return None;
        };
        tracing::debug!(
            event_type = "samplesheet_found",
            run_id = %run_id,
            samplesheet_path = %samplesheet_path
        );

        let samplesheet = match samplesheet::parse_samplesheet(&samplesheet_path, instrument) {
            Ok(samplesheet) => samplesheet,
            Err(err) => {
                tracing::warn!(
                    event_type = "samplesheet_validation_failed",
                    run_id = %run_id,
                    samplesheet_path = %samplesheet_path,
                    error = %err
                );
                return Some(ScanOutcome::Skipped {
                    run_id: name,
                    reason: SkipReason::InvalidSamplesheet {
                        path: samplesheet_path,
                        message: err.to_string(),
                    },
                });
            }
        };

        let libraries = libraries::find_libraries(
            Some(&fastq_directory),
            run_id.as_str(),
            instrument,
            &samplesheet,
            &self.config.fastq_extensions,
            &self.config.project_id_translation,
        );

        tracing::debug!(
            event_type = "sequencing_run_found",
            run_id = %run_id,
            num_libraries = libraries.len()
        );
        Some(ScanOutcome::Resolved(SequencingRun {
            run_id,
            instrument_type: instrument,
            run_directory: entry.to_path_buf(),
            fastq_directory,
            samplesheet_path,
            samplesheet,
            libraries,
        }))
    }
}

impl Iterator for RunScanner<'_> {
    type Item = ScanOutcome;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.next() {
                if let Some(outcome) = self.evaluate(&entry) {
                    return Some(outcome);
                }
                continue;
            }
            let parent = self.parent_dirs.next()?;
            self.pending = Self::list_parent(parent).into_iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[test]
    fn qc_marker_pass_prefix() {
        let (_temp, root) = temp_root();
        let marker = root.join("qc_check_complete.json");

        fs::write(&marker, r#"{"overall_pass_fail": "pass_with_warnings"}"#).unwrap();
        assert!(qc_check_passed(&marker));

        fs::write(&marker, r#"{"overall_pass_fail": "FAIL"}"#).unwrap();
        assert!(!qc_check_passed(&marker));

        fs::write(&marker, "not json").unwrap();
        assert!(!qc_check_passed(&marker));

        fs::write(&marker, "{}").unwrap();
        assert!(!qc_check_passed(&marker));
    }

    #[test]
    fn readiness_requires_every_gate() {
        let (_temp, root) = temp_root();
        let markers = ReadinessMarkers::default();
        let run = root.join("230101_M00001_0001_000000000-ABCDE");
        fs::create_dir_all(&run).unwrap();

        let report = ReadinessReport::inspect(&run, &markers);
        assert!(report.is_directory);
        assert!(report.instrument_identified);
        assert!(!report.upload_complete);
        assert!(!report.is_ready());

        fs::write(run.join("upload_complete.json"), "{}").unwrap();
        fs::write(run.join("qc_check_complete.json"), r#"{"overall_pass_fail": "PASS"}"#).unwrap();
        assert!(ReadinessReport::inspect(&run, &markers).is_ready());

        let stray = root.join("230101_M00001_0002_000000000-ABCDE");
        fs::write(&stray, "").unwrap();
        let report = ReadinessReport::inspect(&stray, &markers);
        assert!(!report.is_directory);
        assert!(!report.is_ready());
    }

    #[test]
    fn missing_parent_dirs_are_skipped() {
        let (_temp, root) = temp_root();
        let config = ResolvedConfig::new(vec![root.join("missing")], root.join("db.sqlite"));
        assert_eq!(RunScanner::new(&config).count(), 0);
    }
}
