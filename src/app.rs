use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::discovery::{RunScanner, ScanOutcome, SkipReason};
use crate::error::SymlinkError;
use crate::reconcile::{self, CreationReport};
use crate::shutdown::Shutdown;
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRun {
    pub run_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub num_projects: usize,
    pub runs_resolved: Vec<String>,
    pub runs_skipped: Vec<SkippedRun>,
    pub num_symlinks_found: usize,
    pub num_symlinks_pruned: usize,
    pub num_symlinks_created: usize,
    pub symlinks_created_per_project: BTreeMap<String, usize>,
    pub interrupted: bool,
}

impl CycleSummary {
    fn add_created(&mut self, report: &CreationReport) {
        self.num_symlinks_created += report.total;
        for (project_id, created) in &report.per_project {
            *self
                .symlinks_created_per_project
                .entry(project_id.clone())
                .or_default() += created;
        }
    }
}

/// One scan-and-symlink pass over the configured run directories.
pub struct App<S: RecordStore> {
    config: ResolvedConfig,
    store: S,
}

impl<S: RecordStore> App<S> {
    pub fn new(config: ResolvedConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ResolvedConfig) {
        self.config = config;
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn run_cycle(&mut self, shutdown: &Shutdown) -> Result<CycleSummary, SymlinkError> {
        let config = &self.config;
        let store = &mut self.store;
        let mut summary = CycleSummary {
            num_projects: config.projects.len(),
            ..CycleSummary::default()
        };

        tracing::info!(event_type = "scan_start", num_projects = config.projects.len());
        store.store_projects(&config.projects)?;

        let existing = reconcile::find_existing_symlinks(&config.projects);
        summary.num_symlinks_found = existing.len();
        store.store_symlinks(&existing)?;
        tracing::debug!(
            event_type = "find_symlinks_complete",
            num_symlinks_found = summary.num_symlinks_found
        );

        summary.num_symlinks_pruned = store.delete_nonexistent_symlinks()?;
        tracing::debug!(
            event_type = "delete_nonexistent_symlinks_complete",
            num_symlinks_pruned = summary.num_symlinks_pruned
        );

        let mut scanner = RunScanner::new(config);
        loop {
            if shutdown.is_requested() {
                summary.interrupted = true;
                break;
            }
            let Some(outcome) = scanner.next() else {
                break;
            };
            let run = match outcome {
                ScanOutcome::Resolved(run) => run,
                ScanOutcome::Skipped { run_id, reason } => {
                    summary.runs_skipped.push(SkippedRun { run_id, reason });
                    continue;
                }
            };

            let run_id = run.run_id.to_string();
            if let Err(err) = store.store_run(&run) {
                tracing::error!(event_type = "store_run_failed", run_id = %run_id, error = %err);
                continue;
            }
            summary.runs_resolved.push(run_id.clone());

            match reconcile::determine_symlinks_to_create(config, &*store, Some(&run_id)) {
                Ok(candidates) => {
                    let report = reconcile::create_symlinks(config, &mut *store, &candidates, shutdown);
                    summary.add_created(&report);
                }
                Err(err) => {
                    tracing::error!(
                        event_type = "determine_symlinks_failed",
                        run_id = %run_id,
                        error = %err
                    );
                }
            }
        }
        tracing::info!(
            event_type = "scan_complete",
            num_runs_found = summary.runs_resolved.len(),
            num_runs_skipped = summary.runs_skipped.len(),
            num_symlinks_found = summary.num_symlinks_found
        );

        if summary.interrupted || shutdown.is_requested() {
            summary.interrupted = true;
            tracing::info!(event_type = "cycle_interrupted");
            return Ok(summary);
        }

        tracing::info!(event_type = "symlink_start");
        let candidates = reconcile::determine_symlinks_to_create(config, &*store, None)?;
        let num_symlinks_to_create: usize = candidates.values().map(Vec::len).sum();
        tracing::debug!(event_type = "determine_symlinks_complete", num_symlinks_to_create);
        let report = reconcile::create_symlinks(config, &mut *store, &candidates, shutdown);
        summary.add_created(&report);
        summary.interrupted = shutdown.is_requested();
        tracing::info!(
            event_type = "symlink_complete",
            num_symlinks_created = summary.num_symlinks_created
        );

        Ok(summary)
    }
}
