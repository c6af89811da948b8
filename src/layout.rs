use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::InstrumentType;
use crate::fs_util;

const MISEQ_ALIGNMENT_PREFIX: &str = "Alignment_";
const MISEQ_ALIGNMENT_FASTQ_DIR: &str = "Fastq";
const NEXTSEQ_ANALYSIS_DIR: &str = "Analysis";

pub fn find_fastq_directory(run_dir: &Utf8Path, instrument: InstrumentType) -> Option<Utf8PathBuf> {
    match instrument {
        InstrumentType::MiSeq => find_miseq_fastq_directory(run_dir),
        InstrumentType::NextSeq => find_nextseq_fastq_directory(run_dir),
    }
}

fn find_miseq_fastq_directory(run_dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let run_subdirs = list_subdirs(run_dir)?;
    let greatest_alignment = run_subdirs
        .iter()
        .filter_map(|name| numeric_suffix(name, MISEQ_ALIGNMENT_PREFIX).map(|num| (num, name)))
        .max_by_key(|(num, _)| *num);

    match greatest_alignment {
        Some((_, alignment_name)) => {
            let alignment_dir = run_dir.join(alignment_name);
            // Most recent processing pass; the names are timestamps.
            let latest_pass = list_subdirs(&alignment_dir)?.into_iter().max()?;
            Some(
                alignment_dir
                    .join(latest_pass)
                    .join(MISEQ_ALIGNMENT_FASTQ_DIR),
            )
        }
        None => {
            let basecalls = run_dir.join("Data").join("Intensities").join("BaseCalls");
            basecalls.is_dir().then_some(basecalls)
        }
    }
}

fn find_nextseq_fastq_directory(run_dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let analysis_dir = run_dir.join(NEXTSEQ_ANALYSIS_DIR);
    if !analysis_dir.is_dir() {
        return None;
    }
    let greatest_analysis = list_subdirs(&analysis_dir)?
        .into_iter()
        .filter_map(|name| name.parse::<u64>().ok().map(|num| (num, name)))
        .max_by_key(|(num, _)| *num)?;

    Some(
        analysis_dir
            .join(greatest_analysis.1)
            .join("Data")
            .join("fastq"),
    )
}

fn list_subdirs(dir: &Utf8Path) -> Option<Vec<String>> {
    match fs_util::subdirectory_names(dir) {
        Ok(names) => Some(names),
        Err(err) => {
            tracing::debug!(event_type = "list_subdirectories_failed", dir = %dir, error = %err);
            None
        }
    }
}

fn numeric_suffix(name: &str, prefix: &str) -> Option<u64> {
    let suffix = name.strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}
