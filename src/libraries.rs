use std::collections::{BTreeMap, BTreeSet, HashSet};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{InstrumentType, Library, sanitize_library_id};
use crate::fs_util;
use crate::samplesheet::{self, Samplesheet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirection {
    R1,
    R2,
}

impl ReadDirection {
    fn designator(&self) -> &'static str {
        match self {
            ReadDirection::R1 => "_R1_",
            ReadDirection::R2 => "_R2_",
        }
    }
}

// Literal prefix match: `Sample-1` also matches `Sample-10_...`, first by name wins.
pub fn find_read_file<'a>(
    files: &'a BTreeSet<String>,
    library_id: &str,
    read: ReadDirection,
) -> Option<&'a str> {
    files
        .iter()
        .find(|name| {
            name.strip_prefix(library_id)
                .is_some_and(|rest| rest.contains(read.designator()))
        })
        .map(String::as_str)
}

pub fn translate_project_id(raw: &str, translation: &BTreeMap<String, String>) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    Some(
        translation
            .get(raw)
            .cloned()
            .unwrap_or_else(|| raw.to_string()),
    )
}

pub fn find_libraries(
    fastq_directory: Option<&Utf8Path>,
    run_id: &str,
    instrument: InstrumentType,
    samplesheet: &Samplesheet,
    fastq_extensions: &[String],
    project_id_translation: &BTreeMap<String, String>,
) -> Vec<Library> {
    let Some(fastq_directory) = fastq_directory.filter(|dir| dir.exists()) else {
        tracing::error!(
            event_type = "find_libraries_failed",
            run_id,
            run_fastq_directory = ?fastq_directory
        );
        return Vec::new();
    };

    let Some(schema) = samplesheet::resolve_schema(samplesheet, instrument) else {
        tracing::error!(
            event_type = "samplesheet_instrument_mismatch",
            run_id,
            instrument_type = %instrument,
            samplesheet_instrument_type = %samplesheet.instrument_type()
        );
        return Vec::new();
    };
    let Some(rows) = samplesheet.section_rows(schema.section) else {
        return Vec::new();
    };

    let fastq_files = match fs_util::list_files_with_suffixes(fastq_directory, fastq_extensions) {
        Ok(files) => files,
        Err(err) => {
            tracing::error!(
                event_type = "find_libraries_failed",
                run_id,
                run_fastq_directory = %fastq_directory,
                error = %err
            );
            return Vec::new();
        }
    };

    let resolve = |name: Option<&str>| -> Option<Utf8PathBuf> {
        let path = fastq_directory.join(name?);
        tracing::debug!(
            event_type = "found_library_fastq_file",
            run_id,
            fastq_path = %path
        );
        Some(path)
    };

    let mut seen = HashSet::new();
    let mut libraries = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let (Some(raw_project), Some(raw_library_id)) =
            (row.get(schema.project_column), row.get(schema.library_id_column))
        else {
            tracing::warn!(
                event_type = "samplesheet_row_missing_columns",
                run_id,
                row = index,
                project_column = schema.project_column.header(),
                library_id_column = schema.library_id_column.header()
            );
            continue;
        };

        let library_id = sanitize_library_id(raw_library_id);
        if library_id.is_empty() || !seen.insert(library_id.clone()) {
            continue;
        }
        tracing::debug!(event_type = "found_library", run_id, library_id = %library_id);

        let fastq_path_r1 = resolve(find_read_file(&fastq_files, &library_id, ReadDirection::R1));
        let fastq_path_r2 = resolve(find_read_file(&fastq_files, &library_id, ReadDirection::R2));

        libraries.push(Library {
            project_id: translate_project_id(raw_project, project_id_translation),
            library_id,
            sequencing_run_id: run_id.to_string(),
            fastq_path_r1,
            fastq_path_r2,
        });
    }

    libraries
}
