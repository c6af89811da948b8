use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::InstrumentType;
use crate::error::SymlinkError;

pub const PREFERRED_SAMPLESHEET: &str = "SampleSheet.csv";

static PLACEHOLDER_SAMPLE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S\d+$").expect("static regex"));
static NUMERIC_SAMPLE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("static regex"));
static NUMBERED_SAMPLESHEET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SampleSheet_(\d+)\.csv$").expect("static regex"));

/// Samplesheet files directly inside a run directory, sorted by name.
pub fn find_samplesheets(run_dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    let Ok(entries) = run_dir.read_dir_utf8() else {
        return Vec::new();
    };
    let mut paths: Vec<Utf8PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            name.starts_with("SampleSheet") && name.ends_with(".csv")
        })
        .map(|entry| entry.path().to_path_buf())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    paths
}

/// `SampleSheet.csv` if present, else the highest `SampleSheet_<n>.csv`, else the
/// greatest name.
pub fn choose_samplesheet_to_parse(candidates: &[Utf8PathBuf]) -> Option<Utf8PathBuf> {
    if let Some(preferred) = candidates
        .iter()
        .find(|path| path.file_name() == Some(PREFERRED_SAMPLESHEET))
    {
        return Some(preferred.clone());
    }
    candidates
        .iter()
        .max_by_key(|path| {
            let name = path.file_name().unwrap_or_default();
            let number = NUMBERED_SAMPLESHEET
                .captures(name)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok());
            (number, name.to_string())
        })
        .cloned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "instrument_type", rename_all = "lowercase")]
pub enum Samplesheet {
    MiSeq(MiSeqSamplesheet),
    NextSeq(NextSeqSamplesheet),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiSeqSamplesheet {
    pub header: BTreeMap<String, String>,
    pub data: Vec<MiSeqSample>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiSeqSample {
    pub sample_id: Option<String>,
    pub sample_name: Option<String>,
    pub sample_project: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextSeqSamplesheet {
    pub header: BTreeMap<String, String>,
    pub cloud_data: Vec<NextSeqSample>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextSeqSample {
    pub sample_id: Option<String>,
    pub project_name: Option<String>,
    pub library_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleColumn {
    SampleId,
    SampleName,
    SampleProject,
    ProjectName,
}

impl SampleColumn {
    pub fn header(&self) -> &'static str {
        match self {
            SampleColumn::SampleId => "sample_id",
            SampleColumn::SampleName => "sample_name",
            SampleColumn::SampleProject => "sample_project",
            SampleColumn::ProjectName => "project_name",
        }
    }
}

pub trait SampleRecord {
    /// `None` when the row has no such column.
    fn get(&self, column: SampleColumn) -> Option<&str>;
}

impl SampleRecord for MiSeqSample {
    fn get(&self, column: SampleColumn) -> Option<&str> {
        match column {
            SampleColumn::SampleId => self.sample_id.as_deref(),
            SampleColumn::SampleName => self.sample_name.as_deref(),
            SampleColumn::SampleProject => self.sample_project.as_deref(),
            SampleColumn::ProjectName => None,
        }
    }
}

impl SampleRecord for NextSeqSample {
    fn get(&self, column: SampleColumn) -> Option<&str> {
        match column {
            SampleColumn::SampleId => self.sample_id.as_deref(),
            SampleColumn::ProjectName => self.project_name.as_deref(),
            SampleColumn::SampleName | SampleColumn::SampleProject => None,
        }
    }
}

impl Samplesheet {
    pub fn instrument_type(&self) -> InstrumentType {
        match self {
            Samplesheet::MiSeq(_) => InstrumentType::MiSeq,
            Samplesheet::NextSeq(_) => InstrumentType::NextSeq,
        }
    }

    /// Rows of a table section, by its snake_case name.
    pub fn section_rows(&self, section: &str) -> Option<Vec<&dyn SampleRecord>> {
        match (self, section) {
            (Samplesheet::MiSeq(sheet), "data") => Some(
                sheet
                    .data
                    .iter()
                    .map(|row| row as &dyn SampleRecord)
                    .collect(),
            ),
            (Samplesheet::NextSeq(sheet), "cloud_data") => Some(
                sheet
                    .cloud_data
                    .iter()
                    .map(|row| row as &dyn SampleRecord)
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String, SymlinkError> {
        serde_json::to_string(self).map_err(|err| SymlinkError::Store(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibrarySchema {
    pub section: &'static str,
    pub project_column: SampleColumn,
    pub library_id_column: SampleColumn,
}

pub fn libraries_section(instrument: InstrumentType) -> &'static str {
    match instrument {
        InstrumentType::MiSeq => "data",
        InstrumentType::NextSeq => "cloud_data",
    }
}

pub fn project_column(instrument: InstrumentType) -> SampleColumn {
    match instrument {
        InstrumentType::MiSeq => SampleColumn::SampleProject,
        InstrumentType::NextSeq => SampleColumn::ProjectName,
    }
}

/// `Sample_Name` when every MiSeq `Sample_ID` is blank or auto-numbered (`S1`, `1`).
pub fn library_id_column(samplesheet: &Samplesheet) -> SampleColumn {
    match samplesheet {
        Samplesheet::MiSeq(sheet) => {
            let sample_ids: Vec<&str> = sheet
                .data
                .iter()
                .map(|row| row.sample_id.as_deref().unwrap_or_default())
                .collect();
            let all_blank = sample_ids.iter().all(|id| id.is_empty());
            let all_placeholders = sample_ids.iter().all(|id| PLACEHOLDER_SAMPLE_ID.is_match(id));
            let all_numeric = sample_ids.iter().all(|id| NUMERIC_SAMPLE_ID.is_match(id));
            if all_blank || all_placeholders || all_numeric {
                SampleColumn::SampleName
            } else {
                SampleColumn::SampleId
            }
        }
        Samplesheet::NextSeq(_) => SampleColumn::SampleId,
    }
}

/// `None` when the samplesheet was not written for `instrument`.
pub fn resolve_schema(samplesheet: &Samplesheet, instrument: InstrumentType) -> Option<LibrarySchema> {
    if samplesheet.instrument_type() != instrument {
        return None;
    }
    Some(LibrarySchema {
        section: libraries_section(instrument),
        project_column: project_column(instrument),
        library_id_column: library_id_column(samplesheet),
    })
}

pub fn parse_samplesheet(
    path: &Utf8Path,
    instrument: InstrumentType,
) -> Result<Samplesheet, SymlinkError> {
    let content = fs::read_to_string(path).map_err(|err| SymlinkError::SamplesheetValidation {
        path: PathBuf::from(path.as_std_path()),
        message: err.to_string(),
    })?;
    parse_samplesheet_str(&content, instrument).map_err(|message| {
        SymlinkError::SamplesheetValidation {
            path: PathBuf::from(path.as_std_path()),
            message,
        }
    })
}

pub fn parse_samplesheet_str(content: &str, instrument: InstrumentType) -> Result<Samplesheet, String> {
    let sections = parse_sections(content)?;
    match instrument {
        InstrumentType::MiSeq => {
            let header = sections.key_values("header")?;
            let rows = sections.table("data", &["sample_id"])?;
            let data = rows
                .iter()
                .map(|row| MiSeqSample {
                    sample_id: row.get("sample_id").cloned(),
                    sample_name: row.get("sample_name").cloned(),
                    sample_project: row.get("sample_project").cloned(),
                    description: row.get("description").cloned(),
                })
                .collect();
            Ok(Samplesheet::MiSeq(MiSeqSamplesheet { header, data }))
        }
        InstrumentType::NextSeq => {
            let header = sections.key_values("header")?;
            let rows = sections.table("cloud_data", &["sample_id"])?;
            let cloud_data = rows
                .iter()
                .map(|row| NextSeqSample {
                    sample_id: row.get("sample_id").cloned(),
                    project_name: row.get("project_name").cloned(),
                    library_name: row.get("library_name").cloned(),
                })
                .collect();
            Ok(Samplesheet::NextSeq(NextSeqSamplesheet { header, cloud_data }))
        }
    }
}

#[derive(Debug)]
enum RawSection {
    KeyValue(BTreeMap<String, String>),
    Table {
        columns: Vec<String>,
        rows: Vec<BTreeMap<String, String>>,
    },
}

#[derive(Debug, Default)]
struct RawSections(BTreeMap<String, RawSection>);

impl RawSections {
    fn key_values(&self, name: &str) -> Result<BTreeMap<String, String>, String> {
        match self.0.get(name) {
            Some(RawSection::KeyValue(values)) => Ok(values.clone()),
            Some(RawSection::Table { .. }) => Err(format!("section [{name}] is not key/value")),
            None => Err(format!("missing section [{name}]")),
        }
    }

    fn table(
        &self,
        name: &str,
        required: &[&str],
    ) -> Result<&Vec<BTreeMap<String, String>>, String> {
        match self.0.get(name) {
            Some(RawSection::Table { columns, rows }) => {
                for column in required {
                    if !columns.iter().any(|c| c == column) {
                        return Err(format!("section [{name}] has no {column} column"));
                    }
                }
                Ok(rows)
            }
            Some(RawSection::KeyValue(_)) => Err(format!("section [{name}] is not a table")),
            None => Err(format!("missing section [{name}]")),
        }
    }
}

fn parse_sections(content: &str) -> Result<RawSections, String> {
    let content = content.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut sections = RawSections::default();
    let mut current: Option<String> = None;

    for record in reader.records() {
        let record = record.map_err(|err| err.to_string())?;
        let fields: Vec<&str> = record.iter().collect();
        if fields.iter().all(|field| field.is_empty()) {
            continue;
        }

        let first = fields[0];
        if let Some(name) = first.strip_prefix('[').and_then(|rest| rest.split(']').next()) {
            let name = to_snake_case(name);
            let section = if name.ends_with("data") {
                RawSection::Table {
                    columns: Vec::new(),
                    rows: Vec::new(),
                }
            } else {
                RawSection::KeyValue(BTreeMap::new())
            };
            sections.0.insert(name.clone(), section);
            current = Some(name);
            continue;
        }

        let Some(section) = current.as_ref().and_then(|name| sections.0.get_mut(name)) else {
            return Err("content found before the first [section]".to_string());
        };
        match section {
            RawSection::KeyValue(values) => {
                if !first.is_empty() {
                    let value = fields.get(1).copied().unwrap_or_default();
                    values.insert(to_snake_case(first), value.to_string());
                }
            }
            RawSection::Table { columns, rows } => {
                if columns.is_empty() {
                    *columns = fields.iter().map(|field| to_snake_case(field)).collect();
                    continue;
                }
                let row = columns
                    .iter()
                    .zip(fields.iter())
                    .filter(|(column, _)| !column.is_empty())
                    .map(|(column, value)| (column.clone(), value.to_string()))
                    .collect();
                rows.push(row);
            }
        }
    }

    Ok(sections)
}

/// `Sample_Project` -> `sample_project`, `ProjectName` -> `project_name`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch == ' ' || ch == '-' || ch == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if ch.is_uppercase() && i > 0 && !out.ends_with('_') {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|next| next.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push('_');
            }
        }
        out.extend(ch.to_lowercase());
    }
    out.trim_end_matches('_').to_string()
}
