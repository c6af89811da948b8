use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SymlinkError;

static MISEQ_RUN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6}_M\d{5}_\d+_\d{9}-[A-Z0-9]{5}").expect("static regex"));
static NEXTSEQ_RUN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6}_VH\d{5}_\d+_[A-Z0-9]{9}").expect("static regex"));

/// Characters that are replaced with `-` when sanitizing a library id.
const UNSAFE_LIBRARY_ID_CHARS: &[char] = &[
    '_', ' ', '\\', '`', '*', '{', '}', '[', ']', '(', ')', '>', '#', '!', '$', '^',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentType {
    MiSeq,
    NextSeq,
}

impl InstrumentType {
    /// Classify a run directory name. The MiSeq pattern is tried first.
    pub fn detect(run_id: &str) -> Option<Self> {
        if MISEQ_RUN_ID.is_match(run_id) {
            Some(InstrumentType::MiSeq)
        } else if NEXTSEQ_RUN_ID.is_match(run_id) {
            Some(InstrumentType::NextSeq)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::MiSeq => "miseq",
            InstrumentType::NextSeq => "nextseq",
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InstrumentType {
    type Err = SymlinkError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "miseq" => Ok(InstrumentType::MiSeq),
            "nextseq" => Ok(InstrumentType::NextSeq),
            _ => Err(SymlinkError::UnknownInstrument(value.to_string())),
        }
    }
}

/// A sequencing run id such as `230101_M00001_0001_000000000-ABCDE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn instrument_type(&self) -> InstrumentType {
        // Construction guarantees one of the patterns matched.
        InstrumentType::detect(&self.0).unwrap_or(InstrumentType::MiSeq)
    }

    /// The leading `YYMMDD` token as a calendar date in the 2000s.
    pub fn run_date(&self) -> Option<NaiveDate> {
        let six_digit_date = self.0.get(0..6)?;
        let year = 2000 + six_digit_date.get(0..2)?.parse::<i32>().ok()?;
        let month = six_digit_date.get(2..4)?.parse::<u32>().ok()?;
        let day = six_digit_date.get(4..6)?.parse::<u32>().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    pub fn instrument_id(&self) -> &str {
        self.0.split('_').nth(1).unwrap_or_default()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = SymlinkError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if InstrumentType::detect(value).is_none() {
            return Err(SymlinkError::InvalidRunId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub project_id: String,
    pub fastq_symlinks_dir: Utf8PathBuf,
    pub simplify_symlink_filenames: bool,
    pub excluded_runs: BTreeSet<String>,
    pub excluded_libraries: BTreeSet<String>,
}

impl Project {
    pub fn new(project_id: impl Into<String>, fastq_symlinks_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            project_id: project_id.into(),
            fastq_symlinks_dir: fastq_symlinks_dir.into(),
            simplify_symlink_filenames: false,
            excluded_runs: BTreeSet::new(),
            excluded_libraries: BTreeSet::new(),
        }
    }

    pub fn is_excluded(&self, library: &Library) -> bool {
        self.excluded_runs.contains(&library.sequencing_run_id)
            || self.excluded_libraries.contains(&library.library_id)
    }

    pub fn run_symlinks_dir(&self, run_id: &str) -> Utf8PathBuf {
        self.fastq_symlinks_dir.join(run_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub library_id: String,
    pub sequencing_run_id: String,
    pub project_id: Option<String>,
    pub fastq_path_r1: Option<Utf8PathBuf>,
    pub fastq_path_r2: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symlink {
    pub project_id: String,
    pub sequencing_run_id: String,
    pub library_id: String,
    pub path: Utf8PathBuf,
    pub target: Utf8PathBuf,
}

impl Symlink {
    pub fn new(
        project_id: impl Into<String>,
        sequencing_run_id: impl Into<String>,
        path: Utf8PathBuf,
        target: Utf8PathBuf,
    ) -> Self {
        let library_id = library_id_from_fastq(&target);
        Self {
            project_id: project_id.into(),
            sequencing_run_id: sequencing_run_id.into(),
            library_id,
            path,
            target,
        }
    }
}

/// First underscore-delimited token of a FASTQ file name.
pub fn library_id_from_fastq(path: &Utf8Path) -> String {
    path.file_name()
        .and_then(|name| name.split('_').next())
        .unwrap_or_default()
        .to_string()
}

/// Normalize a samplesheet library id the same way the demultiplexer names FASTQ files.
pub fn sanitize_library_id(library_id: &str) -> String {
    let replaced: String = library_id
        .trim()
        .chars()
        .map(|ch| {
            if UNSAFE_LIBRARY_ID_CHARS.contains(&ch) {
                '-'
            } else {
                ch
            }
        })
        .collect();

    let mut sanitized = String::with_capacity(replaced.len());
    for ch in replaced.chars() {
        if ch == '-' && sanitized.ends_with('-') {
            continue;
        }
        sanitized.push(ch);
    }
    sanitized
}
