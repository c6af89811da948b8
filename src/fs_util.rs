use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;

use crate::error::SymlinkError;

/// Names of the immediate subdirectories of `dir`, sorted. Non-UTF-8 names are skipped.
pub fn subdirectory_names(dir: &Utf8Path) -> Result<Vec<String>, SymlinkError> {
    let entries = dir
        .read_dir_utf8()
        .map_err(|err| SymlinkError::Filesystem(format!("read dir {dir}: {err}")))?;
    let mut names = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else {
            continue;
        };
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string());
        }
    }
    names.sort();
    Ok(names)
}

pub fn list_files_with_suffixes(
    dir: &Utf8Path,
    suffixes: &[String],
) -> Result<BTreeSet<String>, SymlinkError> {
    let entries = dir
        .read_dir_utf8()
        .map_err(|err| SymlinkError::Filesystem(format!("read dir {dir}: {err}")))?;
    let mut files = BTreeSet::new();
    for entry in entries {
        let Ok(entry) = entry else {
            continue;
        };
        let name = entry.file_name();
        if !suffixes.iter().any(|suffix| name.ends_with(suffix.as_str())) {
            continue;
        }
        if entry.path().is_file() {
            files.insert(name.to_string());
        }
    }
    Ok(files)
}

pub fn read_list_file(path: &Utf8Path) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Serialize `value` as pretty JSON and replace `path` with it in one rename.
pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), SymlinkError> {
    let parent = path
        .parent()
        .ok_or_else(|| SymlinkError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent).map_err(|err| SymlinkError::Filesystem(err.to_string()))?;
    let mut content = serde_json::to_vec_pretty(value)
        .map_err(|err| SymlinkError::Filesystem(err.to_string()))?;
    content.push(b'\n');

    let mut temp = Builder::new()
        .prefix(".auto-fastq-symlink")
        .tempfile_in(parent)
        .map_err(|err| SymlinkError::Filesystem(err.to_string()))?;
    temp.write_all(&content)
        .map_err(|err| SymlinkError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| SymlinkError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn normalize_lexically(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalized = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if normalized.file_name().is_some() {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_str()),
        }
    }
    normalized
}

/// Where the symlink at `link` points, with relative targets taken from the link's
/// directory. The target itself does not have to exist.
pub fn read_link_target(link: &Utf8Path) -> io::Result<Utf8PathBuf> {
    let target = fs::read_link(link)?;
    let target = Utf8PathBuf::from_path_buf(target).map_err(|target| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("link target is not UTF-8: {}", target.display()),
        )
    })?;
    let target = match link.parent() {
        Some(parent) if target.is_relative() => parent.join(target),
        _ => target,
    };
    Ok(normalize_lexically(&target))
}

#[cfg(unix)]
pub fn create_symlink(target: &Utf8Path, path: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(windows)]
pub fn create_symlink(target: &Utf8Path, path: &Utf8Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, path)
}
