use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use rusqlite::{Connection, Row, params};

use crate::discovery::SequencingRun;
use crate::domain::{Library, Project, Symlink};
use crate::error::SymlinkError;

const SCHEMA: &str = r#"
BEGIN;
CREATE TABLE IF NOT EXISTS project (
  project_id TEXT PRIMARY KEY,
  fastq_symlinks_dir TEXT NOT NULL,
  timestamp_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sequencing_run (
  sequencing_run_id TEXT PRIMARY KEY,
  instrument_type TEXT NOT NULL,
  instrument_id TEXT NOT NULL,
  run_date TEXT NULL,
  run_directory TEXT NOT NULL,
  fastq_directory TEXT NOT NULL,
  samplesheet_path TEXT NOT NULL,
  samplesheet TEXT NOT NULL,
  timestamp_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS library (
  sequencing_run_id TEXT NOT NULL,
  library_id TEXT NOT NULL,
  project_id TEXT NULL,
  fastq_path_r1 TEXT NULL,
  fastq_path_r2 TEXT NULL,
  timestamp_updated TEXT NOT NULL,
  PRIMARY KEY (sequencing_run_id, library_id)
);

CREATE TABLE IF NOT EXISTS symlink (
  path TEXT NOT NULL,
  target TEXT NOT NULL,
  project_id TEXT NOT NULL,
  sequencing_run_id TEXT NOT NULL,
  library_id TEXT NOT NULL,
  timestamp_updated TEXT NOT NULL,
  PRIMARY KEY (path, target)
);

CREATE INDEX IF NOT EXISTS library_project_idx ON library(project_id);
CREATE INDEX IF NOT EXISTS symlink_run_idx ON symlink(sequencing_run_id);
COMMIT;
"#;

pub trait RecordStore {
    fn store_projects(&mut self, projects: &BTreeMap<String, Project>) -> Result<(), SymlinkError>;

    fn store_run(&mut self, run: &SequencingRun) -> Result<(), SymlinkError>;

    fn libraries_by_project(
        &self,
        project_id: &str,
        run_id: Option<&str>,
    ) -> Result<Vec<Library>, SymlinkError>;

    fn symlinks(&self, run_id: Option<&str>) -> Result<Vec<Symlink>, SymlinkError>;

    /// `false` when a record with the same path and target already exists.
    fn store_symlink(&mut self, symlink: &Symlink) -> Result<bool, SymlinkError>;

    fn store_symlinks(&mut self, symlinks: &[Symlink]) -> Result<usize, SymlinkError> {
        let mut inserted = 0;
        for symlink in symlinks {
            if self.store_symlink(symlink)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Drop records whose link path no longer exists. The filesystem is not touched.
    fn delete_nonexistent_symlinks(&mut self) -> Result<usize, SymlinkError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Utf8Path) -> Result<Self, SymlinkError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                SymlinkError::Store(format!("create database directory {parent}: {err}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|err| SymlinkError::Store(format!("open {path}: {err}")))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, SymlinkError> {
        let conn = Connection::open_in_memory().map_err(sql_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, SymlinkError> {
        conn.execute_batch(SCHEMA).map_err(sql_error)?;
        Ok(Self { conn })
    }
}

impl RecordStore for SqliteStore {
    fn store_projects(&mut self, projects: &BTreeMap<String, Project>) -> Result<(), SymlinkError> {
        let now = timestamp();
        let tx = self.conn.transaction().map_err(sql_error)?;
        for project in projects.values() {
            tx.execute(
                r#"
INSERT INTO project (project_id, fastq_symlinks_dir, timestamp_updated)
VALUES (?1, ?2, ?3)
ON CONFLICT(project_id) DO UPDATE SET
  fastq_symlinks_dir=excluded.fastq_symlinks_dir,
  timestamp_updated=excluded.timestamp_updated
"#,
                params![project.project_id, project.fastq_symlinks_dir.as_str(), now],
            )
            .map_err(sql_error)?;
        }
        tx.commit().map_err(sql_error)
    }

    fn store_run(&mut self, run: &SequencingRun) -> Result<(), SymlinkError> {
        let now = timestamp();
        let samplesheet = run.samplesheet.to_json()?;
        let run_date = run.run_id.run_date().map(|date| date.to_string());

        let tx = self.conn.transaction().map_err(sql_error)?;
        tx.execute(
            r#"
INSERT INTO sequencing_run (
  sequencing_run_id,
  instrument_type,
  instrument_id,
  run_date,
  run_directory,
  fastq_directory,
  samplesheet_path,
  samplesheet,
  timestamp_updated
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(sequencing_run_id) DO UPDATE SET
  instrument_type=excluded.instrument_type,
  instrument_id=excluded.instrument_id,
  run_date=excluded.run_date,
  run_directory=excluded.run_directory,
  fastq_directory=excluded.fastq_directory,
  samplesheet_path=excluded.samplesheet_path,
  samplesheet=excluded.samplesheet,
  timestamp_updated=excluded.timestamp_updated
"#,
            params![
                run.run_id.as_str(),
                run.instrument_type.as_str(),
                run.run_id.instrument_id(),
                run_date,
                run.run_directory.as_str(),
                run.fastq_directory.as_str(),
                run.samplesheet_path.as_str(),
                samplesheet,
                now,
            ],
        )
        .map_err(sql_error)?;

        for library in &run.libraries {
            tx.execute(
                r#"
INSERT INTO library (
  sequencing_run_id,
  library_id,
  project_id,
  fastq_path_r1,
  fastq_path_r2,
  timestamp_updated
) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(sequencing_run_id, library_id) DO UPDATE SET
  project_id=excluded.project_id,
  fastq_path_r1=excluded.fastq_path_r1,
  fastq_path_r2=excluded.fastq_path_r2,
  timestamp_updated=excluded.timestamp_updated
"#,
                params![
                    run.run_id.as_str(),
                    library.library_id,
                    library.project_id,
                    library.fastq_path_r1.as_ref().map(|path| path.as_str()),
                    library.fastq_path_r2.as_ref().map(|path| path.as_str()),
                    now,
                ],
            )
            .map_err(sql_error)?;
        }
        tx.commit().map_err(sql_error)
    }

    fn libraries_by_project(
        &self,
        project_id: &str,
        run_id: Option<&str>,
    ) -> Result<Vec<Library>, SymlinkError> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
SELECT library_id, sequencing_run_id, project_id, fastq_path_r1, fastq_path_r2
FROM library
WHERE project_id = ?1 AND (?2 IS NULL OR sequencing_run_id = ?2)
ORDER BY sequencing_run_id, library_id
"#,
            )
            .map_err(sql_error)?;
        let rows = stmt
            .query_map(params![project_id, run_id], library_from_row)
            .map_err(sql_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(sql_error)
    }

    fn symlinks(&self, run_id: Option<&str>) -> Result<Vec<Symlink>, SymlinkError> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
SELECT project_id, sequencing_run_id, library_id, path, target
FROM symlink
WHERE ?1 IS NULL OR sequencing_run_id = ?1
ORDER BY path, target
"#,
            )
            .map_err(sql_error)?;
        let rows = stmt
            .query_map(params![run_id], symlink_from_row)
            .map_err(sql_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(sql_error)
    }

    fn store_symlink(&mut self, symlink: &Symlink) -> Result<bool, SymlinkError> {
        let inserted = self
            .conn
            .execute(
                r#"
INSERT INTO symlink (path, target, project_id, sequencing_run_id, library_id, timestamp_updated)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(path, target) DO NOTHING
"#,
                params![
                    symlink.path.as_str(),
                    symlink.target.as_str(),
                    symlink.project_id,
                    symlink.sequencing_run_id,
                    symlink.library_id,
                    timestamp(),
                ],
            )
            .map_err(sql_error)?;
        Ok(inserted > 0)
    }

    fn store_symlinks(&mut self, symlinks: &[Symlink]) -> Result<usize, SymlinkError> {
        let now = timestamp();
        let tx = self.conn.transaction().map_err(sql_error)?;
        let mut inserted = 0;
        for symlink in symlinks {
            inserted += tx
                .execute(
                    r#"
INSERT INTO symlink (path, target, project_id, sequencing_run_id, library_id, timestamp_updated)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(path, target) DO NOTHING
"#,
                    params![
                        symlink.path.as_str(),
                        symlink.target.as_str(),
                        symlink.project_id,
                        symlink.sequencing_run_id,
                        symlink.library_id,
                        now,
                    ],
                )
                .map_err(sql_error)?;
        }
        tx.commit().map_err(sql_error)?;
        Ok(inserted)
    }

    fn delete_nonexistent_symlinks(&mut self) -> Result<usize, SymlinkError> {
        let paths: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT DISTINCT path FROM symlink")
                .map_err(sql_error)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sql_error)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(sql_error)?
        };

        let tx = self.conn.transaction().map_err(sql_error)?;
        let mut deleted = 0;
        for path in paths {
            // `exists` follows the link, so dangling links are dropped too.
            if Utf8Path::new(&path).exists() {
                continue;
            }
            deleted += tx
                .execute("DELETE FROM symlink WHERE path = ?1", params![path])
                .map_err(sql_error)?;
            tracing::debug!(event_type = "deleted_nonexistent_symlink", path = %path);
        }
        tx.commit().map_err(sql_error)?;
        Ok(deleted)
    }
}

fn library_from_row(row: &Row<'_>) -> rusqlite::Result<Library> {
    Ok(Library {
        library_id: row.get(0)?,
        sequencing_run_id: row.get(1)?,
        project_id: row.get(2)?,
        fastq_path_r1: row.get::<_, Option<String>>(3)?.map(Utf8PathBuf::from),
        fastq_path_r2: row.get::<_, Option<String>>(4)?.map(Utf8PathBuf::from),
    })
}

fn symlink_from_row(row: &Row<'_>) -> rusqlite::Result<Symlink> {
    Ok(Symlink {
        project_id: row.get(0)?,
        sequencing_run_id: row.get(1)?,
        library_id: row.get(2)?,
        path: Utf8PathBuf::from(row.get::<_, String>(3)?),
        target: Utf8PathBuf::from(row.get::<_, String>(4)?),
    })
}

fn sql_error(err: rusqlite::Error) -> SymlinkError {
    SymlinkError::Store(err.to_string())
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}
