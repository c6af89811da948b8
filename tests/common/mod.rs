#![allow(dead_code)]

use std::fs;

use auto_fastq_symlink::config::ResolvedConfig;
use auto_fastq_symlink::domain::Project;
use camino::{Utf8Path, Utf8PathBuf};

pub const MISEQ_RUN: &str = "230101_M00001_0001_000000000-ABCDE";
pub const NEXTSEQ_RUN: &str = "230102_VH00123_12_AAAGJ3NM5";

pub fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

/// `[Data]` rows as (Sample_ID, Sample_Name, Sample_Project).
pub fn miseq_samplesheet(rows: &[(&str, &str, &str)]) -> String {
    let mut sheet = String::from(
        "[Header]\nIEMFileVersion,4\nExperiment Name,test\n\n[Reads]\n151\n151\n\n[Data]\n\
         Sample_ID,Sample_Name,index,index2,Sample_Project,Description\n",
    );
    for (sample_id, sample_name, project) in rows {
        sheet.push_str(&format!("{sample_id},{sample_name},AAAA,CCCC,{project},\n"));
    }
    sheet
}

/// `[Cloud_Data]` rows as (Sample_ID, ProjectName).
pub fn nextseq_samplesheet(rows: &[(&str, &str)]) -> String {
    let mut sheet = String::from(
        "[Header]\nFileFormatVersion,2\n\n[BCLConvert_Data]\nSample_ID,Index\n\n[Cloud_Data]\n\
         Sample_ID,ProjectName,LibraryName\n",
    );
    for (sample_id, project) in rows {
        sheet.push_str(&format!("{sample_id},{project},{sample_id}_AAAA\n"));
    }
    sheet
}

pub fn mark_ready(run_dir: &Utf8Path) {
    fs::write(run_dir.join("upload_complete.json"), "{}\n").unwrap();
    fs::write(
        run_dir.join("qc_check_complete.json"),
        "{\"overall_pass_fail\": \"PASS\"}\n",
    )
    .unwrap();
}

/// A ready MiSeq run using the flat BaseCalls layout. Returns the run directory.
pub fn write_miseq_run(
    parent: &Utf8Path,
    run_id: &str,
    samplesheet: &str,
    fastqs: &[&str],
) -> Utf8PathBuf {
    let run_dir = parent.join(run_id);
    let basecalls = run_dir.join("Data/Intensities/BaseCalls");
    fs::create_dir_all(&basecalls).unwrap();
    for fastq in fastqs {
        fs::write(basecalls.join(fastq), b"@read\nACGT\n+\nFFFF\n").unwrap();
    }
    fs::write(run_dir.join("SampleSheet.csv"), samplesheet).unwrap();
    mark_ready(&run_dir);
    run_dir
}

pub fn config_with_projects(root: &Utf8Path, projects: Vec<Project>) -> ResolvedConfig {
    let mut config = ResolvedConfig::new(vec![root.join("runs")], root.join("afs.db"));
    for project in projects {
        config.projects.insert(project.project_id.clone(), project);
    }
    config
}
