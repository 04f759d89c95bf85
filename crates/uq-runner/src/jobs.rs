use std::path::{Path, PathBuf};
use uq_schemas::{Config, Runs, StatusConfig, SubmitConfig};

/// One run directory as seen by the scheduler: the submission script,
/// the lock file marking "submission attempted", and the artifacts the
/// status tracker reads.
#[derive(Debug, Clone)]
pub struct Job {
    pub dir: PathBuf,
    pub submit_script: PathBuf,
    pub lockfile: PathBuf,
    pub status_file: PathBuf,
    pub in_file: PathBuf,
    pub out_file: PathBuf,
}

impl Job {
    pub fn new(dir: &Path, submit: &SubmitConfig, status: &StatusConfig) -> Self {
        Self {
            dir: dir.to_path_buf(),
            submit_script: dir.join(&submit.submit_script_name),
            lockfile: dir.join(&submit.lockfile_name),
            status_file: dir.join(&status.status_file),
            in_file: dir.join(&status.in_file),
            out_file: dir.join(&status.out_file),
        }
    }

    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.dir.display().to_string())
    }

    pub fn has_submit_script(&self) -> bool {
        self.submit_script.is_file()
    }

    pub fn has_lock(&self) -> bool {
        self.lockfile.is_file()
    }
}

/// Build one job per recorded run, rooted in the configured runs
/// directory.
pub fn jobs_for_runs(cfg: &Config, runs: &Runs) -> Vec<Job> {
    runs.iter()
        .map(|record| {
            Job::new(
                &cfg.workspace.runs_dir.join(&record.dirname),
                &cfg.submit,
                &cfg.status,
            )
        })
        .collect()
}
