use std::collections::BTreeMap;
use std::fmt;
use std::fs;

use uq_schemas::StatusConfig;

use crate::jobs::Job;

/// Lifecycle of a single run, reduced from the artifacts the simulation
/// leaves in its run directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunStatus {
    NotStarted,
    Submitted,
    Running,
    Completed,
    Failed,
    Unknown,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::NotStarted => "not started",
            RunStatus::Submitted => "submitted",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Reduce one run directory's artifacts to a status.
///
/// The status file is authoritative when it carries a marker. Without a
/// marker the surrounding files break the tie: an output file means the
/// simulation got far enough to write something, so a marker-less status
/// file is treated as a stale leftover from a crash.
pub fn status_from_artifacts(job: &Job, cfg: &StatusConfig) -> RunStatus {
    let status_exists = job.status_file.is_file();
    let out_exists = job.out_file.is_file();

    if !status_exists {
        if out_exists {
            // The solver writes its output before the first status line.
            return RunStatus::Running;
        }
        if job.in_file.is_file() || job.has_lock() {
            return RunStatus::Submitted;
        }
        return RunStatus::NotStarted;
    }

    let content = match fs::read_to_string(&job.status_file) {
        Ok(text) => text,
        Err(_) => return RunStatus::Unknown,
    };

    if content.contains(&cfg.msg_completed) {
        RunStatus::Completed
    } else if content.contains(&cfg.msg_failed) {
        RunStatus::Failed
    } else if content.contains(&cfg.msg_running) {
        RunStatus::Running
    } else if out_exists {
        RunStatus::Failed
    } else if job.has_lock() {
        RunStatus::Submitted
    } else {
        RunStatus::Unknown
    }
}

/// Aggregated status over a run collection.
#[derive(Debug, Default)]
pub struct StatusReport {
    counts: BTreeMap<RunStatus, usize>,
    total: usize,
}

impl StatusReport {
    pub fn count(&self, status: RunStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn percent_completed(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.count(RunStatus::Completed) as f64 / self.total as f64
    }

    pub fn all_completed(&self) -> bool {
        self.total > 0 && self.count(RunStatus::Completed) == self.total
    }

    pub fn counts(&self) -> impl Iterator<Item = (RunStatus, usize)> + '_ {
        self.counts.iter().map(|(s, n)| (*s, *n))
    }
}

/// Classify every job and tally the result.
pub fn collect_status(jobs: &[Job], cfg: &StatusConfig) -> (Vec<(String, RunStatus)>, StatusReport) {
    let mut per_run = Vec::with_capacity(jobs.len());
    let mut report = StatusReport::default();
    for job in jobs {
        let status = status_from_artifacts(job, cfg);
        *report.counts.entry(status).or_insert(0) += 1;
        report.total += 1;
        per_run.push((job.name(), status));
    }
    (per_run, report)
}
