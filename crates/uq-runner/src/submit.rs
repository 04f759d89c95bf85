use std::path::Path;

use tracing::{info, warn};

use crate::jobs::Job;
use crate::system::{SubmitError, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// One scheduler submission per run.
    Single,
    /// One array submission covering every eligible run.
    Array,
}

/// Outcome of a submission pass. Failures are collected per job so one
/// bad run does not block the rest of the sweep.
#[derive(Debug, Default)]
pub struct SubmitSummary {
    pub submitted: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, SubmitError)>,
}

impl SubmitSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Submit every unlocked job. A lock file means a submission was already
/// attempted; `force` overrides that and resubmits.
pub fn submit_runs(
    jobs: &[Job],
    system: &dyn System,
    mode: SubmitMode,
    workdir: &Path,
    force: bool,
) -> Result<SubmitSummary, SubmitError> {
    let mut summary = SubmitSummary::default();
    let mut eligible: Vec<Job> = Vec::with_capacity(jobs.len());

    for job in jobs {
        if job.has_lock() && !force {
            info!("{} already submitted, skipping (use force to resubmit)", job.name());
            summary.skipped.push(job.name());
        } else {
            if job.has_lock() {
                warn!("{} already submitted, resubmitting", job.name());
            }
            eligible.push(job.clone());
        }
    }

    if eligible.is_empty() {
        return Ok(summary);
    }

    match mode {
        SubmitMode::Array => {
            // All-or-nothing: the wrapper script covers the whole batch.
            system.submit_array(&eligible, workdir)?;
            summary.submitted = eligible.iter().map(Job::name).collect();
        }
        SubmitMode::Single => {
            for job in &eligible {
                match system.submit_job(job) {
                    Ok(()) => summary.submitted.push(job.name()),
                    Err(err) => {
                        warn!("{}: {}", job.name(), err);
                        summary.failed.push((job.name(), err));
                    }
                }
            }
        }
    }
    Ok(summary)
}
