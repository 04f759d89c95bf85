use anyhow::{bail, Context, Result};
use std::fs;
use tracing::info;
use uq_core::DataStore;
use uq_schemas::{Config, Runs};

use crate::jobs::jobs_for_runs;
use crate::op_queue::OpQueue;

/// Queue removal of everything `create` produced: run directories, the
/// perturbed input documents, the output documents, and finally the run
/// collection file itself (kept as `<name>.old`).
///
/// Submitted runs are protected by their lock files; `force` removes
/// them anyway.
pub fn cleanup_runs<'a>(cfg: &'a Config, queue: &mut OpQueue<'a>, force: bool) -> Result<Runs> {
    let runs_file = &cfg.workspace.runs_file;
    if !runs_file.is_file() {
        bail!("no run collection at {}, nothing to clean", runs_file.display());
    }
    let runs = Runs::load(runs_file)
        .with_context(|| format!("cannot load {}", runs_file.display()))?;

    let jobs = jobs_for_runs(cfg, &runs);
    if !force {
        for job in &jobs {
            if job.has_lock() {
                bail!(
                    "{} was submitted, refusing to clean (use force to override)",
                    job.name()
                );
            }
        }
    }

    info!("cleaning {} runs", runs.len());
    let store = DataStore::new(&cfg.workspace.store_root);

    for (job, record) in jobs.iter().zip(runs.iter()) {
        {
            let dir = job.dir.clone();
            queue.push(format!("remove run directory {}", dir.display()), move || {
                if dir.is_dir() {
                    fs::remove_dir_all(&dir)
                        .with_context(|| format!("cannot remove {}", dir.display()))?;
                }
                Ok(())
            });
        }
        {
            let store = store.clone();
            let handle = record.data_in.clone();
            queue.push(format!("remove input data {}", handle), move || {
                store.remove(&handle).map_err(anyhow::Error::from)
            });
        }
        {
            let store = store.clone();
            let handle = record.data_out.clone();
            queue.push(format!("remove output data {}", handle), move || {
                store.remove(&handle).map_err(anyhow::Error::from)
            });
        }
    }

    let old = runs_file.with_extension("yaml.old");
    let runs_file = runs_file.clone();
    queue.push(
        format!("rename {} -> {}", runs_file.display(), old.display()),
        move || {
            fs::rename(&runs_file, &old)
                .with_context(|| format!("cannot rename {}", runs_file.display()))
        },
    );
    Ok(runs)
}
