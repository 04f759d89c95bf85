use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};
use uq_core::fs::{atomic_write_bytes, ensure_dir};
use uq_core::DataHandle;
use uq_schemas::{SubmitConfig, SystemKind};
use walkdir::WalkDir;

use crate::jobs::Job;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("missing submit script: {path}")]
    MissingScript { path: PathBuf },
    #[error("submit command is empty")]
    EmptyCommand,
    #[error("cannot spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} exited with {code:?}: {output}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("template directory not found: {path}")]
    MissingTemplate { path: PathBuf },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot serialize data locations: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Backend-specific submission and templating behavior. One variant per
/// backend, selected via the `system` config key.
pub trait System {
    fn write_batchfile(&self, job: &Job) -> Result<(), SystemError>;
    fn submit_job(&self, job: &Job) -> Result<(), SubmitError>;
    fn submit_array(&self, jobs: &[Job], workdir: &Path) -> Result<(), SubmitError>;
    fn copy_from_template(&self, source: &Path, target: &Path) -> Result<(), SystemError>;
    fn update_data_locations(
        &self,
        run_dir: &Path,
        data_in: &DataHandle,
        data_out: &DataHandle,
    ) -> Result<(), SystemError>;
}

pub fn system_for(kind: SystemKind, submit: &SubmitConfig) -> Box<dyn System> {
    match kind {
        SystemKind::Cluster => Box::new(ClusterSystem::new(submit.clone())),
        SystemKind::Dummy => Box::new(DummySystem),
    }
}

/// Batch-scheduler backend: writes directive-prefixed batch files and
/// submits them through the configured external command.
pub struct ClusterSystem {
    cfg: SubmitConfig,
}

impl ClusterSystem {
    pub fn new(cfg: SubmitConfig) -> Self {
        Self { cfg }
    }

    fn run_submit(&self, script: &Path) -> Result<Vec<u8>, SubmitError> {
        let mut parts = self.cfg.submit_command.split_whitespace();
        let program = parts.next().ok_or(SubmitError::EmptyCommand)?;
        let rendered = format!("{} {}", self.cfg.submit_command, script.display());
        info!("submitting via: {}", rendered);

        let output = Command::new(program)
            .args(parts)
            .arg(script)
            .output()
            .map_err(|source| SubmitError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("submission stdout: {}", stdout.trim_end());
        if !stderr.is_empty() {
            debug!("submission stderr: {}", stderr.trim_end());
        }
        if !output.status.success() {
            return Err(SubmitError::CommandFailed {
                command: rendered,
                code: output.status.code(),
                output: format!("{}{}", stdout, stderr),
            });
        }
        Ok(output.stdout)
    }
}

impl System for ClusterSystem {
    fn write_batchfile(&self, job: &Job) -> Result<(), SystemError> {
        let prefix = &self.cfg.directive_prefix;
        let body = format!(
            "#!/bin/sh\n{prefix} -J {name}\n{prefix} -o batch.out\n{prefix} -e batch.err\ncd '{dir}'\nexec './{driver}'\n",
            prefix = prefix,
            name = job.name(),
            dir = job.dir.display(),
            driver = self.cfg.driver_script_name,
        );
        write_executable(&job.submit_script, body.as_bytes())
    }

    fn submit_job(&self, job: &Job) -> Result<(), SubmitError> {
        if !job.has_submit_script() {
            return Err(SubmitError::MissingScript {
                path: job.submit_script.clone(),
            });
        }
        let ack = self.run_submit(&job.submit_script)?;
        fs::write(&job.lockfile, &ack).map_err(|source| SubmitError::Io {
            path: job.lockfile.clone(),
            source,
        })?;
        Ok(())
    }

    fn submit_array(&self, jobs: &[Job], workdir: &Path) -> Result<(), SubmitError> {
        if jobs.is_empty() {
            return Ok(());
        }
        // Fail before any lock is written: the wrapper cannot be built
        // without every script.
        for job in jobs {
            if !job.has_submit_script() {
                return Err(SubmitError::MissingScript {
                    path: job.submit_script.clone(),
                });
            }
        }
        let first = &jobs[0].submit_script;
        let content = fs::read_to_string(first).map_err(|source| SubmitError::Io {
            path: first.clone(),
            source,
        })?;

        for job in jobs {
            fs::write(&job.lockfile, b"").map_err(|source| SubmitError::Io {
                path: job.lockfile.clone(),
                source,
            })?;
        }

        let prefix = &self.cfg.directive_prefix;
        let stem = Path::new(&self.cfg.array_script_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.cfg.array_script_name.clone());

        // Directives are line-scoped; only directive lines carry forward.
        let mut lines: Vec<String> = content
            .lines()
            .filter(|l| l.starts_with("#!") || l.starts_with(prefix.as_str()))
            .map(str::to_string)
            .collect();
        lines.push(format!("{} -o {}.out", prefix, stem));
        lines.push(format!("{} -e {}.err", prefix, stem));
        lines.push(format!("{} --array=0-{}", prefix, jobs.len() - 1));
        lines.push(format!("{} -J {}", prefix, stem));

        let scripts: Vec<String> = jobs
            .iter()
            .map(|j| format!("'{}'", j.submit_script.display()))
            .collect();
        lines.push(format!("scripts=({})", scripts.join(" ")));
        lines.push(format!(
            "echo executing ${{scripts[${}]}}",
            self.cfg.array_task_var
        ));
        lines.push(format!("${{scripts[${}]}} || true", self.cfg.array_task_var));

        let wrapper = workdir.join(&self.cfg.array_script_name);
        info!("writing array wrapper {}", wrapper.display());
        write_executable(&wrapper, format!("{}\n", lines.join("\n")).as_bytes()).map_err(
            |err| match err {
                SystemError::Io { path, source } => SubmitError::Io { path, source },
                other => SubmitError::Io {
                    path: wrapper.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
                },
            },
        )?;

        let ack = self.run_submit(&wrapper)?;
        for job in jobs {
            fs::write(&job.lockfile, &ack).map_err(|source| SubmitError::Io {
                path: job.lockfile.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn copy_from_template(&self, source: &Path, target: &Path) -> Result<(), SystemError> {
        copy_dir(source, target)
    }

    fn update_data_locations(
        &self,
        run_dir: &Path,
        data_in: &DataHandle,
        data_out: &DataHandle,
    ) -> Result<(), SystemError> {
        write_data_locations(run_dir, data_in, data_out)
    }
}

/// No-op backend for tests and smoke runs: writes trivial scripts and
/// never talks to a scheduler.
pub struct DummySystem;

impl System for DummySystem {
    fn write_batchfile(&self, job: &Job) -> Result<(), SystemError> {
        let body = format!("#!/bin/sh\n# dummy batchfile for {}\n", job.name());
        write_executable(&job.submit_script, body.as_bytes())
    }

    fn submit_job(&self, job: &Job) -> Result<(), SubmitError> {
        if !job.has_submit_script() {
            return Err(SubmitError::MissingScript {
                path: job.submit_script.clone(),
            });
        }
        fs::write(&job.lockfile, b"dummy submission\n").map_err(|source| SubmitError::Io {
            path: job.lockfile.clone(),
            source,
        })
    }

    fn submit_array(&self, jobs: &[Job], _workdir: &Path) -> Result<(), SubmitError> {
        for job in jobs {
            if !job.has_submit_script() {
                return Err(SubmitError::MissingScript {
                    path: job.submit_script.clone(),
                });
            }
        }
        for job in jobs {
            fs::write(&job.lockfile, b"dummy array submission\n").map_err(|source| {
                SubmitError::Io {
                    path: job.lockfile.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }

    fn copy_from_template(&self, source: &Path, target: &Path) -> Result<(), SystemError> {
        copy_dir(source, target)
    }

    fn update_data_locations(
        &self,
        run_dir: &Path,
        data_in: &DataHandle,
        data_out: &DataHandle,
    ) -> Result<(), SystemError> {
        write_data_locations(run_dir, data_in, data_out)
    }
}

/// Recursive copy; `fs::copy` carries permission bits, so driver scripts
/// stay executable.
fn copy_dir(source: &Path, target: &Path) -> Result<(), SystemError> {
    if !source.is_dir() {
        return Err(SystemError::MissingTemplate {
            path: source.to_path_buf(),
        });
    }
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|err| SystemError::Io {
            path: source.to_path_buf(),
            source: err.into(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .unwrap_or_else(|_| Path::new(""));
        let dst = target.join(rel);
        if entry.file_type().is_dir() {
            ensure_dir(&dst).map_err(|source| SystemError::Io { path: dst, source })?;
        } else {
            fs::copy(entry.path(), &dst).map_err(|source| SystemError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct DataLocations<'a> {
    data_in: &'a DataHandle,
    data_out: &'a DataHandle,
}

fn write_data_locations(
    run_dir: &Path,
    data_in: &DataHandle,
    data_out: &DataHandle,
) -> Result<(), SystemError> {
    let path = run_dir.join("data_locations.yaml");
    let text = serde_yaml::to_string(&DataLocations { data_in, data_out })?;
    atomic_write_bytes(&path, text.as_bytes())
        .map_err(|source| SystemError::Io { path, source })
}

fn write_executable(path: &Path, body: &[u8]) -> Result<(), SystemError> {
    atomic_write_bytes(path, body).map_err(|source| SystemError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
            SystemError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }
    Ok(())
}
