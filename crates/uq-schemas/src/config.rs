use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uq_core::DataHandle;

use crate::dimensions::{Dimension, OperationDim, Operator};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Sampling scheme for the dimension matrix. The quasi-random methods
/// draw `n_samples` points from the unit hypercube; the cartesian
/// product enumerates every combination and ignores sample counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "method")]
pub enum Sampler {
    #[default]
    #[serde(rename = "cartesian-product")]
    CartesianProduct,
    #[serde(rename = "latin-hypercube")]
    LatinHypercube {
        n_samples: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    /// Note: Sobol sequences lose their balance properties when
    /// `n_samples` is not a power of two. Documented, not enforced.
    #[serde(rename = "sobol")]
    Sobol { n_samples: usize },
    #[serde(rename = "halton")]
    Halton { n_samples: usize },
}

/// Where the per-run input/output documents are numbered from. The input
/// and output sequences are independent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
    #[serde(default = "default_run_in_start_at")]
    pub run_in_start_at: u32,
    #[serde(default = "default_run_out_start_at")]
    pub run_out_start_at: u32,
}

impl Default for DataLocation {
    fn default() -> Self {
        Self {
            user: None,
            db: None,
            run_in_start_at: default_run_in_start_at(),
            run_out_start_at: default_run_out_start_at(),
        }
    }
}

fn default_run_in_start_at() -> u32 {
    7000
}

fn default_run_out_start_at() -> u32 {
    8000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConfig {
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub sampler: Sampler,
    /// Baseline run directory to copy for each variant.
    pub template: PathBuf,
    /// Location of the template's input data document.
    pub template_data: DataHandle,
    #[serde(default)]
    pub data: DataLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitConfig {
    #[serde(default = "default_submit_command")]
    pub submit_command: String,
    #[serde(default = "default_submit_script_name")]
    pub submit_script_name: String,
    #[serde(default = "default_directive_prefix")]
    pub directive_prefix: String,
    #[serde(default = "default_array_task_var")]
    pub array_task_var: String,
    #[serde(default = "default_array_script_name")]
    pub array_script_name: String,
    #[serde(default = "default_lockfile_name")]
    pub lockfile_name: String,
    /// Name of the executable driver script inside each run directory,
    /// invoked by the generated batch file.
    #[serde(default = "default_driver_script_name")]
    pub driver_script_name: String,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            submit_command: default_submit_command(),
            submit_script_name: default_submit_script_name(),
            directive_prefix: default_directive_prefix(),
            array_task_var: default_array_task_var(),
            array_script_name: default_array_script_name(),
            lockfile_name: default_lockfile_name(),
            driver_script_name: default_driver_script_name(),
        }
    }
}

fn default_submit_command() -> String {
    "sbatch".to_string()
}

fn default_submit_script_name() -> String {
    "submit.sh".to_string()
}

fn default_directive_prefix() -> String {
    "#SBATCH".to_string()
}

fn default_array_task_var() -> String {
    "SLURM_ARRAY_TASK_ID".to_string()
}

fn default_array_script_name() -> String {
    "uqsweep_array.sh".to_string()
}

fn default_lockfile_name() -> String {
    "uqsweep.lock".to_string()
}

fn default_driver_script_name() -> String {
    "driver.sh".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusConfig {
    #[serde(default = "default_status_file")]
    pub status_file: String,
    #[serde(default = "default_in_file")]
    pub in_file: String,
    #[serde(default = "default_out_file")]
    pub out_file: String,
    #[serde(default = "default_msg_completed")]
    pub msg_completed: String,
    #[serde(default = "default_msg_failed")]
    pub msg_failed: String,
    #[serde(default = "default_msg_running")]
    pub msg_running: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            status_file: default_status_file(),
            in_file: default_in_file(),
            out_file: default_out_file(),
            msg_completed: default_msg_completed(),
            msg_failed: default_msg_failed(),
            msg_running: default_msg_running(),
        }
    }
}

fn default_status_file() -> String {
    "run.status".to_string()
}

fn default_in_file() -> String {
    "run.in".to_string()
}

fn default_out_file() -> String {
    "run.out".to_string()
}

fn default_msg_completed() -> String {
    "Status : Completed successfully".to_string()
}

fn default_msg_failed() -> String {
    "Status : Failed".to_string()
}

fn default_msg_running() -> String {
    "Status : Running".to_string()
}

/// One merge step: field paths sharing a base grid. Paths use `/*/` for
/// the time segment; the base grid is read from the template and every
/// contributing run is rebased onto it before aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeStep {
    pub paths: Vec<String>,
    pub base_grid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Run collection file: `runs.yaml` or a row-per-run `.csv`.
    pub data: PathBuf,
    pub template: DataHandle,
    pub output: DataHandle,
    pub plan: Vec<MergeStep>,
    /// When true, a run missing a merge path is dropped for that
    /// variable with a warning instead of failing the merge.
    #[serde(default)]
    pub skip_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,
    #[serde(default = "default_runs_file")]
    pub runs_file: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            runs_dir: default_runs_dir(),
            store_root: default_store_root(),
            runs_file: default_runs_file(),
        }
    }
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_store_root() -> PathBuf {
    PathBuf::from("store")
}

fn default_runs_file() -> PathBuf {
    PathBuf::from("runs.yaml")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SystemKind {
    #[default]
    Cluster,
    Dummy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<CreateConfig>,
    #[serde(default)]
    pub submit: SubmitConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeConfig>,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub system: SystemKind,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A populated starting config, written by `uqsweep init`.
    pub fn example() -> Self {
        Self {
            create: Some(CreateConfig {
                dimensions: vec![
                    Dimension::Operation(OperationDim {
                        path: "profiles_1d/0/t_i_average".to_string(),
                        operator: Operator::Multiply,
                        values: vec![0.9, 1.0, 1.1],
                    }),
                    Dimension::Operation(OperationDim {
                        path: "profiles_1d/0/electrons/temperature".to_string(),
                        operator: Operator::Multiply,
                        values: vec![0.9, 1.0, 1.1],
                    }),
                ],
                sampler: Sampler::default(),
                template: PathBuf::from("template"),
                template_data: DataHandle {
                    user: "uq".to_string(),
                    db: "jet".to_string(),
                    shot: 94875,
                    run: 1,
                },
                data: DataLocation::default(),
            }),
            submit: SubmitConfig::default(),
            status: StatusConfig::default(),
            merge: None,
            workspace: WorkspaceConfig::default(),
            system: SystemKind::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg: Config = serde_yaml::from_str("system: dummy\n").expect("parse");
        assert_eq!(cfg.system, SystemKind::Dummy);
        assert_eq!(cfg.submit.submit_command, "sbatch");
        assert_eq!(cfg.status.msg_running, "Status : Running");
        assert_eq!(cfg.workspace.runs_dir, PathBuf::from("runs"));
        assert!(cfg.create.is_none());
        assert!(cfg.merge.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_yaml::from_str::<Config>("no_such_key: 1\n").expect_err("err");
        assert!(err.to_string().contains("no_such_key"));
    }

    #[test]
    fn sampler_tags_round_trip() {
        let lhs: Sampler =
            serde_yaml::from_str("method: latin-hypercube\nn_samples: 8\nseed: 42\n")
                .expect("lhs");
        assert_eq!(
            lhs,
            Sampler::LatinHypercube {
                n_samples: 8,
                seed: Some(42)
            }
        );
        let cp: Sampler = serde_yaml::from_str("method: cartesian-product\n").expect("cp");
        assert_eq!(cp, Sampler::CartesianProduct);
        let sobol: Sampler = serde_yaml::from_str("method: sobol\nn_samples: 16\n").expect("s");
        assert_eq!(sobol, Sampler::Sobol { n_samples: 16 });
    }

    #[test]
    fn example_config_round_trips() {
        let text = serde_yaml::to_string(&Config::example()).expect("serialize");
        let cfg: Config = serde_yaml::from_str(&text).expect("reparse");
        assert_eq!(cfg, Config::example());
        let create = cfg.create.expect("create section");
        assert_eq!(create.dimensions.len(), 2);
        assert_eq!(create.data.run_in_start_at, 7000);
        assert_eq!(create.data.run_out_start_at, 8000);
    }
}
