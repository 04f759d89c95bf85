pub mod config;
pub mod dimensions;
pub mod runs;

pub use config::{
    Config, ConfigError, CreateConfig, DataLocation, MergeConfig, MergeStep, Sampler,
    StatusConfig, SubmitConfig, SystemKind, WorkspaceConfig,
};
pub use dimensions::{Assignment, Dimension, DimensionError, Operation, OperationDim, Operator};
pub use runs::{read_handles_from_file, HandleFileError, RunRecord, Runs};
