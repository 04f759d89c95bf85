pub mod cleanup;
pub mod create;
pub mod jobs;
pub mod op_queue;
pub mod samplers;
pub mod status;
pub mod submit;
pub mod system;

pub use cleanup::cleanup_runs;
pub use create::create_runs;
pub use jobs::{jobs_for_runs, Job};
pub use op_queue::OpQueue;
pub use samplers::{sample, SampleError};
pub use status::{collect_status, status_from_artifacts, RunStatus, StatusReport};
pub use submit::{submit_runs, SubmitMode, SubmitSummary};
pub use system::{system_for, SubmitError, System, SystemError};
