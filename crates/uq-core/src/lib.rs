pub mod data;
pub mod fs;
pub mod handle;

pub use data::{resolve_time, DataError, DataMapping};
pub use handle::{DataHandle, DataStore};
