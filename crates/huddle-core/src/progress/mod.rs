//! Background-job progress domain module.

mod model;

pub use model::{COMPLETE_PROGRESS, ProgressCompletion, ProgressEvent};
