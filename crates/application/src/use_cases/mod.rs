//! Application use cases

mod run_request;

pub use run_request::{RunOptions, RunOutcome, RunRequest};
