//! Batch run driving

mod batch;

pub use batch::{BatchEntry, BatchRunner};
