pub mod batch;

pub use batch::{publish_batch, BatchOutcome, BatchStatus, EventError, EventRouting, ValidationError};
