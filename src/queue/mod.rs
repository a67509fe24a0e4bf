mod record;
mod schema;
mod store;

#[cfg(test)]
mod tests;

pub use record::{CaptureRecord, CaptureRequest, CaptureStatus};
pub use schema::{QueueDocument, SchemaLoad, SchemaVersion};
pub use store::{CaptureQueueStore, DrainReport, QueueStats};
