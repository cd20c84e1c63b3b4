mod processor;
mod queue;
mod watcher;

pub use processor::LinkProcessor;
pub use queue::{EnqueueOutcome, LinkQueue, LinkRequest, LinkSource};
pub use watcher::AvailabilityWatcher;
