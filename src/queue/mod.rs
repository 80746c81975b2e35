mod queue;
mod store;

pub use queue::{AckFlags, CreationFlags, OpenFlags, Queue, RetentionState, SizeLimits, Waiter};
pub use store::{QueueStatus, QueueStore};
