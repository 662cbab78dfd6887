/// In-memory components
///
/// - `direct:` calls a registered processor inline (request/reply)
/// - `queue:` is a FIFO whose producer enqueues and whose polling consumer dequeues

mod direct;
mod queue;

pub use direct::DirectComponent;
pub use queue::{MessageQueue, QueueComponent};
