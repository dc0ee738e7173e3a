mod queue;
mod types;

pub use queue::{EventQueue, EventSink};
pub use types::ClientEvent;
