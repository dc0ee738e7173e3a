use std::sync::mpsc::{self, Receiver, Sender};

use super::types::ClientEvent;

/// Producer handle. Cloned into the background threads so timer-driven
/// events (lost deliveries) travel the same ordered queue as handler events.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<ClientEvent>,
}

impl EventSink {
    pub fn push(&self, event: ClientEvent) {
        log::trace!("event: {}", event.name());
        // The queue only disappears together with its owning client.
        let _ = self.tx.send(event);
    }
}

#[derive(Debug)]
pub struct EventQueue {
    rx: Receiver<ClientEvent>,
    sink: EventSink,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            rx,
            sink: EventSink { tx },
        }
    }

    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn drain(&self) -> Vec<ClientEvent> {
        self.rx.try_iter().collect()
    }
}
