use std::collections::VecDeque;

use parley_relay::ClientEvent;

/// Relay sends issued while disconnected, replayed in order on reconnect.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<ClientEvent>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ClientEvent) {
        self.queue.push_back(event);
    }

    /// Put back an event that could not be written, ahead of everything else.
    pub fn requeue(&mut self, event: ClientEvent) {
        self.queue.push_front(event);
    }

    pub fn pop(&mut self) -> Option<ClientEvent> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identify(user: &str) -> ClientEvent {
        ClientEvent::Identify(user.into())
    }

    #[test]
    fn pops_in_fifo_order_and_requeue_jumps_the_line() {
        let mut outbox = Outbox::new();
        outbox.push(identify("a"));
        outbox.push(identify("b"));

        let first = outbox.pop().unwrap();
        assert_eq!(first, identify("a"));
        outbox.requeue(first);

        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.pop(), Some(identify("a")));
        assert_eq!(outbox.pop(), Some(identify("b")));
        assert!(outbox.is_empty());
    }
}
