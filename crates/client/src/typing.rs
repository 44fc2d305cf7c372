use std::time::Duration;

use parley_relay::{ServerEvent, Typing};
use tokio::time::Instant;

pub const TYPING_QUIET_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Receiver side: whether the open peer is typing. The last event wins.
#[derive(Debug, Default)]
pub struct TypingIndicator {
    peer_id: Option<String>,
    typing: bool,
}

impl TypingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to another peer. Resets the indicator.
    pub fn open(&mut self, peer_id: impl Into<String>) {
        self.peer_id = Some(peer_id.into());
        self.typing = false;
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// Returns `true` when the displayed state changed.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        let (payload, typing) = match event {
            ServerEvent::TypingStart(payload) => (payload, true),
            ServerEvent::TypingStop(payload) => (payload, false),
            _ => return false,
        };
        if self.peer_id.as_deref() != Some(payload.sender_id.as_str()) {
            return false;
        }
        let changed = self.typing != typing;
        self.typing = typing;
        changed
    }
}

/// Sender side: turns keystrokes into `typing` / `typing stop`.
///
/// `typing` goes out on the first non-empty input. `typing stop` goes out when
/// the input is cleared, a message is sent, or nothing was typed for the quiet
/// period; the caller drives the last case with [`TypingDebouncer::deadline`]
/// and [`TypingDebouncer::poll`].
#[derive(Debug)]
pub struct TypingDebouncer {
    quiet: Duration,
    active: bool,
    last_input: Option<Instant>,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(TYPING_QUIET_PERIOD)
    }
}

impl TypingDebouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            active: false,
            last_input: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn on_input(&mut self, text: &str) -> Option<TypingSignal> {
        if text.trim().is_empty() {
            return self.stop();
        }
        self.last_input = Some(Instant::now());
        if self.active {
            None
        } else {
            self.active = true;
            Some(TypingSignal::Start)
        }
    }

    pub fn on_send(&mut self) -> Option<TypingSignal> {
        self.stop()
    }

    /// When `poll` will next have something to say.
    pub fn deadline(&self) -> Option<Instant> {
        match (self.active, self.last_input) {
            (true, Some(last)) => Some(last + self.quiet),
            _ => None,
        }
    }

    pub fn poll(&mut self) -> Option<TypingSignal> {
        match self.deadline() {
            Some(deadline) if Instant::now() >= deadline => self.stop(),
            _ => None,
        }
    }

    fn stop(&mut self) -> Option<TypingSignal> {
        self.last_input = None;
        if self.active {
            self.active = false;
            Some(TypingSignal::Stop)
        } else {
            None
        }
    }
}

/// Wire payload for a typing signal.
pub fn typing_event(signal: TypingSignal, sender_id: &str, receiver_id: &str) -> parley_relay::ClientEvent {
    let payload = Typing {
        sender_id: sender_id.to_string(),
        receiver_id: receiver_id.to_string(),
    };
    match signal {
        TypingSignal::Start => parley_relay::ClientEvent::TypingStart(payload),
        TypingSignal::Stop => parley_relay::ClientEvent::TypingStop(payload),
    }
}
