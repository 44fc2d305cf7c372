use std::collections::BTreeSet;

use parley_relay::ServerEvent;

/// Latest `getUsers` snapshot.
#[derive(Debug, Default, Clone)]
pub struct OnlineUsers {
    users: BTreeSet<String>,
}

impl OnlineUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot if `event` is a presence update.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        let ServerEvent::Presence(users) = event else {
            return false;
        };
        self.users = users.iter().map(|user| user.user_id.clone()).collect();
        true
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains(user_id)
    }

    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
