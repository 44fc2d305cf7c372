//! Chat entity definitions

use serde::{Deserialize, Serialize};

/// A two-party conversation.
///
/// `participants` is `[creator, peer]`, the order in which the chat was first requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(skip)]
    pub id: i64,
    #[serde(rename = "id")]
    pub public_id: String,
    pub participants: [String; 2],
    pub created_at: String,
    pub updated_at: String,
}

impl Chat {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|participant| participant == user_id)
    }

    /// The other participant, if `user_id` belongs to this chat.
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        match &self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }
}

/// Sort a participant pair into the `(low, high)` form stored in the unique index.
pub(crate) fn normalise_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
