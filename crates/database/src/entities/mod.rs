//! Domain entities for the database layer

pub mod chat;
pub mod message;

pub use chat::Chat;
pub use message::{ChatMessage, CreateMessageRequest};

use chrono::{SecondsFormat, Utc};

/// Current time as an RFC 3339 UTC string with microsecond precision.
///
/// Fixed width, so lexical order matches chronological order in SQL.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
