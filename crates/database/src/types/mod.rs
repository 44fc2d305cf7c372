//! Shared types and result types for the database layer

pub mod errors;

pub use errors::{ChatError, DatabaseError};

pub type DatabaseResult<T> = Result<T, DatabaseError>;
pub type ChatResult<T> = Result<T, ChatError>;
