//! The coordinator's user-surface error taxonomy.
//!
//! Every variant's `Display` is one of the stable, textual wordings callers are expected to
//! match on; there is no structured error code, by design.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid channel name")]
    InvalidChannelName,

    #[error("Channel with such name not found")]
    ChannelNotFoundByName,

    #[error("Channel not found")]
    ChannelNotFound,

    #[error("User with such id not found")]
    UserNotFound,

    #[error("User with such nick already exists")]
    NickAlreadyExists,

    #[error("User already joined this channel")]
    AlreadyJoined,

    #[error("User is not joined channel")]
    NotJoined,

    /// Catch-all for failures that have no place in the fixed taxonomy above: a closed
    /// coordinator/channel mailbox, a materializer that panicked while attaching a party flow.
    /// Still just a text string to the caller; the detail is for logs, not for matching on.
    #[error("internal error: {0}")]
    Internal(String),
}
