//! One strongly-typed actix `Message` per coordinator command. Each already carries its own
//! reply channel via `Addr::send`; the envelope layer in [`crate::envelope`] is a thin facade
//! over these for callers that don't want per-command types.

use actix::Message;
use tracing::Span;

use crate::errors::CoreError;
use crate::ids::{ChannelId, UserId};
use crate::party::Materializer;
use crate::server::response::{ChannelInfo, ChannelListReply, ServerSnapshot, UserInfo};

/// Lists every channel, including each one's live user count.
#[derive(Message, Clone)]
#[rtype(result = "ChannelListReply")]
pub struct List {
    pub span: Span,
}

/// Creates a channel if one by this name doesn't already exist; otherwise returns the existing
/// one untouched.
#[derive(Message, Clone)]
#[rtype(result = "Result<ChannelInfo, CoreError>")]
pub struct NewChannel {
    pub name: String,
    pub span: Span,
}

/// Looks a channel up by name without creating it.
#[derive(Message, Clone)]
#[rtype(result = "Result<ChannelInfo, CoreError>")]
pub struct FindChannel {
    pub name: String,
    pub span: Span,
}

/// Updates a channel's topic.
#[derive(Message, Clone)]
#[rtype(result = "Result<(), CoreError>")]
pub struct SetTopic {
    pub channel_id: ChannelId,
    pub topic: String,
    pub span: Span,
}

/// Removes a channel, severing every subscriber's kill switch.
#[derive(Message, Clone)]
#[rtype(result = "Result<(), CoreError>")]
pub struct DropChannel {
    pub channel_id: ChannelId,
    pub span: Span,
}

/// Registers a new user and materializes a subscription for each listed channel that exists.
/// Ids in `channels` that don't name an existing channel are silently dropped.
#[derive(Message)]
#[rtype(result = "Result<UserInfo, CoreError>")]
pub struct Connect {
    pub nick: String,
    pub email: Option<String>,
    pub materializer: Option<Materializer>,
    pub channels: Vec<ChannelId>,
    pub span: Span,
}

/// Shuts every subscription belonging to a user and removes them from the server.
#[derive(Message, Clone)]
#[rtype(result = "Result<(), CoreError>")]
pub struct Disconnect {
    pub user_id: UserId,
    pub span: Span,
}

/// Joins a user to a channel by name, auto-creating it if the name is valid and absent.
#[derive(Message, Clone)]
#[rtype(result = "Result<(), CoreError>")]
pub struct Join {
    pub user_id: UserId,
    pub channel_name: String,
    pub span: Span,
}

/// Leaves a channel the user was subscribed to, shutting down its kill switch.
#[derive(Message, Clone)]
#[rtype(result = "Result<(), CoreError>")]
pub struct Leave {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub span: Span,
}

/// Fetches a user's current info.
#[derive(Message, Clone)]
#[rtype(result = "Result<UserInfo, CoreError>")]
pub struct GetUser {
    pub user_id: UserId,
    pub span: Span,
}

/// Raw snapshot of server state, for tests and diagnostics only.
#[derive(Message, Clone)]
#[rtype(result = "ServerSnapshot")]
pub struct ReadState;

/// Applies an arbitrary, synchronous transform to the raw server state. Internal/testing only;
/// never exposed across the envelope layer.
#[derive(Message)]
#[rtype(result = "()")]
pub struct UpdateState {
    pub mutator: Box<dyn FnOnce(&mut crate::server::ServerData) + Send>,
}
