//! Reply payload types returned by the coordinator's commands.

use serde::Serialize;

use crate::ids::{ChannelId, UserId};

/// A single channel's externally-visible info: name, topic, and its *live* subscriber count --
/// never a stale placeholder.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub topic: String,
    pub user_count: usize,
}

/// Reply to `List`: every known channel, in no particular order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelListReply {
    pub channels: Vec<ChannelInfo>,
}

/// A channel a user is currently subscribed to, as seen from that user's `UserInfo`.
#[derive(Debug, Clone, Serialize)]
pub struct JoinedChannel {
    pub id: ChannelId,
    pub name: String,
}

/// Reply to `Connect`/`GetUser`.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: UserId,
    pub nick: String,
    pub email: Option<String>,
    pub channels: Vec<JoinedChannel>,
}

/// Raw inspection snapshot for `ReadState`; order within each list is not meaningful.
#[derive(Debug, Clone, Default)]
pub struct ServerSnapshot {
    pub channels: Vec<ChannelInfo>,
    pub users: Vec<UserInfo>,
}
