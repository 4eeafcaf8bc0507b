//! The uniform `ServerControlMessage`/`ServerReplyMessage` envelope.
//!
//! Each command already has its own strongly-typed actix [`actix::Message`] in
//! [`crate::messages`], which is what [`crate::server::Server`]'s handlers are actually written
//! against. This module is a thin dispatch facade over those same handlers for callers that
//! would rather not depend on the per-command types -- the web collaborator, an integration
//! test harness -- it does not re-implement any command logic.

use actix::Addr;
use tracing::Span;

use crate::errors::CoreError;
use crate::ids::{ChannelId, UserId};
use crate::messages::{
    Connect, Disconnect, DropChannel, FindChannel, GetUser, Join, Leave, List, NewChannel,
    ReadState, SetTopic,
};
use crate::party::Materializer;
use crate::server::response::{ChannelInfo, ChannelListReply, ServerSnapshot, UserInfo};
use crate::server::Server;

/// Command inputs, one variant per coordinator command. `UpdateState` is deliberately absent
/// here: it is internal/testing-only and never crosses the envelope layer.
pub enum ServerControlMessage {
    List,
    NewChannel {
        name: String,
    },
    FindChannel {
        name: String,
    },
    SetTopic {
        channel_id: ChannelId,
        topic: String,
    },
    DropChannel {
        channel_id: ChannelId,
    },
    Connect {
        nick: String,
        email: Option<String>,
        materializer: Option<Materializer>,
        channels: Vec<ChannelId>,
    },
    Disconnect {
        user_id: UserId,
    },
    Join {
        user_id: UserId,
        channel_name: String,
    },
    Leave {
        user_id: UserId,
        channel_id: ChannelId,
    },
    GetUser {
        user_id: UserId,
    },
    ReadState,
}

/// Uniform reply: one variant per shape a command can hand back, plus `Ack` for the no-reply
/// (but acknowledged) transitions and `Error` for every failure.
#[derive(Debug, Clone)]
pub enum ServerReplyMessage {
    ChannelList(ChannelListReply),
    ChannelInfo(ChannelInfo),
    UserInfo(UserInfo),
    State(ServerSnapshot),
    Ack,
    Error(CoreError),
}

impl ServerControlMessage {
    /// Dispatches to the coordinator and folds its per-command reply into the uniform envelope.
    /// `span` is attached to whichever per-command message carries one (every one of them does
    /// except `ReadState`).
    pub async fn dispatch(self, server: &Addr<Server>, span: Span) -> ServerReplyMessage {
        match self {
            Self::List => match server.send(List { span }).await {
                Ok(reply) => ServerReplyMessage::ChannelList(reply),
                Err(error) => ServerReplyMessage::Error(mailbox_error(error)),
            },
            Self::NewChannel { name } => reply_result(
                server.send(NewChannel { name, span }).await,
                ServerReplyMessage::ChannelInfo,
            ),
            Self::FindChannel { name } => reply_result(
                server.send(FindChannel { name, span }).await,
                ServerReplyMessage::ChannelInfo,
            ),
            Self::SetTopic { channel_id, topic } => {
                reply_ack(server.send(SetTopic { channel_id, topic, span }).await)
            }
            Self::DropChannel { channel_id } => {
                reply_ack(server.send(DropChannel { channel_id, span }).await)
            }
            Self::Connect {
                nick,
                email,
                materializer,
                channels,
            } => reply_result(
                server
                    .send(Connect {
                        nick,
                        email,
                        materializer,
                        channels,
                        span,
                    })
                    .await,
                ServerReplyMessage::UserInfo,
            ),
            Self::Disconnect { user_id } => reply_ack(server.send(Disconnect { user_id, span }).await),
            Self::Join {
                user_id,
                channel_name,
            } => reply_ack(
                server
                    .send(Join {
                        user_id,
                        channel_name,
                        span,
                    })
                    .await,
            ),
            Self::Leave {
                user_id,
                channel_id,
            } => reply_ack(
                server
                    .send(Leave {
                        user_id,
                        channel_id,
                        span,
                    })
                    .await,
            ),
            Self::GetUser { user_id } => reply_result(
                server.send(GetUser { user_id, span }).await,
                ServerReplyMessage::UserInfo,
            ),
            Self::ReadState => match server.send(ReadState).await {
                Ok(snapshot) => ServerReplyMessage::State(snapshot),
                Err(error) => ServerReplyMessage::Error(mailbox_error(error)),
            },
        }
    }
}

fn reply_result<T>(
    result: Result<Result<T, CoreError>, actix::MailboxError>,
    ok: impl FnOnce(T) -> ServerReplyMessage,
) -> ServerReplyMessage {
    match result {
        Ok(Ok(value)) => ok(value),
        Ok(Err(error)) => ServerReplyMessage::Error(error),
        Err(error) => ServerReplyMessage::Error(mailbox_error(error)),
    }
}

fn reply_ack(result: Result<Result<(), CoreError>, actix::MailboxError>) -> ServerReplyMessage {
    match result {
        Ok(Ok(())) => ServerReplyMessage::Ack,
        Ok(Err(error)) => ServerReplyMessage::Error(error),
        Err(error) => ServerReplyMessage::Error(mailbox_error(error)),
    }
}

/// A closed or overloaded coordinator mailbox is an unexpected failure, not one of the
/// fixed taxonomy wordings; caught here rather than leaking `actix::MailboxError` to callers.
fn mailbox_error(error: actix::MailboxError) -> CoreError {
    tracing::error!(%error, "coordinator mailbox error");
    CoreError::Internal(error.to_string())
}
