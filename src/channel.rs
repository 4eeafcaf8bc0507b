use std::collections::HashMap;

use actix::{Actor, Context, Handler, Message, MessageResult};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::ids::{ChannelId, UserId};
use crate::party::ChatClientMessage;

/// An independent serial executor owning one channel's live subscriber set and running its
/// fan-out. Membership here is restricted to *live* subscribers: a headless join (see
/// `crate::party::Materializer`) never attaches, so it never counts toward `ListUsers` or
/// receives a publication.
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    subscribers: HashMap<UserId, mpsc::Sender<ChatClientMessage<UserId>>>,
}

impl Channel {
    #[must_use]
    pub fn new(id: ChannelId, name: String) -> Self {
        Self {
            id,
            name,
            subscribers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn live_user_count(&self) -> usize {
        self.subscribers.len()
    }

    fn broadcast(&self, message: &ChatClientMessage<UserId>) {
        for (user, sink) in &self.subscribers {
            if sink.try_send(message.clone()).is_err() {
                warn!(%user, channel = %self.name, "dropping message, subscriber sink is full or closed");
            }
        }
    }
}

impl Actor for Channel {
    type Context = Context<Self>;
}

/// Replies with the ids of every subscriber currently attached to the channel.
#[derive(Message)]
#[rtype(result = "Vec<UserId>")]
pub struct ListUsers;

impl Handler<ListUsers> for Channel {
    type Result = MessageResult<ListUsers>;

    fn handle(&mut self, _msg: ListUsers, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.subscribers.keys().copied().collect())
    }
}

/// The channel actor's protocol: a party attaching, a party detaching, or a published payload.
#[derive(Message)]
#[rtype(result = "()")]
pub enum ChannelMessage {
    Attach {
        user: UserId,
        sink: mpsc::Sender<ChatClientMessage<UserId>>,
    },
    Detach {
        user: UserId,
    },
    Publish {
        from: UserId,
        body: String,
    },
}

impl Handler<ChannelMessage> for Channel {
    type Result = ();

    #[instrument(skip_all, fields(channel = %self.name))]
    fn handle(&mut self, msg: ChannelMessage, _ctx: &mut Self::Context) -> Self::Result {
        match msg {
            ChannelMessage::Attach { user, sink } => {
                info!(%user, "party attached");
                self.subscribers.insert(user, sink);
                self.broadcast(&ChatClientMessage::Joined(user));
            }
            ChannelMessage::Detach { user } => {
                if self.subscribers.remove(&user).is_none() {
                    return;
                }

                info!(%user, "party detached");
                self.broadcast(&ChatClientMessage::Parted(user));
            }
            ChannelMessage::Publish { from, body } => {
                if !self.subscribers.contains_key(&from) {
                    warn!(user = %from, "received publish from a party not attached to this channel");
                    return;
                }

                self.broadcast(&ChatClientMessage::Message { from, body });
            }
        }
    }
}
