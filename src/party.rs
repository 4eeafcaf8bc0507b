//! Builds the per-(user, channel) bidirectional flow and the kill switch that tears it down.
//!
//! A [`PartyFlow`] is a *prepared* flow graph: by the time the coordinator hands it to a
//! [`Materializer`], the inbound→channel forwarding is already running. The materializer's job
//! is only to bridge `flow.inbound`/`flow.outbound` to whatever the caller's transport actually
//! is (a socket, an in-memory test double, nothing at all for a headless user) and to return a
//! handle that can stop the whole thing.

use std::sync::Arc;

use futures::future::{abortable, AbortHandle};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::channel::{Channel, ChannelMessage};
use crate::ids::UserId;

/// A message fanned out to a subscriber's transport.
#[derive(Debug, Clone)]
pub enum ChatClientMessage<Id> {
    /// `user` attached to the channel this flow belongs to.
    Joined(Id),
    /// `user` detached from the channel this flow belongs to.
    Parted(Id),
    /// `from` published `body` to the channel this flow belongs to.
    Message { from: Id, body: String },
}

/// One-shot, idempotent stream termination handle.
///
/// Cloning shares the same underlying switch: shutting down any clone shuts down all of them,
/// and shutting down twice is harmless (`AbortHandle::abort` already tolerates repeat calls).
#[derive(Clone)]
pub struct KillSwitch(AbortHandle);

impl KillSwitch {
    pub fn shutdown(&self) {
        self.0.abort();
    }
}

/// Given a prepared [`PartyFlow`], wires it to a real transport and returns a handle that stops
/// it. `None` on [`crate::server::UserData::materializer`] means the user is headless (a bot or
/// a test double) and never gets a flow built for it at all.
pub type Materializer = Arc<dyn Fn(PartyFlow) -> KillSwitch + Send + Sync>;

/// The bidirectional flow element connecting one user's transport to one channel actor.
pub struct PartyFlow {
    pub user_id: UserId,
    /// Transport writes raw outgoing text here; it is turned into a `Publish` to the channel.
    pub inbound: mpsc::UnboundedSender<String>,
    /// Transport reads the channel's fan-out from here.
    pub outbound: ReceiverStream<ChatClientMessage<UserId>>,
    /// Already controls the forwarding task below; a materializer that doesn't need its own
    /// teardown logic can simply return this unchanged.
    pub kill_switch: KillSwitch,
}

/// Prepares a flow between `channel` and `user_id`: attaches the user to the channel, spawns
/// the inbound-forwarding task, and returns the flow along with its kill switch.
#[must_use]
pub fn build(channel: actix::Addr<Channel>, user_id: UserId, outbound_capacity: usize) -> PartyFlow {
    let (tx_in, mut rx_in) = mpsc::unbounded_channel::<String>();
    let (tx_out, rx_out) = mpsc::channel(outbound_capacity);

    let attach_channel = channel.clone();
    let (forward, abort_handle) = abortable(async move {
        attach_channel.do_send(ChannelMessage::Attach {
            user: user_id,
            sink: tx_out,
        });

        while let Some(body) = rx_in.recv().await {
            attach_channel.do_send(ChannelMessage::Publish {
                from: user_id,
                body,
            });
        }
    });

    tokio::spawn(async move {
        // Ok(()) on natural completion, Err(Aborted) if the kill switch fired first; either way
        // the party is leaving the channel.
        let _ = forward.await;

        if channel.connected() {
            channel.do_send(ChannelMessage::Detach { user: user_id });
        } else {
            warn!(%user_id, "channel actor already gone while tearing down party flow");
        }
    });

    PartyFlow {
        user_id,
        inbound: tx_in,
        outbound: ReceiverStream::new(rx_out),
        kill_switch: KillSwitch(abort_handle),
    }
}

/// The materializer used for headless/test users that never touch a real transport: it simply
/// hands back the flow's own kill switch without wiring `inbound`/`outbound` to anything.
#[must_use]
pub fn inert_materializer() -> Materializer {
    Arc::new(|flow: PartyFlow| flow.kill_switch)
}
