pub mod response;

use std::collections::HashMap;

use actix::{Actor, Addr, Context, Handler, ResponseFuture};
use actix_rt::{Arbiter, ArbiterHandle};
use futures::stream::FuturesUnordered;
use rand::seq::SliceRandom;
use tokio_stream::StreamExt;
use tracing::{info, instrument, warn};

use crate::channel::{Channel, ListUsers};
use crate::config::Config;
use crate::errors::CoreError;
use crate::ids::{ChannelId, UserId};
use crate::messages::{
    Connect, Disconnect, DropChannel, FindChannel, GetUser, Join, Leave, List, NewChannel,
    ReadState, SetTopic, UpdateState,
};
use crate::party::{self, KillSwitch, Materializer, PartyFlow};
use crate::server::response::{ChannelInfo, ChannelListReply, JoinedChannel, ServerSnapshot, UserInfo};

/// A channel as the coordinator sees it: the actor reference plus the bits of `ChannelInfo` the
/// coordinator itself owns.
struct ChannelData {
    id: ChannelId,
    name: String,
    topic: String,
    actor: Addr<Channel>,
    /// Mirrors the number of `Some`-valued kill switches any user currently holds against this
    /// channel. Maintained synchronously by the coordinator (incremented/decremented in the
    /// same step that creates/destroys a kill switch) so that `NewChannel`/`FindChannel`/
    /// `GetUser` can report a live count without themselves becoming a suspension point; `List`
    /// instead asks the channel actors directly (see `Handler<List>` below) since it already
    /// suspends and the channel actor is the true owner of its subscriber set.
    live_count: usize,
}

/// A user as the coordinator sees it.
struct UserData {
    id: UserId,
    nick: String,
    email: Option<String>,
    materializer: Option<Materializer>,
    /// A `None` materializer ties to every value here being `None`; `Some` ties to every
    /// value being `Some`.
    channels: HashMap<ChannelId, Option<KillSwitch>>,
}

/// The compound state the coordinator serializes all mutations of. `pub(crate)` fields
/// so `UpdateState`'s raw mutator (internal/testing only, see `crate::messages`) can reach in.
#[derive(Default)]
pub struct ServerData {
    pub(crate) channels: HashMap<ChannelId, ChannelData>,
    pub(crate) users: HashMap<UserId, UserData>,
}

/// The single serial executor owning `ServerData`. Channel actors live on a small pool
/// of arbiters chosen at channel-creation time, so one channel's fan-out volume can't starve
/// another channel's mailbox or the coordinator's own.
pub struct Server {
    data: ServerData,
    config: Config,
    channel_arbiters: Vec<Arbiter>,
}

impl Server {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let channel_arbiters = build_arbiters(config.channel_threads.max(1));

        Self {
            data: ServerData::default(),
            config,
            channel_arbiters,
        }
    }

    fn pick_arbiter(&self) -> ArbiterHandle {
        self.channel_arbiters
            .choose(&mut rand::thread_rng())
            .map_or_else(Arbiter::current, Arbiter::handle)
    }

    fn spawn_channel(&self, id: ChannelId, name: String) -> Addr<Channel> {
        let arbiter = self.pick_arbiter();
        Channel::start_in_arbiter(&arbiter, move |_ctx| Channel::new(id, name))
    }

    fn channel_info(data: &ChannelData) -> ChannelInfo {
        ChannelInfo {
            id: data.id,
            name: data.name.clone(),
            topic: data.topic.clone(),
            user_count: data.live_count,
        }
    }

    fn user_info(&self, user: &UserData) -> UserInfo {
        let channels = user
            .channels
            .keys()
            .filter_map(|channel_id| {
                self.data.channels.get(channel_id).map(|data| JoinedChannel {
                    id: data.id,
                    name: data.name.clone(),
                })
            })
            .collect();

        UserInfo {
            id: user.id,
            nick: user.nick.clone(),
            email: user.email.clone(),
            channels,
        }
    }

    /// Inserts a brand-new, empty, valid-named channel and returns its id. Callers are
    /// responsible for having already checked the name is valid and unused.
    fn create_channel(&mut self, name: String) -> ChannelId {
        let id = ChannelId::new();
        let actor = self.spawn_channel(id, name.clone());

        self.data.channels.insert(
            id,
            ChannelData {
                id,
                name: name.clone(),
                topic: String::new(),
                actor,
                live_count: 0,
            },
        );

        info!(channel = %name, %id, "channel created");
        id
    }

    /// Builds a party flow against `channel_id` and runs the caller's materializer. Does not
    /// touch the channel's live count: a command that materializes more than one channel in a
    /// loop must not commit any count bump until every materialization in that command has
    /// succeeded, so that a panicking materializer partway through leaves no live subscription
    /// with no owning user behind. Callers commit the count via `commit_live_count` once they
    /// know the whole command is going through.
    fn materialize_party(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
        materializer: &Materializer,
    ) -> Result<KillSwitch, CoreError> {
        let channel_data = self
            .data
            .channels
            .get(&channel_id)
            .ok_or(CoreError::ChannelNotFound)?;

        let flow = party::build(
            channel_data.actor.clone(),
            user_id,
            self.config.outbound_buffer_capacity,
        );
        invoke_materializer(materializer, flow)
    }

    /// Bumps a channel's live count after a materialized subscription for it has been
    /// committed. The channel may already be gone if this races a drop; nothing to bump then.
    fn commit_live_count(&mut self, channel_id: ChannelId) {
        if let Some(data) = self.data.channels.get_mut(&channel_id) {
            data.live_count += 1;
        }
    }

    /// Shuts `kill_switch` down (idempotent) and decrements the channel's live count if it
    /// still exists (it may not, if this is running as part of tearing the channel down).
    fn sever(&mut self, channel_id: ChannelId, kill_switch: &KillSwitch) {
        kill_switch.shutdown();

        if let Some(data) = self.data.channels.get_mut(&channel_id) {
            data.live_count = data.live_count.saturating_sub(1);
        }
    }
}

/// Invokes a caller-supplied materializer, catching a panic the way an unexpected channel actor
/// crash would also be caught at this boundary rather than taking the coordinator down with it.
fn invoke_materializer(materializer: &Materializer, flow: PartyFlow) -> Result<KillSwitch, CoreError> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| materializer(flow))).map_err(|_| {
        tracing::error!("materializer panicked while attaching a party flow");
        CoreError::Internal("materializer panicked while attaching a party flow".to_string())
    })
}

#[must_use]
pub fn build_arbiters(count: usize) -> Vec<Arbiter> {
    std::iter::repeat_with(Arbiter::new).take(count).collect()
}

/// First character must be a letter, and the name must be non-empty.
fn is_valid_channel_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_alphabetic)
}

impl Actor for Server {
    type Context = Context<Self>;
}

/// Restarting the coordinator after a panic starts it back up with empty `ServerData` rather
/// than refusing to restart at all; `main.rs` hosts it under a `Supervisor` for exactly this.
impl actix::Supervised for Server {}

impl Handler<List> for Server {
    type Result = ResponseFuture<ChannelListReply>;

    #[instrument(parent = &msg.span, skip_all)]
    fn handle(&mut self, msg: List, _ctx: &mut Self::Context) -> Self::Result {
        let channels: Vec<_> = self
            .data
            .channels
            .values()
            .map(|data| (data.id, data.name.clone(), data.topic.clone(), data.actor.clone()))
            .collect();

        Box::pin(async move {
            let mut pending = channels
                .into_iter()
                .map(|(id, name, topic, actor)| async move {
                    let user_count = match actor.send(ListUsers).await {
                        Ok(users) => users.len(),
                        Err(error) => {
                            warn!(%id, %error, "channel actor unreachable while listing, reporting 0 live users");
                            0
                        }
                    };

                    ChannelInfo {
                        id,
                        name,
                        topic,
                        user_count,
                    }
                })
                .collect::<FuturesUnordered<_>>();

            let mut channels = Vec::new();
            while let Some(info) = pending.next().await {
                channels.push(info);
            }

            ChannelListReply { channels }
        })
    }
}

impl Handler<NewChannel> for Server {
    type Result = Result<ChannelInfo, CoreError>;

    #[instrument(parent = &msg.span, skip_all)]
    fn handle(&mut self, msg: NewChannel, _ctx: &mut Self::Context) -> Self::Result {
        if let Some(existing) = self.data.channels.values().find(|data| data.name == msg.name) {
            return Ok(Self::channel_info(existing));
        }

        if !is_valid_channel_name(&msg.name) {
            return Err(CoreError::InvalidChannelName);
        }

        let id = self.create_channel(msg.name);
        Ok(Self::channel_info(&self.data.channels[&id]))
    }
}

impl Handler<FindChannel> for Server {
    type Result = Result<ChannelInfo, CoreError>;

    #[instrument(parent = &msg.span, skip_all)]
    fn handle(&mut self, msg: FindChannel, _ctx: &mut Self::Context) -> Self::Result {
        self.data
            .channels
            .values()
            .find(|data| data.name == msg.name)
            .map(Self::channel_info)
            .ok_or(CoreError::ChannelNotFoundByName)
    }
}

impl Handler<SetTopic> for Server {
    type Result = Result<(), CoreError>;

    #[instrument(parent = &msg.span, skip_all)]
    fn handle(&mut self, msg: SetTopic, _ctx: &mut Self::Context) -> Self::Result {
        let data = self
            .data
            .channels
            .get_mut(&msg.channel_id)
            .ok_or(CoreError::ChannelNotFound)?;

        data.topic = msg.topic;
        Ok(())
    }
}

impl Handler<DropChannel> for Server {
    type Result = Result<(), CoreError>;

    #[instrument(parent = &msg.span, skip_all)]
    fn handle(&mut self, msg: DropChannel, _ctx: &mut Self::Context) -> Self::Result {
        let removed = self
            .data
            .channels
            .remove(&msg.channel_id)
            .ok_or(CoreError::ChannelNotFound)?;

        for user in self.data.users.values_mut() {
            if let Some(Some(kill_switch)) = user.channels.remove(&msg.channel_id) {
                kill_switch.shutdown();
            }
        }

        info!(channel = %removed.name, id = %removed.id, "channel dropped");
        Ok(())
    }
}

impl Handler<Connect> for Server {
    type Result = Result<UserInfo, CoreError>;

    #[instrument(parent = &msg.span, skip_all)]
    fn handle(&mut self, msg: Connect, _ctx: &mut Self::Context) -> Self::Result {
        if self.data.users.values().any(|user| user.nick == msg.nick) {
            return Err(CoreError::NickAlreadyExists);
        }

        let id = UserId::new();

        // Unknown channel ids are silently dropped from the initial subscription list: only
        // ids that name an existing channel end up in `channels`. Every materialization is
        // staged before anything is committed, so a materializer that fails partway through a
        // multi-channel connect leaves no bumped live count or orphaned party flow behind --
        // the rolled-back switches are shut down and the command reports the failure as if it
        // had never touched the channels it already got to.
        let mut staged: Vec<(ChannelId, Option<KillSwitch>)> = Vec::with_capacity(msg.channels.len());

        for channel_id in msg.channels {
            if !self.data.channels.contains_key(&channel_id) {
                continue;
            }

            match &msg.materializer {
                Some(materializer) => match self.materialize_party(channel_id, id, materializer) {
                    Ok(kill_switch) => staged.push((channel_id, Some(kill_switch))),
                    Err(error) => {
                        for (_, kill_switch) in staged {
                            if let Some(kill_switch) = kill_switch {
                                kill_switch.shutdown();
                            }
                        }
                        return Err(error);
                    }
                },
                None => staged.push((channel_id, None)),
            }
        }

        let mut channels = HashMap::with_capacity(staged.len());
        for (channel_id, kill_switch) in staged {
            if kill_switch.is_some() {
                self.commit_live_count(channel_id);
            }
            channels.insert(channel_id, kill_switch);
        }

        let user = UserData {
            id,
            nick: msg.nick,
            email: msg.email,
            materializer: msg.materializer,
            channels,
        };

        info!(nick = %user.nick, %id, "user connected");
        let info = self.user_info(&user);
        self.data.users.insert(id, user);
        Ok(info)
    }
}

impl Handler<Disconnect> for Server {
    type Result = Result<(), CoreError>;

    #[instrument(parent = &msg.span, skip_all)]
    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) -> Self::Result {
        let user = self.data.users.remove(&msg.user_id).ok_or(CoreError::UserNotFound)?;

        for (channel_id, kill_switch) in user.channels {
            if let Some(kill_switch) = kill_switch {
                self.sever(channel_id, &kill_switch);
            }
        }

        info!(nick = %user.nick, id = %user.id, "user disconnected");
        Ok(())
    }
}

impl Handler<Join> for Server {
    type Result = Result<(), CoreError>;

    #[instrument(parent = &msg.span, skip_all)]
    fn handle(&mut self, msg: Join, _ctx: &mut Self::Context) -> Self::Result {
        if !self.data.users.contains_key(&msg.user_id) {
            return Err(CoreError::UserNotFound);
        }

        let (channel_id, created) = match self
            .data
            .channels
            .values()
            .find(|data| data.name == msg.channel_name)
        {
            Some(data) => (data.id, false),
            None => {
                if !is_valid_channel_name(&msg.channel_name) {
                    return Err(CoreError::InvalidChannelName);
                }

                (self.create_channel(msg.channel_name), true)
            }
        };

        if self.data.users[&msg.user_id].channels.contains_key(&channel_id) {
            return Err(CoreError::AlreadyJoined);
        }

        let materializer = self.data.users[&msg.user_id].materializer.clone();
        let kill_switch = match &materializer {
            Some(materializer) => match self.materialize_party(channel_id, msg.user_id, materializer) {
                Ok(kill_switch) => Some(kill_switch),
                Err(error) => {
                    // A channel this command auto-created must not survive a failed join --
                    // otherwise a panicking materializer leaves an orphan channel behind.
                    if created {
                        self.data.channels.remove(&channel_id);
                    }
                    return Err(error);
                }
            },
            None => None,
        };

        if kill_switch.is_some() {
            self.commit_live_count(channel_id);
        }

        self.data
            .users
            .get_mut(&msg.user_id)
            .expect("checked above")
            .channels
            .insert(channel_id, kill_switch);

        Ok(())
    }
}

impl Handler<Leave> for Server {
    type Result = Result<(), CoreError>;

    #[instrument(parent = &msg.span, skip_all)]
    fn handle(&mut self, msg: Leave, _ctx: &mut Self::Context) -> Self::Result {
        let user = self.data.users.get_mut(&msg.user_id).ok_or(CoreError::UserNotFound)?;

        let kill_switch = user.channels.remove(&msg.channel_id).ok_or(CoreError::NotJoined)?;

        if let Some(kill_switch) = kill_switch {
            self.sever(msg.channel_id, &kill_switch);
        }

        Ok(())
    }
}

impl Handler<GetUser> for Server {
    type Result = Result<UserInfo, CoreError>;

    #[instrument(parent = &msg.span, skip_all)]
    fn handle(&mut self, msg: GetUser, _ctx: &mut Self::Context) -> Self::Result {
        let user = self.data.users.get(&msg.user_id).ok_or(CoreError::UserNotFound)?;
        Ok(self.user_info(user))
    }
}

impl Handler<ReadState> for Server {
    type Result = ServerSnapshot;

    fn handle(&mut self, _msg: ReadState, _ctx: &mut Self::Context) -> Self::Result {
        ServerSnapshot {
            channels: self.data.channels.values().map(Self::channel_info).collect(),
            users: self.data.users.values().map(|user| self.user_info(user)).collect(),
        }
    }
}

impl Handler<UpdateState> for Server {
    type Result = ();

    fn handle(&mut self, msg: UpdateState, _ctx: &mut Self::Context) -> Self::Result {
        (msg.mutator)(&mut self.data);
    }
}

#[cfg(test)]
mod test {
    use super::{build_arbiters, Server};
    use crate::config::Config;
    use crate::errors::CoreError;
    use crate::ids::ChannelId;
    use crate::messages::{
        Connect, Disconnect, DropChannel, FindChannel, GetUser, Join, Leave, List, NewChannel,
        ReadState, SetTopic,
    };
    use crate::party::{inert_materializer, Materializer, PartyFlow};
    use actix::Actor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing::Span;

    fn server() -> actix::Addr<Server> {
        Server::new(Config::default()).start()
    }

    /// A materializer that panics on its `n`th invocation (1-indexed) and hands back the
    /// flow's own kill switch on every other call, for exercising the rollback path of a
    /// materializer that fails partway through a multi-channel command.
    fn panics_on_nth_materializer(n: usize) -> Materializer {
        let calls = AtomicUsize::new(0);
        Arc::new(move |flow: PartyFlow| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            assert_ne!(call, n, "materializer intentionally failing for test");
            flow.kill_switch
        })
    }

    #[actix_rt::test]
    async fn empty_start_lists_no_channels() {
        let server = server();
        let reply = server.send(List { span: Span::current() }).await.unwrap();
        assert!(reply.channels.is_empty());
    }

    #[actix_rt::test]
    async fn new_channel_is_idempotent_by_name() {
        let server = server();

        let first = server
            .send(NewChannel {
                name: "hardware".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.name, "hardware");
        assert_eq!(first.user_count, 0);

        let second = server
            .send(NewChannel {
                name: "hardware".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.id, first.id);
    }

    #[actix_rt::test]
    async fn new_channel_rejects_invalid_names() {
        let server = server();

        for name in ["", "1bad"] {
            let error = server
                .send(NewChannel {
                    name: name.to_string(),
                    span: Span::current(),
                })
                .await
                .unwrap()
                .unwrap_err();
            assert_eq!(error, CoreError::InvalidChannelName);
        }

        let reply = server.send(List { span: Span::current() }).await.unwrap();
        assert!(reply.channels.is_empty());
    }

    #[actix_rt::test]
    async fn connect_rejects_duplicate_nick() {
        let server = server();

        let first = server
            .send(Connect {
                nick: "alice".to_string(),
                email: None,
                materializer: None,
                channels: vec![],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.nick, "alice");
        assert!(first.channels.is_empty());

        let error = server
            .send(Connect {
                nick: "alice".to_string(),
                email: None,
                materializer: None,
                channels: vec![],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(error, CoreError::NickAlreadyExists);
    }

    #[actix_rt::test]
    async fn leave_then_leave_again_fails() {
        let server = server();

        let cats = server
            .send(NewChannel {
                name: "cats".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let bob = server
            .send(Connect {
                nick: "bob".to_string(),
                email: None,
                materializer: None,
                channels: vec![cats.id],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.channels.len(), 1);
        assert_eq!(bob.channels[0].name, "cats");

        server
            .send(Leave {
                user_id: bob.id,
                channel_id: cats.id,
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let error = server
            .send(Leave {
                user_id: bob.id,
                channel_id: cats.id,
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(error, CoreError::NotJoined);
    }

    #[actix_rt::test]
    async fn drop_channel_clears_every_members_subscription() {
        let server = server();

        let c = server
            .send(Connect {
                nick: "c".to_string(),
                email: None,
                materializer: None,
                channels: vec![],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        server
            .send(Join {
                user_id: c.id,
                channel_name: "newchan".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let newchan = server
            .send(FindChannel {
                name: "newchan".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        server
            .send(DropChannel {
                channel_id: newchan.id,
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let user = server
            .send(GetUser {
                user_id: c.id,
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert!(user.channels.is_empty());
    }

    #[actix_rt::test]
    async fn drop_channel_is_idempotent() {
        let server = server();

        let channel = server
            .send(NewChannel {
                name: "hardware".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        server
            .send(DropChannel {
                channel_id: channel.id,
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let error = server
            .send(DropChannel {
                channel_id: channel.id,
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(error, CoreError::ChannelNotFound);
    }

    #[actix_rt::test]
    async fn connect_then_disconnect_round_trips() {
        let server = server();

        let before = server.send(ReadState).await.unwrap();

        let user = server
            .send(Connect {
                nick: "headless".to_string(),
                email: None,
                materializer: None,
                channels: vec![],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        server
            .send(Disconnect {
                user_id: user.id,
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let after = server.send(ReadState).await.unwrap();
        assert_eq!(before.users.len(), after.users.len());
        assert_eq!(before.channels.len(), after.channels.len());
    }

    #[actix_rt::test]
    async fn join_then_leave_restores_the_users_channel_map() {
        let server = server();

        let user = server
            .send(Connect {
                nick: "p7".to_string(),
                email: None,
                materializer: None,
                channels: vec![],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let channel = server
            .send(NewChannel {
                name: "topical".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        server
            .send(Join {
                user_id: user.id,
                channel_name: channel.name.clone(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        server
            .send(Leave {
                user_id: user.id,
                channel_id: channel.id,
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let after = server
            .send(GetUser {
                user_id: user.id,
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert!(after.channels.is_empty());
    }

    #[actix_rt::test]
    async fn join_the_same_channel_twice_is_rejected() {
        let server = server();

        let user = server
            .send(Connect {
                nick: "joiner".to_string(),
                email: None,
                materializer: None,
                channels: vec![],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        server
            .send(Join {
                user_id: user.id,
                channel_name: "lounge".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let error = server
            .send(Join {
                user_id: user.id,
                channel_name: "lounge".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(error, CoreError::AlreadyJoined);
    }

    #[actix_rt::test]
    async fn connect_silently_drops_unknown_channel_ids() {
        let server = server();

        let user = server
            .send(Connect {
                nick: "ghost-follower".to_string(),
                email: None,
                materializer: None,
                channels: vec![ChannelId::new()],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        assert!(user.channels.is_empty());
    }

    // live subscriber counts come from the materializer actually being live, not headless.
    #[actix_rt::test]
    async fn live_join_increments_channel_user_count() {
        let server = server();

        let channel = server
            .send(NewChannel {
                name: "counted".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let user = server
            .send(Connect {
                nick: "live-user".to_string(),
                email: None,
                materializer: Some(inert_materializer()),
                channels: vec![channel.id],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.channels.len(), 1);

        let refreshed = server
            .send(FindChannel {
                name: "counted".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.user_count, 1);

        server
            .send(Disconnect {
                user_id: user.id,
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let after = server
            .send(FindChannel {
                name: "counted".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.user_count, 0);
    }

    #[actix_rt::test]
    async fn set_topic_requires_an_existing_channel() {
        let server = server();

        let error = server
            .send(SetTopic {
                channel_id: ChannelId::new(),
                topic: "whatever".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(error, CoreError::ChannelNotFound);

        let channel = server
            .send(NewChannel {
                name: "topicful".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        server
            .send(SetTopic {
                channel_id: channel.id,
                topic: "now with a topic".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let refreshed = server
            .send(FindChannel {
                name: "topicful".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.topic, "now with a topic");
    }

    #[test]
    fn build_arbiters_respects_the_requested_count() {
        let _system = actix_rt::System::new();
        assert_eq!(build_arbiters(3).len(), 3);
    }

    #[actix_rt::test]
    async fn connect_rolls_back_staged_joins_when_materializer_fails() {
        let server = server();

        let alpha = server
            .send(NewChannel {
                name: "alpha".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        let beta = server
            .send(NewChannel {
                name: "beta".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let error = server
            .send(Connect {
                nick: "flaky".to_string(),
                email: None,
                materializer: Some(panics_on_nth_materializer(2)),
                channels: vec![alpha.id, beta.id],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(error, CoreError::Internal(_)));

        let snapshot = server.send(ReadState).await.unwrap();
        assert!(!snapshot.users.iter().any(|user| user.nick == "flaky"));

        let alpha_after = server
            .send(FindChannel {
                name: "alpha".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alpha_after.user_count, 0);

        let beta_after = server
            .send(FindChannel {
                name: "beta".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(beta_after.user_count, 0);
    }

    #[actix_rt::test]
    async fn join_rolls_back_an_auto_created_channel_when_materializer_fails() {
        let server = server();

        let user = server
            .send(Connect {
                nick: "flaky-joiner".to_string(),
                email: None,
                materializer: Some(panics_on_nth_materializer(1)),
                channels: vec![],
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap();

        let error = server
            .send(Join {
                user_id: user.id,
                channel_name: "freshroom".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(error, CoreError::Internal(_)));

        let error = server
            .send(FindChannel {
                name: "freshroom".to_string(),
                span: Span::current(),
            })
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(error, CoreError::ChannelNotFoundByName);
    }
}
