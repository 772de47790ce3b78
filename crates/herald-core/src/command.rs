//! Control-message command router
//!
//! Inbound chat text of the form `/verb args` is parsed, dispatched to the
//! store / membership / broadcast layers, and answered with a reply to the
//! sender. Every message gets exactly one reply; failures become reply text.

use std::fmt::Write as _;

use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::channel::{self, Channel};
use crate::error::{Error, ErrorKind, Result};
use crate::membership;
use crate::store::ChannelStore;
use crate::types::{IncomingMessage, OutgoingMessage};

/// Leading marker that turns chat text into a command
pub const COMMAND_PREFIX: char = '/';

/// Verbs understood by the router
pub mod verbs {
    pub const NEW: &str = "new";
    pub const FOLLOW: &str = "follow";
    pub const UNFOLLOW: &str = "unfollow";
    pub const LIST: &str = "list";
    pub const TOKEN: &str = "token";
    pub const MYID: &str = "myid";
    pub const CHANNEL_USERS: &str = "channel_users";
    pub const CHANNEL_KICK: &str = "channel_kick";
    pub const SEND: &str = "send";
    pub const HELP: &str = "help";
    pub const START: &str = "start";
}

const HELP_TEXT: &str = "available commands:
/follow <channel> - receive messages published to a channel
/unfollow <channel> - stop receiving a channel
/list - channels you own and follow
/myid - your chat id
/token <channel> - show a channel token (owner)
/channel_users <channel> - list followers (owner)
/channel_kick <channel> <user_id> - remove a follower (owner)
/send <channel> <message> - broadcast to your followers (owner)
/new <channel> - create a channel (admin)";

/// A parsed `/verb args` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    pub verb: &'a str,
    pub args: &'a str,
}

/// Split `/verb@bot args` into verb and trimmed args.
///
/// Returns `None` for text that is not a command.
pub fn parse_command(text: &str) -> Option<Command<'_>> {
    let rest = text.trim_start().strip_prefix(COMMAND_PREFIX)?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let verb = head.split_once('@').map_or(head, |(verb, _bot)| verb);
    Some(Command { verb, args })
}

/// Maps control messages to channel operations and formats the replies
#[derive(Clone)]
pub struct CommandRouter {
    store: ChannelStore,
    broadcaster: Broadcaster,
    admin_id: i64,
}

impl CommandRouter {
    pub fn new(store: ChannelStore, broadcaster: Broadcaster, admin_id: i64) -> Self {
        Self {
            store,
            broadcaster,
            admin_id,
        }
    }

    /// Handle one control message and build the reply for its sender
    pub async fn handle(&self, msg: &IncomingMessage) -> OutgoingMessage {
        let Some(cmd) = parse_command(&msg.text) else {
            debug!("Non-command message from {}", msg.sender_id);
            return OutgoingMessage::reply(msg, "I can only process command now.");
        };

        info!("Command /{} from {} ({})", cmd.verb, msg.sender_id, msg.sender_name);

        let actor = msg.sender_id;
        let reply = match cmd.verb {
            verbs::NEW => self.new_channel(actor, &msg.sender_name, cmd.args).await,
            verbs::FOLLOW => self.follow(actor, cmd.args).await,
            verbs::UNFOLLOW => self.unfollow(actor, cmd.args).await,
            verbs::LIST => self.list(actor).await,
            verbs::TOKEN => self.token(actor, cmd.args).await,
            verbs::MYID => Ok(actor.to_string()),
            verbs::CHANNEL_USERS => self.channel_users(actor, cmd.args).await,
            verbs::CHANNEL_KICK => self.channel_kick(actor, cmd.args).await,
            verbs::SEND => self.send(actor, cmd.args).await,
            verbs::HELP | verbs::START => Ok(HELP_TEXT.to_string()),
            _ => Ok("command not defined".to_string()),
        };

        let text = reply.unwrap_or_else(|e| {
            if e.kind() == ErrorKind::StoreUnavailable {
                warn!("/{} from {} failed: {:?}", cmd.verb, actor, e);
            } else {
                debug!("/{} from {} rejected: {}", cmd.verb, actor, e);
            }
            failure_text(cmd.verb, &e)
        });
        OutgoingMessage::reply(msg, text)
    }

    async fn new_channel(&self, actor: i64, actor_name: &str, args: &str) -> Result<String> {
        if !channel::check_name(args) {
            return Err(Error::validation("name only accept [a-zA-Z0-9_]"));
        }
        if actor != self.admin_id {
            return Err(Error::NotAdmin);
        }

        let ch = Channel::new(args, actor, actor_name);
        self.store.create(&ch).await?;
        Ok(format!("create channel ok\nID: {}\ntoken: {}", ch.id, ch.token))
    }

    async fn follow(&self, actor: i64, args: &str) -> Result<String> {
        let ch = self.existing(args).await?;
        let updated = membership::follow(&ch, actor)?;
        self.store.update(&updated).await?;
        Ok(format!("followed {}", updated.id))
    }

    async fn unfollow(&self, actor: i64, args: &str) -> Result<String> {
        let ch = self.existing(args).await?;
        let updated = membership::unfollow(&ch, actor)?;
        self.store.update(&updated).await?;
        Ok(format!("unfollowed {}", updated.id))
    }

    async fn list(&self, actor: i64) -> Result<String> {
        let channels = self.store.list().await?;

        let owned = channels.iter().filter(|ch| ch.is_owner(actor));
        let followed = channels.iter().filter(|ch| ch.is_following(actor));

        let mut lines = vec!["owned channel: ".to_string()];
        lines.extend(owned.map(|ch| ch.id.clone()));
        lines.push(String::new());
        lines.push("followed channel: ".to_string());
        lines.extend(followed.map(|ch| ch.id.clone()));
        Ok(lines.join("\n"))
    }

    async fn token(&self, actor: i64, args: &str) -> Result<String> {
        let ch = self.owned(actor, args).await?;
        Ok(format!("token: {}", ch.token))
    }

    async fn channel_users(&self, actor: i64, args: &str) -> Result<String> {
        let ch = self.owned(actor, args).await?;
        Ok(member_list("channel members: \n\n", &ch.users))
    }

    async fn channel_kick(&self, actor: i64, args: &str) -> Result<String> {
        let params: Vec<&str> = args.split_whitespace().collect();
        let [name, target] = params[..] else {
            return Err(Error::validation(
                "wrong params, channel_kick [channel_name] [user_id]",
            ));
        };
        let target: i64 = target
            .parse()
            .map_err(|_| Error::validation("params parse failed"))?;

        let ch = self.existing(name).await?;
        let updated = membership::kick(&ch, actor, target)?;
        self.store.update(&updated).await?;

        info!("User {} kicked from {} by {}", target, updated.id, actor);
        Ok(member_list(" current channel members: \n", &updated.users))
    }

    async fn send(&self, actor: i64, args: &str) -> Result<String> {
        let Some((name, text)) = args.split_once(char::is_whitespace) else {
            return Err(Error::validation("wrong params, send [channel_name] [message]"));
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("wrong params, send [channel_name] [message]"));
        }

        let ch = self.owned(actor, name).await?;
        let delivered = self.broadcaster.broadcast(&ch, text).await;
        Ok(format!("ok, send to {} user", delivered))
    }

    /// Fetch a channel named by the command argument, mapping absence to `NotFound`
    async fn existing(&self, name: &str) -> Result<Channel> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("channel name can't empty"));
        }
        self.store.get(name).await?.ok_or(Error::NotFound)
    }

    async fn owned(&self, actor: i64, name: &str) -> Result<Channel> {
        let ch = self.existing(name).await?;
        if !ch.is_owner(actor) {
            return Err(Error::NotOwner);
        }
        Ok(ch)
    }
}

fn member_list(header: &str, users: &[i64]) -> String {
    let mut s = String::from(header);
    for id in users {
        let _ = writeln!(s, " {}", id);
    }
    s.push_str("\n===End===\n");
    s
}

/// Reply text for a failed command, specialised per verb where the bot has
/// always used a more specific wording
fn failure_text(verb: &str, err: &Error) -> String {
    match (verb, err) {
        (verbs::UNFOLLOW, Error::SelfFollow) => "can't unfollow the channel you owned".to_string(),
        (verbs::CHANNEL_KICK, Error::NotFollowing) => "user not found".to_string(),
        (verbs::CHANNEL_USERS, Error::NotOwner) => "only owner can get user list".to_string(),
        (verbs::TOKEN, Error::NotOwner) => "only owner can fetch token".to_string(),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::testing::RecordingSender;
    use crate::memory::MemoryDocumentStore;
    use crate::store::{DocumentStore, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

    const ADMIN: i64 = 1000;
    const UNAVAILABLE: &str = "service unavailable, try again later";

    /// In-memory store whose reads and writes can be switched off independently
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryDocumentStore,
        reads_down: AtomicBool,
        writes_down: AtomicBool,
    }

    impl FlakyStore {
        fn check(flag: &AtomicBool) -> std::result::Result<(), StoreError> {
            if flag.load(Ordering::SeqCst) {
                return Err(StoreError::unavailable("connection reset"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn get(&self, id: &str) -> std::result::Result<Option<Value>, StoreError> {
            Self::check(&self.reads_down)?;
            self.inner.get(id).await
        }
        async fn list(&self) -> std::result::Result<Vec<Value>, StoreError> {
            Self::check(&self.reads_down)?;
            self.inner.list().await
        }
        async fn create_if_absent(&self, id: &str, record: Value) -> std::result::Result<(), StoreError> {
            Self::check(&self.writes_down)?;
            self.inner.create_if_absent(id, record).await
        }
        async fn update(&self, id: &str, record: Value) -> std::result::Result<(), StoreError> {
            Self::check(&self.writes_down)?;
            self.inner.update(id, record).await
        }
        async fn delete(&self, id: &str) -> std::result::Result<(), StoreError> {
            Self::check(&self.writes_down)?;
            self.inner.delete(id).await
        }
    }

    struct Harness {
        router: CommandRouter,
        store: ChannelStore,
        docs: Arc<FlakyStore>,
        sender: Arc<RecordingSender>,
        next_id: AtomicI32,
    }

    impl Harness {
        fn new() -> Self {
            let docs = Arc::new(FlakyStore::default());
            let store = ChannelStore::new(docs.clone());
            let sender = Arc::new(RecordingSender::default());
            let router = CommandRouter::new(store.clone(), Broadcaster::new(sender.clone()), ADMIN);
            Self {
                router,
                store,
                docs,
                sender,
                next_id: AtomicI32::new(1),
            }
        }

        fn reads_down(&self, down: bool) {
            self.docs.reads_down.store(down, Ordering::SeqCst);
        }

        fn writes_down(&self, down: bool) {
            self.docs.writes_down.store(down, Ordering::SeqCst);
        }

        async fn say(&self, from: i64, text: &str) -> String {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let msg = IncomingMessage {
                id,
                sender_id: from,
                sender_name: format!("user{}", from),
                text: text.to_string(),
                timestamp: Utc::now(),
            };
            let reply = self.router.handle(&msg).await;
            assert_eq!(reply.recipient, from);
            assert_eq!(reply.reply_to, Some(id));
            reply.text
        }

        async fn channel(&self, id: &str) -> Channel {
            self.store.get(id).await.unwrap().unwrap()
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("/follow news"),
            Some(Command { verb: "follow", args: "news" })
        );
        assert_eq!(
            parse_command("/follow@herald_bot   news  "),
            Some(Command { verb: "follow", args: "news" })
        );
        assert_eq!(parse_command("/list"), Some(Command { verb: "list", args: "" }));
        assert_eq!(
            parse_command("/channel_kick news 42"),
            Some(Command { verb: "channel_kick", args: "news 42" })
        );
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(""), None);
    }

    #[tokio::test]
    async fn test_non_command() {
        let h = Harness::new();
        assert_eq!(h.say(5, "hi there").await, "I can only process command now.");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let h = Harness::new();
        assert_eq!(h.say(5, "/dance").await, "command not defined");
    }

    #[tokio::test]
    async fn test_myid() {
        let h = Harness::new();
        assert_eq!(h.say(4242, "/myid").await, "4242");
    }

    #[tokio::test]
    async fn test_help() {
        let h = Harness::new();
        assert!(h.say(5, "/help").await.contains("/follow <channel>"));
        assert!(h.say(5, "/start").await.starts_with("available commands"));
    }

    #[tokio::test]
    async fn test_new_channel_by_admin() {
        let h = Harness::new();
        let reply = h.say(ADMIN, "/new news").await;
        let ch = h.channel("news").await;
        assert_eq!(reply, format!("create channel ok\nID: news\ntoken: {}", ch.token));
        assert_eq!(ch.owner, ADMIN);
        assert_eq!(ch.owner_name, format!("user{}", ADMIN));
    }

    #[tokio::test]
    async fn test_new_channel_rejections() {
        let h = Harness::new();
        assert_eq!(h.say(ADMIN, "/new bad name").await, "name only accept [a-zA-Z0-9_]");
        assert_eq!(h.say(ADMIN, "/new").await, "name only accept [a-zA-Z0-9_]");
        assert_eq!(h.say(7, "/new news").await, "only admin can create new channel");

        h.say(ADMIN, "/new news").await;
        let original = h.channel("news").await;
        assert_eq!(h.say(ADMIN, "/new news").await, "channel name exists");
        assert_eq!(h.channel("news").await, original);
    }

    #[tokio::test]
    async fn test_follow_unfollow_flow() {
        let h = Harness::new();
        h.say(ADMIN, "/new news").await;

        assert_eq!(h.say(7, "/follow news").await, "followed news");
        assert_eq!(h.say(7, "/follow news").await, "already followed");
        assert_eq!(h.say(8, "/follow news").await, "followed news");
        assert_eq!(h.channel("news").await.users, vec![7, 8]);

        assert_eq!(h.say(7, "/unfollow news").await, "unfollowed news");
        assert_eq!(h.say(7, "/unfollow news").await, "not followed");
        assert_eq!(h.channel("news").await.users, vec![8]);
    }

    #[tokio::test]
    async fn test_follow_errors() {
        let h = Harness::new();
        h.say(ADMIN, "/new news").await;
        assert_eq!(h.say(7, "/follow").await, "channel name can't empty");
        assert_eq!(h.say(7, "/follow ghost").await, "channel ID not exists");
        assert_eq!(h.say(ADMIN, "/follow news").await, "can't follow the channel you owned");
        assert_eq!(h.say(ADMIN, "/unfollow news").await, "can't unfollow the channel you owned");
        assert!(h.channel("news").await.users.is_empty());
    }

    #[tokio::test]
    async fn test_list_owned_then_followed() {
        let h = Harness::new();
        h.say(ADMIN, "/new alpha").await;
        h.say(ADMIN, "/new beta").await;
        h.say(7, "/follow beta").await;

        assert_eq!(
            h.say(ADMIN, "/list").await,
            "owned channel: \nalpha\nbeta\n\nfollowed channel: "
        );
        assert_eq!(h.say(7, "/list").await, "owned channel: \n\nfollowed channel: \nbeta");
    }

    #[tokio::test]
    async fn test_token_owner_only() {
        let h = Harness::new();
        h.say(ADMIN, "/new news").await;
        let token = h.channel("news").await.token;
        assert_eq!(h.say(ADMIN, "/token news").await, format!("token: {}", token));
        assert_eq!(h.say(7, "/token news").await, "only owner can fetch token");
        assert_eq!(h.say(ADMIN, "/token ghost").await, "channel ID not exists");
    }

    #[tokio::test]
    async fn test_channel_users() {
        let h = Harness::new();
        h.say(ADMIN, "/new news").await;
        h.say(7, "/follow news").await;
        h.say(8, "/follow news").await;

        assert_eq!(
            h.say(ADMIN, "/channel_users news").await,
            "channel members: \n\n 7\n 8\n\n===End===\n"
        );
        assert_eq!(h.say(7, "/channel_users news").await, "only owner can get user list");
    }

    #[tokio::test]
    async fn test_channel_kick() {
        let h = Harness::new();
        h.say(ADMIN, "/new news").await;
        h.say(7, "/follow news").await;
        h.say(8, "/follow news").await;

        assert_eq!(
            h.say(ADMIN, "/channel_kick news").await,
            "wrong params, channel_kick [channel_name] [user_id]"
        );
        assert_eq!(h.say(ADMIN, "/channel_kick news abc").await, "params parse failed");
        assert_eq!(h.say(8, "/channel_kick news 7").await, "only owner can do this");
        assert_eq!(h.channel("news").await.users, vec![7, 8]);
        assert_eq!(h.say(ADMIN, "/channel_kick news 99").await, "user not found");

        assert_eq!(
            h.say(ADMIN, "/channel_kick news 7").await,
            " current channel members: \n 8\n\n===End===\n"
        );
        assert_eq!(h.channel("news").await.users, vec![8]);
    }

    #[tokio::test]
    async fn test_send_from_chat_has_no_attribution() {
        let h = Harness::new();
        h.say(ADMIN, "/new news").await;
        h.say(7, "/follow news").await;

        assert_eq!(h.say(7, "/send news hello").await, "only owner can do this");
        assert!(h.sender.messages().is_empty());

        assert_eq!(h.say(ADMIN, "/send news hello all").await, "ok, send to 2 user");
        let sent = h.sender.messages();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.text == "hello all"));

        assert_eq!(
            h.say(ADMIN, "/send news").await,
            "wrong params, send [channel_name] [message]"
        );
    }

    #[tokio::test]
    async fn test_store_down_on_read() {
        let h = Harness::new();
        h.say(ADMIN, "/new news").await;
        h.say(7, "/follow news").await;

        h.reads_down(true);
        assert_eq!(h.say(8, "/follow news").await, UNAVAILABLE);
        assert_eq!(h.say(ADMIN, "/channel_kick news 7").await, UNAVAILABLE);
        assert_eq!(h.say(7, "/list").await, UNAVAILABLE);
        assert_eq!(h.say(ADMIN, "/send news hi").await, UNAVAILABLE);
        assert!(h.sender.messages().is_empty());

        h.reads_down(false);
        assert_eq!(h.channel("news").await.users, vec![7]);
    }

    #[tokio::test]
    async fn test_store_down_on_write_leaves_membership() {
        let h = Harness::new();
        h.say(ADMIN, "/new news").await;
        h.say(7, "/follow news").await;

        h.writes_down(true);
        assert_eq!(h.say(8, "/follow news").await, UNAVAILABLE);
        assert_eq!(h.say(7, "/unfollow news").await, UNAVAILABLE);
        assert_eq!(h.say(ADMIN, "/channel_kick news 7").await, UNAVAILABLE);
        assert_eq!(h.say(ADMIN, "/new other").await, UNAVAILABLE);
        assert_eq!(h.channel("news").await.users, vec![7]);
        assert!(h.store.get("other").await.unwrap().is_none());

        h.writes_down(false);
        assert_eq!(h.say(8, "/follow news").await, "followed news");
        assert_eq!(h.channel("news").await.users, vec![7, 8]);
    }
}
