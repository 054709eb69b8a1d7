//! The `join #chan` / `part #chan` meta-command.
//!
//! The meta-command is an ordinary [`HandlerDescriptor`] scoped to the bot's
//! control channel and registered before any manifest is loaded. Its handler
//! does no I/O: it turns the match into a [`ControlCommand`] and queues it.
//!
//! The queue is drained by a single [`ChannelControl`] worker, which is the
//! only writer of the channel list. For each command it:
//!
//! 1. updates the channel list in the store,
//! 2. persists the store,
//! 3. asks the membership transport to join or part,
//! 4. queues a confirmation in the channel the command came from.
//!
//! A failed persist stops the command before the transport is touched. A
//! `part` of the control channel itself is refused before step 1.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vsim_core::{BoxedChannelStore, BoxedTransportClient, Transport};

use crate::context::{OutboundMessage, Outbox};
use crate::descriptor::HandlerDescriptor;
use crate::error::{ControlError, HandlerError, HandlerResult, LoadResult};
use crate::handler::{HandlerCall, handler_fn};

/// Name of the meta-command descriptor.
pub const META_HANDLER_NAME: &str = "meta.membership";

/// Pattern of the meta-command. Group 1 is the verb, group 2 the channel.
pub const META_PATTERN: &str = r"^\s*(join|part)\s+(#[^\s,]+)\s*$";

/// Join or leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipAction {
    Join,
    Part,
}

impl MembershipAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Part => "part",
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            Self::Join => "Joined",
            Self::Part => "Left",
        }
    }
}

impl fmt::Display for MembershipAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued channel-membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    pub action: MembershipAction,
    /// Channel to join or leave.
    pub channel: String,
    /// Transport the confirmation goes back on.
    pub reply_transport: Transport,
    /// Channel the confirmation goes to.
    pub reply_to: String,
    /// Who asked for the change.
    pub requested_by: String,
}

impl ControlCommand {
    pub fn new(
        action: MembershipAction,
        channel: impl Into<String>,
        reply_transport: Transport,
        reply_to: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            action,
            channel: channel.into(),
            reply_transport,
            reply_to: reply_to.into(),
            requested_by: requested_by.into(),
        }
    }

    pub fn join(
        channel: impl Into<String>,
        reply_transport: Transport,
        reply_to: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self::new(MembershipAction::Join, channel, reply_transport, reply_to, requested_by)
    }

    pub fn part(
        channel: impl Into<String>,
        reply_transport: Transport,
        reply_to: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self::new(MembershipAction::Part, channel, reply_transport, reply_to, requested_by)
    }
}

/// Builds the meta-command descriptor for `control_channel`.
pub fn meta_descriptor(control_channel: &str) -> LoadResult<HandlerDescriptor> {
    HandlerDescriptor::builder(META_HANDLER_NAME)
        .on_message()
        .pattern(META_PATTERN)
        .channel(control_channel)
        .handler(handler_fn(meta_handler))
        .build()
}

fn meta_handler(call: &HandlerCall<'_>) -> HandlerResult {
    let action = match call.groups.get(1).map(str::to_ascii_lowercase).as_deref() {
        Some("join") => MembershipAction::Join,
        Some("part") => MembershipAction::Part,
        other => return Err(HandlerError::failed(format!("unexpected verb {other:?}"))),
    };
    let channel = call
        .groups
        .get(2)
        .ok_or_else(|| HandlerError::failed("missing channel"))?;

    debug!(action = %action, channel, sender = call.sender, "Queueing membership change");
    call.ctx.control(ControlCommand::new(
        action,
        channel,
        call.transport,
        call.reply_to,
        call.sender,
    ))
}

/// The single writer of the channel list.
pub struct ChannelControl {
    store: BoxedChannelStore,
    membership: BoxedTransportClient,
    outbox: Outbox,
    control_channel: Option<String>,
}

impl ChannelControl {
    /// Creates a worker that changes membership through `membership`.
    pub fn new(store: BoxedChannelStore, membership: BoxedTransportClient, outbox: Outbox) -> Self {
        Self {
            store,
            membership,
            outbox,
            control_channel: None,
        }
    }

    /// Refuses `part` requests for `channel`.
    pub fn with_control_channel(mut self, channel: impl Into<String>) -> Self {
        self.control_channel = Some(channel.into());
        self
    }

    fn is_control_channel(&self, channel: &str) -> bool {
        self.control_channel
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(channel))
    }

    fn confirm(&self, command: &ControlCommand, text: String) {
        let message = OutboundMessage {
            transport: command.reply_transport,
            target: command.reply_to.clone(),
            text,
        };
        if self.outbox.send(message).is_err() {
            debug!("Outbox closed, confirmation dropped");
        }
    }

    /// Applies one command: update, persist, join/part, confirm.
    pub async fn apply(&self, command: &ControlCommand) -> Result<(), ControlError> {
        if command.action == MembershipAction::Part && self.is_control_channel(&command.channel) {
            self.confirm(command, format!("I cannot leave the control channel {}", command.channel));
            return Err(ControlError::ControlChannel(command.channel.clone()));
        }

        let mut channels = self.store.channels();
        let listed = channels
            .iter()
            .position(|c| c.eq_ignore_ascii_case(&command.channel));
        match (command.action, listed) {
            (MembershipAction::Join, None) => channels.push(command.channel.clone()),
            (MembershipAction::Part, Some(index)) => {
                channels.remove(index);
            }
            _ => {}
        }
        self.store.set_channels(channels);

        self.store.persist().await?;

        match command.action {
            MembershipAction::Join => self.membership.join(&command.channel).await?,
            MembershipAction::Part => self.membership.part(&command.channel).await?,
        }

        info!(
            action = %command.action,
            channel = %command.channel,
            requested_by = %command.requested_by,
            "Channel membership changed"
        );

        self.confirm(
            command,
            format!("{} {}", command.action.past_tense(), command.channel),
        );
        Ok(())
    }

    /// Applies queued commands one at a time until the queue closes or
    /// `cancel` fires.
    pub async fn run(self, mut commands: mpsc::UnboundedReceiver<ControlCommand>, cancel: CancellationToken) {
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            if let Err(e) = self.apply(&command).await {
                warn!(
                    action = %command.action,
                    channel = %command.channel,
                    error = %e,
                    "Channel membership change failed"
                );
            }
        }
        debug!("Channel control worker stopped");
    }
}

impl fmt::Debug for ChannelControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelControl")
            .field("membership", &self.membership.transport())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use vsim_core::{ChannelStore, PersistError, PersistResult, TransportClient, TransportResult};

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingStore {
        log: Log,
        channels: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ChannelStore for RecordingStore {
        fn channels(&self) -> Vec<String> {
            self.channels.lock().unwrap().clone()
        }

        fn set_channels(&self, channels: Vec<String>) {
            self.log.lock().unwrap().push(format!("set {}", channels.join(",")));
            *self.channels.lock().unwrap() = channels;
        }

        async fn persist(&self) -> PersistResult<()> {
            self.log.lock().unwrap().push("persist".into());
            if self.fail {
                return Err(PersistError::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }
    }

    struct RecordingClient {
        log: Log,
    }

    #[async_trait]
    impl TransportClient for RecordingClient {
        fn transport(&self) -> Transport {
            Transport::Irc
        }

        async fn send(&self, target: &str, text: &str) -> TransportResult<()> {
            self.log.lock().unwrap().push(format!("send {target} {text}"));
            Ok(())
        }

        async fn join(&self, channel: &str) -> TransportResult<()> {
            self.log.lock().unwrap().push(format!("join {channel}"));
            Ok(())
        }

        async fn part(&self, channel: &str) -> TransportResult<()> {
            self.log.lock().unwrap().push(format!("part {channel}"));
            Ok(())
        }
    }

    fn control(fail: bool) -> (ChannelControl, Log, mpsc::UnboundedReceiver<OutboundMessage>) {
        let log: Log = Arc::default();
        let store = Arc::new(RecordingStore {
            log: Arc::clone(&log),
            channels: Mutex::new(vec!["#vsimbot".into()]),
            fail,
        });
        let client = Arc::new(RecordingClient { log: Arc::clone(&log) });
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelControl::new(store, client, tx), log, rx)
    }

    #[tokio::test]
    async fn join_updates_list_then_persists_then_joins_then_confirms() {
        let (control, log, mut rx) = control(false);
        let cmd = ControlCommand::join("#test", Transport::Irc, "#vsimbot", "op");

        control.apply(&cmd).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["set #vsimbot,#test", "persist", "join #test"]
        );
        let confirmation = rx.try_recv().unwrap();
        assert_eq!(confirmation.target, "#vsimbot");
        assert_eq!(confirmation.text, "Joined #test");
    }

    #[tokio::test]
    async fn part_removes_channel_case_insensitively() {
        let (control, log, _rx) = control(false);
        let cmd = ControlCommand::part("#VSIMBOT", Transport::Discord, "general", "op");

        control.apply(&cmd).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["set ", "persist", "part #VSIMBOT"]);
    }

    #[tokio::test]
    async fn part_of_control_channel_is_refused_untouched() {
        let (control, log, mut rx) = control(false);
        let control = control.with_control_channel("#vsimbot");
        let cmd = ControlCommand::part("#VsimBot", Transport::Irc, "#vsimbot", "op");

        let err = control.apply(&cmd).await.unwrap_err();

        assert!(matches!(err, ControlError::ControlChannel(ref c) if c == "#VsimBot"));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(
            rx.try_recv().unwrap().text,
            "I cannot leave the control channel #VsimBot"
        );

        let other = ControlCommand::join("#test", Transport::Irc, "#vsimbot", "op");
        control.apply(&other).await.unwrap();
        assert_eq!(log.lock().unwrap()[0], "set #vsimbot,#test");
    }

    #[test]
    fn persist_failure_aborts_join_and_confirmation() {
        let (control, log, mut rx) = control(true);
        let cmd = ControlCommand::join("#test", Transport::Irc, "#vsimbot", "op");

        let err = tokio_test::block_on(control.apply(&cmd)).unwrap_err();

        assert!(matches!(err, ControlError::Persist(_)));
        assert_eq!(*log.lock().unwrap(), vec!["set #vsimbot,#test", "persist"]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn run_drains_queue_until_closed() {
        let (control, log, _rx) = control(false);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ControlCommand::join("#a", Transport::Irc, "#vsimbot", "op")).unwrap();
        tx.send(ControlCommand::part("#a", Transport::Irc, "#vsimbot", "op")).unwrap();
        drop(tx);

        control.run(rx, CancellationToken::new()).await;

        let log = log.lock().unwrap();
        assert_eq!(log[2], "join #a");
        assert_eq!(log[5], "part #a");
    }

    #[test]
    fn meta_descriptor_is_scoped_to_control_channel() {
        let d = meta_descriptor("#vsimbot").unwrap();
        let re = d.pattern().unwrap();

        assert!(d.applies_in("#VsimBot"));
        assert!(!d.applies_in("#chess"));
        assert!(re.is_match("JOIN #test"));
        assert!(re.is_match("  part #test "));
        assert!(!re.is_match("join test"));
        assert!(!re.is_match("join #a,#b"));
    }

    #[test]
    fn meta_handler_queues_control_command() {
        use crate::context::{BotContext, BotSettings};
        use crate::handler::MatchGroups;
        use serde_json::Value;

        let (outbox, _out) = mpsc::unbounded_channel();
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        let ctx = BotContext::new(BotSettings::new("#vsimbot"), outbox).with_control(control_tx);

        let d = meta_descriptor("#vsimbot").unwrap();
        let re = d.pattern().unwrap();
        let caps = re.captures("Part #chess").unwrap();
        let groups = MatchGroups::from_captures(re, &caps);
        let call = HandlerCall {
            transport: Transport::Irc,
            sender: "op",
            channel: "#vsimbot",
            reply_to: "#vsimbot",
            body: "Part #chess",
            raw: &Value::Null,
            groups: &groups,
            ctx: &ctx,
        };

        meta_handler(&call).unwrap();

        assert_eq!(
            control_rx.try_recv().unwrap(),
            ControlCommand::part("#chess", Transport::Irc, "#vsimbot", "op")
        );
    }
}
