//! `!ping` liveness check.

use vsim_framework::{ActionEntry, BUILTIN_ACTIONS, HandlerCall, HandlerResult};

pub const ACTION: &str = "ping";

#[vsim_framework::linkme::distributed_slice(BUILTIN_ACTIONS)]
#[linkme(crate = vsim_framework::linkme)]
static PING: ActionEntry = ActionEntry {
    name: ACTION,
    handler: ping,
};

/// Replies `pong` in the channel the request came from.
pub fn ping(call: &HandlerCall<'_>) -> HandlerResult {
    call.reply("pong")
}
