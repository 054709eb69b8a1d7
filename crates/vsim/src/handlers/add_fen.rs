//! Posts a board-editor link for positions pasted into the channel.

use tracing::debug;

use vsim_framework::{ActionEntry, BUILTIN_ACTIONS, HandlerCall, HandlerResult};

use crate::fen;

pub const ACTION: &str = "chess.add_fen";

#[vsim_framework::linkme::distributed_slice(BUILTIN_ACTIONS)]
#[linkme(crate = vsim_framework::linkme)]
static ADD_FEN: ActionEntry = ActionEntry {
    name: ACTION,
    handler: add_fen,
};

/// Replies with the lichess editor link for the matched FEN.
///
/// The whole pattern match is taken as the position.
pub fn add_fen(call: &HandlerCall<'_>) -> HandlerResult {
    let position = call.groups.full().trim();
    debug!(from = call.sender, fen = position, "Linking posted FEN");
    call.reply(link_text(call.sender, position))
}

pub fn link_text(from: &str, fen: &str) -> String {
    format!(
        "The FEN posted by {from} is now available at: {}",
        fen::editor_url(fen)
    )
}
