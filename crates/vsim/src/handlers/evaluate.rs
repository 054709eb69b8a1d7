//! Engine evaluation of a posted position.
//!
//! The search runs in a background task under the bot's task deadline. The
//! handler itself only extracts the FEN and returns; the reply arrives when
//! the engine reports its best move.
//!
//! Engine settings come from the `[handlers.engine]` table:
//!
//! ```toml
//! [handlers.engine]
//! path = "/usr/bin/stockfish"
//! depth = 18
//! ```

use tracing::debug;

use vsim_framework::{ActionEntry, BUILTIN_ACTIONS, HandlerCall, HandlerError, HandlerResult};

use crate::engine::{self, EngineSettings, Evaluation};
use crate::fen;

pub const ACTION: &str = "chess.evaluate";

/// Key of the engine table under `[handlers]`.
pub const SETTINGS_KEY: &str = "engine";

#[vsim_framework::linkme::distributed_slice(BUILTIN_ACTIONS)]
#[linkme(crate = vsim_framework::linkme)]
static EVALUATE: ActionEntry = ActionEntry {
    name: ACTION,
    handler: evaluate,
};

/// Starts an engine search of the requested position.
///
/// The position is the `fen` capture group when the pattern has one,
/// otherwise the first FEN found in the body.
pub fn evaluate(call: &HandlerCall<'_>) -> HandlerResult {
    let Some(position) = call.groups.name("fen").or_else(|| fen::find(call.body)) else {
        return call.reply(format!("{}: I could not find a FEN to evaluate.", call.sender));
    };

    let settings: EngineSettings = call
        .ctx
        .handler_setting(SETTINGS_KEY)
        .unwrap_or_default();
    let ctx = call.ctx.clone();
    let transport = call.transport;
    let channel = call.reply_to.to_string();
    let sender = call.sender.to_string();
    let position = position.trim().to_string();

    debug!(from = %sender, fen = %position, depth = settings.depth, "Evaluation requested");
    call.ctx.spawn_task(format!("{ACTION}:{sender}"), async move {
        match engine::evaluate(&settings, &position).await {
            Ok(evaluation) => ctx.say(transport, channel, summary(&sender, &position, &evaluation)),
            Err(e) => {
                ctx.say(
                    transport,
                    channel,
                    format!("Sorry {sender}, the engine could not evaluate that position."),
                )?;
                Err(HandlerError::failed(e.to_string()))
            }
        }
    })?;
    Ok(())
}

/// The reply text for a finished search. Scores are from White's side.
pub fn summary(from: &str, fen: &str, evaluation: &Evaluation) -> String {
    let Some(best) = &evaluation.best_move else {
        return format!("The position posted by {from} has no legal moves.");
    };
    let score = evaluation
        .white_score(fen)
        .map_or_else(|| "?".to_string(), |s| s.to_string());
    format!(
        "Evaluation of the position posted by {from} (depth {}): {score}, best move {best}",
        evaluation.depth
    )
}
