//! Built-in handler actions.
//!
//! Every action here is contributed to the link-time
//! [`BUILTIN_ACTIONS`](vsim_framework::BUILTIN_ACTIONS) slice, so
//! [`HandlerCatalog::builtin`](vsim_framework::HandlerCatalog::builtin) sees
//! them as soon as this crate is linked. Manifests under `handlers/` decide
//! which of them are wired to which patterns.

pub mod add_fen;
pub mod evaluate;
pub mod ping;

pub use add_fen::ACTION as ADD_FEN;
pub use evaluate::ACTION as EVALUATE;
pub use ping::ACTION as PING;

#[cfg(test)]
pub(crate) mod testing {
    use serde_json::Value;
    use tokio::sync::mpsc;

    use vsim_core::{CanonicalMessage, InboundEvent, Transport};
    use vsim_framework::{BotContext, BotSettings, OutboundMessage};

    pub fn context(settings: BotSettings) -> (BotContext, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (BotContext::new(settings, tx), rx)
    }

    pub fn settings() -> BotSettings {
        BotSettings::new("#vsimbot").identity(Transport::Irc, "vsimbot")
    }

    pub fn message(from: &str, body: &str) -> InboundEvent {
        CanonicalMessage::new(Transport::Irc, from, "#chess", body, Value::Null).into()
    }
}
