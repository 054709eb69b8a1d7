//! Forsyth-Edwards Notation helpers.

use std::sync::LazyLock;

use regex::Regex;

/// Matches a FEN in free text: eight ranks of piece placement, optionally
/// followed by side to move, castling rights, en-passant square and the two
/// move counters.
///
/// Handler manifests that react to posted positions use the same pattern.
pub const FEN_PATTERN: &str = r"(?:[pnbrqkPNBRQK1-8]{1,8}/){7}[pnbrqkPNBRQK1-8]{1,8}(?:\s+[wb](?:\s+(?:-|[KQkq]{1,4})(?:\s+(?:-|[a-h][36])(?:\s+\d+\s+\d+)?)?)?)?";

static FEN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(FEN_PATTERN).ok());

/// Finds the first FEN in `text`.
pub fn find(text: &str) -> Option<&str> {
    FEN.as_ref()?.find(text).map(|m| m.as_str())
}

/// The lichess board-editor link for `fen`.
///
/// Fields are joined with `_`, which the editor reads as a space.
pub fn editor_url(fen: &str) -> String {
    let fen = fen.split_whitespace().collect::<Vec<_>>().join("_");
    format!("http://lichess.org/editor/{fen}")
}
