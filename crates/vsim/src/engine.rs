//! A small UCI chess engine client.
//!
//! Each evaluation starts a fresh engine process, walks it through the UCI
//! handshake, searches one position to a fixed depth and quits:
//!
//! ```text
//! > uci            < uciok
//! > ucinewgame
//! > isready        < readyok
//! > position fen <fen>
//! > go depth <n>   < info ... score cp 35 ... pv e2e4 e7e5
//!                  < bestmove e2e4 ponder e7e5
//! > quit
//! ```
//!
//! The child is spawned with `kill_on_drop`, so a search abandoned by the
//! task deadline or shutdown never leaves an engine process behind.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace};

/// Engine binary used when no `[handlers.engine]` setting is present.
pub const DEFAULT_ENGINE: &str = "stockfish";

/// Search depth used when none is configured.
pub const DEFAULT_DEPTH: u32 = 15;

/// The `[handlers.engine]` settings table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine executable.
    pub path: PathBuf,
    /// Extra command-line arguments.
    pub args: Vec<String>,
    /// Fixed search depth.
    pub depth: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_ENGINE),
            args: Vec::new(),
            depth: DEFAULT_DEPTH,
        }
    }
}

/// Errors talking to an engine process.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to start engine '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Engine I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Engine closed its output while waiting for '{0}'")]
    Closed(&'static str),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A search score, from the point of view of the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Material-style evaluation in hundredths of a pawn.
    Centipawns(i32),
    /// Forced mate in this many moves; negative when being mated.
    Mate(i32),
}

impl Score {
    /// The same score seen from the other side.
    pub fn flipped(self) -> Self {
        match self {
            Self::Centipawns(cp) => Self::Centipawns(-cp),
            Self::Mate(n) => Self::Mate(-n),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Centipawns(cp) => write!(f, "{:+.2}", f64::from(*cp) / 100.0),
            Self::Mate(n) => write!(f, "#{n}"),
        }
    }
}

/// Result of one search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Deepest completed iteration reported.
    pub depth: u32,
    /// Latest score, side to move.
    pub score: Option<Score>,
    /// `None` when the position has no legal move.
    pub best_move: Option<String>,
    /// Principal variation of the latest scored line.
    pub pv: Vec<String>,
}

impl Evaluation {
    /// Folds one `info` line (without the leading `info` token) into the
    /// evaluation.
    ///
    /// Lines for secondary `multipv` lines and `info string` chatter are
    /// ignored.
    pub fn absorb_info<'a>(&mut self, tokens: impl IntoIterator<Item = &'a str>) {
        let mut tokens = tokens.into_iter();
        let mut depth = None;
        let mut score = None;
        let mut pv = Vec::new();

        while let Some(token) = tokens.next() {
            match token {
                "string" => return,
                "multipv" => {
                    if tokens.next().and_then(|n| n.parse::<u32>().ok()) != Some(1) {
                        return;
                    }
                }
                "depth" => depth = tokens.next().and_then(|d| d.parse().ok()),
                "score" => {
                    score = match (tokens.next(), tokens.next().and_then(|v| v.parse().ok())) {
                        (Some("cp"), Some(v)) => Some(Score::Centipawns(v)),
                        (Some("mate"), Some(v)) => Some(Score::Mate(v)),
                        _ => None,
                    };
                }
                "pv" => {
                    pv = tokens.by_ref().map(str::to_string).collect();
                }
                _ => {}
            }
        }

        if let Some(depth) = depth {
            self.depth = self.depth.max(depth);
        }
        if score.is_some() {
            self.score = score;
            self.pv = pv;
        }
    }

    /// The score from White's point of view, given the searched FEN.
    pub fn white_score(&self, fen: &str) -> Option<Score> {
        let black_to_move = fen.split_whitespace().nth(1) == Some("b");
        self.score
            .map(|s| if black_to_move { s.flipped() } else { s })
    }
}

/// A running engine process that has completed the UCI handshake.
pub struct Engine {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl Engine {
    /// Starts the engine and waits for `uciok`.
    pub async fn spawn(settings: &EngineSettings) -> EngineResult<Self> {
        let mut child = Command::new(&settings.path)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: settings.path.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(EngineError::Closed("uciok"))?;
        let stdout = child.stdout.take().ok_or(EngineError::Closed("uciok"))?;
        debug!(engine = %settings.path.display(), pid = ?child.id(), "Engine started");

        let mut engine = Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        };
        engine.send("uci").await?;
        engine.wait_for("uciok").await?;
        Ok(engine)
    }

    async fn send(&mut self, command: &str) -> EngineResult<()> {
        trace!(command, "> engine");
        self.stdin.write_all(command.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self, awaiting: &'static str) -> EngineResult<String> {
        let line = self
            .lines
            .next_line()
            .await?
            .ok_or(EngineError::Closed(awaiting))?;
        trace!(line = %line, "< engine");
        Ok(line)
    }

    async fn wait_for(&mut self, token: &'static str) -> EngineResult<()> {
        while self.read_line(token).await?.trim() != token {}
        Ok(())
    }

    /// Searches `fen` to `depth` and returns the final evaluation.
    pub async fn analyse(&mut self, fen: &str, depth: u32) -> EngineResult<Evaluation> {
        self.send("ucinewgame").await?;
        self.send("isready").await?;
        self.wait_for("readyok").await?;
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;

        let mut evaluation = Evaluation::default();
        loop {
            let line = self.read_line("bestmove").await?;
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("info") => evaluation.absorb_info(tokens),
                Some("bestmove") => {
                    evaluation.best_move = tokens
                        .next()
                        .filter(|m| *m != "(none)")
                        .map(str::to_string);
                    return Ok(evaluation);
                }
                _ => {}
            }
        }
    }

    /// Asks the engine to exit and reaps it.
    pub async fn quit(mut self) -> EngineResult<()> {
        self.send("quit").await?;
        let status = self.child.wait().await?;
        debug!(status = %status, "Engine exited");
        Ok(())
    }
}

/// Runs a one-shot search of `fen` with the configured engine.
pub async fn evaluate(settings: &EngineSettings, fen: &str) -> EngineResult<Evaluation> {
    let mut engine = Engine::spawn(settings).await?;
    let evaluation = engine.analyse(fen, settings.depth).await?;
    if let Err(e) = engine.quit().await {
        debug!(error = %e, "Engine did not quit cleanly");
    }
    Ok(evaluation)
}
