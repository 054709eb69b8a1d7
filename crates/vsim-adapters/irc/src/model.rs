//! IRC protocol lines.
//!
//! ```text
//! [@tags] [:prefix] COMMAND [params...] [:trailing]
//! ```
//!
//! Tag values are unescaped per IRCv3 (`\:` → `;`, `\s` → space, `\\` → `\`,
//! `\r`, `\n`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use vsim_core::{AdapterError, AdapterResult};

/// One parsed protocol line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrcMessage {
    /// IRCv3 message tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// `nick!user@host` or a server name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Command word or three-digit numeric, upper-cased.
    pub command: String,
    /// Middle parameters followed by the trailing one.
    #[serde(default)]
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parses one line (CRLF optional).
    pub fn parse(line: &str) -> AdapterResult<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        let mut message = IrcMessage::default();

        if let Some(tagged) = rest.strip_prefix('@') {
            let (tags, after) = tagged
                .split_once(' ')
                .ok_or_else(|| AdapterError::parse("tags without command"))?;
            message.tags = parse_tags(tags);
            rest = after.trim_start();
        }

        if let Some(prefixed) = rest.strip_prefix(':') {
            let (prefix, after) = prefixed
                .split_once(' ')
                .ok_or_else(|| AdapterError::parse("prefix without command"))?;
            message.prefix = Some(prefix.to_string());
            rest = after.trim_start();
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(AdapterError::parse(format!("no command in line '{line}'")));
        }
        message.command = command.to_ascii_uppercase();

        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                message.params.push(trailing.to_string());
                break;
            }
            let (param, after) = rest.split_once(' ').unwrap_or((rest, ""));
            message.params.push(param.to_string());
            rest = after;
        }

        Ok(message)
    }

    /// Nick part of the prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split(['!', '@']).next().unwrap_or(prefix))
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The last parameter.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Whether the command is an error numeric (400–599).
    pub fn is_error_reply(&self) -> bool {
        self.command.len() == 3
            && self
                .command
                .parse::<u16>()
                .is_ok_and(|code| (400..600).contains(&code))
    }
}

fn parse_tags(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter(|t| !t.is_empty())
        .map(|tag| match tag.split_once('=') {
            Some((key, value)) => (key.to_string(), unescape_tag(value)),
            None => (tag.to_string(), String::new()),
        })
        .collect()
}

fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
