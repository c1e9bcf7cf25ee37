//! Transcript parser — turns an exported group chat into ordered messages.
//!
//! Each line either opens a new message (it starts with an export
//! timestamp) or continues the one currently being built. Blank lines are
//! skipped and never open or continue a message. Lines that appear before
//! the first timestamped line have nowhere to attach and are dropped.
//!
//! Parsing is a pure function of its input; [`messages`] yields records
//! lazily and [`parse`] collects them.

use std::path::Path;
use std::str::Lines;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TranscriptError;

/// One logical message reconstructed from one or more transcript lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    /// Export timestamp as written (`"18/12/2024, 8:09 pm"`), `None` for
    /// records that never carried one.
    pub timestamp: Option<String>,
    /// Sender name or phone number. `None` for system messages.
    pub sender: Option<String>,
    /// Message text, continuation lines joined with a single space.
    pub content: String,
    /// Original lines, joined with `\n`.
    pub raw: String,
}

/// A recognised timestamp prefix.
struct TimestampFormat {
    name: &'static str,
    /// Captures `date`, `time` and `rest` (everything after the prefix).
    regex: Regex,
}

/// Known export formats, tried in order.
static TIMESTAMP_FORMATS: LazyLock<Vec<TimestampFormat>> = LazyLock::new(|| {
    vec![
        // Android: `18/12/2024, 8:09 pm - Sender: text`
        TimestampFormat {
            name: "android",
            regex: Regex::new(
                r"(?i)^(?P<date>\d{1,2}/\d{1,2}/\d{4}),?\s+(?P<time>\d{1,2}:\d{2}\s*[ap]m)(?P<rest>.*)$",
            )
            .expect("valid android timestamp regex"),
        },
        // iOS: `[18/12/2024, 8:09:15 PM] Sender: text`
        TimestampFormat {
            name: "ios",
            regex: Regex::new(
                r"(?i)^\[(?P<date>\d{1,2}/\d{1,2}/\d{4}),?\s+(?P<time>\d{1,2}:\d{2}(?::\d{2})?\s*[ap]m)\](?P<rest>.*)$",
            )
            .expect("valid ios timestamp regex"),
        },
    ]
});

/// `Sender: content` split on the first colon.
static SENDER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:]+):\s*(.+)$").expect("valid sender regex"));

/// A line that opened a new message.
#[derive(Debug, PartialEq, Eq)]
struct Header<'a> {
    timestamp: String,
    sender: Option<&'a str>,
    content: &'a str,
}

/// Try each known format against the start of `line`.
fn match_header(line: &str) -> Option<Header<'_>> {
    TIMESTAMP_FORMATS.iter().find_map(|format| {
        let caps = format.regex.captures(line)?;
        let date = caps.name("date")?.as_str();
        let time = caps.name("time")?.as_str();
        let rest = caps.name("rest")?.as_str().trim();
        let rest = rest.strip_prefix('-').map(str::trim_start).unwrap_or(rest);

        debug!(format = format.name, "Matched transcript timestamp");

        let (sender, content) = match SENDER_LINE.captures(rest) {
            Some(parts) => (
                parts.get(1).map(|m| m.as_str().trim()),
                parts.get(2).map_or("", |m| m.as_str()),
            ),
            None => (None, rest),
        };

        Some(Header {
            timestamp: format!("{date}, {time}"),
            sender,
            content,
        })
    })
}

/// The record currently accumulating continuation lines.
struct MessageBuilder {
    timestamp: Option<String>,
    sender: Option<String>,
    content: String,
    raw: String,
}

impl MessageBuilder {
    fn open(header: Header<'_>, line: &str) -> Self {
        Self {
            timestamp: Some(header.timestamp),
            sender: header.sender.map(String::from),
            content: header.content.to_string(),
            raw: line.to_string(),
        }
    }

    fn continue_with(&mut self, line: &str) {
        self.content.push(' ');
        self.content.push_str(line);
        self.raw.push('\n');
        self.raw.push_str(line);
    }

    fn commit(self) -> ParsedMessage {
        ParsedMessage {
            timestamp: self.timestamp,
            sender: self.sender,
            content: self.content,
            raw: self.raw,
        }
    }
}

/// Lazy iterator over the messages of a transcript.
pub struct Messages<'a> {
    lines: Lines<'a>,
    pending: Option<MessageBuilder>,
}

impl Iterator for Messages<'_> {
    type Item = ParsedMessage;

    fn next(&mut self) -> Option<ParsedMessage> {
        for line in self.lines.by_ref() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match match_header(line) {
                Some(header) => {
                    let next = MessageBuilder::open(header, line);
                    if let Some(done) = self.pending.replace(next) {
                        return Some(done.commit());
                    }
                }
                None => match self.pending.as_mut() {
                    Some(builder) => builder.continue_with(line),
                    None => debug!("Dropping unattributed line before first message"),
                },
            }
        }

        self.pending.take().map(MessageBuilder::commit)
    }
}

/// Iterate over the messages in `text` without collecting them.
pub fn messages(text: &str) -> Messages<'_> {
    Messages {
        lines: text.lines(),
        pending: None,
    }
}

/// Parse a whole transcript into ordered messages.
pub fn parse(text: &str) -> Vec<ParsedMessage> {
    messages(text).collect()
}

/// Read a transcript file, replacing invalid UTF-8 instead of failing.
pub async fn load(path: impl AsRef<Path>) -> Result<String, TranscriptError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| TranscriptError::Read {
            path: path.display().to_string(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
