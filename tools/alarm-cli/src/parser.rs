//! Command Parser
//!
//! Turns operator input lines into structured requests:
//!
//! ```text
//! <delay> Message(<id>) <text>
//! Cancel: Message(<id>)
//! List
//! Exit
//! ```

use alarm::{AlarmId, AlarmMessage, Request, MAX_MESSAGE_LEN};
use log::warn;
use thiserror::Error;

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Request(Request),
    Exit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unrecognized command")]
    Unrecognized,
    #[error("{field} must be a positive integer, got {value:?}")]
    NotPositive { field: &'static str, value: String },
    #[error("expected Message(<id>)")]
    MissingId,
    #[error("missing alarm message")]
    MissingMessage,
    #[error("unexpected trailing input {0:?}")]
    Trailing(String),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return Ok(Some(Command::Exit));
    }
    if line.eq_ignore_ascii_case("list") {
        return Ok(Some(Command::Request(Request::List)));
    }
    if let Some(rest) = line.strip_prefix("Cancel:") {
        return parse_cancel(rest).map(Some);
    }

    parse_submit(line).map(Some)
}

fn parse_cancel(rest: &str) -> Result<Command, ParseError> {
    let (id, tail) = message_id(rest.trim_start())?;
    if !tail.trim().is_empty() {
        return Err(ParseError::Trailing(tail.trim().to_string()));
    }
    Ok(Command::Request(Request::Cancel { id }))
}

fn parse_submit(line: &str) -> Result<Command, ParseError> {
    let (delay, rest) = line
        .split_once(char::is_whitespace)
        .ok_or(ParseError::Unrecognized)?;
    if !delay.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
        return Err(ParseError::Unrecognized);
    }
    let delay_seconds = positive("delay", delay)?;
    let (id, text) = message_id(rest.trim_start())?;

    let text = text.trim_start();
    if text.is_empty() {
        return Err(ParseError::MissingMessage);
    }
    if text.len() > MAX_MESSAGE_LEN {
        warn!("message for alarm {id} truncated to {MAX_MESSAGE_LEN} bytes");
    }

    Ok(Command::Request(Request::Submit {
        id,
        delay_seconds,
        message: AlarmMessage::truncated(text),
    }))
}

/// Splits `Message(<id>)` off the front of `input`.
fn message_id(input: &str) -> Result<(AlarmId, &str), ParseError> {
    let inner = input.strip_prefix("Message(").ok_or(ParseError::MissingId)?;
    let (digits, rest) = inner.split_once(')').ok_or(ParseError::MissingId)?;
    let id = positive("message id", digits.trim())?;
    Ok((AlarmId::new(id), rest))
}

fn positive(field: &'static str, value: &str) -> Result<u32, ParseError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::NotPositive {
            field,
            value: value.to_string(),
        }),
    }
}
