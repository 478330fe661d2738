//! Interactive front-end for the alarm scheduler.
//!
//! Reads one command per line, turns it into an [`alarm::Request`] and
//! renders fired alarms and lifecycle notices on the console. The binary in
//! `main.rs` wires these pieces to stdin/stdout.

mod console;
mod parser;

pub use console::{ConsoleSink, Renderer};
pub use parser::{parse_line, Command, ParseError};
