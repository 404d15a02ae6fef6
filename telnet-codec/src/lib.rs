//! # Telnet Codec Library
//!
//! A small Rust library for working with raw Telnet command sequences as
//! defined in:
//! - RFC 854: Telnet Protocol Specification (https://tools.ietf.org/html/rfc854)
//! - RFC 855: Telnet Option Specifications
//! - Various option-specific RFCs (857, 858, 1073, 1091, 1184, ...)
//!
//! Unlike a full negotiation engine, this crate deliberately stays at the
//! byte level: it exposes the IAC verb and option constants and a tolerant
//! parser that recovers `verb`/`option`/`subnegotiation` triples from a
//! captured buffer. Malformed input never fails the parse; garbage chunks
//! are skipped and incomplete trailing sequences are dropped.
//!
//! ## Architecture Overview
//!
//! - `protocol`: Telnet protocol constants (RFC 854)
//! - `parser`: IAC-split command sequence parsing

pub mod parser;
pub mod protocol;

// Re-export main types for convenience
pub use parser::{Command, parse_commands};
pub use protocol::*;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
