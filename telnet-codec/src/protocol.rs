//! # Telnet Protocol Constants
//!
//! The subset of RFC 854 / RFC 855 constants exercised by real-world Telnet
//! clients. Everything here is a plain `u8` because the honeypot state
//! machines operate on raw bytes one at a time; the values come straight
//! from the RFC assignments.
//!
//! ## Key Concepts from RFC 854:
//!
//! ### IAC (Interpret As Command) - Byte 255
//! The IAC byte (255/0xFF) signals that the following bytes should be
//! interpreted as Telnet commands rather than data.
//!
//! ### Command Structure
//! Negotiation commands follow the pattern `IAC <verb> <option>` where the
//! verb is one of DO/DONT/WILL/WONT. Sub-options use
//! `IAC SB <option> <parameters...> IAC SE` (RFC 855).

/// IAC - Interpret As Command (RFC 854, Section 4)
pub const IAC: u8 = 255;

/// DON'T - sender refuses or revokes an option. Value is 254 per RFC 854.
pub const DONT: u8 = 254;

/// DO - sender wants receiver to enable an option. Value is 253 per RFC 854.
pub const DO: u8 = 253;

/// WON'T - sender will not perform an option. Value is 252 per RFC 854.
pub const WONT: u8 = 252;

/// WILL - sender offers to perform an option. Value is 251 per RFC 854.
pub const WILL: u8 = 251;

/// Subnegotiation Begin (RFC 855). Value is 250.
pub const SB: u8 = 250;

/// Subnegotiation End (RFC 855). Value is 240.
pub const SE: u8 = 240;

/// Echo (RFC 857). Controls which side echoes typed characters.
pub const ECHO: u8 = 1;

/// Suppress Go Ahead (RFC 858). Negotiated by most modern clients.
pub const SUPPRESS_GO_AHEAD: u8 = 3;

/// Status (RFC 859). Allows querying the state of options.
pub const STATUS: u8 = 5;

/// Terminal Type (RFC 1091).
pub const TERMINAL_TYPE: u8 = 24;

/// Negotiate About Window Size (RFC 1073).
pub const NAWS: u8 = 31;

/// Linemode (RFC 1184). Line-at-a-time editing mode.
pub const LINEMODE: u8 = 34;

/// X Display Location (RFC 1096).
pub const X_DISPLAY_LOCATION: u8 = 35;

/// New Environment (RFC 1572).
pub const NEW_ENVIRON: u8 = 39;

/// Check whether a byte is one of the four negotiation verbs
/// (DO / DONT / WILL / WONT).
pub fn is_verb(byte: u8) -> bool {
    matches!(byte, DO | DONT | WILL | WONT)
}
