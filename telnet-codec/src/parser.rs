//! # Telnet Command Parser
//!
//! Recovers command sequences from a captured negotiation buffer by
//! splitting it on the IAC byte (RFC 854, Section 4).
//!
//! This parser is intentionally tolerant. It is fed whatever a peer sent
//! during the opening exchange, including malformed and hostile input:
//! - Runs of IAC produce empty chunks, which reset the pending sequence.
//! - A chunk holding only a verb (a trailing, incomplete sequence) is
//!   dropped.
//! - Unknown verbs and options are kept as-is; classification is the
//!   caller's concern.

use crate::protocol::{IAC, SB};

/// One recovered command sequence: `IAC <verb> <option> [params...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The negotiation verb (DO/DONT/WILL/WONT) or SB.
    pub verb: u8,
    /// The option being negotiated.
    pub option: u8,
    /// Parameter bytes, present for subnegotiations and for chunks that
    /// carried data beyond the option byte.
    pub subnegotiation: Vec<u8>,
}

/// Parse a captured buffer into command sequences.
///
/// The buffer is split on IAC; each chunk of at least two bytes yields a
/// [`Command`] with the first byte as verb and the second as option. For
/// SB chunks, and for chunks longer than two bytes, the remainder becomes
/// the subnegotiation body.
///
/// # Example
/// ```
/// use telnet_codec::parser::parse_commands;
/// use telnet_codec::protocol::{DO, ECHO, LINEMODE, WILL};
///
/// let buf = [255, WILL, LINEMODE, 255, DO, ECHO];
/// let commands = parse_commands(&buf);
/// assert_eq!(commands.len(), 2);
/// assert_eq!(commands[0].verb, WILL);
/// assert_eq!(commands[0].option, LINEMODE);
/// ```
pub fn parse_commands(buffer: &[u8]) -> Vec<Command> {
    let mut commands = Vec::new();

    for chunk in buffer.split(|b| *b == IAC) {
        if chunk.len() < 2 {
            continue;
        }

        let mut command = Command {
            verb: chunk[0],
            option: chunk[1],
            subnegotiation: Vec::new(),
        };

        if command.verb == SB || chunk.len() > 2 {
            command.subnegotiation = chunk[2..].to_vec();
        }

        commands.push(command);
    }

    commands
}
