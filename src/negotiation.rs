//! Initial telnet option negotiation.
//!
//! The server opens with `IAC DO LINEMODE IAC WILL ECHO` and then reads
//! the peer's answer byte by byte until both an ECHO and a LINEMODE
//! command have been observed. Real telnet clients complete this exchange
//! immediately; bots that blast credentials without speaking telnet do
//! not, and are downgraded to raw mode where their bytes count as input.
//!
//! Every byte received is captured in [`Negotiation::bytes`] for the
//! negotiation event, valid exchange or not.

use crate::errors::HoneypotResult;
use crate::session::Negotiation;

use log::{debug, error};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use telnet_codec::protocol::{DO, ECHO, IAC, LINEMODE, WILL, is_verb};

/// Deadline applied to every read of the exchange.
pub const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive the option exchange on a fresh connection.
///
/// Returns the carryover bytes: input read from a peer that turned out
/// not to be negotiating. The caller must replay them into the
/// authentication phase. The carryover is empty for a valid exchange.
///
/// Classification, byte by byte: the first byte must be IAC. After that,
/// NUL bytes are skipped, another IAC restarts the pending command, a
/// DO/DONT/WILL/WONT byte becomes the pending verb, and an ECHO or
/// LINEMODE byte completes a command when a verb is pending (`DO ECHO`
/// and `WILL LINEMODE` additionally record the peer's agreement). The
/// exchange is valid once both commands were seen. A read error or
/// expired deadline before that marks the negotiation invalid and
/// switches the session to raw mode.
pub fn negotiate(stream: &mut TcpStream, negotiation: &mut Negotiation) -> HoneypotResult<Vec<u8>> {
    debug!(
        "Starting negotiation: {} => {}",
        stream.peer_addr().map_or_else(|_| "?".to_string(), |a| a.to_string()),
        stream.local_addr().map_or_else(|_| "?".to_string(), |a| a.to_string())
    );

    stream.set_read_timeout(Some(NEGOTIATION_TIMEOUT))?;

    if let Err(e) = stream.write_all(&[IAC, DO, LINEMODE, IAC, WILL, ECHO]) {
        error!("Error writing initial negotiation: {}", e);
    }

    let mut buffer = [0u8; 1];
    match stream.read(&mut buffer) {
        Ok(n) if n > 0 => {}
        _ => {
            // Nothing arrived inside the window; raw mode with no input.
            negotiation.valid = false;
            return Ok(Vec::new());
        }
    }
    negotiation.bytes.push(buffer[0]);

    if buffer[0] != IAC {
        // Not a telnet client. The byte it sent is attacker input.
        negotiation.valid = false;
        return Ok(vec![buffer[0]]);
    }

    let mut verb = 0u8;
    let mut verb_pending = false;

    loop {
        match stream.read(&mut buffer) {
            Ok(n) if n > 0 => {}
            _ => {
                // Deadline or disconnect before both commands arrived.
                negotiation.valid = false;
                return Ok(negotiation.bytes.clone());
            }
        }
        negotiation.bytes.push(buffer[0]);

        // If null byte, try again
        if buffer[0] == 0 {
            continue;
        }

        if buffer[0] == IAC {
            // New command, reset and read the next byte
            verb = 0;
            verb_pending = false;
            continue;
        }

        if is_verb(buffer[0]) {
            verb = buffer[0];
            verb_pending = true;
            continue;
        }

        if buffer[0] == ECHO && verb_pending {
            negotiation.command_echo = true;
            if verb == DO {
                negotiation.value_echo = true;
            }
        }

        if buffer[0] == LINEMODE && verb_pending {
            negotiation.command_linemode = true;
            if verb == WILL {
                negotiation.value_linemode = true;
            }
        }

        if negotiation.command_echo && negotiation.command_linemode {
            negotiation.valid = true;
            return Ok(Vec::new());
        }
    }
}
