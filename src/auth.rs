//! Credential collection.
//!
//! A line-mode loop over two states, username and password. Every byte
//! is captured with its keystroke timing before it is interpreted.
//! Submitted `user:pass` entries are checked against the allow-list;
//! a hit grants the shell, a miss re-prompts. The attacker can try as
//! often as it wants inside the sliding read deadline.
//!
//! Echo discipline: bytes are echoed back only while typing the username
//! of a validly negotiated session. Password input is never echoed, and
//! neither is anything in raw mode, where echo would corrupt the peer's
//! terminal.

use crate::errors::{HoneypotError, HoneypotResult};
use crate::session::{Auth, Negotiation};

use log::error;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Sliding deadline for every read in the credential phase.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Username,
    Password,
}

struct AuthState {
    mode: Mode,
    buffer: Vec<u8>,
    username: String,
}

/// Run the credential loop until an allow-listed entry is submitted.
///
/// `carryover` is input already consumed by a failed negotiation; it is
/// replayed through the same byte handling before the socket is read.
/// Returns with `auth.success` set on an allow-list hit; a read error or
/// deadline ends the phase with the corresponding non-fatal error.
pub fn authenticate(
    stream: &mut TcpStream,
    credentials: &[String],
    root_credentials: &[String],
    negotiation: &Negotiation,
    auth: &mut Auth,
    carryover: &[u8],
) -> HoneypotResult<()> {
    let mut state = AuthState {
        mode: Mode::Username,
        buffer: Vec::new(),
        username: String::new(),
    };

    // Replay bytes the negotiator consumed. Timing is unknowable here,
    // the vector records zero elapsed for them.
    for byte in carryover {
        auth.input.push(*byte);
        auth.input_times.push(0);
        if process_byte(
            stream,
            *byte,
            &mut state,
            auth,
            negotiation,
            credentials,
            root_credentials,
        ) {
            return Ok(());
        }
    }

    stream.set_read_timeout(Some(AUTH_TIMEOUT))?;

    let mut buffer = [0u8; 1];
    let mut last_input = Instant::now();

    loop {
        match stream.read(&mut buffer) {
            Ok(0) => return Err(HoneypotError::ClientDisconnected),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }

        // Save the received input regardless of content
        auth.input.push(buffer[0]);
        auth.input_times
            .push(last_input.elapsed().as_millis() as i64);
        last_input = Instant::now();

        if process_byte(
            stream,
            buffer[0],
            &mut state,
            auth,
            negotiation,
            credentials,
            root_credentials,
        ) {
            return Ok(());
        }
    }
}

/// Handle one input byte. Returns true when an allow-listed credential
/// was accepted and the phase is over.
fn process_byte(
    stream: &mut TcpStream,
    byte: u8,
    state: &mut AuthState,
    auth: &mut Auth,
    negotiation: &Negotiation,
    credentials: &[String],
    root_credentials: &[String],
) -> bool {
    match byte {
        // DEL and backspace trim the buffer; the remote erase is only
        // written where echo is active.
        0x7f | 0x08 => {
            if !state.buffer.is_empty() {
                state.buffer.pop();
                if state.mode != Mode::Password && negotiation.valid {
                    if let Err(e) = stream.write_all(b"\x08 \x08") {
                        error!("Error writing erase sequence: {}", e);
                    }
                }
            }
        }

        // NUL and newline both end a line
        0x00 | 0x0a => {
            let line = String::from_utf8_lossy(&state.buffer).to_string();
            state.buffer.clear();

            match state.mode {
                Mode::Username => {
                    state.username = line;
                    auth.usernames.push(state.username.clone());
                    state.mode = Mode::Password;
                    if let Err(e) = stream.write_all(b"\r\nPassword: ") {
                        error!("Error writing password prompt: {}", e);
                    }
                }
                Mode::Password => {
                    let entry = format!("{}:{}", state.username, line);
                    auth.passwords.push(line);
                    auth.entries.push(entry.clone());
                    state.username.clear();

                    if credentials.iter().any(|c| *c == entry) {
                        auth.success = true;
                        if !root_credentials.is_empty() {
                            auth.root = Some(root_credentials.iter().any(|c| *c == entry));
                        }
                        return true;
                    }

                    state.mode = Mode::Username;
                    if let Err(e) = stream.write_all(b"\r\nWrong password!\r\n\r\nUsername: ") {
                        error!("Error writing retry prompt: {}", e);
                    }
                }
            }
        }

        // CR only arrives in combination with one of the above, ignore.
        0x0d => {}

        _ => {
            if state.mode != Mode::Password && negotiation.valid {
                if let Err(e) = stream.write_all(&[byte]) {
                    error!("Error echoing input: {}", e);
                }
            }
            state.buffer.push(byte);
        }
    }

    false
}
