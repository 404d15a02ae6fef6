//! Emulated shell for sessions without a container director.
//!
//! Serves a `~# ` prompt and canned responses for the reconnaissance
//! commands botnets run right after login. Nothing the attacker types is
//! ever executed; each completed line is classified against a small
//! table and recorded.

use crate::errors::{HoneypotError, HoneypotResult};
use crate::session::{Interaction, Negotiation};

use log::error;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Sliding deadline for every read in the shell loop.
pub const SHELL_TIMEOUT: Duration = Duration::from_secs(30);

const PROMPT: &[u8] = b"~# ";

/// Mount table presented to recon scripts. Deliberately free of any
/// container runtime artifacts.
const PROC_MOUNTS: &str = "\r\nrootfs / rootfs rw 0 0\r\n\
/dev/root / ext2 rw,relatime,errors=continue 0 0\r\n\
proc /proc proc rw,relatime 0 0\r\n\
sysfs /sys sysfs rw,relatime 0 0\r\n\
none /dev tmpfs rw,relatime,size=512k,mode=755 0 0\r\n\
devpts /dev/pts devpts rw,relatime,mode=600,ptmxmode=000 0 0\r\n\
tmpfs /var tmpfs rw,relatime,size=14336k 0 0\r\n";

/// Run the emulated shell until the attacker disconnects or idles out.
///
/// Byte handling matches the credential loop: echo only under a valid
/// negotiation, DEL/backspace erase, NUL or LF submit the line, CR is
/// ignored.
pub fn low_interaction(
    stream: &mut TcpStream,
    negotiation: &Negotiation,
    interaction: &mut Interaction,
) -> HoneypotResult<()> {
    stream.write_all(PROMPT)?;
    stream.set_read_timeout(Some(SHELL_TIMEOUT))?;

    let mut buffer = [0u8; 1];
    let mut line = Vec::new();
    let mut last_input = Instant::now();

    loop {
        match stream.read(&mut buffer) {
            Ok(0) => return Err(HoneypotError::ClientDisconnected),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }

        // Save the received input regardless of content
        interaction.input.push(buffer[0]);
        interaction
            .input_times
            .push(last_input.elapsed().as_millis() as i64);
        last_input = Instant::now();

        match buffer[0] {
            0x7f | 0x08 => {
                if !line.is_empty() {
                    line.pop();
                    if negotiation.valid {
                        if let Err(e) = stream.write_all(b"\x08 \x08") {
                            error!("Error writing erase sequence: {}", e);
                        }
                    }
                }
            }

            0x00 | 0x0a => {
                let command = String::from_utf8_lossy(&line).to_string();
                line.clear();

                let output = respond(&command);
                interaction.commands.push(command);

                stream.write_all(output.as_bytes())?;
                stream.write_all(PROMPT)?;
            }

            // CR only arrives in combination with one of the above, ignore.
            0x0d => {}

            _ => {
                if negotiation.valid {
                    if let Err(e) = stream.write_all(&buffer) {
                        error!("Error echoing input: {}", e);
                    }
                }
                line.push(buffer[0]);
            }
        }
    }
}

/// Classify one command line and build its canned response.
fn respond(command: &str) -> String {
    if command == "whoami" {
        return "\r\nadmin\r\n".to_string();
    }

    if command.contains("cat /proc/mounts; (/bin/busybox") {
        let applet = busybox_applet(command);
        return format!("{}{}: applet not found\r\n", PROC_MOUNTS, applet);
    }

    if command.contains("/bin/busybox ") {
        let applet = busybox_applet(command);
        return format!("{}: applet not found\r\n", applet);
    }

    if command.is_empty() {
        return "\r\n".to_string();
    }

    format!("{}: command not found\r\n", command)
}

/// The applet name botnets probe with: the five characters following
/// `/bin/busybox `.
fn busybox_applet(command: &str) -> String {
    match command.find("/bin/busybox ") {
        Some(index) => command[index + "/bin/busybox ".len()..]
            .chars()
            .take(5)
            .collect(),
        None => String::new(),
    }
}
