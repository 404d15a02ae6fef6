//! Scripted authentication against the daemon inside a container.
//!
//! A fixed telnet dialogue, run exactly once when a session transitions
//! into high interaction: answer the inner daemon's negotiation with the
//! option set of an ordinary xterm client, then replay the container's
//! well-known credentials. The byte sequences are a wire contract with
//! the telnetd shipped in the template image; do not reorder or reflow
//! them.

use super::container::ContainerConn;
use crate::errors::{HoneypotError, HoneypotResult};

use log::debug;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

/// Deadline for each read of the dialogue.
const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// IAC WILL TTYPE, IAC WILL TSPEED, IAC WILL XDISPLOC, IAC WILL NEW-ENVIRON
const OFFER_OPTIONS: [u8; 12] = [
    0xff, 0xfb, 0x18, 0xff, 0xfb, 0x20, 0xff, 0xfb, 0x23, 0xff, 0xfb, 0x27,
];

/// Subnegotiation answers: terminal speed 38400,38400; xdisploc nyx:0;
/// environ DISPLAY=nyx:0; terminal type XTERM-256COLOR.
const SUBNEGOTIATION_REPLIES: [u8; 68] = [
    0xff, 0xfa, 0x20, 0x00, 0x33, 0x38, 0x34, 0x30, 0x30, 0x2c, 0x33, 0x38, 0x34, 0x30, 0x30,
    0xff, 0xf0, 0xff, 0xfa, 0x23, 0x00, 0x6e, 0x79, 0x78, 0x3a, 0x30, 0xff, 0xf0, 0xff, 0xfa,
    0x27, 0x00, 0x00, 0x44, 0x49, 0x53, 0x50, 0x4c, 0x41, 0x59, 0x01, 0x6e, 0x79, 0x78, 0x3a,
    0x30, 0xff, 0xf0, 0xff, 0xfa, 0x18, 0x00, 0x58, 0x54, 0x45, 0x52, 0x4d, 0x2d, 0x32, 0x35,
    0x36, 0x43, 0x4f, 0x4c, 0x4f, 0x52, 0xff, 0xf0,
];

/// IAC DO SGA, IAC WONT ECHO, IAC WILL NAWS, NAWS 190x48, IAC DO STATUS,
/// IAC WILL LFLOW
const FINAL_REPLIES: [u8; 24] = [
    0xff, 0xfd, 0x03, 0xff, 0xfc, 0x01, 0xff, 0xfb, 0x1f, 0xff, 0xfa, 0x1f, 0x00, 0xbe, 0x00,
    0x30, 0xff, 0xf0, 0xff, 0xfd, 0x05, 0xff, 0xfb, 0x21,
];

/// Authenticate into the container and forward its MOTD to the attacker.
///
/// Any failed step terminates the session with the I/O error; a half
/// logged-in container must not fall back to the emulated shell, the
/// attacker would see inconsistent banners.
pub fn auto_login(container: &mut ContainerConn, attacker: &mut TcpStream) -> HoneypotResult<()> {
    container.set_read_timeout(Some(STEP_TIMEOUT))?;

    let mut buffer = [0u8; 512];

    // The daemon negotiates first.
    read_step(container, &mut buffer)?;
    container.write_all(&OFFER_OPTIONS)?;

    read_step(container, &mut buffer)?;
    container.write_all(&SUBNEGOTIATION_REPLIES)?;

    read_step(container, &mut buffer)?;
    container.write_all(&FINAL_REPLIES)?;

    read_step(container, &mut buffer)?;
    thread::sleep(Duration::from_millis(50));

    // Username prompt
    read_step(container, &mut buffer)?;
    container.write_all(b"admin\r")?;
    thread::sleep(Duration::from_millis(50));

    // Password prompt
    read_step(container, &mut buffer)?;
    container.write_all(b"honey\r")?;
    thread::sleep(Duration::from_millis(100));

    // MOTD, forwarded verbatim to the attacker
    let mut motd = [0u8; 2048];
    let n = read_step(container, &mut motd)?;
    attacker.write_all(&motd[..n])?;

    debug!("Authenticated to container");
    Ok(())
}

fn read_step(container: &mut ContainerConn, buffer: &mut [u8]) -> HoneypotResult<usize> {
    match container.read(buffer) {
        Ok(0) => Err(HoneypotError::ClientDisconnected),
        Ok(n) => Ok(n),
        Err(e) => Err(e.into()),
    }
}
