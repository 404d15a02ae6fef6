//! High-interaction proxy: attacker <-> container byte pump.
//!
//! Three cooperating activities service one session: an ingress pump
//! reading the attacker and feeding the container inbox, an inbox drain
//! writing to the container, and an egress pump on the session thread
//! relaying container output back. The egress path filters mount-table
//! lines that would reveal the sandbox. A shared cancellation flag plus
//! socket shutdown stops all three as soon as any of them fails; the
//! inbox closes when the ingress pump exits, so the drain observes
//! end-of-stream deterministically.

use crate::director::ContainerConn;
use crate::errors::{HoneypotError, HoneypotResult};
use crate::session::Interaction;

use log::error;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Ingress reads idle out after this long; the deadline itself is
/// non-fatal, attackers routinely leave shells open.
const INGRESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Egress reads wake at least this often to observe cancellation.
const EGRESS_TIMEOUT: Duration = Duration::from_secs(60);

const PUMP_BUFFER: usize = 32 * 1024;

/// The attacker's container endpoint: the connection to the inner
/// daemon plus the inbox carrying attacker bytes toward it.
struct TelnetContainer {
    connection: ContainerConn,
    inbox: Sender<Vec<u8>>,
}

/// Run the proxied shell until either side closes.
///
/// Fills `interaction` with everything the attacker typed, keystroke
/// timings (first byte of each burst carries the elapsed time), and the
/// command lines reconstructed at teardown.
pub fn high_interaction(
    attacker: &mut TcpStream,
    container: ContainerConn,
    replace_mounts: bool,
    interaction: &mut Interaction,
) -> HoneypotResult<()> {
    if let Ok(ip) = container.peer_ip() {
        interaction.container_ip = Some(ip);
    }

    let (inbox, outbox) = mpsc::channel::<Vec<u8>>();
    let cancel = Arc::new(AtomicBool::new(false));

    let telnet_container = TelnetContainer {
        connection: container,
        inbox,
    };

    // Ingress pump: attacker -> inbox
    let ingress = {
        let reader = attacker.try_clone()?;
        let container = telnet_container.connection.try_clone()?;
        let inbox = telnet_container.inbox.clone();
        let cancel = Arc::clone(&cancel);
        thread::spawn(move || ingress_pump(reader, inbox, cancel, container))
    };
    // The pump owns the only remaining sender; its exit closes the inbox.
    drop(telnet_container.inbox);

    // Inbox drain: inbox -> container
    let drain = {
        let writer = telnet_container.connection.try_clone()?;
        let cancel = Arc::clone(&cancel);
        thread::spawn(move || inbox_drain(outbox, writer, cancel))
    };

    // Egress pump: container -> attacker, on the session thread
    let mut container = telnet_container.connection;
    container.set_read_timeout(Some(EGRESS_TIMEOUT))?;
    let mut buffer = [0u8; PUMP_BUFFER];
    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        match container.read(&mut buffer) {
            Ok(0) => {
                cancel.store(true, Ordering::Relaxed);
                break;
            }
            Ok(n) => {
                let output = if replace_mounts {
                    scrub_container_output(&buffer[..n])
                } else {
                    buffer[..n].to_vec()
                };
                if !output.is_empty() {
                    if let Err(e) = attacker.write_all(&output) {
                        error!("Error writing to connection: {}", e);
                        cancel.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    cancel.store(true, Ordering::Relaxed);
    // Unblock the ingress pump and tear the data path down.
    let _ = attacker.shutdown(Shutdown::Read);
    let _ = container.shutdown(Shutdown::Both);

    let (input, input_times) = ingress
        .join()
        .map_err(|_| HoneypotError::Container("ingress pump panicked".to_string()))?;
    let _ = drain.join();

    interaction.input = input;
    interaction.input_times = input_times;
    reconstruct_commands(interaction);

    Ok(())
}

/// Read the attacker and forward every burst to the container inbox.
/// Returns the captured input and its timing vector.
fn ingress_pump(
    mut reader: TcpStream,
    inbox: Sender<Vec<u8>>,
    cancel: Arc<AtomicBool>,
    container: ContainerConn,
) -> (Vec<u8>, Vec<i64>) {
    let mut input = Vec::new();
    let mut input_times = Vec::new();

    if reader.set_read_timeout(Some(INGRESS_TIMEOUT)).is_err() {
        cancel.store(true, Ordering::Relaxed);
    }

    let mut buffer = [0u8; PUMP_BUFFER];
    let mut last_input = Instant::now();

    while !cancel.load(Ordering::Relaxed) {
        match reader.read(&mut buffer) {
            Ok(0) => {
                cancel.store(true, Ordering::Relaxed);
                break;
            }
            Ok(n) => {
                input_times.push(last_input.elapsed().as_millis() as i64);
                input_times.extend(std::iter::repeat(0).take(n - 1));
                last_input = Instant::now();
                input.extend_from_slice(&buffer[..n]);

                if inbox.send(buffer[..n].to_vec()).is_err() {
                    cancel.store(true, Ordering::Relaxed);
                    break;
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                error!("Error reading from connection: {}", e);
                cancel.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    // Unblock a peer pump stuck in a container read.
    let _ = container.shutdown(Shutdown::Both);
    (input, input_times)
}

/// Write inbox buffers to the container until the inbox closes.
fn inbox_drain(outbox: Receiver<Vec<u8>>, mut writer: ContainerConn, cancel: Arc<AtomicBool>) {
    while let Ok(data) = outbox.recv() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        if let Err(e) = writer.write_all(&data) {
            error!("Error writing to container: {}", e);
            cancel.store(true, Ordering::Relaxed);
            break;
        }
    }
}

/// Markers that, combined with mount-table syntax, identify lines
/// revealing the container runtime.
const LEAK_MARKERS: [&[u8]; 5] = [b"lxc", b"cgroup", b"honeytrap", b"pstore", b"hugetlbfs"];

/// Drop mount-table lines that would expose the sandbox, keeping
/// everything else byte-identical.
fn scrub_container_output(buffer: &[u8]) -> Vec<u8> {
    buffer
        .split_inclusive(|b| *b == b'\n')
        .filter(|line| !is_leak_line(line))
        .flatten()
        .copied()
        .collect()
}

/// A line leaks iff it carries the mount-table shape (`relatime` and
/// `0 0`) plus one of the runtime markers.
fn is_leak_line(line: &[u8]) -> bool {
    contains(line, b"relatime")
        && contains(line, b"0 0")
        && LEAK_MARKERS.iter().any(|marker| contains(line, marker))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

/// Rebuild command lines from the captured input: embedded NULs become
/// newlines, then the stream splits on LF with trailing CRs stripped.
fn reconstruct_commands(interaction: &mut Interaction) {
    let normalized: Vec<u8> = interaction
        .input
        .iter()
        .map(|b| if *b == 0 { b'\n' } else { *b })
        .collect();

    let mut lines: Vec<&[u8]> = normalized.split(|b| *b == b'\n').collect();
    if lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }

    for line in lines {
        let line = match line.last() {
            Some(b'\r') => &line[..line.len() - 1],
            _ => line,
        };
        interaction
            .commands
            .push(String::from_utf8_lossy(line).into_owned());
    }
}
