//! Per-connection session records.
//!
//! One [`Session`] exists per accepted connection, owned by its session
//! thread. It aggregates what the attacker did in each phase: the raw
//! negotiation exchange, the credentials tried, and the shell interaction.
//! The records are pure data; event emission lives in [`crate::events`]
//! and receives the session as context, so no record needs a reference
//! back to its parent.

use jiff::Timestamp;
use serde_json::{Map, Value};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Everything observed during one attacker connection.
///
/// Phases are strictly ordered: negotiation precedes auth precedes
/// interaction. A later field left empty means the session ended in an
/// earlier phase.
#[derive(Debug)]
pub struct Session {
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    /// Address of the reporting agent, when the connection was relayed.
    pub agent_addr: Option<SocketAddr>,
    pub agent_token: Option<String>,
    pub start_time: Timestamp,
    started: Instant,
    pub duration_ms: i64,
    /// The banner that was sent to this attacker.
    pub banner: String,
    pub negotiation: Negotiation,
    pub auth: Auth,
    pub interaction: Option<Interaction>,
    /// Set when the peer never completed a telnet negotiation; its bytes
    /// are then treated as plain input.
    pub raw: bool,
}

impl Session {
    pub fn new(remote_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            local_addr,
            agent_addr: None,
            agent_token: None,
            start_time: Timestamp::now(),
            started: Instant::now(),
            duration_ms: 0,
            banner: String::new(),
            negotiation: Negotiation::default(),
            auth: Auth::default(),
            interaction: None,
            raw: false,
        }
    }

    /// Record the final session duration. Called once at teardown.
    pub fn finish(&mut self) {
        self.duration_ms = self.started.elapsed().as_millis() as i64;
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("banner".to_string(), Value::from(self.banner.clone()));
        map.insert(
            "negotiation".to_string(),
            Value::Object(self.negotiation.to_map()),
        );
        map.insert("credentials".to_string(), Value::Object(self.auth.to_map()));
        map.insert(
            "interaction".to_string(),
            match &self.interaction {
                Some(interaction) => Value::Object(interaction.to_map()),
                None => Value::Null,
            },
        );
        map.insert(
            "session_start".to_string(),
            Value::from(self.start_time.to_string()),
        );
        map.insert("session_duration".to_string(), Value::from(self.duration_ms));
        map.insert("raw".to_string(), Value::from(self.raw));
        map
    }
}

/// The option exchange at the start of a session.
///
/// Filled by the negotiator and never mutated afterwards, except for the
/// catalog's seen-before tag.
#[derive(Debug, Default)]
pub struct Negotiation {
    /// Every byte received during the exchange, in order.
    pub bytes: Vec<u8>,
    pub command_echo: bool,
    pub command_linemode: bool,
    /// Peer answered ECHO with DO.
    pub value_echo: bool,
    /// Peer answered LINEMODE with WILL.
    pub value_linemode: bool,
    /// Both ECHO and LINEMODE commands were observed.
    pub valid: bool,
    /// An identical parsed sequence was seen earlier in this process.
    pub seen_before: bool,
}

impl Negotiation {
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("bytes".to_string(), bytes_to_ints(&self.bytes));
        map.insert("echo".to_string(), Value::from(self.value_echo));
        map.insert("linemode".to_string(), Value::from(self.value_linemode));
        map.insert("valid".to_string(), Value::from(self.valid));
        map.insert("seen".to_string(), Value::from(self.seen_before));
        map
    }
}

/// The credential phase: every keystroke, its timing, and the submitted
/// username/password pairs.
#[derive(Debug, Default)]
pub struct Auth {
    pub input: Vec<u8>,
    /// Milliseconds since the previous byte, parallel to `input`.
    pub input_times: Vec<i64>,
    pub usernames: Vec<String>,
    pub passwords: Vec<String>,
    /// `user:pass` per attempt, parallel to `usernames`/`passwords`.
    pub entries: Vec<String>,
    pub success: bool,
    /// Whether the matched entry grants root. Only set when a root
    /// allow-list is configured.
    pub root: Option<bool>,
}

impl Auth {
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("input_bytes".to_string(), bytes_to_ints(&self.input));
        map.insert(
            "input_times".to_string(),
            Value::from(self.input_times.clone()),
        );
        map.insert("usernames".to_string(), Value::from(self.usernames.clone()));
        map.insert("passwords".to_string(), Value::from(self.passwords.clone()));
        map.insert("entries".to_string(), Value::from(self.entries.clone()));
        map.insert("success".to_string(), Value::from(self.success));
        map.insert(
            "root".to_string(),
            match self.root {
                Some(root) => Value::from(root),
                None => Value::Null,
            },
        );
        map
    }
}

/// The shell phase, emulated or proxied.
#[derive(Debug, Default)]
pub struct Interaction {
    pub input: Vec<u8>,
    /// Milliseconds since the previous byte, parallel to `input`.
    pub input_times: Vec<i64>,
    /// Command lines reconstructed from the input stream.
    pub commands: Vec<String>,
    /// IP of the container backing a high-interaction session.
    pub container_ip: Option<IpAddr>,
}

impl Interaction {
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("input_bytes".to_string(), bytes_to_ints(&self.input));
        map.insert(
            "input_times".to_string(),
            Value::from(self.input_times.clone()),
        );
        map.insert("commands".to_string(), Value::from(self.commands.clone()));
        if let Some(ip) = self.container_ip {
            map.insert("container_ip".to_string(), Value::from(ip.to_string()));
        }
        map
    }
}

/// Convert raw bytes to "readable" int values for JSON emission.
fn bytes_to_ints(bytes: &[u8]) -> Value {
    Value::from(bytes.iter().map(|b| u64::from(*b)).collect::<Vec<u64>>())
}
