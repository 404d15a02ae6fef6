//! Structured event emission.
//!
//! Every phase boundary of a session produces one event: `negotiation`,
//! `credentials`, `commands` and finally `session`. Events carry the
//! service name, the attacker and listener addresses, optional agent
//! fields and an open key/value payload. Delivery goes through the
//! [`EventSink`] seam so operators can fan events out to whatever backend
//! they run; the default sink writes one JSON line per event to the log.
//!
//! The collector also keeps two process-wide observations: a per-listener
//! count of distinct attacker IPs, and an append-only catalog of parsed
//! negotiation sequences used to tag repeats.

use crate::session::Session;

use log::info;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use telnet_codec::parser::{Command, parse_commands};

/// One emitted event.
#[derive(Debug, Clone)]
pub struct Event {
    pub etype: String,
    pub service: String,
    pub source: Option<SocketAddr>,
    pub destination: Option<SocketAddr>,
    pub agent_addr: Option<SocketAddr>,
    pub agent_token: Option<String>,
    pub custom: Map<String, Value>,
}

impl Event {
    /// A bare event of the given type, not tied to a session.
    pub fn new(etype: &str) -> Self {
        Self {
            etype: etype.to_string(),
            service: "telnet".to_string(),
            source: None,
            destination: None,
            agent_addr: None,
            agent_token: None,
            custom: Map::new(),
        }
    }

    /// An event carrying the common fields of a session: source and
    /// destination addresses plus agent details when the connection was
    /// relayed.
    pub fn for_session(etype: &str, session: &Session) -> Self {
        let mut event = Self::new(etype);
        event.source = Some(session.remote_addr);
        event.destination = Some(session.local_addr);
        event.agent_addr = session.agent_addr;
        event.agent_token = session.agent_token.clone();
        event
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.custom.insert(key.to_string(), value);
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".to_string(), Value::from(self.etype.clone()));
        map.insert("service".to_string(), Value::from(self.service.clone()));
        if let Some(source) = self.source {
            map.insert("source".to_string(), Value::from(source.to_string()));
        }
        if let Some(destination) = self.destination {
            map.insert(
                "destination".to_string(),
                Value::from(destination.to_string()),
            );
        }
        if let Some(agent) = self.agent_addr {
            map.insert("agent".to_string(), Value::from(agent.to_string()));
        }
        if let Some(token) = &self.agent_token {
            map.insert("agent_token".to_string(), Value::from(token.clone()));
        }
        for (key, value) in &self.custom {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

/// Downstream delivery seam. Implementations fan events out to storage,
/// message queues, dashboards, etc.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &Event);
}

/// Default sink: one JSON line per event on the process log.
pub struct LogSink;

impl EventSink for LogSink {
    fn send(&self, event: &Event) {
        info!("{}", event.to_json());
    }
}

/// Collects session observations and emits the per-phase events.
pub struct Collector {
    sink: Box<dyn EventSink>,
    /// Previously seen parsed negotiation sequences, append-only.
    negotiations: Mutex<Vec<Vec<Command>>>,
    /// Per local IP: how often each attacker IP connected.
    connections: Mutex<HashMap<IpAddr, HashMap<IpAddr, u64>>>,
}

impl Collector {
    pub fn new(sink: Box<dyn EventSink>) -> Self {
        Self {
            sink,
            negotiations: Mutex::new(Vec::new()),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Record the incoming connection attempt and create its session
    /// record.
    pub fn register_connection(&self, remote: SocketAddr, local: SocketAddr) -> Session {
        let mut connections = self.connections.lock().expect("connections lock");
        let per_local = connections.entry(local.ip()).or_default();
        *per_local.entry(remote.ip()).or_insert(0) += 1;

        Session::new(remote, local)
    }

    /// Number of distinct attacker IPs seen by a listener address. Used
    /// by operators to gauge attack pressure.
    pub fn distinct_attackers(&self, local: IpAddr) -> usize {
        let connections = self.connections.lock().expect("connections lock");
        connections.get(&local).map_or(0, HashMap::len)
    }

    /// Check a completed negotiation against the catalog and tag repeats.
    /// New sequences are appended; the catalog never shrinks.
    pub fn submit_negotiation(&self, session: &mut Session) {
        let parsed = parse_commands(&session.negotiation.bytes);
        let mut negotiations = self.negotiations.lock().expect("negotiations lock");
        if negotiations.iter().any(|seen| *seen == parsed) {
            session.negotiation.seen_before = true;
        } else {
            negotiations.push(parsed);
        }
    }

    pub fn log_negotiation(&self, session: &Session) {
        let mut event = Event::for_session("negotiation", session);
        for (key, value) in session.negotiation.to_map() {
            event.custom.insert(key, value);
        }
        self.sink.send(&event);
    }

    pub fn log_credentials(&self, session: &Session) {
        let mut event = Event::for_session("credentials", session);
        for (key, value) in session.auth.to_map() {
            event.custom.insert(key, value);
        }
        self.sink.send(&event);
    }

    /// Emit the commands event. Skipped when the session never reached
    /// the shell.
    pub fn log_interaction(&self, session: &Session) {
        let Some(interaction) = &session.interaction else {
            return;
        };
        let mut event = Event::for_session("commands", session);
        for (key, value) in interaction.to_map() {
            event.custom.insert(key, value);
        }
        self.sink.send(&event);
    }

    /// Emit the final session summary. Always last.
    pub fn log_session(&self, session: &Session) {
        let mut event = Event::for_session("session", session);
        for (key, value) in session.to_map() {
            event.custom.insert(key, value);
        }
        self.sink.send(&event);
    }

    /// Emit a container lifecycle event on behalf of the director.
    pub fn send(&self, event: &Event) {
        self.sink.send(event);
    }
}
