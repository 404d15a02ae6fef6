//! Shared fixtures for the integration tests: an in-memory container
//! runtime, an event-recording sink, and small socket helpers.

#![allow(dead_code)]

use nyx::config::HoneypotConfig;
use nyx::events::{Collector, Event, EventSink};
use nyx::runtime::{CloneOptions, ContainerHandle, ContainerRuntime, RuntimeError};

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Test configuration with a known allow-list and no real template.
pub fn test_config() -> HoneypotConfig {
    let mut config = HoneypotConfig::default();
    config.telnet.credentials = vec!["root:honey".to_string(), "admin:admin".to_string()];
    config.telnet.root_credentials = vec!["root:honey".to_string()];
    config
}

/// Sink capturing every event for later assertions.
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<Event>>>,
}

impl EventSink for RecordingSink {
    fn send(&self, event: &Event) {
        self.events.lock().expect("events lock").push(event.clone());
    }
}

/// A collector wired to a recording sink, plus the recorded events.
pub fn recording_collector() -> (Arc<Collector>, Arc<Mutex<Vec<Event>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = Arc::new(Collector::new(Box::new(RecordingSink {
        events: Arc::clone(&events),
    })));
    (collector, events)
}

/// Read from `stream` until the collected text contains `needle`.
/// Panics after the deadline; test servers always make progress.
pub fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .expect("set timeout");

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut collected = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        if let Ok(n) = stream.read(&mut buf) {
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        let text = String::from_utf8_lossy(&collected);
        if text.contains(needle) {
            return text.into_owned();
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {:?}; got {:?}",
            needle,
            String::from_utf8_lossy(&collected)
        );
    }
    let text = String::from_utf8_lossy(&collected).into_owned();
    assert!(
        text.contains(needle),
        "stream closed before {:?}; got {:?}",
        needle,
        text
    );
    text
}

/// Observable state of the in-memory container backend.
#[derive(Default)]
pub struct MockState {
    /// Containers that physically exist.
    pub defined: HashSet<String>,
    pub running: HashSet<String>,
    /// `(from, to)` pairs, in clone order.
    pub clones: Vec<(String, String)>,
    pub starts: u32,
    pub stops: u32,
    /// `set_config_item` calls per container.
    pub config: HashMap<String, Vec<(String, String)>>,
    /// Address reported for eth0 of every running container.
    pub guest_ip: String,
    pub fail_clone: bool,
}

/// In-memory [`ContainerRuntime`]. Overlay clones are disposable:
/// releasing a handle discards the underlying container, so a reaped
/// attacker gets a fresh clone on its next visit.
pub struct MockRuntime {
    pub state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    /// A runtime with the template defined and guests reachable at
    /// `guest_ip`.
    pub fn new(template: &str, guest_ip: &str) -> Self {
        let mut state = MockState {
            guest_ip: guest_ip.to_string(),
            ..Default::default()
        };
        state.defined.insert(template.to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }
}

impl ContainerRuntime for MockRuntime {
    fn new_handle(&self, name: &str) -> Result<Box<dyn ContainerHandle>, RuntimeError> {
        let state = self.state.lock().expect("mock state lock");
        if !state.defined.contains(name) {
            return Err(RuntimeError(format!("container '{}' not defined", name)));
        }
        Ok(Box::new(MockHandle {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        }))
    }

    fn clone_container(
        &self,
        from: &str,
        to: &str,
        options: &CloneOptions,
    ) -> Result<(), RuntimeError> {
        assert!(options.overlay && options.snapshot && options.keep_name);

        let mut state = self.state.lock().expect("mock state lock");
        if state.fail_clone {
            return Err(RuntimeError("clone failed".to_string()));
        }
        if !state.defined.contains(from) {
            return Err(RuntimeError(format!("template '{}' not defined", from)));
        }
        state.clones.push((from.to_string(), to.to_string()));
        state.defined.insert(to.to_string());
        Ok(())
    }

    fn release(&self, handle: Box<dyn ContainerHandle>) {
        // Disposable overlay clones do not outlive their handle.
        let mut state = self.state.lock().expect("mock state lock");
        state.defined.remove(handle.name());
    }
}

pub struct MockHandle {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl ContainerHandle for MockHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().expect("mock state lock");
        state.running.insert(self.name.clone());
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().expect("mock state lock");
        state.running.remove(&self.name);
        state.stops += 1;
        Ok(())
    }

    fn running(&self) -> bool {
        self.state
            .lock()
            .expect("mock state lock")
            .running
            .contains(&self.name)
    }

    fn ip_address(&self, interface: &str) -> Result<Vec<String>, RuntimeError> {
        let state = self.state.lock().expect("mock state lock");
        if interface != "eth0" || !state.running.contains(&self.name) {
            return Err(RuntimeError("no address yet".to_string()));
        }
        Ok(vec![state.guest_ip.clone()])
    }

    fn config_item(&self, key: &str) -> Vec<String> {
        match key {
            // One network interface.
            "net" => vec![String::new()],
            _ => Vec::new(),
        }
    }

    fn set_config_item(&mut self, key: &str, value: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().expect("mock state lock");
        state
            .config
            .entry(self.name.clone())
            .or_default()
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn running_config_item(&self, key: &str) -> Vec<String> {
        match key {
            "net.0.0.type" => vec!["veth".to_string()],
            "net.0.0.veth.pair" => vec!["veth1001".to_string()],
            _ => Vec::new(),
        }
    }

    fn want_daemonize(&mut self, _daemonize: bool) -> Result<(), RuntimeError> {
        Ok(())
    }
}
