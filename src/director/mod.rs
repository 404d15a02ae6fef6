//! Container director: one disposable sandbox per attacker.
//!
//! Each source IP maps deterministically to a container name; the first
//! connection clones that container from the template, later ones reuse
//! it while it is still running. Started containers are watched by a
//! housekeeper task that reaps them after an idle period, so sandboxes
//! cost nothing while no attacker is active.

mod autologin;
mod container;
mod housekeeper;

pub use autologin::auto_login;
pub use container::{Container, ContainerConn, Delays};

use crate::config::DirectorConfig;
use crate::errors::{HoneypotError, HoneypotResult};
use crate::events::{Collector, Event};
use crate::runtime::{CloneOptions, ContainerRuntime};

use housekeeper::Registry;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

/// Clone settings for per-attacker sandboxes: fast, non-destructive
/// overlay snapshots of the template.
const CLONE_OPTIONS: CloneOptions = CloneOptions {
    overlay: true,
    snapshot: true,
    keep_name: true,
};

/// Manages the container registry and every container lifecycle.
pub struct Director {
    template: String,
    delays: Delays,
    runtime: Arc<dyn ContainerRuntime>,
    registry: Registry,
    collector: Arc<Collector>,
}

impl Director {
    pub fn new(
        config: &DirectorConfig,
        runtime: Arc<dyn ContainerRuntime>,
        collector: Arc<Collector>,
    ) -> Self {
        Self {
            template: config.template.clone(),
            delays: Delays {
                stop_delay: config.stop_every,
                housekeeper_delay: config.housekeeper_every,
            },
            runtime,
            registry: Arc::new(Mutex::new(HashMap::new())),
            collector,
        }
    }

    /// The sticky container name for an attacker: `firmware-` plus the
    /// FNV-1 hash of the source IP, so the same address always lands in
    /// the same sandbox.
    pub fn container_name(remote_ip: IpAddr) -> String {
        format!("firmware-{:08x}", fnv32(remote_ip.to_string().as_bytes()))
    }

    /// Connect an attacker to the telnet daemon inside its container,
    /// cloning and booting the container if needed. The target port is
    /// the local port the attacker hit.
    pub fn dial(&self, remote: SocketAddr, local: SocketAddr) -> HoneypotResult<ContainerConn> {
        let container = self.container_for(remote.ip())?;

        let result = self.connect(&container, local.port());
        if result.is_err() {
            // Drop the record so the next attempt retries cleanly.
            self.registry
                .lock()
                .expect("registry lock")
                .remove(container.name());
        }
        result
    }

    fn connect(&self, container: &Arc<Container>, port: u16) -> HoneypotResult<ContainerConn> {
        {
            let mut state = container.state.lock().expect("container state lock");
            let running = state.handle.as_ref().is_some_and(|h| h.running());
            if !running {
                self.start(container, &mut state)?;
                container.discover_network(&mut state)?;
            }
        }

        Arc::clone(container).dial(port)
    }

    /// Look up or create the registry entry for an attacker, adopting an
    /// existing physical container or cloning a fresh one from the
    /// template. Two racing first-connections agree on one record; the
    /// loser blocks on the state mutex until the winner initialized it.
    fn container_for(&self, remote_ip: IpAddr) -> HoneypotResult<Arc<Container>> {
        let name = Self::container_name(remote_ip);

        let container = {
            let mut registry = self.registry.lock().expect("registry lock");
            Arc::clone(registry.entry(name.clone()).or_insert_with(|| {
                Arc::new(Container::new(
                    name.clone(),
                    self.template.clone(),
                    self.delays,
                ))
            }))
        };

        let mut state = container.state.lock().expect("container state lock");
        if state.handle.is_none() {
            match self.initialize(&name, &mut state.handle) {
                Ok(()) => {}
                Err(e) => {
                    drop(state);
                    self.registry.lock().expect("registry lock").remove(&name);
                    return Err(e);
                }
            }
        }
        drop(state);

        Ok(container)
    }

    fn initialize(
        &self,
        name: &str,
        slot: &mut Option<Box<dyn crate::runtime::ContainerHandle>>,
    ) -> HoneypotResult<()> {
        // Adopt the physical container if it already exists.
        if let Ok(handle) = self.runtime.new_handle(name) {
            *slot = Some(handle);
            return Ok(());
        }

        debug!("Cloning {} from template {}", name, self.template);
        self.runtime
            .clone_container(&self.template, name, &CLONE_OPTIONS)
            .map_err(|e| HoneypotError::Container(e.to_string()))?;

        let mut handle = self
            .runtime
            .new_handle(name)
            .map_err(|e| HoneypotError::Container(e.to_string()))?;

        // Neutralize the environment for deception: no console, no TTYs,
        // no access to /dev/console.
        for (key, value) in [
            ("console.path", "none"),
            ("tty.max", "0"),
            ("cgroup.devices.deny", "c 5:1 rwm"),
        ] {
            handle
                .set_config_item(key, value)
                .map_err(|e| HoneypotError::Container(e.to_string()))?;
        }

        let mut event = Event::new("container-clone");
        event.insert("container", Value::from(name));
        event.insert("template", Value::from(self.template.clone()));
        self.collector.send(&event);

        *slot = Some(handle);
        Ok(())
    }

    /// Boot a stopped container and hand it to a housekeeper. Called
    /// under the container's state mutex.
    fn start(
        &self,
        container: &Arc<Container>,
        state: &mut container::ContainerState,
    ) -> HoneypotResult<()> {
        debug!("Starting container {}", container.name());

        container.touch();
        let stopper = housekeeper::spawn(
            Arc::clone(container),
            Arc::clone(&self.registry),
            Arc::clone(&self.runtime),
        );
        *container.housekeeper.lock().expect("housekeeper lock") = Some(stopper);

        let handle = state
            .handle
            .as_mut()
            .ok_or_else(|| HoneypotError::Container("container has no handle".to_string()))?;
        handle
            .want_daemonize(true)
            .map_err(|e| HoneypotError::Container(e.to_string()))?;
        handle
            .start()
            .map_err(|e| HoneypotError::Container(e.to_string()))?;

        let mut event = Event::new("container-start");
        event.insert("container", Value::from(container.name()));
        self.collector.send(&event);
        Ok(())
    }

    /// Names of the containers currently tracked.
    pub fn active_containers(&self) -> Vec<String> {
        self.registry
            .lock()
            .expect("registry lock")
            .keys()
            .cloned()
            .collect()
    }

    /// Whether an attacker currently has a tracked container.
    pub fn tracks(&self, name: &str) -> bool {
        self.registry
            .lock()
            .expect("registry lock")
            .contains_key(name)
    }

    /// Operator removal: stop tracking a container and shut it down.
    /// Returns false when the name is unknown.
    pub fn remove_client(&self, name: &str) -> bool {
        let removed = self.registry.lock().expect("registry lock").remove(name);
        match removed {
            Some(container) => {
                signal_stop(&container);
                true
            }
            None => false,
        }
    }

    /// Operator removal that additionally force-closes every live proxy
    /// connection belonging to the container.
    pub fn remove_client_with_connections(&self, name: &str) -> bool {
        let removed = self.registry.lock().expect("registry lock").remove(name);
        match removed {
            Some(container) => {
                container.drop_connections();
                signal_stop(&container);
                true
            }
            None => false,
        }
    }

    /// Stop every tracked container and its housekeeper.
    pub fn shutdown(&self) {
        let containers: Vec<Arc<Container>> = {
            let mut registry = self.registry.lock().expect("registry lock");
            registry.drain().map(|(_, c)| c).collect()
        };
        for container in containers {
            signal_stop(&container);
        }
    }
}

/// Ask a container's housekeeper to stop it now. Containers that never
/// started have no housekeeper and nothing to stop.
fn signal_stop(container: &Arc<Container>) {
    if let Some(stopper) = container
        .housekeeper
        .lock()
        .expect("housekeeper lock")
        .take()
    {
        let _ = stopper.send(());
    }
}

/// 32-bit FNV-1 (multiply then xor), matching the checksum the name
/// scheme was deployed with.
fn fnv32(data: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in data {
        hash = hash.wrapping_mul(16_777_619) ^ u32::from(*byte);
    }
    hash
}
