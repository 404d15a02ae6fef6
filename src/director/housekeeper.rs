//! Idle-shutdown task, one per running container.
//!
//! The housekeeper wakes on every tick and stops its container once the
//! instrumented connections have been quiet for longer than the stop
//! delay, removing it from the registry so the next connection from the
//! same attacker gets a fresh clone. Dropping or signalling the stop
//! channel shuts the container down immediately.

use super::container::Container;
use crate::runtime::ContainerRuntime;

use log::{debug, info};
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

pub(crate) type Registry = Arc<Mutex<HashMap<String, Arc<Container>>>>;

/// Spawn the housekeeper for a freshly started container. The returned
/// sender stops it (and the container) immediately when signalled or
/// dropped by the director.
pub(crate) fn spawn(
    container: Arc<Container>,
    registry: Registry,
    runtime: Arc<dyn ContainerRuntime>,
) -> Sender<()> {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        info!("Housekeeper ({}) started.", container.name());

        loop {
            match rx.recv_timeout(container.delays.housekeeper_delay) {
                // Director shutdown or operator removal.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("Container {}: stopping", container.name());
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let idle = container.idle_for();
                    if idle > container.delays.stop_delay {
                        debug!(
                            "Container {}: idle for {:?}, stopping",
                            container.name(),
                            idle
                        );
                        break;
                    }
                }
            }
        }

        {
            let mut state = container.state.lock().expect("container state lock");
            container.stop(&mut state);
            if let Some(handle) = state.handle.take() {
                runtime.release(handle);
            }
        }
        // Only remove our own entry; a successor container may already
        // be registered under the same name.
        let mut registry = registry.lock().expect("registry lock");
        if let Some(current) = registry.get(container.name()) {
            if Arc::ptr_eq(current, &container) {
                registry.remove(container.name());
            }
        }
        drop(registry);

        info!("Housekeeper ({}) stopped.", container.name());
    });

    tx
}
