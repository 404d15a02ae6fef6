//! Per-attacker container state.
//!
//! A [`Container`] pairs a runtime handle with the bookkeeping the
//! director needs: a serialization mutex over lifecycle operations, the
//! last-activity timestamp the housekeeper watches, the discovered
//! network details, and the proxy connections currently running through
//! it. The [`ContainerConn`] wrapper stamps activity on every read and
//! write so traffic counts as liveness.

use crate::errors::{HoneypotError, HoneypotResult};
use crate::runtime::ContainerHandle;

use log::{debug, error};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Retries while the guest boots: 50 attempts, 200 ms apart.
const BOOT_RETRIES: u32 = 50;
const BOOT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Idle-shutdown timing for one container.
#[derive(Debug, Clone, Copy)]
pub struct Delays {
    /// Idle cutoff after which the housekeeper stops the container.
    pub stop_delay: Duration,
    /// Housekeeper tick interval.
    pub housekeeper_delay: Duration,
}

/// Backend state guarded by the container mutex.
pub(crate) struct ContainerState {
    pub handle: Option<Box<dyn ContainerHandle>>,
    pub ip: Option<IpAddr>,
    /// Host-side network device, input for the optional packet sniffer.
    pub device: Option<String>,
}

/// One attacker's sandbox and its bookkeeping.
pub struct Container {
    name: String,
    template: String,
    pub(crate) delays: Delays,
    pub(crate) state: Mutex<ContainerState>,
    last_activity: Mutex<Instant>,
    /// Live proxy connections, tracked for operator force-close.
    connections: Mutex<Vec<TcpStream>>,
    /// Stop signal for the housekeeper task, present once started.
    pub(crate) housekeeper: Mutex<Option<Sender<()>>>,
}

impl Container {
    pub(crate) fn new(name: String, template: String, delays: Delays) -> Self {
        Self {
            name,
            template,
            delays,
            state: Mutex::new(ContainerState {
                handle: None,
                ip: None,
                device: None,
            }),
            last_activity: Mutex::new(Instant::now()),
            connections: Mutex::new(Vec::new()),
            housekeeper: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Discovered guest IP, once the container started.
    pub fn ip(&self) -> Option<IpAddr> {
        self.state.lock().expect("container state lock").ip
    }

    /// Mark the container as active now.
    pub(crate) fn touch(&self) {
        *self.last_activity.lock().expect("last activity lock") = Instant::now();
    }

    /// How long the container has been without traffic.
    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .expect("last activity lock")
            .elapsed()
    }

    /// Discover the guest IP and the host-side network device. Retries
    /// while the guest network stack is still coming up.
    pub(crate) fn discover_network(&self, state: &mut ContainerState) -> HoneypotResult<()> {
        let handle = state
            .handle
            .as_mut()
            .ok_or_else(|| HoneypotError::Container("container has no handle".to_string()))?;

        let mut retries = 0;
        let ip = loop {
            match handle.ip_address("eth0") {
                Ok(addresses) if !addresses.is_empty() => {
                    debug!("Got ip: {}", addresses[0]);
                    break addresses[0].parse::<IpAddr>().map_err(|_| {
                        HoneypotError::Container(format!(
                            "unparseable container address '{}'",
                            addresses[0]
                        ))
                    })?;
                }
                _ => {
                    if retries >= BOOT_RETRIES {
                        return Err(HoneypotError::Container(
                            "could not get an IP address".to_string(),
                        ));
                    }
                    std::thread::sleep(BOOT_RETRY_DELAY);
                    retries += 1;
                }
            }
        };
        state.ip = Some(ip);

        // First veth interface wins; plain bridged interfaces fall back
        // to their link device.
        let mut device = Vec::new();
        let interfaces = handle.config_item("net");
        for index in 0..interfaces.len() {
            let itype = handle.running_config_item(&format!("net.0.{}.type", index));
            if itype.is_empty() {
                continue;
            }

            if itype[0] == "veth" {
                device = handle.running_config_item(&format!("net.0.{}.veth.pair", index));
            } else {
                device = handle.running_config_item(&format!("net.0.{}.link", index));
            }
            break;
        }

        if device.is_empty() {
            return Err(HoneypotError::Container(
                "could not get a network device".to_string(),
            ));
        }

        debug!("Using network device {} for {}", device[0], self.name);
        state.device = Some(device[0].clone());

        self.touch();
        Ok(())
    }

    /// Connect to the daemon inside the container, retrying while it
    /// boots. The returned connection is instrumented: traffic through
    /// it refreshes the container's activity timestamp.
    pub(crate) fn dial(self: Arc<Self>, port: u16) -> HoneypotResult<ContainerConn> {
        let ip = self.ip().ok_or_else(|| {
            HoneypotError::Container("container has no address yet".to_string())
        })?;
        let address = SocketAddr::new(ip, port);

        let mut retries = 0;
        loop {
            match TcpStream::connect(address) {
                Ok(stream) => {
                    if let Ok(tracked) = stream.try_clone() {
                        self.connections
                            .lock()
                            .expect("connections lock")
                            .push(tracked);
                    }
                    return Ok(ContainerConn {
                        inner: stream,
                        container: Arc::clone(&self),
                    });
                }
                Err(e) => {
                    if retries >= BOOT_RETRIES {
                        return Err(HoneypotError::Container(
                            "could not connect to container".to_string(),
                        ));
                    }
                    debug!(
                        "Waiting for container to be fully started {} ({})",
                        self.name, e
                    );
                    std::thread::sleep(BOOT_RETRY_DELAY);
                    retries += 1;
                }
            }
        }
    }

    /// Stop the backend container. Called under the state mutex.
    pub(crate) fn stop(&self, state: &mut ContainerState) {
        if let Some(handle) = state.handle.as_mut() {
            if let Err(e) = handle.stop() {
                error!("Container {}: stop failed: {}", self.name, e);
            }
        }
    }

    /// Force-close every tracked proxy connection. Sessions holding one
    /// observe a read error on their next pump iteration.
    pub fn drop_connections(&self) {
        let mut connections = self.connections.lock().expect("connections lock");
        for connection in connections.drain(..) {
            let _ = connection.shutdown(Shutdown::Both);
        }
    }
}

/// Connection into a container that refreshes the owner's activity
/// timestamp on every read and write.
pub struct ContainerConn {
    inner: TcpStream,
    container: Arc<Container>,
}

impl ContainerConn {
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Address of the in-container daemon this connection talks to.
    pub fn peer_ip(&self) -> io::Result<IpAddr> {
        Ok(self.inner.peer_addr()?.ip())
    }

    pub fn try_clone(&self) -> io::Result<ContainerConn> {
        Ok(ContainerConn {
            inner: self.inner.try_clone()?,
            container: Arc::clone(&self.container),
        })
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.set_read_timeout(timeout)
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.inner.shutdown(how)
    }
}

impl Read for ContainerConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.container.touch();
        self.inner.read(buf)
    }
}

impl Write for ContainerConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.container.touch();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
