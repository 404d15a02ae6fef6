//! Abstract container runtime.
//!
//! The director manages container lifecycles but never talks to a
//! backend directly; it goes through these traits. A backend must
//! provide handle lookup, overlay cloning, start/stop, and access to
//! network and configuration state. Anything implementing them (LXC,
//! a systemd-nspawn wrapper, an in-memory fake for tests) can back the
//! high-interaction mode.

use std::fmt;

/// Failure reported by the container backend.
#[derive(Debug)]
pub struct RuntimeError(pub String);

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container runtime: {}", self.0)
    }
}

impl std::error::Error for RuntimeError {}

/// Options for cloning a template into a per-attacker container.
#[derive(Debug, Clone, Copy)]
pub struct CloneOptions {
    /// Use an overlay filesystem backend for the clone.
    pub overlay: bool,
    /// Snapshot rather than copy; non-destructive and fast.
    pub snapshot: bool,
    /// Keep the target name as given.
    pub keep_name: bool,
}

/// One physical container.
///
/// Methods mutate backend state and are called under the owning
/// container's mutex, never concurrently for the same name.
pub trait ContainerHandle: Send {
    fn name(&self) -> &str;

    fn start(&mut self) -> Result<(), RuntimeError>;

    fn stop(&mut self) -> Result<(), RuntimeError>;

    fn running(&self) -> bool;

    /// Addresses currently assigned to an interface inside the
    /// container. Fails while the guest network is still coming up.
    fn ip_address(&self, interface: &str) -> Result<Vec<String>, RuntimeError>;

    /// Values of a configuration key. Empty when unset.
    fn config_item(&self, key: &str) -> Vec<String>;

    fn set_config_item(&mut self, key: &str, value: &str) -> Result<(), RuntimeError>;

    /// Like `config_item`, but reads the live configuration of a running
    /// container.
    fn running_config_item(&self, key: &str) -> Vec<String>;

    /// Request that the next start detaches into the background.
    fn want_daemonize(&mut self, daemonize: bool) -> Result<(), RuntimeError>;
}

/// Backend entry points that are not tied to one container.
pub trait ContainerRuntime: Send + Sync {
    /// Obtain a handle for an existing container. Errors when no
    /// container of that name is defined.
    fn new_handle(&self, name: &str) -> Result<Box<dyn ContainerHandle>, RuntimeError>;

    /// Clone `from` into a new container `to`.
    fn clone_container(
        &self,
        from: &str,
        to: &str,
        options: &CloneOptions,
    ) -> Result<(), RuntimeError>;

    /// Return a handle to the backend. The default implementation just
    /// drops it.
    fn release(&self, handle: Box<dyn ContainerHandle>) {
        drop(handle);
    }
}
