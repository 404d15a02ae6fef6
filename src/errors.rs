use std::fmt;

/// Custom configuration errors
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String, String),
    UnknownKey(String),
    UnknownSection(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(key, value) => {
                write!(f, "Invalid value '{}' for key '{}'", value, key)
            }
            ConfigError::UnknownKey(key) => write!(f, "Unknown configuration key: '{}'", key),
            ConfigError::UnknownSection(section) => write!(f, "Unknown section: '{}'", section),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom honeypot errors
#[derive(Debug)]
pub enum HoneypotError {
    /// I/O related errors (network, file operations, etc.)
    Io(std::io::Error),

    /// A read or write deadline expired. Non-fatal: the current session
    /// phase ends, events for completed phases are still emitted.
    Timeout,

    /// Attacker disconnected
    ClientDisconnected,

    /// Container lifecycle failure (clone, start, IP discovery, dial)
    Container(String),

    /// Configuration error
    Configuration(String),
}

impl fmt::Display for HoneypotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoneypotError::Io(err) => write!(f, "I/O error: {}", err),
            HoneypotError::Timeout => write!(f, "Read deadline expired"),
            HoneypotError::ClientDisconnected => write!(f, "Client disconnected"),
            HoneypotError::Container(msg) => write!(f, "Container error: {}", msg),
            HoneypotError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for HoneypotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HoneypotError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HoneypotError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => HoneypotError::ClientDisconnected,
            // set_read_timeout expiry surfaces as WouldBlock on Unix and
            // TimedOut on Windows.
            ErrorKind::WouldBlock | ErrorKind::TimedOut => HoneypotError::Timeout,
            _ => HoneypotError::Io(err),
        }
    }
}

impl From<ConfigError> for HoneypotError {
    fn from(err: ConfigError) -> Self {
        HoneypotError::Configuration(err.to_string())
    }
}

/// Result type alias for honeypot operations
pub type HoneypotResult<T> = Result<T, HoneypotError>;
