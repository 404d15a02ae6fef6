use crate::errors::ConfigError;

use std::fs;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HoneypotConfig {
    pub server: ServerConfig,
    pub telnet: TelnetConfig,
    pub director: DirectorConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_connections: usize,
}

#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// Allow-list of `user:pass` entries. Membership grants a shell.
    pub credentials: Vec<String>,
    /// Optional second allow-list marking matched entries as root.
    pub root_credentials: Vec<String>,
    /// Login banners, selected per local address. Up to eight are used.
    pub banners: Vec<String>,
    /// Strip container artifacts from proxied mount-table output.
    pub replace_mounts: bool,
}

#[derive(Debug, Clone)]
pub struct DirectorConfig {
    pub enabled: bool,
    /// Template container cloned for each attacker.
    pub template: String,
    /// Idle cutoff after which a container is stopped.
    pub stop_every: Duration,
    /// Housekeeper tick interval.
    pub housekeeper_every: Duration,
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 2323,
                max_connections: 50,
            },
            telnet: TelnetConfig {
                credentials: vec![
                    "admin:admin".to_string(),
                    "root:root".to_string(),
                    "root:honey".to_string(),
                ],
                root_credentials: Vec::new(),
                banners: vec!["\nUser Access Verification\r\nUsername:".to_string()],
                replace_mounts: true,
            },
            director: DirectorConfig {
                enabled: false,
                template: "honeytrap".to_string(),
                stop_every: Duration::from_secs(120),
                housekeeper_every: Duration::from_secs(30),
            },
        }
    }
}

impl HoneypotConfig {
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse_config(&content),
            Err(_) => {
                // Create default config file if it doesn't exist
                let default_config = Self::default();
                let config_content = default_config.to_config_file_format();
                if let Err(e) = fs::write(path, config_content) {
                    eprintln!("Warning: Could not create default config file: {}", e);
                }
                Ok(default_config)
            }
        }
    }

    pub fn parse_config(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut current_section = String::new();

        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Handle sections
            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len() - 1].to_string();
                continue;
            }

            // Handle key-value pairs
            if let Some(eq_pos) = line.find('=') {
                let key = line[..eq_pos].trim();
                let value = line[eq_pos + 1..].trim();

                match current_section.as_str() {
                    "server" => config.parse_server_config(key, value)?,
                    "telnet" => config.parse_telnet_config(key, value)?,
                    "director" => config.parse_director_config(key, value)?,
                    _ => return Err(ConfigError::UnknownSection(current_section.clone())),
                }
            }
        }

        Ok(config)
    }

    fn parse_server_config(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "bind_address" => self.server.bind_address = parse_string(key, value)?,
            "port" => {
                self.server.port = value
                    .trim_matches('"')
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string(), value.to_string()))?;
            }
            "max_connections" => {
                self.server.max_connections = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string(), value.to_string()))?;
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn parse_telnet_config(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "credentials" => self.telnet.credentials = parse_string_array(key, value)?,
            "root_credentials" => self.telnet.root_credentials = parse_string_array(key, value)?,
            "banners" => self.telnet.banners = parse_string_array(key, value)?,
            "replace_mounts" => {
                self.telnet.replace_mounts = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string(), value.to_string()))?;
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn parse_director_config(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "enabled" => {
                self.director.enabled = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string(), value.to_string()))?;
            }
            "template" => self.director.template = parse_string(key, value)?,
            "stop_every" => self.director.stop_every = parse_duration(key, value)?,
            "housekeeper_every" => self.director.housekeeper_every = parse_duration(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn to_config_file_format(&self) -> String {
        format!(
            r#"# Nyx Honeypot Configuration File
# Lines starting with # are comments

[server]
# Network configuration
bind_address = "{}"
port = {}
max_connections = {}

[telnet]
# Credentials granting shell access, as "user:pass" entries.
# root_credentials additionally flags a matched entry as root.
credentials = {}
root_credentials = {}

# Login banners. The local address selects one of up to eight.
banners = {}

# Strip container artifacts from proxied /proc/mounts output
replace_mounts = {}

[director]
# Container director for high-interaction shells. Requires a container
# runtime backend; when disabled, sessions get the emulated shell.
enabled = {}
template = "{}"

# Durations accept "ms", "s", "m" and "h" suffixes
stop_every = "{}"
housekeeper_every = "{}"
"#,
            self.server.bind_address,
            self.server.port,
            self.server.max_connections,
            format_string_array(&self.telnet.credentials),
            format_string_array(&self.telnet.root_credentials),
            format_string_array(&self.telnet.banners),
            self.telnet.replace_mounts,
            self.director.enabled,
            self.director.template,
            format_duration(self.director.stop_every),
            format_duration(self.director.housekeeper_every),
        )
    }
}

/// Parse a quoted string value, resolving `\r`, `\n`, `\t` and `\\`
/// escapes (banners carry protocol line endings).
fn parse_string(key: &str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    let inner = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            value.to_string(),
        ));
    };

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => result.push('\r'),
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            _ => {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    value.to_string(),
                ));
            }
        }
    }
    Ok(result)
}

/// Parse a `["a", "b"]` array of quoted strings.
fn parse_string_array(key: &str, value: &str) -> Result<Vec<String>, ConfigError> {
    let value = value.trim();
    if !value.starts_with('[') || !value.ends_with(']') {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            value.to_string(),
        ));
    }

    let inner = value[1..value.len() - 1].trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    // Split on commas outside quotes. Escapes are resolved afterwards by
    // parse_string, so a backslash never hides a quote boundary here.
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for c in inner.chars() {
        match c {
            '\\' if in_quotes && !escaped => {
                escaped = true;
                current.push(c);
            }
            '"' if !escaped => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                items.push(current.trim().to_string());
                current = String::new();
            }
            _ => {
                escaped = false;
                current.push(c);
            }
        }
    }
    if in_quotes {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            value.to_string(),
        ));
    }
    items.push(current.trim().to_string());

    items.iter().map(|item| parse_string(key, item)).collect()
}

/// Parse a duration value like `"2m"`, `"30s"` or `"500ms"`.
fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim().trim_matches('"');
    let invalid = || ConfigError::InvalidValue(key.to_string(), value.to_string());

    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) if pos > 0 => value.split_at(pos),
        _ => return Err(invalid()),
    };
    let amount: u64 = digits.parse().map_err(|_| invalid())?;

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 3600)),
        _ => Err(invalid()),
    }
}

fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms % 3_600_000 == 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}ms", ms)
    }
}

fn format_string_array(items: &[String]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|item| {
            format!(
                "\"{}\"",
                item.replace('\\', "\\\\")
                    .replace('"', "\\\"")
                    .replace('\r', "\\r")
                    .replace('\n', "\\n")
                    .replace('\t', "\\t")
            )
        })
        .collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HoneypotConfig::default();

        assert_eq!(config.server.port, 2323);
        assert_eq!(config.director.template, "honeytrap");
        assert_eq!(config.director.stop_every, Duration::from_secs(120));
        assert_eq!(config.director.housekeeper_every, Duration::from_secs(30));
        assert!(config.telnet.replace_mounts);
        assert!(!config.director.enabled);
    }

    #[test]
    fn test_parse_sections_and_arrays() {
        let content = r#"
# comment
[server]
bind_address = "127.0.0.1"
port = 12323
max_connections = 10

[telnet]
credentials = ["root:honey", "admin:admin"]
root_credentials = ["root:honey"]
banners = ["\nUser Access Verification\r\nUsername:", "login: "]
replace_mounts = false

[director]
enabled = true
template = "fw-base"
stop_every = "1m"
housekeeper_every = "500ms"
"#;

        let config = HoneypotConfig::parse_config(content).expect("config parses");

        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.port, 12323);
        assert_eq!(config.telnet.credentials, vec!["root:honey", "admin:admin"]);
        assert_eq!(config.telnet.root_credentials, vec!["root:honey"]);
        assert_eq!(config.telnet.banners.len(), 2);
        assert_eq!(
            config.telnet.banners[0],
            "\nUser Access Verification\r\nUsername:"
        );
        assert!(!config.telnet.replace_mounts);
        assert!(config.director.enabled);
        assert_eq!(config.director.template, "fw-base");
        assert_eq!(config.director.stop_every, Duration::from_secs(60));
        assert_eq!(
            config.director.housekeeper_every,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let content = "[server]\nspeed = 9600\n";
        assert!(matches!(
            HoneypotConfig::parse_config(content),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let content = "[smtp]\nport = 25\n";
        assert!(matches!(
            HoneypotConfig::parse_config(content),
            Err(ConfigError::UnknownSection(_))
        ));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let content = "[director]\nstop_every = \"2 fortnights\"\n";
        assert!(matches!(
            HoneypotConfig::parse_config(content),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }

    #[test]
    fn test_empty_array() {
        let content = "[telnet]\nroot_credentials = []\n";
        let config = HoneypotConfig::parse_config(content).expect("config parses");
        assert!(config.telnet.root_credentials.is_empty());
    }

    #[test]
    fn test_config_file_round_trip() {
        use std::io::Write;

        let mut config = HoneypotConfig::default();
        config.server.port = 2424;
        config.telnet.banners = vec!["BCM963268 Broadband Router\r\nLogin:".to_string()];
        config.director.enabled = true;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nyx.conf");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(config.to_config_file_format().as_bytes())
            .expect("write");

        let reloaded =
            HoneypotConfig::load_from_file(path.to_str().expect("utf-8 path")).expect("reload");
        assert_eq!(reloaded.server.port, 2424);
        assert_eq!(reloaded.telnet.banners, config.telnet.banners);
        assert!(reloaded.director.enabled);
    }

    #[test]
    fn test_load_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fresh.conf");

        let config =
            HoneypotConfig::load_from_file(path.to_str().expect("utf-8 path")).expect("defaults");
        assert_eq!(config.server.port, 2323);
        assert!(path.exists());
    }
}
