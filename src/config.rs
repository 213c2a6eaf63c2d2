//! Configuration system for a federation node
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (FEDROUND_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::peer::{BackoffKind, SenderConfig};
use crate::round::{CoordinatorConfig, TimeoutPolicy};
use crate::types::PeerAddress;

/// Main node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identity and listen address
    pub node: NodeSettings,

    /// Static federation membership (may include this node; it is skipped)
    pub peers: Vec<PeerAddress>,

    /// Round loop settings
    pub round: RoundSettings,

    /// Outbound retry settings
    pub sender: SenderSettings,

    /// Synthetic trainer settings
    pub training: TrainingSettings,

    /// Logging configuration
    pub logging: LoggingSettings,

    /// Data storage and observers
    pub storage: StorageSettings,
}

/// Node identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Node name, unique within the federation (defaults to the hostname)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Address the peer server binds
    pub listen_addr: String,

    /// Address peers use to reach this node, as "host:port"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_addr: Option<String>,
}

/// Round loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundSettings {
    /// Number of rounds to run before exiting
    pub rounds: u64,

    /// Quorum wait per attempt in milliseconds
    pub round_timeout_ms: u64,

    /// Pause before waiting again in the same round, in milliseconds
    pub cooldown_ms: u64,

    /// retry_same_round | advance_anyway | abort
    pub timeout_policy: TimeoutPolicy,

    /// Quorum waits per round under retry_same_round (0 = unlimited)
    pub max_quorum_attempts: u32,
}

/// Outbound retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderSettings {
    /// Attempts per peer per send
    pub max_retries: u32,

    /// Delay between attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Bound on one attempt in milliseconds
    pub attempt_timeout_ms: u64,

    /// fixed | exponential
    pub backoff: BackoffKind,

    /// Exponential backoff cap in milliseconds
    pub max_retry_delay_ms: u64,
}

/// Synthetic trainer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Width of the linear layer
    pub input_dim: usize,

    pub learning_rate: f32,

    /// Gradient steps per round
    pub local_steps: u32,

    /// Fixed seed (defaults to a hash of the node name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Base data directory
    pub data_dir: String,

    /// Write local and global contributions under data_dir/snapshots
    pub save_snapshots: bool,

    /// Log a checksum of every contribution
    pub checksums: bool,
}

// ─────────────────────────────────────────────────────────────────
// Default implementations
// ─────────────────────────────────────────────────────────────────

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: None,
            listen_addr: "0.0.0.0:50051".to_string(),
            advertise_addr: None,
        }
    }
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            rounds: 1,
            round_timeout_ms: 60000,
            cooldown_ms: 5000,
            timeout_policy: TimeoutPolicy::RetrySameRound,
            max_quorum_attempts: 0, // Unlimited
        }
    }
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            attempt_timeout_ms: 10000,
            backoff: BackoffKind::Fixed,
            max_retry_delay_ms: 30000,
        }
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            input_dim: 8,
            learning_rate: 0.1,
            local_steps: 3,
            seed: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.fedround".to_string(),
            save_snapshots: false,
            checksums: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────

impl RoundSettings {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            rounds: self.rounds,
            round_timeout: Duration::from_millis(self.round_timeout_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
            timeout_policy: self.timeout_policy,
            max_quorum_attempts: self.max_quorum_attempts,
        }
    }
}

impl SenderSettings {
    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            backoff: self.backoff,
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
        }
    }
}

impl NodeConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides()?;

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration file");
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e.message()),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    pub fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            return if path.exists() {
                Ok(Some(path))
            } else {
                Err(Error::config_not_found(path))
            };
        }

        // Search in standard locations
        let search_paths = [
            // Current directory
            Some(PathBuf::from("fedround.toml")),
            Some(PathBuf::from("config.toml")),
            // User config directory
            dirs::config_dir().map(|p| p.join("fedround").join("node.toml")),
            // Home directory
            dirs::home_dir().map(|p| p.join(".fedround").join("node.toml")),
            // System config (Linux)
            Some(PathBuf::from("/etc/fedround/node.toml")),
        ];

        for path in search_paths.into_iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Node settings
        if let Ok(val) = std::env::var("FEDROUND_NODE_NAME") {
            self.node.name = Some(val);
        }
        if let Ok(val) = std::env::var("FEDROUND_LISTEN_ADDR") {
            self.node.listen_addr = val;
        }
        if let Ok(val) = std::env::var("FEDROUND_ADVERTISE_ADDR") {
            self.node.advertise_addr = Some(val);
        }

        // Round settings
        if let Some(n) = env_parse("FEDROUND_ROUNDS")? {
            self.round.rounds = n;
        }
        if let Some(n) = env_parse("FEDROUND_ROUND_TIMEOUT_MS")? {
            self.round.round_timeout_ms = n;
        }
        if let Some(n) = env_parse("FEDROUND_COOLDOWN_MS")? {
            self.round.cooldown_ms = n;
        }
        if let Some(policy) = env_parse("FEDROUND_TIMEOUT_POLICY")? {
            self.round.timeout_policy = policy;
        }
        if let Some(n) = env_parse("FEDROUND_MAX_QUORUM_ATTEMPTS")? {
            self.round.max_quorum_attempts = n;
        }

        // Sender settings
        if let Some(n) = env_parse("FEDROUND_MAX_RETRIES")? {
            self.sender.max_retries = n;
        }
        if let Some(n) = env_parse("FEDROUND_RETRY_DELAY_MS")? {
            self.sender.retry_delay_ms = n;
        }
        if let Some(n) = env_parse("FEDROUND_ATTEMPT_TIMEOUT_MS")? {
            self.sender.attempt_timeout_ms = n;
        }
        if let Some(kind) = env_parse("FEDROUND_BACKOFF")? {
            self.sender.backoff = kind;
        }

        // Training settings
        if let Some(seed) = env_parse("FEDROUND_SEED")? {
            self.training.seed = Some(seed);
        }

        // Logging settings
        if let Ok(val) = std::env::var("FEDROUND_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("FEDROUND_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("FEDROUND_LOG_JSON") {
            self.logging.json_format = parse_bool(&val);
        }

        // Storage settings
        if let Ok(val) = std::env::var("FEDROUND_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("FEDROUND_SAVE_SNAPSHOTS") {
            self.storage.save_snapshots = parse_bool(&val);
        }

        Ok(())
    }

    /// Expand ~ and other path variables
    pub fn expand_paths(&mut self) {
        self.storage.data_dir = expand_path(&self.storage.data_dir);
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Addresses
        split_endpoint(&self.node.listen_addr)
            .map_err(|msg| Error::config_field_invalid("node.listen_addr", msg))?;
        if let Some(ref addr) = self.node.advertise_addr {
            split_endpoint(addr)
                .map_err(|msg| Error::config_field_invalid("node.advertise_addr", msg))?;
        }
        if matches!(self.node.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(Error::config_field_invalid("node.name", "must not be empty"));
        }

        // Peers
        let mut names = HashSet::new();
        for peer in &self.peers {
            if peer.name.trim().is_empty() {
                return Err(Error::config_field_invalid("peers.name", "must not be empty"));
            }
            if peer.host.trim().is_empty() {
                return Err(Error::config_field_invalid(
                    "peers.host",
                    format!("peer '{}' has no host", peer.name),
                ));
            }
            if peer.port == 0 {
                return Err(Error::config_field_invalid(
                    "peers.port",
                    format!("peer '{}' has port 0", peer.name),
                ));
            }
            if !names.insert(peer.name.as_str()) {
                return Err(Error::config_field_invalid(
                    "peers.name",
                    format!("duplicate peer name '{}'", peer.name),
                ));
            }
        }

        // Round timing
        if self.round.rounds == 0 {
            return Err(Error::config_field_invalid("round.rounds", "must be at least 1"));
        }
        if self.round.round_timeout_ms == 0 {
            return Err(Error::config_field_invalid("round.round_timeout_ms", "must be > 0"));
        }

        // Sender
        if self.sender.max_retries == 0 {
            return Err(Error::config_field_invalid("sender.max_retries", "must be at least 1"));
        }
        if self.sender.attempt_timeout_ms == 0 {
            return Err(Error::config_field_invalid("sender.attempt_timeout_ms", "must be > 0"));
        }
        if self.sender.backoff == BackoffKind::Exponential
            && self.sender.max_retry_delay_ms < self.sender.retry_delay_ms
        {
            return Err(Error::config_field_invalid(
                "sender.max_retry_delay_ms",
                "must not be smaller than retry_delay_ms",
            ));
        }

        // Training
        if self.training.input_dim == 0 {
            return Err(Error::config_field_invalid("training.input_dim", "must be > 0"));
        }
        if !(self.training.learning_rate > 0.0 && self.training.learning_rate <= 1.0) {
            return Err(Error::config_field_invalid(
                "training.learning_rate",
                "must be in (0, 1]",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Configured name, else the hostname
    pub fn node_name(&self) -> String {
        self.node
            .name
            .clone()
            .or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .filter(|h| !h.is_empty())
            })
            .unwrap_or_else(|| "fedround-node".to_string())
    }

    /// This node as peers see it: advertised address if set, else the
    /// listen address
    pub fn local_address(&self) -> Result<PeerAddress> {
        let (field, endpoint) = match self.node.advertise_addr {
            Some(ref addr) => ("node.advertise_addr", addr.as_str()),
            None => ("node.listen_addr", self.node.listen_addr.as_str()),
        };
        let (host, port) =
            split_endpoint(endpoint).map_err(|msg| Error::config_field_invalid(field, msg))?;
        Ok(PeerAddress::new(self.node_name(), host, port))
    }

    /// Get the data directory as a PathBuf
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Split "host:port", accepting bracketed IPv6 hosts
pub fn split_endpoint(endpoint: &str) -> std::result::Result<(String, u16), String> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| format!("'{}' is not host:port", endpoint))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(format!("'{}' has no host", endpoint));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| format!("'{}' has an invalid port", endpoint))?;
    Ok((host.to_string(), port))
}

/// Parse an environment variable if set
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| {
                Error::config_field_invalid(key, format!("{}: cannot parse '{}'", key, val))
            }),
        Err(_) => Ok(None),
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file, returning where it was written
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".fedround")
                .join("node.toml")
        });

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# fedround node configuration

[node]
# Node name, unique within the federation (defaults to the hostname)
# name = "node-a"

# Address the peer server binds
listen_addr = "0.0.0.0:50051"

# Address peers use to reach this node (used to skip our own [[peers]] entry)
# advertise_addr = "10.0.0.1:50051"

# Every federation member, this node included
# [[peers]]
# name = "node-a"
# host = "10.0.0.1"
# port = 50051
#
# [[peers]]
# name = "node-b"
# host = "10.0.0.2"
# port = 50051

[round]
# Rounds to run before exiting
rounds = 1

# Quorum wait per attempt in milliseconds
round_timeout_ms = 60000

# Pause before waiting again in the same round (milliseconds)
cooldown_ms = 5000

# On quorum timeout: retry_same_round, advance_anyway or abort
timeout_policy = "retry_same_round"

# Quorum waits per round under retry_same_round (0 = unlimited)
max_quorum_attempts = 0

[sender]
# Attempts per peer
max_retries = 3

# Delay between attempts in milliseconds
retry_delay_ms = 2000

# Bound on one attempt in milliseconds
attempt_timeout_ms = 10000

# fixed or exponential
backoff = "fixed"

# Exponential backoff cap in milliseconds
max_retry_delay_ms = 30000

[training]
# Width of the synthetic linear layer
input_dim = 8
learning_rate = 0.1
local_steps = 3

# Fixed seed (defaults to a hash of the node name)
# seed = 42

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.fedround/logs/node.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false

[storage]
# Base data directory
data_dir = "~/.fedround"

# Write local and global contributions to data_dir/snapshots
save_snapshots = false

# Log a checksum of every contribution
checksums = true
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.node.listen_addr, "0.0.0.0:50051");
        assert_eq!(config.round.timeout_policy, TimeoutPolicy::RetrySameRound);
        assert_eq!(config.sender.max_retries, 3);
        assert_eq!(config.sender.backoff, BackoffKind::Fixed);
        assert_eq!(config.logging.level, "info");
        assert!(config.peers.is_empty());
    }

    #[test]
    fn test_env_override() {
        env::set_var("FEDROUND_ROUND_TIMEOUT_MS", "1234");
        env::set_var("FEDROUND_TIMEOUT_POLICY", "abort");
        env::set_var("FEDROUND_BACKOFF", "exponential");

        let mut config = NodeConfig::default();
        config.apply_env_overrides().unwrap();

        assert_eq!(config.round.round_timeout_ms, 1234);
        assert_eq!(config.round.timeout_policy, TimeoutPolicy::Abort);
        assert_eq!(config.sender.backoff, BackoffKind::Exponential);

        env::remove_var("FEDROUND_ROUND_TIMEOUT_MS");
        env::remove_var("FEDROUND_TIMEOUT_POLICY");
        env::remove_var("FEDROUND_BACKOFF");
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        env::set_var("FEDROUND_TEST_GARBAGE_NUMBER", "lots");
        let err = env_parse::<u32>("FEDROUND_TEST_GARBAGE_NUMBER").unwrap_err();
        env::remove_var("FEDROUND_TEST_GARBAGE_NUMBER");

        assert!(matches!(err, Error::ConfigValidation { .. }));
        assert_eq!(env_parse::<u32>("FEDROUND_TEST_UNSET_NUMBER").unwrap(), None);
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = NodeConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_retries() {
        let mut config = NodeConfig::default();
        config.sender.max_retries = 0;
        match config.validate() {
            Err(Error::ConfigValidation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("sender.max_retries"))
            }
            other => panic!("expected ConfigValidation, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut config = NodeConfig::default();
        config.round.round_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_duplicate_peer_names() {
        let mut config = NodeConfig::default();
        config.peers = vec![
            PeerAddress::new("node-a", "10.0.0.1", 50051),
            PeerAddress::new("node-a", "10.0.0.2", 50051),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_listen_addr() {
        let mut config = NodeConfig::default();
        config.node.listen_addr = "localhost".to_string();
        assert!(config.validate().is_err());
        config.node.listen_addr = "localhost:99999".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_split_endpoint() {
        assert_eq!(split_endpoint("10.0.0.1:50051").unwrap(), ("10.0.0.1".to_string(), 50051));
        assert_eq!(split_endpoint("[::1]:7000").unwrap(), ("::1".to_string(), 7000));
        assert!(split_endpoint(":80").is_err());
    }

    #[test]
    fn test_local_address_prefers_advertised() {
        let mut config = NodeConfig::default();
        config.node.name = Some("node-a".to_string());
        assert_eq!(
            config.local_address().unwrap(),
            PeerAddress::new("node-a", "0.0.0.0", 50051)
        );

        config.node.advertise_addr = Some("10.0.0.1:6000".to_string());
        assert_eq!(
            config.local_address().unwrap(),
            PeerAddress::new("node-a", "10.0.0.1", 6000)
        );
    }

    #[test]
    fn test_path_expansion() {
        let mut config = NodeConfig::default();
        config.storage.data_dir = "~/test/data".to_string();
        config.expand_paths();
        assert!(!config.storage.data_dir.contains('~'));
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = NodeConfig::default();
        config.peers.push(PeerAddress::new("node-b", "10.0.0.2", 50051));
        let toml_str = config.to_toml().unwrap();
        let parsed: NodeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.peers, config.peers);
        assert_eq!(parsed.round.timeout_policy, config.round.timeout_policy);
    }

    #[test]
    fn test_default_config_template_parses() {
        let parsed: NodeConfig = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(parsed.round.rounds, 1);
        assert_eq!(parsed.sender.retry_delay_ms, 2000);
        assert!(parsed.storage.checksums);
    }

    #[test]
    fn test_parse_config_file() {
        let config_str = r#"
[node]
name = "node-a"
listen_addr = "127.0.0.1:7001"

[[peers]]
name = "node-a"
host = "127.0.0.1"
port = 7001

[[peers]]
name = "node-b"
host = "127.0.0.1"
port = 7002

[round]
rounds = 5
timeout_policy = "advance_anyway"

[sender]
backoff = "exponential"
"#;

        let config: NodeConfig = toml::from_str(config_str).unwrap();
        assert_eq!(config.node.name.as_deref(), Some("node-a"));
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[1].port, 7002);
        assert_eq!(config.round.rounds, 5);
        assert_eq!(config.round.timeout_policy, TimeoutPolicy::AdvanceAnyway);
        assert_eq!(config.round.cooldown_ms, 5000);
        assert_eq!(config.sender.backoff, BackoffKind::Exponential);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_policy_is_parse_error() {
        let result: std::result::Result<NodeConfig, _> =
            toml::from_str("[round]\ntimeout_policy = \"sometimes\"\n");
        assert!(result.is_err());
    }
}
