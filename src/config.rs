//! Configuration module for pixel-sink.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::protocols::upload::UploadSettings;
use crate::transfer::ImageGeometry;
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the receiver
#[derive(Parser, Debug)]
#[command(name = "pixel-sink")]
#[command(author = "pixel-sink authors")]
#[command(version = "0.1.0")]
#[command(about = "Receives raw RGB565 frames over HTTP and draws them in chunks", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Image width in pixels
    #[arg(long)]
    pub width: Option<u16>,

    /// Image height in pixels
    #[arg(long)]
    pub height: Option<u16>,

    /// Rows received and drawn per chunk
    #[arg(short = 'r', long)]
    pub chunk_rows: Option<usize>,

    /// Byte budget for the two chunk buffers
    #[arg(short = 'm', long)]
    pub memory_budget: Option<usize>,

    /// Write a PPM snapshot here after every completed frame
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Pending-connection queue length
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Wait between accept polls when no client is pending, in milliseconds
    #[serde(default = "default_accept_idle_ms")]
    pub accept_idle_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            accept_idle_ms: default_accept_idle_ms(),
        }
    }
}

/// Expected image shape and endpoint
#[derive(Debug, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_width")]
    pub width: u16,
    #[serde(default = "default_height")]
    pub height: u16,
    /// Path the request target must contain
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            upload_path: default_upload_path(),
        }
    }
}

/// Body streaming limits
#[derive(Debug, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,
    #[serde(default = "default_line_timeout_ms")]
    pub line_timeout_ms: u64,
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
    /// Byte budget for the chunk buffers (unbounded when absent)
    pub memory_budget: Option<usize>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_rows: default_chunk_rows(),
            line_timeout_ms: default_line_timeout_ms(),
            chunk_timeout_ms: default_chunk_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            max_line_len: default_max_line_len(),
            memory_budget: None,
        }
    }
}

/// Host display configuration
#[derive(Debug, Deserialize, Default)]
pub struct DisplayConfig {
    /// PPM snapshot written after every completed frame
    pub snapshot: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_backlog() -> i32 {
    4
}

fn default_accept_idle_ms() -> u64 {
    10
}

fn default_width() -> u16 {
    240
}

fn default_height() -> u16 {
    135
}

fn default_upload_path() -> String {
    "/update-image".to_string()
}

fn default_chunk_rows() -> usize {
    4
}

fn default_line_timeout_ms() -> u64 {
    2000
}

fn default_chunk_timeout_ms() -> u64 {
    10_000
}

fn default_response_timeout_ms() -> u64 {
    2000
}

fn default_max_line_len() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub backlog: i32,
    pub accept_idle: Duration,
    pub width: u16,
    pub height: u16,
    pub upload_path: String,
    pub chunk_rows: usize,
    pub line_timeout: Duration,
    pub chunk_timeout: Duration,
    pub response_timeout: Duration,
    pub max_line_len: usize,
    pub memory_budget: Option<usize>,
    pub snapshot: Option<PathBuf>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen_str = cli.listen.unwrap_or(toml_config.server.listen);
        let listen = listen_str
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("listen address '{}'", listen_str)))?;

        let config = Config {
            listen,
            backlog: toml_config.server.backlog,
            accept_idle: Duration::from_millis(toml_config.server.accept_idle_ms),
            width: cli.width.unwrap_or(toml_config.image.width),
            height: cli.height.unwrap_or(toml_config.image.height),
            upload_path: toml_config.image.upload_path,
            chunk_rows: cli.chunk_rows.unwrap_or(toml_config.transfer.chunk_rows),
            line_timeout: Duration::from_millis(toml_config.transfer.line_timeout_ms),
            chunk_timeout: Duration::from_millis(toml_config.transfer.chunk_timeout_ms),
            response_timeout: Duration::from_millis(toml_config.transfer.response_timeout_ms),
            max_line_len: toml_config.transfer.max_line_len,
            memory_budget: cli.memory_budget.or(toml_config.transfer.memory_budget),
            snapshot: cli.snapshot.or(toml_config.display.snapshot),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "image size {}x{}",
                self.width, self.height
            )));
        }
        if self.chunk_rows == 0 {
            return Err(ConfigError::Invalid("chunk_rows must be at least 1".to_string()));
        }
        if self.upload_path.is_empty() {
            return Err(ConfigError::Invalid("upload_path is empty".to_string()));
        }
        if self.max_line_len == 0 {
            return Err(ConfigError::Invalid("max_line_len must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn geometry(&self) -> ImageGeometry {
        ImageGeometry::new(self.width, self.height)
    }

    /// Per-request settings for the upload handler.
    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings {
            geometry: self.geometry(),
            upload_path: self.upload_path.clone(),
            chunk_rows: self.chunk_rows,
            line_timeout: self.line_timeout,
            chunk_timeout: self.chunk_timeout,
            response_timeout: self.response_timeout,
            max_line_len: self.max_line_len,
            memory_budget: self.memory_budget,
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["pixel-sink"];
        argv.extend_from_slice(args);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.image.width, 240);
        assert_eq!(config.image.height, 135);
        assert_eq!(config.image.upload_path, "/update-image");
        assert_eq!(config.transfer.chunk_rows, 4);
        assert_eq!(config.transfer.line_timeout_ms, 2000);
        assert_eq!(config.transfer.chunk_timeout_ms, 10_000);
        assert_eq!(config.transfer.memory_budget, None);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:9000"
            backlog = 1

            [image]
            width = 320
            height = 240

            [transfer]
            chunk_rows = 8
            chunk_timeout_ms = 5000
            memory_budget = 16384

            [display]
            snapshot = "/tmp/frame.ppm"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.backlog, 1);
        assert_eq!(config.server.accept_idle_ms, 10);
        assert_eq!(config.image.width, 320);
        assert_eq!(config.image.height, 240);
        assert_eq!(config.transfer.chunk_rows, 8);
        assert_eq!(config.transfer.chunk_timeout_ms, 5000);
        assert_eq!(config.transfer.line_timeout_ms, 2000);
        assert_eq!(config.transfer.memory_budget, Some(16384));
        assert_eq!(config.display.snapshot, Some(PathBuf::from("/tmp/frame.ppm")));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_merge_defaults() {
        let config = Config::merge(cli(&[]), TomlConfig::default()).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.geometry().payload_len(), 64_800);

        let settings = config.upload_settings();
        assert_eq!(settings.chunk_rows, 4);
        assert_eq!(settings.chunk_timeout, Duration::from_millis(10_000));
        assert_eq!(settings.line_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [image]
            width = 320
            [transfer]
            chunk_rows = 8
            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        let config = Config::merge(
            cli(&["--chunk-rows", "2", "--listen", "127.0.0.1:0", "--log-level", "trace"]),
            toml_config,
        )
        .unwrap();
        assert_eq!(config.width, 320);
        assert_eq!(config.chunk_rows, 2);
        assert_eq!(config.listen.port(), 0);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            Config::merge(cli(&["--chunk-rows", "0"]), TomlConfig::default()),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::merge(cli(&["--height", "0"]), TomlConfig::default()),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::merge(cli(&["--listen", "not-an-address"]), TomlConfig::default()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
