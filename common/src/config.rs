use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub synth: SynthConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub pusher: PusherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_template_path")]
    pub template_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Delay between two parts of a viewer's stream.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_boundary")]
    pub boundary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandConfig {
    #[serde(default)]
    pub variant: CommandVariant,
}

/// Which steering payload shapes `/api/command` accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandVariant {
    /// Pick the shape from the decoded payload (`command` key => direction).
    #[default]
    Auto,
    Steering,
    Direction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PusherConfig {
    /// Base URL of the relay, e.g. `http://localhost:8080`.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    /// Camera MJPEG stream (mode = "mjpeg") or snapshot endpoint (mode = "polling").
    #[serde(default = "default_source_url")]
    pub source_url: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default = "default_pusher_quality")]
    pub quality: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            template_path: default_template_path(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            boundary: default_boundary(),
        }
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            quality: default_quality(),
        }
    }
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            source_url: default_source_url(),
            mode: default_mode(),
            fps: default_fps(),
            quality: default_pusher_quality(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    /// Load `path` if it exists, otherwise fall back to the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.interval_ms == 0 {
            return Err(ConfigError::Invalid("stream.interval_ms must be greater than 0".into()));
        }
        if !(self.pusher.fps.is_finite() && self.pusher.fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "pusher.fps must be a positive number, got {}",
                self.pusher.fps
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_template_path() -> String {
    "templates/index.html".into()
}
fn default_interval_ms() -> u64 {
    100
}
fn default_boundary() -> String {
    "frame".into()
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    360
}
fn default_quality() -> u8 {
    80
}
fn default_relay_url() -> String {
    "http://localhost:8080".into()
}
fn default_source_url() -> String {
    "http://localhost:8000/stream".into()
}
fn default_mode() -> String {
    "mjpeg".into()
}
fn default_fps() -> f64 {
    10.0
}
fn default_pusher_quality() -> u32 {
    80
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.stream.interval_ms, 100);
        assert_eq!(config.stream.boundary, "frame");
        assert_eq!((config.synth.width, config.synth.height), (640, 360));
        assert_eq!(config.synth.quality, 80);
        assert_eq!(config.command.variant, CommandVariant::Auto);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [server]
            port = 9090

            [command]
            variant = "direction"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.command.variant, CommandVariant::Direction);
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let err = Config::parse("[command]\nvariant = \"joystick\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_stream_interval_is_rejected() {
        let err = Config::parse("[stream]\ninterval_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("interval_ms")));
    }

    #[test]
    fn non_positive_pusher_fps_is_rejected() {
        for fps in ["0.0", "-5.0"] {
            let err = Config::parse(&format!("[pusher]\nfps = {fps}")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("pusher.fps")));
        }
        assert!(Config::parse("[pusher]\nfps = 2.5").is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Path::new("/nonexistent/frame-relay.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }
}
