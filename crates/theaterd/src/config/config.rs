//! Configuration file parsing and structures.
//!
//! theaterd reads a single TOML file. The `[amplifier]`, `[hdmi]`, `[screen]`,
//! `[lights]` and `[[scenes]]` sections describe the theater itself and can be
//! swapped at runtime; the remaining sections configure the daemon around it.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use super::diagnostics::Diagnostic;
use super::diagnostics::Diagnostics;
use super::diagnostics::ValidationError;
use super::diagnostics::Warning;
use crate::integrations::mqtt::MqttConfig;

/// Upper bound on HDMI sources, one per switch input.
pub const MAX_SOURCES: usize = 5;

pub const DEFAULT_VOLUME_MAX_STEPS: u32 = 50;
pub const DEFAULT_SCREEN_TRAVEL_TIME_SECS: f64 = 15.0;
pub const DEFAULT_SAVE_DELAY_MS: u64 = 1000;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP API; disabled when the section is absent
    #[serde(default)]
    pub api: Option<ApiConfig>,

    pub mqtt: MqttConfig,

    #[serde(flatten)]
    pub theater: TheaterConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build a per-target filter from the default level and the overrides.
    pub fn targets(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| targets.with_target(target.clone(), *level),
        )
    }
}

/// Where the theater state is persisted between restarts
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Debounce window for state writes
    #[serde(default = "default_save_delay_ms")]
    pub save_delay_ms: u64,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("theaterd_state.json")
}

fn default_save_delay_ms() -> u64 {
    DEFAULT_SAVE_DELAY_MS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            save_delay_ms: DEFAULT_SAVE_DELAY_MS,
        }
    }
}

impl StorageConfig {
    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

/// Everything the coordinator needs to know about the physical theater.
#[derive(Debug, Clone, Deserialize)]
pub struct TheaterConfig {
    pub amplifier: AmplifierConfig,
    pub hdmi: HdmiConfig,
    pub screen: ScreenConfig,

    #[serde(default)]
    pub lights: LightsConfig,

    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// IR amplifier
#[derive(Debug, Clone, Deserialize)]
pub struct AmplifierConfig {
    pub device_id: String,
    pub power_on: String,
    pub power_off: String,
    pub volume_up: String,
    pub volume_down: String,
    pub mute: String,

    /// Number of volume-up presses from silence to full scale
    #[serde(default = "default_volume_max_steps")]
    pub volume_max_steps: u32,
}

fn default_volume_max_steps() -> u32 {
    DEFAULT_VOLUME_MAX_STEPS
}

impl AmplifierConfig {
    /// Tracked volume change per IR press.
    pub fn volume_step(&self) -> f64 {
        1.0 / f64::from(self.volume_max_steps.max(1))
    }
}

/// HDMI switch
#[derive(Debug, Clone, Deserialize)]
pub struct HdmiConfig {
    pub device_id: String,

    /// Source name -> command name
    #[serde(default)]
    pub sources: BTreeMap<String, String>,
}

/// Projector screen
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenConfig {
    pub device_id: String,
    pub up: String,
    pub down: String,

    #[serde(default)]
    pub stop: Option<String>,

    #[serde(default = "default_travel_time_secs")]
    pub travel_time_secs: f64,
}

fn default_travel_time_secs() -> f64 {
    DEFAULT_SCREEN_TRAVEL_TIME_SECS
}

impl ScreenConfig {
    pub fn travel_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.travel_time_secs).unwrap_or_default()
    }

    /// The stop command, if one is configured and non-empty.
    pub fn stop_command(&self) -> Option<&str> {
        self.stop.as_deref().filter(|cmd| !cmd.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LightsConfig {
    #[serde(default)]
    pub entities: Vec<String>,
}

/// A named preset. Absent fields leave that part of the theater untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scene {
    pub name: String,

    #[serde(default)]
    pub amp_power: Option<bool>,

    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub volume: Option<f64>,

    #[serde(default)]
    pub screen: Option<ScreenTarget>,

    #[serde(default)]
    pub lights: Vec<SceneLight>,
}

/// Resting positions a scene may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenTarget {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SceneLight {
    pub entity_id: String,

    #[serde(default)]
    pub state: LightPower,

    /// Percentage, 0-100
    #[serde(default)]
    pub brightness: Option<u8>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightPower {
    On,
    #[default]
    Off,
}

impl TheaterConfig {
    pub fn source_list(&self) -> Vec<String> {
        self.hdmi.sources.keys().cloned().collect()
    }

    pub fn scene_names(&self) -> Vec<String> {
        self.scenes.iter().map(|s| s.name.clone()).collect()
    }

    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.name == name)
    }

    /// Parse and validate a theater-only TOML document.
    pub fn from_toml_str(contents: &str) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let theater: TheaterConfig = toml::from_str(contents)?;
        let diagnostics = theater.validate();
        finish(theater, diagnostics)
    }

    /// Check cross-field constraints that parsing can't express.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut error = |path: String, message: String| {
            diagnostics.push(Diagnostic::Error(ValidationError::new(path, message)));
        };

        let amp = &self.amplifier;
        if amp.volume_max_steps == 0 {
            error(
                "amplifier.volume_max_steps".into(),
                "volume_max_steps must be at least 1".into(),
            );
        }
        for (field, value) in [
            ("device_id", &amp.device_id),
            ("power_on", &amp.power_on),
            ("power_off", &amp.power_off),
            ("volume_up", &amp.volume_up),
            ("volume_down", &amp.volume_down),
            ("mute", &amp.mute),
        ] {
            if value.is_empty() {
                error(format!("amplifier.{}", field), format!("{} must not be empty", field));
            }
        }

        if self.hdmi.device_id.is_empty() {
            error("hdmi.device_id".into(), "device_id must not be empty".into());
        }
        if self.hdmi.sources.len() > MAX_SOURCES {
            error(
                "hdmi.sources".into(),
                format!(
                    "at most {} sources are supported, found {}",
                    MAX_SOURCES,
                    self.hdmi.sources.len()
                ),
            );
        }
        for (name, command) in &self.hdmi.sources {
            if command.is_empty() {
                error(
                    format!("hdmi.sources.{}", name),
                    format!("source '{}' has no command", name),
                );
            }
        }

        let screen = &self.screen;
        for (field, value) in [
            ("device_id", &screen.device_id),
            ("up", &screen.up),
            ("down", &screen.down),
        ] {
            if value.is_empty() {
                error(format!("screen.{}", field), format!("{} must not be empty", field));
            }
        }
        if !screen.travel_time_secs.is_finite() || screen.travel_time_secs < 0.0 {
            error(
                "screen.travel_time_secs".into(),
                format!(
                    "travel time must be a non-negative number of seconds, got {}",
                    screen.travel_time_secs
                ),
            );
        }

        let mut seen = HashSet::new();
        for (idx, scene) in self.scenes.iter().enumerate() {
            if scene.name.is_empty() {
                error(format!("scenes[{}].name", idx), "scene name must not be empty".into());
            } else if !seen.insert(scene.name.as_str()) {
                error(
                    format!("scenes[{}].name", idx),
                    format!("duplicate scene name '{}'", scene.name),
                );
            }

            if let Some(volume) = scene.volume {
                if !(0.0..=1.0).contains(&volume) {
                    error(
                        format!("scenes[{}].volume", idx),
                        format!("volume must be between 0.0 and 1.0, got {}", volume),
                    );
                }
            }

            for (light_idx, light) in scene.lights.iter().enumerate() {
                if let Some(brightness) = light.brightness {
                    if brightness > 100 {
                        error(
                            format!("scenes[{}].lights[{}].brightness", idx, light_idx),
                            format!("brightness is a percentage (0-100), got {}", brightness),
                        );
                    }
                }
            }
        }

        // Warnings: the scene still loads but part of it won't do anything.
        for (idx, scene) in self.scenes.iter().enumerate() {
            if let Some(source) = scene.source.as_deref().filter(|s| !s.is_empty()) {
                if !self.hdmi.sources.contains_key(source) {
                    diagnostics.push(Diagnostic::Warning(Warning::UnknownSceneSource {
                        field_path: format!("scenes[{}].source", idx),
                        source: source.to_string(),
                    }));
                }
            }
            for (light_idx, light) in scene.lights.iter().enumerate() {
                let domain = light.entity_id.split('.').next().unwrap_or_default();
                if domain != "light" && domain != "switch" {
                    diagnostics.push(Diagnostic::Warning(Warning::UnsupportedLightDomain {
                        field_path: format!("scenes[{}].lights[{}]", idx, light_idx),
                        entity_id: light.entity_id.clone(),
                    }));
                }
            }
        }

        diagnostics
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns the config together with any warnings. Validation errors are
    /// collected and reported together as `ConfigError::Invalid`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let config: Config = toml::from_str(contents)?;
        let diagnostics = config.validate();
        finish(config, diagnostics)
    }

    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = self.theater.validate();
        if self.mqtt.broker.is_empty() {
            diagnostics.push(Diagnostic::Error(ValidationError::new(
                "mqtt.broker",
                "broker must not be empty",
            )));
        }
        diagnostics
    }
}

fn finish<T>(value: T, diagnostics: Vec<Diagnostic>) -> Result<(T, Vec<Diagnostic>), ConfigError> {
    if diagnostics.iter().any(Diagnostic::is_error) {
        Err(ConfigError::Invalid(Diagnostics(diagnostics)))
    } else {
        Ok((value, diagnostics))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration:\n{0}")]
    Invalid(Diagnostics),
}
