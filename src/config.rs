//! Configuration loader/writer plus strongly typed settings structures.
//!
//! This module deserializes `config.toml`, fills every missing field from the
//! defaults below, and writes the embedded default file on first run.

use crate::data::{Granularity, Point};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

// Embed default configuration file at compile time
const DEFAULT_CONFIG: &str = include_str!("../defaults/config.toml");

/// Lower/upper bound for the local dictionary engine timeout (ms)
pub const MIN_ENGINE_TIMEOUT_MS: u64 = 200;
pub const MAX_ENGINE_TIMEOUT_MS: u64 = 15000;

/// Top-level configuration object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub buttons: ButtonConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub pointer: PointerConfig,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

/// Input Server connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    55003
}

fn default_reconnect_delay() -> u64 {
    2000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

/// How navigation is switched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationMode {
    /// Hold the modifier; release ends navigation
    #[default]
    Modifier,
    /// The modifier toggles navigation on and off
    Toggle,
}

/// Gamepad button indices (standard mapping)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonConfig {
    #[serde(default)]
    pub activation_mode: ActivationMode,
    #[serde(default = "default_modifier_button")]
    pub modifier: u32,
    #[serde(default = "default_toggle_button")]
    pub toggle: u32,
    #[serde(default = "default_confirm_button")]
    pub confirm: u32,
    #[serde(default = "default_cancel_button")]
    pub cancel: u32,
    #[serde(default = "default_token_toggle_button")]
    pub token_toggle: u32,
    #[serde(default = "default_dpad_up")]
    pub dpad_up: u32,
    #[serde(default = "default_dpad_down")]
    pub dpad_down: u32,
    #[serde(default = "default_dpad_left")]
    pub dpad_left: u32,
    #[serde(default = "default_dpad_right")]
    pub dpad_right: u32,
    #[serde(default = "default_true")]
    pub controller_enabled: bool,
}

fn default_modifier_button() -> u32 {
    4 // LB
}
fn default_toggle_button() -> u32 {
    8 // Back/Select
}
fn default_confirm_button() -> u32 {
    0 // A
}
fn default_cancel_button() -> u32 {
    1 // B
}
fn default_token_toggle_button() -> u32 {
    3 // Y
}
fn default_dpad_up() -> u32 {
    12
}
fn default_dpad_down() -> u32 {
    13
}
fn default_dpad_left() -> u32 {
    14
}
fn default_dpad_right() -> u32 {
    15
}
fn default_true() -> bool {
    true
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            activation_mode: ActivationMode::default(),
            modifier: default_modifier_button(),
            toggle: default_toggle_button(),
            confirm: default_confirm_button(),
            cancel: default_cancel_button(),
            token_toggle: default_token_toggle_button(),
            dpad_up: default_dpad_up(),
            dpad_down: default_dpad_down(),
            dpad_left: default_dpad_left(),
            dpad_right: default_dpad_right(),
            controller_enabled: default_true(),
        }
    }
}

impl ButtonConfig {
    /// Every named assignment, for duplicate checks
    pub fn assignments(&self) -> Vec<(&'static str, u32)> {
        vec![
            ("modifier", self.modifier),
            ("toggle", self.toggle),
            ("confirm", self.confirm),
            ("cancel", self.cancel),
            ("token_toggle", self.token_toggle),
            ("dpad_up", self.dpad_up),
            ("dpad_down", self.dpad_down),
            ("dpad_left", self.dpad_left),
            ("dpad_right", self.dpad_right),
        ]
    }
}

/// Cursor movement tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    #[serde(default = "default_repeat_delay")]
    pub repeat_delay_ms: u64,
    #[serde(default = "default_repeat_rate")]
    pub repeat_rate_ms: u64,
    #[serde(default = "default_true")]
    pub auto_confirm: bool,
    /// Start in token granularity
    #[serde(default)]
    pub token_mode: bool,
    #[serde(default = "default_line_tolerance")]
    pub line_tolerance_px: f64,
    #[serde(default = "default_min_vertical")]
    pub min_vertical_px: f64,
    #[serde(default = "default_vertical_ratio")]
    pub vertical_height_ratio: f64,
    #[serde(default = "default_horizontal_band")]
    pub horizontal_band_px: f64,
    #[serde(default = "default_horizontal_band_ratio")]
    pub horizontal_band_ratio: f64,
    #[serde(default = "default_dismiss_debounce")]
    pub dismiss_debounce_ms: u64,
    /// Known-empty coordinate clicked to dismiss the popup
    #[serde(default)]
    pub dismiss_point: Point,
}

fn default_repeat_delay() -> u64 {
    400
}
fn default_repeat_rate() -> u64 {
    150
}
fn default_line_tolerance() -> f64 {
    12.0
}
fn default_min_vertical() -> f64 {
    8.0
}
fn default_vertical_ratio() -> f64 {
    0.55
}
fn default_horizontal_band() -> f64 {
    120.0
}
fn default_horizontal_band_ratio() -> f64 {
    4.0
}
fn default_dismiss_debounce() -> u64 {
    90
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            repeat_delay_ms: default_repeat_delay(),
            repeat_rate_ms: default_repeat_rate(),
            auto_confirm: default_true(),
            token_mode: false,
            line_tolerance_px: default_line_tolerance(),
            min_vertical_px: default_min_vertical(),
            vertical_height_ratio: default_vertical_ratio(),
            horizontal_band_px: default_horizontal_band(),
            horizontal_band_ratio: default_horizontal_band_ratio(),
            dismiss_debounce_ms: default_dismiss_debounce(),
            dismiss_point: Point::default(),
        }
    }
}

impl NavigationConfig {
    pub fn initial_granularity(&self) -> Granularity {
        if self.token_mode {
            Granularity::Token
        } else {
            Granularity::Character
        }
    }
}

/// Analog stick handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointerConfig {
    #[serde(default = "default_deadzone")]
    pub deadzone: f64,
    #[serde(default = "default_pointer_speed")]
    pub speed_px_per_sec: f64,
    #[serde(default = "default_min_sample")]
    pub min_sample_ms: u64,
    #[serde(default = "default_max_sample")]
    pub max_sample_ms: u64,
    /// How long an analog move keeps confirm aimed at the pointer
    #[serde(default = "default_recent_window")]
    pub recent_window_ms: u64,
    #[serde(default = "default_scroll_speed")]
    pub scroll_speed: f64,
    #[serde(default = "default_action_threshold")]
    pub action_threshold: f64,
}

fn default_deadzone() -> f64 {
    0.2
}
fn default_pointer_speed() -> f64 {
    900.0
}
fn default_min_sample() -> u64 {
    8
}
fn default_max_sample() -> u64 {
    40
}
fn default_recent_window() -> u64 {
    2500
}
fn default_scroll_speed() -> f64 {
    1200.0
}
fn default_action_threshold() -> f64 {
    0.6
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            deadzone: default_deadzone(),
            speed_px_per_sec: default_pointer_speed(),
            min_sample_ms: default_min_sample(),
            max_sample_ms: default_max_sample(),
            recent_window_ms: default_recent_window(),
            scroll_speed: default_scroll_speed(),
            action_threshold: default_action_threshold(),
        }
    }
}

/// Which tokenizer answers `tokenize` requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerBackend {
    /// Segmentation service behind the Input Server connection
    #[default]
    Remote,
    /// Local dictionary-engine HTTP endpoint
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub backend: TokenizerBackend,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_engine_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_scan_length")]
    pub scan_length: u32,
    #[serde(default = "default_furigana_timeout")]
    pub furigana_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:19633".to_string()
}
fn default_engine_timeout() -> u64 {
    1800
}
fn default_scan_length() -> u32 {
    16
}
fn default_furigana_timeout() -> u64 {
    5000
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            backend: TokenizerBackend::default(),
            base_url: default_base_url(),
            timeout_ms: default_engine_timeout(),
            scan_length: default_scan_length(),
            furigana_timeout_ms: default_furigana_timeout(),
        }
    }
}

impl TokenizerConfig {
    /// Engine timeout clamped into the supported range
    pub fn clamped_timeout_ms(&self) -> u64 {
        self.timeout_ms
            .clamp(MIN_ENGINE_TIMEOUT_MS, MAX_ENGINE_TIMEOUT_MS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_true")]
    pub show_indicator: bool,
    #[serde(default = "default_highlight_color")]
    pub highlight_color: String,
    #[serde(default = "default_cursor_color")]
    pub cursor_color: String,
}

fn default_highlight_color() -> String {
    "#00ff88".to_string()
}
fn default_cursor_color() -> String {
    "#ffc800".to_string()
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            show_indicator: default_true(),
            highlight_color: default_highlight_color(),
            cursor_color: default_cursor_color(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_with_options(None)
    }

    /// Load config from a custom file path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;
        let config = Self::parse(&contents)
            .context(format!("Failed to parse config file: {:?}", path))?;
        config.log_warnings();
        Ok(config)
    }

    /// Load from `--config`, or the profile directory (writing defaults on first run)
    pub fn load_with_options(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        // Extract defaults on first run (idempotent - only creates missing files)
        Self::extract_defaults()?;
        Self::load_from_path(&Self::config_path()?)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Text of the embedded default config
    pub fn default_toml() -> &'static str {
        DEFAULT_CONFIG
    }

    /// Human-readable problems with the current values
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let mut by_index: HashMap<u32, Vec<&str>> = HashMap::new();
        for (name, index) in self.buttons.assignments() {
            by_index.entry(index).or_default().push(name);
        }
        let mut duplicates: Vec<_> = by_index
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .collect();
        duplicates.sort_by_key(|(index, _)| *index);
        for (index, names) in duplicates {
            warnings.push(format!(
                "Button {} is assigned to several actions: {}",
                index,
                names.join(", ")
            ));
        }

        let timeout = self.tokenizer.timeout_ms;
        if timeout != self.tokenizer.clamped_timeout_ms() {
            warnings.push(format!(
                "tokenizer.timeout_ms = {} is outside {}..={}, using {}",
                timeout,
                MIN_ENGINE_TIMEOUT_MS,
                MAX_ENGINE_TIMEOUT_MS,
                self.tokenizer.clamped_timeout_ms()
            ));
        }

        if !(0.0..1.0).contains(&self.pointer.deadzone) {
            warnings.push(format!(
                "pointer.deadzone = {} must be in [0, 1)",
                self.pointer.deadzone
            ));
        }

        if self.pointer.min_sample_ms > self.pointer.max_sample_ms {
            warnings.push("pointer.min_sample_ms is larger than pointer.max_sample_ms; the values are used in order".to_string());
        }

        warnings
    }

    fn log_warnings(&self) {
        for warning in self.validate() {
            tracing::warn!("Config: {}", warning);
        }
    }

    /// Write the default config file if it is missing
    fn extract_defaults() -> Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {:?}", parent))?;
        }
        fs::write(&path, DEFAULT_CONFIG)
            .context(format!("Failed to write default config: {:?}", path))?;
        tracing::info!("Wrote default config to {:?}", path);
        Ok(())
    }

    /// Get the base padscan directory (~/.padscan/)
    /// Can be overridden with PADSCAN_DIR environment variable
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(custom_dir) = std::env::var("PADSCAN_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }

        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".padscan"))
    }

    /// Returns: ~/.padscan/config.toml
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}
