use anyhow::{Context, Result};
use common::{BufferingMode, RenderBackendKind, TransitionRule};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::output::parse_hex_color;
use crate::render::MAX_SURFACE_SIDE;
use crate::validate_enum;

/// Default early-advance threshold before a clip's measured end
pub const DEFAULT_TRANSITION_EPSILON_MS: u64 = 5;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub sequence: SequenceSettings,

    #[serde(default)]
    pub stage: StageSettings,

    #[serde(default)]
    pub resolver: ResolverSettings,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One configured clip: where to fetch it and what follows it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClipConfig {
    pub rule: TransitionRule,
    pub source: String,
}

/// Sequence controller settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SequenceSettings {
    #[serde(default)]
    pub render_backend: RenderBackendKind,

    #[serde(default)]
    pub buffering: BufferingMode,

    #[serde(default = "default_epsilon")]
    pub transition_epsilon_ms: u64,

    #[serde(default = "default_true")]
    pub autostart: bool,

    #[serde(default, rename = "clip")]
    pub clips: Vec<ClipConfig>,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            render_backend: RenderBackendKind::default(),
            buffering: BufferingMode::default(),
            transition_epsilon_ms: default_epsilon(),
            autostart: true,
            clips: Vec::new(),
        }
    }
}

impl SequenceSettings {
    /// Validate the clip list; only required when a sequence is started
    pub fn validate_clips(&self) -> Result<()> {
        if self.clips.is_empty() {
            anyhow::bail!("Clip list is empty (add [[sequence.clip]] entries)");
        }

        for (index, clip) in self.clips.iter().enumerate() {
            if clip.source.trim().is_empty() {
                anyhow::bail!("Clip {} has an empty source", index);
            }
        }

        Ok(())
    }
}

fn default_epsilon() -> u64 {
    DEFAULT_TRANSITION_EPSILON_MS
}

fn default_true() -> bool {
    true
}

/// Render target description: the measured container and the output surface
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageSettings {
    #[serde(default = "default_width")]
    pub width: f64,

    #[serde(default = "default_height")]
    pub height: f64,

    #[serde(default)]
    pub x: f64,

    #[serde(default)]
    pub y: f64,

    #[serde(default = "default_pixel_ratio")]
    pub device_pixel_ratio: f64,

    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: u32,

    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_clear_color")]
    pub clear_color: String,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            x: 0.0,
            y: 0.0,
            device_pixel_ratio: default_pixel_ratio(),
            refresh_rate: default_refresh_rate(),
            output: default_output(),
            clear_color: default_clear_color(),
        }
    }
}

impl StageSettings {
    /// Interval between display-refresh ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_rate.max(1)))
    }

    /// Output surface path with `~` expanded
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.output).to_string())
    }
}

fn default_width() -> f64 {
    1280.0
}
fn default_height() -> f64 {
    720.0
}
fn default_pixel_ratio() -> f64 {
    1.0
}
fn default_refresh_rate() -> u32 {
    60
}
fn default_output() -> String {
    "~/.cache/clipchain/frame.bgra".to_string()
}
fn default_clear_color() -> String {
    "000000".to_string()
}

/// Clip source resolver settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverSettings {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ResolverSettings {
    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.cache_dir).to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_cache_dir() -> String {
    "~/.cache/clipchain/clips".to_string()
}
fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("clipchain");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.validate_log_level(&self.general.log_level)?;

        let stage = &self.stage;
        if stage.width <= 0.0 || stage.height <= 0.0 {
            anyhow::bail!(
                "Stage size must be positive, got {}x{}",
                stage.width,
                stage.height
            );
        }
        if stage.device_pixel_ratio <= 0.0 {
            anyhow::bail!(
                "Device pixel ratio must be positive, got {}",
                stage.device_pixel_ratio
            );
        }
        let extent = |offset: f64, size: f64| (offset.max(0.0) + size) * stage.device_pixel_ratio;
        let (surface_width, surface_height) =
            (extent(stage.x, stage.width), extent(stage.y, stage.height));
        let fits = |side: f64| side.is_finite() && side <= f64::from(MAX_SURFACE_SIDE);
        if !fits(surface_width) || !fits(surface_height) {
            anyhow::bail!(
                "Stage needs a {:.0}x{:.0} output, larger than the {}px limit",
                surface_width,
                surface_height,
                MAX_SURFACE_SIDE
            );
        }
        if !(1..=480).contains(&stage.refresh_rate) {
            anyhow::bail!(
                "Refresh rate must be within 1..=480, got {}",
                stage.refresh_rate
            );
        }
        if parse_hex_color(&stage.clear_color).is_none() {
            anyhow::bail!("Invalid clear color: {}", stage.clear_color);
        }

        if self.sequence.autostart {
            self.sequence
                .validate_clips()
                .context("Autostart needs a playable clip list")?;
        } else {
            for (index, clip) in self.sequence.clips.iter().enumerate() {
                if clip.source.trim().is_empty() {
                    anyhow::bail!("Clip {} has an empty source", index);
                }
            }
        }

        Ok(())
    }

    fn validate_log_level(&self, level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }
}
