//! Runtime configuration.
//!
//! Every section has a `Default` and missing TOML fields fall back to it, so
//! an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use winit::dpi::LogicalSize;

use crate::device::{Color, Filter, GpuInit, PresentMode};
use crate::frame::PresentTransform;
use crate::logging::LoggingConfig;
use crate::time::ClockConfig;
use crate::window::RuntimeConfig;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub simulation: SimulationConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "cadence".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: PresentMode,
    pub prefer_srgb: bool,
    /// 8-bit RGBA.
    pub clear_color: [u8; 4],
    pub present_transform: PresentTransform,
    pub present_filter: Filter,
    pub swap_index: u32,
    pub max_frame_latency: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: PresentMode::Fifo,
            prefer_srgb: true,
            clear_color: [100, 149, 237, 255], // cornflower blue
            present_transform: PresentTransform::Identity,
            present_filter: Filter::Nearest,
            swap_index: 0,
            max_frame_latency: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub fixed_step_secs: f64,
    pub max_frame_time_secs: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let clock = ClockConfig::default();
        Self {
            fixed_step_secs: clock.dt.as_secs_f64(),
            max_frame_time_secs: clock.max_frame_time.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `env_logger` filter; `None` defers to `RUST_LOG`.
    pub filter: Option<String>,
}

impl CadenceConfig {
    /// Loads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parses and validates TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.clock_config()?;
        ensure!(
            self.window.width > 0 && self.window.height > 0,
            "window size must be non-zero"
        );
        Ok(())
    }

    /// Fixed step and frame clamp as durations.
    ///
    /// The step must be at least one nanosecond and one clamped frame may
    /// not hold more than `u32::MAX` steps.
    pub fn clock_config(&self) -> Result<ClockConfig> {
        let sim = &self.simulation;
        let dt = Duration::try_from_secs_f64(sim.fixed_step_secs).with_context(|| {
            format!("simulation.fixed_step_secs out of range: {}", sim.fixed_step_secs)
        })?;
        ensure!(
            !dt.is_zero(),
            "simulation.fixed_step_secs must be at least 1ns, got {}",
            sim.fixed_step_secs
        );
        let max_frame_time = Duration::try_from_secs_f64(sim.max_frame_time_secs)
            .with_context(|| {
                format!("simulation.max_frame_time_secs out of range: {}", sim.max_frame_time_secs)
            })?;
        ensure!(
            max_frame_time >= dt,
            "simulation.max_frame_time_secs ({}) must be at least the fixed step ({})",
            sim.max_frame_time_secs,
            sim.fixed_step_secs
        );
        ensure!(
            max_frame_time.as_nanos() / dt.as_nanos() <= u128::from(u32::MAX),
            "simulation.max_frame_time_secs allows too many steps per frame"
        );
        Ok(ClockConfig { dt, max_frame_time })
    }

    pub fn clear_color(&self) -> Color {
        let [r, g, b, a] = self.graphics.clear_color;
        Color::from_rgba8(r, g, b, a)
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            title: self.window.title.clone(),
            initial_size: LogicalSize::new(self.window.width as f64, self.window.height as f64),
        }
    }

    pub fn gpu_init(&self) -> GpuInit {
        GpuInit {
            prefer_srgb: self.graphics.prefer_srgb,
            present_mode: self.graphics.present_mode,
            desired_maximum_frame_latency: self.graphics.max_frame_latency,
            ..GpuInit::default()
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig { env_filter: self.logging.filter.clone(), ..LoggingConfig::default() }
    }
}
