//! Runtime configuration for the automation engine.
//!
//! The only environment-facing knobs are the backend switch (native vs
//! toolkit-injected) and the display scaling overrides; everything else is
//! timing. Values come from [`AutomationConfig::default`] and are then
//! overridden by environment variables:
//!
//! | Variable                       | Effect                                   |
//! |--------------------------------|------------------------------------------|
//! | `STAGEHAND_BACKEND`            | `native` or `toolkit`                    |
//! | `STAGEHAND_SCALE`              | fixed display scale factor, e.g. `2.0`   |
//! | `STAGEHAND_SCALING`            | `true`/`false`, force scaling on or off  |
//! | `STAGEHAND_SETTLE_TIMEOUT_MS`  | drain-wait timeout in milliseconds       |
//!
//! # Example
//!
//! ```
//! use stagehand_core::config::{AutomationConfig, BackendKind};
//!
//! let config = AutomationConfig::from_env();
//! if config.backend == BackendKind::Native {
//!     println!("driving the OS input layer");
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geometry::platform_requires_scaling;

/// Which input backend drives the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The platform's native input-injection facility.
    Native,
    /// Synthetic events posted into the application's own event queue.
    #[default]
    Toolkit,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "os" => Ok(Self::Native),
            "toolkit" | "injected" => Ok(Self::Toolkit),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Backend selection.
    pub backend: BackendKind,

    /// Fixed display scale; `None` asks the backend to query the display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,

    /// Force logical-to-device scaling on or off; `None` uses the platform
    /// default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_scaling: Option<bool>,

    /// Upper bound for a drain wait.
    pub settle_timeout_ms: u64,

    /// How many no-op round trips a drain wait makes through the UI queue.
    pub drain_rounds: u32,

    /// Pause after each interpolated pointer step.
    pub step_delay_ms: u64,

    /// Pause between the two clicks of a double click.
    pub double_click_delay_ms: u64,

    /// Upper bound for waiting on a specific event signature.
    pub event_wait_timeout_ms: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            scale_factor: None,
            apply_scaling: None,
            settle_timeout_ms: 5000,
            drain_rounds: 5,
            step_delay_ms: 1,
            double_click_delay_ms: 50,
            event_wait_timeout_ms: 2000,
        }
    }
}

impl AutomationConfig {
    /// Defaults overridden by `STAGEHAND_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    ///
    /// Unparseable values are logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("STAGEHAND_BACKEND") {
            match raw.parse() {
                Ok(kind) => self.backend = kind,
                Err(e) => warn!(value = %raw, "ignoring STAGEHAND_BACKEND: {}", e),
            }
        }
        if let Some(raw) = lookup("STAGEHAND_SCALE") {
            match raw.trim().parse::<f64>() {
                Ok(factor) if factor.is_finite() && factor > 0.0 => self.scale_factor = Some(factor),
                _ => warn!(value = %raw, "ignoring STAGEHAND_SCALE: expected a positive number"),
            }
        }
        if let Some(raw) = lookup("STAGEHAND_SCALING") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.apply_scaling = Some(true),
                "0" | "false" | "off" | "no" => self.apply_scaling = Some(false),
                _ => warn!(value = %raw, "ignoring STAGEHAND_SCALING: expected true or false"),
            }
        }
        if let Some(raw) = lookup("STAGEHAND_SETTLE_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.settle_timeout_ms = ms,
                Err(_) => warn!(value = %raw, "ignoring STAGEHAND_SETTLE_TIMEOUT_MS"),
            }
        }
        self
    }

    /// Whether backends should convert logical coordinates to device pixels.
    pub fn scaling_enabled(&self) -> bool {
        self.apply_scaling.unwrap_or_else(platform_requires_scaling)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn event_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.event_wait_timeout_ms)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn double_click_delay(&self) -> Duration {
        Duration::from_millis(self.double_click_delay_ms)
    }
}
