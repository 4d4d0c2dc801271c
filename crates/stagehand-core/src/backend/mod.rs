//! Input backends: primitive pointer, keyboard, wheel and capture operations.
//!
//! This module defines the [`InputBackend`] trait, the common interface for
//! every way of getting input into the application under test:
//!
//! - [`ToolkitBackend`] posts synthetic events straight into the
//!   application's event queue. It needs no display server and works in
//!   headless CI, but bypasses the OS, so focus and multi-window behavior
//!   are only as faithful as the toolkit's own dispatch.
//! - `NativeBackend` (cargo feature `native`) drives the platform's input
//!   injection facility through `enigo` and captures the screen with
//!   `xcap`. It is OS-faithful and requires a real display.
//!
//! All operations take and return logical coordinates. Backends that talk
//! to a device-pixel layer convert internally with a
//! [`DisplayScale`](crate::geometry::DisplayScale) and advertise it through
//! [`BackendCapabilities::scales_coordinates`].
//!
//! # Backend Selection
//!
//! The backend is chosen once, from configuration:
//!
//! ```
//! use std::sync::Arc;
//! use stagehand_core::backend::select_backend;
//! use stagehand_core::config::{AutomationConfig, BackendKind};
//! # use stagehand_core::app::{Application, UiTask, UiThreadGone};
//! # use stagehand_core::element::Window;
//! # struct App;
//! # impl Application for App {
//! #     fn windows(&self) -> Vec<Window> { Vec::new() }
//! #     fn run_later(&self, task: UiTask) -> Result<(), UiThreadGone> { task(); Ok(()) }
//! # }
//! let app: Arc<dyn Application> = Arc::new(App);
//! let config = AutomationConfig { backend: BackendKind::Toolkit, ..Default::default() };
//! let backend = select_backend(&config, app).expect("toolkit backend is always available");
//! assert_eq!(backend.name(), "toolkit");
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::app::Application;
use crate::config::{AutomationConfig, BackendKind};
use crate::error::AutomationError;
use crate::geometry::{Region, ScreenPoint};
use crate::input::{InputId, ScrollAxis};

#[cfg(feature = "native")]
mod native;
mod toolkit;

#[cfg(feature = "native")]
pub use native::NativeBackend;
pub use toolkit::ToolkitBackend;

/// Errors from a single backend call.
///
/// Every backend reports failures through this one type; the controller
/// wraps it in [`AutomationError::Backend`] together with the backend name.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend cannot run in this environment (e.g. headless).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The operation is not supported by this backend or application.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// A native or toolkit call failed with the given message.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// The requested point or region lies outside every screen.
    #[error("{0} is off screen")]
    OffScreen(String),

    /// The backend's worker stopped responding.
    #[error("backend worker disconnected")]
    Disconnected,
}

/// What a backend can and cannot do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Coordinates are converted to device pixels before reaching the
    /// native layer.
    pub scales_coordinates: bool,
    /// Input goes through the OS, so focus, window stacking and global
    /// shortcuts behave as for a real user.
    pub os_faithful: bool,
}

/// Primitive input and capture operations.
///
/// Implementations perform exactly one native action per call and never
/// deduplicate presses themselves; idempotency is handled above them by
/// [`PressStateTracker`](crate::press::PressStateTracker).
#[async_trait]
pub trait InputBackend: Send + Sync {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Capability flags.
    fn capabilities(&self) -> BackendCapabilities;

    /// Current pointer position.
    async fn pointer_position(&self) -> Result<ScreenPoint, BackendError>;

    /// Places the pointer at `point`.
    async fn move_to(&self, point: ScreenPoint) -> Result<(), BackendError>;

    /// Presses a button or key down.
    async fn press(&self, input: InputId) -> Result<(), BackendError>;

    /// Releases a button or key.
    async fn release(&self, input: InputId) -> Result<(), BackendError>;

    /// Turns the wheel by `amount` notches; positive is down or right.
    async fn scroll(&self, amount: i32, axis: ScrollAxis) -> Result<(), BackendError>;

    /// Types `text` into whatever has focus.
    async fn type_text(&self, text: &str) -> Result<(), BackendError>;

    /// Color of the pixel at `point`.
    async fn read_pixel(&self, point: ScreenPoint) -> Result<Rgba<u8>, BackendError>;

    /// Captures `region` of the screen.
    async fn capture_region(&self, region: Region) -> Result<RgbaImage, BackendError>;

    /// The logical area covered by the screen(s).
    async fn screen_bounds(&self) -> Result<Region, BackendError>;
}

/// Creates the backend named by `config`.
///
/// Fails with [`AutomationError::BackendUnavailable`] when the native
/// backend is requested but the environment cannot accept synthetic input,
/// or the crate was built without the `native` feature.
pub fn select_backend(
    config: &AutomationConfig,
    app: Arc<dyn Application>,
) -> Result<Box<dyn InputBackend>, AutomationError> {
    match config.backend {
        BackendKind::Toolkit => Ok(Box::new(ToolkitBackend::new(app))),
        BackendKind::Native => native_backend(config),
    }
}

#[cfg(feature = "native")]
fn native_backend(config: &AutomationConfig) -> Result<Box<dyn InputBackend>, AutomationError> {
    let backend = NativeBackend::new(config).map_err(AutomationError::backend("native"))?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "native"))]
fn native_backend(_config: &AutomationConfig) -> Result<Box<dyn InputBackend>, AutomationError> {
    Err(AutomationError::BackendUnavailable(
        "built without the `native` feature".to_string(),
    ))
}

/// Crops `region` out of `image`, clamping to the image edges.
#[cfg_attr(not(feature = "native"), allow(dead_code))]
pub(crate) fn crop(image: &RgbaImage, region: Region) -> Result<RgbaImage, BackendError> {
    let x = region.x.max(0.0).floor() as u32;
    let y = region.y.max(0.0).floor() as u32;
    if x >= image.width() || y >= image.height() {
        return Err(BackendError::OffScreen(format!("{:?}", region)));
    }
    let width = (region.width.ceil().max(1.0) as u32).min(image.width() - x);
    let height = (region.height.ceil().max(1.0) as u32).min(image.height() - y);
    Ok(image::imageops::crop_imm(image, x, y, width, height).to_image())
}
