//! The seam between the engine and the application under test.
//!
//! Everything the engine knows about the running application goes through
//! the [`Application`] trait: its windows, its UI thread queue, the stream of
//! UI events it fires, and (for toolkit-level injection) its event queue and
//! renderer. Toolkit integrations implement this once; the engine never
//! touches toolkit types directly.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::backend::BackendError;
use crate::element::Window;
use crate::geometry::{Region, ScreenPoint};
use crate::input::{Key, MouseButton};

/// A unit of work posted to the UI thread.
pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// The UI thread has shut down and no longer accepts work.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("UI thread is no longer accepting work")]
pub struct UiThreadGone;

/// Kinds of UI events the engine can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiEventKind {
    MouseMoved,
    MouseDragged,
    MousePressed,
    MouseReleased,
    MouseClicked,
    KeyPressed,
    KeyReleased,
    KeyTyped,
    Scroll,
}

/// A UI event observed by the application's event loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEvent {
    /// What happened.
    pub kind: UiEventKind,
    /// Description of the node that received the event, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl UiEvent {
    /// Creates an event with no target description.
    pub fn new(kind: UiEventKind) -> Self {
        Self { kind, target: None }
    }
}

/// An input event synthesized by the toolkit backend, in logical coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyntheticEvent {
    /// Pointer moved with no button held.
    MouseMoved { point: ScreenPoint },
    /// Pointer moved while at least one button is held.
    MouseDragged {
        point: ScreenPoint,
        buttons: Vec<MouseButton>,
    },
    MousePressed {
        point: ScreenPoint,
        button: MouseButton,
        click_count: u32,
    },
    MouseReleased {
        point: ScreenPoint,
        button: MouseButton,
        click_count: u32,
    },
    /// Wheel movement; positive is down/right.
    Scroll {
        point: ScreenPoint,
        delta_x: f64,
        delta_y: f64,
    },
    KeyPressed { key: Key },
    KeyReleased { key: Key },
    KeyTyped { character: char },
}

/// The running application under test.
pub trait Application: Send + Sync {
    /// Current top-level windows, in the toolkit's enumeration order.
    ///
    /// Called fresh on every lookup; implementations must not return closed
    /// windows.
    fn windows(&self) -> Vec<Window>;

    /// Posts `task` to the UI thread's queue.
    fn run_later(&self, task: UiTask) -> Result<(), UiThreadGone>;

    /// Subscribes to UI events fired by the event loop.
    ///
    /// Returns `None` when the toolkit cannot report events; precise waits
    /// then degrade to a drain wait.
    fn subscribe_events(&self) -> Option<broadcast::Receiver<UiEvent>> {
        None
    }

    /// Injects a synthetic event directly into the application's event queue.
    fn inject(&self, event: SyntheticEvent) -> Result<(), BackendError> {
        let _ = event;
        Err(BackendError::Unsupported("event injection"))
    }

    /// Renders `region` (logical coordinates) into an image.
    fn snapshot(&self, region: Region) -> Result<RgbaImage, BackendError> {
        let _ = region;
        Err(BackendError::Unsupported("snapshot"))
    }

    /// The logical screen area the application occupies.
    fn screen_bounds(&self) -> Region {
        self.windows()
            .iter()
            .map(Window::bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default()
    }
}
