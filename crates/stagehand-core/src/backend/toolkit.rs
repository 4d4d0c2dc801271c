//! Toolkit-level input: synthetic events posted into the application.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tracing::trace;

use super::{BackendCapabilities, BackendError, InputBackend};
use crate::app::{Application, SyntheticEvent};
use crate::geometry::{Region, ScreenPoint};
use crate::input::{InputId, MouseButton, ScrollAxis};

/// Presses of the same button at the same spot within this interval count
/// as one multi-click.
const MULTI_CLICK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct PointerState {
    position: ScreenPoint,
    buttons: Vec<MouseButton>,
    click_count: u32,
    last_release: Option<(MouseButton, ScreenPoint, Instant)>,
}

impl PointerState {
    /// Count the next press of `button` would carry.
    fn next_click_count(&self, button: MouseButton) -> u32 {
        let repeat = self.last_release.is_some_and(|(last, at, when)| {
            last == button && at == self.position && when.elapsed() <= MULTI_CLICK_INTERVAL
        });
        if repeat {
            self.click_count + 1
        } else {
            1
        }
    }
}

/// Injects [`SyntheticEvent`]s through [`Application::inject`].
///
/// The pointer is virtual: its position is whatever was last moved to, and
/// moves made while a button is held are delivered as drag events. Pixels
/// come from [`Application::snapshot`]. Works without a display server;
/// focus and window stacking follow the toolkit's own dispatch, not the OS.
pub struct ToolkitBackend {
    app: Arc<dyn Application>,
    pointer: Mutex<PointerState>,
}

impl ToolkitBackend {
    pub fn new(app: Arc<dyn Application>) -> Self {
        Self {
            app,
            pointer: Mutex::new(PointerState::default()),
        }
    }

    fn pointer(&self) -> MutexGuard<'_, PointerState> {
        self.pointer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inject(&self, event: SyntheticEvent) -> Result<(), BackendError> {
        trace!(?event, "inject");
        self.app.inject(event)
    }
}

impl std::fmt::Debug for ToolkitBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolkitBackend")
            .field("app", &"<Arc<dyn Application>>")
            .field("pointer", &*self.pointer())
            .finish()
    }
}

#[async_trait]
impl InputBackend for ToolkitBackend {
    fn name(&self) -> &'static str {
        "toolkit"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            scales_coordinates: false,
            os_faithful: false,
        }
    }

    async fn pointer_position(&self) -> Result<ScreenPoint, BackendError> {
        Ok(self.pointer().position)
    }

    // Pointer state is committed only once the event is accepted.
    async fn move_to(&self, point: ScreenPoint) -> Result<(), BackendError> {
        let mut pointer = self.pointer();
        let event = if pointer.buttons.is_empty() {
            SyntheticEvent::MouseMoved { point }
        } else {
            SyntheticEvent::MouseDragged {
                point,
                buttons: pointer.buttons.clone(),
            }
        };
        self.inject(event)?;
        pointer.position = point;
        Ok(())
    }

    async fn press(&self, input: InputId) -> Result<(), BackendError> {
        let button = match input {
            InputId::Mouse(button) => button,
            InputId::Key(key) => return self.inject(SyntheticEvent::KeyPressed { key }),
        };
        let mut pointer = self.pointer();
        let click_count = pointer.next_click_count(button);
        self.inject(SyntheticEvent::MousePressed {
            point: pointer.position,
            button,
            click_count,
        })?;
        pointer.click_count = click_count;
        pointer.buttons.push(button);
        Ok(())
    }

    async fn release(&self, input: InputId) -> Result<(), BackendError> {
        let button = match input {
            InputId::Mouse(button) => button,
            InputId::Key(key) => return self.inject(SyntheticEvent::KeyReleased { key }),
        };
        let mut pointer = self.pointer();
        let point = pointer.position;
        self.inject(SyntheticEvent::MouseReleased {
            point,
            button,
            click_count: pointer.click_count.max(1),
        })?;
        pointer.buttons.retain(|b| *b != button);
        pointer.last_release = Some((button, point, Instant::now()));
        Ok(())
    }

    async fn scroll(&self, amount: i32, axis: ScrollAxis) -> Result<(), BackendError> {
        let point = self.pointer().position;
        let (delta_x, delta_y) = match axis {
            ScrollAxis::Vertical => (0.0, amount as f64),
            ScrollAxis::Horizontal => (amount as f64, 0.0),
        };
        self.inject(SyntheticEvent::Scroll {
            point,
            delta_x,
            delta_y,
        })
    }

    async fn type_text(&self, text: &str) -> Result<(), BackendError> {
        for character in text.chars() {
            self.inject(SyntheticEvent::KeyTyped { character })?;
        }
        Ok(())
    }

    async fn read_pixel(&self, point: ScreenPoint) -> Result<Rgba<u8>, BackendError> {
        let image = self.app.snapshot(Region::new(point.x.floor(), point.y.floor(), 1.0, 1.0))?;
        image
            .get_pixel_checked(0, 0)
            .copied()
            .ok_or_else(|| BackendError::OffScreen(point.to_string()))
    }

    async fn capture_region(&self, region: Region) -> Result<RgbaImage, BackendError> {
        if region.is_degenerate() {
            return Err(BackendError::OffScreen(format!("{:?}", region)));
        }
        self.app.snapshot(region)
    }

    async fn screen_bounds(&self) -> Result<Region, BackendError> {
        Ok(self.app.screen_bounds())
    }
}
