//! OS-level input through `enigo` and screen capture through `xcap`.
//!
//! `enigo` handles are not portable across threads on every platform, so
//! each backend owns a dedicated worker thread that creates the handle and
//! runs every input job in order. Whether the environment can accept
//! synthetic input at all is probed once per process.

use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;

use async_trait::async_trait;
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use image::{Rgba, RgbaImage};
use tokio::sync::oneshot;
use tracing::{debug, info};
use xcap::Monitor;

use super::{crop, BackendCapabilities, BackendError, InputBackend};
use crate::config::AutomationConfig;
use crate::geometry::{DisplayScale, Region, ScreenPoint};
use crate::input::{InputId, Key, MouseButton, ScrollAxis};

type Job = Box<dyn FnOnce(&mut Enigo) + Send + 'static>;

static ENVIRONMENT: OnceLock<Result<(), String>> = OnceLock::new();

/// Fails fast when there is nothing to inject input into.
fn probe_environment() -> Result<(), BackendError> {
    ENVIRONMENT
        .get_or_init(|| {
            if cfg!(target_os = "linux")
                && std::env::var_os("DISPLAY").is_none()
                && std::env::var_os("WAYLAND_DISPLAY").is_none()
            {
                return Err("no DISPLAY or WAYLAND_DISPLAY (headless)".to_string());
            }
            Enigo::new(&Settings::default())
                .map(drop)
                .map_err(|e| format!("cannot open input connection: {:?}", e))
        })
        .clone()
        .map_err(BackendError::Unavailable)
}

fn spawn_worker() -> Result<mpsc::Sender<Job>, BackendError> {
    let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
    thread::Builder::new()
        .name("stagehand-input".to_string())
        .spawn(move || {
            let mut enigo = match Enigo::new(&Settings::default()) {
                Ok(enigo) => {
                    let _ = ready_tx.send(Ok(()));
                    enigo
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("{:?}", e)));
                    return;
                }
            };
            // Exits once the backend drops its sender.
            while let Ok(job) = jobs_rx.recv() {
                job(&mut enigo);
            }
            debug!("input worker stopped");
        })
        .map_err(|e| BackendError::Unavailable(format!("cannot spawn input worker: {}", e)))?;
    ready_rx
        .recv()
        .map_err(|_| BackendError::Disconnected)?
        .map_err(BackendError::Unavailable)?;
    Ok(jobs_tx)
}

fn scale_for(config: &AutomationConfig) -> DisplayScale {
    if !config.scaling_enabled() {
        return DisplayScale::IDENTITY;
    }
    if let Some(factor) = config.scale_factor {
        return DisplayScale::new(factor);
    }
    Monitor::all()
        .ok()
        .and_then(|monitors| monitors.into_iter().find(|m| m.is_primary()))
        .map(|primary| DisplayScale::new(primary.scale_factor() as f64))
        .unwrap_or_default()
}

fn map_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Primary => Button::Left,
        MouseButton::Secondary => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

fn map_key(key: Key) -> Result<enigo::Key, BackendError> {
    use enigo::Key as K;
    Ok(match key {
        Key::Char(c) => K::Unicode(c),
        Key::Enter => K::Return,
        Key::Tab => K::Tab,
        Key::Escape => K::Escape,
        Key::Backspace => K::Backspace,
        Key::Delete => K::Delete,
        Key::Space => K::Space,
        Key::Shift => K::Shift,
        Key::Control => K::Control,
        Key::Alt => K::Alt,
        Key::Meta => K::Meta,
        Key::Up => K::UpArrow,
        Key::Down => K::DownArrow,
        Key::Left => K::LeftArrow,
        Key::Right => K::RightArrow,
        Key::Home => K::Home,
        Key::End => K::End,
        Key::PageUp => K::PageUp,
        Key::PageDown => K::PageDown,
        Key::F(n) => match n {
            1 => K::F1,
            2 => K::F2,
            3 => K::F3,
            4 => K::F4,
            5 => K::F5,
            6 => K::F6,
            7 => K::F7,
            8 => K::F8,
            9 => K::F9,
            10 => K::F10,
            11 => K::F11,
            12 => K::F12,
            13 => K::F13,
            14 => K::F14,
            15 => K::F15,
            16 => K::F16,
            17 => K::F17,
            18 => K::F18,
            19 => K::F19,
            20 => K::F20,
            _ => return Err(BackendError::Unsupported("function keys above F20")),
        },
    })
}

fn input_failed(what: &str) -> impl FnOnce(enigo::InputError) -> BackendError + '_ {
    move |e| BackendError::CommandFailed(format!("{}: {:?}", what, e))
}

/// Captures the monitor under `region`'s origin and crops to `region`.
///
/// Monitor positions are logical; captured images are device pixels.
fn capture_blocking(region: Region, scale: DisplayScale) -> Result<RgbaImage, BackendError> {
    let monitors = Monitor::all().map_err(|e| BackendError::CommandFailed(format!("list monitors: {}", e)))?;
    let origin = region.origin();
    let monitor = monitors
        .into_iter()
        .find(|m| monitor_region(m).contains(origin))
        .ok_or_else(|| BackendError::OffScreen(format!("{:?}", region)))?;
    let image = monitor
        .capture_image()
        .map_err(|e| BackendError::CommandFailed(format!("capture monitor: {}", e)))?;
    let relative = region.translate(-(monitor.x() as f64), -(monitor.y() as f64));
    crop(&image, scale.region_to_device(relative))
}

fn monitor_region(monitor: &Monitor) -> Region {
    Region::new(
        monitor.x() as f64,
        monitor.y() as f64,
        monitor.width() as f64,
        monitor.height() as f64,
    )
}

/// Drives the platform's input injection facility.
pub struct NativeBackend {
    jobs: mpsc::Sender<Job>,
    scale: DisplayScale,
    scaling: bool,
}

impl NativeBackend {
    /// Probes the environment and starts the input worker.
    pub fn new(config: &AutomationConfig) -> Result<Self, BackendError> {
        probe_environment()?;
        let jobs = spawn_worker()?;
        let scale = scale_for(config);
        info!(scale = scale.factor(), "native input backend ready");
        Ok(Self {
            jobs,
            scale,
            scaling: config.scaling_enabled(),
        })
    }

    /// The logical-to-device scale in effect.
    pub fn scale(&self) -> DisplayScale {
        self.scale
    }

    async fn run<T, F>(&self, job: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Enigo) -> Result<T, BackendError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(Box::new(move |enigo| {
                let _ = tx.send(job(enigo));
            }))
            .map_err(|_| BackendError::Disconnected)?;
        rx.await.map_err(|_| BackendError::Disconnected)?
    }

    async fn capture(&self, region: Region) -> Result<RgbaImage, BackendError> {
        let scale = self.scale;
        tokio::task::spawn_blocking(move || capture_blocking(region, scale))
            .await
            .map_err(|e| BackendError::CommandFailed(format!("capture task: {}", e)))?
    }
}

impl std::fmt::Debug for NativeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBackend")
            .field("jobs", &"<mpsc::Sender<Job>>")
            .field("scale", &self.scale)
            .field("scaling", &self.scaling)
            .finish()
    }
}

#[async_trait]
impl InputBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            scales_coordinates: self.scaling,
            os_faithful: true,
        }
    }

    async fn pointer_position(&self) -> Result<ScreenPoint, BackendError> {
        let (x, y) = self
            .run(|enigo| enigo.location().map_err(input_failed("read pointer")))
            .await?;
        Ok(self.scale.to_logical(ScreenPoint::new(x as f64, y as f64)))
    }

    async fn move_to(&self, point: ScreenPoint) -> Result<(), BackendError> {
        let (x, y) = self.scale.to_device(point).rounded();
        self.run(move |enigo| {
            enigo
                .move_mouse(x, y, Coordinate::Abs)
                .map_err(input_failed("move pointer"))
        })
        .await
    }

    async fn press(&self, input: InputId) -> Result<(), BackendError> {
        match input {
            InputId::Mouse(button) => {
                let button = map_button(button);
                self.run(move |enigo| {
                    enigo
                        .button(button, Direction::Press)
                        .map_err(input_failed("press button"))
                })
                .await
            }
            InputId::Key(key) => {
                let key = map_key(key)?;
                self.run(move |enigo| enigo.key(key, Direction::Press).map_err(input_failed("press key")))
                    .await
            }
        }
    }

    async fn release(&self, input: InputId) -> Result<(), BackendError> {
        match input {
            InputId::Mouse(button) => {
                let button = map_button(button);
                self.run(move |enigo| {
                    enigo
                        .button(button, Direction::Release)
                        .map_err(input_failed("release button"))
                })
                .await
            }
            InputId::Key(key) => {
                let key = map_key(key)?;
                self.run(move |enigo| {
                    enigo
                        .key(key, Direction::Release)
                        .map_err(input_failed("release key"))
                })
                .await
            }
        }
    }

    async fn scroll(&self, amount: i32, axis: ScrollAxis) -> Result<(), BackendError> {
        let axis = match axis {
            ScrollAxis::Vertical => Axis::Vertical,
            ScrollAxis::Horizontal => Axis::Horizontal,
        };
        self.run(move |enigo| enigo.scroll(amount, axis).map_err(input_failed("scroll")))
            .await
    }

    async fn type_text(&self, text: &str) -> Result<(), BackendError> {
        let text = text.to_string();
        self.run(move |enigo| enigo.text(&text).map_err(input_failed("type text")))
            .await
    }

    async fn read_pixel(&self, point: ScreenPoint) -> Result<Rgba<u8>, BackendError> {
        let image = self.capture(Region::new(point.x, point.y, 1.0, 1.0)).await?;
        image
            .get_pixel_checked(0, 0)
            .copied()
            .ok_or_else(|| BackendError::OffScreen(point.to_string()))
    }

    async fn capture_region(&self, region: Region) -> Result<RgbaImage, BackendError> {
        if region.is_degenerate() {
            return Err(BackendError::OffScreen(format!("{:?}", region)));
        }
        self.capture(region).await
    }

    async fn screen_bounds(&self) -> Result<Region, BackendError> {
        tokio::task::spawn_blocking(|| {
            let monitors =
                Monitor::all().map_err(|e| BackendError::CommandFailed(format!("list monitors: {}", e)))?;
            monitors
                .iter()
                .map(monitor_region)
                .reduce(|a, b| a.union(&b))
                .ok_or_else(|| BackendError::Unavailable("no monitors".to_string()))
        })
        .await
        .map_err(|e| BackendError::CommandFailed(format!("monitor task: {}", e)))?
    }
}
