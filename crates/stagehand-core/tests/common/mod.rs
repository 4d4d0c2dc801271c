//! Shared test helpers for stagehand-core integration tests.
//!
//! Provides an in-memory application whose UI runs on its own thread, a
//! backend that records every primitive call, and a standard scene wired
//! into a [`Controller`].

#![allow(dead_code)]

use std::sync::{mpsc, Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tokio::sync::broadcast;

use stagehand_core::app::{Application, SyntheticEvent, UiEvent, UiEventKind, UiTask, UiThreadGone};
use stagehand_core::backend::{BackendCapabilities, BackendError, InputBackend, ToolkitBackend};
use stagehand_core::config::AutomationConfig;
use stagehand_core::controller::Controller;
use stagehand_core::element::{Element, Node, Window, WindowNode};
use stagehand_core::geometry::{Region, ScreenPoint};
use stagehand_core::input::{InputId, ScrollAxis};
use stagehand_core::motion::Motion;
use stagehand_core::session::AutomationSession;

/// Installs a fmt subscriber writing through the test harness.
///
/// Filtered by `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// In-memory UI tree
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NodeState {
    text: Option<String>,
    classes: Vec<String>,
    hidden: bool,
    position: ScreenPoint,
    size: (f64, f64),
    motion: Option<Motion>,
    parent: Option<Weak<NodeInner>>,
    children: Vec<Arc<NodeInner>>,
    window: Option<Weak<WindowInner>>,
}

struct NodeInner {
    id: String,
    state: Mutex<NodeState>,
}

impl Node for NodeInner {
    fn id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn style_classes(&self) -> Vec<String> {
        self.state.lock().unwrap().classes.clone()
    }

    fn text(&self) -> Option<String> {
        self.state.lock().unwrap().text.clone()
    }

    fn type_name(&self) -> Option<String> {
        Some("TestNode".to_string())
    }

    fn is_visible(&self) -> bool {
        !self.state.lock().unwrap().hidden
    }

    fn bounds_in_local(&self) -> Region {
        let (w, h) = self.state.lock().unwrap().size;
        Region::new(0.0, 0.0, w, h)
    }

    fn position_in_parent(&self) -> ScreenPoint {
        self.state.lock().unwrap().position
    }

    fn parent(&self) -> Option<Element> {
        let parent = self.state.lock().unwrap().parent.clone()?;
        parent.upgrade().map(|p| Element::new(p))
    }

    fn children(&self) -> Vec<Element> {
        self.state
            .lock()
            .unwrap()
            .children
            .iter()
            .map(|c| Element::new(c.clone()))
            .collect()
    }

    fn window(&self) -> Option<Window> {
        let window = self.state.lock().unwrap().window.clone()?;
        window.upgrade().map(|w| Window::new(w))
    }

    fn preferred_motion(&self) -> Option<Motion> {
        self.state.lock().unwrap().motion
    }
}

/// A node in the test tree; clones share the node.
#[derive(Clone)]
pub struct TestNode(Arc<NodeInner>);

impl TestNode {
    pub fn new(id: &str, bounds: Region) -> Self {
        Self(Arc::new(NodeInner {
            id: id.to_string(),
            state: Mutex::new(NodeState {
                position: bounds.origin(),
                size: (bounds.width, bounds.height),
                ..Default::default()
            }),
        }))
    }

    pub fn text(self, text: &str) -> Self {
        self.0.state.lock().unwrap().text = Some(text.to_string());
        self
    }

    pub fn class(self, class: &str) -> Self {
        self.0.state.lock().unwrap().classes.push(class.to_string());
        self
    }

    pub fn motion(self, motion: Motion) -> Self {
        self.0.state.lock().unwrap().motion = Some(motion);
        self
    }

    pub fn add(&self, child: &TestNode) -> &Self {
        child.0.state.lock().unwrap().parent = Some(Arc::downgrade(&self.0));
        self.0.state.lock().unwrap().children.push(child.0.clone());
        self
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.0.state.lock().unwrap().hidden = hidden;
    }

    /// Moves the node within its parent.
    pub fn relocate(&self, x: f64, y: f64) {
        self.0.state.lock().unwrap().position = ScreenPoint::new(x, y);
    }

    pub fn element(&self) -> Element {
        Element::new(self.0.clone())
    }
}

struct WindowInner {
    title: String,
    bounds: Region,
    owner: Option<Weak<WindowInner>>,
    roots: Mutex<Vec<Arc<NodeInner>>>,
}

impl WindowNode for WindowInner {
    fn title(&self) -> Option<String> {
        Some(self.title.clone())
    }

    fn owner(&self) -> Option<Window> {
        self.owner
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|w| Window::new(w))
    }

    fn bounds(&self) -> Region {
        self.bounds
    }

    fn roots(&self) -> Vec<Element> {
        self.roots
            .lock()
            .unwrap()
            .iter()
            .map(|r| Element::new(r.clone()))
            .collect()
    }
}

/// A top-level test window; clones share the window.
#[derive(Clone)]
pub struct TestWindow(Arc<WindowInner>);

impl TestWindow {
    pub fn new(title: &str, bounds: Region) -> Self {
        Self::build(title, bounds, None)
    }

    pub fn owned_by(title: &str, bounds: Region, owner: &TestWindow) -> Self {
        Self::build(title, bounds, Some(Arc::downgrade(&owner.0)))
    }

    fn build(title: &str, bounds: Region, owner: Option<Weak<WindowInner>>) -> Self {
        Self(Arc::new(WindowInner {
            title: title.to_string(),
            bounds,
            owner,
            roots: Mutex::new(Vec::new()),
        }))
    }

    pub fn mount(&self, root: &TestNode) {
        root.0.state.lock().unwrap().window = Some(Arc::downgrade(&self.0));
        self.0.roots.lock().unwrap().push(root.0.clone());
    }

    pub fn window(&self) -> Window {
        Window::new(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Threaded application
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Dispatch {
    delivered: Vec<UiEvent>,
    typed: String,
    pressed_on: Option<String>,
}

/// An application whose UI thread drains a task queue on a std thread.
///
/// Injected events are hit-tested against the tree on the UI thread and
/// re-broadcast as [`UiEvent`]s; a press and release on the same node also
/// fires a click.
pub struct ThreadedApp {
    windows: Mutex<Vec<TestWindow>>,
    tasks: Mutex<Option<mpsc::Sender<UiTask>>>,
    events: broadcast::Sender<UiEvent>,
    dispatch: Arc<Mutex<Dispatch>>,
}

impl ThreadedApp {
    pub fn start(windows: Vec<TestWindow>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<UiTask>();
        thread::Builder::new()
            .name("test-ui".to_string())
            .spawn(move || {
                while let Ok(task) = rx.recv() {
                    task();
                }
            })
            .unwrap();
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            windows: Mutex::new(windows),
            tasks: Mutex::new(Some(tx)),
            events,
            dispatch: Arc::new(Mutex::new(Dispatch::default())),
        })
    }

    pub fn set_windows(&self, windows: Vec<TestWindow>) {
        *self.windows.lock().unwrap() = windows;
    }

    /// Stops the UI thread; later posts fail.
    pub fn shutdown(&self) {
        self.tasks.lock().unwrap().take();
    }

    /// Keeps the UI thread busy for `duration`.
    pub fn block_ui(&self, duration: Duration) {
        self.run_later(Box::new(move || thread::sleep(duration))).unwrap();
    }

    /// Events delivered so far, in order.
    pub fn delivered(&self) -> Vec<UiEvent> {
        self.dispatch.lock().unwrap().delivered.clone()
    }

    /// Delivered events of one kind, by target id.
    pub fn targets_of(&self, kind: UiEventKind) -> Vec<Option<String>> {
        self.delivered()
            .into_iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.target)
            .collect()
    }

    /// Text received through key-typed events.
    pub fn typed(&self) -> String {
        self.dispatch.lock().unwrap().typed.clone()
    }
}

impl Application for ThreadedApp {
    fn windows(&self) -> Vec<Window> {
        self.windows.lock().unwrap().iter().map(TestWindow::window).collect()
    }

    fn run_later(&self, task: UiTask) -> Result<(), UiThreadGone> {
        match self.tasks.lock().unwrap().as_ref() {
            Some(tx) => tx.send(task).map_err(|_| UiThreadGone),
            None => Err(UiThreadGone),
        }
    }

    fn subscribe_events(&self) -> Option<broadcast::Receiver<UiEvent>> {
        Some(self.events.subscribe())
    }

    fn inject(&self, event: SyntheticEvent) -> Result<(), BackendError> {
        let windows = self.windows();
        let events = self.events.clone();
        let dispatch = self.dispatch.clone();
        self.run_later(Box::new(move || deliver(event, &windows, &events, &dispatch)))
            .map_err(|_| BackendError::Disconnected)
    }

    fn snapshot(&self, region: Region) -> Result<RgbaImage, BackendError> {
        let width = region.width.ceil().max(1.0) as u32;
        let height = region.height.ceil().max(1.0) as u32;
        Ok(RgbaImage::from_pixel(width, height, Rgba([40, 40, 40, 255])))
    }
}

fn deliver(
    event: SyntheticEvent,
    windows: &[Window],
    events: &broadcast::Sender<UiEvent>,
    dispatch: &Mutex<Dispatch>,
) {
    let (kind, point) = match &event {
        SyntheticEvent::MouseMoved { point } => (UiEventKind::MouseMoved, Some(*point)),
        SyntheticEvent::MouseDragged { point, .. } => (UiEventKind::MouseDragged, Some(*point)),
        SyntheticEvent::MousePressed { point, .. } => (UiEventKind::MousePressed, Some(*point)),
        SyntheticEvent::MouseReleased { point, .. } => (UiEventKind::MouseReleased, Some(*point)),
        SyntheticEvent::Scroll { point, .. } => (UiEventKind::Scroll, Some(*point)),
        SyntheticEvent::KeyPressed { .. } => (UiEventKind::KeyPressed, None),
        SyntheticEvent::KeyReleased { .. } => (UiEventKind::KeyReleased, None),
        SyntheticEvent::KeyTyped { .. } => (UiEventKind::KeyTyped, None),
    };
    let target = point.and_then(|p| hit_test(windows, p)).and_then(|e| e.id());

    let mut fired = vec![UiEvent {
        kind,
        target: target.clone(),
    }];
    {
        let mut state = dispatch.lock().unwrap();
        match event {
            SyntheticEvent::KeyTyped { character } => state.typed.push(character),
            SyntheticEvent::MousePressed { .. } => state.pressed_on = target.clone(),
            SyntheticEvent::MouseReleased { .. } => {
                if target.is_some() && state.pressed_on.take() == target {
                    fired.push(UiEvent {
                        kind: UiEventKind::MouseClicked,
                        target: target.clone(),
                    });
                }
            }
            _ => {}
        }
        state.delivered.extend(fired.iter().cloned());
    }
    for event in fired {
        let _ = events.send(event);
    }
}

/// The deepest visible element under `point`, topmost window first.
fn hit_test(windows: &[Window], point: ScreenPoint) -> Option<Element> {
    windows.iter().rev().find_map(|window| {
        let mut hit = None;
        let mut stack = window.roots();
        while let Some(element) = stack.pop() {
            let inside = element.bounds_on_screen().is_some_and(|b| b.contains(point));
            if inside && element.is_tree_visible() {
                hit = Some(element.clone());
                stack = element.children();
            }
        }
        hit
    })
}

// ---------------------------------------------------------------------------
// Recording backend
// ---------------------------------------------------------------------------

/// A primitive backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    MoveTo(ScreenPoint),
    Press(InputId),
    Release(InputId),
    Scroll(i32, ScrollAxis),
    TypeText(String),
}

/// Shared view of a [`RecordingBackend`]'s calls, usable after the backend
/// has moved into a controller.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
    move_budget: Arc<Mutex<Option<usize>>>,
    failing_releases: Arc<Mutex<usize>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn presses(&self) -> Vec<InputId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Press(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn releases(&self) -> Vec<InputId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Release(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn moves(&self) -> Vec<ScreenPoint> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::MoveTo(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    /// Lets `n` more pointer moves succeed, then fails every move.
    pub fn fail_moves_after(&self, n: usize) {
        *self.move_budget.lock().unwrap() = Some(n);
    }

    /// Fails the next `n` releases without forwarding them.
    pub fn fail_releases(&self, n: usize) {
        *self.failing_releases.lock().unwrap() = n;
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Records each call, then forwards it to a [`ToolkitBackend`].
pub struct RecordingBackend {
    inner: ToolkitBackend,
    recorder: Recorder,
}

impl RecordingBackend {
    pub fn new(app: Arc<dyn Application>) -> (Self, Recorder) {
        let recorder = Recorder::default();
        let backend = Self {
            inner: ToolkitBackend::new(app),
            recorder: recorder.clone(),
        };
        (backend, recorder)
    }
}

#[async_trait]
impl InputBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.inner.capabilities()
    }

    async fn pointer_position(&self) -> Result<ScreenPoint, BackendError> {
        self.inner.pointer_position().await
    }

    async fn move_to(&self, point: ScreenPoint) -> Result<(), BackendError> {
        {
            let mut budget = self.recorder.move_budget.lock().unwrap();
            match budget.as_mut() {
                Some(0) => return Err(BackendError::CommandFailed("pointer stuck".to_string())),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.recorder.record(Call::MoveTo(point));
        self.inner.move_to(point).await
    }

    async fn press(&self, input: InputId) -> Result<(), BackendError> {
        self.recorder.record(Call::Press(input));
        self.inner.press(input).await
    }

    async fn release(&self, input: InputId) -> Result<(), BackendError> {
        {
            let mut failing = self.recorder.failing_releases.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(BackendError::CommandFailed("release swallowed".to_string()));
            }
        }
        self.recorder.record(Call::Release(input));
        self.inner.release(input).await
    }

    async fn scroll(&self, amount: i32, axis: ScrollAxis) -> Result<(), BackendError> {
        self.recorder.record(Call::Scroll(amount, axis));
        self.inner.scroll(amount, axis).await
    }

    async fn type_text(&self, text: &str) -> Result<(), BackendError> {
        self.recorder.record(Call::TypeText(text.to_string()));
        self.inner.type_text(text).await
    }

    async fn read_pixel(&self, point: ScreenPoint) -> Result<Rgba<u8>, BackendError> {
        self.inner.read_pixel(point).await
    }

    async fn capture_region(&self, region: Region) -> Result<RgbaImage, BackendError> {
        self.inner.capture_region(region).await
    }

    async fn screen_bounds(&self) -> Result<Region, BackendError> {
        self.inner.screen_bounds().await
    }
}

// ---------------------------------------------------------------------------
// Standard scene
// ---------------------------------------------------------------------------

/// Everything a controller test needs.
pub struct Harness {
    pub app: Arc<ThreadedApp>,
    pub main: TestWindow,
    pub submit: TestNode,
    pub cancel: TestNode,
    pub name_field: TestNode,
    pub secret: TestNode,
    pub source: TestNode,
    pub sink: TestNode,
    pub recorder: Recorder,
    pub controller: Controller,
}

/// Fast timings so tests do not sleep.
pub fn test_config() -> AutomationConfig {
    AutomationConfig {
        step_delay_ms: 0,
        double_click_delay_ms: 0,
        settle_timeout_ms: 2000,
        event_wait_timeout_ms: 2000,
        ..AutomationConfig::default()
    }
}

/// A 400x300 window at (100, 100) with two buttons, a text field, a hidden
/// node and a drag source and sink.
pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: AutomationConfig) -> Harness {
    init_tracing();

    let main = TestWindow::new("main", Region::new(100.0, 100.0, 400.0, 300.0));
    let root = TestNode::new("root", Region::new(0.0, 0.0, 400.0, 300.0));
    let submit = TestNode::new("submitBtn", Region::new(20.0, 20.0, 100.0, 30.0))
        .text("Submit")
        .class("button");
    let cancel = TestNode::new("cancelBtn", Region::new(140.0, 20.0, 100.0, 30.0))
        .text("Cancel")
        .class("button");
    let name_field = TestNode::new("name", Region::new(20.0, 80.0, 200.0, 30.0)).class("field");
    let secret = TestNode::new("secret", Region::new(260.0, 20.0, 50.0, 30.0)).text("Secret");
    secret.set_hidden(true);
    let source = TestNode::new("source", Region::new(20.0, 150.0, 50.0, 50.0)).class("tile");
    let sink = TestNode::new("sink", Region::new(200.0, 150.0, 80.0, 80.0)).class("tile");
    for child in [&submit, &cancel, &name_field, &secret, &source, &sink] {
        root.add(child);
    }
    main.mount(&root);

    let app = ThreadedApp::start(vec![main.clone()]);
    let dyn_app: Arc<dyn Application> = app.clone();
    let (backend, recorder) = RecordingBackend::new(dyn_app.clone());
    let controller = Controller::with_backend(dyn_app, AutomationSession::new(), config, Box::new(backend));

    Harness {
        app,
        main,
        submit,
        cancel,
        name_field,
        secret,
        source,
        sink,
        recorder,
        controller,
    }
}

/// Screen-space center of `node`.
pub fn center_of(node: &TestNode) -> ScreenPoint {
    let bounds = node.element().bounds_on_screen().unwrap();
    ScreenPoint::new(bounds.x + bounds.width / 2.0, bounds.y + bounds.height / 2.0)
}
