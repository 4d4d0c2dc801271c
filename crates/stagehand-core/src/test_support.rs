//! In-memory UI tree and application used by unit tests.

use std::sync::{Arc, Mutex, Weak};

use image::{Rgba, RgbaImage};
use tokio::sync::broadcast;

use crate::app::{Application, SyntheticEvent, UiEvent, UiTask, UiThreadGone};
use crate::backend::BackendError;
use crate::element::{Element, Node, Window, WindowNode};
use crate::geometry::{Region, ScreenPoint};
use crate::motion::Motion;

#[derive(Default)]
struct NodeState {
    text: Option<String>,
    classes: Vec<String>,
    visible: bool,
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

    fn is_visible(&self) -> bool {
        self.state.lock().unwrap().visible
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

/// A test node; clones share the same underlying node.
#[derive(Clone)]
pub(crate) struct FakeNode(Arc<NodeInner>);

impl FakeNode {
    pub(crate) fn new(id: &str) -> Self {
        Self(Arc::new(NodeInner {
            id: id.to_string(),
            state: Mutex::new(NodeState {
                visible: true,
                ..Default::default()
            }),
        }))
    }

    pub(crate) fn at(self, x: f64, y: f64) -> Self {
        self.0.state.lock().unwrap().position = ScreenPoint::new(x, y);
        self
    }

    pub(crate) fn sized(self, width: f64, height: f64) -> Self {
        self.0.state.lock().unwrap().size = (width, height);
        self
    }

    pub(crate) fn with_text(self, text: &str) -> Self {
        self.0.state.lock().unwrap().text = Some(text.to_string());
        self
    }

    pub(crate) fn with_class(self, class: &str) -> Self {
        self.0.state.lock().unwrap().classes.push(class.to_string());
        self
    }

    pub(crate) fn with_motion(self, motion: Motion) -> Self {
        self.0.state.lock().unwrap().motion = Some(motion);
        self
    }

    pub(crate) fn set_visible(&self, visible: bool) {
        self.0.state.lock().unwrap().visible = visible;
    }

    pub(crate) fn set_window(&self, window: &FakeWindow) {
        self.0.state.lock().unwrap().window = Some(Arc::downgrade(&window.0));
    }

    pub(crate) fn attach(parent: &FakeNode, child: &FakeNode) {
        child.0.state.lock().unwrap().parent = Some(Arc::downgrade(&parent.0));
        parent.0.state.lock().unwrap().children.push(child.0.clone());
    }

    pub(crate) fn element(&self) -> Element {
        Element::new(self.0.clone())
    }
}

struct WindowInner {
    title: String,
    bounds: Region,
    scene_origin: ScreenPoint,
    owner: Option<Weak<WindowInner>>,
    showing: Mutex<bool>,
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

    fn is_showing(&self) -> bool {
        *self.showing.lock().unwrap()
    }

    fn bounds(&self) -> Region {
        self.bounds
    }

    fn scene_origin(&self) -> ScreenPoint {
        self.scene_origin
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

/// A test window; clones share the same underlying window.
#[derive(Clone)]
pub(crate) struct FakeWindow(Arc<WindowInner>);

impl FakeWindow {
    pub(crate) fn new(title: &str, bounds: Region) -> Self {
        Self(Arc::new(WindowInner {
            title: title.to_string(),
            bounds,
            scene_origin: ScreenPoint::default(),
            owner: None,
            showing: Mutex::new(true),
            roots: Mutex::new(Vec::new()),
        }))
    }

    /// Only valid before the window is shared.
    fn rebuild(self, f: impl FnOnce(&mut WindowInner)) -> Self {
        let mut inner = Arc::try_unwrap(self.0).unwrap_or_else(|_| panic!("window already shared"));
        f(&mut inner);
        Self(Arc::new(inner))
    }

    pub(crate) fn with_scene_origin(self, origin: ScreenPoint) -> Self {
        self.rebuild(|w| w.scene_origin = origin)
    }

    pub(crate) fn owned_by(self, owner: &FakeWindow) -> Self {
        let owner = Arc::downgrade(&owner.0);
        self.rebuild(|w| w.owner = Some(owner))
    }

    pub(crate) fn set_roots(&self, roots: Vec<FakeNode>) {
        *self.0.roots.lock().unwrap() = roots.into_iter().map(|r| r.0).collect();
    }

    pub(crate) fn set_showing(&self, showing: bool) {
        *self.0.showing.lock().unwrap() = showing;
    }

    /// Adds `root` as a scene root of this window and points it back here.
    pub(crate) fn mount(&self, root: &FakeNode) {
        root.set_window(self);
        self.0.roots.lock().unwrap().push(root.0.clone());
    }

    pub(crate) fn window(&self) -> Window {
        Window::new(self.0.clone())
    }
}

/// An application whose UI thread is the caller's thread.
///
/// Injected events are recorded; snapshots are solid white.
pub(crate) struct FakeApp {
    windows: Mutex<Vec<FakeWindow>>,
    events: broadcast::Sender<UiEvent>,
    injected: Mutex<Vec<SyntheticEvent>>,
    failing_injects: Mutex<usize>,
}

impl FakeApp {
    pub(crate) fn with_windows(windows: Vec<FakeWindow>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            windows: Mutex::new(windows),
            events,
            injected: Mutex::new(Vec::new()),
            failing_injects: Mutex::new(0),
        })
    }

    pub(crate) fn set_windows(&self, windows: Vec<FakeWindow>) {
        *self.windows.lock().unwrap() = windows;
    }

    pub(crate) fn fire(&self, event: UiEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn injected(&self) -> Vec<SyntheticEvent> {
        self.injected.lock().unwrap().clone()
    }

    /// Rejects the next `count` injections without recording them.
    pub(crate) fn fail_injects(&self, count: usize) {
        *self.failing_injects.lock().unwrap() = count;
    }
}

impl Application for FakeApp {
    fn windows(&self) -> Vec<Window> {
        self.windows.lock().unwrap().iter().map(FakeWindow::window).collect()
    }

    fn run_later(&self, task: UiTask) -> Result<(), UiThreadGone> {
        task();
        Ok(())
    }

    fn subscribe_events(&self) -> Option<broadcast::Receiver<UiEvent>> {
        Some(self.events.subscribe())
    }

    fn inject(&self, event: SyntheticEvent) -> Result<(), BackendError> {
        let mut failing = self.failing_injects.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(BackendError::CommandFailed("event queue rejected the event".to_string()));
        }
        self.injected.lock().unwrap().push(event);
        Ok(())
    }

    fn snapshot(&self, region: Region) -> Result<RgbaImage, BackendError> {
        let width = region.width.ceil().max(1.0) as u32;
        let height = region.height.ceil().max(1.0) as u32;
        Ok(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
    }
}
