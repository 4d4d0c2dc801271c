//! Handles into the application's UI tree.
//!
//! The engine never owns UI nodes. The embedding toolkit implements [`Node`]
//! and [`WindowNode`] for its own types and hands out [`Element`] and
//! [`Window`] handles, which are thin `Arc` wrappers. Identity is pointer
//! identity: two handles are the same element only if they share the same
//! allocation, so implementations must return clones of one `Arc` per node
//! rather than fresh wrappers on every call.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::geometry::{Region, ScreenPoint};
use crate::motion::Motion;

/// Upper bound on parent/owner chain walks, guarding against cyclic trees.
pub(crate) const MAX_CHAIN_DEPTH: usize = 4096;

/// A node in the application's UI tree, as seen by the engine.
pub trait Node: Send + Sync {
    /// Structural identifier (`#id` selectors).
    fn id(&self) -> Option<String>;

    /// Style classes (`.class` selectors).
    fn style_classes(&self) -> Vec<String> {
        Vec::new()
    }

    /// The user-visible label or text, if the node renders one.
    fn text(&self) -> Option<String> {
        None
    }

    /// Toolkit type name, e.g. `"Button"`. Diagnostics only.
    fn type_name(&self) -> Option<String> {
        None
    }

    /// The node's own visibility flag, ignoring ancestors.
    fn is_visible(&self) -> bool;

    /// Whether the node accepts input.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Bounds in the node's local coordinate space.
    fn bounds_in_local(&self) -> Region;

    /// Translation from this node's local space into its parent's.
    ///
    /// For a scene root this is the offset inside the scene.
    fn position_in_parent(&self) -> ScreenPoint {
        ScreenPoint::default()
    }

    /// Read-only parent link.
    fn parent(&self) -> Option<Element>;

    /// Children in paint order.
    fn children(&self) -> Vec<Element> {
        Vec::new()
    }

    /// Whether traversal should descend into this node.
    fn is_container(&self) -> bool {
        !self.children().is_empty()
    }

    /// The window displaying this node. Nodes that only know their parent
    /// may return `None`; [`Element::window`] walks up to the root.
    fn window(&self) -> Option<Window> {
        None
    }

    /// Motion the pointer should use when travelling to this node.
    ///
    /// Menu items declare [`Motion::HorizontalFirst`] or similar so that a
    /// diagonal path across a menu bar does not open a sibling menu.
    fn preferred_motion(&self) -> Option<Motion> {
        None
    }

    /// The toolkit's own structural lookup for `selector`, searching this
    /// node and its descendants. `None` means the toolkit has no native
    /// lookup and the engine should match structurally itself.
    fn lookup_all(&self, selector: &str) -> Option<Vec<Element>> {
        let _ = selector;
        None
    }
}

/// A top-level window of the application under test.
pub trait WindowNode: Send + Sync {
    /// Window title, used in diagnostics.
    fn title(&self) -> Option<String> {
        None
    }

    /// The owning window for popups and dialogs.
    fn owner(&self) -> Option<Window>;

    /// Whether the window is currently on screen.
    fn is_showing(&self) -> bool {
        true
    }

    /// Window bounds in logical screen coordinates.
    fn bounds(&self) -> Region;

    /// Offset of the scene content inside the window (decorations, insets).
    fn scene_origin(&self) -> ScreenPoint {
        ScreenPoint::default()
    }

    /// Size of the scene content. Defaults to the window size minus the
    /// scene origin.
    fn scene_size(&self) -> (f64, f64) {
        let bounds = self.bounds();
        let origin = self.scene_origin();
        (bounds.width - origin.x, bounds.height - origin.y)
    }

    /// Root nodes of the window's scene.
    fn roots(&self) -> Vec<Element>;
}

/// A cheap, clonable handle to a [`Node`].
#[derive(Clone)]
pub struct Element(Arc<dyn Node>);

impl Element {
    /// Wraps a node handle.
    pub fn new(node: Arc<dyn Node>) -> Self {
        Self(node)
    }

    /// Access to the underlying node.
    pub fn node(&self) -> &dyn Node {
        self.0.as_ref()
    }

    /// Identity key; equal keys mean the same node.
    pub fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether `self` and `other` refer to the same node.
    pub fn same(&self, other: &Self) -> bool {
        self.key() == other.key()
    }

    /// Structural identifier.
    pub fn id(&self) -> Option<String> {
        self.0.id()
    }

    /// Label or text.
    pub fn text(&self) -> Option<String> {
        self.0.text()
    }

    /// Style classes.
    pub fn style_classes(&self) -> Vec<String> {
        self.0.style_classes()
    }

    /// Parent handle.
    pub fn parent(&self) -> Option<Element> {
        self.0.parent()
    }

    /// Child handles.
    pub fn children(&self) -> Vec<Element> {
        self.0.children()
    }

    /// Whether the node accepts input.
    pub fn is_enabled(&self) -> bool {
        self.0.is_enabled()
    }

    /// Motion preference declared by the node.
    pub fn preferred_motion(&self) -> Option<Motion> {
        self.0.preferred_motion()
    }

    /// The window displaying this element, found by walking up the parent
    /// chain until some node reports one.
    pub fn window(&self) -> Option<Window> {
        let mut current = Some(self.clone());
        for _ in 0..MAX_CHAIN_DEPTH {
            let node = current?;
            if let Some(window) = node.0.window() {
                return Some(window);
            }
            current = node.parent();
        }
        None
    }

    /// Whether this element and every ancestor up to its window are
    /// visible, and the window itself is showing.
    ///
    /// An element that is not attached to any window is never visible.
    pub fn is_tree_visible(&self) -> bool {
        let mut current = Some(self.clone());
        let mut depth = 0;
        while let Some(node) = current {
            if !node.0.is_visible() || depth >= MAX_CHAIN_DEPTH {
                return false;
            }
            depth += 1;
            current = node.parent();
        }
        self.window().is_some_and(|w| w.is_showing())
    }

    /// The element's bounds transformed local → scene → screen.
    ///
    /// Returns `None` when the element is not attached to a window.
    pub fn bounds_on_screen(&self) -> Option<Region> {
        let local = self.0.bounds_in_local();
        let (mut dx, mut dy) = (0.0, 0.0);
        let mut current = Some(self.clone());
        let mut depth = 0;
        while let Some(node) = current {
            if depth >= MAX_CHAIN_DEPTH {
                return None;
            }
            let offset = node.0.position_in_parent();
            dx += offset.x;
            dy += offset.y;
            depth += 1;
            current = node.parent();
        }
        let window = self.window()?;
        let scene = window.scene_origin_on_screen();
        Some(local.translate(dx + scene.x, dy + scene.y))
    }

    /// Short human-readable description, e.g. `Button#submit "Submit"`.
    pub fn describe(&self) -> String {
        let mut out = self.0.type_name().unwrap_or_else(|| "Node".to_string());
        if let Some(id) = self.0.id() {
            out.push('#');
            out.push_str(&id);
        }
        if let Some(text) = self.0.text() {
            out.push_str(&format!(" \"{}\"", text));
        }
        out
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Element").field(&self.describe()).finish()
    }
}

/// A cheap, clonable handle to a [`WindowNode`].
#[derive(Clone)]
pub struct Window(Arc<dyn WindowNode>);

impl Window {
    /// Wraps a window handle.
    pub fn new(window: Arc<dyn WindowNode>) -> Self {
        Self(window)
    }

    /// Identity key; equal keys mean the same window.
    pub fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether `self` and `other` refer to the same window.
    pub fn same(&self, other: &Self) -> bool {
        self.key() == other.key()
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn WindowNode> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn from_weak(weak: &Weak<dyn WindowNode>) -> Option<Self> {
        weak.upgrade().map(Self)
    }

    /// Title, if any.
    pub fn title(&self) -> Option<String> {
        self.0.title()
    }

    /// The owning window.
    pub fn owner(&self) -> Option<Window> {
        self.0.owner()
    }

    /// Whether the window is on screen.
    pub fn is_showing(&self) -> bool {
        self.0.is_showing()
    }

    /// Full window bounds on screen.
    pub fn bounds(&self) -> Region {
        self.0.bounds()
    }

    /// Scene root nodes.
    pub fn roots(&self) -> Vec<Element> {
        self.0.roots()
    }

    /// Top-left corner of the scene content on screen.
    pub fn scene_origin_on_screen(&self) -> ScreenPoint {
        let bounds = self.0.bounds();
        let origin = self.0.scene_origin();
        ScreenPoint::new(bounds.x + origin.x, bounds.y + origin.y)
    }

    /// Bounds of the scene content on screen.
    pub fn scene_bounds(&self) -> Region {
        let origin = self.scene_origin_on_screen();
        let (width, height) = self.0.scene_size();
        Region::new(origin.x, origin.y, width, height)
    }

    /// Whether walking the owner chain from `self` reaches `ancestor`.
    pub fn is_owned_by(&self, ancestor: &Window) -> bool {
        let mut current = self.owner();
        for _ in 0..MAX_CHAIN_DEPTH {
            match current {
                Some(owner) if owner.same(ancestor) => return true,
                Some(owner) => current = owner.owner(),
                None => return false,
            }
        }
        false
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> String {
        match self.0.title() {
            Some(title) => format!("window \"{}\"", title),
            None => format!("window@{:#x}", self.key()),
        }
    }
}

impl PartialEq for Window {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Window {}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Window").field(&self.describe()).finish()
    }
}
