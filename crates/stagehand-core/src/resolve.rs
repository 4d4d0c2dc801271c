//! Resolution of abstract targets to absolute screen coordinates.
//!
//! A [`Target`] names *what* to point at; [`PointResolver::resolve`] turns it
//! into a [`ScreenPoint`] by projecting the target's screen region onto one
//! of nine [`AnchorPosition`]s.
//!
//! Resolving an element (directly, or through a selector or predicate) makes
//! its window the session's last-targeted window, which later lookups use to
//! search nearby windows first. The target is read when the search starts
//! and written once the resolution succeeds; the session lock is not held
//! in between, so predicates are free to query the session themselves.
//!
//! Layout can change between computing a point and arriving at it, so a
//! [`PointQuery`] re-resolves its target every time it is queried. Movement
//! code queries once to plan the path and once more just before the final
//! placement.

use std::sync::Arc;

use tracing::warn;

use crate::element::{Element, Window};
use crate::error::AutomationError;
use crate::geometry::{AnchorPosition, Region, ScreenPoint};
use crate::motion::Motion;
use crate::query::{roots_of, Criterion, Predicate, SceneGraphIndex};
use crate::session::AutomationSession;

/// Something that can be resolved to a screen coordinate.
#[derive(Debug, Clone)]
pub enum Target {
    /// An absolute point; anchors have no effect.
    Point(ScreenPoint),
    /// An absolute region.
    Region(Region),
    /// A specific element's screen bounds.
    Element(Element),
    /// The content area of a window.
    Scene(Window),
    /// The full extent of a window, decorations included.
    Window(Window),
    /// A selector or label string, resolved through a lookup.
    Selector(String),
    /// The first element satisfying a predicate.
    Predicate(Predicate),
    /// The top-left of another target, shifted by `(dx, dy)`.
    Offset(Box<Target>, f64, f64),
}

impl Target {
    /// Wraps `self` in an offset from its top-left corner.
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::Offset(Box::new(self), dx, dy)
    }

    /// Description used in logs and failure messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Point(point) => point.to_string(),
            Self::Region(region) => format!("region {:?}", region),
            Self::Element(element) => element.describe(),
            Self::Scene(window) => format!("scene of {}", window.describe()),
            Self::Window(window) => window.describe(),
            Self::Selector(query) => Criterion::parse(query).describe(),
            Self::Predicate(predicate) => Criterion::Predicate(predicate.clone()).describe(),
            Self::Offset(inner, dx, dy) => format!("{} {:+}{:+}", inner.describe(), dx, dy),
        }
    }
}

impl From<ScreenPoint> for Target {
    fn from(point: ScreenPoint) -> Self {
        Self::Point(point)
    }
}

impl From<Region> for Target {
    fn from(region: Region) -> Self {
        Self::Region(region)
    }
}

impl From<Element> for Target {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<&Element> for Target {
    fn from(element: &Element) -> Self {
        Self::Element(element.clone())
    }
}

impl From<Window> for Target {
    fn from(window: Window) -> Self {
        Self::Window(window)
    }
}

impl From<&str> for Target {
    fn from(query: &str) -> Self {
        Self::Selector(query.to_string())
    }
}

impl From<String> for Target {
    fn from(query: String) -> Self {
        Self::Selector(query)
    }
}

impl From<Predicate> for Target {
    fn from(predicate: Predicate) -> Self {
        Self::Predicate(predicate)
    }
}

/// A resolved coordinate and what it landed on.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The absolute, logical screen point.
    pub point: ScreenPoint,
    /// The element the point was derived from, if any.
    pub element: Option<Element>,
}

impl Resolution {
    fn at(point: ScreenPoint) -> Self {
        Self { point, element: None }
    }

    /// The motion the resolved element asks for, if any.
    pub fn preferred_motion(&self) -> Option<Motion> {
        self.element.as_ref().and_then(Element::preferred_motion)
    }
}

/// Resolves [`Target`]s against the live scene graph.
#[derive(Debug, Clone)]
pub struct PointResolver {
    index: SceneGraphIndex,
}

impl PointResolver {
    pub fn new(index: SceneGraphIndex) -> Self {
        Self { index }
    }

    /// The index used for selector and predicate targets.
    pub fn index(&self) -> &SceneGraphIndex {
        &self.index
    }

    fn session(&self) -> &Arc<AutomationSession> {
        self.index.windows().session()
    }

    /// Resolves `target` to a screen point at `anchor`.
    pub fn resolve(&self, target: &Target, anchor: AnchorPosition) -> Result<Resolution, AutomationError> {
        let (resolution, landed_in) = self.resolve_target(target, anchor)?;
        if let Some(window) = landed_in {
            self.session().lock_target().set(&window);
        }
        Ok(resolution)
    }

    /// A re-resolving query for `target`, centered by default.
    pub fn point(&self, target: impl Into<Target>) -> PointQuery {
        PointQuery {
            resolver: self.clone(),
            target: target.into(),
            anchor: AnchorPosition::default(),
            offset: (0.0, 0.0),
        }
    }

    /// The resolution plus the window that becomes the new target.
    fn resolve_target(
        &self,
        target: &Target,
        anchor: AnchorPosition,
    ) -> Result<(Resolution, Option<Window>), AutomationError> {
        match target {
            Target::Point(point) => Ok((Resolution::at(*point), None)),
            Target::Region(region) => Ok((Resolution::at(region.anchor_point(anchor)), None)),
            Target::Element(element) => resolve_element(element, anchor),
            Target::Scene(window) => Ok((
                Resolution::at(window.scene_bounds().anchor_point(anchor)),
                Some(window.clone()),
            )),
            Target::Window(window) => Ok((
                Resolution::at(window.bounds().anchor_point(anchor)),
                Some(window.clone()),
            )),
            Target::Selector(query) => {
                let element = self.first_match(&Criterion::parse(query))?;
                resolve_element(&element, anchor)
            }
            Target::Predicate(predicate) => {
                let element = self.first_match(&Criterion::Predicate(predicate.clone()))?;
                resolve_element(&element, anchor)
            }
            Target::Offset(inner, dx, dy) => {
                // The caller's anchor does not apply to the inner target.
                let (base, landed_in) = self.resolve_target(inner, AnchorPosition::TopLeft)?;
                let point = base.point.translate(*dx, *dy);
                Ok((Resolution { point, ..base }, landed_in))
            }
        }
    }

    /// First visible match, searching windows nearest the current target
    /// first. Extra matches are ignored with a warning.
    fn first_match(&self, criterion: &Criterion) -> Result<Element, AutomationError> {
        let roots = roots_of(&self.index.windows().list_targeted());
        let matches = self.index.query(criterion, &roots)?;
        if matches.len() > 1 {
            warn!(
                criterion = %criterion.describe(),
                matches = matches.len(),
                "ambiguous target, using first match"
            );
        }
        matches.into_iter().next().ok_or_else(|| AutomationError::NotFound {
            criterion: criterion.describe(),
        })
    }
}

fn resolve_element(element: &Element, anchor: AnchorPosition) -> Result<(Resolution, Option<Window>), AutomationError> {
    let unresolvable = || AutomationError::UnresolvableTarget {
        target: element.describe(),
        reason: "element is not attached to a window".to_string(),
    };
    let window = element.window().ok_or_else(unresolvable)?;
    let bounds = element.bounds_on_screen().ok_or_else(unresolvable)?;
    let resolution = Resolution {
        point: bounds.anchor_point(anchor),
        element: Some(element.clone()),
    };
    Ok((resolution, Some(window)))
}

/// A target plus an anchor and offset, resolved afresh on every query.
#[derive(Debug, Clone)]
pub struct PointQuery {
    resolver: PointResolver,
    target: Target,
    anchor: AnchorPosition,
    offset: (f64, f64),
}

impl PointQuery {
    /// Uses `anchor` instead of the center.
    pub fn at_position(mut self, anchor: AnchorPosition) -> Self {
        self.anchor = anchor;
        self
    }

    /// Adds `(dx, dy)` to the anchored point. Offsets accumulate.
    pub fn at_offset(mut self, dx: f64, dy: f64) -> Self {
        self.offset.0 += dx;
        self.offset.1 += dy;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Resolves the target now.
    pub fn resolution(&self) -> Result<Resolution, AutomationError> {
        let mut resolution = self.resolver.resolve(&self.target, self.anchor)?;
        resolution.point = resolution.point.translate(self.offset.0, self.offset.1);
        Ok(resolution)
    }

    /// The point as of now.
    pub fn query(&self) -> Result<ScreenPoint, AutomationError> {
        self.resolution().map(|r| r.point)
    }

    /// Description used in logs and failure messages.
    pub fn describe(&self) -> String {
        if self.offset == (0.0, 0.0) {
            self.target.describe()
        } else {
            format!("{} {:+}{:+}", self.target.describe(), self.offset.0, self.offset.1)
        }
    }
}
