//! Screen-space geometry shared by every layer of the engine.
//!
//! All public APIs work in *logical* coordinates: the unscaled space the
//! application lays itself out in. Only backends convert to device pixels,
//! using a [`DisplayScale`].

use serde::{Deserialize, Serialize};

/// An immutable point in logical screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScreenPoint {
    /// Horizontal position, growing to the right.
    pub x: f64,
    /// Vertical position, growing downwards.
    pub y: f64,
}

impl ScreenPoint {
    /// Creates a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns this point shifted by `(dx, dy)`.
    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Rounds both axes to whole pixels, as native input layers expect.
    pub fn rounded(self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }
}

impl std::fmt::Display for ScreenPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// An axis-aligned rectangle described by its minimum corner and extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Region {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl Region {
    /// Creates a region from its top-left corner and size.
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The top-left corner.
    pub fn origin(&self) -> ScreenPoint {
        ScreenPoint::new(self.x, self.y)
    }

    /// Right edge (`x + width`).
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge (`y + height`).
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// Returns this region moved by `(dx, dy)`.
    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Whether `point` lies inside the region (edges inclusive).
    pub fn contains(&self, point: ScreenPoint) -> bool {
        point.x >= self.x && point.x <= self.max_x() && point.y >= self.y && point.y <= self.max_y()
    }

    /// The smallest region covering both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self::new(
            x,
            y,
            self.max_x().max(other.max_x()) - x,
            self.max_y().max(other.max_y()) - y,
        )
    }

    /// Whether the region has a negative or non-finite extent.
    pub fn is_degenerate(&self) -> bool {
        !(self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite())
            || self.width < 0.0
            || self.height < 0.0
    }

    /// Projects the region down to a single point using `anchor`.
    pub fn anchor_point(&self, anchor: AnchorPosition) -> ScreenPoint {
        let (fx, fy) = anchor.fractions();
        ScreenPoint::new(self.x + fx * self.width, self.y + fy * self.height)
    }
}

/// One of nine normalized positions inside a region.
///
/// Edges are inclusive: `Right` and `Bottom` sit exactly on the region's far
/// edge, not one pixel inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPosition {
    /// The region's origin.
    TopLeft,
    /// Middle of the top edge.
    TopCenter,
    /// Right end of the top edge.
    TopRight,
    /// Middle of the left edge.
    CenterLeft,
    /// The region's center; used when no anchor is given.
    #[default]
    Center,
    /// Middle of the right edge.
    CenterRight,
    /// Left end of the bottom edge.
    BottomLeft,
    /// Middle of the bottom edge.
    BottomCenter,
    /// The corner opposite the origin.
    BottomRight,
}

impl AnchorPosition {
    /// The fractional `(fx, fy)` offsets into a region, each in `{0, 0.5, 1}`.
    pub fn fractions(self) -> (f64, f64) {
        match self {
            Self::TopLeft => (0.0, 0.0),
            Self::TopCenter => (0.5, 0.0),
            Self::TopRight => (1.0, 0.0),
            Self::CenterLeft => (0.0, 0.5),
            Self::Center => (0.5, 0.5),
            Self::CenterRight => (1.0, 0.5),
            Self::BottomLeft => (0.0, 1.0),
            Self::BottomCenter => (0.5, 1.0),
            Self::BottomRight => (1.0, 1.0),
        }
    }
}

/// Conversion between logical coordinates and device pixels.
///
/// A scale of `1.0` is the identity; backends that do not need scaling on the
/// host platform use [`DisplayScale::IDENTITY`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayScale {
    factor: f64,
}

impl DisplayScale {
    /// No conversion.
    pub const IDENTITY: Self = Self { factor: 1.0 };

    /// Creates a scale. Non-positive or non-finite factors fall back to identity.
    pub fn new(factor: f64) -> Self {
        if factor.is_finite() && factor > 0.0 {
            Self { factor }
        } else {
            Self::IDENTITY
        }
    }

    /// The raw factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Logical point to device pixels.
    pub fn to_device(&self, point: ScreenPoint) -> ScreenPoint {
        ScreenPoint::new(point.x * self.factor, point.y * self.factor)
    }

    /// Device pixels back to a logical point.
    pub fn to_logical(&self, point: ScreenPoint) -> ScreenPoint {
        ScreenPoint::new(point.x / self.factor, point.y / self.factor)
    }

    /// Logical region to device pixels.
    pub fn region_to_device(&self, region: Region) -> Region {
        Region::new(
            region.x * self.factor,
            region.y * self.factor,
            region.width * self.factor,
            region.height * self.factor,
        )
    }
}

impl Default for DisplayScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Whether the host platform needs logical-to-device conversion before
/// calling into the native input layer.
///
/// Windows reports input in device pixels already; every other platform
/// reports logical coordinates to the toolkit and device pixels to the
/// injection facility.
pub fn platform_requires_scaling() -> bool {
    !cfg!(target_os = "windows")
}
