use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Values closer than this to an integer are snapped before truncation, so
/// floating noise from a warp (`29.9999999`) does not lose a whole pixel.
const SNAP_EPS: f64 = 1e-6;

/// Errors raised while building geometric primitives.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("rectangle bounds must be finite (top={top}, left={left}, bottom={bottom}, right={right})")]
    NonFinite {
        top: f64,
        left: f64,
        bottom: f64,
        right: f64,
    },
    #[error("inverted rectangle (top={top}, left={left}, bottom={bottom}, right={right})")]
    Inverted {
        top: f64,
        left: f64,
        bottom: f64,
        right: f64,
    },
    #[error("cannot build a bounding box from an empty point set")]
    EmptyPointSet,
    #[error("padding must be finite and non-negative (got {0})")]
    InvalidPadding(f64),
    #[error("correspondence sides differ in length (reference={reference}, target={target})")]
    LengthMismatch { reference: usize, target: usize },
    #[error("keypoint index {index} out of range for a set of {len} keypoints")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Plain bounds as they appear on the wire, validated into a [`Rectangle`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectangleBounds {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

/// Axis-aligned region in image pixel coordinates.
///
/// `x` grows to the right and `y` grows downwards, so `top <= bottom` and
/// `left <= right` always hold. Instances are immutable; every transform
/// produces a new rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RectangleBounds", into = "RectangleBounds")]
pub struct Rectangle {
    top: f64,
    left: f64,
    bottom: f64,
    right: f64,
}

impl Rectangle {
    pub fn new(top: f64, left: f64, bottom: f64, right: f64) -> Result<Self, GeometryError> {
        if !(top.is_finite() && left.is_finite() && bottom.is_finite() && right.is_finite()) {
            return Err(GeometryError::NonFinite {
                top,
                left,
                bottom,
                right,
            });
        }
        if top > bottom || left > right {
            return Err(GeometryError::Inverted {
                top,
                left,
                bottom,
                right,
            });
        }
        Ok(Self {
            top,
            left,
            bottom,
            right,
        })
    }

    /// Smallest axis-aligned rectangle enclosing `points` (`x` = column, `y` = row).
    pub fn bounding_box(points: &[Point2<f64>]) -> Result<Self, GeometryError> {
        let first = points.first().ok_or(GeometryError::EmptyPointSet)?;
        let (mut min_x, mut max_x) = (first.x, first.x);
        let (mut min_y, mut max_y) = (first.y, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        Self::new(min_y, min_x, max_y, max_x)
    }

    #[inline]
    pub fn top(&self) -> f64 {
        self.top
    }

    #[inline]
    pub fn left(&self) -> f64 {
        self.left
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.right
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Corner points in the fixed order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point2<f64>; 4] {
        [
            Point2::new(self.left, self.top),
            Point2::new(self.right, self.top),
            Point2::new(self.right, self.bottom),
            Point2::new(self.left, self.bottom),
        ]
    }

    /// Grow the rectangle by `padding` pixels on every side.
    pub fn padded(&self, padding: f64) -> Result<Self, GeometryError> {
        if !padding.is_finite() || padding < 0.0 {
            return Err(GeometryError::InvalidPadding(padding));
        }
        Self::new(
            self.top - padding,
            self.left - padding,
            self.bottom + padding,
            self.right + padding,
        )
    }

    /// Truncate every bound towards zero, yielding integer pixel coordinates.
    ///
    /// A bound within 1e-6 of an integer snaps to it first, so `29.9999995`
    /// becomes `30` rather than `29`.
    pub fn truncated(&self) -> Self {
        // Truncation is monotonic, so the ordering invariant survives.
        Self {
            top: truncate_px(self.top),
            left: truncate_px(self.left),
            bottom: truncate_px(self.bottom),
            right: truncate_px(self.right),
        }
    }

    pub fn bounds(&self) -> RectangleBounds {
        (*self).into()
    }
}

impl TryFrom<RectangleBounds> for Rectangle {
    type Error = GeometryError;

    fn try_from(b: RectangleBounds) -> Result<Self, Self::Error> {
        Rectangle::new(b.top, b.left, b.bottom, b.right)
    }
}

impl From<Rectangle> for RectangleBounds {
    fn from(r: Rectangle) -> Self {
        RectangleBounds {
            top: r.top,
            left: r.left,
            bottom: r.bottom,
            right: r.right,
        }
    }
}

#[inline]
pub(crate) fn truncate_px(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPS {
        r
    } else {
        v.trunc()
    }
}
