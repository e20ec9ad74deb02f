//! Carry a rectangle into a target image through a homography.

use crate::homography::W_EPS;
use crate::{GeometryError, Homography, Rectangle};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a single rectangle could not be projected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("a rectangle corner maps to the line at infinity")]
    PointAtInfinity,
    #[error("the rectangle straddles the homography's horizon line")]
    CrossesHorizon,
    #[error("no matched keypoints inside the padded rectangle")]
    NoNeighborhood,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Warp the four corners (TL, TR, BR, BL) and take their truncated
/// axis-aligned bounding box.
///
/// Under perspective the warped corners form a general quadrilateral; the
/// result is its enclosing box, never a rotated rectangle. Bounds within 1e-6
/// of an integer snap to it before truncation (see [`Rectangle::truncated`]).
///
/// `w` is affine over the rectangle, so if the corners' `w` disagree in sign
/// some interior line maps to infinity and the warped region is unbounded.
/// That case fails with [`ProjectionError::CrossesHorizon`].
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip(homography)))]
pub fn project_global(
    rect: &Rectangle,
    homography: &Homography,
) -> Result<Rectangle, ProjectionError> {
    let ws = rect.corners().map(|c| homography.homogeneous_w(c));
    if ws.iter().any(|w| !w.is_finite() || w.abs() <= W_EPS) {
        return Err(ProjectionError::PointAtInfinity);
    }
    if !(ws.iter().all(|&w| w > 0.0) || ws.iter().all(|&w| w < 0.0)) {
        return Err(ProjectionError::CrossesHorizon);
    }
    let mut warped = [nalgebra::Point2::origin(); 4];
    for (slot, corner) in warped.iter_mut().zip(rect.corners()) {
        *slot = homography
            .apply(corner)
            .ok_or(ProjectionError::PointAtInfinity)?;
    }
    Ok(Rectangle::bounding_box(&warped)?.truncated())
}
