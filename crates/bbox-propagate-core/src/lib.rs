//! Geometry for carrying rectangle annotations from one image to another.
//!
//! Given point correspondences between a reference image and a target image,
//! a reference [`Rectangle`] can be moved into the target in two ways:
//!
//! - globally, by fitting one [`Homography`] with
//!   [`estimate_homography_ransac`] and warping the corners with
//!   [`project_global`];
//! - locally, by shifting each corner with the displacement of its nearest
//!   matched keypoint ([`project_local_offset`]).
//!
//! The crate does no I/O and knows nothing about feature extraction or
//! matching; correspondences come in as plain point pairs.
//!
//! ```
//! use bbox_propagate_core::{project_global, Homography, Rectangle};
//!
//! let shift = Homography::from_array([[1.0, 0.0, 20.0], [0.0, 1.0, 5.0], [0.0, 0.0, 1.0]]);
//! let r = Rectangle::new(10.0, 10.0, 50.0, 50.0).unwrap();
//! let out = project_global(&r, &shift).unwrap();
//! assert_eq!((out.top(), out.left(), out.bottom(), out.right()), (15.0, 30.0, 55.0, 70.0));
//! ```

mod correspondence;
mod homography;
mod local_offset;
mod logger;
mod polygon;
mod project;
mod ransac;
mod rect;

pub use correspondence::Correspondences;
pub use homography::{estimate_homography_dlt, has_collinear_triple, homography_from_4pt, Homography};
pub use local_offset::{project_local_offset, DEFAULT_PADDING};
pub use polygon::point_in_polygon;
pub use project::{project_global, ProjectionError};
pub use ransac::{
    estimate_homography_ransac, DegenerateHomography, HomographyEstimate, RansacParams,
    MIN_CORRESPONDENCES,
};
pub use rect::{GeometryError, Rectangle, RectangleBounds};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{
    init_from_env, init_with_level, init_with_spec, LogSpec, LogSpecError, LOG_ENV_VAR,
};
