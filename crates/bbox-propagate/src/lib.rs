//! Propagate rectangle annotations from a reference image to the other images
//! of its group.
//!
//! A [`CorrespondenceProvider`] supplies matched keypoints between the
//! reference and each peer; a [`Propagator`] turns them into projected
//! rectangles with the chosen [`Strategy`] and collects one [`PeerOutcome`]
//! per peer into a [`BatchResult`]. A peer that cannot be matched or
//! projected is skipped with a [`SkipReason`]; it never aborts the batch.
//!
//! ## Quickstart
//!
//! ```
//! use bbox_propagate::{
//!     CorrespondenceProvider, ImageRef, PeerOutcome, PropagationParams, Propagator,
//!     ProviderError,
//! };
//! use bbox_propagate::core::{Correspondences, Rectangle};
//! use nalgebra::Point2;
//!
//! /// Every peer is the reference shifted by (+20, +5).
//! struct Shifted;
//!
//! impl CorrespondenceProvider for Shifted {
//!     type Features = Vec<Point2<f32>>;
//!
//!     fn extract(&mut self, _image: &ImageRef) -> Result<Self::Features, ProviderError> {
//!         Ok(vec![
//!             Point2::new(10.0, 10.0),
//!             Point2::new(50.0, 10.0),
//!             Point2::new(50.0, 50.0),
//!             Point2::new(10.0, 50.0),
//!         ])
//!     }
//!
//!     fn correspond(
//!         &mut self,
//!         reference: Self::Features,
//!         _target: &Self::Features,
//!     ) -> Result<Correspondences, ProviderError> {
//!         let moved = reference.iter().map(|p| Point2::new(p.x + 20.0, p.y + 5.0)).collect();
//!         Ok(Correspondences::new(reference, moved)?)
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let propagator = Propagator::new(PropagationParams::global())?;
//! let rects = [Rectangle::new(10.0, 10.0, 50.0, 50.0)?];
//! let batch = propagator.run(
//!     &mut Shifted,
//!     &ImageRef::new("ref", "ref.png"),
//!     &[ImageRef::new("peer", "peer.png")],
//!     &rects,
//! )?;
//! assert_eq!(
//!     batch.get("peer"),
//!     Some(&PeerOutcome::Projected { rectangles: vec![Rectangle::new(15.0, 30.0, 55.0, 70.0)?] })
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `bbox_propagate::core`: geometry (rectangles, homographies, projectors).
//! - [`Propagator`], [`propagate`]: batch orchestration; `run_parallel` with feature `rayon`.
//! - [`PrecomputedProvider`]: replay recorded matcher output.
//! - [`PropagateConfig`], [`PropagationReport`]: JSON job files.
//! - [`SessionContext`], [`ImageGroup`]: annotation-platform state.

mod cancel;
mod io;
mod labels;
mod outcome;
#[cfg(feature = "rayon")]
mod parallel;
mod params;
mod precomputed;
mod propagate;
mod provider;
mod session;
mod stream;

pub use bbox_propagate_core as core;

pub use cancel::CancelFlag;
pub use io::{IoError, PropagateConfig, PropagationReport};
pub use labels::{rectangles_of, ObjectLabel};
pub use outcome::{BatchResult, PeerEntry, PeerOutcome, SkipReason};
pub use params::{ConfigError, Device, MatcherSettings, PropagationParams, Strategy};
pub use precomputed::{
    PeerMatches, PrecomputedMatches, PrecomputedProvider, RecordedFeatures, ReferenceKeypoints,
};
pub use propagate::{propagate, PropagateError, Propagator};
pub use provider::{CorrespondenceProvider, ImageRef, Keypoints, ProviderError};
pub use session::{
    ImageGroup, ImageInfo, ImageTag, ProjectSettings, SelectionEvent, SessionContext,
    SessionError, RECTANGLE_TOOL,
};
pub use stream::{CorrespondenceStream, PeerMatch};

pub use bbox_propagate_core::{Correspondences, Rectangle};
