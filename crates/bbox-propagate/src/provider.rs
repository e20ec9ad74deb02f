//! Boundary to the feature extractor / matcher that produces correspondences.

use crate::MatcherSettings;
use bbox_propagate_core::{Correspondences, GeometryError};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identity and on-disk location of one image in a group.
///
/// `id` is the join key for results; `path` is opaque to propagation and only
/// interpreted by a [`CorrespondenceProvider`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    pub path: PathBuf,
}

impl ImageRef {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Use the path itself as the identity.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            id: path.to_string_lossy().into_owned(),
            path: path.to_path_buf(),
        }
    }
}

/// Failures raised at the provider boundary. All of them are peer-local
/// except when extracting the reference image.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("feature extraction failed for {image}: {reason}")]
    Extraction { image: String, reason: String },
    #[error("matching failed for {image}: {reason}")]
    Matching { image: String, reason: String },
    #[error("matcher output is inconsistent: {0}")]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Anything that exposes the 2D keypoints it was extracted with.
pub trait Keypoints {
    fn keypoints(&self) -> &[Point2<f32>];
}

impl Keypoints for Vec<Point2<f32>> {
    fn keypoints(&self) -> &[Point2<f32>] {
        self
    }
}

/// Extracts per-image features and matches a reference against a target.
///
/// `correspond` receives its own snapshot of the reference features, so a
/// matcher that rewrites its inputs in place cannot leak state into the next
/// peer. Implementations may be stateful; run one instance per worker.
pub trait CorrespondenceProvider {
    type Features: Keypoints + Clone;

    /// Receive the extractor and matcher settings once, before the first
    /// `extract` of a batch. Providers with nothing to tune keep the default.
    fn configure(&mut self, _settings: &MatcherSettings) -> Result<(), ProviderError> {
        Ok(())
    }

    fn extract(&mut self, image: &ImageRef) -> Result<Self::Features, ProviderError>;

    fn correspond(
        &mut self,
        reference: Self::Features,
        target: &Self::Features,
    ) -> Result<Correspondences, ProviderError>;
}

impl<P: CorrespondenceProvider + ?Sized> CorrespondenceProvider for &mut P {
    type Features = P::Features;

    fn configure(&mut self, settings: &MatcherSettings) -> Result<(), ProviderError> {
        (**self).configure(settings)
    }

    fn extract(&mut self, image: &ImageRef) -> Result<Self::Features, ProviderError> {
        (**self).extract(image)
    }

    fn correspond(
        &mut self,
        reference: Self::Features,
        target: &Self::Features,
    ) -> Result<Correspondences, ProviderError> {
        (**self).correspond(reference, target)
    }
}
