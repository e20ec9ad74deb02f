use crate::GeometryError;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Index-aligned matched points: `reference()[i]` depicts the same physical
/// point as `target()[i]`.
///
/// The set may be empty and entries are not guaranteed to be distinct.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Correspondences {
    reference: Vec<Point2<f32>>,
    target: Vec<Point2<f32>>,
}

impl Correspondences {
    pub fn new(
        reference: Vec<Point2<f32>>,
        target: Vec<Point2<f32>>,
    ) -> Result<Self, GeometryError> {
        if reference.len() != target.len() {
            return Err(GeometryError::LengthMismatch {
                reference: reference.len(),
                target: target.len(),
            });
        }
        Ok(Self { reference, target })
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Point2<f32>, Point2<f32>)>,
    {
        let (reference, target) = pairs.into_iter().unzip();
        Self { reference, target }
    }

    /// Resolve matcher output given as `(reference_idx, target_idx)` pairs
    /// into the two keypoint sets.
    pub fn from_index_pairs(
        reference_keypoints: &[Point2<f32>],
        target_keypoints: &[Point2<f32>],
        pairs: &[[usize; 2]],
    ) -> Result<Self, GeometryError> {
        let lookup = |set: &[Point2<f32>], index: usize| {
            set.get(index)
                .copied()
                .ok_or(GeometryError::IndexOutOfRange {
                    index,
                    len: set.len(),
                })
        };

        let mut reference = Vec::with_capacity(pairs.len());
        let mut target = Vec::with_capacity(pairs.len());
        for &[ri, ti] in pairs {
            reference.push(lookup(reference_keypoints, ri)?);
            target.push(lookup(target_keypoints, ti)?);
        }
        Ok(Self { reference, target })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.reference.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    pub fn reference(&self) -> &[Point2<f32>] {
        &self.reference
    }

    pub fn target(&self) -> &[Point2<f32>] {
        &self.target
    }

    pub fn iter(&self) -> impl Iterator<Item = (Point2<f32>, Point2<f32>)> + '_ {
        self.reference.iter().copied().zip(self.target.iter().copied())
    }

    /// Target point paired with the first reference entry equal to `reference_point`.
    pub fn target_for(&self, reference_point: &Point2<f32>) -> Option<Point2<f32>> {
        self.reference
            .iter()
            .position(|p| p == reference_point)
            .map(|i| self.target[i])
    }
}
