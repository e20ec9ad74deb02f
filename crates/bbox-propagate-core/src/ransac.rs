//! Robust homography fitting by random minimal-sample consensus.

use crate::homography::{estimate_homography_dlt, homography_from_4pt, Homography};
use crate::Correspondences;
use log::debug;
use nalgebra::Point2;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Fewest correspondences a homography can be fitted from.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Why no homography could be produced for a correspondence set.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateHomography {
    #[error("need at least {MIN_CORRESPONDENCES} correspondences, got {got}")]
    TooFewPoints { got: usize },
    #[error("no minimal sample produced a consistent homography")]
    NoConsensus,
    #[error("consensus homography is singular")]
    Singular,
}

/// Consensus search settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Max reprojection error, in target pixels, for a pair to count as an inlier.
    pub reprojection_threshold: f64,
    /// Hard cap on sampled hypotheses.
    pub max_iterations: usize,
    /// Desired probability of drawing at least one outlier-free sample; drives
    /// the adaptive early exit.
    pub confidence: f64,
    /// Seed for the sampler, so runs are reproducible.
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            reprojection_threshold: 5.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0,
        }
    }
}

/// Accepted model plus the indices of the correspondences that support it.
#[derive(Clone, Debug)]
pub struct HomographyEstimate {
    pub homography: Homography,
    pub inliers: Vec<usize>,
}

/// Fit `target ~ H * reference` over `correspondences`, rejecting outliers.
///
/// Fewer than [`MIN_CORRESPONDENCES`] pairs is reported as
/// [`DegenerateHomography::TooFewPoints`] without sampling.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(correspondences, params), fields(n = correspondences.len()))
)]
pub fn estimate_homography_ransac(
    correspondences: &Correspondences,
    params: &RansacParams,
) -> Result<HomographyEstimate, DegenerateHomography> {
    let n = correspondences.len();
    if n < MIN_CORRESPONDENCES {
        return Err(DegenerateHomography::TooFewPoints { got: n });
    }

    let src = correspondences.reference();
    let dst = correspondences.target();
    let thresh_sq = params.reprojection_threshold * params.reprojection_threshold;

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut best: Option<(Homography, Vec<usize>)> = None;
    // Four pairs admit exactly one sample.
    let mut budget = if n == MIN_CORRESPONDENCES {
        1
    } else {
        params.max_iterations.max(1)
    };

    let mut iter = 0;
    while iter < budget {
        iter += 1;

        let sample = index::sample(&mut rng, n, MIN_CORRESPONDENCES);
        let mut s = [Point2::origin(); MIN_CORRESPONDENCES];
        let mut d = [Point2::origin(); MIN_CORRESPONDENCES];
        for (k, i) in sample.iter().enumerate() {
            s[k] = src[i];
            d[k] = dst[i];
        }
        let Some(h) = homography_from_4pt(&s, &d) else {
            continue;
        };

        let inliers = collect_inliers(&h, src, dst, thresh_sq);
        let best_count = best.as_ref().map_or(0, |(_, b)| b.len());
        if inliers.len() > best_count {
            budget = budget.min(adaptive_iterations(
                inliers.len() as f64 / n as f64,
                params.confidence,
                params.max_iterations,
            ));
            best = Some((h, inliers));
        }
    }

    let (model, inliers) = best.ok_or(DegenerateHomography::NoConsensus)?;
    if inliers.len() < MIN_CORRESPONDENCES {
        return Err(DegenerateHomography::NoConsensus);
    }
    debug!(
        "ransac: {} / {} inliers after {} hypotheses",
        inliers.len(),
        n,
        iter
    );

    let (homography, inliers) = refine(model, inliers, src, dst, thresh_sq);
    if !homography.is_well_conditioned() {
        return Err(DegenerateHomography::Singular);
    }
    Ok(HomographyEstimate {
        homography,
        inliers,
    })
}

fn collect_inliers(
    h: &Homography,
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    thresh_sq: f64,
) -> Vec<usize> {
    src.iter()
        .zip(dst)
        .enumerate()
        .filter(|(_, (s, d))| h.reprojection_error_sq(**s, **d) <= thresh_sq)
        .map(|(i, _)| i)
        .collect()
}

/// Refit on the consensus set; keep the refit only if it does not lose support.
fn refine(
    model: Homography,
    inliers: Vec<usize>,
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    thresh_sq: f64,
) -> (Homography, Vec<usize>) {
    let s: Vec<_> = inliers.iter().map(|&i| src[i]).collect();
    let d: Vec<_> = inliers.iter().map(|&i| dst[i]).collect();
    let Some(refit) = estimate_homography_dlt(&s, &d) else {
        return (model, inliers);
    };
    let refit_inliers = collect_inliers(&refit, src, dst, thresh_sq);
    if refit_inliers.len() >= inliers.len() {
        (refit, refit_inliers)
    } else {
        (model, inliers)
    }
}

/// Samples needed to draw one all-inlier minimal set with probability `confidence`.
fn adaptive_iterations(inlier_ratio: f64, confidence: f64, max_iterations: usize) -> usize {
    let confidence = confidence.clamp(0.0, 1.0 - f64::EPSILON);
    let num = (1.0 - confidence).max(f64::MIN_POSITIVE).ln();
    let denom = (1.0 - inlier_ratio.powi(MIN_CORRESPONDENCES as i32)).ln();
    if !denom.is_finite() || denom >= 0.0 {
        // Every pair is an inlier (denom = -inf) or none are.
        return if inlier_ratio >= 1.0 { 1 } else { max_iterations };
    }
    let needed = (num / denom).ceil();
    if !needed.is_finite() || needed >= max_iterations as f64 {
        max_iterations
    } else {
        (needed as usize).max(1)
    }
}
