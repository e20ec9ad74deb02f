//! Group propagation: one reference image, many peers.

use crate::{
    BatchResult, CancelFlag, ConfigError, CorrespondenceProvider, CorrespondenceStream,
    ImageGroup, ImageRef, Keypoints, MatcherSettings, PeerOutcome, PropagateConfig,
    PropagationParams, ProviderError, SessionError, SkipReason, Strategy,
};
use bbox_propagate_core::{
    estimate_homography_ransac, project_global, project_local_offset, Correspondences, Rectangle,
};
use log::{debug, info, warn};
use nalgebra::Point2;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors that abort a whole batch.
#[derive(thiserror::Error, Debug)]
pub enum PropagateError {
    #[error("cannot extract keypoints from reference image {image}")]
    ReferenceExtraction {
        image: String,
        #[source]
        source: ProviderError,
    },
    #[error("cannot configure the matcher")]
    MatcherSetup(#[source] ProviderError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Carries reference rectangles onto every peer of a group.
#[derive(Clone, Debug)]
pub struct Propagator {
    params: PropagationParams,
    matcher: MatcherSettings,
}

impl Propagator {
    /// Propagator with default [`MatcherSettings`].
    pub fn new(params: PropagationParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            matcher: MatcherSettings::default(),
        })
    }

    /// Replace the settings handed to the provider before each batch.
    pub fn with_matcher(mut self, matcher: MatcherSettings) -> Result<Self, ConfigError> {
        matcher.validate()?;
        self.matcher = matcher;
        Ok(self)
    }

    pub fn from_config(config: &PropagateConfig) -> Result<Self, ConfigError> {
        Self::new(config.params.clone())?.with_matcher(config.matcher.clone())
    }

    pub fn params(&self) -> &PropagationParams {
        &self.params
    }

    pub fn matcher(&self) -> &MatcherSettings {
        &self.matcher
    }

    pub fn strategy(&self) -> Strategy {
        self.params.strategy
    }

    /// Run the batch sequentially in peer order.
    ///
    /// Peer ids must be unique and differ from the reference id. Beyond that,
    /// only matcher setup or a failure to read the reference image is
    /// returned as an error; every peer-level problem ends up as a
    /// [`SkipReason`] in the result.
    pub fn run<P: CorrespondenceProvider>(
        &self,
        provider: &mut P,
        reference: &ImageRef,
        peers: &[ImageRef],
        rectangles: &[Rectangle],
    ) -> Result<BatchResult, PropagateError> {
        self.run_with_cancel(provider, reference, peers, rectangles, &CancelFlag::new())
    }

    /// Like [`Propagator::run`], stopping between peers once `cancel` is set.
    /// Outcomes computed before that point are kept.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, provider, reference, peers, rectangles, cancel),
            fields(reference = %reference.id, peers = peers.len(), rects = rectangles.len(), strategy = %self.params.strategy)
        )
    )]
    pub fn run_with_cancel<P: CorrespondenceProvider>(
        &self,
        provider: &mut P,
        reference: &ImageRef,
        peers: &[ImageRef],
        rectangles: &[Rectangle],
        cancel: &CancelFlag,
    ) -> Result<BatchResult, PropagateError> {
        let started = Instant::now();
        check_group(reference, peers)?;
        self.configure(provider)?;
        let reference_features = self.extract_reference(provider, reference)?;
        let reference_keypoints = reference_features.keypoints();

        let mut batch = BatchResult::new();
        let mut stream =
            CorrespondenceStream::new(provider, &reference_features, peers).with_cancel(cancel);
        for item in stream.by_ref() {
            let outcome = match item.result {
                Ok(correspondences) => {
                    self.project_peer(rectangles, reference_keypoints, &correspondences)
                }
                Err(err) => PeerOutcome::skipped(SkipReason::MatchFailure {
                    message: err.to_string(),
                }),
            };
            log_outcome(item.peer, &outcome);
            batch.insert(item.peer.clone(), outcome);
        }
        if stream.was_cancelled() {
            warn!(
                "propagation cancelled after {} of {} peers",
                batch.len(),
                peers.len()
            );
            batch.mark_cancelled();
        }

        info!(
            "propagated {} rectangles to {} peers ({} skipped) in {:.3}s",
            rectangles.len(),
            batch.len(),
            batch.skipped_count(),
            started.elapsed().as_secs_f64()
        );
        Ok(batch)
    }

    pub(crate) fn configure<P: CorrespondenceProvider>(
        &self,
        provider: &mut P,
    ) -> Result<(), PropagateError> {
        let m = &self.matcher;
        info!(
            "matcher on {}: max_keypoints {}, resize {}, filter_threshold {}",
            m.device,
            m.max_keypoints,
            m.resize.map_or_else(|| "off".to_string(), |r| r.to_string()),
            m.filter_threshold
        );
        provider.configure(m).map_err(PropagateError::MatcherSetup)
    }

    pub(crate) fn extract_reference<P: CorrespondenceProvider>(
        &self,
        provider: &mut P,
        reference: &ImageRef,
    ) -> Result<P::Features, PropagateError> {
        let features =
            provider
                .extract(reference)
                .map_err(|source| PropagateError::ReferenceExtraction {
                    image: reference.id.clone(),
                    source,
                })?;
        debug!(
            "reference {}: {} keypoints",
            reference.id,
            features.keypoints().len()
        );
        Ok(features)
    }

    /// Project every rectangle onto one peer from its correspondences.
    pub fn project_peer(
        &self,
        rectangles: &[Rectangle],
        reference_keypoints: &[Point2<f32>],
        correspondences: &Correspondences,
    ) -> PeerOutcome {
        let required = self.params.min_correspondences;
        if correspondences.len() < required {
            return PeerOutcome::skipped(SkipReason::InsufficientCorrespondences {
                found: correspondences.len(),
                required,
            });
        }

        let slots: Vec<Option<Rectangle>> = match self.params.strategy {
            Strategy::Global => {
                let estimate = match estimate_homography_ransac(correspondences, &self.params.ransac)
                {
                    Ok(est) => est,
                    Err(err) => {
                        return PeerOutcome::skipped(SkipReason::DegenerateHomography {
                            detail: err.to_string(),
                        })
                    }
                };
                debug!(
                    "homography from {} / {} inliers",
                    estimate.inliers.len(),
                    correspondences.len()
                );
                rectangles
                    .iter()
                    .map(|r| project_global(r, &estimate.homography).ok())
                    .collect()
            }
            Strategy::Local => rectangles
                .iter()
                .map(|r| {
                    project_local_offset(
                        r,
                        reference_keypoints,
                        correspondences,
                        self.params.padding,
                    )
                    .ok()
                })
                .collect(),
        };
        PeerOutcome::from_slots(slots)
    }
}

/// Reject groups whose peer ids would collide in a [`BatchResult`].
pub(crate) fn check_group(reference: &ImageRef, peers: &[ImageRef]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for peer in peers {
        if peer.id == reference.id {
            return Err(ConfigError::ReferenceIsPeer(peer.id.clone()));
        }
        if !seen.insert(peer.id.as_str()) {
            return Err(ConfigError::DuplicatePeer(peer.id.clone()));
        }
    }
    Ok(())
}

pub(crate) fn log_outcome(peer: &ImageRef, outcome: &PeerOutcome) {
    match outcome {
        PeerOutcome::Skipped { reason } => warn!("peer {}: skipped, {}", peer.id, reason),
        PeerOutcome::PartiallyProjected { rectangles } => debug!(
            "peer {}: {} of {} rectangles projected",
            peer.id,
            rectangles.iter().flatten().count(),
            rectangles.len()
        ),
        PeerOutcome::Projected { rectangles } => {
            debug!("peer {}: {} rectangles projected", peer.id, rectangles.len())
        }
    }
}

/// Propagate `rectangles` from the first of `image_paths` to the rest.
///
/// Each image's path doubles as its identity in the result. `image_paths`
/// is only read. `matcher` is handed to `provider` before extraction.
pub fn propagate<P: CorrespondenceProvider>(
    provider: &mut P,
    image_paths: &[PathBuf],
    rectangles: &[Rectangle],
    params: PropagationParams,
    matcher: MatcherSettings,
) -> Result<BatchResult, PropagateError> {
    let group = ImageGroup::from_paths(image_paths)?;
    Propagator::new(params)?
        .with_matcher(matcher)?
        .run(provider, &group.reference, &group.peers, rectangles)
}
