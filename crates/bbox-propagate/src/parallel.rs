//! Multi-threaded batch runner (feature `rayon`).

use crate::propagate::{check_group, log_outcome};
use crate::{
    BatchResult, CancelFlag, CorrespondenceProvider, ImageRef, Keypoints, PeerOutcome,
    PropagateError, Propagator, ProviderError, SkipReason,
};
use bbox_propagate_core::Rectangle;
use log::{info, warn};
use rayon::prelude::*;
use std::time::Instant;

impl Propagator {
    /// Run peers concurrently, one provider per worker from `make_provider`.
    ///
    /// Each worker's provider is configured with [`Propagator::matcher`]
    /// before its first peer; if that fails, the worker's peers are skipped
    /// as match failures.
    /// Every peer matches against its own clone of the reference features.
    /// The result lists peers in input order regardless of completion order.
    /// Peers not started when `cancel` is raised are left out and the batch
    /// is marked cancelled.
    pub fn run_parallel<P, F>(
        &self,
        make_provider: F,
        reference: &ImageRef,
        peers: &[ImageRef],
        rectangles: &[Rectangle],
        cancel: &CancelFlag,
    ) -> Result<BatchResult, PropagateError>
    where
        P: CorrespondenceProvider,
        P::Features: Sync,
        F: Fn() -> P + Sync + Send,
    {
        let started = Instant::now();
        check_group(reference, peers)?;
        let mut reference_provider = make_provider();
        self.configure(&mut reference_provider)?;
        let reference_features = self.extract_reference(&mut reference_provider, reference)?;
        let reference_keypoints = reference_features.keypoints();

        let outcomes: Vec<Option<(&ImageRef, PeerOutcome)>> = peers
            .par_iter()
            .map_init(
                || {
                    let mut provider = make_provider();
                    provider.configure(self.matcher()).map(|()| provider)
                },
                |worker, peer| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let matched = match worker {
                        Ok(provider) => provider.extract(peer).and_then(|features| {
                            provider.correspond(reference_features.clone(), &features)
                        }),
                        Err(err) => Err(ProviderError::Matching {
                            image: peer.id.clone(),
                            reason: format!("matcher setup failed: {err}"),
                        }),
                    };
                    let outcome = match matched {
                        Ok(correspondences) => {
                            self.project_peer(rectangles, reference_keypoints, &correspondences)
                        }
                        Err(err) => PeerOutcome::skipped(SkipReason::MatchFailure {
                            message: err.to_string(),
                        }),
                    };
                    log_outcome(peer, &outcome);
                    Some((peer, outcome))
                },
            )
            .collect();

        let mut batch = BatchResult::new();
        let mut missing = 0;
        for item in outcomes {
            match item {
                Some((peer, outcome)) => batch.insert(peer.clone(), outcome),
                None => missing += 1,
            }
        }
        if missing > 0 {
            warn!("propagation cancelled with {missing} peers not started");
            batch.mark_cancelled();
        }

        info!(
            "propagated {} rectangles to {} peers ({} skipped) in {:.3}s using {} threads",
            rectangles.len(),
            batch.len(),
            batch.skipped_count(),
            started.elapsed().as_secs_f64(),
            rayon::current_num_threads()
        );
        Ok(batch)
    }
}
