//! One-shot stream of per-peer correspondence results.

use crate::{CancelFlag, CorrespondenceProvider, ImageRef, ProviderError};
use bbox_propagate_core::Correspondences;
use log::debug;

/// Correspondences (or the failure to get them) for one peer.
#[derive(Debug)]
pub struct PeerMatch<'a> {
    pub peer: &'a ImageRef,
    pub result: Result<Correspondences, ProviderError>,
}

/// Lazily matches each peer against the reference, in input order.
///
/// Each item costs an extraction plus a matcher call, so the stream is
/// consumed once and never restarted. Failures are yielded, not filtered;
/// deciding what to skip is up to the consumer. Iteration stops early once
/// the cancel flag is raised.
pub struct CorrespondenceStream<'a, P: CorrespondenceProvider> {
    provider: &'a mut P,
    reference: &'a P::Features,
    peers: std::slice::Iter<'a, ImageRef>,
    cancel: Option<&'a CancelFlag>,
    cancelled: bool,
}

impl<'a, P: CorrespondenceProvider> CorrespondenceStream<'a, P> {
    pub fn new(provider: &'a mut P, reference: &'a P::Features, peers: &'a [ImageRef]) -> Self {
        Self {
            provider,
            reference,
            peers: peers.iter(),
            cancel: None,
            cancelled: false,
        }
    }

    pub fn with_cancel(mut self, cancel: &'a CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// True if iteration ended because of cancellation rather than exhaustion.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    fn fetch(&mut self, peer: &ImageRef) -> Result<Correspondences, ProviderError> {
        let features = self.provider.extract(peer)?;
        // Fresh snapshot per peer; the shared reference is never handed out mutably.
        let snapshot = self.reference.clone();
        self.provider.correspond(snapshot, &features)
    }
}

impl<'a, P: CorrespondenceProvider> Iterator for CorrespondenceStream<'a, P> {
    type Item = PeerMatch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancelled || self.peers.as_slice().is_empty() {
            return None;
        }
        if self.cancel.is_some_and(CancelFlag::is_cancelled) {
            debug!("cancelled with {} peers pending", self.peers.len());
            self.cancelled = true;
            return None;
        }
        let peer = self.peers.next()?;
        let result = self.fetch(peer);
        Some(PeerMatch { peer, result })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.peers.len()))
    }
}
