//! Per-peer outcomes and the batch they are collected into.

use crate::ImageRef;
use bbox_propagate_core::Rectangle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a whole peer produced no rectangles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The provider could not extract or match this peer.
    MatchFailure { message: String },
    /// Fewer matched pairs than the configured minimum.
    InsufficientCorrespondences { found: usize, required: usize },
    /// The robust fit found no usable homography.
    DegenerateHomography { detail: String },
    /// Every rectangle failed to project individually.
    NoMatches,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MatchFailure { message } => write!(f, "match failure: {message}"),
            SkipReason::InsufficientCorrespondences { found, required } => {
                write!(f, "insufficient correspondences ({found} < {required})")
            }
            SkipReason::DegenerateHomography { detail } => {
                write!(f, "degenerate homography: {detail}")
            }
            SkipReason::NoMatches => write!(f, "no rectangle could be projected"),
        }
    }
}

/// Result for one peer image.
///
/// Rectangle lists are index-aligned with the reference rectangles; a
/// rectangle that failed on its own is `None` at its index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PeerOutcome {
    Projected { rectangles: Vec<Rectangle> },
    PartiallyProjected { rectangles: Vec<Option<Rectangle>> },
    Skipped { reason: SkipReason },
}

impl PeerOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        PeerOutcome::Skipped { reason }
    }

    /// Classify per-rectangle results: all present, some present, or none.
    ///
    /// An empty list counts as fully projected.
    pub fn from_slots(slots: Vec<Option<Rectangle>>) -> Self {
        let present = slots.iter().filter(|s| s.is_some()).count();
        if present == slots.len() {
            PeerOutcome::Projected {
                rectangles: slots.into_iter().flatten().collect(),
            }
        } else if present == 0 {
            PeerOutcome::skipped(SkipReason::NoMatches)
        } else {
            PeerOutcome::PartiallyProjected { rectangles: slots }
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, PeerOutcome::Skipped { .. })
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            PeerOutcome::Skipped { reason } => Some(reason),
            _ => None,
        }
    }

    /// Index-aligned slots, or `None` when the peer was skipped.
    pub fn slots(&self) -> Option<Vec<Option<Rectangle>>> {
        match self {
            PeerOutcome::Projected { rectangles } => {
                Some(rectangles.iter().copied().map(Some).collect())
            }
            PeerOutcome::PartiallyProjected { rectangles } => Some(rectangles.clone()),
            PeerOutcome::Skipped { .. } => None,
        }
    }

    /// Rectangle at `index`, if this peer produced one there.
    pub fn rectangle(&self, index: usize) -> Option<Rectangle> {
        match self {
            PeerOutcome::Projected { rectangles } => rectangles.get(index).copied(),
            PeerOutcome::PartiallyProjected { rectangles } => rectangles.get(index).copied().flatten(),
            PeerOutcome::Skipped { .. } => None,
        }
    }
}

/// Outcome recorded under a peer's identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub peer: ImageRef,
    pub outcome: PeerOutcome,
}

/// Outcomes for a whole group, keyed by peer id and kept in processing order.
///
/// A cancelled batch is still valid; it just holds fewer entries than there
/// were peers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    entries: Vec<PeerEntry>,
    skipped: usize,
    cancelled: bool,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `outcome` for `peer`, replacing any earlier entry with the same id.
    pub fn insert(&mut self, peer: ImageRef, outcome: PeerOutcome) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.peer.id == peer.id) {
            if existing.outcome.is_skipped() {
                self.skipped -= 1;
            }
            existing.outcome = outcome;
            existing.peer = peer;
            if existing.outcome.is_skipped() {
                self.skipped += 1;
            }
            return;
        }
        if outcome.is_skipped() {
            self.skipped += 1;
        }
        self.entries.push(PeerEntry { peer, outcome });
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn get(&self, peer_id: &str) -> Option<&PeerOutcome> {
        self.entries
            .iter()
            .find(|e| e.peer.id == peer_id)
            .map(|e| &e.outcome)
    }

    pub fn entries(&self) -> &[PeerEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of peers whose outcome is `Skipped`.
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Peers that produced at least one rectangle, with their index-aligned slots.
    pub fn projected(&self) -> impl Iterator<Item = (&ImageRef, Vec<Option<Rectangle>>)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.slots().map(|slots| (&e.peer, slots)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(v: f64) -> Rectangle {
        Rectangle::new(v, v, v + 1.0, v + 1.0).unwrap()
    }

    #[test]
    fn slots_classify_into_outcomes() {
        assert_eq!(
            PeerOutcome::from_slots(vec![Some(r(0.0)), Some(r(1.0))]),
            PeerOutcome::Projected {
                rectangles: vec![r(0.0), r(1.0)]
            }
        );
        assert_eq!(
            PeerOutcome::from_slots(vec![None, None]),
            PeerOutcome::skipped(SkipReason::NoMatches)
        );
        let partial = PeerOutcome::from_slots(vec![Some(r(0.0)), None]);
        assert_eq!(partial.rectangle(0), Some(r(0.0)));
        assert_eq!(partial.rectangle(1), None);
        assert!(matches!(partial, PeerOutcome::PartiallyProjected { .. }));
    }

    #[test]
    fn insert_keeps_skipped_count_consistent() {
        let mut batch = BatchResult::new();
        let a = ImageRef::new("a", "a.png");
        batch.insert(a.clone(), PeerOutcome::skipped(SkipReason::NoMatches));
        batch.insert(ImageRef::new("b", "b.png"), PeerOutcome::from_slots(vec![]));
        assert_eq!(batch.skipped_count(), 1);

        batch.insert(a, PeerOutcome::from_slots(vec![Some(r(2.0))]));
        assert_eq!(batch.skipped_count(), 0);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.entries()[0].peer.id, "a");
        assert_eq!(batch.projected().count(), 2);
    }

    #[test]
    fn outcome_json_is_tagged() {
        let json = serde_json::to_value(PeerOutcome::skipped(
            SkipReason::InsufficientCorrespondences {
                found: 0,
                required: 4,
            },
        ))
        .unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"]["kind"], "insufficient_correspondences");
        assert_eq!(json["reason"]["found"], 0);
    }
}
