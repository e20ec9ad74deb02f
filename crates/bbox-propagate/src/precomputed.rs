//! Correspondences recorded by an external matcher, replayed from JSON.

use crate::{CorrespondenceProvider, ImageRef, IoError, Keypoints, MatcherSettings, ProviderError};
use bbox_propagate_core::Correspondences;
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::Path};

/// Keypoints recorded for the reference image.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceKeypoints {
    pub image: String,
    pub keypoints: Vec<Point2<f32>>,
}

/// What the matcher produced for one peer: its keypoints and
/// `(reference_idx, peer_idx)` pairs, or the error it hit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerMatches {
    #[serde(default)]
    pub keypoints: Vec<Point2<f32>>,
    #[serde(default)]
    pub matches: Vec<[usize; 2]>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Matcher output for a whole group.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedMatches {
    pub reference: ReferenceKeypoints,
    #[serde(default)]
    pub peers: BTreeMap<String, PeerMatches>,
}

impl PrecomputedMatches {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Features handed out by [`PrecomputedProvider`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedFeatures {
    pub image: String,
    pub keypoints: Vec<Point2<f32>>,
}

impl Keypoints for RecordedFeatures {
    fn keypoints(&self) -> &[Point2<f32>] {
        &self.keypoints
    }
}

/// Serves correspondences from a [`PrecomputedMatches`] record.
///
/// Images are looked up by [`ImageRef::id`]. A peer absent from the record,
/// or recorded with an error, fails like a live matcher would.
///
/// Once configured, only the first `max_keypoints` recorded keypoints of each
/// image are served, as if extraction had been capped, and matches touching
/// a dropped keypoint are discarded. The other settings only shape a live
/// matcher and are ignored on replay.
#[derive(Clone, Debug)]
pub struct PrecomputedProvider {
    record: PrecomputedMatches,
    max_keypoints: usize,
}

impl PrecomputedProvider {
    pub fn new(record: PrecomputedMatches) -> Self {
        Self {
            record,
            max_keypoints: usize::MAX,
        }
    }

    fn capped(&self, keypoints: &[Point2<f32>]) -> Vec<Point2<f32>> {
        keypoints[..keypoints.len().min(self.max_keypoints)].to_vec()
    }

    pub fn record(&self) -> &PrecomputedMatches {
        &self.record
    }
}

impl CorrespondenceProvider for PrecomputedProvider {
    type Features = RecordedFeatures;

    fn configure(&mut self, settings: &MatcherSettings) -> Result<(), ProviderError> {
        self.max_keypoints = settings.max_keypoints;
        debug!(
            "replaying recorded matches, capped at {} keypoints per image",
            self.max_keypoints
        );
        Ok(())
    }

    fn extract(&mut self, image: &ImageRef) -> Result<RecordedFeatures, ProviderError> {
        if image.id == self.record.reference.image {
            return Ok(RecordedFeatures {
                image: image.id.clone(),
                keypoints: self.capped(&self.record.reference.keypoints),
            });
        }
        let peer = self
            .record
            .peers
            .get(&image.id)
            .ok_or_else(|| ProviderError::Extraction {
                image: image.id.clone(),
                reason: "no recorded keypoints".to_string(),
            })?;
        Ok(RecordedFeatures {
            image: image.id.clone(),
            keypoints: self.capped(&peer.keypoints),
        })
    }

    fn correspond(
        &mut self,
        reference: RecordedFeatures,
        target: &RecordedFeatures,
    ) -> Result<Correspondences, ProviderError> {
        let peer = self
            .record
            .peers
            .get(&target.image)
            .ok_or_else(|| ProviderError::Matching {
                image: target.image.clone(),
                reason: "no recorded matches".to_string(),
            })?;
        if let Some(reason) = &peer.error {
            return Err(ProviderError::Matching {
                image: target.image.clone(),
                reason: reason.clone(),
            });
        }
        let cap = self.max_keypoints;
        let matches: Vec<[usize; 2]> = peer
            .matches
            .iter()
            .copied()
            .filter(|&[r, t]| r < cap && t < cap)
            .collect();
        Ok(Correspondences::from_index_pairs(
            &reference.keypoints,
            &target.keypoints,
            &matches,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PrecomputedMatches {
        let mut peers = BTreeMap::new();
        peers.insert(
            "ok".to_string(),
            PeerMatches {
                keypoints: vec![Point2::new(11.0, 12.0), Point2::new(21.0, 22.0)],
                matches: vec![[1, 0], [0, 1]],
                error: None,
            },
        );
        peers.insert(
            "broken".to_string(),
            PeerMatches {
                error: Some("out of memory".to_string()),
                ..PeerMatches::default()
            },
        );
        peers.insert(
            "bad_index".to_string(),
            PeerMatches {
                keypoints: vec![Point2::new(0.0, 0.0)],
                matches: vec![[0, 5]],
                error: None,
            },
        );
        PrecomputedMatches {
            reference: ReferenceKeypoints {
                image: "ref".to_string(),
                keypoints: vec![Point2::new(1.0, 2.0), Point2::new(3.0, 4.0)],
            },
            peers,
        }
    }

    fn run(provider: &mut PrecomputedProvider, peer: &str) -> Result<Correspondences, ProviderError> {
        let reference = provider.extract(&ImageRef::new("ref", "ref.png"))?;
        let target = provider.extract(&ImageRef::new(peer, "peer.png"))?;
        provider.correspond(reference, &target)
    }

    #[test]
    fn replays_index_pairs() {
        let mut provider = PrecomputedProvider::new(record());
        let c = run(&mut provider, "ok").unwrap();
        assert_eq!(c.reference(), &[Point2::new(3.0, 4.0), Point2::new(1.0, 2.0)]);
        assert_eq!(c.target(), &[Point2::new(11.0, 12.0), Point2::new(21.0, 22.0)]);
    }

    #[test]
    fn recorded_and_structural_failures_surface_as_errors() {
        let mut provider = PrecomputedProvider::new(record());
        assert!(matches!(
            run(&mut provider, "broken"),
            Err(ProviderError::Matching { .. })
        ));
        assert!(matches!(
            run(&mut provider, "bad_index"),
            Err(ProviderError::Geometry(_))
        ));
        assert!(matches!(
            run(&mut provider, "unknown"),
            Err(ProviderError::Extraction { .. })
        ));
    }

    #[test]
    fn max_keypoints_caps_extraction_and_matches() {
        let mut provider = PrecomputedProvider::new(record());
        let settings = MatcherSettings {
            max_keypoints: 1,
            ..MatcherSettings::default()
        };
        provider.configure(&settings).unwrap();

        let reference = provider.extract(&ImageRef::new("ref", "ref.png")).unwrap();
        assert_eq!(reference.keypoints, vec![Point2::new(1.0, 2.0)]);
        // Both recorded pairs touch index 1, which is now beyond the cap.
        assert!(run(&mut provider, "ok").unwrap().is_empty());

        // A cap above every index keeps the record as is; bad indices stay errors.
        provider.configure(&MatcherSettings::default()).unwrap();
        assert_eq!(run(&mut provider, "ok").unwrap().len(), 2);
        assert!(matches!(
            run(&mut provider, "bad_index"),
            Err(ProviderError::Geometry(_))
        ));
    }

    #[test]
    fn keypoints_serialize_as_pairs() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["reference"]["keypoints"][1], serde_json::json!([3.0, 4.0]));
        let back: PrecomputedMatches = serde_json::from_value(json).unwrap();
        assert_eq!(back, record());
    }
}
