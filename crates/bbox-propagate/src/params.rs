//! Propagation and matcher settings.

use bbox_propagate_core::{RansacParams, DEFAULT_PADDING, MIN_CORRESPONDENCES};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown strategy '{0}' (expected 'global' or 'local')")]
    UnknownStrategy(String),
    #[error("global strategy needs min_correspondences >= {required}, got {got}")]
    MinCorrespondences { got: usize, required: usize },
    #[error("padding must be finite and non-negative, got {0}")]
    Padding(f64),
    #[error("ransac {field} out of range: {value}")]
    Ransac { field: &'static str, value: f64 },
    #[error("max_keypoints must be at most {max}, got {got}")]
    MaxKeypoints { got: usize, max: usize },
    #[error("resize must be within {min}..={max}, got {got}")]
    Resize { got: u32, min: u32, max: u32 },
    #[error("filter_threshold must be within [0, {max}], got {got}")]
    FilterThreshold { got: f32, max: f32 },
    #[error("invalid device '{0}' (expected 'cpu' or 'cuda:N')")]
    Device(String),
    #[error("reference image '{0}' is also listed as a peer")]
    ReferenceIsPeer(String),
    #[error("peer '{0}' is listed more than once")]
    DuplicatePeer(String),
}

/// How a rectangle is carried into a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One homography per peer, corners warped through it.
    Global,
    /// Per-corner displacement of the nearest matched keypoint.
    Local,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Global => "global",
            Strategy::Local => "local",
        })
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "homography" => Ok(Strategy::Global),
            "local" | "local-offset" | "local_offset" => Ok(Strategy::Local),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

fn default_min_correspondences() -> usize {
    MIN_CORRESPONDENCES
}

fn default_padding() -> f64 {
    DEFAULT_PADDING
}

/// Settings for one propagation run. The strategy has no default and must
/// always be chosen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropagationParams {
    pub strategy: Strategy,
    /// Peers with fewer matched pairs are skipped.
    #[serde(default = "default_min_correspondences")]
    pub min_correspondences: usize,
    /// Neighborhood margin for the local strategy, in pixels.
    #[serde(default = "default_padding")]
    pub padding: f64,
    #[serde(default)]
    pub ransac: RansacParams,
}

impl PropagationParams {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            min_correspondences: MIN_CORRESPONDENCES,
            padding: DEFAULT_PADDING,
            ransac: RansacParams::default(),
        }
    }

    pub fn global() -> Self {
        Self::new(Strategy::Global)
    }

    pub fn local() -> Self {
        Self::new(Strategy::Local)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategy == Strategy::Global && self.min_correspondences < MIN_CORRESPONDENCES {
            return Err(ConfigError::MinCorrespondences {
                got: self.min_correspondences,
                required: MIN_CORRESPONDENCES,
            });
        }
        if !self.padding.is_finite() || self.padding < 0.0 {
            return Err(ConfigError::Padding(self.padding));
        }
        let r = &self.ransac;
        if !(r.reprojection_threshold.is_finite() && r.reprojection_threshold > 0.0) {
            return Err(ConfigError::Ransac {
                field: "reprojection_threshold",
                value: r.reprojection_threshold,
            });
        }
        if !(r.confidence > 0.0 && r.confidence < 1.0) {
            return Err(ConfigError::Ransac {
                field: "confidence",
                value: r.confidence,
            });
        }
        if r.max_iterations == 0 {
            return Err(ConfigError::Ransac {
                field: "max_iterations",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Compute device handed to the matcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(n) => write!(f, "cuda:{n}"),
        }
    }
}

impl FromStr for Device {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            _ => s
                .strip_prefix("cuda:")
                .and_then(|n| n.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| ConfigError::Device(s.clone())),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Device> for String {
    fn from(d: Device) -> Self {
        d.to_string()
    }
}

/// Settings handed to the provider through [`crate::CorrespondenceProvider::configure`]
/// before each batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSettings {
    /// Cap on keypoints extracted per image.
    pub max_keypoints: usize,
    /// Longest-side resize before extraction; `None` keeps full resolution.
    pub resize: Option<u32>,
    /// Matcher confidence cutoff.
    pub filter_threshold: f32,
    pub device: Device,
}

impl MatcherSettings {
    pub const MAX_KEYPOINTS: usize = 2048;
    pub const RESIZE_RANGE: (u32, u32) = (128, 1024);
    pub const MAX_FILTER_THRESHOLD: f32 = 0.95;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_keypoints > Self::MAX_KEYPOINTS {
            return Err(ConfigError::MaxKeypoints {
                got: self.max_keypoints,
                max: Self::MAX_KEYPOINTS,
            });
        }
        if let Some(resize) = self.resize {
            let (min, max) = Self::RESIZE_RANGE;
            if !(min..=max).contains(&resize) {
                return Err(ConfigError::Resize {
                    got: resize,
                    min,
                    max,
                });
            }
        }
        if !(0.0..=Self::MAX_FILTER_THRESHOLD).contains(&self.filter_threshold) {
            return Err(ConfigError::FilterThreshold {
                got: self.filter_threshold,
                max: Self::MAX_FILTER_THRESHOLD,
            });
        }
        Ok(())
    }
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            max_keypoints: 1024,
            resize: Some(256),
            filter_threshold: 0.3,
            device: Device::Cpu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_is_required_in_json() {
        assert!(serde_json::from_str::<PropagationParams>("{}").is_err());
        let p: PropagationParams = serde_json::from_str(r#"{"strategy":"local"}"#).unwrap();
        assert_eq!(p, PropagationParams::local());
        assert_eq!(p.padding, 5.0);
        assert_eq!(p.min_correspondences, 4);
    }

    #[test]
    fn global_rejects_too_small_minimum() {
        let mut p = PropagationParams::global();
        p.min_correspondences = 3;
        assert_eq!(
            p.validate(),
            Err(ConfigError::MinCorrespondences {
                got: 3,
                required: 4
            })
        );
        p.strategy = Strategy::Local;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn device_parses_and_prints() {
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cuda:1".parse::<Device>().unwrap(), Device::Cuda(1));
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda(0));
        assert!("tpu".parse::<Device>().is_err());
        assert_eq!(Device::Cuda(2).to_string(), "cuda:2");

        let m: MatcherSettings = serde_json::from_str(r#"{"device":"cuda:3"}"#).unwrap();
        assert_eq!(m.device, Device::Cuda(3));
        assert_eq!(m.max_keypoints, 1024);
    }

    #[test]
    fn matcher_ranges_are_enforced() {
        let ok = MatcherSettings::default();
        assert!(ok.validate().is_ok());

        let big = MatcherSettings {
            max_keypoints: 4096,
            ..ok.clone()
        };
        assert!(matches!(big.validate(), Err(ConfigError::MaxKeypoints { .. })));

        let tiny = MatcherSettings {
            resize: Some(64),
            ..ok.clone()
        };
        assert!(matches!(tiny.validate(), Err(ConfigError::Resize { .. })));

        let full_res = MatcherSettings { resize: None, ..ok };
        assert!(full_res.validate().is_ok());
    }
}
