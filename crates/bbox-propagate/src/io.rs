//! JSON configuration and report files.

use crate::{
    rectangles_of, BatchResult, ConfigError, ImageRef, MatcherSettings, ObjectLabel, PeerEntry,
    PropagateError, PropagationParams, Strategy,
};
use bbox_propagate_core::Rectangle;
use serde::{Deserialize, Serialize};
use crate::propagate::check_group;
use std::collections::BTreeMap;
use std::time::Duration;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One propagation job: a reference image, its labels, and the peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagateConfig {
    pub reference: ImageRef,
    pub peers: Vec<ImageRef>,
    pub rectangles: Vec<ObjectLabel>,
    pub params: PropagationParams,
    #[serde(default)]
    pub matcher: MatcherSettings,
    /// Recorded matcher output to replay, see [`crate::PrecomputedMatches`].
    #[serde(default)]
    pub matches_path: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

impl PropagateConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("bbox_propagate_report.json"))
    }

    pub fn matches_path(&self) -> Option<PathBuf> {
        self.matches_path.as_ref().map(PathBuf::from)
    }

    /// Reference geometry in label order.
    pub fn reference_rectangles(&self) -> Vec<Rectangle> {
        rectangles_of(&self.rectangles)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate()?;
        self.matcher.validate()?;
        check_group(&self.reference, &self.peers)
    }
}

/// Everything a propagation run produced, for the caller to persist or upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationReport {
    pub config_path: String,
    pub reference: String,
    pub strategy: Strategy,
    pub num_rectangles: usize,
    pub peers: Vec<PeerEntry>,
    /// Projected labels per peer id, missing rectangles omitted.
    pub labels: BTreeMap<String, Vec<ObjectLabel>>,
    pub skipped: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl PropagationReport {
    /// Build an empty report for `cfg`.
    pub fn new(cfg: &PropagateConfig, config_path: &Path) -> Self {
        Self {
            config_path: config_path.to_string_lossy().into_owned(),
            reference: cfg.reference.id.clone(),
            strategy: cfg.params.strategy,
            num_rectangles: cfg.rectangles.len(),
            peers: Vec::new(),
            labels: BTreeMap::new(),
            skipped: 0,
            cancelled: false,
            elapsed_ms: 0,
            error: None,
        }
    }

    /// Populate report fields from a finished (or cancelled) batch.
    pub fn set_batch(&mut self, batch: &BatchResult, reference: &[ObjectLabel], elapsed: Duration) {
        self.peers = batch.entries().to_vec();
        self.labels = batch.labels_for_upload(reference);
        self.skipped = batch.skipped_count();
        self.cancelled = batch.is_cancelled();
        self.elapsed_ms = elapsed.as_millis() as u64;
        self.error = None;
    }

    /// Record a batch-level error.
    pub fn set_error(&mut self, err: &PropagateError) {
        self.error = Some(err.to_string());
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
