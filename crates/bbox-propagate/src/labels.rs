use crate::BatchResult;
use bbox_propagate_core::Rectangle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A rectangle annotation tagged with its object class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectLabel {
    pub class: String,
    pub rectangle: Rectangle,
}

impl ObjectLabel {
    pub fn new(class: impl Into<String>, rectangle: Rectangle) -> Self {
        Self {
            class: class.into(),
            rectangle,
        }
    }

    /// Same class, new geometry.
    pub fn with_rectangle(&self, rectangle: Rectangle) -> Self {
        Self {
            class: self.class.clone(),
            rectangle,
        }
    }
}

/// Geometry of each label, in order, ready to feed a propagation run.
pub fn rectangles_of(labels: &[ObjectLabel]) -> Vec<Rectangle> {
    labels.iter().map(|l| l.rectangle).collect()
}

impl BatchResult {
    /// Re-attach each projected rectangle to the class of the reference label
    /// at the same index, grouped by peer id.
    ///
    /// Skipped peers are absent; missing rectangles are dropped.
    pub fn labels_for_upload(&self, reference: &[ObjectLabel]) -> BTreeMap<String, Vec<ObjectLabel>> {
        self.projected()
            .map(|(peer, slots)| {
                let labels = reference
                    .iter()
                    .zip(slots)
                    .filter_map(|(label, slot)| slot.map(|r| label.with_rectangle(r)))
                    .collect();
                (peer.id.clone(), labels)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImageRef, PeerOutcome, SkipReason};

    fn rect(v: f64) -> Rectangle {
        Rectangle::new(v, v, v + 10.0, v + 10.0).unwrap()
    }

    #[test]
    fn upload_labels_keep_class_and_skip_gaps() {
        let reference = vec![ObjectLabel::new("car", rect(0.0)), ObjectLabel::new("person", rect(5.0))];

        let mut batch = BatchResult::new();
        batch.insert(
            ImageRef::new("p1", "p1.png"),
            PeerOutcome::from_slots(vec![Some(rect(1.0)), Some(rect(6.0))]),
        );
        batch.insert(
            ImageRef::new("p2", "p2.png"),
            PeerOutcome::from_slots(vec![None, Some(rect(7.0))]),
        );
        batch.insert(
            ImageRef::new("p3", "p3.png"),
            PeerOutcome::skipped(SkipReason::NoMatches),
        );

        let labels = batch.labels_for_upload(&reference);
        assert_eq!(labels.len(), 2);
        assert_eq!(
            labels["p1"],
            vec![ObjectLabel::new("car", rect(1.0)), ObjectLabel::new("person", rect(6.0))]
        );
        assert_eq!(labels["p2"], vec![ObjectLabel::new("person", rect(7.0))]);
        assert!(!labels.contains_key("p3"));
    }
}
