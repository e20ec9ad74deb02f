//! Annotation-platform state passed explicitly to each call that needs it.

use crate::ImageRef;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("selection tool is '{0}', only 'rectangle' selections can be propagated")]
    UnsupportedTool(String),
    #[error("no figure is selected")]
    NoFigureSelected,
    #[error("project does not group images; only multiview projects are supported")]
    NotMultiview,
    #[error("project groups images but names no grouping tag")]
    MissingGroupTag,
    #[error("an image group needs at least a reference image")]
    EmptyGroup,
}

/// Tool that produces rectangle figures.
pub const RECTANGLE_TOOL: &str = "rectangle";

/// A figure-selection event as the platform reports it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEvent {
    pub tool: String,
    pub project_id: u64,
    pub dataset_id: u64,
    pub image_id: u64,
    #[serde(default)]
    pub figure_id: Option<u64>,
}

/// Where the current selection lives. Built only from a rectangle selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionContext {
    pub project_id: u64,
    pub dataset_id: u64,
    pub image_id: u64,
    pub figure_id: u64,
}

impl SessionContext {
    pub fn from_selection(event: &SelectionEvent) -> Result<Self, SessionError> {
        if event.tool != RECTANGLE_TOOL {
            return Err(SessionError::UnsupportedTool(event.tool.clone()));
        }
        let figure_id = event.figure_id.ok_or(SessionError::NoFigureSelected)?;
        Ok(Self {
            project_id: event.project_id,
            dataset_id: event.dataset_id,
            image_id: event.image_id,
            figure_id,
        })
    }
}

/// Project-level grouping settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    #[serde(default)]
    pub group_images: bool,
    #[serde(default)]
    pub group_images_by_tag_id: Option<u64>,
}

impl ProjectSettings {
    /// Tag whose value defines an image group.
    pub fn group_tag_id(&self) -> Result<u64, SessionError> {
        if !self.group_images {
            return Err(SessionError::NotMultiview);
        }
        self.group_images_by_tag_id
            .ok_or(SessionError::MissingGroupTag)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTag {
    pub tag_id: u64,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<ImageTag>,
}

impl ImageInfo {
    /// Value of the first tag with `tag_id`; `None` if absent or valueless.
    pub fn tag_value(&self, tag_id: u64) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.tag_id == tag_id)
            .and_then(|t| t.value.as_deref())
    }

    fn has_tag(&self, tag_id: u64) -> bool {
        self.tags.iter().any(|t| t.tag_id == tag_id)
    }
}

/// A reference image and the peers it propagates to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGroup {
    pub reference: ImageRef,
    pub peers: Vec<ImageRef>,
}

impl ImageGroup {
    /// Gather the reference plus every candidate sharing its group-tag value.
    ///
    /// The reference is never repeated among the peers, and each image is
    /// located at `<data_dir>/<name>`. Peers keep the order of `candidates`.
    pub fn assemble(
        reference: &ImageInfo,
        candidates: &[ImageInfo],
        group_tag_id: u64,
        data_dir: &Path,
    ) -> Self {
        let group_value = reference.tag_value(group_tag_id);
        let to_ref = |info: &ImageInfo| ImageRef::new(info.id.to_string(), data_dir.join(&info.name));
        let peers = candidates
            .iter()
            .filter(|c| c.id != reference.id)
            .filter(|c| c.has_tag(group_tag_id) && c.tag_value(group_tag_id) == group_value)
            .map(to_ref)
            .collect();
        Self {
            reference: to_ref(reference),
            peers,
        }
    }

    /// Split a combined path list: the first entry is the reference, the rest
    /// are peers. The input is left untouched.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self, SessionError> {
        let (first, rest) = paths.split_first().ok_or(SessionError::EmptyGroup)?;
        Ok(Self {
            reference: ImageRef::from_path(first),
            peers: rest.iter().map(ImageRef::from_path).collect(),
        })
    }

    /// All images, reference first.
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        std::iter::once(&self.reference).chain(self.peers.iter())
    }
}
