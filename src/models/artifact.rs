//! Artifact payloads served by the control plane for a worker.

use serde::{Deserialize, Serialize};

/// Response body of `GET /api/bot/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactBundle {
    /// Worker metadata.
    pub bot: ArtifactOwner,
    /// Declared file set; absent is treated as empty.
    #[serde(default)]
    pub files: Vec<ArtifactFile>,
}

/// Worker metadata inside an [`ArtifactBundle`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactOwner {
    /// Worker name; doubles as its directory name.
    pub name: String,
}

/// One file belonging to a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactFile {
    /// File name relative to the worker directory.
    pub file_name: String,
    /// Full file content.
    pub file_content: String,
    /// Lowercase hex SHA-256 of `file_content`, as computed upstream.
    #[serde(default)]
    pub file_hash: Option<String>,
}
