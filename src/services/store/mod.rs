//! Version store: diagrams and their immutable version history.
//!
//! DESIGN
//! ======
//! A diagram row is a denormalized cache of its newest version. Every write
//! that touches `current_version` runs as one atomic unit together with the
//! matching `diagram_versions` insert, so the persisted version numbers for a
//! diagram are always exactly `1..=current_version`.
//!
//! Two backends implement [`VersionStore`]:
//! - [`PgVersionStore`] serializes version bumps per diagram with
//!   `SELECT ... FOR UPDATE` on the diagram row.
//! - [`MemoryVersionStore`] serializes them on a per-diagram mutex.
//!
//! Updates to different diagrams never contend with each other in either
//! backend.

pub mod memory;
pub mod postgres;

pub use memory::MemoryVersionStore;
pub use postgres::PgVersionStore;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Store-assigned identifier of a persisted diagram.
pub type DiagramId = i64;

/// Comment recorded on the implicit version 1 written by create.
pub const INITIAL_VERSION_COMMENT: &str = "initial version";

// =============================================================================
// TYPES
// =============================================================================

/// A persisted diagram. Mirrors the `diagrams` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagram {
    pub id: DiagramId,
    pub name: String,
    pub description: Option<String>,
    pub markup: String,
    /// Opaque editor geometry, stored and returned verbatim.
    pub layout: serde_json::Value,
    pub suggestions: Option<Vec<String>>,
    pub current_version: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// An immutable snapshot. Mirrors the `diagram_versions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramVersion {
    pub id: i64,
    pub diagram_id: DiagramId,
    pub version: i32,
    pub markup: String,
    pub layout: serde_json::Value,
    pub comment: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Input for creating a diagram together with its version 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDiagram {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub markup: String,
    #[serde(default = "empty_layout")]
    pub layout: serde_json::Value,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
}

/// Input for appending a new version to an existing diagram.
///
/// `name`, `description` and `suggestions` are row attributes that are not
/// versioned; `None` leaves the stored value untouched. A `None` layout
/// carries the current layout into the new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramChanges {
    pub markup: String,
    #[serde(default)]
    pub layout: Option<serde_json::Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
}

fn empty_layout() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("diagram not found: {0}")]
    DiagramNotFound(DiagramId),
    #[error("version {version} of diagram {diagram_id} not found")]
    VersionNotFound { diagram_id: DiagramId, version: i32 },
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("concurrent version bump on diagram {0}")]
    Conflict(DiagramId),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::error::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::DiagramNotFound(_) => "E_DIAGRAM_NOT_FOUND",
            Self::VersionNotFound { .. } => "E_VERSION_NOT_FOUND",
            Self::Validation(_) => "E_VALIDATION",
            Self::Conflict(_) => "E_CONFLICT",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)))
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Reads and writes of diagrams and their versions.
#[async_trait::async_trait]
pub trait VersionStore: Send + Sync {
    /// All diagrams, most recently updated first.
    async fn list_diagrams(&self) -> Result<Vec<Diagram>, StoreError>;

    async fn get_diagram(&self, id: DiagramId) -> Result<Diagram, StoreError>;

    /// Insert a diagram and its version 1 atomically.
    async fn create_diagram(&self, new: NewDiagram) -> Result<Diagram, StoreError>;

    /// Append version `current_version + 1` and refresh the diagram row atomically.
    async fn update_diagram(
        &self,
        id: DiagramId,
        changes: DiagramChanges,
        comment: Option<String>,
    ) -> Result<Diagram, StoreError>;

    /// Versions of a diagram, newest first. Empty when the diagram does not exist.
    async fn list_versions(&self, id: DiagramId) -> Result<Vec<DiagramVersion>, StoreError>;

    async fn get_version(&self, id: DiagramId, version: i32) -> Result<DiagramVersion, StoreError>;

    /// Remove a diagram and all of its versions atomically.
    ///
    /// Returns `false` when there was nothing to delete.
    async fn delete_diagram(&self, id: DiagramId) -> Result<bool, StoreError>;
}

// =============================================================================
// VALIDATION
// =============================================================================

pub(crate) fn validate_new(new: &NewDiagram) -> Result<(), StoreError> {
    require_text("name", &new.name)?;
    require_text("markup", &new.markup)
}

pub(crate) fn validate_changes(changes: &DiagramChanges) -> Result<(), StoreError> {
    require_text("markup", &changes.markup)?;
    if let Some(name) = &changes.name {
        require_text("name", name)?;
    }
    Ok(())
}

fn require_text(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
