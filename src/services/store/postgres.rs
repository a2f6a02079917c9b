//! Postgres-backed version store.
//!
//! ERROR HANDLING
//! ==============
//! Every multi-statement write runs in one transaction. An early `return`
//! drops the transaction, which rolls it back, so a failed version insert can
//! never leave `current_version` advanced and vice versa.
//!
//! Version bumps lock the diagram row with `FOR UPDATE` before reading
//! `current_version`; a second bump on the same diagram blocks until the first
//! commits and then reads the advanced value. The `(diagram_id, version)`
//! unique constraint still backs this up and surfaces as a retryable
//! [`StoreError::Conflict`].

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::{info, warn};

use super::{
    Diagram, DiagramChanges, DiagramId, DiagramVersion, INITIAL_VERSION_COMMENT, NewDiagram, StoreError,
    VersionStore, validate_changes, validate_new,
};

const DIAGRAM_COLUMNS: &str =
    "id, name, description, markup, layout, suggestions, current_version, created_at, updated_at";
const VERSION_COLUMNS: &str = "id, diagram_id, version, markup, layout, comment, created_at";

// =============================================================================
// ROWS
// =============================================================================

#[derive(sqlx::FromRow)]
struct DiagramRow {
    id: i64,
    name: String,
    description: Option<String>,
    markup: String,
    layout: serde_json::Value,
    suggestions: Option<Json<Vec<String>>>,
    current_version: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<DiagramRow> for Diagram {
    fn from(row: DiagramRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            markup: row.markup,
            layout: row.layout,
            suggestions: row.suggestions.map(|Json(s)| s),
            current_version: row.current_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    id: i64,
    diagram_id: i64,
    version: i32,
    markup: String,
    layout: serde_json::Value,
    comment: Option<String>,
    created_at: OffsetDateTime,
}

impl From<VersionRow> for DiagramVersion {
    fn from(row: VersionRow) -> Self {
        Self {
            id: row.id,
            diagram_id: row.diagram_id,
            version: row.version,
            markup: row.markup,
            layout: row.layout,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Clone)]
pub struct PgVersionStore {
    pool: PgPool,
}

impl PgVersionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_version(
    tx: &mut Transaction<'_, Postgres>,
    diagram_id: DiagramId,
    version: i32,
    markup: &str,
    layout: &serde_json::Value,
    comment: Option<&str>,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "INSERT INTO diagram_versions (diagram_id, version, markup, layout, comment)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(diagram_id)
    .bind(version)
    .bind(markup)
    .bind(layout)
    .bind(comment)
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            warn!(diagram_id, version, "version bump collided with a concurrent writer");
            Err(StoreError::Conflict(diagram_id))
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl VersionStore for PgVersionStore {
    async fn list_diagrams(&self) -> Result<Vec<Diagram>, StoreError> {
        let rows = sqlx::query_as::<_, DiagramRow>(&format!(
            "SELECT {DIAGRAM_COLUMNS} FROM diagrams ORDER BY updated_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Diagram::from).collect())
    }

    async fn get_diagram(&self, id: DiagramId) -> Result<Diagram, StoreError> {
        sqlx::query_as::<_, DiagramRow>(&format!("SELECT {DIAGRAM_COLUMNS} FROM diagrams WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Diagram::from)
            .ok_or(StoreError::DiagramNotFound(id))
    }

    async fn create_diagram(&self, new: NewDiagram) -> Result<Diagram, StoreError> {
        validate_new(&new)?;

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DiagramRow>(&format!(
            "INSERT INTO diagrams (name, description, markup, layout, suggestions, current_version)
             VALUES ($1, $2, $3, $4, $5, 1)
             RETURNING {DIAGRAM_COLUMNS}"
        ))
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.markup)
        .bind(&new.layout)
        .bind(new.suggestions.clone().map(Json))
        .fetch_one(&mut *tx)
        .await?;

        insert_version(&mut tx, row.id, 1, &new.markup, &new.layout, Some(INITIAL_VERSION_COMMENT)).await?;
        tx.commit().await?;

        info!(diagram_id = row.id, "diagram created");
        Ok(row.into())
    }

    async fn update_diagram(
        &self,
        id: DiagramId,
        changes: DiagramChanges,
        comment: Option<String>,
    ) -> Result<Diagram, StoreError> {
        validate_changes(&changes)?;

        let mut tx = self.pool.begin().await?;
        let current: Option<(i32, serde_json::Value)> =
            sqlx::query_as("SELECT current_version, layout FROM diagrams WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((current, current_layout)) = current else {
            return Err(StoreError::DiagramNotFound(id));
        };
        let next_version = current + 1;
        let layout = changes.layout.unwrap_or(current_layout);

        insert_version(&mut tx, id, next_version, &changes.markup, &layout, comment.as_deref()).await?;

        let row = sqlx::query_as::<_, DiagramRow>(&format!(
            "UPDATE diagrams
             SET markup = $2,
                 layout = $3,
                 current_version = $4,
                 updated_at = now(),
                 name = COALESCE($5, name),
                 description = COALESCE($6, description),
                 suggestions = COALESCE($7, suggestions)
             WHERE id = $1
             RETURNING {DIAGRAM_COLUMNS}"
        ))
        .bind(id)
        .bind(&changes.markup)
        .bind(&layout)
        .bind(next_version)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.suggestions.map(Json))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(diagram_id = id, version = next_version, "diagram version appended");
        Ok(row.into())
    }

    async fn list_versions(&self, id: DiagramId) -> Result<Vec<DiagramVersion>, StoreError> {
        let rows = sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM diagram_versions WHERE diagram_id = $1 ORDER BY version DESC"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DiagramVersion::from).collect())
    }

    async fn get_version(&self, id: DiagramId, version: i32) -> Result<DiagramVersion, StoreError> {
        sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM diagram_versions WHERE diagram_id = $1 AND version = $2"
        ))
        .bind(id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .map(DiagramVersion::from)
        .ok_or(StoreError::VersionNotFound { diagram_id: id, version })
    }

    async fn delete_diagram(&self, id: DiagramId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM diagrams WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(false);
        }

        // Explicit cascade: the schema's ON DELETE CASCADE is not relied upon.
        sqlx::query("DELETE FROM diagram_versions WHERE diagram_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM diagrams WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(diagram_id = id, "diagram deleted");
        Ok(true)
    }
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
