//! In-process version store.
//!
//! Each diagram lives behind its own `tokio::sync::Mutex`; the outer map lock
//! is held only long enough to find or insert that mutex. A version bump
//! therefore serializes against other bumps of the same diagram and nothing
//! else. Delete removes the entry from the map, then marks the record as
//! deleted under its mutex so an update that already holds the `Arc` observes
//! the removal.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use super::{
    Diagram, DiagramChanges, DiagramId, DiagramVersion, INITIAL_VERSION_COMMENT, NewDiagram, StoreError,
    VersionStore, validate_changes, validate_new,
};

struct DiagramRecord {
    diagram: Diagram,
    /// Ascending by version number; index `n` holds version `n + 1`.
    versions: Vec<DiagramVersion>,
    deleted: bool,
}

pub struct MemoryVersionStore {
    diagrams: RwLock<HashMap<DiagramId, Arc<Mutex<DiagramRecord>>>>,
    next_diagram_id: AtomicI64,
    next_version_id: AtomicI64,
}

impl MemoryVersionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            diagrams: RwLock::new(HashMap::new()),
            next_diagram_id: AtomicI64::new(1),
            next_version_id: AtomicI64::new(1),
        }
    }

    async fn record(&self, id: DiagramId) -> Option<Arc<Mutex<DiagramRecord>>> {
        self.diagrams.read().await.get(&id).cloned()
    }

    fn next_version_id(&self) -> i64 {
        self.next_version_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MemoryVersionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl VersionStore for MemoryVersionStore {
    async fn list_diagrams(&self) -> Result<Vec<Diagram>, StoreError> {
        let records: Vec<_> = self.diagrams.read().await.values().cloned().collect();

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let record = record.lock().await;
            if !record.deleted {
                out.push(record.diagram.clone());
            }
        }
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn get_diagram(&self, id: DiagramId) -> Result<Diagram, StoreError> {
        let record = self.record(id).await.ok_or(StoreError::DiagramNotFound(id))?;
        let record = record.lock().await;
        if record.deleted {
            return Err(StoreError::DiagramNotFound(id));
        }
        Ok(record.diagram.clone())
    }

    async fn create_diagram(&self, new: NewDiagram) -> Result<Diagram, StoreError> {
        validate_new(&new)?;

        let id = self.next_diagram_id.fetch_add(1, Ordering::Relaxed);
        let now = OffsetDateTime::now_utc();
        let first = DiagramVersion {
            id: self.next_version_id(),
            diagram_id: id,
            version: 1,
            markup: new.markup.clone(),
            layout: new.layout.clone(),
            comment: Some(INITIAL_VERSION_COMMENT.to_owned()),
            created_at: now,
        };
        let diagram = Diagram {
            id,
            name: new.name,
            description: new.description,
            markup: new.markup,
            layout: new.layout,
            suggestions: new.suggestions,
            current_version: 1,
            created_at: now,
            updated_at: now,
        };

        let record = DiagramRecord { diagram: diagram.clone(), versions: vec![first], deleted: false };
        self.diagrams
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(record)));

        info!(diagram_id = id, "diagram created");
        Ok(diagram)
    }

    async fn update_diagram(
        &self,
        id: DiagramId,
        changes: DiagramChanges,
        comment: Option<String>,
    ) -> Result<Diagram, StoreError> {
        validate_changes(&changes)?;

        let record = self.record(id).await.ok_or(StoreError::DiagramNotFound(id))?;
        let mut record = record.lock().await;
        if record.deleted {
            return Err(StoreError::DiagramNotFound(id));
        }

        let next_version = record.diagram.current_version + 1;
        let layout = changes.layout.unwrap_or_else(|| record.diagram.layout.clone());
        let now = OffsetDateTime::now_utc();
        let version = DiagramVersion {
            id: self.next_version_id(),
            diagram_id: id,
            version: next_version,
            markup: changes.markup.clone(),
            layout: layout.clone(),
            comment,
            created_at: now,
        };
        record.versions.push(version);

        let diagram = &mut record.diagram;
        diagram.markup = changes.markup;
        diagram.layout = layout;
        diagram.current_version = next_version;
        diagram.updated_at = now;
        if let Some(name) = changes.name {
            diagram.name = name;
        }
        if let Some(description) = changes.description {
            diagram.description = Some(description);
        }
        if let Some(suggestions) = changes.suggestions {
            diagram.suggestions = Some(suggestions);
        }

        info!(diagram_id = id, version = next_version, "diagram version appended");
        Ok(diagram.clone())
    }

    async fn list_versions(&self, id: DiagramId) -> Result<Vec<DiagramVersion>, StoreError> {
        let Some(record) = self.record(id).await else {
            return Ok(Vec::new());
        };
        let record = record.lock().await;
        if record.deleted {
            return Ok(Vec::new());
        }
        Ok(record.versions.iter().rev().cloned().collect())
    }

    async fn get_version(&self, id: DiagramId, version: i32) -> Result<DiagramVersion, StoreError> {
        let not_found = StoreError::VersionNotFound { diagram_id: id, version };
        let Some(record) = self.record(id).await else {
            return Err(not_found);
        };
        let record = record.lock().await;
        if record.deleted {
            return Err(not_found);
        }
        record
            .versions
            .iter()
            .find(|v| v.version == version)
            .cloned()
            .ok_or(not_found)
    }

    async fn delete_diagram(&self, id: DiagramId) -> Result<bool, StoreError> {
        let removed = self.diagrams.write().await.remove(&id);
        let Some(record) = removed else {
            return Ok(false);
        };

        let mut record = record.lock().await;
        record.deleted = true;
        record.versions.clear();
        info!(diagram_id = id, "diagram deleted");
        Ok(true)
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
