//! Diagram service: routes saves to the version store and turns optimization
//! results into unsaved candidates.
//!
//! A candidate never touches the store. It only becomes a diagram when the
//! caller sends it back through [`save_diagram`] as a [`DiagramInput::Draft`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::optimize::{OptimizationError, OptimizationResult, Optimizer};
use super::store::{Diagram, DiagramChanges, DiagramId, NewDiagram, StoreError, VersionStore};

/// What a save request refers to: a diagram that does not exist yet, or an
/// existing one receiving a new version.
#[derive(Debug, Clone)]
pub enum DiagramInput {
    Draft(NewDiagram),
    Persisted { id: DiagramId, changes: DiagramChanges },
}

/// Unsaved alternative produced by an optimization. Carries no id and is
/// always at version 1. Its JSON form is accepted as-is by diagram creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub name: String,
    pub description: String,
    pub markup: String,
    pub layout: serde_json::Value,
    pub suggestions: Vec<String>,
    pub current_version: i32,
}

impl Candidate {
    #[must_use]
    pub fn from_result(source: &Diagram, result: OptimizationResult) -> Self {
        Self {
            name: format!("{} (optimized)", source.name),
            description: format!("Optimized version of: {}", source.name),
            markup: result.optimized_markup,
            layout: source.layout.clone(),
            suggestions: result.suggestions,
            current_version: 1,
        }
    }
}

/// Create or version-bump a diagram depending on `input`.
///
/// `comment` only applies to updates; a new diagram's first version always
/// carries the fixed initial comment.
///
/// # Errors
///
/// Propagates the store's [`StoreError`].
pub async fn save_diagram(
    store: &dyn VersionStore,
    input: DiagramInput,
    comment: Option<String>,
) -> Result<Diagram, StoreError> {
    match input {
        DiagramInput::Draft(new) => {
            if comment.is_some() {
                debug!("save: comment ignored on create");
            }
            store.create_diagram(new).await
        }
        DiagramInput::Persisted { id, changes } => store.update_diagram(id, changes, comment).await,
    }
}

/// Ask the optimizer for an improved version of `source`.
///
/// # Errors
///
/// Propagates the optimizer's [`OptimizationError`]. The source diagram is
/// never modified.
pub async fn request_optimization(optimizer: &dyn Optimizer, source: &Diagram) -> Result<Candidate, OptimizationError> {
    let result = optimizer.optimize(&source.markup).await?;
    info!(
        diagram_id = source.id,
        version = source.current_version,
        suggestions = result.suggestions.len(),
        "optimization candidate ready"
    );
    Ok(Candidate::from_result(source, result))
}

#[cfg(test)]
#[path = "diagram_test.rs"]
mod tests;
