use super::*;
use crate::services::store::{INITIAL_VERSION_COMMENT, MemoryVersionStore};
use crate::state::test_helpers::{OPTIMIZED_MARKUP, SAMPLE_MARKUP, StubOptimizer, StubOutcome};

fn draft(name: &str) -> NewDiagram {
    NewDiagram {
        name: name.into(),
        description: None,
        markup: SAMPLE_MARKUP.into(),
        layout: serde_json::json!({"viewport": {"zoom": 1.5}}),
        suggestions: None,
    }
}

fn changes(markup: &str) -> DiagramChanges {
    DiagramChanges {
        markup: markup.into(),
        layout: None,
        name: None,
        description: None,
        suggestions: None,
    }
}

// =========================================================================
// save_diagram
// =========================================================================

#[tokio::test]
async fn save_draft_creates_version_one_with_initial_comment() {
    let store = MemoryVersionStore::new();
    let saved = save_diagram(&store, DiagramInput::Draft(draft("P1")), Some("ignored".into()))
        .await
        .unwrap();
    assert_eq!(saved.current_version, 1);

    let v1 = store.get_version(saved.id, 1).await.unwrap();
    assert_eq!(v1.comment.as_deref(), Some(INITIAL_VERSION_COMMENT));
}

#[tokio::test]
async fn save_persisted_appends_version_with_comment() {
    let store = MemoryVersionStore::new();
    let created = save_diagram(&store, DiagramInput::Draft(draft("P1")), None).await.unwrap();

    let input = DiagramInput::Persisted { id: created.id, changes: changes("<?xml?><bpmn:definitions/>") };
    let saved = save_diagram(&store, input, Some("edit1".into())).await.unwrap();
    assert_eq!(saved.id, created.id);
    assert_eq!(saved.current_version, 2);
    assert_eq!(store.get_version(created.id, 2).await.unwrap().comment.as_deref(), Some("edit1"));
}

#[tokio::test]
async fn save_persisted_unknown_id_is_not_found() {
    let store = MemoryVersionStore::new();
    let input = DiagramInput::Persisted { id: 77, changes: changes("<x/>") };
    let err = save_diagram(&store, input, None).await.unwrap_err();
    assert!(matches!(err, StoreError::DiagramNotFound(77)));
}

#[tokio::test]
async fn save_draft_with_blank_markup_is_validation_error() {
    let store = MemoryVersionStore::new();
    let mut new = draft("P1");
    new.markup = "   ".into();
    let err = save_diagram(&store, DiagramInput::Draft(new), None).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

// =========================================================================
// request_optimization
// =========================================================================

#[tokio::test]
async fn request_optimization_builds_unsaved_candidate() {
    let store = MemoryVersionStore::new();
    let source = save_diagram(&store, DiagramInput::Draft(draft("Order Handling")), None)
        .await
        .unwrap();
    let optimizer = StubOptimizer::new(StubOutcome::Success);

    let candidate = request_optimization(&optimizer, &source).await.unwrap();
    assert_eq!(candidate.name, "Order Handling (optimized)");
    assert_eq!(candidate.description, "Optimized version of: Order Handling");
    assert_eq!(candidate.markup, OPTIMIZED_MARKUP);
    assert_eq!(candidate.layout, source.layout);
    assert_eq!(candidate.current_version, 1);
    assert_eq!(candidate.suggestions, vec!["Parallelize the review tasks"]);

    // Nothing was written.
    assert_eq!(store.list_diagrams().await.unwrap().len(), 1);
    assert_eq!(store.get_diagram(source.id).await.unwrap(), source);
    assert_eq!(store.list_versions(source.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn request_optimization_failure_leaves_source_untouched() {
    let store = MemoryVersionStore::new();
    let source = save_diagram(&store, DiagramInput::Draft(draft("P1")), None).await.unwrap();
    let optimizer = StubOptimizer::new(StubOutcome::NoSuggestions);

    let err = request_optimization(&optimizer, &source).await.unwrap_err();
    assert!(matches!(err, OptimizationError::NoSuggestions));
    assert_eq!(optimizer.calls(), 1);
    assert_eq!(store.get_diagram(source.id).await.unwrap().current_version, 1);
}

#[tokio::test]
async fn saving_a_candidate_creates_a_new_diagram() {
    let store = MemoryVersionStore::new();
    let source = save_diagram(&store, DiagramInput::Draft(draft("P1")), None).await.unwrap();
    let candidate = request_optimization(&StubOptimizer::new(StubOutcome::Success), &source)
        .await
        .unwrap();

    // Clients save a candidate by posting it back unchanged.
    let posted: NewDiagram = serde_json::from_value(serde_json::to_value(&candidate).unwrap()).unwrap();
    let saved = save_diagram(&store, DiagramInput::Draft(posted), None).await.unwrap();
    assert_ne!(saved.id, source.id);
    assert_eq!(saved.current_version, 1);
    assert_eq!(saved.markup, candidate.markup);
    assert_eq!(saved.suggestions, Some(candidate.suggestions));
    assert_eq!(saved.description.as_deref(), Some("Optimized version of: P1"));
}

#[test]
fn candidate_serializes_without_id() {
    let candidate = Candidate {
        name: "P (optimized)".into(),
        description: "Optimized version of: P".into(),
        markup: "<?xml?>".into(),
        layout: serde_json::json!({}),
        suggestions: vec!["s".into()],
        current_version: 1,
    };
    let json = serde_json::to_value(&candidate).unwrap();
    assert!(json.get("id").is_none());
    assert_eq!(json["currentVersion"], 1);
}
