use super::*;
use crate::error::ErrorCode;

fn new_diagram(name: &str, markup: &str) -> NewDiagram {
    NewDiagram {
        name: name.into(),
        description: None,
        markup: markup.into(),
        layout: serde_json::json!({}),
        suggestions: None,
    }
}

#[test]
fn validate_new_rejects_blank_markup() {
    let err = validate_new(&new_diagram("P1", "  \n")).unwrap_err();
    assert!(matches!(err, StoreError::Validation(ref msg) if msg.contains("markup")));
}

#[test]
fn validate_new_rejects_blank_name() {
    let err = validate_new(&new_diagram("", "<?xml?>")).unwrap_err();
    assert!(matches!(err, StoreError::Validation(ref msg) if msg.contains("name")));
}

#[test]
fn validate_changes_allows_missing_name_but_not_blank_name() {
    let mut changes = DiagramChanges {
        markup: "<x/>".into(),
        layout: None,
        name: None,
        description: None,
        suggestions: None,
    };
    assert!(validate_changes(&changes).is_ok());
    changes.name = Some(" ".into());
    assert!(validate_changes(&changes).is_err());
}

#[test]
fn new_diagram_deserializes_with_defaults() {
    let new: NewDiagram = serde_json::from_str(r#"{"name":"P1","markup":"<x/>"}"#).unwrap();
    assert_eq!(new.layout, serde_json::json!({}));
    assert!(new.description.is_none());
    assert!(new.suggestions.is_none());
}

#[test]
fn diagram_changes_without_layout_keep_it_unset() {
    let changes: DiagramChanges = serde_json::from_str(r#"{"markup":"<x/>"}"#).unwrap();
    assert_eq!(changes.layout, None);

    let changes: DiagramChanges = serde_json::from_str(r#"{"markup":"<x/>","layout":{"zoom":2}}"#).unwrap();
    assert_eq!(changes.layout, Some(serde_json::json!({"zoom": 2})));
}

#[test]
fn diagram_serializes_camel_case_rfc3339() {
    let diagram = Diagram {
        id: 1,
        name: "P1".into(),
        description: None,
        markup: "<x/>".into(),
        layout: serde_json::json!({"zoom": 1}),
        suggestions: Some(vec!["merge tasks".into()]),
        current_version: 2,
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    };
    let json = serde_json::to_value(&diagram).unwrap();
    assert_eq!(json["currentVersion"], 2);
    assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
    assert_eq!(json["layout"]["zoom"], 1);
    assert_eq!(json["suggestions"][0], "merge tasks");
}

#[test]
fn store_error_codes_and_retryable() {
    assert_eq!(StoreError::DiagramNotFound(1).error_code(), "E_DIAGRAM_NOT_FOUND");
    assert_eq!(StoreError::VersionNotFound { diagram_id: 1, version: 3 }.error_code(), "E_VERSION_NOT_FOUND");
    assert_eq!(StoreError::Validation("x".into()).error_code(), "E_VALIDATION");
    assert!(StoreError::Conflict(1).retryable());
    assert!(StoreError::Database(sqlx::Error::PoolTimedOut).retryable());
    assert!(!StoreError::Database(sqlx::Error::RowNotFound).retryable());
    assert!(!StoreError::DiagramNotFound(1).retryable());
}
