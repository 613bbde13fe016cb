//! Unit tests for API types serialization/deserialization.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use cohort::api::types::{
    AddEntityRequest, AddExternalRelationshipRequest, ApiResponse, ClassificationReferenceCopyRequest,
    ExportArchiveRequest, HealthResponse, InstanceStatusResponse, PropertiesRequest,
    ReHomeRequest, StatusUpdateRequest, TypeAssertion,
};
use cohort_core::{
    CohortError, EntityReference, ErrorCategory, Guid, InstanceStatus, PropertyValue,
};

// =============================================================================
// HEALTH RESPONSE TESTS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_health_response_deserialization() {
    let json = r#"{"status":"healthy","version":"1.0.0"}"#;
    let health: HealthResponse = serde_json::from_str(json).unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, "1.0.0");
}

// =============================================================================
// RESPONSE ENVELOPE TESTS
// =============================================================================

#[test]
fn test_success_envelope_omits_error_fields() {
    let response = ApiResponse::success(InstanceStatusResponse {
        guid: Guid::new("g-1"),
        status: Some(InstanceStatus::Active),
    });

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":true"));
    assert!(json.contains("\"status\":\"ACTIVE\""));
    assert!(!json.contains("\"error\""));
    assert!(!json.contains("\"category\""));
}

#[test]
fn test_error_envelope_carries_category() {
    let err = CohortError::EntityNotDeleted {
        guid: "g-1".to_string(),
    };
    let response: ApiResponse<()> = ApiResponse::error(&err);

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":false"));
    assert!(json.contains("\"category\":\"state\""));
    assert!(json.contains("g-1"));
    assert!(!json.contains("\"data\""));
}

#[test]
fn test_error_envelope_round_trips_category() {
    let json = r#"{"success":false,"error":"nope","category":"capability"}"#;
    let response: ApiResponse<()> = serde_json::from_str(json).unwrap();

    assert!(!response.success);
    assert_eq!(response.category, Some(ErrorCategory::Capability));
    assert!(response.data.is_none());
}

// =============================================================================
// ENTITY REQUEST TESTS
// =============================================================================

#[test]
fn test_add_entity_request_minimal() {
    let json = r#"{"type_guid":"t-1"}"#;
    let request: AddEntityRequest = serde_json::from_str(json).unwrap();

    assert_eq!(request.type_guid, "t-1");
    assert!(request.properties.is_empty());
    assert!(request.classifications.is_empty());
    assert!(request.status.is_none());
}

#[test]
fn test_add_entity_request_full() {
    let json = r#"{
        "type_guid": "t-1",
        "properties": {
            "qualifiedName": {"string": "sales.orders"},
            "recordCount": {"int": 42}
        },
        "classifications": [{"name": "Confidentiality"}],
        "status": "DRAFT"
    }"#;
    let request: AddEntityRequest = serde_json::from_str(json).unwrap();

    assert_eq!(
        request.properties.get("qualifiedName"),
        Some(&PropertyValue::String("sales.orders".to_string()))
    );
    assert_eq!(request.properties.get("recordCount"), Some(&PropertyValue::Int(42)));
    assert_eq!(request.classifications[0].name, "Confidentiality");
    assert!(request.classifications[0].properties.is_empty());
    assert_eq!(request.status, Some(InstanceStatus::Draft));
}

#[test]
fn test_add_entity_request_missing_type_rejected() {
    let json = r#"{"properties":{}}"#;
    let result: Result<AddEntityRequest, _> = serde_json::from_str(json);
    assert!(result.is_err());
}

#[test]
fn test_properties_request_defaults_to_empty() {
    let request: PropertiesRequest = serde_json::from_str("{}").unwrap();
    assert!(request.properties.is_empty());
}

#[test]
fn test_status_update_rejects_unknown_status() {
    let ok: StatusUpdateRequest = serde_json::from_str(r#"{"status":"PREPARED"}"#).unwrap();
    assert_eq!(ok.status, InstanceStatus::Prepared);

    let result: Result<StatusUpdateRequest, _> = serde_json::from_str(r#"{"status":"prepared"}"#);
    assert!(result.is_err());
}

#[test]
fn test_type_assertion_requires_both_fields() {
    let result: Result<TypeAssertion, _> = serde_json::from_str(r#"{"type_guid":"t-1"}"#);
    assert!(result.is_err());
}

// =============================================================================
// RELATIONSHIP / IDENTITY REQUEST TESTS
// =============================================================================

#[test]
fn test_add_external_relationship_request() {
    let json = r#"{
        "type_guid": "r-1",
        "source_guid": "cohort-peer",
        "entity_one_guid": "e-1",
        "entity_two_guid": "e-2"
    }"#;
    let request: AddExternalRelationshipRequest = serde_json::from_str(json).unwrap();

    assert_eq!(request.source_guid.as_str(), "cohort-peer");
    assert!(request.source_name.is_none());
    assert_eq!(request.entity_one_guid.as_str(), "e-1");
    assert_eq!(request.entity_two_guid.as_str(), "e-2");
}

#[test]
fn test_re_home_request_name_optional() {
    let json = r#"{
        "type_guid": "t-1",
        "type_name": "DataSet",
        "home_metadata_collection_id": "cohort-local",
        "new_home_metadata_collection_id": "cohort-peer"
    }"#;
    let request: ReHomeRequest = serde_json::from_str(json).unwrap();

    assert_eq!(request.new_home_metadata_collection_id.as_str(), "cohort-peer");
    assert!(request.new_home_metadata_collection_name.is_none());
}

// =============================================================================
// REFERENCE COPY / ARCHIVE REQUEST TESTS
// =============================================================================

#[test]
fn test_classification_copy_request_with_proxy() {
    let json = r#"{
        "entity": {
            "kind": "proxy",
            "entity": {
                "header": {
                    "guid": "e-1",
                    "instance_type": {
                        "type_def_guid": "1449911c-4f44-4c22-abc0-7540154feefb",
                        "type_def_name": "DataSet",
                        "category": "ENTITY"
                    },
                    "status": "ACTIVE",
                    "version": 2,
                    "metadata_collection_id": "cohort-peer",
                    "instance_provenance_type": "EXPORT_ARCHIVE"
                },
                "unique_properties": {}
            }
        },
        "classification": {
            "name": "Confidentiality",
            "instance_type": {
                "type_def_guid": "742ddb7d-9a4a-4eb5-8ac2-1d69953bd2b6",
                "type_def_name": "Confidentiality",
                "category": "CLASSIFICATION"
            },
            "properties": {"level": {"int": 2}},
            "origin": "ASSIGNED",
            "version": 1,
            "instance_provenance_type": "EXPORT_ARCHIVE",
            "metadata_collection_id": "cohort-peer"
        }
    }"#;
    let request: ClassificationReferenceCopyRequest = serde_json::from_str(json).unwrap();

    match &request.entity {
        EntityReference::Proxy(proxy) => assert_eq!(proxy.header.guid.as_str(), "e-1"),
        other => panic!("expected a proxy reference, got {other:?}"),
    }
    assert_eq!(request.classification.name, "Confidentiality");
    assert_eq!(
        request.classification.properties.get("level"),
        Some(&PropertyValue::Int(2))
    );
}

#[test]
fn test_export_request_description_optional() {
    let request: ExportArchiveRequest = serde_json::from_str(r#"{"name":"nightly"}"#).unwrap();
    assert_eq!(request.name, "nightly");
    assert!(request.description.is_none());
}
