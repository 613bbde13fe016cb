//! Integration tests for the Cohort HTTP API.
//!
//! Uses axum-test to drive the router without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
// Allow holding MutexGuard across await in auth tests - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::{TestResponse, TestServer};
use cohort::api::types::{HealthResponse, StatusResponse};
use cohort::api::{AppState, create_router};
use cohort_core::{
    CapabilitySet, MemoryStore, MetadataCollectionId, Repository, TypeRegistry,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

/// Mutex to serialize tests since some modify env vars.
static AUTH_TEST_MUTEX: Mutex<()> = Mutex::new(());

const TYPES: &str = include_str!("../../../demos/types.json");
const ARCHIVE: &str = include_str!("../../../demos/archive.json");

const USER: &str = "calliequartile";
const LOCAL: &str = "cohort-local";
const PEER: &str = "cohort-peer";

const DATASET: (&str, &str) = ("1449911c-4f44-4c22-abc0-7540154feefb", "DataSet");
const PROCESS: (&str, &str) = ("d8f33bd7-afa9-4a11-a8c7-07dcec83c050", "Process");
const GLOSSARY_TERM: (&str, &str) = ("6bb4a3a0-4d3e-4c4f-8a7e-0ef3e35a8a41", "GlossaryTerm");
const DATA_FLOW: (&str, &str) = ("d2490c0c-06cc-458a-add2-33cf2f5dd724", "DataFlow");

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Guard wrapper that holds the mutex and ensures cleanup on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var("COHORT_API_KEY") };
    }
}

fn repository(capabilities: CapabilitySet) -> Repository<MemoryStore> {
    let registry = TypeRegistry::from_json(TYPES).unwrap();
    Repository::new(
        MemoryStore::new(),
        MetadataCollectionId::new(LOCAL),
        Arc::new(registry),
    )
    .unwrap()
    .with_name("Local Cohort Member")
    .with_capabilities(capabilities)
}

fn server_with(capabilities: CapabilitySet, api_key: Option<&str>) -> (TestServer, TestGuard) {
    let guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe {
        match api_key {
            Some(key) => std::env::set_var("COHORT_API_KEY", key),
            None => std::env::remove_var("COHORT_API_KEY"),
        }
    }
    let state = AppState::new(Arc::new(repository(capabilities))).with_rate_limit(0);
    (
        TestServer::new(create_router(state)).unwrap(),
        TestGuard { _guard: guard },
    )
}

/// A fresh full-capability server over an empty in-memory store.
fn create_test_server() -> (TestServer, TestGuard) {
    server_with(CapabilitySet::full(), None)
}

fn assert_failure(response: &TestResponse, status: StatusCode, category: &str) {
    response.assert_status(status);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["category"], category, "body: {body}");
    assert!(body["error"].as_str().is_some());
}

fn data(response: &TestResponse) -> Value {
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true, "body: {body}");
    body["data"].clone()
}

async fn add_dataset(server: &TestServer, qualified_name: &str) -> String {
    let response = server
        .post(&format!("/users/{USER}/entities"))
        .json(&json!({
            "type_guid": DATASET.0,
            "properties": { "qualifiedName": { "string": qualified_name } }
        }))
        .await;
    data(&response)["header"]["guid"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn add_flow(server: &TestServer, one: &str, two: &str) -> String {
    let response = server
        .post(&format!("/users/{USER}/relationships"))
        .json(&json!({
            "type_guid": DATA_FLOW.0,
            "entity_one_guid": one,
            "entity_two_guid": two,
        }))
        .await;
    data(&response)["header"]["guid"]
        .as_str()
        .unwrap()
        .to_string()
}

fn peer_dataset(guid: &str, provenance: &str, version: u64) -> Value {
    json!({
        "header": {
            "guid": guid,
            "instance_type": {
                "type_def_guid": DATASET.0,
                "type_def_name": DATASET.1,
                "category": "ENTITY"
            },
            "status": "ACTIVE",
            "version": version,
            "metadata_collection_id": PEER,
            "instance_provenance_type": provenance
        },
        "properties": { "qualifiedName": { "string": format!("peer.{guid}") } },
        "classifications": []
    })
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_empty_repository() {
    let (server, _guard) = create_test_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let body: Value = response.json();
    let status: StatusResponse = serde_json::from_value(body["data"].clone()).unwrap();
    assert_eq!(status.metadata_collection_id.as_str(), LOCAL);
    assert_eq!(status.metadata_collection_name, "Local Cohort Member");
    assert_eq!(status.metrics.entity_count, 0);
    assert_eq!(status.capabilities.len(), CapabilitySet::full().len());
    assert!(status.capabilities.iter().any(|c| c == "addEntity"));
}

#[tokio::test]
async fn test_status_read_only_lists_reference_copy_operations() {
    let (server, _guard) = server_with(CapabilitySet::read_only(), None);

    let status = data(&server.get("/status").await);
    let capabilities: Vec<&str> = status["capabilities"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(capabilities.contains(&"saveEntityReferenceCopy"));
    assert!(!capabilities.contains(&"addEntity"));
}

// =============================================================================
// ENTITY LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_add_and_get_entity() {
    let (server, _guard) = create_test_server();

    let guid = add_dataset(&server, "sales.orders").await;
    let entity = data(&server.get(&format!("/users/{USER}/entities/{guid}")).await);

    assert_eq!(entity["header"]["version"], 1);
    assert_eq!(entity["header"]["status"], "ACTIVE");
    assert_eq!(entity["header"]["metadata_collection_id"], LOCAL);
    assert_eq!(entity["header"]["instance_provenance_type"], "LOCAL_COHORT");
    assert_eq!(entity["header"]["created_by"], USER);
    assert_eq!(
        entity["properties"]["qualifiedName"]["string"],
        "sales.orders"
    );
}

#[tokio::test]
async fn test_add_entity_with_initial_status_and_classification() {
    let (server, _guard) = create_test_server();

    let response = server
        .post(&format!("/users/{USER}/entities"))
        .json(&json!({
            "type_guid": GLOSSARY_TERM.0,
            "properties": { "qualifiedName": { "string": "term.customer" } },
            "classifications": [
                { "name": "Confidentiality", "properties": { "level": { "int": 1 } } }
            ],
            "status": "DRAFT"
        }))
        .await;
    let entity = data(&response);

    assert_eq!(entity["header"]["status"], "DRAFT");
    assert_eq!(entity["classifications"][0]["name"], "Confidentiality");
    assert_eq!(entity["classifications"][0]["origin"], "ASSIGNED");
}

#[tokio::test]
async fn test_add_entity_validation_errors() {
    let (server, _guard) = create_test_server();

    let missing_required = server
        .post(&format!("/users/{USER}/entities"))
        .json(&json!({ "type_guid": DATASET.0 }))
        .await;
    assert_failure(
        &missing_required,
        StatusCode::UNPROCESSABLE_ENTITY,
        "property",
    );

    let unknown_type = server
        .post(&format!("/users/{USER}/entities"))
        .json(&json!({ "type_guid": "no-such-type" }))
        .await;
    assert_failure(&unknown_type, StatusCode::BAD_REQUEST, "type_mismatch");

    let relationship_type = server
        .post(&format!("/users/{USER}/entities"))
        .json(&json!({ "type_guid": DATA_FLOW.0 }))
        .await;
    assert_failure(&relationship_type, StatusCode::BAD_REQUEST, "type_mismatch");

    let metrics = data(&server.get("/status").await);
    assert_eq!(metrics["metrics"]["entity_count"], 0);
}

#[tokio::test]
async fn test_unknown_entity_is_not_found() {
    let (server, _guard) = create_test_server();

    let response = server.get(&format!("/users/{USER}/entities/missing")).await;
    assert_failure(&response, StatusCode::NOT_FOUND, "not_found");

    let known = data(&server.get(&format!("/users/{USER}/entities/missing/known")).await);
    assert!(known.is_null());
}

#[tokio::test]
async fn test_update_properties_bumps_version() {
    let (server, _guard) = create_test_server();
    let guid = add_dataset(&server, "sales.orders").await;

    let updated = data(
        &server
            .post(&format!("/users/{USER}/entities/{guid}/properties"))
            .json(&json!({ "properties": { "owner": { "string": "sales-ops" } } }))
            .await,
    );
    assert_eq!(updated["header"]["version"], 2);
    assert_eq!(updated["properties"]["owner"]["string"], "sales-ops");
    assert_eq!(
        updated["properties"]["qualifiedName"]["string"],
        "sales.orders"
    );

    let unchanged = data(
        &server
            .post(&format!("/users/{USER}/entities/{guid}/properties"))
            .json(&json!({ "properties": {} }))
            .await,
    );
    assert_eq!(unchanged["header"]["version"], 2);
}

#[tokio::test]
async fn test_status_moves_forward_only() {
    let (server, _guard) = create_test_server();
    let response = server
        .post(&format!("/users/{USER}/entities"))
        .json(&json!({
            "type_guid": GLOSSARY_TERM.0,
            "properties": { "qualifiedName": { "string": "term.order" } },
            "status": "DRAFT"
        }))
        .await;
    let guid = data(&response)["header"]["guid"]
        .as_str()
        .unwrap()
        .to_string();

    let prepared = data(
        &server
            .post(&format!("/users/{USER}/entities/{guid}/status"))
            .json(&json!({ "status": "PREPARED" }))
            .await,
    );
    assert_eq!(prepared["header"]["status"], "PREPARED");

    let backwards = server
        .post(&format!("/users/{USER}/entities/{guid}/status"))
        .json(&json!({ "status": "DRAFT" }))
        .await;
    assert_failure(&backwards, StatusCode::CONFLICT, "state");

    let deleted = server
        .post(&format!("/users/{USER}/entities/{guid}/status"))
        .json(&json!({ "status": "DELETED" }))
        .await;
    assert_failure(&deleted, StatusCode::CONFLICT, "state");
}

#[tokio::test]
async fn test_delete_restore_purge() {
    let (server, _guard) = create_test_server();
    let guid = add_dataset(&server, "sales.orders").await;
    let assertion = json!({ "type_guid": DATASET.0, "type_name": DATASET.1 });

    let early_purge = server
        .post(&format!("/users/{USER}/entities/{guid}/purge"))
        .json(&assertion)
        .await;
    assert_failure(&early_purge, StatusCode::CONFLICT, "state");

    let wrong_type = server
        .post(&format!("/users/{USER}/entities/{guid}/delete"))
        .json(&json!({ "type_guid": PROCESS.0, "type_name": PROCESS.1 }))
        .await;
    assert_failure(&wrong_type, StatusCode::BAD_REQUEST, "type_mismatch");

    let deleted = data(
        &server
            .post(&format!("/users/{USER}/entities/{guid}/delete"))
            .json(&assertion)
            .await,
    );
    assert_eq!(deleted["header"]["status"], "DELETED");
    assert_eq!(deleted["header"]["status_on_delete"], "ACTIVE");

    let hidden = server.get(&format!("/users/{USER}/entities/{guid}")).await;
    assert_failure(&hidden, StatusCode::NOT_FOUND, "not_found");
    let status = data(&server.get(&format!("/users/{USER}/instances/{guid}/status")).await);
    assert_eq!(status["status"], "DELETED");

    let restored = data(
        &server
            .post(&format!("/users/{USER}/entities/{guid}/restore"))
            .await,
    );
    assert_eq!(restored["header"]["status"], "ACTIVE");
    assert_eq!(restored["header"]["version"], 3);

    server
        .post(&format!("/users/{USER}/entities/{guid}/delete"))
        .json(&assertion)
        .await
        .assert_status_ok();
    let purged = data(
        &server
            .post(&format!("/users/{USER}/entities/{guid}/purge"))
            .json(&assertion)
            .await,
    );
    assert!(purged.is_null());

    let status = data(&server.get(&format!("/users/{USER}/instances/{guid}/status")).await);
    assert!(status["status"].is_null());
}

// =============================================================================
// CLASSIFICATIONS
// =============================================================================

#[tokio::test]
async fn test_classify_update_declassify() {
    let (server, _guard) = create_test_server();
    let guid = add_dataset(&server, "sales.orders").await;
    let base = format!("/users/{USER}/entities/{guid}/classifications/Confidentiality");

    let classified = data(
        &server
            .post(&base)
            .json(&json!({ "properties": { "level": { "int": 3 } } }))
            .await,
    );
    assert_eq!(classified["header"]["version"], 2);
    assert_eq!(classified["classifications"][0]["properties"]["level"]["int"], 3);

    let updated = data(
        &server
            .post(&format!("{base}/properties"))
            .json(&json!({ "properties": { "steward": { "string": "faithbroker" } } }))
            .await,
    );
    let classification = &updated["classifications"][0];
    assert_eq!(classification["properties"]["level"]["int"], 3);
    assert_eq!(classification["properties"]["steward"]["string"], "faithbroker");

    let declassified = data(&server.post(&format!("{base}/delete")).await);
    assert_eq!(declassified["classifications"].as_array().unwrap().len(), 0);

    let again = server.post(&format!("{base}/delete")).await;
    assert_failure(&again, StatusCode::UNPROCESSABLE_ENTITY, "property");
}

#[tokio::test]
async fn test_classification_not_valid_for_type() {
    let (server, _guard) = create_test_server();
    let response = server
        .post(&format!("/users/{USER}/entities"))
        .json(&json!({
            "type_guid": GLOSSARY_TERM.0,
            "properties": { "qualifiedName": { "string": "term.x" } }
        }))
        .await;
    let guid = data(&response)["header"]["guid"]
        .as_str()
        .unwrap()
        .to_string();

    // Criticality is only valid for assets.
    let response = server
        .post(&format!(
            "/users/{USER}/entities/{guid}/classifications/Criticality"
        ))
        .json(&json!({ "properties": {} }))
        .await;
    assert!(response.status_code().is_client_error());
    let body: Value = response.json();
    assert_eq!(body["success"], false);
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

#[tokio::test]
async fn test_relationship_lifecycle_and_cascade() {
    let (server, _guard) = create_test_server();
    let orders = add_dataset(&server, "sales.orders").await;
    let report = add_dataset(&server, "sales.report").await;
    let flow = add_flow(&server, &orders, &report).await;

    let relationship = data(&server.get(&format!("/users/{USER}/relationships/{flow}")).await);
    assert_eq!(relationship["entity_one_proxy"]["header"]["guid"], orders);
    assert_eq!(
        relationship["entity_two_proxy"]["unique_properties"]["qualifiedName"]["string"],
        "sales.report"
    );

    let for_report = data(
        &server
            .get(&format!("/users/{USER}/entities/{report}/relationships"))
            .await,
    );
    assert_eq!(for_report.as_array().unwrap().len(), 1);

    server
        .post(&format!("/users/{USER}/entities/{orders}/delete"))
        .json(&json!({ "type_guid": DATASET.0, "type_name": DATASET.1 }))
        .await
        .assert_status_ok();

    let for_report = data(
        &server
            .get(&format!("/users/{USER}/entities/{report}/relationships"))
            .await,
    );
    assert_eq!(for_report.as_array().unwrap().len(), 0);
    let status = data(&server.get(&format!("/users/{USER}/instances/{flow}/status")).await);
    assert_eq!(status["status"], "DELETED");

    // The relationship cannot come back while an end is deleted.
    let restore = server
        .post(&format!("/users/{USER}/relationships/{flow}/restore"))
        .await;
    assert!(restore.status_code().is_client_error());
}

#[tokio::test]
async fn test_relationship_to_unknown_entity() {
    let (server, _guard) = create_test_server();
    let orders = add_dataset(&server, "sales.orders").await;

    let response = server
        .post(&format!("/users/{USER}/relationships"))
        .json(&json!({
            "type_guid": DATA_FLOW.0,
            "entity_one_guid": orders,
            "entity_two_guid": "nowhere",
        }))
        .await;
    assert_failure(&response, StatusCode::NOT_FOUND, "not_found");
}

// =============================================================================
// IDENTITY
// =============================================================================

#[tokio::test]
async fn test_re_identify_entity_moves_relationships() {
    let (server, _guard) = create_test_server();
    let orders = add_dataset(&server, "sales.orders").await;
    let report = add_dataset(&server, "sales.report").await;
    let flow = add_flow(&server, &orders, &report).await;

    let moved = data(
        &server
            .post(&format!("/users/{USER}/entities/{orders}/re-identify"))
            .json(&json!({ "type_guid": DATASET.0, "type_name": DATASET.1 }))
            .await,
    );
    let new_guid = moved["header"]["guid"].as_str().unwrap().to_string();
    assert_ne!(new_guid, orders);
    assert_eq!(moved["header"]["re_identified_from_guid"], orders);

    let relationship = data(&server.get(&format!("/users/{USER}/relationships/{flow}")).await);
    assert_eq!(relationship["entity_one_proxy"]["header"]["guid"], new_guid);

    let old = data(&server.get(&format!("/users/{USER}/instances/{orders}/status")).await);
    assert!(old["status"].is_null());
}

#[tokio::test]
async fn test_re_home_entity() {
    let (server, _guard) = create_test_server();
    let orders = add_dataset(&server, "sales.orders").await;

    let rehomed = data(
        &server
            .post(&format!("/users/{USER}/entities/{orders}/re-home"))
            .json(&json!({
                "type_guid": DATASET.0,
                "type_name": DATASET.1,
                "home_metadata_collection_id": LOCAL,
                "new_home_metadata_collection_id": PEER,
                "new_home_metadata_collection_name": "Peer Cohort Member"
            }))
            .await,
    );
    assert_eq!(rehomed["header"]["metadata_collection_id"], PEER);

    // Homed elsewhere now, so no longer writable here.
    let update = server
        .post(&format!("/users/{USER}/entities/{orders}/properties"))
        .json(&json!({ "properties": { "owner": { "string": "x" } } }))
        .await;
    assert_failure(&update, StatusCode::CONFLICT, "integrity");
}

// =============================================================================
// REFERENCE COPIES
// =============================================================================

#[tokio::test]
async fn test_reference_copy_provenance_gate() {
    let (server, _guard) = create_test_server();

    // A peer's own LOCAL_COHORT instance does not qualify: success, nothing stored.
    let ignored = data(
        &server
            .post(&format!("/users/{USER}/reference-copies/entities"))
            .json(&peer_dataset("peer-local", "LOCAL_COHORT", 1))
            .await,
    );
    assert!(ignored.is_null());
    let response = server.get(&format!("/users/{USER}/entities/peer-local")).await;
    assert_failure(&response, StatusCode::NOT_FOUND, "not_found");

    server
        .post(&format!("/users/{USER}/reference-copies/entities"))
        .json(&peer_dataset("peer-pack", "CONTENT_PACK", 3))
        .await
        .assert_status_ok();
    let copy = data(&server.get(&format!("/users/{USER}/entities/peer-pack")).await);
    assert_eq!(copy["header"]["metadata_collection_id"], PEER);
    assert_eq!(copy["header"]["version"], 3);

    // Reference copies are read-only here.
    let update = server
        .post(&format!("/users/{USER}/entities/peer-pack/properties"))
        .json(&json!({ "properties": { "owner": { "string": "x" } } }))
        .await;
    assert_failure(&update, StatusCode::CONFLICT, "integrity");

    let purged = server
        .post(&format!("/users/{USER}/reference-copies/entities/peer-pack/purge"))
        .json(&json!({
            "type_guid": DATASET.0,
            "type_name": DATASET.1,
            "home_metadata_collection_id": PEER
        }))
        .await;
    purged.assert_status_ok();
    let response = server.get(&format!("/users/{USER}/entities/peer-pack")).await;
    assert_failure(&response, StatusCode::NOT_FOUND, "not_found");
}

#[tokio::test]
async fn test_stale_reference_copy_ignored() {
    let (server, _guard) = create_test_server();
    let path = format!("/users/{USER}/reference-copies/entities");

    server
        .post(&path)
        .json(&peer_dataset("peer-pack", "EXPORT_ARCHIVE", 5))
        .await
        .assert_status_ok();
    server
        .post(&path)
        .json(&peer_dataset("peer-pack", "EXPORT_ARCHIVE", 4))
        .await
        .assert_status_ok();

    let copy = data(&server.get(&format!("/users/{USER}/entities/peer-pack")).await);
    assert_eq!(copy["header"]["version"], 5);
}

#[tokio::test]
async fn test_reference_copy_of_local_entity_conflicts() {
    let (server, _guard) = create_test_server();
    let orders = add_dataset(&server, "sales.orders").await;

    let mut copy = peer_dataset(&orders, "CONTENT_PACK", 9);
    copy["properties"]["qualifiedName"] = json!({ "string": "sales.orders" });
    let response = server
        .post(&format!("/users/{USER}/reference-copies/entities"))
        .json(&copy)
        .await;
    assert_failure(&response, StatusCode::CONFLICT, "integrity");
}

// =============================================================================
// CAPABILITIES
// =============================================================================

#[tokio::test]
async fn test_read_only_server_rejects_writes_but_accepts_copies() {
    let (server, _guard) = server_with(CapabilitySet::read_only(), None);

    let response = server
        .post(&format!("/users/{USER}/entities"))
        .json(&json!({
            "type_guid": DATASET.0,
            "properties": { "qualifiedName": { "string": "x" } }
        }))
        .await;
    assert_failure(&response, StatusCode::NOT_IMPLEMENTED, "capability");

    server
        .post(&format!("/users/{USER}/reference-copies/entities"))
        .json(&peer_dataset("peer-pack", "CONTENT_PACK", 1))
        .await
        .assert_status_ok();
    data(&server.get(&format!("/users/{USER}/entities/peer-pack")).await);
}

// =============================================================================
// ARCHIVES
// =============================================================================

#[tokio::test]
async fn test_load_demo_archive() {
    let (server, _guard) = create_test_server();
    let archive: Value = serde_json::from_str(ARCHIVE).unwrap();

    let report = data(
        &server
            .post(&format!("/users/{USER}/archives/load"))
            .json(&archive)
            .await,
    );
    assert_eq!(report["entities_admitted"], 3);
    assert_eq!(report["entities_ignored"], 1);
    assert_eq!(report["relationships_admitted"], 2);

    let orders = data(&server.get(&format!("/users/{USER}/entities/peer-orders")).await);
    assert_eq!(orders["classifications"][0]["name"], "Confidentiality");
    let rels = data(
        &server
            .get(&format!("/users/{USER}/entities/peer-order-report/relationships"))
            .await,
    );
    assert_eq!(rels.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_export_then_load_into_another_member() {
    let (source, guard) = create_test_server();
    let orders = add_dataset(&source, "sales.orders").await;
    let report = add_dataset(&source, "sales.report").await;
    add_flow(&source, &orders, &report).await;

    let exported = data(
        &source
            .post("/archives/export")
            .json(&json!({ "name": "nightly", "description": null }))
            .await,
    );
    assert_eq!(exported["archive"]["header"]["originMetadataCollectionId"], LOCAL);
    assert_eq!(exported["hash"].as_str().unwrap().len(), 64);
    assert_eq!(
        exported["archive"]["entities"][0]["header"]["instance_provenance_type"],
        "EXPORT_ARCHIVE"
    );
    drop(source);
    drop(guard);

    // A second member with a different collection id takes the export.
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let registry = TypeRegistry::from_json(TYPES).unwrap();
    let mirror = Repository::new(
        MemoryStore::new(),
        MetadataCollectionId::new("cohort-mirror"),
        Arc::new(registry),
    )
    .unwrap();
    let server = TestServer::new(create_router(
        AppState::new(Arc::new(mirror)).with_rate_limit(0),
    ))
    .unwrap();

    let report = data(
        &server
            .post(&format!("/users/{USER}/archives/load"))
            .json(&exported["archive"])
            .await,
    );
    assert_eq!(report["entities_admitted"], 2);
    assert_eq!(report["relationships_admitted"], 1);
    let copy = data(&server.get(&format!("/users/{USER}/entities/{orders}")).await);
    assert_eq!(copy["header"]["metadata_collection_id"], LOCAL);
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[tokio::test]
async fn test_404_on_unknown_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/unknown").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_method_not_allowed() {
    let (server, _guard) = create_test_server();

    let response = server.post("/health").await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let (server, _guard) = create_test_server();

    let response = server
        .post(&format!("/users/{USER}/entities"))
        .text("not valid json")
        .content_type("application/json")
        .await;

    assert!(response.status_code().is_client_error());
}

// =============================================================================
// RATE LIMITING
// =============================================================================

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let _guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::remove_var("COHORT_API_KEY") };
    let state = AppState::new(Arc::new(repository(CapabilitySet::full()))).with_rate_limit(1);
    let server = TestServer::new(create_router(state)).unwrap();

    server.get("/health").await.assert_status_ok();
    let limited = server.get("/health").await;
    assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
}

// =============================================================================
// AUTHENTICATION MIDDLEWARE
// =============================================================================

fn bearer(key: &str) -> HeaderValue {
    format!("Bearer {key}").parse::<HeaderValue>().unwrap()
}

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let api_key = "test-secret-key-12345";
    let (server, _guard) = server_with(CapabilitySet::full(), Some(api_key));

    let response = server
        .get("/status")
        .add_header(header::AUTHORIZATION, bearer(api_key))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_valid_raw_token() {
    let api_key = "test-raw-key-67890";
    let (server, _guard) = server_with(CapabilitySet::full(), Some(api_key));

    let response = server
        .get("/status")
        .add_header(header::AUTHORIZATION, api_key.parse::<HeaderValue>().unwrap())
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_invalid_token_rejected() {
    let (server, _guard) = server_with(CapabilitySet::full(), Some("correct-key"));

    let response = server
        .post(&format!("/users/{USER}/entities"))
        .add_header(header::AUTHORIZATION, bearer("wrong-key"))
        .json(&json!({ "type_guid": DATASET.0 }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_missing_header_rejected() {
    let (server, _guard) = server_with(CapabilitySet::full(), Some("some-key"));

    let response = server.get("/status").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_health_endpoint_bypasses_auth() {
    let (server, _guard) = server_with(CapabilitySet::full(), Some("some-key"));

    let response = server.get("/health").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_bearer_prefix_only_rejected() {
    let (server, _guard) = server_with(CapabilitySet::full(), Some("actual-key"));

    let response = server
        .get("/status")
        .add_header(header::AUTHORIZATION, "Bearer ".parse::<HeaderValue>().unwrap())
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}
