//! # API Endpoint Handlers
//!
//! Thin adapters from HTTP onto the `MetadataCollection` operations. Every
//! repository route is scoped by the calling user, `/users/{user_id}/...`.

use super::{
    AppState,
    types::{
        AddEntityRequest, AddExternalEntityRequest, AddExternalRelationshipRequest,
        AddRelationshipRequest, ApiResponse, ClassificationReferenceCopyRequest,
        ExportArchiveRequest, ExportArchiveResponse, HealthResponse, InstanceStatusResponse,
        LoadArchiveResponse, PropertiesRequest, PurgeClassificationReferenceCopyRequest,
        PurgeReferenceCopyRequest, ReHomeRequest, ReTypeRequest, StatusResponse,
        StatusUpdateRequest, TypeAssertion,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use cohort_core::{
    CohortError, EntityDetail, EntityProxy, ErrorCategory, Guid, InstanceArchive, Relationship,
    archive_crypto_hash, export_archive, load_archive,
};
use serde::Serialize;

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

/// HTTP status for a repository error.
pub fn status_for(err: &CohortError) -> StatusCode {
    if matches!(err, CohortError::UserNotAuthorized { .. }) {
        return StatusCode::FORBIDDEN;
    }
    match err.category() {
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::TypeMismatch | ErrorCategory::Parameter => StatusCode::BAD_REQUEST,
        ErrorCategory::Property => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::Capability => StatusCode::NOT_IMPLEMENTED,
        ErrorCategory::State | ErrorCategory::Integrity => StatusCode::CONFLICT,
        ErrorCategory::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T: Serialize>(result: Result<T, CohortError>) -> Reply<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() && !e.is_not_supported() {
                tracing::error!(error = %e, "Repository operation failed");
            } else {
                tracing::debug!(error = %e, "Repository operation rejected");
            }
            (status, Json(ApiResponse::error(&e)))
        }
    }
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Repository identity, capabilities and metrics.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let collection = &state.collection;
    reply(collection.metrics().map(|metrics| StatusResponse {
        metadata_collection_id: collection.metadata_collection_id().clone(),
        metadata_collection_name: collection.metadata_collection_name().to_string(),
        capabilities: collection
            .capabilities()
            .iter()
            .map(|op| op.name().to_string())
            .collect(),
        metrics,
    }))
}

/// Administrative status of any instance, deleted ones included.
pub async fn instance_status_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
) -> impl IntoResponse {
    let guid = Guid::new(guid);
    reply(
        state
            .collection
            .instance_status(&user_id, &guid)
            .map(|status| InstanceStatusResponse { guid, status }),
    )
}

// =============================================================================
// ENTITY READS
// =============================================================================

pub async fn get_entity_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
) -> impl IntoResponse {
    reply(state.collection.get_entity_detail(&user_id, &Guid::new(guid)))
}

/// `data` is null when the entity is unknown.
pub async fn is_entity_known_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
) -> impl IntoResponse {
    reply(state.collection.is_entity_known(&user_id, &Guid::new(guid)))
}

pub async fn get_entity_proxy_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
) -> impl IntoResponse {
    reply(state.collection.get_entity_proxy(&user_id, &Guid::new(guid)))
}

pub async fn relationships_for_entity_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
) -> impl IntoResponse {
    reply(
        state
            .collection
            .get_relationships_for_entity(&user_id, &Guid::new(guid)),
    )
}

// =============================================================================
// ENTITY LIFECYCLE
// =============================================================================

pub async fn add_entity_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<AddEntityRequest>,
) -> impl IntoResponse {
    reply(state.collection.add_entity(
        &user_id,
        &request.type_guid,
        request.properties,
        request.classifications,
        request.status,
    ))
}

pub async fn add_external_entity_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<AddExternalEntityRequest>,
) -> impl IntoResponse {
    reply(state.collection.add_external_entity(
        &user_id,
        &request.type_guid,
        &request.source_guid,
        request.source_name.as_deref(),
        request.properties,
        request.classifications,
        request.status,
    ))
}

pub async fn add_entity_proxy_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(proxy): Json<EntityProxy>,
) -> impl IntoResponse {
    reply(state.collection.add_entity_proxy(&user_id, proxy))
}

pub async fn update_entity_status_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<StatusUpdateRequest>,
) -> impl IntoResponse {
    reply(
        state
            .collection
            .update_entity_status(&user_id, &Guid::new(guid), request.status),
    )
}

pub async fn update_entity_properties_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<PropertiesRequest>,
) -> impl IntoResponse {
    reply(
        state
            .collection
            .update_entity_properties(&user_id, &Guid::new(guid), request.properties),
    )
}

pub async fn delete_entity_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<TypeAssertion>,
) -> impl IntoResponse {
    reply(state.collection.delete_entity(
        &user_id,
        &request.type_guid,
        &request.type_name,
        &Guid::new(guid),
    ))
}

pub async fn purge_entity_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<TypeAssertion>,
) -> impl IntoResponse {
    reply(state.collection.purge_entity(
        &user_id,
        &request.type_guid,
        &request.type_name,
        &Guid::new(guid),
    ))
}

pub async fn restore_entity_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
) -> impl IntoResponse {
    reply(state.collection.restore_entity(&user_id, &Guid::new(guid)))
}

// =============================================================================
// CLASSIFICATIONS
// =============================================================================

pub async fn classify_entity_handler(
    State(state): State<AppState>,
    Path((user_id, guid, name)): Path<(String, String, String)>,
    Json(request): Json<PropertiesRequest>,
) -> impl IntoResponse {
    reply(state.collection.classify_entity(
        &user_id,
        &Guid::new(guid),
        &name,
        request.properties,
    ))
}

pub async fn declassify_entity_handler(
    State(state): State<AppState>,
    Path((user_id, guid, name)): Path<(String, String, String)>,
) -> impl IntoResponse {
    reply(
        state
            .collection
            .declassify_entity(&user_id, &Guid::new(guid), &name),
    )
}

pub async fn update_classification_handler(
    State(state): State<AppState>,
    Path((user_id, guid, name)): Path<(String, String, String)>,
    Json(request): Json<PropertiesRequest>,
) -> impl IntoResponse {
    reply(state.collection.update_entity_classification(
        &user_id,
        &Guid::new(guid),
        &name,
        request.properties,
    ))
}

// =============================================================================
// ENTITY IDENTITY
// =============================================================================

pub async fn re_identify_entity_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<TypeAssertion>,
) -> impl IntoResponse {
    reply(state.collection.re_identify_entity(
        &user_id,
        &request.type_guid,
        &request.type_name,
        &Guid::new(guid),
    ))
}

pub async fn re_type_entity_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<ReTypeRequest>,
) -> impl IntoResponse {
    reply(state.collection.re_type_entity(
        &user_id,
        &Guid::new(guid),
        &request.current_type_guid,
        &request.current_type_name,
        &request.new_type_guid,
    ))
}

pub async fn re_home_entity_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<ReHomeRequest>,
) -> impl IntoResponse {
    reply(state.collection.re_home_entity(
        &user_id,
        &Guid::new(guid),
        &request.type_guid,
        &request.type_name,
        &request.home_metadata_collection_id,
        &request.new_home_metadata_collection_id,
        request.new_home_metadata_collection_name.as_deref(),
    ))
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

pub async fn get_relationship_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
) -> impl IntoResponse {
    reply(state.collection.get_relationship(&user_id, &Guid::new(guid)))
}

/// `data` is null when the relationship is unknown.
pub async fn is_relationship_known_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
) -> impl IntoResponse {
    reply(
        state
            .collection
            .is_relationship_known(&user_id, &Guid::new(guid)),
    )
}

pub async fn add_relationship_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<AddRelationshipRequest>,
) -> impl IntoResponse {
    reply(state.collection.add_relationship(
        &user_id,
        &request.type_guid,
        request.properties,
        &request.entity_one_guid,
        &request.entity_two_guid,
        request.status,
    ))
}

pub async fn add_external_relationship_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<AddExternalRelationshipRequest>,
) -> impl IntoResponse {
    reply(state.collection.add_external_relationship(
        &user_id,
        &request.type_guid,
        &request.source_guid,
        request.source_name.as_deref(),
        request.properties,
        &request.entity_one_guid,
        &request.entity_two_guid,
        request.status,
    ))
}

pub async fn update_relationship_status_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<StatusUpdateRequest>,
) -> impl IntoResponse {
    reply(
        state
            .collection
            .update_relationship_status(&user_id, &Guid::new(guid), request.status),
    )
}

pub async fn update_relationship_properties_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<PropertiesRequest>,
) -> impl IntoResponse {
    reply(
        state
            .collection
            .update_relationship_properties(&user_id, &Guid::new(guid), request.properties),
    )
}

pub async fn delete_relationship_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<TypeAssertion>,
) -> impl IntoResponse {
    reply(state.collection.delete_relationship(
        &user_id,
        &request.type_guid,
        &request.type_name,
        &Guid::new(guid),
    ))
}

pub async fn purge_relationship_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<TypeAssertion>,
) -> impl IntoResponse {
    reply(state.collection.purge_relationship(
        &user_id,
        &request.type_guid,
        &request.type_name,
        &Guid::new(guid),
    ))
}

pub async fn restore_relationship_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
) -> impl IntoResponse {
    reply(
        state
            .collection
            .restore_relationship(&user_id, &Guid::new(guid)),
    )
}

pub async fn re_identify_relationship_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<TypeAssertion>,
) -> impl IntoResponse {
    reply(state.collection.re_identify_relationship(
        &user_id,
        &request.type_guid,
        &request.type_name,
        &Guid::new(guid),
    ))
}

pub async fn re_type_relationship_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<ReTypeRequest>,
) -> impl IntoResponse {
    reply(state.collection.re_type_relationship(
        &user_id,
        &Guid::new(guid),
        &request.current_type_guid,
        &request.current_type_name,
        &request.new_type_guid,
    ))
}

pub async fn re_home_relationship_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<ReHomeRequest>,
) -> impl IntoResponse {
    reply(state.collection.re_home_relationship(
        &user_id,
        &Guid::new(guid),
        &request.type_guid,
        &request.type_name,
        &request.home_metadata_collection_id,
        &request.new_home_metadata_collection_id,
        request.new_home_metadata_collection_name.as_deref(),
    ))
}

// =============================================================================
// REFERENCE COPIES
// =============================================================================

/// Succeeds without storing anything when the copy's provenance does not
/// qualify.
pub async fn save_entity_copy_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(entity): Json<EntityDetail>,
) -> impl IntoResponse {
    reply(state.collection.save_entity_reference_copy(&user_id, entity))
}

pub async fn purge_entity_copy_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<PurgeReferenceCopyRequest>,
) -> impl IntoResponse {
    reply(state.collection.purge_entity_reference_copy(
        &user_id,
        &Guid::new(guid),
        &request.type_guid,
        &request.type_name,
        &request.home_metadata_collection_id,
    ))
}

pub async fn save_classification_copy_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<ClassificationReferenceCopyRequest>,
) -> impl IntoResponse {
    reply(state.collection.save_classification_reference_copy(
        &user_id,
        request.entity,
        request.classification,
    ))
}

pub async fn purge_classification_copy_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<PurgeClassificationReferenceCopyRequest>,
) -> impl IntoResponse {
    reply(state.collection.purge_classification_reference_copy(
        &user_id,
        request.entity,
        &request.classification_name,
    ))
}

pub async fn save_relationship_copy_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(relationship): Json<Relationship>,
) -> impl IntoResponse {
    reply(
        state
            .collection
            .save_relationship_reference_copy(&user_id, relationship),
    )
}

pub async fn purge_relationship_copy_handler(
    State(state): State<AppState>,
    Path((user_id, guid)): Path<(String, String)>,
    Json(request): Json<PurgeReferenceCopyRequest>,
) -> impl IntoResponse {
    reply(state.collection.purge_relationship_reference_copy(
        &user_id,
        &Guid::new(guid),
        &request.type_guid,
        &request.type_name,
        &request.home_metadata_collection_id,
    ))
}

// =============================================================================
// ARCHIVES
// =============================================================================

/// Load an archive through the reference-copy path.
pub async fn load_archive_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(archive): Json<InstanceArchive>,
) -> Reply<LoadArchiveResponse> {
    reply(load_archive(state.collection.as_ref(), &user_id, &archive))
}

/// Export every non-deleted instance.
pub async fn export_archive_handler(
    State(state): State<AppState>,
    Json(request): Json<ExportArchiveRequest>,
) -> Reply<ExportArchiveResponse> {
    let result = export_archive(
        state.collection.as_ref(),
        &request.name,
        request.description.as_deref(),
    )
    .and_then(|archive| {
        let hash = archive_crypto_hash(&archive)?;
        Ok(ExportArchiveResponse {
            checksum: archive.checksum(),
            hash,
            archive,
        })
    });
    reply(result)
}
