//! Shared fixtures for repository integration tests.

#![allow(dead_code)]

use cohort_core::{
    AttributeDef, EntityDetail, EntityProxy, Guid, InstanceHeader, InstanceKind,
    InstanceProperties, InstanceProvenanceType, InstanceStatus, InstanceType, MemoryAuditSink,
    MemoryStore, MetadataCollectionId, PropertyKind, PropertyValue, Repository, TypeDef,
    TypeRegistry,
};
use std::sync::Arc;

pub const USER: &str = "garygeeke";
pub const LOCAL: &str = "cohort-local";
pub const PEER: &str = "cohort-peer";

/// A small open-metadata style type system.
pub fn registry() -> TypeRegistry {
    TypeRegistry::from_defs([
        TypeDef::new("t-ref", "Referenceable", InstanceKind::Entity).with_attribute(
            AttributeDef::new("qualifiedName", PropertyKind::String)
                .required()
                .unique(),
        ),
        TypeDef::new("t-asset", "Asset", InstanceKind::Entity)
            .with_super_type("Referenceable")
            .with_attribute(AttributeDef::new("description", PropertyKind::String))
            .with_attribute(AttributeDef::new("owner", PropertyKind::String)),
        TypeDef::new("t-dataset", "DataSet", InstanceKind::Entity)
            .with_super_type("Asset")
            .with_attribute(AttributeDef::new("rowCount", PropertyKind::Int)),
        TypeDef::new("t-person", "Person", InstanceKind::Entity)
            .with_attribute(AttributeDef::new("name", PropertyKind::String).required()),
        TypeDef::new("t-owns", "AssetOwnership", InstanceKind::Relationship)
            .with_ends("Person", "Asset")
            .with_attribute(AttributeDef::new("since", PropertyKind::Date)),
        TypeDef::new("t-flow", "DataFlow", InstanceKind::Relationship)
            .with_ends("Asset", "Asset"),
        TypeDef::new("t-conf", "Confidentiality", InstanceKind::Classification)
            .with_attribute(AttributeDef::new("level", PropertyKind::Int))
            .with_valid_entity_types(&["Referenceable"]),
        TypeDef::new("t-crit", "Criticality", InstanceKind::Classification)
            .with_attribute(AttributeDef::new("level", PropertyKind::Int)),
    ])
    .expect("valid registry")
}

pub fn local() -> MetadataCollectionId {
    MetadataCollectionId::new(LOCAL)
}

pub fn peer() -> MetadataCollectionId {
    MetadataCollectionId::new(PEER)
}

pub fn repo() -> Repository<MemoryStore> {
    Repository::new(MemoryStore::new(), local(), Arc::new(registry()))
        .expect("repository")
        .with_name("Local Cohort Member")
}

pub fn audited_repo() -> (Repository<MemoryStore>, Arc<MemoryAuditSink>) {
    let sink = Arc::new(MemoryAuditSink::default());
    (repo().with_audit(sink.clone()), sink)
}

pub fn props(pairs: &[(&str, PropertyValue)]) -> InstanceProperties {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

pub fn named(qualified_name: &str) -> InstanceProperties {
    props(&[("qualifiedName", PropertyValue::from(qualified_name))])
}

pub fn asset_type() -> InstanceType {
    InstanceType::new("t-asset", "Asset", InstanceKind::Entity)
}

pub fn flow_type() -> InstanceType {
    InstanceType::new("t-flow", "DataFlow", InstanceKind::Relationship)
}

/// A header as a remote peer would send it.
pub fn remote_header(
    guid: &str,
    instance_type: InstanceType,
    home: &MetadataCollectionId,
    provenance: InstanceProvenanceType,
) -> InstanceHeader {
    let mut header = InstanceHeader::new(
        Guid::new(guid),
        instance_type,
        InstanceStatus::Active,
        home.clone(),
        provenance,
    );
    header.metadata_collection_name = Some(home.to_string());
    header
}

pub fn remote_asset(
    guid: &str,
    home: &MetadataCollectionId,
    provenance: InstanceProvenanceType,
) -> EntityDetail {
    EntityDetail::new(
        remote_header(guid, asset_type(), home, provenance),
        named(&format!("asset::{guid}")),
    )
}

pub fn remote_proxy(guid: &str, home: &MetadataCollectionId) -> EntityProxy {
    EntityProxy::from_entity(
        &remote_asset(guid, home, InstanceProvenanceType::ContentPack),
        &["qualifiedName".to_string()],
    )
}
