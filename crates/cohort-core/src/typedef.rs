//! # Type Validation
//!
//! The store never interprets type definitions itself. It consults an injected
//! [`TypeValidator`] before every add/update, re-type and accepted reference copy.
//!
//! [`TypeRegistry`] is the in-memory implementation: a set of [`TypeDef`]s with
//! single inheritance, loadable from JSON. Several registries may coexist in one
//! process; nothing here is global.

use crate::{
    CohortError, InstanceKind, InstanceProperties, InstanceStatus, InstanceType, PropertyKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// VALIDATOR CONTRACT
// =============================================================================

/// Shape and property checks consumed by the repository.
///
/// Every method is a pure check; none mutates the validator.
pub trait TypeValidator: Send + Sync {
    /// Resolve a type by guid, requiring it to describe `kind` instances.
    fn resolve_type_by_guid(
        &self,
        type_def_guid: &str,
        kind: InstanceKind,
    ) -> Result<InstanceType, CohortError>;

    /// Resolve a type by name, requiring it to describe `kind` instances.
    fn resolve_type_by_name(
        &self,
        type_name: &str,
        kind: InstanceKind,
    ) -> Result<InstanceType, CohortError>;

    fn validate_type_for_instance(
        &self,
        type_name: &str,
        kind: InstanceKind,
    ) -> Result<(), CohortError> {
        self.resolve_type_by_name(type_name, kind).map(|_| ())
    }

    fn validate_properties_for_type(
        &self,
        type_name: &str,
        properties: &InstanceProperties,
    ) -> Result<(), CohortError>;

    fn validate_instance_status(
        &self,
        type_name: &str,
        status: InstanceStatus,
    ) -> Result<(), CohortError>;

    /// Check that a classification type may be attached to an entity type.
    fn validate_classification_for_entity(
        &self,
        classification_name: &str,
        entity_type_name: &str,
    ) -> Result<(), CohortError>;

    /// Check that two entity types may sit at the ends of a relationship type.
    fn validate_relationship_ends(
        &self,
        relationship_type_name: &str,
        end_one_type_name: &str,
        end_two_type_name: &str,
    ) -> Result<(), CohortError>;

    /// Names of the properties that identify an entity of this type.
    fn unique_property_names(&self, type_name: &str) -> Vec<String>;
}

// =============================================================================
// TYPE DEFINITIONS
// =============================================================================

/// One attribute declared by a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDef {
    pub name: String,
    pub kind: PropertyKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
}

impl AttributeDef {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            unique: false,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDef {
    pub guid: String,
    pub name: String,
    pub kind: InstanceKind,
    #[serde(default)]
    pub super_type: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    /// Statuses an instance of this type may hold. Empty inherits, and an empty
    /// chain allows DRAFT, PREPARED and ACTIVE.
    #[serde(default)]
    pub valid_statuses: Vec<InstanceStatus>,
    /// Relationship types only: entity type at end one.
    #[serde(default)]
    pub end_one: Option<String>,
    /// Relationship types only: entity type at end two.
    #[serde(default)]
    pub end_two: Option<String>,
    /// Classification types only: entity types it may be attached to. Empty means any.
    #[serde(default)]
    pub valid_entity_types: Vec<String>,
}

impl TypeDef {
    #[must_use]
    pub fn new(guid: impl Into<String>, name: impl Into<String>, kind: InstanceKind) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            kind,
            super_type: None,
            attributes: Vec::new(),
            valid_statuses: Vec::new(),
            end_one: None,
            end_two: None,
            valid_entity_types: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_super_type(mut self, super_type: impl Into<String>) -> Self {
        self.super_type = Some(super_type.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }

    #[must_use]
    pub fn with_valid_statuses(mut self, statuses: &[InstanceStatus]) -> Self {
        self.valid_statuses = statuses.to_vec();
        self
    }

    #[must_use]
    pub fn with_ends(mut self, end_one: impl Into<String>, end_two: impl Into<String>) -> Self {
        self.end_one = Some(end_one.into());
        self.end_two = Some(end_two.into());
        self
    }

    #[must_use]
    pub fn with_valid_entity_types(mut self, types: &[&str]) -> Self {
        self.valid_entity_types = types.iter().map(|t| (*t).to_string()).collect();
        self
    }

    fn instance_type(&self) -> InstanceType {
        InstanceType::new(self.guid.clone(), self.name.clone(), self.kind)
    }
}

// =============================================================================
// TYPE REGISTRY
// =============================================================================

const DEFAULT_STATUSES: [InstanceStatus; 3] = [
    InstanceStatus::Draft,
    InstanceStatus::Prepared,
    InstanceStatus::Active,
];

/// In-memory registry of type definitions.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    by_name: BTreeMap<String, TypeDef>,
    name_by_guid: BTreeMap<String, String>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from definitions listed supertypes-first.
    pub fn from_defs(defs: impl IntoIterator<Item = TypeDef>) -> Result<Self, CohortError> {
        let mut registry = Self::new();
        for def in defs {
            registry.register(def)?;
        }
        Ok(registry)
    }

    /// Parse a JSON array of type definitions.
    pub fn from_json(json: &str) -> Result<Self, CohortError> {
        let defs: Vec<TypeDef> = serde_json::from_str(json)
            .map_err(|e| CohortError::InvalidTypeDef(format!("Malformed type definitions: {e}")))?;
        Self::from_defs(defs)
    }

    /// Register one definition. Its supertype and referenced types must
    /// already be registered.
    pub fn register(&mut self, def: TypeDef) -> Result<(), CohortError> {
        if def.guid.trim().is_empty() || def.name.trim().is_empty() {
            return Err(CohortError::InvalidTypeDef(
                "Type guid and name must not be empty".to_string(),
            ));
        }
        if self.by_name.contains_key(&def.name) {
            return Err(CohortError::InvalidTypeDef(format!(
                "Duplicate type name {}",
                def.name
            )));
        }
        if self.name_by_guid.contains_key(&def.guid) {
            return Err(CohortError::InvalidTypeDef(format!(
                "Duplicate type guid {}",
                def.guid
            )));
        }
        if let Some(parent) = &def.super_type {
            let parent_def = self.by_name.get(parent).ok_or_else(|| {
                CohortError::InvalidTypeDef(format!(
                    "Supertype {parent} of {} is not registered",
                    def.name
                ))
            })?;
            if parent_def.kind != def.kind {
                return Err(CohortError::InvalidTypeDef(format!(
                    "Supertype {parent} of {} is a {} type",
                    def.name, parent_def.kind
                )));
            }
        }
        match def.kind {
            InstanceKind::Relationship => {
                let ends = [def.end_one.as_deref(), def.end_two.as_deref()];
                let declared = ends.iter().all(Option::is_some) || def.super_type.is_some();
                if !declared {
                    return Err(CohortError::InvalidTypeDef(format!(
                        "Relationship type {} must declare both ends",
                        def.name
                    )));
                }
                for end in ends.into_iter().flatten() {
                    self.require_entity_type(end, &def.name)?;
                }
            }
            InstanceKind::Classification => {
                for end in &def.valid_entity_types {
                    self.require_entity_type(end, &def.name)?;
                }
            }
            InstanceKind::Entity => {}
        }

        self.name_by_guid.insert(def.guid.clone(), def.name.clone());
        self.by_name.insert(def.name.clone(), def);
        Ok(())
    }

    fn require_entity_type(&self, name: &str, referenced_by: &str) -> Result<(), CohortError> {
        match self.by_name.get(name) {
            Some(def) if def.kind == InstanceKind::Entity => Ok(()),
            _ => Err(CohortError::InvalidTypeDef(format!(
                "{referenced_by} references unknown entity type {name}"
            ))),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.by_name.get(name)
    }

    #[must_use]
    pub fn get_by_guid(&self, guid: &str) -> Option<&TypeDef> {
        self.name_by_guid
            .get(guid)
            .and_then(|name| self.by_name.get(name))
    }

    /// All definitions in name order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.by_name.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// The type and its ancestors, nearest first.
    fn lineage<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a TypeDef> + 'a {
        let mut next = self.by_name.get(name);
        std::iter::from_fn(move || {
            let current = next?;
            next = current
                .super_type
                .as_deref()
                .and_then(|parent| self.by_name.get(parent));
            Some(current)
        })
    }

    /// True when `name` is `ancestor` or inherits from it.
    #[must_use]
    pub fn is_subtype_of(&self, name: &str, ancestor: &str) -> bool {
        self.lineage(name).any(|def| def.name == ancestor)
    }

    fn attributes<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a AttributeDef> + 'a {
        self.lineage(name).flat_map(|def| def.attributes.iter())
    }

    fn lookup(&self, type_name: &str) -> Result<&TypeDef, CohortError> {
        self.by_name
            .get(type_name)
            .ok_or_else(|| CohortError::TypeError(format!("Unknown type {type_name}")))
    }

    fn ends_of(&self, relationship: &str) -> Option<(&str, &str)> {
        self.lineage(relationship)
            .find_map(|def| Some((def.end_one.as_deref()?, def.end_two.as_deref()?)))
    }
}

fn check_kind(def: &TypeDef, kind: InstanceKind) -> Result<InstanceType, CohortError> {
    if def.kind == kind {
        Ok(def.instance_type())
    } else {
        Err(CohortError::TypeError(format!(
            "Type {} describes {} instances, not {}",
            def.name, def.kind, kind
        )))
    }
}

impl TypeValidator for TypeRegistry {
    fn resolve_type_by_guid(
        &self,
        type_def_guid: &str,
        kind: InstanceKind,
    ) -> Result<InstanceType, CohortError> {
        let def = self
            .get_by_guid(type_def_guid)
            .ok_or_else(|| CohortError::TypeError(format!("Unknown type guid {type_def_guid}")))?;
        check_kind(def, kind)
    }

    fn resolve_type_by_name(
        &self,
        type_name: &str,
        kind: InstanceKind,
    ) -> Result<InstanceType, CohortError> {
        check_kind(self.lookup(type_name)?, kind)
    }

    fn validate_properties_for_type(
        &self,
        type_name: &str,
        properties: &InstanceProperties,
    ) -> Result<(), CohortError> {
        self.lookup(type_name)?;
        let declared: BTreeMap<&str, &AttributeDef> = self
            .attributes(type_name)
            .map(|attr| (attr.name.as_str(), attr))
            .collect();

        for (name, value) in properties {
            let attr = declared.get(name.as_str()).ok_or_else(|| {
                CohortError::PropertyError(format!(
                    "Property {name} is not defined for type {type_name}"
                ))
            })?;
            if attr.kind != value.kind() {
                return Err(CohortError::PropertyError(format!(
                    "Property {name} of type {type_name} expects {:?}, got {:?}",
                    attr.kind,
                    value.kind()
                )));
            }
        }
        if let Some(missing) = declared
            .values()
            .find(|attr| attr.required && !properties.contains_key(&attr.name))
        {
            return Err(CohortError::PropertyError(format!(
                "Required property {} missing for type {type_name}",
                missing.name
            )));
        }
        Ok(())
    }

    fn validate_instance_status(
        &self,
        type_name: &str,
        status: InstanceStatus,
    ) -> Result<(), CohortError> {
        self.lookup(type_name)?;
        let valid = self
            .lineage(type_name)
            .map(|def| def.valid_statuses.as_slice())
            .find(|statuses| !statuses.is_empty())
            .unwrap_or(&DEFAULT_STATUSES);
        if valid.contains(&status) {
            Ok(())
        } else {
            Err(CohortError::StatusNotSupported(format!(
                "Status {status} is not valid for type {type_name}"
            )))
        }
    }

    fn validate_classification_for_entity(
        &self,
        classification_name: &str,
        entity_type_name: &str,
    ) -> Result<(), CohortError> {
        let def = match self.by_name.get(classification_name) {
            Some(def) if def.kind == InstanceKind::Classification => def,
            _ => {
                return Err(CohortError::ClassificationError(format!(
                    "Unknown classification {classification_name}"
                )));
            }
        };
        let valid = self
            .lineage(&def.name)
            .map(|d| d.valid_entity_types.as_slice())
            .find(|types| !types.is_empty());
        match valid {
            Some(types)
                if !types
                    .iter()
                    .any(|t| self.is_subtype_of(entity_type_name, t)) =>
            {
                Err(CohortError::ClassificationError(format!(
                    "Classification {classification_name} is not valid for entity type {entity_type_name}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn validate_relationship_ends(
        &self,
        relationship_type_name: &str,
        end_one_type_name: &str,
        end_two_type_name: &str,
    ) -> Result<(), CohortError> {
        let def = self.lookup(relationship_type_name)?;
        check_kind(def, InstanceKind::Relationship)?;
        let (one, two) = self.ends_of(relationship_type_name).ok_or_else(|| {
            CohortError::InvalidTypeDef(format!(
                "Relationship type {relationship_type_name} declares no ends"
            ))
        })?;
        for (actual, expected) in [(end_one_type_name, one), (end_two_type_name, two)] {
            if !self.is_subtype_of(actual, expected) {
                return Err(CohortError::TypeError(format!(
                    "Entity type {actual} cannot be an end of {relationship_type_name} (expects {expected})"
                )));
            }
        }
        Ok(())
    }

    fn unique_property_names(&self, type_name: &str) -> Vec<String> {
        self.attributes(type_name)
            .filter(|attr| attr.unique)
            .map(|attr| attr.name.clone())
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PropertyValue;

    fn registry() -> TypeRegistry {
        TypeRegistry::from_defs([
            TypeDef::new("t-ref", "Referenceable", InstanceKind::Entity).with_attribute(
                AttributeDef::new("qualifiedName", PropertyKind::String)
                    .required()
                    .unique(),
            ),
            TypeDef::new("t-asset", "Asset", InstanceKind::Entity)
                .with_super_type("Referenceable")
                .with_attribute(AttributeDef::new("description", PropertyKind::String)),
            TypeDef::new("t-person", "Person", InstanceKind::Entity)
                .with_valid_statuses(&[InstanceStatus::Active]),
            TypeDef::new("t-owns", "AssetOwnership", InstanceKind::Relationship)
                .with_ends("Person", "Asset"),
            TypeDef::new("t-conf", "Confidentiality", InstanceKind::Classification)
                .with_attribute(AttributeDef::new("level", PropertyKind::Int))
                .with_valid_entity_types(&["Referenceable"]),
        ])
        .expect("valid registry")
    }

    fn props(pairs: &[(&str, PropertyValue)]) -> InstanceProperties {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn resolves_by_guid_and_kind() {
        let reg = registry();
        let ty = reg
            .resolve_type_by_guid("t-asset", InstanceKind::Entity)
            .expect("resolve");
        assert_eq!(ty.type_def_name, "Asset");

        let err = reg
            .resolve_type_by_guid("t-asset", InstanceKind::Relationship)
            .expect_err("wrong kind");
        assert!(matches!(err, CohortError::TypeError(_)));
        assert!(reg.resolve_type_by_guid("nope", InstanceKind::Entity).is_err());
    }

    #[test]
    fn inherited_attributes_validate() {
        let reg = registry();
        let ok = props(&[
            ("qualifiedName", PropertyValue::from("a")),
            ("description", PropertyValue::from("d")),
        ]);
        reg.validate_properties_for_type("Asset", &ok)
            .expect("valid properties");

        let missing = props(&[("description", PropertyValue::from("d"))]);
        assert!(matches!(
            reg.validate_properties_for_type("Asset", &missing),
            Err(CohortError::PropertyError(_))
        ));

        let wrong_kind = props(&[("qualifiedName", PropertyValue::from(3i64))]);
        assert!(reg.validate_properties_for_type("Asset", &wrong_kind).is_err());

        let unknown = props(&[
            ("qualifiedName", PropertyValue::from("a")),
            ("owner", PropertyValue::from("x")),
        ]);
        assert!(reg.validate_properties_for_type("Asset", &unknown).is_err());
    }

    #[test]
    fn unique_names_include_supertypes() {
        let reg = registry();
        assert_eq!(reg.unique_property_names("Asset"), vec!["qualifiedName"]);
        assert!(reg.unique_property_names("Person").is_empty());
    }

    #[test]
    fn statuses_default_and_override() {
        let reg = registry();
        reg.validate_instance_status("Asset", InstanceStatus::Draft)
            .expect("default statuses allow draft");
        assert!(matches!(
            reg.validate_instance_status("Person", InstanceStatus::Draft),
            Err(CohortError::StatusNotSupported(_))
        ));
    }

    #[test]
    fn relationship_ends_accept_subtypes() {
        let reg = registry();
        reg.validate_relationship_ends("AssetOwnership", "Person", "Asset")
            .expect("exact ends");
        assert!(matches!(
            reg.validate_relationship_ends("AssetOwnership", "Asset", "Person"),
            Err(CohortError::TypeError(_))
        ));
    }

    #[test]
    fn classification_validity() {
        let reg = registry();
        reg.validate_classification_for_entity("Confidentiality", "Asset")
            .expect("asset is referenceable");
        assert!(matches!(
            reg.validate_classification_for_entity("Confidentiality", "Person"),
            Err(CohortError::ClassificationError(_))
        ));
        assert!(matches!(
            reg.validate_classification_for_entity("Unknown", "Asset"),
            Err(CohortError::ClassificationError(_))
        ));
    }

    #[test]
    fn rejects_bad_definitions() {
        let mut reg = registry();
        let dup = TypeDef::new("t-x", "Asset", InstanceKind::Entity);
        assert!(matches!(reg.register(dup), Err(CohortError::InvalidTypeDef(_))));

        let orphan = TypeDef::new("t-y", "Orphan", InstanceKind::Entity).with_super_type("Missing");
        assert!(reg.register(orphan).is_err());

        let endless = TypeDef::new("t-z", "Link", InstanceKind::Relationship);
        assert!(reg.register(endless).is_err());
    }

    #[test]
    fn loads_from_json() {
        let json = r#"[
            {"guid": "t-1", "name": "Thing", "kind": "ENTITY",
             "attributes": [{"name": "qualifiedName", "kind": "string", "unique": true}]},
            {"guid": "t-2", "name": "Link", "kind": "RELATIONSHIP", "endOne": "Thing", "endTwo": "Thing"}
        ]"#;
        let reg = TypeRegistry::from_json(json).expect("parse");
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.unique_property_names("Thing"), vec!["qualifiedName"]);
        assert!(TypeRegistry::from_json("{not json").is_err());
    }
}
