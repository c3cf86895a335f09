//! Data model validation
//!
//! Turns a [`RawDataModel`] into a [`DataModel`], applying defaults for the
//! optional sections and rejecting anything the planner could not act on.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::model::types::{DataModel, EntityDefinition, RawDataModel, RawEntityDefinition};
use crate::utils::naming::{is_valid_identifier, CaseImplementation};

/// Validate a raw data model and apply defaults
pub fn validate(raw: RawDataModel) -> Result<DataModel> {
    if raw.is_empty() {
        return Err(Error::ValidationError("Data model has no entities".into()));
    }

    let entity_names: HashSet<&str> = raw.keys().map(String::as_str).collect();
    check_distinct_after_casing(raw.keys().map(String::as_str), |a, b, cased, case| {
        invalid(
            a,
            &format!("and entity '{}' both become table '{}' in {}", b, cased, case),
        )
    })?;

    let mut entities = indexmap::IndexMap::with_capacity(raw.len());
    for (entity_name, definition) in &raw {
        let entity = validate_entity(entity_name, definition, &entity_names)?;
        entities.insert(entity_name.clone(), entity);
    }

    tracing::debug!(entities = entities.len(), "Initial data model validation passed");

    Ok(DataModel { entities })
}

fn validate_entity(
    entity_name: &str,
    definition: &RawEntityDefinition,
    entity_names: &HashSet<&str>,
) -> Result<EntityDefinition> {
    check_identifier(entity_name, "entity name", entity_name)?;
    check_round_trip(entity_name, "entity name", entity_name)?;

    let module = match definition.module.as_deref() {
        Some(module) if !module.is_empty() => module,
        _ => return Err(invalid(entity_name, "does not have a module configured")),
    };
    check_identifier(entity_name, "module", module)?;

    let attributes = definition
        .attributes
        .as_ref()
        .ok_or_else(|| invalid(entity_name, "does not have any attributes configured"))?;
    if attributes.is_empty() {
        return Err(invalid(entity_name, "has no attributes provided"));
    }

    let columns = attributes.keys().map(String::as_str).chain(
        definition
            .relationships
            .iter()
            .flat_map(|relationships| relationships.values())
            .flatten()
            .map(String::as_str),
    );
    check_distinct_after_casing(columns, |a, b, cased, case| {
        invalid(
            entity_name,
            &format!("has columns '{}' and '{}' that both become '{}' in {}", b, a, cased, case),
        )
    })?;

    for (attribute_name, attribute) in attributes {
        check_identifier(entity_name, "attribute", attribute_name)?;
        check_round_trip(entity_name, "attribute", attribute_name)?;
        if attribute.column_type.trim().is_empty() {
            return Err(invalid(
                entity_name,
                &format!("attribute '{}' has no type", attribute_name),
            ));
        }
    }

    let indexes = definition.indexes.clone().unwrap_or_default();
    let mut index_names = HashSet::new();
    for index in &indexes {
        check_identifier(entity_name, "index name", &index.index_name)?;
        check_identifier(entity_name, "index attribute", &index.attribute)?;
        check_round_trip(entity_name, "index attribute", &index.attribute)?;
        if !index_names.insert(index.index_name.as_str()) {
            return Err(invalid(
                entity_name,
                &format!("declares index '{}' more than once", index.index_name),
            ));
        }
    }

    let relationships = definition.relationships.clone().unwrap_or_default();
    let mut relationship_columns = HashSet::new();
    for (related_entity, columns) in &relationships {
        if !entity_names.contains(related_entity.as_str()) {
            return Err(invalid(
                entity_name,
                &format!(
                    "has a relationship to '{}', which does not exist in the data model",
                    related_entity
                ),
            ));
        }
        for column in columns {
            check_identifier(entity_name, "relationship attribute", column)?;
            check_round_trip(entity_name, "relationship attribute", column)?;
            if !relationship_columns.insert(column.as_str()) {
                return Err(invalid(
                    entity_name,
                    &format!(
                        "uses relationship attribute '{}' in more than one relationship",
                        column
                    ),
                ));
            }
            if attributes.contains_key(column) {
                return Err(invalid(
                    entity_name,
                    &format!("relationship attribute '{}' clashes with an attribute", column),
                ));
            }
        }
    }

    Ok(EntityDefinition {
        module: module.to_string(),
        attributes: attributes.clone(),
        indexes,
        relationships,
        options: definition.options.unwrap_or_default(),
    })
}

fn check_identifier(entity_name: &str, kind: &str, identifier: &str) -> Result<()> {
    if is_valid_identifier(identifier) {
        Ok(())
    } else {
        Err(invalid(
            entity_name,
            &format!("has an invalid {} '{}': identifiers may not be empty or contain whitespace", kind, identifier),
        ))
    }
}

/// Identifiers are authored in camelCase and must come back unchanged from
/// every case implementation. `userID` does not: it returns as `userId`.
fn check_round_trip(entity_name: &str, kind: &str, identifier: &str) -> Result<()> {
    for case in CaseImplementation::ALL {
        let cased = case.normalize(identifier);
        if case.denormalize(&cased) != identifier {
            return Err(invalid(
                entity_name,
                &format!(
                    "has {} '{}', which becomes '{}' in {} and cannot be mapped back; write it in camelCase",
                    kind, identifier, cased, case
                ),
            ));
        }
    }
    Ok(())
}

/// Fail when two identifiers of one scope end up with the same database name
/// in any case implementation
fn check_distinct_after_casing<'a, I, F>(identifiers: I, error: F) -> Result<()>
where
    I: Iterator<Item = &'a str> + Clone,
    F: Fn(&str, &str, &str, CaseImplementation) -> Error,
{
    for case in CaseImplementation::ALL {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for identifier in identifiers.clone() {
            let cased = case.normalize(identifier);
            if let Some(previous) = seen.insert(cased.clone(), identifier) {
                if previous != identifier {
                    return Err(error(identifier, previous, &cased, case));
                }
            }
        }
    }
    Ok(())
}

fn invalid(entity_name: &str, reason: &str) -> Error {
    Error::ValidationError(format!("Entity '{}' {}", entity_name, reason))
}
