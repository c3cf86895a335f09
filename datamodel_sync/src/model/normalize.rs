//! Case normalization of a validated data model
//!
//! The cased model is what every later stage works with: its names are the
//! names that exist (or should exist) in the database.

use indexmap::IndexMap;

use crate::model::types::{AttributeDefinition, DataModel, EntityOptions, IndexDefinition};
use crate::utils::naming::{
    foreign_key_constraint_name, foreign_key_identity, CaseImplementation, ForeignKeyIdentity,
};

/// A data model with every database-facing identifier rewritten into the
/// configured case
#[derive(Debug, Clone, PartialEq)]
pub struct CasedDataModel {
    pub case: CaseImplementation,
    pub entities: IndexMap<String, CasedEntity>,
}

/// One entity of a [`CasedDataModel`]. `name` is the table name.
#[derive(Debug, Clone, PartialEq)]
pub struct CasedEntity {
    pub name: String,
    pub module: String,
    pub attributes: IndexMap<String, AttributeDefinition>,
    pub indexes: Vec<IndexDefinition>,
    pub relationships: IndexMap<String, Vec<String>>,
    pub options: EntityOptions,
}

/// A foreign key derived from one relationship attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKeyConstraint {
    pub table_name: String,
    pub related_table: String,
    pub column_name: String,
    pub constraint_name: String,
}

impl ForeignKeyConstraint {
    pub fn new(table_name: &str, related_table: &str, column_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            related_table: related_table.to_string(),
            column_name: column_name.to_string(),
            constraint_name: foreign_key_constraint_name(table_name, related_table, column_name),
        }
    }

    /// The triple used for matching live constraints
    pub fn identity(&self) -> ForeignKeyIdentity {
        foreign_key_identity(&self.table_name, &self.related_table, &self.column_name)
    }
}

/// Rewrite entity, attribute, index target and relationship identifiers into `case`
pub fn normalize_case(model: &DataModel, case: CaseImplementation) -> CasedDataModel {
    let entities = model
        .entities
        .iter()
        .map(|(entity_name, definition)| {
            let name = case.normalize(entity_name);

            let attributes = definition
                .attributes
                .iter()
                .map(|(attribute_name, attribute)| (case.normalize(attribute_name), attribute.clone()))
                .collect();

            let indexes = definition
                .indexes
                .iter()
                .map(|index| IndexDefinition {
                    attribute: case.normalize(&index.attribute),
                    ..index.clone()
                })
                .collect();

            let relationships = definition
                .relationships
                .iter()
                .map(|(related_entity, columns)| {
                    (
                        case.normalize(related_entity),
                        columns.iter().map(|column| case.normalize(column)).collect(),
                    )
                })
                .collect();

            let entity = CasedEntity {
                name: name.clone(),
                module: definition.module.clone(),
                attributes,
                indexes,
                relationships,
                options: definition.options,
            };

            (name, entity)
        })
        .collect();

    CasedDataModel { case, entities }
}

impl CasedDataModel {
    pub fn entity(&self, table_name: &str) -> Option<&CasedEntity> {
        self.entities.get(table_name)
    }

    /// Entities belonging to one module, in model order
    pub fn module_entities<'a>(&'a self, module_name: &'a str) -> impl Iterator<Item = &'a CasedEntity> + 'a {
        self.entities.values().filter(move |entity| entity.module == module_name)
    }

    pub fn primary_key_column(&self) -> String {
        self.case.primary_key_column()
    }

    pub fn locking_constraint_column(&self) -> String {
        self.case.locking_constraint_column()
    }

    /// Foreign keys expected on `entity`. Relationships that cross modules
    /// keep their column but get no constraint.
    pub fn foreign_keys(&self, entity: &CasedEntity) -> Vec<ForeignKeyConstraint> {
        entity
            .relationships
            .iter()
            .filter(|(related, _)| {
                self.entity(related)
                    .map_or(false, |target| target.module == entity.module)
            })
            .flat_map(|(related, columns)| {
                columns
                    .iter()
                    .map(move |column| ForeignKeyConstraint::new(&entity.name, related, column))
            })
            .collect()
    }
}

impl CasedEntity {
    /// All foreign key columns declared on this entity, in declaration order
    pub fn relationship_columns(&self) -> Vec<&str> {
        self.relationships
            .values()
            .flat_map(|columns| columns.iter().map(String::as_str))
            .collect()
    }

    pub fn is_relationship_column(&self, column_name: &str) -> bool {
        self.relationships
            .values()
            .any(|columns| columns.iter().any(|c| c == column_name))
    }

    pub fn enforces_locking_constraints(&self) -> bool {
        self.options.enforce_locking_constraints
    }
}
