//! Sync planning
//!
//! Compares a [`SchemaSnapshot`] with a [`CasedDataModel`] and produces the
//! DDL needed to make the database match, grouped into six ordered phases.
//! Every phase covers all modules before the next one starts.
//!
//! Planning is pure: it never touches a connection, so the whole plan is
//! known before the first statement runs.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::model::{AttributeDefinition, CasedDataModel, CasedEntity};
use crate::schema::confirm::TableRemoval;
use crate::schema::types::{
    ColumnProperty, ColumnSpec, DdlOperation, ExistingTable, LiveColumn, ModuleSnapshot, SchemaSnapshot,
    TableType,
};
use crate::utils::naming::ForeignKeyIdentity;

/// The six phases of a sync run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    RemoveTables,
    CreateTables,
    DropForeignKeys,
    ReconcileColumns,
    ReconcileIndexes,
    AddForeignKeys,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::RemoveTables,
        Phase::CreateTables,
        Phase::DropForeignKeys,
        Phase::ReconcileColumns,
        Phase::ReconcileIndexes,
        Phase::AddForeignKeys,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            Phase::RemoveTables => "Removing unknown tables",
            Phase::CreateTables => "Creating new tables",
            Phase::DropForeignKeys => "Removing redundant relationships",
            Phase::ReconcileColumns => "Updating columns",
            Phase::ReconcileIndexes => "Updating indexes",
            Phase::AddForeignKeys => "Updating relationships",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.heading())
    }
}

/// What a statement does to the schema, for progress reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl DdlOperation {
    pub fn change_kind(&self) -> ChangeKind {
        match self {
            DdlOperation::DropTables { .. }
            | DdlOperation::DropViews { .. }
            | DdlOperation::DropForeignKey { .. }
            | DdlOperation::DropColumn { .. }
            | DdlOperation::DropIndex { .. } => ChangeKind::Removed,
            DdlOperation::CreateTable { .. }
            | DdlOperation::AddPrimaryKey { .. }
            | DdlOperation::AddColumn { .. }
            | DdlOperation::AddIndex { .. }
            | DdlOperation::AddForeignKey { .. } => ChangeKind::Added,
            DdlOperation::ModifyColumn { .. } => ChangeKind::Modified,
        }
    }
}

/// A DDL operation bound to the module whose transaction runs it
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStatement {
    pub module_name: String,
    pub operation: DdlOperation,
}

/// The statements of one phase, in execution order
#[derive(Debug, Clone, PartialEq)]
pub struct PhasePlan {
    pub phase: Phase,
    pub statements: Vec<PlannedStatement>,
}

impl PhasePlan {
    fn push(&mut self, module_name: &str, operation: DdlOperation) {
        self.statements.push(PlannedStatement {
            module_name: module_name.to_string(),
            operation,
        });
    }

    /// Number of statements per kind of change
    pub fn counts(&self) -> HashMap<ChangeKind, usize> {
        let mut counts = HashMap::new();
        for statement in &self.statements {
            *counts.entry(statement.operation.change_kind()).or_insert(0) += 1;
        }
        counts
    }
}

/// The full, ordered DDL plan for a sync run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    pub phases: Vec<PhasePlan>,
}

impl Default for SyncPlan {
    fn default() -> Self {
        Self {
            phases: Phase::ALL
                .iter()
                .map(|&phase| PhasePlan {
                    phase,
                    statements: Vec::new(),
                })
                .collect(),
        }
    }
}

impl SyncPlan {
    pub fn phase(&self, phase: Phase) -> &PhasePlan {
        &self.phases[phase_position(phase)]
    }

    fn phase_mut(&mut self, phase: Phase) -> &mut PhasePlan {
        &mut self.phases[phase_position(phase)]
    }

    pub fn statement_count(&self) -> usize {
        self.phases.iter().map(|p| p.statements.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.statement_count() == 0
    }

    /// Every planned statement in execution order
    pub fn statements(&self) -> impl Iterator<Item = (Phase, &PlannedStatement)> {
        self.phases
            .iter()
            .flat_map(|p| p.statements.iter().map(move |s| (p.phase, s)))
    }
}

fn phase_position(phase: Phase) -> usize {
    Phase::ALL.iter().position(|p| *p == phase).unwrap_or_default()
}

/// Tables and views that exist live but have no entity in their module's schema
pub fn removal_candidates(snapshot: &SchemaSnapshot, cased: &CasedDataModel) -> Vec<ExistingTable> {
    let expected = expected_tables(snapshot, cased);

    snapshot
        .tables()
        .filter(|table| !expected.contains(&(table.schema_name.as_str(), table.name.as_str())))
        .cloned()
        .collect()
}

/// `(schema, table)` pairs the model expects. Modules sharing a schema share
/// their tables, so one module never removes another's.
fn expected_tables<'a>(snapshot: &'a SchemaSnapshot, cased: &'a CasedDataModel) -> HashSet<(&'a str, &'a str)> {
    cased
        .entities
        .values()
        .filter_map(|entity| {
            snapshot
                .module(&entity.module)
                .map(|module| (module.schema_name.as_str(), entity.name.as_str()))
        })
        .collect()
}

/// Build the complete plan for a run
pub fn plan_sync(snapshot: &SchemaSnapshot, cased: &CasedDataModel, removal: &TableRemoval) -> SyncPlan {
    let mut plan = SyncPlan::default();

    plan_table_removal(plan.phase_mut(Phase::RemoveTables), snapshot, removal);

    let planners: Vec<EntityPlanner<'_>> = snapshot
        .modules
        .values()
        .flat_map(|module| {
            cased
                .module_entities(&module.module_name)
                .map(move |entity| EntityPlanner::new(module, cased, entity))
        })
        .collect();

    for planner in &planners {
        planner.plan_create_table(plan.phase_mut(Phase::CreateTables));
    }

    let mut dropped_foreign_keys = HashMap::new();
    for planner in &planners {
        let dropped = planner.plan_drop_foreign_keys(plan.phase_mut(Phase::DropForeignKeys));
        dropped_foreign_keys.insert(planner.key(), dropped);
    }

    let mut dropped_columns = HashMap::new();
    for planner in &planners {
        let dropped = planner.plan_columns(plan.phase_mut(Phase::ReconcileColumns));
        dropped_columns.insert(planner.key(), dropped);
    }

    for planner in &planners {
        let key = planner.key();
        planner.plan_indexes(
            plan.phase_mut(Phase::ReconcileIndexes),
            dropped_foreign_keys.remove(&key).unwrap_or_default(),
            dropped_columns.remove(&key).unwrap_or_default(),
        );
    }

    for planner in &planners {
        planner.plan_add_foreign_keys(plan.phase_mut(Phase::AddForeignKeys));
    }

    tracing::debug!(statements = plan.statement_count(), "Sync plan built");

    plan
}

fn names(tables: &[&ExistingTable]) -> Vec<String> {
    tables.iter().map(|t| t.name.clone()).collect()
}

fn plan_table_removal(phase: &mut PhasePlan, snapshot: &SchemaSnapshot, removal: &TableRemoval) {
    for module in snapshot.modules.values() {
        let (views, tables): (Vec<_>, Vec<_>) = removal
            .tables()
            .iter()
            .filter(|t| t.module_name == module.module_name)
            .partition(|t| t.table_type == TableType::View);

        if removal.is_batched() {
            if !tables.is_empty() {
                phase.push(&module.module_name, DdlOperation::DropTables { tables: names(&tables) });
            }
            if !views.is_empty() {
                phase.push(&module.module_name, DdlOperation::DropViews { views: names(&views) });
            }
        } else {
            for table in removal.tables().iter().filter(|t| t.module_name == module.module_name) {
                let operation = match table.table_type {
                    TableType::View => DdlOperation::DropViews {
                        views: vec![table.name.clone()],
                    },
                    TableType::BaseTable => DdlOperation::DropTables {
                        tables: vec![table.name.clone()],
                    },
                };
                phase.push(&module.module_name, operation);
            }
        }
    }
}

/// Plans phases 2 to 6 for one entity against its module's snapshot
struct EntityPlanner<'a> {
    module: &'a ModuleSnapshot,
    cased: &'a CasedDataModel,
    entity: &'a CasedEntity,
    /// False when phase 2 creates the table
    exists: bool,
}

impl<'a> EntityPlanner<'a> {
    fn new(module: &'a ModuleSnapshot, cased: &'a CasedDataModel, entity: &'a CasedEntity) -> Self {
        Self {
            module,
            cased,
            entity,
            exists: module.has_table(&entity.name),
        }
    }

    fn key(&self) -> (String, String) {
        (self.module.module_name.clone(), self.entity.name.clone())
    }

    fn table(&self) -> String {
        self.entity.name.clone()
    }

    fn push(&self, phase: &mut PhasePlan, operation: DdlOperation) {
        phase.push(&self.module.module_name, operation);
    }

    fn plan_create_table(&self, phase: &mut PhasePlan) {
        if !self.exists {
            self.push(
                phase,
                DdlOperation::CreateTable {
                    table: self.table(),
                    primary_key: self.cased.primary_key_column(),
                },
            );
        }
    }

    /// Drop live foreign keys whose identity the model no longer declares.
    /// Returns the dropped constraint names.
    fn plan_drop_foreign_keys(&self, phase: &mut PhasePlan) -> HashSet<String> {
        let expected: HashSet<ForeignKeyIdentity> = self
            .cased
            .foreign_keys(self.entity)
            .iter()
            .map(|fk| fk.identity())
            .collect();

        let mut dropped = HashSet::new();
        for live in self.module.foreign_keys(&self.entity.name) {
            if !expected.contains(&live.identity()) && dropped.insert(live.constraint_name.clone()) {
                self.push(
                    phase,
                    DdlOperation::DropForeignKey {
                        table: self.table(),
                        constraint_name: live.constraint_name.clone(),
                    },
                );
            }
        }

        dropped
    }

    /// Reconcile columns. Returns the names of dropped columns.
    fn plan_columns(&self, phase: &mut PhasePlan) -> HashSet<String> {
        let primary_key = self.cased.primary_key_column();
        let locking_column = self.cased.locking_constraint_column();
        let enforce_locking = self.entity.enforces_locking_constraints()
            && !self.entity.attributes.contains_key(&locking_column)
            && !self.entity.is_relationship_column(&locking_column);

        let live_columns = self.module.columns(&self.entity.name);
        let mut seen: HashSet<&str> = HashSet::new();
        let mut dropped = HashSet::new();

        if !self.exists {
            seen.insert(primary_key.as_str());
        }

        for column in live_columns {
            seen.insert(column.name.as_str());

            if column.name == primary_key {
                continue;
            }

            if let Some(attribute) = self.entity.attributes.get(&column.name) {
                let mismatches = attribute_mismatches(column, attribute);
                if !mismatches.is_empty() {
                    self.push(
                        phase,
                        DdlOperation::ModifyColumn {
                            table: self.table(),
                            column: attribute_column(&column.name, attribute),
                            mismatches,
                        },
                    );
                }
            } else if self.entity.is_relationship_column(&column.name) {
                if !column.base_type.eq_ignore_ascii_case("int") {
                    self.push(
                        phase,
                        DdlOperation::ModifyColumn {
                            table: self.table(),
                            column: ColumnSpec::relationship(&column.name),
                            mismatches: vec![ColumnProperty::Type],
                        },
                    );
                }
            } else if enforce_locking && column.name == locking_column {
                let mismatches = locking_column_mismatches(column);
                if !mismatches.is_empty() {
                    self.push(
                        phase,
                        DdlOperation::ModifyColumn {
                            table: self.table(),
                            column: ColumnSpec::locking_constraint(&column.name),
                            mismatches,
                        },
                    );
                }
            } else {
                dropped.insert(column.name.clone());
                self.push(
                    phase,
                    DdlOperation::DropColumn {
                        table: self.table(),
                        column: column.name.clone(),
                    },
                );
            }
        }

        if !seen.contains(primary_key.as_str()) {
            self.push(
                phase,
                DdlOperation::AddPrimaryKey {
                    table: self.table(),
                    column: primary_key.clone(),
                },
            );
        }

        for (name, attribute) in &self.entity.attributes {
            if !seen.contains(name.as_str()) {
                self.push(
                    phase,
                    DdlOperation::AddColumn {
                        table: self.table(),
                        column: attribute_column(name, attribute),
                    },
                );
            }
        }

        if enforce_locking && !seen.contains(locking_column.as_str()) {
            self.push(
                phase,
                DdlOperation::AddColumn {
                    table: self.table(),
                    column: ColumnSpec::locking_constraint(&locking_column),
                },
            );
        }

        for name in self.entity.relationship_columns() {
            if !seen.contains(name) {
                self.push(
                    phase,
                    DdlOperation::AddColumn {
                        table: self.table(),
                        column: ColumnSpec::relationship(name),
                    },
                );
            }
        }

        dropped
    }

    /// Reconcile indexes by name. Foreign key backing indexes are left alone
    /// unless phase 3 dropped their constraint.
    fn plan_indexes(&self, phase: &mut PhasePlan, dropped_foreign_keys: HashSet<String>, dropped_columns: HashSet<String>) {
        let live_indexes = self.module.indexes(&self.entity.name);

        let mut expected: HashSet<String> = self
            .cased
            .foreign_keys(self.entity)
            .into_iter()
            .map(|fk| fk.constraint_name)
            .collect();
        expected.extend(self.entity.indexes.iter().map(|i| i.index_name.clone()));

        let live_names: HashSet<&str> = live_indexes.iter().map(|i| i.name.as_str()).collect();

        for index in &self.entity.indexes {
            if !live_names.contains(index.index_name.as_str()) {
                self.push(
                    phase,
                    DdlOperation::AddIndex {
                        table: self.table(),
                        index: index.clone(),
                    },
                );
            }
        }

        let mut visited = HashSet::new();
        for index in live_indexes {
            if index.is_primary() || !visited.insert(index.name.as_str()) {
                continue;
            }
            if index.backs_foreign_key() && !dropped_foreign_keys.contains(&index.name) {
                continue;
            }
            if expected.contains(&index.name) {
                continue;
            }

            // MySQL drops an index together with the last of its columns
            let vanished = live_indexes
                .iter()
                .filter(|i| i.name == index.name)
                .all(|i| dropped_columns.contains(&i.column_name));
            if vanished {
                continue;
            }

            self.push(
                phase,
                DdlOperation::DropIndex {
                    table: self.table(),
                    index_name: index.name.clone(),
                },
            );
        }
    }

    fn plan_add_foreign_keys(&self, phase: &mut PhasePlan) {
        let live: HashSet<ForeignKeyIdentity> = self
            .module
            .foreign_keys(&self.entity.name)
            .iter()
            .map(|fk| fk.identity())
            .collect();

        for constraint in self.cased.foreign_keys(self.entity) {
            if !live.contains(&constraint.identity()) {
                self.push(
                    phase,
                    DdlOperation::AddForeignKey {
                        constraint,
                        primary_key: self.cased.primary_key_column(),
                    },
                );
            }
        }
    }
}

/// The column an attribute describes. A bare `tinyint` is created as
/// `tinyint(1)` so that it compares equal on the next run.
fn attribute_column(name: &str, attribute: &AttributeDefinition) -> ColumnSpec {
    let mut column = ColumnSpec::from_attribute(name, attribute);
    if column.length_or_values.is_none() && column.column_type.eq_ignore_ascii_case("tinyint") {
        column.length_or_values = Some("1".to_string());
    }
    column
}

const INTEGER_TYPES: [&str; 5] = ["tinyint", "smallint", "mediumint", "int", "bigint"];

/// The type as MySQL reports it
fn canonical_type(column_type: &str) -> String {
    let lowered = column_type.trim().to_lowercase();
    match lowered.as_str() {
        "boolean" | "bool" => "tinyint".to_string(),
        "integer" => "int".to_string(),
        _ => lowered,
    }
}

/// Every property in which a live column differs from its attribute
pub fn attribute_mismatches(live: &LiveColumn, attribute: &AttributeDefinition) -> Vec<ColumnProperty> {
    let mut mismatches = Vec::new();

    let expected_type = canonical_type(&attribute.column_type);
    let live_type = canonical_type(&live.base_type);
    if expected_type != live_type {
        mismatches.push(ColumnProperty::Type);
    }

    let expected_length = attribute.length_or_values.as_ref().map(|l| l.to_string());
    if !lengths_match(&live_type, expected_length.as_deref(), live.length_or_values.as_deref()) {
        mismatches.push(ColumnProperty::LengthOrValues);
    }

    let expected_default = attribute.default.as_ref().map(|d| d.to_sql_value());
    if normalize_default(expected_default.as_deref()) != normalize_default(live.default.as_deref()) {
        mismatches.push(ColumnProperty::Default);
    }

    if attribute.allow_null != live.nullable {
        mismatches.push(ColumnProperty::AllowNull);
    }

    mismatches
}

fn lengths_match(live_type: &str, expected: Option<&str>, live: Option<&str>) -> bool {
    let base = live_type.split_whitespace().next().unwrap_or_default();

    if INTEGER_TYPES.contains(&base) {
        // Display widths: MySQL 8 omits them, and only tinyint(1) carries meaning
        if base != "tinyint" {
            return true;
        }
        return match live {
            None => true,
            Some(live) => expected.unwrap_or("1").trim() == live.trim(),
        };
    }

    if base == "decimal" {
        return compact(expected.unwrap_or("10,0")) == compact(live.unwrap_or("10,0"));
    }

    match (expected, live) {
        (None, _) => true,
        (Some(expected), Some(live)) => compact(expected) == compact(live),
        (Some(expected), None) => expected.trim().is_empty(),
    }
}

/// Lowercase and strip the spaces MySQL drops from value lists
fn compact(value: &str) -> String {
    value
        .to_lowercase()
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
}

/// Normalize a default for comparison. Empty and `NULL` mean no default,
/// `current_timestamp()` is `current_timestamp`, and quoted literals lose
/// their quotes.
fn normalize_default(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("NULL") {
        return None;
    }

    let unquoted = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value);

    let lowered = unquoted.to_lowercase();
    match lowered.as_str() {
        "current_timestamp()" => Some("current_timestamp".to_string()),
        _ => Some(lowered),
    }
}

fn locking_column_mismatches(live: &LiveColumn) -> Vec<ColumnProperty> {
    let mut mismatches = Vec::new();
    if !live.base_type.eq_ignore_ascii_case("datetime") {
        mismatches.push(ColumnProperty::Type);
    }
    if normalize_default(live.default.as_deref()).as_deref() != Some("current_timestamp") {
        mismatches.push(ColumnProperty::Default);
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{normalize_case, DataModel, ForeignKeyConstraint};
    use crate::schema::types::{ColumnDefault, ExistingTable, LiveForeignKey, LiveIndex};
    use crate::utils::naming::{foreign_key_constraint_name, CaseImplementation};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn cased(json: &str, case: CaseImplementation) -> CasedDataModel {
        normalize_case(&DataModel::from_json_str(json).unwrap(), case)
    }

    fn empty_snapshot(modules: &[&str]) -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot::new();
        for module in modules {
            snapshot.add_module(ModuleSnapshot::new(module, &format!("{}_db", module)));
        }
        snapshot
    }

    fn operations(plan: &SyncPlan, phase: Phase) -> Vec<DdlOperation> {
        plan.phase(phase).statements.iter().map(|s| s.operation.clone()).collect()
    }

    const ORGANISATION: &str = r#"{
        "organisation": { "module": "main", "attributes": {
            "name": { "type": "varchar", "lengthOrValues": 255, "default": null, "allowNull": true }
        } }
    }"#;

    const PEOPLE: &str = r#"{
        "organisation": { "module": "main", "attributes": {
            "organisationName": { "type": "varchar", "lengthOrValues": 150, "default": null, "allowNull": false },
            "isActive": { "type": "boolean", "lengthOrValues": null, "default": true, "allowNull": false },
            "status": { "type": "enum", "lengthOrValues": "'draft','live'", "default": "draft", "allowNull": false },
            "balance": { "type": "decimal", "lengthOrValues": null, "default": null, "allowNull": true },
            "createdAt": { "type": "datetime", "lengthOrValues": null, "default": "CURRENT_TIMESTAMP", "allowNull": true }
        },
        "indexes": [
            { "attribute": "organisationName", "indexName": "organisation_name_idx", "indexChoice": "unique", "type": "BTREE" }
        ] },
        "personAccount": { "module": "main", "attributes": {
            "firstName": { "type": "varchar", "lengthOrValues": 100, "default": null, "allowNull": true }
        },
        "relationships": { "organisation": ["employerOrganisation"] } }
    }"#;

    /// The snapshot a database has right after syncing `cased`
    fn synced_snapshot(cased: &CasedDataModel, modules: &[&str]) -> SchemaSnapshot {
        let mut snapshot = empty_snapshot(modules);
        let primary_key = cased.primary_key_column();
        let locking = cased.locking_constraint_column();

        for entity in cased.entities.values() {
            let foreign_keys = cased.foreign_keys(entity);
            let module = snapshot.modules.get_mut(&entity.module).unwrap();
            module.add_table(&entity.name, TableType::BaseTable);
            module.add_column(&entity.name, LiveColumn::new(&primary_key, "int").nullable(false));
            module.add_index(&entity.name, live_index("PRIMARY", &primary_key, None));

            for (name, attribute) in &entity.attributes {
                let spec = attribute_column(name, attribute);
                let base = canonical_type(&spec.column_type);
                let column_type = match (base.as_str(), &spec.length_or_values) {
                    ("decimal", None) => "decimal(10,0)".to_string(),
                    (_, Some(length)) => format!("{}({})", base, length),
                    (_, None) => base.clone(),
                };
                let mut column = LiveColumn::new(name, &column_type).nullable(spec.allow_null);
                column.default = match spec.default {
                    ColumnDefault::None => None,
                    ColumnDefault::CurrentTimestamp => Some("CURRENT_TIMESTAMP".into()),
                    ColumnDefault::Literal(value) => Some(value),
                };
                module.add_column(&entity.name, column);
            }

            if entity.enforces_locking_constraints() {
                module.add_column(
                    &entity.name,
                    LiveColumn::new(&locking, "datetime").nullable(false).default("CURRENT_TIMESTAMP"),
                );
            }

            for column in entity.relationship_columns() {
                module.add_column(&entity.name, LiveColumn::new(column, "int"));
            }

            for index in &entity.indexes {
                module.add_index(&entity.name, live_index(&index.index_name, &index.attribute, None));
            }

            for fk in foreign_keys {
                module.add_index(
                    &entity.name,
                    live_index(&fk.constraint_name, &fk.column_name, Some(&fk.related_table)),
                );
                module.add_foreign_key(&entity.name, live_foreign_key(&fk));
            }
        }

        snapshot
    }

    fn live_index(name: &str, column: &str, referenced_table: Option<&str>) -> LiveIndex {
        LiveIndex {
            name: name.to_string(),
            column_name: column.to_string(),
            nullable: false,
            index_type: "BTREE".to_string(),
            referenced_table: referenced_table.map(str::to_string),
        }
    }

    fn live_foreign_key(fk: &ForeignKeyConstraint) -> LiveForeignKey {
        LiveForeignKey {
            constraint_name: fk.constraint_name.clone(),
            table_name: fk.table_name.clone(),
            column_name: fk.column_name.clone(),
            referenced_table: fk.related_table.clone(),
        }
    }

    #[rstest]
    #[case(CaseImplementation::SnakeCase, "organisation", "id", "name", "last_updated")]
    #[case(CaseImplementation::PascalCase, "Organisation", "Id", "Name", "LastUpdated")]
    #[case(CaseImplementation::CamelCase, "organisation", "id", "name", "lastUpdated")]
    fn test_empty_database_creates_table_then_columns(
        #[case] case: CaseImplementation,
        #[case] table: &str,
        #[case] primary_key: &str,
        #[case] column: &str,
        #[case] locking: &str,
    ) {
        let cased = cased(ORGANISATION, case);
        let plan = plan_sync(&empty_snapshot(&["main"]), &cased, &TableRemoval::Skip);

        assert_eq!(
            operations(&plan, Phase::CreateTables),
            vec![DdlOperation::CreateTable {
                table: table.to_string(),
                primary_key: primary_key.to_string(),
            }]
        );

        let columns = operations(&plan, Phase::ReconcileColumns);
        assert_eq!(columns.len(), 2);
        match &columns[0] {
            DdlOperation::AddColumn { table: t, column: c } => {
                assert_eq!(t, table);
                assert_eq!(c.name, column);
                assert_eq!(c.length_or_values.as_deref(), Some("255"));
            }
            other => panic!("unexpected operation {:?}", other),
        }
        assert_eq!(
            columns[1],
            DdlOperation::AddColumn {
                table: table.to_string(),
                column: ColumnSpec::locking_constraint(locking),
            }
        );

        assert!(plan.phase(Phase::RemoveTables).statements.is_empty());
        assert!(plan.phase(Phase::DropForeignKeys).statements.is_empty());
        assert!(plan.phase(Phase::ReconcileIndexes).statements.is_empty());
        assert!(plan.phase(Phase::AddForeignKeys).statements.is_empty());
        assert_eq!(plan.statement_count(), 3);
    }

    #[test]
    fn test_locking_column_is_optional() {
        let cased = cased(
            r#"{ "organisation": { "module": "main",
                "attributes": { "name": { "type": "varchar", "lengthOrValues": 255 } },
                "options": { "enforceLockingConstraints": false } } }"#,
            CaseImplementation::SnakeCase,
        );
        let plan = plan_sync(&empty_snapshot(&["main"]), &cased, &TableRemoval::Skip);

        assert_eq!(operations(&plan, Phase::ReconcileColumns).len(), 1);
    }

    #[rstest]
    #[case(CaseImplementation::SnakeCase)]
    #[case(CaseImplementation::CamelCase)]
    #[case(CaseImplementation::PascalCase)]
    fn test_synced_database_plans_nothing(#[case] case: CaseImplementation) {
        let cased = cased(PEOPLE, case);
        let snapshot = synced_snapshot(&cased, &["main"]);

        let plan = plan_sync(&snapshot, &cased, &TableRemoval::Skip);

        assert_eq!(
            plan.statements().map(|(_, s)| s.operation.clone()).collect::<Vec<_>>(),
            Vec::<DdlOperation>::new()
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_mysql8_integer_widths_are_ignored() {
        let cased = cased(
            r#"{ "counter": { "module": "main", "attributes": {
                "total": { "type": "int", "lengthOrValues": 11, "allowNull": true },
                "big": { "type": "bigint", "allowNull": true }
            }, "options": { "enforceLockingConstraints": false } } }"#,
            CaseImplementation::SnakeCase,
        );
        let mut snapshot = empty_snapshot(&["main"]);
        let module = snapshot.modules.get_mut("main").unwrap();
        module.add_table("counter", TableType::BaseTable);
        module.add_column("counter", LiveColumn::new("id", "int").nullable(false));
        module.add_column("counter", LiveColumn::new("total", "int"));
        module.add_column("counter", LiveColumn::new("big", "bigint(20)"));

        assert!(plan_sync(&snapshot, &cased, &TableRemoval::Skip).is_empty());
    }

    #[test]
    fn test_boolean_matches_tinyint_one() {
        let attribute = AttributeDefinition::new("boolean").not_null();
        let live = LiveColumn::new("is_active", "tinyint(1)").nullable(false);

        assert_eq!(attribute_mismatches(&live, &attribute), Vec::<ColumnProperty>::new());
    }

    #[test]
    fn test_bare_tinyint_defaults_to_length_one() {
        let attribute = AttributeDefinition::new("tinyint");

        assert!(attribute_mismatches(&LiveColumn::new("flag", "tinyint(1)"), &attribute).is_empty());
        assert_eq!(
            attribute_mismatches(&LiveColumn::new("flag", "tinyint(4)"), &attribute),
            vec![ColumnProperty::LengthOrValues]
        );
    }

    #[rstest]
    #[case("CURRENT_TIMESTAMP", Some("current_timestamp()"))]
    #[case("draft", Some("'draft'"))]
    #[case("", None)]
    #[case("", Some("NULL"))]
    fn test_equivalent_defaults(#[case] expected: &str, #[case] live: Option<&str>) {
        assert_eq!(normalize_default(Some(expected)), normalize_default(live));
    }

    #[test]
    fn test_enum_values_compare_without_spaces() {
        let attribute = AttributeDefinition::new("ENUM").values("'Draft', 'Live'");
        let live = LiveColumn::new("status", "enum('draft','live')");

        assert!(attribute_mismatches(&live, &attribute).is_empty());
    }

    #[test]
    fn test_every_mismatch_is_reported_in_one_modify() {
        let cased = cased(
            r#"{ "organisation": { "module": "main", "attributes": {
                "name": { "type": "varchar", "lengthOrValues": 255, "default": "unknown", "allowNull": false }
            }, "options": { "enforceLockingConstraints": false } } }"#,
            CaseImplementation::SnakeCase,
        );
        let mut snapshot = empty_snapshot(&["main"]);
        let module = snapshot.modules.get_mut("main").unwrap();
        module.add_table("organisation", TableType::BaseTable);
        module.add_column("organisation", LiveColumn::new("id", "int").nullable(false));
        module.add_column("organisation", LiveColumn::new("name", "text"));

        let plan = plan_sync(&snapshot, &cased, &TableRemoval::Skip);

        match operations(&plan, Phase::ReconcileColumns).as_slice() {
            [DdlOperation::ModifyColumn { column, mismatches, .. }] => {
                assert_eq!(
                    mismatches,
                    &vec![
                        ColumnProperty::Type,
                        ColumnProperty::LengthOrValues,
                        ColumnProperty::Default,
                        ColumnProperty::AllowNull
                    ]
                );
                assert_eq!(column.column_type, "varchar");
                assert_eq!(column.default, ColumnDefault::Literal("unknown".into()));
                assert!(!column.allow_null);
            }
            other => panic!("expected one MODIFY COLUMN, got {:?}", other),
        }
    }

    #[test]
    fn test_varchar_relationship_column_is_retyped_between_fk_phases() {
        let cased = cased(PEOPLE, CaseImplementation::SnakeCase);
        let mut snapshot = synced_snapshot(&cased, &["main"]);
        let module = snapshot.modules.get_mut("main").unwrap();

        // Column retyped by hand and its constraint pointed elsewhere
        for column in module.columns.get_mut("person_account").unwrap() {
            if column.name == "employer_organisation" {
                *column = LiveColumn::new("employer_organisation", "varchar(20)");
            }
        }
        let stale_name = foreign_key_constraint_name("person_account", "legacy_org", "employer_organisation");
        module.foreign_keys.insert(
            "person_account".into(),
            vec![LiveForeignKey {
                constraint_name: stale_name.clone(),
                table_name: "person_account".into(),
                column_name: "employer_organisation".into(),
                referenced_table: "legacy_org".into(),
            }],
        );
        module.indexes.insert(
            "person_account".into(),
            vec![
                live_index("PRIMARY", "id", None),
                live_index(&stale_name, "employer_organisation", Some("legacy_org")),
            ],
        );

        let plan = plan_sync(&snapshot, &cased, &TableRemoval::Skip);

        assert_eq!(
            operations(&plan, Phase::DropForeignKeys),
            vec![DdlOperation::DropForeignKey {
                table: "person_account".into(),
                constraint_name: stale_name.clone(),
            }]
        );
        assert_eq!(
            operations(&plan, Phase::ReconcileColumns),
            vec![DdlOperation::ModifyColumn {
                table: "person_account".into(),
                column: ColumnSpec::relationship("employer_organisation"),
                mismatches: vec![ColumnProperty::Type],
            }]
        );
        assert_eq!(
            operations(&plan, Phase::ReconcileIndexes),
            vec![DdlOperation::DropIndex {
                table: "person_account".into(),
                index_name: stale_name,
            }]
        );
        assert_eq!(
            operations(&plan, Phase::AddForeignKeys),
            vec![DdlOperation::AddForeignKey {
                constraint: ForeignKeyConstraint::new("person_account", "organisation", "employer_organisation"),
                primary_key: "id".into(),
            }]
        );
    }

    #[test]
    fn test_obsolete_columns_and_indexes_are_dropped() {
        let cased = cased(ORGANISATION, CaseImplementation::SnakeCase);
        let mut snapshot = synced_snapshot(&cased, &["main"]);
        let module = snapshot.modules.get_mut("main").unwrap();
        module.add_column("organisation", LiveColumn::new("legacy_code", "varchar(10)"));
        module.add_column("organisation", LiveColumn::new("notes", "text"));
        module.add_index("organisation", live_index("legacy_code_idx", "legacy_code", None));
        module.add_index("organisation", live_index("name_idx", "name", None));

        let plan = plan_sync(&snapshot, &cased, &TableRemoval::Skip);

        assert_eq!(
            operations(&plan, Phase::ReconcileColumns),
            vec![
                DdlOperation::DropColumn { table: "organisation".into(), column: "legacy_code".into() },
                DdlOperation::DropColumn { table: "organisation".into(), column: "notes".into() },
            ]
        );
        // legacy_code_idx goes away with its column
        assert_eq!(
            operations(&plan, Phase::ReconcileIndexes),
            vec![DdlOperation::DropIndex { table: "organisation".into(), index_name: "name_idx".into() }]
        );
    }

    #[test]
    fn test_missing_primary_key_is_repaired_first() {
        let cased = cased(ORGANISATION, CaseImplementation::SnakeCase);
        let mut snapshot = empty_snapshot(&["main"]);
        let module = snapshot.modules.get_mut("main").unwrap();
        module.add_table("organisation", TableType::BaseTable);
        module.add_column("organisation", LiveColumn::new("name", "varchar(255)"));

        let plan = plan_sync(&snapshot, &cased, &TableRemoval::Skip);

        assert_eq!(
            operations(&plan, Phase::ReconcileColumns)[0],
            DdlOperation::AddPrimaryKey { table: "organisation".into(), column: "id".into() }
        );
    }

    #[test]
    fn test_locking_column_is_repaired() {
        let cased = cased(ORGANISATION, CaseImplementation::SnakeCase);
        let mut snapshot = synced_snapshot(&cased, &["main"]);
        let columns = snapshot
            .modules
            .get_mut("main")
            .unwrap()
            .columns
            .get_mut("organisation")
            .unwrap();
        columns.retain(|c| c.name != "last_updated");
        columns.push(LiveColumn::new("last_updated", "timestamp").nullable(false));

        let plan = plan_sync(&snapshot, &cased, &TableRemoval::Skip);

        assert_eq!(
            operations(&plan, Phase::ReconcileColumns),
            vec![DdlOperation::ModifyColumn {
                table: "organisation".into(),
                column: ColumnSpec::locking_constraint("last_updated"),
                mismatches: vec![ColumnProperty::Type, ColumnProperty::Default],
            }]
        );
    }

    #[test]
    fn test_cross_module_relationship_has_column_but_no_constraint() {
        let cased = cased(
            r#"{
                "auditLog": { "module": "audit", "attributes": { "entry": { "type": "text" } } },
                "organisation": { "module": "main", "attributes": { "name": { "type": "varchar", "lengthOrValues": 50 } },
                    "relationships": { "auditLog": ["lastAudit"] } }
            }"#,
            CaseImplementation::SnakeCase,
        );

        let plan = plan_sync(&empty_snapshot(&["main", "audit"]), &cased, &TableRemoval::Skip);

        assert!(operations(&plan, Phase::ReconcileColumns).contains(&DdlOperation::AddColumn {
            table: "organisation".into(),
            column: ColumnSpec::relationship("last_audit"),
        }));
        assert!(plan.phase(Phase::AddForeignKeys).statements.is_empty());

        let modules: Vec<_> = plan
            .phase(Phase::CreateTables)
            .statements
            .iter()
            .map(|s| (s.module_name.as_str(), s.operation.table()))
            .collect();
        assert_eq!(modules, vec![("main", "organisation"), ("audit", "audit_log")]);
    }

    #[test]
    fn test_new_tables_get_indexes_and_foreign_keys() {
        let cased = cased(PEOPLE, CaseImplementation::SnakeCase);
        let plan = plan_sync(&empty_snapshot(&["main"]), &cased, &TableRemoval::Skip);

        assert_eq!(operations(&plan, Phase::ReconcileIndexes).len(), 1);
        assert_eq!(
            operations(&plan, Phase::AddForeignKeys),
            vec![DdlOperation::AddForeignKey {
                constraint: ForeignKeyConstraint::new("person_account", "organisation", "employer_organisation"),
                primary_key: "id".into(),
            }]
        );
    }

    #[test]
    fn test_relationships_joining_to_the_same_text_get_distinct_constraints() {
        let cased = cased(
            r#"{
                "org": { "module": "main", "attributes": { "name": { "type": "varchar" } } },
                "orgUnit": { "module": "main", "attributes": { "name": { "type": "varchar" } } },
                "person": { "module": "main", "attributes": { "name": { "type": "varchar" } },
                    "relationships": { "org": ["unitHead"], "orgUnit": ["head"] } }
            }"#,
            CaseImplementation::SnakeCase,
        );
        let plan = plan_sync(&empty_snapshot(&["main"]), &cased, &TableRemoval::Skip);

        let names: HashSet<String> = operations(&plan, Phase::AddForeignKeys)
            .into_iter()
            .map(|operation| match operation {
                DdlOperation::AddForeignKey { constraint, .. } => constraint.constraint_name,
                other => panic!("unexpected operation {:?}", other),
            })
            .collect();
        assert_eq!(names.len(), 2);

        // Once both exist, neither is mistaken for the other
        let synced = synced_snapshot(&cased, &["main"]);
        assert!(plan_sync(&synced, &cased, &TableRemoval::Skip).is_empty());
    }

    fn snapshot_with_unknown_tables() -> SchemaSnapshot {
        let mut snapshot = empty_snapshot(&["main"]);
        let module = snapshot.modules.get_mut("main").unwrap();
        module.add_table("legacy", TableType::BaseTable);
        module.add_table("old_report", TableType::View);
        module.add_table("scratch", TableType::BaseTable);
        snapshot
    }

    #[test]
    fn test_removal_candidates() {
        let cased = cased(ORGANISATION, CaseImplementation::SnakeCase);
        let names: Vec<_> = removal_candidates(&snapshot_with_unknown_tables(), &cased)
            .into_iter()
            .map(|t| t.name)
            .collect();

        assert_eq!(names, vec!["legacy", "old_report", "scratch"]);
    }

    #[test]
    fn test_skipped_removal_drops_nothing() {
        let cased = cased(ORGANISATION, CaseImplementation::SnakeCase);
        let plan = plan_sync(&snapshot_with_unknown_tables(), &cased, &TableRemoval::Skip);

        assert!(plan.phase(Phase::RemoveTables).statements.is_empty());
    }

    #[test]
    fn test_batched_removal() {
        let cased = cased(ORGANISATION, CaseImplementation::SnakeCase);
        let snapshot = snapshot_with_unknown_tables();
        let removal = TableRemoval::All(removal_candidates(&snapshot, &cased));

        let plan = plan_sync(&snapshot, &cased, &removal);

        assert_eq!(
            operations(&plan, Phase::RemoveTables),
            vec![
                DdlOperation::DropTables { tables: vec!["legacy".into(), "scratch".into()] },
                DdlOperation::DropViews { views: vec!["old_report".into()] },
            ]
        );
    }

    #[test]
    fn test_one_by_one_removal() {
        let cased = cased(ORGANISATION, CaseImplementation::SnakeCase);
        let snapshot = snapshot_with_unknown_tables();
        let chosen: Vec<ExistingTable> = removal_candidates(&snapshot, &cased)
            .into_iter()
            .filter(|t| t.name != "scratch")
            .collect();

        let plan = plan_sync(&snapshot, &cased, &TableRemoval::OneByOne(chosen));

        assert_eq!(
            operations(&plan, Phase::RemoveTables),
            vec![
                DdlOperation::DropTables { tables: vec!["legacy".into()] },
                DdlOperation::DropViews { views: vec!["old_report".into()] },
            ]
        );
    }

    #[test]
    fn test_phase_counts() {
        let cased = cased(ORGANISATION, CaseImplementation::SnakeCase);
        let plan = plan_sync(&empty_snapshot(&["main"]), &cased, &TableRemoval::Skip);

        let counts = plan.phase(Phase::ReconcileColumns).counts();
        assert_eq!(counts.get(&ChangeKind::Added), Some(&2));
        assert_eq!(counts.get(&ChangeKind::Removed), None);
    }
}
