//! MySQL DDL generator
//!
//! Renders planned [`DdlOperation`]s as SQL statements.

use crate::model::{IndexChoice, IndexDefinition};
use crate::schema::diff::{PlannedStatement, SyncPlan};
use crate::schema::types::{ColumnDefault, ColumnSpec, DdlOperation};
use crate::utils::naming::{quote_identifier as q, quote_literal};

/// Render one operation as a MySQL statement
pub fn generate_sql(operation: &DdlOperation) -> String {
    match operation {
        DdlOperation::DropTables { tables } => format!("DROP TABLE IF EXISTS {}", quote_list(tables)),
        DdlOperation::DropViews { views } => format!("DROP VIEW IF EXISTS {}", quote_list(views)),
        DdlOperation::CreateTable { table, primary_key } => generate_create_table_sql(table, primary_key),
        DdlOperation::DropForeignKey { table, constraint_name } => {
            format!("ALTER TABLE {} DROP FOREIGN KEY {}", q(table), q(constraint_name))
        }
        DdlOperation::DropColumn { table, column } => {
            format!("ALTER TABLE {} DROP COLUMN {}", q(table), q(column))
        }
        DdlOperation::AddPrimaryKey { table, column } => format!(
            "ALTER TABLE {} ADD COLUMN {} INT NOT NULL AUTO_INCREMENT FIRST, ADD PRIMARY KEY ({})",
            q(table),
            q(column),
            q(column)
        ),
        DdlOperation::AddColumn { table, column } => {
            format!("ALTER TABLE {} ADD COLUMN {}", q(table), column_definition(column))
        }
        DdlOperation::ModifyColumn { table, column, .. } => {
            format!("ALTER TABLE {} MODIFY COLUMN {}", q(table), column_definition(column))
        }
        DdlOperation::AddIndex { table, index } => generate_add_index_sql(table, index),
        DdlOperation::DropIndex { table, index_name } => {
            format!("ALTER TABLE {} DROP INDEX {}", q(table), q(index_name))
        }
        DdlOperation::AddForeignKey { constraint, primary_key } => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE SET NULL ON UPDATE CASCADE",
            q(&constraint.table_name),
            q(&constraint.constraint_name),
            q(&constraint.column_name),
            q(&constraint.related_table),
            q(primary_key)
        ),
    }
}

/// Render a planned statement
pub fn generate_statement_sql(statement: &PlannedStatement) -> String {
    generate_sql(&statement.operation)
}

/// Render a whole plan, in execution order
pub fn generate_plan_sql(plan: &SyncPlan) -> Vec<String> {
    plan.statements().map(|(_, s)| generate_statement_sql(s)).collect()
}

fn generate_create_table_sql(table: &str, primary_key: &str) -> String {
    format!(
        "CREATE TABLE {} ({} INT NOT NULL AUTO_INCREMENT, PRIMARY KEY ({}))",
        q(table),
        q(primary_key),
        q(primary_key)
    )
}

fn generate_add_index_sql(table: &str, index: &IndexDefinition) -> String {
    let name = q(&index.index_name);
    let column = q(&index.attribute);

    match index.index_choice {
        IndexChoice::Index => format!(
            "ALTER TABLE {} ADD INDEX {} ({}) USING {}",
            q(table),
            name,
            column,
            index.index_type.as_sql()
        ),
        IndexChoice::Unique => format!(
            "ALTER TABLE {} ADD UNIQUE {} ({}) USING {}",
            q(table),
            name,
            column,
            index.index_type.as_sql()
        ),
        // Spatial and fulltext indexes take no USING clause
        IndexChoice::Spatial => format!("ALTER TABLE {} ADD SPATIAL {} ({})", q(table), name, column),
        IndexChoice::Fulltext => format!("ALTER TABLE {} ADD FULLTEXT {} ({})", q(table), name, column),
    }
}

/// `` `name` type(length) [NOT NULL] [DEFAULT ...] ``
pub fn column_definition(column: &ColumnSpec) -> String {
    let mut sql = format!("{} {}", q(&column.name), column.column_type);

    if let Some(length) = column.length_or_values.as_deref().filter(|l| !l.is_empty()) {
        sql.push_str(&format!("({})", length));
    }

    if !column.allow_null {
        sql.push_str(" NOT NULL");
    }

    match &column.default {
        ColumnDefault::CurrentTimestamp => sql.push_str(" DEFAULT CURRENT_TIMESTAMP"),
        ColumnDefault::Literal(value) => {
            sql.push_str(" DEFAULT ");
            sql.push_str(&quote_literal(value));
        }
        ColumnDefault::None if column.allow_null => sql.push_str(" DEFAULT NULL"),
        ColumnDefault::None => {}
    }

    sql
}

fn quote_list(names: &[String]) -> String {
    names.iter().map(|n| q(n)).collect::<Vec<_>>().join(", ")
}
