use std::collections::HashSet;

use crate::domain::persistence::Persistence;
use crate::domain::tables::{Column, ForeignKeyConstraint, Index, OnDelete, Table};

pub trait MigrationStep: Send {
    fn ctx(&self) -> &'static str;
    fn ddls(self) -> Vec<String>;
}

/// A batch of DDL statements applied in one transaction
#[derive(Debug)]
pub struct DdlStep {
    ctx: &'static str,
    ddls: Vec<String>,
}

impl DdlStep {
    fn create_table(database_schema: &str, table: &Table) -> Self {
        Self {
            ctx: "CREATE TABLE",
            ddls: create_table_ddl(database_schema, table),
        }
    }

    /// Indexes added after a table was first created (e.g. the unique active link index)
    fn ensure_indexes(database_schema: &str, table: &Table) -> Self {
        Self {
            ctx: "CREATE INDEX",
            ddls: table
                .indexes
                .iter()
                .map(|index| create_index_ddl(database_schema, index))
                .collect(),
        }
    }
}

impl MigrationStep for DdlStep {
    fn ctx(&self) -> &'static str {
        self.ctx
    }

    fn ddls(self) -> Vec<String> {
        self.ddls
    }
}

pub struct Migration<P: Persistence> {
    tables: Vec<Table>,
    persistence: P,
}

impl<P: Persistence> Migration<P> {
    pub fn new(tables: Vec<Table>, persistence: P) -> Self {
        Self { tables, persistence }
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        let actual_schema = self.persistence.load().await?;
        let steps = migration_steps(
            self.persistence.database_schema(),
            &self.tables,
            &actual_schema,
        );
        tracing::info!(steps = steps.len(), "applying migration steps");
        self.persistence.apply_migration_steps(steps).await
    }
}

pub fn migration_steps(
    database_schema: &str,
    needed_schema: &[Table],
    actual_schema: &HashSet<String>,
) -> Vec<DdlStep> {
    needed_schema
        .iter()
        .map(|table| {
            if actual_schema.contains(&table.name) {
                DdlStep::ensure_indexes(database_schema, table)
            } else {
                DdlStep::create_table(database_schema, table)
            }
        })
        .filter(|step| !step.ddls.is_empty())
        .collect()
}

fn create_table_ddl(schema: &str, table: &Table) -> Vec<String> {
    let mut columns = Vec::new();
    let mut pk_columns = Vec::new();

    for column in table.columns.iter() {
        columns.push(column_ddl(column));
        if column.primary_key {
            pk_columns.push(format!("\"{}\"", column.name));
        }
    }

    let columns_sql = columns.join(",\n    ");
    let pk_columns_sql = pk_columns.join(",");

    let table_ddl = format!(
        "CREATE TABLE \"{}\".\"{}\" (\n    {},\n    PRIMARY KEY({})\n)",
        schema, table.name, columns_sql, pk_columns_sql
    );

    let mut ddls = vec![table_ddl];

    for fk in table.foreign_keys.iter() {
        ddls.push(create_fk_ddl(schema, fk));
    }

    for index in table.indexes.iter() {
        ddls.push(create_index_ddl(schema, index));
    }

    ddls
}

fn column_ddl(column: &Column) -> String {
    let mut sql = format!("\"{}\" {}", column.name, column.column_type);
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(default_value) = &column.default_value {
        sql.push_str(format!(" DEFAULT {}", default_value).as_str());
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(check) = &column.check {
        sql.push_str(format!(" CHECK ({})", check).as_str());
    }
    sql
}

fn create_fk_ddl(schema: &str, fk: &ForeignKeyConstraint) -> String {
    let on_delete = match fk.on_delete {
        OnDelete::Cascade => "CASCADE",
        OnDelete::SetNull => "SET NULL",
    };
    format!(
        "ALTER TABLE \"{}\".\"{}\" ADD CONSTRAINT \"{}_{}_fkey\" FOREIGN KEY (\"{}\") REFERENCES \"{}\".\"{}\" (\"{}\") ON DELETE {}",
        schema,
        fk.table_name,
        fk.table_name,
        fk.column_name,
        fk.column_name,
        schema,
        fk.referenced_table_name,
        fk.referenced_column_name,
        on_delete
    )
}

fn create_index_ddl(schema: &str, index: &Index) -> String {
    let mut sql = format!(
        "CREATE {}INDEX IF NOT EXISTS \"{}\" ON \"{}\".\"{}\" ({})",
        if index.unique { "UNIQUE " } else { "" },
        index.name,
        schema,
        index.table_name,
        index.columns.join(", ")
    );
    if let Some(predicate) = &index.predicate {
        sql.push_str(format!(" WHERE {}", predicate).as_str());
    }
    sql
}
