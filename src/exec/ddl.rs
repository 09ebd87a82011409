//! DDL execution and catalog introspection (SHOW TABLES, SHOW INDEX,
//! DESCRIBE).
//!
//! DDL is undo-logged like DML: CREATE TABLE records its drop, DROP and
//! TRUNCATE carry the full old table, so ROLLBACK restores the catalog
//! exactly.

use crate::ast::{self, CreateTable, TableConstraint};
use crate::catalog::{
    Column, Database, ForeignKey, IndexKind, ReferentialAction, Table, TableIndex,
};
use crate::error::{Error, Result};
use crate::exec::{ExecContext, RowSet, StatementOutput};
use crate::fk;
use crate::txn::UndoOp;
use crate::value::Value;

/// Executes CREATE TABLE.
pub fn create_table(ctx: &mut ExecContext, create: &CreateTable) -> Result<StatementOutput> {
    if ctx.db.contains_table(&create.name) {
        if create.if_not_exists {
            return Ok(StatementOutput::Status(format!(
                "Table '{}' already exists, skipped",
                create.name
            )));
        }
        return Err(Error::Schema(format!(
            "table '{}' already exists",
            create.name
        )));
    }

    let table = build_table(create)?;
    let name = table.name.clone();
    ctx.db.create_table(table)?;
    ctx.txn.record(UndoOp::DropCreatedTable { name: name.clone() });
    log::debug!("created table {name}");
    Ok(StatementOutput::Status(format!("Table '{name}' created")))
}

fn build_table(create: &CreateTable) -> Result<Table> {
    let mut columns = Vec::with_capacity(create.columns.len());
    for def in &create.columns {
        let mut column = Column::new(&def.name, def.data_type.clone());
        column.nullable = def.nullable.unwrap_or(true);
        column.unique = def.unique;
        column.primary_key = def.primary_key;
        column.auto_increment = def.auto_increment;
        column.default = def.default.clone();
        column.on_update_current_timestamp = def.on_update_current_timestamp;
        if column.primary_key {
            column.nullable = false;
        }
        columns.push(column);
    }

    let mut table = Table::new(&create.name, columns);
    let mut extra_indexes: Vec<TableIndex> = Vec::new();

    for constraint in &create.constraints {
        match constraint {
            TableConstraint::PrimaryKey { columns } => {
                if let [single] = columns.as_slice() {
                    let idx = table
                        .column_index(single)
                        .ok_or_else(|| Error::unknown_column(&create.name, single))?;
                    table.columns[idx].primary_key = true;
                    table.columns[idx].nullable = false;
                } else {
                    // composite keys are recorded but enforce nothing
                    extra_indexes.push(TableIndex::new(
                        "PRIMARY",
                        columns.clone(),
                        true,
                        IndexKind::Normal,
                    ));
                }
            }
            TableConstraint::Unique { name, columns } => {
                if let [single] = columns.as_slice() {
                    let idx = table
                        .column_index(single)
                        .ok_or_else(|| Error::unknown_column(&create.name, single))?;
                    table.columns[idx].unique = true;
                } else {
                    let index_name = name.clone().unwrap_or_else(|| columns.join("_"));
                    extra_indexes.push(TableIndex::new(
                        &index_name,
                        columns.clone(),
                        true,
                        IndexKind::Normal,
                    ));
                }
            }
            TableConstraint::Index { name, columns } => {
                let index_name = name.clone().unwrap_or_else(|| columns.join("_"));
                extra_indexes.push(TableIndex::new(
                    &index_name,
                    columns.clone(),
                    false,
                    IndexKind::Normal,
                ));
            }
            TableConstraint::Fulltext { name, columns } => {
                let index_name = name.clone().unwrap_or_else(|| columns.join("_"));
                extra_indexes.push(TableIndex::new(
                    &index_name,
                    columns.clone(),
                    false,
                    IndexKind::Fulltext,
                ));
            }
            TableConstraint::ForeignKey {
                name,
                columns,
                ref_table,
                ref_columns,
                on_delete,
                on_update,
            } => {
                let ([child], [parent]) = (columns.as_slice(), ref_columns.as_slice()) else {
                    return Err(Error::Schema(format!(
                        "composite foreign keys are not supported (table '{}')",
                        create.name
                    )));
                };
                let fk_name = name.clone().unwrap_or_else(|| {
                    format!("fk_{}_{}", create.name.to_lowercase(), child.to_lowercase())
                });
                table.foreign_keys.push(ForeignKey {
                    name: fk_name,
                    column: child.clone(),
                    ref_table: ref_table.clone(),
                    ref_column: parent.clone(),
                    on_delete: on_delete.unwrap_or(ReferentialAction::Restrict),
                    on_update: on_update.unwrap_or(ReferentialAction::Restrict),
                });
            }
            TableConstraint::Check => {}
        }
    }

    // live indexes backing PRIMARY KEY and UNIQUE columns
    let auto: Vec<(String, String, bool)> = table
        .columns
        .iter()
        .filter(|c| c.primary_key || c.unique)
        .map(|c| {
            let index_name = if c.primary_key {
                "PRIMARY".to_string()
            } else {
                c.name.clone()
            };
            (index_name, c.name.clone(), true)
        })
        .collect();
    for (index_name, column, unique) in auto {
        if !table.indexes.contains_key(&index_name.to_lowercase()) {
            table.add_index(TableIndex::new(
                &index_name,
                vec![column],
                unique,
                IndexKind::Normal,
            ))?;
        }
    }
    // and one per FK child column, the way MySQL backs constraints
    let fk_indexes: Vec<(String, String)> = table
        .foreign_keys
        .iter()
        .map(|fk| (fk.name.clone(), fk.column.clone()))
        .collect();
    for (index_name, column) in fk_indexes {
        let covered = table
            .indexes
            .values()
            .any(|ix| ix.columns.len() == 1 && ix.columns[0].eq_ignore_ascii_case(&column));
        if !covered && !table.indexes.contains_key(&index_name.to_lowercase()) {
            table.add_index(TableIndex::new(
                &index_name,
                vec![column],
                false,
                IndexKind::Normal,
            ))?;
        }
    }
    for index in extra_indexes {
        table.add_index(index)?;
    }
    Ok(table)
}

/// Executes CREATE [UNIQUE|FULLTEXT] INDEX.
pub fn create_index(ctx: &mut ExecContext, create: &ast::CreateIndex) -> Result<StatementOutput> {
    let table = ctx.db.table(&create.table)?;
    let table_name = table.name.clone();
    for column in &create.columns {
        table.column(column)?;
    }

    // a unique index over one column must already hold on the data
    if create.unique && create.columns.len() == 1 {
        let (col_idx, column) = table.column(&create.columns[0])?;
        let mut seen = std::collections::HashSet::new();
        for (_, row) in table.live_rows() {
            if let Some(key) = row[col_idx].index_key()
                && !seen.insert(key)
            {
                return Err(Error::Constraint(format!(
                    "cannot create unique index '{}': duplicate entry '{}' in '{}.{}'",
                    create.name,
                    row[col_idx].to_text(),
                    table_name,
                    column.name
                )));
            }
        }
    }

    let kind = if create.fulltext {
        IndexKind::Fulltext
    } else {
        IndexKind::Normal
    };
    let index = TableIndex::new(&create.name, create.columns.clone(), create.unique, kind);
    ctx.db.table_mut(&table_name)?.add_index(index)?;
    ctx.txn.record(UndoOp::DropCreatedIndex {
        table: table_name.clone(),
        name: create.name.clone(),
    });
    Ok(StatementOutput::Status(format!(
        "Index '{}' created on '{table_name}'",
        create.name
    )))
}

/// Executes DROP TABLE, ordering multi-table drops children-first.
pub fn drop_tables(
    ctx: &mut ExecContext,
    names: &[String],
    if_exists: bool,
) -> Result<StatementOutput> {
    let mut existing = Vec::new();
    for name in names {
        if ctx.db.contains_table(name) {
            existing.push(name.clone());
        } else if !if_exists {
            return Err(Error::unknown_table(name));
        }
    }

    let ordered = fk::drop_order(ctx.db, &existing)?;
    let mut dropped = 0usize;
    for name in &ordered {
        fk::check_drop(ctx.db, &existing, name)?;
        let table = ctx.db.remove_table(name)?;
        ctx.txn.record(UndoOp::RestoreTable {
            table: Box::new(table),
        });
        dropped += 1;
    }
    log::debug!("dropped {dropped} table(s)");
    Ok(StatementOutput::Status(format!("Dropped {dropped} table(s)")))
}

/// Executes DROP INDEX.
pub fn drop_index(ctx: &mut ExecContext, name: &str, table: &str) -> Result<StatementOutput> {
    let table_name = ctx.db.table(table)?.name.clone();
    let index = ctx.db.table_mut(&table_name)?.drop_index(name)?;
    ctx.txn.record(UndoOp::RestoreIndex {
        table: table_name.clone(),
        index,
    });
    Ok(StatementOutput::Status(format!(
        "Index '{name}' dropped from '{table_name}'"
    )))
}

/// Executes TRUNCATE TABLE: all rows go, the counter resets to 1, and
/// no referential actions fire.
pub fn truncate_table(ctx: &mut ExecContext, name: &str) -> Result<StatementOutput> {
    fk::check_truncate(ctx.db, name)?;
    let table = ctx.db.table_mut(name)?;
    let original = table.clone();
    table.clear();
    ctx.txn.record(UndoOp::RestoreTable {
        table: Box::new(original),
    });
    Ok(StatementOutput::Status(format!("Table '{name}' truncated")))
}

// --- introspection ---

/// SHOW TABLES.
#[must_use]
pub fn show_tables(db: &Database) -> StatementOutput {
    StatementOutput::Rows(RowSet {
        columns: vec!["Tables".to_string()],
        rows: db
            .table_names()
            .into_iter()
            .map(|n| vec![Value::Text(n)])
            .collect(),
    })
}

/// SHOW COLUMNS FROM / DESCRIBE, in SHOW FULL FIELDS shape.
pub fn show_columns(db: &Database, table: &str) -> Result<StatementOutput> {
    let description = db.table(table)?.describe();
    let rows = description
        .columns
        .into_iter()
        .map(|c| {
            vec![
                Value::Text(c.field),
                Value::Text(c.sql_type),
                Value::Text(c.null),
                Value::Text(c.key),
                c.default.map_or(Value::Null, Value::Text),
                Value::Text(c.extra),
            ]
        })
        .collect();
    Ok(StatementOutput::Rows(RowSet {
        columns: vec![
            "Field".to_string(),
            "Type".to_string(),
            "Null".to_string(),
            "Key".to_string(),
            "Default".to_string(),
            "Extra".to_string(),
        ],
        rows,
    }))
}

/// SHOW INDEX FROM: one row per indexed column, parsed-but-inactive
/// indexes included.
pub fn show_indexes(db: &Database, table: &str) -> Result<StatementOutput> {
    let t = db.table(table)?;
    let mut rows = Vec::new();
    for index in t.indexes.values() {
        for (seq, column) in index.columns.iter().enumerate() {
            rows.push(vec![
                Value::Text(t.name.clone()),
                Value::Integer(i64::from(!index.unique)),
                Value::Text(index.name.clone()),
                Value::Integer(seq as i64 + 1),
                Value::Text(column.clone()),
                Value::Text(
                    match index.kind {
                        IndexKind::Normal => "BTREE",
                        IndexKind::Fulltext => "FULLTEXT",
                    }
                    .to_string(),
                ),
            ]);
        }
    }
    Ok(StatementOutput::Rows(RowSet {
        columns: vec![
            "Table".to_string(),
            "Non_unique".to_string(),
            "Key_name".to_string(),
            "Seq_in_index".to_string(),
            "Column_name".to_string(),
            "Index_type".to_string(),
        ],
        rows,
    }))
}
