//! DML execution: INSERT (multi-row VALUES, INSERT…SELECT, ON DUPLICATE
//! KEY UPDATE), UPDATE with ON UPDATE CURRENT_TIMESTAMP refresh, DELETE
//! with referential actions.
//!
//! Each statement runs in phases per row: evaluate against the current
//! state, validate (NOT NULL, UNIQUE, FK), then mutate with undo
//! logging. Errors abort the statement; the engine rolls the partial
//! writes back to the statement mark.

use std::collections::HashMap;

use crate::ast::{Assignment, Delete, Expr, Insert, InsertSource, Update};
use crate::catalog::{Column, ColumnDefault, Table};
use crate::error::{Error, Result};
use crate::eval::{eval_expr, EvalContext, InsertRowRef, RowScope, Scopes};
use crate::exec::{ExecContext, StatementOutput};
use crate::fk;
use crate::txn::UndoOp;
use crate::value::{self, Value};

/// Executes an INSERT statement.
pub fn insert(ctx: &mut ExecContext, insert: &Insert) -> Result<StatementOutput> {
    let table = ctx.db.table(&insert.table)?;
    let table_name = table.name.clone();
    let target = resolve_insert_columns(table, &insert.columns)?;

    // materialize the source rows up front; INSERT ... SELECT may read
    // the table it writes
    let source_rows: Vec<Vec<Value>> = match &insert.source {
        InsertSource::Values(rows) => {
            let ectx = ctx.eval_ctx();
            let empty = RowScope::empty();
            let scopes = Scopes::root(&empty);
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                ectx.check_cancelled()?;
                let mut values = Vec::with_capacity(row.len());
                for expr in row {
                    values.push(eval_expr(&ectx, &scopes, expr)?);
                }
                out.push(values);
            }
            out
        }
        InsertSource::Select(query) => {
            let ectx = ctx.eval_ctx();
            crate::exec::select::execute_query(&ectx, query, None)?.rows
        }
    };

    let mut affected: u64 = 0;
    for source in source_rows {
        ctx.check_cancelled()?;
        if source.len() != target.len() {
            return Err(Error::Schema(format!(
                "column count doesn't match value count for table '{table_name}' \
                 ({} vs {})",
                target.len(),
                source.len()
            )));
        }
        affected += insert_one(ctx, &table_name, &target, source, &insert.on_duplicate)?;
    }
    log::debug!("insert into {table_name}: {affected} row(s)");
    Ok(StatementOutput::Affected(affected))
}

// target column indices in source order
fn resolve_insert_columns(table: &Table, columns: &[String]) -> Result<Vec<usize>> {
    if columns.is_empty() {
        return Ok((0..table.columns.len()).collect());
    }
    let mut indices = Vec::with_capacity(columns.len());
    for name in columns {
        let (idx, _) = table.column(name)?;
        if indices.contains(&idx) {
            return Err(Error::Schema(format!(
                "column '{name}' specified twice in INSERT"
            )));
        }
        indices.push(idx);
    }
    Ok(indices)
}

fn default_for(column: &Column, now: chrono::NaiveDateTime) -> Value {
    match &column.default {
        Some(ColumnDefault::Literal(v)) => v.clone(),
        Some(ColumnDefault::CurrentTimestamp) => Value::DateTime(now),
        None => Value::Null,
    }
}

// inserts one row; returns the affected count (1, or 2 when the
// duplicate-key update path rewrote an existing row)
fn insert_one(
    ctx: &mut ExecContext,
    table_name: &str,
    target: &[usize],
    source: Vec<Value>,
    on_duplicate: &[Assignment],
) -> Result<u64> {
    // 1. build the full row: targeted columns from the source, the rest
    //    from their defaults
    let table = ctx.db.table(table_name)?;
    let mut values: Vec<Value> = table
        .columns
        .iter()
        .map(|c| default_for(c, ctx.now))
        .collect();
    for (value, &idx) in source.into_iter().zip(target) {
        values[idx] = value;
    }

    // 2. coerce to the declared column types
    for (idx, column) in table.columns.iter().enumerate() {
        let coerced = value::coerce(&values[idx], &column.data_type, &column.name)?;
        values[idx] = coerced;
    }

    // 3. auto-increment: fill from the counter, or advance it past an
    //    explicit value
    let ai = table.auto_increment_column();
    let prior_counter = table.auto_increment_value();
    if let Some(ai_idx) = ai {
        let table = ctx.db.table_mut(table_name)?;
        if values[ai_idx].is_null() {
            let v = table.take_auto_increment();
            values[ai_idx] = Value::Integer(v);
            ctx.txn.record(UndoOp::RestoreAutoIncrement {
                table: table_name.to_string(),
                value: prior_counter,
            });
        } else if let Some(given) = value::to_i64(&values[ai_idx]) {
            table.observe_auto_increment(given);
            if table.auto_increment_value() != prior_counter {
                ctx.txn.record(UndoOp::RestoreAutoIncrement {
                    table: table_name.to_string(),
                    value: prior_counter,
                });
            }
        }
    }

    // 4. NOT NULL
    let table = ctx.db.table(table_name)?;
    for (idx, column) in table.columns.iter().enumerate() {
        if !column.nullable && values[idx].is_null() {
            return Err(Error::Constraint(format!(
                "column '{}' of table '{table_name}' cannot be NULL",
                column.name
            )));
        }
    }

    // 5. UNIQUE / PRIMARY KEY; a conflict either fails or goes down the
    //    ON DUPLICATE KEY UPDATE path
    if let Some((conflict_pos, conflict_col)) = find_unique_conflict(table, &values, None) {
        if on_duplicate.is_empty() {
            let column = &table.columns[conflict_col];
            return Err(Error::Constraint(format!(
                "duplicate entry '{}' for unique column '{}.{}'",
                values[conflict_col].to_text(),
                table_name,
                column.name
            )));
        }
        duplicate_key_update(ctx, table_name, conflict_pos, values, on_duplicate)?;
        return Ok(2);
    }

    // 6. referential integrity, then the write
    fk::check_outgoing(ctx.db, table_name, &values)?;
    let pos = ctx.db.table_mut(table_name)?.append_row(values);
    ctx.txn.record(UndoOp::RetractInsert {
        table: table_name.to_string(),
        pos,
    });
    Ok(1)
}

fn find_unique_conflict(
    table: &Table,
    values: &[Value],
    skip: Option<usize>,
) -> Option<(usize, usize)> {
    for idx in 0..table.columns.len() {
        if !table.is_unique_column(idx) || values[idx].is_null() {
            continue;
        }
        if let Some(pos) = table.find_matching_row(idx, &values[idx], skip) {
            return Some((pos, idx));
        }
    }
    None
}

// the existing conflicting row is updated with the assignments;
// VALUES(col) inside them sees the rejected insert row
fn duplicate_key_update(
    ctx: &mut ExecContext,
    table_name: &str,
    pos: usize,
    rejected: Vec<Value>,
    assignments: &[Assignment],
) -> Result<()> {
    let table = ctx.db.table(table_name)?;
    let column_names: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
    let assigned = resolve_assignments(table, assignments)?;

    let current = table
        .live_row(pos)
        .ok_or_else(|| Error::Schema(format!("lost conflicting row in '{table_name}'")))?
        .to_vec();

    let mut new_values = current.clone();
    {
        let ectx = EvalContext {
            db: ctx.db,
            now: ctx.now,
            cancel: ctx.cancel,
            insert_row: Some(InsertRowRef {
                columns: &column_names,
                values: &rejected,
            }),
        };
        let row_scope = RowScope::single(table_name, column_names.clone(), current.clone());
        let scopes = Scopes::root(&row_scope);
        for (col_idx, expr) in &assigned {
            let raw = eval_expr(&ectx, &scopes, expr)?;
            let column = &ectx.db.table(table_name)?.columns[*col_idx];
            new_values[*col_idx] = value::coerce(&raw, &column.data_type, &column.name)?;
        }
    }

    apply_row_update(ctx, table_name, pos, new_values, &assigned)?;
    Ok(())
}

fn resolve_assignments<'a>(
    table: &Table,
    assignments: &'a [Assignment],
) -> Result<Vec<(usize, &'a Expr)>> {
    let mut out = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let (idx, _) = table.column(&assignment.column)?;
        out.push((idx, &assignment.value));
    }
    Ok(out)
}

// validates and writes one updated row, refreshing ON UPDATE
// CURRENT_TIMESTAMP columns that were not explicitly assigned
fn apply_row_update(
    ctx: &mut ExecContext,
    table_name: &str,
    pos: usize,
    mut new_values: Vec<Value>,
    assigned: &[(usize, &Expr)],
) -> Result<()> {
    let table = ctx.db.table(table_name)?;
    for (idx, column) in table.columns.iter().enumerate() {
        if column.on_update_current_timestamp && !assigned.iter().any(|(i, _)| *i == idx) {
            new_values[idx] =
                value::coerce(&Value::DateTime(ctx.now), &column.data_type, &column.name)?;
        }
    }
    for (idx, column) in table.columns.iter().enumerate() {
        if !column.nullable && new_values[idx].is_null() {
            return Err(Error::Constraint(format!(
                "column '{}' of table '{table_name}' cannot be NULL",
                column.name
            )));
        }
    }
    if let Some((_, conflict_col)) = find_unique_conflict(table, &new_values, Some(pos)) {
        return Err(Error::Constraint(format!(
            "duplicate entry '{}' for unique column '{}.{}'",
            new_values[conflict_col].to_text(),
            table_name,
            table.columns[conflict_col].name
        )));
    }
    fk::check_outgoing(ctx.db, table_name, &new_values)?;

    let replaced = ctx.db.table_mut(table_name)?.replace_row(pos, new_values)?;
    ctx.txn.record(UndoOp::RestoreUpdate {
        table: table_name.to_string(),
        pos,
        values: replaced,
    });
    Ok(())
}

/// Executes an UPDATE statement.
pub fn update(ctx: &mut ExecContext, update: &Update) -> Result<StatementOutput> {
    let table = ctx.db.table(&update.table)?;
    let table_name = table.name.clone();
    let column_names: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
    let assigned = resolve_assignments(table, &update.assignments)?;

    // key columns whose changes must propagate through incoming FKs
    let key_columns: Vec<usize> = (0..table.columns.len())
        .filter(|&i| table.is_unique_column(i))
        .collect();

    let positions = matching_positions(ctx, &table_name, &column_names, update.selection.as_ref())?;

    let mut parent_changes: HashMap<String, Vec<(Value, Value)>> = HashMap::new();
    let mut affected: u64 = 0;

    for pos in positions {
        ctx.check_cancelled()?;
        let Some(current) = ctx
            .db
            .table(&table_name)?
            .live_row(pos)
            .map(<[Value]>::to_vec)
        else {
            continue;
        };

        // expressions see the row as it is right now
        let mut new_values = current.clone();
        {
            let ectx = ctx.eval_ctx();
            let row_scope =
                RowScope::single(&table_name, column_names.clone(), current.clone());
            let scopes = Scopes::root(&row_scope);
            for (col_idx, expr) in &assigned {
                let raw = eval_expr(&ectx, &scopes, expr)?;
                let column = &ectx.db.table(&table_name)?.columns[*col_idx];
                new_values[*col_idx] = value::coerce(&raw, &column.data_type, &column.name)?;
            }
        }

        for &key_idx in &key_columns {
            if value::equal(&current[key_idx], &new_values[key_idx]) != Some(true) {
                parent_changes
                    .entry(column_names[key_idx].clone())
                    .or_default()
                    .push((current[key_idx].clone(), new_values[key_idx].clone()));
            }
        }

        apply_row_update(ctx, &table_name, pos, new_values, &assigned)?;
        affected += 1;
    }

    let mut visited = vec![table_name.to_lowercase()];
    fk::apply_update_actions(
        ctx.db,
        ctx.txn,
        ctx.cancel,
        ctx.now,
        &table_name,
        &parent_changes,
        &mut visited,
    )?;

    log::debug!("update {table_name}: {affected} row(s)");
    Ok(StatementOutput::Affected(affected))
}

/// Executes a DELETE statement.
pub fn delete(ctx: &mut ExecContext, delete: &Delete) -> Result<StatementOutput> {
    let table = ctx.db.table(&delete.table)?;
    let table_name = table.name.clone();
    let column_names: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();

    let positions = matching_positions(ctx, &table_name, &column_names, delete.selection.as_ref())?;

    let mut removed = Vec::with_capacity(positions.len());
    for pos in &positions {
        ctx.check_cancelled()?;
        let values = ctx.db.table_mut(&table_name)?.kill_row(*pos)?;
        ctx.txn.record(UndoOp::ReviveDelete {
            table: table_name.to_string(),
            pos: *pos,
        });
        removed.push(values);
    }

    let mut visited = vec![table_name.to_lowercase()];
    fk::apply_delete_actions(
        ctx.db,
        ctx.txn,
        ctx.cancel,
        ctx.now,
        &table_name,
        &removed,
        &mut visited,
    )?;

    log::debug!("delete from {table_name}: {} row(s)", removed.len());
    Ok(StatementOutput::Affected(removed.len() as u64))
}

// scan phase: row positions where the predicate holds
fn matching_positions(
    ctx: &ExecContext,
    table_name: &str,
    column_names: &[String],
    selection: Option<&Expr>,
) -> Result<Vec<usize>> {
    let ectx = ctx.eval_ctx();
    let table = ectx.db.table(table_name)?;
    let mut positions = Vec::new();
    for (pos, row) in table.live_rows() {
        ectx.check_cancelled()?;
        let keep = match selection {
            Some(predicate) => {
                let row_scope =
                    RowScope::single(table_name, column_names.to_vec(), row.to_vec());
                let scopes = Scopes::root(&row_scope);
                eval_expr(&ectx, &scopes, predicate)?.as_bool() == Some(true)
            }
            None => true,
        };
        if keep {
            positions.push(pos);
        }
    }
    Ok(positions)
}
