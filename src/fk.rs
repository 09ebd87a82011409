//! Referential integrity: parent-existence checks on child writes and
//! the ON DELETE / ON UPDATE actions on parent writes.
//!
//! Cascades recurse through the incoming-FK edges of the catalog. Each
//! top-level DML may visit a table at most once; meeting a table twice
//! means the FK graph loops under this statement and fails with
//! [`Error::ForeignKeyCycle`].

use chrono::NaiveDateTime;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::HashMap;

use crate::catalog::{ColumnDefault, Database, ForeignKey, ReferentialAction};
use crate::error::{Error, Result};
use crate::exec::CancelFlag;
use crate::txn::{Transaction, UndoOp};
use crate::value::{self, Value};

/// Verifies every outgoing foreign key of a new or updated child row:
/// non-null FK values must have a parent row.
pub fn check_outgoing(db: &Database, table_name: &str, values: &[Value]) -> Result<()> {
    let table = db.table(table_name)?;
    for fk in &table.foreign_keys {
        let (child_idx, _) = table.column(&fk.column)?;
        let v = &values[child_idx];
        if v.is_null() {
            continue;
        }
        let parent = db.table(&fk.ref_table)?;
        let (parent_idx, _) = parent.column(&fk.ref_column)?;
        if parent.find_matching_row(parent_idx, v, None).is_none() {
            return Err(Error::ForeignKey(format!(
                "no parent row in '{}' for value '{}' of '{}.{}' (constraint '{}')",
                fk.ref_table,
                v.to_text(),
                table.name,
                fk.column,
                fk.name
            )));
        }
    }
    Ok(())
}

fn enter_table(visited: &mut Vec<String>, name: &str) -> Result<()> {
    let key = name.to_lowercase();
    if visited.contains(&key) {
        return Err(Error::ForeignKeyCycle(name.to_string()));
    }
    visited.push(key);
    Ok(())
}

// child positions whose FK column holds any of the given parent values
fn matching_children(
    db: &Database,
    child_table: &str,
    child_column: &str,
    parent_values: &[Value],
) -> Result<Vec<usize>> {
    let child = db.table(child_table)?;
    let (col_idx, _) = child.column(child_column)?;
    let mut positions = Vec::new();
    for (pos, row) in child.live_rows() {
        let v = &row[col_idx];
        if v.is_null() {
            continue;
        }
        if parent_values
            .iter()
            .any(|p| value::equal(v, p) == Some(true))
        {
            positions.push(pos);
        }
    }
    Ok(positions)
}

fn set_null_violation(child: &str, column: &str, fk: &ForeignKey) -> Error {
    Error::ForeignKey(format!(
        "cannot SET NULL on NOT NULL column '{child}.{column}' (constraint '{}')",
        fk.name
    ))
}

// the replacement value for SetNull/SetDefault actions
fn replacement_value(
    db: &Database,
    child_table: &str,
    fk: &ForeignKey,
    action: ReferentialAction,
    now: NaiveDateTime,
) -> Result<Value> {
    let child = db.table(child_table)?;
    let (_, column) = child.column(&fk.column)?;
    match action {
        ReferentialAction::SetNull => {
            if !column.nullable {
                return Err(set_null_violation(child_table, &fk.column, fk));
            }
            Ok(Value::Null)
        }
        ReferentialAction::SetDefault => match &column.default {
            Some(ColumnDefault::Literal(v)) => {
                value::coerce(v, &column.data_type, &column.name)
            }
            Some(ColumnDefault::CurrentTimestamp) => Ok(Value::DateTime(now)),
            None => Err(Error::ForeignKey(format!(
                "cannot SET DEFAULT on '{child_table}.{}': no default declared (constraint '{}')",
                fk.column, fk.name
            ))),
        },
        _ => Err(Error::ForeignKey(format!(
            "internal: no replacement for action {}",
            action.sql_name()
        ))),
    }
}

// rewrite the FK column of the given child rows, undo-logged
fn rewrite_children(
    db: &mut Database,
    txn: &mut Transaction,
    child_table: &str,
    fk: &ForeignKey,
    positions: &[usize],
    new_value: &Value,
) -> Result<Vec<(Value, Value)>> {
    let child = db.table_mut(child_table)?;
    let (col_idx, _) = child.column(&fk.column)?;
    let mut changes = Vec::with_capacity(positions.len());
    for &pos in positions {
        let Some(row) = child.live_row(pos) else {
            continue;
        };
        let old_value = row[col_idx].clone();
        let mut new_row = row.to_vec();
        new_row[col_idx] = new_value.clone();
        let old = child.replace_row(pos, new_row)?;
        txn.record(UndoOp::RestoreUpdate {
            table: child_table.to_string(),
            pos,
            values: old,
        });
        changes.push((old_value, new_value.clone()));
    }
    Ok(changes)
}

/// Applies the ON DELETE actions after rows of `table` were removed.
/// `removed` holds the full value vectors of the deleted rows.
pub fn apply_delete_actions(
    db: &mut Database,
    txn: &mut Transaction,
    cancel: &CancelFlag,
    now: NaiveDateTime,
    table: &str,
    removed: &[Vec<Value>],
    visited: &mut Vec<String>,
) -> Result<()> {
    if removed.is_empty() {
        return Ok(());
    }
    for (child_name, fk) in db.incoming_foreign_keys(table) {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let parent = db.table(table)?;
        let (ref_idx, _) = parent.column(&fk.ref_column)?;
        let parent_values: Vec<Value> = removed
            .iter()
            .map(|row| row[ref_idx].clone())
            .filter(|v| !v.is_null())
            .collect();
        if parent_values.is_empty() {
            continue;
        }
        let positions = matching_children(db, &child_name, &fk.column, &parent_values)?;
        if positions.is_empty() {
            continue;
        }
        match fk.on_delete {
            ReferentialAction::Restrict => {
                return Err(Error::ForeignKey(format!(
                    "cannot delete from '{table}': rows in '{child_name}' still reference it \
                     (constraint '{}')",
                    fk.name
                )));
            }
            ReferentialAction::Cascade => {
                enter_table(visited, &child_name)?;
                let child = db.table_mut(&child_name)?;
                let mut child_removed = Vec::with_capacity(positions.len());
                for &pos in &positions {
                    let values = child.kill_row(pos)?;
                    txn.record(UndoOp::ReviveDelete {
                        table: child_name.clone(),
                        pos,
                    });
                    child_removed.push(values);
                }
                apply_delete_actions(db, txn, cancel, now, &child_name, &child_removed, visited)?;
            }
            action @ (ReferentialAction::SetNull | ReferentialAction::SetDefault) => {
                let new_value = replacement_value(db, &child_name, &fk, action, now)?;
                if let ReferentialAction::SetDefault = action
                    && !new_value.is_null()
                {
                    // the default must itself reference a surviving parent
                    let parent = db.table(table)?;
                    let (parent_idx, _) = parent.column(&fk.ref_column)?;
                    if parent.find_matching_row(parent_idx, &new_value, None).is_none() {
                        return Err(Error::ForeignKey(format!(
                            "SET DEFAULT on '{child_name}.{}' points at a missing parent row \
                             in '{table}' (constraint '{}')",
                            fk.column, fk.name
                        )));
                    }
                }
                rewrite_children(db, txn, &child_name, &fk, &positions, &new_value)?;
            }
        }
    }
    Ok(())
}

/// Applies the ON UPDATE actions after key columns of `table` changed.
/// `changes` maps a parent column name to its `(old, new)` value pairs.
pub fn apply_update_actions(
    db: &mut Database,
    txn: &mut Transaction,
    cancel: &CancelFlag,
    now: NaiveDateTime,
    table: &str,
    changes: &HashMap<String, Vec<(Value, Value)>>,
    visited: &mut Vec<String>,
) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    for (child_name, fk) in db.incoming_foreign_keys(table) {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let Some(pairs) = changes
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(&fk.ref_column))
            .map(|(_, pairs)| pairs)
        else {
            continue;
        };
        let moved: Vec<(Value, Value)> = pairs
            .iter()
            .filter(|(old, new)| !old.is_null() && value::equal(old, new) != Some(true))
            .cloned()
            .collect();
        if moved.is_empty() {
            continue;
        }
        let old_values: Vec<Value> = moved.iter().map(|(old, _)| old.clone()).collect();
        let positions = matching_children(db, &child_name, &fk.column, &old_values)?;
        if positions.is_empty() {
            continue;
        }
        match fk.on_update {
            ReferentialAction::Restrict => {
                return Err(Error::ForeignKey(format!(
                    "cannot update '{table}.{}': rows in '{child_name}' still reference it \
                     (constraint '{}')",
                    fk.ref_column, fk.name
                )));
            }
            ReferentialAction::Cascade => {
                enter_table(visited, &child_name)?;
                let mut child_changes: HashMap<String, Vec<(Value, Value)>> = HashMap::new();
                for (old, new) in &moved {
                    // only the children holding this exact old value move
                    let matching = matching_children(db, &child_name, &fk.column, &[old.clone()])?;
                    if matching.is_empty() {
                        continue;
                    }
                    let rewritten =
                        rewrite_children(db, txn, &child_name, &fk, &matching, new)?;
                    child_changes
                        .entry(fk.column.clone())
                        .or_default()
                        .extend(rewritten);
                }
                apply_update_actions(db, txn, cancel, now, &child_name, &child_changes, visited)?;
            }
            action @ (ReferentialAction::SetNull | ReferentialAction::SetDefault) => {
                let new_value = replacement_value(db, &child_name, &fk, action, now)?;
                rewrite_children(db, txn, &child_name, &fk, &positions, &new_value)?;
            }
        }
    }
    Ok(())
}

/// DROP TABLE guard: dropping a table another table points at is an
/// error, with or without child rows.
pub fn check_drop(db: &Database, names: &[String], name: &str) -> Result<()> {
    for (child_name, fk) in db.incoming_foreign_keys(name) {
        if child_name.eq_ignore_ascii_case(name) {
            continue;
        }
        // a child being dropped by the same statement does not block
        if names.iter().any(|n| n.eq_ignore_ascii_case(&child_name)) {
            continue;
        }
        return Err(Error::ForeignKey(format!(
            "cannot drop table '{name}': referenced by foreign key '{}' of '{child_name}'",
            fk.name
        )));
    }
    Ok(())
}

/// TRUNCATE guard: an incoming foreign key with live child rows blocks
/// the truncate.
pub fn check_truncate(db: &Database, name: &str) -> Result<()> {
    for (child_name, fk) in db.incoming_foreign_keys(name) {
        let child = db.table(&child_name)?;
        let (col_idx, _) = child.column(&fk.column)?;
        let has_dependents = child
            .live_rows()
            .any(|(_, row)| !row[col_idx].is_null());
        if has_dependents {
            return Err(Error::ForeignKey(format!(
                "cannot truncate '{name}': rows in '{child_name}' reference it \
                 (constraint '{}')",
                fk.name
            )));
        }
    }
    Ok(())
}

/// Orders a multi-table DROP so children go before their parents,
/// following the FK edges between the dropped tables. A cycle among the
/// dropped tables cannot be ordered and fails.
pub fn drop_order(db: &Database, names: &[String]) -> Result<Vec<String>> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes = HashMap::new();
    for name in names {
        let node_idx = graph.add_node(name.as_str());
        nodes.insert(name.to_lowercase(), node_idx);
    }
    for name in names {
        let Ok(table) = db.table(name) else { continue };
        let from_idx = nodes[&name.to_lowercase()];
        for fk in &table.foreign_keys {
            if let Some(to_idx) = nodes.get(&fk.ref_table.to_lowercase())
                && *to_idx != from_idx
            {
                // the referenced table must outlive its children
                graph.add_edge(*to_idx, from_idx, ());
            }
        }
    }
    match toposort(&graph, None) {
        // children last in dependency order, so dropping reverses it
        Ok(sorted) => Ok(sorted
            .into_iter()
            .rev()
            .map(|idx| graph[idx].to_string())
            .collect()),
        Err(_) => Err(Error::ForeignKeyCycle(names.join(", "))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::catalog::{Column, Table};
    use crate::value::DataType;

    fn two_level_db(on_delete: ReferentialAction) -> Database {
        let mut db = Database::new();
        let mut id = Column::new("id", DataType::Integer);
        id.primary_key = true;
        db.create_table(Table::new("cat", vec![id, Column::new("name", DataType::Text)]))
            .unwrap();

        let mut pid = Column::new("id", DataType::Integer);
        pid.primary_key = true;
        let mut prod = Table::new(
            "prod",
            vec![pid, Column::new("cat_id", DataType::Integer)],
        );
        prod.foreign_keys.push(ForeignKey {
            name: "fk_prod_cat".to_string(),
            column: "cat_id".to_string(),
            ref_table: "cat".to_string(),
            ref_column: "id".to_string(),
            on_delete,
            on_update: ReferentialAction::Restrict,
        });
        db.create_table(prod).unwrap();

        db.table_mut("cat")
            .unwrap()
            .append_row(vec![Value::Integer(1), Value::Text("E".into())]);
        db.table_mut("cat")
            .unwrap()
            .append_row(vec![Value::Integer(2), Value::Text("B".into())]);
        db.table_mut("prod")
            .unwrap()
            .append_row(vec![Value::Integer(1), Value::Integer(1)]);
        db.table_mut("prod")
            .unwrap()
            .append_row(vec![Value::Integer(2), Value::Integer(1)]);
        db.table_mut("prod")
            .unwrap()
            .append_row(vec![Value::Integer(3), Value::Integer(2)]);
        db
    }

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn missing_parent_is_rejected() {
        let db = two_level_db(ReferentialAction::Restrict);
        let err = check_outgoing(&db, "prod", &[Value::Integer(9), Value::Integer(42)])
            .expect_err("value 42 has no parent");
        assert!(matches!(err, Error::ForeignKey(_)));
        // NULL FK values need no parent
        check_outgoing(&db, "prod", &[Value::Integer(9), Value::Null]).unwrap();
    }

    #[test]
    fn restrict_blocks_parent_delete() {
        let mut db = two_level_db(ReferentialAction::Restrict);
        let mut txn = Transaction::begin();
        let cancel = CancelFlag::new();
        let removed = vec![vec![Value::Integer(1), Value::Text("E".into())]];
        let err = apply_delete_actions(
            &mut db,
            &mut txn,
            &cancel,
            now(),
            "cat",
            &removed,
            &mut vec!["cat".to_string()],
        )
        .expect_err("restrict must block");
        assert!(matches!(err, Error::ForeignKey(_)));
    }

    #[test]
    fn cascade_deletes_children() {
        let mut db = two_level_db(ReferentialAction::Cascade);
        let mut txn = Transaction::begin();
        let cancel = CancelFlag::new();
        let removed = vec![vec![Value::Integer(1), Value::Text("E".into())]];
        apply_delete_actions(
            &mut db,
            &mut txn,
            &cancel,
            now(),
            "cat",
            &removed,
            &mut vec!["cat".to_string()],
        )
        .unwrap();
        let prod = db.table("prod").unwrap();
        assert_eq!(prod.live_count(), 1, "products 1 and 2 must cascade away");
        assert_eq!(prod.live_rows().next().unwrap().1[0], Value::Integer(3));

        // and the undo log brings them back
        txn.rollback(&mut db).unwrap();
        assert_eq!(db.table("prod").unwrap().live_count(), 3);
    }

    #[test]
    fn set_null_requires_nullable_column() {
        let mut db = two_level_db(ReferentialAction::SetNull);
        let mut txn = Transaction::begin();
        let cancel = CancelFlag::new();
        let removed = vec![vec![Value::Integer(1), Value::Text("E".into())]];
        apply_delete_actions(
            &mut db,
            &mut txn,
            &cancel,
            now(),
            "cat",
            &removed,
            &mut vec!["cat".to_string()],
        )
        .unwrap();
        let prod = db.table("prod").unwrap();
        let nulled = prod
            .live_rows()
            .filter(|(_, row)| row[1].is_null())
            .count();
        assert_eq!(nulled, 2);
    }

    #[test]
    fn drop_order_puts_children_first() {
        let db = two_level_db(ReferentialAction::Restrict);
        let order =
            drop_order(&db, &["cat".to_string(), "prod".to_string()]).unwrap();
        assert_eq!(order, vec!["prod".to_string(), "cat".to_string()]);
    }

    #[test]
    fn drop_of_referenced_table_is_blocked() {
        let db = two_level_db(ReferentialAction::Restrict);
        let names = vec!["cat".to_string()];
        assert!(matches!(
            check_drop(&db, &names, "cat"),
            Err(Error::ForeignKey(_))
        ));
        // dropping both together is allowed
        let both = vec!["prod".to_string(), "cat".to_string()];
        check_drop(&db, &both, "cat").unwrap();
    }
}
