//! Transactions: the undo log of inverse operations, savepoints and the
//! autocommit state machine.
//!
//! Every mutation appends its inverse to the active transaction's undo
//! log. COMMIT discards the log; ROLLBACK replays it in reverse against
//! the shared database. Statement-level atomicity uses the same
//! mechanism: the executor takes a mark before running a statement and
//! rolls back to it when the statement fails, leaving an explicit
//! transaction active.
//!
//! DDL is undo-logged like DML (dropped and truncated tables travel as
//! full clones), so ROLLBACK restores the catalog bit-identically.

use crate::catalog::{Database, Table, TableIndex};
use crate::error::{Error, Result};
use crate::value::Value;

/// One inverse operation.
#[derive(Debug)]
pub enum UndoOp {
    /// Inverse of INSERT: tombstone the appended row
    RetractInsert {
        /// Table name
        table: String,
        /// Row position to take back
        pos: usize,
    },
    /// Inverse of DELETE: revive the tombstoned row
    ReviveDelete {
        /// Table name
        table: String,
        /// Row position to bring back
        pos: usize,
    },
    /// Inverse of UPDATE: restore the previous cell values
    RestoreUpdate {
        /// Table name
        table: String,
        /// Row position
        pos: usize,
        /// The values the row held before the update
        values: Vec<Value>,
    },
    /// Inverse of an auto-increment bump
    RestoreAutoIncrement {
        /// Table name
        table: String,
        /// Counter value before the bump
        value: i64,
    },
    /// Inverse of CREATE TABLE
    DropCreatedTable {
        /// Table name
        name: String,
    },
    /// Inverse of DROP TABLE and TRUNCATE: put the old table back
    RestoreTable {
        /// Full table clone, rows and counter included
        table: Box<Table>,
    },
    /// Inverse of CREATE INDEX
    DropCreatedIndex {
        /// Table name
        table: String,
        /// Index name
        name: String,
    },
    /// Inverse of DROP INDEX
    RestoreIndex {
        /// Table name
        table: String,
        /// The removed index (rebuilt on restore)
        index: TableIndex,
    },
}

impl UndoOp {
    fn apply(self, db: &mut Database) -> Result<()> {
        match self {
            UndoOp::RetractInsert { table, pos } => db.table_mut(&table)?.retract_row(pos),
            UndoOp::ReviveDelete { table, pos } => db.table_mut(&table)?.revive_row(pos),
            UndoOp::RestoreUpdate { table, pos, values } => {
                db.table_mut(&table)?.replace_row(pos, values).map(|_| ())
            }
            UndoOp::RestoreAutoIncrement { table, value } => {
                db.table_mut(&table)?.set_auto_increment(value);
                Ok(())
            }
            UndoOp::DropCreatedTable { name } => db.remove_table(&name).map(|_| ()),
            UndoOp::RestoreTable { table } => {
                // a TRUNCATE leaves the emptied table in place; replace it
                let name = table.name.clone();
                if db.contains_table(&name) {
                    db.remove_table(&name)?;
                }
                db.restore_table(*table);
                Ok(())
            }
            UndoOp::DropCreatedIndex { table, name } => {
                db.table_mut(&table)?.drop_index(&name).map(|_| ())
            }
            UndoOp::RestoreIndex { table, index } => db.table_mut(&table)?.add_index(index),
        }
    }
}

/// The per-session transaction state: an undo log plus savepoint marks.
#[derive(Debug, Default)]
pub struct Transaction {
    undo: Vec<UndoOp>,
    savepoints: Vec<(String, usize)>,
    explicit: bool,
}

impl Transaction {
    /// Starts an explicit transaction (BEGIN).
    #[must_use]
    pub fn begin() -> Self {
        Self {
            explicit: true,
            ..Self::default()
        }
    }

    /// Starts the implicit single-statement transaction of autocommit.
    #[must_use]
    pub fn implicit() -> Self {
        Self::default()
    }

    /// Whether this transaction was opened with BEGIN.
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Records an inverse operation.
    pub fn record(&mut self, op: UndoOp) {
        self.undo.push(op);
    }

    /// Current undo position, for statement-level rollback.
    #[must_use]
    pub fn mark(&self) -> usize {
        self.undo.len()
    }

    /// Replays the undo log back to `mark`, newest first.
    pub fn rollback_to_mark(&mut self, db: &mut Database, mark: usize) -> Result<()> {
        while self.undo.len() > mark {
            if let Some(op) = self.undo.pop() {
                op.apply(db)?;
            }
        }
        // savepoints past the mark no longer exist
        self.savepoints.retain(|(_, at)| *at <= mark);
        Ok(())
    }

    /// Rolls back the whole transaction.
    pub fn rollback(&mut self, db: &mut Database) -> Result<()> {
        self.rollback_to_mark(db, 0)
    }

    /// Declares a savepoint at the current undo position. A repeated name
    /// moves the marker, MySQL manner.
    pub fn savepoint(&mut self, name: &str) {
        self.savepoints
            .retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.savepoints.push((name.to_string(), self.undo.len()));
    }

    /// ROLLBACK TO SAVEPOINT: undoes past the marker but keeps both the
    /// transaction and the savepoint itself active.
    pub fn rollback_to_savepoint(&mut self, db: &mut Database, name: &str) -> Result<()> {
        let mark = self
            .savepoints
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, at)| *at)
            .ok_or_else(|| Error::Transaction(format!("unknown savepoint '{name}'")))?;
        self.rollback_to_mark(db, mark)?;
        // the savepoint survives its own rollback
        if !self
            .savepoints
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            self.savepoints.push((name.to_string(), mark));
        }
        Ok(())
    }

    /// RELEASE SAVEPOINT: discards the marker, keeping all effects.
    pub fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let before = self.savepoints.len();
        self.savepoints
            .retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        if self.savepoints.len() == before {
            return Err(Error::Transaction(format!("unknown savepoint '{name}'")));
        }
        Ok(())
    }

    /// COMMIT: the undo log is simply discarded.
    pub fn commit(self) {
        // dropping the log makes every recorded change permanent
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::catalog::{Column, IndexKind};
    use crate::value::DataType;

    fn db_with_table() -> Database {
        let mut db = Database::new();
        let mut id = Column::new("id", DataType::Integer);
        id.primary_key = true;
        db.create_table(Table::new("t", vec![id])).unwrap();
        db
    }

    #[test]
    fn rollback_undoes_insert_and_counter() {
        let mut db = db_with_table();
        let mut txn = Transaction::begin();

        let before_counter = db.table("t").unwrap().auto_increment_value();
        let pos = db
            .table_mut("t")
            .unwrap()
            .append_row(vec![Value::Integer(1)]);
        txn.record(UndoOp::RetractInsert {
            table: "t".to_string(),
            pos,
        });
        db.table_mut("t").unwrap().observe_auto_increment(1);
        txn.record(UndoOp::RestoreAutoIncrement {
            table: "t".to_string(),
            value: before_counter,
        });

        txn.rollback(&mut db).unwrap();
        assert_eq!(db.table("t").unwrap().live_count(), 0);
        assert_eq!(db.table("t").unwrap().auto_increment_value(), before_counter);
    }

    #[test]
    fn rollback_revives_deleted_rows() {
        let mut db = db_with_table();
        let pos = db
            .table_mut("t")
            .unwrap()
            .append_row(vec![Value::Integer(1)]);

        let mut txn = Transaction::begin();
        db.table_mut("t").unwrap().kill_row(pos).unwrap();
        txn.record(UndoOp::ReviveDelete {
            table: "t".to_string(),
            pos,
        });
        txn.rollback(&mut db).unwrap();
        assert_eq!(db.table("t").unwrap().live_count(), 1);
    }

    #[test]
    fn savepoint_partial_rollback_keeps_transaction_state() {
        let mut db = db_with_table();
        let mut txn = Transaction::begin();

        let p1 = db
            .table_mut("t")
            .unwrap()
            .append_row(vec![Value::Integer(1)]);
        txn.record(UndoOp::RetractInsert {
            table: "t".to_string(),
            pos: p1,
        });

        txn.savepoint("sp1");

        let p2 = db
            .table_mut("t")
            .unwrap()
            .append_row(vec![Value::Integer(2)]);
        txn.record(UndoOp::RetractInsert {
            table: "t".to_string(),
            pos: p2,
        });

        txn.rollback_to_savepoint(&mut db, "sp1").unwrap();
        assert_eq!(db.table("t").unwrap().live_count(), 1, "only p2 undone");

        // the savepoint is still usable after its own rollback
        txn.rollback_to_savepoint(&mut db, "sp1").unwrap();
        assert!(txn.release_savepoint("sp1").is_ok());
        assert!(matches!(
            txn.release_savepoint("sp1"),
            Err(Error::Transaction(_))
        ));

        txn.rollback(&mut db).unwrap();
        assert_eq!(db.table("t").unwrap().live_count(), 0);
    }

    #[test]
    fn rollback_restores_dropped_table() {
        let mut db = db_with_table();
        db.table_mut("t")
            .unwrap()
            .append_row(vec![Value::Integer(9)]);

        let mut txn = Transaction::begin();
        let dropped = db.remove_table("t").unwrap();
        txn.record(UndoOp::RestoreTable {
            table: Box::new(dropped),
        });
        assert!(!db.contains_table("t"));

        txn.rollback(&mut db).unwrap();
        assert!(db.contains_table("t"));
        assert_eq!(db.table("t").unwrap().live_count(), 1);
    }

    #[test]
    fn rollback_drops_created_index() {
        let mut db = db_with_table();
        let mut txn = Transaction::begin();
        db.table_mut("t")
            .unwrap()
            .add_index(TableIndex::new(
                "idx_id",
                vec!["id".to_string()],
                false,
                IndexKind::Normal,
            ))
            .unwrap();
        txn.record(UndoOp::DropCreatedIndex {
            table: "t".to_string(),
            name: "idx_id".to_string(),
        });
        txn.rollback(&mut db).unwrap();
        assert!(db.table("t").unwrap().indexes.is_empty());
    }
}
