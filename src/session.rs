//! Sessions: autocommit, the active transaction, the recording log and
//! statement dispatch against the shared engine.
//!
//! A session may be shared across threads; its state sits behind its own
//! mutex, and the recording log behind another, so recording never
//! blocks execution longer than an append. Lock order is always engine
//! lock first, session state second.

use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};

use crate::ast::Statement;
use crate::engine::{split_statements, Engine};
use crate::error::{Error, Result};
use crate::exec::{self, CancelFlag, ExecContext, StatementOutput};
use crate::parser::parse_statement;
use crate::txn::Transaction;

/// Per-statement outcome of a batch, matching the statement order.
pub type StatementResult = Result<StatementOutput>;

#[derive(Default)]
struct SessionState {
    autocommit: bool,
    isolation: Option<String>,
    txn: Option<Transaction>,
}

#[derive(Default)]
struct Recorder {
    active: bool,
    buffer: Vec<String>,
}

/// One connection's worth of state against an [`Engine`].
pub struct Session {
    engine: Arc<Engine>,
    state: Mutex<SessionState>,
    recorder: Mutex<Recorder>,
}

impl Session {
    /// Opens a session with autocommit on, the default.
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            state: Mutex::new(SessionState {
                autocommit: true,
                isolation: None,
                txn: None,
            }),
            recorder: Mutex::new(Recorder::default()),
        }
    }

    /// The engine this session talks to.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Starts recording; the prior buffer is cleared.
    pub fn start_recording(&self) {
        let mut recorder = self.lock_recorder();
        recorder.buffer.clear();
        recorder.active = true;
    }

    /// Stops recording; the buffer stays readable.
    pub fn stop_recording(&self) {
        self.lock_recorder().active = false;
    }

    /// Every statement recorded since recording last started.
    pub fn recorded_queries(&self) -> Vec<String> {
        self.lock_recorder().buffer.clone()
    }

    /// Whether the session currently has an open explicit transaction.
    pub fn in_transaction(&self) -> bool {
        self.lock_state()
            .txn
            .as_ref()
            .is_some_and(Transaction::is_explicit)
    }

    /// The isolation level last set, as recorded (never enforced).
    pub fn isolation_level(&self) -> Option<String> {
        self.lock_state().isolation.clone()
    }

    /// Executes one statement.
    pub fn execute(&self, sql: &str) -> StatementResult {
        self.execute_with_cancel(sql, &CancelFlag::new())
    }

    /// Executes one statement under an external cancellation flag.
    pub fn execute_with_cancel(&self, sql: &str, cancel: &CancelFlag) -> StatementResult {
        self.record(sql);
        log::debug!("execute: {sql}");
        let statement = parse_statement(sql)?;
        self.run_statement(&statement, cancel)
    }

    /// Splits `sql` on top-level `;` and executes each statement,
    /// returning per-statement results.
    pub fn execute_batch(&self, sql: &str) -> Result<Vec<StatementResult>> {
        let parts = split_statements(sql)?;
        let cancel = CancelFlag::new();
        Ok(parts
            .iter()
            .map(|part| self.execute_with_cancel(part, &cancel))
            .collect())
    }

    /// Same as [`Session::execute_batch`] over streamed text.
    pub fn import<R: Read>(&self, mut reader: R) -> Result<Vec<StatementResult>> {
        let mut sql = String::new();
        reader.read_to_string(&mut sql)?;
        self.execute_batch(&sql)
    }

    fn record(&self, sql: &str) {
        let mut recorder = self.lock_recorder();
        if recorder.active {
            recorder.buffer.push(sql.trim().to_string());
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_recorder(&self) -> std::sync::MutexGuard<'_, Recorder> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_statement(&self, statement: &Statement, cancel: &CancelFlag) -> StatementResult {
        match statement {
            // --- transaction control ---
            Statement::Begin => {
                let mut state = self.lock_state();
                if state.txn.as_ref().is_some_and(Transaction::is_explicit) {
                    return Err(Error::Transaction(
                        "a transaction is already active (nested BEGIN)".to_string(),
                    ));
                }
                state.txn = Some(Transaction::begin());
                Ok(StatementOutput::Status("Transaction started".to_string()))
            }
            Statement::Commit => {
                let mut state = self.lock_state();
                let txn = state.txn.take().ok_or_else(|| {
                    Error::Transaction("COMMIT without an active transaction".to_string())
                })?;
                txn.commit();
                Ok(StatementOutput::Status("Commit".to_string()))
            }
            Statement::Rollback { savepoint } => {
                // engine lock first, session state second
                let mut db = self.engine.write();
                let mut state = self.lock_state();
                match savepoint {
                    Some(name) => {
                        let txn = state.txn.as_mut().ok_or_else(|| {
                            Error::Transaction(format!(
                                "ROLLBACK TO SAVEPOINT '{name}' without an active transaction"
                            ))
                        })?;
                        txn.rollback_to_savepoint(&mut db, name)?;
                        Ok(StatementOutput::Status(format!(
                            "Rolled back to savepoint '{name}'"
                        )))
                    }
                    None => {
                        let mut txn = state.txn.take().ok_or_else(|| {
                            Error::Transaction(
                                "ROLLBACK without an active transaction".to_string(),
                            )
                        })?;
                        txn.rollback(&mut db)?;
                        Ok(StatementOutput::Status("Rollback".to_string()))
                    }
                }
            }
            Statement::Savepoint { name } => {
                let mut state = self.lock_state();
                let txn = state.txn.as_mut().ok_or_else(|| {
                    Error::Transaction(format!(
                        "SAVEPOINT '{name}' without an active transaction"
                    ))
                })?;
                txn.savepoint(name);
                Ok(StatementOutput::Status(format!("Savepoint '{name}' set")))
            }
            Statement::ReleaseSavepoint { name } => {
                let mut state = self.lock_state();
                let txn = state.txn.as_mut().ok_or_else(|| {
                    Error::Transaction(format!(
                        "RELEASE SAVEPOINT '{name}' without an active transaction"
                    ))
                })?;
                txn.release_savepoint(name)?;
                Ok(StatementOutput::Status(format!(
                    "Savepoint '{name}' released"
                )))
            }
            Statement::SetAutocommit { enabled } => {
                let mut state = self.lock_state();
                // turning autocommit back on commits any open transaction
                if *enabled && let Some(txn) = state.txn.take() {
                    txn.commit();
                }
                state.autocommit = *enabled;
                Ok(StatementOutput::Status(format!(
                    "autocommit = {}",
                    i32::from(*enabled)
                )))
            }
            Statement::SetTransactionIsolation { level } => {
                let mut state = self.lock_state();
                state.isolation = Some(level.clone());
                log::warn!("isolation level '{level}' recorded but not enforced");
                Ok(StatementOutput::Status(format!(
                    "Isolation level set to {level}"
                )))
            }
            Statement::SetVariable { name } => {
                log::warn!("SET {name} accepted without effect");
                Ok(StatementOutput::Status(format!("SET {name} (no effect)")))
            }
            Statement::LockTables | Statement::UnlockTables => {
                Ok(StatementOutput::Status("OK".to_string()))
            }

            // --- reads take the shared lock ---
            Statement::Select(query) => {
                let db = self.engine.read();
                let now = chrono::Local::now().naive_local();
                exec::execute_select(&db, cancel, now, query)
            }
            Statement::ShowTables => {
                let db = self.engine.read();
                Ok(exec::ddl::show_tables(&db))
            }
            Statement::ShowIndexes { table } => {
                let db = self.engine.read();
                exec::ddl::show_indexes(&db, table)
            }
            Statement::ShowColumns { table } => {
                let db = self.engine.read();
                exec::ddl::show_columns(&db, table)
            }

            // --- everything else mutates under the write lock ---
            other => self.run_mutation(other, cancel),
        }
    }

    fn run_mutation(&self, statement: &Statement, cancel: &CancelFlag) -> StatementResult {
        let mut db = self.engine.write();
        let mut state = self.lock_state();

        // autocommit wraps the statement in an implicit transaction;
        // with autocommit off, a DML opens one that stays active
        let implicit = state.txn.is_none() && state.autocommit;
        if state.txn.is_none() {
            // with autocommit off the lazily opened transaction stays
            // active until COMMIT/ROLLBACK, but it is not an explicit
            // BEGIN: a later BEGIN replaces (and thereby commits) it
            state.txn = Some(Transaction::implicit());
        }
        let Some(txn) = state.txn.as_mut() else {
            return Err(Error::Transaction("no active transaction".to_string()));
        };
        let mark = txn.mark();

        let now = chrono::Local::now().naive_local();
        let result = {
            let mut ctx = ExecContext {
                db: &mut db,
                txn,
                cancel,
                now,
            };
            exec::execute_mutation(&mut ctx, statement)
        };

        match result {
            Ok(output) => {
                if implicit && let Some(txn) = state.txn.take() {
                    txn.commit();
                }
                Ok(output)
            }
            Err(err) => {
                // the statement's partial writes are taken back; an
                // explicit transaction stays active
                if let Some(txn) = state.txn.as_mut() {
                    txn.rollback_to_mark(&mut db, mark)?;
                }
                if implicit {
                    state.txn = None;
                }
                Err(err)
            }
        }
    }
}
