//! Statement execution: dispatch by statement kind plus the shared
//! output and cancellation types.
//!
//! The SELECT pipeline lives in [`select`], DML in [`dml`], DDL and
//! introspection in [`ddl`]. Transaction-control statements never reach
//! this module; the engine handles them against the session.

pub mod ddl;
pub mod dml;
pub mod select;

use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ast::Statement;
use crate::catalog::Database;
use crate::error::{Error, Result};
use crate::eval::EvalContext;
use crate::txn::Transaction;
use crate::value::Value;

/// Shared cancellation flag, checked between row productions.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the statement using this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A materialized result set.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    /// Output column names
    pub columns: Vec<String>,
    /// Rows in result order
    pub rows: Vec<Vec<Value>>,
}

/// What a statement returns to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutput {
    /// A result set (SELECT, SHOW, DESCRIBE)
    Rows(RowSet),
    /// An affected-row count (INSERT/UPDATE/DELETE)
    Affected(u64),
    /// A status message (DDL, transaction control, parse-only forms)
    Status(String),
}

/// Everything a mutating statement needs: the catalog, the active
/// transaction for undo logging, the cancellation flag and the
/// statement-fixed clock.
pub struct ExecContext<'a> {
    /// The shared catalog
    pub db: &'a mut Database,
    /// Active (explicit or implicit) transaction
    pub txn: &'a mut Transaction,
    /// Per-statement cancellation flag
    pub cancel: &'a CancelFlag,
    /// Statement-fixed timestamp
    pub now: NaiveDateTime,
}

impl ExecContext<'_> {
    /// A read-only evaluation context borrowing this one.
    #[must_use]
    pub fn eval_ctx(&self) -> EvalContext<'_> {
        EvalContext {
            db: self.db,
            now: self.now,
            cancel: self.cancel,
            insert_row: None,
        }
    }

    /// Fails with [`Error::Cancelled`] once the flag is set.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Executes a catalog- or data-mutating statement.
pub fn execute_mutation(ctx: &mut ExecContext, stmt: &Statement) -> Result<StatementOutput> {
    match stmt {
        Statement::CreateTable(create) => ddl::create_table(ctx, create),
        Statement::CreateIndex(create) => ddl::create_index(ctx, create),
        Statement::DropTable { names, if_exists } => ddl::drop_tables(ctx, names, *if_exists),
        Statement::DropIndex { name, table } => ddl::drop_index(ctx, name, table),
        Statement::TruncateTable { name } => ddl::truncate_table(ctx, name),
        Statement::Insert(insert) => dml::insert(ctx, insert),
        Statement::Update(update) => dml::update(ctx, update),
        Statement::Delete(delete) => dml::delete(ctx, delete),
        other => Err(Error::Schema(format!(
            "statement cannot be executed here: {other:?}"
        ))),
    }
}

/// Executes a SELECT against the shared state.
pub fn execute_select(
    db: &Database,
    cancel: &CancelFlag,
    now: NaiveDateTime,
    query: &crate::ast::Query,
) -> Result<StatementOutput> {
    let ctx = EvalContext {
        db,
        now,
        cancel,
        insert_row: None,
    };
    select::execute_query(&ctx, query, None).map(StatementOutput::Rows)
}
