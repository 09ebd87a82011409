//! Shared helpers for the integration suites.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use memql::{Engine, Session, StatementOutput, Value};

/// A fresh session on a fresh engine.
pub fn session() -> Session {
    Arc::new(Engine::new()).session()
}

/// Runs a whole script, panicking on the first failing statement.
pub fn exec(session: &Session, sql: &str) {
    for result in session.execute_batch(sql).expect("batch must split") {
        result.expect("statement must succeed");
    }
}

/// Runs one SELECT and returns its rows.
pub fn rows(session: &Session, sql: &str) -> Vec<Vec<Value>> {
    match session.execute(sql).expect("query must succeed") {
        StatementOutput::Rows(set) => set.rows,
        other => panic!("expected rows from {sql}, got {other:?}"),
    }
}

/// Runs one SELECT and returns its column names.
pub fn columns(session: &Session, sql: &str) -> Vec<String> {
    match session.execute(sql).expect("query must succeed") {
        StatementOutput::Rows(set) => set.columns,
        other => panic!("expected rows from {sql}, got {other:?}"),
    }
}

/// Runs one DML statement and returns its affected count.
pub fn affected(session: &Session, sql: &str) -> u64 {
    match session.execute(sql).expect("statement must succeed") {
        StatementOutput::Affected(n) => n,
        other => panic!("expected affected count from {sql}, got {other:?}"),
    }
}

/// Runs a statement that must fail and returns the error.
pub fn error(session: &Session, sql: &str) -> memql::Error {
    match session.execute(sql) {
        Err(err) => err,
        Ok(ok) => panic!("expected {sql} to fail, got {ok:?}"),
    }
}

pub fn int(i: i64) -> Value {
    Value::Integer(i)
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub fn dec(s: &str) -> Value {
    Value::Decimal(s.parse().expect("test decimal literal"))
}
