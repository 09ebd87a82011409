//! Transaction semantics: autocommit, explicit transactions, savepoints,
//! statement-level rollback and DDL under ROLLBACK.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{error, exec, int, rows, session, text};
use memql::{Error, StatementOutput, Value};

#[test]
fn commit_keeps_rollback_discards() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(v INT);
         BEGIN; INSERT INTO t VALUES(1); COMMIT;
         BEGIN; INSERT INTO t VALUES(2); ROLLBACK;",
    );
    assert_eq!(rows(&s, "SELECT v FROM t"), vec![vec![int(1)]]);
}

#[test]
fn rollback_restores_updates_and_deletes() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(id INT PRIMARY KEY, v VARCHAR(10));
         INSERT INTO t VALUES(1, 'a'), (2, 'b');
         BEGIN;
         UPDATE t SET v = 'z' WHERE id = 1;
         DELETE FROM t WHERE id = 2;
         ROLLBACK;",
    );
    assert_eq!(
        rows(&s, "SELECT id, v FROM t ORDER BY id"),
        vec![vec![int(1), text("a")], vec![int(2), text("b")]],
        "rollback must restore both the update and the delete"
    );
}

#[test]
fn rollback_restores_auto_increment_counter() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(id INT PRIMARY KEY AUTO_INCREMENT, v INT);
         INSERT INTO t(v) VALUES(1);
         BEGIN; INSERT INTO t(v) VALUES(2); INSERT INTO t(v) VALUES(3); ROLLBACK;
         INSERT INTO t(v) VALUES(4);",
    );
    assert_eq!(
        rows(&s, "SELECT id FROM t ORDER BY id"),
        vec![vec![int(1)], vec![int(2)]],
        "BEGIN..ROLLBACK must be a no-op, counter included"
    );
}

#[test]
fn ddl_rolls_back_bit_identically() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE keeper(v INT);
         INSERT INTO keeper VALUES(42);
         BEGIN;
         CREATE TABLE temp_t(x INT);
         INSERT INTO temp_t VALUES(1);
         DROP TABLE keeper;
         ROLLBACK;",
    );
    let tables = s.engine().list_tables();
    assert_eq!(tables, vec!["keeper".to_string()], "created table gone, dropped table back");
    assert_eq!(rows(&s, "SELECT v FROM keeper"), vec![vec![int(42)]]);
}

#[test]
fn truncate_rolls_back_rows_and_counter() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(id INT PRIMARY KEY AUTO_INCREMENT, v INT);
         INSERT INTO t(v) VALUES(1),(2);
         BEGIN; TRUNCATE TABLE t; ROLLBACK;
         INSERT INTO t(v) VALUES(3);",
    );
    assert_eq!(
        rows(&s, "SELECT id FROM t ORDER BY id"),
        vec![vec![int(1)], vec![int(2)], vec![int(3)]]
    );
}

#[test]
fn savepoints_nest_and_release() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(v INT);
         BEGIN;
         INSERT INTO t VALUES(1);
         SAVEPOINT sp1;
         INSERT INTO t VALUES(2);
         SAVEPOINT sp2;
         INSERT INTO t VALUES(3);
         ROLLBACK TO SAVEPOINT sp1;",
    );
    // the transaction is still active; only rows past sp1 are gone
    assert_eq!(rows(&s, "SELECT v FROM t"), vec![vec![int(1)]]);
    assert!(s.in_transaction());

    // sp2 was discarded by the partial rollback
    let err = error(&s, "ROLLBACK TO SAVEPOINT sp2");
    assert!(matches!(err, Error::Transaction(_)));

    exec(&s, "RELEASE SAVEPOINT sp1; COMMIT;");
    assert_eq!(rows(&s, "SELECT v FROM t"), vec![vec![int(1)]]);
}

#[test]
fn transaction_control_errors() {
    let s = session();
    assert!(matches!(error(&s, "COMMIT"), Error::Transaction(_)));
    assert!(matches!(error(&s, "ROLLBACK"), Error::Transaction(_)));
    assert!(matches!(error(&s, "SAVEPOINT sp"), Error::Transaction(_)));

    exec(&s, "BEGIN");
    assert!(matches!(error(&s, "BEGIN"), Error::Transaction(_)), "nested BEGIN");
    assert!(matches!(
        error(&s, "RELEASE SAVEPOINT missing"),
        Error::Transaction(_)
    ));
    exec(&s, "COMMIT");
}

#[test]
fn failed_statement_keeps_transaction_active() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(id INT PRIMARY KEY);
         BEGIN;
         INSERT INTO t VALUES(1);",
    );
    // this statement fails and is rolled back alone
    let err = error(&s, "INSERT INTO t VALUES(2), (1)");
    assert!(matches!(err, Error::Constraint(_)));
    assert!(s.in_transaction(), "the transaction must survive the failure");

    exec(&s, "INSERT INTO t VALUES(3); COMMIT;");
    assert_eq!(
        rows(&s, "SELECT id FROM t ORDER BY id"),
        vec![vec![int(1)], vec![int(3)]]
    );
}

#[test]
fn autocommit_off_keeps_writes_pending() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(v INT);
         SET AUTOCOMMIT = 0;
         INSERT INTO t VALUES(1);
         ROLLBACK;",
    );
    assert_eq!(rows(&s, "SELECT COUNT(*) FROM t"), vec![vec![int(0)]]);

    exec(&s, "INSERT INTO t VALUES(2);");
    // turning autocommit back on commits the pending transaction
    exec(&s, "SET AUTOCOMMIT = 1;");
    assert!(matches!(error(&s, "ROLLBACK"), Error::Transaction(_)));
    assert_eq!(rows(&s, "SELECT v FROM t"), vec![vec![int(2)]]);
}

#[test]
fn isolation_level_is_recorded_not_enforced() {
    let s = session();
    match s
        .execute("SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ")
        .unwrap()
    {
        StatementOutput::Status(msg) => assert!(msg.contains("REPEATABLE READ")),
        other => panic!("unexpected output {other:?}"),
    }
    assert_eq!(s.isolation_level().as_deref(), Some("REPEATABLE READ"));
}

#[test]
fn two_sessions_share_one_engine() {
    let engine = std::sync::Arc::new(memql::Engine::new());
    let a = engine.session();
    let b = engine.session();

    exec(&a, "CREATE TABLE t(v INT); INSERT INTO t VALUES(1);");
    assert_eq!(rows(&b, "SELECT v FROM t"), vec![vec![int(1)]]);

    // a transaction is session-local state
    exec(&a, "BEGIN; INSERT INTO t VALUES(2);");
    assert!(a.in_transaction());
    assert!(!b.in_transaction());
    exec(&a, "ROLLBACK");
    assert_eq!(rows(&b, "SELECT COUNT(*) FROM t"), vec![vec![int(1)]]);
}

#[test]
fn concurrent_writers_serialize() {
    use std::sync::Arc;
    let engine = Arc::new(memql::Engine::new());
    let setup = engine.session();
    exec(&setup, "CREATE TABLE t(id INT PRIMARY KEY AUTO_INCREMENT, v INT)");

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(std::thread::spawn(move || {
            let s = engine.session();
            for _ in 0..25 {
                s.execute("INSERT INTO t(v) VALUES(1)").expect("insert");
            }
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let check = engine.session();
    assert_eq!(rows(&check, "SELECT COUNT(*) FROM t"), vec![vec![int(100)]]);
    // ids are unique and the counter outruns them all
    assert_eq!(
        rows(&check, "SELECT COUNT(DISTINCT id) FROM t"),
        vec![vec![int(100)]]
    );
}

#[test]
fn cancelled_statement_reports_and_rolls_back() {
    let s = session();
    exec(&s, "CREATE TABLE t(v INT); INSERT INTO t VALUES(1);");
    let cancel = memql::CancelFlag::new();
    cancel.cancel();
    let err = s
        .execute_with_cancel("INSERT INTO t SELECT v FROM t", &cancel)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(rows(&s, "SELECT COUNT(*) FROM t"), vec![vec![int(1)]]);
}

#[test]
fn recording_round_trip() {
    let s = session();
    s.start_recording();
    exec(&s, "CREATE TABLE t(v INT)");
    exec(&s, "INSERT INTO t VALUES(1)");
    assert_eq!(s.recorded_queries().len(), 2);

    s.stop_recording();
    exec(&s, "INSERT INTO t VALUES(2)");
    assert_eq!(s.recorded_queries().len(), 2, "stopped recorder stays frozen");

    // starting again clears the prior buffer
    s.start_recording();
    assert!(s.recorded_queries().is_empty());
    let _ = rows(&s, "SELECT v FROM t");
    assert_eq!(s.recorded_queries().len(), 1);
}

#[test]
fn null_value_round_trips_through_rollback() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(a INT, b VARCHAR(5));
         INSERT INTO t VALUES(NULL, NULL);
         BEGIN; UPDATE t SET a = 1, b = 'x'; ROLLBACK;",
    );
    assert_eq!(rows(&s, "SELECT a, b FROM t"), vec![vec![Value::Null, Value::Null]]);
}
