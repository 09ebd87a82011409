//! End-to-end scenarios exercising the full stack: parse, validate,
//! execute, observe.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{dec, error, exec, int, rows, session, text};
use memql::Value;

#[test]
fn correlated_scalar_subquery_counts_per_outer_row() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE u(id INT PRIMARY KEY AUTO_INCREMENT, name VARCHAR(100));
         CREATE TABLE o(user_id INT, amount DECIMAL(10,2));
         INSERT INTO u(name) VALUES('Alice'),('Bob');
         INSERT INTO o VALUES(1,100.00);",
    );
    let got = rows(
        &s,
        "SELECT u.name, (SELECT COUNT(*) FROM o WHERE user_id=u.id) AS c FROM u",
    );
    assert_eq!(
        got,
        vec![vec![text("Alice"), int(1)], vec![text("Bob"), int(0)]],
        "the subquery must re-evaluate for each outer row"
    );
}

#[test]
fn left_join_with_like() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE p(id INT, name VARCHAR(50));
         CREATE TABLE c(id INT, pid INT);
         INSERT INTO p VALUES(1,'Apple iPhone'),(2,'Samsung Galaxy');
         INSERT INTO c VALUES(10,1);",
    );
    let got = rows(
        &s,
        "SELECT p.name, c.id FROM p LEFT JOIN c ON p.id=c.pid WHERE p.name LIKE 'Apple%'",
    );
    assert_eq!(got, vec![vec![text("Apple iPhone"), int(10)]]);

    // the unmatched side pads with NULLs
    let all = rows(&s, "SELECT p.name, c.id FROM p LEFT JOIN c ON p.id=c.pid");
    assert_eq!(all.len(), 2);
    assert_eq!(all[1], vec![text("Samsung Galaxy"), Value::Null]);
}

#[test]
fn cascade_delete_removes_children() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE cat(id INT PRIMARY KEY, name VARCHAR(50));
         CREATE TABLE prod(id INT PRIMARY KEY, cat_id INT,
           FOREIGN KEY(cat_id) REFERENCES cat(id) ON DELETE CASCADE);
         INSERT INTO cat VALUES(1,'E'),(2,'B');
         INSERT INTO prod VALUES(1,1),(2,1),(3,2);
         DELETE FROM cat WHERE id=1;",
    );
    let got = rows(&s, "SELECT id FROM prod ORDER BY id");
    assert_eq!(got, vec![vec![int(3)]]);
}

#[test]
fn on_duplicate_key_update_sees_insert_values() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE s(name VARCHAR(20) UNIQUE, qty INT);
         INSERT INTO s VALUES('a',1);",
    );
    exec(
        &s,
        "INSERT INTO s VALUES('a',5) ON DUPLICATE KEY UPDATE qty=qty+VALUES(qty);",
    );
    assert_eq!(rows(&s, "SELECT qty FROM s"), vec![vec![int(6)]]);
}

#[test]
fn union_distinct_vs_all() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t1(x INT); CREATE TABLE t2(x INT);
         INSERT INTO t1 VALUES(1),(2); INSERT INTO t2 VALUES(2),(3);",
    );
    let distinct = rows(&s, "SELECT x FROM t1 UNION SELECT x FROM t2");
    assert_eq!(distinct, vec![vec![int(1)], vec![int(2)], vec![int(3)]]);

    let all = rows(&s, "SELECT x FROM t1 UNION ALL SELECT x FROM t2");
    assert_eq!(
        all,
        vec![vec![int(1)], vec![int(2)], vec![int(2)], vec![int(3)]],
        "UNION ALL preserves duplicates and order"
    );
}

#[test]
fn union_coerces_arms_to_a_common_column_type() {
    let s = session();
    // integer against float widens to float, and the equal values
    // collapse into one row
    assert_eq!(
        rows(&s, "SELECT 1 UNION SELECT 1e0"),
        vec![vec![Value::Float(1.0)]]
    );
    // integer against decimal widens to decimal
    assert_eq!(
        rows(&s, "SELECT 1 UNION SELECT 2.5"),
        vec![vec![dec("1")], vec![dec("2.5")]]
    );
    // text against a number unifies to text
    assert_eq!(rows(&s, "SELECT '1' UNION SELECT 1"), vec![vec![text("1")]]);
    // UNION ALL keeps its duplicates but still unifies the column
    assert_eq!(
        rows(&s, "SELECT 2 UNION ALL SELECT 2.0"),
        vec![vec![dec("2")], vec![dec("2")]]
    );
}

#[test]
fn rollback_discards_transactional_inserts() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE k(v INT);
         INSERT INTO k VALUES(1);
         BEGIN; INSERT INTO k VALUES(2); INSERT INTO k VALUES(3); ROLLBACK;",
    );
    assert_eq!(rows(&s, "SELECT v FROM k"), vec![vec![int(1)]]);
}

#[test]
fn insert_delete_round_trip_keeps_counter() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(id INT PRIMARY KEY AUTO_INCREMENT, v INT);
         INSERT INTO t(v) VALUES(10),(20);",
    );
    exec(&s, "INSERT INTO t(v) VALUES(30); DELETE FROM t WHERE v = 30;");
    assert_eq!(
        rows(&s, "SELECT id, v FROM t ORDER BY id"),
        vec![vec![int(1), int(10)], vec![int(2), int(20)]]
    );
    // the counter never rewinds
    exec(&s, "INSERT INTO t(v) VALUES(40);");
    assert_eq!(rows(&s, "SELECT id FROM t WHERE v = 40"), vec![vec![int(4)]]);
}

#[test]
fn truncate_resets_auto_increment() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(id INT PRIMARY KEY AUTO_INCREMENT, v INT);
         INSERT INTO t(v) VALUES(1),(2),(3);
         TRUNCATE TABLE t;
         INSERT INTO t(v) VALUES(7),(8),(9);",
    );
    assert_eq!(
        rows(&s, "SELECT id FROM t ORDER BY id"),
        vec![vec![int(1)], vec![int(2)], vec![int(3)]],
        "TRUNCATE then INSERT must hand out ids 1..N again"
    );
}

#[test]
fn create_then_drop_restores_catalog() {
    let s = session();
    exec(&s, "CREATE TABLE gone(id INT); DROP TABLE gone;");
    assert!(s.engine().list_tables().is_empty());
    let err = error(&s, "SELECT * FROM gone");
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn recorded_queries_replay_to_the_same_state() {
    let s = session();
    s.start_recording();
    exec(
        &s,
        "CREATE TABLE r(id INT PRIMARY KEY AUTO_INCREMENT, v VARCHAR(10));
         INSERT INTO r(v) VALUES('a'),('b');
         UPDATE r SET v = 'z' WHERE id = 2;
         DELETE FROM r WHERE id = 1;",
    );
    s.stop_recording();
    let script = s.recorded_queries();
    assert_eq!(script.len(), 4);

    let replayed = session();
    for statement in &script {
        replayed.execute(statement).expect("replay must succeed");
    }
    assert_eq!(
        rows(&s, "SELECT id, v FROM r"),
        rows(&replayed, "SELECT id, v FROM r"),
        "replaying the recording must rebuild the same contents"
    );
}

#[test]
fn explicit_auto_increment_values_push_the_counter() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(id INT PRIMARY KEY AUTO_INCREMENT, v INT);
         INSERT INTO t VALUES(10, 1);
         INSERT INTO t(v) VALUES(2);",
    );
    assert_eq!(
        rows(&s, "SELECT id FROM t ORDER BY id"),
        vec![vec![int(10)], vec![int(11)]]
    );
}

#[test]
fn batch_reports_per_statement_results() {
    let s = session();
    let results = s
        .execute_batch(
            "CREATE TABLE t(x INT); INSERT INTO t VALUES(1); SELECT nope FROM t; SELECT x FROM t",
        )
        .unwrap();
    assert_eq!(results.len(), 4);
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(results[2].is_err(), "the bad statement fails alone");
    assert!(results[3].is_ok(), "later statements still run");
}

#[test]
fn import_reads_streamed_text() {
    let s = session();
    let script = "CREATE TABLE i(v INT); -- comment with ; inside\nINSERT INTO i VALUES(1);(";
    // the trailing garbage fails only its own statement
    let results = s.import(script.as_bytes()).unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(results[2].is_err());
    assert_eq!(rows(&s, "SELECT v FROM i"), vec![vec![int(1)]]);
}

#[test]
fn decimal_columns_keep_scale() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE m(price DECIMAL(10,2));
         INSERT INTO m VALUES(100), (99.999), ('12.3');",
    );
    assert_eq!(
        rows(&s, "SELECT price FROM m"),
        vec![vec![dec("100.00")], vec![dec("100.00")], vec![dec("12.30")]],
        "values must be rescaled to the declared scale"
    );
}

#[test]
fn select_without_from_evaluates_expressions() {
    let s = session();
    assert_eq!(rows(&s, "SELECT 1 + 1"), vec![vec![int(2)]]);
    assert_eq!(
        rows(&s, "SELECT UPPER('abc') AS u"),
        vec![vec![text("ABC")]]
    );
    // a scalar subquery works without FROM too
    exec(&s, "CREATE TABLE t(x INT); INSERT INTO t VALUES(5);");
    assert_eq!(rows(&s, "SELECT (SELECT MAX(x) FROM t)"), vec![vec![int(5)]]);
}
