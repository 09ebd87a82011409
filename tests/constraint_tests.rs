//! Column- and table-level constraint enforcement: NOT NULL, UNIQUE,
//! defaults, ENUM/SET/YEAR domains and the referential actions.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{error, exec, int, rows, session, text};
use memql::{Error, Value};

#[test]
fn not_null_is_enforced_on_insert_and_update() {
    let s = session();
    exec(&s, "CREATE TABLE t(a INT NOT NULL, b INT)");
    let err = error(&s, "INSERT INTO t VALUES(NULL, 1)");
    assert!(matches!(err, Error::Constraint(_)), "got {err}");

    exec(&s, "INSERT INTO t VALUES(1, 1)");
    let err = error(&s, "UPDATE t SET a = NULL");
    assert!(matches!(err, Error::Constraint(_)));
    // a column omitted by the insert with no default is NULL and fails too
    let err = error(&s, "INSERT INTO t(b) VALUES(2)");
    assert!(matches!(err, Error::Constraint(_)));
}

#[test]
fn unique_rejects_duplicates_but_not_nulls() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(email VARCHAR(100) UNIQUE);
         INSERT INTO t VALUES('a@x');",
    );
    let err = error(&s, "INSERT INTO t VALUES('a@x')");
    assert!(err.to_string().contains("duplicate entry"));

    // NULLs never collide with each other
    exec(&s, "INSERT INTO t VALUES(NULL); INSERT INTO t VALUES(NULL);");
    assert_eq!(rows(&s, "SELECT COUNT(*) FROM t"), vec![vec![int(3)]]);
}

#[test]
fn primary_key_conflicts_roll_back_the_whole_statement() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(id INT PRIMARY KEY);
         INSERT INTO t VALUES(1);",
    );
    // the second row conflicts; the first must not survive either
    let err = error(&s, "INSERT INTO t VALUES(2), (1)");
    assert!(err.to_string().contains("duplicate entry"));
    assert_eq!(
        rows(&s, "SELECT id FROM t ORDER BY id"),
        vec![vec![int(1)]],
        "a failed multi-row insert leaves nothing behind"
    );
}

#[test]
fn defaults_fill_omitted_columns() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(id INT PRIMARY KEY AUTO_INCREMENT,
                        status VARCHAR(10) DEFAULT 'new',
                        n INT DEFAULT 0,
                        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP);
         INSERT INTO t(n) VALUES(5);",
    );
    let got = rows(&s, "SELECT status, n FROM t");
    assert_eq!(got, vec![vec![text("new"), int(5)]]);
    let created = rows(&s, "SELECT created_at FROM t");
    assert!(
        !created[0][0].is_null(),
        "CURRENT_TIMESTAMP default must fill in"
    );
}

#[test]
fn enum_membership_and_ordinals() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(state ENUM('draft','live','gone'));
         INSERT INTO t VALUES('live'), (1), ('DRAFT');",
    );
    let got = rows(&s, "SELECT state FROM t");
    assert_eq!(got[0][0].to_text(), "live");
    assert_eq!(got[1][0].to_text(), "draft", "ordinal 1 picks the first member");
    assert_eq!(got[2][0].to_text(), "draft", "member match keeps the declared spelling");

    let err = error(&s, "INSERT INTO t VALUES('unknown')");
    assert!(matches!(err, Error::Constraint(_)));
    let err = error(&s, "INSERT INTO t VALUES(4)");
    assert!(matches!(err, Error::Constraint(_)));
}

#[test]
fn set_members_normalize_and_reject_unknowns() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(tags SET('a','b','c'));
         INSERT INTO t VALUES('c,a'), ('');",
    );
    let got = rows(&s, "SELECT tags FROM t");
    assert_eq!(got[0][0].to_text(), "a,c", "set values keep declared member order");
    assert_eq!(got[1][0].to_text(), "");

    assert!(matches!(
        error(&s, "INSERT INTO t VALUES('a,d')"),
        Error::Constraint(_)
    ));
    assert!(matches!(
        error(&s, "INSERT INTO t VALUES('a,a')"),
        Error::Constraint(_)
    ));
}

#[test]
fn year_range_and_two_digit_mapping() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(y YEAR);
         INSERT INTO t VALUES(99), (5), (2024);",
    );
    let got = rows(&s, "SELECT y FROM t");
    assert_eq!(got, vec![vec![Value::Year(1999)], vec![Value::Year(2005)], vec![Value::Year(2024)]]);
    assert!(matches!(
        error(&s, "INSERT INTO t VALUES(1900)"),
        Error::Constraint(_)
    ));
}

#[test]
fn varchar_length_and_bad_dates_fail_insertion() {
    let s = session();
    exec(&s, "CREATE TABLE t(s VARCHAR(3), d DATE)");
    assert!(matches!(
        error(&s, "INSERT INTO t VALUES('abcd', NULL)"),
        Error::Constraint(_)
    ));
    assert!(matches!(
        error(&s, "INSERT INTO t VALUES('ab', '2024-13-40')"),
        Error::Constraint(_)
    ));
    exec(&s, "INSERT INTO t VALUES('ab', '2024-02-29')");
}

#[test]
fn foreign_key_insert_requires_parent() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE p(id INT PRIMARY KEY);
         CREATE TABLE c(pid INT, FOREIGN KEY(pid) REFERENCES p(id));
         INSERT INTO p VALUES(1);",
    );
    exec(&s, "INSERT INTO c VALUES(1); INSERT INTO c VALUES(NULL);");
    let err = error(&s, "INSERT INTO c VALUES(2)");
    assert!(matches!(err, Error::ForeignKey(_)), "got {err}");
}

#[test]
fn restrict_blocks_delete_and_update() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE p(id INT PRIMARY KEY);
         CREATE TABLE c(pid INT, FOREIGN KEY(pid) REFERENCES p(id) ON DELETE RESTRICT ON UPDATE RESTRICT);
         INSERT INTO p VALUES(1), (2);
         INSERT INTO c VALUES(1);",
    );
    assert!(matches!(error(&s, "DELETE FROM p WHERE id = 1"), Error::ForeignKey(_)));
    assert!(matches!(error(&s, "UPDATE p SET id = 9 WHERE id = 1"), Error::ForeignKey(_)));
    // the unreferenced parent row moves freely
    exec(&s, "DELETE FROM p WHERE id = 2");
}

#[test]
fn cascade_update_propagates_new_keys() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE p(id INT PRIMARY KEY);
         CREATE TABLE c(pid INT, FOREIGN KEY(pid) REFERENCES p(id) ON UPDATE CASCADE);
         INSERT INTO p VALUES(1);
         INSERT INTO c VALUES(1), (1);
         UPDATE p SET id = 7 WHERE id = 1;",
    );
    assert_eq!(
        rows(&s, "SELECT pid FROM c"),
        vec![vec![int(7)], vec![int(7)]]
    );
}

#[test]
fn set_null_and_set_default_actions() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE p(id INT PRIMARY KEY);
         CREATE TABLE c1(pid INT, FOREIGN KEY(pid) REFERENCES p(id) ON DELETE SET NULL);
         CREATE TABLE c2(pid INT DEFAULT 99, FOREIGN KEY(pid) REFERENCES p(id) ON DELETE SET DEFAULT);
         INSERT INTO p VALUES(1), (99);
         INSERT INTO c1 VALUES(1);
         INSERT INTO c2 VALUES(1);
         DELETE FROM p WHERE id = 1;",
    );
    assert_eq!(rows(&s, "SELECT pid FROM c1"), vec![vec![Value::Null]]);
    assert_eq!(rows(&s, "SELECT pid FROM c2"), vec![vec![int(99)]]);
}

#[test]
fn set_null_into_not_null_fails() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE p(id INT PRIMARY KEY);
         CREATE TABLE c(pid INT NOT NULL, FOREIGN KEY(pid) REFERENCES p(id) ON DELETE SET NULL);
         INSERT INTO p VALUES(1);
         INSERT INTO c VALUES(1);",
    );
    let err = error(&s, "DELETE FROM p WHERE id = 1");
    assert!(matches!(err, Error::ForeignKey(_)));
    // the failed statement left the parent in place
    assert_eq!(rows(&s, "SELECT id FROM p"), vec![vec![int(1)]]);
}

#[test]
fn self_referencing_cascade_reports_a_cycle() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE emp(id INT PRIMARY KEY, boss INT,
           FOREIGN KEY(boss) REFERENCES emp(id) ON DELETE CASCADE);
         INSERT INTO emp VALUES(1, NULL);
         INSERT INTO emp VALUES(2, 1);",
    );
    let err = error(&s, "DELETE FROM emp WHERE id = 1");
    assert!(matches!(err, Error::ForeignKeyCycle(_)), "got {err}");
    // nothing was lost
    assert_eq!(rows(&s, "SELECT COUNT(*) FROM emp"), vec![vec![int(2)]]);
}

#[test]
fn drop_table_blocked_by_incoming_fk() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE p(id INT PRIMARY KEY);
         CREATE TABLE c(pid INT, FOREIGN KEY(pid) REFERENCES p(id));",
    );
    let err = error(&s, "DROP TABLE p");
    assert!(matches!(err, Error::ForeignKey(_)));
    // dropping both in one statement orders children first
    exec(&s, "DROP TABLE p, c");
    assert!(s.engine().list_tables().is_empty());
}

#[test]
fn truncate_blocked_by_dependent_rows() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE p(id INT PRIMARY KEY);
         CREATE TABLE c(pid INT, FOREIGN KEY(pid) REFERENCES p(id));
         INSERT INTO p VALUES(1);
         INSERT INTO c VALUES(1);",
    );
    assert!(matches!(error(&s, "TRUNCATE TABLE p"), Error::ForeignKey(_)));
    exec(&s, "DELETE FROM c; TRUNCATE TABLE p;");
    assert_eq!(rows(&s, "SELECT COUNT(*) FROM p"), vec![vec![int(0)]]);
}

#[test]
fn create_unique_index_validates_existing_data() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(v INT);
         INSERT INTO t VALUES(1), (1);",
    );
    let err = error(&s, "CREATE UNIQUE INDEX uq_v ON t(v)");
    assert!(matches!(err, Error::Constraint(_)));

    exec(&s, "DELETE FROM t WHERE v = 1; INSERT INTO t VALUES(1), (2);");
    exec(&s, "CREATE UNIQUE INDEX uq_v ON t(v)");
    // and now the index enforces uniqueness for new writes
    let err = error(&s, "INSERT INTO t VALUES(2)");
    assert!(err.to_string().contains("duplicate entry"));
}

#[test]
fn fulltext_and_composite_indexes_are_recorded_only() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(a INT, b INT, body TEXT);
         CREATE INDEX ab ON t(a, b);
         CREATE FULLTEXT INDEX ft ON t(body);",
    );
    let indexes = rows(&s, "SHOW INDEX FROM t");
    let names: Vec<String> = indexes.iter().map(|r| r[2].to_text()).collect();
    assert!(names.contains(&"ab".to_string()));
    assert!(names.contains(&"ft".to_string()));
    // the composite index lists both columns in sequence
    let ab_rows: Vec<_> = indexes.iter().filter(|r| r[2].to_text() == "ab").collect();
    assert_eq!(ab_rows.len(), 2);
    assert_eq!(ab_rows[0][3], int(1));
    assert_eq!(ab_rows[1][3], int(2));
}

#[test]
fn drop_index_removes_it() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(v INT);
         CREATE INDEX iv ON t(v);
         DROP INDEX iv ON t;",
    );
    let indexes = rows(&s, "SHOW INDEX FROM t");
    assert!(indexes.is_empty());
    assert!(matches!(error(&s, "DROP INDEX iv ON t"), Error::Schema(_)));
}

#[test]
fn on_update_current_timestamp_refreshes() {
    let s = session();
    exec(
        &s,
        "CREATE TABLE t(id INT PRIMARY KEY, v INT,
           touched TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP);
         INSERT INTO t(id, v) VALUES(1, 0);",
    );
    exec(&s, "UPDATE t SET v = 1 WHERE id = 1");
    let got = rows(&s, "SELECT touched FROM t");
    assert!(!got[0][0].is_null());
}
