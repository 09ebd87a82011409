//! The engine: the shared in-memory database behind a reader/writer
//! lock, plus statement splitting for batch and import input.
//!
//! An [`Engine`] is the unit of state; everything session-local
//! (autocommit, recording, the active transaction) lives in
//! [`crate::session::Session`]. Statements run to completion while
//! holding the engine lock: pure reads share the read lock, everything
//! else takes the write lock.

use std::sync::{Arc, RwLock};

use crate::catalog::{Database, IndexDescription, SchemaSnapshot, TableDescription};
use crate::error::{Error, Result};
use crate::session::Session;

/// The shared engine state.
#[derive(Debug, Default)]
pub struct Engine {
    pub(crate) db: RwLock<Database>,
}

impl Engine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session against this engine.
    #[must_use]
    pub fn session(self: &Arc<Self>) -> Session {
        Session::new(Arc::clone(self))
    }

    /// Table names in creation order.
    pub fn list_tables(&self) -> Vec<String> {
        self.read().table_names()
    }

    /// Column-level description of one table.
    pub fn describe_table(&self, name: &str) -> Result<TableDescription> {
        Ok(self.read().table(name)?.describe())
    }

    /// All indexes of one table, parsed-but-inactive ones included.
    pub fn show_indexes(&self, name: &str) -> Result<Vec<IndexDescription>> {
        Ok(self.read().table(name)?.describe().indexes)
    }

    /// A serializable snapshot of the whole catalog.
    pub fn schema_snapshot(&self) -> SchemaSnapshot {
        let db = self.read();
        SchemaSnapshot {
            tables: db
                .table_names()
                .iter()
                .filter_map(|n| db.table(n).ok().map(|t| t.describe()))
                .collect(),
        }
    }

    pub(crate) fn read(&self) -> std::sync::RwLockReadGuard<'_, Database> {
        self.db.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> std::sync::RwLockWriteGuard<'_, Database> {
        self.db
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Splits a script on top-level `;`, honoring single/double/backtick
/// quoting and `--`, `#` and `/* ... */` comments. Trailing empty
/// statements are dropped; comments between statements are kept with
/// the statement that follows them.
pub fn split_statements(sql: &str) -> Result<Vec<String>> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                current.push(c);
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == '\\' && c != '`' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                        continue;
                    }
                    if inner == c {
                        // doubled quote stays inside the literal
                        if chars.peek() == Some(&c) {
                            if let Some(doubled) = chars.next() {
                                current.push(doubled);
                            }
                            continue;
                        }
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(Error::syntax("unterminated quoted literal", 0, 0));
                }
            }
            '#' => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                let mut ahead = chars.clone();
                ahead.next();
                match ahead.peek() {
                    None | Some(' ' | '\t' | '\r' | '\n') => {
                        chars.next();
                        for inner in chars.by_ref() {
                            if inner == '\n' {
                                current.push('\n');
                                break;
                            }
                        }
                    }
                    Some(_) => current.push('-'),
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    if inner == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(Error::syntax("unterminated block comment", 0, 0));
                }
                current.push(' ');
            }
            ';' => {
                if !current.trim().is_empty() {
                    statements.push(current.trim().to_string());
                }
                current.clear();
            }
            other => current.push(other),
        }
    }
    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }
    Ok(statements)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_semicolons() {
        let parts = split_statements("SELECT 1; SELECT 2;;  ;").unwrap();
        assert_eq!(parts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn semicolons_inside_quotes_do_not_split() {
        let parts = split_statements("INSERT INTO t VALUES('a;b'); SELECT \";\" ; SELECT 1").unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INSERT INTO t VALUES('a;b')");
        assert_eq!(parts[1], "SELECT \";\"");
    }

    #[test]
    fn comments_hide_semicolons() {
        let parts =
            split_statements("SELECT 1 -- not; here\n; SELECT /* ; */ 2; # tail;\nSELECT 3")
                .unwrap();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].contains('2'));
        assert!(parts[2].contains('3'));
    }

    #[test]
    fn escaped_quotes_stay_in_one_statement() {
        let parts = split_statements(r"INSERT INTO t VALUES('it''s; fine'); SELECT 'a\'b;'").unwrap();
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn unterminated_literal_is_an_error() {
        assert!(split_statements("SELECT 'oops").is_err());
    }
}
