//! memql: an in-memory SQL database engine speaking a MySQL-flavored
//! dialect.
//!
//! SQL text goes in through [`Session::execute`], gets parsed into a
//! statement tree, validated against the in-memory catalog and executed
//! against insertion-ordered tables with column constraints, foreign
//! keys, correlated subqueries, joins, aggregation, set operations and
//! transactions with an undo log.
//!
//! ```
//! use std::sync::Arc;
//! use memql::{Engine, StatementOutput};
//!
//! let engine = Arc::new(Engine::new());
//! let session = engine.session();
//! session.execute("CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(50))").unwrap();
//! session.execute("INSERT INTO t VALUES (1, 'one')").unwrap();
//! match session.execute("SELECT name FROM t WHERE id = 1").unwrap() {
//!     StatementOutput::Rows(rows) => assert_eq!(rows.rows.len(), 1),
//!     other => panic!("unexpected output {other:?}"),
//! }
//! ```

pub mod ast;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod exec;
pub mod fk;
pub mod lexer;
pub mod parser;
pub mod session;
pub mod txn;
pub mod value;

// Re-exports for convenient access: use memql::Engine;
pub use crate::engine::Engine;
pub use crate::error::{Error, Result};
pub use crate::exec::{CancelFlag, RowSet, StatementOutput};
pub use crate::session::{Session, StatementResult};
pub use crate::value::{DataType, Value};
