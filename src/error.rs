//! Error types for engine operations.
//!
//! Every failure the engine can produce is a variant of [`Error`], so callers
//! can match on the failure kind while still getting a message that names the
//! offending table, column or value.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error cases for parsing, validation and execution.
#[derive(Error, Debug)]
pub enum Error {
    /// The SQL text was rejected by the lexer or parser.
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// What the parser expected or found
        message: String,
        /// 1-based line in the statement text
        line: u32,
        /// 1-based column in the statement text
        column: u32,
    },

    /// Unknown table/column, duplicate definition or otherwise invalid DDL.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Incompatible coercion, or arithmetic undefined for the operand types.
    #[error("Type error: {0}")]
    Type(String),

    /// NOT NULL, UNIQUE/PRIMARY KEY, ENUM/SET membership, column length,
    /// YEAR range or similar column-level constraint failure.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Missing parent row, RESTRICT blocked, SET NULL into a NOT NULL
    /// column or SET DEFAULT without a declared default.
    #[error("Foreign key violation: {0}")]
    ForeignKey(String),

    /// Referential actions looped back into an already-visited table.
    #[error("Foreign key cascade cycle detected at table '{0}'")]
    ForeignKeyCycle(String),

    /// A scalar subquery produced more than one row.
    #[error("Subquery returned more than one row")]
    SubqueryCardinality,

    /// A scalar or IN subquery produced the wrong number of columns.
    #[error("Subquery must return exactly one column, got {0}")]
    SubqueryShape(usize),

    /// An unqualified column name matched more than one FROM source.
    #[error("Column reference '{0}' is ambiguous")]
    AmbiguousReference(String),

    /// COMMIT/ROLLBACK without an active transaction, nested BEGIN or an
    /// unknown savepoint name.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The statement was cancelled externally.
    #[error("Statement execution cancelled")]
    Cancelled,

    /// Reading streamed SQL input failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a syntax error with a position.
    pub fn syntax(message: impl Into<String>, line: u32, column: u32) -> Self {
        Error::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    /// Builds a schema error for a table that does not exist.
    pub fn unknown_table(name: &str) -> Self {
        Error::Schema(format!("table '{name}' does not exist"))
    }

    /// Builds a schema error for a column that does not exist.
    pub fn unknown_column(table: &str, column: &str) -> Self {
        Error::Schema(format!("column '{column}' does not exist in table '{table}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_object() {
        let err = Error::unknown_table("users");
        assert_eq!(err.to_string(), "Schema error: table 'users' does not exist");

        let err = Error::unknown_column("users", "nope");
        assert_eq!(
            err.to_string(),
            "Schema error: column 'nope' does not exist in table 'users'"
        );

        let err = Error::syntax("expected expression", 2, 14);
        assert_eq!(
            err.to_string(),
            "Syntax error at line 2, column 14: expected expression"
        );
    }
}
