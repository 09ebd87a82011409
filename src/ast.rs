//! Abstract syntax tree for the accepted SQL surface.
//!
//! The parser produces these types; the executor consumes them. The tree
//! is deliberately shaped for execution: UNION arms hang off the first
//! SELECT, joins hang off their leading table factor, and `VALUES(col)`
//! inside ON DUPLICATE KEY UPDATE is its own expression node.

use std::fmt;

use crate::catalog::{ColumnDefault, ReferentialAction};
use crate::value::{DataType, Value};

/// One parsed SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// CREATE TABLE
    CreateTable(CreateTable),
    /// CREATE [UNIQUE|FULLTEXT] INDEX
    CreateIndex(CreateIndex),
    /// DROP TABLE
    DropTable {
        /// Tables to drop
        names: Vec<String>,
        /// IF EXISTS was given
        if_exists: bool,
    },
    /// DROP INDEX name ON table
    DropIndex {
        /// Index name
        name: String,
        /// Owning table
        table: String,
    },
    /// TRUNCATE TABLE
    TruncateTable {
        /// Table to empty
        name: String,
    },
    /// INSERT
    Insert(Insert),
    /// UPDATE
    Update(Update),
    /// DELETE
    Delete(Delete),
    /// SELECT (with any UNION arms)
    Select(Box<Query>),
    /// BEGIN / START TRANSACTION
    Begin,
    /// COMMIT
    Commit,
    /// ROLLBACK [TO SAVEPOINT name]
    Rollback {
        /// Savepoint target, when rolling back partially
        savepoint: Option<String>,
    },
    /// SAVEPOINT name
    Savepoint {
        /// Marker name
        name: String,
    },
    /// RELEASE SAVEPOINT name
    ReleaseSavepoint {
        /// Marker name
        name: String,
    },
    /// SET AUTOCOMMIT = 0|1
    SetAutocommit {
        /// New autocommit state
        enabled: bool,
    },
    /// SET [SESSION|GLOBAL] TRANSACTION ISOLATION LEVEL ... (recorded only)
    SetTransactionIsolation {
        /// Level text as written
        level: String,
    },
    /// SET [SESSION|GLOBAL] variable = value (accepted, no effect)
    SetVariable {
        /// Variable name as written
        name: String,
    },
    /// LOCK TABLES ... (accepted, no effect)
    LockTables,
    /// UNLOCK TABLES (accepted, no effect)
    UnlockTables,
    /// SHOW TABLES
    ShowTables,
    /// SHOW INDEX FROM table
    ShowIndexes {
        /// Table name
        table: String,
    },
    /// SHOW COLUMNS FROM table / DESCRIBE table
    ShowColumns {
        /// Table name
        table: String,
    },
}

/// CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    /// Table name
    pub name: String,
    /// IF NOT EXISTS was given
    pub if_not_exists: bool,
    /// Column definitions in order
    pub columns: Vec<ColumnDef>,
    /// Table-level constraints
    pub constraints: Vec<TableConstraint>,
}

/// One column definition inside CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Declared type
    pub data_type: DataType,
    /// Some(false) for NOT NULL, Some(true) for explicit NULL
    pub nullable: Option<bool>,
    /// UNIQUE was given inline
    pub unique: bool,
    /// PRIMARY KEY was given inline
    pub primary_key: bool,
    /// AUTO_INCREMENT was given
    pub auto_increment: bool,
    /// DEFAULT clause
    pub default: Option<ColumnDefault>,
    /// ON UPDATE CURRENT_TIMESTAMP was given
    pub on_update_current_timestamp: bool,
}

/// Table-level constraint inside CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    /// PRIMARY KEY (cols)
    PrimaryKey {
        /// Key columns
        columns: Vec<String>,
    },
    /// UNIQUE [KEY] [name] (cols)
    Unique {
        /// Optional constraint name
        name: Option<String>,
        /// Key columns
        columns: Vec<String>,
    },
    /// INDEX/KEY [name] (cols)
    Index {
        /// Optional index name
        name: Option<String>,
        /// Indexed columns
        columns: Vec<String>,
    },
    /// FULLTEXT [INDEX|KEY] [name] (cols)
    Fulltext {
        /// Optional index name
        name: Option<String>,
        /// Indexed columns
        columns: Vec<String>,
    },
    /// FOREIGN KEY (col) REFERENCES table (col) [ON DELETE ...] [ON UPDATE ...]
    ForeignKey {
        /// Optional constraint name
        name: Option<String>,
        /// Child columns
        columns: Vec<String>,
        /// Parent table
        ref_table: String,
        /// Parent columns
        ref_columns: Vec<String>,
        /// Action on parent DELETE
        on_delete: Option<ReferentialAction>,
        /// Action on parent UPDATE
        on_update: Option<ReferentialAction>,
    },
    /// CHECK (expr), accepted and ignored
    Check,
}

/// CREATE INDEX statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    /// Index name
    pub name: String,
    /// Table the index is created on
    pub table: String,
    /// Indexed columns
    pub columns: Vec<String>,
    /// UNIQUE was given
    pub unique: bool,
    /// FULLTEXT was given
    pub fulltext: bool,
}

/// INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    /// Target table
    pub table: String,
    /// Explicit column list; empty means all columns in order
    pub columns: Vec<String>,
    /// Row source
    pub source: InsertSource,
    /// ON DUPLICATE KEY UPDATE assignments; empty means none
    pub on_duplicate: Vec<Assignment>,
}

/// Where an INSERT takes its rows from.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// VALUES (...), (...)
    Values(Vec<Vec<Expr>>),
    /// INSERT ... SELECT
    Select(Box<Query>),
}

/// `col = expr` in UPDATE or ON DUPLICATE KEY UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Target column
    pub column: String,
    /// New value expression
    pub value: Expr,
}

/// UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Target table
    pub table: String,
    /// SET assignments in order
    pub assignments: Vec<Assignment>,
    /// WHERE predicate
    pub selection: Option<Expr>,
}

/// DELETE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    /// Target table
    pub table: String,
    /// WHERE predicate
    pub selection: Option<Expr>,
}

/// A full query: the first SELECT, any UNION arms, and the trailing
/// ORDER BY / LIMIT that apply to the combined result.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// First SELECT block
    pub body: Select,
    /// UNION [ALL] arms, applied left to right
    pub unions: Vec<UnionArm>,
    /// ORDER BY over the (combined) result
    pub order_by: Vec<OrderByExpr>,
    /// LIMIT over the (combined) result
    pub limit: Option<Limit>,
}

/// One `UNION [ALL] SELECT ...` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionArm {
    /// UNION ALL keeps duplicates
    pub all: bool,
    /// The SELECT block of this arm
    pub select: Select,
}

/// One SELECT block.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// DISTINCT was given
    pub distinct: bool,
    /// Projection list
    pub projection: Vec<SelectItem>,
    /// FROM sources (comma list); empty means no FROM
    pub from: Vec<TableRef>,
    /// WHERE predicate
    pub selection: Option<Expr>,
    /// GROUP BY expressions
    pub group_by: Vec<Expr>,
    /// HAVING predicate
    pub having: Option<Expr>,
}

/// One projection item.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `alias.*`
    QualifiedWildcard(String),
    /// An expression with an optional AS alias
    Expr {
        /// The projected expression
        expr: Expr,
        /// AS alias, when given
        alias: Option<String>,
    },
}

/// A FROM entry: a leading factor plus its chained joins.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    /// The leading table or derived table
    pub factor: TableFactor,
    /// JOINs chained onto it
    pub joins: Vec<Join>,
}

/// A table or a derived table in FROM.
#[derive(Debug, Clone, PartialEq)]
pub enum TableFactor {
    /// A named table with an optional alias
    Table {
        /// Table name
        name: String,
        /// Alias, when given
        alias: Option<String>,
    },
    /// `(SELECT ...) AS alias`
    Derived {
        /// The subquery
        query: Box<Query>,
        /// Required alias
        alias: String,
    },
}

impl TableFactor {
    /// The name the factor binds in scope: its alias, or the table name.
    #[must_use]
    pub fn binding_name(&self) -> &str {
        match self {
            TableFactor::Table { name, alias } => alias.as_deref().unwrap_or(name),
            TableFactor::Derived { alias, .. } => alias,
        }
    }
}

/// One JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Join flavor
    pub kind: JoinKind,
    /// The joined factor
    pub factor: TableFactor,
    /// ON predicate; None for CROSS JOIN
    pub on: Option<Expr>,
}

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// INNER JOIN / JOIN
    Inner,
    /// LEFT [OUTER] JOIN
    Left,
    /// RIGHT [OUTER] JOIN (executed as a mirrored LEFT)
    Right,
    /// CROSS JOIN
    Cross,
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    /// Sort expression
    pub expr: Expr,
    /// Ascending (default) or descending
    pub asc: bool,
}

/// LIMIT [offset,] count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    /// Rows to skip
    pub offset: u64,
    /// Rows to keep
    pub count: u64,
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A typed literal
    Literal(Value),
    /// A column reference, optionally qualified
    Column {
        /// Table or alias qualifier
        table: Option<String>,
        /// Column name
        name: String,
    },
    /// Binary operator application
    BinaryOp {
        /// Left operand
        left: Box<Expr>,
        /// Operator
        op: BinaryOp,
        /// Right operand
        right: Box<Expr>,
    },
    /// Unary operator application
    UnaryOp {
        /// Operator
        op: UnaryOp,
        /// Operand
        expr: Box<Expr>,
    },
    /// `expr IS [NOT] NULL`
    IsNull {
        /// Tested expression
        expr: Box<Expr>,
        /// IS NOT NULL
        negated: bool,
    },
    /// `expr IS [NOT] TRUE/FALSE`
    IsBool {
        /// Tested expression
        expr: Box<Expr>,
        /// IS NOT ...
        negated: bool,
        /// TRUE or FALSE side
        value: bool,
    },
    /// `expr [NOT] BETWEEN low AND high`
    Between {
        /// Tested expression
        expr: Box<Expr>,
        /// NOT BETWEEN
        negated: bool,
        /// Lower bound
        low: Box<Expr>,
        /// Upper bound
        high: Box<Expr>,
    },
    /// `expr [NOT] IN (list)`
    InList {
        /// Tested expression
        expr: Box<Expr>,
        /// Candidate expressions
        list: Vec<Expr>,
        /// NOT IN
        negated: bool,
    },
    /// `expr [NOT] IN (subquery)`
    InSubquery {
        /// Tested expression
        expr: Box<Expr>,
        /// The set-producing subquery
        query: Box<Query>,
        /// NOT IN
        negated: bool,
    },
    /// `expr [NOT] LIKE pattern`
    Like {
        /// Tested expression
        expr: Box<Expr>,
        /// Pattern expression
        pattern: Box<Expr>,
        /// NOT LIKE
        negated: bool,
    },
    /// `[NOT] EXISTS (subquery)`
    Exists {
        /// The subquery
        query: Box<Query>,
        /// NOT EXISTS
        negated: bool,
    },
    /// A scalar subquery in expression position
    Subquery(Box<Query>),
    /// A function call (scalar or aggregate)
    Function(FunctionCall),
    /// CASE, simple (with operand) or searched
    Case {
        /// Operand of the simple form
        operand: Option<Box<Expr>>,
        /// WHEN/THEN pairs in order
        branches: Vec<(Expr, Expr)>,
        /// ELSE result
        else_result: Option<Box<Expr>>,
    },
    /// CAST(expr AS type) / CONVERT(expr, type)
    Cast {
        /// Source expression
        expr: Box<Expr>,
        /// Target type
        data_type: DataType,
    },
    /// `VALUES(col)` inside ON DUPLICATE KEY UPDATE
    InsertValues {
        /// Column whose would-be-inserted value is referenced
        column: String,
    },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// AND
    And,
    /// OR
    Or,
    /// `=`
    Eq,
    /// `<>` / `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%` / MOD
    Modulo,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// NOT
    Not,
    /// Unary minus
    Neg,
}

/// A function call.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Function name, uppercased by the parser
    pub name: String,
    /// Arguments in order
    pub args: Vec<FunctionArg>,
    /// COUNT(DISTINCT ...) style distinct flag
    pub distinct: bool,
}

/// One function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArg {
    /// A regular expression argument
    Expr(Expr),
    /// `*` as in COUNT(*)
    Star,
}

impl FunctionCall {
    /// Whether the name is one of the aggregate functions.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        matches!(self.name.as_str(), "COUNT" | "SUM" | "AVG" | "MIN" | "MAX")
    }
}

impl Expr {
    /// Whether any aggregate function call occurs in this tree (without
    /// descending into subqueries, which aggregate on their own).
    #[must_use]
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Function(f) => {
                f.is_aggregate()
                    || f.args.iter().any(|a| match a {
                        FunctionArg::Expr(e) => e.contains_aggregate(),
                        FunctionArg::Star => false,
                    })
            }
            Expr::BinaryOp { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::UnaryOp { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::IsBool { expr, .. }
            | Expr::Cast { expr, .. } => expr.contains_aggregate(),
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate()
            }
            Expr::InList { expr, list, .. } => {
                expr.contains_aggregate() || list.iter().any(Expr::contains_aggregate)
            }
            Expr::InSubquery { expr, .. } | Expr::Like { expr, .. } => expr.contains_aggregate(),
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                operand.as_deref().is_some_and(Expr::contains_aggregate)
                    || branches
                        .iter()
                        .any(|(w, t)| w.contains_aggregate() || t.contains_aggregate())
                    || else_result.as_deref().is_some_and(Expr::contains_aggregate)
            }
            _ => false,
        }
    }
}

// Display renderings give projection columns their synthetic names, so
// they stay close to the SQL as written.

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => match v {
                Value::Text(s) => write!(f, "'{s}'"),
                Value::Null => write!(f, "NULL"),
                other => write!(f, "{other}"),
            },
            Expr::Column { table, name } => match table {
                Some(t) => write!(f, "{t}.{name}"),
                None => write!(f, "{name}"),
            },
            Expr::BinaryOp { left, op, right } => write!(f, "{left} {op} {right}"),
            Expr::UnaryOp { op, expr } => match op {
                UnaryOp::Not => write!(f, "NOT {expr}"),
                UnaryOp::Neg => write!(f, "-{expr}"),
            },
            Expr::IsNull { expr, negated } => {
                write!(f, "{expr} IS {}NULL", if *negated { "NOT " } else { "" })
            }
            Expr::IsBool {
                expr,
                negated,
                value,
            } => write!(
                f,
                "{expr} IS {}{}",
                if *negated { "NOT " } else { "" },
                if *value { "TRUE" } else { "FALSE" }
            ),
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => write!(
                f,
                "{expr} {}BETWEEN {low} AND {high}",
                if *negated { "NOT " } else { "" }
            ),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                write!(f, "{expr} {}IN (", if *negated { "NOT " } else { "" })?;
                for (i, e) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            Expr::InSubquery { expr, negated, .. } => write!(
                f,
                "{expr} {}IN (subquery)",
                if *negated { "NOT " } else { "" }
            ),
            Expr::Like {
                expr,
                pattern,
                negated,
            } => write!(
                f,
                "{expr} {}LIKE {pattern}",
                if *negated { "NOT " } else { "" }
            ),
            Expr::Exists { negated, .. } => {
                write!(f, "{}EXISTS (subquery)", if *negated { "NOT " } else { "" })
            }
            Expr::Subquery(_) => write!(f, "(subquery)"),
            Expr::Function(call) => {
                write!(f, "{}(", call.name)?;
                if call.distinct {
                    write!(f, "DISTINCT ")?;
                }
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match arg {
                        FunctionArg::Expr(e) => write!(f, "{e}")?,
                        FunctionArg::Star => write!(f, "*")?,
                    }
                }
                write!(f, ")")
            }
            Expr::Case { .. } => write!(f, "CASE"),
            Expr::Cast { expr, data_type } => {
                write!(f, "CAST({expr} AS {})", data_type.sql_name())
            }
            Expr::InsertValues { column } => write!(f, "VALUES({column})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_builds_synthetic_column_names() {
        let expr = Expr::BinaryOp {
            left: Box::new(Expr::Column {
                table: Some("t".to_string()),
                name: "a".to_string(),
            }),
            op: BinaryOp::Plus,
            right: Box::new(Expr::Literal(Value::Integer(1))),
        };
        assert_eq!(expr.to_string(), "t.a + 1");

        let call = Expr::Function(FunctionCall {
            name: "COUNT".to_string(),
            args: vec![FunctionArg::Star],
            distinct: false,
        });
        assert_eq!(call.to_string(), "COUNT(*)");
    }

    #[test]
    fn aggregate_detection_sees_through_operators() {
        let expr = Expr::BinaryOp {
            left: Box::new(Expr::Function(FunctionCall {
                name: "SUM".to_string(),
                args: vec![FunctionArg::Expr(Expr::Column {
                    table: None,
                    name: "x".to_string(),
                })],
                distinct: false,
            })),
            op: BinaryOp::Divide,
            right: Box::new(Expr::Literal(Value::Integer(2))),
        };
        assert!(expr.contains_aggregate());
        assert!(!Expr::Literal(Value::Integer(1)).contains_aggregate());
    }
}
