//! Expression evaluation against a row context.
//!
//! The evaluation context is a stack of lexical scopes: each scope binds
//! one pipeline row (one or more `(alias, columns, values)` table
//! bindings). Name resolution walks the stack innermost-first, which is
//! what makes correlated subqueries work: the executor pushes the outer
//! row as a scope before running the subquery.

pub mod functions;

use chrono::NaiveDateTime;

use crate::ast::{BinaryOp, Expr, FunctionArg, UnaryOp};
use crate::catalog::Database;
use crate::error::{Error, Result};
use crate::exec::CancelFlag;
use crate::value::{self, ArithOp, Value};

/// One table's worth of bindings inside a row scope.
#[derive(Debug, Clone)]
pub struct TableBinding {
    /// Alias (or table name) the binding answers to
    pub alias: String,
    /// Column names, aligned with `values`
    pub columns: Vec<String>,
    /// Cell values for the current row
    pub values: Vec<Value>,
}

impl TableBinding {
    /// Looks up a column by name within this binding.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|i| &self.values[i])
    }
}

/// One pipeline row: the table bindings visible at one nesting level.
#[derive(Debug, Clone, Default)]
pub struct RowScope {
    /// Table bindings in FROM order
    pub tables: Vec<TableBinding>,
}

impl RowScope {
    /// A scope with no bindings, for `SELECT expr` without FROM.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A scope over a single table binding.
    #[must_use]
    pub fn single(alias: &str, columns: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            tables: vec![TableBinding {
                alias: alias.to_string(),
                columns,
                values,
            }],
        }
    }
}

/// Borrowed stack of row scopes, innermost last. Pushing borrows the
/// parent, so subquery evaluation composes without cloning rows.
#[derive(Clone, Copy)]
pub struct Scopes<'a> {
    scope: &'a RowScope,
    parent: Option<&'a Scopes<'a>>,
}

impl<'a> Scopes<'a> {
    /// A stack holding a single scope.
    #[must_use]
    pub fn root(scope: &'a RowScope) -> Self {
        Self {
            scope,
            parent: None,
        }
    }

    /// Pushes `scope` as the new innermost frame.
    #[must_use]
    pub fn push<'b>(&'b self, scope: &'b RowScope) -> Scopes<'b> {
        Scopes {
            scope,
            parent: Some(self),
        }
    }

    /// Resolves a column reference, innermost scope first.
    ///
    /// Qualified references bind to the innermost scope that knows the
    /// alias; unqualified references bind to the innermost scope that
    /// contains the name, and a name present in two bindings of the same
    /// scope is ambiguous.
    pub fn resolve(&self, table: Option<&str>, name: &str) -> Result<Value> {
        let mut frame = Some(self);
        while let Some(current) = frame {
            match table {
                Some(alias) => {
                    let matching: Vec<&TableBinding> = current
                        .scope
                        .tables
                        .iter()
                        .filter(|b| b.alias.eq_ignore_ascii_case(alias))
                        .collect();
                    if let Some(binding) = matching.first() {
                        // the alias shadows any outer scope with the same name
                        return binding.get(name).cloned().ok_or_else(|| {
                            Error::unknown_column(alias, name)
                        });
                    }
                }
                None => {
                    let mut found: Option<&Value> = None;
                    for binding in &current.scope.tables {
                        if let Some(v) = binding.get(name) {
                            if found.is_some() {
                                return Err(Error::AmbiguousReference(name.to_string()));
                            }
                            found = Some(v);
                        }
                    }
                    if let Some(v) = found {
                        return Ok(v.clone());
                    }
                }
            }
            frame = current.parent;
        }
        match table {
            Some(alias) => Err(Error::Schema(format!(
                "unknown table or alias '{alias}' in reference '{alias}.{name}'"
            ))),
            None => Err(Error::Schema(format!("unknown column '{name}'"))),
        }
    }
}

/// The would-be-inserted row, visible to `VALUES(col)` inside
/// ON DUPLICATE KEY UPDATE.
#[derive(Clone, Copy)]
pub struct InsertRowRef<'a> {
    /// Column names of the target table
    pub columns: &'a [String],
    /// The values the rejected insert carried
    pub values: &'a [Value],
}

/// Everything expression evaluation needs besides the scope stack.
pub struct EvalContext<'a> {
    /// The catalog, for subquery execution
    pub db: &'a Database,
    /// Statement-fixed timestamp for NOW()/CURRENT_TIMESTAMP
    pub now: NaiveDateTime,
    /// Per-statement cancellation flag
    pub cancel: &'a CancelFlag,
    /// ON DUPLICATE KEY UPDATE insert-row reference, when applicable
    pub insert_row: Option<InsertRowRef<'a>>,
}

impl EvalContext<'_> {
    /// Fails with [`Error::Cancelled`] once the flag is set.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Evaluates `expr` against a single row. Aggregate calls are invalid
/// here; the executor evaluates grouped expressions through
/// [`eval_grouped_expr`].
pub fn eval_expr(ctx: &EvalContext, scopes: &Scopes, expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Column { table, name } => scopes.resolve(table.as_deref(), name),
        Expr::BinaryOp { left, op, right } => eval_binary(ctx, scopes, left, *op, right),
        Expr::UnaryOp { op, expr } => {
            let v = eval_expr(ctx, scopes, expr)?;
            match op {
                UnaryOp::Neg => value::negate(&v),
                UnaryOp::Not => Ok(bool3_to_value(not3(v.as_bool()))),
            }
        }
        Expr::IsNull { expr, negated } => {
            let v = eval_expr(ctx, scopes, expr)?;
            Ok(Value::Boolean(v.is_null() != *negated))
        }
        Expr::IsBool {
            expr,
            negated,
            value,
        } => {
            let v = eval_expr(ctx, scopes, expr)?;
            // IS TRUE / IS FALSE collapse Unknown to false
            let holds = v.as_bool() == Some(*value);
            Ok(Value::Boolean(holds != *negated))
        }
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let v = eval_expr(ctx, scopes, expr)?;
            let lo = eval_expr(ctx, scopes, low)?;
            let hi = eval_expr(ctx, scopes, high)?;
            let ge = value::compare(&v, &lo).map(std::cmp::Ordering::is_ge);
            let le = value::compare(&v, &hi).map(std::cmp::Ordering::is_le);
            let result = and3(ge, le);
            Ok(bool3_to_value(if *negated { not3(result) } else { result }))
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let needle = eval_expr(ctx, scopes, expr)?;
            let mut candidates = Vec::with_capacity(list.len());
            for item in list {
                candidates.push(eval_expr(ctx, scopes, item)?);
            }
            Ok(bool3_to_value(apply_in(&needle, &candidates, *negated)))
        }
        Expr::InSubquery {
            expr,
            query,
            negated,
        } => {
            let needle = eval_expr(ctx, scopes, expr)?;
            let candidates = crate::exec::select::in_subquery_values(ctx, query, Some(scopes))?;
            Ok(bool3_to_value(apply_in(&needle, &candidates, *negated)))
        }
        Expr::Like {
            expr,
            pattern,
            negated,
        } => {
            let v = eval_expr(ctx, scopes, expr)?;
            let p = eval_expr(ctx, scopes, pattern)?;
            if v.is_null() || p.is_null() {
                return Ok(Value::Null);
            }
            let matched = like_match(&v.to_text(), &p.to_text());
            Ok(Value::Boolean(matched != *negated))
        }
        Expr::Exists { query, negated } => {
            let exists = crate::exec::select::exists_subquery(ctx, query, Some(scopes))?;
            Ok(Value::Boolean(exists != *negated))
        }
        Expr::Subquery(query) => crate::exec::select::scalar_subquery(ctx, query, Some(scopes)),
        Expr::Function(call) => {
            if call.is_aggregate() {
                return Err(Error::Schema(format!(
                    "invalid use of aggregate function {}() outside an aggregate context",
                    call.name
                )));
            }
            functions::eval_function(ctx, scopes, call)
        }
        Expr::Case {
            operand,
            branches,
            else_result,
        } => eval_case(ctx, scopes, operand.as_deref(), branches, else_result.as_deref()),
        Expr::Cast { expr, data_type } => {
            let v = eval_expr(ctx, scopes, expr)?;
            value::coerce(&v, data_type, "CAST")
        }
        Expr::InsertValues { column } => {
            let Some(row) = ctx.insert_row else {
                return Err(Error::Schema(
                    "VALUES() is only valid in ON DUPLICATE KEY UPDATE".to_string(),
                ));
            };
            let idx = row
                .columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(column))
                .ok_or_else(|| Error::Schema(format!("unknown column '{column}' in VALUES()")))?;
            Ok(row.values[idx].clone())
        }
    }
}

/// Evaluates `expr` over a group of rows: aggregate calls accumulate
/// across `rows`, everything else is evaluated against `representative`
/// (the group's first row, or an empty scope for an empty group).
pub fn eval_grouped_expr(
    ctx: &EvalContext,
    outer: Option<&Scopes>,
    rows: &[RowScope],
    representative: &RowScope,
    expr: &Expr,
) -> Result<Value> {
    match expr {
        Expr::Function(call) if call.is_aggregate() => {
            functions::eval_aggregate(ctx, outer, rows, call)
        }
        // a scalar function over aggregates, like ROUND(AVG(x), 1)
        Expr::Function(call) if expr.contains_aggregate() => {
            let mut args = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                match arg {
                    FunctionArg::Expr(e) => {
                        args.push(eval_grouped_expr(ctx, outer, rows, representative, e)?);
                    }
                    FunctionArg::Star => {
                        return Err(Error::Schema(format!(
                            "'*' is not a valid argument to {}()",
                            call.name
                        )));
                    }
                }
            }
            functions::apply_function(ctx, &call.name, &args)
        }
        Expr::BinaryOp { left, op, right } => {
            let l = eval_grouped_expr(ctx, outer, rows, representative, left)?;
            let r = eval_grouped_expr(ctx, outer, rows, representative, right)?;
            combine_binary(*op, &l, &r)
        }
        Expr::UnaryOp { op, expr } => {
            let v = eval_grouped_expr(ctx, outer, rows, representative, expr)?;
            match op {
                UnaryOp::Neg => value::negate(&v),
                UnaryOp::Not => Ok(bool3_to_value(not3(v.as_bool()))),
            }
        }
        Expr::IsNull { expr, negated } => {
            let v = eval_grouped_expr(ctx, outer, rows, representative, expr)?;
            Ok(Value::Boolean(v.is_null() != *negated))
        }
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let v = eval_grouped_expr(ctx, outer, rows, representative, expr)?;
            let lo = eval_grouped_expr(ctx, outer, rows, representative, low)?;
            let hi = eval_grouped_expr(ctx, outer, rows, representative, high)?;
            let ge = value::compare(&v, &lo).map(std::cmp::Ordering::is_ge);
            let le = value::compare(&v, &hi).map(std::cmp::Ordering::is_le);
            let result = and3(ge, le);
            Ok(bool3_to_value(if *negated { not3(result) } else { result }))
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let needle = eval_grouped_expr(ctx, outer, rows, representative, expr)?;
            let mut candidates = Vec::with_capacity(list.len());
            for item in list {
                candidates.push(eval_grouped_expr(ctx, outer, rows, representative, item)?);
            }
            Ok(bool3_to_value(apply_in(&needle, &candidates, *negated)))
        }
        Expr::Case {
            operand,
            branches,
            else_result,
        } => {
            // CASE over aggregates: evaluate piecewise on grouped values
            let operand_value = operand
                .as_deref()
                .map(|o| eval_grouped_expr(ctx, outer, rows, representative, o))
                .transpose()?;
            for (when, then) in branches {
                let when_value = eval_grouped_expr(ctx, outer, rows, representative, when)?;
                let hit = match &operand_value {
                    Some(op_v) => value::equal(op_v, &when_value) == Some(true),
                    None => when_value.as_bool() == Some(true),
                };
                if hit {
                    return eval_grouped_expr(ctx, outer, rows, representative, then);
                }
            }
            match else_result {
                Some(e) => eval_grouped_expr(ctx, outer, rows, representative, e),
                None => Ok(Value::Null),
            }
        }
        Expr::Cast { expr, data_type } => {
            let v = eval_grouped_expr(ctx, outer, rows, representative, expr)?;
            value::coerce(&v, data_type, "CAST")
        }
        _ if !expr.contains_aggregate() => {
            let scopes = match outer {
                Some(outer) => outer.push(representative),
                None => Scopes::root(representative),
            };
            eval_expr(ctx, &scopes, expr)
        }
        other => Err(Error::Schema(format!(
            "unsupported aggregate expression '{other}'"
        ))),
    }
}

fn combine_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    match op {
        BinaryOp::And => Ok(bool3_to_value(and3(l.as_bool(), r.as_bool()))),
        BinaryOp::Or => Ok(bool3_to_value(or3(l.as_bool(), r.as_bool()))),
        BinaryOp::Eq => Ok(bool3_to_value(value::equal(l, r))),
        BinaryOp::NotEq => Ok(bool3_to_value(not3(value::equal(l, r)))),
        BinaryOp::Lt => Ok(bool3_to_value(
            value::compare(l, r).map(std::cmp::Ordering::is_lt),
        )),
        BinaryOp::LtEq => Ok(bool3_to_value(
            value::compare(l, r).map(std::cmp::Ordering::is_le),
        )),
        BinaryOp::Gt => Ok(bool3_to_value(
            value::compare(l, r).map(std::cmp::Ordering::is_gt),
        )),
        BinaryOp::GtEq => Ok(bool3_to_value(
            value::compare(l, r).map(std::cmp::Ordering::is_ge),
        )),
        BinaryOp::Plus => value::arith(ArithOp::Add, l, r),
        BinaryOp::Minus => value::arith(ArithOp::Sub, l, r),
        BinaryOp::Multiply => value::arith(ArithOp::Mul, l, r),
        BinaryOp::Divide => value::arith(ArithOp::Div, l, r),
        BinaryOp::Modulo => value::arith(ArithOp::Mod, l, r),
    }
}

fn eval_binary(
    ctx: &EvalContext,
    scopes: &Scopes,
    left: &Expr,
    op: BinaryOp,
    right: &Expr,
) -> Result<Value> {
    // AND/OR shortcut so the right side only runs when it can matter
    match op {
        BinaryOp::And => {
            let l = eval_expr(ctx, scopes, left)?.as_bool();
            if l == Some(false) {
                return Ok(Value::Boolean(false));
            }
            let r = eval_expr(ctx, scopes, right)?.as_bool();
            Ok(bool3_to_value(and3(l, r)))
        }
        BinaryOp::Or => {
            let l = eval_expr(ctx, scopes, left)?.as_bool();
            if l == Some(true) {
                return Ok(Value::Boolean(true));
            }
            let r = eval_expr(ctx, scopes, right)?.as_bool();
            Ok(bool3_to_value(or3(l, r)))
        }
        _ => {
            let l = eval_expr(ctx, scopes, left)?;
            let r = eval_expr(ctx, scopes, right)?;
            combine_binary(op, &l, &r)
        }
    }
}

fn eval_case(
    ctx: &EvalContext,
    scopes: &Scopes,
    operand: Option<&Expr>,
    branches: &[(Expr, Expr)],
    else_result: Option<&Expr>,
) -> Result<Value> {
    let operand_value = operand.map(|o| eval_expr(ctx, scopes, o)).transpose()?;
    for (when, then) in branches {
        let hit = match &operand_value {
            Some(op_v) => {
                let w = eval_expr(ctx, scopes, when)?;
                value::equal(op_v, &w) == Some(true)
            }
            None => eval_expr(ctx, scopes, when)?.as_bool() == Some(true),
        };
        if hit {
            return eval_expr(ctx, scopes, then);
        }
    }
    match else_result {
        Some(e) => eval_expr(ctx, scopes, e),
        None => Ok(Value::Null),
    }
}

// IN semantics: NULL needle, or a NULL among non-matching candidates,
// yields Unknown
fn apply_in(needle: &Value, candidates: &[Value], negated: bool) -> Option<bool> {
    if needle.is_null() {
        return None;
    }
    let mut saw_null = false;
    for candidate in candidates {
        match value::equal(needle, candidate) {
            Some(true) => return Some(!negated),
            Some(false) => {}
            None => saw_null = true,
        }
    }
    if saw_null {
        None
    } else {
        Some(negated)
    }
}

// --- Three-valued logic (Kleene) ---

/// Kleene AND.
#[must_use]
pub fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

/// Kleene OR.
#[must_use]
pub fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

/// Kleene NOT.
#[must_use]
pub fn not3(a: Option<bool>) -> Option<bool> {
    a.map(|b| !b)
}

fn bool3_to_value(b: Option<bool>) -> Value {
    match b {
        Some(b) => Value::Boolean(b),
        None => Value::Null,
    }
}

// --- LIKE ---

/// LIKE matcher: `%` matches any run, `_` exactly one character, and a
/// backslash escapes a literal `%` or `_`. Case-sensitive.
#[must_use]
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_match_at(&text, 0, &pattern, 0)
}

fn like_match_at(text: &[char], ti: usize, pattern: &[char], pi: usize) -> bool {
    if pi == pattern.len() {
        return ti == text.len();
    }
    match pattern[pi] {
        '%' => {
            // collapse a run of % and try every suffix
            let mut next = pi;
            while next < pattern.len() && pattern[next] == '%' {
                next += 1;
            }
            if next == pattern.len() {
                return true;
            }
            (ti..=text.len()).any(|start| like_match_at(text, start, pattern, next))
        }
        '_' => ti < text.len() && like_match_at(text, ti + 1, pattern, pi + 1),
        '\\' if pi + 1 < pattern.len() && matches!(pattern[pi + 1], '%' | '_' | '\\') => {
            ti < text.len()
                && text[ti] == pattern[pi + 1]
                && like_match_at(text, ti + 1, pattern, pi + 2)
        }
        c => ti < text.len() && text[ti] == c && like_match_at(text, ti + 1, pattern, pi + 1),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards() {
        assert!(like_match("Apple iPhone", "Apple%"));
        assert!(like_match("abc", "a_c"));
        assert!(!like_match("abc", "a_d"));
        assert!(like_match("", "%"));
        assert!(like_match("anything", "%"));
        assert!(!like_match("abc", "ABC"), "LIKE must be case-sensitive");
        assert!(like_match("100%", "100\\%"));
        assert!(!like_match("100x", "100\\%"));
        assert!(like_match("a_b", "a\\_b"));
        assert!(!like_match("axb", "a\\_b"));
        assert!(like_match("a%b%c", "%\\%c"));
    }

    #[test]
    fn kleene_tables() {
        assert_eq!(and3(Some(true), None), None);
        assert_eq!(and3(Some(false), None), Some(false));
        assert_eq!(or3(Some(true), None), Some(true));
        assert_eq!(or3(Some(false), None), None);
        assert_eq!(not3(None), None);
    }

    #[test]
    fn in_list_null_semantics() {
        let one = Value::Integer(1);
        let two = Value::Integer(2);
        // 1 IN (2, NULL) is Unknown, not false
        assert_eq!(apply_in(&one, &[two.clone(), Value::Null], false), None);
        // 2 IN (2, NULL) is true
        assert_eq!(apply_in(&two, &[two.clone(), Value::Null], false), Some(true));
        // NULL IN (...) is Unknown
        assert_eq!(apply_in(&Value::Null, &[two], false), None);
        // 1 NOT IN (2, 3) is true
        assert_eq!(
            apply_in(&one, &[Value::Integer(2), Value::Integer(3)], true),
            Some(true)
        );
    }

    #[test]
    fn scope_resolution_prefers_inner_frames() {
        let outer_row = RowScope::single(
            "u",
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Integer(1), Value::Text("outer".to_string())],
        );
        let inner_row = RowScope::single(
            "o",
            vec!["user_id".to_string()],
            vec![Value::Integer(7)],
        );
        let outer = Scopes::root(&outer_row);
        let stack = outer.push(&inner_row);

        // unqualified: innermost scope containing the name wins
        assert_eq!(stack.resolve(None, "user_id").unwrap(), Value::Integer(7));
        // correlated reference reaches the outer frame
        assert_eq!(stack.resolve(None, "id").unwrap(), Value::Integer(1));
        assert_eq!(
            stack.resolve(Some("u"), "name").unwrap(),
            Value::Text("outer".to_string())
        );
        assert!(stack.resolve(None, "missing").is_err());
    }

    #[test]
    fn ambiguity_within_one_scope_is_an_error() {
        let row = RowScope {
            tables: vec![
                TableBinding {
                    alias: "a".to_string(),
                    columns: vec!["id".to_string()],
                    values: vec![Value::Integer(1)],
                },
                TableBinding {
                    alias: "b".to_string(),
                    columns: vec!["id".to_string()],
                    values: vec![Value::Integer(2)],
                },
            ],
        };
        let scopes = Scopes::root(&row);
        let err = scopes.resolve(None, "id").unwrap_err();
        assert!(matches!(err, Error::AmbiguousReference(_)));
        // qualification resolves it
        assert_eq!(scopes.resolve(Some("b"), "id").unwrap(), Value::Integer(2));
    }
}
