//! The SELECT pipeline: FROM → JOIN → WHERE → GROUP/HAVING → projection
//! → DISTINCT → ORDER BY → LIMIT → UNION, plus subquery execution.

use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::ast::{
    Expr, Join, JoinKind, Limit, OrderByExpr, Query, Select, SelectItem, TableFactor, TableRef,
};
use crate::error::{Error, Result};
use crate::eval::{eval_expr, eval_grouped_expr, EvalContext, RowScope, Scopes, TableBinding};
use crate::exec::RowSet;
use crate::value::{self, ResultKind, Value};

/// Executes a query (with UNION arms) and materializes the result.
pub fn execute_query(ctx: &EvalContext, query: &Query, outer: Option<&Scopes>) -> Result<RowSet> {
    if query.unions.is_empty() {
        return run_select(ctx, &query.body, outer, &query.order_by, query.limit);
    }

    // each SELECT is computed independently; names come from the first
    let mut arms = vec![run_select(ctx, &query.body, outer, &[], None)?];
    for arm in &query.unions {
        ctx.check_cancelled()?;
        let part = run_select(ctx, &arm.select, outer, &[], None)?;
        if part.columns.len() != arms[0].columns.len() {
            return Err(Error::Schema(format!(
                "UNION arms must have the same number of columns ({} vs {})",
                arms[0].columns.len(),
                part.columns.len()
            )));
        }
        arms.push(part);
    }

    // corresponding columns coerce to a common type across all arms, so
    // 1 and 1e0 land in one column type and de-duplicate as one value
    let mut kinds: Vec<Option<ResultKind>> = vec![None; arms[0].columns.len()];
    for arm in &arms {
        for row in &arm.rows {
            for (i, v) in row.iter().enumerate() {
                kinds[i] = value::common_kind(kinds[i], v);
            }
        }
    }

    let mut parts = arms.into_iter();
    let Some(mut acc) = parts.next() else {
        return Err(Error::Schema("UNION produced no arms".to_string()));
    };
    unify_rows(&mut acc.rows, &kinds);
    for (mut part, arm) in parts.zip(&query.unions) {
        unify_rows(&mut part.rows, &kinds);
        acc.rows.extend(part.rows);
        if !arm.all {
            dedupe_rows(&mut acc.rows);
        }
    }

    if !query.order_by.is_empty() {
        sort_union_result(&mut acc, &query.order_by)?;
    }
    apply_limit(&mut acc.rows, query.limit);
    Ok(acc)
}

fn unify_rows(rows: &mut [Vec<Value>], kinds: &[Option<ResultKind>]) {
    for row in rows {
        for (i, v) in row.iter_mut().enumerate() {
            if let Some(kind) = kinds[i] {
                let converted = value::convert_to_kind(v, kind);
                *v = converted;
            }
        }
    }
}

// --- subquery entry points ---

/// Scalar subquery: at most one row of exactly one column; no rows is
/// NULL.
pub fn scalar_subquery(ctx: &EvalContext, query: &Query, outer: Option<&Scopes>) -> Result<Value> {
    let result = execute_query(ctx, query, outer)?;
    if result.columns.len() != 1 {
        return Err(Error::SubqueryShape(result.columns.len()));
    }
    match result.rows.len() {
        0 => Ok(Value::Null),
        1 => Ok(result.rows.into_iter().next().unwrap_or_default().remove(0)),
        _ => Err(Error::SubqueryCardinality),
    }
}

/// EXISTS: capped at one produced row, whatever the subquery shape.
pub fn exists_subquery(ctx: &EvalContext, query: &Query, outer: Option<&Scopes>) -> Result<bool> {
    let mut capped = query.clone();
    capped.limit = Some(match query.limit {
        Some(limit) => Limit {
            offset: limit.offset,
            count: limit.count.min(1),
        },
        None => Limit {
            offset: 0,
            count: 1,
        },
    });
    let result = execute_query(ctx, &capped, outer)?;
    Ok(!result.rows.is_empty())
}

/// IN (subquery): the single output column as a value list.
pub fn in_subquery_values(
    ctx: &EvalContext,
    query: &Query,
    outer: Option<&Scopes>,
) -> Result<Vec<Value>> {
    let result = execute_query(ctx, query, outer)?;
    if result.columns.len() != 1 {
        return Err(Error::SubqueryShape(result.columns.len()));
    }
    Ok(result
        .rows
        .into_iter()
        .map(|mut row| row.remove(0))
        .collect())
}

// --- FROM / JOIN ---

// the bindings a scope will carry, known even when no rows survive
#[derive(Debug, Clone, Default)]
struct ScopeShape {
    tables: Vec<(String, Vec<String>)>,
}

impl ScopeShape {
    fn null_row(&self) -> RowScope {
        RowScope {
            tables: self
                .tables
                .iter()
                .map(|(alias, columns)| TableBinding {
                    alias: alias.clone(),
                    columns: columns.clone(),
                    values: vec![Value::Null; columns.len()],
                })
                .collect(),
        }
    }
}

struct FactorRows {
    alias: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

fn factor_rows(ctx: &EvalContext, factor: &TableFactor) -> Result<FactorRows> {
    match factor {
        TableFactor::Table { name, alias } => {
            let table = ctx.db.table(name)?;
            let columns: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
            let mut rows = Vec::with_capacity(table.live_count());
            for (_, values) in table.live_rows() {
                rows.push(values.to_vec());
            }
            Ok(FactorRows {
                alias: alias.clone().unwrap_or_else(|| table.name.clone()),
                columns,
                rows,
            })
        }
        // a derived table runs once, uncorrelated, and is materialized
        TableFactor::Derived { query, alias } => {
            let result = execute_query(ctx, query, None)?;
            Ok(FactorRows {
                alias: alias.clone(),
                columns: result.columns,
                rows: result.rows,
            })
        }
    }
}

fn binding_from(factor: &FactorRows, values: Vec<Value>) -> TableBinding {
    TableBinding {
        alias: factor.alias.clone(),
        columns: factor.columns.clone(),
        values,
    }
}

fn null_binding(factor: &FactorRows) -> TableBinding {
    TableBinding {
        alias: factor.alias.clone(),
        columns: factor.columns.clone(),
        values: vec![Value::Null; factor.columns.len()],
    }
}

fn with_row<'a>(outer: Option<&'a Scopes<'a>>, row: &'a RowScope) -> Scopes<'a> {
    match outer {
        Some(outer) => outer.push(row),
        None => Scopes::root(row),
    }
}

fn join_predicate_holds(
    ctx: &EvalContext,
    outer: Option<&Scopes>,
    row: &RowScope,
    on: Option<&Expr>,
) -> Result<bool> {
    match on {
        Some(on) => {
            let scopes = with_row(outer, row);
            Ok(eval_expr(ctx, &scopes, on)?.as_bool() == Some(true))
        }
        None => Ok(true),
    }
}

fn merged(left: &RowScope, binding: TableBinding) -> RowScope {
    let mut tables = left.tables.clone();
    tables.push(binding);
    RowScope { tables }
}

fn apply_join(
    ctx: &EvalContext,
    outer: Option<&Scopes>,
    left_shape: &ScopeShape,
    left_rows: Vec<RowScope>,
    join: &Join,
) -> Result<(FactorRows, Vec<RowScope>)> {
    let right = factor_rows(ctx, &join.factor)?;
    let mut combined = Vec::new();

    match join.kind {
        JoinKind::Inner | JoinKind::Cross => {
            for l in &left_rows {
                ctx.check_cancelled()?;
                for r in &right.rows {
                    let row = merged(l, binding_from(&right, r.clone()));
                    if join_predicate_holds(ctx, outer, &row, join.on.as_ref())? {
                        combined.push(row);
                    }
                }
            }
        }
        JoinKind::Left => {
            for l in &left_rows {
                ctx.check_cancelled()?;
                let mut matched = false;
                for r in &right.rows {
                    let row = merged(l, binding_from(&right, r.clone()));
                    if join_predicate_holds(ctx, outer, &row, join.on.as_ref())? {
                        combined.push(row);
                        matched = true;
                    }
                }
                if !matched {
                    combined.push(merged(l, null_binding(&right)));
                }
            }
        }
        // mirrored LEFT: driven by the right side, padding the left
        JoinKind::Right => {
            for r in &right.rows {
                ctx.check_cancelled()?;
                let mut matched = false;
                for l in &left_rows {
                    let row = merged(l, binding_from(&right, r.clone()));
                    if join_predicate_holds(ctx, outer, &row, join.on.as_ref())? {
                        combined.push(row);
                        matched = true;
                    }
                }
                if !matched {
                    let null_left = left_shape.null_row();
                    combined.push(merged(&null_left, binding_from(&right, r.clone())));
                }
            }
        }
    }
    Ok((right, combined))
}

fn table_ref_rows(
    ctx: &EvalContext,
    outer: Option<&Scopes>,
    tref: &TableRef,
) -> Result<(ScopeShape, Vec<RowScope>)> {
    let factor = factor_rows(ctx, &tref.factor)?;
    let mut shape = ScopeShape {
        tables: vec![(factor.alias.clone(), factor.columns.clone())],
    };
    let mut rows: Vec<RowScope> = factor
        .rows
        .iter()
        .map(|values| RowScope {
            tables: vec![binding_from(&factor, values.clone())],
        })
        .collect();

    for join in &tref.joins {
        let (right, combined) = apply_join(ctx, outer, &shape, rows, join)?;
        shape.tables.push((right.alias, right.columns));
        rows = combined;
    }
    Ok((shape, rows))
}

fn build_from(
    ctx: &EvalContext,
    from: &[TableRef],
    outer: Option<&Scopes>,
) -> Result<(ScopeShape, Vec<RowScope>)> {
    // no FROM: a single synthesized empty row
    if from.is_empty() {
        return Ok((ScopeShape::default(), vec![RowScope::empty()]));
    }
    let mut shape = ScopeShape::default();
    let mut rows: Vec<RowScope> = vec![RowScope::empty()];
    for tref in from {
        ctx.check_cancelled()?;
        let (tshape, trows) = table_ref_rows(ctx, outer, tref)?;
        // comma-separated FROM is a cartesian product
        let mut next = Vec::with_capacity(rows.len() * trows.len().max(1));
        for l in &rows {
            for r in &trows {
                let mut tables = l.tables.clone();
                tables.extend(r.tables.iter().cloned());
                next.push(RowScope { tables });
            }
        }
        shape.tables.extend(tshape.tables);
        rows = next;
    }
    Ok((shape, rows))
}

// --- projection ---

enum ProjSource<'a> {
    Cell(usize, usize),
    Expr(&'a Expr),
}

fn projection_plan<'a>(
    shape: &ScopeShape,
    projection: &'a [SelectItem],
) -> Result<(Vec<String>, Vec<ProjSource<'a>>)> {
    let mut names = Vec::new();
    let mut sources = Vec::new();
    for item in projection {
        match item {
            SelectItem::Wildcard => {
                if shape.tables.is_empty() {
                    return Err(Error::Schema("'*' requires a FROM clause".to_string()));
                }
                for (bi, (_, columns)) in shape.tables.iter().enumerate() {
                    for (ci, column) in columns.iter().enumerate() {
                        names.push(column.clone());
                        sources.push(ProjSource::Cell(bi, ci));
                    }
                }
            }
            SelectItem::QualifiedWildcard(alias) => {
                let bi = shape
                    .tables
                    .iter()
                    .position(|(a, _)| a.eq_ignore_ascii_case(alias))
                    .ok_or_else(|| {
                        Error::Schema(format!("unknown table or alias '{alias}' in '{alias}.*'"))
                    })?;
                for (ci, column) in shape.tables[bi].1.iter().enumerate() {
                    names.push(column.clone());
                    sources.push(ProjSource::Cell(bi, ci));
                }
            }
            SelectItem::Expr { expr, alias } => {
                let name = match alias {
                    Some(alias) => alias.clone(),
                    None => match expr {
                        Expr::Column { name, .. } => name.clone(),
                        other => other.to_string(),
                    },
                };
                names.push(name);
                sources.push(ProjSource::Expr(expr));
            }
        }
    }
    Ok((names, sources))
}

fn project_row(
    ctx: &EvalContext,
    outer: Option<&Scopes>,
    row: &RowScope,
    sources: &[ProjSource],
) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(sources.len());
    for source in sources {
        match source {
            ProjSource::Cell(bi, ci) => out.push(row.tables[*bi].values[*ci].clone()),
            ProjSource::Expr(expr) => {
                let scopes = with_row(outer, row);
                out.push(eval_expr(ctx, &scopes, expr)?);
            }
        }
    }
    Ok(out)
}

fn project_group(
    ctx: &EvalContext,
    outer: Option<&Scopes>,
    rows: &[RowScope],
    representative: &RowScope,
    sources: &[ProjSource],
) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(sources.len());
    for source in sources {
        match source {
            ProjSource::Cell(bi, ci) => {
                out.push(
                    representative
                        .tables
                        .get(*bi)
                        .map(|b| b.values[*ci].clone())
                        .unwrap_or(Value::Null),
                );
            }
            ProjSource::Expr(expr) => {
                out.push(eval_grouped_expr(ctx, outer, rows, representative, expr)?);
            }
        }
    }
    Ok(out)
}

// --- ordering, distinct, limit ---

fn order_cmp(a: &Value, b: &Value, asc: bool) -> Ordering {
    // NULLs sort first ascending, last descending
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if asc {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if asc {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => {
            let ord = crate::value::compare(a, b).unwrap_or(Ordering::Equal);
            if asc {
                ord
            } else {
                ord.reverse()
            }
        }
    }
}

fn sort_with_keys<T>(rows: &mut Vec<(Vec<Value>, T)>, order_by: &[OrderByExpr]) {
    rows.sort_by(|(ka, _), (kb, _)| {
        for (i, ob) in order_by.iter().enumerate() {
            let ord = order_cmp(&ka[i], &kb[i], ob.asc);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

// an ORDER BY key that names an output column or its 1-based ordinal
fn output_column_target(names: &[String], expr: &Expr) -> Option<usize> {
    match expr {
        Expr::Column { table: None, name } => {
            names.iter().position(|n| n.eq_ignore_ascii_case(name))
        }
        Expr::Literal(Value::Integer(ordinal)) if *ordinal >= 1 => {
            let idx = (*ordinal - 1) as usize;
            (idx < names.len()).then_some(idx)
        }
        _ => None,
    }
}

fn dedupe_rows(rows: &mut Vec<Vec<Value>>) {
    let mut seen: HashSet<String> = HashSet::new();
    rows.retain(|row| seen.insert(row_key(row)));
}

fn row_key(row: &[Value]) -> String {
    let mut key = String::new();
    for v in row {
        key.push_str(&v.group_key());
        key.push('\u{1}');
    }
    key
}

fn apply_limit(rows: &mut Vec<Vec<Value>>, limit: Option<Limit>) {
    if let Some(limit) = limit {
        let offset = (limit.offset as usize).min(rows.len());
        rows.drain(..offset);
        rows.truncate(limit.count as usize);
    }
}

fn sort_union_result(acc: &mut RowSet, order_by: &[OrderByExpr]) -> Result<()> {
    let mut targets = Vec::with_capacity(order_by.len());
    for ob in order_by {
        let target = output_column_target(&acc.columns, &ob.expr).ok_or_else(|| {
            Error::Schema(format!(
                "ORDER BY over a UNION must name an output column, got '{}'",
                ob.expr
            ))
        })?;
        targets.push(target);
    }
    let rows = std::mem::take(&mut acc.rows);
    let mut keyed: Vec<(Vec<Value>, Vec<Value>)> = rows
        .into_iter()
        .map(|row| {
            let keys = targets.iter().map(|t| row[*t].clone()).collect();
            (keys, row)
        })
        .collect();
    sort_with_keys(&mut keyed, order_by);
    acc.rows = keyed.into_iter().map(|(_, row)| row).collect();
    Ok(())
}

// --- the pipeline ---

fn run_select(
    ctx: &EvalContext,
    select: &Select,
    outer: Option<&Scopes>,
    order_by: &[OrderByExpr],
    limit: Option<Limit>,
) -> Result<RowSet> {
    let (shape, rows) = build_from(ctx, &select.from, outer)?;

    // WHERE keeps only rows where the predicate is true
    let mut filtered = Vec::with_capacity(rows.len());
    for row in rows {
        ctx.check_cancelled()?;
        let keep = match &select.selection {
            Some(predicate) => {
                let scopes = with_row(outer, &row);
                eval_expr(ctx, &scopes, predicate)?.as_bool() == Some(true)
            }
            None => true,
        };
        if keep {
            filtered.push(row);
        }
    }

    let any_aggregate = select.projection.iter().any(|item| {
        matches!(item, SelectItem::Expr { expr, .. } if expr.contains_aggregate())
    }) || select
        .having
        .as_ref()
        .is_some_and(Expr::contains_aggregate);

    let (names, sources) = projection_plan(&shape, &select.projection)?;

    let mut projected: Vec<(Vec<Value>, Vec<Value>)> = if select.group_by.is_empty()
        && !any_aggregate
    {
        run_plain(
            ctx,
            outer,
            filtered,
            &names,
            &sources,
            order_by,
            select.having.as_ref(),
        )?
    } else {
        run_grouped(ctx, outer, select, &shape, filtered, &names, &sources, order_by)?
    };

    // DISTINCT de-duplicates by value tuples, NULLs equal
    if select.distinct {
        let mut seen: HashSet<String> = HashSet::new();
        projected.retain(|(_, row)| seen.insert(row_key(row)));
    }

    sort_with_keys(&mut projected, order_by);
    let mut rows: Vec<Vec<Value>> = projected.into_iter().map(|(_, row)| row).collect();
    apply_limit(&mut rows, limit);

    Ok(RowSet {
        columns: names,
        rows,
    })
}

// rows paired with their ORDER BY keys
type KeyedRows = Vec<(Vec<Value>, Vec<Value>)>;

fn run_plain(
    ctx: &EvalContext,
    outer: Option<&Scopes>,
    rows: Vec<RowScope>,
    names: &[String],
    sources: &[ProjSource],
    order_by: &[OrderByExpr],
    having: Option<&Expr>,
) -> Result<KeyedRows> {
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        ctx.check_cancelled()?;
        // HAVING without grouping acts as one more row filter
        if let Some(having) = having {
            let scopes = with_row(outer, row);
            if eval_expr(ctx, &scopes, having)?.as_bool() != Some(true) {
                continue;
            }
        }
        let projected = project_row(ctx, outer, row, sources)?;
        let mut keys = Vec::with_capacity(order_by.len());
        for ob in order_by {
            match output_column_target(names, &ob.expr) {
                Some(idx) => keys.push(projected[idx].clone()),
                None => {
                    let scopes = with_row(outer, row);
                    keys.push(eval_expr(ctx, &scopes, &ob.expr)?);
                }
            }
        }
        out.push((keys, projected));
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn run_grouped(
    ctx: &EvalContext,
    outer: Option<&Scopes>,
    select: &Select,
    shape: &ScopeShape,
    rows: Vec<RowScope>,
    names: &[String],
    sources: &[ProjSource],
    order_by: &[OrderByExpr],
) -> Result<KeyedRows> {
    // partition by the GROUP BY key tuple; NULLs form their own group
    let mut groups: IndexMap<String, Vec<RowScope>> = IndexMap::new();
    if select.group_by.is_empty() {
        // a lone aggregate groups the whole input, even when empty
        groups.insert(String::new(), rows);
    } else {
        for row in rows {
            ctx.check_cancelled()?;
            let scopes = with_row(outer, &row);
            let mut key = String::new();
            for expr in &select.group_by {
                key.push_str(&eval_expr(ctx, &scopes, expr)?.group_key());
                key.push('\u{1}');
            }
            groups.entry(key).or_default().push(row);
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (_, group_rows) in groups {
        ctx.check_cancelled()?;
        let representative = group_rows
            .first()
            .cloned()
            .unwrap_or_else(|| shape.null_row());

        if let Some(having) = &select.having {
            let keep = eval_grouped_expr(ctx, outer, &group_rows, &representative, having)?
                .as_bool()
                == Some(true);
            if !keep {
                continue;
            }
        }

        let projected = project_group(ctx, outer, &group_rows, &representative, sources)?;
        let mut keys = Vec::with_capacity(order_by.len());
        for ob in order_by {
            match output_column_target(names, &ob.expr) {
                Some(idx) => keys.push(projected[idx].clone()),
                None => keys.push(eval_grouped_expr(
                    ctx,
                    outer,
                    &group_rows,
                    &representative,
                    &ob.expr,
                )?),
            }
        }
        out.push((keys, projected));
    }
    Ok(out)
}
