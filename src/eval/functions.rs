//! Built-in scalar functions and aggregate accumulators.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;

use crate::ast::{FunctionArg, FunctionCall};
use crate::error::{Error, Result};
use crate::eval::{eval_expr, EvalContext, RowScope, Scopes};
use crate::value::{self, ArithOp, Value};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Evaluates a non-aggregate function call.
pub fn eval_function(ctx: &EvalContext, scopes: &Scopes, call: &FunctionCall) -> Result<Value> {
    let mut args = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        match arg {
            FunctionArg::Expr(e) => args.push(eval_expr(ctx, scopes, e)?),
            FunctionArg::Star => {
                return Err(Error::Schema(format!(
                    "'*' is not a valid argument to {}()",
                    call.name
                )));
            }
        }
    }
    apply_function(ctx, &call.name, &args)
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Error::Schema(format!(
            "wrong number of arguments to {name}(): expected {expected}, got {}",
            args.len()
        )))
    }
}

pub(crate) fn apply_function(ctx: &EvalContext, name: &str, args: &[Value]) -> Result<Value> {
    match name {
        // --- string ---
        "CONCAT" => {
            if args.iter().any(Value::is_null) {
                return Ok(Value::Null);
            }
            Ok(Value::Text(args.iter().map(Value::to_text).collect()))
        }
        "SUBSTRING" | "SUBSTR" => substring(args),
        "LENGTH" => unary_string(name, args, |s| Value::Integer(s.len() as i64)),
        "CHAR_LENGTH" | "CHARACTER_LENGTH" => {
            unary_string(name, args, |s| Value::Integer(s.chars().count() as i64))
        }
        "UPPER" | "UCASE" => unary_string(name, args, |s| Value::Text(s.to_uppercase())),
        "LOWER" | "LCASE" => unary_string(name, args, |s| Value::Text(s.to_lowercase())),
        "TRIM" => unary_string(name, args, |s| Value::Text(s.trim().to_string())),
        "LTRIM" => unary_string(name, args, |s| Value::Text(s.trim_start().to_string())),
        "RTRIM" => unary_string(name, args, |s| Value::Text(s.trim_end().to_string())),

        // --- numeric ---
        "ABS" => {
            arity(name, args, 1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::Integer(i) => Ok(Value::Integer(i.saturating_abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
                other => value::to_decimal(other)
                    .map(|d| Value::Decimal(d.abs()))
                    .ok_or_else(|| bad_arg(name, other)),
            }
        }
        "ROUND" => round(args),
        "CEILING" | "CEIL" => {
            arity(name, args, 1)?;
            ceil_floor(name, &args[0], true)
        }
        "FLOOR" => {
            arity(name, args, 1)?;
            ceil_floor(name, &args[0], false)
        }
        "MOD" => {
            arity(name, args, 2)?;
            value::arith(ArithOp::Mod, &args[0], &args[1])
        }
        "POWER" | "POW" => {
            arity(name, args, 2)?;
            if args[0].is_null() || args[1].is_null() {
                return Ok(Value::Null);
            }
            let base = value::to_f64(&args[0]).ok_or_else(|| bad_arg(name, &args[0]))?;
            let exp = value::to_f64(&args[1]).ok_or_else(|| bad_arg(name, &args[1]))?;
            Ok(Value::Float(base.powf(exp)))
        }

        // --- date/time ---
        "NOW" | "CURRENT_TIMESTAMP" => {
            arity(name, args, 0)?;
            Ok(Value::DateTime(ctx.now))
        }
        "CURDATE" | "CURRENT_DATE" => {
            arity(name, args, 0)?;
            Ok(Value::Date(ctx.now.date()))
        }
        "YEAR" => date_part(name, args, |d| i64::from(d.year())),
        "MONTH" => date_part(name, args, |d| i64::from(d.month())),
        "DAY" | "DAYOFMONTH" => date_part(name, args, |d| i64::from(d.day())),
        "HOUR" => datetime_part(name, args, |dt| i64::from(dt.hour())),
        "MINUTE" => datetime_part(name, args, |dt| i64::from(dt.minute())),
        "SECOND" => datetime_part(name, args, |dt| i64::from(dt.second())),
        "DATE_FORMAT" => {
            arity(name, args, 2)?;
            if args[0].is_null() || args[1].is_null() {
                return Ok(Value::Null);
            }
            let dt = as_datetime(&args[0]).ok_or_else(|| bad_arg(name, &args[0]))?;
            Ok(Value::Text(format_datetime(&dt, &args[1].to_text())))
        }

        // --- conditional ---
        "IF" => {
            arity(name, args, 3)?;
            match args[0].as_bool() {
                Some(true) => Ok(args[1].clone()),
                _ => Ok(args[2].clone()),
            }
        }
        "COALESCE" => Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null)),
        "IFNULL" => {
            arity(name, args, 2)?;
            if args[0].is_null() {
                Ok(args[1].clone())
            } else {
                Ok(args[0].clone())
            }
        }
        "NULLIF" => {
            arity(name, args, 2)?;
            if value::equal(&args[0], &args[1]) == Some(true) {
                Ok(Value::Null)
            } else {
                Ok(args[0].clone())
            }
        }

        other => Err(Error::Schema(format!("unknown function '{other}'"))),
    }
}

fn bad_arg(name: &str, v: &Value) -> Error {
    Error::Type(format!(
        "invalid {} argument to {name}()",
        v.type_name()
    ))
}

fn unary_string(name: &str, args: &[Value], f: impl Fn(&str) -> Value) -> Result<Value> {
    arity(name, args, 1)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(f(&args[0].to_text()))
}

// SUBSTRING(s, start[, len]), 1-based; negative start counts from the end
fn substring(args: &[Value]) -> Result<Value> {
    if args.len() != 2 && args.len() != 3 {
        return Err(Error::Schema(format!(
            "wrong number of arguments to SUBSTRING(): expected 2 or 3, got {}",
            args.len()
        )));
    }
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    let text = args[0].to_text();
    let chars: Vec<char> = text.chars().collect();
    let start = value::to_i64(&args[1]).ok_or_else(|| bad_arg("SUBSTRING", &args[1]))?;
    let from = if start > 0 {
        (start - 1) as usize
    } else if start < 0 && chars.len() as i64 + start >= 0 {
        (chars.len() as i64 + start) as usize
    } else {
        // MySQL: position 0 selects nothing
        return Ok(Value::Text(String::new()));
    };
    if from >= chars.len() {
        return Ok(Value::Text(String::new()));
    }
    let taken: String = match args.get(2) {
        Some(len_v) => {
            let len = value::to_i64(len_v).ok_or_else(|| bad_arg("SUBSTRING", len_v))?;
            if len <= 0 {
                return Ok(Value::Text(String::new()));
            }
            chars[from..].iter().take(len as usize).collect()
        }
        None => chars[from..].iter().collect(),
    };
    Ok(Value::Text(taken))
}

fn round(args: &[Value]) -> Result<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(Error::Schema(format!(
            "wrong number of arguments to ROUND(): expected 1 or 2, got {}",
            args.len()
        )));
    }
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    let digits = match args.get(1) {
        Some(v) => value::to_i64(v).ok_or_else(|| bad_arg("ROUND", v))?,
        None => 0,
    };
    match &args[0] {
        Value::Integer(i) if digits >= 0 => Ok(Value::Integer(*i)),
        Value::Decimal(d) if digits >= 0 => Ok(Value::Decimal(
            d.round_dp_with_strategy(digits as u32, RoundingStrategy::MidpointAwayFromZero),
        )),
        other => {
            let f = value::to_f64(other).ok_or_else(|| bad_arg("ROUND", other))?;
            let factor = 10f64.powi(digits as i32);
            let rounded = (f * factor).round() / factor;
            match other {
                Value::Float(_) => Ok(Value::Float(rounded)),
                _ => Decimal::from_f64(rounded)
                    .map(Value::Decimal)
                    .ok_or_else(|| bad_arg("ROUND", other)),
            }
        }
    }
}

fn ceil_floor(name: &str, v: &Value, up: bool) -> Result<Value> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Float(f) => Ok(Value::Integer(
            (if up { f.ceil() } else { f.floor() }) as i64,
        )),
        Value::Decimal(d) => {
            let rounded = if up { d.ceil() } else { d.floor() };
            rounded
                .to_i64()
                .map(Value::Integer)
                .ok_or_else(|| bad_arg(name, v))
        }
        other => {
            let f = value::to_f64(other).ok_or_else(|| bad_arg(name, other))?;
            Ok(Value::Integer(
                (if up { f.ceil() } else { f.floor() }) as i64,
            ))
        }
    }
}

fn as_date(v: &Value) -> Option<NaiveDate> {
    match v {
        Value::Date(d) => Some(*d),
        Value::DateTime(dt) => Some(dt.date()),
        Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.date())
            }),
        _ => None,
    }
}

fn as_datetime(v: &Value) -> Option<NaiveDateTime> {
    match v {
        Value::DateTime(dt) => Some(*dt),
        Value::Date(d) => d.and_hms_opt(0, 0, 0),
        Value::Text(s) => NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            }),
        _ => None,
    }
}

fn date_part(name: &str, args: &[Value], f: impl Fn(NaiveDate) -> i64) -> Result<Value> {
    arity(name, args, 1)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    as_date(&args[0])
        .map(|d| Value::Integer(f(d)))
        .ok_or_else(|| bad_arg(name, &args[0]))
}

fn datetime_part(name: &str, args: &[Value], f: impl Fn(NaiveDateTime) -> i64) -> Result<Value> {
    arity(name, args, 1)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    match &args[0] {
        Value::Time(t) => NaiveDate::from_ymd_opt(2000, 1, 1)
            .and_then(|d| d.and_hms_opt(t.hour(), t.minute(), t.second()))
            .map(|dt| Value::Integer(f(dt)))
            .ok_or_else(|| bad_arg(name, &args[0])),
        other => as_datetime(other)
            .map(|dt| Value::Integer(f(dt)))
            .ok_or_else(|| bad_arg(name, other)),
    }
}

/// DATE_FORMAT renderer for the common MySQL specifiers.
fn format_datetime(dt: &NaiveDateTime, format: &str) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('Y') => out.push_str(&format!("{:04}", dt.year())),
            Some('y') => out.push_str(&format!("{:02}", dt.year() % 100)),
            Some('m') => out.push_str(&format!("{:02}", dt.month())),
            Some('c') => out.push_str(&dt.month().to_string()),
            Some('d') => out.push_str(&format!("{:02}", dt.day())),
            Some('e') => out.push_str(&dt.day().to_string()),
            Some('H') => out.push_str(&format!("{:02}", dt.hour())),
            Some('h') | Some('I') => {
                let hour12 = match dt.hour() % 12 {
                    0 => 12,
                    h => h,
                };
                out.push_str(&format!("{hour12:02}"));
            }
            Some('i') => out.push_str(&format!("{:02}", dt.minute())),
            Some('s') | Some('S') => out.push_str(&format!("{:02}", dt.second())),
            Some('M') => out.push_str(MONTH_NAMES[dt.month0() as usize]),
            Some('b') => out.push_str(&MONTH_NAMES[dt.month0() as usize][..3]),
            Some('W') => {
                out.push_str(WEEKDAY_NAMES[dt.weekday().num_days_from_monday() as usize]);
            }
            Some('a') => {
                out.push_str(&WEEKDAY_NAMES[dt.weekday().num_days_from_monday() as usize][..3]);
            }
            Some('p') => out.push_str(if dt.hour() < 12 { "AM" } else { "PM" }),
            Some('%') => out.push('%'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

// --- Aggregates ---

/// Evaluates an aggregate call over the rows of one group.
pub fn eval_aggregate(
    ctx: &EvalContext,
    outer: Option<&Scopes>,
    rows: &[RowScope],
    call: &FunctionCall,
) -> Result<Value> {
    // COUNT(*) counts rows, nulls and all
    if call.name == "COUNT"
        && let Some(FunctionArg::Star) = call.args.first()
    {
        return Ok(Value::Integer(rows.len() as i64));
    }
    let Some(FunctionArg::Expr(arg)) = call.args.first() else {
        return Err(Error::Schema(format!(
            "{}() requires an argument",
            call.name
        )));
    };
    if call.args.len() != 1 {
        return Err(Error::Schema(format!(
            "{}() takes exactly one argument",
            call.name
        )));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut count: i64 = 0;
    let mut sum: Option<Value> = None;
    let mut min: Option<Value> = None;
    let mut max: Option<Value> = None;

    for row in rows {
        ctx.check_cancelled()?;
        let scopes = match outer {
            Some(outer) => outer.push(row),
            None => Scopes::root(row),
        };
        let v = eval_expr(ctx, &scopes, arg)?;
        if v.is_null() {
            continue;
        }
        if call.distinct && !seen.insert(v.group_key()) {
            continue;
        }
        count += 1;
        match call.name.as_str() {
            "COUNT" => {}
            "SUM" | "AVG" => {
                sum = Some(match sum {
                    Some(acc) => value::arith(ArithOp::Add, &acc, &v)?,
                    None => v.clone(),
                });
            }
            "MIN" => {
                if min
                    .as_ref()
                    .is_none_or(|m| value::compare(&v, m) == Some(std::cmp::Ordering::Less))
                {
                    min = Some(v.clone());
                }
            }
            "MAX" => {
                if max
                    .as_ref()
                    .is_none_or(|m| value::compare(&v, m) == Some(std::cmp::Ordering::Greater))
                {
                    max = Some(v.clone());
                }
            }
            other => {
                return Err(Error::Schema(format!("unknown aggregate '{other}'")));
            }
        }
    }

    match call.name.as_str() {
        "COUNT" => Ok(Value::Integer(count)),
        "SUM" => Ok(sum.unwrap_or(Value::Null)),
        "AVG" => match sum {
            Some(total) => value::arith(ArithOp::Div, &total, &Value::Integer(count)),
            None => Ok(Value::Null),
        },
        "MIN" => Ok(min.unwrap_or(Value::Null)),
        "MAX" => Ok(max.unwrap_or(Value::Null)),
        other => Err(Error::Schema(format!("unknown aggregate '{other}'"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn substring_is_one_based() {
        let s = Value::Text("database".to_string());
        assert_eq!(
            substring(&[s.clone(), Value::Integer(1), Value::Integer(4)]).unwrap(),
            Value::Text("data".to_string())
        );
        assert_eq!(
            substring(&[s.clone(), Value::Integer(5)]).unwrap(),
            Value::Text("base".to_string())
        );
        assert_eq!(
            substring(&[s.clone(), Value::Integer(-4)]).unwrap(),
            Value::Text("base".to_string())
        );
        assert_eq!(
            substring(&[s, Value::Integer(0)]).unwrap(),
            Value::Text(String::new())
        );
    }

    #[test]
    fn round_variants() {
        assert_eq!(
            round(&[Value::Decimal("2.345".parse().unwrap()), Value::Integer(2)]).unwrap(),
            Value::Decimal("2.35".parse().unwrap())
        );
        assert_eq!(
            round(&[Value::Decimal("2.5".parse().unwrap())]).unwrap(),
            Value::Decimal("3".parse().unwrap()),
            "ROUND must round half away from zero"
        );
        assert_eq!(round(&[Value::Float(1.25)]).unwrap(), Value::Float(1.0));
        assert_eq!(round(&[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn date_format_specifiers() {
        let dt = NaiveDate::from_ymd_opt(2024, 2, 5)
            .unwrap()
            .and_hms_opt(9, 7, 3)
            .unwrap();
        assert_eq!(format_datetime(&dt, "%Y-%m-%d"), "2024-02-05");
        assert_eq!(format_datetime(&dt, "%H:%i:%s"), "09:07:03");
        assert_eq!(format_datetime(&dt, "%M %e, %Y"), "February 5, 2024");
        assert_eq!(format_datetime(&dt, "100%%"), "100%");
    }
}
