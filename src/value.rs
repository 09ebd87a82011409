//! The value domain: typed values, coercions, comparisons and arithmetic.
//!
//! This module defines the fundamental types the engine computes with:
//! - [`Value`], the closed tagged union every cell, literal and expression
//!   result belongs to
//! - [`DataType`], the declared column types of the MySQL-flavored dialect
//! - total functions for coercion ([`coerce`]), three-valued comparison
//!   ([`compare`]) and arithmetic with numeric promotion
//!
//! NULL never equals anything, including itself: [`compare`] returns `None`
//! for Unknown and the caller decides what Unknown means in its clause.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// A single SQL value.
///
/// The engine represents every cell as one of these variants. Each non-null
/// value carries its logical type; coercion between types happens explicitly
/// through [`coerce`] (column assignment) or implicitly through the numeric
/// promotion rules of the arithmetic functions.
///
/// # Examples
///
/// ```
/// use memql::value::Value;
///
/// let v = Value::Integer(42);
/// assert_eq!(v.to_string(), "42");
/// assert!(Value::Null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Signed 64-bit integer
    Integer(i64),
    /// 64-bit IEEE float
    Float(f64),
    /// Arbitrary precision decimal
    Decimal(Decimal),
    /// Boolean value (TRUE/FALSE literals)
    Boolean(bool),
    /// UTF-8 text
    Text(String),
    /// Date without time
    Date(NaiveDate),
    /// Time without date
    Time(NaiveTime),
    /// Date and time without timezone (DATETIME and TIMESTAMP)
    DateTime(NaiveDateTime),
    /// MySQL YEAR value (1901..=2155)
    Year(i32),
    /// One member of an ENUM column, with its 1-based ordinal
    Enum {
        /// Declared spelling of the member
        member: String,
        /// 1-based position in the member list
        index: usize,
    },
    /// A subset of a SET column's members, in declared order
    Set(Vec<String>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's logical type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Boolean(_) => "boolean",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
            Value::Year(_) => "year",
            Value::Enum { .. } => "enum",
            Value::Set(_) => "set",
        }
    }

    /// Truthiness under three-valued logic: `None` is Unknown.
    ///
    /// Numbers are true when non-zero, text is true when it parses to a
    /// non-zero number (MySQL manner), NULL is Unknown.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Decimal(d) => Some(*d != Decimal::ZERO),
            Value::Year(y) => Some(*y != 0),
            Value::Text(s) => Some(parse_text_number(s).is_some_and(|n| match n {
                Numeric::Int(i) => i != 0,
                Numeric::Dec(d) => d != Decimal::ZERO,
                Numeric::Flt(f) => f != 0.0,
            })),
            // non-numeric values count as true when present
            _ => Some(true),
        }
    }

    /// Canonical text rendering used by CONCAT, CAST AS CHAR and the
    /// lexical comparison fallback. NULL renders as the string `NULL`;
    /// callers that need NULL propagation must check [`Value::is_null`]
    /// first.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Decimal(d) => d.to_string(),
            Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Time(t) => t.format("%H:%M:%S").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Year(y) => y.to_string(),
            Value::Enum { member, .. } => member.clone(),
            Value::Set(members) => members.join(","),
        }
    }

    /// Stable key used for GROUP BY partitioning, DISTINCT and UNION
    /// de-duplication. Unlike [`compare`], NULL keys are equal to each
    /// other here, and `1`, `1.0` and `'1'`-as-integer collapse to the
    /// same numeric key.
    #[must_use]
    pub fn group_key(&self) -> String {
        match self {
            Value::Null => "\u{0}null".to_string(),
            Value::Integer(_)
            | Value::Float(_)
            | Value::Decimal(_)
            | Value::Boolean(_)
            | Value::Year(_) => match to_numeric(self) {
                Some(Numeric::Int(i)) => format!("n:{i}"),
                Some(Numeric::Dec(d)) => format!("n:{}", d.normalize()),
                Some(Numeric::Flt(f)) => float_key(f),
                None => "\u{0}null".to_string(),
            },
            Value::Text(s) => format!("s:{s}"),
            Value::Date(d) => format!("d:{d}"),
            Value::Time(t) => format!("t:{t}"),
            Value::DateTime(dt) => format!("dt:{dt}"),
            Value::Enum { member, .. } => format!("s:{member}"),
            Value::Set(members) => format!("set:{}", members.join(",")),
        }
    }

    /// Key used by single-column hash indexes. `None` for NULL, which is
    /// never a lookup key and never collides in UNIQUE columns.
    #[must_use]
    pub fn index_key(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.group_key())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f == f.trunc() && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

fn float_key(f: f64) -> String {
    // integral floats share a key with integers so 1 = 1.0 groups together
    if f.is_finite() && f == f.trunc() && f.abs() < 9.2e18 {
        format!("n:{}", f as i64)
    } else if let Some(d) = Decimal::from_f64(f) {
        format!("n:{}", d.normalize())
    } else {
        format!("f:{:x}", f.to_bits())
    }
}

// --- Declared column types ---

/// Declared type of a column, with the type-specific attributes the dialect
/// carries (varchar length, decimal precision/scale, enum/set members).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// INT, BIGINT, SMALLINT, TINYINT, MEDIUMINT
    Integer,
    /// FLOAT, DOUBLE, REAL
    Float,
    /// DECIMAL(p,s) / NUMERIC(p,s)
    Decimal {
        /// Total number of significant digits
        precision: u32,
        /// Digits after the decimal point
        scale: u32,
    },
    /// BOOLEAN / BOOL
    Boolean,
    /// VARCHAR(n) / CHAR(n)
    Varchar {
        /// Maximum length in characters
        length: u32,
    },
    /// TEXT (unbounded)
    Text,
    /// DATE
    Date,
    /// TIME
    Time,
    /// DATETIME
    DateTime,
    /// TIMESTAMP (stored and compared exactly like DATETIME)
    Timestamp,
    /// YEAR
    Year,
    /// ENUM('a','b',...)
    Enum {
        /// Declared members, in order
        members: Vec<String>,
    },
    /// SET('a','b',...)
    Set {
        /// Declared members, in order
        members: Vec<String>,
    },
}

impl DataType {
    /// SQL rendering of the type, as DESCRIBE prints it.
    #[must_use]
    pub fn sql_name(&self) -> String {
        match self {
            DataType::Integer => "int".to_string(),
            DataType::Float => "double".to_string(),
            DataType::Decimal { precision, scale } => format!("decimal({precision},{scale})"),
            DataType::Boolean => "boolean".to_string(),
            DataType::Varchar { length } => format!("varchar({length})"),
            DataType::Text => "text".to_string(),
            DataType::Date => "date".to_string(),
            DataType::Time => "time".to_string(),
            DataType::DateTime => "datetime".to_string(),
            DataType::Timestamp => "timestamp".to_string(),
            DataType::Year => "year".to_string(),
            DataType::Enum { members } => format!("enum({})", quoted_list(members)),
            DataType::Set { members } => format!("set({})", quoted_list(members)),
        }
    }
}

fn quoted_list(members: &[String]) -> String {
    members
        .iter()
        .map(|m| format!("'{m}'"))
        .collect::<Vec<_>>()
        .join(",")
}

// --- Coercion ---

/// Coerces `value` to the declared `target` type of column `column`.
///
/// NULL passes through untouched (nullability is the caller's check).
/// Unparseable conversions produce a type error; range, length and
/// membership failures produce a constraint violation.
pub fn coerce(value: &Value, target: &DataType, column: &str) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match target {
        DataType::Integer => coerce_integer(value, column),
        DataType::Float => to_f64(value)
            .map(Value::Float)
            .ok_or_else(|| bad_value(value, "float", column)),
        DataType::Decimal { precision, scale } => coerce_decimal(value, *precision, *scale, column),
        DataType::Boolean => value
            .as_bool()
            .map(Value::Boolean)
            .ok_or_else(|| bad_value(value, "boolean", column)),
        DataType::Varchar { length } => {
            let text = value.to_text();
            if text.chars().count() > *length as usize {
                Err(Error::Constraint(format!(
                    "value too long for column '{column}' (max {length} characters)"
                )))
            } else {
                Ok(Value::Text(text))
            }
        }
        DataType::Text => Ok(Value::Text(value.to_text())),
        DataType::Date => coerce_date(value, column),
        DataType::Time => coerce_time(value, column),
        DataType::DateTime | DataType::Timestamp => coerce_datetime(value, column),
        DataType::Year => coerce_year(value, column),
        DataType::Enum { members } => coerce_enum(value, members, column),
        DataType::Set { members } => coerce_set(value, members, column),
    }
}

fn bad_value(value: &Value, target: &str, column: &str) -> Error {
    Error::Type(format!(
        "cannot convert {} value '{}' to {} for column '{}'",
        value.type_name(),
        value.to_text(),
        target,
        column
    ))
}

fn coerce_integer(value: &Value, column: &str) -> Result<Value> {
    match value {
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
        Value::Year(y) => Ok(Value::Integer(i64::from(*y))),
        Value::Float(f) => {
            let rounded = f.round();
            if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
                Ok(Value::Integer(rounded as i64))
            } else {
                Err(Error::Constraint(format!(
                    "value '{f}' out of range for integer column '{column}'"
                )))
            }
        }
        Value::Decimal(d) => d
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Value::Integer)
            .ok_or_else(|| {
                Error::Constraint(format!(
                    "value '{d}' out of range for integer column '{column}'"
                ))
            }),
        Value::Text(s) => match parse_text_number(s.trim()) {
            Some(n) => coerce_integer(&n.into_value(), column),
            None => Err(bad_value(value, "integer", column)),
        },
        _ => Err(bad_value(value, "integer", column)),
    }
}

fn coerce_decimal(value: &Value, precision: u32, scale: u32, column: &str) -> Result<Value> {
    let dec = to_decimal(value).ok_or_else(|| bad_value(value, "decimal", column))?;
    let rounded = dec.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    let integral_digits = rounded.trunc().abs().to_string().trim_start_matches('0').len() as u32;
    if precision >= scale && integral_digits > precision - scale {
        return Err(Error::Constraint(format!(
            "value '{dec}' out of range for column '{column}' decimal({precision},{scale})"
        )));
    }
    // pad up to the declared scale so 100 prints as 100.00
    let mut out = rounded;
    out.rescale(scale);
    Ok(Value::Decimal(out))
}

fn coerce_date(value: &Value, column: &str) -> Result<Value> {
    match value {
        Value::Date(d) => Ok(Value::Date(*d)),
        Value::DateTime(dt) => Ok(Value::Date(dt.date())),
        Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|_| {
                Error::Constraint(format!("invalid date '{s}' for column '{column}'"))
            }),
        _ => Err(bad_value(value, "date", column)),
    }
}

fn coerce_time(value: &Value, column: &str) -> Result<Value> {
    match value {
        Value::Time(t) => Ok(Value::Time(*t)),
        Value::DateTime(dt) => Ok(Value::Time(dt.time())),
        Value::Text(s) => {
            let trimmed = s.trim();
            NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
                .map(Value::Time)
                .map_err(|_| {
                    Error::Constraint(format!("invalid time '{s}' for column '{column}'"))
                })
        }
        _ => Err(bad_value(value, "time", column)),
    }
}

fn coerce_datetime(value: &Value, column: &str) -> Result<Value> {
    match value {
        Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
        Value::Date(d) => match d.and_hms_opt(0, 0, 0) {
            Some(dt) => Ok(Value::DateTime(dt)),
            None => Err(bad_value(value, "datetime", column)),
        },
        Value::Text(s) => {
            let trimmed = s.trim();
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
                .map(Value::DateTime)
                .or_else(|_| {
                    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(Value::DateTime)
                        .ok_or_else(|| {
                            Error::Constraint(format!(
                                "invalid datetime '{s}' for column '{column}'"
                            ))
                        })
                })
        }
        _ => Err(bad_value(value, "datetime", column)),
    }
}

fn coerce_year(value: &Value, column: &str) -> Result<Value> {
    let raw = match value {
        Value::Year(y) => i64::from(*y),
        Value::Integer(i) => *i,
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| bad_value(value, "year", column))?,
        _ => return Err(bad_value(value, "year", column)),
    };
    // two-digit years map per MySQL: 00-69 -> 2000-2069, 70-99 -> 1970-1999
    let year = match raw {
        0..=69 => 2000 + raw,
        70..=99 => 1900 + raw,
        other => other,
    };
    if (1901..=2155).contains(&year) {
        Ok(Value::Year(year as i32))
    } else {
        Err(Error::Constraint(format!(
            "year value '{raw}' out of range for column '{column}'"
        )))
    }
}

fn coerce_enum(value: &Value, members: &[String], column: &str) -> Result<Value> {
    match value {
        Value::Enum { member, index } => Ok(Value::Enum {
            member: member.clone(),
            index: *index,
        }),
        Value::Text(s) => {
            if let Some(pos) = members.iter().position(|m| m.eq_ignore_ascii_case(s)) {
                Ok(Value::Enum {
                    member: members[pos].clone(),
                    index: pos + 1,
                })
            } else {
                Err(Error::Constraint(format!(
                    "invalid enum value '{s}' for column '{column}'"
                )))
            }
        }
        // a number selects the member by 1-based ordinal
        Value::Integer(i) => {
            let idx = *i;
            if idx >= 1 && (idx as usize) <= members.len() {
                Ok(Value::Enum {
                    member: members[idx as usize - 1].clone(),
                    index: idx as usize,
                })
            } else {
                Err(Error::Constraint(format!(
                    "invalid enum ordinal {idx} for column '{column}'"
                )))
            }
        }
        _ => Err(bad_value(value, "enum", column)),
    }
}

fn coerce_set(value: &Value, members: &[String], column: &str) -> Result<Value> {
    let chosen: Vec<String> = match value {
        Value::Set(items) => items.clone(),
        Value::Text(s) if s.is_empty() => Vec::new(),
        Value::Text(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        _ => return Err(bad_value(value, "set", column)),
    };
    let mut picked = vec![false; members.len()];
    for item in &chosen {
        match members.iter().position(|m| m.eq_ignore_ascii_case(item)) {
            Some(pos) if !picked[pos] => picked[pos] = true,
            Some(_) => {
                return Err(Error::Constraint(format!(
                    "duplicate set member '{item}' for column '{column}'"
                )));
            }
            None => {
                return Err(Error::Constraint(format!(
                    "invalid set member '{item}' for column '{column}'"
                )));
            }
        }
    }
    // normalized to declared member order
    let normalized = members
        .iter()
        .zip(&picked)
        .filter(|(_, p)| **p)
        .map(|(m, _)| m.clone())
        .collect();
    Ok(Value::Set(normalized))
}

// --- Result-type unification ---

/// The type a combined output column settles on when its values come
/// from more than one source, as UNION arms do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// 64-bit integers (booleans and years fold in here)
    Integer,
    /// Arbitrary precision decimal
    Decimal,
    /// 64-bit float
    Float,
    /// Calendar date
    Date,
    /// Time of day
    Time,
    /// Date and time
    DateTime,
    /// Text (the fallback for any other mix)
    Text,
}

fn result_kind(value: &Value) -> Option<ResultKind> {
    match value {
        Value::Null => None,
        Value::Integer(_) | Value::Boolean(_) | Value::Year(_) => Some(ResultKind::Integer),
        Value::Decimal(_) => Some(ResultKind::Decimal),
        Value::Float(_) => Some(ResultKind::Float),
        Value::Text(_) | Value::Enum { .. } | Value::Set(_) => Some(ResultKind::Text),
        Value::Date(_) => Some(ResultKind::Date),
        Value::Time(_) => Some(ResultKind::Time),
        Value::DateTime(_) => Some(ResultKind::DateTime),
    }
}

fn combine_kinds(a: ResultKind, b: ResultKind) -> ResultKind {
    use ResultKind::{Date, DateTime, Decimal, Float, Integer, Text};
    if a == b {
        return a;
    }
    let numeric = |k: ResultKind| matches!(k, Integer | Decimal | Float);
    if numeric(a) && numeric(b) {
        // widen per the arithmetic rules: Decimal beats Float beats Integer
        if a == Decimal || b == Decimal {
            Decimal
        } else if a == Float || b == Float {
            Float
        } else {
            Integer
        }
    } else if matches!((a, b), (Date, DateTime) | (DateTime, Date)) {
        DateTime
    } else {
        Text
    }
}

/// Folds one more value into a column's common result kind. NULLs carry
/// no type and leave the accumulator untouched.
#[must_use]
pub fn common_kind(acc: Option<ResultKind>, value: &Value) -> Option<ResultKind> {
    match (acc, result_kind(value)) {
        (None, kind) => kind,
        (kind, None) => kind,
        (Some(a), Some(b)) => Some(combine_kinds(a, b)),
    }
}

/// Converts a value into a column's common result kind. NULL stays
/// NULL; a value the kind cannot hold is left as it is (unreachable
/// when the kind came from [`common_kind`] over the same values).
#[must_use]
pub fn convert_to_kind(value: &Value, kind: ResultKind) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match kind {
        ResultKind::Integer => to_i64(value)
            .map(Value::Integer)
            .unwrap_or_else(|| value.clone()),
        ResultKind::Decimal => to_decimal(value)
            .map(Value::Decimal)
            .unwrap_or_else(|| value.clone()),
        ResultKind::Float => to_f64(value)
            .map(Value::Float)
            .unwrap_or_else(|| value.clone()),
        ResultKind::Text => Value::Text(value.to_text()),
        ResultKind::DateTime => match value {
            Value::DateTime(dt) => Value::DateTime(*dt),
            Value::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(Value::DateTime)
                .unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        },
        // only reached with homogeneous inputs
        ResultKind::Date | ResultKind::Time => value.clone(),
    }
}

// --- Numeric tower ---

enum Numeric {
    Int(i64),
    Dec(Decimal),
    Flt(f64),
}

impl Numeric {
    fn into_value(self) -> Value {
        match self {
            Numeric::Int(i) => Value::Integer(i),
            Numeric::Dec(d) => Value::Decimal(d),
            Numeric::Flt(f) => Value::Float(f),
        }
    }
}

fn parse_text_number(s: &str) -> Option<Numeric> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Numeric::Int(i));
    }
    if let Ok(d) = t.parse::<Decimal>() {
        return Some(Numeric::Dec(d));
    }
    t.parse::<f64>().ok().map(Numeric::Flt)
}

fn to_numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Integer(i) => Some(Numeric::Int(*i)),
        Value::Float(f) => Some(Numeric::Flt(*f)),
        Value::Decimal(d) => Some(Numeric::Dec(*d)),
        Value::Boolean(b) => Some(Numeric::Int(i64::from(*b))),
        Value::Year(y) => Some(Numeric::Int(i64::from(*y))),
        Value::Text(s) => parse_text_number(s),
        Value::Enum { index, .. } => Some(Numeric::Int(*index as i64)),
        _ => None,
    }
}

/// f64 view of a value, where one exists.
#[must_use]
pub fn to_f64(value: &Value) -> Option<f64> {
    match to_numeric(value)? {
        Numeric::Int(i) => Some(i as f64),
        Numeric::Dec(d) => d.to_f64(),
        Numeric::Flt(f) => Some(f),
    }
}

/// Decimal view of a value, where one exists.
#[must_use]
pub fn to_decimal(value: &Value) -> Option<Decimal> {
    match to_numeric(value)? {
        Numeric::Int(i) => Some(Decimal::from(i)),
        Numeric::Dec(d) => Some(d),
        Numeric::Flt(f) => Decimal::from_f64(f),
    }
}

/// i64 view of a value, where one exists (floats and decimals truncate).
#[must_use]
pub fn to_i64(value: &Value) -> Option<i64> {
    match to_numeric(value)? {
        Numeric::Int(i) => Some(i),
        Numeric::Dec(d) => d.trunc().to_i64(),
        Numeric::Flt(f) => {
            if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Some(f.trunc() as i64)
            } else {
                None
            }
        }
    }
}

// --- Comparison ---

/// Three-valued comparison. `None` is Unknown: any NULL operand, a float
/// NaN, or operand types with no defined order.
///
/// Numeric comparison promotes per the arithmetic rules; text against a
/// number is compared numerically when the text parses and lexically
/// otherwise; dates and times compare chronologically.
#[must_use]
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    use Value::{Date, DateTime, Enum, Null, Set, Text, Time};

    match (a, b) {
        (Null, _) | (_, Null) => None,

        (Date(x), Date(y)) => Some(x.cmp(y)),
        (Time(x), Time(y)) => Some(x.cmp(y)),
        (DateTime(x), DateTime(y)) => Some(x.cmp(y)),
        (Date(x), DateTime(y)) => Some(x.and_hms_opt(0, 0, 0)?.cmp(y)),
        (DateTime(x), Date(y)) => Some(x.cmp(&y.and_hms_opt(0, 0, 0)?)),
        (Date(x), Text(s)) => compare_date_text(*x, s),
        (Text(s), Date(y)) => compare_date_text(*y, s).map(Ordering::reverse),
        (DateTime(x), Text(s)) => compare_datetime_text(*x, s),
        (Text(s), DateTime(y)) => compare_datetime_text(*y, s).map(Ordering::reverse),
        (Time(x), Text(s)) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")
            .ok()
            .map(|t| x.cmp(&t))
            .or_else(|| Some(a.to_text().cmp(&b.to_text()))),
        (Text(s), Time(y)) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")
            .ok()
            .map(|t| t.cmp(y))
            .or_else(|| Some(a.to_text().cmp(&b.to_text()))),

        // enum against text compares by member spelling
        (Enum { member, .. }, Text(s)) => Some(member.as_str().cmp(s.as_str())),
        (Text(s), Enum { member, .. }) => Some(s.as_str().cmp(member.as_str())),
        (Enum { member: x, .. }, Enum { member: y, .. }) => Some(x.cmp(y)),

        (Set(_), _) | (_, Set(_)) => Some(a.to_text().cmp(&b.to_text())),

        (Text(x), Text(y)) => Some(x.cmp(y)),

        // everything numeric-ish, plus text-vs-number with lexical fallback
        _ => match (to_numeric(a), to_numeric(b)) {
            (Some(x), Some(y)) => compare_numeric(&x, &y),
            _ => Some(a.to_text().cmp(&b.to_text())),
        },
    }
}

fn compare_date_text(d: NaiveDate, s: &str) -> Option<Ordering> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .map(|parsed| d.cmp(&parsed))
        .or_else(|| Some(d.format("%Y-%m-%d").to_string().cmp(&s.to_string())))
}

fn compare_datetime_text(dt: NaiveDateTime, s: &str) -> Option<Ordering> {
    let trimmed = s.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|parsed| dt.cmp(&parsed))
        .or_else(|| {
            Some(
                dt.format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .cmp(&s.to_string()),
            )
        })
}

fn compare_numeric(a: &Numeric, b: &Numeric) -> Option<Ordering> {
    match (a, b) {
        (Numeric::Int(x), Numeric::Int(y)) => Some(x.cmp(y)),
        (Numeric::Flt(_), _) | (_, Numeric::Flt(_)) => {
            numeric_f64(a).partial_cmp(&numeric_f64(b))
        }
        _ => Some(numeric_decimal(a)?.cmp(&numeric_decimal(b)?)),
    }
}

fn numeric_f64(n: &Numeric) -> f64 {
    match n {
        Numeric::Int(i) => *i as f64,
        Numeric::Dec(d) => d.to_f64().unwrap_or(f64::NAN),
        Numeric::Flt(f) => *f,
    }
}

fn numeric_decimal(n: &Numeric) -> Option<Decimal> {
    match n {
        Numeric::Int(i) => Some(Decimal::from(*i)),
        Numeric::Dec(d) => Some(*d),
        Numeric::Flt(f) => Decimal::from_f64(*f),
    }
}

/// SQL equality: `Some(true)`/`Some(false)`, or `None` when Unknown.
#[must_use]
pub fn equal(a: &Value, b: &Value) -> Option<bool> {
    compare(a, b).map(|ord| ord == Ordering::Equal)
}

// --- Arithmetic ---

/// Binary arithmetic operator selector for [`arith`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` (integer operands produce a float, MySQL manner)
    Div,
    /// `%` / MOD
    Mod,
}

/// Arithmetic with standard promotion: Decimal if any operand is Decimal,
/// else Float if any is Float, else Integer. NULL operands propagate NULL,
/// and text that fails to parse as a number yields NULL too. Integer
/// overflow falls back to Decimal.
pub fn arith(op: ArithOp, a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (Some(na), Some(nb)) = (arith_operand(a), arith_operand(b)) else {
        return Err(Error::Type(format!(
            "arithmetic undefined for {} and {}",
            a.type_name(),
            b.type_name()
        )));
    };
    let (Some(na), Some(nb)) = (na, nb) else {
        // text that does not parse as a number
        return Ok(Value::Null);
    };
    match (na, nb) {
        (Numeric::Dec(x), y) => arith_decimal(op, x, numeric_decimal_lossy(&y)),
        (x, Numeric::Dec(y)) => arith_decimal(op, numeric_decimal_lossy(&x), y),
        (Numeric::Flt(x), y) => Ok(arith_float(op, x, numeric_f64(&y))),
        (x, Numeric::Flt(y)) => Ok(arith_float(op, numeric_f64(&x), y)),
        (Numeric::Int(x), Numeric::Int(y)) => arith_integer(op, x, y),
    }
}

// Some(None) = parseable domain but unparseable text -> NULL result,
// None = type with no numeric meaning -> type error.
#[allow(clippy::option_option)]
fn arith_operand(v: &Value) -> Option<Option<Numeric>> {
    match v {
        Value::Integer(_)
        | Value::Float(_)
        | Value::Decimal(_)
        | Value::Boolean(_)
        | Value::Year(_)
        | Value::Enum { .. } => Some(to_numeric(v)),
        Value::Text(s) => Some(parse_text_number(s)),
        _ => None,
    }
}

fn numeric_decimal_lossy(n: &Numeric) -> Decimal {
    numeric_decimal(n).unwrap_or_else(|| {
        Decimal::from_f64(numeric_f64(n).clamp(-7.9e28, 7.9e28)).unwrap_or(Decimal::MAX)
    })
}

fn arith_integer(op: ArithOp, x: i64, y: i64) -> Result<Value> {
    let overflowed = |dx: Decimal, dy: Decimal| arith_decimal(op, dx, dy);
    match op {
        ArithOp::Add => match x.checked_add(y) {
            Some(v) => Ok(Value::Integer(v)),
            None => overflowed(Decimal::from(x), Decimal::from(y)),
        },
        ArithOp::Sub => match x.checked_sub(y) {
            Some(v) => Ok(Value::Integer(v)),
            None => overflowed(Decimal::from(x), Decimal::from(y)),
        },
        ArithOp::Mul => match x.checked_mul(y) {
            Some(v) => Ok(Value::Integer(v)),
            None => overflowed(Decimal::from(x), Decimal::from(y)),
        },
        // integer division produces a float, MySQL-style
        ArithOp::Div => {
            if y == 0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float(x as f64 / y as f64))
            }
        }
        ArithOp::Mod => {
            if y == 0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Integer(x % y))
            }
        }
    }
}

fn arith_float(op: ArithOp, x: f64, y: f64) -> Value {
    match op {
        ArithOp::Add => Value::Float(x + y),
        ArithOp::Sub => Value::Float(x - y),
        ArithOp::Mul => Value::Float(x * y),
        ArithOp::Div => {
            if y == 0.0 {
                Value::Null
            } else {
                Value::Float(x / y)
            }
        }
        ArithOp::Mod => {
            if y == 0.0 {
                Value::Null
            } else {
                Value::Float(x % y)
            }
        }
    }
}

fn arith_decimal(op: ArithOp, x: Decimal, y: Decimal) -> Result<Value> {
    let out = match op {
        ArithOp::Add => x.checked_add(y),
        ArithOp::Sub => x.checked_sub(y),
        ArithOp::Mul => x.checked_mul(y),
        ArithOp::Div => {
            if y == Decimal::ZERO {
                return Ok(Value::Null);
            }
            x.checked_div(y)
        }
        ArithOp::Mod => {
            if y == Decimal::ZERO {
                return Ok(Value::Null);
            }
            x.checked_rem(y)
        }
    };
    out.map(Value::Decimal).ok_or_else(|| {
        Error::Type(format!("decimal arithmetic overflow on {x} and {y}"))
    })
}

/// Negation for unary minus.
pub fn negate(v: &Value) -> Result<Value> {
    match v {
        Value::Null => Ok(Value::Null),
        _ => arith(ArithOp::Sub, &Value::Integer(0), v),
    }
}
