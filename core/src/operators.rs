//! Filter operators and their compilation into predicates.
//!
//! Operator selection depends on the column kind and, for array columns and JSON
//! sub-paths, on the runtime type of the operand.

use crate::dialect::{Dialect, DialectExt, OperandKind};
use crate::error::{MongoqlError, Result};
use crate::prelude::*;
use crate::sql::{SQL, SQLChunk, Token};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Exists,
    Prefix,
    All,
    Size,
}

impl Operator {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$in" => Operator::In,
            "$nin" => Operator::Nin,
            "$exists" => Operator::Exists,
            "$prefix" => Operator::Prefix,
            "$all" => Operator::All,
            "$size" => Operator::Size,
            _ => return None,
        })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Exists => "$exists",
            Operator::Prefix => "$prefix",
            Operator::All => "$all",
            Operator::Size => "$size",
        }
    }

    /// Operators that take a list operand
    #[inline]
    pub const fn requires_array(&self) -> bool {
        matches!(self, Operator::In | Operator::Nin | Operator::All)
    }
}

impl core::fmt::Display for Operator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a filtered expression stores its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Columns, column properties and hybrids
    Scalar,
    /// Array columns: native arrays on PostgreSQL, JSON arrays on SQLite
    Array,
    /// A whole JSON document column
    Json,
    /// Text extracted from a JSON column, cast by operand type
    JsonPath,
}

/// An expression the operator grammar can compile predicates for
#[derive(Debug, Clone)]
pub struct Field {
    pub name: CompactString,
    pub expr: SQL,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<CompactString>, expr: SQL, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            expr,
            kind,
        }
    }
}

fn unsupported(field: &Field, op: Operator) -> MongoqlError {
    MongoqlError::InvalidQuery(format!(
        "Unsupported operator \"{op}\" for column \"{}\"",
        field.name
    ))
}

fn bad_operand(field: &Field, op: Operator, expected: &str) -> MongoqlError {
    MongoqlError::InvalidQuery(format!(
        "Operator \"{op}\" on \"{}\" expects {expected}",
        field.name
    ))
}

fn is_scalar(value: &JsonValue) -> bool {
    !matches!(value, JsonValue::Array(_) | JsonValue::Object(_))
}

fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}

/// `1 = 0` or `1 = 1`
fn constant(value: bool) -> SQL {
    SQL::number(1)
        .push(Token::EQ)
        .push(SQLChunk::Number(usize::from(value)))
}

fn null_check(expr: SQL, is_null: bool) -> SQL {
    let sql = expr.push(Token::IS);
    if is_null {
        sql.push(Token::NULL)
    } else {
        sql.push(Token::NOT).push(Token::NULL)
    }
}

fn scalar_list(field: &Field, op: Operator, operand: &JsonValue) -> Result<Vec<Value>> {
    let JsonValue::Array(items) = operand else {
        return Err(bad_operand(field, op, "an array"));
    };
    if !items.iter().all(is_scalar) {
        return Err(bad_operand(field, op, "an array of scalars"));
    }
    Ok(items.iter().map(Value::from_json).collect())
}

/// Compiles `field op operand` into a predicate
pub fn compile_predicate(
    dialect: Dialect,
    field: &Field,
    op: Operator,
    operand: &JsonValue,
) -> Result<SQL> {
    if op.requires_array() && !operand.is_array() {
        return Err(bad_operand(field, op, "an array"));
    }
    if op == Operator::Exists {
        return Ok(null_check(field.expr.clone(), !truthy(operand)));
    }

    match field.kind {
        FieldKind::Scalar => scalar_predicate(dialect, field, field.expr.clone(), op, operand),
        FieldKind::JsonPath => {
            let expr = match dialect.cast_type(OperandKind::of(operand)) {
                Some(ty) => SQL::cast(field.expr.clone(), ty),
                None => field.expr.clone(),
            };
            scalar_predicate(dialect, field, expr, op, operand)
        }
        FieldKind::Array if dialect.has_native_arrays() => native_array_predicate(field, op, operand),
        FieldKind::Array => json_array_predicate(field, op, operand),
        FieldKind::Json => json_document_predicate(dialect, field, op, operand),
    }
}

fn scalar_predicate(
    dialect: Dialect,
    field: &Field,
    expr: SQL,
    op: Operator,
    operand: &JsonValue,
) -> Result<SQL> {
    match op {
        Operator::In | Operator::Nin => {
            let values = scalar_list(field, op, operand)?;
            if values.is_empty() {
                return Ok(constant(op == Operator::Nin));
            }
            let sql = if op == Operator::In {
                expr.push(Token::IN)
            } else {
                expr.push(Token::NOT).push(Token::IN)
            };
            return Ok(sql.append(SQL::param_list(values).parens()));
        }
        Operator::All | Operator::Size | Operator::Exists => return Err(unsupported(field, op)),
        _ => {}
    }

    if !is_scalar(operand) {
        return Err(bad_operand(field, op, "a scalar"));
    }

    Ok(match op {
        Operator::Eq if operand.is_null() => null_check(expr, true),
        Operator::Ne if operand.is_null() => null_check(expr, false),
        Operator::Eq => expr.push(Token::EQ).append(SQL::param(operand)),
        Operator::Ne => expr
            .append(dialect.distinct_from())
            .append(SQL::param(operand)),
        Operator::Prefix => {
            let JsonValue::String(prefix) = operand else {
                return Err(bad_operand(field, op, "a string"));
            };
            expr.push(Token::LIKE).append(SQL::param(format!("{prefix}%")))
        }
        _ if operand.is_null() => return Err(bad_operand(field, op, "a non-null value")),
        Operator::Lt => expr.push(Token::LT).append(SQL::param(operand)),
        Operator::Lte => expr.push(Token::LE).append(SQL::param(operand)),
        Operator::Gt => expr.push(Token::GT).append(SQL::param(operand)),
        Operator::Gte => expr.push(Token::GE).append(SQL::param(operand)),
        _ => return Err(unsupported(field, op)),
    })
}

fn array_length(expr: SQL) -> SQL {
    SQL::func(
        "array_length",
        expr.push(Token::COMMA).push(SQLChunk::Number(1)),
    )
}

fn size_operand(field: &Field, operand: &JsonValue) -> Result<usize> {
    operand
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| bad_operand(field, Operator::Size, "a non-negative integer"))
}

/// PostgreSQL native arrays
fn native_array_predicate(field: &Field, op: Operator, operand: &JsonValue) -> Result<SQL> {
    let expr = field.expr.clone();
    Ok(match op {
        Operator::Eq | Operator::Ne if operand.is_null() => null_check(expr, op == Operator::Eq),
        Operator::Eq if operand.is_array() => expr.push(Token::EQ).append(SQL::param(operand)),
        Operator::Ne if operand.is_array() => expr.push(Token::NE).append(SQL::param(operand)),
        Operator::Eq | Operator::Ne => {
            if !is_scalar(operand) {
                return Err(bad_operand(field, op, "a scalar or an array"));
            }
            let (cmp, quantifier) = if op == Operator::Eq {
                (Token::EQ, Token::ANY)
            } else {
                (Token::NE, Token::ALL)
            };
            SQL::param(operand)
                .push(cmp)
                .push(quantifier)
                .append(expr.parens())
        }
        Operator::In => expr.push(Token::OVERLAP).append(SQL::param(operand)),
        Operator::Nin => SQL::token(Token::NOT).append(
            expr.push(Token::OVERLAP)
                .append(SQL::param(operand))
                .parens(),
        ),
        Operator::All => expr.push(Token::CONTAINS).append(SQL::param(operand)),
        Operator::Size => match size_operand(field, operand)? {
            0 => null_check(array_length(expr), true),
            n => array_length(expr)
                .push(Token::EQ)
                .append(SQL::param(Value::Integer(n as i64))),
        },
        _ => return Err(unsupported(field, op)),
    })
}

/// `SELECT 1 FROM json_each(expr) AS "j" WHERE "j"."value" ...`
fn json_each_exists(expr: SQL, condition: impl FnOnce(SQL) -> SQL) -> SQL {
    let subquery = SQL::token(Token::SELECT)
        .push(SQLChunk::Number(1))
        .push(Token::FROM)
        .append(SQL::func("json_each", expr).alias("j"))
        .push(Token::WHERE)
        .append(condition(SQL::column("j", "value")));
    SQL::token(Token::EXISTS).append(subquery.parens())
}

fn negate(sql: SQL) -> SQL {
    SQL::token(Token::NOT).append(sql)
}

fn json_normalized(expr: SQL) -> SQL {
    SQL::func("json", expr)
}

/// SQLite arrays stored as JSON text
fn json_array_predicate(field: &Field, op: Operator, operand: &JsonValue) -> Result<SQL> {
    let expr = field.expr.clone();
    Ok(match op {
        Operator::Eq | Operator::Ne if operand.is_null() => null_check(expr, op == Operator::Eq),
        Operator::Eq | Operator::Ne if operand.is_array() => {
            let cmp = if op == Operator::Eq { Token::EQ } else { Token::NE };
            json_normalized(expr)
                .push(cmp)
                .append(json_normalized(SQL::param(operand)))
        }
        Operator::Eq | Operator::Ne => {
            if !is_scalar(operand) {
                return Err(bad_operand(field, op, "a scalar or an array"));
            }
            let contains = json_each_exists(expr, |value| {
                value.push(Token::EQ).append(SQL::param(operand))
            });
            if op == Operator::Eq {
                contains
            } else {
                negate(contains)
            }
        }
        Operator::In | Operator::Nin => {
            let values = scalar_list(field, op, operand)?;
            if values.is_empty() {
                return Ok(constant(op == Operator::Nin));
            }
            let overlaps = json_each_exists(expr, |value| {
                value
                    .push(Token::IN)
                    .append(SQL::param_list(values).parens())
            });
            if op == Operator::In {
                overlaps
            } else {
                negate(overlaps)
            }
        }
        Operator::All => {
            scalar_list(field, op, operand)?;
            let stored = SQL::token(Token::SELECT)
                .append(SQL::column("j", "value"))
                .push(Token::FROM)
                .append(SQL::func("json_each", expr).alias("j"));
            let missing = SQL::token(Token::SELECT)
                .push(SQLChunk::Number(1))
                .push(Token::FROM)
                .append(SQL::func("json_each", SQL::param(operand)).alias("o"))
                .push(Token::WHERE)
                .append(SQL::column("o", "value"))
                .push(Token::NOT)
                .push(Token::IN)
                .append(stored.parens());
            negate(SQL::token(Token::EXISTS).append(missing.parens()))
        }
        Operator::Size => match size_operand(field, operand)? {
            0 => SQL::func(
                "COALESCE",
                SQL::func("json_array_length", expr)
                    .push(Token::COMMA)
                    .push(SQLChunk::Number(0)),
            )
            .push(Token::EQ)
            .push(SQLChunk::Number(0)),
            n => SQL::func("json_array_length", expr)
                .push(Token::EQ)
                .append(SQL::param(Value::Integer(n as i64))),
        },
        _ => return Err(unsupported(field, op)),
    })
}

/// Whole JSON documents compare structurally
fn json_document_predicate(
    dialect: Dialect,
    field: &Field,
    op: Operator,
    operand: &JsonValue,
) -> Result<SQL> {
    let expr = field.expr.clone();
    match op {
        Operator::Eq | Operator::Ne if operand.is_null() => Ok(null_check(expr, op == Operator::Eq)),
        Operator::Eq | Operator::Ne => {
            let cmp = if op == Operator::Eq { Token::EQ } else { Token::NE };
            let value = SQL::param(Value::Json(operand.clone()));
            Ok(match dialect {
                Dialect::PostgreSQL => expr
                    .parens()
                    .push(SQLChunk::raw_static("::jsonb"))
                    .push(cmp)
                    .append(value)
                    .push(SQLChunk::raw_static("::jsonb")),
                Dialect::SQLite | Dialect::MySQL => json_normalized(expr)
                    .push(cmp)
                    .append(json_normalized(value)),
            })
        }
        _ => Err(unsupported(field, op)),
    }
}
