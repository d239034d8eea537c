//! Dialect type re-exported from mongoql-types with core-specific extensions.

use crate::prelude::*;
use crate::sql::{SQL, SQLChunk, Token};
use core::fmt::Write;

/// Re-export the unified Dialect enum from mongoql-types
pub use mongoql_types::Dialect;

/// Writes a placeholder for the given 1-based index.
/// PostgreSQL: `$1, $2, ...`; SQLite/MySQL: `?`
#[inline]
pub(crate) fn write_placeholder(dialect: Dialect, index: usize, buf: &mut impl Write) {
    if dialect.uses_numbered_placeholders() {
        let _ = write!(buf, "${index}");
    } else {
        let _ = buf.write_char('?');
    }
}

/// Extension trait for dialect-specific SQL fragments
pub trait DialectExt {
    /// JSON object constructor: `json_object` / `json_build_object`
    fn json_object_fn(&self) -> &'static str;

    /// Null-safe inequality: `IS NOT` (SQLite) / `IS DISTINCT FROM` (PostgreSQL)
    fn distinct_from(&self) -> SQL;

    /// Cast type name for a JSON operand of the given kind
    fn cast_type(&self, kind: OperandKind) -> Option<&'static str>;
}

/// Runtime type of a JSON operand; drives casts of JSON sub-path expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Integer,
    Float,
    Text,
    Boolean,
    Other,
}

impl OperandKind {
    pub fn of(value: &JsonValue) -> Self {
        match value {
            JsonValue::Bool(_) => OperandKind::Boolean,
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => OperandKind::Integer,
            JsonValue::Number(_) => OperandKind::Float,
            JsonValue::String(_) => OperandKind::Text,
            JsonValue::Array(items) => items.first().map(OperandKind::of).unwrap_or(OperandKind::Other),
            _ => OperandKind::Other,
        }
    }
}

impl DialectExt for Dialect {
    fn json_object_fn(&self) -> &'static str {
        match self {
            Dialect::SQLite | Dialect::MySQL => "json_object",
            Dialect::PostgreSQL => "json_build_object",
        }
    }

    fn distinct_from(&self) -> SQL {
        match self {
            Dialect::SQLite | Dialect::MySQL => SQL::token(Token::IS).push(Token::NOT),
            Dialect::PostgreSQL => SQL::token(Token::IS)
                .push(Token::DISTINCT)
                .push(Token::FROM),
        }
    }

    fn cast_type(&self, kind: OperandKind) -> Option<&'static str> {
        match (self, kind) {
            (_, OperandKind::Integer) => Some("INTEGER"),
            (Dialect::PostgreSQL, OperandKind::Float) => Some("DOUBLE PRECISION"),
            (_, OperandKind::Float) => Some("REAL"),
            (Dialect::PostgreSQL, OperandKind::Boolean) => Some("BOOLEAN"),
            _ => None,
        }
    }
}

/// Extracts a JSON sub-path from a JSON column as text.
///
/// PostgreSQL: `"t0"."data" #>> '{a,0}'`; SQLite: `json_extract("t0"."data", '$."a"[0]')`.
/// Path segments must already be validated.
pub(crate) fn json_path_text(dialect: Dialect, column: SQL, path: &[CompactString]) -> SQL {
    match dialect {
        Dialect::PostgreSQL => column
            .push(SQLChunk::raw_static("#>>"))
            .append(SQL::literal(postgres_path(path)))
            .parens(),
        Dialect::SQLite | Dialect::MySQL => {
            let mut literal = String::from("$");
            for segment in path {
                if segment.bytes().all(|b| b.is_ascii_digit()) {
                    let _ = write!(literal, "[{segment}]");
                } else {
                    let _ = write!(literal, ".\"{segment}\"");
                }
            }
            SQL::func(
                "json_extract",
                column.push(Token::COMMA).append(SQL::literal(literal)),
            )
        }
    }
}

/// Extracts a JSON sub-path keeping its JSON type, so numbers order numerically.
///
/// PostgreSQL: `CAST(("t0"."data" #> '{a,0}') AS JSONB)`; SQLite `json_extract` already
/// yields integers, reals and text.
pub(crate) fn json_path_value(dialect: Dialect, column: SQL, path: &[CompactString]) -> SQL {
    match dialect {
        Dialect::PostgreSQL => SQL::cast(
            column
                .push(SQLChunk::raw_static("#>"))
                .append(SQL::literal(postgres_path(path)))
                .parens(),
            "JSONB",
        ),
        Dialect::SQLite | Dialect::MySQL => json_path_text(dialect, column, path),
    }
}

/// `{a,0}`
fn postgres_path(path: &[CompactString]) -> String {
    let mut literal = String::from("{");
    for (i, segment) in path.iter().enumerate() {
        if i > 0 {
            literal.push(',');
        }
        literal.push_str(segment);
    }
    literal.push('}');
    literal
}

/// Opens a JSON array aggregation for many-relations.
/// SQLite: `json_group_array(`, PostgreSQL: `COALESCE(json_agg(`
pub(crate) fn json_array_agg(dialect: Dialect, item: SQL, order_by: Option<SQL>) -> SQL {
    match dialect {
        Dialect::SQLite | Dialect::MySQL => SQL::func("json_group_array", item),
        Dialect::PostgreSQL => {
            let mut inner = item;
            if let Some(order_by) = order_by {
                inner = inner.push(Token::ORDER).push(Token::BY).append(order_by);
            }
            SQL::func(
                "COALESCE",
                SQL::func("json_agg", inner)
                    .push(Token::COMMA)
                    .push(SQLChunk::raw_static("'[]'::json")),
            )
        }
    }
}
