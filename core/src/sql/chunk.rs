use crate::prelude::*;
use crate::sql::tokens::Token;
use crate::value::Value;
use core::fmt::Write;

/// A SQL chunk represents a part of an SQL statement.
///
/// - `Token` - SQL keywords and operators (SELECT, FROM, =, etc.)
/// - `Ident` - Quoted identifiers ("table_name", "alias")
/// - `Raw` - Unquoted raw SQL text (function names, casts)
/// - `Literal` - Single-quoted string literal ('key')
/// - `Number` - Unsigned integer literal (LIMIT/OFFSET values)
/// - `Param` - Parameter placeholder with its bound value
/// - `Column` - Qualified column reference ("t0"."name")
#[derive(Debug, Clone, PartialEq)]
pub enum SQLChunk {
    /// SQL keywords and operators
    Token(Token),

    /// Quoted identifier
    /// Renders as: "name" (with quotes)
    Ident(CompactString),

    /// Raw SQL text (unquoted)
    /// Use for: function names like json_object, type names in casts
    Raw(Cow<'static, str>),

    /// String literal, single quotes doubled
    /// Renders as: 'text'
    Literal(CompactString),

    /// Unsigned integer literal
    Number(usize),

    /// Parameter with value
    /// Renders as: ? or $1 depending on the dialect
    Param(Value),

    /// Column qualified by a table alias
    /// Renders as: "alias"."column"
    Column {
        table: CompactString,
        name: CompactString,
    },
}

impl SQLChunk {
    /// Creates a token chunk - const
    #[inline]
    pub const fn token(t: Token) -> Self {
        Self::Token(t)
    }

    /// Creates raw SQL text from a static string - const
    #[inline]
    pub const fn raw_static(text: &'static str) -> Self {
        Self::Raw(Cow::Borrowed(text))
    }

    /// Creates a quoted identifier
    #[inline]
    pub fn ident(name: impl Into<CompactString>) -> Self {
        Self::Ident(name.into())
    }

    /// Creates raw SQL text from a runtime string
    #[inline]
    pub fn raw(text: impl Into<Cow<'static, str>>) -> Self {
        Self::Raw(text.into())
    }

    /// Write chunk content to buffer (parameters are written by the caller)
    pub(crate) fn write(&self, buf: &mut impl Write) {
        match self {
            SQLChunk::Token(token) => {
                let _ = buf.write_str(token.as_str());
            }
            SQLChunk::Ident(name) => write_ident(buf, name),
            SQLChunk::Raw(text) => {
                let _ = buf.write_str(text);
            }
            SQLChunk::Literal(text) => {
                let _ = buf.write_char('\'');
                for c in text.chars() {
                    if c == '\'' {
                        let _ = buf.write_char('\'');
                    }
                    let _ = buf.write_char(c);
                }
                let _ = buf.write_char('\'');
            }
            SQLChunk::Number(n) => {
                let _ = write!(buf, "{n}");
            }
            SQLChunk::Param(_) => {
                let _ = buf.write_char('?');
            }
            SQLChunk::Column { table, name } => {
                write_ident(buf, table);
                let _ = buf.write_char('.');
                write_ident(buf, name);
            }
        }
    }

    /// Check if this chunk is "word-like" (needs space separation from other word-like chunks)
    #[inline]
    pub(crate) const fn is_word_like(&self) -> bool {
        match self {
            SQLChunk::Token(t) => !matches!(
                t,
                Token::LPAREN
                    | Token::RPAREN
                    | Token::COMMA
                    | Token::DOT
                    | Token::EQ
                    | Token::NE
                    | Token::LT
                    | Token::GT
                    | Token::LE
                    | Token::GE
                    | Token::OVERLAP
                    | Token::CONTAINS
            ),
            SQLChunk::Ident(_)
            | SQLChunk::Raw(_)
            | SQLChunk::Literal(_)
            | SQLChunk::Number(_)
            | SQLChunk::Param(_)
            | SQLChunk::Column { .. } => true,
        }
    }
}

fn write_ident(buf: &mut impl Write, name: &str) {
    let _ = buf.write_char('"');
    for c in name.chars() {
        if c == '"' {
            let _ = buf.write_char('"');
        }
        let _ = buf.write_char(c);
    }
    let _ = buf.write_char('"');
}

impl From<Token> for SQLChunk {
    #[inline]
    fn from(value: Token) -> Self {
        SQLChunk::Token(value)
    }
}

impl From<Value> for SQLChunk {
    #[inline]
    fn from(value: Value) -> Self {
        SQLChunk::Param(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_escaping() {
        let mut buf = String::new();
        SQLChunk::Literal("it's".into()).write(&mut buf);
        assert_eq!(buf, "'it''s'");
    }

    #[test]
    fn test_column_rendering() {
        let mut buf = String::new();
        SQLChunk::Column {
            table: "t0".into(),
            name: "age".into(),
        }
        .write(&mut buf);
        assert_eq!(buf, "\"t0\".\"age\"");
    }
}
