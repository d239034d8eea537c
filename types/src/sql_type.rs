use crate::alloc_prelude::Box;

/// Semantic type of a model column.
///
/// This is the type information the compiler needs to pick operators and decode rows;
/// it is intentionally coarser than the storage types of any particular dialect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SqlType {
    Integer,
    Real,
    Numeric,
    Text,
    Boolean,
    Date,
    Timestamp,
    Uuid,
    /// JSON document (`json`/`jsonb` on PostgreSQL, JSON text on SQLite)
    Json,
    Blob,
    /// Array of items (`T[]` on PostgreSQL, a JSON array on SQLite)
    Array(Box<SqlType>),
}

impl SqlType {
    /// Creates an array type of `item`
    #[inline]
    pub fn array(item: SqlType) -> Self {
        SqlType::Array(Box::new(item))
    }

    #[inline]
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, SqlType::Array(_))
    }

    #[inline]
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self, SqlType::Json)
    }

    #[inline]
    #[must_use]
    pub const fn is_boolean(&self) -> bool {
        matches!(self, SqlType::Boolean)
    }

    /// Returns `true` for values stored as JSON text on dialects without native
    /// JSON/array types; those must be parsed back when decoding rows.
    #[inline]
    #[must_use]
    pub const fn is_document(&self) -> bool {
        matches!(self, SqlType::Json | SqlType::Array(_))
    }
}
