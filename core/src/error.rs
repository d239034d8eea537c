use compact_str::CompactString;
use thiserror::Error;

/// Errors raised while compiling or executing a Query Object.
///
/// `InvalidColumn`, `InvalidRelation`, `InvalidQuery` and `Disabled` are caused by user
/// input and are safe to report back to an API caller.
#[derive(Debug, Error)]
pub enum MongoqlError {
    /// Unknown field name referenced in a Query Object section
    #[error("Invalid column \"{column}\" for \"{model}\" specified in {location}")]
    InvalidColumn {
        model: CompactString,
        column: CompactString,
        location: CompactString,
    },

    /// Unknown relation name referenced in join, joinf or a dot-path
    #[error("Invalid relation \"{relation}\" for \"{model}\" specified in {location}")]
    InvalidRelation {
        model: CompactString,
        relation: CompactString,
        location: CompactString,
    },

    /// Structurally malformed Query Object
    #[error("Query object error: {0}")]
    InvalidQuery(String),

    /// A feature that is turned off or disallowed by the settings
    #[error("Feature disabled: {0}")]
    Disabled(String),

    /// Invalid settings or model definitions
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Attribute was not loaded and lazy loading raises for this query
    #[error("Attribute \"{field}\" of \"{model}\" was not loaded")]
    NotLoaded {
        model: CompactString,
        field: CompactString,
    },

    /// Error executing a query
    #[error("Execution error: {0}")]
    Execution(String),

    /// Error mapping result rows
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Rusqlite specific errors
    #[cfg(feature = "rusqlite")]
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

impl MongoqlError {
    pub(crate) fn invalid_column(model: &str, column: &str, location: &str) -> Self {
        MongoqlError::InvalidColumn {
            model: model.into(),
            column: column.into(),
            location: location.into(),
        }
    }

    pub(crate) fn invalid_relation(model: &str, relation: &str, location: &str) -> Self {
        MongoqlError::InvalidRelation {
            model: model.into(),
            relation: relation.into(),
            location: location.into(),
        }
    }

    /// Returns `true` for errors caused by the Query Object or entity input
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MongoqlError::InvalidColumn { .. }
                | MongoqlError::InvalidRelation { .. }
                | MongoqlError::InvalidQuery(_)
                | MongoqlError::Disabled(_)
        )
    }
}

/// Result type for compilation and execution
pub type Result<T> = std::result::Result<T, MongoqlError>;
