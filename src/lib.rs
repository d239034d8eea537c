//! # mongoql
//!
//! Compiles MongoDB-style JSON Query Objects into one SQL statement per request, under a
//! per-model security policy.
//!
//! ## Quick Start
//!
//! ```rust
//! use mongoql::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> mongoql::Result<()> {
//! let schema = Arc::new(
//!     Schema::new(Dialect::SQLite)
//!         .model(
//!             ModelDef::new("User", "users")
//!                 .column(ColumnDef::new("id", SqlType::Integer).primary_key())
//!                 .column(ColumnDef::new("name", SqlType::Text))
//!                 .relation(RelationDef::many("articles", "Article").on("uid", "id")),
//!         )
//!         .model(
//!             ModelDef::new("Article", "articles")
//!                 .column(ColumnDef::new("id", SqlType::Integer).primary_key())
//!                 .column(ColumnDef::new("uid", SqlType::Integer))
//!                 .column(ColumnDef::new("title", SqlType::Text)),
//!         ),
//! );
//!
//! let compiled = MongoQuery::new(schema, "User", Arc::new(QuerySettings::default()))?
//!     .query(&json!({"project": ["name"], "filter": {"name": "ann"}}))?
//!     .end()?;
//!
//! assert_eq!(
//!     compiled.sql(),
//!     r#"SELECT "t0"."id", "t0"."name" FROM "users" AS "t0" WHERE "t0"."name" = ?"#
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Query Object sections
//!
//! | Section     | Meaning                                              |
//! |-------------|------------------------------------------------------|
//! | `project`   | attributes to load (inclusion or exclusion)          |
//! | `sort`      | ordering, `"name-"` for descending                   |
//! | `group`     | GROUP BY keys                                        |
//! | `filter`    | criteria with `$eq`, `$in`, `$or`, ... operators     |
//! | `join`      | related models to load                               |
//! | `joinf`     | related models to load, dropping parents without one |
//! | `aggregate` | labelled aggregate expressions                       |
//! | `skip`      | OFFSET                                               |
//! | `limit`     | LIMIT, capped by `max_items`                         |
//! | `count`     | return the row count instead of rows                 |
//!
//! ## Database Support
//!
//! | Database   | Driver   | Feature Flag | Compile | Execute |
//! |------------|----------|--------------|---------|---------|
//! | SQLite     | rusqlite | `rusqlite`   | ✅      | ✅      |
//! | PostgreSQL | any      |              | ✅      | via [`Session`] |

// =============================================================================
// Root-level exports
// =============================================================================

/// Result type for compilation and execution
pub use mongoql_core::error::Result;

/// Database dialect enum
pub use mongoql_types::Dialect;

/// Column types
pub use mongoql_types::SqlType;

/// Error types
pub mod error {
    pub use mongoql_core::error::MongoqlError;
}

pub use mongoql_core::{
    CompiledQuery, CrudHelper, Entity, MongoQuery, QueryResult, Reusable, ResultShape, Rows,
    Select, Session, StrictCrudHelper, StrictSettings, compile,
};

// =============================================================================
// Modules
// =============================================================================

/// Model definitions and their attribute bags
pub mod model {
    pub use mongoql_core::bag::{
        BagKind, Category, ColumnInfo, CombinedBag, ComputedInfo, HybridInfo, Lookup, ModelBags,
        Resolved,
    };
    pub use mongoql_core::model::*;
}

/// Per-model policy
pub mod settings {
    pub use mongoql_core::settings::{ForceFilter, QuerySettings, Related};
}

/// SQL fragments and parameters
pub mod sql {
    pub use mongoql_core::dialect::DialectExt;
    pub use mongoql_core::sql::{SQL, SQLChunk, Token};
    pub use mongoql_core::value::Value;
}

/// Filter operators accepted in `filter` criteria
pub mod operators {
    pub use mongoql_core::operators::*;
}

/// Query Object handlers, for callers composing their own compiler
pub mod handlers {
    pub use mongoql_core::handlers::*;
}

/// CRUD helpers
pub mod crud {
    pub use mongoql_core::crud::*;
}

// =============================================================================
// Prelude
// =============================================================================

/// Everything needed to define models and compile Query Objects.
///
/// ```rust
/// use mongoql::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::MongoqlError;
    pub use crate::model::{ColumnDef, ModelDef, PropertyDef, RelCardinality, RelationDef, Schema};
    pub use crate::settings::{ForceFilter, QuerySettings};
    pub use crate::sql::{SQL, Token, Value};
    pub use crate::{
        CompiledQuery, CrudHelper, Dialect, Entity, MongoQuery, QueryResult, Result, ResultShape,
        Rows, Select, Session, SqlType, StrictCrudHelper, StrictSettings, compile,
    };
}
