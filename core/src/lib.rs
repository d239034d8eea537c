//! Core of the mongoql Query Object compiler.
//!
//! A Query Object is an untrusted JSON document describing what to load from one model:
//! `filter`, `project`, `sort`, `group`, `join`, `joinf`, `aggregate`, `skip`, `limit`
//! and `count`. [`MongoQuery`] validates it against the model's [`ModelBags`] and the
//! caller's [`QuerySettings`] and renders a single [`SQL`] statement.

pub mod bag;
pub mod crud;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod model;
pub mod operators;
pub mod query;
pub mod session;
pub mod settings;
pub mod sql;
mod tracing;
pub mod value;

pub use bag::{BagKind, Category, CombinedBag, Lookup, ModelBags, Resolved};
pub use crud::{CrudHelper, SaveHook, StrictCrudHelper, StrictSettings};
pub use dialect::{Dialect, DialectExt};
pub use entity::Entity;
pub use error::{MongoqlError, Result};
pub use model::{ColumnDef, ModelDef, PropertyDef, RelCardinality, RelationDef, Schema};
pub use query::{CompiledQuery, MongoQuery, QueryResult, Reusable, ResultShape, Select, compile};
pub use session::{Rows, Session};
pub use settings::{ForceFilter, QuerySettings, Related};
pub use sql::{SQL, SQLChunk, Token};
pub use value::Value;

pub use mongoql_types::SqlType;

/// Shared imports for the crate's modules
pub(crate) mod prelude {
    pub use compact_str::CompactString;
    pub use hashbrown::{HashMap, HashSet};
    pub use serde_json::Value as JsonValue;
    pub use std::borrow::Cow;
    pub use std::sync::Arc;

    /// Order-preserving JSON object
    pub type JsonMap = serde_json::Map<String, JsonValue>;
}

pub use prelude::JsonMap;
