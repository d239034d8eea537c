//! Query Object section handlers.
//!
//! Every handler validates its section on input and keeps a resolved intermediate form;
//! SQL is rendered when the query is finalized, once table aliases are known.

pub mod aggregate;
pub mod count;
pub mod filter;
pub mod group;
pub mod join;
pub mod limit;
pub mod project;
pub mod sort;

#[cfg(test)]
pub(crate) mod tests_support;

pub use aggregate::AggregateHandler;
pub use count::CountHandler;
pub use filter::{Criterion, FilterHandler};
pub use group::GroupHandler;
pub use join::{JoinHandler, JoinNode};
pub use limit::LimitHandler;
pub use project::ProjectHandler;
pub use sort::{Direction, SortHandler};

use crate::bag::{BagKind, ColumnInfo, CombinedBag, HybridInfo, Lookup, ModelBags};
use crate::dialect::{Dialect, json_path_text, json_path_value};
use crate::error::{MongoqlError, Result};
use crate::model::Schema;
use crate::operators::{Field, FieldKind};
use crate::prelude::*;
use crate::settings::QuerySettings;
use crate::sql::SQL;

/// What a handler needs to know about the query it belongs to
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    pub schema: &'a Arc<Schema>,
    pub bags: &'a Arc<ModelBags>,
    pub settings: &'a Arc<QuerySettings>,
}

impl<'a> HandlerContext<'a> {
    #[inline]
    pub fn model(&self) -> &'a str {
        self.bags.model_name()
    }

    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.schema.dialect()
    }

    pub fn combined(&self, kinds: &'a [BagKind]) -> CombinedBag<'a> {
        CombinedBag::new(self.schema, self.bags, kinds, &self.settings.legacy_fields)
    }
}

/// Alias allocation for one statement: `t0` for the root table, then `t1`, `t2`, ...
#[derive(Debug)]
pub(crate) struct RenderContext {
    pub dialect: Dialect,
    next_alias: usize,
}

impl RenderContext {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            next_alias: 0,
        }
    }

    pub fn alias(&mut self) -> CompactString {
        let alias = compact_str::format_compact!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }
}

/// An attribute expression usable in filter, sort, group and aggregate
#[derive(Clone)]
pub enum Target {
    Column(ColumnInfo),
    Hybrid(HybridInfo),
    JsonPath {
        column: ColumnInfo,
        path: Vec<CompactString>,
    },
}

impl Target {
    /// Converts a bag lookup; relations, properties and dot-paths across relations are not targets
    pub(crate) fn from_lookup(lookup: Lookup<'_>) -> Option<Self> {
        match lookup {
            Lookup::Column(column) => Some(Target::Column(column.clone())),
            Lookup::Hybrid(hybrid) => Some(Target::Hybrid(hybrid.clone())),
            Lookup::JsonPath { column, path } => Some(Target::JsonPath {
                column: column.clone(),
                path,
            }),
            _ => None,
        }
    }

    pub fn sql(&self, dialect: Dialect, alias: &str) -> SQL {
        match self {
            Target::Column(column) => column.sql(alias),
            Target::Hybrid(hybrid) => hybrid.sql(alias),
            Target::JsonPath { column, path } => json_path_text(dialect, column.sql(alias), path),
        }
    }

    /// Expression to order by; JSON sub-paths keep their JSON type
    pub fn sort_key(&self, dialect: Dialect, alias: &str) -> SQL {
        match self {
            Target::JsonPath { column, path } => json_path_value(dialect, column.sql(alias), path),
            _ => self.sql(dialect, alias),
        }
    }

    pub fn field(&self, name: &str, dialect: Dialect, alias: &str) -> Field {
        let kind = match self {
            Target::Column(column) if column.is_array() => FieldKind::Array,
            Target::Column(column) if column.is_json() => FieldKind::Json,
            Target::JsonPath { .. } => FieldKind::JsonPath,
            _ => FieldKind::Scalar,
        };
        Field::new(name, self.sql(dialect, alias), kind)
    }
}

/// Names from a string (split on whitespace and commas) or an array of strings
pub(crate) fn parse_name_list(raw: &JsonValue, section: &str) -> Result<Vec<CompactString>> {
    match raw {
        JsonValue::String(text) => Ok(text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(CompactString::from)
            .collect()),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| match item {
                JsonValue::String(name) => Ok(CompactString::from(name.as_str())),
                other => Err(MongoqlError::InvalidQuery(format!(
                    "{section} must contain strings, got {other}"
                ))),
            })
            .collect(),
        other => Err(MongoqlError::InvalidQuery(format!(
            "{section} must be a string or an array, got {other}"
        ))),
    }
}

/// `1`/`true` → true, `0`/`false` → false
pub(crate) fn parse_flag(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}
