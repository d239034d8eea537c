//! The product of compiling a Query Object.

use super::shape::Shape;
use crate::dialect::Dialect;
use crate::entity::Entity;
use crate::error::{MongoqlError, Result};
use crate::prelude::*;
use crate::session::{Rows, Session};
use crate::sql::SQL;
use crate::value::Value;

/// What executing a compiled query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// One entity per row
    Entities,
    /// A single integer (`count`)
    Scalar,
    /// One labelled map per row (`aggregate`)
    Tuples,
}

impl ResultShape {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResultShape::Entities => "entities",
            ResultShape::Scalar => "scalar",
            ResultShape::Tuples => "tuples",
        }
    }
}

impl core::fmt::Display for ResultShape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Entities(Vec<Entity>),
    Scalar(i64),
    Tuples(Vec<JsonMap>),
}

impl QueryResult {
    pub fn into_entities(self) -> Option<Vec<Entity>> {
        match self {
            QueryResult::Entities(entities) => Some(entities),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<i64> {
        match self {
            QueryResult::Scalar(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_tuples(self) -> Option<Vec<JsonMap>> {
        match self {
            QueryResult::Tuples(rows) => Some(rows),
            _ => None,
        }
    }
}

/// An immutable compiled statement plus what is needed to interpret its rows
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    statement: SQL,
    dialect: Dialect,
    shape: ResultShape,
    decoder: Shape,
    query_object: JsonMap,
    projection: JsonMap,
}

impl CompiledQuery {
    pub(super) fn new(
        statement: SQL,
        dialect: Dialect,
        shape: ResultShape,
        decoder: Shape,
        query_object: JsonMap,
        projection: JsonMap,
    ) -> Self {
        Self {
            statement,
            dialect,
            shape,
            decoder,
            query_object,
            projection,
        }
    }

    #[inline]
    pub fn statement(&self) -> &SQL {
        &self.statement
    }

    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// SQL text with dialect placeholders
    pub fn sql(&self) -> String {
        self.statement.sql(self.dialect)
    }

    /// SQL text and parameters in placeholder order
    pub fn build(&self) -> (String, Vec<Value>) {
        self.statement.build(self.dialect)
    }

    #[inline]
    pub fn result_shape(&self) -> ResultShape {
        self.shape
    }

    /// The normalized Query Object
    pub fn query_object(&self) -> &JsonMap {
        &self.query_object
    }

    /// Shown fields, relations as nested trees
    pub fn projection_tree(&self) -> &JsonMap {
        &self.projection
    }

    /// The projected, non-quiet fields of an entity, recursing into relations
    pub fn pluck(&self, entity: &Entity) -> JsonMap {
        pluck_fields(&self.projection, entity.fields())
    }

    /// Runs the statement and decodes the rows
    pub fn fetch<S: Session + ?Sized>(&self, session: &mut S) -> Result<QueryResult> {
        let (sql, params) = self.build();
        let rows = session.query(&sql, &params)?;
        self.decode(rows)
    }

    /// Interprets rows produced by this statement
    pub fn decode(&self, rows: Rows) -> Result<QueryResult> {
        match self.shape {
            ResultShape::Scalar => rows
                .rows
                .first()
                .and_then(|row| row.first())
                .and_then(JsonValue::as_i64)
                .map(QueryResult::Scalar)
                .ok_or_else(|| MongoqlError::Mapping("count returned no integer".into())),
            ResultShape::Tuples => {
                let Rows { columns, rows } = rows;
                Ok(QueryResult::Tuples(
                    rows.into_iter()
                        .map(|row| columns.iter().cloned().zip(row).collect())
                        .collect(),
                ))
            }
            ResultShape::Entities => rows
                .rows
                .into_iter()
                .map(|row| self.decoder.entity(row))
                .collect::<Result<Vec<_>>>()
                .map(QueryResult::Entities),
        }
    }
}

fn pluck_fields(tree: &JsonMap, fields: &JsonMap) -> JsonMap {
    let mut out = JsonMap::new();
    for (name, nested) in tree {
        let Some(value) = fields.get(name) else {
            continue;
        };
        let value = match (nested, value) {
            (JsonValue::Object(nested), JsonValue::Array(items)) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| match item {
                        JsonValue::Object(object) => JsonValue::Object(pluck_fields(nested, object)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            (JsonValue::Object(nested), JsonValue::Object(object)) => {
                JsonValue::Object(pluck_fields(nested, object))
            }
            (_, value) => value.clone(),
        };
        out.insert(name.clone(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pluck_fields() {
        let tree = json!({"name": 1, "articles": {"title": 1}, "author": {"name": 1}});
        let fields = json!({
            "id": 1,
            "name": "a",
            "articles": [{"id": 7, "title": "x"}],
            "author": null,
        });
        let (JsonValue::Object(tree), JsonValue::Object(fields)) = (tree, fields) else {
            unreachable!()
        };
        assert_eq!(
            JsonValue::Object(pluck_fields(&tree, &fields)),
            json!({"name": "a", "articles": [{"title": "x"}], "author": null})
        );
    }
}
