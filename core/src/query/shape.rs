//! Decoding result rows into entities.
//!
//! Root rows arrive positionally in select-list order. Relations arrive as JSON text
//! whose objects still carry SQLite's 0/1 booleans; both are fixed up here and computed
//! properties are evaluated once their dependencies are loaded.

use super::MongoQuery;
use crate::bag::ModelBags;
use crate::entity::Entity;
use crate::error::{MongoqlError, Result};
use crate::prelude::*;
use mongoql_types::SqlType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Plain,
    Boolean,
    Json,
}

impl Kind {
    fn of(ty: &SqlType) -> Self {
        if ty.is_boolean() {
            Kind::Boolean
        } else if ty.is_document() {
            Kind::Json
        } else {
            Kind::Plain
        }
    }
}

#[derive(Debug, Clone)]
enum Field {
    Value {
        name: CompactString,
        kind: Kind,
    },
    Relation {
        name: CompactString,
        many: bool,
        shape: Shape,
    },
}

/// What one model's rows look like
#[derive(Debug, Clone)]
pub(crate) struct Shape {
    bags: Arc<ModelBags>,
    fields: Vec<Field>,
    properties: Vec<CompactString>,
    raiseload: (bool, bool),
}

impl Shape {
    pub(super) fn of(query: &MongoQuery) -> Self {
        let bags = &query.bags;
        let mut fields: Vec<Field> = query
            .project
            .loaded_columns(bags)
            .map(|c| Field::Value {
                name: c.name.clone(),
                kind: Kind::of(&c.ty),
            })
            .collect();
        fields.extend(query.project.loaded_hybrids(bags).map(|h| Field::Value {
            name: h.name.clone(),
            kind: Kind::of(&h.ty),
        }));
        fields.extend(query.relation_nodes().map(|node| Field::Relation {
            name: node.relation.name.clone(),
            many: node.relation.cardinality.is_many(),
            shape: Shape::of(&node.query),
        }));

        Self {
            bags: bags.clone(),
            fields,
            properties: query.project.loaded_properties(bags).map(CompactString::from).collect(),
            raiseload: (query.settings.raiseload_col, query.settings.raiseload_rel),
        }
    }

    /// Builds an entity from one root row
    pub(super) fn entity(&self, row: Vec<JsonValue>) -> Result<Entity> {
        if row.len() != self.fields.len() {
            return Err(MongoqlError::Mapping(format!(
                "expected {} columns for \"{}\", got {}",
                self.fields.len(),
                self.bags.model_name(),
                row.len()
            )));
        }

        let mut fields = JsonMap::new();
        for (field, value) in self.fields.iter().zip(row) {
            match field {
                Field::Value { name, kind } => {
                    fields.insert(name.to_string(), decode_column(*kind, value)?);
                }
                Field::Relation { name, many, shape } => {
                    let value = match value {
                        JsonValue::String(text) => serde_json::from_str(&text)
                            .map_err(|e| MongoqlError::Mapping(format!("relation \"{name}\": {e}")))?,
                        other => other,
                    };
                    fields.insert(name.to_string(), shape.related(*many, value)?);
                }
            }
        }
        self.compute(&mut fields);

        let entity = Entity::from_fields(self.bags.model_name(), fields);
        Ok(match self.raiseload {
            (false, false) => entity,
            (columns, relations) => entity.with_raiseload(self.bags.clone(), columns, relations),
        })
    }

    /// A decoded relation value: a list of objects, an object or null
    fn related(&self, many: bool, value: JsonValue) -> Result<JsonValue> {
        match (many, value) {
            (true, JsonValue::Null) => Ok(JsonValue::Array(Vec::new())),
            (true, JsonValue::Array(items)) => items
                .into_iter()
                .map(|item| self.object(item))
                .collect::<Result<Vec<_>>>()
                .map(JsonValue::Array),
            (false, JsonValue::Null) => Ok(JsonValue::Null),
            (false, value @ JsonValue::Object(_)) => self.object(value),
            (_, other) => Err(MongoqlError::Mapping(format!(
                "unexpected value for a relation of \"{}\": {other}",
                self.bags.model_name()
            ))),
        }
    }

    fn object(&self, value: JsonValue) -> Result<JsonValue> {
        let mut fields = match value {
            JsonValue::Object(fields) => fields,
            other => {
                return Err(MongoqlError::Mapping(format!(
                    "expected an object for \"{}\", got {other}",
                    self.bags.model_name()
                )));
            }
        };
        for field in &self.fields {
            match field {
                Field::Value {
                    name,
                    kind: Kind::Boolean,
                } => {
                    if let Some(value) = fields.get_mut(name.as_str()) {
                        *value = decode_boolean(value.take());
                    }
                }
                Field::Value { .. } => {}
                Field::Relation { name, many, shape } => {
                    if let Some(value) = fields.get_mut(name.as_str()) {
                        *value = shape.related(*many, value.take())?;
                    }
                }
            }
        }
        self.compute(&mut fields);
        Ok(JsonValue::Object(fields))
    }

    fn compute(&self, fields: &mut JsonMap) {
        if self.properties.is_empty() {
            return;
        }
        let mut entity = Entity::from_fields(self.bags.model_name(), core::mem::take(fields));
        for name in &self.properties {
            if let Some(property) = self.bags.property(name) {
                let value = (property.getter)(&entity);
                entity.set(name.as_str(), value);
            }
        }
        *fields = entity.into_fields();
    }
}

fn decode_boolean(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Number(n) => JsonValue::Bool(n.as_i64().is_some_and(|n| n != 0)),
        other => other,
    }
}

fn decode_column(kind: Kind, value: JsonValue) -> Result<JsonValue> {
    Ok(match (kind, value) {
        (Kind::Boolean, value) => decode_boolean(value),
        (Kind::Json, JsonValue::String(text)) => {
            serde_json::from_str(&text).map_err(|e| MongoqlError::Mapping(e.to_string()))?
        }
        (_, value) => value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_column() {
        assert_eq!(decode_column(Kind::Boolean, JsonValue::from(1)).unwrap(), JsonValue::Bool(true));
        assert_eq!(
            decode_column(Kind::Json, JsonValue::from(r#"["a","b"]"#)).unwrap(),
            serde_json::json!(["a", "b"])
        );
        assert_eq!(decode_column(Kind::Plain, JsonValue::from("x")).unwrap(), JsonValue::from("x"));
        assert!(decode_column(Kind::Json, JsonValue::from("{")).is_err());
    }
}
