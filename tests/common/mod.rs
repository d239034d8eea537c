#![allow(dead_code)]

#[cfg(feature = "rusqlite")]
mod rusqlite;
#[cfg(feature = "rusqlite")]
pub use rusqlite::*;

use mongoql::prelude::*;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// Users write articles; both collect comments
pub fn schema(dialect: Dialect) -> Arc<Schema> {
    Arc::new(
        Schema::new(dialect)
            .model(
                ModelDef::new("User", "users")
                    .column(ColumnDef::new("id", SqlType::Integer).primary_key())
                    .column(ColumnDef::new("name", SqlType::Text))
                    .column(ColumnDef::new("age", SqlType::Integer).nullable())
                    .column(ColumnDef::new("tags", SqlType::array(SqlType::Text)).nullable())
                    .column(ColumnDef::new("data", SqlType::Json).nullable())
                    .column(ColumnDef::new("active", SqlType::Boolean))
                    .relation(RelationDef::many("articles", "Article").on("uid", "id"))
                    .relation(RelationDef::many("comments", "Comment").on("uid", "id"))
                    .property(
                        PropertyDef::computed("greeting", |user| {
                            let name = user.get("name").and_then(JsonValue::as_str).unwrap_or("");
                            JsonValue::String(format!("Hello, {name}"))
                        })
                        .depends_on(["name"]),
                    ),
            )
            .model(
                ModelDef::new("Article", "articles")
                    .column(ColumnDef::new("id", SqlType::Integer).primary_key())
                    .column(ColumnDef::new("uid", SqlType::Integer))
                    .column(ColumnDef::new("title", SqlType::Text))
                    .column(ColumnDef::new("rating", SqlType::Integer).nullable())
                    .relation(RelationDef::one("author", "User").on("id", "uid"))
                    .relation(RelationDef::many("comments", "Comment").on("aid", "id")),
            )
            .model(
                ModelDef::new("Comment", "comments")
                    .column(ColumnDef::new("id", SqlType::Integer).primary_key())
                    .column(ColumnDef::new("aid", SqlType::Integer))
                    .column(ColumnDef::new("uid", SqlType::Integer))
                    .column(ColumnDef::new("text", SqlType::Text))
                    .relation(RelationDef::one("article", "Article").on("id", "aid"))
                    .relation(RelationDef::optional("user", "User").on("id", "uid")),
            ),
    )
}

pub fn settings() -> Arc<QuerySettings> {
    Arc::new(QuerySettings::default())
}

pub fn object(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}
