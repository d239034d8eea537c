//! Shared schema for handler unit tests.

use super::HandlerContext;
use crate::bag::ModelBags;
use crate::model::{ColumnDef, ModelDef, PropertyDef, RelationDef, Schema};
use crate::prelude::*;
use crate::settings::QuerySettings;
use crate::sql::{SQL, SQLChunk};
use crate::Dialect;
use mongoql_types::SqlType;

pub(crate) fn schema(dialect: Dialect) -> Schema {
    Schema::new(dialect)
        .model(
            ModelDef::new("User", "users")
                .column(ColumnDef::new("id", SqlType::Integer).primary_key())
                .column(ColumnDef::new("name", SqlType::Text))
                .column(ColumnDef::new("age", SqlType::Integer).nullable())
                .column(ColumnDef::new("tags", SqlType::array(SqlType::Text)).nullable())
                .column(ColumnDef::new("data", SqlType::Json).nullable())
                .relation(RelationDef::many("articles", "Article").on("uid", "id"))
                .relation(RelationDef::many("comments", "Comment").on("uid", "id"))
                .property(PropertyDef::hybrid("age_next", SqlType::Integer, |alias| {
                    SQL::column(alias, "age")
                        .push(SQLChunk::raw_static("+"))
                        .append(SQL::number(1))
                }))
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
        )
}

pub(crate) struct Fixture {
    pub schema: Arc<Schema>,
    pub settings: Arc<QuerySettings>,
    bags: HashMap<CompactString, Arc<ModelBags>>,
}

impl Fixture {
    pub fn with_settings(mut self, settings: QuerySettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn ctx(&self, model: &str) -> HandlerContext<'_> {
        HandlerContext {
            schema: &self.schema,
            bags: &self.bags[model],
            settings: &self.settings,
        }
    }
}

pub(crate) fn fixture() -> Fixture {
    let schema = Arc::new(schema(Dialect::SQLite));
    let bags = ["User", "Article", "Comment"]
        .into_iter()
        .map(|name| (CompactString::from(name), schema.bags(name).unwrap()))
        .collect();
    Fixture {
        schema,
        settings: Arc::new(QuerySettings::default()),
        bags,
    }
}
