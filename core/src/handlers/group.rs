//! `group`: GROUP BY with the same encodings as `sort`.

use super::HandlerContext;
use super::sort::{SortItem, normalized_ordering, parse_ordering};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::prelude::*;
use crate::sql::{SQL, Token};

#[derive(Clone, Default)]
pub struct GroupHandler {
    items: Vec<SortItem>,
}

impl GroupHandler {
    pub fn input(&mut self, ctx: &HandlerContext<'_>, raw: &JsonValue) -> Result<()> {
        crate::mongoql_trace_handler!("group", ctx.model());
        self.items = parse_ordering(ctx, raw, "group")?;
        Ok(())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[SortItem] {
        &self.items
    }

    pub fn normalized(&self) -> Option<JsonValue> {
        (!self.items.is_empty()).then(|| normalized_ordering(&self.items))
    }

    /// GROUP BY list for a table alias
    pub fn render(&self, dialect: Dialect, alias: &str) -> Option<SQL> {
        if self.items.is_empty() {
            return None;
        }
        Some(SQL::join(
            self.items.iter().map(|item| item.target.sql(dialect, alias)),
            Token::COMMA,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests_support::fixture;
    use crate::settings::QuerySettings;
    use serde_json::json;

    #[test]
    fn test_group_render() {
        let fx = fixture();
        let ctx = fx.ctx("User");
        let mut group = GroupHandler::default();
        group.input(&ctx, &json!("age,name")).unwrap();
        assert_eq!(group.normalized(), Some(json!(["age+", "name+"])));
        assert_eq!(
            group.render(Dialect::SQLite, "t0").unwrap().sql(Dialect::SQLite),
            r#""t0"."age", "t0"."name""#
        );
    }

    #[test]
    fn test_legacy_names_are_ignored() {
        let mut settings = QuerySettings::default();
        settings.legacy_fields.insert("old".into());
        let fx = fixture().with_settings(settings);
        let ctx = fx.ctx("User");

        let mut group = GroupHandler::default();
        group.input(&ctx, &json!("old name")).unwrap();
        assert_eq!(group.normalized(), Some(json!(["name+"])));
        assert_eq!(
            group.render(Dialect::SQLite, "t0").unwrap().sql(Dialect::SQLite),
            r#""t0"."name""#
        );

        group.input(&ctx, &json!(["old"])).unwrap();
        assert!(group.render(Dialect::SQLite, "t0").is_none());
    }
}
