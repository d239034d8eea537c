//! `filter`: criteria objects compiled into a WHERE predicate.
//!
//! ```json
//! {"age": {"$gte": 18}, "$or": [{"name": "a"}, {"tags": "b"}], "articles.title": "x"}
//! ```
//!
//! Conditions on `relation.field` paths are grouped per relation at each boolean level and
//! compiled into one correlated `EXISTS` semi-join, so parent rows are never duplicated.

use super::join::join_conditions;
use super::{HandlerContext, RenderContext, Target};
use crate::bag::{BagKind, CombinedBag, Lookup, ModelBags};
use crate::error::{MongoqlError, Result};
use crate::model::{RelationDef, Schema};
use crate::operators::{Operator, compile_predicate};
use crate::prelude::*;
use crate::sql::{SQL, SQLChunk, Token};

pub(crate) const FILTER_BAGS: &[BagKind] = &[
    BagKind::Columns,
    BagKind::ColumnProperties,
    BagKind::Hybrid,
    BagKind::RelatedColumns,
    BagKind::JsonPaths,
    BagKind::Legacy,
];

/// A node of the predicate tree
#[derive(Clone)]
pub enum Criterion {
    Condition {
        name: CompactString,
        target: Target,
        op: Operator,
        operand: JsonValue,
    },
    /// Criteria on a related model, rendered as `EXISTS (...)`
    Related {
        relation: RelationDef,
        table: CompactString,
        criteria: Vec<Criterion>,
    },
    And(Vec<Vec<Criterion>>),
    Or(Vec<Vec<Criterion>>),
    Nor(Vec<Vec<Criterion>>),
    Not(Vec<Criterion>),
}

struct Parser<'a> {
    schema: &'a Schema,
    legacy: &'a HashSet<CompactString>,
}

impl Parser<'_> {
    fn criteria(&self, bags: &ModelBags, criteria: &JsonMap) -> Result<Vec<Criterion>> {
        let kinds = FILTER_BAGS;
        let bag = CombinedBag::new(self.schema, bags, kinds, self.legacy);
        let dialect = self.schema.dialect();

        let mut out = Vec::with_capacity(criteria.len());
        // relation name -> (relation, target bags, criteria for the target)
        let mut related: Vec<(RelationDef, Arc<ModelBags>, JsonMap)> = Vec::new();

        for (key, value) in criteria {
            match key.as_str() {
                "$and" | "$or" | "$nor" => {
                    let JsonValue::Array(items) = value else {
                        return Err(MongoqlError::InvalidQuery(format!(
                            "{key} must be an array of criteria objects"
                        )));
                    };
                    if items.is_empty() {
                        continue;
                    }
                    let groups = items
                        .iter()
                        .map(|item| match item {
                            JsonValue::Object(map) => self.criteria(bags, map),
                            _ => Err(MongoqlError::InvalidQuery(format!(
                                "{key} must be an array of criteria objects"
                            ))),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    out.push(match key.as_str() {
                        "$and" => Criterion::And(groups),
                        "$or" => Criterion::Or(groups),
                        _ => Criterion::Nor(groups),
                    });
                }
                "$not" => {
                    let JsonValue::Object(map) = value else {
                        return Err(MongoqlError::InvalidQuery(
                            "$not must be a criteria object".into(),
                        ));
                    };
                    let mut inner = self.criteria(bags, map)?;
                    if inner.len() == 1 && matches!(inner[0], Criterion::Not(_)) {
                        // $not: {$not: F} is F
                        if let Some(Criterion::Not(criteria)) = inner.pop() {
                            out.extend(criteria);
                        }
                    } else if !inner.is_empty() {
                        out.push(Criterion::Not(inner));
                    }
                }
                op if op.starts_with('$') => {
                    return Err(MongoqlError::InvalidQuery(format!(
                        "Unsupported boolean operator \"{op}\""
                    )));
                }
                name => match bag.resolve(name, "filter")? {
                    (_, Lookup::Legacy) => {}
                    (_, Lookup::RelatedColumn {
                        relation,
                        target,
                        rest,
                    }) => {
                        let position = related.iter().position(|(r, _, _)| r.name == relation.name);
                        let index = match position {
                            Some(index) => index,
                            None => {
                                related.push((relation.clone(), target, JsonMap::new()));
                                related.len() - 1
                            }
                        };
                        related[index].2.insert(rest.to_string(), value.clone());
                    }
                    (_, lookup) => {
                        let target = Target::from_lookup(lookup)
                            .ok_or_else(|| MongoqlError::invalid_column(bags.model_name(), name, "filter"))?;
                        for (op, operand) in operator_pairs(value)? {
                            // Validated now so that errors surface on input
                            compile_predicate(dialect, &target.field(name, dialect, "t"), op, operand)?;
                            out.push(Criterion::Condition {
                                name: name.into(),
                                target: target.clone(),
                                op,
                                operand: operand.clone(),
                            });
                        }
                    }
                },
            }
        }

        for (relation, target, sub) in related {
            let criteria = self.criteria_on_related(&target, &sub)?;
            out.push(Criterion::Related {
                relation,
                table: target.table().into(),
                criteria,
            });
        }
        Ok(out)
    }

    fn criteria_on_related(&self, bags: &ModelBags, criteria: &JsonMap) -> Result<Vec<Criterion>> {
        let empty = HashSet::new();
        Parser {
            schema: self.schema,
            legacy: &empty,
        }
        .criteria(bags, criteria)
    }
}

/// `{"$gt": 1, "$lt": 5}` → operator pairs; any other value is `$eq`
fn operator_pairs(value: &JsonValue) -> Result<Vec<(Operator, &JsonValue)>> {
    match value {
        JsonValue::Object(map) if map.keys().any(|k| k.starts_with('$')) => map
            .iter()
            .map(|(key, operand)| {
                Operator::parse(key)
                    .map(|op| (op, operand))
                    .ok_or_else(|| MongoqlError::InvalidQuery(format!("Unsupported operator \"{key}\"")))
            })
            .collect(),
        other => Ok(vec![(Operator::Eq, other)]),
    }
}

/// Parses a criteria object for a model
pub(crate) fn parse_criteria(ctx: &HandlerContext<'_>, criteria: &JsonMap) -> Result<Vec<Criterion>> {
    Parser {
        schema: ctx.schema,
        legacy: &ctx.settings.legacy_fields,
    }
    .criteria(ctx.bags, criteria)
}

fn render_group(items: &[Criterion], ctx: &mut RenderContext, alias: &str) -> Result<Option<SQL>> {
    let parts = render_criteria(items, ctx, alias)?;
    Ok(match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => SQL::and_all(parts).map(SQL::parens),
    })
}

fn render_bool(groups: &[Vec<Criterion>], separator: Token, ctx: &mut RenderContext, alias: &str) -> Result<Option<SQL>> {
    let mut parts = Vec::with_capacity(groups.len());
    for group in groups {
        if let Some(sql) = render_group(group, ctx, alias)? {
            parts.push(sql);
        }
    }
    Ok((!parts.is_empty()).then(|| SQL::join(parts, separator).parens()))
}

/// Renders criteria as a list of predicates to be ANDed
pub(crate) fn render_criteria(criteria: &[Criterion], ctx: &mut RenderContext, alias: &str) -> Result<Vec<SQL>> {
    let dialect = ctx.dialect;
    let mut out = Vec::with_capacity(criteria.len());
    for criterion in criteria {
        let sql = match criterion {
            Criterion::Condition {
                name,
                target,
                op,
                operand,
            } => Some(compile_predicate(
                dialect,
                &target.field(name, dialect, alias),
                *op,
                operand,
            )?),
            Criterion::Related {
                relation,
                table,
                criteria,
            } => {
                let inner_alias = ctx.alias();
                let mut conditions = join_conditions(relation, &inner_alias, alias);
                conditions.extend(render_criteria(criteria, ctx, &inner_alias)?);
                Some(exists(table, &inner_alias, conditions))
            }
            Criterion::And(groups) => render_bool(groups, Token::AND, ctx, alias)?,
            Criterion::Or(groups) => render_bool(groups, Token::OR, ctx, alias)?,
            Criterion::Nor(groups) => {
                render_bool(groups, Token::OR, ctx, alias)?.map(|sql| SQL::token(Token::NOT).append(sql))
            }
            Criterion::Not(items) => render_criteria(items, ctx, alias)
                .map(SQL::and_all)?
                .map(|sql| SQL::token(Token::NOT).append(sql.parens())),
        };
        out.extend(sql);
    }
    Ok(out)
}

/// `EXISTS (SELECT 1 FROM "table" AS "alias" WHERE ...)`
pub(crate) fn exists(table: &str, alias: &str, conditions: Vec<SQL>) -> SQL {
    let mut subquery = SQL::token(Token::SELECT)
        .push(SQLChunk::Number(1))
        .push(Token::FROM)
        .append(SQL::ident(table).alias(alias));
    if let Some(conditions) = SQL::and_all(conditions) {
        subquery = subquery.push(Token::WHERE).append(conditions);
    }
    SQL::token(Token::EXISTS).append(subquery.parens())
}

#[derive(Clone, Default)]
pub struct FilterHandler {
    raw: Option<JsonMap>,
    criteria: Vec<Criterion>,
}

impl FilterHandler {
    pub fn input(&mut self, ctx: &HandlerContext<'_>, raw: &JsonValue) -> Result<()> {
        crate::mongoql_trace_handler!("filter", ctx.model());
        match raw {
            JsonValue::Null => {}
            JsonValue::Object(map) => {
                self.criteria = parse_criteria(ctx, map)?;
                let kept: JsonMap = map
                    .iter()
                    .filter(|(key, _)| !ctx.settings.legacy_fields.contains(key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                self.raw = (!kept.is_empty()).then_some(kept);
            }
            other => {
                return Err(MongoqlError::InvalidQuery(format!(
                    "Filter must be an object, got {other}"
                )));
            }
        }
        Ok(())
    }

    /// Whether the user supplied any criteria
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn normalized(&self) -> Option<JsonValue> {
        self.raw.clone().map(JsonValue::Object)
    }

    pub(crate) fn render(&self, ctx: &mut RenderContext, alias: &str) -> Result<Vec<SQL>> {
        render_criteria(&self.criteria, ctx, alias)
    }
}

/// Renders a standalone predicate; used for aggregate criteria operands
pub(crate) fn render_predicate(criteria: &[Criterion], ctx: &mut RenderContext, alias: &str) -> Result<SQL> {
    Ok(SQL::and_all(render_criteria(criteria, ctx, alias)?)
        .unwrap_or_else(|| SQL::number(1).push(Token::EQ).push(SQLChunk::Number(1))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::handlers::tests_support::fixture;
    use crate::settings::QuerySettings;
    use crate::value::Value;
    use serde_json::json;

    fn compile(filter: JsonValue) -> Result<(String, Vec<Value>)> {
        let fx = fixture();
        let ctx = fx.ctx("User");
        let mut handler = FilterHandler::default();
        handler.input(&ctx, &filter)?;
        let mut render = RenderContext::new(Dialect::SQLite);
        let alias = render.alias();
        let parts = handler.render(&mut render, &alias)?;
        Ok(SQL::and_all(parts).unwrap_or_default().build(Dialect::SQLite))
    }

    #[test]
    fn test_and_of_conditions() {
        let (sql, params) = compile(json!({"age": {"$gte": 18, "$lte": 25}, "name": "female"})).unwrap();
        assert_eq!(sql, r#""t0"."age" >= ? AND "t0"."age" <= ? AND "t0"."name" = ?"#);
        assert_eq!(
            params,
            vec![Value::Integer(18), Value::Integer(25), Value::Text("female".into())]
        );
    }

    #[test]
    fn test_boolean_operators() {
        let (sql, _) = compile(json!({
            "$or": [{"age": 1}, {"name": "a", "age": 2}],
            "$nor": [{"age": 3}],
        }))
        .unwrap();
        assert_eq!(
            sql,
            r#"("t0"."age" = ? OR ("t0"."name" = ? AND "t0"."age" = ?)) AND NOT ("t0"."age" = ?)"#
        );

        let (sql, _) = compile(json!({"$or": [], "$not": {}})).unwrap();
        assert_eq!(sql, "");
    }

    #[test]
    fn test_double_negation() {
        let plain = compile(json!({"age": {"$gt": 5}})).unwrap();
        let double = compile(json!({"$not": {"$not": {"age": {"$gt": 5}}}})).unwrap();
        assert_eq!(plain, double);

        let (sql, _) = compile(json!({"$not": {"age": 1, "name": "x"}})).unwrap();
        assert_eq!(sql, r#"NOT ("t0"."age" = ? AND "t0"."name" = ?)"#);
    }

    #[test]
    fn test_related_paths_grouped_into_one_exists() {
        let (sql, _) = compile(json!({
            "articles.title": "x",
            "articles.id": {"$gt": 100},
        }))
        .unwrap();
        assert_eq!(
            sql,
            r#"EXISTS (SELECT 1 FROM "articles" AS "t1" WHERE "t1"."uid" = "t0"."id" AND "t1"."title" = ? AND "t1"."id" > ?)"#
        );
    }

    #[test]
    fn test_nested_related_paths() {
        let (sql, _) = compile(json!({"articles.comments.text": "hi"})).unwrap();
        assert_eq!(
            sql,
            r#"EXISTS (SELECT 1 FROM "articles" AS "t1" WHERE "t1"."uid" = "t0"."id" AND EXISTS (SELECT 1 FROM "comments" AS "t2" WHERE "t2"."aid" = "t1"."id" AND "t2"."text" = ?))"#
        );
    }

    #[test]
    fn test_hybrid_and_json_path() {
        let (sql, _) = compile(json!({"age_next": 3, "data.rating": {"$gte": 4.5}})).unwrap();
        assert_eq!(
            sql,
            r#""t0"."age" + 1 = ? AND CAST(json_extract("t0"."data", '$."rating"') AS REAL) >= ?"#
        );
    }

    #[test]
    fn test_legacy_names_are_ignored() {
        let mut settings = QuerySettings::default();
        settings.legacy_fields.insert("old".into());
        let fx = fixture().with_settings(settings);
        let ctx = fx.ctx("User");

        let mut handler = FilterHandler::default();
        handler
            .input(&ctx, &json!({"old": {"$gt": 1}, "$or": [{"old": 2}, {"age": 3}]}))
            .unwrap();
        let mut render = RenderContext::new(Dialect::SQLite);
        let alias = render.alias();
        let sql = SQL::and_all(handler.render(&mut render, &alias).unwrap())
            .unwrap_or_default()
            .sql(Dialect::SQLite);
        assert_eq!(sql, r#"("t0"."age" = ?)"#);
        assert_eq!(handler.normalized(), Some(json!({"$or": [{"old": 2}, {"age": 3}]})));

        let mut handler = FilterHandler::default();
        handler.input(&ctx, &json!({"old": 1})).unwrap();
        assert!(handler.is_empty());
        assert_eq!(handler.normalized(), None);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(compile(json!({"nope": 1})), Err(MongoqlError::InvalidColumn { .. })));
        assert!(matches!(compile(json!({"nope.x": 1})), Err(MongoqlError::InvalidRelation { .. })));
        assert!(matches!(compile(json!({"age": {"$regex": 1}})), Err(MongoqlError::InvalidQuery(_))));
        assert!(matches!(compile(json!({"$xor": []})), Err(MongoqlError::InvalidQuery(_))));
        assert!(matches!(compile(json!({"greeting": "x"})), Err(MongoqlError::InvalidColumn { .. })));
        assert!(matches!(compile(json!([1])), Err(MongoqlError::InvalidQuery(_))));
    }
}
