//! `join` and `joinf`: loading related models.
//!
//! Every joined relation gets its own nested [`MongoQuery`] compiled under the settings
//! resolved for that relation. `join` behaves like a LEFT JOIN (an empty list or null when
//! nothing matches); `joinf` additionally drops parent rows without a match.

use super::{HandlerContext, parse_name_list};
use crate::error::{MongoqlError, Result};
use crate::model::RelationDef;
use crate::prelude::*;
use crate::query::MongoQuery;
use crate::sql::{SQL, Token};

/// Sections a nested Query Object may never use
const NESTED_FORBIDDEN: &[&str] = &["aggregate", "group", "count"];

/// Sections `joinf` additionally rejects
const JOINF_FORBIDDEN: &[&str] = &["skip", "limit"];

/// `"t1"."uid" = "t0"."id"` for every join column pair
pub(crate) fn join_conditions(relation: &RelationDef, alias: &str, parent_alias: &str) -> Vec<SQL> {
    relation
        .columns
        .iter()
        .map(|(target_column, parent_column)| {
            SQL::column(alias, target_column.clone())
                .push(Token::EQ)
                .append(SQL::column(parent_alias, parent_column.clone()))
        })
        .collect()
}

/// One joined relation
pub struct JoinNode {
    pub relation: RelationDef,
    pub query: Box<MongoQuery>,
    /// Loaded through `ensure_loaded`: not part of the projection or `pluck` output
    pub quiet: bool,
}

impl JoinNode {
    #[inline]
    pub fn name(&self) -> &str {
        &self.relation.name
    }
}

pub struct JoinHandler {
    filtering: bool,
    nodes: Vec<JoinNode>,
}

impl JoinHandler {
    pub fn new(filtering: bool) -> Self {
        Self {
            filtering,
            nodes: Vec::new(),
        }
    }

    #[inline]
    pub fn section(&self) -> &'static str {
        if self.filtering { "joinf" } else { "join" }
    }

    pub fn input(&mut self, ctx: &HandlerContext<'_>, raw: &JsonValue) -> Result<()> {
        crate::mongoql_trace_handler!(self.section(), ctx.model());
        let section = self.section();
        let relations: Vec<(CompactString, Option<&JsonMap>)> = match raw {
            JsonValue::Null => Vec::new(),
            JsonValue::Object(map) => map
                .iter()
                .map(|(name, nested)| match nested {
                    JsonValue::Null => Ok((CompactString::from(name.as_str()), None)),
                    JsonValue::Object(qo) => Ok((CompactString::from(name.as_str()), Some(qo))),
                    other => Err(MongoqlError::InvalidQuery(format!(
                        "{section}: relation \"{name}\" must map to null or a Query Object, got {other}"
                    ))),
                })
                .collect::<Result<_>>()?,
            other => parse_name_list(other, section)?
                .into_iter()
                .map(|name| (name, None))
                .collect(),
        };

        for (name, nested) in relations {
            if self.contains(&name) || ctx.settings.legacy_fields.contains(&name) {
                continue;
            }
            if let Some(qo) = nested {
                self.check_nested_sections(&name, qo)?;
            }
            let node = self.build_node(ctx, &name, nested, false)?;
            self.nodes.push(node);
        }
        Ok(())
    }

    fn check_nested_sections(&self, relation: &str, qo: &JsonMap) -> Result<()> {
        let section = self.section();
        let forbidden = NESTED_FORBIDDEN
            .iter()
            .chain(if self.filtering { JOINF_FORBIDDEN } else { &[] });
        for key in forbidden {
            if qo.contains_key(*key) {
                return Err(MongoqlError::InvalidQuery(format!(
                    "{section}: \"{key}\" is not supported in the nested Query Object of \"{relation}\""
                )));
            }
        }
        Ok(())
    }

    fn relation<'a>(&self, ctx: &HandlerContext<'a>, name: &str) -> Result<&'a RelationDef> {
        let relation = ctx
            .bags
            .relation(name)
            .ok_or_else(|| MongoqlError::invalid_relation(ctx.model(), name, self.section()))?;
        if !ctx.settings.relation_allowed(name) {
            return Err(MongoqlError::Disabled(format!(
                "{}: joining is disabled for relationship \"{}.{}\"",
                self.section(),
                ctx.model(),
                name
            )));
        }
        Ok(relation)
    }

    fn build_node(
        &self,
        ctx: &HandlerContext<'_>,
        name: &str,
        nested: Option<&JsonMap>,
        quiet: bool,
    ) -> Result<JoinNode> {
        let relation = self.relation(ctx, name)?;
        let settings = ctx.settings.for_relation(name, &relation.target);
        let qo = nested.map(|qo| JsonValue::Object(qo.clone())).unwrap_or(JsonValue::Null);
        let query = MongoQuery::new(ctx.schema.clone(), &relation.target, settings)?.query(&qo)?;
        Ok(JoinNode {
            relation: relation.clone(),
            query: Box::new(query),
            quiet,
        })
    }

    /// Makes sure `relation` is loaded.
    ///
    /// An already joined relation is reused; in strict mode it must not carry anything
    /// but `project`, `join` and `sort`. Non-strict merges also accept `filter`.
    pub fn merge(
        &mut self,
        ctx: &HandlerContext<'_>,
        relation: &str,
        strict: bool,
        quiet: bool,
    ) -> Result<&mut JoinNode> {
        let section = self.section();
        let allowed: &[&str] = if strict {
            &["project", "join", "sort"]
        } else {
            &["project", "join", "sort", "filter"]
        };

        let index = match self.nodes.iter().position(|n| n.name() == relation) {
            Some(index) => {
                let node = &mut self.nodes[index];
                if let Some(conflict) = node
                    .query
                    .input_sections()
                    .iter()
                    .find(|s| !allowed.contains(s))
                {
                    return Err(MongoqlError::InvalidQuery(format!(
                        "Cannot merge relation \"{relation}\" into {section}: it uses \"{conflict}\""
                    )));
                }
                node.quiet &= quiet;
                index
            }
            None => {
                let node = self.build_node(ctx, relation, None, quiet)?;
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        Ok(&mut self.nodes[index])
    }

    #[inline]
    pub fn contains(&self, relation: &str) -> bool {
        self.nodes.iter().any(|n| n.name() == relation)
    }

    pub fn nodes(&self) -> &[JoinNode] {
        &self.nodes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `{relation: nested Query Object | null}` for relations the user asked for
    pub fn normalized(&self) -> Option<JsonValue> {
        let map: JsonMap = self
            .nodes
            .iter()
            .filter(|n| !n.quiet)
            .map(|n| {
                let value = if n.query.input_sections().is_empty() {
                    JsonValue::Null
                } else {
                    JsonValue::Object(n.query.final_query_object())
                };
                (n.name().to_string(), value)
            })
            .collect();
        (!map.is_empty()).then_some(JsonValue::Object(map))
    }
}
