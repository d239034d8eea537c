//! SQL generation for compiled Query Objects.
//!
//! Joined relations become correlated JSON subqueries in the select list:
//! `json_group_array(json_object(...))` / `COALESCE(json_agg(json_build_object(...)), '[]'::json)`
//! for many-relations, `json_object(...) ... LIMIT 1` for one-relations. `joinf` relations
//! additionally restrict the parent through `EXISTS`.

use super::MongoQuery;
use super::select::Select;
use crate::dialect::{Dialect, DialectExt, json_array_agg};
use crate::error::Result;
use crate::handlers::filter::{exists, render_criteria};
use crate::handlers::join::join_conditions;
use crate::handlers::{JoinNode, RenderContext};
use crate::prelude::*;
use crate::settings::ForceFilter;
use crate::sql::{SQL, SQLChunk, Token};

impl MongoQuery {
    /// WHERE conditions of this query for its table under `alias`
    fn render_conditions(&self, rc: &mut RenderContext, alias: &str) -> Result<Vec<SQL>> {
        let mut conditions = Vec::new();
        if let Some(ForceFilter::Callable(f)) = &self.settings.force_filter {
            conditions.push(f(alias));
        }
        conditions.extend(render_criteria(&self.force_filter, rc, alias)?);
        conditions.extend(self.filter.render(rc, alias)?);

        for node in self.joinf.nodes() {
            let inner = rc.alias();
            let mut inner_conditions = join_conditions(&node.relation, &inner, alias);
            inner_conditions.extend(node.query.render_conditions(rc, &inner)?);
            conditions.push(exists(node.query.bags.table(), &inner, inner_conditions));
        }
        Ok(conditions)
    }

    /// `'name', expr` pairs of a JSON object for one related row
    fn render_json_fields(&self, rc: &mut RenderContext, alias: &str) -> Result<Vec<SQL>> {
        let dialect = rc.dialect;
        let mut fields = Vec::new();
        for column in self.project.loaded_columns(&self.bags) {
            let expr = column.sql(alias);
            let expr = match dialect {
                Dialect::SQLite | Dialect::MySQL if column.is_json() || column.is_array() => {
                    SQL::func("json", expr)
                }
                _ => expr,
            };
            fields.push(SQL::literal(column.name.clone()).push(Token::COMMA).append(expr));
        }
        for hybrid in self.project.loaded_hybrids(&self.bags) {
            fields.push(
                SQL::literal(hybrid.name.clone())
                    .push(Token::COMMA)
                    .append(hybrid.sql(alias)),
            );
        }
        for node in self.relation_nodes() {
            let subquery = render_relation(node, rc, alias)?;
            // A nested subquery returns JSON text on SQLite
            let subquery = match dialect {
                Dialect::SQLite | Dialect::MySQL => SQL::func("json", subquery),
                Dialect::PostgreSQL => subquery.parens(),
            };
            fields.push(
                SQL::literal(node.relation.name.clone())
                    .push(Token::COMMA)
                    .append(subquery),
            );
        }
        Ok(fields)
    }

    /// Renders the root statement
    pub(super) fn render_statement(&self, dialect: Dialect) -> Result<SQL> {
        let mut rc = RenderContext::new(dialect);
        let alias = rc.alias();
        let table = SQL::ident(self.bags.table()).alias(alias.clone());

        if self.count.is_set() {
            let conditions = self.root_conditions(&mut rc, &alias)?;
            let count = SQL::func("count", SQL::token(Token::STAR));
            let select = match self.group.render(dialect, &alias) {
                Some(group_by) => {
                    let groups = Select::new()
                        .column(SQL::number(1))
                        .source(table)
                        .filters(conditions)
                        .group_by(Some(group_by));
                    Select::new()
                        .column(count)
                        .source(groups.to_sql(dialect).parens().alias("q"))
                }
                None => Select::new().column(count).source(table).filters(conditions),
            };
            return Ok(select.to_sql(dialect));
        }

        let mut columns = Vec::new();
        if !self.aggregate.is_empty() {
            columns.extend(
                self.group
                    .items()
                    .iter()
                    .map(|key| key.target.sql(dialect, &alias).alias(key.name.clone())),
            );
            columns.extend(self.aggregate.render(&mut rc, &alias)?);
        } else {
            for column in self.project.loaded_columns(&self.bags) {
                let expr = column.sql(&alias);
                columns.push(if column.is_column_property() {
                    expr.alias(column.name.clone())
                } else {
                    expr
                });
            }
            for hybrid in self.project.loaded_hybrids(&self.bags) {
                columns.push(hybrid.sql(&alias).alias(hybrid.name.clone()));
            }
            for node in self.relation_nodes() {
                let subquery = render_relation(node, &mut rc, &alias)?.parens();
                // PostgreSQL returns json; cast so every driver reads text
                let subquery = match dialect {
                    Dialect::PostgreSQL => subquery.push(SQLChunk::raw_static("::text")),
                    Dialect::SQLite | Dialect::MySQL => subquery,
                };
                columns.push(subquery.alias(node.relation.name.clone()));
            }
        }

        let conditions = self.root_conditions(&mut rc, &alias)?;
        Ok(Select::new()
            .columns(columns)
            .source(table)
            .filters(conditions)
            .group_by(self.group.render(dialect, &alias))
            .order_by(self.sort.render(dialect, &alias))
            .limit(self.limit.limit())
            .offset(self.limit.skip())
            .to_sql(dialect))
    }

    fn root_conditions(&self, rc: &mut RenderContext, alias: &str) -> Result<Vec<SQL>> {
        let mut conditions = self.base.conditions().to_vec();
        conditions.extend(self.render_conditions(rc, alias)?);
        Ok(conditions)
    }
}

/// Correlated subquery loading `node` for the parent row aliased `parent_alias`.
///
/// The result is a bare `SELECT`; callers add parentheses.
fn render_relation(node: &JoinNode, rc: &mut RenderContext, parent_alias: &str) -> Result<SQL> {
    let query = &node.query;
    let dialect = rc.dialect;
    let alias = rc.alias();
    let many = node.relation.cardinality.is_many();

    let limit = query.limit.limit();
    let offset = query.limit.skip();
    let order_by = query.sort.render(dialect, &alias);

    // PostgreSQL orders inside json_agg() when no window is needed.
    // SQLite's json_group_array follows the order of a derived table instead.
    let order_in_agg = many
        && dialect == Dialect::PostgreSQL
        && order_by.is_some()
        && limit.is_none()
        && offset.is_none();
    let needs_inner = many && (limit.is_some() || offset.is_some() || (order_by.is_some() && !order_in_agg));

    let fields = query.render_json_fields(rc, &alias)?;
    let object = SQL::func(dialect.json_object_fn(), SQL::join(fields, Token::COMMA));

    let mut conditions = join_conditions(&node.relation, &alias, parent_alias);
    conditions.extend(query.render_conditions(rc, &alias)?);
    let table = SQL::ident(query.bags.table()).alias(alias.clone());

    let select = if many {
        let aggregate = json_array_agg(dialect, object, order_by.clone().filter(|_| order_in_agg));
        if needs_inner {
            // Window the related rows per parent before aggregating
            let inner = Select::new()
                .column(SQL::ident(alias.clone()).push(Token::DOT).push(Token::STAR))
                .source(table)
                .filters(conditions)
                .order_by(order_by)
                .limit(limit)
                .offset(offset);
            Select::new()
                .column(aggregate)
                .source(inner.to_sql(dialect).parens().alias(alias))
        } else {
            Select::new()
                .column(aggregate)
                .source(table)
                .filters(conditions)
                .order_by(order_by.filter(|_| !order_in_agg))
        }
    } else {
        Select::new()
            .column(object)
            .source(table)
            .filters(conditions)
            .order_by(order_by)
            .limit(Some(1))
            .offset(offset)
    };
    Ok(select.to_sql(dialect))
}
