//! `aggregate`: replaces entity loading with labelled aggregate expressions.
//!
//! ```json
//! {"n": {"$sum": 1}, "adults": {"$sum": {"age": {"$gte": 18}}}, "oldest": {"$max": "age"}}
//! ```

use super::filter::{Criterion, parse_criteria, render_predicate};
use super::sort::SortItem;
use super::{HandlerContext, RenderContext};
use crate::bag::ColumnInfo;
use crate::error::{MongoqlError, Result};
use crate::prelude::*;
use crate::sql::{SQL, SQLChunk, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Min,
    Max,
    Avg,
    Sum,
}

impl AggregateFn {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "$min" => AggregateFn::Min,
            "$max" => AggregateFn::Max,
            "$avg" => AggregateFn::Avg,
            "$sum" => AggregateFn::Sum,
            _ => return None,
        })
    }

    pub const fn sql_name(&self) -> &'static str {
        match self {
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Avg => "avg",
            AggregateFn::Sum => "sum",
        }
    }
}

#[derive(Clone)]
pub enum Operand {
    Column(ColumnInfo),
    /// Criteria counted as 0/1
    Criteria(Vec<Criterion>),
    /// `$sum: n` → `count(*) * n`
    Count(u64),
}

#[derive(Clone)]
pub enum AggregateExpr {
    /// Plain column copied into the output under a label
    Label(ColumnInfo),
    Function(AggregateFn, Operand),
}

#[derive(Clone)]
pub struct AggregateItem {
    pub label: CompactString,
    pub expr: AggregateExpr,
}

#[derive(Clone, Default)]
pub struct AggregateHandler {
    raw: Option<JsonMap>,
    items: Vec<AggregateItem>,
}

fn aggregate_column(ctx: &HandlerContext<'_>, name: &str) -> Result<ColumnInfo> {
    let column = ctx
        .bags
        .column(name)
        .ok_or_else(|| MongoqlError::invalid_column(ctx.model(), name, "aggregate"))?;
    if !ctx.settings.aggregate_columns.iter().any(|c| c == name) {
        return Err(MongoqlError::Disabled(format!(
            "aggregate: aggregation is disabled for column \"{}.{}\"",
            ctx.model(),
            name
        )));
    }
    Ok(column.clone())
}

/// Parses one output item; `None` when it refers to a legacy column
fn parse_item(ctx: &HandlerContext<'_>, label: &str, value: &JsonValue) -> Result<Option<AggregateExpr>> {
    let legacy = |column: &str| ctx.settings.legacy_fields.contains(column);
    match value {
        JsonValue::String(column) if legacy(column.as_str()) => Ok(None),
        JsonValue::String(column) => {
            if !ctx.settings.aggregate_labels {
                return Err(MongoqlError::Disabled(
                    "aggregate: labels are disabled, use an operator".into(),
                ));
            }
            Ok(Some(AggregateExpr::Label(aggregate_column(ctx, column)?)))
        }
        JsonValue::Object(map) if map.len() == 1 => {
            let (op, operand) = map
                .iter()
                .next()
                .ok_or_else(|| MongoqlError::InvalidQuery(format!("aggregate: \"{label}\" is empty")))?;
            let func = AggregateFn::parse(op).ok_or_else(|| {
                MongoqlError::InvalidQuery(format!("aggregate: unsupported operator \"{op}\""))
            })?;
            let operand = match operand {
                JsonValue::String(column) if legacy(column.as_str()) => return Ok(None),
                JsonValue::String(column) => Operand::Column(aggregate_column(ctx, column)?),
                JsonValue::Object(criteria) => Operand::Criteria(parse_criteria(ctx, criteria)?),
                JsonValue::Number(n) if func == AggregateFn::Sum => match n.as_u64() {
                    Some(n) => Operand::Count(n),
                    None => {
                        return Err(MongoqlError::InvalidQuery(format!(
                            "aggregate: $sum expects a non-negative integer, got {n}"
                        )));
                    }
                },
                other => {
                    return Err(MongoqlError::InvalidQuery(format!(
                        "aggregate: {op} does not accept {other}"
                    )));
                }
            };
            Ok(Some(AggregateExpr::Function(func, operand)))
        }
        other => Err(MongoqlError::InvalidQuery(format!(
            "aggregate: \"{label}\" must be a column name or an object with one operator, got {other}"
        ))),
    }
}

impl AggregateHandler {
    pub fn input(&mut self, ctx: &HandlerContext<'_>, raw: &JsonValue) -> Result<()> {
        crate::mongoql_trace_handler!("aggregate", ctx.model());
        match raw {
            JsonValue::Null => Ok(()),
            JsonValue::Object(map) => {
                self.items.clear();
                let mut kept = JsonMap::new();
                for (label, value) in map {
                    if let Some(expr) = parse_item(ctx, label, value)? {
                        self.items.push(AggregateItem {
                            label: label.as_str().into(),
                            expr,
                        });
                        kept.insert(label.clone(), value.clone());
                    }
                }
                self.raw = (!kept.is_empty()).then_some(kept);
                Ok(())
            }
            other => Err(MongoqlError::InvalidQuery(format!(
                "aggregate must be an object, got {other}"
            ))),
        }
    }

    /// Group keys are emitted as output columns and need the same permission
    pub fn check_group_keys(&self, ctx: &HandlerContext<'_>, keys: &[SortItem]) -> Result<()> {
        for key in keys {
            if !ctx.settings.aggregate_columns.iter().any(|c| *c == key.name) {
                return Err(MongoqlError::Disabled(format!(
                    "aggregate: grouping by \"{}.{}\" is disabled",
                    ctx.model(),
                    key.name
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[AggregateItem] {
        &self.items
    }

    pub fn normalized(&self) -> Option<JsonValue> {
        self.raw.clone().map(JsonValue::Object)
    }

    /// Labelled select-list expressions
    pub(crate) fn render(&self, ctx: &mut RenderContext, alias: &str) -> Result<Vec<SQL>> {
        let mut out = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let expr = match &item.expr {
                AggregateExpr::Label(column) => column.sql(alias),
                AggregateExpr::Function(_, Operand::Count(n)) => {
                    let count = SQL::func("count", SQL::token(Token::STAR));
                    match n {
                        1 => count,
                        n => count
                            .push(Token::STAR)
                            .push(SQLChunk::Number(*n as usize)),
                    }
                }
                AggregateExpr::Function(func, Operand::Column(column)) => {
                    SQL::func(func.sql_name(), column.sql(alias))
                }
                AggregateExpr::Function(func, Operand::Criteria(criteria)) => {
                    let predicate = render_predicate(criteria, ctx, alias)?;
                    SQL::func(func.sql_name(), SQL::cast(predicate.parens(), "INTEGER"))
                }
            };
            out.push(expr.alias(item.label.clone()));
        }
        Ok(out)
    }
}
