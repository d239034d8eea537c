//! `sort`: ordering by columns, column properties, hybrids and JSON sub-paths.

use super::{HandlerContext, Target, parse_name_list};
use crate::bag::{BagKind, Lookup};
use crate::dialect::Dialect;
use crate::error::{MongoqlError, Result};
use crate::prelude::*;
use crate::sql::{SQL, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    #[inline]
    pub const fn suffix(&self) -> char {
        match self {
            Direction::Asc => '+',
            Direction::Desc => '-',
        }
    }
}

pub(crate) const SORT_BAGS: &[BagKind] = &[
    BagKind::Columns,
    BagKind::ColumnProperties,
    BagKind::Hybrid,
    BagKind::JsonPaths,
    BagKind::Legacy,
];

/// One resolved `name+` / `name-` entry
#[derive(Clone)]
pub struct SortItem {
    pub name: CompactString,
    pub direction: Direction,
    pub target: Target,
}

/// Parses a sort-like section: `"a+ b-"`, `["a+", "b-"]` or `{"a": -1}`
pub(crate) fn parse_ordering(
    ctx: &HandlerContext<'_>,
    raw: &JsonValue,
    section: &str,
) -> Result<Vec<SortItem>> {
    let entries: Vec<(CompactString, Direction)> = match raw {
        JsonValue::Null => Vec::new(),
        JsonValue::Object(map) => {
            if map.len() > 1 {
                return Err(MongoqlError::InvalidQuery(format!(
                    "{section} is a plain object; it can only have one key \
                     because object keys are unordered; use an array instead"
                )));
            }
            map.iter()
                .map(|(name, dir)| {
                    let direction = match dir.as_i64() {
                        Some(1) => Direction::Asc,
                        Some(-1) => Direction::Desc,
                        _ => {
                            return Err(MongoqlError::InvalidQuery(format!(
                                "{section} direction can be either +1 or -1"
                            )));
                        }
                    };
                    Ok((CompactString::from(name.as_str()), direction))
                })
                .collect::<Result<_>>()?
        }
        other => parse_name_list(other, section)?
            .into_iter()
            .map(|entry| {
                if let Some(name) = entry.strip_suffix('-') {
                    (CompactString::from(name), Direction::Desc)
                } else if let Some(name) = entry.strip_suffix('+') {
                    (CompactString::from(name), Direction::Asc)
                } else {
                    (entry, Direction::Asc)
                }
            })
            .collect(),
    };

    let bag = ctx.combined(SORT_BAGS);
    let mut items: Vec<SortItem> = Vec::with_capacity(entries.len());
    for (name, direction) in entries {
        let lookup = match bag.resolve(&name, section)? {
            (_, Lookup::Legacy) => continue,
            (_, lookup) => lookup,
        };
        let target = Target::from_lookup(lookup)
            .ok_or_else(|| MongoqlError::invalid_column(ctx.model(), &name, section))?;
        match items.iter_mut().find(|item| item.name == name) {
            Some(existing) => existing.direction = direction,
            None => items.push(SortItem {
                name,
                direction,
                target,
            }),
        }
    }
    Ok(items)
}

pub(crate) fn normalized_ordering(items: &[SortItem]) -> JsonValue {
    JsonValue::Array(
        items
            .iter()
            .map(|item| JsonValue::String(format!("{}{}", item.name, item.direction.suffix())))
            .collect(),
    )
}

#[derive(Clone, Default)]
pub struct SortHandler {
    items: Vec<SortItem>,
}

impl SortHandler {
    pub fn input(&mut self, ctx: &HandlerContext<'_>, raw: &JsonValue) -> Result<()> {
        crate::mongoql_trace_handler!("sort", ctx.model());
        self.items = parse_ordering(ctx, raw, "sort")?;
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

    /// ORDER BY list for a table alias
    pub fn render(&self, dialect: Dialect, alias: &str) -> Option<SQL> {
        if self.items.is_empty() {
            return None;
        }
        Some(SQL::join(
            self.items.iter().map(|item| {
                let expr = item.target.sort_key(dialect, alias);
                match item.direction {
                    Direction::Asc => expr.push(Token::ASC),
                    Direction::Desc => expr.push(Token::DESC),
                }
            }),
            Token::COMMA,
        ))
    }
}
