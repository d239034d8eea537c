//! `skip` and `limit`.

use super::HandlerContext;
use crate::error::{MongoqlError, Result};
use crate::prelude::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct LimitHandler {
    skip: Option<usize>,
    limit: Option<usize>,
    max_items: Option<usize>,
}

/// A non-negative integer or null; zero means "not set"
fn parse_count(raw: &JsonValue, section: &str, model: &str) -> Result<Option<usize>> {
    let invalid = || {
        MongoqlError::InvalidQuery(format!(
            "{section} for \"{model}\" must be a non-negative integer, got {raw}"
        ))
    };
    match raw {
        JsonValue::Null => Ok(None),
        JsonValue::Number(n) => match n.as_u64() {
            Some(0) => Ok(None),
            Some(n) => usize::try_from(n).map(Some).map_err(|_| invalid()),
            None => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

impl LimitHandler {
    pub fn new(max_items: Option<usize>) -> Self {
        Self {
            max_items: max_items.filter(|&max| max > 0),
            ..Self::default()
        }
    }

    pub fn input(
        &mut self,
        ctx: &HandlerContext<'_>,
        skip: Option<&JsonValue>,
        limit: Option<&JsonValue>,
    ) -> Result<()> {
        crate::mongoql_trace_handler!("limit", ctx.model());
        if let Some(raw) = skip {
            self.skip = parse_count(raw, "skip", ctx.model())?;
        }
        if let Some(raw) = limit {
            self.limit = parse_count(raw, "limit", ctx.model())?;
        }
        Ok(())
    }

    #[inline]
    pub fn skip(&self) -> Option<usize> {
        self.skip
    }

    /// Effective limit with the `max_items` ceiling applied
    pub fn limit(&self) -> Option<usize> {
        match (self.limit, self.max_items) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (limit, max) => limit.or(max),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.skip.is_none() && self.limit.is_none()
    }
}
