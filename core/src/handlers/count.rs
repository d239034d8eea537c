//! `count`: replaces the result with the number of matching rows.

use super::{HandlerContext, parse_flag};
use crate::error::{MongoqlError, Result};
use crate::prelude::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct CountHandler {
    count: bool,
}

impl CountHandler {
    pub fn input(&mut self, ctx: &HandlerContext<'_>, raw: &JsonValue) -> Result<()> {
        crate::mongoql_trace_handler!("count", ctx.model());
        self.count = match raw {
            JsonValue::Null => false,
            other => parse_flag(other).ok_or_else(|| {
                MongoqlError::InvalidQuery(format!(
                    "count for \"{}\" must be a boolean, 0 or 1, got {other}",
                    ctx.model()
                ))
            })?,
        };
        Ok(())
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests_support::fixture;
    use serde_json::json;

    #[test]
    fn test_flag_values() {
        let fx = fixture();
        let ctx = fx.ctx("User");
        let parse = |raw: JsonValue| {
            let mut count = CountHandler::default();
            count.input(&ctx, &raw).map(|_| count.is_set())
        };
        assert!(parse(json!(1)).unwrap());
        assert!(parse(json!(true)).unwrap());
        assert!(!parse(json!(0)).unwrap());
        assert!(!parse(json!(null)).unwrap());
        assert!(matches!(parse(json!(2)), Err(MongoqlError::InvalidQuery(_))));
        assert!(matches!(
            parse(json!("yes")),
            Err(MongoqlError::InvalidQuery(message)) if message.contains("\"User\"")
        ));
    }
}
