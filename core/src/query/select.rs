//! Statement builder the compiler renders into.

use crate::dialect::Dialect;
use crate::prelude::*;
use crate::sql::{SQL, SQLChunk, Token};

/// A single `SELECT` statement.
///
/// Passed to [`MongoQuery::from_query`](super::MongoQuery::from_query) it acts as the
/// base query: its conditions are ANDed into the compiled statement and may reference
/// the root table through the alias `t0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    columns: Vec<SQL>,
    source: Option<SQL>,
    conditions: Vec<SQL>,
    group_by: Option<SQL>,
    order_by: Option<SQL>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SELECT ... FROM "table" AS "alias"`
    pub fn from_table(table: impl Into<CompactString>, alias: impl Into<CompactString>) -> Self {
        Self::new().source(SQL::ident(table).alias(alias))
    }

    pub fn column(mut self, column: SQL) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = SQL>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// FROM clause: a table reference or an aliased subquery
    pub fn source(mut self, source: SQL) -> Self {
        self.source = Some(source);
        self
    }

    /// Adds a WHERE condition; conditions are ANDed
    pub fn filter(mut self, condition: SQL) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn filters(mut self, conditions: impl IntoIterator<Item = SQL>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn group_by(mut self, group_by: Option<SQL>) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn order_by(mut self, order_by: Option<SQL>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: Option<usize>) -> Self {
        self.offset = offset;
        self
    }

    pub fn conditions(&self) -> &[SQL] {
        &self.conditions
    }

    pub fn to_sql(&self, dialect: Dialect) -> SQL {
        let mut sql = SQL::token(Token::SELECT);
        if self.columns.is_empty() {
            sql.push_mut(Token::STAR);
        } else {
            sql.append_mut(SQL::join(self.columns.iter().cloned(), Token::COMMA));
        }
        if let Some(source) = &self.source {
            sql.push_mut(Token::FROM);
            sql.append_mut(source.clone());
        }
        if let Some(conditions) = SQL::and_all(self.conditions.clone()) {
            sql.push_mut(Token::WHERE);
            sql.append_mut(conditions);
        }
        if let Some(group_by) = &self.group_by {
            sql.push_mut(Token::GROUP);
            sql.push_mut(Token::BY);
            sql.append_mut(group_by.clone());
        }
        if let Some(order_by) = &self.order_by {
            sql.push_mut(Token::ORDER);
            sql.push_mut(Token::BY);
            sql.append_mut(order_by.clone());
        }
        match (self.limit, self.offset) {
            (Some(limit), _) => {
                sql.push_mut(Token::LIMIT);
                sql.push_mut(SQLChunk::Number(limit));
            }
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(_)) if dialect != Dialect::PostgreSQL => {
                sql.push_mut(Token::LIMIT);
                sql.push_mut(SQLChunk::raw_static("-1"));
            }
            _ => {}
        }
        if let Some(offset) = self.offset {
            sql.push_mut(Token::OFFSET);
            sql.push_mut(SQLChunk::Number(offset));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clauses() {
        let select = Select::from_table("users", "t0")
            .column(SQL::column("t0", "id"))
            .column(SQL::column("t0", "name"))
            .filter(SQL::column("t0", "id").push(Token::GT).append(SQL::param(1i64)))
            .order_by(Some(SQL::column("t0", "name").push(Token::DESC)))
            .limit(Some(10))
            .offset(Some(20));
        assert_eq!(
            select.to_sql(Dialect::SQLite).sql(Dialect::SQLite),
            r#"SELECT "t0"."id", "t0"."name" FROM "users" AS "t0" WHERE "t0"."id" > ? ORDER BY "t0"."name" DESC LIMIT 10 OFFSET 20"#
        );
    }

    #[test]
    fn test_offset_without_limit() {
        let select = Select::from_table("users", "t0").offset(Some(5));
        assert_eq!(
            select.to_sql(Dialect::SQLite).sql(Dialect::SQLite),
            r#"SELECT * FROM "users" AS "t0" LIMIT -1 OFFSET 5"#
        );
        assert_eq!(
            select.to_sql(Dialect::PostgreSQL).sql(Dialect::PostgreSQL),
            r#"SELECT * FROM "users" AS "t0" OFFSET 5"#
        );
    }
}
