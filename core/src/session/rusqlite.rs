//! [`Session`] and parameter binding for [`rusqlite::Connection`].

use super::{Rows, Session};
use crate::error::{MongoqlError, Result};
use crate::prelude::*;
use crate::value::Value;
use ::rusqlite::types::{ToSqlOutput, ValueRef};

impl ::rusqlite::ToSql for Value {
    fn to_sql(&self) -> ::rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(::rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(::rusqlite::types::Value::Integer(*b as i64)),
            Value::Integer(i) => ToSqlOutput::Owned(::rusqlite::types::Value::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(::rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            // SQLite stores arrays and documents as JSON text
            Value::Array(_) | Value::Json(_) => {
                ToSqlOutput::Owned(::rusqlite::types::Value::Text(self.to_json().to_string()))
            }
        })
    }
}

fn decode(value: ValueRef<'_>) -> Result<JsonValue> {
    Ok(match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(
            core::str::from_utf8(bytes)
                .map_err(|e| MongoqlError::Mapping(e.to_string()))?
                .to_owned(),
        ),
        ValueRef::Blob(bytes) => JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect()),
    })
}

impl Session for ::rusqlite::Connection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Rows> {
        crate::mongoql_trace_query!(sql, params.len());

        let mut stmt = self.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = stmt.query(::rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(decode(row.get_ref(i)?)?);
            }
            out.push(values);
        }

        Ok(Rows { columns, rows: out })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_decodes_cells() {
        let mut conn = ::rusqlite::Connection::open_in_memory().unwrap();
        let rows = conn
            .query(
                "SELECT ? AS a, ? AS b, NULL AS c, 1.5 AS d",
                &[Value::Integer(7), Value::Array(vec![Value::Text("x".into())])],
            )
            .unwrap();
        assert_eq!(rows.columns, vec!["a", "b", "c", "d"]);
        assert_eq!(rows.rows, vec![vec![json!(7), json!("[\"x\"]"), json!(null), json!(1.5)]]);
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn test_fetch_traces_each_statement_once() {
        use crate::handlers::tests_support::schema;
        use crate::query::MongoQuery;
        use crate::settings::QuerySettings;
        use ::tracing::{Event, Metadata, span, subscriber::Subscriber};
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct QueryEvents(Arc<AtomicUsize>);

        impl Subscriber for QueryEvents {
            fn enabled(&self, _: &Metadata<'_>) -> bool {
                true
            }
            fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
                span::Id::from_u64(1)
            }
            fn record(&self, _: &span::Id, _: &span::Record<'_>) {}
            fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}
            fn event(&self, event: &Event<'_>) {
                if event.fields().any(|field| field.name() == "sql") {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
            }
            fn enter(&self, _: &span::Id) {}
            fn exit(&self, _: &span::Id) {}
        }

        let mut conn = ::rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER, tags TEXT, data TEXT);
             INSERT INTO users (id, name) VALUES (1, 'ann');",
        )
        .unwrap();
        let compiled = MongoQuery::new(
            Arc::new(schema(crate::Dialect::SQLite)),
            "User",
            Arc::new(QuerySettings::default()),
        )
        .unwrap()
        .query(&json!({"project": ["name"]}))
        .unwrap()
        .end()
        .unwrap();

        let events = Arc::new(AtomicUsize::new(0));
        ::tracing::subscriber::with_default(QueryEvents(events.clone()), || {
            compiled.fetch(&mut conn).unwrap();
        });
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }
}
