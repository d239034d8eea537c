//! Tracing utilities for query compilation and execution.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site.

/// Emit a debug-level tracing event with the SQL text and parameter count.
///
/// ```ignore
/// mongoql_trace_query!(&sql_str, params.len());
/// ```
#[macro_export]
macro_rules! mongoql_trace_query {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(sql = %$sql, params = $param_count, "mongoql.query");
    };
}

/// Emit a debug-level event once a Query Object has been compiled.
///
/// ```ignore
/// mongoql_trace_compile!("User", "entities");
/// ```
#[macro_export]
macro_rules! mongoql_trace_compile {
    ($model:expr, $shape:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(model = %$model, shape = %$shape, "mongoql.compile");
    };
}

/// Emit a trace-level event when a handler accepts its Query Object section.
#[macro_export]
macro_rules! mongoql_trace_handler {
    ($section:expr, $model:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::trace!(section = $section, model = %$model, "mongoql.handler");
    };
}

/// Emit a debug-level event for CRUD entity construction (create, update).
#[macro_export]
macro_rules! mongoql_trace_crud {
    ($action:literal, $model:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(action = $action, model = %$model, "mongoql.crud");
    };
}
