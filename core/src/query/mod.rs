//! The Query Object compiler.
//!
//! [`MongoQuery`] validates a Query Object section by section, in a fixed order, and
//! finalizes into a [`CompiledQuery`]:
//!
//! ```ignore
//! let compiled = MongoQuery::new(schema, "User", settings)?
//!     .query(&json!({"filter": {"age": {"$gte": 18}}, "join": ["articles"]}))?
//!     .ensure_loaded(["id"])?
//!     .end()?;
//! let (sql, params) = compiled.build();
//! ```
//!
//! Related models are loaded by nested `MongoQuery`s rendered as correlated JSON
//! subqueries, so one statement returns the whole tree.

mod compiled;
mod select;
mod shape;
mod sql;

pub use compiled::{CompiledQuery, QueryResult, ResultShape};
pub use select::Select;

use crate::bag::ModelBags;
use crate::error::{MongoqlError, Result};
use crate::handlers::filter::parse_criteria;
use crate::handlers::{
    AggregateHandler, CountHandler, Criterion, FilterHandler, GroupHandler, HandlerContext,
    JoinHandler, JoinNode, LimitHandler, ProjectHandler, SortHandler,
};
use crate::model::Schema;
use crate::prelude::*;
use crate::settings::{ForceFilter, QuerySettings};

static NULL: JsonValue = JsonValue::Null;

/// Recognized top-level Query Object keys
const SECTIONS: &[&str] = &[
    "project", "sort", "group", "filter", "join", "joinf", "aggregate", "skip", "limit", "count",
];

/// Compiles a Query Object for `model` in one call
pub fn compile(
    schema: &Arc<Schema>,
    model: &str,
    settings: &Arc<QuerySettings>,
    query_object: &JsonValue,
    base: Option<Select>,
) -> Result<CompiledQuery> {
    let mut query = MongoQuery::new(schema.clone(), model, settings.clone())?;
    if let Some(base) = base {
        query = query.from_query(base);
    }
    query.query(query_object)?.end()
}

/// Compiler state for one Query Object against one model
pub struct MongoQuery {
    schema: Arc<Schema>,
    bags: Arc<ModelBags>,
    settings: Arc<QuerySettings>,
    base: Select,
    force_filter: Vec<Criterion>,
    sections: Vec<&'static str>,

    project: ProjectHandler,
    sort: SortHandler,
    group: GroupHandler,
    filter: FilterHandler,
    join: JoinHandler,
    joinf: JoinHandler,
    aggregate: AggregateHandler,
    limit: LimitHandler,
    count: CountHandler,
}

impl MongoQuery {
    pub fn new(schema: Arc<Schema>, model: &str, settings: Arc<QuerySettings>) -> Result<Self> {
        let bags = schema.bags(model)?;
        settings.validate(&bags)?;

        let force_filter = match &settings.force_filter {
            Some(ForceFilter::Criteria(JsonValue::Object(criteria))) => {
                let ctx = HandlerContext {
                    schema: &schema,
                    bags: &bags,
                    settings: &settings,
                };
                parse_criteria(&ctx, criteria)?
            }
            _ => Vec::new(),
        };

        Ok(Self {
            limit: LimitHandler::new(settings.max_items),
            schema,
            bags,
            settings,
            base: Select::default(),
            force_filter,
            sections: Vec::new(),
            project: ProjectHandler::default(),
            sort: SortHandler::default(),
            group: GroupHandler::default(),
            filter: FilterHandler::default(),
            join: JoinHandler::new(false),
            joinf: JoinHandler::new(true),
            aggregate: AggregateHandler::default(),
            count: CountHandler::default(),
        })
    }

    /// Starts from an existing statement instead of a bare table
    pub fn from_query(mut self, base: Select) -> Self {
        self.base = base;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        self.bags.model_name()
    }

    #[inline]
    pub fn bags(&self) -> &Arc<ModelBags> {
        &self.bags
    }

    #[inline]
    pub fn settings(&self) -> &Arc<QuerySettings> {
        &self.settings
    }

    fn section_enabled(&self, section: &str) -> bool {
        let s = &self.settings;
        match section {
            "project" => s.project_enabled,
            "sort" => s.sort_enabled,
            "group" => s.group_enabled,
            "filter" => s.filter_enabled,
            "join" => s.join_enabled,
            "joinf" => s.joinf_enabled,
            "aggregate" => s.aggregate_enabled,
            "skip" | "limit" => s.limit_enabled,
            "count" => s.count_enabled,
            _ => false,
        }
    }

    /// Applies a Query Object (an object or null)
    pub fn query(mut self, query_object: &JsonValue) -> Result<Self> {
        let empty = JsonMap::new();
        let qo = match query_object {
            JsonValue::Null => &empty,
            JsonValue::Object(map) => map,
            other => {
                return Err(MongoqlError::InvalidQuery(format!(
                    "Query Object must be an object, got {other}"
                )));
            }
        };

        for (key, value) in qo {
            let Some(section) = SECTIONS.iter().find(|s| **s == key.as_str()) else {
                return Err(MongoqlError::InvalidQuery(format!(
                    "Unsupported Query Object key \"{key}\""
                )));
            };
            if value.is_null() {
                continue;
            }
            if !self.section_enabled(section) {
                return Err(MongoqlError::Disabled(format!(
                    "Query Object handler \"{section}\" is disabled for \"{}\"",
                    self.model()
                )));
            }
            self.sections.push(*section);
        }

        let (schema, bags, settings) = (self.schema.clone(), self.bags.clone(), self.settings.clone());
        let ctx = HandlerContext {
            schema: &schema,
            bags: &bags,
            settings: &settings,
        };
        let get = |key: &str| qo.get(key).unwrap_or(&NULL);

        self.filter.input(&ctx, get("filter"))?;
        self.join.input(&ctx, get("join"))?;
        self.joinf.input(&ctx, get("joinf"))?;
        if let Some(node) = self.join.nodes().iter().find(|n| self.joinf.contains(n.name())) {
            return Err(MongoqlError::InvalidQuery(format!(
                "Relation \"{}\" cannot be in both join and joinf",
                node.name()
            )));
        }
        self.aggregate.input(&ctx, get("aggregate"))?;
        self.group.input(&ctx, get("group"))?;
        if !self.aggregate.is_empty() {
            self.aggregate.check_group_keys(&ctx, self.group.items())?;
        }
        self.sort.input(&ctx, get("sort"))?;
        self.limit.input(&ctx, qo.get("skip"), qo.get("limit"))?;
        self.project.input(&ctx, qo.get("project"))?;
        for relation in self.project.relations().to_vec() {
            if self.joinf.contains(&relation) {
                continue;
            }
            if !settings.join_enabled {
                return Err(MongoqlError::Disabled(format!(
                    "project: joining \"{}.{}\" is disabled",
                    self.model(),
                    relation
                )));
            }
            self.join.merge(&ctx, &relation, false, false)?;
        }
        self.count.input(&ctx, get("count"))?;
        Ok(self)
    }

    /// Loads attributes and relations without making them part of the output.
    ///
    /// `relation.name` loads `name` on the related model.
    pub fn ensure_loaded<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.ensure(name.as_ref())?;
        }
        Ok(self)
    }

    fn ensure(&mut self, name: &str) -> Result<()> {
        let (schema, bags, settings) = (self.schema.clone(), self.bags.clone(), self.settings.clone());
        let ctx = HandlerContext {
            schema: &schema,
            bags: &bags,
            settings: &settings,
        };

        let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };
        if settings.legacy_fields.contains(head) {
            return Ok(());
        }
        if bags.relation(head).is_some() {
            let handler = if self.joinf.contains(head) {
                &mut self.joinf
            } else {
                &mut self.join
            };
            let node = handler.merge(&ctx, head, true, true)?;
            if let Some(rest) = rest {
                node.query.ensure(rest)?;
            }
            return Ok(());
        }
        if rest.is_some() {
            return Err(MongoqlError::invalid_column(self.model(), name, "ensure_loaded"));
        }
        self.project.ensure(&ctx, name)
    }

    /// Sections the Query Object supplied, in input order
    pub fn input_sections(&self) -> &[&'static str] {
        &self.sections
    }

    pub fn result_shape(&self) -> ResultShape {
        if self.count.is_set() {
            ResultShape::Scalar
        } else if !self.aggregate.is_empty() {
            ResultShape::Tuples
        } else {
            ResultShape::Entities
        }
    }

    fn relation_nodes(&self) -> impl Iterator<Item = &JoinNode> {
        self.join.nodes().iter().chain(self.joinf.nodes())
    }

    /// The Query Object as it was understood, with defaults and limits applied
    pub fn final_query_object(&self) -> JsonMap {
        let mut qo = JsonMap::new();
        let shape = self.result_shape();
        if shape == ResultShape::Entities {
            qo.insert("project".into(), self.project.normalized(&self.bags));
        }
        let sections = [
            ("sort", self.sort.normalized()),
            ("group", self.group.normalized()),
            ("filter", self.filter.normalized()),
            ("join", self.join.normalized()),
            ("joinf", self.joinf.normalized()),
            ("aggregate", self.aggregate.normalized()),
            ("skip", self.limit.skip().map(JsonValue::from)),
        ];
        for (key, value) in sections {
            if let Some(value) = value {
                qo.insert(key.into(), value);
            }
        }
        if shape == ResultShape::Scalar {
            qo.insert("count".into(), JsonValue::Bool(true));
        } else if let Some(limit) = self.limit.limit() {
            qo.insert("limit".into(), JsonValue::from(limit));
        }
        qo
    }

    /// `{name: 1, relation: {...}}` for every shown attribute and joined relation
    pub fn projection_tree(&self) -> JsonMap {
        if self.result_shape() != ResultShape::Entities {
            return JsonMap::new();
        }
        let mut tree: JsonMap = self
            .project
            .shown(&self.bags)
            .map(|name| (name.to_string(), JsonValue::from(1)))
            .collect();
        for node in self.relation_nodes().filter(|n| !n.quiet) {
            tree.insert(
                node.name().to_string(),
                JsonValue::Object(node.query.projection_tree()),
            );
        }
        tree
    }

    /// Renders the statement; the builder is consumed
    pub fn end(self) -> Result<CompiledQuery> {
        let dialect = self.schema.dialect();
        let statement = self.render_statement(dialect)?;
        let result_shape = self.result_shape();
        crate::mongoql_trace_compile!(self.model(), result_shape);
        Ok(CompiledQuery::new(
            statement,
            dialect,
            result_shape,
            shape::Shape::of(&self),
            self.final_query_object(),
            self.projection_tree(),
        ))
    }
}

/// Factory for fresh [`MongoQuery`]s sharing one configuration
#[derive(Clone)]
pub struct Reusable {
    schema: Arc<Schema>,
    model: CompactString,
    settings: Arc<QuerySettings>,
    base: Option<Select>,
}

impl Reusable {
    /// Validates the model and the settings once
    pub fn new(schema: Arc<Schema>, model: impl Into<CompactString>, settings: Arc<QuerySettings>) -> Result<Self> {
        let model = model.into();
        settings.validate(&*schema.bags(&model)?)?;
        Ok(Self {
            schema,
            model,
            settings,
            base: None,
        })
    }

    pub fn from_query(mut self, base: Select) -> Self {
        self.base = Some(base);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn settings(&self) -> &Arc<QuerySettings> {
        &self.settings
    }

    /// A new compiler with no Query Object applied
    pub fn get(&self) -> Result<MongoQuery> {
        let query = MongoQuery::new(self.schema.clone(), &self.model, self.settings.clone())?;
        Ok(match &self.base {
            Some(base) => query.from_query(base.clone()),
            None => query,
        })
    }
}
