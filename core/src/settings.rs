//! Per-model handler settings: the security policy a Query Object is compiled under.

use crate::bag::ModelBags;
use crate::error::{MongoqlError, Result};
use crate::model::ExprFn;
use crate::prelude::*;
use crate::sql::SQL;
use serde::{Deserialize, Deserializer};
use std::sync::RwLock;

/// Filter that is always ANDed into the statement and never shows in the Query Object
#[derive(Clone)]
pub enum ForceFilter {
    /// Filter criteria compiled like a user `filter`
    Criteria(JsonValue),
    /// Predicate built for the query's table alias
    Callable(ExprFn),
}

impl core::fmt::Debug for ForceFilter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ForceFilter::Criteria(criteria) => f.debug_tuple("Criteria").field(criteria).finish(),
            ForceFilter::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for ForceFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        match JsonValue::deserialize(deserializer)? {
            criteria @ JsonValue::Object(_) => Ok(ForceFilter::Criteria(criteria)),
            _ => Err(serde::de::Error::custom("force_filter must be an object")),
        }
    }
}

/// Settings for a related model
#[derive(Clone)]
pub enum Related {
    Settings(Arc<QuerySettings>),
    /// Produced on first use; lets settings graphs reference each other in cycles
    Lazy(Arc<dyn Fn() -> QuerySettings + Send + Sync>),
}

impl Related {
    fn resolve(&self) -> Arc<QuerySettings> {
        match self {
            Related::Settings(settings) => settings.clone(),
            Related::Lazy(f) => Arc::new(f()),
        }
    }
}

impl core::fmt::Debug for Related {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Related::Settings(settings) => f.debug_tuple("Settings").field(settings).finish(),
            Related::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for Related {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        QuerySettings::deserialize(deserializer).map(|s| Related::Settings(Arc::new(s)))
    }
}

/// Resolved nested settings, keyed by relation name
#[derive(Default)]
pub(crate) struct NestedMemo(RwLock<HashMap<CompactString, Arc<QuerySettings>>>);

impl Clone for NestedMemo {
    fn clone(&self) -> Self {
        NestedMemo::default()
    }
}

impl core::fmt::Debug for NestedMemo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let size = self.0.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("NestedMemo").field("resolved", &size).finish()
    }
}

/// Policy for one model in one context.
///
/// Deserializable from JSON (and TOML with the `toml` feature); unknown setting names are
/// rejected. Callables are set programmatically.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySettings {
    /// Projection applied when the Query Object has none
    pub default_projection: Option<JsonValue>,
    /// Excluded unless requested explicitly; exclusion mode only
    pub default_exclude: Vec<CompactString>,
    /// Exclude computed and hybrid properties in exclusion mode
    pub default_exclude_properties: bool,
    /// Properties kept even when `default_exclude_properties` is on
    pub default_unexclude_properties: Vec<CompactString>,
    pub force_include: Vec<CompactString>,
    pub force_exclude: Vec<CompactString>,
    /// Attribute → attributes loaded quietly along with it
    pub bundled_project: HashMap<CompactString, Vec<CompactString>>,
    pub allowed_relations: Option<Vec<CompactString>>,
    pub banned_relations: Option<Vec<CompactString>>,
    /// Columns usable in `aggregate` and as aggregate group keys
    pub aggregate_columns: Vec<CompactString>,
    /// Allow plain column passthrough in `aggregate`
    pub aggregate_labels: bool,
    /// Ceiling for `limit`
    pub max_items: Option<usize>,
    /// Names accepted and ignored by every handler and by CRUD input
    pub legacy_fields: HashSet<CompactString>,
    pub raiseload_col: bool,
    pub raiseload_rel: bool,
    pub force_filter: Option<ForceFilter>,

    pub project_enabled: bool,
    pub sort_enabled: bool,
    pub group_enabled: bool,
    pub filter_enabled: bool,
    pub join_enabled: bool,
    pub joinf_enabled: bool,
    pub aggregate_enabled: bool,
    pub limit_enabled: bool,
    pub count_enabled: bool,

    /// Nested settings by relation name; `*` matches any relation
    pub related: HashMap<CompactString, Related>,
    /// Nested settings by target model name; `*` matches any model
    pub related_models: HashMap<CompactString, Related>,

    #[serde(skip)]
    pub(crate) memo: NestedMemo,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_projection: None,
            default_exclude: Vec::new(),
            default_exclude_properties: true,
            default_unexclude_properties: Vec::new(),
            force_include: Vec::new(),
            force_exclude: Vec::new(),
            bundled_project: HashMap::new(),
            allowed_relations: None,
            banned_relations: None,
            aggregate_columns: Vec::new(),
            aggregate_labels: false,
            max_items: None,
            legacy_fields: HashSet::new(),
            raiseload_col: false,
            raiseload_rel: false,
            force_filter: None,
            project_enabled: true,
            sort_enabled: true,
            group_enabled: true,
            filter_enabled: true,
            join_enabled: true,
            joinf_enabled: true,
            aggregate_enabled: true,
            limit_enabled: true,
            count_enabled: true,
            related: HashMap::new(),
            related_models: HashMap::new(),
            memo: NestedMemo::default(),
        }
    }
}

impl QuerySettings {
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        Self::deserialize(value).map_err(|e| MongoqlError::Configuration(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| MongoqlError::Configuration(e.to_string()))
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| MongoqlError::Configuration(e.to_string()))
    }

    pub fn with_force_filter(mut self, f: impl Fn(&str) -> SQL + Send + Sync + 'static) -> Self {
        self.force_filter = Some(ForceFilter::Callable(Arc::new(f)));
        self
    }

    pub fn with_related(mut self, relation: impl Into<CompactString>, settings: QuerySettings) -> Self {
        self.related
            .insert(relation.into(), Related::Settings(Arc::new(settings)));
        self
    }

    pub fn with_related_lazy(
        mut self,
        relation: impl Into<CompactString>,
        f: impl Fn() -> QuerySettings + Send + Sync + 'static,
    ) -> Self {
        self.related.insert(relation.into(), Related::Lazy(Arc::new(f)));
        self
    }

    pub fn with_related_model(mut self, model: impl Into<CompactString>, settings: QuerySettings) -> Self {
        self.related_models
            .insert(model.into(), Related::Settings(Arc::new(settings)));
        self
    }

    /// Settings for a relation to `target_model`.
    ///
    /// Lookup order: `related[relation]`, `related["*"]`, `related_models[target_model]`,
    /// `related_models["*"]`, then defaults. The result is memoized per relation.
    pub fn for_relation(&self, relation: &str, target_model: &str) -> Arc<QuerySettings> {
        if let Some(found) = self.memo.0.read().ok().and_then(|m| m.get(relation).cloned()) {
            return found;
        }

        let resolved = self
            .related
            .get(relation)
            .or_else(|| self.related.get("*"))
            .or_else(|| self.related_models.get(target_model))
            .or_else(|| self.related_models.get("*"))
            .map(Related::resolve)
            .unwrap_or_default();

        if let Ok(mut memo) = self.memo.0.write() {
            return memo
                .entry(CompactString::from(relation))
                .or_insert(resolved)
                .clone();
        }
        resolved
    }

    /// Checks names against the model the settings are used for
    pub fn validate(&self, bags: &ModelBags) -> Result<()> {
        let model = bags.model_name();
        let unknown = |what: &str, name: &str| {
            MongoqlError::Configuration(format!(
                "Unknown {what} \"{name}\" for \"{model}\" in settings"
            ))
        };

        if self.allowed_relations.is_some() && self.banned_relations.is_some() {
            return Err(MongoqlError::Configuration(format!(
                "Settings for \"{model}\" set both allowed_relations and banned_relations"
            )));
        }

        let attribute_lists = [
            &self.default_exclude,
            &self.default_unexclude_properties,
            &self.force_include,
            &self.force_exclude,
        ];
        for name in attribute_lists.into_iter().flatten() {
            if !bags.contains(name) || bags.relation(name).is_some() {
                return Err(unknown("attribute", name.as_str()));
            }
        }
        for (name, bundle) in &self.bundled_project {
            if !bags.contains(name) {
                return Err(unknown("attribute", name.as_str()));
            }
            if let Some(dep) = bundle.iter().find(|dep| bags.column(dep).is_none()) {
                return Err(unknown("column", dep.as_str()));
            }
        }
        if let Some(name) = self.aggregate_columns.iter().find(|n| bags.column(n).is_none()) {
            return Err(unknown("column", name.as_str()));
        }
        let relation_lists = [&self.allowed_relations, &self.banned_relations];
        for name in relation_lists.into_iter().flatten().flatten() {
            if bags.relation(name).is_none() {
                return Err(unknown("relation", name.as_str()));
            }
        }
        for name in self.related.keys() {
            if name != "*" && bags.relation(name).is_none() {
                return Err(unknown("relation", name.as_str()));
            }
        }
        Ok(())
    }

    /// Whether `relation` passes the allow/ban lists
    pub fn relation_allowed(&self, relation: &str) -> bool {
        if let Some(allowed) = &self.allowed_relations {
            return allowed.iter().any(|r| r == relation);
        }
        if let Some(banned) = &self.banned_relations {
            return !banned.iter().any(|r| r == relation);
        }
        true
    }
}
