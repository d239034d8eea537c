//! Building entities from submitted field maps, and querying under one policy.
//!
//! [`CrudHelper`] is meant to be created once per model and shared; every call starts
//! from a fresh [`MongoQuery`] produced by its [`Reusable`].

use crate::bag::{ModelBags, Resolved};
use crate::entity::Entity;
use crate::error::{MongoqlError, Result};
use crate::model::Schema;
use crate::prelude::*;
use crate::query::{MongoQuery, Reusable, Select};
use crate::settings::QuerySettings;
use serde::Deserialize;

/// Called with the new entity, the previous one (on update) and the submitted values of
/// the fields the hook was registered for
pub type SaveHook = Arc<dyn Fn(&mut Entity, Option<&Entity>, &JsonMap) -> Result<()> + Send + Sync>;

#[derive(Clone)]
struct Saver {
    fields: Vec<CompactString>,
    hook: SaveHook,
}

/// Which submitted fields an action keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
        }
    }
}

#[derive(Clone)]
pub struct CrudHelper {
    query: Reusable,
    bags: Arc<ModelBags>,
    writable_properties: bool,
    savers: Vec<Saver>,
}

impl CrudHelper {
    pub fn new(schema: Arc<Schema>, model: &str, settings: Arc<QuerySettings>) -> Result<Self> {
        let bags = schema.bags(model)?;
        Ok(Self {
            query: Reusable::new(schema, model, settings)?,
            bags,
            writable_properties: true,
            savers: Vec::new(),
        })
    }

    /// Allow writing computed properties that have a setter (on by default)
    pub fn writable_properties(mut self, enabled: bool) -> Self {
        self.writable_properties = enabled;
        self
    }

    /// Starts every query from `base`
    pub fn from_query(mut self, base: Select) -> Self {
        self.query = self.query.from_query(base);
        self
    }

    /// Routes `fields` of the submitted map to `hook` instead of the entity.
    ///
    /// The hook runs after the entity is built, only when at least one of its fields was
    /// submitted.
    pub fn saves_relations<I, S>(
        mut self,
        fields: I,
        hook: impl Fn(&mut Entity, Option<&Entity>, &JsonMap) -> Result<()> + Send + Sync + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        self.savers.push(Saver {
            fields: fields.into_iter().map(Into::into).collect(),
            hook: Arc::new(hook),
        });
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
        self.query.settings()
    }

    /// A compiler with `query_object` applied; finish it with `ensure_loaded` and `end`
    pub fn query_model(&self, query_object: &JsonValue) -> Result<MongoQuery> {
        match query_object {
            JsonValue::Null | JsonValue::Object(_) => self.query.get()?.query(query_object),
            _ => Err(MongoqlError::InvalidQuery(
                "Query Object must be either an object, or null".into(),
            )),
        }
    }

    /// Builds a new entity from submitted fields
    pub fn create_model(&self, input: &JsonMap) -> Result<Entity> {
        crate::mongoql_trace_crud!("create", self.model());
        let (fields, saved) = self.validate(input, Action::Create)?;
        let mut entity = Entity::new(self.model());
        for (name, value) in fields {
            self.assign(&mut entity, &name, value)?;
        }
        self.run_savers(&mut entity, None, &saved)?;
        Ok(entity)
    }

    /// Copies submitted fields over `entity`; JSON objects are merged one level deep
    pub fn update_model(&self, input: &JsonMap, entity: Entity) -> Result<Entity> {
        crate::mongoql_trace_crud!("update", self.model());
        let (fields, saved) = self.validate(input, Action::Update)?;
        self.apply_update(fields, saved, entity)
    }

    fn apply_update(&self, fields: JsonMap, saved: JsonMap, entity: Entity) -> Result<Entity> {
        let previous = entity.clone();
        let mut entity = entity;
        for (name, value) in fields {
            let value = match (self.bags.column(&name), value, entity.remove(&name)) {
                (Some(column), JsonValue::Object(patch), Some(JsonValue::Object(mut current)))
                    if column.is_json() =>
                {
                    current.extend(patch);
                    JsonValue::Object(current)
                }
                (_, value, _) => value,
            };
            self.assign(&mut entity, &name, value)?;
        }
        self.run_savers(&mut entity, Some(&previous), &saved)?;
        Ok(entity)
    }

    /// Drops legacy fields, splits off hook fields and checks the rest are writable
    fn validate(&self, input: &JsonMap, action: Action) -> Result<(JsonMap, JsonMap)> {
        let legacy = &self.settings().legacy_fields;
        let mut fields = JsonMap::new();
        let mut saved = JsonMap::new();
        for (name, value) in input {
            if legacy.contains(name.as_str()) {
                continue;
            }
            if self.savers.iter().any(|s| s.fields.iter().any(|f| f.as_str() == name.as_str())) {
                saved.insert(name.clone(), value.clone());
                continue;
            }
            let writable = match self.bags.resolve(name) {
                None => return Err(MongoqlError::invalid_column(self.model(), name, action.as_str())),
                Some(Resolved::Property(_)) => self.writable_properties && self.bags.is_writable(name),
                Some(_) => self.bags.is_writable(name),
            };
            if !writable {
                return Err(MongoqlError::Disabled(format!(
                    "{}: \"{}.{}\" is not writable",
                    action.as_str(),
                    self.model(),
                    name
                )));
            }
            fields.insert(name.clone(), value.clone());
        }
        Ok((fields, saved))
    }

    fn assign(&self, entity: &mut Entity, name: &str, value: JsonValue) -> Result<()> {
        match self.bags.property(name).and_then(|p| p.setter.clone()) {
            Some(setter) => setter(entity, value),
            None => {
                entity.set(name, value);
                Ok(())
            }
        }
    }

    fn run_savers(&self, entity: &mut Entity, previous: Option<&Entity>, saved: &JsonMap) -> Result<()> {
        for saver in &self.savers {
            let values: JsonMap = saver
                .fields
                .iter()
                .filter_map(|f| saved.get(f.as_str()).map(|v| (f.to_string(), v.clone())))
                .collect();
            if !values.is_empty() {
                (saver.hook)(entity, previous, &values)?;
            }
        }
        Ok(())
    }
}

/// Field policy of a [`StrictCrudHelper`]; loadable from JSON like [`QuerySettings`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrictSettings {
    /// Never written; everything else writable
    pub ro_fields: Option<Vec<CompactString>>,
    /// Only these (and `const_fields`) are written
    pub rw_fields: Option<Vec<CompactString>>,
    /// Written while the previous value is absent or null
    pub const_fields: Vec<CompactString>,
    /// Merged beneath every Query Object
    pub query_defaults: Option<JsonMap>,
}

impl StrictSettings {
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        Self::deserialize(value).map_err(|e| MongoqlError::Configuration(e.to_string()))
    }
}

/// A [`CrudHelper`] that silently drops read-only input and applies Query Object defaults
#[derive(Clone)]
pub struct StrictCrudHelper {
    crud: CrudHelper,
    ro_fields: HashSet<CompactString>,
    const_fields: HashSet<CompactString>,
    query_defaults: JsonMap,
}

impl StrictCrudHelper {
    pub fn new(crud: CrudHelper, settings: StrictSettings) -> Result<Self> {
        let bags = crud.bags().clone();
        let model = bags.model_name();
        let StrictSettings {
            ro_fields,
            rw_fields,
            const_fields,
            query_defaults,
        } = settings;

        let check = |names: &[CompactString], what: &str, writable: bool| -> Result<()> {
            match names
                .iter()
                .find(|n| if writable { !bags.is_writable(n) } else { !bags.contains(n) })
            {
                Some(name) => Err(MongoqlError::Configuration(format!(
                    "Unknown {what} entry \"{name}\" for \"{model}\""
                ))),
                None => Ok(()),
            }
        };
        check(&const_fields, "const_fields", true)?;

        let ro_fields: HashSet<CompactString> = match (ro_fields, rw_fields) {
            (Some(_), Some(_)) => {
                return Err(MongoqlError::Configuration(format!(
                    "Use either ro_fields or rw_fields for \"{model}\", not both"
                )));
            }
            (Some(ro), None) => {
                check(&ro, "ro_fields", false)?;
                ro.into_iter().collect()
            }
            (None, Some(rw)) => {
                check(&rw, "rw_fields", true)?;
                bags.all_names()
                    .filter(|n| !rw.iter().chain(&const_fields).any(|f| f.as_str() == *n))
                    .map(CompactString::from)
                    .collect()
            }
            (None, None) => HashSet::new(),
        };

        let query_defaults = query_defaults.unwrap_or_default();
        crud.query_model(&JsonValue::Object(query_defaults.clone()))
            .map_err(|e| MongoqlError::Configuration(format!("query_defaults for \"{model}\": {e}")))?;

        Ok(Self {
            crud,
            ro_fields,
            const_fields: const_fields.into_iter().collect(),
            query_defaults,
        })
    }

    #[inline]
    pub fn crud(&self) -> &CrudHelper {
        &self.crud
    }

    #[inline]
    pub fn is_read_only(&self, name: &str) -> bool {
        self.ro_fields.contains(name)
    }

    pub fn query_model(&self, query_object: &JsonValue) -> Result<MongoQuery> {
        match query_object {
            JsonValue::Object(user) if !self.query_defaults.is_empty() => {
                let mut merged = self.query_defaults.clone();
                merged.extend(user.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.crud.query_model(&JsonValue::Object(merged))
            }
            JsonValue::Null if !self.query_defaults.is_empty() => self
                .crud
                .query_model(&JsonValue::Object(self.query_defaults.clone())),
            _ => self.crud.query_model(query_object),
        }
    }

    pub fn create_model(&self, input: &JsonMap) -> Result<Entity> {
        let input = self.strip(input, None);
        self.crud.create_model(&input)
    }

    pub fn update_model(&self, input: &JsonMap, entity: Entity) -> Result<Entity> {
        let input = self.strip(input, Some(&entity));
        self.crud.update_model(&input, entity)
    }

    /// Drops read-only fields, and const fields that already hold a value
    fn strip(&self, input: &JsonMap, previous: Option<&Entity>) -> JsonMap {
        input
            .iter()
            .filter(|(name, _)| !self.ro_fields.contains(name.as_str()))
            .filter(|(name, _)| {
                !self.const_fields.contains(name.as_str())
                    || previous
                        .and_then(|e| e.get(name))
                        .is_none_or(JsonValue::is_null)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::model::{ColumnDef, ModelDef, PropertyDef, RelationDef};
    use mongoql_types::SqlType;
    use serde_json::json;
    use std::sync::Mutex;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(Dialect::SQLite)
                .model(
                    ModelDef::new("User", "users")
                        .column(ColumnDef::new("id", SqlType::Integer).primary_key())
                        .column(ColumnDef::new("login", SqlType::Text).nullable())
                        .column(ColumnDef::new("name", SqlType::Text))
                        .column(ColumnDef::new("data", SqlType::Json).nullable())
                        .relation(RelationDef::many("articles", "Article").on("uid", "id"))
                        .property(
                            PropertyDef::computed("shout", |user| user.get("name").cloned().unwrap_or_default())
                                .with_setter(|user, value| {
                                    let name = value.as_str().unwrap_or_default().to_uppercase();
                                    user.set("name", JsonValue::String(name));
                                    Ok(())
                                }),
                        )
                        .property(PropertyDef::computed("label", |_| JsonValue::Null)),
                )
                .model(
                    ModelDef::new("Article", "articles")
                        .column(ColumnDef::new("id", SqlType::Integer).primary_key())
                        .column(ColumnDef::new("uid", SqlType::Integer)),
                ),
        )
    }

    fn crud() -> CrudHelper {
        let mut settings = QuerySettings::default();
        settings.legacy_fields.insert("old".into());
        CrudHelper::new(schema(), "User", Arc::new(settings)).unwrap()
    }

    fn map(value: JsonValue) -> JsonMap {
        match value {
            JsonValue::Object(map) => map,
            _ => JsonMap::new(),
        }
    }

    #[test]
    fn test_create_model() {
        let crud = crud();
        let entity = crud
            .create_model(&map(json!({"name": "a", "old": 1, "data": {"x": 1}})))
            .unwrap();
        assert_eq!(entity.fields(), &map(json!({"name": "a", "data": {"x": 1}})));

        let entity = crud.create_model(&map(json!({"shout": "hey"}))).unwrap();
        assert_eq!(entity.get("name"), Some(&json!("HEY")));

        assert!(matches!(
            crud.create_model(&map(json!({"nope": 1}))),
            Err(MongoqlError::InvalidColumn { .. })
        ));
        assert!(matches!(
            crud.create_model(&map(json!({"label": 1}))),
            Err(MongoqlError::Disabled(_))
        ));
        assert!(matches!(
            crud.create_model(&map(json!({"articles": []}))),
            Err(MongoqlError::Disabled(_))
        ));
        assert!(matches!(
            crud.clone()
                .writable_properties(false)
                .create_model(&map(json!({"shout": "hey"}))),
            Err(MongoqlError::Disabled(_))
        ));
    }

    #[test]
    fn test_update_merges_json_objects() {
        let crud = crud();
        let entity = Entity::from_fields("User", map(json!({"id": 1, "name": "a", "data": {"x": 1, "y": 2}})));
        let entity = crud
            .update_model(&map(json!({"name": "b", "data": {"y": 3, "z": 4}})), entity)
            .unwrap();
        assert_eq!(entity.get("name"), Some(&json!("b")));
        assert_eq!(entity.get("data"), Some(&json!({"x": 1, "y": 3, "z": 4})));

        let entity = crud.update_model(&map(json!({"data": [1]})), entity).unwrap();
        assert_eq!(entity.get("data"), Some(&json!([1])));
    }

    #[test]
    fn test_saves_relations() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let crud = crud().saves_relations(["articles"], move |user, previous, values| {
            if let Ok(mut log) = log.lock() {
                log.push((previous.is_some(), JsonValue::Object(values.clone())));
            }
            user.set("saved", JsonValue::Bool(true));
            Ok(())
        });

        let entity = crud
            .create_model(&map(json!({"name": "a", "articles": [{"id": 1}]})))
            .unwrap();
        assert_eq!(entity.get("saved"), Some(&json!(true)));
        assert!(!entity.contains("articles"));

        crud.update_model(&map(json!({"name": "b"})), entity).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(false, json!({"articles": [{"id": 1}]}))]
        );
    }

    #[test]
    fn test_query_model() {
        let crud = crud();
        let compiled = crud.query_model(&json!({"project": ["name"]})).unwrap().end().unwrap();
        assert_eq!(compiled.sql(), r#"SELECT "t0"."id", "t0"."name" FROM "users" AS "t0""#);
        assert!(matches!(crud.query_model(&json!([])), Err(MongoqlError::InvalidQuery(_))));
    }

    #[test]
    fn test_strict_fields() {
        let strict = StrictCrudHelper::new(
            crud(),
            StrictSettings {
                ro_fields: Some(vec!["id".into()]),
                const_fields: vec!["login".into()],
                ..StrictSettings::default()
            },
        )
        .unwrap();

        let entity = strict
            .create_model(&map(json!({"id": 5, "login": "ann", "name": "a"})))
            .unwrap();
        assert_eq!(entity.fields(), &map(json!({"login": "ann", "name": "a"})));

        let entity = strict
            .update_model(&map(json!({"id": 6, "login": "bob", "name": "b"})), entity)
            .unwrap();
        assert_eq!(entity.get("login"), Some(&json!("ann")));
        assert_eq!(entity.get("name"), Some(&json!("b")));
        assert!(entity.get("id").is_none());

        let unset = Entity::from_fields("User", map(json!({"login": null})));
        let entity = strict.update_model(&map(json!({"login": "cid"})), unset).unwrap();
        assert_eq!(entity.get("login"), Some(&json!("cid")));
    }

    #[test]
    fn test_strict_rw_fields() {
        let strict = StrictCrudHelper::new(
            crud(),
            StrictSettings::from_json(&json!({"rw_fields": ["name"]})).unwrap(),
        )
        .unwrap();
        assert!(strict.is_read_only("login"));
        let entity = strict
            .create_model(&map(json!({"name": "a", "login": "x"})))
            .unwrap();
        assert_eq!(entity.fields(), &map(json!({"name": "a"})));
    }

    #[test]
    fn test_strict_configuration() {
        assert!(matches!(
            StrictCrudHelper::new(
                crud(),
                StrictSettings {
                    ro_fields: Some(vec![]),
                    rw_fields: Some(vec![]),
                    ..StrictSettings::default()
                }
            ),
            Err(MongoqlError::Configuration(_))
        ));
        assert!(matches!(
            StrictCrudHelper::new(
                crud(),
                StrictSettings {
                    const_fields: vec!["label".into()],
                    ..StrictSettings::default()
                }
            ),
            Err(MongoqlError::Configuration(_))
        ));
        assert!(matches!(
            StrictCrudHelper::new(
                crud(),
                StrictSettings::from_json(&json!({"query_defaults": {"sort": ["nope"]}})).unwrap()
            ),
            Err(MongoqlError::Configuration(_))
        ));
        assert!(matches!(
            StrictSettings::from_json(&json!({"rw": []})),
            Err(MongoqlError::Configuration(_))
        ));
    }

    #[test]
    fn test_query_defaults() {
        let strict = StrictCrudHelper::new(
            crud(),
            StrictSettings::from_json(&json!({"query_defaults": {"project": ["name"], "limit": 10}})).unwrap(),
        )
        .unwrap();
        let compiled = strict.query_model(&json!({"limit": 5})).unwrap().end().unwrap();
        assert_eq!(
            compiled.sql(),
            r#"SELECT "t0"."id", "t0"."name" FROM "users" AS "t0" LIMIT 5"#
        );
        let compiled = strict.query_model(&json!(null)).unwrap().end().unwrap();
        assert!(compiled.sql().ends_with("LIMIT 10"));
    }
}
