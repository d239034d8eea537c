//! `project`: which attributes are loaded and which are shown.
//!
//! Inclusion mode lists the attributes to show; exclusion mode lists the ones to hide.
//! Attributes loaded only because something else needs them (the primary key, bundled
//! columns, computed-property dependencies, `ensure_loaded`) are "quiet": selected from the
//! database but not part of the projection.

use super::{HandlerContext, parse_flag, parse_name_list};
use crate::bag::{BagKind, ColumnInfo, HybridInfo, Lookup, ModelBags};
use crate::error::{MongoqlError, Result};
use crate::prelude::*;

pub(crate) const PROJECT_BAGS: &[BagKind] = &[
    BagKind::Columns,
    BagKind::ColumnProperties,
    BagKind::Hybrid,
    BagKind::Properties,
    BagKind::Relations,
    BagKind::Legacy,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Include,
    Exclude,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectHandler {
    shown: HashSet<CompactString>,
    quiet: HashSet<CompactString>,
    relations: Vec<CompactString>,
}

/// Splits a projection into its mode and the names it mentions
fn parse_projection(
    raw: &JsonValue,
    bags: &ModelBags,
    legacy: &HashSet<CompactString>,
) -> Result<(Mode, Vec<(CompactString, bool)>)> {
    match raw {
        JsonValue::Object(map) => {
            let entries = map
                .iter()
                .map(|(name, flag)| {
                    parse_flag(flag)
                        .map(|flag| (CompactString::from(name.as_str()), flag))
                        .ok_or_else(|| {
                            MongoqlError::InvalidQuery(format!(
                                "project: \"{name}\" must be 1 or 0, got {flag}"
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            let included = entries.iter().filter(|(_, flag)| *flag).count();
            if entries.is_empty() || included == entries.len() {
                return Ok((Mode::Include, entries));
            }
            if included == 0 {
                return Ok((Mode::Exclude, entries));
            }

            // Mixed flags are only unambiguous when every attribute is mentioned
            let complete = {
                let mentioned: HashSet<&str> = entries
                    .iter()
                    .filter(|(name, _)| bags.relation(name).is_none() && !legacy.contains(name))
                    .map(|(name, _)| name.as_str())
                    .collect();
                bags.projectable_names().all(|name| mentioned.contains(name))
                    && mentioned.len() == bags.projectable_names().count()
            };
            if !complete {
                return Err(MongoqlError::InvalidQuery(
                    "project: cannot mix inclusion and exclusion unless every attribute is listed".into(),
                ));
            }
            Ok((
                Mode::Include,
                entries.into_iter().filter(|(_, flag)| *flag).collect(),
            ))
        }
        other => Ok((
            Mode::Include,
            parse_name_list(other, "project")?
                .into_iter()
                .map(|name| (name, true))
                .collect(),
        )),
    }
}

impl ProjectHandler {
    /// Applies a projection; `None` falls back to the default projection
    pub fn input(&mut self, ctx: &HandlerContext<'_>, raw: Option<&JsonValue>) -> Result<()> {
        crate::mongoql_trace_handler!("project", ctx.model());
        let settings = ctx.settings;
        let bags = ctx.bags;

        let raw = match raw {
            None | Some(JsonValue::Null) => settings.default_projection.as_ref(),
            Some(raw) => Some(raw),
        };
        let (mode, entries) = match raw {
            Some(raw) => parse_projection(raw, bags, &settings.legacy_fields)?,
            None => (Mode::Exclude, Vec::new()),
        };

        let bag = ctx.combined(PROJECT_BAGS);
        let mut explicit: HashSet<CompactString> = HashSet::with_capacity(entries.len());
        for (name, flag) in entries {
            match bag.resolve(&name, "project")? {
                (_, Lookup::Legacy) => {}
                (_, Lookup::Relation(_)) => {
                    if flag && !self.relations.contains(&name) {
                        self.relations.push(name);
                    }
                }
                _ => {
                    if mode == Mode::Include && settings.force_exclude.contains(&name) {
                        return Err(MongoqlError::Disabled(format!(
                            "project: attribute \"{}.{}\" is excluded by settings",
                            ctx.model(),
                            name
                        )));
                    }
                    explicit.insert(name);
                }
            }
        }

        let mut shown: HashSet<CompactString> = match mode {
            Mode::Include => explicit,
            Mode::Exclude => bags
                .projectable_names()
                .filter(|name| !explicit.contains(*name))
                .filter(|name| !settings.default_exclude.iter().any(|n| n == name))
                .filter(|name| {
                    !settings.default_exclude_properties
                        || !bags.is_computed(name)
                        || settings.default_unexclude_properties.iter().any(|n| n == name)
                })
                .map(CompactString::from)
                .collect(),
        };
        shown.extend(settings.force_include.iter().cloned());
        for name in &settings.force_exclude {
            shown.remove(name);
        }
        self.shown = shown;

        self.quiet.extend(bags.pk().iter().cloned());
        let shown: Vec<CompactString> = self.shown.iter().cloned().collect();
        for name in shown {
            self.load_dependencies(ctx, &name);
        }
        Ok(())
    }

    /// Bundled columns and computed-property dependencies of `name`
    fn load_dependencies(&mut self, ctx: &HandlerContext<'_>, name: &str) {
        if let Some(bundle) = ctx.settings.bundled_project.get(name) {
            self.quiet.extend(bundle.iter().cloned());
        }
        if let Some(property) = ctx.bags.property(name) {
            self.quiet.extend(property.depends_on.iter().cloned());
        }
    }

    /// Loads an attribute quietly
    pub fn ensure(&mut self, ctx: &HandlerContext<'_>, name: &str) -> Result<()> {
        match ctx.combined(PROJECT_BAGS).resolve(name, "ensure_loaded")? {
            (_, Lookup::Legacy) => return Ok(()),
            (_, Lookup::Relation(_)) => {
                return Err(MongoqlError::invalid_column(ctx.model(), name, "ensure_loaded"));
            }
            _ => {}
        }
        self.quiet.insert(name.into());
        self.load_dependencies(ctx, name);
        Ok(())
    }

    /// Relations named in the projection, to be joined
    pub fn relations(&self) -> &[CompactString] {
        &self.relations
    }

    #[inline]
    pub fn is_shown(&self, name: &str) -> bool {
        self.shown.contains(name)
    }

    #[inline]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.shown.contains(name) || self.quiet.contains(name)
    }

    /// Shown attribute names in definition order
    pub fn shown<'a>(&'a self, bags: &'a ModelBags) -> impl Iterator<Item = &'a str> + 'a {
        bags.projectable_names().filter(|name| self.shown.contains(*name))
    }

    /// Columns and column properties to select, in definition order
    pub fn loaded_columns<'a>(&'a self, bags: &'a ModelBags) -> impl Iterator<Item = &'a ColumnInfo> + 'a {
        bags.columns().filter(|c| self.is_loaded(&c.name))
    }

    /// Hybrid expressions to select
    pub fn loaded_hybrids<'a>(&'a self, bags: &'a ModelBags) -> impl Iterator<Item = &'a HybridInfo> + 'a {
        bags.hybrids().filter(|h| self.is_loaded(&h.name))
    }

    /// Computed properties to evaluate after loading
    pub fn loaded_properties<'a>(&'a self, bags: &'a ModelBags) -> impl Iterator<Item = &'a str> + 'a {
        bags.properties()
            .filter(|p| self.is_loaded(&p.name))
            .map(|p| p.name.as_str())
    }

    /// `{name: 1}` for every shown attribute
    pub fn normalized(&self, bags: &ModelBags) -> JsonValue {
        JsonValue::Object(
            self.shown(bags)
                .map(|name| (name.to_string(), JsonValue::from(1)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests_support::fixture;
    use crate::settings::QuerySettings;
    use serde_json::json;

    fn project(settings: QuerySettings, raw: Option<JsonValue>) -> Result<JsonValue> {
        let fx = fixture().with_settings(settings);
        let ctx = fx.ctx("User");
        let mut handler = ProjectHandler::default();
        handler.input(&ctx, raw.as_ref())?;
        Ok(handler.normalized(ctx.bags))
    }

    #[test]
    fn test_equivalent_encodings() {
        let expected = json!({"id": 1, "name": 1});
        let settings = QuerySettings::default;
        assert_eq!(project(settings(), Some(json!("name id"))).unwrap(), expected);
        assert_eq!(project(settings(), Some(json!(["id", "name"]))).unwrap(), expected);
        assert_eq!(project(settings(), Some(json!({"name": 1, "id": true}))).unwrap(), expected);
    }

    #[test]
    fn test_exclusion() {
        assert_eq!(
            project(QuerySettings::default(), Some(json!({"tags": 0, "data": 0}))).unwrap(),
            json!({"id": 1, "name": 1, "age": 1})
        );
        // properties and hybrids are excluded unless asked for
        assert_eq!(
            project(QuerySettings::default(), None).unwrap(),
            json!({"id": 1, "name": 1, "age": 1, "tags": 1, "data": 1})
        );
        let settings = QuerySettings {
            default_unexclude_properties: vec!["greeting".into()],
            default_exclude: vec!["data".into()],
            ..QuerySettings::default()
        };
        assert_eq!(
            project(settings, None).unwrap(),
            json!({"id": 1, "name": 1, "age": 1, "tags": 1, "greeting": 1})
        );
    }

    #[test]
    fn test_mixed_flags() {
        assert!(matches!(
            project(QuerySettings::default(), Some(json!({"name": 1, "age": 0}))),
            Err(MongoqlError::InvalidQuery(_))
        ));
        let full = json!({
            "id": 1, "name": 1, "age": 0, "tags": 0, "data": 0, "age_next": 0, "greeting": 1
        });
        assert_eq!(
            project(QuerySettings::default(), Some(full)).unwrap(),
            json!({"id": 1, "name": 1, "greeting": 1})
        );
    }

    #[test]
    fn test_force_lists_and_default_projection() {
        let settings = QuerySettings {
            default_projection: Some(json!(["name"])),
            force_include: vec!["age".into()],
            force_exclude: vec!["data".into()],
            ..QuerySettings::default()
        };
        assert_eq!(
            project(settings.clone(), None).unwrap(),
            json!({"name": 1, "age": 1})
        );
        assert!(matches!(
            project(settings, Some(json!(["data"]))),
            Err(MongoqlError::Disabled(_))
        ));
    }

    #[test]
    fn test_quiet_loads_and_relations() {
        let fx = fixture();
        let ctx = fx.ctx("User");
        let mut handler = ProjectHandler::default();
        handler.input(&ctx, Some(&json!(["greeting", "articles"]))).unwrap();
        assert_eq!(handler.relations(), ["articles"]);
        assert_eq!(handler.normalized(ctx.bags), json!({"greeting": 1}));
        let loaded: Vec<&str> = handler.loaded_columns(ctx.bags).map(|c| c.name.as_str()).collect();
        assert_eq!(loaded, ["id", "name"]);

        handler.ensure(&ctx, "age").unwrap();
        assert!(handler.is_loaded("age") && !handler.is_shown("age"));
        assert!(matches!(
            handler.ensure(&ctx, "nope"),
            Err(MongoqlError::InvalidColumn { .. })
        ));
    }

    #[test]
    fn test_legacy_names_are_ignored() {
        let legacy = || QuerySettings {
            legacy_fields: ["old".into()].into_iter().collect(),
            ..QuerySettings::default()
        };
        assert_eq!(
            project(legacy(), Some(json!(["name", "old"]))).unwrap(),
            json!({"name": 1})
        );
        assert_eq!(
            project(legacy(), Some(json!({"old": 0, "tags": 0, "data": 0}))).unwrap(),
            json!({"id": 1, "name": 1, "age": 1})
        );

        let fx = fixture().with_settings(legacy());
        let ctx = fx.ctx("User");
        let mut handler = ProjectHandler::default();
        handler.input(&ctx, Some(&json!(["name"]))).unwrap();
        handler.ensure(&ctx, "old").unwrap();
        assert!(!handler.is_loaded("old"));
        let loaded: Vec<&str> = handler.loaded_columns(ctx.bags).map(|c| c.name.as_str()).collect();
        assert_eq!(loaded, ["id", "name"]);
    }

    #[test]
    fn test_unknown_names() {
        assert!(matches!(
            project(QuerySettings::default(), Some(json!(["nope"]))),
            Err(MongoqlError::InvalidColumn { .. })
        ));
        assert!(matches!(
            project(QuerySettings::default(), Some(json!({"name": 2}))),
            Err(MongoqlError::InvalidQuery(_))
        ));
    }
}
