//! Property bags: per-model classification of attributes.
//!
//! A [`ModelBags`] is built once per model from its [`ModelDef`] and answers
//! "what is this name?" for every handler. [`CombinedBag`] restricts a lookup
//! to the categories a Query Object section accepts and reports which one matched.

use crate::error::{MongoqlError, Result};
use crate::model::{ExprFn, GetterFn, ModelDef, PropertyDef, RelationDef, Schema, SetterFn};
use crate::prelude::*;
use crate::sql::SQL;
use mongoql_types::SqlType;

/// Category tag every handler dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Column,
    ArrayColumn,
    JsonColumn,
    ColumnProperty,
    Relationship,
    Property,
    Hybrid,
    RelatedColumn,
    JsonPath,
    Legacy,
}

/// A loadable column: a table column or a column property expression
#[derive(Clone)]
pub struct ColumnInfo {
    pub name: CompactString,
    pub ty: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    expr: Option<ExprFn>,
}

impl ColumnInfo {
    #[inline]
    pub fn is_array(&self) -> bool {
        self.ty.is_array()
    }

    #[inline]
    pub fn is_json(&self) -> bool {
        self.ty.is_json()
    }

    #[inline]
    pub fn is_column_property(&self) -> bool {
        self.expr.is_some()
    }

    pub fn category(&self) -> Category {
        if self.expr.is_some() {
            Category::ColumnProperty
        } else if self.is_array() {
            Category::ArrayColumn
        } else if self.is_json() {
            Category::JsonColumn
        } else {
            Category::Column
        }
    }

    /// Column expression for a table alias
    pub fn sql(&self, alias: &str) -> SQL {
        match &self.expr {
            Some(expr) => expr(alias),
            None => SQL::column(alias, self.name.clone()),
        }
    }
}

impl core::fmt::Debug for ColumnInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ColumnInfo")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("nullable", &self.nullable)
            .field("primary_key", &self.primary_key)
            .field("column_property", &self.expr.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct HybridInfo {
    pub name: CompactString,
    pub ty: SqlType,
    expr: ExprFn,
}

impl HybridInfo {
    pub fn sql(&self, alias: &str) -> SQL {
        (self.expr)(alias)
    }
}

#[derive(Clone)]
pub struct ComputedInfo {
    pub name: CompactString,
    pub depends_on: Vec<CompactString>,
    pub(crate) getter: GetterFn,
    pub(crate) setter: Option<SetterFn>,
}

impl ComputedInfo {
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Column(usize),
    Relation(usize),
    Hybrid(usize),
    Property(usize),
}

/// Result of resolving a plain (undotted) name
#[derive(Clone, Copy)]
pub enum Resolved<'a> {
    Column(&'a ColumnInfo),
    Relation(&'a RelationDef),
    Hybrid(&'a HybridInfo),
    Property(&'a ComputedInfo),
}

impl Resolved<'_> {
    pub fn category(&self) -> Category {
        match self {
            Resolved::Column(column) => column.category(),
            Resolved::Relation(_) => Category::Relationship,
            Resolved::Hybrid(_) => Category::Hybrid,
            Resolved::Property(_) => Category::Property,
        }
    }
}

/// Classified attributes of one model
pub struct ModelBags {
    model_name: CompactString,
    table: CompactString,
    columns: Vec<ColumnInfo>,
    relations: Vec<RelationDef>,
    hybrids: Vec<HybridInfo>,
    properties: Vec<ComputedInfo>,
    index: HashMap<CompactString, Slot>,
    pk: Vec<CompactString>,
}

impl ModelBags {
    pub(crate) fn build(def: &ModelDef, schema: &Schema) -> Result<Self> {
        let mut bags = ModelBags {
            model_name: def.name.clone(),
            table: def.table.clone(),
            columns: Vec::with_capacity(def.columns.len()),
            relations: Vec::with_capacity(def.relations.len()),
            hybrids: Vec::new(),
            properties: Vec::new(),
            index: HashMap::new(),
            pk: Vec::new(),
        };

        for column in &def.columns {
            bags.register(&column.name, Slot::Column(bags.columns.len()))?;
            if column.primary_key {
                bags.pk.push(column.name.clone());
            }
            bags.columns.push(ColumnInfo {
                name: column.name.clone(),
                ty: column.ty.clone(),
                nullable: column.nullable,
                primary_key: column.primary_key,
                expr: None,
            });
        }

        for property in &def.properties {
            match property {
                PropertyDef::ColumnProperty { name, ty, expr } => {
                    bags.register(name, Slot::Column(bags.columns.len()))?;
                    bags.columns.push(ColumnInfo {
                        name: name.clone(),
                        ty: ty.clone(),
                        nullable: true,
                        primary_key: false,
                        expr: Some(expr.clone()),
                    });
                }
                PropertyDef::Hybrid { name, ty, expr } => {
                    bags.register(name, Slot::Hybrid(bags.hybrids.len()))?;
                    bags.hybrids.push(HybridInfo {
                        name: name.clone(),
                        ty: ty.clone(),
                        expr: expr.clone(),
                    });
                }
                PropertyDef::Computed {
                    name,
                    getter,
                    setter,
                    depends_on,
                } => {
                    bags.register(name, Slot::Property(bags.properties.len()))?;
                    bags.properties.push(ComputedInfo {
                        name: name.clone(),
                        depends_on: depends_on.clone(),
                        getter: getter.clone(),
                        setter: setter.clone(),
                    });
                }
            }
        }

        for relation in &def.relations {
            let target = schema.definition(&relation.target).ok_or_else(|| {
                MongoqlError::Configuration(format!(
                    "Relation \"{}.{}\" targets unknown model \"{}\"",
                    def.name, relation.name, relation.target
                ))
            })?;
            if relation.columns.is_empty() {
                return Err(MongoqlError::Configuration(format!(
                    "Relation \"{}.{}\" has no join columns",
                    def.name, relation.name
                )));
            }
            for (target_column, parent_column) in &relation.columns {
                let parent_ok = def.columns.iter().any(|c| c.name == *parent_column);
                let target_ok = target.columns.iter().any(|c| c.name == *target_column);
                if !parent_ok || !target_ok {
                    return Err(MongoqlError::Configuration(format!(
                        "Relation \"{}.{}\" joins on unknown columns {}.{} = {}.{}",
                        def.name,
                        relation.name,
                        target.name,
                        target_column,
                        def.name,
                        parent_column
                    )));
                }
            }
            bags.register(&relation.name, Slot::Relation(bags.relations.len()))?;
            bags.relations.push(relation.clone());
        }

        if bags.pk.is_empty() {
            return Err(MongoqlError::Configuration(format!(
                "Model \"{}\" has no primary key",
                def.name
            )));
        }

        for property in &bags.properties {
            for dependency in &property.depends_on {
                if !matches!(bags.index.get(dependency), Some(Slot::Column(_))) {
                    return Err(MongoqlError::Configuration(format!(
                        "Property \"{}.{}\" depends on unknown column \"{}\"",
                        def.name, property.name, dependency
                    )));
                }
            }
        }

        Ok(bags)
    }

    fn register(&mut self, name: &CompactString, slot: Slot) -> Result<()> {
        if name.contains('.') || name.is_empty() {
            return Err(MongoqlError::Configuration(format!(
                "Invalid attribute name \"{name}\" on \"{}\"",
                self.model_name
            )));
        }
        if self.index.insert(name.clone(), slot).is_some() {
            return Err(MongoqlError::Configuration(format!(
                "Duplicate attribute \"{name}\" on \"{}\"",
                self.model_name
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[inline]
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter()
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations.iter()
    }

    pub fn hybrids(&self) -> impl Iterator<Item = &HybridInfo> {
        self.hybrids.iter()
    }

    pub fn properties(&self) -> impl Iterator<Item = &ComputedInfo> {
        self.properties.iter()
    }

    /// Primary key column names
    pub fn pk(&self) -> &[CompactString] {
        &self.pk
    }

    pub fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        Some(match *self.index.get(name)? {
            Slot::Column(i) => Resolved::Column(&self.columns[i]),
            Slot::Relation(i) => Resolved::Relation(&self.relations[i]),
            Slot::Hybrid(i) => Resolved::Hybrid(&self.hybrids[i]),
            Slot::Property(i) => Resolved::Property(&self.properties[i]),
        })
    }

    pub fn category(&self, name: &str) -> Option<Category> {
        self.resolve(name).map(|r| r.category())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        match self.resolve(name)? {
            Resolved::Column(column) => Some(column),
            _ => None,
        }
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        match self.resolve(name)? {
            Resolved::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&ComputedInfo> {
        match self.resolve(name)? {
            Resolved::Property(property) => Some(property),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Table columns (not column properties) and writable computed properties
    pub fn is_writable(&self, name: &str) -> bool {
        match self.resolve(name) {
            Some(Resolved::Column(column)) => !column.is_column_property(),
            Some(Resolved::Property(property)) => property.is_writable(),
            _ => false,
        }
    }

    /// Every attribute that can appear in a projection, in definition order:
    /// columns, column properties, hybrids and computed properties
    pub fn projectable_names(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.hybrids.iter().map(|h| h.name.as_str()))
            .chain(self.properties.iter().map(|p| p.name.as_str()))
    }

    /// Every attribute name, relations included
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        self.projectable_names()
            .chain(self.relations.iter().map(|r| r.name.as_str()))
    }

    /// Names that hold computed values (hybrids and computed properties)
    pub fn is_computed(&self, name: &str) -> bool {
        matches!(
            self.resolve(name),
            Some(Resolved::Hybrid(_) | Resolved::Property(_))
        )
    }
}

impl core::fmt::Debug for ModelBags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModelBags")
            .field("model", &self.model_name)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("relations", &self.relations)
            .field(
                "hybrids",
                &self.hybrids.iter().map(|h| &h.name).collect::<Vec<_>>(),
            )
            .field(
                "properties",
                &self.properties.iter().map(|p| &p.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Sub-bags a [`CombinedBag`] may consult
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BagKind {
    Columns,
    ColumnProperties,
    Hybrid,
    Properties,
    Relations,
    RelatedColumns,
    JsonPaths,
    Legacy,
}

/// Result of a [`CombinedBag`] lookup
pub enum Lookup<'a> {
    Column(&'a ColumnInfo),
    Hybrid(&'a HybridInfo),
    Property(&'a ComputedInfo),
    Relation(&'a RelationDef),
    /// `data.rating.0`: a JSON column plus the residual traversal path
    JsonPath {
        column: &'a ColumnInfo,
        path: Vec<CompactString>,
    },
    /// `articles.title`: a relation plus the path to resolve on the target model
    RelatedColumn {
        relation: &'a RelationDef,
        target: Arc<ModelBags>,
        rest: CompactString,
    },
    Legacy,
}

impl Lookup<'_> {
    pub fn category(&self) -> Category {
        match self {
            Lookup::Column(column) => column.category(),
            Lookup::Hybrid(_) => Category::Hybrid,
            Lookup::Property(_) => Category::Property,
            Lookup::Relation(_) => Category::Relationship,
            Lookup::JsonPath { .. } => Category::JsonPath,
            Lookup::RelatedColumn { .. } => Category::RelatedColumn,
            Lookup::Legacy => Category::Legacy,
        }
    }
}

/// A view over several sub-bags of one model
pub struct CombinedBag<'a> {
    schema: &'a Schema,
    bags: &'a ModelBags,
    kinds: &'a [BagKind],
    legacy: &'a HashSet<CompactString>,
}

impl<'a> CombinedBag<'a> {
    pub fn new(
        schema: &'a Schema,
        bags: &'a ModelBags,
        kinds: &'a [BagKind],
        legacy: &'a HashSet<CompactString>,
    ) -> Self {
        Self {
            schema,
            bags,
            kinds,
            legacy,
        }
    }

    #[inline]
    fn accepts(&self, kind: BagKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Resolves `name` against the enabled sub-bags.
    ///
    /// `location` names the Query Object section for error messages.
    pub fn resolve(&self, name: &str, location: &str) -> Result<(BagKind, Lookup<'a>)> {
        let model = self.bags.model_name();
        let invalid = || MongoqlError::invalid_column(model, name, location);

        if self.accepts(BagKind::Legacy) && self.legacy.contains(name) {
            return Ok((BagKind::Legacy, Lookup::Legacy));
        }

        let Some((head, rest)) = name.split_once('.') else {
            return match self.bags.resolve(name).ok_or_else(invalid)? {
                Resolved::Column(column) if column.is_column_property() => {
                    if self.accepts(BagKind::ColumnProperties) {
                        Ok((BagKind::ColumnProperties, Lookup::Column(column)))
                    } else {
                        Err(invalid())
                    }
                }
                Resolved::Column(column) if self.accepts(BagKind::Columns) => {
                    Ok((BagKind::Columns, Lookup::Column(column)))
                }
                Resolved::Hybrid(hybrid) if self.accepts(BagKind::Hybrid) => {
                    Ok((BagKind::Hybrid, Lookup::Hybrid(hybrid)))
                }
                Resolved::Property(property) if self.accepts(BagKind::Properties) => {
                    Ok((BagKind::Properties, Lookup::Property(property)))
                }
                Resolved::Relation(relation) if self.accepts(BagKind::Relations) => {
                    Ok((BagKind::Relations, Lookup::Relation(relation)))
                }
                _ => Err(invalid()),
            };
        };

        match self.bags.resolve(head) {
            Some(Resolved::Relation(relation)) if self.accepts(BagKind::RelatedColumns) => {
                if rest.is_empty() {
                    return Err(invalid());
                }
                let target = self.schema.bags(&relation.target)?;
                Ok((
                    BagKind::RelatedColumns,
                    Lookup::RelatedColumn {
                        relation,
                        target,
                        rest: rest.into(),
                    },
                ))
            }
            Some(Resolved::Column(column))
                if column.is_json() && self.accepts(BagKind::JsonPaths) =>
            {
                let path = parse_json_path(rest, name)?;
                Ok((BagKind::JsonPaths, Lookup::JsonPath { column, path }))
            }
            None if self.accepts(BagKind::RelatedColumns) => {
                Err(MongoqlError::invalid_relation(model, head, location))
            }
            _ => Err(invalid()),
        }
    }
}

fn parse_json_path(rest: &str, full: &str) -> Result<Vec<CompactString>> {
    rest.split('.')
        .map(|segment| {
            let valid = !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
            if valid {
                Ok(CompactString::from(segment))
            } else {
                Err(MongoqlError::InvalidQuery(format!(
                    "Invalid JSON path \"{full}\""
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDef, RelationDef};
    use mongoql_types::Dialect;

    fn schema() -> Schema {
        Schema::new(Dialect::SQLite)
            .model(
                ModelDef::new("User", "users")
                    .column(ColumnDef::new("id", SqlType::Integer).primary_key())
                    .column(ColumnDef::new("name", SqlType::Text))
                    .column(ColumnDef::new("tags", SqlType::array(SqlType::Text)).nullable())
                    .column(ColumnDef::new("data", SqlType::Json).nullable())
                    .relation(RelationDef::many("articles", "Article").on("uid", "id"))
                    .property(PropertyDef::computed("greeting", |_| JsonValue::Null)),
            )
            .model(
                ModelDef::new("Article", "articles")
                    .column(ColumnDef::new("id", SqlType::Integer).primary_key())
                    .column(ColumnDef::new("uid", SqlType::Integer)),
            )
    }

    #[test]
    fn test_categories() {
        let schema = schema();
        let bags = schema.bags("User").unwrap();
        assert_eq!(bags.category("id"), Some(Category::Column));
        assert_eq!(bags.category("tags"), Some(Category::ArrayColumn));
        assert_eq!(bags.category("data"), Some(Category::JsonColumn));
        assert_eq!(bags.category("articles"), Some(Category::Relationship));
        assert_eq!(bags.category("greeting"), Some(Category::Property));
        assert_eq!(bags.pk().len(), 1);
        assert_eq!(bags.pk()[0].as_str(), "id");
        assert!(bags.is_writable("name"));
        assert!(!bags.is_writable("greeting"));
    }

    #[test]
    fn test_bags_are_cached() {
        let schema = schema();
        let a = schema.bags("User").unwrap();
        let b = schema.bags("User").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_combined_dot_paths() {
        let schema = schema();
        let bags = schema.bags("User").unwrap();
        let legacy = HashSet::new();
        let kinds = [
            BagKind::Columns,
            BagKind::RelatedColumns,
            BagKind::JsonPaths,
        ];
        let combined = CombinedBag::new(&schema, &bags, &kinds, &legacy);

        let (kind, lookup) = combined.resolve("articles.id", "filter").unwrap();
        assert_eq!(kind, BagKind::RelatedColumns);
        assert!(matches!(lookup, Lookup::RelatedColumn { ref rest, .. } if rest.as_str() == "id"));

        let (kind, lookup) = combined.resolve("data.rating.0", "filter").unwrap();
        assert_eq!(kind, BagKind::JsonPaths);
        assert!(matches!(lookup, Lookup::JsonPath { ref path, .. } if path.len() == 2));

        assert!(matches!(
            combined.resolve("address.zip", "filter"),
            Err(MongoqlError::InvalidRelation { .. })
        ));
        assert!(matches!(
            combined.resolve("greeting", "filter"),
            Err(MongoqlError::InvalidColumn { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let schema = Schema::new(Dialect::SQLite).model(
            ModelDef::new("T", "t")
                .column(ColumnDef::new("id", SqlType::Integer).primary_key())
                .property(PropertyDef::computed("id", |_| JsonValue::Null)),
        );
        assert!(matches!(
            schema.bags("T"),
            Err(MongoqlError::Configuration(_))
        ));
    }
}
