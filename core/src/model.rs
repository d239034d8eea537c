//! Model introspection: the column, relationship and property metadata the compiler
//! consumes. Models are registered by name in a [`Schema`], which also owns the
//! lazily built [`ModelBags`] of every model.

use crate::bag::ModelBags;
use crate::dialect::Dialect;
use crate::entity::Entity;
use crate::error::{MongoqlError, Result};
use crate::prelude::*;
use crate::sql::SQL;
use mongoql_types::SqlType;
use std::sync::OnceLock;

/// Builds a SQL expression for a table alias (column properties, hybrids, force filters)
pub type ExprFn = Arc<dyn Fn(&str) -> SQL + Send + Sync>;

/// Computes an application-side property from a loaded entity
pub type GetterFn = Arc<dyn Fn(&Entity) -> JsonValue + Send + Sync>;

/// Writes an application-side property onto an entity
pub type SetterFn = Arc<dyn Fn(&mut Entity, JsonValue) -> Result<()> + Send + Sync>;

/// Cardinality for runtime SQL generation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelCardinality {
    /// One-to-many: loads a list
    Many,
    /// Many-to-one with a non-null foreign key
    One,
    /// Many-to-one or one-to-one that may be missing
    OptionalOne,
}

impl RelCardinality {
    #[inline]
    pub const fn is_many(&self) -> bool {
        matches!(self, RelCardinality::Many)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: CompactString,
    pub ty: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<CompactString>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            primary_key: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    pub name: CompactString,
    /// Target model name, resolved through the [`Schema`]
    pub target: CompactString,
    pub cardinality: RelCardinality,
    /// Join column pairs. Each pair `(a, b)` generates `target."a" = parent."b"`.
    pub columns: Vec<(CompactString, CompactString)>,
}

impl RelationDef {
    pub fn many(name: impl Into<CompactString>, target: impl Into<CompactString>) -> Self {
        Self::new(name, target, RelCardinality::Many)
    }

    pub fn one(name: impl Into<CompactString>, target: impl Into<CompactString>) -> Self {
        Self::new(name, target, RelCardinality::One)
    }

    pub fn optional(name: impl Into<CompactString>, target: impl Into<CompactString>) -> Self {
        Self::new(name, target, RelCardinality::OptionalOne)
    }

    fn new(
        name: impl Into<CompactString>,
        target: impl Into<CompactString>,
        cardinality: RelCardinality,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality,
            columns: Vec::new(),
        }
    }

    /// Adds a join column pair: `target_column` on the related model equals `parent_column`
    pub fn on(
        mut self,
        target_column: impl Into<CompactString>,
        parent_column: impl Into<CompactString>,
    ) -> Self {
        self.columns.push((target_column.into(), parent_column.into()));
        self
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        !matches!(self.cardinality, RelCardinality::One)
    }
}

/// Non-column attributes of a model
#[derive(Clone)]
pub enum PropertyDef {
    /// SQL expression loaded together with the columns
    ColumnProperty {
        name: CompactString,
        ty: SqlType,
        expr: ExprFn,
    },
    /// SQL expression usable in filter/sort/group and loaded when projected
    Hybrid {
        name: CompactString,
        ty: SqlType,
        expr: ExprFn,
    },
    /// Application-side property computed from loaded attributes
    Computed {
        name: CompactString,
        getter: GetterFn,
        setter: Option<SetterFn>,
        depends_on: Vec<CompactString>,
    },
}

impl PropertyDef {
    pub fn column_property(
        name: impl Into<CompactString>,
        ty: SqlType,
        expr: impl Fn(&str) -> SQL + Send + Sync + 'static,
    ) -> Self {
        PropertyDef::ColumnProperty {
            name: name.into(),
            ty,
            expr: Arc::new(expr),
        }
    }

    pub fn hybrid(
        name: impl Into<CompactString>,
        ty: SqlType,
        expr: impl Fn(&str) -> SQL + Send + Sync + 'static,
    ) -> Self {
        PropertyDef::Hybrid {
            name: name.into(),
            ty,
            expr: Arc::new(expr),
        }
    }

    pub fn computed(
        name: impl Into<CompactString>,
        getter: impl Fn(&Entity) -> JsonValue + Send + Sync + 'static,
    ) -> Self {
        PropertyDef::Computed {
            name: name.into(),
            getter: Arc::new(getter),
            setter: None,
            depends_on: Vec::new(),
        }
    }

    /// Makes a computed property writable
    pub fn with_setter(
        self,
        f: impl Fn(&mut Entity, JsonValue) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        match self {
            PropertyDef::Computed {
                name,
                getter,
                depends_on,
                ..
            } => PropertyDef::Computed {
                name,
                getter,
                setter: Some(Arc::new(f)),
                depends_on,
            },
            other => other,
        }
    }

    /// Declares the attributes a computed property reads; they are loaded quietly
    /// whenever the property is projected
    pub fn depends_on<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        match self {
            PropertyDef::Computed {
                name,
                getter,
                setter,
                ..
            } => PropertyDef::Computed {
                name,
                getter,
                setter,
                depends_on: names.into_iter().map(Into::into).collect(),
            },
            other => other,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PropertyDef::ColumnProperty { name, .. }
            | PropertyDef::Hybrid { name, .. }
            | PropertyDef::Computed { name, .. } => name,
        }
    }
}

impl core::fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PropertyDef::ColumnProperty { name, ty, .. } => f
                .debug_struct("ColumnProperty")
                .field("name", name)
                .field("ty", ty)
                .finish_non_exhaustive(),
            PropertyDef::Hybrid { name, ty, .. } => f
                .debug_struct("Hybrid")
                .field("name", name)
                .field("ty", ty)
                .finish_non_exhaustive(),
            PropertyDef::Computed {
                name,
                setter,
                depends_on,
                ..
            } => f
                .debug_struct("Computed")
                .field("name", name)
                .field("writable", &setter.is_some())
                .field("depends_on", depends_on)
                .finish_non_exhaustive(),
        }
    }
}

/// A model description: table, columns, relationships and properties
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub name: CompactString,
    pub table: CompactString,
    pub columns: Vec<ColumnDef>,
    pub relations: Vec<RelationDef>,
    pub properties: Vec<PropertyDef>,
}

impl ModelDef {
    pub fn new(name: impl Into<CompactString>, table: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            relations: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }
}

struct ModelEntry {
    def: ModelDef,
    bags: OnceLock<Arc<ModelBags>>,
}

/// Registry of models for one database.
///
/// Property bags are built on first use and cached for the lifetime of the schema;
/// relation targets are looked up by name, so models may reference each other in cycles.
pub struct Schema {
    dialect: Dialect,
    models: HashMap<CompactString, ModelEntry>,
}

impl Schema {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            models: HashMap::new(),
        }
    }

    /// Registers a model, replacing any model with the same name
    pub fn model(mut self, def: ModelDef) -> Self {
        self.models.insert(
            def.name.clone(),
            ModelEntry {
                def,
                bags: OnceLock::new(),
            },
        );
        self
    }

    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn definition(&self, model: &str) -> Option<&ModelDef> {
        self.models.get(model).map(|entry| &entry.def)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(CompactString::as_str)
    }

    /// Property bags of a model, built once
    pub fn bags(&self, model: &str) -> Result<Arc<ModelBags>> {
        let entry = self
            .models
            .get(model)
            .ok_or_else(|| MongoqlError::Configuration(format!("Unknown model \"{model}\"")))?;
        if let Some(bags) = entry.bags.get() {
            return Ok(bags.clone());
        }
        let built = Arc::new(ModelBags::build(&entry.def, self)?);
        Ok(entry.bags.get_or_init(|| built).clone())
    }
}

impl core::fmt::Debug for Schema {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<_> = self.models.keys().collect();
        names.sort();
        f.debug_struct("Schema")
            .field("dialect", &self.dialect)
            .field("models", &names)
            .finish()
    }
}
