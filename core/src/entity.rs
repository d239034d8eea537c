//! Loaded or constructed model instances.

use crate::bag::ModelBags;
use crate::error::{MongoqlError, Result};
use crate::prelude::*;
use serde::{Serialize, Serializer};

/// An instance of a model: attribute name to JSON value.
///
/// Entities fetched by a [`CompiledQuery`](crate::query::CompiledQuery) carry the raiseload
/// policy of their query; [`Entity::try_get`] then reports attributes that were never
/// loaded instead of silently returning `None`.
#[derive(Clone)]
pub struct Entity {
    model: CompactString,
    fields: JsonMap,
    raiseload: Option<Raiseload>,
}

#[derive(Clone)]
struct Raiseload {
    bags: Arc<ModelBags>,
    columns: bool,
    relations: bool,
}

impl Entity {
    pub fn new(model: impl Into<CompactString>) -> Self {
        Self {
            model: model.into(),
            fields: JsonMap::new(),
            raiseload: None,
        }
    }

    pub fn from_fields(model: impl Into<CompactString>, fields: JsonMap) -> Self {
        Self {
            model: model.into(),
            fields,
            raiseload: None,
        }
    }

    pub(crate) fn with_raiseload(mut self, bags: Arc<ModelBags>, columns: bool, relations: bool) -> Self {
        if columns || relations {
            self.raiseload = Some(Raiseload {
                bags,
                columns,
                relations,
            });
        }
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }

    /// Like [`Entity::get`], but fails with [`MongoqlError::NotLoaded`] when the attribute
    /// was not loaded and the query raises on unloaded attributes of its kind
    pub fn try_get(&self, name: &str) -> Result<Option<&JsonValue>> {
        if let Some(value) = self.fields.get(name) {
            return Ok(Some(value));
        }
        let Some(raiseload) = &self.raiseload else {
            return Ok(None);
        };
        let raises = if raiseload.bags.relation(name).is_some() {
            raiseload.relations
        } else {
            raiseload.columns && raiseload.bags.contains(name)
        };
        if raises {
            Err(MongoqlError::NotLoaded {
                model: self.model.clone(),
                field: name.into(),
            })
        } else {
            Ok(None)
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: JsonValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<JsonValue> {
        self.fields.remove(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    #[inline]
    pub fn fields(&self) -> &JsonMap {
        &self.fields
    }

    #[inline]
    pub fn into_fields(self) -> JsonMap {
        self.fields
    }
}

impl core::fmt::Debug for Entity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.model)
            .field("fields", &self.fields)
            .finish()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model && self.fields == other.fields
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}
