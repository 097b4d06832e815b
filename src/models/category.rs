//! Category model

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::fields::{
    format_datetime, into_record, now, require_non_blank, EntitySchema, FieldDef, FieldKind,
    Record, RecordReader, SqlLayout,
};
use super::{Entity, EntityKind};
use crate::error::AppResult;

static CATEGORY_FIELDS: [FieldDef; 6] = [
    FieldDef::new("id", FieldKind::Text),
    FieldDef::new("name", FieldKind::Text),
    FieldDef::new("description", FieldKind::Text),
    FieldDef::new("parent_id", FieldKind::OptText),
    FieldDef::new("created_at", FieldKind::DateTime),
    FieldDef::new("updated_at", FieldKind::DateTime),
];

static CATEGORY_SCHEMA: EntitySchema = EntitySchema {
    name: "category",
    plural: "categories",
    layout: SqlLayout::JsonBlob,
    fields: &CATEGORY_FIELDS,
};

/// Book category. `parent_id` forms a tree that is not checked for cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateCategory {
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub parent_id: Option<String>,
}

impl Category {
    pub fn new(name: &str) -> AppResult<Self> {
        Self::create(CreateCategory {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn create(data: CreateCategory) -> AppResult<Self> {
        let created_at = now();
        let category = Self {
            id: data.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: data.name,
            description: data.description,
            parent_id: data.parent_id.filter(|id| !id.is_empty()),
            created_at,
            updated_at: created_at,
        };
        category.validate()?;
        Ok(category)
    }

    pub fn validate(&self) -> AppResult<()> {
        require_non_blank("Category", "name", &self.name)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl Entity for Category {
    const KIND: EntityKind = EntityKind::Category;

    fn schema() -> &'static EntitySchema {
        &CATEGORY_SCHEMA
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_record(&self) -> Record {
        into_record(json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "parent_id": self.parent_id,
            "created_at": format_datetime(&self.created_at),
            "updated_at": format_datetime(&self.updated_at),
        }))
    }

    fn from_record(record: &Record) -> AppResult<Self> {
        let r = RecordReader::new(record, "Category");
        let category = Self {
            id: r.id(),
            name: r.text("name"),
            description: r.text("description"),
            parent_id: r.opt_text("parent_id"),
            created_at: r.datetime_or_now("created_at")?,
            updated_at: r.datetime_or_now("updated_at")?,
        };
        category.validate()?;
        Ok(category)
    }
}
