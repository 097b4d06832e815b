//! Author model

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use super::fields::{
    format_date, format_datetime, into_record, now, require_non_blank, EntitySchema, FieldDef,
    FieldKind, Record, RecordReader, SqlLayout,
};
use super::{Entity, EntityKind};
use crate::error::{AppError, AppResult};

static AUTHOR_FIELDS: [FieldDef; 8] = [
    FieldDef::new("id", FieldKind::Text),
    FieldDef::new("name", FieldKind::Text),
    FieldDef::new("birth_date", FieldKind::OptDate),
    FieldDef::new("nationality", FieldKind::Text),
    FieldDef::new("biography", FieldKind::Text),
    FieldDef::new("books", FieldKind::TextList),
    FieldDef::new("created_at", FieldKind::DateTime),
    FieldDef::new("updated_at", FieldKind::DateTime),
];

static AUTHOR_SCHEMA: EntitySchema = EntitySchema {
    name: "author",
    plural: "authors",
    layout: SqlLayout::JsonBlob,
    fields: &AUTHOR_FIELDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub nationality: String,
    pub biography: String,
    /// Ids of the author's books, kept in sync by callers
    pub books: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create author request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateAuthor {
    pub id: Option<String>,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub nationality: String,
    pub biography: String,
    pub books: Vec<String>,
}

impl Author {
    pub fn new(name: &str) -> AppResult<Self> {
        Self::create(CreateAuthor {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn create(data: CreateAuthor) -> AppResult<Self> {
        let created_at = now();
        let author = Self {
            id: data.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: data.name,
            birth_date: data.birth_date,
            nationality: data.nationality,
            biography: data.biography,
            books: data.books,
            created_at,
            updated_at: created_at,
        };
        author.validate()?;
        Ok(author)
    }

    pub fn validate(&self) -> AppResult<()> {
        require_non_blank("Author", "name", &self.name)?;
        if let Some(birth_date) = self.birth_date {
            if birth_date > Utc::now().date_naive() {
                return Err(AppError::Validation(format!(
                    "Author: birth date {} is in the future",
                    birth_date
                )));
            }
        }
        Ok(())
    }

    pub fn add_book(&mut self, book_id: &str) {
        if !self.books.iter().any(|id| id == book_id) {
            self.books.push(book_id.to_string());
            self.updated_at = now();
        }
    }
}

impl Entity for Author {
    const KIND: EntityKind = EntityKind::Author;

    fn schema() -> &'static EntitySchema {
        &AUTHOR_SCHEMA
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_record(&self) -> Record {
        into_record(json!({
            "id": self.id,
            "name": self.name,
            "birth_date": self.birth_date.as_ref().map(format_date),
            "nationality": self.nationality,
            "biography": self.biography,
            "books": self.books,
            "created_at": format_datetime(&self.created_at),
            "updated_at": format_datetime(&self.updated_at),
        }))
    }

    fn from_record(record: &Record) -> AppResult<Self> {
        let r = RecordReader::new(record, "Author");
        let author = Self {
            id: r.id(),
            name: r.text("name"),
            birth_date: r.opt_date("birth_date")?,
            nationality: r.text("nationality"),
            biography: r.text("biography"),
            books: r.list("books"),
            created_at: r.datetime_or_now("created_at")?,
            updated_at: r.datetime_or_now("updated_at")?,
        };
        author.validate()?;
        Ok(author)
    }
}
