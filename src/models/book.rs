//! Book model and related types

use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use serde_json::json;

use super::fields::{
    format_datetime, into_record, now, require_non_blank, EntitySchema, FieldDef, FieldKind,
    Record, RecordReader, SqlLayout,
};
use super::{Entity, EntityKind};
use crate::error::{AppError, AppResult};

pub const DEFAULT_LANGUAGE: &str = "Español";

static BOOK_FIELDS: [FieldDef; 17] = [
    FieldDef::new("id", FieldKind::Text),
    FieldDef::new("title", FieldKind::Text),
    FieldDef::new("author_id", FieldKind::Text),
    FieldDef::new("isbn", FieldKind::OptText),
    FieldDef::new("publication_year", FieldKind::OptInt),
    FieldDef::new("genre", FieldKind::Text),
    FieldDef::new("description", FieldKind::Text),
    FieldDef::new("pages", FieldKind::OptInt),
    FieldDef::new("language", FieldKind::Text),
    FieldDef::new("publisher", FieldKind::Text),
    FieldDef::new("category_id", FieldKind::OptText),
    FieldDef::new("available", FieldKind::Bool),
    FieldDef::new("borrowed_by", FieldKind::OptText),
    FieldDef::new("borrow_date", FieldKind::OptDateTime),
    FieldDef::new("due_date", FieldKind::OptDateTime),
    FieldDef::new("created_at", FieldKind::DateTime),
    FieldDef::new("updated_at", FieldKind::DateTime),
];

static BOOK_SCHEMA: EntitySchema = EntitySchema {
    name: "book",
    plural: "books",
    layout: SqlLayout::Columns,
    fields: &BOOK_FIELDS,
};

/// Book in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author_id: String,
    pub isbn: Option<String>,
    pub publication_year: Option<i32>,
    pub genre: String,
    pub description: String,
    pub pages: Option<i32>,
    pub language: String,
    pub publisher: String,
    pub category_id: Option<String>,
    pub available: bool,
    pub borrowed_by: Option<String>,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create book request
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CreateBook {
    pub id: Option<String>,
    pub title: String,
    pub author_id: String,
    pub isbn: Option<String>,
    pub publication_year: Option<i32>,
    pub genre: String,
    pub description: String,
    pub pages: Option<i32>,
    pub language: String,
    pub publisher: String,
    pub category_id: Option<String>,
    pub available: bool,
}

impl Default for CreateBook {
    fn default() -> Self {
        Self {
            id: None,
            title: String::new(),
            author_id: String::new(),
            isbn: None,
            publication_year: None,
            genre: String::new(),
            description: String::new(),
            pages: None,
            language: DEFAULT_LANGUAGE.to_string(),
            publisher: String::new(),
            category_id: None,
            available: true,
        }
    }
}

impl Book {
    pub fn new(title: &str, author_id: &str) -> AppResult<Self> {
        Self::create(CreateBook {
            title: title.to_string(),
            author_id: author_id.to_string(),
            ..Default::default()
        })
    }

    pub fn create(data: CreateBook) -> AppResult<Self> {
        let created_at = now();
        let book = Self {
            id: data.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            title: data.title,
            author_id: data.author_id,
            isbn: data.isbn.filter(|isbn| !isbn.is_empty()),
            publication_year: data.publication_year,
            genre: data.genre,
            description: data.description,
            pages: data.pages,
            language: data.language,
            publisher: data.publisher,
            category_id: data.category_id.filter(|id| !id.is_empty()),
            available: data.available,
            borrowed_by: None,
            borrow_date: None,
            due_date: None,
            created_at,
            updated_at: created_at,
        };
        book.validate()?;
        Ok(book)
    }

    pub fn validate(&self) -> AppResult<()> {
        require_non_blank("Book", "title", &self.title)?;

        if let Some(isbn) = &self.isbn {
            if !is_valid_isbn(isbn) {
                return Err(AppError::Validation(format!("Book: invalid ISBN '{}'", isbn)));
            }
        }

        if let Some(year) = self.publication_year {
            let max_year = Utc::now().year() + 1;
            if !(1000..=max_year).contains(&year) {
                return Err(AppError::Validation(format!(
                    "Book: publication year {} outside 1000..={}",
                    year, max_year
                )));
            }
        }

        if let Some(pages) = self.pages {
            if pages < 0 {
                return Err(AppError::Validation(format!(
                    "Book: page count cannot be negative ({})",
                    pages
                )));
            }
        }

        Ok(())
    }

    /// Mark the book as lent to `user_id` until `due_date`.
    pub fn lend_to(&mut self, user_id: &str, due_date: DateTime<Utc>) {
        let at = now();
        self.available = false;
        self.borrowed_by = Some(user_id.to_string());
        self.borrow_date = Some(at);
        self.due_date = Some(due_date);
        self.updated_at = at;
    }

    pub fn mark_returned(&mut self) {
        self.available = true;
        self.borrowed_by = None;
        self.borrow_date = None;
        self.due_date = None;
        self.updated_at = now();
    }
}

impl Entity for Book {
    const KIND: EntityKind = EntityKind::Book;

    fn schema() -> &'static EntitySchema {
        &BOOK_SCHEMA
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_record(&self) -> Record {
        into_record(json!({
            "id": self.id,
            "title": self.title,
            "author_id": self.author_id,
            "isbn": self.isbn,
            "publication_year": self.publication_year,
            "genre": self.genre,
            "description": self.description,
            "pages": self.pages,
            "language": self.language,
            "publisher": self.publisher,
            "category_id": self.category_id,
            "available": self.available,
            "borrowed_by": self.borrowed_by,
            "borrow_date": self.borrow_date.as_ref().map(format_datetime),
            "due_date": self.due_date.as_ref().map(format_datetime),
            "created_at": format_datetime(&self.created_at),
            "updated_at": format_datetime(&self.updated_at),
        }))
    }

    fn from_record(record: &Record) -> AppResult<Self> {
        let r = RecordReader::new(record, "Book");
        let book = Self {
            id: r.id(),
            title: r.text("title"),
            author_id: r.text("author_id"),
            isbn: r.opt_text("isbn"),
            publication_year: to_i32("publication_year", r.opt_int("publication_year")?)?,
            genre: r.text("genre"),
            description: r.text("description"),
            pages: to_i32("pages", r.opt_int("pages")?)?,
            language: r.text_or("language", DEFAULT_LANGUAGE),
            publisher: r.text("publisher"),
            category_id: r.opt_text("category_id"),
            available: r.bool_or("available", true)?,
            borrowed_by: r.opt_text("borrowed_by"),
            borrow_date: r.opt_datetime("borrow_date")?,
            due_date: r.opt_datetime("due_date")?,
            created_at: r.datetime_or_now("created_at")?,
            updated_at: r.datetime_or_now("updated_at")?,
        };
        book.validate()?;
        Ok(book)
    }
}

fn to_i32(field: &str, value: Option<i64>) -> AppResult<Option<i32>> {
    value
        .map(|v| {
            i32::try_from(v)
                .map_err(|_| AppError::Validation(format!("Book: {} out of range ({})", field, v)))
        })
        .transpose()
}

/// Strip hyphens and spaces from an ISBN
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

/// Checksum validation for ISBN-10 (mod 11, `X` = 10 as check digit) and
/// ISBN-13 (alternating 1/3 weights, mod 10).
pub fn is_valid_isbn(isbn: &str) -> bool {
    let normalized = normalize_isbn(isbn);
    match normalized.len() {
        10 => is_valid_isbn10(&normalized),
        13 => is_valid_isbn13(&normalized),
        _ => false,
    }
}

fn is_valid_isbn10(isbn: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in isbn.chars().enumerate() {
        let value = match c.to_digit(10) {
            Some(d) => d,
            None if i == 9 && (c == 'X' || c == 'x') => 10,
            None => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

fn is_valid_isbn13(isbn: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in isbn.chars().enumerate() {
        let Some(d) = c.to_digit(10) else {
            return false;
        };
        sum += if i % 2 == 0 { d } else { d * 3 };
    }
    sum % 10 == 0
}
