//! User model and related types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::fields::{
    format_datetime, into_record, now, require_non_blank, EntitySchema, FieldDef, FieldKind,
    Record, RecordReader, SqlLayout,
};
use super::{Entity, EntityKind};
use crate::error::{AppError, AppResult};

pub const DEFAULT_MAX_BOOKS: u32 = 5;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@]+@[^.]+\..+$").expect("email pattern is valid"));

static USER_FIELDS: [FieldDef; 14] = [
    FieldDef::new("id", FieldKind::Text),
    FieldDef::new("name", FieldKind::Text),
    FieldDef::new("email", FieldKind::Text),
    FieldDef::new("phone", FieldKind::Text),
    FieldDef::new("address", FieldKind::Text),
    FieldDef::new("active", FieldKind::Bool),
    FieldDef::new("role", FieldKind::Text),
    FieldDef::sensitive("password_hash", FieldKind::OptText),
    FieldDef::new("borrowed_books", FieldKind::TextList),
    FieldDef::new("max_books", FieldKind::Int),
    FieldDef::new("registration_date", FieldKind::DateTime),
    FieldDef::new("last_login", FieldKind::OptDateTime),
    FieldDef::new("created_at", FieldKind::DateTime),
    FieldDef::new("updated_at", FieldKind::DateTime),
];

static USER_SCHEMA: EntitySchema = EntitySchema {
    name: "user",
    plural: "users",
    layout: SqlLayout::Columns,
    fields: &USER_FIELDS,
};

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    Librarian,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::Librarian => "librarian",
        }
    }

    /// Staff roles may manage other users' loans
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Librarian)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            "librarian" => Ok(UserRole::Librarian),
            _ => Err(AppError::Validation(format!("User: invalid role '{}'", s))),
        }
    }
}

/// Library patron or staff member
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub active: bool,
    pub role: UserRole,
    /// Argon2 PHC string
    pub password_hash: Option<String>,
    pub borrowed_books: Vec<String>,
    pub max_books: u32,
    pub registration_date: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create user request
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CreateUser {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub active: bool,
    pub role: UserRole,
    pub max_books: u32,
}

impl Default for CreateUser {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            email: String::new(),
            phone: String::new(),
            address: String::new(),
            active: true,
            role: UserRole::User,
            max_books: DEFAULT_MAX_BOOKS,
        }
    }
}

impl User {
    pub fn new(name: &str, email: &str) -> AppResult<Self> {
        Self::create(CreateUser {
            name: name.to_string(),
            email: email.to_string(),
            ..Default::default()
        })
    }

    pub fn create(data: CreateUser) -> AppResult<Self> {
        let created_at = now();
        let user = Self {
            id: data.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: data.name,
            email: data.email,
            phone: data.phone,
            address: data.address,
            active: data.active,
            role: data.role,
            password_hash: None,
            borrowed_books: Vec::new(),
            max_books: data.max_books,
            registration_date: created_at,
            last_login: None,
            created_at,
            updated_at: created_at,
        };
        user.validate()?;
        Ok(user)
    }

    pub fn validate(&self) -> AppResult<()> {
        require_non_blank("User", "name", &self.name)?;
        if !is_valid_email(&self.email) {
            return Err(AppError::Validation(format!(
                "User: invalid email '{}'",
                self.email
            )));
        }
        Ok(())
    }

    pub fn can_borrow(&self) -> bool {
        self.active && (self.borrowed_books.len() as u32) < self.max_books
    }

    pub fn add_borrowed_book(&mut self, book_id: &str) {
        if !self.borrowed_books.iter().any(|id| id == book_id) {
            self.borrowed_books.push(book_id.to_string());
        }
        self.updated_at = now();
    }

    pub fn remove_borrowed_book(&mut self, book_id: &str) {
        self.borrowed_books.retain(|id| id != book_id);
        self.updated_at = now();
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;

    fn schema() -> &'static EntitySchema {
        &USER_SCHEMA
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_record(&self) -> Record {
        into_record(json!({
            "id": self.id,
            "name": self.name,
            "email": self.email,
            "phone": self.phone,
            "address": self.address,
            "active": self.active,
            "role": self.role.as_str(),
            "password_hash": self.password_hash,
            "borrowed_books": self.borrowed_books,
            "max_books": self.max_books,
            "registration_date": format_datetime(&self.registration_date),
            "last_login": self.last_login.as_ref().map(format_datetime),
            "created_at": format_datetime(&self.created_at),
            "updated_at": format_datetime(&self.updated_at),
        }))
    }

    fn from_record(record: &Record) -> AppResult<Self> {
        let r = RecordReader::new(record, "User");
        let max_books = r.int_or("max_books", i64::from(DEFAULT_MAX_BOOKS))?;
        let max_books = u32::try_from(max_books).map_err(|_| {
            AppError::Validation(format!("User: invalid max_books {}", max_books))
        })?;
        let role = match r.opt_text("role") {
            Some(role) => role.parse()?,
            None => UserRole::default(),
        };
        let user = Self {
            id: r.id(),
            name: r.text("name"),
            email: r.text("email"),
            phone: r.text("phone"),
            address: r.text("address"),
            active: r.bool_or("active", true)?,
            role,
            password_hash: r.opt_text("password_hash"),
            borrowed_books: r.list("borrowed_books"),
            max_books,
            registration_date: r.datetime_or_now("registration_date")?,
            last_login: r.opt_datetime("last_login")?,
            created_at: r.datetime_or_now("created_at")?,
            updated_at: r.datetime_or_now("updated_at")?,
        };
        user.validate()?;
        Ok(user)
    }
}
