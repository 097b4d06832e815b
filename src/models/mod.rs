//! Data models for Shelfkeeper

pub mod author;
pub mod book;
pub mod category;
pub mod fields;
pub mod loan;
pub mod user;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

// Re-export commonly used types
pub use author::{Author, CreateAuthor};
pub use book::{Book, CreateBook};
pub use category::{Category, CreateCategory};
pub use fields::{EntitySchema, FieldDef, FieldKind, Record, SqlLayout};
pub use loan::{CreateLoan, Loan, LoanStatus};
pub use user::{CreateUser, User, UserRole};

/// The five persisted entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Book,
    Author,
    User,
    Loan,
    Category,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Book,
        EntityKind::Author,
        EntityKind::User,
        EntityKind::Loan,
        EntityKind::Category,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Book => "Book",
            EntityKind::Author => "Author",
            EntityKind::User => "User",
            EntityKind::Loan => "Loan",
            EntityKind::Category => "Category",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = AppError;

    /// Accepts singular or plural names, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let singular = lowered.strip_suffix("ies").map(|stem| format!("{}y", stem));
        let singular = singular
            .as_deref()
            .or_else(|| lowered.strip_suffix('s'))
            .unwrap_or(&lowered);
        match singular {
            "book" => Ok(EntityKind::Book),
            "author" => Ok(EntityKind::Author),
            "user" => Ok(EntityKind::User),
            "loan" => Ok(EntityKind::Loan),
            "category" => Ok(EntityKind::Category),
            _ => Err(AppError::BadRequest(format!("Unknown entity type: {}", s))),
        }
    }
}

/// A persisted domain object with a dictionary form.
///
/// `to_record` emits every schema field in schema order. `from_record` is
/// lenient: unknown keys are ignored, textual encodings are coerced through
/// the field kind, absent fields take their defaults, and the entity's
/// invariants are checked on the result.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    fn schema() -> &'static EntitySchema;

    fn id(&self) -> &str;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> AppResult<Self>;

    /// Record without sensitive fields, for API responses.
    fn to_public_record(&self) -> Record {
        Self::schema().public_record(self.to_record())
    }
}
