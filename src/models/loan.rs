//! Loan model and related types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::fields::{
    format_datetime, into_record, now, require_non_blank, EntitySchema, FieldDef, FieldKind,
    Record, RecordReader, SqlLayout,
};
use super::{Entity, EntityKind};
use crate::error::{AppError, AppResult};

pub const DEFAULT_LOAN_DAYS: i64 = 14;

/// `start` moved forward by `days`, rejecting periods chrono cannot represent
pub fn due_after(start: DateTime<Utc>, days: i64) -> AppResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|period| start.checked_add_signed(period))
        .ok_or_else(|| {
            AppError::Validation(format!("Loan: period of {} days is out of range", days))
        })
}

static LOAN_FIELDS: [FieldDef; 10] = [
    FieldDef::new("id", FieldKind::Text),
    FieldDef::new("book_id", FieldKind::Text),
    FieldDef::new("user_id", FieldKind::Text),
    FieldDef::new("loan_date", FieldKind::DateTime),
    FieldDef::new("due_date", FieldKind::DateTime),
    FieldDef::new("return_date", FieldKind::OptDateTime),
    FieldDef::new("status", FieldKind::Text),
    FieldDef::new("notes", FieldKind::Text),
    FieldDef::new("created_at", FieldKind::DateTime),
    FieldDef::new("updated_at", FieldKind::DateTime),
];

static LOAN_SCHEMA: EntitySchema = EntitySchema {
    name: "loan",
    plural: "loans",
    layout: SqlLayout::Columns,
    fields: &LOAN_FIELDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    #[default]
    Active,
    Returned,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Returned => "returned",
            LoanStatus::Overdue => "overdue",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(LoanStatus::Active),
            "returned" => Ok(LoanStatus::Returned),
            "overdue" => Ok(LoanStatus::Overdue),
            _ => Err(AppError::Validation(format!("Loan: invalid status '{}'", s))),
        }
    }
}

/// A book lent to a user
#[derive(Debug, Clone, PartialEq)]
pub struct Loan {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create loan request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateLoan {
    pub id: Option<String>,
    pub book_id: String,
    pub user_id: String,
    pub loan_date: Option<DateTime<Utc>>,
    /// Overrides `loan_days` when set
    pub due_date: Option<DateTime<Utc>>,
    pub loan_days: Option<i64>,
    pub notes: String,
}

impl Loan {
    pub fn new(book_id: &str, user_id: &str, loan_days: i64) -> AppResult<Self> {
        Self::create(CreateLoan {
            book_id: book_id.to_string(),
            user_id: user_id.to_string(),
            loan_days: Some(loan_days),
            ..Default::default()
        })
    }

    pub fn create(data: CreateLoan) -> AppResult<Self> {
        let created_at = now();
        let loan_date = data.loan_date.unwrap_or(created_at);
        let due_date = match data.due_date {
            Some(due_date) => due_date,
            None => due_after(loan_date, data.loan_days.unwrap_or(DEFAULT_LOAN_DAYS))?,
        };
        let loan = Self {
            id: data.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            book_id: data.book_id,
            user_id: data.user_id,
            loan_date,
            due_date,
            return_date: None,
            status: LoanStatus::Active,
            notes: data.notes,
            created_at,
            updated_at: created_at,
        };
        loan.validate()?;
        Ok(loan)
    }

    pub fn validate(&self) -> AppResult<()> {
        require_non_blank("Loan", "book_id", &self.book_id)?;
        require_non_blank("Loan", "user_id", &self.user_id)?;
        if self.due_date < self.loan_date {
            return Err(AppError::Validation(
                "Loan: due date cannot be before loan date".to_string(),
            ));
        }
        if let Some(return_date) = self.return_date {
            if return_date < self.loan_date {
                return Err(AppError::Validation(
                    "Loan: return date cannot be before loan date".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Still out and past its due date at `at`
    pub fn is_overdue(&self, at: DateTime<Utc>) -> bool {
        self.status != LoanStatus::Returned && self.return_date.is_none() && at > self.due_date
    }

    /// Whole days past due at `at`, zero when not late
    pub fn days_overdue(&self, at: DateTime<Utc>) -> i64 {
        if at > self.due_date {
            (at - self.due_date).num_days()
        } else {
            0
        }
    }

    pub fn mark_returned(&mut self, at: DateTime<Utc>) -> AppResult<()> {
        if at < self.loan_date {
            return Err(AppError::Validation(
                "Loan: return date cannot be before loan date".to_string(),
            ));
        }
        self.return_date = Some(at);
        self.status = LoanStatus::Returned;
        self.updated_at = now();
        Ok(())
    }

    /// Push the due date back by `days`. An overdue loan whose new due date
    /// is after `at` becomes active again.
    pub fn extend(&mut self, days: i64, at: DateTime<Utc>) -> AppResult<()> {
        if self.status == LoanStatus::Returned {
            return Err(AppError::BusinessRule(format!(
                "Loan {} was already returned",
                self.id
            )));
        }
        if days <= 0 {
            return Err(AppError::Validation(format!(
                "Loan: extension must be positive, got {} days",
                days
            )));
        }
        self.due_date = due_after(self.due_date, days)?;
        if self.status == LoanStatus::Overdue && self.due_date > at {
            self.status = LoanStatus::Active;
        }
        self.updated_at = now();
        Ok(())
    }

    pub fn mark_overdue(&mut self) {
        self.status = LoanStatus::Overdue;
        self.updated_at = now();
    }
}

impl Entity for Loan {
    const KIND: EntityKind = EntityKind::Loan;

    fn schema() -> &'static EntitySchema {
        &LOAN_SCHEMA
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_record(&self) -> Record {
        into_record(json!({
            "id": self.id,
            "book_id": self.book_id,
            "user_id": self.user_id,
            "loan_date": format_datetime(&self.loan_date),
            "due_date": format_datetime(&self.due_date),
            "return_date": self.return_date.as_ref().map(format_datetime),
            "status": self.status.as_str(),
            "notes": self.notes,
            "created_at": format_datetime(&self.created_at),
            "updated_at": format_datetime(&self.updated_at),
        }))
    }

    fn from_record(record: &Record) -> AppResult<Self> {
        let r = RecordReader::new(record, "Loan");
        let loan_date = r.datetime_or_now("loan_date")?;
        let due_date = r
            .opt_datetime("due_date")?
            .unwrap_or_else(|| loan_date + Duration::days(DEFAULT_LOAN_DAYS));
        let status = match r.opt_text("status") {
            Some(status) => status.parse()?,
            None => LoanStatus::default(),
        };
        let loan = Self {
            id: r.id(),
            book_id: r.text("book_id"),
            user_id: r.text("user_id"),
            loan_date,
            due_date,
            return_date: r.opt_datetime("return_date")?,
            status,
            notes: r.text("notes"),
            created_at: r.datetime_or_now("created_at")?,
            updated_at: r.datetime_or_now("updated_at")?,
        };
        loan.validate()?;
        Ok(loan)
    }
}
