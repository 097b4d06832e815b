//! Library reports and their text exports

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{
        fields::{format_datetime, into_record, now},
        Author, Book, Loan, LoanStatus, User, UserRole,
    },
    repository::EntityManager,
    services::loans::{summarize, LoanStats},
};

const TOP_LIMIT: usize = 10;
const SAMPLE_LIMIT: usize = 10;
const AUTHORS_WITHOUT_BOOKS_SAMPLE: usize = 5;
const HISTORY_LIMIT: usize = 20;

/// Occurrences of one value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tally {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookCounts {
    pub total: usize,
    pub available: usize,
    pub loaned: usize,
    pub availability_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserCounts {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryOverview {
    pub generated_at: DateTime<Utc>,
    pub books: BookCounts,
    pub authors: usize,
    pub users: UserCounts,
    pub loans: LoanStats,
}

/// Filters for the books report; every one is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BookReportFilter {
    pub genre: Option<String>,
    pub language: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub available: Option<bool>,
}

impl BookReportFilter {
    fn matches(&self, book: &Book) -> bool {
        self.genre.as_deref().map_or(true, |genre| book.genre == genre)
            && self.language.as_deref().map_or(true, |language| book.language == language)
            && self
                .year_from
                .map_or(true, |from| book.publication_year.map_or(false, |year| year >= from))
            && self
                .year_to
                .map_or(true, |to| book.publication_year.map_or(false, |year| year <= to))
            && self.available.map_or(true, |available| book.available == available)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookSummary {
    pub id: String,
    pub title: String,
    pub author_id: String,
    pub genre: String,
    pub publication_year: Option<i32>,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearRange {
    pub oldest: Option<i32>,
    pub newest: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BooksReport {
    pub generated_at: DateTime<Utc>,
    pub total_books: usize,
    pub filters_applied: BookReportFilter,
    pub by_genre: Vec<Tally>,
    pub by_language: Vec<Tally>,
    pub by_year: BTreeMap<i32, usize>,
    pub year_range: YearRange,
    pub books_sample: Vec<BookSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorSummary {
    pub id: String,
    pub name: String,
    pub nationality: String,
    pub books_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorsReport {
    pub generated_at: DateTime<Utc>,
    pub total_authors: usize,
    pub authors_with_books: usize,
    pub authors_without_books: usize,
    pub by_nationality: Vec<Tally>,
    pub top_authors: Vec<AuthorSummary>,
    pub authors_without_books_sample: Vec<AuthorSummary>,
}

/// Loan period filter; bounds are inclusive and apply to the loan date
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportPeriod {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ReportPeriod {
    fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookLoanCount {
    pub book_id: String,
    pub title: String,
    pub loan_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserLoanCount {
    pub user_id: String,
    pub name: String,
    pub loan_count: usize,
}

/// Whole days between loan and return, over returned loans
#[derive(Debug, Clone, Serialize)]
pub struct LoanDuration {
    pub average_days: f64,
    pub median_days: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoansReport {
    pub generated_at: DateTime<Utc>,
    pub period: ReportPeriod,
    pub summary: LoanStats,
    pub top_books: Vec<BookLoanCount>,
    pub top_users: Vec<UserLoanCount>,
    pub loan_duration: LoanDuration,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanHistoryEntry {
    pub loan_id: String,
    pub book_title: String,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserActivityReport {
    pub generated_at: DateTime<Utc>,
    pub user: UserProfile,
    pub loan_stats: LoanStats,
    pub loan_history: Vec<LoanHistoryEntry>,
}

/// Text rendering of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Txt,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Txt => "text/plain; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "txt" | "text" => Ok(ExportFormat::Txt),
            other => Err(AppError::BadRequest(format!(
                "Unknown export format '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone)]
pub struct ReportService {
    entities: Arc<EntityManager>,
}

impl ReportService {
    pub fn new(entities: Arc<EntityManager>) -> Self {
        Self { entities }
    }

    /// Totals across the whole library at `at`
    pub async fn library_overview(&self, at: DateTime<Utc>) -> AppResult<LibraryOverview> {
        let books = self.entities.get_repository::<Book>()?.load_all().await;
        let authors = self.entities.get_repository::<Author>()?.count().await;
        let users = self.entities.get_repository::<User>()?.load_all().await;
        let loans = self.entities.get_repository::<Loan>()?.load_all().await;

        let available = books.iter().filter(|book| book.available).count();
        let active_users = users.iter().filter(|user| user.active).count();

        Ok(LibraryOverview {
            generated_at: now(),
            books: BookCounts {
                total: books.len(),
                available,
                loaned: books.len() - available,
                availability_rate: percentage(available, books.len()),
            },
            authors,
            users: UserCounts {
                total: users.len(),
                active: active_users,
                inactive: users.len() - active_users,
            },
            loans: summarize(&loans, at),
        })
    }

    pub async fn books_report(&self, filter: BookReportFilter) -> AppResult<BooksReport> {
        let books: Vec<Book> = self
            .entities
            .get_repository::<Book>()?
            .load_all()
            .await
            .into_iter()
            .filter(|book| filter.matches(book))
            .collect();

        let mut by_year = BTreeMap::new();
        for year in books.iter().filter_map(|book| book.publication_year) {
            *by_year.entry(year).or_insert(0) += 1;
        }

        Ok(BooksReport {
            generated_at: now(),
            total_books: books.len(),
            by_genre: tally(books.iter().map(|book| book.genre.as_str())),
            by_language: tally(books.iter().map(|book| book.language.as_str())),
            year_range: YearRange {
                oldest: by_year.keys().next().copied(),
                newest: by_year.keys().next_back().copied(),
            },
            by_year,
            books_sample: books
                .iter()
                .take(SAMPLE_LIMIT)
                .map(|book| BookSummary {
                    id: book.id.clone(),
                    title: book.title.clone(),
                    author_id: book.author_id.clone(),
                    genre: book.genre.clone(),
                    publication_year: book.publication_year,
                    available: book.available,
                })
                .collect(),
            filters_applied: filter,
        })
    }

    /// Authors ranked by the number of books that reference them
    pub async fn authors_report(&self) -> AppResult<AuthorsReport> {
        let authors = self.entities.get_repository::<Author>()?.load_all().await;
        let books = self.entities.get_repository::<Book>()?.load_all().await;

        let mut books_by_author: HashMap<&str, usize> = HashMap::new();
        for book in &books {
            *books_by_author.entry(book.author_id.as_str()).or_insert(0) += 1;
        }

        let (mut with_books, without_books): (Vec<AuthorSummary>, Vec<AuthorSummary>) = authors
            .iter()
            .map(|author| AuthorSummary {
                id: author.id.clone(),
                name: author.name.clone(),
                nationality: author.nationality.clone(),
                books_count: books_by_author.get(author.id.as_str()).copied().unwrap_or(0),
            })
            .partition(|summary| summary.books_count > 0);
        with_books.sort_by(|a, b| b.books_count.cmp(&a.books_count).then_with(|| a.name.cmp(&b.name)));

        Ok(AuthorsReport {
            generated_at: now(),
            total_authors: authors.len(),
            authors_with_books: with_books.len(),
            authors_without_books: without_books.len(),
            by_nationality: tally(authors.iter().map(|author| author.nationality.as_str())),
            top_authors: with_books.into_iter().take(TOP_LIMIT).collect(),
            authors_without_books_sample: without_books
                .into_iter()
                .take(AUTHORS_WITHOUT_BOOKS_SAMPLE)
                .collect(),
        })
    }

    /// Loans made within `period`, with the most borrowed books and most active users
    pub async fn loans_report(&self, period: ReportPeriod, at: DateTime<Utc>) -> AppResult<LoansReport> {
        if let (Some(from), Some(to)) = (period.from, period.to) {
            if from > to {
                return Err(AppError::Validation(
                    "Report period starts after it ends".to_string(),
                ));
            }
        }

        let loans: Vec<Loan> = self
            .entities
            .get_repository::<Loan>()?
            .load_all()
            .await
            .into_iter()
            .filter(|loan| period.contains(loan.loan_date))
            .collect();

        let titles: HashMap<String, String> = self
            .entities
            .get_repository::<Book>()?
            .load_all()
            .await
            .into_iter()
            .map(|book| (book.id, book.title))
            .collect();
        let names: HashMap<String, String> = self
            .entities
            .get_repository::<User>()?
            .load_all()
            .await
            .into_iter()
            .map(|user| (user.id, user.name))
            .collect();

        let top_books = tally(loans.iter().map(|loan| loan.book_id.as_str()))
            .into_iter()
            .take(TOP_LIMIT)
            .map(|t| BookLoanCount {
                title: titles.get(&t.value).cloned().unwrap_or_default(),
                book_id: t.value,
                loan_count: t.count,
            })
            .collect();
        let top_users = tally(loans.iter().map(|loan| loan.user_id.as_str()))
            .into_iter()
            .take(TOP_LIMIT)
            .map(|t| UserLoanCount {
                name: names.get(&t.value).cloned().unwrap_or_default(),
                user_id: t.value,
                loan_count: t.count,
            })
            .collect();

        let durations: Vec<i64> = loans
            .iter()
            .filter(|loan| loan.status == LoanStatus::Returned)
            .filter_map(|loan| loan.return_date.map(|returned| (returned - loan.loan_date).num_days()))
            .collect();

        Ok(LoansReport {
            generated_at: now(),
            summary: summarize(&loans, at),
            top_books,
            top_users,
            loan_duration: loan_duration(durations),
            period,
        })
    }

    /// One user's loan counts and most recent loans
    pub async fn user_activity(&self, user_id: &str, at: DateTime<Utc>) -> AppResult<UserActivityReport> {
        let user = self
            .entities
            .get_repository::<User>()?
            .load(user_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let mut loans = self
            .entities
            .get_repository::<Loan>()?
            .find_by(&into_record(json!({ "user_id": user_id })))
            .await;
        loans.sort_by(|a, b| b.loan_date.cmp(&a.loan_date));

        let titles: HashMap<String, String> = self
            .entities
            .get_repository::<Book>()?
            .load_all()
            .await
            .into_iter()
            .map(|book| (book.id, book.title))
            .collect();

        let loan_history = loans
            .iter()
            .take(HISTORY_LIMIT)
            .map(|loan| LoanHistoryEntry {
                loan_id: loan.id.clone(),
                book_title: titles.get(&loan.book_id).cloned().unwrap_or_default(),
                loan_date: loan.loan_date,
                due_date: loan.due_date,
                return_date: loan.return_date,
                status: loan.status,
                days_overdue: if loan.is_overdue(at) {
                    loan.days_overdue(at)
                } else {
                    0
                },
            })
            .collect();

        Ok(UserActivityReport {
            generated_at: now(),
            user: UserProfile {
                id: user.id,
                name: user.name,
                email: user.email,
                role: user.role,
                active: user.active,
            },
            loan_stats: summarize(&loans, at),
            loan_history,
        })
    }
}

/// Render any report as pretty JSON, a `field,value` CSV of its top-level
/// scalars, or an indented text outline.
pub fn export_report<R: Serialize>(report: &R, format: ExportFormat) -> AppResult<String> {
    let value = serde_json::to_value(report)
        .map_err(|e| AppError::Internal(format!("Failed to serialize report: {}", e)))?;

    match format {
        ExportFormat::Json => serde_json::to_string_pretty(&value)
            .map_err(|e| AppError::Internal(format!("Failed to serialize report: {}", e))),
        ExportFormat::Csv => export_csv(&value),
        ExportFormat::Txt => Ok(export_text(&value)),
    }
}

fn export_csv(value: &Value) -> AppResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_error = |e: csv::Error| AppError::Internal(format!("Failed to write report: {}", e));

    writer.write_record(["field", "value"]).map_err(csv_error)?;
    if let Value::Object(map) = value {
        for (key, field) in map {
            if let Some(text) = scalar_text(field) {
                writer.write_record([key.as_str(), text.as_str()]).map_err(csv_error)?;
            }
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to write report: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(e.to_string()))
}

fn export_text(value: &Value) -> String {
    let generated_at = value
        .get("generated_at")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format_datetime(&now()));

    let mut out = format!("REPORT GENERATED: {}\n{}\n", generated_at, "=".repeat(50));
    if let Value::Object(map) = value {
        outline(&mut out, map, 0);
    }
    out
}

fn outline(out: &mut String, map: &serde_json::Map<String, Value>, depth: usize) {
    let indent = "  ".repeat(depth);
    for (key, value) in map {
        match value {
            Value::Object(inner) => {
                out.push_str(&format!("{}{}:\n", indent, key));
                outline(out, inner, depth + 1);
            }
            Value::Array(items) => {
                out.push_str(&format!("{}{}: {} items\n", indent, key, items.len()))
            }
            other => out.push_str(&format!(
                "{}{}: {}\n",
                indent,
                key,
                scalar_text(other).unwrap_or_default()
            )),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Count non-blank values, most frequent first, ties in value order
fn tally<'a>(values: impl Iterator<Item = &'a str>) -> Vec<Tally> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.filter(|v| !v.trim().is_empty()) {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut tallies: Vec<Tally> = counts
        .into_iter()
        .map(|(value, count)| Tally {
            value: value.to_string(),
            count,
        })
        .collect();
    tallies.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    tallies
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn loan_duration(mut days: Vec<i64>) -> LoanDuration {
    if days.is_empty() {
        return LoanDuration {
            average_days: 0.0,
            median_days: 0.0,
        };
    }
    days.sort_unstable();
    let average = days.iter().sum::<i64>() as f64 / days.len() as f64;
    let middle = days.len() / 2;
    let median = if days.len() % 2 == 0 {
        (days[middle - 1] + days[middle]) as f64 / 2.0
    } else {
        days[middle] as f64
    };
    LoanDuration {
        average_days: (average * 10.0).round() / 10.0,
        median_days: (median * 10.0).round() / 10.0,
    }
}
