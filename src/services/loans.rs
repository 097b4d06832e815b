//! Loan management service

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        fields::{into_record, now},
        loan::due_after,
        Book, CreateLoan, Loan, LoanStatus, User,
    },
    repository::EntityManager,
};

/// Result of returning a loan
#[derive(Debug, Clone, Serialize)]
pub struct LoanReturn {
    #[serde(skip)]
    pub loan: Loan,
    pub days_overdue: i64,
    pub fine: f64,
}

/// Optional filters for the loan history
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoanHistoryFilter {
    pub user_id: Option<String>,
    pub book_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueFine {
    pub loan_id: String,
    pub book_id: String,
    pub days_overdue: i64,
    pub fine: f64,
    pub due_date: DateTime<Utc>,
}

/// Fines a user owes on loans still out past their due date
#[derive(Debug, Clone, Serialize)]
pub struct FineSummary {
    pub user_id: String,
    pub total_fine: f64,
    pub overdue_loans: Vec<OverdueFine>,
    pub fine_per_day: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanStats {
    pub total_loans: usize,
    pub active_loans: usize,
    pub returned_loans: usize,
    pub overdue_loans: usize,
    pub overdue_percentage: f64,
}

#[derive(Clone)]
pub struct LoansService {
    entities: Arc<EntityManager>,
    config: LoansConfig,
}

impl LoansService {
    pub fn new(entities: Arc<EntityManager>, config: LoansConfig) -> Self {
        Self { entities, config }
    }

    pub fn config(&self) -> &LoansConfig {
        &self.config
    }

    /// Lend a book to a user.
    ///
    /// The loan, the book and the user are saved one after the other; a
    /// failure after the loan is written is logged and leaves the loan in place.
    pub async fn create_loan(
        &self,
        book_id: &str,
        user_id: &str,
        days: Option<i64>,
    ) -> AppResult<Loan> {
        let books = self.entities.get_repository::<Book>()?;
        let users = self.entities.get_repository::<User>()?;
        let loans = self.entities.get_repository::<Loan>()?;

        let mut book = books
            .load(book_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?;
        if !book.available {
            return Err(AppError::BusinessRule(format!(
                "Book '{}' is not available",
                book.title
            )));
        }

        let mut user = users
            .load(user_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        if !user.active {
            return Err(AppError::BusinessRule(format!(
                "User {} is not active",
                user.name
            )));
        }

        let active_loans = self.active_loans_for(user_id).await?;
        let limit = self.config.max_loans_per_user.min(user.max_books) as usize;
        if active_loans.len() >= limit {
            return Err(AppError::BusinessRule(format!(
                "User {} has reached the limit of {} loans",
                user.name, limit
            )));
        }
        if active_loans.iter().any(|loan| loan.book_id == book_id) {
            return Err(AppError::BusinessRule(format!(
                "User {} already has this book on loan",
                user.name
            )));
        }

        let days = days.unwrap_or(self.config.default_loan_days);
        if days <= 0 || days > self.config.max_loan_days {
            return Err(AppError::Validation(format!(
                "Loan period must be between 1 and {} days, got {}",
                self.config.max_loan_days, days
            )));
        }

        let loan = Loan::create(CreateLoan {
            book_id: book_id.to_string(),
            user_id: user_id.to_string(),
            loan_days: Some(days),
            ..Default::default()
        })?;
        if !loans.save(&loan).await {
            return Err(AppError::Internal("Failed to save loan".to_string()));
        }

        book.lend_to(user_id, loan.due_date);
        if !books.save(&book).await {
            tracing::warn!("Loan {} saved but book {} was not updated", loan.id, book.id);
        }

        user.add_borrowed_book(book_id);
        if !users.save(&user).await {
            tracing::warn!("Loan {} saved but user {} was not updated", loan.id, user.id);
        }

        tracing::info!(
            "Book {} lent to user {} until {}",
            book_id,
            user_id,
            loan.due_date
        );
        Ok(loan)
    }

    /// Close a loan, computing the fine for the days past due.
    pub async fn return_loan(
        &self,
        loan_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> AppResult<LoanReturn> {
        let loans = self.entities.get_repository::<Loan>()?;
        let mut loan = loans
            .load(loan_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", loan_id)))?;

        if loan.status == LoanStatus::Returned {
            return Err(AppError::BusinessRule(format!(
                "Loan {} was already returned",
                loan_id
            )));
        }

        let at = at.unwrap_or_else(now);
        let days_overdue = loan.days_overdue(at);
        let fine = days_overdue as f64 * self.config.fine_per_day;

        loan.mark_returned(at)?;
        if !loans.save(&loan).await {
            return Err(AppError::Internal("Failed to save loan".to_string()));
        }

        let books = self.entities.get_repository::<Book>()?;
        match books.load(&loan.book_id).await {
            Some(mut book) => {
                book.mark_returned();
                if !books.save(&book).await {
                    tracing::warn!("Loan {} returned but book {} was not updated", loan.id, book.id);
                }
            }
            None => tracing::warn!("Returned loan {} references missing book {}", loan.id, loan.book_id),
        }

        let users = self.entities.get_repository::<User>()?;
        if let Some(mut user) = users.load(&loan.user_id).await {
            user.remove_borrowed_book(&loan.book_id);
            if !users.save(&user).await {
                tracing::warn!("Loan {} returned but user {} was not updated", loan.id, user.id);
            }
        }

        Ok(LoanReturn {
            loan,
            days_overdue,
            fine,
        })
    }

    /// Move the due date of an open loan back by `days` (the configured
    /// extension when `None`). The whole period may not exceed `max_loan_days`.
    pub async fn extend_loan(&self, loan_id: &str, days: Option<i64>) -> AppResult<Loan> {
        let loans = self.entities.get_repository::<Loan>()?;
        let mut loan = loans
            .load(loan_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", loan_id)))?;

        let days = days.unwrap_or(self.config.extension_days);
        if days > 0 {
            let limit = due_after(loan.loan_date, self.config.max_loan_days)?;
            if due_after(loan.due_date, days)? > limit {
                return Err(AppError::Validation(format!(
                    "Loan {} cannot run longer than {} days",
                    loan_id, self.config.max_loan_days
                )));
            }
        }

        loan.extend(days, now())?;
        if !loans.save(&loan).await {
            return Err(AppError::Internal("Failed to save loan".to_string()));
        }

        let books = self.entities.get_repository::<Book>()?;
        if let Some(mut book) = books.load(&loan.book_id).await {
            if book.borrowed_by.as_deref() == Some(loan.user_id.as_str()) {
                book.due_date = Some(loan.due_date);
                book.updated_at = now();
                if !books.save(&book).await {
                    tracing::warn!("Loan {} extended but book {} was not updated", loan.id, book.id);
                }
            }
        }

        tracing::info!("Loan {} extended by {} days until {}", loan.id, days, loan.due_date);
        Ok(loan)
    }

    /// Every loan, optionally narrowed to one user and/or one book, newest first
    pub async fn loan_history(&self, filter: &LoanHistoryFilter) -> AppResult<Vec<Loan>> {
        let loans = self.entities.get_repository::<Loan>()?;
        let mut history: Vec<Loan> = loans
            .load_all()
            .await
            .into_iter()
            .filter(|loan| {
                filter.user_id.as_deref().map_or(true, |id| loan.user_id == id)
                    && filter.book_id.as_deref().map_or(true, |id| loan.book_id == id)
            })
            .collect();
        history.sort_by(|a, b| b.loan_date.cmp(&a.loan_date));
        Ok(history)
    }

    /// Fines accrued at `at` on a user's loans that are still out and late
    pub async fn calculate_fines(&self, user_id: &str, at: DateTime<Utc>) -> AppResult<FineSummary> {
        let overdue_loans: Vec<OverdueFine> = self
            .active_loans_for(user_id)
            .await?
            .into_iter()
            .filter(|loan| loan.is_overdue(at))
            .map(|loan| {
                let days_overdue = loan.days_overdue(at);
                OverdueFine {
                    fine: days_overdue as f64 * self.config.fine_per_day,
                    loan_id: loan.id,
                    book_id: loan.book_id,
                    days_overdue,
                    due_date: loan.due_date,
                }
            })
            .collect();

        Ok(FineSummary {
            user_id: user_id.to_string(),
            total_fine: overdue_loans.iter().map(|fine| fine.fine).sum(),
            overdue_loans,
            fine_per_day: self.config.fine_per_day,
        })
    }

    /// Loan counts at `at`. Active loans include the overdue ones.
    pub async fn loan_stats(&self, at: DateTime<Utc>) -> AppResult<LoanStats> {
        let loans = self.entities.get_repository::<Loan>()?.load_all().await;
        Ok(summarize(&loans, at))
    }

    /// Loans still out after their due date
    pub async fn overdue_loans(&self, at: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let loans = self.entities.get_repository::<Loan>()?;
        Ok(loans
            .load_all()
            .await
            .into_iter()
            .filter(|loan| loan.is_overdue(at))
            .collect())
    }

    /// Persist the overdue status on active loans past due. Returns how many changed.
    pub async fn mark_overdue(&self, at: DateTime<Utc>) -> AppResult<usize> {
        let loans = self.entities.get_repository::<Loan>()?;
        let mut updated = 0;
        for mut loan in self.overdue_loans(at).await? {
            if loan.status != LoanStatus::Active {
                continue;
            }
            loan.mark_overdue();
            if loans.save(&loan).await {
                updated += 1;
            }
        }
        Ok(updated)
    }

    pub async fn user_loans(&self, user_id: &str) -> AppResult<Vec<Loan>> {
        let loans = self.entities.get_repository::<Loan>()?;
        Ok(loans
            .find_by(&into_record(json!({ "user_id": user_id })))
            .await)
    }

    /// Loans not yet returned, overdue ones included
    async fn active_loans_for(&self, user_id: &str) -> AppResult<Vec<Loan>> {
        Ok(self
            .user_loans(user_id)
            .await?
            .into_iter()
            .filter(|loan| loan.status != LoanStatus::Returned)
            .collect())
    }
}

/// Counts shared by loan statistics and reports
pub fn summarize(loans: &[Loan], at: DateTime<Utc>) -> LoanStats {
    let returned_loans = loans
        .iter()
        .filter(|loan| loan.status == LoanStatus::Returned)
        .count();
    let active_loans = loans.len() - returned_loans;
    let overdue_loans = loans.iter().filter(|loan| loan.is_overdue(at)).count();

    LoanStats {
        total_loans: loans.len(),
        active_loans,
        returned_loans,
        overdue_loans,
        overdue_percentage: if active_loans > 0 {
            overdue_loans as f64 / active_loans as f64 * 100.0
        } else {
            0.0
        },
    }
}
