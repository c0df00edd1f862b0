//! Domain models that mirror the SQLite schema plus the input and result
//! shapes exchanged with the dispatcher. Everything here is a plain data
//! holder; persistence lives in `db` and request parsing in `dispatch`.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{LibraryError, LibraryResult};

/// A catalog entry. One row per ISBN regardless of how many copies exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Book {
    pub id: i64,
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub published_year: Option<i64>,
}

impl Book {
    /// `Title - Author`, or just the title when no author is recorded.
    pub fn display_title(&self) -> String {
        match self.author.as_deref().map(str::trim) {
            Some(author) if !author.is_empty() => format!("{} - {}", self.title, author),
            _ => self.title.clone(),
        }
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_title())
    }
}

/// A physical copy of a cataloged book. The listing query joins the owning
/// book so the ISBN and title travel with the copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookCopy {
    pub id: i64,
    pub book_id: i64,
    pub isbn: String,
    pub title: String,
    pub copy_number: i64,
    pub status: String,
    pub location: Option<String>,
    pub barcode: Option<String>,
}

/// A borrower. `period` is the class period the student belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Student {
    pub id: i64,
    pub full_name: String,
    pub period: i64,
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (period {})", self.full_name, self.period)
    }
}

/// A loan row joined with the copy, book and student it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Loan {
    pub id: i64,
    pub copy_id: i64,
    pub isbn: String,
    pub title: String,
    pub copy_number: i64,
    pub student_id: i64,
    pub student_name: String,
    pub checkout_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
}

impl Loan {
    pub fn is_outstanding(&self) -> bool {
        self.return_date.is_none()
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_outstanding() && self.due_date < today
    }
}

/// Catalog input for the ISBN upsert. Text arrives untrimmed; `validated`
/// normalizes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBook {
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub published_year: Option<i64>,
}

impl NewBook {
    pub fn new(isbn: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Builder-style setter for the optional author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Trim every text field, drop blank optionals, and reject a missing ISBN
    /// or title.
    pub fn validated(&self) -> LibraryResult<NewBook> {
        let isbn = required(&self.isbn, "ISBN is required.")?;
        let title = required(&self.title, "Title is required.")?;
        Ok(NewBook {
            isbn,
            title,
            author: optional(self.author.as_deref()),
            publisher: optional(self.publisher.as_deref()),
            published_year: self.published_year,
        })
    }
}

/// A physical copy to register under an existing ISBN. The copy number is
/// assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCopy {
    pub isbn: String,
    pub location: Option<String>,
    pub barcode: Option<String>,
}

impl NewCopy {
    pub fn new(isbn: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            ..Self::default()
        }
    }

    /// Trim the ISBN and drop blank location or barcode.
    pub fn validated(&self) -> LibraryResult<NewCopy> {
        Ok(NewCopy {
            isbn: required(&self.isbn, "ISBN is required.")?,
            location: optional(self.location.as_deref()),
            barcode: optional(self.barcode.as_deref()),
        })
    }
}

/// Student input. `period` stays optional here so "absent" can be told apart
/// from the perfectly valid period 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewStudent {
    pub full_name: String,
    pub period: Option<i64>,
}

impl NewStudent {
    pub fn new(full_name: impl Into<String>, period: i64) -> Self {
        Self {
            full_name: full_name.into(),
            period: Some(period),
        }
    }

    pub fn validated(&self) -> LibraryResult<(String, i64)> {
        let full_name = required(&self.full_name, "Student name is required.")?;
        let period = self
            .period
            .ok_or_else(|| LibraryError::validation("Period is required."))?;
        Ok((full_name, period))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub copy_id: i64,
    pub student_id: i64,
    pub due_date: NaiveDate,
    pub checkout_date: Option<NaiveDate>,
}

impl NewLoan {
    /// Resolve the checkout date (defaulting to `today`) and make sure the due
    /// date does not precede it.
    pub fn validated(&self, today: NaiveDate) -> LibraryResult<(NaiveDate, NaiveDate)> {
        let checkout = self.checkout_date.unwrap_or(today);
        if self.due_date < checkout {
            return Err(LibraryError::validation(format!(
                "Due date {} is before checkout date {}.",
                self.due_date, checkout
            )));
        }
        Ok((checkout, self.due_date))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnLoan {
    pub loan_id: i64,
    pub return_date: Option<NaiveDate>,
}

/// Outcome of the book upsert. `changes` is the engine's affected-row count and
/// `id` points at the inserted or updated row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddBookResult {
    pub success: bool,
    pub changes: usize,
    pub id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddCopyResult {
    pub success: bool,
    pub id: i64,
    pub copy_number: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertResult {
    pub success: bool,
    pub id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateResult {
    pub success: bool,
    pub changes: usize,
}

fn required(value: &str, message: &str) -> LibraryResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(LibraryError::validation(message))
    } else {
        Ok(trimmed.to_string())
    }
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_validation_trims_and_drops_blank_optionals() {
        let input = NewBook {
            isbn: " 978-0 ".into(),
            title: " Dune ".into(),
            author: Some("  ".into()),
            publisher: Some(" Chilton ".into()),
            published_year: Some(1965),
        };
        let book = input.validated().unwrap();
        assert_eq!(book.isbn, "978-0");
        assert_eq!(book.title, "Dune");
        assert_eq!(book.author, None);
        assert_eq!(book.publisher.as_deref(), Some("Chilton"));
    }

    #[test]
    fn whitespace_title_is_rejected() {
        let err = NewBook::new("1", "   ").validated().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn student_period_zero_is_valid_but_absent_is_not() {
        assert_eq!(
            NewStudent::new("Ada", 0).validated().unwrap(),
            ("Ada".to_string(), 0)
        );
        let missing = NewStudent {
            full_name: "Ada".into(),
            period: None,
        };
        assert!(missing.validated().unwrap_err().is_validation());
    }

    #[test]
    fn loan_due_date_cannot_precede_checkout() {
        let today = NaiveDate::from_ymd_opt(2024, 9, 10).unwrap();
        let loan = NewLoan {
            copy_id: 1,
            student_id: 1,
            due_date: NaiveDate::from_ymd_opt(2024, 9, 9).unwrap(),
            checkout_date: None,
        };
        assert!(loan.validated(today).unwrap_err().is_validation());

        let same_day = NewLoan {
            due_date: today,
            ..loan
        };
        assert_eq!(same_day.validated(today).unwrap(), (today, today));
    }

    #[test]
    fn display_title_omits_blank_author() {
        let mut book = Book {
            id: 1,
            isbn: "1".into(),
            title: "Emma".into(),
            author: Some("Jane Austen".into()),
            publisher: None,
            published_year: None,
        };
        assert_eq!(book.to_string(), "Emma - Jane Austen");
        book.author = Some(" ".into());
        assert_eq!(book.to_string(), "Emma");
    }
}
