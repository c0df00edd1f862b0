use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::error::{LibraryError, LibraryResult, StorageContext};
use crate::models::{InsertResult, Loan, NewLoan, ReturnLoan, UpdateResult};

use super::statements::{
    CLOSE_LOAN, COPY_EXISTS, INSERT_LOAN, LIST_OUTSTANDING_LOANS, OUTSTANDING_CHECKOUT_DATE,
    STUDENT_EXISTS,
};

/// Record a loan of one copy to one student. Both rows must exist; the copy's
/// status is left untouched.
pub fn add_loan(conn: &Connection, loan: &NewLoan, today: NaiveDate) -> LibraryResult<InsertResult> {
    let (checkout_date, due_date) = loan.validated(today)?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .context("failed to begin loan transaction")?;

    if !exists(&tx, COPY_EXISTS, loan.copy_id)? {
        return Err(LibraryError::not_found("copy", loan.copy_id));
    }
    if !exists(&tx, STUDENT_EXISTS, loan.student_id)? {
        return Err(LibraryError::not_found("student", loan.student_id));
    }

    tx.prepare_cached(INSERT_LOAN)
        .context("failed to prepare loan insert")?
        .execute(params![loan.copy_id, loan.student_id, checkout_date, due_date])
        .context("failed to insert loan")?;
    let id = tx.last_insert_rowid();

    tx.commit().context("failed to commit loan")?;

    Ok(InsertResult { success: true, id })
}

/// Close an outstanding loan. The return date defaults to `today` and may not
/// precede the checkout date.
pub fn return_loan(
    conn: &Connection,
    request: &ReturnLoan,
    today: NaiveDate,
) -> LibraryResult<UpdateResult> {
    let checkout_date: NaiveDate = conn
        .prepare_cached(OUTSTANDING_CHECKOUT_DATE)
        .context("failed to prepare loan lookup")?
        .query_row([request.loan_id], |row| row.get(0))
        .optional()
        .context("failed to look up loan")?
        .ok_or_else(|| LibraryError::not_found("outstanding loan", request.loan_id))?;

    let return_date = request.return_date.unwrap_or(today);
    if return_date < checkout_date {
        return Err(LibraryError::validation(format!(
            "Return date {return_date} is before checkout date {checkout_date}."
        )));
    }

    let changes = conn
        .prepare_cached(CLOSE_LOAN)
        .context("failed to prepare loan update")?
        .execute(params![request.loan_id, return_date])
        .context("failed to close loan")?;

    Ok(UpdateResult {
        success: changes > 0,
        changes,
    })
}

/// Loans without a return date, soonest due first.
pub fn list_outstanding_loans(conn: &Connection) -> LibraryResult<Vec<Loan>> {
    let mut stmt = conn
        .prepare_cached(LIST_OUTSTANDING_LOANS)
        .context("failed to prepare loan query")?;

    let loans = stmt
        .query_map([], |row| {
            Ok(Loan {
                id: row.get(0)?,
                copy_id: row.get(1)?,
                isbn: row.get(2)?,
                title: row.get(3)?,
                copy_number: row.get(4)?,
                student_id: row.get(5)?,
                student_name: row.get(6)?,
                checkout_date: row.get(7)?,
                due_date: row.get(8)?,
                return_date: row.get(9)?,
            })
        })
        .context("failed to load loans")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect loans")?;

    Ok(loans)
}

fn exists(conn: &Connection, sql: &str, id: i64) -> LibraryResult<bool> {
    let found = conn
        .prepare_cached(sql)
        .context("failed to prepare existence check")?
        .query_row([id], |_| Ok(()))
        .optional()
        .context("failed to check referenced row")?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{add_book, add_copy, add_student, Store};
    use crate::models::{NewBook, NewCopy, NewStudent};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded() -> (Store, i64, i64) {
        let store = Store::open_in_memory().unwrap();
        add_book(store.conn(), &NewBook::new("1", "Matilda")).unwrap();
        let copy = add_copy(store.conn(), &NewCopy::new("1")).unwrap();
        let student = add_student(store.conn(), &NewStudent::new("Ava", 2)).unwrap();
        (store, copy.id, student.id)
    }

    #[test]
    fn loan_lifecycle() {
        let (store, copy_id, student_id) = seeded();
        let today = date(2024, 9, 1);
        let loan = NewLoan {
            copy_id,
            student_id,
            due_date: date(2024, 9, 15),
            checkout_date: None,
        };
        let created = add_loan(store.conn(), &loan, today).unwrap();

        let outstanding = list_outstanding_loans(store.conn()).unwrap();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].id, created.id);
        assert_eq!(outstanding[0].checkout_date, today);
        assert_eq!(outstanding[0].student_name, "Ava");
        assert_eq!(outstanding[0].copy_number, 1);
        assert!(outstanding[0].is_overdue(date(2024, 9, 16)));

        let request = ReturnLoan {
            loan_id: created.id,
            return_date: None,
        };
        let closed = return_loan(store.conn(), &request, date(2024, 9, 10)).unwrap();
        assert_eq!(closed.changes, 1);
        assert!(list_outstanding_loans(store.conn()).unwrap().is_empty());

        let again = return_loan(store.conn(), &request, date(2024, 9, 11)).unwrap_err();
        assert!(matches!(again, LibraryError::NotFound { .. }));
    }

    #[test]
    fn missing_references_are_named() {
        let (store, copy_id, student_id) = seeded();
        let today = date(2024, 9, 1);
        let bad_copy = NewLoan {
            copy_id: copy_id + 100,
            student_id,
            due_date: today,
            checkout_date: None,
        };
        let err = add_loan(store.conn(), &bad_copy, today).unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { entity: "copy", .. }));

        let bad_student = NewLoan {
            copy_id,
            student_id: student_id + 100,
            ..bad_copy
        };
        let err = add_loan(store.conn(), &bad_student, today).unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { entity: "student", .. }));
        assert!(list_outstanding_loans(store.conn()).unwrap().is_empty());
    }

    #[test]
    fn return_before_checkout_is_rejected() {
        let (store, copy_id, student_id) = seeded();
        let loan = NewLoan {
            copy_id,
            student_id,
            checkout_date: Some(date(2024, 9, 5)),
            due_date: date(2024, 9, 20),
        };
        let created = add_loan(store.conn(), &loan, date(2024, 9, 5)).unwrap();
        let request = ReturnLoan {
            loan_id: created.id,
            return_date: Some(date(2024, 9, 4)),
        };
        let err = return_loan(store.conn(), &request, date(2024, 9, 6)).unwrap_err();
        assert!(err.is_validation());
    }
}
