use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};

use crate::error::{LibraryError, LibraryResult, StorageContext};
use crate::models::{AddCopyResult, BookCopy, NewCopy};

use super::statements::{BOOK_ID_BY_ISBN, COPY_NUMBER_BY_ID, INSERT_NEXT_COPY, LIST_COPIES};

/// Register another physical copy of a cataloged book. The copy number is the
/// book's current maximum plus one, computed inside the insert itself and
/// under an immediate transaction so concurrent writers serialize.
pub fn add_copy(conn: &Connection, copy: &NewCopy) -> LibraryResult<AddCopyResult> {
    let copy = copy.validated()?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .context("failed to begin copy transaction")?;

    let book_id: i64 = tx
        .prepare_cached(BOOK_ID_BY_ISBN)
        .context("failed to prepare book lookup")?
        .query_row([&copy.isbn], |row| row.get(0))
        .optional()
        .context("failed to look up book")?
        .ok_or_else(|| LibraryError::not_found("book", &copy.isbn))?;

    tx.prepare_cached(INSERT_NEXT_COPY)
        .context("failed to prepare copy insert")?
        .execute(params![book_id, copy.location, copy.barcode])
        .map_err(|err| map_barcode_constraint(err, copy.barcode.as_deref()))?;

    let id = tx.last_insert_rowid();
    let copy_number = tx
        .prepare_cached(COPY_NUMBER_BY_ID)
        .context("failed to prepare copy lookup")?
        .query_row([id], |row| row.get(0))
        .context("failed to read copy number")?;

    tx.commit().context("failed to commit copy")?;

    Ok(AddCopyResult {
        success: true,
        id,
        copy_number,
    })
}

/// Every copy with its book's ISBN and title, ordered by title and then copy
/// number.
pub fn list_copies(conn: &Connection) -> LibraryResult<Vec<BookCopy>> {
    let mut stmt = conn
        .prepare_cached(LIST_COPIES)
        .context("failed to prepare copy query")?;

    let copies = stmt
        .query_map([], |row| {
            Ok(BookCopy {
                id: row.get(0)?,
                book_id: row.get(1)?,
                isbn: row.get(2)?,
                title: row.get(3)?,
                copy_number: row.get(4)?,
                status: row.get(5)?,
                location: row.get(6)?,
                barcode: row.get(7)?,
            })
        })
        .context("failed to load copies")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect copies")?;

    Ok(copies)
}

/// The only unique column a caller controls here is the barcode; the copy
/// number pair is computed, so any constraint hit with a barcode present is
/// reported as a duplicate barcode.
fn map_barcode_constraint(err: rusqlite::Error, barcode: Option<&str>) -> LibraryError {
    match barcode {
        Some(barcode)
            if matches!(err.sqlite_error_code(), Some(ErrorCode::ConstraintViolation))
                && err.to_string().contains("copy_barcode") =>
        {
            LibraryError::Duplicate {
                field: "barcode",
                value: barcode.to_string(),
            }
        }
        _ => LibraryError::Storage {
            context: "failed to insert copy",
            source: err,
        },
    }
}
