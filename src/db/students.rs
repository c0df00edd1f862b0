use rusqlite::{params, Connection, Row};

use crate::error::{LibraryResult, StorageContext};
use crate::models::{InsertResult, NewStudent, Student};

use super::statements::{contains_pattern, INSERT_STUDENT, LIST_STUDENTS, SEARCH_STUDENTS};

/// Insert a borrower. Period 0 is a real period, only a missing one is refused.
pub fn add_student(conn: &Connection, student: &NewStudent) -> LibraryResult<InsertResult> {
    let (full_name, period) = student.validated()?;

    conn.prepare_cached(INSERT_STUDENT)
        .context("failed to prepare student insert")?
        .execute(params![full_name, period])
        .context("failed to insert student")?;

    Ok(InsertResult {
        success: true,
        id: conn.last_insert_rowid(),
    })
}

/// Students grouped by period, alphabetical within each period.
pub fn list_students(conn: &Connection) -> LibraryResult<Vec<Student>> {
    let mut stmt = conn
        .prepare_cached(LIST_STUDENTS)
        .context("failed to prepare student query")?;

    let students = stmt
        .query_map([], student_from_row)
        .context("failed to load students")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect students")?;

    Ok(students)
}

/// Students whose name contains `fragment`, alphabetical first and then by
/// period so namesakes in different periods stay adjacent.
pub fn search_students(conn: &Connection, fragment: &str) -> LibraryResult<Vec<Student>> {
    let mut stmt = conn
        .prepare_cached(SEARCH_STUDENTS)
        .context("failed to prepare student search")?;

    let students = stmt
        .query_map([contains_pattern(fragment)], student_from_row)
        .context("failed to search students")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect student search results")?;

    Ok(students)
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        full_name: row.get(1)?,
        period: row.get(2)?,
    })
}
