//! Every SQL statement the operation modules run. Keeping them in one place
//! lets the store compile the whole set at startup.

/// Schema version written to `PRAGMA user_version`.
pub(crate) const SCHEMA_VERSION: i64 = 1;

pub(crate) const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS books (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        isbn TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        author TEXT,
        publisher TEXT,
        published_year INTEGER
    );

    CREATE TABLE IF NOT EXISTS book_copies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_id INTEGER NOT NULL,
        copy_number INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'available',
        location TEXT,
        copy_barcode TEXT UNIQUE,
        UNIQUE (book_id, copy_number),
        FOREIGN KEY (book_id) REFERENCES books(id)
    );

    CREATE TABLE IF NOT EXISTS students (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        full_name TEXT NOT NULL,
        period INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS loans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_copy_id INTEGER NOT NULL,
        student_id INTEGER NOT NULL,
        checkout_date TEXT NOT NULL,
        due_date TEXT NOT NULL,
        return_date TEXT,
        FOREIGN KEY (book_copy_id) REFERENCES book_copies(id),
        FOREIGN KEY (student_id) REFERENCES students(id)
    );

    CREATE INDEX IF NOT EXISTS idx_loans_outstanding ON loans(due_date) WHERE return_date IS NULL;
";

pub(crate) const UPSERT_BOOK: &str = "
    INSERT INTO books (isbn, title, author, publisher, published_year)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(isbn) DO UPDATE SET
        title = excluded.title,
        author = excluded.author,
        publisher = COALESCE(excluded.publisher, books.publisher),
        published_year = COALESCE(excluded.published_year, books.published_year)";

pub(crate) const BOOK_ID_BY_ISBN: &str = "SELECT id FROM books WHERE isbn = ?1";

pub(crate) const LIST_BOOKS: &str = "
    SELECT id, isbn, title, author, publisher, published_year
    FROM books
    ORDER BY title COLLATE NOCASE, isbn";

pub(crate) const SEARCH_BOOKS: &str = "
    SELECT id, isbn, title, author, publisher, published_year
    FROM books
    WHERE title LIKE ?1 ESCAPE '\\'
    ORDER BY title COLLATE NOCASE, isbn";

/// Computes the next copy number and inserts in one statement so the maximum
/// cannot move between the read and the write.
pub(crate) const INSERT_NEXT_COPY: &str = "
    INSERT INTO book_copies (book_id, copy_number, location, copy_barcode)
    SELECT ?1, COALESCE(MAX(copy_number), 0) + 1, ?2, ?3
    FROM book_copies
    WHERE book_id = ?1";

pub(crate) const COPY_NUMBER_BY_ID: &str = "SELECT copy_number FROM book_copies WHERE id = ?1";

pub(crate) const LIST_COPIES: &str = "
    SELECT c.id, c.book_id, b.isbn, b.title, c.copy_number, c.status, c.location, c.copy_barcode
    FROM book_copies c
    INNER JOIN books b ON b.id = c.book_id
    ORDER BY b.title COLLATE NOCASE, b.isbn, c.copy_number";

pub(crate) const COPY_EXISTS: &str = "SELECT 1 FROM book_copies WHERE id = ?1";

pub(crate) const INSERT_STUDENT: &str =
    "INSERT INTO students (full_name, period) VALUES (?1, ?2)";

pub(crate) const LIST_STUDENTS: &str = "
    SELECT id, full_name, period
    FROM students
    ORDER BY period, full_name COLLATE NOCASE, id";

pub(crate) const SEARCH_STUDENTS: &str = "
    SELECT id, full_name, period
    FROM students
    WHERE full_name LIKE ?1 ESCAPE '\\'
    ORDER BY full_name COLLATE NOCASE, period, id";

pub(crate) const STUDENT_EXISTS: &str = "SELECT 1 FROM students WHERE id = ?1";

pub(crate) const INSERT_LOAN: &str = "
    INSERT INTO loans (book_copy_id, student_id, checkout_date, due_date)
    VALUES (?1, ?2, ?3, ?4)";

pub(crate) const OUTSTANDING_CHECKOUT_DATE: &str =
    "SELECT checkout_date FROM loans WHERE id = ?1 AND return_date IS NULL";

pub(crate) const CLOSE_LOAN: &str =
    "UPDATE loans SET return_date = ?2 WHERE id = ?1 AND return_date IS NULL";

pub(crate) const LIST_OUTSTANDING_LOANS: &str = "
    SELECT l.id, c.id, b.isbn, b.title, c.copy_number, s.id, s.full_name,
           l.checkout_date, l.due_date, l.return_date
    FROM loans l
    INNER JOIN book_copies c ON c.id = l.book_copy_id
    INNER JOIN books b ON b.id = c.book_id
    INNER JOIN students s ON s.id = l.student_id
    WHERE l.return_date IS NULL
    ORDER BY l.due_date, l.id";

/// The statements compiled into the connection cache when the store opens.
pub(crate) const ALL: &[&str] = &[
    UPSERT_BOOK,
    BOOK_ID_BY_ISBN,
    LIST_BOOKS,
    SEARCH_BOOKS,
    INSERT_NEXT_COPY,
    COPY_NUMBER_BY_ID,
    LIST_COPIES,
    COPY_EXISTS,
    INSERT_STUDENT,
    LIST_STUDENTS,
    SEARCH_STUDENTS,
    STUDENT_EXISTS,
    INSERT_LOAN,
    OUTSTANDING_CHECKOUT_DATE,
    CLOSE_LOAN,
    LIST_OUTSTANDING_LOANS,
];

/// Turn a user fragment into a `LIKE` pattern that matches it as a literal
/// substring. Pairs with `ESCAPE '\'` in the search statements.
pub(crate) fn contains_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for ch in fragment.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
