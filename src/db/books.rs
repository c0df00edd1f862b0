use rusqlite::{params, Connection, Row};

use crate::error::{LibraryResult, StorageContext};
use crate::models::{AddBookResult, Book, NewBook};

use super::statements::{contains_pattern, BOOK_ID_BY_ISBN, LIST_BOOKS, SEARCH_BOOKS, UPSERT_BOOK};

/// Insert a catalog entry, or refresh the title and author of the entry that
/// already owns the ISBN. Publisher and year only overwrite when supplied.
pub fn add_book(conn: &Connection, book: &NewBook) -> LibraryResult<AddBookResult> {
    let book = book.validated()?;

    let changes = conn
        .prepare_cached(UPSERT_BOOK)
        .context("failed to prepare book upsert")?
        .execute(params![
            book.isbn,
            book.title,
            book.author,
            book.publisher,
            book.published_year
        ])
        .context("failed to upsert book")?;

    // last_insert_rowid is stale when the upsert took the update branch.
    let id = conn
        .prepare_cached(BOOK_ID_BY_ISBN)
        .context("failed to prepare book lookup")?
        .query_row([&book.isbn], |row| row.get(0))
        .context("failed to read book id")?;

    Ok(AddBookResult {
        success: true,
        changes,
        id,
    })
}

/// Every catalog entry, ordered by title and then ISBN.
pub fn list_books(conn: &Connection) -> LibraryResult<Vec<Book>> {
    let mut stmt = conn
        .prepare_cached(LIST_BOOKS)
        .context("failed to prepare book query")?;

    let books = stmt
        .query_map([], book_from_row)
        .context("failed to load books")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect books")?;

    Ok(books)
}

/// Books whose title contains `fragment`, ignoring ASCII case. An empty
/// fragment returns the whole catalog.
pub fn search_books(conn: &Connection, fragment: &str) -> LibraryResult<Vec<Book>> {
    let mut stmt = conn
        .prepare_cached(SEARCH_BOOKS)
        .context("failed to prepare book search")?;

    let books = stmt
        .query_map([contains_pattern(fragment)], book_from_row)
        .context("failed to search books")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect book search results")?;

    Ok(books)
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        isbn: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        publisher: row.get(4)?,
        published_year: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    fn titles(books: &[Book]) -> Vec<&str> {
        books.iter().map(|b| b.title.as_str()).collect()
    }

    #[test]
    fn added_book_shows_up_in_listing() {
        let store = Store::open_in_memory().unwrap();
        let result = add_book(store.conn(), &NewBook::new("9780441013593", "Dune")).unwrap();
        assert!(result.success);
        assert_eq!(result.changes, 1);

        let books = list_books(store.conn()).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, result.id);
        assert_eq!(books[0].title, "Dune");
    }

    #[test]
    fn upsert_keeps_one_row_with_latest_title() {
        let store = Store::open_in_memory().unwrap();
        let first = add_book(
            store.conn(),
            &NewBook {
                publisher: Some("Ace".into()),
                ..NewBook::new("111", "Old Title").with_author("A. Writer")
            },
        )
        .unwrap();
        let second = add_book(store.conn(), &NewBook::new("111", "New Title")).unwrap();
        assert_eq!(first.id, second.id);

        let books = list_books(store.conn()).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "New Title");
        assert_eq!(books[0].author, None);
        assert_eq!(books[0].publisher.as_deref(), Some("Ace"));
    }

    #[test]
    fn invalid_book_writes_nothing() {
        let store = Store::open_in_memory().unwrap();
        assert!(add_book(store.conn(), &NewBook::new("", "Title"))
            .unwrap_err()
            .is_validation());
        assert!(add_book(store.conn(), &NewBook::new("123", ""))
            .unwrap_err()
            .is_validation());
        assert!(list_books(store.conn()).unwrap().is_empty());
    }

    #[test]
    fn listing_orders_by_title_then_isbn() {
        let store = Store::open_in_memory().unwrap();
        for (isbn, title) in [("3", "b"), ("2", "A"), ("1", "b"), ("4", "C")] {
            add_book(store.conn(), &NewBook::new(isbn, title)).unwrap();
        }
        let books = list_books(store.conn()).unwrap();
        assert_eq!(titles(&books), ["A", "b", "b", "C"]);
        assert_eq!(books[1].isbn, "1");
        assert_eq!(books[2].isbn, "3");
    }

    #[test]
    fn search_is_case_insensitive_and_literal() {
        let store = Store::open_in_memory().unwrap();
        add_book(store.conn(), &NewBook::new("1", "The Hobbit")).unwrap();
        add_book(store.conn(), &NewBook::new("2", "100% Rust")).unwrap();
        add_book(store.conn(), &NewBook::new("3", "Hobbies")).unwrap();

        assert_eq!(
            titles(&search_books(store.conn(), "HOBB").unwrap()),
            ["Hobbies", "The Hobbit"]
        );
        assert_eq!(
            titles(&search_books(store.conn(), "0%").unwrap()),
            ["100% Rust"]
        );
        assert_eq!(search_books(store.conn(), "").unwrap().len(), 3);
        assert!(search_books(store.conn(), "zzz").unwrap().is_empty());
    }
}
