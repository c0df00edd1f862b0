//! Persistence module split across logical submodules.

mod books;
mod connection;
mod copies;
mod loans;
mod statements;
mod students;

pub use books::{add_book, list_books, search_books};
pub use connection::{data_dir, default_db_path, default_log_path, Store};
pub use copies::{add_copy, list_copies};
pub use loans::{add_loan, list_outstanding_loans, return_loan};
pub use students::{add_student, list_students, search_students};
