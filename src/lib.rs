//! Core library surface for the Library Manager terminal application.
//!
//! The store (`db`) owns the SQLite file, the dispatcher routes named requests
//! to it one at a time, and the `ui` module is a thin front end that only ever
//! talks to the dispatcher.
pub mod db;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod ui;

/// Store construction and default locations used by `main.rs`.
pub use db::{default_db_path, default_log_path, Store};

/// The request boundary the front end relies on.
pub use dispatch::{Dispatcher, Request, Response};

pub use error::{LibraryError, LibraryResult};

pub use models::{Book, BookCopy, Loan, NewBook, NewCopy, NewLoan, NewStudent, ReturnLoan, Student};

/// The interactive application entry point and state container.
pub use ui::{run_app, App};
