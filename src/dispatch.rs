//! Request dispatcher sitting between the front end and the store. Requests
//! arrive either typed (`Request`) or as a channel name plus a JSON payload,
//! the same shape a webview bridge would send. Each request runs exactly one
//! operation and yields a serializable `Response`.

use chrono::{Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::db::{self, Store};
use crate::error::{LibraryError, LibraryResult};
use crate::models::{
    AddBookResult, AddCopyResult, Book, BookCopy, InsertResult, Loan, NewBook, NewCopy, NewLoan,
    NewStudent, ReturnLoan, Student, UpdateResult,
};

pub const ADD_BOOK: &str = "books:add";
pub const LIST_BOOKS: &str = "books:list";
pub const SEARCH_BOOKS: &str = "books:search";
pub const ADD_COPY: &str = "copies:add";
pub const LIST_COPIES: &str = "copies:list";
pub const ADD_STUDENT: &str = "students:add";
pub const LIST_STUDENTS: &str = "students:list";
pub const SEARCH_STUDENTS: &str = "students:search";
pub const ADD_LOAN: &str = "loans:add";
pub const RETURN_LOAN: &str = "loans:return";
pub const LIST_OUTSTANDING_LOANS: &str = "loans:outstanding";

/// Every channel the dispatcher answers, in display order.
pub const CHANNELS: &[&str] = &[
    ADD_BOOK,
    LIST_BOOKS,
    SEARCH_BOOKS,
    ADD_COPY,
    LIST_COPIES,
    ADD_STUDENT,
    LIST_STUDENTS,
    SEARCH_STUDENTS,
    ADD_LOAN,
    RETURN_LOAN,
    LIST_OUTSTANDING_LOANS,
];

/// One operation against the store, already decoded from its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    AddBook(NewBook),
    ListBooks,
    SearchBooks(String),
    AddCopy(NewCopy),
    ListCopies,
    AddStudent(NewStudent),
    ListStudents,
    SearchStudents(String),
    AddLoan(NewLoan),
    ReturnLoan(ReturnLoan),
    ListOutstandingLoans,
}

impl Request {
    /// Channel name this request is addressed to.
    pub fn channel(&self) -> &'static str {
        match self {
            Request::AddBook(_) => ADD_BOOK,
            Request::ListBooks => LIST_BOOKS,
            Request::SearchBooks(_) => SEARCH_BOOKS,
            Request::AddCopy(_) => ADD_COPY,
            Request::ListCopies => LIST_COPIES,
            Request::AddStudent(_) => ADD_STUDENT,
            Request::ListStudents => LIST_STUDENTS,
            Request::SearchStudents(_) => SEARCH_STUDENTS,
            Request::AddLoan(_) => ADD_LOAN,
            Request::ReturnLoan(_) => RETURN_LOAN,
            Request::ListOutstandingLoans => LIST_OUTSTANDING_LOANS,
        }
    }

    /// Build a typed request from a channel name and its JSON payload. List
    /// channels ignore the payload.
    pub fn parse(channel: &str, payload: Value) -> LibraryResult<Request> {
        let request = match channel {
            ADD_BOOK => Request::AddBook(decode::<BookPayload>(channel, payload)?.into_book()?),
            LIST_BOOKS => Request::ListBooks,
            SEARCH_BOOKS => Request::SearchBooks(fragment(channel, payload)?),
            ADD_COPY => Request::AddCopy(decode::<CopyPayload>(channel, payload)?.into_copy()?),
            LIST_COPIES => Request::ListCopies,
            ADD_STUDENT => {
                Request::AddStudent(decode::<StudentPayload>(channel, payload)?.into_student()?)
            }
            LIST_STUDENTS => Request::ListStudents,
            SEARCH_STUDENTS => Request::SearchStudents(fragment(channel, payload)?),
            ADD_LOAN => Request::AddLoan(decode::<LoanPayload>(channel, payload)?.into_loan()?),
            RETURN_LOAN => {
                Request::ReturnLoan(decode::<ReturnPayload>(channel, payload)?.into_return()?)
            }
            LIST_OUTSTANDING_LOANS => Request::ListOutstandingLoans,
            other => return Err(LibraryError::UnknownOperation(other.to_string())),
        };
        Ok(request)
    }
}

/// Operation results. Serialized untagged, so the front end sees the bare
/// result object or row array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    BookAdded(AddBookResult),
    CopyAdded(AddCopyResult),
    Inserted(InsertResult),
    Updated(UpdateResult),
    Books(Vec<Book>),
    Copies(Vec<BookCopy>),
    Students(Vec<Student>),
    Loans(Vec<Loan>),
}

impl Response {
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Owns the store for the lifetime of the session and runs one operation per
/// request.
pub struct Dispatcher {
    store: Store,
    today: fn() -> NaiveDate,
}

impl Dispatcher {
    pub fn new(store: Store) -> Self {
        Self::with_clock(store, local_today)
    }

    /// Use a fixed source for "today" when defaulting loan dates.
    pub fn with_clock(store: Store, today: fn() -> NaiveDate) -> Self {
        Self { store, today }
    }

    /// Parse a channel request and run it.
    pub fn invoke(&mut self, channel: &str, payload: Value) -> LibraryResult<Response> {
        let request = Request::parse(channel, payload).inspect_err(|err| {
            warn!(channel, error = %err, "request rejected");
        })?;
        self.handle(request)
    }

    /// Run a typed request, logging rejections at `warn` and storage
    /// failures at `error`.
    pub fn handle(&mut self, request: Request) -> LibraryResult<Response> {
        let channel = request.channel();
        debug!(channel, "handling request");

        let result = self.run(request);
        match &result {
            Ok(_) => debug!(channel, "request completed"),
            Err(err) if err.is_validation() => warn!(channel, error = %err, "request rejected"),
            Err(err) => error!(channel, error = %err, "request failed"),
        }
        result
    }

    fn run(&mut self, request: Request) -> LibraryResult<Response> {
        let conn = self.store.conn();
        let today = (self.today)();

        let response = match request {
            Request::AddBook(book) => Response::BookAdded(db::add_book(conn, &book)?),
            Request::ListBooks => Response::Books(db::list_books(conn)?),
            Request::SearchBooks(fragment) => Response::Books(db::search_books(conn, &fragment)?),
            Request::AddCopy(copy) => Response::CopyAdded(db::add_copy(conn, &copy)?),
            Request::ListCopies => Response::Copies(db::list_copies(conn)?),
            Request::AddStudent(student) => Response::Inserted(db::add_student(conn, &student)?),
            Request::ListStudents => Response::Students(db::list_students(conn)?),
            Request::SearchStudents(fragment) => {
                Response::Students(db::search_students(conn, &fragment)?)
            }
            Request::AddLoan(loan) => Response::Inserted(db::add_loan(conn, &loan, today)?),
            Request::ReturnLoan(request) => {
                Response::Updated(db::return_loan(conn, &request, today)?)
            }
            Request::ListOutstandingLoans => Response::Loans(db::list_outstanding_loans(conn)?),
        };
        Ok(response)
    }

    /// Shut down the session and close the database.
    pub fn close(self) -> LibraryResult<()> {
        self.store.close()
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

fn decode<T: DeserializeOwned>(channel: &str, payload: Value) -> LibraryResult<T> {
    serde_json::from_value(payload).map_err(|source| LibraryError::Payload {
        channel: channel.to_string(),
        source,
    })
}

/// Search payloads arrive as a bare string, an object with `fragment`, or
/// nothing at all (match everything).
fn fragment(channel: &str, payload: Value) -> LibraryResult<String> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Fragment {
        Bare(String),
        Object {
            #[serde(default)]
            fragment: String,
        },
    }

    if payload.is_null() {
        return Ok(String::new());
    }
    Ok(match decode(channel, payload)? {
        Fragment::Bare(fragment) | Fragment::Object { fragment } => fragment,
    })
}

#[derive(Deserialize)]
struct BookPayload {
    #[serde(default)]
    isbn: Option<Value>,
    #[serde(default)]
    title: Option<Value>,
    #[serde(default)]
    author: Option<Value>,
    #[serde(default)]
    publisher: Option<Value>,
    #[serde(default)]
    published_year: Option<Value>,
}

impl BookPayload {
    fn into_book(self) -> LibraryResult<NewBook> {
        Ok(NewBook {
            isbn: text(self.isbn.as_ref(), "ISBN")?.unwrap_or_default(),
            title: text(self.title.as_ref(), "Title")?.unwrap_or_default(),
            author: text(self.author.as_ref(), "Author")?,
            publisher: text(self.publisher.as_ref(), "Publisher")?,
            published_year: coerce_int(self.published_year.as_ref(), "Year")?,
        })
    }
}

#[derive(Deserialize)]
struct CopyPayload {
    #[serde(default)]
    isbn: Option<Value>,
    #[serde(default)]
    location: Option<Value>,
    #[serde(default)]
    barcode: Option<Value>,
}

impl CopyPayload {
    fn into_copy(self) -> LibraryResult<NewCopy> {
        Ok(NewCopy {
            isbn: text(self.isbn.as_ref(), "ISBN")?.unwrap_or_default(),
            location: text(self.location.as_ref(), "Location")?,
            barcode: text(self.barcode.as_ref(), "Barcode")?,
        })
    }
}

#[derive(Deserialize)]
struct StudentPayload {
    #[serde(default)]
    full_name: Option<Value>,
    #[serde(default)]
    period: Option<Value>,
}

impl StudentPayload {
    fn into_student(self) -> LibraryResult<NewStudent> {
        Ok(NewStudent {
            full_name: text(self.full_name.as_ref(), "Student name")?.unwrap_or_default(),
            period: coerce_int(self.period.as_ref(), "Period")?,
        })
    }
}

#[derive(Deserialize)]
struct LoanPayload {
    #[serde(default)]
    copy_id: Option<Value>,
    #[serde(default)]
    student_id: Option<Value>,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    #[serde(default)]
    checkout_date: Option<NaiveDate>,
}

impl LoanPayload {
    fn into_loan(self) -> LibraryResult<NewLoan> {
        Ok(NewLoan {
            copy_id: required_int(self.copy_id.as_ref(), "Copy")?,
            student_id: required_int(self.student_id.as_ref(), "Student")?,
            due_date: self
                .due_date
                .ok_or_else(|| LibraryError::validation("Due date is required."))?,
            checkout_date: self.checkout_date,
        })
    }
}

#[derive(Deserialize)]
struct ReturnPayload {
    #[serde(default)]
    loan_id: Option<Value>,
    #[serde(default)]
    return_date: Option<NaiveDate>,
}

impl ReturnPayload {
    fn into_return(self) -> LibraryResult<ReturnLoan> {
        Ok(ReturnLoan {
            loan_id: required_int(self.loan_id.as_ref(), "Loan")?,
            return_date: self.return_date,
        })
    }
}

/// Accept a string, or a number written out as text (an ISBN typed as a
/// number). Null and a missing value count as absent; blank text is left for
/// `validated` to reject.
fn text(value: Option<&Value>, field: &str) -> LibraryResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(_) => Err(LibraryError::validation(format!("{field} must be text."))),
    }
}

fn required_int(value: Option<&Value>, field: &str) -> LibraryResult<i64> {
    coerce_int(value, field)?
        .ok_or_else(|| LibraryError::validation(format!("{field} is required.")))
}

/// Accept a JSON integer, an integral float, or a numeric string. Null, a
/// missing value, and a blank string all count as absent.
fn coerce_int(value: Option<&Value>, field: &str) -> LibraryResult<Option<i64>> {
    let invalid = || LibraryError::validation(format!("{field} must be a whole number."));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => match number.as_i64() {
            Some(n) => Ok(Some(n)),
            None => number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| Some(f as i64))
                .ok_or_else(invalid),
        },
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() {
                Ok(None)
            } else {
                text.parse::<i64>().map(Some).map_err(|_| invalid())
            }
        }
        Some(_) => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_payload_shapes() {
        assert_eq!(
            Request::parse(SEARCH_BOOKS, json!("hob")).unwrap(),
            Request::SearchBooks("hob".into())
        );
        assert_eq!(
            Request::parse(SEARCH_STUDENTS, json!({ "fragment": "ann" })).unwrap(),
            Request::SearchStudents("ann".into())
        );
        assert_eq!(
            Request::parse(SEARCH_BOOKS, Value::Null).unwrap(),
            Request::SearchBooks(String::new())
        );
    }

    #[test]
    fn student_period_is_coerced() {
        let parsed = Request::parse(ADD_STUDENT, json!({ "full_name": "Ann", "period": " 4 " }))
            .unwrap();
        assert_eq!(parsed, Request::AddStudent(NewStudent::new("Ann", 4)));

        let parsed =
            Request::parse(ADD_STUDENT, json!({ "full_name": "Ann", "period": 2.0 })).unwrap();
        assert_eq!(parsed, Request::AddStudent(NewStudent::new("Ann", 2)));

        let err = Request::parse(ADD_STUDENT, json!({ "full_name": "Ann", "period": "third" }))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn numeric_isbn_is_read_as_text() {
        let parsed =
            Request::parse(ADD_BOOK, json!({ "isbn": 9780064471190_i64, "title": "Holes" }))
                .unwrap();
        assert_eq!(parsed, Request::AddBook(NewBook::new("9780064471190", "Holes")));
    }

    #[test]
    fn null_text_fields_count_as_absent() {
        let parsed = Request::parse(ADD_BOOK, json!({ "isbn": "1", "title": "T", "author": null }))
            .unwrap();
        assert_eq!(parsed, Request::AddBook(NewBook::new("1", "T")));

        let parsed = Request::parse(ADD_COPY, json!({ "isbn": null })).unwrap();
        assert_eq!(parsed, Request::AddCopy(NewCopy::default()));

        let err = Request::parse(ADD_STUDENT, json!({ "full_name": ["Ann"], "period": 1 }))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn missing_loan_fields_are_validation_errors() {
        let err = Request::parse(ADD_LOAN, json!({ "copy_id": 1, "student_id": 2 })).unwrap_err();
        assert!(err.is_validation());
        let err = Request::parse(RETURN_LOAN, json!({})).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn malformed_payload_is_a_payload_error() {
        let err = Request::parse(ADD_BOOK, json!(42)).unwrap_err();
        assert!(matches!(err, LibraryError::Payload { .. }));
        let err = Request::parse(ADD_LOAN, json!({ "copy_id": 1, "student_id": 1, "due_date": "soon" }))
            .unwrap_err();
        assert!(matches!(err, LibraryError::Payload { .. }));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let err = Request::parse("books:delete", Value::Null).unwrap_err();
        assert!(matches!(err, LibraryError::UnknownOperation(ref name) if name == "books:delete"));
    }

    #[test]
    fn every_channel_round_trips_through_its_request() {
        for channel in CHANNELS {
            let payload = match *channel {
                ADD_BOOK => json!({ "isbn": "1", "title": "T" }),
                ADD_COPY => json!({ "isbn": "1" }),
                ADD_STUDENT => json!({ "full_name": "A", "period": 1 }),
                ADD_LOAN => json!({ "copy_id": 1, "student_id": 1, "due_date": "2024-01-02" }),
                RETURN_LOAN => json!({ "loan_id": 1 }),
                _ => Value::Null,
            };
            assert_eq!(Request::parse(channel, payload).unwrap().channel(), *channel);
        }
    }
}
