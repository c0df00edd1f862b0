use chrono::{Days, NaiveDate};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use serde_json::{Map, Value};

use crate::dispatch::{ADD_BOOK, ADD_COPY, ADD_LOAN, ADD_STUDENT};

/// Default loan length used to pre-fill the due date.
const LOAN_DAYS: u64 = 14;

/// Which add-flow a form belongs to. Drives the popup title and the channel the
/// form submits to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FormKind {
    Book,
    Copy,
    Student,
    Loan,
}

/// What a field accepts while typing. Final validation happens in the
/// dispatcher; this only keeps obvious garbage out of numeric inputs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FieldInput {
    Text,
    Integer,
    Date,
}

#[derive(Clone, Debug)]
pub(crate) struct FormField {
    pub(crate) label: &'static str,
    pub(crate) key: &'static str,
    pub(crate) value: String,
    pub(crate) required: bool,
    pub(crate) input: FieldInput,
}

impl FormField {
    fn new(label: &'static str, key: &'static str, required: bool, input: FieldInput) -> Self {
        Self {
            label,
            key,
            value: String::new(),
            required,
            input,
        }
    }

    fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    fn accepts(&self, ch: char) -> bool {
        match self.input {
            FieldInput::Text => !ch.is_control(),
            FieldInput::Integer => ch.is_ascii_digit(),
            FieldInput::Date => ch.is_ascii_digit() || ch == '-',
        }
    }
}

/// Modal form state shared by every add-flow.
#[derive(Clone, Debug)]
pub(crate) struct Form {
    pub(crate) kind: FormKind,
    pub(crate) fields: Vec<FormField>,
    pub(crate) active: usize,
    pub(crate) error: Option<String>,
}

impl Form {
    fn new(kind: FormKind, fields: Vec<FormField>) -> Self {
        Self {
            kind,
            fields,
            active: 0,
            error: None,
        }
    }

    pub(crate) fn book() -> Self {
        Self::new(
            FormKind::Book,
            vec![
                FormField::new("ISBN", "isbn", true, FieldInput::Text),
                FormField::new("Title", "title", true, FieldInput::Text),
                FormField::new("Author", "author", false, FieldInput::Text),
                FormField::new("Publisher", "publisher", false, FieldInput::Text),
                FormField::new("Year", "published_year", false, FieldInput::Integer),
            ],
        )
    }

    /// Copy form, optionally seeded with the ISBN of the selected copy row so
    /// adding "one more" is a single keystroke.
    pub(crate) fn copy(isbn: Option<&str>) -> Self {
        Self::new(
            FormKind::Copy,
            vec![
                FormField::new("ISBN", "isbn", true, FieldInput::Text)
                    .with_value(isbn.unwrap_or_default()),
                FormField::new("Location", "location", false, FieldInput::Text),
                FormField::new("Barcode", "barcode", false, FieldInput::Text),
            ],
        )
    }

    pub(crate) fn student() -> Self {
        Self::new(
            FormKind::Student,
            vec![
                FormField::new("Name", "full_name", true, FieldInput::Text),
                FormField::new("Period", "period", true, FieldInput::Integer),
            ],
        )
    }

    /// Loan form with the due date pre-filled two weeks out from `today`.
    pub(crate) fn loan(today: NaiveDate) -> Self {
        let due = today
            .checked_add_days(Days::new(LOAN_DAYS))
            .unwrap_or(today);
        Self::new(
            FormKind::Loan,
            vec![
                FormField::new("Copy ID", "copy_id", true, FieldInput::Integer),
                FormField::new("Student ID", "student_id", true, FieldInput::Integer),
                FormField::new("Due", "due_date", true, FieldInput::Date)
                    .with_value(due.to_string()),
                FormField::new("Checkout", "checkout_date", false, FieldInput::Date),
            ],
        )
    }

    pub(crate) fn title(&self) -> &'static str {
        match self.kind {
            FormKind::Book => "Add Book",
            FormKind::Copy => "Add Copy",
            FormKind::Student => "Add Student",
            FormKind::Loan => "Record Loan",
        }
    }

    pub(crate) fn channel(&self) -> &'static str {
        match self.kind {
            FormKind::Book => ADD_BOOK,
            FormKind::Copy => ADD_COPY,
            FormKind::Student => ADD_STUDENT,
            FormKind::Loan => ADD_LOAN,
        }
    }

    pub(crate) fn next_field(&mut self) {
        self.active = (self.active + 1) % self.fields.len();
    }

    pub(crate) fn previous_field(&mut self) {
        self.active = (self.active + self.fields.len() - 1) % self.fields.len();
    }

    /// Append a character to the active field, returning whether it was taken.
    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        let field = &mut self.fields[self.active];
        if field.accepts(ch) {
            field.value.push(ch);
            true
        } else {
            false
        }
    }

    pub(crate) fn backspace(&mut self) {
        self.fields[self.active].value.pop();
    }

    /// Request payload for the dispatcher. Blank fields are omitted so the
    /// dispatcher sees them as absent; integer fields are sent as numbers when
    /// they parse and as text otherwise, leaving the verdict to validation.
    pub(crate) fn payload(&self) -> Value {
        let mut map = Map::new();
        for field in &self.fields {
            let value = field.value.trim();
            if value.is_empty() {
                continue;
            }
            let json = match field.input {
                FieldInput::Integer => value
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::from(value)),
                FieldInput::Text | FieldInput::Date => Value::from(value),
            };
            map.insert(field.key.to_string(), json);
        }
        Value::Object(map)
    }

    /// Render one field as `Label: value`, highlighting the focused field.
    pub(crate) fn build_line(&self, index: usize) -> Line<'static> {
        let field = &self.fields[index];
        let is_active = index == self.active;

        let display = if field.value.is_empty() {
            if field.required {
                "<required>".to_string()
            } else {
                "<optional>".to_string()
            }
        } else {
            field.value.clone()
        };

        let style = if is_active {
            Style::default().fg(Color::Yellow)
        } else if field.value.is_empty() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };

        Line::from(vec![
            Span::raw(format!("{}: ", field.label)),
            Span::styled(display, style),
        ])
    }

    /// Cursor column offset for the active field, counted in characters.
    pub(crate) fn cursor_offset(&self) -> usize {
        let field = &self.fields[self.active];
        field.label.chars().count() + 2 + field.value.chars().count()
    }
}

/// Confirmation state for closing a loan.
#[derive(Clone, Debug)]
pub(crate) struct ConfirmReturn {
    pub(crate) loan_id: i64,
    pub(crate) title: String,
    pub(crate) student_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_fields_refuse_letters() {
        let mut form = Form::student();
        form.next_field();
        assert!(!form.push_char('x'));
        assert!(form.push_char('0'));
        assert_eq!(form.fields[1].value, "0");
    }

    #[test]
    fn payload_skips_blank_fields_and_types_integers() {
        let mut form = Form::book();
        for ch in "978".chars() {
            form.push_char(ch);
        }
        form.next_field();
        for ch in "Dune".chars() {
            form.push_char(ch);
        }
        form.active = 4;
        for ch in "1965".chars() {
            form.push_char(ch);
        }
        assert_eq!(
            form.payload(),
            json!({ "isbn": "978", "title": "Dune", "published_year": 1965 })
        );
    }

    #[test]
    fn focus_wraps_both_ways() {
        let mut form = Form::copy(Some("123"));
        assert_eq!(form.fields[0].value, "123");
        form.previous_field();
        assert_eq!(form.active, form.fields.len() - 1);
        form.next_field();
        assert_eq!(form.active, 0);
    }

    #[test]
    fn loan_form_prefills_due_date() {
        let today = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        let mut form = Form::loan(today);
        form.push_char('7');
        assert_eq!(
            form.payload(),
            json!({ "copy_id": 7, "due_date": "2024-09-15" })
        );
        assert_eq!(form.channel(), ADD_LOAN);
    }

    #[test]
    fn cursor_sits_after_value() {
        let mut form = Form::student();
        form.push_char('A');
        assert_eq!(form.cursor_offset(), "Name: A".len());
    }
}
