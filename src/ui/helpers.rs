use anyhow::Error;
use chrono::NaiveDate;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::models::{Book, BookCopy, Loan, Student};

/// One catalog row: ISBN, then `Title - Author`, then publication details.
pub(crate) fn book_line(book: &Book) -> Line<'static> {
    let mut spans = vec![
        Span::styled(format!("{:<15} ", book.isbn), Style::default().fg(Color::DarkGray)),
        Span::raw(book.display_title()),
    ];
    let details: Vec<String> = book
        .publisher
        .iter()
        .cloned()
        .chain(book.published_year.map(|year| year.to_string()))
        .collect();
    if !details.is_empty() {
        spans.push(Span::styled(
            format!("  ({})", details.join(", ")),
            Style::default().fg(Color::Gray),
        ));
    }
    Line::from(spans)
}

pub(crate) fn copy_line(copy: &BookCopy) -> Line<'static> {
    let mut spans = vec![
        Span::styled(format!("#{:<5} ", copy.id), Style::default().fg(Color::DarkGray)),
        Span::raw(format!("{} (copy {})", copy.title, copy.copy_number)),
        Span::styled(format!("  [{}]", copy.status), Style::default().fg(Color::Green)),
    ];
    if let Some(location) = &copy.location {
        spans.push(Span::raw(format!("  @ {location}")));
    }
    if let Some(barcode) = &copy.barcode {
        spans.push(Span::styled(
            format!("  {barcode}"),
            Style::default().fg(Color::Gray),
        ));
    }
    Line::from(spans)
}

pub(crate) fn student_line(student: &Student) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("#{:<5} ", student.id),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("P{:<3} ", student.period),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(student.full_name.clone()),
    ])
}

/// Loan row; the due date turns red once it has passed.
pub(crate) fn loan_line(loan: &Loan, today: NaiveDate) -> Line<'static> {
    let due_style = if loan.is_overdue(today) {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Gray)
    };
    Line::from(vec![
        Span::raw(format!(
            "{} (copy {}) -> {}",
            loan.title, loan.copy_number, loan.student_name
        )),
        Span::styled(
            format!("  out {}", loan.checkout_date),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!("  due {}", loan.due_date), due_style),
    ])
}

/// Produce a rectangle centered within `area` that spans the requested percent
/// of the width and height. Used for modal dialogs.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1]);

    vertical[1]
}

/// Extract the most relevant error message from a chained error.
pub(crate) fn surface_error(err: &Error) -> String {
    err.chain()
        .last()
        .map(|cause| cause.to_string())
        .unwrap_or_else(|| err.to_string())
}

/// Clamp a selection index after the underlying list changed length.
pub(crate) fn clamp_selection(selected: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        selected.min(len - 1)
    }
}

/// Move a selection by `offset`, stopping at either end.
pub(crate) fn step_selection(selected: usize, offset: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let target = selected as isize + offset;
    target.clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn selection_stays_in_bounds() {
        assert_eq!(step_selection(0, -1, 3), 0);
        assert_eq!(step_selection(1, 5, 3), 2);
        assert_eq!(step_selection(2, -1, 3), 1);
        assert_eq!(step_selection(4, 1, 0), 0);
        assert_eq!(clamp_selection(9, 3), 2);
        assert_eq!(clamp_selection(9, 0), 0);
    }

    #[test]
    fn surface_error_prefers_root_cause() {
        let err = anyhow!("UNIQUE constraint failed").context("failed to insert copy");
        assert_eq!(surface_error(&err), "UNIQUE constraint failed");
    }

    #[test]
    fn book_line_lists_available_details() {
        let book = Book {
            id: 1,
            isbn: "1".into(),
            title: "Emma".into(),
            author: None,
            publisher: Some("Penguin".into()),
            published_year: Some(1815),
        };
        let text: String = book_line(&book)
            .spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect();
        assert!(text.ends_with("Emma  (Penguin, 1815)"));
    }
}
