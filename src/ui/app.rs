use std::mem;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use crossterm::event::KeyCode;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap};
use ratatui::Frame;
use serde_json::json;

use crate::dispatch::{Dispatcher, Request, Response, RETURN_LOAN};
use crate::models::{Book, BookCopy, Loan, Student};

use super::forms::{ConfirmReturn, Form, FormKind};
use super::helpers::{
    book_line, centered_rect, clamp_selection, copy_line, loan_line, step_selection,
    student_line, surface_error,
};

/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;
/// Rows skipped by PageUp/PageDown.
const PAGE_STEP: isize = 10;

/// Top-level tabs, one per entity the dispatcher lists.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Tab {
    Books,
    Copies,
    Students,
    Loans,
}

impl Tab {
    const ALL: [Tab; 4] = [Tab::Books, Tab::Copies, Tab::Students, Tab::Loans];

    fn index(self) -> usize {
        match self {
            Tab::Books => 0,
            Tab::Copies => 1,
            Tab::Students => 2,
            Tab::Loans => 3,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Tab::Books => "Books",
            Tab::Copies => "Copies",
            Tab::Students => "Students",
            Tab::Loans => "Loans",
        }
    }

    fn shifted(self, offset: isize) -> Tab {
        let len = Self::ALL.len() as isize;
        Self::ALL[(self.index() as isize + offset).rem_euclid(len) as usize]
    }

    fn searchable(self) -> bool {
        matches!(self, Tab::Books | Tab::Students)
    }
}

/// Fine-grained modes scoped to the current tab.
enum Mode {
    Normal,
    Searching(SearchState),
    Adding(Form),
    ConfirmReturn(ConfirmReturn),
}

/// State for an active inline search.
struct SearchState {
    query: String,
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state. All data flows through the dispatcher; the UI
/// never touches the store directly.
pub struct App {
    dispatcher: Dispatcher,
    tab: Tab,
    books: Vec<Book>,
    copies: Vec<BookCopy>,
    students: Vec<Student>,
    loans: Vec<Loan>,
    selected: [usize; 4],
    book_filter: Option<String>,
    student_filter: Option<String>,
    mode: Mode,
    status: Option<StatusMessage>,
}

impl App {
    /// Build the app and load every list once.
    pub fn new(dispatcher: Dispatcher) -> Result<Self> {
        let mut app = Self {
            dispatcher,
            tab: Tab::Books,
            books: Vec::new(),
            copies: Vec::new(),
            students: Vec::new(),
            loans: Vec::new(),
            selected: [0; 4],
            book_filter: None,
            student_filter: None,
            mode: Mode::Normal,
            status: None,
        };
        for tab in Tab::ALL {
            app.reload(tab)?;
        }
        Ok(app)
    }

    /// Hand the dispatcher back so the caller can close the store.
    pub fn into_dispatcher(self) -> Dispatcher {
        self.dispatcher
    }

    /// Process one key press. Returns `true` when the user asked to quit.
    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mode = mem::replace(&mut self.mode, Mode::Normal);

        self.mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::Searching(state) => self.handle_search(code, state)?,
            Mode::Adding(form) => self.handle_form(code, form)?,
            Mode::ConfirmReturn(confirm) => self.handle_confirm_return(code, confirm)?,
        };

        Ok(exit)
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => *exit = true,
            KeyCode::Tab | KeyCode::Right => self.switch_tab(self.tab.shifted(1)),
            KeyCode::BackTab | KeyCode::Left => self.switch_tab(self.tab.shifted(-1)),
            KeyCode::Char(ch @ '1'..='4') => {
                let index = ch as usize - '1' as usize;
                self.switch_tab(Tab::ALL[index]);
            }
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-PAGE_STEP),
            KeyCode::PageDown => self.move_selection(PAGE_STEP),
            KeyCode::Home => self.selected[self.tab.index()] = 0,
            KeyCode::End => {
                let len = self.current_len();
                self.selected[self.tab.index()] = len.saturating_sub(1);
            }
            KeyCode::Char('/') => {
                if self.tab.searchable() {
                    let query = self.current_filter().cloned().unwrap_or_default();
                    self.clear_status();
                    return Ok(Mode::Searching(SearchState { query }));
                }
                self.set_status("Search works on Books and Students.", StatusKind::Error);
            }
            KeyCode::Char('a') => {
                self.clear_status();
                return Ok(Mode::Adding(self.form_for_tab()));
            }
            KeyCode::Char('r') if self.tab == Tab::Loans => {
                if let Some(loan) = self.current_loan() {
                    return Ok(Mode::ConfirmReturn(ConfirmReturn {
                        loan_id: loan.id,
                        title: loan.title.clone(),
                        student_name: loan.student_name.clone(),
                    }));
                }
                self.set_status("No loan selected.", StatusKind::Error);
            }
            _ => {}
        }
        Ok(Mode::Normal)
    }

    fn handle_search(&mut self, code: KeyCode, mut state: SearchState) -> Result<Mode> {
        match code {
            KeyCode::Esc => {
                self.set_filter(None)?;
                return Ok(Mode::Normal);
            }
            KeyCode::Enter => {
                let count = self.current_len();
                self.set_status(
                    format!("{count} match(es) for \"{}\".", state.query),
                    StatusKind::Info,
                );
                return Ok(Mode::Normal);
            }
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::Backspace => {
                state.query.pop();
                self.set_filter(Some(state.query.clone()))?;
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                state.query.push(ch);
                self.set_filter(Some(state.query.clone()))?;
            }
            _ => {}
        }
        Ok(Mode::Searching(state))
    }

    fn handle_form(&mut self, code: KeyCode, mut form: Form) -> Result<Mode> {
        let mut keep_open = true;
        match code {
            KeyCode::Esc => {
                self.set_status(format!("{} cancelled.", form.title()), StatusKind::Info);
                keep_open = false;
            }
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.previous_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match self.submit(&form) {
                Ok(message) => {
                    self.set_status(message, StatusKind::Info);
                    keep_open = false;
                }
                Err(err) => {
                    let message = surface_error(&err);
                    form.error = Some(message.clone());
                    self.set_status(message, StatusKind::Error);
                }
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }

        if keep_open {
            Ok(Mode::Adding(form))
        } else {
            Ok(Mode::Normal)
        }
    }

    fn handle_confirm_return(&mut self, code: KeyCode, confirm: ConfirmReturn) -> Result<Mode> {
        match code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                match self.return_loan(&confirm) {
                    Ok(()) => self.set_status(
                        format!("Returned {} from {}.", confirm.title, confirm.student_name),
                        StatusKind::Info,
                    ),
                    Err(err) => self.set_status(surface_error(&err), StatusKind::Error),
                }
                Ok(Mode::Normal)
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.set_status("Return cancelled.", StatusKind::Info);
                Ok(Mode::Normal)
            }
            _ => Ok(Mode::ConfirmReturn(confirm)),
        }
    }

    /// Send a form to the dispatcher and refresh whatever it affects.
    fn submit(&mut self, form: &Form) -> Result<String> {
        let response = self
            .dispatcher
            .invoke(form.channel(), form.payload())
            .with_context(|| format!("{} failed", form.title()))?;

        let message = match response {
            Response::BookAdded(result) => {
                self.reload(Tab::Books)?;
                self.reload(Tab::Copies)?;
                self.focus(Tab::Books, |app| app.books.iter().position(|b| b.id == result.id));
                "Book saved.".to_string()
            }
            Response::CopyAdded(result) => {
                self.reload(Tab::Copies)?;
                self.focus(Tab::Copies, |app| {
                    app.copies.iter().position(|c| c.id == result.id)
                });
                format!("Added copy {}.", result.copy_number)
            }
            Response::Inserted(result) if form.kind == FormKind::Loan => {
                self.reload(Tab::Loans)?;
                self.focus(Tab::Loans, |app| app.loans.iter().position(|l| l.id == result.id));
                "Loan recorded.".to_string()
            }
            Response::Inserted(result) => {
                self.reload(Tab::Students)?;
                self.focus(Tab::Students, |app| {
                    app.students.iter().position(|s| s.id == result.id)
                });
                "Student added.".to_string()
            }
            _ => "Saved.".to_string(),
        };
        Ok(message)
    }

    fn return_loan(&mut self, confirm: &ConfirmReturn) -> Result<()> {
        self.dispatcher
            .invoke(RETURN_LOAN, json!({ "loan_id": confirm.loan_id }))
            .context("failed to return loan")?;
        self.reload(Tab::Loans)
    }

    /// Re-run the listing (or active search) backing `tab`.
    fn reload(&mut self, tab: Tab) -> Result<()> {
        let request = match tab {
            Tab::Books => match &self.book_filter {
                Some(query) => Request::SearchBooks(query.clone()),
                None => Request::ListBooks,
            },
            Tab::Copies => Request::ListCopies,
            Tab::Students => match &self.student_filter {
                Some(query) => Request::SearchStudents(query.clone()),
                None => Request::ListStudents,
            },
            Tab::Loans => Request::ListOutstandingLoans,
        };

        let len = match self.dispatcher.handle(request)? {
            Response::Books(books) => {
                self.books = books;
                self.books.len()
            }
            Response::Copies(copies) => {
                self.copies = copies;
                self.copies.len()
            }
            Response::Students(students) => {
                self.students = students;
                self.students.len()
            }
            Response::Loans(loans) => {
                self.loans = loans;
                self.loans.len()
            }
            _ => return Ok(()),
        };

        let slot = &mut self.selected[tab.index()];
        *slot = clamp_selection(*slot, len);
        Ok(())
    }

    fn set_filter(&mut self, filter: Option<String>) -> Result<()> {
        match self.tab {
            Tab::Books => self.book_filter = filter,
            Tab::Students => self.student_filter = filter,
            _ => return Ok(()),
        }
        self.selected[self.tab.index()] = 0;
        self.reload(self.tab)
    }

    fn current_filter(&self) -> Option<&String> {
        match self.tab {
            Tab::Books => self.book_filter.as_ref(),
            Tab::Students => self.student_filter.as_ref(),
            _ => None,
        }
    }

    fn form_for_tab(&self) -> Form {
        let index = self.selected[self.tab.index()];
        match self.tab {
            Tab::Books => Form::book(),
            Tab::Copies => Form::copy(self.copies.get(index).map(|c| c.isbn.as_str())),
            Tab::Students => Form::student(),
            Tab::Loans => Form::loan(today()),
        }
    }

    fn focus(&mut self, tab: Tab, find: impl Fn(&App) -> Option<usize>) {
        if let Some(index) = find(self) {
            self.selected[tab.index()] = index;
        }
    }

    fn switch_tab(&mut self, tab: Tab) {
        self.tab = tab;
        self.clear_status();
    }

    fn current_len(&self) -> usize {
        match self.tab {
            Tab::Books => self.books.len(),
            Tab::Copies => self.copies.len(),
            Tab::Students => self.students.len(),
            Tab::Loans => self.loans.len(),
        }
    }

    fn current_loan(&self) -> Option<&Loan> {
        self.loans.get(self.selected[Tab::Loans.index()])
    }

    fn move_selection(&mut self, offset: isize) {
        let len = self.current_len();
        let slot = &mut self.selected[self.tab.index()];
        *slot = step_selection(*slot, offset, len);
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .split(area);

        self.draw_tabs(frame, chunks[0]);
        self.draw_list(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);

        match &self.mode {
            Mode::Searching(state) => self.draw_search_bar(frame, chunks[1], state),
            Mode::Adding(form) => self.draw_form(frame, area, form),
            Mode::ConfirmReturn(confirm) => self.draw_confirm_return(frame, area, confirm),
            Mode::Normal => {}
        }
    }

    fn draw_tabs(&self, frame: &mut Frame, area: Rect) {
        let titles: Vec<Line> = Tab::ALL
            .iter()
            .enumerate()
            .map(|(i, tab)| Line::from(format!("{} {}", i + 1, tab.title())))
            .collect();
        let tabs = Tabs::new(titles)
            .block(Block::default().borders(Borders::ALL).title("Library"))
            .select(self.tab.index())
            .highlight_style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(tabs, area);
    }

    fn draw_list(&self, frame: &mut Frame, area: Rect) {
        let today = today();
        let (items, title): (Vec<ListItem>, String) = match self.tab {
            Tab::Books => (
                self.books.iter().map(|b| ListItem::new(book_line(b))).collect(),
                titled("Books", self.book_filter.as_deref(), self.books.len()),
            ),
            Tab::Copies => (
                self.copies.iter().map(|c| ListItem::new(copy_line(c))).collect(),
                format!("Copies ({})", self.copies.len()),
            ),
            Tab::Students => (
                self.students
                    .iter()
                    .map(|s| ListItem::new(student_line(s)))
                    .collect(),
                titled("Students", self.student_filter.as_deref(), self.students.len()),
            ),
            Tab::Loans => (
                self.loans
                    .iter()
                    .map(|l| ListItem::new(loan_line(l, today)))
                    .collect(),
                format!("Outstanding loans ({})", self.loans.len()),
            ),
        };

        if items.is_empty() {
            let empty = Paragraph::new("Nothing here yet. Press [a] to add one.")
                .style(Style::default().fg(Color::DarkGray))
                .block(Block::default().borders(Borders::ALL).title(title));
            frame.render_widget(empty, area);
            return;
        }

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        let mut state = ListState::default().with_selected(Some(self.selected[self.tab.index()]));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let paragraph = Paragraph::new(vec![status_line, self.footer_instructions()])
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn footer_instructions(&self) -> Line<'static> {
        let key_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let mut keys: Vec<(&str, &str)> = match &self.mode {
            Mode::Searching(_) => vec![("[Enter]", "Keep"), ("[Esc]", "Clear")],
            Mode::Adding(_) => vec![("[Tab]", "Next field"), ("[Enter]", "Save"), ("[Esc]", "Cancel")],
            Mode::ConfirmReturn(_) => vec![("[y]", "Return"), ("[n]", "Cancel")],
            Mode::Normal => vec![("[Tab/1-4]", "Switch"), ("[↑↓]", "Navigate"), ("[a]", "Add")],
        };
        if matches!(self.mode, Mode::Normal) {
            if self.tab.searchable() {
                keys.push(("[/]", "Search"));
            }
            if self.tab == Tab::Loans {
                keys.push(("[r]", "Return"));
            }
            keys.push(("[q]", "Quit"));
        }

        let mut spans = Vec::with_capacity(keys.len() * 2);
        for (key, label) in keys {
            spans.push(Span::styled(key.to_string(), key_style));
            spans.push(Span::raw(format!(" {label}   ")));
        }
        Line::from(spans)
    }

    fn draw_search_bar(&self, frame: &mut Frame, area: Rect, state: &SearchState) {
        let height = 3u16.min(area.height);
        let popup_area = Rect {
            x: area.x,
            y: area.y,
            width: area.width,
            height,
        };
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title("Search");
        let paragraph = Paragraph::new(Span::raw(format!("Search: {}", state.query)))
            .block(block.clone())
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);

        let inner = block.inner(popup_area);
        let cursor_x = inner.x + "Search: ".len() as u16 + state.query.chars().count() as u16;
        frame.set_cursor_position((cursor_x, inner.y));
    }

    fn draw_form(&self, frame: &mut Frame, area: Rect, form: &Form) {
        let popup_area = centered_rect(60, 50, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().title(form.title()).borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let mut lines: Vec<Line> = (0..form.fields.len()).map(|i| form.build_line(i)).collect();
        lines.push(Line::from(""));
        if let Some(error) = &form.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                "Enter to save • Tab to switch • Esc to cancel",
                Style::default().fg(Color::Gray),
            )));
        }

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);

        frame.set_cursor_position((
            inner.x + form.cursor_offset() as u16,
            inner.y + form.active as u16,
        ));
    }

    fn draw_confirm_return(&self, frame: &mut Frame, area: Rect, confirm: &ConfirmReturn) {
        let popup_area = centered_rect(50, 25, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().title("Return Loan").borders(Borders::ALL);
        let text = vec![
            Line::from(format!(
                "Mark \"{}\" as returned by {} today?",
                confirm.title, confirm.student_name
            )),
            Line::from(""),
            Line::from(Span::styled(
                "y to confirm • n to cancel",
                Style::default().fg(Color::Gray),
            )),
        ];
        let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);
    }
}

fn titled(name: &str, filter: Option<&str>, count: usize) -> String {
    match filter {
        Some(query) if !query.is_empty() => format!("{name} matching \"{query}\" ({count})"),
        _ => format!("{name} ({count})"),
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
