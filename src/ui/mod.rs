//! Ratatui front end. It plays the part of the view layer: every read and
//! write goes through the dispatcher, one request per key press at most.

mod app;
mod forms;
mod helpers;
mod terminal;

pub use app::App;
pub use terminal::run_app;
