//! Terminal UI rendering.

pub mod create_form;
pub mod nav_bar;
pub mod sign_in;
pub mod status_bar;
pub mod task_list;
pub mod theme;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    text::Span,
};

use crate::app::App;
use crate::view::field::TextField;
use crate::view::nav::PageKind;

/// Main draw function for the entire UI.
pub fn draw(frame: &mut Frame, app: &App) {
    // Header, page body, status bar
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    nav_bar::render(frame, chunks[0], app);

    if app.needs_sign_in() {
        sign_in::render(frame, chunks[1], app);
    } else {
        match app.page_kind() {
            PageKind::Create => create_form::render(frame, chunks[1], app),
            PageKind::List => task_list::render(frame, chunks[1], app),
        }
    }

    status_bar::render(frame, chunks[2], app);
}

/// Field text with a block cursor when focused.
fn input_span(field: &TextField, focused: bool, masked: bool) -> Span<'static> {
    let mut text: String = if masked {
        "*".repeat(field.value().chars().count())
    } else {
        field.value().to_string()
    };
    if focused {
        let at = text
            .char_indices()
            .nth(field.cursor())
            .map_or(text.len(), |(i, _)| i);
        text.insert(at, '█');
    }
    let style = if focused {
        theme::normal()
    } else {
        theme::dimmed()
    };
    Span::styled(text, style)
}
