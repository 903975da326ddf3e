//! Status bar rendering.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
};

use super::theme;
use crate::app::App;
use crate::view::nav::PageKind;

/// Render the status bar at the bottom of the screen.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let controller = app.controller();

    let help_text = if app.needs_sign_in() {
        "Enter: sign in | Ctrl+U: sign up | Ctrl+C: quit"
    } else if controller.pending_delete().is_some() {
        "y: delete | n: keep"
    } else if controller.guard().is_editing() {
        "Enter: save | Esc: cancel | Tab: next field"
    } else {
        match app.page_kind() {
            PageKind::Create => "Enter: create | Tab: next field | F2: list | Ctrl+O: sign out",
            PageKind::List => {
                "↑↓/jk: select | e: edit | d: delete | r: reload | F1: create | Ctrl+O: sign out"
            }
        }
    };

    let mut spans = vec![Span::styled("Tarefas", theme::bold()), Span::raw(" | ")];
    match controller.page().status.as_ref().and_then(|s| s.current()) {
        Some(message) => spans.push(Span::styled(message.text.clone(), theme::status(message.kind))),
        None => spans.push(Span::styled(help_text, theme::dimmed())),
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(theme::status_bar_bg());
    frame.render_widget(paragraph, area);
}
