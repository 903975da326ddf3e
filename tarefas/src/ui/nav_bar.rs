//! Header with page tabs and the signed-in user.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use super::theme;
use crate::app::App;
use crate::view::nav::PageKind;

/// Render the navigation header.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let active = app.page_kind();

    let mut spans = Vec::new();
    for kind in PageKind::ALL {
        let style = if kind == active {
            theme::selected()
        } else {
            theme::normal()
        };
        spans.push(Span::styled(format!(" {} {} ", kind.hotkey(), kind.title()), style));
        spans.push(Span::raw(" "));
    }

    let user = app
        .controller()
        .page()
        .nav
        .as_ref()
        .and_then(|nav| nav.user_label())
        .map(str::to_string);
    let title = match user {
        Some(label) => format!("Tarefas | {label}"),
        None if app.backend().identity().is_some() => "Tarefas | signed out".to_string(),
        None => "Tarefas".to_string(),
    };

    let block = Block::default()
        .title(Span::styled(title, theme::bold()))
        .borders(Borders::ALL)
        .border_style(theme::normal());

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}
