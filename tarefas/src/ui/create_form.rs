//! Create page.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use super::{input_span, theme};
use crate::app::App;
use crate::view::field::FormField;

/// Render the new-task form.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title("New task")
        .borders(Borders::ALL)
        .border_style(theme::highlighted());

    let Some(form) = app.controller().page().create_form.as_ref() else {
        frame.render_widget(block, area);
        return;
    };

    let lines = vec![
        Line::from(vec![
            Span::styled("Title:       ", theme::bold()),
            input_span(&form.titulo, form.focus == FormField::Titulo, false),
        ]),
        Line::from(vec![
            Span::styled("Description: ", theme::bold()),
            input_span(&form.descricao, form.focus == FormField::Descricao, false),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
