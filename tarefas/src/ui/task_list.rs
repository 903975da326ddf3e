//! List page.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use super::{input_span, theme};
use crate::app::App;
use crate::view::field::FormField;

/// Render the task rows, or the placeholder when there are none.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let controller = app.controller();
    let block = Block::default()
        .title(format!("Tasks ({})", app.backend().describe()))
        .borders(Borders::ALL)
        .border_style(theme::normal());

    let Some(list) = controller.page().list.as_ref() else {
        frame.render_widget(block, area);
        return;
    };

    if let Some(placeholder) = list.placeholder() {
        let text = Line::styled(placeholder.message(), theme::dimmed());
        frame.render_widget(Paragraph::new(text).block(block), area);
        return;
    }

    let guard = controller.guard();
    let pending = controller.pending_delete();

    let items: Vec<ListItem> = list
        .rows()
        .iter()
        .map(|row| {
            if guard.editing_key() == Some(&row.id)
                && let Some(form) = guard.form()
            {
                return ListItem::new(vec![
                    Line::from(vec![
                        Span::styled("  title: ", theme::highlighted()),
                        input_span(&form.titulo, form.focus == FormField::Titulo, false),
                    ]),
                    Line::from(vec![
                        Span::styled("  desc:  ", theme::highlighted()),
                        input_span(&form.descricao, form.focus == FormField::Descricao, false),
                    ]),
                ]);
            }

            let marker = if pending == Some(&row.id) { "✗ " } else { "• " };
            let mut spans = vec![
                Span::raw(marker),
                Span::styled(row.titulo.clone(), theme::bold()),
            ];
            if !row.descricao.is_empty() {
                spans.push(Span::raw("  "));
                spans.push(Span::styled(row.descricao.clone(), theme::dimmed()));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let mut state = ListState::default().with_selected(Some(list.selected()));
    let widget = List::new(items)
        .block(block)
        .highlight_style(if guard.is_editing() {
            theme::normal()
        } else {
            theme::selected()
        });

    frame.render_stateful_widget(widget, area, &mut state);
}
