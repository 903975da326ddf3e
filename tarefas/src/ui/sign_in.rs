//! Sign-in panel.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use super::{input_span, theme};
use crate::app::{App, SignInField};
use crate::backend::{DEMO_EMAIL, DEMO_PASSWORD};
use crate::store::AnyStore;

/// Render the email/password form.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let form = &app.sign_in;

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Email:    ", theme::bold()),
            input_span(&form.email, form.focus == SignInField::Email, false),
        ]),
        Line::from(vec![
            Span::styled("Password: ", theme::bold()),
            input_span(&form.password, form.focus == SignInField::Password, true),
        ]),
        Line::raw(""),
    ];

    if form.busy {
        lines.push(Line::styled("Signing in...", theme::dimmed()));
    } else if let Some(error) = &form.error {
        lines.push(Line::styled(error.clone(), theme::normal().fg(theme::ERROR)));
    }

    lines.push(Line::styled(
        "Enter: sign in | Ctrl+U: create account | Tab: next field",
        theme::dimmed(),
    ));
    if matches!(app.backend().store().as_ref(), AnyStore::Memory(_)) {
        lines.push(Line::styled(
            format!("Offline demo account: {DEMO_EMAIL} / {DEMO_PASSWORD}"),
            theme::dimmed(),
        ));
    }

    let block = Block::default()
        .title("Sign in")
        .borders(Borders::ALL)
        .border_style(theme::highlighted());

    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}
