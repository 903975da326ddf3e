//! Application state and event handling.

use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;

use crate::backend::Backend;
use crate::identity::IdentityProvider;
use crate::store::AnyStore;
use crate::view::controller::{TaskListController, ViewEvent};
use crate::view::field::TextField;
use crate::view::nav::PageKind;
use crate::view::page::Page;
use crate::view::status::StatusTimings;

/// Which input of the sign-in panel has focus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignInField {
    #[default]
    Email,
    Password,
}

/// The sign-in panel shown while nobody is signed in.
#[derive(Debug, Clone, Default)]
pub struct SignInForm {
    pub email: TextField,
    pub password: TextField,
    pub focus: SignInField,
    /// Last failure, shown under the inputs.
    pub error: Option<String>,
    /// A sign-in or sign-up request is in flight.
    pub busy: bool,
}

impl SignInForm {
    const fn focused_mut(&mut self) -> &mut TextField {
        match self.focus {
            SignInField::Email => &mut self.email,
            SignInField::Password => &mut self.password,
        }
    }

    const fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            SignInField::Email => SignInField::Password,
            SignInField::Password => SignInField::Email,
        };
    }
}

/// Main application state.
pub struct App {
    backend: Backend,
    timings: StatusTimings,
    page_kind: PageKind,
    controller: TaskListController<AnyStore>,
    events: mpsc::UnboundedReceiver<ViewEvent>,
    auth_tx: mpsc::UnboundedSender<ViewEvent>,
    auth_rx: mpsc::UnboundedReceiver<ViewEvent>,
    /// Sign-in panel state.
    pub sign_in: SignInForm,
    /// Whether the app should quit.
    pub should_quit: bool,
}

impl App {
    /// Opens the list page on `backend`. Must be called inside a tokio
    /// runtime.
    #[must_use]
    pub fn new(backend: Backend, timings: StatusTimings) -> Self {
        let page_kind = PageKind::List;
        let (controller, events) = open_page(&backend, page_kind, timings);
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            timings,
            page_kind,
            controller,
            events,
            auth_tx,
            auth_rx,
            sign_in: SignInForm::default(),
            should_quit: false,
        }
    }

    /// Switches page. The new page starts from scratch, as after a reload.
    pub fn navigate(&mut self, kind: PageKind) {
        if kind == self.page_kind {
            return;
        }
        tracing::debug!(page = kind.title(), "navigating");
        self.controller.close();
        let (controller, events) = open_page(&self.backend, kind, self.timings);
        self.controller = controller;
        self.events = events;
        self.page_kind = kind;
    }

    /// Applies every pending background result.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.auth_rx.try_recv() {
            if let ViewEvent::SignedIn(result) = &event {
                self.sign_in.busy = false;
                match result {
                    Ok(_) => {
                        self.sign_in.password.clear();
                        self.sign_in.error = None;
                    }
                    Err(e) => self.sign_in.error = Some(e.to_string()),
                }
            }
            self.controller.handle_event(event);
        }
        while let Ok(event) = self.events.try_recv() {
            self.controller.handle_event(event);
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.controller.tick(now);
    }

    /// Handle a key event.
    pub fn handle_key_event(&mut self, key: KeyEvent) {
        // Global shortcuts
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return;
            }
            (KeyCode::F(1), _) => {
                self.navigate(PageKind::Create);
                return;
            }
            (KeyCode::F(2), _) => {
                self.navigate(PageKind::List);
                return;
            }
            (KeyCode::Char('o'), KeyModifiers::CONTROL) => {
                self.sign_out();
                return;
            }
            _ => {}
        }

        if self.needs_sign_in() {
            self.handle_sign_in_key(key);
        } else if !key.modifiers.contains(KeyModifiers::CONTROL) {
            self.controller.handle_page_key(key.code);
        }
    }

    fn handle_sign_in_key(&mut self, key: KeyEvent) {
        match (key.code, key.modifiers) {
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => self.submit_sign_in(true),
            (_, m) if m.contains(KeyModifiers::CONTROL) => {}
            (KeyCode::Enter, _) => self.submit_sign_in(false),
            (KeyCode::Tab | KeyCode::BackTab, _) => self.sign_in.toggle_focus(),
            (KeyCode::Char(c), _) => self.sign_in.focused_mut().insert(c),
            (KeyCode::Backspace, _) => self.sign_in.focused_mut().backspace(),
            (KeyCode::Left, _) => self.sign_in.focused_mut().move_left(),
            (KeyCode::Right, _) => self.sign_in.focused_mut().move_right(),
            (KeyCode::Home, _) => self.sign_in.focused_mut().home(),
            (KeyCode::End, _) => self.sign_in.focused_mut().end(),
            _ => {}
        }
    }

    /// Sends the sign-in panel to the identity provider.
    fn submit_sign_in(&mut self, create_account: bool) {
        let Some(identity) = self.backend.identity().cloned() else {
            return;
        };
        if self.sign_in.busy {
            return;
        }
        self.sign_in.busy = true;
        self.sign_in.error = None;
        let email = self.sign_in.email.value().to_string();
        let password = self.sign_in.password.value().to_string();
        let tx = self.auth_tx.clone();
        tokio::spawn(async move {
            let result = if create_account {
                identity.sign_up(&email, &password).await
            } else {
                identity.sign_in(&email, &password).await
            };
            let _ = tx.send(ViewEvent::SignedIn(result));
        });
    }

    fn sign_out(&self) {
        let Some(identity) = self.backend.identity().cloned() else {
            return;
        };
        tokio::spawn(async move { identity.sign_out().await });
    }

    /// `true` when the sign-in panel replaces the page body.
    #[must_use]
    pub const fn needs_sign_in(&self) -> bool {
        self.controller.needs_sign_in()
    }

    #[must_use]
    pub const fn page_kind(&self) -> PageKind {
        self.page_kind
    }

    #[must_use]
    pub const fn controller(&self) -> &TaskListController<AnyStore> {
        &self.controller
    }

    #[must_use]
    pub const fn backend(&self) -> &Backend {
        &self.backend
    }
}

fn open_page(
    backend: &Backend,
    kind: PageKind,
    timings: StatusTimings,
) -> (
    TaskListController<AnyStore>,
    mpsc::UnboundedReceiver<ViewEvent>,
) {
    let (mut controller, events) =
        TaskListController::new(std::sync::Arc::clone(backend.store()), Page::for_kind(kind, timings));
    match backend.identity() {
        Some(identity) => controller.start(identity.as_ref()),
        None => controller.start_anonymous(),
    }
    (controller, events)
}
