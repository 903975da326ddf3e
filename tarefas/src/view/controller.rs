//! Task list controller.
//!
//! Owns everything that changes while a page is open: the edit guard, the
//! last snapshot, the live subscription and a pending delete. Adapters run
//! on background tasks and report back through [`ViewEvent`]s; only
//! [`TaskListController::handle_event`] mutates view state, so the page has
//! a single owner and needs no locks.
//!
//! Every subscription gets a generation number. Closing it (sign-out, user
//! switch, page change) bumps the generation, and any snapshot still in
//! flight for an older generation is dropped on arrival.

use std::sync::Arc;
use std::time::Instant;

use crossterm::event::KeyCode;
use tarefas_proto::session::UserSession;
use tarefas_proto::task::{TaskKey, TaskSnapshot};
use tokio::sync::mpsc;

use super::edit::EditGuard;
use super::field::TextField;
use super::list::RowAction;
use super::page::Page;
use crate::identity::{AuthError, IdentityProvider};
use crate::store::{AccessMode, StoreError, TaskStore};
use crate::subscription::Subscription;

/// Results delivered to the controller from background work.
#[derive(Debug)]
pub enum ViewEvent {
    /// The identity provider reported the current session.
    AuthChanged(Option<UserSession>),
    /// A live subscription produced a snapshot or ended with an error.
    Snapshot {
        generation: u64,
        result: Result<TaskSnapshot, StoreError>,
    },
    /// A one-shot read finished.
    Fetched {
        generation: u64,
        result: Result<TaskSnapshot, StoreError>,
    },
    /// A create finished.
    Created(Result<TaskKey, StoreError>),
    /// An update of `key` finished.
    Updated {
        key: TaskKey,
        result: Result<(), StoreError>,
    },
    /// A delete of `key` finished.
    Deleted {
        key: TaskKey,
        result: Result<(), StoreError>,
    },
    /// A sign-in or sign-up attempt finished.
    SignedIn(Result<UserSession, AuthError>),
}

/// State and behaviour of one open page.
#[derive(Debug)]
pub struct TaskListController<S: TaskStore + 'static> {
    store: Arc<S>,
    page: Page,
    guard: EditGuard,
    last_snapshot: Option<TaskSnapshot>,
    subscription: Option<Subscription>,
    auth_listener: Option<Subscription>,
    generation: u64,
    requires_session: bool,
    session: Option<UserSession>,
    pending_delete: Option<TaskKey>,
    events: mpsc::UnboundedSender<ViewEvent>,
}

impl<S: TaskStore + 'static> TaskListController<S> {
    /// Creates a controller for `page` and the receiver its events arrive on.
    pub fn new(store: Arc<S>, page: Page) -> (Self, mpsc::UnboundedReceiver<ViewEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            store,
            page,
            guard: EditGuard::new(),
            last_snapshot: None,
            subscription: None,
            auth_listener: None,
            generation: 0,
            requires_session: false,
            session: None,
            pending_delete: None,
            events,
        };
        (controller, rx)
    }

    /// Follows `identity`: every session change closes the current
    /// subscription, and a signed-in session opens a new one.
    pub fn start<I: IdentityProvider>(&mut self, identity: &I) {
        self.requires_session = true;
        if let Some(list) = self.page.list.as_mut() {
            list.render_signed_out();
        }
        let events = self.events.clone();
        self.auth_listener = Some(identity.on_auth_state_changed(move |session| {
            let _ = events.send(ViewEvent::AuthChanged(session));
        }));
    }

    /// Starts without an identity provider: load the collection right away.
    pub fn start_anonymous(&mut self) {
        self.requires_session = false;
        self.load();
    }

    /// A sender for results the owner wants handled like adapter events.
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<ViewEvent> {
        self.events.clone()
    }

    /// Applies one background result to the view.
    pub fn handle_event(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::AuthChanged(session) => self.on_auth_changed(session),
            ViewEvent::Snapshot { generation, result } => {
                if generation != self.generation {
                    tracing::debug!(generation, current = self.generation, "stale snapshot dropped");
                    return;
                }
                match result {
                    Ok(snapshot) => self.apply_snapshot(snapshot),
                    Err(e) => {
                        tracing::warn!(error = %e, "task subscription failed");
                        self.subscription = None;
                        self.show_error(format!("Live updates stopped: {e}"));
                    }
                }
            }
            ViewEvent::Fetched { generation, result } => {
                if generation != self.generation {
                    tracing::debug!(generation, current = self.generation, "stale fetch dropped");
                    return;
                }
                match result {
                    Ok(snapshot) => self.apply_snapshot(snapshot),
                    Err(e) => {
                        tracing::warn!(error = %e, "task fetch failed");
                        self.show_error(format!("Could not load tasks: {e}"));
                    }
                }
            }
            ViewEvent::Created(result) => match result {
                Ok(key) => {
                    tracing::debug!(%key, "task created");
                    if let Some(form) = self.page.create_form.as_mut() {
                        form.clear();
                    }
                    self.show_success("Task created");
                    self.after_write();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "create failed");
                    self.show_error(format!("Could not create task: {e}"));
                }
            },
            ViewEvent::Updated { key, result } => match result {
                Ok(()) => {
                    if self.guard.editing_key() == Some(&key) {
                        self.guard.end_edit();
                    }
                    self.show_success("Task updated");
                    self.render();
                    self.after_write();
                }
                Err(e) => {
                    tracing::warn!(%key, error = %e, "update failed");
                    self.show_error(format!("Could not update task: {e}"));
                }
            },
            ViewEvent::Deleted { key, result } => match result {
                Ok(()) => {
                    tracing::debug!(%key, "task deleted");
                    self.show_success("Task deleted");
                    self.after_write();
                }
                Err(e) => {
                    tracing::warn!(%key, error = %e, "delete failed");
                    self.show_error(format!("Could not delete task: {e}"));
                }
            },
            ViewEvent::SignedIn(result) => match result {
                Ok(session) => self.show_success(format!("Signed in as {}", session.display_label())),
                Err(e) => self.show_error(format!("Sign-in failed: {e}")),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Subscribes in live mode, fetches otherwise. No-op without a list.
    pub fn load(&mut self) {
        if self.page.list.is_none() {
            return;
        }
        match self.store.access_mode() {
            AccessMode::Live => self.subscribe(),
            AccessMode::Refetch => self.fetch(),
        }
    }

    /// One-shot read of the collection.
    pub fn fetch(&self) {
        let generation = self.generation;
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = store.get_tasks().await;
            let _ = events.send(ViewEvent::Fetched { generation, result });
        });
    }

    fn subscribe(&mut self) {
        self.close_subscription();
        let generation = self.generation;
        let events = self.events.clone();
        match self.store.subscribe_to_tasks(move |result| {
            let _ = events.send(ViewEvent::Snapshot { generation, result });
        }) {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                tracing::warn!(error = %e, "could not subscribe to tasks");
                self.show_error(format!("Could not load tasks: {e}"));
            }
        }
    }

    /// Closes the live subscription and invalidates its pending snapshots.
    fn close_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.close();
        }
        self.generation += 1;
    }

    fn after_write(&self) {
        if self.store.access_mode() == AccessMode::Refetch {
            self.fetch();
        }
    }

    fn on_auth_changed(&mut self, session: Option<UserSession>) {
        let renewed = matches!(
            (&self.session, &session),
            (Some(old), Some(new)) if old.uid == new.uid
        );
        if renewed {
            // Same user with a fresh token: the live subscription renews
            // itself, so keep rows and any open edit.
            tracing::debug!("session token renewed");
            self.session = session;
            if self.subscription.is_none() {
                self.load();
            }
            return;
        }
        self.close_subscription();
        self.guard.end_edit();
        self.pending_delete = None;
        self.last_snapshot = None;
        if let Some(nav) = self.page.nav.as_mut() {
            nav.set_user(session.as_ref());
        }
        let signed_in = session.is_some();
        self.session = session;
        self.render();
        if signed_in {
            self.load();
        }
    }

    fn apply_snapshot(&mut self, snapshot: TaskSnapshot) {
        self.last_snapshot = Some(snapshot);
        self.guard.end_edit();
        if self
            .pending_delete
            .as_ref()
            .is_some_and(|key| !self.snapshot_contains(key))
        {
            self.pending_delete = None;
        }
        self.render();
    }

    fn snapshot_contains(&self, key: &TaskKey) -> bool {
        self.last_snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.contains(key))
    }

    /// Rebuilds the list from the last snapshot. No-op without a list.
    pub fn render(&mut self) {
        let Some(list) = self.page.list.as_mut() else {
            return;
        };
        if self.requires_session && self.session.is_none() {
            list.render_signed_out();
        } else {
            list.render(self.last_snapshot.as_ref());
        }
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Sends the create form to the store. No-op without a form.
    pub fn submit_create(&self) {
        let Some(form) = self.page.create_form.as_ref() else {
            return;
        };
        let task = form.task();
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = store.create_task(&task).await;
            let _ = events.send(ViewEvent::Created(result));
        });
    }

    // -----------------------------------------------------------------------
    // Edit
    // -----------------------------------------------------------------------

    /// Opens the edit form for `key`. Returns `false` if another row is
    /// already being edited, the key is not listed, or there is no list.
    pub fn begin_edit(&mut self, key: &TaskKey) -> bool {
        let Some(list) = self.page.list.as_ref() else {
            return false;
        };
        let Some(task) = self.last_snapshot.as_ref().and_then(|s| s.get(key)) else {
            return false;
        };
        if list.row(key).is_none() {
            return false;
        }
        self.guard.begin_edit(key.clone(), task)
    }

    pub fn begin_edit_selected(&mut self) -> bool {
        self.activate_selected(0)
    }

    /// Sends the edit form. The form stays open until the store confirms.
    pub fn save_edit(&self) {
        let (Some(key), Some(form)) = (self.guard.editing_key(), self.guard.form()) else {
            return;
        };
        let key = key.clone();
        let patch = form.patch();
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = store.update_task(&key, &patch).await;
            let _ = events.send(ViewEvent::Updated { key, result });
        });
    }

    /// Closes the edit form and re-renders from the last snapshot.
    pub fn cancel_edit(&mut self) {
        self.guard.end_edit();
        self.render();
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Asks for confirmation before deleting `key`.
    pub fn request_delete(&mut self, key: &TaskKey) {
        if self.page.list.as_ref().and_then(|l| l.row(key)).is_none() {
            return;
        }
        let titulo = self
            .last_snapshot
            .as_ref()
            .and_then(|s| s.get(key))
            .map(|t| t.titulo.clone())
            .unwrap_or_default();
        self.pending_delete = Some(key.clone());
        self.show_info(format!("Delete \"{titulo}\"? (y/n)"));
    }

    pub fn request_delete_selected(&mut self) {
        self.activate_selected(1);
    }

    /// Runs a row control. Returns `false` if nothing happened.
    pub fn activate(&mut self, action: &RowAction) -> bool {
        match action {
            RowAction::Edit(key) => self.begin_edit(key),
            RowAction::Delete(key) => {
                self.request_delete(key);
                self.pending_delete.as_ref() == Some(key)
            }
        }
    }

    fn activate_selected(&mut self, index: usize) -> bool {
        let Some(action) = self
            .page
            .list
            .as_ref()
            .and_then(|list| list.selected_row())
            .and_then(|row| row.actions().get(index).cloned())
        else {
            return false;
        };
        self.activate(&action)
    }

    /// Deletes the task awaiting confirmation, if any.
    pub fn confirm_delete(&mut self) {
        let Some(key) = self.pending_delete.take() else {
            return;
        };
        if let Some(status) = self.page.status.as_mut() {
            status.clear();
        }
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = store.delete_task(&key).await;
            let _ = events.send(ViewEvent::Deleted { key, result });
        });
    }

    pub fn cancel_delete(&mut self) {
        if self.pending_delete.take().is_some()
            && let Some(status) = self.page.status.as_mut()
        {
            status.clear();
        }
    }

    // -----------------------------------------------------------------------
    // Input routing for the list and create page
    // -----------------------------------------------------------------------

    /// Handles a key on the page body. Returns `true` if it was consumed.
    pub fn handle_page_key(&mut self, code: KeyCode) -> bool {
        if self.pending_delete.is_some() {
            match code {
                KeyCode::Char('y' | 'Y') => self.confirm_delete(),
                KeyCode::Char('n' | 'N') | KeyCode::Esc => self.cancel_delete(),
                _ => return false,
            }
            return true;
        }
        if self.guard.is_editing() {
            match code {
                KeyCode::Enter => self.save_edit(),
                KeyCode::Esc => self.cancel_edit(),
                KeyCode::Tab | KeyCode::BackTab => {
                    if let Some(form) = self.guard.form_mut() {
                        form.toggle_focus();
                    }
                }
                _ => {
                    return self
                        .guard
                        .form_mut()
                        .is_some_and(|form| edit_text(form.focused_mut(), code));
                }
            }
            return true;
        }
        if self.page.create_form.is_some() {
            match code {
                KeyCode::Enter => self.submit_create(),
                KeyCode::Tab | KeyCode::BackTab => {
                    if let Some(form) = self.page.create_form.as_mut() {
                        form.toggle_focus();
                    }
                }
                _ => {
                    return self
                        .page
                        .create_form
                        .as_mut()
                        .is_some_and(|form| edit_text(form.focused_mut(), code));
                }
            }
            return true;
        }
        let Some(list) = self.page.list.as_mut() else {
            return false;
        };
        match code {
            KeyCode::Up | KeyCode::Char('k') => list.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => list.select_next(),
            KeyCode::Char('e') | KeyCode::Enter => {
                self.begin_edit_selected();
            }
            KeyCode::Char('d') | KeyCode::Delete => self.request_delete_selected(),
            KeyCode::Char('r') => self.load(),
            _ => return false,
        }
        true
    }

    // -----------------------------------------------------------------------
    // Housekeeping and accessors
    // -----------------------------------------------------------------------

    /// Expires old status messages.
    pub fn tick(&mut self, now: Instant) {
        if let Some(status) = self.page.status.as_mut() {
            status.tick(now);
        }
    }

    /// Stops the auth listener and the live subscription.
    pub fn close(&mut self) {
        if let Some(listener) = self.auth_listener.take() {
            listener.close();
        }
        self.close_subscription();
    }

    fn show_info(&mut self, text: String) {
        if let Some(status) = self.page.status.as_mut() {
            status.info(text);
        }
    }

    fn show_success(&mut self, text: impl Into<String>) {
        if let Some(status) = self.page.status.as_mut() {
            status.success(text);
        }
    }

    fn show_error(&mut self, text: String) {
        if let Some(status) = self.page.status.as_mut() {
            status.error(text);
        }
    }

    #[must_use]
    pub const fn page(&self) -> &Page {
        &self.page
    }

    pub const fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    #[must_use]
    pub const fn guard(&self) -> &EditGuard {
        &self.guard
    }

    #[must_use]
    pub const fn last_snapshot(&self) -> Option<&TaskSnapshot> {
        self.last_snapshot.as_ref()
    }

    #[must_use]
    pub const fn session(&self) -> Option<&UserSession> {
        self.session.as_ref()
    }

    /// `true` when the page waits for a sign-in before showing anything.
    #[must_use]
    pub const fn needs_sign_in(&self) -> bool {
        self.requires_session && self.session.is_none()
    }

    #[must_use]
    pub const fn pending_delete(&self) -> Option<&TaskKey> {
        self.pending_delete.as_ref()
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(|s| !s.is_finished())
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Cursor and character keys for a text input.
fn edit_text(field: &mut TextField, code: KeyCode) -> bool {
    match code {
        KeyCode::Char(c) => field.insert(c),
        KeyCode::Backspace => field.backspace(),
        KeyCode::Left => field.move_left(),
        KeyCode::Right => field.move_right(),
        KeyCode::Home => field.home(),
        KeyCode::End => field.end(),
        _ => return false,
    }
    true
}

impl<S: TaskStore + 'static> Drop for TaskListController<S> {
    fn drop(&mut self) {
        self.close();
    }
}
