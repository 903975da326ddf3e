//! Edit-session guard: at most one row is editable at a time.

use tarefas_proto::task::{Task, TaskKey, TaskPatch};

use super::field::{FormField, TextField};

/// Whether a row is being edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EditState {
    /// No row is being edited.
    #[default]
    Idle,
    /// The row with this key shows its edit form.
    Editing(TaskKey),
}

/// Inline form of the row under edit, prefilled with its current values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditForm {
    pub titulo: TextField,
    pub descricao: TextField,
    pub focus: FormField,
}

impl EditForm {
    #[must_use]
    pub fn new(task: &Task) -> Self {
        Self {
            titulo: TextField::with_value(task.titulo.clone()),
            descricao: TextField::with_value(task.descricao.clone()),
            focus: FormField::Titulo,
        }
    }

    /// Both fields as entered, empty strings included.
    #[must_use]
    pub fn patch(&self) -> TaskPatch {
        TaskPatch::both(self.titulo.value(), self.descricao.value())
    }

    pub const fn toggle_focus(&mut self) {
        self.focus = self.focus.next();
    }

    pub const fn focused_mut(&mut self) -> &mut TextField {
        match self.focus {
            FormField::Titulo => &mut self.titulo,
            FormField::Descricao => &mut self.descricao,
        }
    }
}

/// Owns the edit state of one list view.
#[derive(Debug, Default)]
pub struct EditGuard {
    state: EditState,
    form: Option<EditForm>,
}

impl EditGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the edit form for `key` if nothing else is being edited.
    ///
    /// Returns `false` and leaves the current edit untouched otherwise.
    pub fn begin_edit(&mut self, key: TaskKey, current: &Task) -> bool {
        if self.state != EditState::Idle {
            return false;
        }
        self.state = EditState::Editing(key);
        self.form = Some(EditForm::new(current));
        true
    }

    /// Back to idle, whatever the current state.
    pub fn end_edit(&mut self) {
        self.state = EditState::Idle;
        self.form = None;
    }

    #[must_use]
    pub const fn state(&self) -> &EditState {
        &self.state
    }

    #[must_use]
    pub const fn is_editing(&self) -> bool {
        matches!(self.state, EditState::Editing(_))
    }

    #[must_use]
    pub const fn editing_key(&self) -> Option<&TaskKey> {
        match &self.state {
            EditState::Editing(key) => Some(key),
            EditState::Idle => None,
        }
    }

    #[must_use]
    pub const fn form(&self) -> Option<&EditForm> {
        self.form.as_ref()
    }

    pub const fn form_mut(&mut self) -> Option<&mut EditForm> {
        self.form.as_mut()
    }
}
