//! List renderer: turns a snapshot into display rows.
//!
//! Rendering always starts from scratch. Rows appear in snapshot order,
//! which is store key order, and each row's `id` is exactly the store key
//! later passed to update and delete.

use tarefas_proto::task::{TaskKey, TaskSnapshot};

/// One displayed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    /// Store key of the task.
    pub id: TaskKey,
    pub titulo: String,
    pub descricao: String,
}

impl TaskRow {
    /// The per-row controls, in display order.
    #[must_use]
    pub fn actions(&self) -> [RowAction; 2] {
        [
            RowAction::Edit(self.id.clone()),
            RowAction::Delete(self.id.clone()),
        ]
    }
}

/// A control attached to a row, bound to that row's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    Edit(TaskKey),
    Delete(TaskKey),
}

/// Message shown instead of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// The collection is empty or absent.
    NoTasks,
    /// Nobody is signed in.
    SignIn,
}

impl Placeholder {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NoTasks => "No tasks yet. Create one on the Create page (F1).",
            Self::SignIn => "Sign in to see your tasks.",
        }
    }
}

/// List container collaborator of a page.
#[derive(Debug, Clone, Default)]
pub struct ListView {
    rows: Vec<TaskRow>,
    placeholder: Option<Placeholder>,
    selected: usize,
}

impl ListView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the rows from `snapshot`; `None` counts as empty.
    pub fn render(&mut self, snapshot: Option<&TaskSnapshot>) {
        self.rows = snapshot
            .into_iter()
            .flat_map(TaskSnapshot::iter)
            .map(|(key, task)| TaskRow {
                id: key.clone(),
                titulo: task.titulo.clone(),
                descricao: task.descricao.clone(),
            })
            .collect();
        self.placeholder = self.rows.is_empty().then_some(Placeholder::NoTasks);
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }

    /// Clears the rows and asks the user to sign in.
    pub fn render_signed_out(&mut self) {
        self.rows.clear();
        self.placeholder = Some(Placeholder::SignIn);
        self.selected = 0;
    }

    #[must_use]
    pub fn rows(&self) -> &[TaskRow] {
        &self.rows
    }

    #[must_use]
    pub const fn placeholder(&self) -> Option<Placeholder> {
        self.placeholder
    }

    #[must_use]
    pub const fn selected(&self) -> usize {
        self.selected
    }

    #[must_use]
    pub fn selected_row(&self) -> Option<&TaskRow> {
        self.rows.get(self.selected)
    }

    #[must_use]
    pub fn row(&self, key: &TaskKey) -> Option<&TaskRow> {
        self.rows.iter().find(|row| &row.id == key)
    }

    pub const fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub const fn select_next(&mut self) {
        if self.selected + 1 < self.rows.len() {
            self.selected += 1;
        }
    }
}
