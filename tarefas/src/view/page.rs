//! A page and its optional collaborators.
//!
//! Every collaborator is optional. Operations that need a missing one do
//! nothing, so a page without a list simply never renders rows.

use tarefas_proto::task::Task;

use super::field::{FormField, TextField};
use super::list::ListView;
use super::nav::{NavShell, PageKind};
use super::status::{StatusArea, StatusTimings};

/// The create-task form.
#[derive(Debug, Clone, Default)]
pub struct CreateForm {
    pub titulo: TextField,
    pub descricao: TextField,
    pub focus: FormField,
}

impl CreateForm {
    /// The task as entered. Empty fields are sent as empty strings.
    #[must_use]
    pub fn task(&self) -> Task {
        Task::new(self.titulo.value(), self.descricao.value())
    }

    pub fn clear(&mut self) {
        self.titulo.clear();
        self.descricao.clear();
        self.focus = FormField::Titulo;
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

/// View components present on the current page.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub list: Option<ListView>,
    pub create_form: Option<CreateForm>,
    pub status: Option<StatusArea>,
    pub nav: Option<NavShell>,
}

impl Page {
    /// Page with no collaborators at all.
    #[must_use]
    pub fn bare() -> Self {
        Self::default()
    }

    /// The create page: form, status and nav; no list.
    #[must_use]
    pub fn create(timings: StatusTimings) -> Self {
        Self {
            list: None,
            create_form: Some(CreateForm::default()),
            status: Some(StatusArea::new(timings)),
            nav: Some(NavShell::new(PageKind::Create)),
        }
    }

    /// The list page: list, status and nav; no form.
    #[must_use]
    pub fn list(timings: StatusTimings) -> Self {
        Self {
            list: Some(ListView::new()),
            create_form: None,
            status: Some(StatusArea::new(timings)),
            nav: Some(NavShell::new(PageKind::List)),
        }
    }

    #[must_use]
    pub fn for_kind(kind: PageKind, timings: StatusTimings) -> Self {
        match kind {
            PageKind::Create => Self::create(timings),
            PageKind::List => Self::list(timings),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<PageKind> {
        self.nav.as_ref().map(NavShell::active)
    }
}
