//! Navigation shell: signed-in user label and page tabs.

use tarefas_proto::session::UserSession;

/// The two pages of the app.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageKind {
    /// Form for new tasks.
    Create,
    /// The task list.
    #[default]
    List,
}

impl PageKind {
    pub const ALL: [Self; 2] = [Self::Create, Self::List];

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::List => "List",
        }
    }

    #[must_use]
    pub const fn hotkey(self) -> &'static str {
        match self {
            Self::Create => "F1",
            Self::List => "F2",
        }
    }
}

/// Header collaborator of a page. Presentation only.
#[derive(Debug, Clone, Default)]
pub struct NavShell {
    active: PageKind,
    user_label: Option<String>,
}

impl NavShell {
    #[must_use]
    pub const fn new(active: PageKind) -> Self {
        Self {
            active,
            user_label: None,
        }
    }

    pub fn set_user(&mut self, session: Option<&UserSession>) {
        self.user_label = session.map(UserSession::display_label);
    }

    #[must_use]
    pub fn user_label(&self) -> Option<&str> {
        self.user_label.as_deref()
    }

    #[must_use]
    pub const fn active(&self) -> PageKind {
        self.active
    }
}
