//! Locations of task collections inside the document tree.

use std::fmt;

use crate::session::Uid;
use crate::task::TaskKey;

/// Root node of per-user data.
pub const USERS_NODE: &str = "users";

/// Collection name under each user.
pub const TASKS_NODE: &str = "tasks";

/// Global collection used by the unauthenticated fallback.
pub const LEGACY_TASKS_NODE: &str = "tarefas";

/// A slash-separated path to a node, held as unescaped segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataPath {
    segments: Vec<String>,
}

impl DataPath {
    /// The tree root.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Builds a path from segments. Empty segments are dropped.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Parses `a/b/c` (leading and trailing slashes ignored).
    #[must_use]
    pub fn parse(path: &str) -> Self {
        Self::from_segments(path.split('/'))
    }

    /// `users/{uid}/tasks`.
    #[must_use]
    pub fn user_tasks(uid: &Uid) -> Self {
        Self::from_segments([USERS_NODE, uid.as_str(), TASKS_NODE])
    }

    /// `users/{uid}/tasks/{key}`.
    #[must_use]
    pub fn user_task(uid: &Uid, key: &TaskKey) -> Self {
        Self::user_tasks(uid).child(key.as_str())
    }

    /// `tarefas`.
    #[must_use]
    pub fn legacy_tasks() -> Self {
        Self::from_segments([LEGACY_TASKS_NODE])
    }

    /// `tarefas/{key}`.
    #[must_use]
    pub fn legacy_task(key: &TaskKey) -> Self {
        Self::legacy_tasks().child(key.as_str())
    }

    /// Appends one segment.
    #[must_use]
    pub fn child(mut self, segment: &str) -> Self {
        if !segment.is_empty() {
            self.segments.push(segment.to_string());
        }
        self
    }

    /// The unescaped segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns `true` for the tree root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns `true` if `self` is `other` or lies below it.
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// The part of `self` below `ancestor`, if `ancestor` is a prefix.
    #[must_use]
    pub fn strip_prefix(&self, ancestor: &Self) -> Option<Self> {
        self.segments
            .strip_prefix(ancestor.segments.as_slice())
            .map(|rest| Self {
                segments: rest.to_vec(),
            })
    }

    /// The uid owning this path when it lies under `users/{uid}`.
    #[must_use]
    pub fn owner(&self) -> Option<Uid> {
        match self.segments.as_slice() {
            [users, uid, ..] if users == USERS_NODE => Some(Uid::new(uid.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for DataPath {
    /// Renders as `/a/b` (the root is `/`), the form used in stream events.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_task_path_is_scoped_under_uid() {
        let path = DataPath::user_task(&Uid::new("u1"), &TaskKey::new("-k"));
        assert_eq!(path.to_string(), "/users/u1/tasks/-k");
        assert_eq!(path.owner(), Some(Uid::new("u1")));
    }

    #[test]
    fn legacy_path_has_no_owner() {
        assert_eq!(DataPath::legacy_tasks().owner(), None);
        assert_eq!(DataPath::legacy_tasks().to_string(), "/tarefas");
    }

    #[test]
    fn parse_ignores_surrounding_slashes() {
        assert_eq!(DataPath::parse("/a/b/"), DataPath::from_segments(["a", "b"]));
        assert!(DataPath::parse("/").is_root());
        assert_eq!(DataPath::root().to_string(), "/");
    }

    #[test]
    fn strip_prefix_yields_relative_path() {
        let watched = DataPath::user_tasks(&Uid::new("u1"));
        let changed = DataPath::user_task(&Uid::new("u1"), &TaskKey::new("-k")).child("titulo");
        let rel = changed.strip_prefix(&watched).unwrap();
        assert_eq!(rel.to_string(), "/-k/titulo");
        assert!(watched.strip_prefix(&changed).is_none());
    }
}
