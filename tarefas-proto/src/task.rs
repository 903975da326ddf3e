//! Task records as stored in the document store.
//!
//! A collection is a JSON object mapping store-generated keys to
//! `{titulo, descricao}` records. The key is the task's identity: it is
//! never duplicated inside per-user records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Characters the store does not allow in a key.
pub const FORBIDDEN_KEY_CHARS: [char; 6] = ['/', '.', '#', '$', '[', ']'];

/// Why a string cannot address a single task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// An empty key would address the whole collection.
    #[error("task key is empty")]
    Empty,

    /// The key contains a path separator or a reserved character.
    #[error("task key {key:?} contains forbidden character {found:?}")]
    ForbiddenChar {
        /// The rejected key.
        key: String,
        /// First offending character.
        found: char,
    },
}

/// Store-generated key of a task within its collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    /// Wraps an existing key.
    ///
    /// No checks are made; keys headed for a request path go through
    /// [`TaskKey::validate`] first.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Wraps `key` if it names exactly one child of a collection.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] for an empty key or one containing `/ . # $ [ ]`
    /// or a control character.
    pub fn parse(key: impl Into<String>) -> Result<Self, KeyError> {
        let key = Self(key.into());
        key.validate()?;
        Ok(key)
    }

    /// Checks that this key names exactly one child of a collection.
    ///
    /// # Errors
    ///
    /// See [`TaskKey::parse`].
    pub fn validate(&self) -> Result<(), KeyError> {
        if self.0.is_empty() {
            return Err(KeyError::Empty);
        }
        match self
            .0
            .chars()
            .find(|c| FORBIDDEN_KEY_CHARS.contains(c) || c.is_control())
        {
            Some(found) => Err(KeyError::ForbiddenChar {
                key: self.0.clone(),
                found,
            }),
            None => Ok(()),
        }
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A task record. Field names are the store's wire names.
///
/// Missing fields decode as empty strings; empty strings are valid values
/// (no validation is performed on titles or descriptions).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Free-text title.
    #[serde(default)]
    pub titulo: String,
    /// Free-text description.
    #[serde(default)]
    pub descricao: String,
}

impl Task {
    /// Creates a task from its two fields.
    pub fn new(titulo: impl Into<String>, descricao: impl Into<String>) -> Self {
        Self {
            titulo: titulo.into(),
            descricao: descricao.into(),
        }
    }

    /// Merges the fields present in `patch` into this record.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(titulo) = &patch.titulo {
            self.titulo.clone_from(titulo);
        }
        if let Some(descricao) = &patch.descricao {
            self.descricao.clone_from(descricao);
        }
    }
}

/// Partial update of a task. Only `Some` fields are sent and merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title, if changing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titulo: Option<String>,
    /// New description, if changing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descricao: Option<String>,
}

impl TaskPatch {
    /// A patch that replaces both fields.
    pub fn both(titulo: impl Into<String>, descricao: impl Into<String>) -> Self {
        Self {
            titulo: Some(titulo.into()),
            descricao: Some(descricao.into()),
        }
    }

    /// A patch that only replaces the title.
    pub fn titulo(titulo: impl Into<String>) -> Self {
        Self {
            titulo: Some(titulo.into()),
            descricao: None,
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.titulo.is_none() && self.descricao.is_none()
    }
}

/// Create body accepted by the global fallback collection.
///
/// `id` is a client-side creation timestamp kept for legacy readers of
/// the global collection. The row key is still the store-generated name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyTaskBody {
    /// RFC 3339 creation timestamp.
    pub id: String,
    /// Free-text title.
    pub titulo: String,
    /// Free-text description.
    pub descricao: String,
}

impl LegacyTaskBody {
    /// Builds the legacy body for `task` stamped with `created_at`.
    #[must_use]
    pub fn new(created_at: String, task: &Task) -> Self {
        Self {
            id: created_at,
            titulo: task.titulo.clone(),
            descricao: task.descricao.clone(),
        }
    }
}

/// Reply to a `POST` on a collection: the generated child key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReply {
    /// Generated key of the new child.
    pub name: TaskKey,
}

/// An ordered view of one collection: key → task.
///
/// Iteration follows key order, which for generated keys is creation
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TaskSnapshot(BTreeMap<TaskKey, Task>);

impl TaskSnapshot {
    /// An empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Decodes a collection node.
    ///
    /// `null` (absent node) yields an empty snapshot. Children that are not
    /// JSON objects are skipped rather than failing the whole read.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(children) = value else {
            return Self::new();
        };
        let tasks = children
            .iter()
            .filter(|(_, child)| child.is_object())
            .filter_map(|(key, child)| {
                Task::deserialize(child)
                    .ok()
                    .map(|task| (TaskKey::new(key.clone()), task))
            })
            .collect();
        Self(tasks)
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the collection holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks a task up by key.
    #[must_use]
    pub fn get(&self, key: &TaskKey) -> Option<&Task> {
        self.0.get(key)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &TaskKey) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates tasks in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&TaskKey, &Task)> {
        self.0.iter()
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.0.keys()
    }

    /// Inserts or replaces a task.
    pub fn insert(&mut self, key: TaskKey, task: Task) -> Option<Task> {
        self.0.insert(key, task)
    }

    /// Merges `patch` into an existing task. Returns `false` if absent.
    pub fn patch(&mut self, key: &TaskKey, patch: &TaskPatch) -> bool {
        self.0.get_mut(key).is_some_and(|task| {
            task.apply(patch);
            true
        })
    }

    /// Removes a task, returning it if present.
    pub fn remove(&mut self, key: &TaskKey) -> Option<Task> {
        self.0.remove(key)
    }
}

impl<'de> Deserialize<'de> for TaskSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

impl FromIterator<(TaskKey, Task)> for TaskSnapshot {
    fn from_iter<I: IntoIterator<Item = (TaskKey, Task)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a TaskSnapshot {
    type Item = (&'a TaskKey, &'a Task);
    type IntoIter = std::collections::btree_map::Iter<'a, TaskKey, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_that_name_one_child_are_valid() {
        assert!(TaskKey::parse("-NxYz012abcDEF_-").is_ok());
        assert!(TaskKey::parse("Comprar pão").is_ok());
        assert_eq!(TaskKey::parse(""), Err(KeyError::Empty));
    }

    #[test]
    fn path_characters_are_rejected() {
        for (raw, found) in [
            ("a/b", '/'),
            ("..", '.'),
            ("x#", '#'),
            ("$k", '$'),
            ("k[0]", '['),
            ("k]", ']'),
            ("tab\there", '\t'),
        ] {
            assert_eq!(
                TaskKey::new(raw).validate(),
                Err(KeyError::ForbiddenChar {
                    key: raw.to_string(),
                    found,
                }),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn null_node_is_empty_snapshot() {
        let snapshot: TaskSnapshot = serde_json::from_str("null").unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn snapshot_iterates_in_key_order() {
        let snapshot = TaskSnapshot::from_value(&json!({
            "-b": {"titulo": "second", "descricao": ""},
            "-a": {"titulo": "first", "descricao": "x"},
        }));
        let keys: Vec<&str> = snapshot.keys().map(TaskKey::as_str).collect();
        assert_eq!(keys, vec!["-a", "-b"]);
    }

    #[test]
    fn missing_fields_decode_empty() {
        let snapshot = TaskSnapshot::from_value(&json!({"-a": {"titulo": "only"}}));
        let task = snapshot.get(&TaskKey::new("-a")).unwrap();
        assert_eq!(task.titulo, "only");
        assert_eq!(task.descricao, "");
    }

    #[test]
    fn non_object_children_are_skipped() {
        let snapshot = TaskSnapshot::from_value(&json!({
            "-a": {"titulo": "ok", "descricao": "ok"},
            "-b": "garbage",
            "-c": 42,
        }));
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&TaskKey::new("-a")));
    }

    #[test]
    fn legacy_records_with_id_field_still_decode() {
        let snapshot = TaskSnapshot::from_value(&json!({
            "-a": {"id": "2024-01-01T00:00:00.000Z", "titulo": "t", "descricao": "d"},
        }));
        assert_eq!(
            snapshot.get(&TaskKey::new("-a")),
            Some(&Task::new("t", "d"))
        );
    }

    #[test]
    fn patch_only_serializes_present_fields() {
        let body = serde_json::to_value(TaskPatch::titulo("X")).unwrap();
        assert_eq!(body, json!({"titulo": "X"}));
    }

    #[test]
    fn apply_patch_leaves_missing_fields_unchanged() {
        let mut task = Task::new("old", "keep me");
        task.apply(&TaskPatch::titulo("new"));
        assert_eq!(task, Task::new("new", "keep me"));
    }

    #[test]
    fn empty_strings_are_accepted() {
        let mut task = Task::new("a", "b");
        task.apply(&TaskPatch::both("", ""));
        assert_eq!(task, Task::new("", ""));
    }

    #[test]
    fn patch_missing_key_reports_false() {
        let mut snapshot = TaskSnapshot::new();
        assert!(!snapshot.patch(&TaskKey::new("nope"), &TaskPatch::titulo("x")));
    }
}
