//! JSON document tree operations.
//!
//! The store is one JSON tree. Writing `null` deletes a node, and a node
//! left with no children disappears with it, so an empty object is never
//! stored. Both the emulator's database and the client's live mirror of a
//! subscribed collection use these functions.

use serde_json::{Map, Value};

use crate::path::DataPath;
use crate::stream::StreamEvent;
use crate::task::TaskSnapshot;

/// Returns the value at `path`, or `None` when absent.
#[must_use]
pub fn get_at<'a>(root: &'a Value, path: &DataPath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    if node.is_null() { None } else { Some(node) }
}

/// Replaces the value at `path`. A `null` value deletes the node.
pub fn set_at(root: &mut Value, path: &DataPath, value: Value) {
    set_segments(root, path.segments(), normalize(value));
}

/// Sets each child of `children` below `path`, leaving siblings untouched.
pub fn merge_at(root: &mut Value, path: &DataPath, children: &Map<String, Value>) {
    for (key, value) in children {
        set_at(root, &path.clone().child(key), value.clone());
    }
}

fn set_segments(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let vacant = {
            let child = map.entry(head.clone()).or_insert(Value::Null);
            set_segments(child, rest, value);
            child.is_null()
        };
        if vacant {
            map.remove(head);
        }
        if map.is_empty() {
            *node = Value::Null;
        }
    }
}

/// Drops `null` children and empty objects, recursively.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(key, child)| (key, normalize(child)))
                .filter(|(_, child)| !child.is_null())
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        other => other,
    }
}

/// Client-side mirror of one subscribed collection.
#[derive(Debug, Clone, Default)]
pub struct TaskTree {
    root: Value,
}

impl TaskTree {
    /// An empty mirror.
    #[must_use]
    pub const fn new() -> Self {
        Self { root: Value::Null }
    }

    /// Applies a stream event. Returns `true` if the event changed data
    /// (i.e. it was a `put` or `patch`).
    pub fn apply(&mut self, event: &StreamEvent) -> bool {
        match event {
            StreamEvent::Put(payload) => {
                set_at(&mut self.root, &payload.data_path(), payload.data.clone());
                true
            }
            StreamEvent::Patch(payload) => {
                if let Value::Object(children) = &payload.data {
                    merge_at(&mut self.root, &payload.data_path(), children);
                }
                true
            }
            StreamEvent::KeepAlive | StreamEvent::Cancel(_) | StreamEvent::AuthRevoked => false,
        }
    }

    /// The collection as it currently stands.
    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot::from_value(&self.root)
    }

    /// The raw mirrored value.
    #[must_use]
    pub const fn root(&self) -> &Value {
        &self.root
    }
}
