//! Shared wire definitions for `Tarefas`.
//!
//! Everything both sides of the store protocol agree on lives here: the
//! task record and its partial patch, user sessions, collection paths,
//! store-generated keys, and the event-stream codec used by live
//! subscriptions.

pub mod path;
pub mod push_id;
pub mod session;
pub mod stream;
pub mod task;
pub mod tree;
