//! Page building blocks: inputs, the task list, status messages, and the
//! controller that wires them to a store.

pub mod controller;
pub mod edit;
pub mod field;
pub mod list;
pub mod nav;
pub mod page;
pub mod status;
