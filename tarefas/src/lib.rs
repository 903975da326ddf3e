//! `Tarefas`: terminal task list backed by a realtime document store.

pub mod app;
pub mod backend;
pub mod config;
pub mod identity;
pub mod store;
pub mod subscription;
pub mod ui;
pub mod view;
