//! Tarefas store emulator library.
//!
//! A local stand-in for the hosted document store and its password
//! sign-in endpoints. Exposed as a library so the client's integration
//! tests can run it in-process and inspect its request log.

pub mod accounts;
pub mod config;
pub mod database;
pub mod server;
