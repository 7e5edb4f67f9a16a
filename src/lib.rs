//! Subconscious is a terminal session that streams model responses and lets
//! the user stop any response by pressing a key.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns settings, credentials, provider resolution, the streaming
//!   producer, the interrupt signal, and the background engine.
//! - [`ui`] owns the terminal: raw-mode handling, the keystroke watcher, the
//!   interruptible renderer, and the session loop.
//! - [`commands`] implements slash-command parsing and execution used by the
//!   session loop.
//! - [`utils`] holds request helpers and logging setup.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which starts [`core::engine`] and then runs
//! [`ui::chat_loop`] for interactive sessions.

pub mod cli;
pub mod commands;
pub mod core;
pub mod ui;
pub mod utils;
