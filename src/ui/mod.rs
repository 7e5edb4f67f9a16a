//! Terminal layer for interactive sessions.
//!
//! - [`chat_loop`]: reads lines, dispatches commands to [`crate::commands`],
//!   and streams responses.
//! - [`renderer`]: progressive output that stops at the next character once
//!   interrupted.
//! - [`keystroke`]: watches for a key press while a response streams.
//! - [`terminal`]: raw-mode acquisition and guaranteed restoration.
//! - [`secret`]: credential entry without echo.

pub mod chat_loop;
pub mod keystroke;
pub mod renderer;
pub mod secret;
pub mod terminal;
