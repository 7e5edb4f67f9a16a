pub mod backend;
pub mod chat_stream;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod interrupt;
pub mod keyring;
pub mod providers;
pub mod session;
pub mod shutdown;
pub mod workspace;
