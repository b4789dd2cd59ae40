//! Persistent storage for the chat client: the TOML configuration file.

pub mod config;
