#![deny(unsafe_code)]

/// Root shell: session gate, window chrome and global actions.
pub mod app;
/// Email/password screen.
pub mod auth;
/// Sidebar, message feed and composer views.
pub mod chat;
pub mod services;
/// Settings loading and persistence.
pub mod settings;
