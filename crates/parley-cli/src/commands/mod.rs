//! Command handlers

pub mod config;
pub mod history;
pub mod watch;
