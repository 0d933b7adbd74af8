// File: hookline-core/src/tasks/mod.rs

pub mod autostart;

pub use autostart::run_autostart;
