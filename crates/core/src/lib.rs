pub mod capability;
pub mod cognition;
pub mod config;
pub mod io;
pub mod runtime;
pub mod task;
pub mod types;
