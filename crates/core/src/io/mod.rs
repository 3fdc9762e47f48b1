pub mod diagnostics;
pub mod mailbox;
pub mod state_store;
