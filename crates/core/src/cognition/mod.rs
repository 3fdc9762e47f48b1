pub mod action;
pub mod dispatch;
pub mod prompt;
