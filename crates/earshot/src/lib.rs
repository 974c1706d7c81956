pub mod config;
pub mod events;
pub mod presenter;
pub mod sys;
