pub mod auth_cmd;
pub mod cache;
pub mod common;
pub mod mirror;
pub mod queue;
pub mod status;
pub mod sync;
