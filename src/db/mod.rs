pub mod connection;
pub mod migrations;
pub mod populate;
pub mod sql;
pub mod task_repo;
pub mod user_repo;

pub use connection::*;
