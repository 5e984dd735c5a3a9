pub mod config;
pub mod db;
pub mod import;
pub mod ipc;
pub mod sqlite_store;
pub mod store;
