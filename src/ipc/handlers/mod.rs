pub mod core;
pub mod project;
