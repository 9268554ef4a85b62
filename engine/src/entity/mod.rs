pub mod project_api;
pub mod project_database;
