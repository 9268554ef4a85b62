//! Table Engine - per-project dynamic tables on a shared SQL store
//!
//! Tenants define logical tables; the engine creates isolated physical tables,
//! keeps a registry of their structure, and serves typed CRUD and filtered
//! queries over them. Everything goes through [`service::TableEngine`].

pub mod catalog;
pub mod codec;
pub mod config;
pub mod ddl;
pub mod dto;
pub mod entity;
pub mod error;
pub mod isolation;
pub mod model;
pub mod query;
pub mod records;
pub mod registry;
pub mod schema;
pub mod service;
pub mod store;
pub mod validate;

pub use config::EngineConfig;
pub use dto::QueryResult;
pub use error::{EngineError, EngineResult};
pub use model::ProjectId;
pub use service::TableEngine;
