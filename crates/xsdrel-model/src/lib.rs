//! XSD-to-relational model derivation and SQL Server DDL emission.
//!
//! This crate is pure: it reads XSD text in and hands a [`model::Model`] and
//! DDL text out. It has no filesystem or database dependency beyond the XSD
//! string itself. The importer (`xsdrel-import`) and daemon
//! (`xsdrel-daemon`) crates consume the model this crate builds.

pub mod builder;
pub mod ddl;
pub mod error;
pub mod ident;
pub mod model;
pub mod resolver;
pub mod types;

pub use builder::{build_model, DEFAULT_SCHEMA};
pub use ddl::emit_ddl;
pub use error::{ModelError, Result};
pub use model::{Model, ModelWarning, Table};
