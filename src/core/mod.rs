//! Core compiler logic — types, collection, scopes, catalog, evaluation.

pub mod catalog;
pub mod collection;
pub mod compiler;
pub mod descriptor;
pub mod error;
pub mod eval;
pub mod harness;
pub mod parser;
pub mod scope;
pub mod settings;
pub mod store;
pub mod types;
