//! hostcat — manifest compiler for per-host configuration catalogs.
//!
//! Classes, nodes and defined types are loaded from YAML manifests into a
//! type collection, then compiled into one catalog per host.

pub mod cli;
pub mod core;
