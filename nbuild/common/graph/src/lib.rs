//! The Graph Manager (spec 4.3): per-spec package graphs, their
//! bootstrap/sync lifecycle against a shared source checkout, dirty/
//! dispatchable derivation against the Index Service, and persistence.

mod error;
mod manager;
mod pkg_graph;
mod resolve;

pub use error::Error;
pub use manager::Manager;
pub use pkg_graph::{PkgGraph, UnknownPackage};
pub use resolve::resolve_name;
