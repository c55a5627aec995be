//! Shared data model for the nbuild graph, scheduler, and index components.

mod atom;
mod build;
mod index;
mod package;
mod spec;

pub use atom::Atom;
pub use build::Build;
pub use index::IndexedPackage;
pub use package::Package;
pub use spec::{ParseSpecTupleError, SpecTuple};
