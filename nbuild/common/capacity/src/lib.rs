//! Capacity providers (spec 4.6): the pluggable back-ends a [scheduler]
//! hands dispatchable [`Build`]s to.
//!
//! [scheduler]: https://docs.rs/nbuild-scheduler

mod cluster;
mod error;
mod local;

use std::collections::HashMap;

use nbuild_types::Build;

pub use cluster::ClusterCapacityProvider;
pub use error::Error;
pub use local::LocalCapacityProvider;

/// A back-end that actually runs builds. The scheduler never introspects a
/// provider beyond this interface (spec 4.6).
pub trait CapacityProvider: Send + Sync {
    /// Attempts to start `build`. Returns [`Error::NoCapacity`] if full,
    /// any other error for transient faults.
    fn dispatch_build(&self, build: Build) -> Result<(), Error>;

    /// A snapshot of builds this provider currently believes are in
    /// flight.
    fn list_builds(&self) -> Result<Vec<Build>, Error>;

    /// Configures per-spec parallelism, keyed by `SpecTuple`'s `host:target`
    /// string form.
    fn set_slots(&self, slots: HashMap<String, usize>);
}
