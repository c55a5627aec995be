//! The queue-reconstruction / send loop (spec section 4.5): turns a
//! dispatchable set into concrete, running builds without duplicating
//! work already in flight, through a [`nbuild_capacity::CapacityProvider`].

mod error;
mod graph_client;
mod scheduler;

pub use error::Error;
pub use graph_client::{Dispatchable, GraphClient, HttpGraphClient, InProcessGraphClient};
pub use scheduler::Scheduler;
