//! axum routers for the three HTTP surfaces spec 6 defines: the graph
//! API, the scheduler's completion webhook, and the artifact receiver.
//! `bin/nbuild` mounts whichever of these correspond to
//! `NBUILD_COMPONENTS` under `/api/graph`, `/api/scheduler`, and
//! `/api/reciever` respectively.

mod error;
mod graph;
mod receiver;
mod scheduler;

pub use receiver::Receiver;

pub fn graph_router(manager: std::sync::Arc<nbuild_graph::Manager>) -> axum::Router {
    graph::router(manager)
}

pub fn scheduler_router(scheduler: std::sync::Arc<nbuild_scheduler::Scheduler>) -> axum::Router {
    scheduler::router(scheduler)
}

pub fn receiver_router(receiver: std::sync::Arc<Receiver>) -> axum::Router {
    receiver::router(receiver)
}
