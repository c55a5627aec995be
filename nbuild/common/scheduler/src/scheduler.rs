//! The queue-reconstruction / send loop (spec 4.5), grounded in the
//! original's `Scheduler`.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nbuild_capacity::CapacityProvider;
use nbuild_types::{Build, SpecTuple};

use crate::graph_client::GraphClient;
use crate::Error;

struct Queue {
    builds: VecDeque<Build>,
    tuples: HashSet<SpecTuple>,
}

pub struct Scheduler {
    graph: Arc<dyn GraphClient>,
    capacity: Arc<dyn CapacityProvider>,
    queue: Mutex<Queue>,
}

impl Scheduler {
    pub fn new(graph: Arc<dyn GraphClient>, capacity: Arc<dyn CapacityProvider>) -> Self {
        Self {
            graph,
            capacity,
            queue: Mutex::new(Queue {
                builds: VecDeque::new(),
                tuples: HashSet::new(),
            }),
        }
    }

    /// Snapshot of the queue, for tests and diagnostics.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().builds.len()
    }

    pub fn tuples(&self) -> HashSet<SpecTuple> {
        self.queue.lock().unwrap().tuples.clone()
    }

    /// Rebuilds the queue from the graph's dispatchable snapshot, dropping
    /// anything the capacity provider already reports as running.
    #[tracing::instrument(skip(self))]
    pub fn reconstruct(&self) -> bool {
        let Some(dispatchable) = self.graph.get_dispatchable() else {
            return false;
        };

        let current = match self.capacity.list_builds() {
            Ok(builds) => builds,
            Err(err) => {
                tracing::warn!(%err, "unable to list in-flight builds");
                return false;
            }
        };

        let mut queue = self.queue.lock().unwrap();
        queue.builds.clear();
        for (spec, pkgs) in dispatchable.pkgs {
            for pkg in pkgs {
                let build = Build::new(spec.clone(), pkg, dispatchable.rev.clone());
                if !current.contains(&build) {
                    queue.builds.push_back(build);
                }
            }
            queue.tuples.insert(spec);
        }
        tracing::info!("successfully reconstructed queue");
        true
    }

    /// Cleans every known tuple's target on the graph side, then
    /// reconstructs. Pure maintenance; does not itself rebuild the queue
    /// beyond the `Reconstruct()` it ends with.
    #[tracing::instrument(skip(self))]
    pub fn update(&self) -> bool {
        let targets: HashSet<String> = self
            .queue
            .lock()
            .unwrap()
            .tuples
            .iter()
            .map(|tuple| tuple.target.clone())
            .collect();

        let mut ok = true;
        for target in targets {
            ok = self.graph.clean(&target) && ok;
        }
        tracing::info!("cleaned all targets in graph");
        ok && self.reconstruct()
    }

    /// Pops the head of the queue and hands it to the capacity provider.
    /// Leaves the queue untouched unless dispatch actually succeeds.
    #[tracing::instrument(skip(self))]
    pub fn send(&self) -> Result<(), Error> {
        let mut queue = self.queue.lock().unwrap();
        let Some(build) = queue.builds.front().cloned() else {
            return Err(Error::QueueEmpty);
        };

        match self.capacity.dispatch_build(build.clone()) {
            Ok(()) => {
                tracing::trace!(?build, "dispatching");
                queue.builds.pop_front();
                Ok(())
            }
            Err(err) => {
                tracing::trace!(?build, %err, "unable to dispatch right now");
                Err(err.into())
            }
        }
    }

    /// Bootstraps with `Reconstruct`→`Update`, then loops `send()` forever,
    /// sleeping at least a second after any failed dispatch attempt (empty
    /// queue or no capacity both count).
    pub async fn run(self: Arc<Self>) -> ! {
        let scheduler = self.clone();
        tokio::task::spawn_blocking(move || {
            scheduler.reconstruct();
            scheduler.update();
        })
        .await
        .ok();

        loop {
            let scheduler = self.clone();
            let result = tokio::task::spawn_blocking(move || scheduler.send()).await;
            if !matches!(result, Ok(Ok(()))) {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_client::Dispatchable;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeGraph {
        dispatchable: StdMutex<Option<Dispatchable>>,
        cleaned: StdMutex<Vec<String>>,
    }

    impl GraphClient for FakeGraph {
        fn get_dispatchable(&self) -> Option<Dispatchable> {
            self.dispatchable.lock().unwrap().clone()
        }
        fn clean(&self, target: &str) -> bool {
            self.cleaned.lock().unwrap().push(target.to_string());
            true
        }
    }

    struct FakeCapacity {
        running: StdMutex<Vec<Build>>,
        slot_free: StdMutex<bool>,
        dispatched: StdMutex<Vec<Build>>,
    }

    impl CapacityProvider for FakeCapacity {
        fn dispatch_build(&self, build: Build) -> Result<(), nbuild_capacity::Error> {
            if !*self.slot_free.lock().unwrap() {
                return Err(nbuild_capacity::Error::NoCapacity);
            }
            *self.slot_free.lock().unwrap() = false;
            self.dispatched.lock().unwrap().push(build);
            Ok(())
        }
        fn list_builds(&self) -> Result<Vec<Build>, nbuild_capacity::Error> {
            Ok(self.running.lock().unwrap().clone())
        }
        fn set_slots(&self, _slots: HashMap<String, usize>) {}
    }

    fn spec() -> SpecTuple {
        SpecTuple::new("x86_64", "x86_64")
    }

    #[test]
    fn reconstruct_drops_already_running_builds() {
        let running = Build::new(spec(), "already-running", "rev1");
        let graph = Arc::new(FakeGraph {
            dispatchable: StdMutex::new(Some(Dispatchable {
                pkgs: HashMap::from([(spec(), vec!["already-running".into(), "fresh".into()])]),
                rev: "rev1".into(),
            })),
            cleaned: StdMutex::new(Vec::new()),
        });
        let capacity = Arc::new(FakeCapacity {
            running: StdMutex::new(vec![running]),
            slot_free: StdMutex::new(true),
            dispatched: StdMutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(graph, capacity);

        assert!(scheduler.reconstruct());
        assert_eq!(scheduler.queue_len(), 1);
        assert!(scheduler.tuples().contains(&spec()));
    }

    #[test]
    fn send_on_empty_queue_errors() {
        let graph = Arc::new(FakeGraph {
            dispatchable: StdMutex::new(None),
            cleaned: StdMutex::new(Vec::new()),
        });
        let capacity = Arc::new(FakeCapacity {
            running: StdMutex::new(Vec::new()),
            slot_free: StdMutex::new(true),
            dispatched: StdMutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(graph, capacity);
        assert!(matches!(scheduler.send(), Err(Error::QueueEmpty)));
    }

    #[test]
    fn send_pops_on_success_and_leaves_queue_on_no_capacity() {
        let graph = Arc::new(FakeGraph {
            dispatchable: StdMutex::new(Some(Dispatchable {
                pkgs: HashMap::from([(spec(), vec!["a".into(), "b".into()])]),
                rev: "rev1".into(),
            })),
            cleaned: StdMutex::new(Vec::new()),
        });
        let capacity = Arc::new(FakeCapacity {
            running: StdMutex::new(Vec::new()),
            slot_free: StdMutex::new(true),
            dispatched: StdMutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(graph, capacity);
        scheduler.reconstruct();
        assert_eq!(scheduler.queue_len(), 2);

        scheduler.send().unwrap();
        assert_eq!(scheduler.queue_len(), 1);

        // The fake capacity provider only has one slot; the second send
        // fails and the queue must stay intact.
        assert!(scheduler.send().is_err());
        assert_eq!(scheduler.queue_len(), 1);
    }

    #[test]
    fn update_cleans_every_known_tuple_target_then_reconstructs() {
        let graph = Arc::new(FakeGraph {
            dispatchable: StdMutex::new(Some(Dispatchable {
                pkgs: HashMap::from([(spec(), vec!["a".into()])]),
                rev: "rev1".into(),
            })),
            cleaned: StdMutex::new(Vec::new()),
        });
        let capacity = Arc::new(FakeCapacity {
            running: StdMutex::new(Vec::new()),
            slot_free: StdMutex::new(true),
            dispatched: StdMutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(graph.clone(), capacity);

        scheduler.reconstruct();
        assert!(scheduler.update());
        assert_eq!(*graph.cleaned.lock().unwrap(), vec!["x86_64".to_string()]);
    }
}
