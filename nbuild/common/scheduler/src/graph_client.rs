//! The scheduler's view of the graph side: either a `reqwest`-backed HTTP
//! client against a remote graph component, or the in-process `Manager`
//! when both components run in the same binary (spec 4.5's "apiClient
//! (graph-API client or in-process Manager)").

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use nbuild_graph::Manager;
use nbuild_types::SpecTuple;

/// The dispatchable snapshot the scheduler reconstructs its queue from.
#[derive(Debug, Clone, Default)]
pub struct Dispatchable {
    pub pkgs: HashMap<SpecTuple, Vec<String>>,
    pub rev: String,
}

/// Everything the scheduler needs from the graph side.
///
/// Methods are synchronous to match the rest of this workspace's trait
/// boundaries (`SourceCheckout`, `MetaHelper`, `Storage`); callers that
/// run inside an async context dispatch them through
/// `tokio::task::spawn_blocking`.
pub trait GraphClient: Send + Sync {
    /// Fetches the current dispatchable snapshot. `None` on any failure
    /// to reach or parse a response from the graph side (matching the
    /// original's `(*Dispatchable, bool)` contract).
    fn get_dispatchable(&self) -> Option<Dispatchable>;

    /// Requests a `Clean(target)` on the graph side. `true` on success.
    fn clean(&self, target: &str) -> bool;
}

/// `reqwest`-backed client for a graph component running as a separate
/// HTTP service, grounded in the original's `graph.APIClient`.
pub struct HttpGraphClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGraphClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builder"),
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct RawDispatchable {
    #[serde(rename = "Pkgs")]
    pkgs: HashMap<String, Vec<String>>,
    #[serde(rename = "Revision")]
    revision: String,
}

impl GraphClient for HttpGraphClient {
    fn get_dispatchable(&self) -> Option<Dispatchable> {
        let url = format!("{}/api/graph/dispatchable", self.base_url);
        let raw: RawDispatchable = tokio::runtime::Handle::current()
            .block_on(async {
                self.client
                    .get(&url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<RawDispatchable>()
                    .await
            })
            .map_err(|err| tracing::warn!(%err, %url, "failed to fetch dispatchable"))
            .ok()?;

        let pkgs = raw
            .pkgs
            .into_iter()
            .filter_map(|(tuple, list)| {
                tuple.parse::<SpecTuple>().ok().map(|spec| (spec, list))
            })
            .collect();
        Some(Dispatchable {
            pkgs,
            rev: raw.revision,
        })
    }

    fn clean(&self, target: &str) -> bool {
        let url = format!("{}/api/graph/clean/{target}", self.base_url);
        let result = tokio::runtime::Handle::current().block_on(async {
            self.client
                .post(&url)
                .json(&serde_json::json!({}))
                .send()
                .await?
                .error_for_status()
        });
        match result {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(%err, target, "error cleaning");
                false
            }
        }
    }
}

/// Adapter for a graph `Manager` living in the same process, avoiding a
/// network hop when the `graph` and `scheduler` components are both
/// enabled (spec 6's `NBUILD_COMPONENTS`).
pub struct InProcessGraphClient {
    manager: std::sync::Arc<Manager>,
}

impl InProcessGraphClient {
    pub fn new(manager: std::sync::Arc<Manager>) -> Self {
        Self { manager }
    }
}

impl GraphClient for InProcessGraphClient {
    fn get_dispatchable(&self) -> Option<Dispatchable> {
        let pkgs = self
            .manager
            .get_dispatchable()
            .into_iter()
            .map(|(spec, pkgs)| (spec, pkgs.into_iter().map(|p| p.name).collect()))
            .collect();
        Some(Dispatchable {
            pkgs,
            rev: self.manager.current_rev(),
        })
    }

    fn clean(&self, target: &str) -> bool {
        let result = tokio::runtime::Handle::current().block_on(self.manager.clean_target(target));
        result
            .map_err(|err| tracing::warn!(%err, target, "error cleaning"))
            .is_ok()
    }
}
