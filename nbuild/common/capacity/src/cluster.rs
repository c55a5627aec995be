//! Cluster capacity provider (spec 4.6): parameterized job dispatch over
//! a generic job-scheduling HTTP API, keyed on build metadata.
//!
//! Grounded in the original's `nomad` provider (job-name prefix
//! `nbuild-<spec>-<pkg>`, slot arithmetic from listing pending/running
//! jobs) but speaks a generic REST contract over `reqwest` rather than
//! the HashiCorp Nomad SDK, which nothing else in this stack pulls in.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use nbuild_types::{Build, SpecTuple};

use crate::{CapacityProvider, Error};

const JOB_PREFIX: &str = "nbuild-";

fn job_name(build: &Build) -> String {
    format!("{JOB_PREFIX}{}-{}", build.spec, build.pkg)
}

#[derive(Serialize)]
struct DispatchRequest<'a> {
    name: &'a str,
    host_arch: &'a str,
    target_arch: &'a str,
    package: &'a str,
    revision: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClusterJob {
    name: String,
    status: String,
    host_arch: String,
    target_arch: String,
    package: String,
    revision: String,
}

impl ClusterJob {
    fn running(&self) -> bool {
        self.status == "running" || self.status == "pending"
    }
}

pub struct ClusterCapacityProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    slots: Mutex<HashMap<String, usize>>,
}

impl ClusterCapacityProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn running_by_spec(&self) -> Result<HashMap<SpecTuple, usize>, Error> {
        let mut counts = HashMap::new();
        for build in self.list_builds()? {
            *counts.entry(build.spec).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

impl CapacityProvider for ClusterCapacityProvider {
    #[tracing::instrument(skip(self))]
    fn dispatch_build(&self, build: Build) -> Result<(), Error> {
        let available = *self
            .slots
            .lock()
            .unwrap()
            .get(&build.spec.to_string())
            .unwrap_or(&0);
        if available == 0 {
            return Err(Error::NoCapacity);
        }
        let running = self.running_by_spec()?;
        if running.get(&build.spec).copied().unwrap_or(0) + 1 > available {
            return Err(Error::NoCapacity);
        }

        let name = job_name(&build);
        let response = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .json(&DispatchRequest {
                name: &name,
                host_arch: &build.spec.host,
                target_arch: &build.spec.target,
                package: &build.pkg,
                revision: &build.rev,
            })
            .send()
            .map_err(|err| Error::Other(err.into()))?;
        response
            .error_for_status()
            .map_err(|err| Error::Other(err.into()))?;
        Ok(())
    }

    fn list_builds(&self) -> Result<Vec<Build>, Error> {
        let response = self
            .client
            .get(format!("{}/jobs", self.base_url))
            .query(&[("prefix", JOB_PREFIX)])
            .send()
            .map_err(|err| Error::Other(err.into()))?
            .error_for_status()
            .map_err(|err| Error::Other(err.into()))?;
        let jobs: Vec<ClusterJob> = response.json().map_err(|err| Error::Other(err.into()))?;
        Ok(jobs
            .into_iter()
            .filter(ClusterJob::running)
            .map(|job| {
                Build::new(
                    SpecTuple::new(job.host_arch, job.target_arch),
                    job.package,
                    job.revision,
                )
            })
            .collect())
    }

    fn set_slots(&self, slots: HashMap<String, usize>) {
        *self.slots.lock().unwrap() = slots;
    }
}
