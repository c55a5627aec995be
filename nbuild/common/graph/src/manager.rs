//! The Graph Manager: supervises one [`PkgGraph`] per configured
//! [`SpecTuple`], wiring each to the shared source checkout, index
//! service, and storage (spec 4.3).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use nbuild_metahelper::{MetaHelper, NameNormalizer};
use nbuild_repodata::IndexService;
use nbuild_source::SourceCheckout;
use nbuild_storage::Storage;
use nbuild_types::{Atom, Package, SpecTuple};

use crate::error::Error;
use crate::pkg_graph::PkgGraph;
use crate::resolve::resolve_name;

fn storage_key(spec: &SpecTuple) -> Vec<u8> {
    format!("graph/{spec}").into_bytes()
}

pub struct Manager {
    graphs: HashMap<SpecTuple, Arc<PkgGraph>>,
    checkout: Arc<dyn SourceCheckout>,
    index: Arc<IndexService>,
    storage: Arc<dyn Storage>,
    helper: Arc<dyn MetaHelper>,
    normalizer: Arc<dyn NameNormalizer>,
    rev: Mutex<String>,
}

impl Manager {
    pub fn new(
        specs: Vec<SpecTuple>,
        base_path: impl Into<PathBuf>,
        checkout: Arc<dyn SourceCheckout>,
        index: Arc<IndexService>,
        storage: Arc<dyn Storage>,
        helper: Arc<dyn MetaHelper>,
        normalizer: Arc<dyn NameNormalizer>,
    ) -> Self {
        let base_path = base_path.into();
        let graphs = specs
            .into_iter()
            .map(|spec| {
                let graph = Arc::new(PkgGraph::new(spec.clone(), base_path.clone()));
                (spec, graph)
            })
            .collect();
        Self {
            graphs,
            checkout,
            index,
            storage,
            helper,
            normalizer,
            rev: Mutex::new(String::new()),
        }
    }

    pub fn specs(&self) -> impl Iterator<Item = &SpecTuple> {
        self.graphs.keys()
    }

    pub fn current_rev(&self) -> String {
        self.rev.lock().unwrap().clone()
    }

    fn graph(&self, spec: &SpecTuple) -> Result<&Arc<PkgGraph>, Error> {
        self.graphs
            .get(spec)
            .ok_or_else(|| Error::UnknownSpec(spec.clone()))
    }

    pub fn get_atom(&self, spec: &SpecTuple) -> Result<Atom, Error> {
        Ok(self.graph(spec)?.to_atom())
    }

    pub fn get_pkg(&self, spec: &SpecTuple, name: &str) -> Result<Package, Error> {
        self.graph(spec)?
            .get_pkg(name)
            .ok_or_else(|| Error::UnknownPackage {
                spec: spec.clone(),
                pkg: name.to_string(),
            })
    }

    pub fn get_dirty(&self, spec: &SpecTuple) -> Result<Vec<Package>, Error> {
        Ok(self.graph(spec)?.dirty_pkgs())
    }

    /// Delegates to the Dispatch Finder over a snapshot of every atom.
    pub fn get_dispatchable(&self) -> HashMap<SpecTuple, Vec<Package>> {
        let atoms: HashMap<SpecTuple, Atom> = self
            .graphs
            .iter()
            .map(|(spec, graph)| (spec.clone(), graph.to_atom()))
            .collect();
        nbuild_dispatch::immediately_dispatchable(&atoms)
    }

    pub fn fail_pkg(&self, spec: &SpecTuple, name: &str) -> Result<(), Error> {
        self.graph(spec)?
            .fail(name)
            .map_err(|_| Error::UnknownPackage {
                spec: spec.clone(),
                pkg: name.to_string(),
            })
    }

    pub fn unfail_pkg(&self, spec: &SpecTuple, name: &str) -> Result<(), Error> {
        self.graph(spec)?
            .unfail(name)
            .map_err(|_| Error::UnknownPackage {
                spec: spec.clone(),
                pkg: name.to_string(),
            })
    }

    /// Resolves a raw dependency token against `spec`'s own atom (the
    /// chain `SPEC_FULL.md` C.2 describes), falling through to the
    /// external normalizer.
    pub fn resolve_name(&self, spec: &SpecTuple, name: &str) -> Result<String, Error> {
        let graph = self.graph(spec)?;
        let atom = graph.to_atom();
        Ok(resolve_name(
            &atom.pkgs,
            &atom.virtual_packages,
            self.normalizer.as_ref(),
            name,
        ))
    }

    /// Opens the checkout, reads its current revision, hydrates every
    /// spec's atom from storage, and imports whichever specs are at a
    /// stale or missing revision — all in parallel, joined before
    /// persistence.
    #[tracing::instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<(), Error> {
        let checkout = self.checkout.clone();
        tokio::task::spawn_blocking(move || checkout.bootstrap())
            .await?
            .map_err(Error::Checkout)?;

        let checkout = self.checkout.clone();
        let rev = tokio::task::spawn_blocking(move || checkout.at())
            .await?
            .map_err(Error::Checkout)?;
        *self.rev.lock().unwrap() = rev.clone();

        let mut needs_import = Vec::new();
        for (spec, graph) in &self.graphs {
            match self.load_atom(spec)? {
                Some(atom) => {
                    let stale = atom.rev != rev;
                    graph.hydrate(atom);
                    if stale {
                        needs_import.push(graph.clone());
                    }
                }
                None => needs_import.push(graph.clone()),
            }
            graph.load_virtual().map_err(|err| Error::Import(err.into()))?;
        }

        let base_path = self.checkout.base_path().to_path_buf();
        let mut joins = Vec::with_capacity(needs_import.len());
        for graph in needs_import {
            let helper = self.helper.clone();
            let base_path = base_path.clone();
            joins.push(tokio::spawn(async move {
                let arch = graph.spec().target.clone();
                let paths = discover_candidate_paths(&base_path).await?;
                nbuild_importer::import_all(&arch, &base_path, paths, helper, graph.clone())
                    .await?;
                Ok::<_, anyhow::Error>(graph)
            }));
        }
        for join in joins {
            let graph = join.await??;
            graph.set_rev(rev.clone());
        }

        self.persist_all()
    }

    /// Fetches from upstream without moving the checkout (spec 4.3's
    /// `UpdateCheckout`).
    #[tracing::instrument(skip(self))]
    pub async fn update_checkout(&self) -> Result<(), Error> {
        let checkout = self.checkout.clone();
        tokio::task::spawn_blocking(move || checkout.fetch())
            .await?
            .map_err(Error::Checkout)
    }

    /// Moves the checkout to `hash`, imports only the changed paths per
    /// spec in parallel, and persists.
    #[tracing::instrument(skip(self))]
    pub async fn sync_to(&self, hash: &str) -> Result<(), Error> {
        let checkout = self.checkout.clone();
        let hash_owned = hash.to_string();
        let changed = tokio::task::spawn_blocking(move || checkout.checkout(&hash_owned))
            .await?
            .map_err(Error::Checkout)?;

        let base_path = self.checkout.base_path().to_path_buf();
        let changed_paths: Vec<PathBuf> = changed.into_iter().map(|p| base_path.join(p)).collect();

        let mut joins = Vec::with_capacity(self.graphs.len());
        for graph in self.graphs.values().cloned() {
            let helper = self.helper.clone();
            let base_path = base_path.clone();
            let changed_paths = changed_paths.clone();
            joins.push(tokio::spawn(async move {
                let arch = graph.spec().target.clone();
                nbuild_importer::import_changed(&arch, &base_path, changed_paths, helper, graph.clone())
                    .await?;
                Ok::<_, anyhow::Error>(graph)
            }));
        }
        for join in joins {
            let graph = join.await??;
            graph.set_rev(hash.to_string());
        }

        self.persist_all()
    }

    /// For every dirty package in every spec, checks the target arch's
    /// index and clears `dirty` on a version match.
    #[tracing::instrument(skip(self))]
    pub async fn clean(&self) -> Result<(), Error> {
        for (spec, graph) in &self.graphs {
            self.clean_graph(spec, graph).await;
        }
        self.persist_all()
    }

    /// Reloads `target`'s index, then cleans only the specs targeting it
    /// (the scheduler's per-tuple `Update()` call, spec 4.5).
    #[tracing::instrument(skip(self))]
    pub async fn clean_target(&self, target: &str) -> Result<(), Error> {
        self.index.reload_arch(target).await?;
        for (spec, graph) in &self.graphs {
            if spec.target == target {
                self.clean_graph(spec, graph).await;
            }
        }
        self.persist_all()
    }

    async fn clean_graph(&self, spec: &SpecTuple, graph: &Arc<PkgGraph>) {
        for pkg in graph.dirty_pkgs() {
            if let Some(indexed) = self.index.get_package(&spec.target, &pkg.name).await {
                if indexed.version == pkg.indexed_name() {
                    graph.clear_dirty(&pkg.name);
                }
            }
        }
    }

    fn persist_all(&self) -> Result<(), Error> {
        for graph in self.graphs.values() {
            let atom = graph.to_atom();
            let bytes = serde_json::to_vec(&atom)?;
            self.storage
                .put(&storage_key(&atom.spec), &bytes)
                .map_err(Error::Storage)?;
        }
        Ok(())
    }

    fn load_atom(&self, spec: &SpecTuple) -> Result<Option<Atom>, Error> {
        match self
            .storage
            .get(&storage_key(spec))
            .map_err(Error::Storage)?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Lists `<base_path>/srcpkgs/*`, the candidate package directories a
/// full import walks (grounded in the original's `filepath.Glob`).
async fn discover_candidate_paths(base_path: &std::path::Path) -> anyhow::Result<Vec<PathBuf>> {
    let srcpkgs = base_path.join("srcpkgs");
    let mut entries = match tokio::fs::read_dir(&srcpkgs).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        paths.push(entry.path());
    }
    Ok(paths)
}
