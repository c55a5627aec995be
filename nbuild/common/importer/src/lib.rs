//! The Package Importer: the shared worker-pool primitive behind both a
//! full import and a delta (changed-paths) import.
//!
//! Decoupled from `nbuild-graph`'s locks via [`ImportTarget`] — this crate
//! only knows it must call `upsert`/`remove`/`record_bad` for a short,
//! synchronous critical section per package; it never holds any lock
//! across the external helper invocation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};

use nbuild_metahelper::{MetaHelper, PackageMetadata};
use nbuild_types::Package;

/// Default worker pool size (spec 4.2/5).
pub const DEFAULT_WORKERS: usize = 10;
/// Default bounded submission channel capacity (spec 4.2/5).
pub const CHANNEL_CAPACITY: usize = 200;

/// Where imported packages land. Implemented by `nbuild-graph::PkgGraph`,
/// whose methods take the Pkgs/Aux lock only for the duration of the
/// map mutation.
pub trait ImportTarget: Send + Sync {
    /// Inserts or replaces a package, always with `dirty = true` already
    /// set by the caller.
    fn upsert(&self, pkg: Package);
    /// Removes a package whose source directory has disappeared (delta
    /// deletion).
    fn remove(&self, name: &str);
    /// Records a metadata-extraction failure for `name` in `atom.bad`;
    /// the package does not get an entry in `pkgs`.
    fn record_bad(&self, name: &str, message: String);
}

/// Runs a full import over `paths`, a list of candidate package
/// directories, using the default worker count and channel capacity.
pub async fn import_all(
    arch: &str,
    checkout_dir: &Path,
    paths: Vec<PathBuf>,
    helper: Arc<dyn MetaHelper>,
    target: Arc<dyn ImportTarget>,
) -> Result<()> {
    import_with_workers(
        arch,
        checkout_dir,
        paths,
        helper,
        target,
        DEFAULT_WORKERS,
        CHANNEL_CAPACITY,
    )
    .await
}

/// A delta import: each changed path whose leaf is the file `template`
/// is rewritten to its parent directory first, then handled exactly like
/// [`import_all`].
pub async fn import_changed(
    arch: &str,
    checkout_dir: &Path,
    changed_paths: Vec<PathBuf>,
    helper: Arc<dyn MetaHelper>,
    target: Arc<dyn ImportTarget>,
) -> Result<()> {
    let rewritten = changed_paths
        .into_iter()
        .map(|p| match p.file_name() {
            Some(leaf) if leaf == "template" => {
                p.parent().map(Path::to_path_buf).unwrap_or(p)
            }
            _ => p,
        })
        .collect();
    import_all(arch, checkout_dir, rewritten, helper, target).await
}

/// Like [`import_all`] but with an explicit worker count and channel
/// capacity, for tests that want small, deterministic pools.
pub async fn import_with_workers(
    arch: &str,
    checkout_dir: &Path,
    paths: Vec<PathBuf>,
    helper: Arc<dyn MetaHelper>,
    target: Arc<dyn ImportTarget>,
    workers: usize,
    channel_capacity: usize,
) -> Result<()> {
    let (tx, rx) = mpsc::channel::<String>(channel_capacity);
    let rx = Arc::new(Mutex::new(rx));

    let mut worker_handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let rx = rx.clone();
        let helper = helper.clone();
        let target = target.clone();
        let arch = arch.to_string();
        let checkout_dir = checkout_dir.to_path_buf();
        worker_handles.push(tokio::spawn(async move {
            loop {
                let next = { rx.lock().await.recv().await };
                let Some(name) = next else { break };
                process_one(&name, &arch, &checkout_dir, &helper, &target).await;
            }
        }));
    }

    for path in paths {
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    target.remove(name);
                }
                continue;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to stat candidate path");
                continue;
            }
        };
        if !meta.is_dir() {
            continue;
        }
        if !tokio::fs::try_exists(path.join("template"))
            .await
            .unwrap_or(false)
        {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // Blocks this producer loop when the channel is full, per spec 5.
        if tx.send(name.to_string()).await.is_err() {
            break;
        }
    }
    drop(tx);

    for handle in worker_handles {
        handle.await?;
    }
    Ok(())
}

async fn process_one(
    name: &str,
    arch: &str,
    checkout_dir: &Path,
    helper: &Arc<dyn MetaHelper>,
    target: &Arc<dyn ImportTarget>,
) {
    let arch = arch.to_string();
    let name_owned = name.to_string();
    let checkout_dir = checkout_dir.to_path_buf();
    let helper = helper.clone();

    let raw = tokio::task::spawn_blocking(move || helper.dump(&arch, &name_owned, &checkout_dir)).await;

    let raw = match raw {
        Ok(result) => result,
        Err(join_err) => {
            target.record_bad(name, join_err.to_string());
            return;
        }
    };

    match raw {
        Ok(raw) => match PackageMetadata::from_dump(&raw) {
            Ok(meta) => target.upsert(to_package(meta)),
            Err(err) => target.record_bad(name, format!("{err:#}")),
        },
        Err(err) => target.record_bad(name, format!("{err:#}")),
    }
}

fn to_package(meta: PackageMetadata) -> Package {
    Package {
        name: meta.pkgname,
        version: meta.composed_version(),
        revision: meta.revision,
        dirty: true,
        failed: false,
        host_depends: meta.host_depends.into_iter().collect::<BTreeSet<_>>(),
        make_depends: meta.make_depends.into_iter().collect::<BTreeSet<_>>(),
        depends: meta.depends.into_iter().collect::<BTreeSet<_>>(),
        subpackages: BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct StaticHelper {
        outputs: HashMap<String, anyhow::Result<String>>,
    }

    impl MetaHelper for StaticHelper {
        fn dump(&self, _arch: &str, name: &str, _checkout_dir: &Path) -> anyhow::Result<String> {
            match self.outputs.get(name) {
                Some(Ok(raw)) => Ok(raw.clone()),
                Some(Err(err)) => Err(anyhow::anyhow!("{err}")),
                None => Err(anyhow::anyhow!("no such package configured: {name}")),
            }
        }
    }

    #[derive(Default)]
    struct RecordingTarget {
        upserted: StdMutex<Vec<Package>>,
        removed: StdMutex<Vec<String>>,
        bad: StdMutex<Vec<(String, String)>>,
    }

    impl ImportTarget for RecordingTarget {
        fn upsert(&self, pkg: Package) {
            self.upserted.lock().unwrap().push(pkg);
        }
        fn remove(&self, name: &str) {
            self.removed.lock().unwrap().push(name.to_string());
        }
        fn record_bad(&self, name: &str, message: String) {
            self.bad.lock().unwrap().push((name.to_string(), message));
        }
    }

    fn dump(name: &str, version: &str, revision: &str, depends: &[&str]) -> String {
        format!(
            "pkgname: {name}\nversion: {version}\nrevision: {revision}\ndepends: {}\n",
            depends.join(" ")
        )
    }

    #[tokio::test]
    async fn imports_directories_with_a_template_child() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b"] {
            let pkg_dir = dir.path().join(name);
            std::fs::create_dir_all(&pkg_dir).unwrap();
            std::fs::write(pkg_dir.join("template"), "").unwrap();
        }
        // A directory with no template child must be skipped.
        std::fs::create_dir_all(dir.path().join("not-a-package")).unwrap();

        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), Ok(dump("a", "1.0", "1", &["b"])));
        outputs.insert("b".to_string(), Ok(dump("b", "2.0", "1", &[])));
        let helper = Arc::new(StaticHelper { outputs });
        let target = Arc::new(RecordingTarget::default());

        let paths = vec![
            dir.path().join("a"),
            dir.path().join("b"),
            dir.path().join("not-a-package"),
            dir.path().join("does-not-exist"),
        ];

        import_with_workers("x86_64", dir.path(), paths, helper, target.clone(), 2, 8)
            .await
            .unwrap();

        let upserted = target.upserted.lock().unwrap();
        assert_eq!(upserted.len(), 2);
        let a = upserted.iter().find(|p| p.name == "a").unwrap();
        assert_eq!(a.version, "1.0_1");
        assert!(a.depends.contains("b"));
        assert!(target.removed.lock().unwrap().is_empty());
        assert!(target.bad.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_path_is_a_delta_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let target = Arc::new(RecordingTarget::default());
        let helper = Arc::new(StaticHelper {
            outputs: HashMap::new(),
        });

        import_with_workers(
            "x86_64",
            dir.path(),
            vec![dir.path().join("gone")],
            helper,
            target.clone(),
            2,
            8,
        )
        .await
        .unwrap();

        assert_eq!(target.removed.lock().unwrap().as_slice(), ["gone"]);
        assert!(target.upserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn helper_failure_is_recorded_as_bad() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("broken");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("template"), "").unwrap();

        let mut outputs = HashMap::new();
        outputs.insert(
            "broken".to_string(),
            Err(anyhow::anyhow!("dbulk-dump exited 1: boom")),
        );
        let helper = Arc::new(StaticHelper { outputs });
        let target = Arc::new(RecordingTarget::default());

        import_with_workers(
            "x86_64",
            dir.path(),
            vec![pkg_dir],
            helper,
            target.clone(),
            1,
            8,
        )
        .await
        .unwrap();

        let bad = target.bad.lock().unwrap();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].0, "broken");
        assert!(target.upserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_changed_rewrites_template_leaf_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("a");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("template"), "").unwrap();

        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), Ok(dump("a", "1.0", "1", &[])));
        let helper = Arc::new(StaticHelper { outputs });
        let target = Arc::new(RecordingTarget::default());

        import_changed(
            "x86_64",
            dir.path(),
            vec![pkg_dir.join("template")],
            helper,
            target.clone(),
        )
        .await
        .unwrap();

        assert_eq!(target.upserted.lock().unwrap().len(), 1);
    }
}
