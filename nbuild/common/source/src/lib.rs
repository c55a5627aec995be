//! The source checkout driver: owns the one authoritative source tree the
//! rest of the system imports package metadata from.
//!
//! Only the trait matters to callers (spec section 1 lists this as an
//! external collaborator); [`GitCheckout`] is the concrete implementation
//! this system actually runs, grounded in `git2` the way `rust-lang-cargo`
//! and `andylokandy-elba` drive their own git-backed sources.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Opens, fetches, and checks out a version-controlled source tree,
/// reporting the paths that changed between two revisions.
///
/// Implementations are expected to serialize their own mutable state
/// internally; `nbuild-graph::Manager` holds a single shared instance.
pub trait SourceCheckout: Send + Sync {
    /// Clones the tree if it doesn't exist locally yet. A no-op if the
    /// checkout is already present.
    fn bootstrap(&self) -> Result<()>;

    /// Fetches from upstream without moving the working tree (spec 4.3's
    /// `UpdateCheckout`).
    fn fetch(&self) -> Result<()>;

    /// Moves the working tree to `rev`, returning the paths that changed
    /// relative to the previous `HEAD`. Checking out the revision already
    /// at `HEAD` is a no-op that returns an empty list.
    fn checkout(&self, rev: &str) -> Result<Vec<String>>;

    /// The revision the working tree currently sits at.
    fn at(&self) -> Result<String>;

    /// The root directory of the working tree.
    fn base_path(&self) -> &Path;
}

/// A `git2`-backed [`SourceCheckout`].
pub struct GitCheckout {
    path: PathBuf,
    url: String,
    repo: std::sync::Mutex<Option<git2::Repository>>,
}

impl GitCheckout {
    pub fn new(path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
            repo: std::sync::Mutex::new(None),
        }
    }

    fn with_repo<T>(&self, f: impl FnOnce(&git2::Repository) -> Result<T>) -> Result<T> {
        let guard = self.repo.lock().unwrap();
        let repo = guard
            .as_ref()
            .context("source checkout must be bootstrapped before use")?;
        f(repo)
    }
}

impl SourceCheckout for GitCheckout {
    fn bootstrap(&self) -> Result<()> {
        let mut guard = self.repo.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        let repo = if self.path.join(".git").exists() {
            git2::Repository::open(&self.path)
                .with_context(|| format!("failed to open checkout at {}", self.path.display()))?
        } else {
            tracing::info!(url = %self.url, path = %self.path.display(), "cloning source tree");
            git2::Repository::clone(&self.url, &self.path)
                .with_context(|| format!("failed to clone {} into {}", self.url, self.path.display()))?
        };
        *guard = Some(repo);
        Ok(())
    }

    fn fetch(&self) -> Result<()> {
        self.with_repo(|repo| {
            let mut remote = repo
                .find_remote("origin")
                .context("checkout has no 'origin' remote")?;
            tracing::debug!(path = %self.path.display(), "fetching origin");
            remote
                .fetch(&[] as &[&str], None, None)
                .context("failed to fetch origin")?;
            Ok(())
        })
    }

    fn checkout(&self, rev: &str) -> Result<Vec<String>> {
        self.with_repo(|repo| {
            let old_head = repo.head().context("failed to resolve current HEAD")?;
            let old_oid = old_head
                .target()
                .context("current HEAD is not a direct reference")?;

            if old_oid.to_string() == rev {
                tracing::trace!(rev, "checkout already at requested revision");
                return Ok(Vec::new());
            }

            let new_oid = git2::Oid::from_str(rev)
                .with_context(|| format!("{rev} is not a valid revision"))?;
            let new_commit = repo
                .find_commit(new_oid)
                .with_context(|| format!("revision {rev} not found in checkout"))?;

            repo.set_head_detached(new_oid)
                .with_context(|| format!("failed to move HEAD to {rev}"))?;
            let mut checkout_builder = git2::build::CheckoutBuilder::new();
            checkout_builder.force();
            repo.checkout_head(Some(&mut checkout_builder))
                .with_context(|| format!("failed to checkout {rev}"))?;

            let old_commit = repo
                .find_commit(old_oid)
                .context("failed to resolve previous HEAD commit")?;
            let old_tree = old_commit.tree().context("failed to read previous tree")?;
            let new_tree = new_commit.tree().context("failed to read new tree")?;
            let diff = repo
                .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)
                .context("failed to diff old and new revisions")?;

            let mut changed = Vec::new();
            diff.foreach(
                &mut |delta, _| {
                    if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path())
                    {
                        changed.push(path.to_string_lossy().into_owned());
                    }
                    true
                },
                None,
                None,
                None,
            )
            .context("failed to enumerate changed paths")?;

            tracing::debug!(rev, count = changed.len(), "checkout moved, paths changed");
            Ok(changed)
        })
    }

    fn at(&self) -> Result<String> {
        self.with_repo(|repo| {
            let head = repo.head().context("failed to resolve HEAD")?;
            let oid = head.target().context("HEAD is not a direct reference")?;
            Ok(oid.to_string())
        })
    }

    fn base_path(&self) -> &Path {
        &self.path
    }
}

/// Resolves a `rev` that may be a short or symbolic name into a full OID
/// string, failing loudly rather than silently falling back.
pub fn resolve_revision(repo: &GitCheckout, rev: &str) -> Result<String> {
    repo.with_repo(|r| {
        let obj = r
            .revparse_single(rev)
            .with_context(|| format!("revision {rev} could not be resolved"))?;
        match obj.short_id() {
            Ok(_) => Ok(obj.id().to_string()),
            Err(err) => bail!("failed to resolve {rev}: {err}"),
        }
    })
}
