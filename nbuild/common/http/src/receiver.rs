//! Receiver HTTP API (spec 6), mounted under `/api/reciever`: ingests
//! built package artifacts and folds them into the on-disk XBPS
//! repository tree, grounded in the original's `reciever.Reciever`.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use axum::Router;
use serde::Deserialize;

use crate::error::json_error;

/// Parses the target architecture out of a package filename, e.g.
/// `foo-1.0_1.x86_64.xbps` → `x86_64`: everything up to the first
/// `.xbps` occurrence, then the last dot-separated component.
fn arch_from_filename(fname: &str) -> String {
    let base = Path::new(fname)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(fname);
    let before_ext = base.split(".xbps").next().unwrap_or(base);
    before_ext.rsplit('.').next().unwrap_or(before_ext).to_string()
}

pub struct Receiver {
    root: PathBuf,
    indexer: String,
    repo_lock: Arc<Mutex<()>>,
}

impl Receiver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indexer: "xbps-rindex".to_string(),
            repo_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_indexer(mut self, indexer: impl Into<String>) -> Self {
        self.indexer = indexer.into();
        self
    }

    #[tracing::instrument(skip(self, data))]
    async fn handle_file(&self, fname: &str, repo: &str, data: Bytes) -> anyhow::Result<()> {
        let arch = arch_from_filename(fname);
        let dir = self.root.join(&arch).join(repo);
        let path = dir.join(fname);

        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&path, &data).await?;
        tracing::trace!(path = %path.display(), "wrote file from HTTP");

        let indexer = self.indexer.clone();
        let lock = self.repo_lock.clone();
        tokio::task::spawn_blocking(move || register_file(&indexer, &lock, &path, &arch)).await?
    }
}

fn register_file(indexer: &str, lock: &Mutex<()>, path: &Path, arch: &str) -> anyhow::Result<()> {
    let _guard = lock.lock().unwrap();
    let status = Command::new(indexer)
        .arg("-a")
        .arg(path)
        .env("XBPS_TARGET_ARCH", arch)
        .status()?;
    if !status.success() {
        anyhow::bail!("{indexer} exited with {status}");
    }
    tracing::trace!(path = %path.display(), arch, "added package into index");
    Ok(())
}

#[derive(Deserialize)]
struct FileParams {
    fname: String,
    repo: String,
}

pub fn router(receiver: Arc<Receiver>) -> Router {
    Router::new()
        .route("/file", put(put_file))
        .with_state(receiver)
}

async fn put_file(
    State(receiver): State<Arc<Receiver>>,
    Query(params): Query<FileParams>,
    body: Bytes,
) -> Response {
    match receiver.handle_file(&params.fname, &params.repo, body).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, err),
    }
}
