//! Loads, caches, and refreshes the per-arch binary-repository indices the
//! graph manager cross-references against its package graphs to decide
//! cleanliness.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;

use nbuild_types::IndexedPackage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown repodata scheme in {0:?}, expected http(s):// or file://")]
    UnknownScheme(String),
    #[error("failed to fetch repodata from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to parse repodata catalog: {0}")]
    Parse(#[source] anyhow::Error),
}

/// One repository's worth of published packages, keyed by package name.
type RepoPackages = BTreeMap<String, IndexedPackage>;

/// The indexed state of one architecture: every repo known for it, plus the
/// URLs those repos were last loaded from (so `ReloadArch` knows what to
/// re-fetch).
#[derive(Default)]
struct ArchIndex {
    repos: BTreeMap<String, RepoPackages>,
    repodata_urls: BTreeMap<String, String>,
}

/// The Index Service: one [`ArchIndex`] per architecture, each guarded by
/// its own lock so loads serialize within an arch but run concurrently
/// across arches.
#[derive(Default)]
pub struct IndexService {
    arches: Mutex<BTreeMap<String, Arc<Mutex<ArchIndex>>>>,
}

impl IndexService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads (or re-loads) one repo's catalog into an arch's index.
    #[tracing::instrument(skip(self))]
    pub async fn load_index(&self, arch: &str, repo_name: &str, url: &str) -> Result<(), Error> {
        let bytes = fetch(url).await.map_err(|source| Error::Fetch {
            url: url.to_string(),
            source,
        })?;
        let packages = parse_repo_data(&bytes).map_err(Error::Parse)?;

        let arch_lock = self.arch_lock(arch).await;
        let mut index = arch_lock.lock().await;
        index
            .repodata_urls
            .insert(repo_name.to_string(), url.to_string());
        index.repos.insert(repo_name.to_string(), packages);
        Ok(())
    }

    /// Re-fetches every repo URL known for `arch`. Idempotent; concurrent
    /// calls across different arches are safe, calls for the *same* arch
    /// serialize behind that arch's lock (loads within the arch still
    /// happen one at a time, sequentially, in whatever order the repos
    /// were originally inserted).
    #[tracing::instrument(skip(self))]
    pub async fn reload_arch(&self, arch: &str) -> Result<(), Error> {
        let urls = {
            let arch_lock = self.arch_lock(arch).await;
            let index = arch_lock.lock().await;
            index
                .repodata_urls
                .iter()
                .map(|(repo, url)| (repo.clone(), url.clone()))
                .collect::<Vec<_>>()
        };
        for (repo_name, url) in urls {
            self.load_index(arch, &repo_name, &url).await?;
        }
        Ok(())
    }

    /// Returns the first match for `name` across `arch`'s repos. Repos are
    /// scanned in alphabetical order by name; if two repos disagree, the
    /// alphabetically-first one wins (spec leaves scan order unspecified;
    /// this is the deterministic choice this implementation makes).
    pub async fn get_package(&self, arch: &str, name: &str) -> Option<IndexedPackage> {
        let arch_lock = {
            let arches = self.arches.lock().await;
            arches.get(arch)?.clone()
        };
        let index = arch_lock.lock().await;
        index
            .repos
            .values()
            .find_map(|repo| repo.get(name).cloned())
    }

    /// Total number of packages known across all repos of `arch`, for
    /// diagnostics.
    pub async fn pkg_count(&self, arch: &str) -> usize {
        let Some(arch_lock) = ({
            let arches = self.arches.lock().await;
            arches.get(arch).cloned()
        }) else {
            return 0;
        };
        let index = arch_lock.lock().await;
        index.repos.values().map(|repo| repo.len()).sum()
    }

    async fn arch_lock(&self, arch: &str) -> Arc<Mutex<ArchIndex>> {
        let mut arches = self.arches.lock().await;
        arches
            .entry(arch.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ArchIndex::default())))
            .clone()
    }
}

/// Fetches the raw bytes of a repodata catalog from either scheme spec
/// section 4.1 recognizes.
async fn fetch(url: &str) -> anyhow::Result<Vec<u8>> {
    if let Some(path) = url.strip_prefix("file://") {
        let path = path.to_string();
        tokio::task::spawn_blocking(move || std::fs::read(&path))
            .await?
            .map_err(anyhow::Error::from)
    } else if url.starts_with("http://") || url.starts_with("https://") {
        let response = reqwest::get(url).await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    } else {
        anyhow::bail!(Error::UnknownScheme(url.to_string()))
    }
}

#[derive(Deserialize)]
struct PlistRecord {
    version: String,
}

/// Decodes a zstd-compressed tar containing one `index.plist` member (a
/// mapping from package name to `{version}`). Reaching EOF without finding
/// that member is an empty-but-successful result, matching the tolerance
/// spec 4.1 calls out.
fn parse_repo_data(bytes: &[u8]) -> anyhow::Result<BTreeMap<String, IndexedPackage>> {
    let decoder = zstd::stream::read::Decoder::new(bytes)?;
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_string_lossy() != "index.plist" {
            continue;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        let raw: BTreeMap<String, PlistRecord> = plist::from_bytes(&buf)?;
        return Ok(raw
            .into_iter()
            .map(|(name, record)| {
                let indexed = IndexedPackage {
                    name: name.clone(),
                    version: record.version,
                };
                (name, indexed)
            })
            .collect());
    }

    Ok(BTreeMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_catalog(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut plist_doc = String::from("<plist version=\"1.0\"><dict>\n");
        for (name, version) in entries {
            plist_doc.push_str(&format!(
                "<key>{name}</key><dict><key>version</key><string>{version}</string></dict>\n"
            ));
        }
        plist_doc.push_str("</dict></plist>");
        let header = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
"#;
        let mut full = Vec::new();
        full.extend_from_slice(header);
        full.extend_from_slice(plist_doc.as_bytes());

        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let mut header = tar::Header::new_gnu();
            header.set_path("index.plist").unwrap();
            header.set_size(full.len() as u64);
            header.set_cksum();
            builder.append(&header, full.as_slice()).unwrap();
            builder.finish().unwrap();
        }

        let mut zstd_bytes = Vec::new();
        {
            let mut encoder = zstd::stream::write::Encoder::new(&mut zstd_bytes, 0).unwrap();
            encoder.write_all(&tar_bytes).unwrap();
            encoder.finish().unwrap();
        }
        zstd_bytes
    }

    #[tokio::test]
    async fn load_and_get_package_round_trips() {
        let bytes = build_catalog(&[("a", "1.0_1"), ("b", "2.0_1")]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x86_64-repodata");
        std::fs::write(&path, bytes).unwrap();

        let svc = IndexService::new();
        svc.load_index("x86_64", "main", &format!("file://{}", path.display()))
            .await
            .unwrap();

        let pkg = svc.get_package("x86_64", "a").await.unwrap();
        assert_eq!(pkg.version, "1.0_1");
        assert!(svc.get_package("x86_64", "missing").await.is_none());
        assert_eq!(svc.pkg_count("x86_64").await, 2);
    }

    #[test]
    fn missing_index_plist_member_is_empty_but_ok() {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let mut header = tar::Header::new_gnu();
            header.set_path("README").unwrap();
            header.set_size(0);
            header.set_cksum();
            builder.append(&header, &[][..]).unwrap();
            builder.finish().unwrap();
        }
        let mut zstd_bytes = Vec::new();
        {
            let mut encoder = zstd::stream::write::Encoder::new(&mut zstd_bytes, 0).unwrap();
            encoder.write_all(&tar_bytes).unwrap();
            encoder.finish().unwrap();
        }

        let result = parse_repo_data(&zstd_bytes).unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn unknown_scheme_is_rejected() {
        let svc = IndexService::new();
        let err = svc
            .load_index("x86_64", "main", "ftp://example.com/repodata")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }
}
