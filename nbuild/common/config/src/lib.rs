//! `NBUILD_CONFIG` document loading and the environment variables that
//! select which components run and where they bind.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use nbuild_types::SpecTuple;

/// Recognized `NBUILD_CONFIG` options (spec section 6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub specs: Vec<SpecTuple>,
    /// target arch -> repo name -> repodata URL.
    pub repo_data_urls: HashMap<String, HashMap<String, String>>,
    pub capacity_provider: String,
    /// `"host:target"` -> parallel build slots.
    pub build_slots: HashMap<String, usize>,
    pub repo_path: String,
    /// Clone URL for the shared source checkout all graphs import from.
    pub source_url: String,
    /// Local working-tree path for that checkout.
    pub source_path: String,
}

impl Default for Config {
    fn default() -> Self {
        let native = SpecTuple::new("x86_64", "x86_64");
        let mut repo_data_urls = HashMap::new();
        repo_data_urls.insert(
            "x86_64".to_string(),
            HashMap::from([
                (
                    "main".to_string(),
                    "http://repo-fastly.voidlinux.org/current/x86_64-repodata".to_string(),
                ),
                (
                    "nonfree".to_string(),
                    "http://repo-fastly.voidlinux.org/current/nonfree/x86_64-repodata"
                        .to_string(),
                ),
                (
                    "local".to_string(),
                    "file://void-packages/hostdir/binpkgs/x86_64-repodata".to_string(),
                ),
            ]),
        );
        let mut build_slots = HashMap::new();
        build_slots.insert(native.to_string(), 1);

        Self {
            specs: vec![native],
            repo_data_urls,
            capacity_provider: "local".to_string(),
            build_slots,
            repo_path: "my-repo".to_string(),
            source_url: "https://github.com/void-linux/void-packages.git".to_string(),
            source_path: "void-packages".to_string(),
        }
    }
}

impl Config {
    /// Loads a config document, falling back to defaults for any field
    /// the document doesn't set, mirroring the original's
    /// `NewConfig().LoadFromFile` sequencing.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Loads from `NBUILD_CONFIG` if set, otherwise returns defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os("NBUILD_CONFIG") {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}

/// The component set requested via `NBUILD_COMPONENTS`
/// (comma-separated subset of `graph`, `scheduler`, `reciever`).
pub fn requested_components() -> Result<Vec<String>> {
    let raw = std::env::var("NBUILD_COMPONENTS")
        .context("NBUILD_COMPONENTS must contain at least one component")?;
    Ok(raw
        .split(',')
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect())
}

/// The HTTP bind address requested via `NBUILD_BIND`.
pub fn bind_address() -> Result<String> {
    std::env::var("NBUILD_BIND").context("NBUILD_BIND must be set to a valid bind address")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_one_native_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.specs, vec![SpecTuple::new("x86_64", "x86_64")]);
        assert_eq!(cfg.capacity_provider, "local");
    }

    #[test]
    fn load_from_file_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = Config {
            specs: vec![SpecTuple::new("x86_64", "armv7l")],
            ..Config::default()
        };
        std::fs::write(&path, serde_json::to_string(&cfg).unwrap()).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.specs, cfg.specs);
    }

    #[test]
    fn requested_components_splits_and_lowercases() {
        std::env::set_var("NBUILD_COMPONENTS", "Graph,Scheduler");
        assert_eq!(
            requested_components().unwrap(),
            vec!["graph".to_string(), "scheduler".to_string()]
        );
        std::env::remove_var("NBUILD_COMPONENTS");
    }
}
