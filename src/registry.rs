//! Model-definition discovery.
//!
//! Model descriptors are YAML files (one per model version) in a configured
//! directory. The registry scans them into an in-memory map and re-scans on
//! a background cadence, so new descriptors become visible without a
//! restart; workers observe the refreshed mapping at their next poll.
//!
//! The registry is always passed explicitly to the components that need it.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::Context;

use crate::domain::ModelSpec;

type ModelMap = HashMap<String, BTreeMap<String, ModelSpec>>;

pub struct ModelRegistry {
    model_dir: PathBuf,
    /// name -> version -> spec
    models: RwLock<ModelMap>,
}

impl ModelRegistry {
    /// Scan `model_dir` once. An unreadable directory is a startup error;
    /// an unreadable single descriptor is logged and skipped.
    pub fn scan(model_dir: &Path) -> Result<Self, anyhow::Error> {
        let registry = Self {
            model_dir: model_dir.to_path_buf(),
            models: RwLock::new(HashMap::new()),
        };
        registry.rescan()?;
        Ok(registry)
    }

    /// Re-read every descriptor, replacing the whole map. Returns the number
    /// of (name, version) pairs loaded.
    pub fn rescan(&self) -> Result<usize, anyhow::Error> {
        let mut fresh: ModelMap = HashMap::new();
        let entries = std::fs::read_dir(&self.model_dir)
            .with_context(|| format!("could not read model dir {}", self.model_dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().map(|e| e != "yaml").unwrap_or(true) {
                continue;
            }
            match load_descriptor(&path) {
                Ok(spec) => {
                    fresh
                        .entry(spec.short_name.clone())
                        .or_default()
                        .insert(spec.version.clone(), spec);
                }
                Err(e) => {
                    tracing::warn!(
                        error.cause_chain = ?e,
                        "skipping unreadable model descriptor {}",
                        path.display()
                    );
                }
            }
        }
        let count = fresh.values().map(BTreeMap::len).sum();
        *self.models.write().unwrap() = fresh;
        Ok(count)
    }

    pub fn get(
        &self,
        name: &str,
        version: &str,
    ) -> Option<ModelSpec> {
        self.models.read().unwrap().get(name)?.get(version).cloned()
    }

    /// Highest version of a model, numerically where versions parse as
    /// numbers, lexicographically otherwise.
    pub fn get_latest(
        &self,
        name: &str,
    ) -> Option<ModelSpec> {
        let models = self.models.read().unwrap();
        models
            .get(name)?
            .values()
            .max_by_key(|spec| version_key(&spec.version))
            .cloned()
    }

    /// The supported-version map a worker sends with each poll.
    pub fn versions(&self) -> HashMap<String, Vec<String>> {
        self.models
            .read()
            .unwrap()
            .iter()
            .map(|(name, by_version)| (name.clone(), by_version.keys().cloned().collect()))
            .collect()
    }

    /// Latest version of every model, for the front-end index.
    pub fn latest_models(&self) -> Vec<ModelSpec> {
        let models = self.models.read().unwrap();
        let mut latest: Vec<ModelSpec> = models
            .values()
            .filter_map(|by_version| {
                by_version
                    .values()
                    .max_by_key(|spec| version_key(&spec.version))
                    .cloned()
            })
            .collect();
        latest.sort_by(|a, b| a.short_name.cmp(&b.short_name));
        latest
    }
}

fn version_key(version: &str) -> (Option<u64>, String) {
    (version.parse().ok(), version.to_string())
}

fn load_descriptor(path: &Path) -> Result<ModelSpec, anyhow::Error> {
    let spec: ModelSpec = config::Config::builder()
        .add_source(config::File::from(path))
        .build()?
        .try_deserialize()?;
    Ok(spec)
}

/// Background rescan loop; to be spawned alongside the component that holds
/// the registry. Never returns.
pub async fn run_rescan_loop(
    registry: Arc<ModelRegistry>,
    interval: Duration,
) -> Result<(), anyhow::Error> {
    loop {
        tokio::time::sleep(interval).await;
        match registry.rescan() {
            Ok(count) => tracing::debug!("model rescan found {count} model versions"),
            Err(e) => tracing::warn!(error.cause_chain = ?e, "model rescan failed"),
        }
    }
}
