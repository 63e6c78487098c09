//! Run environment - the explicit environment snapshot handed to each step

use crate::core::store::ConfigurationStore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Fully merged environment for the steps of one run.
///
/// Built once per run from process defaults, the configuration store and the
/// runtime variables, then passed by reference into every step invocation.
#[derive(Debug, Clone)]
pub struct RunEnvironment {
    /// Merged variables (later layers win)
    variables: BTreeMap<String, String>,

    /// Directory the steps run in
    workdir: PathBuf,

    /// The run's configuration store
    store: ConfigurationStore,
}

impl RunEnvironment {
    /// Merge the layers: `defaults` < `store` < `runtime`
    pub fn new(
        defaults: impl IntoIterator<Item = (String, String)>,
        store: ConfigurationStore,
        runtime: impl IntoIterator<Item = (String, String)>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        let mut variables: BTreeMap<String, String> = defaults.into_iter().collect();
        variables.extend(store.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        variables.extend(runtime);

        Self {
            variables,
            workdir: workdir.into(),
            store,
        }
    }

    /// Environment with no process defaults (used by tests and isolated runs)
    pub fn isolated(store: ConfigurationStore, workdir: impl Into<PathBuf>) -> Self {
        Self::new(Vec::new(), store, Vec::new(), workdir)
    }

    /// Get a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn store(&self) -> &ConfigurationStore {
        &self.store
    }

    /// A copy with extra variables on top (e.g. action inputs)
    pub fn with_extra(&self, extra: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut env = self.clone();
        env.variables.extend(extra);
        env
    }
}
