//! Runtime instance - the isolated per-run workspace

use crate::core::TriggerEvent;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Resources owned by one run. Torn down when the run ends, whatever the outcome.
#[derive(Debug)]
pub struct RuntimeInstance {
    execution_id: Uuid,
    workdir: PathBuf,
    /// `None` once torn down
    scratch: Option<TempDir>,
}

impl RuntimeInstance {
    /// Provision a runtime for a run in `workdir`
    pub fn provision(execution_id: Uuid, workdir: &Path) -> io::Result<Self> {
        let workdir = workdir.canonicalize()?;
        if !workdir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", workdir.display()),
            ));
        }

        let scratch = tempfile::Builder::new()
            .prefix(&format!("linear-ci-{}-", execution_id.simple()))
            .tempdir()?;

        info!(
            "Provisioned runtime {} (workspace {}, scratch {})",
            execution_id,
            workdir.display(),
            scratch.path().display()
        );

        Ok(Self {
            execution_id,
            workdir,
            scratch: Some(scratch),
        })
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Per-run scratch directory, exported as `RUNNER_TEMP`
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    /// Variables every step of the run sees
    pub fn variables(&self, pipeline_name: &str, event: &TriggerEvent) -> Vec<(String, String)> {
        let mut vars = vec![
            ("CI".to_string(), "true".to_string()),
            ("PIPELINE_NAME".to_string(), pipeline_name.to_string()),
            ("PIPELINE_RUN_ID".to_string(), self.execution_id.to_string()),
            ("PIPELINE_EVENT".to_string(), event.event.to_string()),
            ("PIPELINE_BRANCH".to_string(), event.branch.clone()),
            (
                "PIPELINE_WORKSPACE".to_string(),
                self.workdir.display().to_string(),
            ),
        ];
        if let Some(scratch) = self.scratch_dir() {
            vars.push(("RUNNER_TEMP".to_string(), scratch.display().to_string()));
        }
        vars
    }

    /// Remove the scratch directory
    pub fn teardown(mut self) -> io::Result<()> {
        match self.scratch.take() {
            Some(scratch) => {
                debug!("Removing scratch directory {}", scratch.path().display());
                scratch.close()?;
                info!("Tore down runtime {}", self.execution_id);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for RuntimeInstance {
    fn drop(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                warn!("Failed to remove scratch directory {}: {}", path.display(), e);
            }
        }
    }
}
