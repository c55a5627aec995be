//! Single-slot local builder (spec 4.6): drives one checkout through one
//! build at a time. Grounded in the original's `local.Local` provider,
//! which exists "more to make testing the rest of the system easier"
//! than for production use — kept here for the same reason.

use std::collections::HashMap;
use std::process::Command;
use std::sync::{Arc, Mutex};

use nbuild_source::SourceCheckout;
use nbuild_types::Build;

use crate::{CapacityProvider, Error};

pub struct LocalCapacityProvider {
    checkout: Arc<dyn SourceCheckout>,
    program: String,
    ongoing: Arc<Mutex<Option<Build>>>,
}

impl LocalCapacityProvider {
    pub fn new(checkout: Arc<dyn SourceCheckout>) -> Self {
        Self {
            checkout,
            program: "xbps-src".to_string(),
            ongoing: Arc::new(Mutex::new(None)),
        }
    }

    /// Overrides the build-tool binary invoked, for tests.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl CapacityProvider for LocalCapacityProvider {
    #[tracing::instrument(skip(self))]
    fn dispatch_build(&self, build: Build) -> Result<(), Error> {
        let mut ongoing = self.ongoing.lock().unwrap();
        if ongoing.is_some() {
            return Err(Error::NoCapacity);
        }
        *ongoing = Some(build.clone());
        drop(ongoing);

        if let Err(err) = self.checkout.bootstrap() {
            *self.ongoing.lock().unwrap() = None;
            return Err(err.into());
        }
        if let Err(err) = self.checkout.checkout(&build.rev) {
            *self.ongoing.lock().unwrap() = None;
            return Err(err.into());
        }

        let base_path = self.checkout.base_path().to_path_buf();
        tracing::info!(path = %base_path.display(), spec = %build.spec, "binary-bootstrapping");
        let status = Command::new(&self.program)
            .arg("binary-bootstrap")
            .arg(&build.spec.host)
            .current_dir(&base_path)
            .status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                *self.ongoing.lock().unwrap() = None;
                return Err(anyhow::anyhow!("binary-bootstrap exited with {status}").into());
            }
            Err(err) => {
                *self.ongoing.lock().unwrap() = None;
                return Err(anyhow::Error::from(err).into());
            }
        }

        let mut args = vec!["pkg".to_string(), build.pkg.clone()];
        if !build.spec.native() {
            args.push("-a".to_string());
            args.push(build.spec.target.clone());
        }
        let program = self.program.clone();
        let ongoing = self.ongoing.clone();
        std::thread::spawn(move || {
            let output = Command::new(&program)
                .args(&args)
                .current_dir(&base_path)
                .output();
            *ongoing.lock().unwrap() = None;
            match output {
                Ok(output) if !output.status.success() => {
                    tracing::warn!(
                        status = %output.status,
                        stderr = %String::from_utf8_lossy(&output.stderr),
                        "package build failed",
                    );
                }
                Err(err) => tracing::warn!(%err, "error running package build"),
                Ok(_) => {}
            }
        });

        Ok(())
    }

    fn list_builds(&self) -> Result<Vec<Build>, Error> {
        Ok(self.ongoing.lock().unwrap().iter().cloned().collect())
    }

    /// No-op: this provider has a hard-coded capacity of one.
    fn set_slots(&self, _slots: HashMap<String, usize>) {}
}
