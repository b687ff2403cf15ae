//! Built-in build plans

use super::{BuildPlan, PlanError, RunOptions};

pub const BEAN_MACHINE: &str = "bean-machine";

pub const PRESET_NAMES: &[&str] = &[BEAN_MACHINE];

/// Image for the Galton board ("bean machine") backend
///
/// Installs bundler dependencies in frozen mode without the `test` group and
/// launches `./bean_machine.py` from `/src/bcknd/app`.
pub fn bean_machine() -> BuildPlan {
    BuildPlan::builder()
        .workdir("/src/bcknd/app")
        .copy(".", ".")
        .env("BUNDLE_FROZEN", "true")
        .run(["bundle", "install"], RunOptions::frozen().without(["test"]))
        .entrypoint(["python", "./bean_machine.py"])
        .build()
}

pub fn by_name(name: &str) -> Result<BuildPlan, PlanError> {
    match name {
        BEAN_MACHINE => Ok(bean_machine()),
        other => Err(PlanError::UnknownPreset(other.to_string())),
    }
}
