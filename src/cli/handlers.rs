//! Command handlers; each returns the process exit code

use super::commands::{BuildArgs, PlanArgs, PlanSourceArgs};
use super::output::{OutputFormat, OutputFormatter};
use crate::config::ImageplanConfig;
use crate::context::BuildContext;
use crate::error::GENERIC_FAILURE_EXIT_CODE;
use crate::fs::RealFileSystem;
use crate::image::export_layer;
use crate::pipeline::BuildPipeline;
use crate::plan::{presets, BuildPlan};
use crate::progress::LoggingHandler;
use crate::runner::ProcessRunner;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

const DEFAULT_RECIPE: &str = "Dockerfile";

pub async fn handle_build(args: &BuildArgs, quiet: bool) -> i32 {
    let config = ImageplanConfig::default();
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return GENERIC_FAILURE_EXIT_CODE;
    }

    let plan = match load_plan(&args.source, &config.shell) {
        Ok(plan) => plan,
        Err(e) => {
            error!("Failed to load build plan: {:#}", e);
            return GENERIC_FAILURE_EXIT_CODE;
        }
    };

    let context_dir = match canonical_dir(&args.source.context) {
        Ok(dir) => dir,
        Err(e) => {
            error!("{:#}", e);
            return GENERIC_FAILURE_EXIT_CODE;
        }
    };
    let context = match BuildContext::load(&context_dir) {
        Ok(context) => context,
        Err(e) => {
            error!("Failed to load build context: {:#}", e);
            return GENERIC_FAILURE_EXIT_CODE;
        }
    };
    debug!(
        context = %context_dir.display(),
        entries = context.entries().len(),
        "Build context ready"
    );

    let build_id = Uuid::new_v4().to_string();
    let rootfs = args
        .rootfs
        .clone()
        .unwrap_or_else(|| config.rootfs_for(&build_id));
    if let Err(e) = prepare_rootfs(&rootfs) {
        error!("{:#}", e);
        return GENERIC_FAILURE_EXIT_CODE;
    }
    info!(build = %build_id, rootfs = %rootfs.display(), "Root filesystem prepared");

    let timeout = match args.timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.command_timeout(),
    };

    let mut pipeline = BuildPipeline::new(
        Arc::new(RealFileSystem::rooted(&rootfs)),
        Arc::new(ProcessRunner::new()),
        context,
    )
    .with_build_id(build_id)
    .with_timeout(timeout)
    .with_progress(Arc::new(LoggingHandler));

    let formatter = OutputFormatter::new(args.format.into());

    let mut manifest = match pipeline.execute(&plan).await {
        Ok(manifest) => manifest,
        Err(failure) => {
            error!("Build failed: {}", failure);
            if let Some(partial) = &failure.manifest {
                match formatter.format_manifest(partial) {
                    Ok(output) => {
                        write_output(args.output.as_deref(), &output, quiet);
                    }
                    Err(e) => error!("Failed to format partial manifest: {:#}", e),
                }
            }
            return failure.exit_code();
        }
    };

    if let Some(layer_path) = &args.export_layer {
        match export_layer(&rootfs, layer_path) {
            Ok(layer) => manifest.layer = Some(layer),
            Err(e) => {
                error!("Failed to export layer: {:#}", e);
                return GENERIC_FAILURE_EXIT_CODE;
            }
        }
    }

    let output = match formatter.format_manifest(&manifest) {
        Ok(out) => out,
        Err(e) => {
            error!("Failed to format output: {:#}", e);
            return GENERIC_FAILURE_EXIT_CODE;
        }
    };

    if write_output(args.output.as_deref(), &output, quiet) {
        0
    } else {
        GENERIC_FAILURE_EXIT_CODE
    }
}

pub fn handle_plan(args: &PlanArgs, quiet: bool) -> i32 {
    let config = ImageplanConfig::default();
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return GENERIC_FAILURE_EXIT_CODE;
    }

    let plan = match load_plan(&args.source, &config.shell) {
        Ok(plan) => plan,
        Err(e) => {
            error!("Failed to load build plan: {:#}", e);
            return GENERIC_FAILURE_EXIT_CODE;
        }
    };

    let format: OutputFormat = args.format.into();
    let output = match OutputFormatter::new(format).format_plan(&plan) {
        Ok(out) => out,
        Err(e) => {
            error!("Failed to format output: {:#}", e);
            return GENERIC_FAILURE_EXIT_CODE;
        }
    };

    if write_output(args.output.as_deref(), &output, quiet) {
        0
    } else {
        GENERIC_FAILURE_EXIT_CODE
    }
}

/// Resolve the plan from a preset, an explicit file, or `<context>/Dockerfile`
pub fn load_plan(source: &PlanSourceArgs, shell: &str) -> Result<BuildPlan> {
    let plan = if let Some(name) = &source.preset {
        debug!(preset = %name, "Using built-in plan");
        presets::by_name(name)?
    } else {
        let path = source
            .file
            .clone()
            .unwrap_or_else(|| source.context.join(DEFAULT_RECIPE));
        debug!(path = %path.display(), "Loading plan file");
        BuildPlan::load(&path, shell)?
    };

    plan.validate()?;
    info!(steps = plan.len(), "Build plan loaded");
    Ok(plan)
}

fn canonical_dir(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        bail!("Build context is not a directory: {}", path.display());
    }
    path.canonicalize()
        .with_context(|| format!("Failed to canonicalize build context {}", path.display()))
}

/// Create the root filesystem directory; an existing one must be empty
pub fn prepare_rootfs(rootfs: &Path) -> Result<()> {
    if rootfs.exists() {
        if !rootfs.is_dir() {
            bail!("Root filesystem path is not a directory: {}", rootfs.display());
        }
        let mut entries = std::fs::read_dir(rootfs)
            .with_context(|| format!("Failed to read root filesystem {}", rootfs.display()))?;
        if entries.next().is_some() {
            bail!(
                "Root filesystem directory is not empty: {}",
                rootfs.display()
            );
        }
        return Ok(());
    }
    std::fs::create_dir_all(rootfs)
        .with_context(|| format!("Failed to create root filesystem {}", rootfs.display()))
}

/// Print to stdout or write to a file; false when the write failed
fn write_output(output_file: Option<&Path>, output: &str, quiet: bool) -> bool {
    match output_file {
        Some(path) => match std::fs::write(path, output) {
            Ok(_) => {
                info!("Output written to: {}", path.display());
                if !quiet {
                    eprintln!("Output written to: {}", path.display());
                }
                true
            }
            Err(e) => {
                error!("Failed to write output to file: {}", e);
                false
            }
        },
        None => {
            print!("{}", output);
            if !output.ends_with('\n') {
                println!();
            }
            true
        }
    }
}
