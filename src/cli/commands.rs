use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Deterministic container image build pipeline
#[derive(Parser, Debug)]
#[command(
    name = "imageplan",
    about = "Deterministic container image build pipeline",
    version,
    author,
    long_about = "imageplan executes a build plan (workdir, copy, env, run, entrypoint) \
                  against a build context and produces an image manifest. Plans come from \
                  Dockerfile-style recipes, YAML/JSON documents, or built-in presets."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Execute a build plan and print the image manifest",
        long_about = "Applies every step of the plan in order against a fresh root filesystem. \
                      The first failing step aborts the build; the exit code is the failing \
                      command's exit code, or 1 for any other error.\n\n\
                      Examples:\n  \
                      imageplan build\n  \
                      imageplan build --preset bean-machine --context ./app\n  \
                      imageplan build --file plan.yaml --format oci\n  \
                      imageplan build --export-layer layer.tar.gz --timeout 600"
    )]
    Build(BuildArgs),

    #[command(
        about = "Load, validate and render a build plan without executing it",
        long_about = "Parses the plan and prints it in the requested format.\n\n\
                      Examples:\n  \
                      imageplan plan\n  \
                      imageplan plan --preset bean-machine --format dockerfile\n  \
                      imageplan plan --file Dockerfile --format yaml"
    )]
    Plan(PlanArgs),
}

/// Where the build plan comes from
#[derive(clap::Args, Debug, Clone)]
pub struct PlanSourceArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Plan file (.yaml/.yml/.json, anything else is read as a Dockerfile)"
    )]
    pub file: Option<PathBuf>,

    #[arg(
        short = 'p',
        long,
        value_name = "NAME",
        conflicts_with = "file",
        help = "Use a built-in plan (bean-machine)"
    )]
    pub preset: Option<String>,

    #[arg(
        short = 'c',
        long,
        value_name = "DIR",
        default_value = ".",
        help = "Build context directory"
    )]
    pub context: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub source: PlanSourceArgs,

    #[arg(
        long,
        value_name = "DIR",
        help = "Root filesystem directory (must be absent or empty; defaults to a fresh per-build directory)"
    )]
    pub rootfs: Option<PathBuf>,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Kill delegated commands running longer than this (0 disables)"
    )]
    pub timeout: Option<u64>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Write the root filesystem as a gzip-compressed layer tarball"
    )]
    pub export_layer: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: ManifestFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: PlanSourceArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: PlanFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormatArg {
    Json,
    Yaml,
    Human,
    Oci,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormatArg {
    Json,
    Yaml,
    Human,
    Dockerfile,
}

impl From<ManifestFormatArg> for super::output::OutputFormat {
    fn from(arg: ManifestFormatArg) -> Self {
        match arg {
            ManifestFormatArg::Json => super::output::OutputFormat::Json,
            ManifestFormatArg::Yaml => super::output::OutputFormat::Yaml,
            ManifestFormatArg::Human => super::output::OutputFormat::Human,
            ManifestFormatArg::Oci => super::output::OutputFormat::Oci,
        }
    }
}

impl From<PlanFormatArg> for super::output::OutputFormat {
    fn from(arg: PlanFormatArg) -> Self {
        match arg {
            PlanFormatArg::Json => super::output::OutputFormat::Json,
            PlanFormatArg::Yaml => super::output::OutputFormat::Yaml,
            PlanFormatArg::Human => super::output::OutputFormat::Human,
            PlanFormatArg::Dockerfile => super::output::OutputFormat::Dockerfile,
        }
    }
}
