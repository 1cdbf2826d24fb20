//! Task-level options shared by every subcommand: where results go, where
//! scratch lives, and the resource overrides honored by the sizing step.

use clap::{value_parser, Parser};
use pip_sizing::Overrides;
use std::path::PathBuf;

/// Platform-facing options that are not PIPseeker parameters.
#[derive(Parser, Debug, Clone)]
pub struct TaskArgs {
    /// Destination for the results: a platform URI such as
    /// latch:///runs/sample1, or a local directory. When omitted the
    /// output stays in the staging directory.
    #[clap(long, value_name = "URI")]
    pub output_dest: Option<String>,

    /// Scratch directory where references are staged and the tool writes
    /// its output.
    #[clap(long, value_name = "PATH", default_value = "/root")]
    pub staging_dir: PathBuf,

    /// Verbosity of the tool's own log output (0-2).
    #[clap(long, value_name = "NUM", default_value_t = 2,
           value_parser = value_parser!(u8).range(0..=2))]
    pub verbosity: u8,

    /// Print the assembled tool command instead of executing it.
    #[clap(long)]
    pub dry: bool,

    #[clap(flatten)]
    pub resources: OverrideArgs,
}

/// Caller-supplied replacements for the estimated machine size.
#[derive(Parser, Debug, Clone, Copy, Default)]
pub struct OverrideArgs {
    /// Override the estimated thread count.
    #[clap(long, value_name = "NUM")]
    pub task_threads: Option<usize>,

    /// Override the estimated memory request, in GB.
    #[clap(long, value_name = "NUM")]
    pub task_mem_gb: Option<u64>,

    /// Override the estimated disk request, in GB.
    #[clap(long, value_name = "NUM")]
    pub task_disk_gb: Option<u64>,
}

impl OverrideArgs {
    /// The overrides in the shape the sizing model consumes.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            threads: self.task_threads,
            mem_gb: self.task_mem_gb,
            disk_gb: self.task_disk_gb,
        }
    }
}

impl TaskArgs {
    /// Arguments every PIPseeker invocation receives. Thread count 0 tells
    /// the tool to use every core on the provisioned machine; the version
    /// probe is skipped because task nodes run a pinned tool release.
    pub fn universal_args(&self) -> Vec<String> {
        vec![
            "--threads".to_string(),
            "0".to_string(),
            "--verbosity".to_string(),
            self.verbosity.to_string(),
            "--skip-version-check".to_string(),
        ]
    }
}
