//! pipwrap
#![deny(missing_docs)]

use anyhow::Result;
use clap::{self, Parser};
use pip_wrap::estimate::Estimate;
use pip_wrap::logging::init_log;
use pip_wrap::run::{Buildmapref, Cells, Full};
use pip_wrap::utils::print_error_chain;
use std::process::ExitCode;

const CMD: &str = "pipwrap";

/// Run Fluent BioSciences PIPseeker on a managed cloud task, sized to its
/// inputs.
#[derive(Parser, Debug)]
#[clap(name = CMD, version)]
struct PipWrap {
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
enum SubCommand {
    /// Run the complete PIPseeker analysis on a FASTQ directory.
    #[clap(name = "full")]
    Full(Full),

    /// Re-call cells on a previous run's output at new settings.
    #[clap(name = "cells")]
    Cells(Cells),

    /// Build a STAR mapping reference from FASTA and GTF inputs.
    #[clap(name = "buildmapref")]
    Buildmapref(Buildmapref),

    /// Print the machine sizing for a prospective run as JSON.
    #[clap(name = "estimate")]
    Estimate(Estimate),
}

fn inner_main() -> Result<ExitCode> {
    let opts = PipWrap::parse();
    match opts.subcmd {
        SubCommand::Full(full) => full.execute(),
        SubCommand::Cells(cells) => cells.execute(),
        SubCommand::Buildmapref(buildmapref) => buildmapref.execute(),
        SubCommand::Estimate(estimate) => estimate.execute(),
    }
}

fn main() -> ExitCode {
    init_log();
    match inner_main() {
        Ok(exit_code) => exit_code,
        Err(err) => {
            print_error_chain(&err);
            ExitCode::FAILURE
        }
    }
}
