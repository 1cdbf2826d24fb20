//! The run subcommands: assemble the PIPseeker invocation, stage inputs,
//! execute, and deliver results.

use crate::analysis_args::{arg_pair, optional_arg, AnalysisArgs};
use crate::reference::{stage_reference, staged_reference_path};
use crate::task_args::TaskArgs;
use crate::utils::CliPath;
use crate::{render_cmdline, run_tool, PIPSEEKER_BIN};
use anyhow::{bail, Result};
use clap::Parser;
use log::{info, warn};
use pip_types::{Chemistry, GenomeType, ReferenceSource};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Name of the tool output directory inside the staging directory.
const OUTPUT_DIR_NAME: &str = "pipseeker_out";

/// Complete analysis of a PIPseq run, FASTQs to report.
#[derive(Parser, Debug, Clone)]
pub struct Full {
    /// Directory of input FASTQ files (paired, gzipped).
    #[clap(long, value_name = "DIR", required = true)]
    pub fastq_dir: CliPath,

    /// PIPseq chemistry version of the library: v3, v4, or v5.
    #[clap(long, value_name = "CHEM", default_value = "v4")]
    pub chemistry: Chemistry,

    /// Prebuilt reference genome to map against: human, mouse,
    /// human-mouse, drosophila, zebrafish, or arabidopsis-thaliana.
    #[clap(long, value_name = "GENOME")]
    pub prebuilt_genome: Option<GenomeType>,

    /// Path of an already unpacked STAR reference directory.
    #[clap(long, value_name = "DIR")]
    pub custom_reference_dir: Option<CliPath>,

    /// Path of a compressed STAR reference archive (.tar.gz or .zip).
    #[clap(long, value_name = "FILE")]
    pub custom_reference_archive: Option<CliPath>,

    /// Downsample the input to this many reads before analysis.
    #[clap(long, value_name = "NUM")]
    pub downsample_to: Option<u64>,

    /// Declared total read count of the input; refines --downsample-to and
    /// is ignored without it.
    #[clap(long, value_name = "NUM")]
    pub input_reads: Option<u64>,

    #[clap(flatten)]
    pub analysis: AnalysisArgs,

    #[clap(flatten)]
    pub task: TaskArgs,
}

impl Full {
    /// Exactly one reference source must be selected for a full run.
    fn reference_source(&self) -> Result<ReferenceSource> {
        let source = ReferenceSource::from_options(
            self.prebuilt_genome,
            self.custom_reference_dir.clone().map(PathBuf::from),
            self.custom_reference_archive.clone().map(PathBuf::from),
        )?;
        let Some(source) = source else {
            bail!(
                "a reference genome is required: specify --prebuilt-genome, \
                 --custom-reference-dir, or --custom-reference-archive"
            );
        };
        Ok(source)
    }

    fn tool_args(&self, reference: &Path, output_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "full".to_string(),
            "--fastq".to_string(),
            format!("{}/.", self.fastq_dir),
            "--star-index-path".to_string(),
            reference.display().to_string(),
            "--chemistry".to_string(),
            self.chemistry.to_string(),
            "--output-path".to_string(),
            output_dir.display().to_string(),
        ];
        args.extend(self.task.universal_args());
        if let Some(downsample_to) = self.downsample_to {
            args.extend(arg_pair("downsample-to", downsample_to));
            if let Some(input_reads) = self.input_reads {
                args.extend(arg_pair("input-reads", input_reads));
            }
        }
        args.extend(self.analysis.tool_args());
        args
    }

    /// Run the full analysis.
    pub fn execute(&self) -> Result<ExitCode> {
        let source = self.reference_source()?;
        for warning in self.analysis.conflict_warnings() {
            warn!("{warning}");
        }
        let output_dir = self.task.staging_dir.join(OUTPUT_DIR_NAME);
        if self.task.dry {
            let reference = staged_reference_path(&source, &self.task.staging_dir)?;
            print_dry_run(&self.tool_args(&reference, &output_dir));
            return Ok(ExitCode::SUCCESS);
        }
        let reference = stage_reference(&source, &self.task.staging_dir)?;
        let args = self.tool_args(&reference, &output_dir);
        run_and_publish(&args, &output_dir, self.task.output_dest.as_deref())
    }
}

/// Rerun of cell calling and downstream analysis over a previous full
/// run's output.
#[derive(Parser, Debug, Clone)]
pub struct Cells {
    /// Output directory of the previous full run; the rerun happens in
    /// place.
    #[clap(long, value_name = "DIR", required = true)]
    pub previous: CliPath,

    /// Cell-hashing demultiplexing specification.
    #[clap(long, value_name = "SPEC")]
    pub hash: Option<String>,

    #[clap(flatten)]
    pub analysis: AnalysisArgs,

    #[clap(flatten)]
    pub task: TaskArgs,
}

impl Cells {
    fn tool_args(&self) -> Vec<String> {
        let mut args = vec![
            "cells".to_string(),
            "--previous".to_string(),
            self.previous.to_string(),
        ];
        args.extend(self.task.universal_args());
        args.extend(optional_arg(&self.hash, "hash"));
        args.extend(self.analysis.tool_args());
        args
    }

    /// Run the cell-calling rerun.
    pub fn execute(&self) -> Result<ExitCode> {
        for warning in self.analysis.conflict_warnings() {
            warn!("{warning}");
        }
        let args = self.tool_args();
        if self.task.dry {
            print_dry_run(&args);
            return Ok(ExitCode::SUCCESS);
        }
        run_and_publish(&args, self.previous.as_ref(), self.task.output_dest.as_deref())
    }
}

/// Construction of a STAR mapping reference from genome FASTA and GTF
/// annotation.
#[derive(Parser, Debug, Clone)]
pub struct Buildmapref {
    /// Genome sequence FASTA file.
    #[clap(long, value_name = "FILE", required = true)]
    pub fasta: CliPath,

    /// Gene annotation GTF file.
    #[clap(long, value_name = "FILE", required = true)]
    pub gtf: CliPath,

    /// Sequencing read length the index is optimized for.
    #[clap(long, value_name = "NUM", default_value_t = 100)]
    pub read_length: u32,

    /// STAR suffix-array sparsity; higher builds a smaller, slower index.
    #[clap(long, value_name = "NUM", default_value_t = 3)]
    pub sparsity: u32,

    /// Comma-separated gene biotypes to keep; mutually exclusive with
    /// --exclude-types.
    #[clap(long, value_name = "TYPES")]
    pub include_types: Option<String>,

    /// Comma-separated gene biotypes to drop; mutually exclusive with
    /// --include-types.
    #[clap(long, value_name = "TYPES")]
    pub exclude_types: Option<String>,

    /// GTF attribute carrying the biotype, forwarded only alongside
    /// --include-types or --exclude-types.
    #[clap(long, value_name = "TAG")]
    pub biotype_tag: Option<String>,

    /// Extra arguments after "--" are passed through to the tool verbatim.
    #[clap(last = true, value_name = "ARGS")]
    pub passthrough: Vec<String>,

    #[clap(flatten)]
    pub task: TaskArgs,
}

impl Buildmapref {
    fn tool_args(&self, output_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "buildmapref".to_string(),
            "--fasta".to_string(),
            self.fasta.to_string(),
            "--gtf".to_string(),
            self.gtf.to_string(),
            "--output-path".to_string(),
            output_dir.display().to_string(),
        ];
        args.extend(arg_pair("read-length", self.read_length));
        args.extend(arg_pair("sparsity", self.sparsity));
        args.extend(self.task.universal_args());
        match (&self.include_types, &self.exclude_types) {
            (Some(include), None) => {
                args.extend(arg_pair("include-types", include));
                args.extend(optional_arg(&self.biotype_tag, "biotype-tag"));
            }
            (None, Some(exclude)) => {
                args.extend(arg_pair("exclude-types", exclude));
                args.extend(optional_arg(&self.biotype_tag, "biotype-tag"));
            }
            // Both filters together conflict; forward neither and keep
            // every biotype.
            _ => {}
        }
        args.extend(self.passthrough.iter().cloned());
        args
    }

    fn conflict_warnings(&self) -> Vec<String> {
        if self.include_types.is_some() && self.exclude_types.is_some() {
            vec![
                "Only one of --exclude-types and --include-types can be used. PIPseeker will \
                 run with neither filter and keep every biotype."
                    .to_string(),
            ]
        } else {
            Vec::new()
        }
    }

    /// Run the reference build.
    pub fn execute(&self) -> Result<ExitCode> {
        for warning in self.conflict_warnings() {
            warn!("{warning}");
        }
        let output_dir = self.task.staging_dir.join(OUTPUT_DIR_NAME);
        let args = self.tool_args(&output_dir);
        if self.task.dry {
            print_dry_run(&args);
            return Ok(ExitCode::SUCCESS);
        }
        run_and_publish(&args, &output_dir, self.task.output_dest.as_deref())
    }
}

/// Print the command a run would execute, shell-quoted.
fn print_dry_run(args: &[String]) {
    println!("Dry Run Mode");
    println!();
    println!("{PIPSEEKER_BIN} command: {}", render_cmdline(args));
}

/// Run the tool, then deliver whatever it produced. A tool failure is
/// logged rather than escalated and the partial output still uploads;
/// failing to launch the tool at all is escalated, after the upload
/// attempt.
fn run_and_publish(args: &[String], local_output: &Path, dest: Option<&str>) -> Result<ExitCode> {
    match run_tool(args) {
        Ok(status) => {
            if !status.success() {
                warn!(
                    "PIPseeker failed with exit code {}",
                    status.code().unwrap_or(1)
                );
            }
            publish_results(local_output, dest);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            publish_results(local_output, dest);
            Err(err)
        }
    }
}

/// Best-effort delivery of the output directory, then print the local
/// path on stdout as the task's result handle.
fn publish_results(local_output: &Path, dest: Option<&str>) {
    if let Some(dest) = dest {
        info!(
            "Uploading results from {} to {dest}",
            local_output.display()
        );
        if let Err(err) = cloud_utils::upload_dir(local_output, dest) {
            warn!("failed to upload results to {dest}: {err:#}");
        }
    }
    println!("{}", local_output.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn default_analysis() -> AnalysisArgs {
        AnalysisArgs::try_parse_from(["pipwrap"]).unwrap()
    }

    fn default_task() -> TaskArgs {
        TaskArgs::try_parse_from(["pipwrap"]).unwrap()
    }

    fn base_full() -> Full {
        Full {
            fastq_dir: CliPath::from(PathBuf::from("/data/fastq")),
            chemistry: Chemistry::V4,
            prebuilt_genome: None,
            custom_reference_dir: None,
            custom_reference_archive: None,
            downsample_to: None,
            input_reads: None,
            analysis: default_analysis(),
            task: default_task(),
        }
    }

    fn base_buildmapref() -> Buildmapref {
        Buildmapref {
            fasta: CliPath::from(PathBuf::from("/data/genome.fa")),
            gtf: CliPath::from(PathBuf::from("/data/genes.gtf")),
            read_length: 100,
            sparsity: 3,
            include_types: None,
            exclude_types: None,
            biotype_tag: None,
            passthrough: Vec::new(),
            task: default_task(),
        }
    }

    #[test]
    fn test_full_command_defaults() {
        let args = base_full().tool_args(
            Path::new("/root/pipseeker-gex-reference-GRCh38-2022.04"),
            Path::new("/root/pipseeker_out"),
        );
        insta::assert_debug_snapshot!(args, @r###"
        [
            "full",
            "--fastq",
            "/data/fastq/.",
            "--star-index-path",
            "/root/pipseeker-gex-reference-GRCh38-2022.04",
            "--chemistry",
            "v4",
            "--output-path",
            "/root/pipseeker_out",
            "--threads",
            "0",
            "--verbosity",
            "2",
            "--skip-version-check",
            "--random-seed",
            "0",
            "--dpi",
            "200",
            "--min-sensitivity",
            "1",
            "--max-sensitivity",
            "5",
            "--clustering-percent-genes",
            "10",
            "--diff-exp-genes",
            "50",
            "--clustering-sensitivity",
            "medium",
        ]
        "###);
    }

    #[test]
    fn test_full_chemistry_v5_spells_bare_v() {
        let mut full = base_full();
        full.chemistry = Chemistry::V5;
        let args = full.tool_args(Path::new("/refs/idx"), Path::new("/root/pipseeker_out"));
        let at = args.iter().position(|arg| arg == "--chemistry").unwrap();
        assert_eq!(args[at + 1], "V");
    }

    #[test]
    fn test_input_reads_needs_a_downsample_target() {
        let mut full = base_full();
        full.input_reads = Some(800_000_000);
        let args = full.tool_args(Path::new("/refs/idx"), Path::new("/root/pipseeker_out"));
        assert!(!args.contains(&"--input-reads".to_string()));

        full.downsample_to = Some(100_000_000);
        let args = full.tool_args(Path::new("/refs/idx"), Path::new("/root/pipseeker_out"));
        let at = args.iter().position(|arg| arg == "--downsample-to").unwrap();
        assert_eq!(
            args[at..at + 4],
            ["--downsample-to", "100000000", "--input-reads", "800000000"].map(String::from)
        );
    }

    #[test]
    fn test_full_requires_a_reference() {
        assert!(base_full().reference_source().is_err());

        let mut with_genome = base_full();
        with_genome.prebuilt_genome = Some(GenomeType::Human);
        assert_eq!(
            with_genome.reference_source().unwrap(),
            ReferenceSource::Prebuilt(GenomeType::Human)
        );

        let mut conflicting = base_full();
        conflicting.prebuilt_genome = Some(GenomeType::Human);
        conflicting.custom_reference_dir = Some(CliPath::from(PathBuf::from("/refs/custom")));
        assert!(conflicting.reference_source().is_err());
    }

    #[test]
    fn test_cells_runs_in_the_previous_output() {
        let cells = Cells {
            previous: CliPath::from(PathBuf::from("/root/pipseeker_out")),
            hash: Some("hto".to_string()),
            analysis: default_analysis(),
            task: default_task(),
        };
        let args = cells.tool_args();
        assert_eq!(
            args[..3],
            ["cells", "--previous", "/root/pipseeker_out"].map(String::from)
        );
        let at = args.iter().position(|arg| arg == "--hash").unwrap();
        assert_eq!(args[at + 1], "hto");
    }

    #[test]
    fn test_buildmapref_biotype_filters_are_exclusive() {
        let mut build = base_buildmapref();
        build.include_types = Some("protein_coding,lncRNA".to_string());
        build.exclude_types = Some("rRNA".to_string());
        build.biotype_tag = Some("gene_biotype".to_string());
        assert_eq!(build.conflict_warnings().len(), 1);
        let args = build.tool_args(Path::new("/root/pipseeker_out"));
        assert!(!args.contains(&"--include-types".to_string()));
        assert!(!args.contains(&"--exclude-types".to_string()));
        assert!(!args.contains(&"--biotype-tag".to_string()));
    }

    #[test]
    fn test_buildmapref_include_types_carries_the_biotype_tag() {
        let mut build = base_buildmapref();
        build.include_types = Some("protein_coding".to_string());
        build.biotype_tag = Some("gene_biotype".to_string());
        assert!(build.conflict_warnings().is_empty());
        let args = build.tool_args(Path::new("/root/pipseeker_out"));
        let at = args.iter().position(|arg| arg == "--include-types").unwrap();
        assert_eq!(
            args[at..at + 4],
            ["--include-types", "protein_coding", "--biotype-tag", "gene_biotype"]
                .map(String::from)
        );
    }

    #[test]
    fn test_buildmapref_passthrough_stays_last() {
        let mut build = base_buildmapref();
        build.passthrough = vec!["--genomeSAindexNbases".to_string(), "12".to_string()];
        let args = build.tool_args(Path::new("/root/pipseeker_out"));
        assert_eq!(
            args[args.len() - 2..],
            ["--genomeSAindexNbases", "12"].map(String::from)
        );
    }
}
