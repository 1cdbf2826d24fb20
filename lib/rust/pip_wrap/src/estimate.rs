//! The estimate subcommand: machine sizing for a prospective run, printed
//! as JSON for the scheduler integration.
//!
//! The platform invokes this before provisioning, with the same parameter
//! values the run subcommand will receive. Inputs that cannot be measured
//! are priced conservatively instead of failing, so a sizing problem never
//! blocks a run.

use crate::task_args::OverrideArgs;
use anyhow::Result;
use clap::Parser;
use pip_sizing::{
    dir_bytes_recursive, downsample_factor, estimate, fastq_dir_bytes, sizing_params, RefSize,
    SizingInput, SizingParams,
};
use pip_types::{GenomeType, PipseekerMode, ReferenceSource};
use std::path::PathBuf;
use std::process::ExitCode;

/// Print the machine sizing for a prospective run as JSON on stdout.
#[derive(Parser, Debug, Clone)]
pub struct Estimate {
    /// Mode the prospective run will use: full, cells, or buildmapref.
    #[clap(long, value_name = "MODE")]
    pub mode: PipseekerMode,

    /// Directory of input FASTQ files.
    #[clap(long, value_name = "DIR")]
    pub fastq_dir: Option<PathBuf>,

    /// Prebuilt reference genome the run will map against.
    #[clap(long, value_name = "GENOME")]
    pub prebuilt_genome: Option<GenomeType>,

    /// Path of an already unpacked STAR reference directory.
    #[clap(long, value_name = "DIR")]
    pub custom_reference_dir: Option<PathBuf>,

    /// Path of a compressed STAR reference archive (.tar.gz or .zip).
    #[clap(long, value_name = "FILE")]
    pub custom_reference_archive: Option<PathBuf>,

    /// Directory of sample-tag (SNT) FASTQs included in the run.
    #[clap(long, value_name = "DIR")]
    pub snt_fastq: Option<PathBuf>,

    /// Directory of hashtag (HTO) FASTQs included in the run.
    #[clap(long, value_name = "DIR")]
    pub hto_fastq: Option<PathBuf>,

    /// Downsample the input to this many reads before analysis.
    #[clap(long, value_name = "NUM")]
    pub downsample_to: Option<u64>,

    /// Declared total read count of the input.
    #[clap(long, value_name = "NUM")]
    pub input_reads: Option<u64>,

    /// A position-sorted BAM will be requested.
    #[clap(long)]
    pub sorted_bam: bool,

    /// Transcript counting will be restricted to exonic alignments.
    #[clap(long)]
    pub exons_only: bool,

    /// Output directory of the previous full run (cells mode).
    #[clap(long, value_name = "DIR")]
    pub previous: Option<PathBuf>,

    #[clap(flatten)]
    pub resources: OverrideArgs,
}

impl Estimate {
    /// Measure the declared inputs into a sizing request.
    fn sizing_input(&self, params: &SizingParams) -> Result<SizingInput> {
        Ok(match self.mode {
            PipseekerMode::Buildmapref => SizingInput::Buildmapref,
            PipseekerMode::Cells => SizingInput::Cells {
                previous_bytes: self
                    .previous
                    .as_deref()
                    .map_or(0, dir_bytes_recursive),
            },
            PipseekerMode::Full => {
                let source = ReferenceSource::from_options(
                    self.prebuilt_genome,
                    self.custom_reference_dir.clone(),
                    self.custom_reference_archive.clone(),
                )?;
                let mut fastq_bytes: u64 = [&self.fastq_dir, &self.snt_fastq, &self.hto_fastq]
                    .into_iter()
                    .flatten()
                    .map(|dir| fastq_dir_bytes(dir))
                    .sum();
                if let Some(factor) = downsample_factor(self.downsample_to, self.input_reads) {
                    fastq_bytes = (fastq_bytes as f64 * factor) as u64;
                }
                SizingInput::Full {
                    fastq_bytes,
                    ref_size: RefSize::for_source(source.as_ref(), params),
                    sorted_bam: self.sorted_bam,
                    exons_only: self.exons_only,
                }
            }
        })
    }

    /// Compute and print the sizing.
    pub fn execute(&self) -> Result<ExitCode> {
        let params = sizing_params()?;
        let input = self.sizing_input(params)?;
        let sizing = estimate(&input, &self.resources.overrides(), params);
        println!("{}", serde_json::to_string_pretty(&sizing)?);
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pip_sizing::DEFAULT_SIZING;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn base_estimate(mode: PipseekerMode) -> Estimate {
        Estimate {
            mode,
            fastq_dir: None,
            prebuilt_genome: None,
            custom_reference_dir: None,
            custom_reference_archive: None,
            snt_fastq: None,
            hto_fastq: None,
            downsample_to: None,
            input_reads: None,
            sorted_bam: false,
            exons_only: false,
            previous: None,
            resources: OverrideArgs::default(),
        }
    }

    #[test]
    fn test_full_sums_and_downsamples_the_fastq_payload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let fastq_dir = dir.path().join("fastq");
        fs::create_dir(&fastq_dir)?;
        fs::write(fastq_dir.join("s1_R1.fastq.gz"), vec![0u8; 6000])?;
        fs::write(fastq_dir.join("s1_R2.fastq.gz"), vec![0u8; 4000])?;
        fs::write(fastq_dir.join("notes.txt"), vec![0u8; 999])?;
        let snt_dir = dir.path().join("snt");
        fs::create_dir(&snt_dir)?;
        fs::write(snt_dir.join("snt_R1.fastq.gz"), vec![0u8; 1000])?;

        let mut est = base_estimate(PipseekerMode::Full);
        est.fastq_dir = Some(fastq_dir);
        est.snt_fastq = Some(snt_dir);
        est.downsample_to = Some(25);
        est.input_reads = Some(100);
        assert_eq!(
            est.sizing_input(&DEFAULT_SIZING)?,
            SizingInput::Full {
                fastq_bytes: 2750,
                ref_size: RefSize::none(),
                sorted_bam: false,
                exons_only: false,
            }
        );
        Ok(())
    }

    #[test]
    fn test_full_measures_an_unpacked_reference_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let reference = dir.path().join("myref");
        fs::create_dir(&reference)?;
        fs::write(reference.join("SA"), vec![0u8; 4096])?;

        let mut est = base_estimate(PipseekerMode::Full);
        est.custom_reference_dir = Some(reference);
        let SizingInput::Full { ref_size, .. } = est.sizing_input(&DEFAULT_SIZING)? else {
            panic!("expected a full-mode sizing input");
        };
        assert_eq!(ref_size, RefSize::from_dir_bytes(4096));
        Ok(())
    }

    #[test]
    fn test_cells_measures_the_previous_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let previous = dir.path().join("pipseeker_out");
        fs::create_dir_all(previous.join("barcodes"))?;
        fs::write(previous.join("barcodes/barcodes.tsv"), vec![0u8; 1500])?;
        fs::write(previous.join("report.html"), vec![0u8; 500])?;

        let mut est = base_estimate(PipseekerMode::Cells);
        est.previous = Some(previous);
        assert_eq!(
            est.sizing_input(&DEFAULT_SIZING)?,
            SizingInput::Cells {
                previous_bytes: 2000
            }
        );
        Ok(())
    }

    #[test]
    fn test_buildmapref_needs_no_measurements() -> Result<()> {
        let est = base_estimate(PipseekerMode::Buildmapref);
        assert_eq!(est.sizing_input(&DEFAULT_SIZING)?, SizingInput::Buildmapref);
        Ok(())
    }

    #[test]
    fn test_missing_inputs_price_as_empty() -> Result<()> {
        let mut est = base_estimate(PipseekerMode::Full);
        est.fastq_dir = Some(PathBuf::from("/does/not/exist"));
        assert_eq!(
            est.sizing_input(&DEFAULT_SIZING)?,
            SizingInput::Full {
                fastq_bytes: 0,
                ref_size: RefSize::none(),
                sorted_bam: false,
                exons_only: false,
            }
        );
        Ok(())
    }
}
