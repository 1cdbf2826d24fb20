//! Calibration constants for the sizing models, overridable per deployment
//! via a `sizing.toml` placed next to the executable.

use anyhow::{ensure, Context, Result};
use log::warn;
use serde::Deserialize;
use std::sync::OnceLock;

/// Calibration constants behind [`crate::estimate::estimate`]. Memory
/// figures are GB, sizes are GiB. A `sizing.toml` next to the executable
/// replaces the whole set; there is no per-field merging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SizingParams {
    /// Upper bounds (GiB of input) of the sizing buckets; inputs past the
    /// last bound land in the overflow bucket.
    pub bucket_bounds_gib: [f64; 4],
    /// Threads granted per sizing bucket.
    pub bucket_threads: [usize; 5],
    /// Largest thread count a task may request, overrides included.
    pub max_threads: usize,
    /// Memory floor of every PIPseeker stage.
    pub base_mem_gb: f64,
    /// Baseline memory growth per GiB of FASTQ input.
    pub base_mem_per_fastq_gib: f64,
    /// Baseline memory growth per thread per GiB of FASTQ input.
    pub base_mem_per_thread_fastq_gib: f64,
    /// Barcoding memory per thread.
    pub barcoding_mem_per_thread: f64,
    /// Barcoding memory per base of read-pair length.
    pub barcoding_mem_per_base: f64,
    /// Barcoding memory per thread per base of read-pair length.
    pub barcoding_mem_per_thread_base: f64,
    /// Read-pair length (bases) assumed by the barcoding model.
    pub read_pair_bases: f64,
    /// STARsolo memory per GiB of unpacked genome index.
    pub mapping_mem_per_index_gib: f64,
    /// STARsolo fixed memory overhead.
    pub mapping_mem_base: f64,
    /// STARsolo memory per thread.
    pub mapping_mem_per_thread: f64,
    /// Safety margin on the mapping estimate for unsorted BAM output.
    pub mapping_margin: f64,
    /// Mapping-stage multiplier when a position-sorted BAM is requested.
    pub sorted_bam_factor: f64,
    /// Molecule-info memory per GiB of FASTQ input.
    pub molinfo_mem_per_fastq_gib: f64,
    /// Molecule-info surcharge for exon-only counting.
    pub molinfo_exons_mem: f64,
    /// Molecule-info memory per thread.
    pub molinfo_mem_per_thread: f64,
    /// Molecule-info per-thread surcharge for exon-only counting.
    pub molinfo_exons_mem_per_thread: f64,
    /// Scratch disk per GiB of FASTQ input with unsorted BAM output.
    pub disk_per_fastq_gib: f64,
    /// Scratch disk per GiB of FASTQ input with sorted BAM output.
    pub disk_per_fastq_gib_sorted: f64,
    /// Scratch disk per GiB of compressed reference archive, covering the
    /// download and the unpacked copy.
    pub archive_disk_factor: f64,
    /// Safety margin on the disk estimate.
    pub disk_margin: f64,
    /// Smallest disk request ever issued, in GB.
    pub min_disk_gb: u64,
    /// Unpacked size of a reference archive relative to its compressed size.
    pub archive_inflation: f64,
    /// Assumed compressed reference size (GiB) when probing fails.
    pub reference_fallback_gib: f64,
    /// cells reruns: memory as a fraction of the previous output size.
    pub cells_mem_fraction: f64,
    /// cells reruns: memory floor (GB).
    pub cells_mem_min_gb: u64,
    /// cells reruns: memory ceiling (GB).
    pub cells_mem_max_gb: u64,
    /// cells reruns: disk allowance (GB) per sizing bucket.
    pub cells_disk_gb: [u64; 5],
    /// buildmapref: fixed thread count.
    pub buildmapref_threads: usize,
    /// buildmapref: fixed memory (GB).
    pub buildmapref_mem_gb: u64,
    /// buildmapref: fixed disk (GB).
    pub buildmapref_disk_gb: u64,
}

/// Values fitted against production runs across the prebuilt references.
pub const DEFAULT_SIZING: SizingParams = SizingParams {
    bucket_bounds_gib: [4.0, 16.0, 32.0, 64.0],
    bucket_threads: [8, 16, 32, 48, 64],
    max_threads: 64,
    base_mem_gb: 2.24,
    base_mem_per_fastq_gib: 0.01,
    base_mem_per_thread_fastq_gib: 0.0011,
    barcoding_mem_per_thread: 1.23,
    barcoding_mem_per_base: 0.0166,
    barcoding_mem_per_thread_base: 0.009,
    read_pair_bases: 300.0,
    mapping_mem_per_index_gib: 0.93,
    mapping_mem_base: 0.55,
    mapping_mem_per_thread: 0.23,
    mapping_margin: 1.1,
    sorted_bam_factor: 2.0,
    molinfo_mem_per_fastq_gib: 0.772,
    molinfo_exons_mem: 0.54,
    molinfo_mem_per_thread: 0.525,
    molinfo_exons_mem_per_thread: 0.71,
    disk_per_fastq_gib: 3.5,
    disk_per_fastq_gib_sorted: 12.0,
    archive_disk_factor: 2.25,
    disk_margin: 1.5,
    min_disk_gb: 2,
    archive_inflation: 1.25,
    reference_fallback_gib: 24.0,
    cells_mem_fraction: 0.5,
    cells_mem_min_gb: 8,
    cells_mem_max_gb: 64,
    cells_disk_gb: [16, 64, 128, 256, 512],
    buildmapref_threads: 64,
    buildmapref_mem_gb: 50,
    buildmapref_disk_gb: 100,
};

impl Default for SizingParams {
    fn default() -> SizingParams {
        DEFAULT_SIZING
    }
}

impl SizingParams {
    /// Cross-field checks a file-supplied parameter set must pass before
    /// the models will use it.
    fn validate(&self) -> Result<()> {
        ensure!(
            self.bucket_bounds_gib.windows(2).all(|w| w[0] < w[1]),
            "bucket_bounds_gib must be strictly increasing"
        );
        ensure!(
            self.cells_mem_min_gb <= self.cells_mem_max_gb,
            "cells_mem_min_gb must not exceed cells_mem_max_gb"
        );
        Ok(())
    }
}

static SIZING: OnceLock<Result<SizingParams>> = OnceLock::new();

/// Return a reference to the global sizing parameters.
/// The parameters may need to be loaded; if loading fails, return Err.
fn parameters() -> &'static Result<SizingParams> {
    // TODO: use get_or_try_init once [#109737](https://github.com/rust-lang/rust/issues/109737) is stabilized
    SIZING.get_or_init(|| {
        let path = std::env::current_exe()
            .context("Unable to locate the running executable")?
            .with_file_name("sizing.toml");
        if !path.exists() {
            Ok(DEFAULT_SIZING)
        } else {
            let s = std::fs::read_to_string(&path).with_context(|| path.display().to_string())?;
            let params: SizingParams =
                toml::from_str(&s).with_context(|| path.display().to_string())?;
            params.validate().with_context(|| path.display().to_string())?;
            if params != DEFAULT_SIZING {
                warn!("using non-default sizing parameters from {}", path.display());
            }
            Ok(params)
        }
    })
}

/// The active sizing parameters, loading `sizing.toml` on first use.
pub fn sizing_params() -> Result<&'static SizingParams> {
    match parameters() {
        Err(e) => Err(anyhow::anyhow!(e)),
        Ok(p) => Ok(p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_sizing_file_is_rejected() {
        // The file replaces the whole parameter set, never part of it.
        assert!(toml::from_str::<SizingParams>("max_threads = 32\n").is_err());
    }

    #[test]
    fn test_inconsistent_params_are_rejected() {
        assert!(SizingParams::default().validate().is_ok());

        // An inverted cells-memory clamp would panic at estimate time.
        let mut params = SizingParams::default();
        params.cells_mem_min_gb = 96;
        assert!(params.validate().is_err());

        let mut params = SizingParams::default();
        params.bucket_bounds_gib = [4.0, 16.0, 16.0, 64.0];
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_default_buckets_are_monotonic() {
        let params = SizingParams::default();
        assert!(params.bucket_bounds_gib.windows(2).all(|w| w[0] < w[1]));
        assert!(params.bucket_threads.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*params.bucket_threads.last().unwrap(), params.max_threads);
    }
}
