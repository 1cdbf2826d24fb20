//! The sizing models. Fitted against observed peak usage of production
//! PIPseeker runs, then padded; they prefer overshooting to an OOM kill.

use crate::input::{RefSize, SizingInput, GIB};
use crate::params::SizingParams;
use serde::Serialize;

/// Machine sizing for one wrapped invocation.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEstimate {
    /// Worker threads to grant the tool.
    pub threads: usize,
    /// Memory request in GB.
    pub mem_gb: u64,
    /// Scratch disk request in GB.
    pub disk_gb: u64,
}

/// Caller-supplied replacements for the modeled figures. Threads are still
/// clamped to the hardware ceiling; memory and disk pass through as given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Replacement thread count.
    pub threads: Option<usize>,
    /// Replacement memory request, GB.
    pub mem_gb: Option<u64>,
    /// Replacement disk request, GB.
    pub disk_gb: Option<u64>,
}

/// Size the machine for one invocation.
pub fn estimate(
    input: &SizingInput,
    overrides: &Overrides,
    params: &SizingParams,
) -> ResourceEstimate {
    let modeled = match *input {
        SizingInput::Full {
            fastq_bytes,
            ref_size,
            sorted_bam,
            exons_only,
        } => full_estimate(fastq_bytes, &ref_size, sorted_bam, exons_only, params),
        SizingInput::Cells { previous_bytes } => cells_estimate(previous_bytes, params),
        SizingInput::Buildmapref => ResourceEstimate {
            threads: params.buildmapref_threads,
            mem_gb: params.buildmapref_mem_gb,
            disk_gb: params.buildmapref_disk_gb,
        },
    };
    ResourceEstimate {
        threads: overrides
            .threads
            .unwrap_or(modeled.threads)
            .min(params.max_threads),
        mem_gb: overrides.mem_gb.unwrap_or(modeled.mem_gb),
        disk_gb: overrides.disk_gb.unwrap_or(modeled.disk_gb),
    }
}

/// Index into the sizing buckets for a byte total.
fn bucket_index(bytes: u64, params: &SizingParams) -> usize {
    let gib = bytes as f64 / GIB;
    params
        .bucket_bounds_gib
        .iter()
        .position(|&bound| gib < bound)
        .unwrap_or(params.bucket_bounds_gib.len())
}

/// Thread count for an input of the given size.
pub fn threads_for_bytes(bytes: u64, params: &SizingParams) -> usize {
    params.bucket_threads[bucket_index(bytes, params)]
}

fn full_estimate(
    fastq_bytes: u64,
    ref_size: &RefSize,
    sorted_bam: bool,
    exons_only: bool,
    params: &SizingParams,
) -> ResourceEstimate {
    let threads = threads_for_bytes(fastq_bytes, params);
    let fastq_gib = fastq_bytes as f64 / GIB;
    ResourceEstimate {
        threads,
        mem_gb: full_memory_gb(fastq_gib, ref_size, threads, sorted_bam, exons_only, params),
        disk_gb: full_disk_gb(fastq_gib, ref_size, sorted_bam, params),
    }
}

/// Peak-memory model for a full run: the largest of the barcoding, mapping,
/// and molecule-info stage estimates.
pub fn full_memory_gb(
    fastq_gib: f64,
    ref_size: &RefSize,
    threads: usize,
    sorted_bam: bool,
    exons_only: bool,
    params: &SizingParams,
) -> u64 {
    let barcoding = barcoding_gb(fastq_gib, threads, params);
    let mapping = mapping_gb(fastq_gib, ref_size.unpacked_gib, threads, sorted_bam, params);
    let molinfo = molinfo_gb(fastq_gib, threads, exons_only, params);
    barcoding.max(mapping).max(molinfo) as u64
}

/// Memory every stage pays regardless of its own work.
pub fn baseline_gb(fastq_gib: f64, threads: usize, params: &SizingParams) -> f64 {
    params.base_mem_gb
        + params.base_mem_per_fastq_gib * fastq_gib
        + params.base_mem_per_thread_fastq_gib * threads as f64 * fastq_gib
}

/// Barcode-matching stage. Dominated by per-thread buffers sized to the
/// read-pair length.
pub fn barcoding_gb(fastq_gib: f64, threads: usize, params: &SizingParams) -> f64 {
    let t = threads as f64;
    baseline_gb(fastq_gib, threads, params)
        + params.barcoding_mem_per_thread * t
        + params.barcoding_mem_per_base * params.read_pair_bases
        + params.barcoding_mem_per_thread_base * t * params.read_pair_bases
}

/// STARsolo mapping stage. The genome index is resident for the whole
/// stage; sorting a BAM holds a second working set on top of it.
pub fn mapping_gb(
    fastq_gib: f64,
    index_gib: f64,
    threads: usize,
    sorted_bam: bool,
    params: &SizingParams,
) -> f64 {
    let stage = params.mapping_mem_per_index_gib * index_gib
        + params.mapping_mem_base
        + params.mapping_mem_per_thread * threads as f64;
    let baseline = baseline_gb(fastq_gib, threads, params);
    if sorted_bam {
        baseline + params.sorted_bam_factor * stage
    } else {
        params.mapping_margin * (baseline + stage)
    }
}

/// Molecule-info stage. Exon-only counting keeps a second transcript table
/// per thread.
pub fn molinfo_gb(fastq_gib: f64, threads: usize, exons_only: bool, params: &SizingParams) -> f64 {
    let t = threads as f64;
    let e = if exons_only { 1.0 } else { 0.0 };
    baseline_gb(fastq_gib, threads, params)
        + params.molinfo_mem_per_fastq_gib * fastq_gib
        + params.molinfo_exons_mem * e
        + params.molinfo_mem_per_thread * t
        + params.molinfo_exons_mem_per_thread * t * e
}

/// Scratch-disk model for a full run: a multiple of the FASTQ payload plus
/// room for the reference, padded by the safety margin.
pub fn full_disk_gb(
    fastq_gib: f64,
    ref_size: &RefSize,
    sorted_bam: bool,
    params: &SizingParams,
) -> u64 {
    let per_fastq = if sorted_bam {
        params.disk_per_fastq_gib_sorted
    } else {
        params.disk_per_fastq_gib
    };
    let raw = params.disk_margin * (fastq_gib * per_fastq + ref_size.disk_gib(params));
    (raw as u64).max(params.min_disk_gb)
}

fn cells_estimate(previous_bytes: u64, params: &SizingParams) -> ResourceEstimate {
    let bucket = bucket_index(previous_bytes, params);
    let mem_gb = (params.cells_mem_fraction * (previous_bytes as f64 / GIB)) as u64;
    ResourceEstimate {
        threads: params.bucket_threads[bucket],
        mem_gb: mem_gb.clamp(params.cells_mem_min_gb, params.cells_mem_max_gb),
        disk_gb: params.cells_disk_gb[bucket],
    }
}
