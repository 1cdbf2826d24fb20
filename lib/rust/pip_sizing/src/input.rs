//! Measurement of the inputs that drive sizing: the FASTQ payload on disk
//! and the reference genome in whichever form the caller supplied it.

use crate::params::SizingParams;
use anyhow::Result;
use log::warn;
use pip_types::{ArchiveKind, ReferenceSource};
use std::fs;
use std::path::Path;

/// Bytes per GiB.
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// What a sizing decision is being made for.
#[derive(Debug, Clone, PartialEq)]
pub enum SizingInput {
    /// A complete analysis over FASTQ input.
    Full {
        /// Total FASTQ payload in bytes, downsampling already applied.
        fastq_bytes: u64,
        /// Reference genome measurement.
        ref_size: RefSize,
        /// A position-sorted BAM was requested.
        sorted_bam: bool,
        /// Transcript counting restricted to exonic alignments.
        exons_only: bool,
    },
    /// A rerun of cell calling over a previous output directory.
    Cells {
        /// Size of the previous run's output directory in bytes.
        previous_bytes: u64,
    },
    /// Construction of a STAR reference from FASTA and annotation.
    Buildmapref,
}

/// Total size of the FASTQ payload directly inside `dir`. A missing or
/// unreadable directory counts as empty rather than failing the estimate.
pub fn fastq_dir_bytes(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut total = 0;
    for entry in entries.flatten() {
        let is_fastq = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(".fastq.gz"));
        if !is_fastq {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if meta.is_file() {
                total += meta.len();
            }
        }
    }
    total
}

/// Total size of every file under `dir`, recursively. Unreadable entries
/// are skipped.
pub fn dir_bytes_recursive(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut total = 0;
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            total += dir_bytes_recursive(&entry.path());
        } else {
            total += meta.len();
        }
    }
    total
}

/// Fraction of the input that survives read downsampling, when a target is
/// set and the caller declared the input read count. Never scales up: a
/// target beyond the declared count is a no-op.
pub fn downsample_factor(downsample_to: Option<u64>, input_reads: Option<u64>) -> Option<f64> {
    match (downsample_to, input_reads) {
        (Some(target), Some(total)) if target > 0 && total > 0 => {
            Some((target as f64 / total as f64).min(1.0))
        }
        _ => None,
    }
}

/// Size of the reference genome, measured without staging it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefSize {
    /// Size of the form the reference arrives in, GiB.
    pub archive_gib: f64,
    /// Expected size once unpacked, GiB.
    pub unpacked_gib: f64,
    /// The reference arrives as a compressed archive.
    pub compressed: bool,
}

impl RefSize {
    /// No reference, as in cells mode.
    pub fn none() -> RefSize {
        RefSize {
            archive_gib: 0.0,
            unpacked_gib: 0.0,
            compressed: false,
        }
    }

    /// A compressed archive of the given size.
    pub fn from_archive_bytes(bytes: u64, params: &SizingParams) -> RefSize {
        let archive_gib = bytes as f64 / GIB;
        RefSize {
            archive_gib,
            unpacked_gib: params.archive_inflation * archive_gib,
            compressed: true,
        }
    }

    /// An already unpacked reference directory of the given size.
    pub fn from_dir_bytes(bytes: u64) -> RefSize {
        let gib = bytes as f64 / GIB;
        RefSize {
            archive_gib: gib,
            unpacked_gib: gib,
            compressed: false,
        }
    }

    /// Worst-case assumption for a reference that could not be measured.
    pub fn fallback(params: &SizingParams) -> RefSize {
        RefSize {
            archive_gib: params.reference_fallback_gib,
            unpacked_gib: params.reference_fallback_gib,
            compressed: true,
        }
    }

    /// Scratch disk the reference will occupy during a run, GiB. Archives
    /// are charged for the download plus the unpacked copy.
    pub fn disk_gib(&self, params: &SizingParams) -> f64 {
        if self.compressed {
            self.archive_gib * params.archive_disk_factor
        } else {
            self.unpacked_gib
        }
    }

    /// Size up a reference source without staging it. Never fails: anything
    /// that cannot be measured falls back to the worst-case constant.
    pub fn for_source(source: Option<&ReferenceSource>, params: &SizingParams) -> RefSize {
        RefSize::for_source_with(source, params, cloud_utils::head_content_length)
    }

    /// [`RefSize::for_source`] with the size probe for hosted archives
    /// supplied by the caller.
    pub fn for_source_with(
        source: Option<&ReferenceSource>,
        params: &SizingParams,
        probe: impl FnOnce(&str) -> Result<u64>,
    ) -> RefSize {
        let Some(source) = source else {
            return RefSize::none();
        };
        match source {
            ReferenceSource::Prebuilt(genome) => {
                let url = genome.archive_url();
                match probe(url) {
                    Ok(bytes) => RefSize::from_archive_bytes(bytes, params),
                    Err(err) => {
                        warn!(
                            "could not determine the size of {url} ({err:#}); assuming {} GiB",
                            params.reference_fallback_gib
                        );
                        RefSize::fallback(params)
                    }
                }
            }
            ReferenceSource::Archive(path) => {
                if ArchiveKind::detect(path).is_none() {
                    warn!(
                        "{} is not a recognized archive; assuming {} GiB",
                        path.display(),
                        params.reference_fallback_gib
                    );
                    return RefSize::fallback(params);
                }
                match fs::metadata(path) {
                    Ok(meta) => RefSize::from_archive_bytes(meta.len(), params),
                    Err(err) => {
                        warn!(
                            "could not measure {} ({err}); assuming {} GiB",
                            path.display(),
                            params.reference_fallback_gib
                        );
                        RefSize::fallback(params)
                    }
                }
            }
            ReferenceSource::Directory(path) => {
                if path.is_dir() {
                    RefSize::from_dir_bytes(dir_bytes_recursive(path))
                } else {
                    warn!(
                        "reference directory {} is not readable; assuming {} GiB",
                        path.display(),
                        params.reference_fallback_gib
                    );
                    RefSize::fallback(params)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pip_types::GenomeType;
    use std::path::PathBuf;

    #[test]
    fn test_fastq_dir_bytes_counts_top_level_fastqs_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("s1_R1.fastq.gz"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("s1_R2.fastq.gz"), vec![0u8; 50]).unwrap();
        fs::write(dir.path().join("notes.txt"), vec![0u8; 7]).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/s2_R1.fastq.gz"), vec![0u8; 900]).unwrap();
        assert_eq!(fastq_dir_bytes(dir.path()), 150);
    }

    #[test]
    fn test_fastq_dir_bytes_missing_dir_is_empty() {
        assert_eq!(fastq_dir_bytes(Path::new("/no/such/dir")), 0);
    }

    #[test]
    fn test_dir_bytes_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), vec![0u8; 10]).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b"), vec![0u8; 32]).unwrap();
        assert_eq!(dir_bytes_recursive(dir.path()), 42);
    }

    #[test]
    fn test_downsample_factor() {
        assert_eq!(downsample_factor(None, Some(10)), None);
        assert_eq!(downsample_factor(Some(5), None), None);
        assert_eq!(downsample_factor(Some(0), Some(10)), None);
        assert_eq!(downsample_factor(Some(5), Some(0)), None);
        assert_eq!(downsample_factor(Some(5), Some(10)), Some(0.5));
        // Downsampling to more reads than exist changes nothing.
        assert_eq!(downsample_factor(Some(20), Some(10)), Some(1.0));
    }

    #[test]
    fn test_archive_inflation() {
        let r = RefSize::from_archive_bytes(1_572_031, &SizingParams::default());
        assert!(r.compressed);
        assert_eq!(r.archive_gib * GIB, 1_572_031.0);
        assert_eq!(r.unpacked_gib * GIB, 1_965_038.75);
    }

    #[test]
    fn test_dir_sizes_are_not_inflated() {
        let r = RefSize::from_dir_bytes(1_572_031);
        assert!(!r.compressed);
        assert_eq!(r.archive_gib, r.unpacked_gib);
    }

    #[test]
    fn test_ref_disk_charges_archives_for_both_copies() {
        let params = SizingParams::default();
        let archive = RefSize::from_archive_bytes(8 * 1024 * 1024 * 1024, &params);
        assert_eq!(archive.disk_gib(&params), 18.0);
        let dir = RefSize::from_dir_bytes(8 * 1024 * 1024 * 1024);
        assert_eq!(dir.disk_gib(&params), 8.0);
    }

    #[test]
    fn test_for_source_local_archive() {
        let params = SizingParams::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom-ref.tar.gz");
        fs::write(&path, vec![0u8; 1_572_031]).unwrap();
        let r = RefSize::for_source(Some(&ReferenceSource::Archive(path)), &params);
        assert!(r.compressed);
        assert_eq!(r.archive_gib * GIB, 1_572_031.0);
    }

    #[test]
    fn test_for_source_prebuilt_probes_the_hosted_archive() {
        let params = SizingParams::default();
        let source = ReferenceSource::Prebuilt(GenomeType::Human);
        let r = RefSize::for_source_with(Some(&source), &params, |url| {
            assert_eq!(url, GenomeType::Human.archive_url());
            Ok(1_572_031)
        });
        assert_eq!(r, RefSize::from_archive_bytes(1_572_031, &params));
    }

    #[test]
    fn test_for_source_prebuilt_probe_failure_falls_back() {
        let params = SizingParams::default();
        let source = ReferenceSource::Prebuilt(GenomeType::Human);
        let r = RefSize::for_source_with(Some(&source), &params, |_| {
            Err(anyhow::anyhow!("connection refused"))
        });
        assert_eq!(r, RefSize::fallback(&params));
    }

    #[test]
    fn test_for_source_unreadable_inputs_fall_back() {
        let params = SizingParams::default();
        let missing = ReferenceSource::Archive(PathBuf::from("/no/such/ref.tar.gz"));
        assert_eq!(
            RefSize::for_source(Some(&missing), &params),
            RefSize::fallback(&params)
        );
        let not_an_archive = ReferenceSource::Archive(PathBuf::from("/no/such/ref.fa"));
        assert_eq!(
            RefSize::for_source(Some(&not_an_archive), &params),
            RefSize::fallback(&params)
        );
        let gone = ReferenceSource::Directory(PathBuf::from("/no/such/star-index"));
        assert_eq!(
            RefSize::for_source(Some(&gone), &params),
            RefSize::fallback(&params)
        );
    }

    #[test]
    fn test_for_source_directory_measures_in_place() {
        let params = SizingParams::default();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SA"), vec![0u8; 4096]).unwrap();
        fs::write(dir.path().join("Genome"), vec![0u8; 1024]).unwrap();
        let r = RefSize::for_source(
            Some(&ReferenceSource::Directory(dir.path().to_path_buf())),
            &params,
        );
        assert!(!r.compressed);
        assert_eq!(r.archive_gib * GIB, 5120.0);
    }

    #[test]
    fn test_no_reference_is_free() {
        let r = RefSize::for_source(None, &SizingParams::default());
        assert_eq!(r, RefSize::none());
        assert_eq!(r.disk_gib(&SizingParams::default()), 0.0);
    }
}
