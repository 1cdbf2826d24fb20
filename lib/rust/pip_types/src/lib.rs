// Warning groups (as of rust 1.55)
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility,
    rust_2018_idioms,
    unused
)]
// Other warnings (as of rust 1.55)
#![deny(
    asm_sub_register,
    bad_asm_style,
    bindings_with_variant_name,
    clashing_extern_declarations,
    confusable_idents,
    const_item_mutation,
    deprecated,
    deref_nullptr,
    drop_bounds,
    dyn_drop,
    elided_lifetimes_in_paths,
    exported_private_dependencies,
    function_item_references,
    improper_ctypes,
    improper_ctypes_definitions,
    incomplete_features,
    inline_no_sanitize,
    invalid_value,
    irrefutable_let_patterns,
    large_assignments,
    mixed_script_confusables,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overlapping_range_endpoints,
    renamed_and_removed_lints,
    stable_features,
    dangling_pointers_from_temporaries,
    trivial_bounds,
    type_alias_bounds,
    uncommon_codepoints,
    unconditional_recursion,
    unknown_lints,
    unnameable_test_items,
    unused_comparisons,
    while_true
)]

//! Domain types shared by the PIPseeker workflow wrapper: execution modes,
//! chemistry versions, the prebuilt reference registry, and reference-source
//! selection.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumIter, EnumString};

/// The three mutually exclusive PIPseeker execution modes.
#[derive(
    EnumString, Display, Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize,
)]
pub enum PipseekerMode {
    #[strum(to_string = "full")]
    #[serde(rename = "full")]
    Full,
    #[strum(to_string = "cells")]
    #[serde(rename = "cells")]
    Cells,
    #[strum(to_string = "buildmapref")]
    #[serde(rename = "buildmapref")]
    Buildmapref,
}

/// PIPseq library chemistry. The vendor renamed the fifth chemistry to a
/// bare "V"; that string is what the tool expects on the command line, so
/// `Display` yields it while parsing also accepts "v5".
#[derive(
    EnumString, Display, Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize,
)]
pub enum Chemistry {
    #[strum(to_string = "v3")]
    #[serde(rename = "v3")]
    V3,
    #[strum(to_string = "v4")]
    #[serde(rename = "v4")]
    V4,
    #[strum(to_string = "V", serialize = "v5")]
    #[serde(rename = "V", alias = "v5")]
    V5,
}

/// Granularity of the k-means clustering sweep.
#[derive(
    EnumString, Display, Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize,
)]
pub enum ClusteringSensitivity {
    #[strum(to_string = "low")]
    #[serde(rename = "low")]
    Low,
    #[strum(to_string = "medium")]
    #[serde(rename = "medium")]
    Medium,
    #[strum(to_string = "high")]
    #[serde(rename = "high")]
    High,
}

#[allow(clippy::derivable_impls)]
impl Default for ClusteringSensitivity {
    fn default() -> Self {
        ClusteringSensitivity::Medium
    }
}

/// Species whose prebuilt STAR mapping references are hosted for the
/// workflow. Each maps to a gzipped tarball on the public bucket.
#[derive(
    EnumString, EnumIter, Display, Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize,
)]
pub enum GenomeType {
    #[strum(to_string = "human")]
    #[serde(rename = "human")]
    Human,
    #[strum(to_string = "mouse")]
    #[serde(rename = "mouse")]
    Mouse,
    #[strum(to_string = "human-mouse", serialize = "human-and-mouse")]
    #[serde(rename = "human-mouse", alias = "human-and-mouse")]
    HumanMouse,
    #[strum(to_string = "drosophila")]
    #[serde(rename = "drosophila")]
    Drosophila,
    #[strum(to_string = "zebrafish")]
    #[serde(rename = "zebrafish")]
    Zebrafish,
    #[strum(to_string = "arabidopsis-thaliana")]
    #[serde(rename = "arabidopsis-thaliana")]
    ArabidopsisThaliana,
}

/// Full URL of an archive on the public distribution bucket.
macro_rules! prebuilt_url {
    ($archive:literal) => {
        concat!(
            "https://latch-public.s3.us-west-2.amazonaws.com/test-data/18440/",
            $archive
        )
    };
}

impl GenomeType {
    /// Location of the hosted reference archive for this genome.
    pub fn archive_url(&self) -> &'static str {
        match self {
            GenomeType::Human => prebuilt_url!("pipseeker-gex-reference-GRCh38-2022.04.tar.gz"),
            GenomeType::Mouse => prebuilt_url!("pipseeker-gex-reference-GRCm39-2022.04.tar.gz"),
            GenomeType::HumanMouse => {
                prebuilt_url!("pipseeker-gex-reference-GRCh38-and-GRCm39-2022.04.tar.gz")
            }
            GenomeType::Drosophila => {
                prebuilt_url!("pipseeker-gex-reference-dm-flybase-r6-v47-2022.09.tar.gz")
            }
            GenomeType::Zebrafish => {
                prebuilt_url!("zebrafish_danio_rerio_GRCz11_r110_2023.08.tar.gz")
            }
            GenomeType::ArabidopsisThaliana => prebuilt_url!(
                "pipseeker-gex-reference-arabidopsis-thaliana-TAIR10.55-protein-coding-2023.02.tar.gz"
            ),
        }
    }
}

/// Archive formats the reference-staging step can unpack.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    /// Classify a path by its archive suffix.
    pub fn detect(path: &Path) -> Option<ArchiveKind> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else {
            None
        }
    }
}

/// The archive's base filename with its archive suffix stripped; the
/// unpacked reference is required to appear under this directory name.
pub fn archive_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    for suffix in [".tar.gz", ".tgz", ".zip"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            return Some(stem);
        }
    }
    None
}

/// Where the STAR mapping reference comes from: a hosted prebuilt archive,
/// an already-unpacked local directory, or a user-supplied local archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSource {
    Prebuilt(GenomeType),
    Directory(PathBuf),
    Archive(PathBuf),
}

impl ReferenceSource {
    /// Resolve the three mutually exclusive command-line options into a
    /// source. All absent is allowed; the caller decides whether a run can
    /// proceed without a reference.
    pub fn from_options(
        prebuilt: Option<GenomeType>,
        directory: Option<PathBuf>,
        archive: Option<PathBuf>,
    ) -> Result<Option<ReferenceSource>> {
        match (prebuilt, directory, archive) {
            (Some(genome), None, None) => Ok(Some(ReferenceSource::Prebuilt(genome))),
            (None, Some(dir), None) => Ok(Some(ReferenceSource::Directory(dir))),
            (None, None, Some(path)) => Ok(Some(ReferenceSource::Archive(path))),
            (None, None, None) => Ok(None),
            _ => bail!(
                "--prebuilt-genome, --custom-reference-dir, and --custom-reference-archive \
                 are mutually exclusive; provide exactly one reference source"
            ),
        }
    }
}
