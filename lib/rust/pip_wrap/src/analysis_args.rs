//! Analysis options shared by the full and cells subcommands, and their
//! translation into PIPseeker arguments.
//!
//! Arguments with platform-side defaults are always forwarded, so a run's
//! effective settings are readable off its logged command line. Options
//! that conflict are resolved by dropping them with a warning instead of
//! refusing the run; by the time the task executes, the money for the
//! machine is already spent.

use crate::utils::{validate_id, CliPath};
use clap::{value_parser, Parser};
use pip_types::ClusteringSensitivity;
use std::fmt::Display;

/// Render `--name value` as two argv tokens.
pub(crate) fn arg_pair<T: Display>(param_name: &str, value: T) -> [String; 2] {
    [format!("--{param_name}"), value.to_string()]
}

/// Render `--name value` if the argument was given.
pub(crate) fn optional_arg<T: Display>(arg: &Option<T>, param_name: &str) -> Vec<String> {
    match arg {
        Some(value) => arg_pair(param_name, value).to_vec(),
        None => Vec::new(),
    }
}

/// Analysis settings applied to both full runs and cell-calling reruns.
#[derive(Parser, Debug, Clone)]
pub struct AnalysisArgs {
    /// Seed for the tool's stochastic steps.
    #[clap(long, value_name = "NUM", default_value_t = 0)]
    pub random_seed: i64,

    /// Resolution of the report figures, in dots per inch.
    #[clap(long, value_name = "NUM", default_value_t = 200)]
    pub dpi: u32,

    /// Lowest cell-calling sensitivity level to evaluate.
    #[clap(long, value_name = "NUM", default_value_t = 1,
           value_parser = value_parser!(u8).range(1..=5))]
    pub min_sensitivity: u8,

    /// Highest cell-calling sensitivity level to evaluate.
    #[clap(long, value_name = "NUM", default_value_t = 5,
           value_parser = value_parser!(u8).range(1..=5))]
    pub max_sensitivity: u8,

    /// Use exactly this many cells instead of calling them.
    #[clap(long, value_name = "NUM")]
    pub force_cells: Option<u64>,

    /// Percentage of most-variable genes used for clustering.
    #[clap(long, value_name = "NUM", default_value_t = 10)]
    pub clustering_percent_genes: u32,

    /// Number of differentially expressed genes reported per cluster.
    #[clap(long, value_name = "NUM", default_value_t = 50)]
    pub diff_exp_genes: u32,

    /// Number of principal components for dimensionality reduction. Must be
    /// given together with --nearest-neighbors and --resolution.
    #[clap(long, value_name = "NUM")]
    pub principal_components: Option<u32>,

    /// Number of nearest neighbors for graph clustering. Must be given
    /// together with --principal-components and --resolution.
    #[clap(long, value_name = "NUM")]
    pub nearest_neighbors: Option<u32>,

    /// Graph clustering resolution. Must be given together with
    /// --principal-components and --nearest-neighbors.
    #[clap(long, value_name = "NUM")]
    pub resolution: Option<u32>,

    /// Granularity of the clustering shown in the report: low, medium, or
    /// high.
    #[clap(long, value_name = "LEVEL", default_value_t)]
    pub clustering_sensitivity: ClusteringSensitivity,

    /// Lower bound on cluster count for the k-means sweep.
    #[clap(long, value_name = "NUM")]
    pub min_clusters_kmeans: Option<u32>,

    /// Upper bound on cluster count for the k-means sweep.
    #[clap(long, value_name = "NUM")]
    pub max_clusters_kmeans: Option<u32>,

    /// Cell-type annotation reference file.
    #[clap(long, value_name = "FILE")]
    pub annotation: Option<CliPath>,

    /// Identifier printed on the report, [a-zA-Z0-9_-]+ of 64 characters
    /// or less.
    #[clap(long, value_name = "ID", value_parser = validate_id)]
    pub id: Option<String>,

    /// Free-text description printed on the report.
    #[clap(long, value_name = "TEXT")]
    pub description: Option<String>,

    /// Save report figures as SVG in addition to PNG.
    #[clap(long)]
    pub save_svg: bool,

    /// Keep the barcoded FASTQ files in the output.
    #[clap(long)]
    pub retain_barcoded_fastqs: bool,

    /// Emit a position-sorted BAM.
    #[clap(long)]
    pub sorted_bam: bool,

    /// Delete the BAM once molecule counting is done.
    #[clap(long)]
    pub remove_bam: bool,

    /// Count exonic alignments only.
    #[clap(long)]
    pub exons_only: bool,

    /// Produce barnyard plots for species-mixing experiments.
    #[clap(long)]
    pub run_barnyard: bool,

    /// Draw axes on UMAP plots.
    #[clap(long)]
    pub umap_axes: bool,

    #[clap(flatten)]
    pub snt: SntArgs,

    #[clap(flatten)]
    pub hto: HtoArgs,
}

impl AnalysisArgs {
    /// The PIPseeker arguments for these settings. Conflicting options have
    /// already been dropped; pair with `conflict_warnings` so the operator
    /// learns what was ignored.
    pub fn tool_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        args.extend(arg_pair("random-seed", self.random_seed));
        args.extend(arg_pair("dpi", self.dpi));
        args.extend(arg_pair("min-sensitivity", self.min_sensitivity));
        args.extend(arg_pair("max-sensitivity", self.max_sensitivity));
        args.extend(arg_pair(
            "clustering-percent-genes",
            self.clustering_percent_genes,
        ));
        args.extend(arg_pair("diff-exp-genes", self.diff_exp_genes));
        args.extend(arg_pair(
            "clustering-sensitivity",
            self.clustering_sensitivity,
        ));
        args.extend(optional_arg(&self.force_cells, "force-cells"));
        args.extend(optional_arg(&self.min_clusters_kmeans, "min-clusters-kmeans"));
        args.extend(optional_arg(&self.max_clusters_kmeans, "max-clusters-kmeans"));
        args.extend(optional_arg(&self.annotation, "annotation"));
        args.extend(optional_arg(&self.id, "id"));
        args.extend(optional_arg(&self.description, "description"));
        for (set, flag) in [
            (self.save_svg, "--save-svg"),
            (self.retain_barcoded_fastqs, "--retain-barcoded-fastqs"),
            (self.sorted_bam, "--sorted-bam"),
            (self.remove_bam, "--remove-bam"),
            (self.exons_only, "--exons-only"),
            (self.run_barnyard, "--run-barnyard"),
            (self.umap_axes, "--umap-axes"),
        ] {
            if set {
                args.push(flag.to_string());
            }
        }
        if let (Some(components), Some(neighbors), Some(resolution)) = (
            self.principal_components,
            self.nearest_neighbors,
            self.resolution,
        ) {
            args.extend(arg_pair("principal-components", components));
            args.extend(arg_pair("nearest-neighbors", neighbors));
            args.extend(arg_pair("resolution", resolution));
        }
        args.extend(self.snt.tool_args());
        args.extend(self.hto.tool_args());
        args
    }

    /// Conflicts resolved by dropping arguments rather than refusing the
    /// run, one operator-facing message per conflict.
    pub fn conflict_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let trio = [
            self.principal_components,
            self.nearest_neighbors,
            self.resolution,
        ];
        let given = trio.iter().filter(|param| param.is_some()).count();
        if given != 0 && given != trio.len() {
            warnings.push(
                "--principal-components, --nearest-neighbors, and --resolution must all be \
                 used or omitted at the same time. PIPseeker will run with none of the \
                 inputted values and assign these parameters automatically."
                    .to_string(),
            );
        }
        warnings.extend(self.snt.conflict_warnings());
        warnings.extend(self.hto.conflict_warnings());
        warnings
    }
}

/// Sample-tag (SNT) library options. The whole block is ignored unless
/// --snt-fastq is given.
#[derive(Parser, Debug, Clone)]
pub struct SntArgs {
    /// Directory of FASTQs from the sample-tag library.
    #[clap(long, value_name = "DIR")]
    pub snt_fastq: Option<CliPath>,

    /// Zero-based position of the tag within the read.
    #[clap(long, value_name = "NUM", default_value_t = 0)]
    pub snt_position: u32,

    /// Tab-separated file naming the expected tag sequences.
    #[clap(long, value_name = "FILE")]
    pub snt_tags: Option<CliPath>,

    /// Per-tag annotation file for the report.
    #[clap(long, value_name = "FILE")]
    pub snt_annotation: Option<CliPath>,

    /// Colormap for sample-tag feature plots.
    #[clap(long, value_name = "NAME", default_value = "gray-to-green")]
    pub snt_colormap: String,

    /// Lower bound of the color scale, as a measured value.
    #[clap(long, value_name = "NUM")]
    pub snt_min_value: Option<i64>,

    /// Upper bound of the color scale, as a measured value.
    #[clap(long, value_name = "NUM")]
    pub snt_max_value: Option<i64>,

    /// Lower bound of the color scale, as a percentile rank.
    #[clap(long, value_name = "NUM", default_value_t = 1)]
    pub snt_min_percent: u32,

    /// Upper bound of the color scale, as a percentile rank.
    #[clap(long, value_name = "NUM", default_value_t = 99)]
    pub snt_max_percent: u32,
}

impl SntArgs {
    /// The PIPseeker arguments for the sample-tag block, empty without an
    /// SNT FASTQ directory. A trailing "/." marks the path as a directory
    /// input for the tool.
    pub fn tool_args(&self) -> Vec<String> {
        let Some(fastq) = &self.snt_fastq else {
            return Vec::new();
        };
        let mut args = vec!["--snt-fastq".to_string(), format!("{fastq}/.")];
        args.extend(arg_pair("snt-position", self.snt_position));
        args.extend(optional_arg(&self.snt_tags, "snt-tags"));
        args.extend(optional_arg(&self.snt_annotation, "snt-annotation"));
        args.extend(arg_pair("snt-colormap", &self.snt_colormap));
        match (self.snt_min_value, self.snt_max_value) {
            (Some(min), Some(max)) => {
                args.extend(arg_pair("snt-min-value", min));
                args.extend(arg_pair("snt-max-value", max));
            }
            (None, None) => {
                args.extend(arg_pair("snt-min-percent", self.snt_min_percent));
                args.extend(arg_pair("snt-max-percent", self.snt_max_percent));
            }
            // One scalar bound conflicts with the percentile defaults;
            // forward neither form and let the tool scale on its own.
            _ => {}
        }
        args
    }

    fn conflict_warnings(&self) -> Vec<String> {
        if self.snt_fastq.is_some()
            && self.snt_min_value.is_some() != self.snt_max_value.is_some()
        {
            vec![
                "Scalars and percentile ranks for SNT feature plots cannot be used together \
                 in the same analysis"
                    .to_string(),
            ]
        } else {
            Vec::new()
        }
    }
}

/// Hashtag oligo (HTO) library options. The whole block is ignored unless
/// --hto-fastq is given.
#[derive(Parser, Debug, Clone)]
pub struct HtoArgs {
    /// Directory of FASTQs from the hashtag library.
    #[clap(long, value_name = "DIR")]
    pub hto_fastq: Option<CliPath>,

    /// Zero-based position of the tag within the read.
    #[clap(long, value_name = "NUM", default_value_t = 0)]
    pub hto_position: u32,

    /// Tab-separated file naming the expected tag sequences.
    #[clap(long, value_name = "FILE")]
    pub hto_tags: Option<CliPath>,

    /// Per-tag annotation file for the report.
    #[clap(long, value_name = "FILE")]
    pub hto_annotation: Option<CliPath>,

    /// Colormap for hashtag feature plots.
    #[clap(long, value_name = "NAME", default_value = "gray-to-red")]
    pub hto_colormap: String,

    /// Draw a colorbar legend on hashtag feature plots.
    #[clap(long)]
    pub hto_colorbar: bool,

    /// Lower bound of the color scale, as a measured value.
    #[clap(long, value_name = "NUM")]
    pub hto_min_value: Option<i64>,

    /// Upper bound of the color scale, as a measured value.
    #[clap(long, value_name = "NUM")]
    pub hto_max_value: Option<i64>,

    /// Lower bound of the color scale, as a percentile rank.
    #[clap(long, value_name = "NUM", default_value_t = 1)]
    pub hto_min_percent: u32,

    /// Upper bound of the color scale, as a percentile rank.
    #[clap(long, value_name = "NUM", default_value_t = 99)]
    pub hto_max_percent: u32,
}

impl HtoArgs {
    /// The PIPseeker arguments for the hashtag block, empty without an HTO
    /// FASTQ directory.
    pub fn tool_args(&self) -> Vec<String> {
        let Some(fastq) = &self.hto_fastq else {
            return Vec::new();
        };
        let mut args = vec!["--hto-fastq".to_string(), format!("{fastq}/.")];
        args.extend(arg_pair("hto-position", self.hto_position));
        args.extend(optional_arg(&self.hto_tags, "hto-tags"));
        args.extend(optional_arg(&self.hto_annotation, "hto-annotation"));
        args.extend(arg_pair("hto-colormap", &self.hto_colormap));
        if self.hto_colorbar {
            args.push("--hto-colorbar".to_string());
        }
        match (self.hto_min_value, self.hto_max_value) {
            (Some(min), Some(max)) => {
                args.extend(arg_pair("hto-min-value", min));
                args.extend(arg_pair("hto-max-value", max));
            }
            (None, None) => {
                args.extend(arg_pair("hto-min-percent", self.hto_min_percent));
                args.extend(arg_pair("hto-max-percent", self.hto_max_percent));
            }
            _ => {}
        }
        args
    }

    fn conflict_warnings(&self) -> Vec<String> {
        if self.hto_fastq.is_some()
            && self.hto_min_value.is_some() != self.hto_max_value.is_some()
        {
            vec![
                "Scalars and percentile ranks for HTO feature plots cannot be used together \
                 in the same analysis"
                    .to_string(),
            ]
        } else {
            Vec::new()
        }
    }
}
