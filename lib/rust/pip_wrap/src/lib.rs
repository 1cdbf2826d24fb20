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

//! Wrapper that runs Fluent BioSciences' PIPseeker as a managed cloud task:
//! it sizes the machine, stages the reference genome, translates platform
//! parameters into a tool invocation, executes it, and delivers the results.

pub mod analysis_args;
pub mod estimate;
pub mod logging;
pub mod reference;
pub mod run;
pub mod task_args;
pub mod utils;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;
use std::process::{Command, ExitStatus};

/// Name of the wrapped binary, resolved on PATH.
pub const PIPSEEKER_BIN: &str = "pipseeker";

/// Render an argument vector as the shell command it will execute, for logs
/// and dry runs.
pub fn render_cmdline(args: &[String]) -> String {
    std::iter::once(PIPSEEKER_BIN)
        .chain(args.iter().map(String::as_str))
        .map(|arg| shell_escape::escape(arg.into()))
        .join(" ")
}

/// Run the assembled invocation as a blocking subprocess with inherited
/// stdio. Returns the tool's exit status; the only error is failing to
/// launch it at all.
pub fn run_tool(args: &[String]) -> Result<ExitStatus> {
    info!("Running {}", render_cmdline(args));
    Command::new(PIPSEEKER_BIN)
        .args(args)
        .status()
        .with_context(|| format!("Running {PIPSEEKER_BIN}"))
}
