//! Command-line interface orchestration for the bramble tools.
//!
//! Three subcommands cover the pipeline: `build-tree` eliminates a graph
//! into a junction tree, `merge-trees` folds two saved trees together,
//! and `partition-tree` cuts a tree into balanced parts and optionally
//! writes per-part edge files.

mod commands;

pub use commands::{
    render_summary, run_cli, BuildTreeArgs, Cli, CliError, Command, EdgeFormatArg,
    ExecutionSummary, MergeTreesArgs, MethodArg, PartitionTreeArgs, SequenceFormatArg,
};
