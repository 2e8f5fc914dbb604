//! Command implementations and argument parsing for the bramble CLI.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bramble_core::{
    edgeio::open_edge_reader,
    sequence::{degree_sequence, read_sequence},
    AdjGraph, CoreError, EdgeFormat, Graph, JNodeTable, JTree, Partition, PartitionMethod,
    PartitionWeights, SequenceFormat, TreeOptions,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tracing::{info, instrument};

const DEFAULT_BALANCE_FACTOR: f64 = 1.03;

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(
    name = "bramble",
    about = "Build, merge and partition junction trees over sparse graphs."
)]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Eliminate a graph into a junction tree.
    BuildTree(BuildTreeArgs),
    /// Merge two saved trees of equal size.
    MergeTrees(MergeTreesArgs),
    /// Partition a saved tree into balanced parts.
    PartitionTree(PartitionTreeArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::BuildTree(_) => "build-tree",
            Command::MergeTrees(_) => "merge-trees",
            Command::PartitionTree(_) => "partition-tree",
        }
    }
}

/// Edge file encodings selectable on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EdgeFormatArg {
    /// 12-byte binary records.
    Binary,
    /// Whitespace-separated text lines.
    Text,
}

impl From<EdgeFormatArg> for EdgeFormat {
    fn from(arg: EdgeFormatArg) -> Self {
        match arg {
            EdgeFormatArg::Binary => EdgeFormat::Binary,
            EdgeFormatArg::Text => EdgeFormat::Text,
        }
    }
}

/// Sequence file encodings selectable on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SequenceFormatArg {
    /// `u64` length then `u32` vids.
    Binary,
    /// One vid per line.
    Text,
}

impl From<SequenceFormatArg> for SequenceFormat {
    fn from(arg: SequenceFormatArg) -> Self {
        match arg {
            SequenceFormatArg::Binary => SequenceFormat::Binary,
            SequenceFormatArg::Text => SequenceFormat::Text,
        }
    }
}

/// Tree partitioning strategies selectable on the command line.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum MethodArg {
    /// First-fit-decreasing packing over subtree weights.
    #[default]
    Forward,
    /// Critical-path packing.
    Backward,
    /// Stream by descending depth.
    Depth,
    /// Stream by ascending height.
    Height,
    /// Stream in node order.
    Naive,
    /// Uniform random assignment.
    Random,
}

impl From<MethodArg> for PartitionMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Forward => PartitionMethod::Forward,
            MethodArg::Backward => PartitionMethod::Backward,
            MethodArg::Depth => PartitionMethod::Depth,
            MethodArg::Height => PartitionMethod::Height,
            MethodArg::Naive => PartitionMethod::Naive,
            MethodArg::Random => PartitionMethod::Random,
        }
    }
}

/// Options accepted by the `build-tree` command.
#[derive(Debug, Args, Clone)]
pub struct BuildTreeArgs {
    /// Input graph file.
    pub graph: PathBuf,

    /// Elimination ordering file; defaults to the ascending-degree order.
    #[arg(long, short = 's')]
    pub sequence: Option<PathBuf>,

    /// Persist the tree to this file, building through a memory mapping.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Emit progress events while building.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Populate the child table.
    #[arg(long, short = 'k')]
    pub kids: bool,

    /// Populate the post-neighbour table.
    #[arg(long, short = 'e')]
    pub pst: bool,

    /// Populate junction sets (implies --kids and --pst).
    #[arg(long, short = 'j')]
    pub jxn: bool,

    /// Combined byte budget for the set arenas.
    ///
    /// Supports human-readable suffixes: K, M, G, T (case-insensitive).
    /// Example: `--memory 2G` or `--memory 2147483648`.
    #[arg(long, short = 'm', value_parser = parse_byte_size)]
    pub memory: Option<u64>,

    /// Defer vertices whose insertion would exceed this width.
    #[arg(long, short = 'w')]
    pub width_limit: Option<usize>,

    /// Stop once the maximum width of the ordering is known.
    #[arg(long, short = 'x')]
    pub find_max_width: bool,

    /// Coalesce the residual suffix once a node covers it.
    #[arg(long, short = 'c')]
    pub rooting: bool,

    /// Skip tree nodes for zero-degree vertices.
    #[arg(long)]
    pub no_pad: bool,

    /// Print the tree summary figures.
    #[arg(long, short = 'f')]
    pub faqs: bool,

    /// Check the finished tree and report a verdict.
    #[arg(long)]
    pub validate: bool,

    /// Dump one line per tree node.
    #[arg(long, short = 'p')]
    pub print: bool,

    /// Graph encoding; guessed from the extension when omitted.
    #[arg(long, value_enum)]
    pub graph_format: Option<EdgeFormatArg>,

    /// Sequence file encoding.
    #[arg(long, value_enum, default_value_t = SequenceFormatArg::Text)]
    pub sequence_format: SequenceFormatArg,
}

/// Options accepted by the `merge-trees` command.
#[derive(Debug, Args, Clone)]
pub struct MergeTreesArgs {
    /// First tree file.
    pub first: PathBuf,

    /// Second tree file.
    pub second: PathBuf,

    /// Persist the merged tree to this file.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Carry child tables and pre-weights through the merge.
    #[arg(long, short = 'k')]
    pub kids: bool,

    /// Print the merged tree's summary figures.
    #[arg(long, short = 'f')]
    pub faqs: bool,
}

/// Options accepted by the `partition-tree` command.
#[derive(Debug, Args, Clone)]
pub struct PartitionTreeArgs {
    /// Elimination ordering the tree was built with.
    pub sequence: PathBuf,

    /// Saved tree file.
    pub tree: PathBuf,

    /// Number of parts.
    pub num_parts: i16,

    /// Balance factor over the perfectly even part weight.
    #[arg(long, short = 'b', default_value_t = DEFAULT_BALANCE_FACTOR)]
    pub balance: f64,

    /// Weigh each vertex as one unit.
    #[arg(long, short = 'x')]
    pub vtx_weight: bool,

    /// Weigh post-order edges.
    #[arg(long, short = 'd')]
    pub pst_weight: bool,

    /// Weigh children's pre-order edges.
    #[arg(long, short = 'u')]
    pub pre_weight: bool,

    /// Partitioning strategy.
    #[arg(long, value_enum, default_value_t = MethodArg::Forward)]
    pub method: MethodArg,

    /// Graph file, required for writing partitioned edges.
    #[arg(long, short = 'g')]
    pub graph: Option<PathBuf>,

    /// Prefix for per-part edge files.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Graph encoding; guessed from the extension when omitted.
    #[arg(long, value_enum)]
    pub graph_format: Option<EdgeFormatArg>,

    /// Sequence file encoding.
    #[arg(long, value_enum, default_value_t = SequenceFormatArg::Text)]
    pub sequence_format: SequenceFormatArg,

    /// Encoding of the written per-part edge files.
    #[arg(long, value_enum, default_value_t = EdgeFormatArg::Text)]
    pub output_format: EdgeFormatArg,
}

/// Errors surfaced while executing CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// File I/O failed while loading an input.
    #[error("failed to open `{path}`: {source}")]
    Io {
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// A partitioned output needs both `--graph` and `--output`.
    #[error("--output requires --graph to re-read the edges")]
    OutputNeedsGraph,
    /// Core library failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Lines reported to the user on stdout after a command completes.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    pub report: Vec<String>,
}

impl ExecutionSummary {
    fn line(&mut self, line: impl Into<String>) {
        self.report.push(line.into());
    }
}

/// Executes the CLI command represented by `cli`.
///
/// # Errors
/// Returns [`CliError`] when loading inputs or executing the command
/// fails.
#[instrument(name = "cli.run", err, skip(cli), fields(command = %cli.command.name()))]
pub fn run_cli(cli: Cli) -> Result<ExecutionSummary, CliError> {
    match cli.command {
        Command::BuildTree(args) => build_tree(args),
        Command::MergeTrees(args) => merge_trees(args),
        Command::PartitionTree(args) => partition_tree(args),
    }
}

fn edge_format(path: &Path, requested: Option<EdgeFormatArg>) -> EdgeFormat {
    requested
        .map(EdgeFormat::from)
        .or_else(|| EdgeFormat::from_path(path))
        .unwrap_or(EdgeFormat::Text)
}

fn load_graph(path: &Path, requested: Option<EdgeFormatArg>) -> Result<AdjGraph, CliError> {
    let mut reader = open_edge_reader(path, edge_format(path, requested))?;
    Ok(AdjGraph::from_reader(reader.as_mut(), true)?)
}

#[instrument(name = "cli.build_tree", err, skip(args), fields(graph = %args.graph.display()))]
fn build_tree(args: BuildTreeArgs) -> Result<ExecutionSummary, CliError> {
    let graph = load_graph(&args.graph, args.graph_format)?;
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "graph loaded"
    );

    let seq = match &args.sequence {
        Some(path) => read_sequence(path, args.sequence_format.into())?,
        None => degree_sequence(&graph),
    };

    let mut opts = TreeOptions::new()
        .with_verbose(args.verbose)
        .with_pad(!args.no_pad)
        .with_kids(args.kids)
        .with_pst(args.pst)
        .with_width_limit(args.width_limit)
        .with_find_max_width(args.find_max_width)
        .with_rooting(args.rooting);
    if args.jxn {
        opts = opts.with_jxn(true);
    }
    if let Some(memory) = args.memory {
        opts = opts.with_memory_limit(memory as usize);
    }

    let tree = match &args.output {
        Some(path) => JTree::build_mapped(&graph, &seq, path, opts)?,
        None => JTree::build(&graph, &seq, opts)?,
    };
    info!(nodes = tree.len(), "tree built");

    let mut summary = ExecutionSummary::default();
    if args.faqs {
        summary.line(tree.jnodes.facts().to_string());
    }
    if args.print {
        let mut dump = Vec::new();
        tree.dump(&mut dump).map_err(|source| CliError::Io {
            path: args.graph.clone(),
            source,
        })?;
        summary.line(String::from_utf8_lossy(&dump).into_owned());
    }
    if args.validate {
        if tree.is_valid(&graph, &seq, opts) {
            summary.line("Tree is valid.");
        } else {
            summary.line("ERROR: Tree is not valid.");
        }
    }
    Ok(summary)
}

#[instrument(name = "cli.merge_trees", err, skip(args))]
fn merge_trees(args: MergeTreesArgs) -> Result<ExecutionSummary, CliError> {
    let lhs = JNodeTable::load(&args.first)?;
    let rhs = JNodeTable::load(&args.second)?;

    let mut merged = match &args.output {
        Some(path) => JNodeTable::create_mapped(path, lhs.len(), args.kids, 0)?,
        None => JNodeTable::new(lhs.len(), args.kids, 0),
    };
    merged.merge(&lhs, &rhs, args.kids)?;
    info!(nodes = merged.len(), "trees merged");

    let mut summary = ExecutionSummary::default();
    if args.faqs {
        summary.line(merged.facts().to_string());
    }
    Ok(summary)
}

#[instrument(name = "cli.partition_tree", err, skip(args), fields(parts = args.num_parts))]
fn partition_tree(args: PartitionTreeArgs) -> Result<ExecutionSummary, CliError> {
    if args.output.is_some() && args.graph.is_none() {
        return Err(CliError::OutputNeedsGraph);
    }

    let mut jnodes = JNodeTable::load(&args.tree)?;
    let seq = read_sequence(&args.sequence, args.sequence_format.into())?;

    let weights = if args.vtx_weight || args.pst_weight || args.pre_weight {
        PartitionWeights {
            vtx: args.vtx_weight,
            pst: args.pst_weight,
            pre: args.pre_weight,
        }
    } else {
        PartitionWeights::default()
    };

    let partition = Partition::from_tree(
        &seq,
        &mut jnodes,
        args.num_parts,
        args.balance,
        weights,
        args.method.into(),
    )?;

    let mut summary = ExecutionSummary::default();
    summary.line(partition.summary().to_string());

    if let (Some(graph_path), Some(prefix)) = (&args.graph, &args.output) {
        let graph = load_graph(graph_path, args.graph_format)?;
        let paths = partition.write_parts(&graph, &seq, prefix, args.output_format.into())?;
        summary.line(format!("Wrote {} part files.", paths.len()));
    }
    Ok(summary)
}

/// Parses a human-readable byte size such as `"512M"` or `"2G"` into a
/// `u64`.
///
/// Recognised suffixes (case-insensitive): `K`/`KB`/`KiB`, `M`/`MB`/`MiB`,
/// `G`/`GB`/`GiB`, `T`/`TB`/`TiB`. Plain integers are treated as bytes.
pub(super) fn parse_byte_size(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("byte size must not be empty".to_owned());
    }

    let split = raw
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, suffix) = raw.split_at(split);

    let base: u64 = digits
        .parse()
        .map_err(|err| format!("invalid byte size `{digits}`: {err}"))?;

    let multiplier = match suffix.trim().to_ascii_lowercase().as_str() {
        "" => 1_u64,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024 * 1024,
        "g" | "gb" | "gib" => 1024 * 1024 * 1024,
        "t" | "tb" | "tib" => 1024_u64 * 1024 * 1024 * 1024,
        other => return Err(format!("unknown size suffix: `{other}`")),
    };

    base.checked_mul(multiplier)
        .ok_or_else(|| "byte size overflows u64".to_owned())
}

/// Renders `summary` to `writer` as plain lines.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
pub fn render_summary(summary: &ExecutionSummary, mut writer: impl Write) -> io::Result<()> {
    for line in &summary.report {
        writeln!(writer, "{line}")?;
    }
    Ok(())
}
