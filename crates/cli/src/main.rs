use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

use cmd::{BuildOptions, GraphArgs, QueryKind};
use output::OutputFormat;
use rulegraph_lib::capability::LinkStyle;

/// rgraph - resolve target graphs into rules and build them incrementally
#[derive(Parser)]
#[command(name = "rgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve the target graph and list the resulting rules
  Resolve {
    #[command(flatten)]
    graph: GraphArgs,

    /// Resolve independent targets concurrently with this many workers
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Walk the dependency closure of targets
  Query {
    #[command(flatten)]
    graph: GraphArgs,

    /// Targets to start from
    #[arg(required = true)]
    targets: Vec<String>,

    /// What to collect from the closure
    #[arg(short, long, value_enum, default_value = "deps")]
    kind: QueryKind,

    /// Link style for `--kind link`
    #[arg(long, value_enum, default_value = "static")]
    link_style: CliLinkStyle,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Print rule keys
  Keys {
    #[command(flatten)]
    graph: GraphArgs,

    /// Targets to key (default: every rule)
    targets: Vec<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Build targets and everything they depend on
  Build {
    #[command(flatten)]
    graph: GraphArgs,

    /// Targets to build
    #[arg(required = true)]
    targets: Vec<String>,

    /// Also build the runtime dependencies of every rule in the closure
    #[arg(long)]
    run: bool,

    /// Maximum number of concurrent build steps
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Output root (overrides RULEGRAPH_OUT)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Cache directory (overrides RULEGRAPH_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Do not read or write the on-disk cache
    #[arg(long, conflicts_with = "cache_dir")]
    no_cache: bool,

    /// Shell used to run genrule commands (overrides RULEGRAPH_SHELL)
    #[arg(long)]
    shell: Option<String>,

    /// Stop scheduling new work after this long (e.g. "30s", "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum CliLinkStyle {
  Static,
  Shared,
}

impl From<CliLinkStyle> for LinkStyle {
  fn from(style: CliLinkStyle) -> Self {
    match style {
      CliLinkStyle::Static => LinkStyle::Static,
      CliLinkStyle::Shared => LinkStyle::Shared,
    }
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Resolve { graph, jobs, output } => cmd::cmd_resolve(&graph, jobs, output),
    Commands::Query {
      graph,
      targets,
      kind,
      link_style,
      output,
    } => cmd::cmd_query(&graph, &targets, kind, link_style.into(), output),
    Commands::Keys { graph, targets, output } => cmd::cmd_keys(&graph, &targets, output),
    Commands::Build {
      graph,
      targets,
      run,
      jobs,
      out,
      cache_dir,
      no_cache,
      shell,
      timeout,
      output,
    } => cmd::cmd_build(
      &graph,
      &targets,
      BuildOptions {
        run,
        jobs,
        out,
        cache_dir,
        no_cache,
        shell,
        timeout,
      },
      output,
    ),
  }
}
