mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use kiln_lib::consts::BUILD_FILE_NAME;
use tracing_subscriber::EnvFilter;

use cmd::{BuildArgs, Context};
use output::print_error;

/// kiln - incremental build executor for declarative target graphs
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the build file
  #[arg(short = 'f', long = "file", global = true, default_value = BUILD_FILE_NAME)]
  file: PathBuf,

  /// Build directory (default: `build` next to the build file)
  #[arg(short = 'b', long = "build-dir", global = true)]
  build_dir: Option<PathBuf>,

  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build targets (all targets when none are given)
  Build {
    /// Targets to build, as `name`, `:name` or `//scope:name`
    targets: Vec<String>,

    /// Set an option: `key=value`, `key` (true) or `key=` (unset)
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    define: Vec<String>,

    /// Directory of a local artifact stash
    #[arg(long, value_name = "DIR")]
    stash: Option<PathBuf>,

    /// Let commands write straight to the terminal
    #[arg(long)]
    no_capture: bool,

    /// Print the build summary as JSON
    #[arg(long)]
    json: bool,

    /// Remove the targets' outputs before building
    #[arg(long)]
    clean: bool,
  },

  /// Remove the outputs of targets and forget their recorded keys
  Clean {
    targets: Vec<String>,

    #[arg(short = 'D', value_name = "KEY=VALUE")]
    define: Vec<String>,
  },

  /// Write a ninja build file for the targets
  Export {
    targets: Vec<String>,

    /// Output file (default: <build_dir>/build.ninja)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short = 'D', value_name = "KEY=VALUE")]
    define: Vec<String>,
  },

  /// Print the target or action graph in Graphviz DOT format
  Graph {
    targets: Vec<String>,

    /// Print the action graph instead of the target graph
    #[arg(long)]
    actions: bool,
  },

  /// List declared targets and their actions
  List {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let ctx = Context {
    file: cli.file,
    build_dir: cli.build_dir,
    verbose: cli.verbose > 0,
  };

  let result = match cli.command {
    Commands::Build {
      targets,
      define,
      stash,
      no_capture,
      json,
      clean,
    } => cmd::cmd_build(
      &ctx,
      &BuildArgs {
        targets,
        define,
        stash,
        no_capture,
        json,
        clean,
      },
    ),
    Commands::Clean { targets, define } => cmd::cmd_clean(&ctx, &targets, &define).map(|()| 0),
    Commands::Export {
      targets,
      output,
      define,
    } => cmd::cmd_export(&ctx, &targets, output.as_deref(), &define).map(|()| 0),
    Commands::Graph { targets, actions } => cmd::cmd_graph(&ctx, &targets, actions).map(|()| 0),
    Commands::List { json } => cmd::cmd_list(&ctx, json).map(|()| 0),
  };

  match result {
    Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}
