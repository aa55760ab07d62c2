//! NPU QA CLI
//!
//! Runs the NPU inference qualification cases and prints one JSON report
//! on stdout. Exit status is 0 only when the mandatory case passes.

use clap::{ArgAction, Args, Parser, Subcommand};
use npu_qa_cli::{ConfigOverrides, config_command, parse_stack, probe_command, run_command};
use npu_qa_runner::Stack;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "npu-qa")]
#[command(about = "NPU inference qualification harness", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct GlobalArgs {
    /// YAML config file overlaying the stack defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Runtime stack (rknpu, teflon)
    #[arg(long, global = true, value_parser = parse_stack)]
    stack: Option<Stack>,

    /// Directory holding models, dictionary and test image
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Timed passes per case
    #[arg(long, global = true)]
    repeat: Option<usize>,

    /// Runtime shared library to load
    #[arg(long, global = true)]
    runtime_lib: Option<PathBuf>,

    /// Do not look for an accelerator delegate
    #[arg(long, global = true)]
    no_delegate: bool,

    /// Log to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

impl From<GlobalArgs> for ConfigOverrides {
    fn from(args: GlobalArgs) -> Self {
        Self {
            config_file: args.config,
            stack: args.stack,
            models_dir: args.models_dir,
            repeat: args.repeat,
            runtime_lib: args.runtime_lib,
            no_delegate: args.no_delegate,
        }
    }
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Run all cases and print the JSON report (default)
    Run,
    /// Print the effective configuration as YAML
    Config,
    /// Print runtime and delegate resolution without running inference
    Probe,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    npu_qa_runner::logging::init(cli.global.verbose);

    let command = cli.command.unwrap_or(Commands::Run);
    let overrides = ConfigOverrides::from(cli.global);
    let output = match command {
        Commands::Run => run_command(&overrides),
        Commands::Config => config_command(&overrides),
        Commands::Probe => probe_command(&overrides),
    };

    println!("{}", output.stdout.trim_end());
    tracing::debug!(exit_code = output.exit_code, "done");
    ExitCode::from(u8::try_from(output.exit_code).unwrap_or(1))
}
