//! tensorpoly Command Line Interface
//!
//! Usage:
//!   tensorpoly passes
//!   tensorpoly optimize [OPTIONS] <program.json>
//!   tensorpoly lower [OPTIONS] <lowering.json>
//!
//! Examples:
//!   tensorpoly optimize model.json --fetch y            # Default passes, keep `y`
//!   tensorpoly optimize model.json -p gemm_rewriter --emit json
//!   tensorpoly lower stages.json --options "{ unroll[1] }"

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, error, info};
use std::fs;
use std::path::{Path, PathBuf};
use tensorpoly::graph::ProgramDesc;
use tensorpoly::pass::{PassRegistry, Target};
use tensorpoly::{CompilerConfig, LoweringRequest};

/// tensorpoly - graph passes and polyhedral lowering for tensor programs
#[derive(Parser, Debug)]
#[command(name = "tensorpoly")]
#[command(author = "tensorpoly contributors")]
#[command(version)]
#[command(about = "Graph passes and polyhedral loop lowering for tensor programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Compiler configuration (JSON); flags override it
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long, global = true, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the registered passes
    Passes,
    /// Run passes over a program description
    Optimize {
        /// Program description (.json)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Passes to apply, in order (repeatable)
        #[arg(short, long = "pass", value_name = "NAME")]
        passes: Vec<String>,

        /// Variable ids that must survive (repeatable or comma-separated)
        #[arg(short, long = "fetch", value_delimiter = ',', value_name = "ID")]
        fetch: Vec<String>,

        /// Target architecture
        #[arg(short, long)]
        target: Option<TargetArg>,

        /// What to emit
        #[arg(long, default_value = "text")]
        emit: EmitKind,
    },
    /// Build the loop-nest AST of a group of stages
    Lower {
        /// Lowering request (.json)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Loop iterator names, outermost first (comma-separated)
        #[arg(long, value_delimiter = ',', value_name = "NAME")]
        iterators: Vec<String>,

        /// Per-level loop options, e.g. "{ separate[0]; unroll[1] }"
        #[arg(long, value_name = "OPTIONS")]
        options: Option<String>,

        /// Print the bridged expression tree instead of the AST
        #[arg(long)]
        expr: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetArg {
    /// Host CPU
    Host,
    /// NVIDIA GPU
    Nvgpu,
}

impl From<TargetArg> for Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Host => Target::host(),
            TargetArg::Nvgpu => Target::nvgpu(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Human-readable instruction listing
    Text,
    /// Program description (JSON)
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("tensorpoly v{}", tensorpoly::VERSION);

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CompilerConfig::default(),
    };

    match cli.command {
        Command::Passes => {
            let registry = PassRegistry::with_builtin_passes();
            write_output(&cli.output, &registry.names().join("\n"))
        }
        Command::Optimize { input, passes, fetch, target, emit } => {
            if !passes.is_empty() {
                config.passes = passes;
            }
            if !fetch.is_empty() {
                config.fetch_ids = fetch;
            }
            if let Some(target) = target {
                config.target = target.into();
            }
            debug!("Compiler config: {:?}", config);

            let text = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read input file: {:?}", input))?;
            let program = ProgramDesc::from_json(&text)
                .with_context(|| format!("Failed to parse program description: {:?}", input))?
                .into_program()
                .context("Invalid program description")?;

            info!("Optimizing {} instruction(s)...", program.len());
            let optimized = match tensorpoly::optimize(program, &config) {
                Ok(p) => p,
                Err(e) => {
                    error!("Optimization failed: {:#}", e);
                    return Err(e);
                }
            };
            let rendered = match emit {
                EmitKind::Text => optimized.to_string(),
                EmitKind::Json => ProgramDesc::from_program(&optimized).to_json()?,
            };
            write_output(&cli.output, &rendered)
        }
        Command::Lower { input, iterators, options, expr } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read input file: {:?}", input))?;
            let mut request = LoweringRequest::from_json(&text)
                .with_context(|| format!("Failed to parse lowering request: {:?}", input))?;
            if !iterators.is_empty() {
                request.iterator_names = iterators;
            } else if request.iterator_names.is_empty() {
                request.iterator_names = config.iterator_names.clone();
            }
            if let Some(options) = options {
                request.build_options = options;
            } else if request.build_options.is_empty() {
                request.build_options = config.build_options.clone();
            }
            debug!("Lowering {} stage(s)", request.stages.len());

            let lowered = tensorpoly::lower(&request)?;
            let rendered = if expr { lowered.expr.to_string() } else { lowered.ast.to_string() };
            write_output(&cli.output, rendered.trim_end())
        }
    }
}

fn load_config(path: &Path) -> Result<CompilerConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse config file: {:?}", path))
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
