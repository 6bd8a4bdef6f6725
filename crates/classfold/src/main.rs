use anyhow::{Context, Result};
use clap::Parser;
use classfold::{optimize_file, OptimizeOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// classfold: constant folding for JVM class files.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input class file (.class)
    input: PathBuf,

    /// Output class file (defaults to overwriting the input)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Skip folding of constant arithmetic
    #[arg(long)]
    no_peephole: bool,

    /// Skip propagation of constant locals
    #[arg(long)]
    no_propagation: bool,

    /// Skip collapsing methods to a constant return
    #[arg(long)]
    no_method_fold: bool,

    /// Cap on peephole + propagation rounds per method (default: until
    /// nothing changes)
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Log every fold
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> OptimizeOptions {
        OptimizeOptions {
            peephole: !self.no_peephole,
            propagation: !self.no_propagation,
            method_fold: !self.no_method_fold,
            max_rounds: self.max_rounds,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    eprintln!("classfold: optimizing {}", cli.input.display());

    let output = cli.output.clone().unwrap_or_else(|| cli.input.clone());
    let report = optimize_file(&cli.input, &output, &cli.options())
        .with_context(|| format!("failed to optimize {}", cli.input.display()))?;

    eprintln!("classfold: {}", report);
    eprintln!("classfold: wrote {}", output.display());
    Ok(())
}
