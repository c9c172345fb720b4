//! Command-line driver for the transfer VM.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use xfer_vm::Vm;

#[derive(Parser)]
#[command(name = "xfervm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a compiled transfer, interchunk or postchunk rules file", long_about = None)]
struct Cli {
    /// Compiled rules file to execute
    #[arg(short = 'c', long = "codefile")]
    code_file: PathBuf,

    /// Input file (stdin by default)
    #[arg(short = 'i', long = "inputfile")]
    input_file: Option<PathBuf>,

    /// Output file (stdout by default)
    #[arg(short = 'o', long = "outputfile")]
    output_file: Option<PathBuf>,

    /// Dump the loaded code sections before running
    #[arg(short = 'g', long = "debug")]
    debug: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut vm = match Vm::from_code_file(&cli.code_file) {
        Ok(vm) => vm,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Some(input) = &cli.input_file {
        if !input.exists() {
            eprintln!("Error: can't open input file '{}'", input.display());
            process::exit(1);
        }
        vm.set_input_file(input);
    }

    if let Some(output) = &cli.output_file {
        if let Err(e) = vm.set_output_file(output) {
            eprintln!("Error: can't open output file '{}': {}", output.display(), e);
            process::exit(1);
        }
    }

    if cli.debug {
        vm.set_debug_mode();
    }

    if let Err(e) = vm.run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
